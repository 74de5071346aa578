//! Home dashboard: headline counts and the most recent uploads.

use crate::albums::{AlbumError, AlbumRepository};
use crate::catalog::{FetchError, ImageFilter, ImageQuery, ImageRepository, ImageSort};
use crate::models::ImageRecord;
use crate::session::Session;
use crate::viewer::{StoryViewer, ViewerError};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Number of recent images shown on the dashboard
pub const RECENT_LIMIT: i64 = 10;

const RECENT_LABEL_FORMAT: &str = "%b %-d, %Y";

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Images(#[from] FetchError),

    #[error(transparent)]
    Albums(#[from] AlbumError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub albums: i64,
    pub starred: i64,
    pub photos: i64,
    pub shares: i64,
}

/// Recent image with its relative upload day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentImage {
    pub label: String,
    #[serde(flatten)]
    pub image: ImageRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent: Vec<RecentImage>,
}

impl Dashboard {
    /// Story viewer over the recent images, starting at `start`
    pub fn open_story(&self, start: usize) -> Result<StoryViewer, ViewerError> {
        StoryViewer::new(self.recent.len(), start)
    }
}

/// "Today", "Yesterday", or a short date such as "Mar 9, 2024"
pub fn relative_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(date) {
        "Yesterday".to_string()
    } else {
        date.format(RECENT_LABEL_FORMAT).to_string()
    }
}

pub struct DashboardService {
    images: Arc<dyn ImageRepository>,
    albums: Arc<dyn AlbumRepository>,
}

impl DashboardService {
    pub fn new(images: Arc<dyn ImageRepository>, albums: Arc<dyn AlbumRepository>) -> Self {
        Self { images, albums }
    }

    /// The four headline counts, queried concurrently
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn stats(&self, session: &Session) -> Result<DashboardStats, DashboardError> {
        let starred_filter = ImageFilter {
            starred_only: true,
            ..ImageFilter::own()
        };
        let photo_filter = ImageFilter::own();

        let (albums, starred, photos, shares) = tokio::try_join!(
            async { self.albums.count_albums(session).await.map_err(DashboardError::from) },
            async { self.images.count(session, &starred_filter).await.map_err(DashboardError::from) },
            async { self.images.count(session, &photo_filter).await.map_err(DashboardError::from) },
            async { self.albums.count_shares(session).await.map_err(DashboardError::from) },
        )?;

        let stats = DashboardStats {
            albums,
            starred,
            photos,
            shares,
        };
        debug!(?stats, "Dashboard stats loaded");
        Ok(stats)
    }

    /// The caller's newest images
    pub async fn recent(&self, session: &Session, limit: i64) -> Result<Vec<ImageRecord>, DashboardError> {
        let query = ImageQuery {
            filter: ImageFilter::own(),
            sort: ImageSort::Newest,
            limit: Some(limit),
        };
        Ok(self.images.fetch(session, &query).await?)
    }

    /// Stats plus labelled recent images, with days taken in `tz`
    pub async fn load<Tz: TimeZone>(&self, session: &Session, tz: &Tz) -> Result<Dashboard, DashboardError> {
        let (stats, recent) = tokio::try_join!(self.stats(session), self.recent(session, RECENT_LIMIT))?;

        let today = Utc::now().with_timezone(tz).date_naive();
        let recent = recent
            .into_iter()
            .map(|image| RecentImage {
                label: relative_label(image.created_at.with_timezone(tz).date_naive(), today),
                image,
            })
            .collect();

        Ok(Dashboard { stats, recent })
    }
}
