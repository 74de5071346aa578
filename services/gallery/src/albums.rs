use crate::catalog::CatalogStore;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("Album name must not be empty")]
    EmptyName,

    #[error("Lock date {lock_date} is in the past")]
    LockDateInPast { lock_date: NaiveDate },

    #[error("Album query failed: {0}")]
    Query(String),
}

/// Named collection owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Album {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub is_locked: bool,
    pub lock_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
}

/// Album creation request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAlbum {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lock_date: Option<DateTime<Utc>>,
}

impl NewAlbum {
    /// Trim the name and description, rejecting a blank name or a lock date before `today`
    pub fn validate(self, today: NaiveDate) -> Result<Self, AlbumError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AlbumError::EmptyName);
        }

        if let Some(lock_date) = self.lock_date.map(|d| d.date_naive()) {
            if lock_date < today {
                return Err(AlbumError::LockDateInPast { lock_date });
            }
        }

        Ok(Self {
            name,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            lock_date: self.lock_date,
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Albums owned by the session's user, newest first
    async fn list(&self, session: &Session) -> Result<Vec<Album>, AlbumError>;

    /// Create an unlocked, unshared album
    async fn create(&self, session: &Session, album: NewAlbum) -> Result<Album, AlbumError>;

    /// Number of albums owned by the session's user
    async fn count_albums(&self, session: &Session) -> Result<i64, AlbumError>;

    /// Number of shares on albums owned by the session's user
    async fn count_shares(&self, session: &Session) -> Result<i64, AlbumError>;
}

const ALBUM_COLUMNS: &str = "id, name, description, cover_url, is_locked, lock_date, created_at, user_id";

#[async_trait]
impl AlbumRepository for CatalogStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn list(&self, session: &Session) -> Result<Vec<Album>, AlbumError> {
        let sql = format!(
            "SELECT {} FROM albums WHERE user_id = $1 ORDER BY created_at DESC",
            ALBUM_COLUMNS
        );

        let albums = sqlx::query_as::<_, Album>(&sql)
            .bind(session.user_id)
            .fetch_all(self.pool())
            .await
            .map_err(|e| AlbumError::Query(e.to_string()))?;

        debug!(count = albums.len(), "Albums fetched");
        Ok(albums)
    }

    #[instrument(skip(self, session, album), fields(user_id = %session.user_id))]
    async fn create(&self, session: &Session, album: NewAlbum) -> Result<Album, AlbumError> {
        let album = album.validate(Utc::now().date_naive())?;

        let sql = format!(
            r#"
            INSERT INTO albums (id, name, description, is_locked, lock_date, user_id, created_at)
            VALUES ($1, $2, $3, FALSE, $4, $5, NOW())
            RETURNING {}
            "#,
            ALBUM_COLUMNS
        );

        let created = sqlx::query_as::<_, Album>(&sql)
            .bind(Uuid::new_v4())
            .bind(&album.name)
            .bind(&album.description)
            .bind(album.lock_date)
            .bind(session.user_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| AlbumError::Query(e.to_string()))?;

        debug!(album_id = %created.id, name = %created.name, "Album created");
        metrics::counter!("gallery.albums.created").increment(1);

        Ok(created)
    }

    async fn count_albums(&self, session: &Session) -> Result<i64, AlbumError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM albums WHERE user_id = $1")
            .bind(session.user_id)
            .fetch_one(self.pool())
            .await
            .map_err(|e| AlbumError::Query(e.to_string()))
    }

    async fn count_shares(&self, session: &Session) -> Result<i64, AlbumError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM album_shares s
            JOIN albums a ON a.id = s.album_id
            WHERE a.user_id = $1
            "#,
        )
        .bind(session.user_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| AlbumError::Query(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn new_album(name: &str, lock_date: Option<DateTime<Utc>>) -> NewAlbum {
        NewAlbum {
            name: name.to_string(),
            description: Some("  ".to_string()),
            lock_date,
        }
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = assert_err!(new_album("   ", None).validate(today()));
        assert!(matches!(err, AlbumError::EmptyName));
    }

    #[test]
    fn test_name_trimmed_and_blank_description_dropped() {
        let album = new_album("  Summer  ", None).validate(today()).unwrap();

        assert_eq!(album.name, "Summer");
        assert_eq!(album.description, None);
    }

    #[test]
    fn test_lock_date_today_allowed_yesterday_rejected() {
        let this_evening = Utc.with_ymd_and_hms(2024, 6, 15, 22, 0, 0).unwrap();
        assert_ok!(new_album("Trip", Some(this_evening)).validate(today()));

        let yesterday = Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap();
        match new_album("Trip", Some(yesterday)).validate(today()) {
            Err(AlbumError::LockDateInPast { lock_date }) => {
                assert_eq!(lock_date, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap())
            }
            other => panic!("Expected LockDateInPast, got {:?}", other),
        }
    }

    #[test]
    fn test_new_album_parses_without_optional_fields() {
        let album: NewAlbum = serde_json::from_str(r#"{"name": "Family"}"#).unwrap();

        assert_eq!(album.name, "Family");
        assert_eq!(album.lock_date, None);
    }
}
