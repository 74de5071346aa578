//! Photo grid state for one signed-in user.
//!
//! [`GalleryView`] owns the current image list, the selection and the active
//! query. A refresh swaps the whole list in one assignment and only when the
//! fetch succeeded, so a failed fetch leaves the previous view intact.

use crate::catalog::{FetchError, ImageFilter, ImageQuery, ImageRepository, ImageSort};
use crate::export::{ExportArchive, ExportError, Exporter};
use crate::grouping::{group_by_date, DateGroup};
use crate::models::{ImageId, ImageRecord};
use crate::selection::SelectionSet;
use crate::session::Session;
use crate::viewer::{ManualViewer, ViewerError};
use chrono::TimeZone;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// What an export should include
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTargets {
    pub urls: Vec<String>,
    pub selected_only: bool,
}

pub struct GalleryView {
    repository: Arc<dyn ImageRepository>,
    images: Arc<[ImageRecord]>,
    selection: SelectionSet,
    query: ImageQuery,
}

impl GalleryView {
    pub fn new(repository: Arc<dyn ImageRepository>, query: ImageQuery) -> Self {
        Self {
            repository,
            images: Arc::from(Vec::new()),
            selection: SelectionSet::new(),
            query,
        }
    }

    pub fn images(&self) -> Arc<[ImageRecord]> {
        self.images.clone()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn query(&self) -> &ImageQuery {
        &self.query
    }

    /// Change filter and sort; takes effect on the next refresh
    pub fn set_query(&mut self, filter: ImageFilter, sort: ImageSort) {
        self.query.filter = filter;
        self.query.sort = sort;
    }

    /// Re-fetch with the current query and replace the list on success
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn refresh(&mut self, session: &Session) -> Result<usize, FetchError> {
        match self.repository.fetch(session, &self.query).await {
            Ok(images) => {
                debug!(count = images.len(), "Gallery refreshed");
                self.images = Arc::from(images);
                Ok(self.images.len())
            }
            Err(e) => {
                error!(error = %e, "Failed to refresh gallery, keeping previous images");
                Err(e)
            }
        }
    }

    /// Current images grouped by local date in `tz`
    pub fn groups<Tz>(&self, tz: &Tz) -> Vec<DateGroup>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        group_by_date(&self.images, tz)
    }

    /// Toggle `id` in the selection, returning whether it is now selected
    pub fn toggle(&mut self, id: &ImageId) -> bool {
        self.selection = self.selection.toggled(id);
        self.selection.contains(id)
    }

    /// Replace the whole selection
    pub fn select(&mut self, selection: SelectionSet) {
        self.selection = selection;
    }

    /// Full-image viewer over the current list, opened on `start`
    pub fn open_viewer(&self, start: usize) -> Result<ManualViewer, ViewerError> {
        ManualViewer::new(self.images.len(), start)
    }

    /// URLs to export: the selection resolved against the current list, or
    /// every image when nothing is selected
    pub fn export_targets(&self) -> ExportTargets {
        if self.selection.is_empty() {
            return ExportTargets {
                urls: self.images.iter().map(|i| i.url.clone()).collect(),
                selected_only: false,
            };
        }

        ExportTargets {
            urls: self
                .selection
                .resolve(&self.images)
                .into_iter()
                .map(|i| i.url.clone())
                .collect(),
            selected_only: true,
        }
    }

    /// Clear the selection after a selected export went through
    pub fn finish_export(&mut self, selected_only: bool) {
        if selected_only {
            self.selection.clear();
        }
    }

    /// Export the current targets; the selection survives a failed export
    pub async fn export(&mut self, exporter: &Exporter) -> Result<ExportArchive, ExportError> {
        let targets = self.export_targets();
        let archive = exporter.export(&targets.urls, targets.selected_only).await?;
        self.finish_export(targets.selected_only);
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockImageRepository;
    use crate::models::fixtures::image;
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            access_token: "tok".to_string(),
            email: None,
            expires_at: None,
        }
    }

    fn loaded_view(images: Vec<ImageRecord>) -> GalleryView {
        let mut repository = MockImageRepository::new();
        repository.expect_fetch().returning(move |_, _| Ok(images.clone()));
        GalleryView::new(Arc::new(repository), ImageQuery::default())
    }

    #[tokio::test]
    async fn test_refresh_replaces_list() {
        let mut view = loaded_view(vec![image("a", 2024, 3, 9, 8), image("b", 2024, 3, 8, 8)]);

        assert_eq!(view.refresh(&session()).await.unwrap(), 2);
        assert_eq!(view.groups(&Utc).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let mut repository = MockImageRepository::new();
        let mut calls = 0;
        repository.expect_fetch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(vec![image("a", 2024, 1, 1, 0)])
            } else {
                Err(FetchError::Query("timeout".to_string()))
            }
        });
        let mut view = GalleryView::new(Arc::new(repository), ImageQuery::default());

        view.refresh(&session()).await.unwrap();
        assert!(view.refresh(&session()).await.is_err());

        assert_eq!(view.images().len(), 1);
        assert_eq!(view.images()[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_export_targets_follow_selection() {
        let mut view = loaded_view(vec![image("a", 2024, 1, 1, 0), image("b", 2024, 1, 2, 0)]);
        view.refresh(&session()).await.unwrap();

        let all = view.export_targets();
        assert!(!all.selected_only);
        assert_eq!(all.urls.len(), 2);

        assert!(view.toggle(&ImageId::new("b")));
        view.toggle(&ImageId::new("stale"));
        let selected = view.export_targets();
        assert!(selected.selected_only);
        assert_eq!(selected.urls, vec!["https://cdn.example.com/images/b.jpg".to_string()]);

        view.finish_export(true);
        assert!(view.selection().is_empty());
    }

    #[tokio::test]
    async fn test_select_replaces_selection() {
        let mut view = loaded_view(vec![image("a", 2024, 1, 1, 0), image("b", 2024, 1, 2, 0)]);
        view.refresh(&session()).await.unwrap();
        view.toggle(&ImageId::new("a"));

        view.select(vec![ImageId::new("b"), ImageId::new("b")].into_iter().collect());

        assert_eq!(view.selection().len(), 1);
        assert!(!view.selection().contains(&ImageId::new("a")));
        let targets = view.export_targets();
        assert!(targets.selected_only);
        assert_eq!(targets.urls, vec!["https://cdn.example.com/images/b.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_viewer_opens_on_current_list() {
        let mut view = loaded_view(vec![image("a", 2024, 1, 1, 0), image("b", 2024, 1, 2, 0)]);
        assert_eq!(view.open_viewer(0).unwrap_err(), ViewerError::Empty);

        view.refresh(&session()).await.unwrap();
        assert_eq!(view.open_viewer(1).unwrap().position_label(), "2 / 2");
    }

    #[test]
    fn test_set_query_keeps_limit() {
        let mut view = GalleryView::new(
            Arc::new(MockImageRepository::new()),
            ImageQuery {
                limit: Some(50),
                ..Default::default()
            },
        );

        view.set_query(ImageFilter::own(), ImageSort::Location);

        assert_eq!(view.query().sort, ImageSort::Location);
        assert!(view.query().filter.owner_only);
        assert_eq!(view.query().limit, Some(50));
    }
}
