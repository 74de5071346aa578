//! Checked-image tracking for bulk actions.

use crate::models::{ImageId, ImageRecord};
use std::collections::HashSet;

/// Set of image identifiers the user has checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: HashSet<ImageId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// New set with `id` removed if present, inserted otherwise
    pub fn toggled(&self, id: &ImageId) -> Self {
        let mut next = self.clone();
        next.toggle(id);
        next
    }

    /// Toggle `id` in place, returning whether it is now selected
    pub fn toggle(&mut self, id: &ImageId) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Selected images among `images`, in list order.
    ///
    /// Identifiers with no matching image (left over from an earlier fetch)
    /// are ignored.
    pub fn resolve<'a>(&self, images: &'a [ImageRecord]) -> Vec<&'a ImageRecord> {
        images.iter().filter(|image| self.contains(&image.id)).collect()
    }
}

impl FromIterator<ImageId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = ImageId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::image;

    #[test]
    fn test_toggle_twice_is_identity() {
        let original: SelectionSet = vec![ImageId::new("a")].into_iter().collect();
        let id = ImageId::new("b");

        let once = original.toggled(&id);
        assert!(once.contains(&id));
        assert_eq!(once.len(), 2);

        assert_eq!(once.toggled(&id), original);
    }

    #[test]
    fn test_toggle_reports_state() {
        let mut selection = SelectionSet::new();
        let id = ImageId::new("a");

        assert!(selection.toggle(&id));
        assert!(!selection.toggle(&id));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_stale_ids_are_inert() {
        let images = vec![image("a", 2024, 1, 1, 0), image("b", 2024, 1, 2, 0)];
        let selection = SelectionSet::new()
            .toggled(&ImageId::new("gone"))
            .toggled(&ImageId::new("b"));

        let resolved = selection.resolve(&images);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id.as_str(), "b");
    }
}
