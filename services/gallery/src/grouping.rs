//! Date grouping for the photo grid.

use crate::models::ImageRecord;
use chrono::{NaiveDate, TimeZone};
use serde::Serialize;
use std::fmt::Display;

/// Label format of a group, e.g. "March 9, 2024"
pub const GROUP_LABEL_FORMAT: &str = "%B %-d, %Y";

/// Calendar-date bucket of images
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGroup {
    pub label: String,
    pub date: NaiveDate,
    pub images: Vec<ImageRecord>,
}

/// Partition images into groups by local calendar date, most recent first.
///
/// Images are stable-sorted by creation time descending, so groups are
/// contiguous and images keep their input order on equal timestamps.
/// Lookup is linear in the number of groups seen so far.
pub fn group_by_date<Tz>(images: &[ImageRecord], tz: &Tz) -> Vec<DateGroup>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut sorted: Vec<&ImageRecord> = images.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut groups: Vec<DateGroup> = Vec::new();
    for image in sorted {
        let local = image.created_at.with_timezone(tz);
        let label = local.format(GROUP_LABEL_FORMAT).to_string();

        match groups.iter_mut().find(|g| g.label == label) {
            Some(group) => group.images.push(image.clone()),
            None => groups.push(DateGroup {
                label,
                date: local.date_naive(),
                images: vec![image.clone()],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::image;
    use chrono::{FixedOffset, Utc};

    fn ids(group: &DateGroup) -> Vec<&str> {
        group.images.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(group_by_date(&[], &Utc).is_empty());
    }

    #[test]
    fn test_two_dates_two_groups_newest_first() {
        let images = vec![
            image("old", 2024, 3, 8, 9),
            image("new-am", 2024, 3, 9, 8),
            image("new-pm", 2024, 3, 9, 20),
        ];

        let groups = group_by_date(&images, &Utc);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "March 9, 2024");
        assert_eq!(ids(&groups[0]), vec!["new-pm", "new-am"]);
        assert_eq!(groups[1].label, "March 8, 2024");
        assert_eq!(ids(&groups[1]), vec!["old"]);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let images = vec![
            image("b", 2024, 1, 2, 10),
            image("a", 2024, 1, 2, 10),
            image("c", 2024, 1, 2, 10),
        ];

        let groups = group_by_date(&images, &Utc);

        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_labels_use_caller_timezone() {
        // 23:00 UTC on Jan 1 is already Jan 2 at UTC+2
        let images = vec![image("late", 2024, 1, 1, 23), image("early", 2024, 1, 1, 1)];
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        let groups = group_by_date(&images, &plus_two);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "January 2, 2024");
        assert_eq!(groups[1].label, "January 1, 2024");
        assert_eq!(groups[1].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_groups_cover_input_without_overlap() {
        let images = vec![
            image("1", 2023, 12, 31, 12),
            image("2", 2024, 2, 1, 12),
            image("3", 2024, 2, 1, 13),
            image("4", 2023, 12, 31, 11),
            image("5", 2024, 1, 15, 0),
        ];

        let groups = group_by_date(&images, &Utc);

        let mut seen: Vec<&str> = groups.iter().flat_map(|g| ids(g)).collect();
        assert_eq!(seen.len(), images.len());
        seen.sort();
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);

        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["February 1, 2024", "January 15, 2024", "December 31, 2023"]);

        for pair in groups.windows(2) {
            assert!(pair[0].date > pair[1].date);
        }
        for group in &groups {
            for pair in group.images.windows(2) {
                assert!(pair[0].created_at >= pair[1].created_at);
            }
        }
    }
}
