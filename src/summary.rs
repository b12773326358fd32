//! Human-readable notification text for an update check.

use crate::updates::{CategoryCounts, UpdateCheckResult};

pub const SUMMARY_PREFIX: &str = "New content: ";

/// Build the banner text, e.g. `"New content: 2 jobs, 1 event"`.
///
/// Returns `None` when there is nothing new to announce.
pub fn summarize(result: &UpdateCheckResult) -> Option<String> {
    summarize_counts(&result.categories, result.total_new)
}

pub fn summarize_counts(categories: &CategoryCounts, total_new: u64) -> Option<String> {
    let phrases: Vec<String> = categories
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(c, n)| format!("{n} {}", c.label(n)))
        .collect();

    if !phrases.is_empty() {
        return Some(format!("{SUMMARY_PREFIX}{}", phrases.join(", ")));
    }
    if total_new > 0 {
        let noun = if total_new > 1 { "items" } else { "item" };
        return Some(format!("{total_new} new {noun} available"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updates::Category;
    use chrono::{TimeZone, Utc};

    fn result(jobs: u64, learning: u64, events: u64, research: u64) -> UpdateCheckResult {
        UpdateCheckResult::new(
            CategoryCounts {
                jobs,
                learning,
                events,
                research,
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap(),
            None,
        )
    }

    #[test]
    fn mixed_categories_keep_display_order() {
        assert_eq!(
            summarize(&result(2, 0, 1, 0)).as_deref(),
            Some("New content: 2 jobs, 1 event")
        );
        assert_eq!(
            summarize(&result(0, 3, 0, 1)).as_deref(),
            Some("New content: 3 learning resources, 1 research paper")
        );
    }

    #[test]
    fn single_item_is_singular() {
        assert_eq!(summarize(&result(1, 0, 0, 0)).as_deref(), Some("New content: 1 job"));
    }

    #[test]
    fn nothing_new_has_no_summary() {
        assert_eq!(summarize(&result(0, 0, 0, 0)), None);
    }

    #[test]
    fn falls_back_to_total_when_no_category_phrase() {
        let empty = CategoryCounts::default();
        assert_eq!(
            summarize_counts(&empty, 4).as_deref(),
            Some("4 new items available")
        );
        assert_eq!(
            summarize_counts(&empty, 1).as_deref(),
            Some("1 new item available")
        );
        assert_eq!(Category::Events.label(1), "event");
    }
}
