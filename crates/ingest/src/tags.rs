//! Tag reconciliation: event labels merged with the agent's defaults.

use crate::TagSet;

/// Union of the event's own tags and the agent's default tags.
///
/// Absent lists count as empty. Duplicates collapse; order is not preserved.
pub fn reconcile(event_tags: Option<&[String]>, default_tags: Option<&[String]>) -> TagSet {
    event_tags
        .unwrap_or_default()
        .iter()
        .chain(default_tags.unwrap_or_default())
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn union_removes_duplicates() {
        let merged = reconcile(Some(&owned(&["a", "b"])), Some(&owned(&["b", "c"])));
        assert_eq!(merged.len(), 3);
        assert!(merged.contains("a") && merged.contains("b") && merged.contains("c"));
    }

    #[test]
    fn absent_lists_are_empty() {
        assert!(reconcile(None, None).is_empty());
        let only_defaults = reconcile(None, Some(&owned(&["env:prod"])));
        assert_eq!(only_defaults.iter().collect::<Vec<_>>(), vec!["env:prod"]);
    }

    #[test]
    fn duplicates_within_one_list_collapse() {
        let merged = reconcile(Some(&owned(&["x", "x", "x"])), None);
        assert_eq!(merged.len(), 1);
    }
}
