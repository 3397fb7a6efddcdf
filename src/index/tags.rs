//! Global tag views and edits over a record collection

use crate::model::{normalize_tags, Conversation};
use std::collections::BTreeMap;

/// Sorted unique tags across `records`
pub fn all_tags(records: &[Conversation]) -> Vec<String> {
    tag_counts(records).into_keys().collect()
}

/// Number of records carrying each tag, ordered by tag
pub fn tag_counts(records: &[Conversation]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        for tag in &record.tags {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Renames `old` to `new` in every record
///
/// A record that already carries `new` simply loses `old`. Returns the number
/// of records changed.
///
/// # Examples
///
/// ```
/// use agregllm::index::rename_tag;
/// use agregllm::model::Conversation;
///
/// let mut a = Conversation::new("https://a", "A", "Claude");
/// a.tags = vec!["js".into(), "web".into(), "javascript".into()];
/// let mut records = vec![a];
///
/// assert_eq!(rename_tag(&mut records, "js", "JavaScript"), 1);
/// assert_eq!(records[0].tags, vec!["javascript", "web"]);
/// ```
pub fn rename_tag(records: &mut [Conversation], old: &str, new: &str) -> usize {
    let old = old.trim().to_lowercase();
    let new = new.trim().to_lowercase();
    if old == new || new.is_empty() {
        return 0;
    }

    let mut changed = 0;
    for record in records.iter_mut() {
        if !record.tags.contains(&old) {
            continue;
        }
        let renamed = record
            .tags
            .iter()
            .map(|tag| if *tag == old { new.clone() } else { tag.clone() });
        record.tags = normalize_tags(renamed);
        changed += 1;
    }
    changed
}

/// Removes `tag` from every record, returning the number of records changed
pub fn delete_tag(records: &mut [Conversation], tag: &str) -> usize {
    let tag = tag.trim().to_lowercase();
    let mut changed = 0;
    for record in records.iter_mut() {
        let before = record.tags.len();
        record.tags.retain(|t| *t != tag);
        if record.tags.len() != before {
            changed += 1;
        }
    }
    changed
}
