//! Tag extraction utilities for entity tag lists
//!
//! Tags are ordered string tuples: `["e", "<id>", "<relay>", "<marker>"]`.

/// Extract a single string value from a tag by name.
/// Returns the first occurrence if multiple tags exist.
pub fn extract_tag_str<'a>(tags: &'a [Vec<String>], tag_name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.first().map(String::as_str) == Some(tag_name))
        .and_then(|tag| tag.get(1))
        .map(String::as_str)
}

/// Extract all string values for a given tag name.
/// Useful for tags that appear multiple times (e.g., "p", "t", "e").
pub fn extract_all_tag_values(tags: &[Vec<String>], tag_name: &str) -> Vec<String> {
    tags.iter()
        .filter(|tag| tag.first().map(String::as_str) == Some(tag_name))
        .filter_map(|tag| tag.get(1).cloned())
        .collect()
}

/// Find the `e` tag carrying a NIP-10 marker ("root", "reply", "mention").
/// The marker sits at index 3; some clients omit the relay and put it at index 2.
pub fn find_marked_event(tags: &[Vec<String>], marker: &str) -> Option<String> {
    tags.iter()
        .filter(|tag| tag.first().map(String::as_str) == Some("e"))
        .find(|tag| {
            tag.get(3).map(String::as_str) == Some(marker)
                || tag.get(2).map(String::as_str) == Some(marker)
        })
        .and_then(|tag| tag.get(1).cloned())
}

/// `e` tag values that are not mentions, in tag order.
pub fn thread_event_refs(tags: &[Vec<String>]) -> Vec<String> {
    tags.iter()
        .filter(|tag| tag.first().map(String::as_str) == Some("e"))
        .filter(|tag| {
            tag.get(3).map(String::as_str) != Some("mention")
                && tag.get(2).map(String::as_str) != Some("mention")
        })
        .filter_map(|tag| tag.get(1).cloned())
        .collect()
}
