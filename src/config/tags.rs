//! Tag selection for path entries.
//!
//! With no requested tags, only untagged paths run. With tags, a path runs
//! when its tags intersect the requested ones. The tag `any` selects every
//! path.

/// Requesting this tag runs every path, tagged or not.
pub const ANY_TAG: &str = "any";

/// Whether a path carrying `path_tags` runs for the `requested` tags.
pub fn matches_tags(requested: &[String], path_tags: &[String]) -> bool {
    if requested.iter().any(|tag| tag == ANY_TAG) {
        return true;
    }
    if requested.is_empty() {
        return path_tags.is_empty();
    }
    path_tags.iter().any(|tag| requested.contains(tag))
}
