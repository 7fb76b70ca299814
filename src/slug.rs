//! Link-safe page identifiers for entity names.
//!
//! Renderers derive page names and anchors from model entity names with
//! [`slugify`]. The mapping is deterministic; distinct names may collide
//! (`"Sales Fact"` and `"sales_fact"` both give `sales-fact`), and resolving
//! collisions is left to the caller.

/// Lowercase `text` and replace spaces, underscores and both slash kinds
/// with `-`. Every other character is kept.
pub fn slugify(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            ' ' | '_' | '/' | '\\' => '-',
            other => other,
        })
        .collect()
}
