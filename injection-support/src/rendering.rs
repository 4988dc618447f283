//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to shorten type names of lazily built values and
//! listeners, and to render lists of listener failures.

/// Shortens a fully qualified type name for display.
///
/// ```
/// use injection_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("std::collections::hash::map::HashMap<alloc::string::String, u32>");
/// assert_eq!(short, "HashMap<String, u32>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Renders a list of entries as an indented bullet list, one per line.
///
/// ```
/// use injection_support::rendering::render_list;
///
/// let rendered = render_list(&["AuditListener: disk full", "Mailer: timeout"]);
/// assert_eq!(rendered, "\n    - AuditListener: disk full\n    - Mailer: timeout");
/// ```
pub fn render_list(entries: &[impl AsRef<str>]) -> String {
    entries
        .iter()
        .map(|entry| format!("\n    - {}", entry.as_ref()))
        .collect()
}

/// Pluralizes `noun` for `count` items ("1 listener", "3 listeners").
pub fn count_noun(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
