// src/utils/html.rs

use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Form text is rendered into responder and results screens, so tags like
/// <script> or <iframe> and attributes like onclick are stripped while
/// harmless markup (<b>, <p>) survives. Plain text passes through unchanged
/// except for HTML entity escaping of `<`, `>` and `&`.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
