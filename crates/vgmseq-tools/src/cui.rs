pub mod events;
pub mod info;
pub mod midi;
pub mod timeline;

use unicode_width::UnicodeWidthStr;

/// Pad a &str to a target display width (columns) using unicode-width, so
/// marker text with fullwidth characters keeps columns aligned.
pub(crate) fn pad_to_width(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}
