//! Output file naming.
//!
//! Video titles routinely contain characters that are invalid on Windows
//! (`?`, `|`, `:`), so every title is sanitized for all platforms.

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Longest stem kept, in bytes. File names are capped at 255 bytes, and the
/// longest suffix a job appends (`_video.m4s`) must still fit.
pub const MAX_STEM_BYTES: usize = 200;

/// Longest prefix of `s` within `max` bytes, cut on a char boundary.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Make `input` safe as a file name on every platform.
///
/// ```
/// use bili_dl::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("【4K】Q&A: why?"), "【4K】Q&A_ why_");
/// assert_eq!(sanitize_filename("  "), "unnamed");
/// assert_eq!(sanitize_filename("con"), "_con");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches([' ', '.']);
    let trimmed = truncate_bytes(trimmed, MAX_STEM_BYTES).trim_end_matches([' ', '.']);

    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.contains(&stem) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// `<sanitized title>.<ext>`.
pub fn suggested_file_name(title: &str, ext: &str) -> String {
    format!("{}.{}", sanitize_filename(title), ext.trim_start_matches('.'))
}
