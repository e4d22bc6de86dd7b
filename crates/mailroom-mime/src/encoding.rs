//! Wire encoding helpers.
//!
//! Word wrapping for body parts, Base64 for binary attachments, and the
//! RFC 2822 date format.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Local, TimeZone};

/// Default wrap width for body parts.
pub const WRAP_WIDTH: usize = 70;

/// Line length for Base64 encoded content.
const BASE64_LINE_LENGTH: usize = 76;

/// Wraps text at `width` columns.
///
/// Lines are broken at the last space that fits, the space itself is
/// dropped. Words longer than `width` are cut. Existing line breaks are
/// kept and restart the column count.
#[must_use]
pub fn wordwrap(text: &str, width: usize) -> String {
    if width == 0 || text.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len() + text.len() / width);
    let mut last_start = 0;
    let mut last_space = 0;

    for current in 0..chars.len() {
        if chars[current] == '\n' {
            result.extend(&chars[last_start..=current]);
            last_start = current + 1;
            last_space = current + 1;
        } else if chars[current] == ' ' {
            if current - last_start >= width {
                result.extend(&chars[last_start..current]);
                result.push('\n');
                last_start = current + 1;
            }
            last_space = current;
        } else if current - last_start >= width && last_start >= last_space {
            result.extend(&chars[last_start..current]);
            result.push('\n');
            last_start = current;
            last_space = current;
        } else if current - last_start >= width && last_start < last_space {
            result.extend(&chars[last_start..last_space]);
            result.push('\n');
            last_start = last_space + 1;
            last_space = last_start;
        }
    }

    if last_start < chars.len() {
        result.extend(&chars[last_start..]);
    }
    result
}

/// Encodes data as Base64, split into 76 column lines.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE_LENGTH)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats a Unix timestamp as an RFC 2822 date in local time.
///
/// Returns `None` if the timestamp is out of range.
#[must_use]
pub fn rfc2822_date(timestamp: i64) -> Option<String> {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|date| date.to_rfc2822())
}

/// Formats a Unix timestamp in local time with a `strftime` pattern.
#[must_use]
pub fn local_date(timestamp: i64, pattern: &str) -> Option<String> {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|date| date.format(pattern).to_string())
}

/// Splits text into chunks of at most `size` characters.
///
/// An empty text gives a single empty chunk.
#[must_use]
pub fn chunks(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() || size == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|chunk| chunk.iter().collect()).collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wordwrap_breaks_on_space() {
        assert_eq!(wordwrap("The quick brown fox", 10), "The quick\nbrown fox");
        assert_eq!(wordwrap("short", 70), "short");
        assert_eq!(wordwrap("", 70), "");
    }

    #[test]
    fn test_wordwrap_cuts_long_words() {
        assert_eq!(wordwrap("abcdefghij", 4), "abcd\nefgh\nij");
        assert_eq!(wordwrap("a verylongword", 4), "a\nvery\nlong\nword");
    }

    #[test]
    fn test_wordwrap_keeps_line_breaks() {
        assert_eq!(wordwrap("one two\nthree four", 7), "one two\nthree\nfour");
    }

    #[test]
    fn test_wordwrap_exact_width() {
        let line = "a".repeat(70);
        assert_eq!(wordwrap(&line, 70), line);
        let text = format!("{line} b");
        assert_eq!(wordwrap(&text, 70), format!("{line}\nb"));
    }

    #[test]
    fn test_base64_lines() {
        assert_eq!(encode_base64_lines(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
        let encoded = encode_base64_lines(&[0u8; 120]);
        let lines: Vec<_> = encoded.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 76);
    }

    #[test]
    fn test_rfc2822_date() {
        let date = rfc2822_date(0).unwrap();
        assert!(date.contains("1970") || date.contains("1969"));
        assert!(date.contains(':'));
        assert!(rfc2822_date(i64::MAX).is_none());
    }

    #[test]
    fn test_local_date() {
        let formatted = local_date(86_400 * 365, "%Y").unwrap();
        assert_eq!(formatted.len(), 4);
    }

    #[test]
    fn test_chunks() {
        assert_eq!(chunks("abcdefgh", 3), ["abc", "def", "gh"]);
        assert_eq!(chunks("", 3), [""]);
        assert_eq!(chunks("héllo", 2), ["hé", "ll", "o"]);
    }

    proptest! {
        #[test]
        fn wrapped_lines_fit(text in "[a-z ]{0,300}", width in 1usize..80) {
            let wrapped = wordwrap(&text, width);
            for line in wrapped.split('\n') {
                prop_assert!(line.chars().count() <= width, "{line:?} exceeds {width}");
            }
        }

        #[test]
        fn wrapping_keeps_words(text in "[a-z]{1,10}( [a-z]{1,10}){0,30}") {
            let wrapped = wordwrap(&text, 20);
            let original: Vec<_> = text.split(' ').collect();
            let rewrapped: Vec<_> = wrapped.split(['\n', ' ']).collect();
            prop_assert_eq!(original, rewrapped);
        }
    }
}
