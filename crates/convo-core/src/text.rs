//! UTF-8-safe string helpers.

/// Truncate `s` to at most `max_bytes` bytes without splitting a character.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate `s` and append `suffix` if the original exceeds `max_bytes`.
///
/// The result is at most `max_bytes` bytes long, suffix included.
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let budget = max_bytes.saturating_sub(suffix.len());
    format!("{}{suffix}", truncate_str(s, budget))
}

/// Decode literal `\uXXXX` escape sequences left in tool output.
///
/// Some tools double-encode their output, so text such as `caf\u00e9`
/// arrives with the escape spelled out. Surrogate pairs are combined.
/// Sequences that do not form a valid scalar value are kept verbatim.
pub fn decode_unicode_escapes(s: &str) -> String {
    if !s.contains("\\u") {
        return s.to_owned();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match parse_hex4(after) {
            Some(high @ 0xD800..=0xDBFF) => {
                let low = after
                    .get(4..)
                    .and_then(|tail| tail.strip_prefix("\\u"))
                    .and_then(parse_hex4)
                    .filter(|low| (0xDC00..=0xDFFF).contains(low));
                if let Some(low) = low {
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    if let Some(c) = char::from_u32(combined) {
                        out.push(c);
                        rest = &after[10..];
                        continue;
                    }
                }
                out.push_str("\\u");
                rest = after;
            }
            Some(code) => {
                if let Some(c) = char::from_u32(code) {
                    out.push(c);
                    rest = &after[4..];
                } else {
                    out.push_str("\\u");
                    rest = after;
                }
            }
            None => {
                out.push_str("\\u");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_hex4(s: &str) -> Option<u32> {
    let digits = s.get(..4)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_str("aé", 2), "a");
    }

    #[test]
    fn truncate_with_suffix_fits_budget() {
        assert_eq!(truncate_with_suffix("hello", 10, "..."), "hello");
        assert_eq!(truncate_with_suffix("hello world", 8, "..."), "hello...");
    }

    #[test]
    fn decode_plain_text_untouched() {
        assert_eq!(decode_unicode_escapes("no escapes here"), "no escapes here");
    }

    #[test]
    fn decode_bmp_escape() {
        assert_eq!(decode_unicode_escapes("caf\\u00e9"), "café");
    }

    #[test]
    fn decode_surrogate_pair() {
        assert_eq!(decode_unicode_escapes("\\ud83d\\ude00!"), "😀!");
    }

    #[test]
    fn decode_lone_surrogate_kept() {
        assert_eq!(decode_unicode_escapes("x\\ud83dy"), "x\\ud83dy");
    }

    #[test]
    fn decode_short_sequence_kept() {
        assert_eq!(decode_unicode_escapes("tail \\u12"), "tail \\u12");
        assert_eq!(decode_unicode_escapes("\\uzzzz"), "\\uzzzz");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn truncate_never_exceeds_budget(s in "\\PC{0,40}", max in 0usize..60) {
                prop_assert!(truncate_str(&s, max).len() <= max);
            }

            #[test]
            fn decode_is_identity_without_backslash(s in "[^\\\\]{0,40}") {
                prop_assert_eq!(decode_unicode_escapes(&s), s);
            }
        }
    }
}
