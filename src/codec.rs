//! Hostname codec.
//!
//! Encodes arbitrary backend identifiers (typically `host:port`) into strings
//! that are legal inside a DNS label, so a target can ride in the leading
//! subdomain of a gateway hostname and be recovered on the way back in.
//!
//! Characters in `[A-Za-z0-9_.-]` pass through untouched, which keeps common
//! `host:port` forms legible. Everything else becomes `.eNNN.` where `NNN` is
//! the decimal codepoint, zero-padded to at least three digits. The sentinel
//! is self-delimiting, so decoding needs no lookahead beyond the closing dot.

/// Encode a target identifier into a DNS-safe label fragment.
///
/// `encode("127.0.0.1:3000")` yields `"127.0.0.1.e058.3000"`.
pub fn encode(target_id: &str) -> String {
    let mut out = String::with_capacity(target_id.len());
    for ch in target_id.chars() {
        if is_label_safe(ch) {
            out.push(ch);
        } else {
            out.push_str(&format!(".e{:03}.", ch as u32));
        }
    }
    out
}

/// Decode a label fragment produced by [`encode`].
///
/// Sequences of the form `.e<digits>.` (three or more digits) are replaced by
/// the character with that decimal codepoint; everything else is copied
/// through verbatim.
pub fn decode(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut rest = label;
    while !rest.is_empty() {
        if let Some((ch, consumed)) = decode_escape(rest) {
            out.push(ch);
            rest = &rest[consumed..];
        } else {
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                out.push(ch);
            }
            rest = chars.as_str();
        }
    }
    out
}

fn is_label_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')
}

/// Try to read one `.e<digits>.` escape at the start of `s`.
/// Returns the decoded character and the byte length of the escape.
fn decode_escape(s: &str) -> Option<(char, usize)> {
    let digits = s.strip_prefix(".e")?;
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    // Fewer than three digits is never something encode() emits.
    if len < 3 || digits.as_bytes().get(len) != Some(&b'.') {
        return None;
    }
    let code: u32 = digits[..len].parse().ok()?;
    let ch = char::from_u32(code)?;
    Some((ch, 2 + len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_host_port() {
        assert_eq!(encode("127.0.0.1:3000"), "127.0.0.1.e058.3000");
    }

    #[test]
    fn test_safe_strings_pass_through() {
        for s in ["localhost", "my-backend_2.internal", "127.0.0.1", ""] {
            assert_eq!(encode(s), s);
            assert_eq!(decode(s), s);
        }
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "127.0.0.1:3000",
            "[::1]:8080",
            "user@host:22",
            "a b/c?d",
            "host:1:2:3",
        ] {
            assert_eq!(decode(&encode(s)), s);
        }
    }

    #[test]
    fn test_round_trip_wide_codepoints() {
        // Codepoints past 999 widen the sentinel instead of truncating.
        let s = "caf\u{e9}:80\u{20ac}";
        let encoded = encode(s);
        assert!(encoded.contains(".e233."));
        assert!(encoded.contains(".e8364."));
        assert_eq!(decode(&encoded), s);
    }

    #[test]
    fn test_short_digit_runs_are_literal() {
        // Two digits never form a sentinel, so the text survives decoding.
        assert_eq!(decode("a.e12.b"), "a.e12.b");
    }

    #[test]
    fn test_adjacent_escapes() {
        assert_eq!(encode("::"), ".e058..e058.");
        assert_eq!(decode(".e058..e058."), "::");
    }
}
