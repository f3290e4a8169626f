//! RFC 3986 percent-encoding for path, query and form values

use url::form_urlencoded::byte_serialize;

/// Percent-encode a value using RFC 3986 unreserved characters.
///
/// Spaces become `%20`, `*` becomes `%2A` and `~` stays literal. Characters in
/// `skip` are left as they are, which keeps `/` readable in object keys.
/// Input that is already fully percent-encoded is returned unchanged.
pub fn url_encode(value: &str, skip: &[char]) -> String {
    if is_url_encoded(value, skip) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut segment = String::new();
    for ch in value.chars() {
        if skip.contains(&ch) {
            encode_segment(&segment, &mut out);
            segment.clear();
            out.push(ch);
        } else {
            segment.push(ch);
        }
    }
    encode_segment(&segment, &mut out);
    out
}

fn encode_segment(segment: &str, out: &mut String) {
    // Unchanged runs come out as one chunk and may contain `*`.
    for part in byte_serialize(segment.as_bytes()) {
        match part {
            "+" => out.push_str("%20"),
            "%7E" => out.push('~'),
            other => out.push_str(&other.replace('*', "%2A")),
        }
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// True when the value contains at least one escape and nothing that would
/// need encoding.
fn is_url_encoded(value: &str, skip: &[char]) -> bool {
    let bytes = value.as_bytes();
    let mut escapes = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return false;
            }
            escapes += 1;
            i += 3;
            continue;
        }
        if !is_unreserved(b) && !(b.is_ascii() && skip.contains(&(b as char))) {
            return false;
        }
        i += 1;
    }
    escapes > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ami-12345678", "ami-12345678")]
    #[case("hello world", "hello%20world")]
    #[case("a*b", "a%2Ab")]
    #[case("tilde~ok", "tilde~ok")]
    #[case("a+b", "a%2Bb")]
    #[case("key=value&x", "key%3Dvalue%26x")]
    #[case("caf\u{e9}", "caf%C3%A9")]
    #[case("", "")]
    fn test_url_encode(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(url_encode(input, &[]), expected);
    }

    #[test]
    fn test_skip_set_is_left_alone() {
        assert_eq!(url_encode("photos/2011 june/a.jpg", &['/']), "photos/2011%20june/a.jpg");
        assert_eq!(url_encode("photos/a.jpg", &[]), "photos%2Fa.jpg");
    }

    #[test]
    fn test_already_encoded_is_not_double_encoded() {
        assert_eq!(url_encode("hello%20world", &[]), "hello%20world");
        assert_eq!(url_encode("a%2Fb/c", &['/']), "a%2Fb/c");
    }

    #[test]
    fn test_partially_encoded_is_encoded() {
        // The space means this was never fully encoded.
        assert_eq!(url_encode("100% sure", &[]), "100%25%20sure");
        assert_eq!(url_encode("50%", &[]), "50%25");
    }
}
