//! HTML entity escaping.
//!
//! Both functions borrow their input when there is nothing to change.

use std::borrow::Cow;

const NAMED: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("colon", ':'),
    ("tab", '\t'),
    ("newline", '\n'),
];

/// Replace `& < > " '` with character references.
///
/// ```
/// assert_eq!(xss_guard::escape::escape(r#"<a title="x">"#), "&lt;a title=&quot;x&quot;&gt;");
/// ```
pub fn escape(s: &str) -> Cow<'_, str> {
    let Some(first) = s.find(|c: char| matches!(c, '&' | '<' | '>' | '"' | '\'')) else {
        return Cow::Borrowed(s);
    };
    let mut out = String::with_capacity(s.len() + 16);
    out.push_str(&s[..first]);
    for c in s[first..].chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Decode named and numeric character references.
///
/// Numeric references may omit the trailing `;`. References that are
/// unknown or not a valid code point are kept as written.
///
/// ```
/// use xss_guard::escape::unescape;
///
/// assert_eq!(unescape("&lt;b&gt; &#106;&#x61;va &bogus;"), "<b> java &bogus;");
/// ```
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        match reference(tail) {
            Some((c, len)) => {
                out.push(c);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode the reference at the start of `s` (which begins with `&`).
/// Returns the character and the number of bytes consumed.
fn reference(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];
    if let Some(number) = body.strip_prefix('#') {
        let (digits_start, radix) = match number.as_bytes().first() {
            Some(b'x' | b'X') => (1, 16),
            _ => (0, 10),
        };
        let digits: &str = {
            let candidates = &number[digits_start..];
            let end = candidates
                .find(|c: char| !c.is_digit(radix))
                .unwrap_or(candidates.len());
            &candidates[..end]
        };
        if digits.is_empty() {
            return None;
        }
        let c = u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)?;
        let mut len = 2 + digits_start + digits.len();
        if s[len..].starts_with(';') {
            len += 1;
        }
        return Some((c, len));
    }
    NAMED.iter().find_map(|&(name, c)| {
        body.strip_prefix(name)
            .filter(|after| after.starts_with(';'))
            .map(|_| (c, name.len() + 2))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_borrows_clean_input() {
        assert!(matches!(escape("plain text"), Cow::Borrowed(_)));
        assert!(matches!(unescape("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn escape_all_specials() {
        assert_eq!(escape(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&#39;f");
    }

    #[test]
    fn unescape_named_and_numeric() {
        assert_eq!(unescape("&amp;&lt;&gt;&quot;&apos;&#39;"), "&<>\"''");
        assert_eq!(unescape("&#106;&#X61;&#x76;a"), "java");
        assert_eq!(unescape("&#106avascript&colon;"), "javascript:");
    }

    #[test]
    fn unescape_keeps_unknown_references() {
        assert_eq!(unescape("&unknown; & &#; &#xZZ; &#1114112;"), "&unknown; & &#; &#xZZ; &#1114112;");
    }

    #[test]
    fn round_trip_non_ascii() {
        let s = "한국어 \"quote\" & 'single' <tag> &amp;";
        assert_eq!(unescape(&escape(s)), s);
    }
}
