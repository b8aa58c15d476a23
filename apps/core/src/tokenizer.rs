use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, CONTROLS};

const STRIPPED_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// Splits an already fixed-up search string into tokens. Empty input yields
/// no tokens.
pub fn tokenize(search: &str) -> Vec<String> {
    search
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strips a leading scheme and `www.`, then unescapes the remainder the way
/// URLs are shown to users. Case is preserved.
pub fn fixup_search_text(text: &str) -> String {
    unescape_url(strip_prefix(text)).into_owned()
}

/// Removes one of `http://`, `https://`, `ftp://` and then a `www.` prefix.
pub fn strip_prefix(text: &str) -> &str {
    let mut rest = text;
    for scheme in STRIPPED_SCHEMES {
        if let Some(stripped) = rest.strip_prefix(scheme) {
            rest = stripped;
            break;
        }
    }
    rest.strip_prefix("www.").unwrap_or(rest)
}

/// Percent-decodes `input`. Control characters stay escaped, and the input
/// is returned unchanged when nothing is escaped or when the decoded bytes are
/// not valid UTF-8.
pub fn unescape_url(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    match percent_decode_str(input).decode_utf8() {
        Ok(decoded) => Cow::Owned(utf8_percent_encode(&decoded, CONTROLS).to_string()),
        Err(_) => Cow::Borrowed(input),
    }
}

#[cfg(test)]
mod tests {
    use super::{fixup_search_text, strip_prefix, tokenize, unescape_url};

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn repeated_spaces_do_not_create_empty_tokens() {
        assert_eq!(tokenize("foo  bar ^"), vec!["foo", "bar", "^"]);
    }

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(strip_prefix("https://www.mozilla.org/"), "mozilla.org/");
        assert_eq!(strip_prefix("ftp://files.example"), "files.example");
        assert_eq!(strip_prefix("www.example.com"), "example.com");
        assert_eq!(strip_prefix("javascript:void(0)"), "javascript:void(0)");
    }

    #[test]
    fn unescapes_utf8_sequences() {
        assert_eq!(unescape_url("caf%C3%A9%20menu"), "café menu");
        assert_eq!(unescape_url("100%"), "100%");
        assert_eq!(unescape_url("bad%FF"), "bad%FF");
        assert_eq!(unescape_url("tab%09char"), "tab%09char");
        assert_eq!(unescape_url("del%7f%2Fend"), "del%7F/end");
    }

    #[test]
    fn fixup_combines_strip_and_unescape() {
        assert_eq!(fixup_search_text("http://www.a.com/b%20c"), "a.com/b c");
    }
}
