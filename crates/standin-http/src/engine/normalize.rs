//! Text normalization for logged and compared request data.
//!
//! Client runtimes disagree on percent-encoding: some emit upper-case hex digits
//! (`%3A`), others lower-case (`%3a`), and some encode round brackets while others
//! leave them alone. Both the URL and the body pass through [`normalize_text`] so
//! those differences never show up in the request log.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static PERCENT_ENCODED: Lazy<Regex> = Lazy::new(|| {
    Regex::new("%[a-fA-F0-9]{2}").unwrap_or_else(|e| panic!("invalid built-in regex: {e}"))
});

/// Lower-case every `%XX` triplet, then decode `%28` and `%29` to `(` and `)`.
///
/// Idempotent: the output contains no upper-case triplets and no encoded brackets.
pub fn normalize_text(text: &str) -> String {
    let lowered: Cow<'_, str> =
        PERCENT_ENCODED.replace_all(text, |caps: &Captures<'_>| caps[0].to_ascii_lowercase());

    if !lowered.contains("%2") {
        return lowered.into_owned();
    }
    lowered.replace("%28", "(").replace("%29", ")")
}

/// Normalize a request path with its query string.
pub fn normalize_url(url: &str) -> String {
    normalize_text(url)
}

/// Decode a fully received body as UTF-8 text and normalize it.
///
/// Invalid sequences become U+FFFD; the body is decoded as a whole, never chunk by
/// chunk, so multi-byte characters split across reads survive.
pub fn normalize_content(body: &[u8]) -> String {
    normalize_text(&String::from_utf8_lossy(body))
}
