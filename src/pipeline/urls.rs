//! URL extraction from free-text document content.
//!
//! The extractor is a lazy, restartable iterator over [`regex`] matches, in
//! first-occurrence order. Duplicate occurrences of the same URL each yield a
//! separate match: the merger generates one QR code per *occurrence*, not per
//! distinct URL. That is a deliberate design choice — the association between
//! a spot in the text and its QR code stays one-to-one even when an author
//! repeats a link.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `http`/`https` URLs with an optional `www.` prefix, a domain, and
/// an optional path/query. Case-insensitive on the scheme and host.
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)https?://(www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*",
    )
    .expect("URL regex is valid")
});

/// Iterate over every URL substring in `text`, in first-occurrence order.
///
/// Lazy: no allocation happens until the iterator is driven. Restartable:
/// calling this again on the same text yields the same sequence.
pub fn extract_urls(text: &str) -> impl Iterator<Item = &str> {
    URL_RE.find_iter(text).map(|m| m.as_str())
}
