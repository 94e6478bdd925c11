//! String-level address handling for the resolution cascade.
//!
//! Normalization and keyword derivation are deliberately plain pattern
//! matches on the raw string rather than URL parsing: a bare host such as
//! `example.com` is not a URL until a scheme has been put in front of it.

use std::borrow::Cow;

/// Literal suffix appended to every search query.
const SEARCH_SUFFIX: &str = "+rss";

/// Prefixes `http://` unless the address already mentions a scheme.
///
/// The check is a substring match anywhere in the string, so
/// `"myapi.com/http://"` counts as already schemed.
///
/// # Examples
///
/// ```
/// use feedhound::util::normalize_address;
///
/// assert_eq!(normalize_address("example.com"), "http://example.com");
/// assert_eq!(normalize_address("https://example.com"), "https://example.com");
/// ```
pub fn normalize_address(raw: &str) -> Cow<'_, str> {
    if raw.contains("http://") || raw.contains("https://") {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("http://{raw}"))
    }
}

/// Derives a search keyword from a normalized address.
///
/// The address is split on `.`. A first segment of exactly `http://www` or
/// `https://www` yields the second segment; a first segment containing a
/// scheme yields that segment with the scheme prefix stripped. Anything else
/// (or an empty result) yields `None`.
///
/// # Examples
///
/// ```
/// use feedhound::util::derive_keyword;
///
/// assert_eq!(derive_keyword("http://www.nytimes.com"), Some("nytimes"));
/// assert_eq!(derive_keyword("https://blog.example.org"), Some("blog"));
/// assert_eq!(derive_keyword("ftp://files.example.org"), None);
/// ```
pub fn derive_keyword(address: &str) -> Option<&str> {
    let mut parts = address.split('.');
    let first = parts.next()?;

    let keyword = if first == "http://www" || first == "https://www" {
        parts.next()?
    } else if first.contains("https://") {
        first.strip_prefix("https://").unwrap_or(first)
    } else if first.contains("http://") {
        first.strip_prefix("http://").unwrap_or(first)
    } else {
        return None;
    };

    (!keyword.is_empty()).then_some(keyword)
}

/// Builds the search query address: endpoint, escaped keyword, `+rss`.
pub fn search_query_url(endpoint: &str, keyword: &str) -> String {
    let escaped: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    format!("{endpoint}{escaped}{SEARCH_SUFFIX}")
}

/// Resolves a potentially relative URL against a base URL.
pub fn resolve_url(href: &str, base_url: &str) -> String {
    // Already absolute
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    // Protocol-relative: inherit the base scheme, normalize through the parser
    if href.starts_with("//") {
        let scheme = url::Url::parse(base_url)
            .map(|base| base.scheme().to_owned())
            .unwrap_or_else(|_| "http".to_owned());
        if let Ok(parsed) = url::Url::parse(&format!("{scheme}:{href}")) {
            return parsed.to_string();
        }
    }

    // Relative URL: resolve against base
    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    // Fallback: return as-is
    href.to_owned()
}
