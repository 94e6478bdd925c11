use super::classifier::FeedClassifier;
use super::error::ResolveError;
use super::fetcher::Fetcher;
use super::harvester::LinkHarvester;
use super::tokens::{HtmlTokenizer, Token, TokenSource};
use crate::util::search_query_url;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Number of top-ranked results probed before giving up.
pub const PROBE_DEPTH: usize = 3;

/// One organic result from a search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Zero-based position on the page
    pub rank: usize,
    pub url: String,
}

/// Turns a search result page into ranked results.
///
/// Implementations must return `Ok(vec![])` for a page with no results.
pub trait ResultPageParser: Send + Sync {
    fn parse(&self, body: &[u8], page_url: &str) -> Result<Vec<SearchResult>, ResolveError>;
}

/// Extracts organic results from a Google result page.
///
/// Result anchors come in two shapes: redirect links
/// (`/url?q=<target>&sa=...`) on the basic HTML page, and direct absolute
/// links on the full page. Direct links into the search engine's own domain,
/// subdomains included, are navigation, not results.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleResultParser;

impl GoogleResultParser {
    fn result_target(href: &str, page: Option<&Url>) -> Option<String> {
        if href.starts_with("/url?") {
            let redirect = match page {
                Some(page) => page.join(href).ok()?,
                None => Url::parse(&format!("https://www.google.com{href}")).ok()?,
            };
            return redirect
                .query_pairs()
                .find(|(key, _)| key == "q" || key == "url")
                .map(|(_, target)| target.into_owned())
                .filter(|target| target.starts_with("http://") || target.starts_with("https://"));
        }

        is_organic(href, &engine_domain(page)).then(|| href.to_owned())
    }
}

/// The engine's domain without a leading `www.`, e.g. `google.com`.
fn engine_domain(page: Option<&Url>) -> String {
    let host = page.and_then(Url::host_str).unwrap_or("www.google.com");
    host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase()
}

/// An absolute http(s) link whose host is not the engine or one of its
/// subdomains.
fn is_organic(target: &str, engine: &str) -> bool {
    if !target.starts_with("http://") && !target.starts_with("https://") {
        return false;
    }
    let Some(host) = Url::parse(target).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    host != engine && !host.ends_with(&format!(".{engine}"))
}

impl ResultPageParser for GoogleResultParser {
    fn parse(&self, body: &[u8], page_url: &str) -> Result<Vec<SearchResult>, ResolveError> {
        let page = Url::parse(page_url).ok();
        let mut tokens = HtmlTokenizer::new(body);
        let mut urls: Vec<String> = Vec::new();

        loop {
            match tokens.next_token() {
                Token::StartTag { name, attrs } if name == "a" => {
                    let Some(href) = attrs.iter().find(|attr| attr.key == "href") else {
                        continue;
                    };
                    if let Some(target) = Self::result_target(&href.value, page.as_ref()) {
                        if !urls.contains(&target) {
                            urls.push(target);
                        }
                    }
                }
                Token::EndOfStream => break,
                Token::Error(e) if urls.is_empty() => {
                    return Err(ResolveError::Parse(e));
                }
                Token::Error(e) => {
                    tracing::debug!(error = %e, found = urls.len(), "Result page scan stopped early");
                    break;
                }
                _ => {}
            }
        }

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(rank, url)| SearchResult { rank, url })
            .collect())
    }
}

/// Last stage of the cascade: ask a search engine and probe its top results.
#[derive(Clone)]
pub struct SearchFallback {
    fetcher: Fetcher,
    classifier: FeedClassifier,
    harvester: LinkHarvester,
    parser: Arc<dyn ResultPageParser>,
    endpoint: String,
}

impl SearchFallback {
    pub fn new(
        fetcher: Fetcher,
        classifier: FeedClassifier,
        harvester: LinkHarvester,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            harvester,
            parser: Arc::new(GoogleResultParser),
            endpoint: endpoint.into(),
        }
    }

    /// Replaces the result page parser.
    pub fn with_parser(mut self, parser: Arc<dyn ResultPageParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Searches for `<keyword> rss` and probes the top [`PROBE_DEPTH`] results.
    ///
    /// The first result that is itself a feed wins outright; otherwise the
    /// first result whose page yields harvested links wins with all of them.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::NoKeyword`] - `keyword` is empty
    /// - transport failures fetching the result page
    /// - [`ResolveError::Parse`] - the result page could not be parsed
    /// - [`ResolveError::Cancelled`] - cancellation while probing
    pub async fn search(
        &self,
        keyword: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolveError> {
        if keyword.is_empty() {
            return Err(ResolveError::NoKeyword);
        }

        let query = search_query_url(&self.endpoint, keyword);
        let body = self.fetcher.get(&query, cancel).await?;
        let results = self.parser.parse(&body, &query)?;

        if results.is_empty() {
            tracing::info!(keyword = %keyword, query = %query, "Search returned no results");
            return Ok(Vec::new());
        }

        for result in results.iter().take(PROBE_DEPTH) {
            tracing::debug!(rank = result.rank, url = %result.url, "Probing search result");

            match self.classifier.classify(&result.url, cancel).await {
                Ok(true) => return Ok(vec![result.url.clone()]),
                Err(e) if e.is_abort() => return Err(e),
                _ => {}
            }

            match self.harvester.harvest(&result.url, cancel).await {
                Ok(links) if !links.is_empty() => return Ok(links),
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    tracing::debug!(url = %result.url, error = %e, "Could not harvest search result");
                }
                Ok(_) => {}
            }
        }

        Ok(Vec::new())
    }
}

impl std::fmt::Debug for SearchFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchFallback")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
