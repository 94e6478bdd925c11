use super::classifier::FeedClassifier;
use super::error::ResolveError;
use super::fetcher::Fetcher;
use super::tokens::{Attr, HtmlTokenizer, Token, TokenSource};
use crate::util::resolve_url;
use tokio_util::sync::CancellationToken;

/// Upper bound on the number of feed links collected from one page.
pub const MAX_CANDIDATES: usize = 20;

const FEED_TYPE: &str = "application/rss+xml";

/// Scans a page's markup for links that look like feeds and keeps the ones
/// that classify as feeds.
#[derive(Debug, Clone)]
pub struct LinkHarvester {
    fetcher: Fetcher,
    classifier: FeedClassifier,
}

impl LinkHarvester {
    pub fn new(fetcher: Fetcher, classifier: FeedClassifier) -> Self {
        Self {
            fetcher,
            classifier,
        }
    }

    /// Fetches `url` and harvests feed links from it.
    ///
    /// # Errors
    ///
    /// Any transport failure fetching the page itself, or
    /// [`ResolveError::Cancelled`] if cancellation fires while candidate links
    /// are being checked.
    pub async fn harvest(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolveError> {
        let body = self.fetcher.get(url, cancel).await?;
        let mut tokens = HtmlTokenizer::new(&body);
        self.harvest_tokens(&mut tokens, url, cancel).await
    }

    /// Harvests feed links from an arbitrary token stream.
    ///
    /// Relative links are resolved against `base_url` before classification,
    /// so every returned candidate is an absolute address. At most
    /// [`MAX_CANDIDATES`] links are returned, in markup order.
    pub async fn harvest_tokens<T: TokenSource>(
        &self,
        tokens: &mut T,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolveError> {
        let mut links = Vec::new();

        loop {
            let attrs = match tokens.next_token() {
                Token::StartTag { attrs, .. } => attrs,
                Token::EndOfStream => break,
                Token::Error(e) => {
                    tracing::debug!(url = %base_url, error = %e, "Markup scan stopped early");
                    break;
                }
                Token::EndTag { .. } | Token::Text => continue,
            };

            let has_feed_type = attrs
                .iter()
                .any(|attr| attr.key == "type" && attr.value == FEED_TYPE);

            for attr in &attrs {
                // Guard runs per attribute, ahead of acceptance
                if links.len() >= MAX_CANDIDATES {
                    return Ok(links);
                }

                if !is_candidate_href(attr, has_feed_type) {
                    continue;
                }

                let candidate = resolve_url(&attr.value, base_url);
                match self.classifier.classify(&candidate, cancel).await {
                    Ok(true) => links.push(candidate),
                    Ok(false) => {
                        tracing::debug!(url = %candidate, "Candidate link is not a feed");
                    }
                    Err(e) if e.is_abort() => return Err(e),
                    Err(e) => {
                        tracing::debug!(url = %candidate, error = %e, "Candidate link check failed");
                    }
                }
            }
        }

        Ok(links)
    }
}

/// An `href` qualifies when its tag declares the RSS type or the link itself
/// mentions `rss` (case-sensitive).
fn is_candidate_href(attr: &Attr, has_feed_type: bool) -> bool {
    attr.key == "href" && (has_feed_type || attr.value.contains("rss"))
}
