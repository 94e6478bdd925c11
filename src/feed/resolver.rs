use super::classifier::FeedClassifier;
use super::error::ResolveError;
use super::fetcher::Fetcher;
use super::harvester::LinkHarvester;
use super::search::SearchFallback;
use crate::config::Config;
use crate::util::{derive_keyword, normalize_address};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The cascade stage that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The address itself is a feed
    DirectHit,
    /// Feed links were found on the page
    HarvestHit,
    /// Feed links were found through the search engine
    FallbackHit,
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The address after scheme normalization
    pub address: String,
    pub stage: Stage,
    /// Feed addresses in discovery order; never empty
    pub feeds: Vec<String>,
}

/// Runs the three-stage cascade: direct check, page harvest, search fallback.
///
/// Each call is independent: no state is shared between resolutions apart
/// from the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct Resolver {
    classifier: FeedClassifier,
    harvester: LinkHarvester,
    search: SearchFallback,
    deadline: Duration,
}

impl Resolver {
    /// Builds a resolver and all of its stages from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ResolveError> {
        Ok(Self::with_fetcher(Fetcher::new(config)?, config))
    }

    /// Builds a resolver around an existing transport.
    pub fn with_fetcher(fetcher: Fetcher, config: &Config) -> Self {
        let classifier = FeedClassifier::new(fetcher.clone());
        let harvester = LinkHarvester::new(fetcher.clone(), classifier.clone());
        let search = SearchFallback::new(
            fetcher,
            classifier.clone(),
            harvester.clone(),
            config.search_endpoint.clone(),
        );
        Self::from_parts(
            classifier,
            harvester,
            search,
            Duration::from_secs(config.resolve_timeout_secs),
        )
    }

    /// Assembles a resolver from individually configured stages.
    pub fn from_parts(
        classifier: FeedClassifier,
        harvester: LinkHarvester,
        search: SearchFallback,
        deadline: Duration,
    ) -> Self {
        Self {
            classifier,
            harvester,
            search,
            deadline,
        }
    }

    /// Resolves `raw` to feed addresses, returning an empty vector on any
    /// failure.
    pub async fn resolve(&self, raw: &str) -> Vec<String> {
        match self.try_resolve(raw, &CancellationToken::new()).await {
            Ok(resolution) => resolution.feeds,
            Err(e) => {
                tracing::warn!(address = %raw, kind = ?e.kind(), error = %e, "No feed found");
                Vec::new()
            }
        }
    }

    /// Resolves `raw` to feed addresses, reporting why nothing was found.
    ///
    /// The whole cascade runs under the configured deadline and stops early
    /// when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Timeout`] - the deadline passed
    /// - [`ResolveError::Cancelled`] - `cancel` fired
    /// - [`ResolveError::NoKeyword`] - nothing found on the page and no
    ///   search keyword derivable from the address
    /// - the search stage's own failure, if it failed
    /// - [`ResolveError::NoCandidates`] - every stage came back empty
    pub async fn try_resolve(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let address = normalize_address(raw).into_owned();
        let cascade = self.cascade(&address, cancel);

        let (stage, feeds) = tokio::time::timeout(self.deadline, cascade)
            .await
            .map_err(|_| ResolveError::Timeout)??;

        tracing::info!(address = %address, stage = ?stage, found = feeds.len(), "Resolved feeds");
        Ok(Resolution {
            address,
            stage,
            feeds,
        })
    }

    async fn cascade(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<(Stage, Vec<String>), ResolveError> {
        match self.classifier.classify(address, cancel).await {
            Ok(true) => {
                tracing::info!(address = %address, "Address is already a feed");
                return Ok((Stage::DirectHit, vec![address.to_owned()]));
            }
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                tracing::debug!(address = %address, error = %e, "Direct classification failed");
            }
            Ok(false) => {}
        }

        match self.harvester.harvest(address, cancel).await {
            Ok(links) if !links.is_empty() => return Ok((Stage::HarvestHit, links)),
            Err(e) if e.is_abort() => return Err(e),
            Err(e) => {
                tracing::debug!(address = %address, error = %e, "Harvest failed");
            }
            Ok(_) => {}
        }

        let keyword = derive_keyword(address).ok_or(ResolveError::NoKeyword)?;
        tracing::debug!(address = %address, keyword = %keyword, "Falling back to search");

        let links = self.search.search(keyword, cancel).await?;
        if links.is_empty() {
            return Err(ResolveError::NoCandidates);
        }
        Ok((Stage::FallbackHit, links))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#;

    fn resolver_for(mock_server: &MockServer) -> Resolver {
        let config = Config {
            search_endpoint: format!("{}/search?q=", mock_server.uri()),
            ..Config::default()
        };
        Resolver::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_direct_hit_returns_normalized_address() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        // Strip the scheme so normalization has to put it back
        let bare = format!("{}/feed.xml", mock_server.uri())
            .trim_start_matches("http://")
            .to_string();
        let resolution = resolver_for(&mock_server)
            .try_resolve(&bare, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolution.stage, Stage::DirectHit);
        assert_eq!(resolution.address, format!("http://{bare}"));
        assert_eq!(resolution.feeds, vec![format!("http://{bare}")]);
    }

    #[tokio::test]
    async fn test_harvest_hit_skips_search() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><head><link type="application/rss+xml" href="/blog/feed"></head></html>"#),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blog/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let resolution = resolver_for(&mock_server)
            .try_resolve(&format!("{}/blog", mock_server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.stage, Stage::HarvestHit);
        assert_eq!(resolution.feeds, vec![format!("{}/blog/feed", mock_server.uri())]);
    }

    #[tokio::test]
    async fn test_exhausted_cascade_reports_no_candidates() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>home</body></html>"))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server);
        let err = resolver
            .try_resolve(&mock_server.uri(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCandidates);
        assert!(resolver.resolve(&mock_server.uri()).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_resolution() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(0)
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resolver_for(&mock_server)
            .try_resolve(&mock_server.uri(), &cancel)
            .await;
        assert!(matches!(result, Err(ResolveError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_is_enforced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let config = Config {
            search_endpoint: format!("{}/search?q=", mock_server.uri()),
            resolve_timeout_secs: 1,
            ..Config::default()
        };
        let result = Resolver::new(&config)
            .unwrap()
            .try_resolve(&mock_server.uri(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ResolveError::Timeout)));
    }
}
