use super::error::ResolveError;
use super::fetcher::Fetcher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bodies shorter than this carry too little to classify.
pub const MIN_BODY_LEN: usize = 17;

/// Number of leading bytes handed to the sniffer.
pub const SNIFF_LEN: usize = 16;

/// Decides from the leading bytes of a body whether it is a feed document.
pub trait FeedSniffer: Send + Sync {
    fn is_feed(&self, prefix: &[u8]) -> bool;
}

/// Treats any document opening with an XML declaration as a feed.
///
/// This is a prologue check only: an XML sitemap passes just as an RSS
/// channel does.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlPrologSniffer;

impl XmlPrologSniffer {
    const MARKER: &'static [u8] = b"<?xml version";
}

impl FeedSniffer for XmlPrologSniffer {
    fn is_feed(&self, prefix: &[u8]) -> bool {
        prefix
            .windows(Self::MARKER.len())
            .any(|window| window == Self::MARKER)
    }
}

/// Fetches an address and sniffs its body.
#[derive(Clone)]
pub struct FeedClassifier {
    fetcher: Fetcher,
    sniffer: Arc<dyn FeedSniffer>,
}

impl FeedClassifier {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_sniffer(fetcher, Arc::new(XmlPrologSniffer))
    }

    pub fn with_sniffer(fetcher: Fetcher, sniffer: Arc<dyn FeedSniffer>) -> Self {
        Self { fetcher, sniffer }
    }

    /// Classifies the document at `url`, keeping the reason for a miss.
    ///
    /// # Errors
    ///
    /// Any transport failure from [`Fetcher::get`], or
    /// [`ResolveError::ShortBody`] when the body is under [`MIN_BODY_LEN`].
    pub async fn classify(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ResolveError> {
        let body = self.fetcher.get(url, cancel).await?;
        self.classify_body(&body)
    }

    /// Classifies an already fetched body.
    pub fn classify_body(&self, body: &[u8]) -> Result<bool, ResolveError> {
        if body.len() < MIN_BODY_LEN {
            return Err(ResolveError::ShortBody { len: body.len() });
        }
        Ok(self.sniffer.is_feed(&body[..SNIFF_LEN]))
    }

    /// Fail-closed form of [`classify`](Self::classify): every failure is `false`.
    pub async fn is_feed(&self, url: &str, cancel: &CancellationToken) -> bool {
        match self.classify(url, cancel).await {
            Ok(is_feed) => {
                tracing::debug!(url = %url, is_feed, "Classified address");
                is_feed
            }
            Err(e) => {
                tracing::debug!(url = %url, kind = ?e.kind(), error = %e, "Classification failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for FeedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClassifier")
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use proptest::prelude::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#;

    fn classifier() -> FeedClassifier {
        FeedClassifier::new(Fetcher::new(&Config::default()).unwrap())
    }

    // --- Body classification (no network) ---

    #[test]
    fn test_rss_body_is_feed() {
        assert!(classifier().classify_body(RSS.as_bytes()).unwrap());
    }

    #[test]
    fn test_html_body_is_not_feed() {
        let body = b"<html><head></head></html>";
        assert!(!classifier().classify_body(body).unwrap());
    }

    #[test]
    fn test_marker_past_prefix_is_not_feed() {
        // Leading whitespace pushes the declaration out of the sniffed prefix
        let body = format!("{}{}", " ".repeat(8), RSS);
        assert!(!classifier().classify_body(body.as_bytes()).unwrap());
    }

    #[test]
    fn test_non_feed_xml_still_classifies() {
        let body = br#"<?xml version="1.0"?><urlset></urlset>"#;
        assert!(classifier().classify_body(body).unwrap());
    }

    #[test]
    fn test_exactly_min_len_is_classified() {
        let body = b"<?xml version=\"1\"";
        assert_eq!(body.len(), MIN_BODY_LEN);
        assert!(classifier().classify_body(body).unwrap());
    }

    #[test]
    fn test_sixteen_bytes_is_short() {
        let body = b"<?xml version=\"1";
        assert_eq!(body.len(), 16);
        assert!(matches!(
            classifier().classify_body(body),
            Err(ResolveError::ShortBody { len: 16 })
        ));
    }

    proptest! {
        #[test]
        fn short_bodies_never_classify(body in proptest::collection::vec(any::<u8>(), 0..MIN_BODY_LEN)) {
            let is_short = matches!(
                classifier().classify_body(&body),
                Err(ResolveError::ShortBody { .. })
            );
            prop_assert!(is_short);
        }
    }

    #[test]
    fn test_custom_sniffer_is_used() {
        struct Always;
        impl FeedSniffer for Always {
            fn is_feed(&self, _prefix: &[u8]) -> bool {
                true
            }
        }
        let classifier = FeedClassifier::with_sniffer(
            Fetcher::new(&Config::default()).unwrap(),
            Arc::new(Always),
        );
        assert!(classifier
            .classify_body(b"<html><body>plain page</body></html>")
            .unwrap());
    }

    // --- Network ---

    #[tokio::test]
    async fn test_is_feed_over_http() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed.xml", mock_server.uri());
        assert!(classifier().is_feed(&url, &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_is_feed_fails_closed_on_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string(RSS))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed.xml", mock_server.uri());
        let cancel = CancellationToken::new();
        assert!(!classifier().is_feed(&url, &cancel).await);
        assert!(matches!(
            classifier().classify(&url, &cancel).await,
            Err(ResolveError::HttpStatus(500))
        ));
    }

    #[tokio::test]
    async fn test_is_feed_fails_closed_on_short_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<?xml"))
            .mount(&mock_server)
            .await;

        let cancel = CancellationToken::new();
        assert!(!classifier().is_feed(&mock_server.uri(), &cancel).await);
        let err = classifier()
            .classify(&mock_server.uri(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::feed::ErrorKind::ShortBody);
    }

    #[tokio::test]
    async fn test_is_feed_fails_closed_when_unreachable() {
        // Port 9 (discard) is essentially never listening on loopback
        let cancel = CancellationToken::new();
        assert!(!classifier().is_feed("http://127.0.0.1:9/feed", &cancel).await);
    }
}
