//! Feed resolution: turn an arbitrary web address into feed addresses.
//!
//! Resolution is a three-stage cascade that stops at the first stage with a
//! result:
//!
//! - **Direct**: the address itself is a feed ([`FeedClassifier`])
//! - **Harvest**: the page links to feeds ([`LinkHarvester`])
//! - **Search**: a search engine's top results are, or link to, feeds
//!   ([`SearchFallback`])
//!
//! # Architecture
//!
//! - [`fetcher`] - shared HTTP transport with deadlines and cancellation
//! - [`classifier`] - byte-prefix feed detection
//! - [`tokens`] - pull-based markup token stream
//! - [`harvester`] - in-page feed link collection
//! - [`search`] - search-engine fallback and result page parsing
//! - [`resolver`] - the cascade itself
//!
//! # Example
//!
//! ```no_run
//! use feedhound::config::Config;
//! use feedhound::feed::Resolver;
//!
//! # async fn run() -> Result<(), feedhound::feed::ResolveError> {
//! let resolver = Resolver::new(&Config::default())?;
//! for feed in resolver.resolve("example.com").await {
//!     println!("{feed}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
mod error;
pub mod fetcher;
pub mod harvester;
pub mod resolver;
pub mod search;
pub mod tokens;

pub use classifier::{FeedClassifier, FeedSniffer, XmlPrologSniffer};
pub use error::{ErrorKind, ResolveError};
pub use fetcher::Fetcher;
pub use harvester::{LinkHarvester, MAX_CANDIDATES};
pub use resolver::{Resolution, Resolver, Stage};
pub use search::{GoogleResultParser, ResultPageParser, SearchFallback, SearchResult};
pub use tokens::{Attr, HtmlTokenizer, Token, TokenSource};
