//! Utility functions for address handling.
//!
//! # Examples
//!
//! ```
//! use feedhound::util::{derive_keyword, normalize_address, resolve_url};
//!
//! let address = normalize_address("www.example.com");
//! assert_eq!(address, "http://www.example.com");
//! assert_eq!(derive_keyword(&address), Some("example"));
//! assert_eq!(
//!     resolve_url("/feed.xml", "http://www.example.com/blog"),
//!     "http://www.example.com/feed.xml"
//! );
//! ```

mod address;

pub use address::{derive_keyword, normalize_address, resolve_url, search_query_url};
