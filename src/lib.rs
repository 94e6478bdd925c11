//! Finds the RSS feed behind a web address.
//!
//! See [`feed::Resolver`] for the entry point.

pub mod config;
pub mod feed;
pub mod util;
