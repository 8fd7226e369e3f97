//! Site crawling and text normalization.
//!
//! This crate provides:
//! - [`text`] — HTML → bounded plain text (title, visible text, whitespace)
//! - [`engine`] — sequential, domain-bound breadth-first crawler

pub mod engine;
pub mod text;

pub use engine::{CrawlOutput, CrawlStats, CrawledPage, Crawler, authority, strip_fragment};
pub use text::{NormalizedPage, normalize_html};
