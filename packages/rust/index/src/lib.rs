//! Knowledge retrieval over one business website.
//!
//! This crate provides:
//! - [`embedder`] — the [`Embedder`] seam plus an OpenAI-compatible client
//! - [`ranker`] — pure cosine-similarity ranking
//! - [`site_index`] — snapshot-backed [`SiteIndex`] (crawl → embed → persist → rank)

pub mod embedder;
pub mod ranker;
pub mod site_index;

pub use embedder::{DisabledEmbedder, Embedder, OpenAiEmbedder, embedder_from_config};
pub use ranker::{cosine_similarity, rank};
pub use site_index::{IndexPolicy, SiteIndex};
