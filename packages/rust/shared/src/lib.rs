//! Shared types, error model, and configuration for SiteDesk.
//!
//! This crate is the foundation depended on by all other SiteDesk crates.
//! It provides:
//! - [`SiteDeskError`] — the unified error type
//! - [`Outcome`] — best-effort result of an external collaborator call
//! - Domain types ([`BusinessProfile`], [`PageRecord`], [`PageHit`], [`IndexSnapshot`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BusinessConfig, CalendarConfig, CrawlConfig, CrawlSettings, EmbeddingsConfig,
    GroundingConfig, IndexConfig, config_dir, config_file_path, embedding_api_key, index_db_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, SiteDeskError};
pub use types::{
    BusinessCalendar, BusinessProfile, IndexSnapshot, Outcome, PageHit, PageRecord,
    SNAPSHOT_FORMAT_VERSION,
};
