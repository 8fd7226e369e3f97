//! Site index: crawl + embed once, persist a snapshot, reuse it.
//!
//! A stored snapshot is reused while it is *usable*: it parses, was built
//! for the same root URL with the current embedding model, and is younger
//! than the configured maximum age. Anything else triggers a rebuild.
//! Builds are best-effort throughout; a failed snapshot write only costs
//! persistence, the in-memory index still serves this process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use sitedesk_crawler::Crawler;
use sitedesk_shared::{
    AppConfig, BusinessProfile, CrawlConfig, IndexSnapshot, Outcome, PageHit, PageRecord, Result,
    SNAPSHOT_FORMAT_VERSION, index_db_path,
};
use sitedesk_storage::Storage;

use crate::embedder::{Embedder, embedder_from_config};
use crate::ranker;

/// When a stored snapshot stops being reusable.
#[derive(Debug, Clone)]
pub struct IndexPolicy {
    /// Pages collected per build.
    pub max_pages: usize,
    /// Maximum snapshot age. `None` keeps a snapshot until manually rebuilt.
    pub max_age: Option<Duration>,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for IndexPolicy {
    fn from(config: &AppConfig) -> Self {
        let hours = config.index.max_age_hours;
        Self {
            max_pages: config.crawl.max_pages,
            max_age: (hours > 0).then(|| Duration::hours(hours as i64)),
        }
    }
}

/// Why a stored snapshot was not reused.
#[derive(Debug, Clone, PartialEq)]
enum Staleness {
    FormatVersion(u32),
    OtherBusiness(String),
    RootChanged(String),
    ModelChanged(String),
    Unembedded(usize),
    Expired(DateTime<Utc>),
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormatVersion(v) => write!(f, "snapshot format v{v}"),
            Self::OtherBusiness(id) => write!(f, "snapshot belongs to '{id}'"),
            Self::RootChanged(url) => write!(f, "snapshot was built from {url}"),
            Self::ModelChanged(model) => write!(f, "snapshot was embedded with {model}"),
            Self::Unembedded(pages) => write!(f, "snapshot has no vectors ({pages} pages)"),
            Self::Expired(at) => write!(f, "snapshot built at {at} has expired"),
        }
    }
}

/// Build-once, reuse-many index of one business website.
pub struct SiteIndex {
    crawler: Crawler,
    embedder: Arc<dyn Embedder>,
    storage: Storage,
    policy: IndexPolicy,
    /// Built or loaded snapshots, by business id, for this process.
    cache: Mutex<HashMap<String, Arc<IndexSnapshot>>>,
}

impl SiteIndex {
    pub fn new(
        crawler: Crawler,
        embedder: Arc<dyn Embedder>,
        storage: Storage,
        policy: IndexPolicy,
    ) -> Self {
        Self {
            crawler,
            embedder,
            storage,
            policy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Wire crawler, embedder, and snapshot storage from configuration.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let crawler = Crawler::new(CrawlConfig::from(config))?;
        let embedder: Arc<dyn Embedder> = Arc::from(embedder_from_config(config)?);
        let storage = Storage::open(&index_db_path(config)?).await?;
        Ok(Self::new(crawler, embedder, storage, IndexPolicy::from(config)))
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Return the business's index, building it only if no usable snapshot exists.
    #[instrument(skip_all, fields(business_id = %profile.id))]
    pub async fn get_or_build(&self, profile: &BusinessProfile) -> Arc<IndexSnapshot> {
        let now = Utc::now();

        let cached = self.cache.lock().await.get(&profile.id).cloned();
        if let Some(cached) = cached {
            match self.staleness(&cached, profile, now) {
                None => return cached,
                Some(reason) => debug!(%reason, "cached index is stale"),
            }
        }

        if let Some(stored) = self.load_stored(profile).await {
            match self.staleness(&stored, profile, now) {
                None => {
                    debug!(pages = stored.pages.len(), "reusing stored snapshot");
                    let stored = Arc::new(stored);
                    self.cache
                        .lock()
                        .await
                        .insert(profile.id.clone(), stored.clone());
                    return stored;
                }
                Some(reason) => info!(%reason, "stored snapshot is stale, rebuilding"),
            }
        }

        self.rebuild(profile).await
    }

    /// Crawl, embed, and persist a fresh index regardless of any snapshot.
    #[instrument(skip_all, fields(business_id = %profile.id, root_url = %profile.site_url))]
    pub async fn rebuild(&self, profile: &BusinessProfile) -> Arc<IndexSnapshot> {
        let crawl = self
            .crawler
            .crawl(&profile.site_url, self.policy.max_pages)
            .await;

        let mut records = Vec::with_capacity(crawl.pages.len());
        let mut unembedded = 0usize;
        for page in crawl.pages {
            let vector = match self.embedder.embed(&page.text).await {
                Outcome::Available(v) => v,
                Outcome::Unavailable { reason } => {
                    warn!(url = %page.url, %reason, "embedding failed, storing page without vector");
                    unembedded += 1;
                    Vec::new()
                }
            };
            records.push(PageRecord {
                url: page.url,
                title: page.title,
                text: page.text,
                vector,
            });
        }

        let snapshot = IndexSnapshot::new(
            profile.id.clone(),
            profile.site_url.as_str(),
            self.embedder.model_id(),
            records,
        );

        info!(
            pages = snapshot.pages.len(),
            unembedded,
            dimensions = snapshot.dimensions,
            "index built"
        );

        if let Err(e) = self.storage.save_snapshot(&snapshot).await {
            warn!(error = %e, "failed to persist snapshot, keeping in-memory index");
        }

        let snapshot = Arc::new(snapshot);
        self.cache
            .lock()
            .await
            .insert(profile.id.clone(), snapshot.clone());
        snapshot
    }

    /// Pages most relevant to `query`, best first.
    ///
    /// A blank query or `top_k == 0` yields an empty list without touching
    /// the index or the embedder. An unavailable query embedding is reported
    /// as `Unavailable`.
    #[instrument(skip_all, fields(business_id = %profile.id, top_k = top_k))]
    pub async fn find_relevant_pages(
        &self,
        profile: &BusinessProfile,
        query: &str,
        top_k: usize,
    ) -> Outcome<Vec<PageHit>> {
        if query.trim().is_empty() || top_k == 0 {
            return Outcome::Available(Vec::new());
        }

        let query_vector = match self.embedder.embed(query).await {
            Outcome::Available(v) if !v.is_empty() => v,
            Outcome::Available(_) => return Outcome::unavailable("empty query embedding"),
            Outcome::Unavailable { reason } => return Outcome::Unavailable { reason },
        };

        let index = self.get_or_build(profile).await;
        let hits = ranker::rank(&index.pages, &query_vector, top_k);
        debug!(hits = hits.len(), "ranked pages");
        Outcome::Available(hits)
    }

    /// Load and parse the stored snapshot; storage or parse failures count as absent.
    async fn load_stored(&self, profile: &BusinessProfile) -> Option<IndexSnapshot> {
        let json = match self.storage.load_snapshot_json(&profile.id).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read snapshot, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<IndexSnapshot>(&json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "malformed snapshot, treating as absent");
                None
            }
        }
    }

    fn staleness(
        &self,
        snapshot: &IndexSnapshot,
        profile: &BusinessProfile,
        now: DateTime<Utc>,
    ) -> Option<Staleness> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Some(Staleness::FormatVersion(snapshot.format_version));
        }
        if snapshot.business_id != profile.id {
            return Some(Staleness::OtherBusiness(snapshot.business_id.clone()));
        }
        if snapshot.root_url != profile.site_url.as_str() {
            return Some(Staleness::RootChanged(snapshot.root_url.clone()));
        }
        if snapshot.embedding_model != self.embedder.model_id() {
            return Some(Staleness::ModelChanged(snapshot.embedding_model.clone()));
        }
        // Pages without any vector: built while embeddings were unavailable.
        if snapshot.dimensions == 0 && !snapshot.pages.is_empty() {
            return Some(Staleness::Unembedded(snapshot.pages.len()));
        }
        if let Some(max_age) = self.policy.max_age {
            if now - snapshot.built_at > max_age {
                return Some(Staleness::Expired(snapshot.built_at));
            }
        }
        None
    }
}
