//! libSQL storage layer for site index snapshots.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one
//! serialized [`IndexSnapshot`] per business id.
//!
//! **Access rules:**
//! - index builds: read-write via [`Storage::open`]
//! - `sitedesk index status`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use sitedesk_shared::{IndexSnapshot, Result, SiteDeskError};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Snapshot metadata without the page payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub business_id: String,
    pub root_url: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub page_count: usize,
    pub built_at: DateTime<Utc>,
}

/// A snapshot row as written to the database.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub summary: SnapshotSummary,
    /// Serialized [`IndexSnapshot`].
    pub snapshot_json: String,
}

impl SnapshotRow {
    /// Serialize a snapshot into a row.
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Result<Self> {
        let snapshot_json = serde_json::to_string(snapshot)
            .map_err(|e| SiteDeskError::Storage(format!("failed to serialize snapshot: {e}")))?;
        Ok(Self {
            summary: SnapshotSummary {
                business_id: snapshot.business_id.clone(),
                root_url: snapshot.root_url.clone(),
                embedding_model: snapshot.embedding_model.clone(),
                dimensions: snapshot.dimensions,
                page_count: snapshot.pages.len(),
                built_at: snapshot.built_at,
            },
            snapshot_json,
        })
    }
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteDeskError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SiteDeskError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SiteDeskError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Snapshot operations
    // -----------------------------------------------------------------------

    /// Serialize and store a snapshot, replacing any previous one for the business.
    pub async fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let row = SnapshotRow::from_snapshot(snapshot)?;
        self.put_snapshot_row(&row).await
    }

    /// Store a pre-serialized snapshot row (upsert by business id).
    pub async fn put_snapshot_row(&self, row: &SnapshotRow) -> Result<()> {
        self.check_writable()?;
        let s = &row.summary;
        self.conn
            .execute(
                "INSERT INTO snapshots (business_id, root_url, embedding_model, dimensions, page_count, built_at, snapshot_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(business_id) DO UPDATE SET
                   root_url = excluded.root_url,
                   embedding_model = excluded.embedding_model,
                   dimensions = excluded.dimensions,
                   page_count = excluded.page_count,
                   built_at = excluded.built_at,
                   snapshot_json = excluded.snapshot_json",
                params![
                    s.business_id.as_str(),
                    s.root_url.as_str(),
                    s.embedding_model.as_str(),
                    s.dimensions as i64,
                    s.page_count as i64,
                    s.built_at.to_rfc3339(),
                    row.snapshot_json.as_str(),
                ],
            )
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Raw serialized snapshot for a business, if one is stored.
    ///
    /// The payload is returned unparsed; callers decide what a malformed
    /// snapshot means.
    pub async fn load_snapshot_json(&self, business_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT snapshot_json FROM snapshots WHERE business_id = ?1",
                params![business_id],
            )
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| SiteDeskError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(SiteDeskError::Storage(e.to_string())),
        }
    }

    /// List metadata for every stored snapshot.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT business_id, root_url, embedding_model, dimensions, page_count, built_at
                 FROM snapshots ORDER BY business_id",
                params![],
            )
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_summary(&row)?);
        }
        Ok(results)
    }

    /// Remove a business's snapshot. Returns whether one existed.
    pub async fn delete_snapshot(&self, business_id: &str) -> Result<bool> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "DELETE FROM snapshots WHERE business_id = ?1",
                params![business_id],
            )
            .await
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }
}

/// Convert a database row to a [`SnapshotSummary`].
fn row_to_summary(row: &libsql::Row) -> Result<SnapshotSummary> {
    Ok(SnapshotSummary {
        business_id: row
            .get::<String>(0)
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?,
        root_url: row
            .get::<String>(1)
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?,
        embedding_model: row
            .get::<String>(2)
            .map_err(|e| SiteDeskError::Storage(e.to_string()))?,
        dimensions: row.get::<i64>(3).unwrap_or(0) as usize,
        page_count: row.get::<i64>(4).unwrap_or(0) as usize,
        built_at: {
            let s: String = row
                .get(5)
                .map_err(|e| SiteDeskError::Storage(e.to_string()))?;
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SiteDeskError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitedesk_shared::PageRecord;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sd_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_snapshot(business_id: &str) -> IndexSnapshot {
        IndexSnapshot::new(
            business_id,
            "https://acme.example.com/",
            "test-model",
            vec![
                PageRecord {
                    url: "https://acme.example.com/".into(),
                    title: "Acme".into(),
                    text: "Fiber splicing and cabling.".into(),
                    vector: vec![0.25, -0.5, 0.125],
                },
                PageRecord {
                    url: "https://acme.example.com/legal".into(),
                    title: "Legal".into(),
                    text: "Terms and conditions.".into(),
                    vector: vec![],
                },
            ],
        )
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sd_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn snapshot_roundtrip_is_lossless() {
        let storage = test_storage().await;
        let snapshot = sample_snapshot("acme");

        assert!(storage.load_snapshot_json("acme").await.unwrap().is_none());
        storage.save_snapshot(&snapshot).await.expect("save");

        let json = storage
            .load_snapshot_json("acme")
            .await
            .expect("load")
            .expect("present");
        let parsed: IndexSnapshot = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, snapshot);
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let storage = test_storage().await;
        storage.save_snapshot(&sample_snapshot("acme")).await.unwrap();

        let mut newer = sample_snapshot("acme");
        newer.pages.truncate(1);
        newer.embedding_model = "other-model".into();
        storage.save_snapshot(&newer).await.unwrap();

        let summaries = storage.list_snapshots().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].page_count, 1);
        assert_eq!(summaries[0].embedding_model, "other-model");
        assert_eq!(summaries[0].dimensions, 3);
    }

    #[tokio::test]
    async fn delete_snapshot() {
        let storage = test_storage().await;
        storage.save_snapshot(&sample_snapshot("acme")).await.unwrap();

        assert!(storage.delete_snapshot("acme").await.unwrap());
        assert!(!storage.delete_snapshot("acme").await.unwrap());
        assert!(storage.load_snapshot_json("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sd_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.save_snapshot(&sample_snapshot("acme")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_snapshots().await.unwrap().len(), 1);
        let result = ro.save_snapshot(&sample_snapshot("other")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
