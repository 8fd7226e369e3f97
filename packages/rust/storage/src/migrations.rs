//! SQL migration definitions for the SiteDesk snapshot database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: index snapshots",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One site index snapshot per business
CREATE TABLE IF NOT EXISTS snapshots (
    business_id     TEXT PRIMARY KEY,
    root_url        TEXT NOT NULL,
    embedding_model TEXT NOT NULL,
    dimensions      INTEGER NOT NULL,
    page_count      INTEGER NOT NULL,
    built_at        TEXT NOT NULL,
    snapshot_json   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
