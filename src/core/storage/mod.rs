// src/core/storage/mod.rs

//! SQLite persistence for targets and their findings.
//!
//! Findings for ordinary targets share one table, `scan_results`, filtered by
//! `target_id`. Dedicated-storage targets get a table of their own named
//! `scan_results_<target id>`. Table names are only ever produced by
//! [`StorageLocation::collection_name`].

pub mod dedicated;
pub mod scan_results;
pub mod targets;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::config::DatabaseSettings;
use crate::core::error::Result;
use crate::core::id::{OBJECT_ID_HEX_LEN, ObjectId};
use crate::core::models::Target;

pub use dedicated::DedicatedScanResults;
pub use scan_results::{FindingFilter, ScanResults};
pub use targets::{TargetLookup, TargetRepository};

pub const SHARED_COLLECTION: &str = "scan_results";
pub const DEDICATED_PREFIX: &str = "scan_results_";
pub const TARGETS_COLLECTION: &str = "targets";

// A dedicated name always carries a full id after the prefix, so it can never
// collapse onto the shared name.
const _: () = assert!(DEDICATED_PREFIX.len() + OBJECT_ID_HEX_LEN != SHARED_COLLECTION.len());

/// Which table holds a given set of findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageLocation {
    Shared,
    Dedicated(ObjectId),
}

impl StorageLocation {
    pub fn for_target(target: &Target) -> Self {
        if target.is_ds {
            StorageLocation::Dedicated(target.id)
        } else {
            StorageLocation::Shared
        }
    }

    pub fn collection_name(&self) -> String {
        match self {
            StorageLocation::Shared => SHARED_COLLECTION.to_string(),
            StorageLocation::Dedicated(id) => format!("{DEDICATED_PREFIX}{}", id.to_hex()),
        }
    }
}

/// Handle to the main database. Cloning is cheap; every clone shares the pool
/// and each query checks a connection out only for its own duration.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let url = settings.connection_url();
        info!(url = %url, "Connecting to main database.");

        let options = SqliteConnectOptions::from_str(&url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// A private in-memory database. A single connection that never expires,
    /// since every new SQLite memory connection would start empty.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{TARGETS_COLLECTION}\" (
                id TEXT PRIMARY KEY,
                customer_username TEXT NOT NULL,
                target_address TEXT NOT NULL,
                target_type TEXT NOT NULL,
                flag INTEGER NOT NULL DEFAULT 0,
                is_ds INTEGER NOT NULL DEFAULT 0,
                scan_status INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                scans TEXT,
                scanner_ip TEXT,
                scanner_username TEXT,
                scan_started_time TEXT,
                scan_completed_time TEXT,
                overall_cvss_score REAL,
                cvss_score_by_host TEXT,
                failure_reason INTEGER
            );"
        ))
        .execute(&self.pool)
        .await?;

        ensure_findings_table(&self.pool, StorageLocation::Shared).await
    }
}

pub(crate) async fn ensure_findings_table(pool: &SqlitePool, location: StorageLocation) -> Result<()> {
    let table = location.collection_name();
    debug!(table = %table, "Ensuring findings table exists.");

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id TEXT PRIMARY KEY,
            target_id TEXT NOT NULL,
            customer_username TEXT NOT NULL DEFAULT '',
            vulnerability_title TEXT NOT NULL DEFAULT '',
            severity INTEGER NOT NULL,
            alert_status INTEGER NOT NULL DEFAULT 0,
            scan_numbers TEXT NOT NULL DEFAULT '[]',
            found_date TEXT,
            fixed_date TEXT,
            details TEXT NOT NULL DEFAULT '{{}}'
        );"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS \"idx_{table}_target_severity\" ON \"{table}\" (target_id, severity);"
    ))
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn collection_exists(pool: &SqlitePool, location: StorageLocation) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(location.collection_name())
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TargetType;

    #[test]
    fn test_dedicated_name_is_prefix_plus_hex() {
        let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(
            StorageLocation::Dedicated(id).collection_name(),
            "scan_results_507f1f77bcf86cd799439011"
        );
        assert_eq!(StorageLocation::Shared.collection_name(), "scan_results");
    }

    #[test]
    fn test_location_follows_storage_flag() {
        let shared = Target::new("acme", "https://acme.test", TargetType::Url, false);
        let dedicated = Target::new("acme", "10.0.0.0/24", TargetType::IpRange, true);

        assert_eq!(shared.storage_location(), StorageLocation::Shared);
        assert_eq!(dedicated.storage_location(), StorageLocation::Dedicated(dedicated.id));
        assert_ne!(
            dedicated.storage_location().collection_name(),
            StorageLocation::Shared.collection_name()
        );
    }

    #[tokio::test]
    async fn test_schema_creates_shared_tables() {
        let db = Database::in_memory().await.unwrap();
        assert!(collection_exists(db.pool(), StorageLocation::Shared).await.unwrap());
        assert!(
            !collection_exists(db.pool(), StorageLocation::Dedicated(ObjectId::new()))
                .await
                .unwrap()
        );
    }
}
