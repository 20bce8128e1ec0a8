// src/core/storage/targets.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use tracing::{debug, info, warn};

use crate::core::error::{Error, Result};
use crate::core::id::{IntoObjectId, ObjectId, validate_and_normalize};
use crate::core::models::{ScanInfo, ScanStatus, Target};
use crate::core::storage::scan_results::parse_id_column;
use crate::core::storage::{Database, TARGETS_COLLECTION};

const TARGET_COLUMNS: &str = "id, customer_username, target_address, target_type, flag, is_ds, \
     scan_status, created_at, scans, scanner_ip, scanner_username, scan_started_time, \
     scan_completed_time, overall_cvss_score, cvss_score_by_host, failure_reason";

/// Resolves a target record from its canonical id. The dispatcher only ever
/// reads targets through this seam.
#[async_trait]
pub trait TargetLookup: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Target>>;
}

#[derive(Debug, Clone)]
pub struct TargetRepository {
    db: Database,
}

impl TargetRepository {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Registers a target after checking its address against its category.
    pub async fn insert(&self, target: &Target) -> Result<ObjectId> {
        target.validate()?;

        let scans = target.scans.as_ref().map(serde_json::to_string).transpose()?;
        let by_host = target.cvss_score_by_host.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(&format!(
            "INSERT INTO \"{TARGETS_COLLECTION}\" ({TARGET_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(target.id.to_hex())
        .bind(&target.customer_username)
        .bind(&target.target_address)
        .bind(&target.target_type)
        .bind(target.flag)
        .bind(target.is_ds)
        .bind(target.scan_status.code())
        .bind(target.created_at)
        .bind(scans)
        .bind(&target.scanner_ip)
        .bind(&target.scanner_username)
        .bind(target.scan_started_time)
        .bind(target.scan_completed_time)
        .bind(target.overall_cvss_score)
        .bind(by_host)
        .bind(target.failure_reason)
        .execute(self.db.pool())
        .await?;

        info!(target_id = %target.id, address = %target.target_address, is_ds = target.is_ds, "Registered target.");
        Ok(target.id)
    }

    pub async fn find<I: IntoObjectId>(&self, target_id: I) -> Result<Option<Target>> {
        let target_id = validate_and_normalize(target_id)?;
        self.find_by_id(&target_id).await
    }

    /// Switches a target between shared and dedicated storage.
    ///
    /// Only allowed before the first scan; afterwards findings already sit in
    /// one location and moving the flag would strand them.
    pub async fn set_dedicated_storage<I: IntoObjectId>(&self, target_id: I, is_ds: bool) -> Result<()> {
        let target_id = validate_and_normalize(target_id)?;
        let target = self
            .find_by_id(&target_id)
            .await?
            .ok_or(Error::TargetNotFound(target_id))?;

        if target.is_ds == is_ds {
            return Ok(());
        }
        if target.has_begun_scanning() {
            warn!(target_id = %target_id, "Refusing to change storage mode of a scanned target.");
            return Err(Error::StorageModeLocked(target_id));
        }

        sqlx::query(&format!("UPDATE \"{TARGETS_COLLECTION}\" SET is_ds = ? WHERE id = ?"))
            .bind(is_ds)
            .bind(target_id.to_hex())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Moves a target to `status`, stamping the start or completion time
    /// where the status marks one. Returns whether a record was updated.
    pub async fn update_scan_status<I: IntoObjectId>(&self, target_id: I, status: ScanStatus) -> Result<bool> {
        let target_id = validate_and_normalize(target_id)?;
        let now = Utc::now();

        let column = match status {
            ScanStatus::ScanStarted => Some("scan_started_time"),
            ScanStatus::ReportGenerated => Some("scan_completed_time"),
            _ => None,
        };

        let result = match column {
            Some(column) => {
                sqlx::query(&format!(
                    "UPDATE \"{TARGETS_COLLECTION}\" SET scan_status = ?, {column} = ? WHERE id = ?"
                ))
                .bind(status.code())
                .bind(now)
                .bind(target_id.to_hex())
                .execute(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!("UPDATE \"{TARGETS_COLLECTION}\" SET scan_status = ? WHERE id = ?"))
                    .bind(status.code())
                    .bind(target_id.to_hex())
                    .execute(self.db.pool())
                    .await?
            }
        };

        debug!(target_id = %target_id, status = %status, "Updated scan status.");
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TargetLookup for TargetRepository {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Target>> {
        let target = sqlx::query_as::<_, Target>(&format!(
            "SELECT {TARGET_COLUMNS} FROM \"{TARGETS_COLLECTION}\" WHERE id = ?"
        ))
        .bind(id.to_hex())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(target)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>, sqlx::Error> {
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| sqlx::Error::Decode(e.into()))
}

impl<'r> FromRow<'r, SqliteRow> for Target {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status_code: i64 = row.try_get("scan_status")?;
        let scan_status = ScanStatus::from_code(status_code)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown scan status code {status_code}").into()))?;

        let scans: Option<Vec<ScanInfo>> = decode_json(row.try_get("scans")?)?;
        let cvss_score_by_host: Option<HashMap<String, f64>> = decode_json(row.try_get("cvss_score_by_host")?)?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(Target {
            id: parse_id_column(row, "id")?,
            customer_username: row.try_get("customer_username")?,
            target_address: row.try_get("target_address")?,
            target_type: row.try_get("target_type")?,
            flag: row.try_get("flag")?,
            is_ds: row.try_get("is_ds")?,
            scan_status,
            created_at,
            scans,
            scanner_ip: row.try_get("scanner_ip")?,
            scanner_username: row.try_get("scanner_username")?,
            scan_started_time: row.try_get("scan_started_time")?,
            scan_completed_time: row.try_get("scan_completed_time")?,
            overall_cvss_score: row.try_get("overall_cvss_score")?,
            cvss_score_by_host,
            failure_reason: row.try_get("failure_reason")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TargetType;

    async fn setup() -> TargetRepository {
        let db = Database::in_memory().await.unwrap();
        TargetRepository::new(&db)
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let repo = setup().await;
        let mut target = Target::new("acme", "10.0.0.0/28", TargetType::IpRange, true);
        target.overall_cvss_score = Some(7.5);
        target.cvss_score_by_host = Some(HashMap::from([("10.0.0.3".to_string(), 7.5)]));
        target.scans = Some(vec![ScanInfo { scan_number: 1, scan_date: Utc::now() }]);

        repo.insert(&target).await.unwrap();
        let loaded = repo.find(target.id.to_hex()).await.unwrap().unwrap();

        assert_eq!(loaded.id, target.id);
        assert_eq!(loaded.target_type, "ip_range");
        assert!(loaded.is_ds);
        assert_eq!(loaded.overall_cvss_score, Some(7.5));
        assert_eq!(loaded.cvss_score_by_host, target.cvss_score_by_host);
        assert_eq!(loaded.next_scan_number(), 2);
    }

    #[tokio::test]
    async fn test_find_unknown_id_is_none() {
        let repo = setup().await;
        assert!(repo.find("507f1f77bcf86cd799439011").await.unwrap().is_none());
        assert!(matches!(repo.find("").await, Err(Error::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_insert_rejects_inconsistent_address() {
        let repo = setup().await;
        let target = Target::new("acme", "10.0.0.7", TargetType::IpRange, false);
        assert!(matches!(repo.insert(&target).await, Err(Error::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_storage_mode_locks_after_scan_starts() {
        let repo = setup().await;
        let target = Target::new("acme", "https://acme.test", TargetType::Url, false);
        repo.insert(&target).await.unwrap();

        repo.set_dedicated_storage(target.id, true).await.unwrap();
        assert!(repo.find(target.id).await.unwrap().unwrap().is_ds);

        assert!(repo.update_scan_status(target.id, ScanStatus::ScanStarted).await.unwrap());
        let started = repo.find(target.id).await.unwrap().unwrap();
        assert_eq!(started.scan_status, ScanStatus::ScanStarted);
        assert!(started.scan_started_time.is_some());

        assert!(matches!(
            repo.set_dedicated_storage(target.id, false).await,
            Err(Error::StorageModeLocked(id)) if id == target.id
        ));
        // Re-asserting the current mode is not a change.
        repo.set_dedicated_storage(target.id, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_report_generated_stamps_completion() {
        let repo = setup().await;
        let target = Target::new("acme", "192.168.0.10", TargetType::Ip, false);
        repo.insert(&target).await.unwrap();

        repo.update_scan_status(target.id, ScanStatus::ReportGenerated).await.unwrap();
        let done = repo.find(target.id).await.unwrap().unwrap();
        assert!(done.scan_completed_time.is_some());
        assert!(done.scan_started_time.is_none());

        assert!(!repo.update_scan_status(ObjectId::new(), ScanStatus::ScanFailed).await.unwrap());
    }
}
