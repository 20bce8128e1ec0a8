// src/core/storage/scan_results.rs

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, QueryBuilder, Row, Sqlite};
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::core::id::{IntoObjectId, ObjectId, validate_and_normalize};
use crate::core::models::{AlertStatus, Fetched, Finding, Severity, Target};
use crate::core::storage::{Database, StorageLocation};

const FINDING_COLUMNS: &str = "id, target_id, customer_username, vulnerability_title, severity, \
     alert_status, scan_numbers, found_date, fixed_date, details";

/// Criteria for [`ScanResults::exists`]. Unset fields do not constrain the
/// match; a filter with nothing set is treated as no filter at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingFilter {
    pub id: Option<ObjectId>,
    pub target_id: Option<ObjectId>,
    pub severity: Option<Severity>,
    pub alert_status: Option<AlertStatus>,
    pub vulnerability_title: Option<String>,
}

impl FindingFilter {
    pub fn by_target(target_id: ObjectId) -> Self {
        Self { target_id: Some(target_id), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.target_id.is_none()
            && self.severity.is_none()
            && self.alert_status.is_none()
            && self.vulnerability_title.is_none()
    }
}

/// Findings of every standard-mode target, kept in the shared table.
#[derive(Debug, Clone)]
pub struct ScanResults {
    db: Database,
}

impl ScanResults {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    fn table(&self) -> String {
        StorageLocation::Shared.collection_name()
    }

    /// Inserts a batch of findings and returns how many rows were written.
    ///
    /// The batch runs in one transaction: either every record lands or the
    /// call fails and nothing does. An empty batch returns 0 without touching
    /// the database.
    pub async fn add(&self, records: &[Finding]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        insert_findings(self.db.pool(), StorageLocation::Shared, records).await
    }

    /// Whether any finding matches. `None` and empty filters answer `false`
    /// without running a query.
    pub async fn exists(&self, filter: Option<&FindingFilter>) -> Result<bool> {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(false);
        };

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT 1 FROM \"{}\" WHERE ", self.table()));
        {
            let mut clauses = query.separated(" AND ");
            if let Some(id) = filter.id {
                clauses.push("id = ").push_bind_unseparated(id.to_hex());
            }
            if let Some(target_id) = filter.target_id {
                clauses.push("target_id = ").push_bind_unseparated(target_id.to_hex());
            }
            if let Some(severity) = filter.severity {
                clauses.push("severity = ").push_bind_unseparated(severity.code());
            }
            if let Some(alert_status) = filter.alert_status {
                clauses.push("alert_status = ").push_bind_unseparated(alert_status.code());
            }
            if let Some(title) = &filter.vulnerability_title {
                clauses.push("vulnerability_title = ").push_bind_unseparated(title.clone());
            }
        }
        query.push(" LIMIT 1");

        let row = query.build().fetch_optional(self.db.pool()).await?;
        Ok(row.is_some())
    }

    /// Findings of `target`, most severe first. Empty when there are none.
    pub async fn get_list_by_target(&self, target: &Target) -> Result<Vec<Finding>> {
        select_by_target(self.db.pool(), StorageLocation::Shared, &target.id).await
    }

    /// Like [`get_list_by_target`](Self::get_list_by_target) but from a raw
    /// identifier.
    ///
    /// A malformed identifier is an error. A query that fails to run is
    /// reported as `Ok(None)`, distinct from `Ok(Some(vec![]))` for a target
    /// without findings.
    pub async fn get_list_by_target_id<I: IntoObjectId>(&self, target_id: I) -> Fetched<Vec<Finding>> {
        let target_id = validate_and_normalize(target_id)?;

        match select_by_target(self.db.pool(), StorageLocation::Shared, &target_id).await {
            Ok(findings) => Ok(Some(findings)),
            Err(e) => {
                warn!(target_id = %target_id, error = %e, "Scan result query failed.");
                Ok(None)
            }
        }
    }
}

pub(crate) async fn insert_findings(
    pool: &SqlitePool,
    location: StorageLocation,
    records: &[Finding],
) -> Result<usize> {
    let sql = format!(
        "INSERT INTO \"{}\" ({FINDING_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        location.collection_name()
    );

    let mut tx = pool.begin().await?;
    let mut written = 0usize;
    for record in records {
        let scan_numbers = serde_json::to_string(&record.scan_numbers)?;
        let details = serde_json::to_string(&record.details)?;

        let result = sqlx::query(&sql)
            .bind(record.id.to_hex())
            .bind(record.target_id.to_hex())
            .bind(&record.customer_username)
            .bind(&record.vulnerability_title)
            .bind(record.severity.code())
            .bind(record.alert_status.code())
            .bind(scan_numbers)
            .bind(record.found_date)
            .bind(record.fixed_date)
            .bind(details)
            .execute(&mut *tx)
            .await?;
        written += result.rows_affected() as usize;
    }
    tx.commit().await?;

    debug!(table = %location.collection_name(), written, "Inserted findings.");
    Ok(written)
}

pub(crate) async fn select_by_target(
    pool: &SqlitePool,
    location: StorageLocation,
    target_id: &ObjectId,
) -> Result<Vec<Finding>> {
    let sql = format!(
        "SELECT {FINDING_COLUMNS} FROM \"{}\" WHERE target_id = ? ORDER BY severity ASC, rowid ASC",
        location.collection_name()
    );
    let findings = sqlx::query_as::<_, Finding>(&sql)
        .bind(target_id.to_hex())
        .fetch_all(pool)
        .await?;
    Ok(findings)
}

pub(crate) async fn select_by_alert_status(
    pool: &SqlitePool,
    location: StorageLocation,
    status: AlertStatus,
) -> Result<Vec<Finding>> {
    let sql = format!(
        "SELECT {FINDING_COLUMNS} FROM \"{}\" WHERE alert_status = ? ORDER BY severity ASC, rowid ASC",
        location.collection_name()
    );
    let findings = sqlx::query_as::<_, Finding>(&sql)
        .bind(status.code())
        .fetch_all(pool)
        .await?;
    Ok(findings)
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

pub(crate) fn parse_id_column(row: &SqliteRow, column: &str) -> Result<ObjectId, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    ObjectId::parse_str(&raw).map_err(|e| decode_error(format!("column {column}: {e}")))
}

impl<'r> FromRow<'r, SqliteRow> for Finding {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let severity_code: i64 = row.try_get("severity")?;
        let severity = Severity::from_code(severity_code)
            .ok_or_else(|| decode_error(format!("unknown severity code {severity_code}")))?;

        let status_code: i64 = row.try_get("alert_status")?;
        let alert_status = AlertStatus::from_code(status_code)
            .ok_or_else(|| decode_error(format!("unknown alert status code {status_code}")))?;

        let scan_numbers: String = row.try_get("scan_numbers")?;
        let details: String = row.try_get("details")?;
        let found_date: Option<DateTime<Utc>> = row.try_get("found_date")?;
        let fixed_date: Option<DateTime<Utc>> = row.try_get("fixed_date")?;

        Ok(Finding {
            id: parse_id_column(row, "id")?,
            target_id: parse_id_column(row, "target_id")?,
            customer_username: row.try_get("customer_username")?,
            vulnerability_title: row.try_get("vulnerability_title")?,
            severity,
            alert_status,
            scan_numbers: serde_json::from_str(&scan_numbers).map_err(|e| decode_error(e.to_string()))?,
            found_date,
            fixed_date,
            details: serde_json::from_str(&details).map_err(|e| decode_error(e.to_string()))?,
        })
    }
}
