// src/core/storage/dedicated.rs

use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::id::{IntoObjectId, ObjectId, validate_and_normalize};
use crate::core::models::{AlertStatus, Fetched, Finding, Target};
use crate::core::storage::scan_results::{insert_findings, select_by_alert_status, select_by_target};
use crate::core::storage::{Database, StorageLocation, collection_exists, ensure_findings_table};

/// Findings of one dedicated-storage target, held in that target's own table.
///
/// The store is bound to a single target id when it is created, and every
/// operation works on `scan_results_<id>` only. A table that was never
/// created reads as empty, the same as a collection with no documents.
#[derive(Debug, Clone)]
pub struct DedicatedScanResults {
    db: Database,
    target_id: ObjectId,
}

impl DedicatedScanResults {
    pub fn bind<I: IntoObjectId>(db: &Database, target_id: I) -> Result<Self> {
        let target_id = validate_and_normalize(target_id)?;
        Ok(Self { db: db.clone(), target_id })
    }

    pub fn target_id(&self) -> ObjectId {
        self.target_id
    }

    pub fn location(&self) -> StorageLocation {
        StorageLocation::Dedicated(self.target_id)
    }

    pub fn collection_name(&self) -> String {
        self.location().collection_name()
    }

    /// Inserts a batch into the bound table, creating it on first use.
    /// Every record must belong to the bound target.
    pub async fn add(&self, records: &[Finding]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(stray) = records.iter().find(|r| r.target_id != self.target_id) {
            return Err(Error::InvalidTarget(format!(
                "finding {} belongs to target {}, not {}",
                stray.id, stray.target_id, self.target_id
            )));
        }

        ensure_findings_table(self.db.pool(), self.location()).await?;
        insert_findings(self.db.pool(), self.location(), records).await
    }

    /// Findings of `target`, most severe first.
    ///
    /// `Ok(None)` when the query could not execute.
    pub async fn get_list_by_target(&self, target: &Target) -> Fetched<Vec<Finding>> {
        match self.select_target(target).await {
            Ok(findings) => Ok(Some(findings)),
            Err(e) => {
                warn!(table = %self.collection_name(), error = %e, "Dedicated scan result query failed.");
                Ok(None)
            }
        }
    }

    async fn select_target(&self, target: &Target) -> Result<Vec<Finding>> {
        if !collection_exists(self.db.pool(), self.location()).await? {
            return Ok(Vec::new());
        }
        select_by_target(self.db.pool(), self.location(), &target.id).await
    }

    /// Alerts in the given triage state, most severe first. Only
    /// [`AlertStatus::Unfixed`] and [`AlertStatus::Fixed`] may be listed.
    pub async fn alerts_by_status(&self, status: AlertStatus) -> Result<Vec<Finding>> {
        if !status.is_listable() {
            return Err(Error::InvalidAlertStatus(status.code()));
        }
        if !collection_exists(self.db.pool(), self.location()).await? {
            return Ok(Vec::new());
        }
        select_by_alert_status(self.db.pool(), self.location(), status).await
    }

    /// [`alerts_by_status`](Self::alerts_by_status) for a raw status code.
    pub async fn alerts_by_status_code(&self, code: i64) -> Result<Vec<Finding>> {
        let status = AlertStatus::from_code(code).ok_or(Error::InvalidAlertStatus(code))?;
        self.alerts_by_status(status).await
    }

    /// Sets the triage state of one alert. Returns the number of rows changed.
    pub async fn update_alert_status<I: IntoObjectId>(&self, finding_id: I, status: AlertStatus) -> Result<u64> {
        let finding_id = validate_and_normalize(finding_id)?;
        if !collection_exists(self.db.pool(), self.location()).await? {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            "UPDATE \"{}\" SET alert_status = ? WHERE id = ?",
            self.collection_name()
        ))
        .bind(status.code())
        .bind(finding_id.to_hex())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Removes the bound table together with every finding in it.
    pub async fn drop_collection(&self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", self.collection_name()))
            .execute(self.db.pool())
            .await?;
        info!(table = %self.collection_name(), "Dropped dedicated scan results.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Severity, TargetType};
    use crate::core::storage::ScanResults;

    async fn setup() -> (Database, DedicatedScanResults, Target) {
        let db = Database::in_memory().await.unwrap();
        let target = Target::new("acme", "10.0.0.0/24", TargetType::IpRange, true);
        let store = DedicatedScanResults::bind(&db, target.id).unwrap();
        (db, store, target)
    }

    #[tokio::test]
    async fn test_bind_validates_identifier() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            DedicatedScanResults::bind(&db, "12345"),
            Err(Error::InvalidIdentifier(_))
        ));

        let store = DedicatedScanResults::bind(&db, "507f1f77bcf86cd799439011").unwrap();
        assert_eq!(store.collection_name(), "scan_results_507f1f77bcf86cd799439011");
    }

    #[tokio::test]
    async fn test_reads_before_first_write_are_empty() {
        let (_db, store, target) = setup().await;
        assert_eq!(store.get_list_by_target(&target).await.unwrap(), Some(Vec::new()));
        assert!(store.alerts_by_status(AlertStatus::Unfixed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_findings_stay_out_of_shared_table() {
        let (db, store, target) = setup().await;
        let written = store
            .add(&[
                Finding::new(&target, "Telnet open", Severity::High),
                Finding::new(&target, "Outdated OpenSSH", Severity::Critical),
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let shared = ScanResults::new(&db).get_list_by_target(&target).await.unwrap();
        assert!(shared.is_empty());

        let own = store.get_list_by_target(&target).await.unwrap().unwrap();
        let titles: Vec<_> = own.iter().map(|f| f.vulnerability_title.as_str()).collect();
        assert_eq!(titles, vec!["Outdated OpenSSH", "Telnet open"]);
    }

    #[tokio::test]
    async fn test_add_rejects_foreign_findings() {
        let (_db, store, _target) = setup().await;
        let stranger = Target::new("acme", "10.1.0.0/24", TargetType::IpRange, true);

        let result = store.add(&[Finding::new(&stranger, "SMB signing", Severity::Low)]).await;
        assert!(matches!(result, Err(Error::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_alerts_by_status_filters_and_sorts() {
        let (_db, store, target) = setup().await;
        store
            .add(&[
                Finding::new(&target, "Weak cipher", Severity::Low),
                Finding::new(&target, "Patched RCE", Severity::Critical).with_alert_status(AlertStatus::Fixed),
                Finding::new(&target, "Default creds", Severity::High),
                Finding::new(&target, "Noise", Severity::Info).with_alert_status(AlertStatus::Ignored),
            ])
            .await
            .unwrap();

        let unfixed = store.alerts_by_status(AlertStatus::Unfixed).await.unwrap();
        let titles: Vec<_> = unfixed.iter().map(|f| f.vulnerability_title.as_str()).collect();
        assert_eq!(titles, vec!["Default creds", "Weak cipher"]);

        let fixed = store.alerts_by_status_code(1).await.unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].vulnerability_title, "Patched RCE");
    }

    #[tokio::test]
    async fn test_alerts_by_status_rejects_other_states() {
        let (_db, store, _target) = setup().await;
        assert!(matches!(
            store.alerts_by_status(AlertStatus::FalsePositive).await,
            Err(Error::InvalidAlertStatus(3))
        ));
        assert!(matches!(store.alerts_by_status_code(2).await, Err(Error::InvalidAlertStatus(2))));
        assert!(matches!(store.alerts_by_status_code(-1).await, Err(Error::InvalidAlertStatus(-1))));
    }

    #[tokio::test]
    async fn test_update_alert_status_and_drop() {
        let (_db, store, target) = setup().await;
        let finding = Finding::new(&target, "Open RDP", Severity::High);
        store.add(std::slice::from_ref(&finding)).await.unwrap();

        assert_eq!(store.update_alert_status(finding.id, AlertStatus::Fixed).await.unwrap(), 1);
        assert_eq!(store.alerts_by_status(AlertStatus::Fixed).await.unwrap().len(), 1);

        store.drop_collection().await.unwrap();
        assert_eq!(store.get_list_by_target(&target).await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_failed_query_is_none() {
        let (db, store, target) = setup().await;
        db.close().await;
        assert_eq!(store.get_list_by_target(&target).await.unwrap(), None);
    }
}
