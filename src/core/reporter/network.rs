// src/core/reporter/network.rs

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::models::{AlertStatus, Finding, Target};
use crate::core::reporter::digest::{ReportDigest, deliver};
use crate::core::reporter::{Reporter, ReporterKind};
use crate::core::storage::{Database, DedicatedScanResults, ScanResults};

// IP ranges carry a score per host; single IPs only the overall score.
fn with_host_scores(mut digest: ReportDigest, target: &Target) -> ReportDigest {
    if target.is_ip_range() {
        if let Some(scores) = &target.cvss_score_by_host {
            digest.host_scores = scores.iter().map(|(host, score)| (host.clone(), *score)).collect();
        }
    }
    digest
}

/// Reports an IP or IP range whose findings live in the shared table.
pub struct NetworkReporter {
    target: Target,
    results: ScanResults,
    sink: Option<mpsc::Sender<ReportDigest>>,
}

impl NetworkReporter {
    pub fn new(target: Target, db: &Database, sink: Option<mpsc::Sender<ReportDigest>>) -> Self {
        Self { target, results: ScanResults::new(db), sink }
    }

    pub async fn collect(&self) -> Result<ReportDigest> {
        let findings = self.results.get_list_by_target(&self.target).await?;
        debug!(target_id = %self.target.id, findings = findings.len(), "Loaded network findings.");

        let mut digest = ReportDigest::new(&self.target, ReporterKind::Network);
        digest.tally(&findings, Finding::host);
        Ok(with_host_scores(digest, &self.target))
    }
}

#[async_trait]
impl Reporter for NetworkReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::Network
    }

    async fn run(&self) -> Result<()> {
        let digest = self.collect().await?;
        deliver(digest, self.sink.as_ref()).await;
        Ok(())
    }
}

/// Reports an IP or IP range kept in dedicated storage.
pub struct NetworkDedicatedReporter {
    target: Target,
    results: DedicatedScanResults,
    sink: Option<mpsc::Sender<ReportDigest>>,
}

impl NetworkDedicatedReporter {
    pub fn new(target: Target, db: &Database, sink: Option<mpsc::Sender<ReportDigest>>) -> Result<Self> {
        let results = DedicatedScanResults::bind(db, target.id)?;
        Ok(Self { target, results, sink })
    }

    pub async fn collect(&self) -> Result<ReportDigest> {
        let findings = self
            .results
            .get_list_by_target(&self.target)
            .await?
            .ok_or(Error::ResultsUnavailable(self.target.id))?;
        debug!(table = %self.results.collection_name(), findings = findings.len(), "Loaded network findings.");

        let mut digest = ReportDigest::new(&self.target, ReporterKind::NetworkDedicated);
        digest.tally(&findings, Finding::host);
        digest.unfixed = Some(self.results.alerts_by_status(AlertStatus::Unfixed).await?.len());
        digest.fixed = Some(self.results.alerts_by_status(AlertStatus::Fixed).await?.len());
        Ok(with_host_scores(digest, &self.target))
    }
}

#[async_trait]
impl Reporter for NetworkDedicatedReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::NetworkDedicated
    }

    async fn run(&self) -> Result<()> {
        let digest = self.collect().await?;
        deliver(digest, self.sink.as_ref()).await;
        Ok(())
    }
}
