// src/core/reporter/web.rs

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::models::{AlertStatus, Finding, Target};
use crate::core::reporter::digest::{ReportDigest, deliver};
use crate::core::reporter::{Reporter, ReporterKind};
use crate::core::storage::{Database, DedicatedScanResults, ScanResults};

/// Reports a website whose findings live in the shared table.
pub struct WebReporter {
    target: Target,
    results: ScanResults,
    sink: Option<mpsc::Sender<ReportDigest>>,
}

impl WebReporter {
    pub fn new(target: Target, db: &Database, sink: Option<mpsc::Sender<ReportDigest>>) -> Self {
        Self { target, results: ScanResults::new(db), sink }
    }

    pub async fn collect(&self) -> Result<ReportDigest> {
        let findings = self.results.get_list_by_target(&self.target).await?;
        debug!(target_id = %self.target.id, findings = findings.len(), "Loaded web findings.");

        let mut digest = ReportDigest::new(&self.target, ReporterKind::Web);
        digest.tally(&findings, Finding::url);
        Ok(digest)
    }
}

#[async_trait]
impl Reporter for WebReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::Web
    }

    async fn run(&self) -> Result<()> {
        let digest = self.collect().await?;
        deliver(digest, self.sink.as_ref()).await;
        Ok(())
    }
}

/// Reports a website kept in dedicated storage. Besides the full list it
/// splits the alerts into open and fixed.
pub struct WebDedicatedReporter {
    target: Target,
    results: DedicatedScanResults,
    sink: Option<mpsc::Sender<ReportDigest>>,
}

impl WebDedicatedReporter {
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
        debug!(table = %self.results.collection_name(), findings = findings.len(), "Loaded web findings.");

        let mut digest = ReportDigest::new(&self.target, ReporterKind::WebDedicated);
        digest.tally(&findings, Finding::url);
        digest.unfixed = Some(self.results.alerts_by_status(AlertStatus::Unfixed).await?.len());
        digest.fixed = Some(self.results.alerts_by_status(AlertStatus::Fixed).await?.len());
        Ok(digest)
    }
}

#[async_trait]
impl Reporter for WebDedicatedReporter {
    fn kind(&self) -> ReporterKind {
        ReporterKind::WebDedicated
    }

    async fn run(&self) -> Result<()> {
        let digest = self.collect().await?;
        deliver(digest, self.sink.as_ref()).await;
        Ok(())
    }
}
