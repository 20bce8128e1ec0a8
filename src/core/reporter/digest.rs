// src/core/reporter/digest.rs

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::id::ObjectId;
use crate::core::models::{Finding, Severity, Target};
use crate::core::reporter::ReporterKind;
use crate::core::timefmt::format_optional;

/// What a reporter gathered about one target: the numbers a rendered report
/// is built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDigest {
    pub target_id: ObjectId,
    pub target_address: String,
    pub customer_username: String,
    pub reporter: ReporterKind,
    pub scan_started: String,
    pub scan_completed: String,
    pub overall_cvss_score: Option<f64>,
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    // Findings per URL (web) or per host (network).
    pub by_location: BTreeMap<String, usize>,
    pub host_scores: BTreeMap<String, f64>,
    pub unfixed: Option<usize>,
    pub fixed: Option<usize>,
    pub titles: Vec<String>,
}

impl ReportDigest {
    pub fn new(target: &Target, reporter: ReporterKind) -> Self {
        Self {
            target_id: target.id,
            target_address: target.target_address.clone(),
            customer_username: target.customer_username.clone(),
            reporter,
            scan_started: format_optional(target.scan_started_time),
            scan_completed: format_optional(target.scan_completed_time),
            overall_cvss_score: target.overall_cvss_score,
            total_findings: 0,
            by_severity: BTreeMap::new(),
            by_location: BTreeMap::new(),
            host_scores: BTreeMap::new(),
            unfixed: None,
            fixed: None,
            titles: Vec::new(),
        }
    }

    /// Counts `findings`, which arrive most severe first, grouping them by
    /// whatever `location` extracts.
    pub fn tally<'a, F>(&mut self, findings: &'a [Finding], location: F)
    where
        F: Fn(&'a Finding) -> Option<&'a str>,
    {
        for finding in findings {
            self.total_findings += 1;
            *self.by_severity.entry(finding.severity).or_default() += 1;
            if let Some(key) = location(finding) {
                *self.by_location.entry(key.to_string()).or_default() += 1;
            }
            if !self.titles.contains(&finding.vulnerability_title) {
                self.titles.push(finding.vulnerability_title.clone());
            }
        }
    }
}

/// Logs the digest and hands it to the caller's channel when there is one.
pub async fn deliver(digest: ReportDigest, sink: Option<&mpsc::Sender<ReportDigest>>) {
    info!(
        target_id = %digest.target_id,
        reporter = %digest.reporter,
        findings = digest.total_findings,
        "Report digest ready."
    );

    if let Some(tx) = sink {
        if tx.send(digest).await.is_err() {
            warn!("Report receiver dropped before the digest arrived.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TargetType;
    use serde_json::json;

    #[test]
    fn test_tally_counts_and_groups() {
        let target = Target::new("acme", "https://acme.test", TargetType::Url, false);
        let at = |path: &str| json!({ "web_details": { "url": format!("https://acme.test{path}") } });
        let findings = vec![
            Finding::new(&target, "SQL Injection", Severity::Critical).with_details(at("/login")),
            Finding::new(&target, "XSS", Severity::High).with_details(at("/search")),
            Finding::new(&target, "XSS", Severity::High).with_details(at("/login")),
            Finding::new(&target, "Server banner", Severity::Info),
        ];

        let mut digest = ReportDigest::new(&target, ReporterKind::Web);
        digest.tally(&findings, Finding::url);

        assert_eq!(digest.total_findings, 4);
        assert_eq!(digest.by_severity[&Severity::High], 2);
        assert_eq!(digest.by_location["https://acme.test/login"], 2);
        assert_eq!(digest.titles, vec!["SQL Injection", "XSS", "Server banner"]);
        assert_eq!(digest.scan_started, "");
    }

    #[tokio::test]
    async fn test_deliver_sends_to_channel() {
        let target = Target::new("acme", "192.168.0.1", TargetType::Ip, false);
        let digest = ReportDigest::new(&target, ReporterKind::Network);
        let (tx, mut rx) = mpsc::channel(1);

        deliver(digest.clone(), Some(&tx)).await;
        assert_eq!(rx.recv().await, Some(digest));
    }
}
