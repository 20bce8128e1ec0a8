// src/core/models.rs

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use strum::{AsRefStr, Display, EnumString, FromRepr};
use url::Url;

use crate::core::error::{Error, Result};
use crate::core::id::ObjectId;
use crate::core::storage::StorageLocation;

// --- Reusable Result Types ---

// A retrieval whose query may fail to run at all. `Ok(None)` means the query
// could not execute, `Ok(Some(empty))` means it ran and matched nothing.
pub type Fetched<T> = Result<Option<T>>;

lazy_static! {
    static ref IP_RANGE_RE: Regex =
        Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}/\d{1,2}$").expect("static CIDR pattern");
}

// --- Target Enumerations ---

/// The kind of scan subject a target describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Url,
    Ip,
    IpRange,
}

// Where a target's findings live, derived from its `is_ds` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum StorageMode {
    Shared,
    Dedicated,
}

impl StorageMode {
    pub fn from_is_ds(is_ds: bool) -> Self {
        if is_ds { StorageMode::Dedicated } else { StorageMode::Shared }
    }
}

// Lifecycle of a target, stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, FromRepr)]
#[repr(u8)]
pub enum ScanStatus {
    #[default]
    YetToStart = 0,
    InitiatingScan = 1,
    ScanStarted = 2,
    ScanRetrieved = 3,
    ReportGenerated = 4,
    ScanFailed = 5,
    Unreachable = 6,
}

impl ScanStatus {
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }
}

// --- Finding Enumerations ---

/// Severity of a finding. Lower codes are more severe, so sorting by code
/// ascending puts the worst issues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, FromRepr)]
#[repr(u8)]
pub enum Severity {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Info = 5,
}

impl Severity {
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }
}

/// Triage state of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, FromRepr)]
#[repr(u8)]
pub enum AlertStatus {
    #[default]
    Unfixed = 0,
    Fixed = 1,
    Ignored = 2,
    FalsePositive = 3,
    Invalid = 4,
}

impl AlertStatus {
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_repr)
    }

    /// Only open and fixed alerts can be listed by status.
    pub fn is_listable(self) -> bool {
        matches!(self, AlertStatus::Unfixed | AlertStatus::Fixed)
    }
}

// --- Target Record ---

// One completed scan of a dedicated-storage target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub scan_number: i64,
    pub scan_date: DateTime<Utc>,
}

/// A scan subject: a website, a single IP or an IP range.
///
/// `target_type` is kept as the stored text so that a record written with an
/// unknown category still loads; [`Target::category`] is where it is checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: ObjectId,
    pub customer_username: String,
    pub target_address: String,
    pub target_type: String,
    pub flag: i64,
    pub is_ds: bool,
    pub scan_status: ScanStatus,
    pub created_at: DateTime<Utc>,
    pub scans: Option<Vec<ScanInfo>>,
    pub scanner_ip: Option<String>,
    pub scanner_username: Option<String>,
    pub scan_started_time: Option<DateTime<Utc>>,
    pub scan_completed_time: Option<DateTime<Utc>>,
    pub overall_cvss_score: Option<f64>,
    pub cvss_score_by_host: Option<HashMap<String, f64>>,
    pub failure_reason: Option<i64>,
}

impl Target {
    /// A freshly registered target that has not been scanned yet.
    pub fn new(customer_username: &str, target_address: &str, target_type: TargetType, is_ds: bool) -> Self {
        Self {
            id: ObjectId::new(),
            customer_username: customer_username.to_string(),
            target_address: target_address.to_string(),
            target_type: target_type.to_string(),
            flag: 0,
            is_ds,
            scan_status: ScanStatus::YetToStart,
            created_at: Utc::now(),
            scans: None,
            scanner_ip: None,
            scanner_username: None,
            scan_started_time: None,
            scan_completed_time: None,
            overall_cvss_score: None,
            cvss_score_by_host: None,
            failure_reason: None,
        }
    }

    pub fn category(&self) -> Result<TargetType> {
        self.target_type
            .parse()
            .map_err(|_| Error::InvalidTargetCategory(self.target_type.clone()))
    }

    pub fn storage_mode(&self) -> StorageMode {
        StorageMode::from_is_ds(self.is_ds)
    }

    pub fn storage_location(&self) -> StorageLocation {
        StorageLocation::for_target(self)
    }

    pub fn is_ip_range(&self) -> bool {
        IP_RANGE_RE.is_match(&self.target_address)
    }

    /// Checks that the address agrees with the declared category.
    pub fn validate(&self) -> Result<()> {
        let category = self.category()?;
        let address = self.target_address.as_str();
        let consistent = match category {
            TargetType::Url => Url::parse(address).is_ok_and(|url| url.host_str().is_some()),
            TargetType::Ip => address.parse::<IpAddr>().is_ok(),
            TargetType::IpRange => self.is_ip_range(),
        };

        if consistent {
            Ok(())
        } else {
            Err(Error::InvalidTarget(format!(
                "address '{address}' does not match target type '{category}'"
            )))
        }
    }

    /// True once findings may exist for this target.
    pub fn has_begun_scanning(&self) -> bool {
        self.scan_status != ScanStatus::YetToStart
            || self.scans.as_ref().is_some_and(|scans| !scans.is_empty())
    }

    pub fn next_scan_number(&self) -> i64 {
        self.scans
            .as_ref()
            .and_then(|scans| scans.iter().map(|s| s.scan_number).max())
            .map_or(1, |highest| highest.max(1) + 1)
    }
}

// --- Finding ---

/// One discovered issue for a target. Everything the scanners attach beyond
/// the indexed fields travels in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: ObjectId,
    pub target_id: ObjectId,
    pub customer_username: String,
    pub vulnerability_title: String,
    pub severity: Severity,
    pub alert_status: AlertStatus,
    pub scan_numbers: Vec<i64>,
    pub found_date: Option<DateTime<Utc>>,
    pub fixed_date: Option<DateTime<Utc>>,
    pub details: serde_json::Value,
}

impl Finding {
    pub fn new(target: &Target, vulnerability_title: &str, severity: Severity) -> Self {
        Self {
            id: ObjectId::new(),
            target_id: target.id,
            customer_username: target.customer_username.clone(),
            vulnerability_title: vulnerability_title.to_string(),
            severity,
            alert_status: AlertStatus::Unfixed,
            scan_numbers: Vec::new(),
            found_date: None,
            fixed_date: None,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_alert_status(mut self, alert_status: AlertStatus) -> Self {
        self.alert_status = alert_status;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// URL a web finding was raised against.
    pub fn url(&self) -> Option<&str> {
        self.details.pointer("/web_details/url").and_then(|v| v.as_str())
    }

    /// Host a network finding was raised against, by IP or else hostname.
    pub fn host(&self) -> Option<&str> {
        self.details
            .pointer("/network_details/ip")
            .and_then(|v| v.as_str())
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.details.pointer("/network_details/hostname").and_then(|v| v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_type_round_trips_through_text() {
        assert_eq!(TargetType::IpRange.to_string(), "ip_range");
        assert_eq!("url".parse::<TargetType>().unwrap(), TargetType::Url);
        assert!("bogus".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let mut target = Target::new("acme", "https://acme.test", TargetType::Url, false);
        target.target_type = "bogus".to_string();
        assert!(matches!(target.category(), Err(Error::InvalidTargetCategory(t)) if t == "bogus"));
    }

    #[test]
    fn test_ip_range_requires_cidr() {
        let good = Target::new("acme", "10.0.0.0/24", TargetType::IpRange, false);
        assert!(good.is_ip_range());
        assert!(good.validate().is_ok());

        let bad = Target::new("acme", "10.0.0.1", TargetType::IpRange, false);
        assert!(matches!(bad.validate(), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn test_url_and_ip_addresses_are_checked() {
        assert!(Target::new("acme", "https://acme.test/login", TargetType::Url, false).validate().is_ok());
        assert!(Target::new("acme", "acme.test", TargetType::Url, false).validate().is_err());
        assert!(Target::new("acme", "192.168.1.20", TargetType::Ip, false).validate().is_ok());
        assert!(Target::new("acme", "192.168.1.0/24", TargetType::Ip, false).validate().is_err());
    }

    #[test]
    fn test_severity_orders_most_severe_first() {
        let mut severities = vec![Severity::Info, Severity::Critical, Severity::Medium];
        severities.sort();
        assert_eq!(severities, vec![Severity::Critical, Severity::Medium, Severity::Info]);
        assert_eq!(Severity::from_code(2), Some(Severity::High));
        assert_eq!(Severity::from_code(0), None);
    }

    #[test]
    fn test_only_unfixed_and_fixed_are_listable() {
        assert!(AlertStatus::Unfixed.is_listable());
        assert!(AlertStatus::Fixed.is_listable());
        assert!(!AlertStatus::Ignored.is_listable());
        assert!(!AlertStatus::FalsePositive.is_listable());
        assert_eq!(AlertStatus::from_code(9), None);
    }

    #[test]
    fn test_next_scan_number() {
        let mut target = Target::new("acme", "10.0.0.0/24", TargetType::IpRange, true);
        assert_eq!(target.next_scan_number(), 1);

        target.scans = Some(vec![
            ScanInfo { scan_number: 3, scan_date: Utc::now() },
            ScanInfo { scan_number: 1, scan_date: Utc::now() },
        ]);
        assert_eq!(target.next_scan_number(), 4);
        assert!(target.has_begun_scanning());
    }

    #[test]
    fn test_finding_location_helpers() {
        let target = Target::new("acme", "10.0.0.0/24", TargetType::IpRange, false);
        let network = Finding::new(&target, "Open SSH", Severity::Medium)
            .with_details(json!({ "network_details": { "ip": "", "hostname": "db01" } }));
        assert_eq!(network.host(), Some("db01"));
        assert_eq!(network.url(), None);

        let web = Finding::new(&target, "XSS", Severity::High)
            .with_details(json!({ "web_details": { "url": "https://acme.test/q" } }));
        assert_eq!(web.url(), Some("https://acme.test/q"));
    }
}
