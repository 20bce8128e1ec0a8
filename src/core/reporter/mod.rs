// src/core/reporter/mod.rs

//! Picks the reporter strategy for a target and runs it.
//!
//! A target's category (web or network) crossed with its storage mode
//! (shared or dedicated) names exactly one of four reporters; see
//! [`ReporterKind::resolve`] for the table.

pub mod digest;
pub mod network;
pub mod web;

use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::core::error::{Error, Result};
use crate::core::id::{IntoObjectId, validate_and_normalize};
use crate::core::models::{StorageMode, Target, TargetType};
use crate::core::storage::{Database, TargetLookup};

use self::digest::ReportDigest;
use self::network::{NetworkDedicatedReporter, NetworkReporter};
use self::web::{WebDedicatedReporter, WebReporter};

/// A report-generation strategy bound to one target.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn kind(&self) -> ReporterKind;

    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum ReporterKind {
    Web,
    WebDedicated,
    Network,
    NetworkDedicated,
}

impl ReporterKind {
    /// The dispatch table. Exhaustive over both axes, so adding a category or
    /// a storage mode will not compile until it is routed here.
    pub fn resolve(category: TargetType, mode: StorageMode) -> Self {
        match (category, mode) {
            (TargetType::Url, StorageMode::Shared) => ReporterKind::Web,
            (TargetType::Url, StorageMode::Dedicated) => ReporterKind::WebDedicated,
            (TargetType::Ip | TargetType::IpRange, StorageMode::Shared) => ReporterKind::Network,
            (TargetType::Ip | TargetType::IpRange, StorageMode::Dedicated) => ReporterKind::NetworkDedicated,
        }
    }

    pub fn select(target: &Target) -> Result<Self> {
        let category = target.category()?;
        Ok(Self::resolve(category, target.storage_mode()))
    }
}

/// Builds the reporter for a selected kind.
pub trait ReporterFactory: Send + Sync {
    fn build(&self, kind: ReporterKind, target: Target) -> Result<Box<dyn Reporter>>;
}

/// The production reporters, reading from the main database.
#[derive(Debug, Clone)]
pub struct LiveReporters {
    db: Database,
    sink: Option<mpsc::Sender<ReportDigest>>,
}

impl LiveReporters {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone(), sink: None }
    }

    /// Sends every finished digest to `sink` as well as logging it.
    pub fn with_sink(mut self, sink: mpsc::Sender<ReportDigest>) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl ReporterFactory for LiveReporters {
    fn build(&self, kind: ReporterKind, target: Target) -> Result<Box<dyn Reporter>> {
        let sink = self.sink.clone();
        Ok(match kind {
            ReporterKind::Web => Box::new(WebReporter::new(target, &self.db, sink)),
            ReporterKind::WebDedicated => Box::new(WebDedicatedReporter::new(target, &self.db, sink)?),
            ReporterKind::Network => Box::new(NetworkReporter::new(target, &self.db, sink)),
            ReporterKind::NetworkDedicated => Box::new(NetworkDedicatedReporter::new(target, &self.db, sink)?),
        })
    }
}

/// Resolves a target and runs the matching reporter. No retries: whatever
/// fails is returned to the caller.
pub struct Dispatcher<L, F> {
    targets: L,
    reporters: F,
}

impl<L: TargetLookup, F: ReporterFactory> Dispatcher<L, F> {
    pub fn new(targets: L, reporters: F) -> Self {
        Self { targets, reporters }
    }

    /// Runs the report for `target_id`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidIdentifier`] when the id is not a 24-hex object id.
    /// * [`Error::TargetNotFound`] when no record exists; no reporter is built.
    /// * [`Error::InvalidTargetCategory`] for an unknown `target_type`; no
    ///   reporter is built.
    /// * Anything the selected reporter returns.
    pub async fn run_report<I: IntoObjectId>(&self, target_id: I) -> Result<()> {
        let target_id = validate_and_normalize(target_id)?;
        let target = self
            .targets
            .find_by_id(&target_id)
            .await?
            .ok_or(Error::TargetNotFound(target_id))?;

        info!(
            target = %target.target_address,
            customer = %target.customer_username,
            "Running reporter."
        );

        let kind = match ReporterKind::select(&target) {
            Ok(kind) => kind,
            Err(e) => {
                error!(target_id = %target_id, target_type = %target.target_type, "Target has an unknown category.");
                return Err(e);
            }
        };

        info!(target_id = %target_id, reporter = %kind, "Selected reporter.");
        let reporter = self.reporters.build(kind, target)?;
        reporter.run().await
    }
}
