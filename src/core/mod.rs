// src/core/mod.rs

/// Error taxonomy shared by storage and dispatch.
pub mod error;

/// Object identifiers and the validator applied to every external id.
pub mod id;

/// Targets, findings and the enumerations they are built from.
pub mod models;

/// SQLite-backed stores: targets, shared findings, dedicated findings.
pub mod storage;

/// Reporter strategies and the dispatcher choosing between them.
pub mod reporter;

pub mod timefmt;
