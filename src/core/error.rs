// src/core/error.rs

use thiserror::Error;

use crate::core::id::ObjectId;

/// Every way a storage call or a report dispatch can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unable to find the target with object id {0}")]
    TargetNotFound(ObjectId),

    #[error("invalid target category '{0}'")]
    InvalidTargetCategory(String),

    #[error("invalid alert status {0}: only unfixed (0) and fixed (1) can be listed")]
    InvalidAlertStatus(i64),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("storage mode of target {0} cannot change once scanning has begun")]
    StorageModeLocked(ObjectId),

    #[error("scan results for target {0} could not be read")]
    ResultsUnavailable(ObjectId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
