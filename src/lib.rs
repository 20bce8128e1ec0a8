// src/lib.rs

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;

pub use crate::core::error::{Error, Result};
pub use crate::core::id::{ObjectId, validate_and_normalize};
pub use crate::core::reporter::{Dispatcher, LiveReporters, ReporterKind};
