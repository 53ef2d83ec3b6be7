pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod storage;

pub use error::{PullError, Result, StorageError};
pub use job::{FailureKind, JobOutcome, JobReport, PulledEventJob};
