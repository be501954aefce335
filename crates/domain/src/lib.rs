//! Shared types for the health triage core: the canonical triage result,
//! model lifecycle status, offline session records, configuration, the
//! common error type, and structured trace events.

pub mod config;
pub mod error;
pub mod model;
pub mod session;
pub mod trace;
pub mod triage;

pub use error::{Error, Result};
pub use model::{ModelProgress, ModelStatus};
pub use session::OfflineSession;
pub use triage::{
    DifferentialDiagnosis, ImageBlob, InferenceMode, Severity, TriageInput, TriageResultData,
    TriageSource,
};
