//! On-device model lifecycle.
//!
//! Owns the single local inference engine: capability probing, cancellable
//! weight download and load with progress reporting, readiness, chat
//! generation, and unload.

pub mod engine;
pub mod loader;
pub mod manager;
pub mod probe;

pub use engine::{ChatEngine, LocalEngine};
pub use loader::{EngineLoader, HttpEngineLoader, LoadContext, PrebuiltLoader, ProgressSink};
pub use manager::{ModelManager, ModelState, ProgressCallback};
pub use probe::{CapabilityProbe, DeviceProbe, FixedProbe};
