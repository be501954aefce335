//! The triage engine façade: one stateful entry point over model
//! lifecycle, routing, local persistence, and connectivity.

pub mod bootstrap;
pub mod connectivity;
pub mod facade;
pub mod state;

pub use connectivity::{ConnectivitySource, ManualConnectivity, ProbeConnectivity};
pub use facade::TriageEngine;
pub use state::{EngineMode, EngineState};
