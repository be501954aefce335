//! On-device persistence for triage sessions.
//!
//! Sessions survive restarts so work done offline can be reviewed and later
//! synced to the remote service.

pub mod store;

pub use store::{image_data_url, OfflineStore, DEFAULT_HISTORY_LIMIT};
