//! Remote triage API access and hybrid inference routing.

pub mod http;
pub mod parse;
pub mod prompt;
pub mod router;
pub mod traits;
pub mod wire;
pub(crate) mod util;

// Re-exports for convenience.
pub use http::HttpTriageApi;
pub use router::{InferenceRouter, LocalOutcome, RouteOutcome, RoutePath};
pub use traits::TriageApi;
