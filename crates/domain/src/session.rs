use serde::{Deserialize, Serialize};

use crate::triage::{TriageResultData, TriageSource};

/// A triage session as kept in the on-device store.
///
/// Created at submission time (possibly without a result) and updated in
/// place once a result arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSession {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub symptoms: String,
    pub source: TriageSource,
    pub result: Option<TriageResultData>,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data_url: Option<String>,
}
