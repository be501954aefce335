//! Offline session store.
//!
//! Persists triage sessions in `offline_sessions.json` under
//! `<state_path>/sessions/`. The file holds a map of session id to
//! [`OfflineSession`] and is rewritten atomically after every mutation.
//! The file is opened lazily on first use, exactly once per store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use parking_lot::RwLock;
use tokio::sync::OnceCell;

use ht_domain::error::{Error, Result};
use ht_domain::session::OfflineSession;
use ht_domain::trace::TraceEvent;
use ht_domain::triage::{ImageBlob, TriageResultData, TriageSource};

/// Number of sessions returned by a history read when the caller has no
/// preference.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

const FILE_NAME: &str = "offline_sessions.json";

/// Build a `data:` URL for an image so it can be kept alongside its session.
pub fn image_data_url(image: &ImageBlob) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
    format!("data:{};base64,{encoded}", image.content_type)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backing file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Records {
    path: PathBuf,
    sessions: RwLock<HashMap<String, OfflineSession>>,
}

impl Records {
    fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Store(format!("creating {}: {e}", dir.display())))?;

        let path = dir.join(FILE_NAME);
        let sessions = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Store(format!("reading {}: {e}", path.display())))?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    let backup = path.with_extension("json.corrupt");
                    std::fs::rename(&path, &backup).map_err(|re| {
                        Error::Store(format!("moving aside {}: {re}", path.display()))
                    })?;
                    tracing::warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "offline session file is corrupt, kept a copy and starting empty"
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %path.display(),
            "offline store loaded"
        );

        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    /// Apply `f` to the map and persist. If the write fails the in-memory
    /// map is restored so memory and disk never disagree.
    fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<String, OfflineSession>) -> R) -> Result<R> {
        let mut sessions = self.sessions.write();
        let before = sessions.clone();
        let out = f(&mut sessions);
        if let Err(e) = write_atomic(&self.path, &sessions) {
            *sessions = before;
            return Err(e);
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, sessions: &HashMap<String, OfflineSession>) -> Result<()> {
    let json = serde_json::to_string_pretty(sessions)
        .map_err(|e| Error::Store(format!("serializing sessions: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Store(format!("writing {}: {e}", tmp.display())));
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::Store(format!("replacing {}: {e}", path.display())))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Offline store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable store of triage sessions, shared by every caller of a façade.
pub struct OfflineStore {
    state_path: PathBuf,
    records: OnceCell<Records>,
}

impl OfflineStore {
    /// Create a handle rooted at `state_path`. Nothing touches the disk until
    /// the first operation.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            records: OnceCell::new(),
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.state_path.join("sessions").join(FILE_NAME)
    }

    async fn records(&self) -> Result<&Records> {
        self.records
            .get_or_try_init(|| async { Records::open(&self.state_path) })
            .await
    }

    /// Insert or replace the session `id`. It counts as synced when it
    /// already carries a result.
    pub async fn save_session(
        &self,
        id: &str,
        symptoms: &str,
        source: TriageSource,
        result: Option<TriageResultData>,
        image_data_url: Option<String>,
    ) -> Result<()> {
        let records = self.records().await?;
        let synced = result.is_some();
        let session = OfflineSession {
            id: id.to_owned(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            symptoms: symptoms.to_owned(),
            source,
            result,
            synced,
            image_data_url,
        };

        records.mutate(|map| {
            map.insert(id.to_owned(), session);
        })?;

        TraceEvent::SessionPersisted {
            session_id: id.to_owned(),
            synced,
        }
        .emit();
        Ok(())
    }

    /// Attach a result to an existing session and mark it synced. Unknown
    /// ids are ignored.
    pub async fn update_result(&self, id: &str, result: TriageResultData) -> Result<()> {
        let records = self.records().await?;
        let updated = records.mutate(|map| match map.get_mut(id) {
            Some(session) => {
                session.result = Some(result);
                session.synced = true;
                true
            }
            None => false,
        })?;

        if updated {
            TraceEvent::SessionPersisted {
                session_id: id.to_owned(),
                synced: true,
            }
            .emit();
        } else {
            tracing::debug!(session_id = id, "update_result for unknown session ignored");
        }
        Ok(())
    }

    /// Attach a result to the pending session `pending_id` and re-key it
    /// under the result's session id, keeping its submission data. Returns
    /// `false` when no such pending session exists.
    pub async fn settle_pending(&self, pending_id: &str, result: TriageResultData) -> Result<bool> {
        let records = self.records().await?;
        let session_id = result.session_id.clone();
        let settled = records.mutate(|map| match map.remove(pending_id) {
            Some(mut session) => {
                session.id = session_id.clone();
                session.result = Some(result);
                session.synced = true;
                map.insert(session_id.clone(), session);
                true
            }
            None => false,
        })?;

        if settled {
            tracing::debug!(pending_id, session_id = %session_id, "pending session settled");
            TraceEvent::SessionPersisted {
                session_id,
                synced: true,
            }
            .emit();
        }
        Ok(settled)
    }

    /// Up to `limit` sessions, newest first.
    pub async fn get_history(&self, limit: usize) -> Result<Vec<OfflineSession>> {
        let records = self.records().await?;
        let mut all: Vec<OfflineSession> = records.sessions.read().values().cloned().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        all.truncate(limit);
        Ok(all)
    }

    /// Every session not yet synced, oldest first.
    pub async fn get_unsynced(&self) -> Result<Vec<OfflineSession>> {
        let records = self.records().await?;
        let mut pending: Vec<OfflineSession> = records
            .sessions
            .read()
            .values()
            .filter(|s| !s.synced)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.timestamp);
        Ok(pending)
    }

    pub async fn mark_synced(&self, id: &str) -> Result<()> {
        let records = self.records().await?;
        records.mutate(|map| {
            if let Some(session) = map.get_mut(id) {
                session.synced = true;
            }
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<OfflineSession>> {
        let records = self.records().await?;
        let session = records.sessions.read().get(id).cloned();
        Ok(session)
    }

    pub async fn len(&self) -> Result<usize> {
        let records = self.records().await?;
        let len = records.sessions.read().len();
        Ok(len)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove every session.
    pub async fn clear(&self) -> Result<()> {
        let records = self.records().await?;
        let removed = records.mutate(|map| {
            let n = map.len();
            map.clear();
            n
        })?;
        tracing::info!(removed, "offline store cleared");
        Ok(())
    }
}
