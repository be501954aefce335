//! HTTP client for the remote triage REST API.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use ht_domain::config::RemoteConfig;
use ht_domain::error::{Error, Result};
use ht_domain::trace::TraceEvent;
use ht_domain::triage::ImageBlob;

use crate::traits::TriageApi;
use crate::util::{decode, from_reqwest};
use crate::wire::{
    ContextPayload, CreateSessionRequest, InferenceRequest, SaveResultRequest, SessionPayload,
};

const CONTEXT_PATH: &str = "/records/context/";
const SESSIONS_PATH: &str = "/triage/sessions/";
const RESULTS_PATH: &str = "/triage/results/";
const INFERENCE_PATH: &str = "/triage/inference/";
const IMAGES_PATH: &str = "/triage/images/";

/// Typed client for the triage backend with retry on transient failures
/// and a `RemoteCall` trace per attempt.
pub struct HttpTriageApi {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpTriageApi {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.resolve_api_key() {
            let val = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| Error::Config(format!("invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, val);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── Internal HTTP helpers with retry + tracing ──────────────────

    /// Send the request built by `build`, retrying transient failures with
    /// exponential backoff. 4xx answers are returned immediately. On success
    /// returns the response body.
    async fn send<F>(&self, path: &str, build: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                tracing::debug!(endpoint = path, attempt, ?backoff, "retrying remote call");
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = build().send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let err = match result {
                Ok(resp) => {
                    let status = resp.status();
                    TraceEvent::RemoteCall {
                        endpoint: path.to_string(),
                        status: status.as_u16(),
                        duration_ms,
                    }
                    .emit();

                    match resp.text().await {
                        Ok(body) if status.is_success() => return Ok(body),
                        Ok(body) => {
                            let err = Error::Remote {
                                endpoint: path.to_string(),
                                message: format!(
                                    "HTTP {}: {}",
                                    status.as_u16(),
                                    truncate(&body, 300)
                                ),
                            };
                            // Don't retry client errors (4xx)
                            if status.is_client_error() {
                                return Err(err);
                            }
                            err
                        }
                        // A body cut off mid-read is a transport failure.
                        Err(e) => from_reqwest(e),
                    }
                }
                Err(e) => {
                    TraceEvent::RemoteCall {
                        endpoint: path.to_string(),
                        status: 0,
                        duration_ms,
                    }
                    .emit();
                    from_reqwest(e)
                }
            };

            tracing::warn!(endpoint = path, attempt, error = %err, "remote call failed");
            if !err.is_transient() {
                return Err(err);
            }
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| Error::Remote {
            endpoint: path.to_string(),
            message: "max retries exceeded".into(),
        }))
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        let text = self.send(path, || self.http.post(&url).json(body)).await?;
        decode(path, &text)
    }
}

#[async_trait::async_trait]
impl TriageApi for HttpTriageApi {
    async fn fetch_patient_context(&self) -> Result<String> {
        let url = self.url(CONTEXT_PATH);
        let text = self.send(CONTEXT_PATH, || self.http.get(&url)).await?;
        let payload: ContextPayload = decode(CONTEXT_PATH, &text)?;
        Ok(payload.context.unwrap_or_default())
    }

    async fn create_session(&self, req: &CreateSessionRequest) -> Result<SessionPayload> {
        self.post_json(SESSIONS_PATH, req).await
    }

    async fn create_result(&self, req: &SaveResultRequest) -> Result<()> {
        let _: serde_json::Value = self.post_json(RESULTS_PATH, req).await?;
        Ok(())
    }

    async fn create_inference(&self, req: &InferenceRequest) -> Result<SessionPayload> {
        self.post_json(INFERENCE_PATH, req).await
    }

    async fn upload_image(&self, session_id: &str, image: &ImageBlob) -> Result<()> {
        let url = self.url(IMAGES_PATH);
        // Multipart forms are consumed on send, so each attempt rebuilds one.
        let form = || -> Result<reqwest::multipart::Form> {
            let part = reqwest::multipart::Part::bytes(image.bytes.clone())
                .file_name(image.filename.clone())
                .mime_str(&image.content_type)
                .map_err(from_reqwest)?;
            Ok(reqwest::multipart::Form::new()
                .text("session_id", session_id.to_string())
                .part("image", part))
        };
        // Validate the content type once before entering the retry loop.
        form()?;

        self.send(IMAGES_PATH, || match form() {
            Ok(f) => self.http.post(&url).multipart(f),
            Err(_) => self.http.post(&url),
        })
        .await?;
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
