// Source client module
// Fetches rank pages, detail pages and score pages from the upstream provider

pub mod parser;
pub mod snapshot;


use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use url::Url;

use crate::config::{BASE_URL_ENV, SourceConfig};
use crate::{IngestError, Result};

pub use parser::{html_to_text, parse_detail, parse_scores, parse_summary};
pub use snapshot::{RankSnapshot, RankSnapshotStore};

/// Envelope code reported on success
pub const SUCCESS_CODE: i64 = 0;
/// Envelope code reported when the requested item does not exist
pub const NOT_FOUND_CODE: i64 = 404;

/// Envelope keys that never belong to the payload
const ENVELOPE_KEYS: [&str; 4] = ["code", "error", "message", "msg"];

/// Capability of fetching raw catalog payloads.
///
/// Absence reported by the upstream envelope is `Ok(None)` (or an empty page);
/// transport failures, HTTP errors and any other envelope code are errors.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw elements of one rank list page; empty at the end of data
    async fn fetch_summary_page(
        &self,
        section_id: i64,
        page_index: u32,
        page_size: u32,
    ) -> Result<Vec<Value>>;

    async fn fetch_detail(&self, item_id: i64) -> Result<Option<Value>>;

    async fn fetch_scores_and_reviews(
        &self,
        item_id: i64,
        page_index: u32,
        page_size: u32,
    ) -> Result<Option<Value>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRequest {
    game_id: i64,
    page_index: u32,
    page_size: u32,
}

/// `CatalogSource` over the provider's HTTP JSON API
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    agent: Agent,
    base_url: String,
}

impl HttpCatalogSource {
    /// Build a client from the source settings.
    ///
    /// Fails with `IngestError::Configuration` when no base URL is configured,
    /// so a run never starts fetching without one.
    #[inline]
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                IngestError::Configuration(format!(
                    "Upstream base URL is not configured (set {} or source.base_url)",
                    BASE_URL_ENV
                ))
            })?;

        Url::parse(base_url).map_err(|e| {
            IngestError::Configuration(format!("Invalid upstream base URL {}: {}", base_url, e))
        })?;

        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Ok(Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a blocking request on the blocking pool and unwrap the envelope
    async fn execute<F>(&self, endpoint: String, request_fn: F) -> Result<Option<Value>>
    where
        F: FnOnce(&Agent, &str) -> std::result::Result<String, ureq::Error> + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Requesting {}", url);

        let body = tokio::task::spawn_blocking(move || {
            request_fn(&agent, &url).map_err(|error| request_error(&url, &error))
        })
        .await
        .map_err(|e| IngestError::Upstream(format!("Request task failed: {}", e)))??;

        unwrap_envelope(&body, &endpoint)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch_summary_page(
        &self,
        section_id: i64,
        page_index: u32,
        page_size: u32,
    ) -> Result<Vec<Value>> {
        let payload = self
            .execute("/rank".to_string(), move |agent, url| {
                agent
                    .get(url)
                    .query("rankId", section_id.to_string())
                    .query("pageSize", page_size.to_string())
                    .query("pageIndex", page_index.to_string())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await?;

        let elements = payload
            .as_ref()
            .and_then(|payload| payload.get("listElements"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        debug!(
            "Rank {} page {} returned {} elements",
            section_id,
            page_index,
            elements.len()
        );
        Ok(elements)
    }

    async fn fetch_detail(&self, item_id: i64) -> Result<Option<Value>> {
        self.execute(format!("/game/{}", item_id), |agent, url| {
            agent
                .get(url)
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .await
    }

    async fn fetch_scores_and_reviews(
        &self,
        item_id: i64,
        page_index: u32,
        page_size: u32,
    ) -> Result<Option<Value>> {
        let request = ScoreRequest {
            game_id: item_id,
            page_index,
            page_size,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| IngestError::Upstream(format!("Failed to serialize score request: {}", e)))?;

        self.execute(format!("/game/{}/scores", item_id), move |agent, url| {
            agent
                .post(url)
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .await
    }
}

fn request_error(url: &str, error: &ureq::Error) -> IngestError {
    match error {
        ureq::Error::StatusCode(status) => {
            IngestError::Upstream(format!("HTTP {} from {}", status, url))
        }
        other => IngestError::Upstream(format!("Request to {} failed: {}", url, other)),
    }
}

/// Check the envelope code and extract the payload.
///
/// The payload is the `data` object when there is one, otherwise the envelope
/// itself without its bookkeeping keys. The not-found code yields `None`.
pub(crate) fn unwrap_envelope(body: &str, endpoint: &str) -> Result<Option<Value>> {
    let envelope: Value = serde_json::from_str(body).map_err(|e| {
        IngestError::Upstream(format!("Malformed response from {}: {}", endpoint, e))
    })?;

    let Value::Object(mut fields) = envelope else {
        return Err(IngestError::Upstream(format!(
            "Malformed response from {}: envelope is not an object",
            endpoint
        )));
    };

    let code = fields.get("code").and_then(Value::as_i64).ok_or_else(|| {
        IngestError::Upstream(format!(
            "Malformed response from {}: missing envelope code",
            endpoint
        ))
    })?;

    match code {
        SUCCESS_CODE => {}
        NOT_FOUND_CODE => {
            debug!("{} reported not found", endpoint);
            return Ok(None);
        }
        _ => {
            let message = ["error", "message", "msg"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .unwrap_or("no message");
            return Err(IngestError::Upstream(format!(
                "{} returned code {}: {}",
                endpoint, code, message
            )));
        }
    }

    if let Some(Value::Object(data)) = fields.remove("data") {
        return Ok(Some(Value::Object(data)));
    }

    let payload: Map<String, Value> = fields
        .into_iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .collect();
    Ok(Some(Value::Object(payload)))
}
