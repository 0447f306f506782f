//! HTTP status client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use super::{AggregateStatus, DenialReason, PlatformStatus, ProcessingState, StatusClient};
use crate::error::{ConfigError, StatusError};
use crate::platform::Platform;

/// Backend endpoint configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Optional bearer token sent on every request.
    pub api_token: Option<SecretString>,
    /// Per-request cap.
    pub query_timeout: Duration,
}

impl BackendConfig {
    /// Read `DASHGATE_API_URL` and the optional `DASHGATE_API_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("DASHGATE_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DASHGATE_API_URL".to_string()))?;
        let api_token = std::env::var("DASHGATE_API_TOKEN")
            .ok()
            .map(SecretString::from);

        Ok(Self {
            base_url,
            api_token,
            query_timeout: Duration::from_secs(5),
        })
    }
}

// ── Wire payloads (camelCase, as the backend serves them) ───────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformStatusPayload {
    access_allowed: bool,
    reason: Option<String>,
    redirect_to: Option<String>,
    processing_data: Option<ProcessingDataPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingDataPayload {
    remaining_minutes: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingWindowPayload {
    start_time: i64,
    end_time: i64,
}

/// Status client speaking the backend's REST contract.
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
    query_timeout: Duration,
}

impl HttpStatusClient {
    pub fn new(config: BackendConfig) -> Result<Self, StatusError> {
        let client = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()
            .map_err(|e| StatusError::Connection {
                endpoint: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
            query_timeout: config.query_timeout,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, StatusError> {
        let mut request = self.client.get(endpoint);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StatusError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.query_timeout,
                }
            } else {
                StatusError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StatusError::Payload {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn status_for(&self, user: &str, platform: Platform) -> PlatformStatus {
        let endpoint = self.api_url(&format!("/api/users/{user}/platforms/{platform}/status"));

        match self.get_json::<PlatformStatusPayload>(&endpoint).await {
            Ok(payload) => PlatformStatus::Confirmed {
                access_allowed: payload.access_allowed,
                reason: payload.reason.as_deref().map(DenialReason::parse),
                redirect_to: payload.redirect_to,
                remaining: payload
                    .processing_data
                    .and_then(|d| Duration::try_from_secs_f64(d.remaining_minutes * 60.0).ok()),
            },
            Err(e) => {
                warn!(platform = %platform, error = %e, "Status query failed, reporting unreachable");
                PlatformStatus::Unreachable
            }
        }
    }

    async fn status_all(&self, user: &str) -> AggregateStatus {
        let endpoint = self.api_url(&format!("/api/users/{user}/status"));

        match self
            .get_json::<HashMap<String, ProcessingWindowPayload>>(&endpoint)
            .await
        {
            Ok(payload) => {
                let mut windows = HashMap::with_capacity(payload.len());
                for (name, window) in payload {
                    let Some(platform) = Platform::parse(&name) else {
                        warn!(platform = %name, "Unknown platform in aggregate status, skipping");
                        continue;
                    };
                    let (Some(start_time), Some(end_time)) = (
                        DateTime::from_timestamp_millis(window.start_time),
                        DateTime::from_timestamp_millis(window.end_time),
                    ) else {
                        warn!(platform = %name, "Out-of-range processing window, skipping");
                        continue;
                    };
                    windows.insert(
                        platform,
                        ProcessingState {
                            platform,
                            start_time,
                            end_time,
                        },
                    );
                }
                AggregateStatus::Confirmed(windows)
            }
            Err(e) => {
                warn!(error = %e, "Aggregate status query failed, reporting unreachable");
                AggregateStatus::Unreachable
            }
        }
    }
}
