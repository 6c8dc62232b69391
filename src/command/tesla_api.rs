use super::{Command, CommandExecutor};
use crate::config::ApiConfig;
use crate::error::SyncError;
use crate::store::VehicleStore;
use crate::vehicle::VehicleIdentity;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: Option<CommandResult>,
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandResult {
    result: bool,
    #[serde(default)]
    reason: String,
}

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Executes commands through the Tesla owner API.
///
/// The bearer token is the one TeslaMate keeps refreshed in its `tokens`
/// table; it is re-read after `token_cache_seconds` or a 401.
pub struct TeslaApiExecutor {
    http_client: Client,
    base_url: String,
    store: Arc<dyn VehicleStore>,
    token: Mutex<Option<CachedToken>>,
    token_ttl: Duration,
}

impl TeslaApiExecutor {
    pub fn new(config: &ApiConfig, store: Arc<dyn VehicleStore>) -> Result<Self, SyncError> {
        let http_client = Client::builder()
            .user_agent(concat!("teslabuddy/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.tesla_api_url.trim_end_matches('/').to_string(),
            store,
            token: Mutex::new(None),
            token_ttl: Duration::from_secs(config.token_cache_seconds),
        })
    }

    async fn token(&self) -> Result<String, SyncError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.fetched_at.elapsed() < self.token_ttl {
                return Ok(token.value.clone());
            }
        }

        let value = self.store.access_token().await.map_err(SyncError::into_runtime)?;
        *cached = Some(CachedToken {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

const LIMIT_OK: &[&str] = &["already_set"];
const START_OK: &[&str] = &["charging", "complete"];
const STOP_OK: &[&str] = &["not_charging"];

/// Endpoint name, JSON body and the failure reasons that still mean the
/// vehicle ended up in the requested state.
fn request_for(command: Command) -> (&'static str, serde_json::Value, &'static [&'static str]) {
    match command {
        Command::SetChargeLimit(percent) => {
            ("set_charge_limit", json!({ "percent": percent }), LIMIT_OK)
        }
        Command::StartCharging => ("charge_start", json!({}), START_OK),
        Command::StopCharging => ("charge_stop", json!({}), STOP_OK),
    }
}

fn check_response_status(status: StatusCode) -> Result<(), SyncError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(SyncError::Upstream(
            "Tesla API auth error: token expired or invalid".to_string(),
        )),
        StatusCode::REQUEST_TIMEOUT => Err(SyncError::Upstream(
            "vehicle unavailable (asleep or offline)".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(SyncError::Upstream("Tesla API rate limit hit".to_string()))
        }
        s if s.is_server_error() => Err(SyncError::Upstream(format!("Tesla API error: {}", s))),
        _ => Ok(()),
    }
}

#[async_trait]
impl CommandExecutor for TeslaApiExecutor {
    async fn execute(&self, vehicle: &VehicleIdentity, command: Command) -> Result<(), SyncError> {
        let (endpoint, body, ok_reasons) = request_for(command);
        let url = format!(
            "{}/api/1/vehicles/{}/command/{}",
            self.base_url, vehicle.api_id, endpoint
        );
        let token = self.token().await?;

        debug!(vin = %vehicle.vin, endpoint, "Calling Tesla API");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_token().await;
        }
        check_response_status(status)?;

        let envelope: ApiEnvelope = response.json().await.map_err(|e| {
            SyncError::Upstream(format!("unexpected Tesla API response ({}): {}", status, e))
        })?;

        if let Some(error) = envelope.error {
            let description = envelope.error_description.unwrap_or_default();
            return Err(SyncError::Upstream(
                format!("{} {}", error, description).trim().to_string(),
            ));
        }

        let result = envelope
            .response
            .ok_or_else(|| SyncError::Upstream("empty Tesla API response".to_string()))?;

        if result.result || ok_reasons.contains(&result.reason.as_str()) {
            info!(vin = %vehicle.vin, command = %command, reason = %result.reason, "Command accepted");
            Ok(())
        } else {
            Err(SyncError::Upstream(format!(
                "{} refused: {}",
                endpoint, result.reason
            )))
        }
    }
}
