//! HTTP client for the remote attendance service.
//!
//! Every request runs through `send_with_refresh`, which owns the 401 →
//! refresh → retry loop. The guard decides whether a refresh is still
//! allowed; this module only moves bytes.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;

use punchclock_core::config::AppConfig;
use punchclock_core::error::{Error, Result};
use punchclock_core::traits::AttendanceApi;
use punchclock_core::types::{TimeClockEvent, TimeClockKind};

use crate::token::{TokenRefreshGuard, TokenState};

/// Reqwest-backed implementation of `AttendanceApi`.
pub struct AttendanceClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    company_id: i64,
    employee_id: i64,
    /// Business-day timezone: base_date and datetime are stamped in this zone.
    tz: Tz,
    guard: TokenRefreshGuard,
    /// Invoked after every token change so the host can persist it.
    on_tokens: Option<Arc<dyn Fn(TokenState) + Send + Sync>>,
}

impl AttendanceClient {
    /// Build from config. Fails when authorization has never been completed
    /// (missing tokens or employee/company ids).
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api = &config.api;
        let access_token = api
            .access_token
            .clone()
            .ok_or_else(|| Error::Config("No access token — run authorization first".into()))?;
        let refresh_token = api
            .refresh_token
            .clone()
            .ok_or_else(|| Error::Config("No refresh token — run authorization first".into()))?;
        let company_id = api
            .company_id
            .ok_or_else(|| Error::Config("Missing api.company_id".into()))?;
        let employee_id = api
            .employee_id
            .ok_or_else(|| Error::Config("Missing api.employee_id".into()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            token_url: api.token_url.clone(),
            client_id: api.client_id.clone(),
            client_secret: api.client_secret.clone(),
            company_id,
            employee_id,
            tz: config.business_timezone()?,
            guard: TokenRefreshGuard::new(TokenState::new(
                access_token,
                refresh_token,
                api.refresh_token_expires_at,
            )),
            on_tokens: None,
        })
    }

    /// Register a callback fired after every token change (refresh or manual
    /// re-auth) so the config store can save the new state.
    pub fn set_token_listener<F>(&mut self, f: F)
    where
        F: Fn(TokenState) + Send + Sync + 'static,
    {
        self.on_tokens = Some(Arc::new(f));
    }

    /// Current token state, for persistence and status display.
    pub fn token_snapshot(&self) -> TokenState {
        self.guard.snapshot()
    }

    /// Days until the refresh token expires (see guard for the rounding).
    pub fn token_remaining_days(&self) -> Option<i64> {
        self.guard.remaining_days(Utc::now())
    }

    fn time_clocks_url(&self) -> String {
        format!(
            "{}/hr/api/v1/employees/{}/time_clocks",
            self.base_url, self.employee_id
        )
    }

    /// Send a request, transparently refreshing the access token on 401.
    ///
    /// Loops rather than retrying a fixed once: each 401 consumes one guard
    /// attempt, and the guard abandons the chain with `AuthExpired` when the
    /// cap is hit.
    async fn send_with_refresh<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        loop {
            let resp = build()
                .bearer_auth(self.guard.access_token())
                .send()
                .await
                .map_err(|e| Error::Http(format!("attendance service unreachable: {e}")))?;

            if resp.status() == StatusCode::UNAUTHORIZED {
                let refresh_token = self.guard.begin_refresh(Utc::now())?;
                self.refresh_access_token(&refresh_token).await?;
                continue;
            }

            if resp.status().is_success() {
                self.guard.note_success();
            }
            return Ok(resp);
        }
    }

    /// Exchange the refresh token for a new access/refresh pair.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.token_url)
            .json(&json!({
                "grant_type": "refresh_token",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("token endpoint unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!("⚠️ Token refresh rejected ({status}): {message}");
            return Err(Error::Api { status, message });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("malformed token response: {e}")))?;
        let access = body["access_token"]
            .as_str()
            .ok_or_else(|| Error::Http("token response missing access_token".into()))?;
        let refresh = body["refresh_token"]
            .as_str()
            .ok_or_else(|| Error::Http("token response missing refresh_token".into()))?;

        self.guard
            .complete_refresh(access.to_string(), refresh.to_string(), Utc::now());
        tracing::info!("🔑 Access token refreshed");
        self.notify_tokens();
        Ok(())
    }

    /// Install tokens obtained from an interactive re-authorization.
    pub fn install_tokens(&self, access_token: String, refresh_token: String) {
        self.guard
            .reauthorize(access_token, refresh_token, Utc::now());
        self.notify_tokens();
    }

    fn notify_tokens(&self) {
        if let Some(listener) = &self.on_tokens {
            listener(self.guard.snapshot());
        }
    }
}

#[async_trait]
impl AttendanceApi for AttendanceClient {
    async fn record_event(&self, kind: TimeClockKind) -> Result<TimeClockEvent> {
        let now_local = Utc::now().with_timezone(&self.tz);
        let url = self.time_clocks_url();
        let body = json!({
            "company_id": self.company_id,
            "type": kind.as_str(),
            "base_date": now_local.date_naive().to_string(),
            "datetime": now_local.to_rfc3339(),
        });

        let resp = self
            .send_with_refresh(|| self.http.post(&url).json(&body))
            .await?;
        let status = resp.status();

        // The service answers 400/422 when the action is not legal for the
        // current state (e.g. break_end while not on break).
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let message = resp.text().await.unwrap_or_default();
            tracing::debug!("Rejected {kind}: {message}");
            return Err(Error::IllegalTransition(kind));
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("malformed time clock response: {e}")))?;
        let event = parse_event(&json["employee_time_clock"])
            .ok_or_else(|| Error::Http("time clock response missing event fields".into()))?;
        tracing::info!("⏱️ Recorded {} (id {})", event.kind, event.id);
        Ok(event)
    }

    async fn list_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<TimeClockEvent>> {
        let url = self.time_clocks_url();
        let company_id = self.company_id.to_string();
        let from = from.to_string();
        let to = to.to_string();

        let resp = self
            .send_with_refresh(|| {
                self.http.get(&url).query(&[
                    ("company_id", company_id.as_str()),
                    ("from_date", from.as_str()),
                    ("to_date", to.as_str()),
                ])
            })
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::Http(format!("malformed time clocks response: {e}")))?;
        Ok(sorted_events(&json))
    }
}

/// Parse one event object. Returns `None` on unknown types or missing fields
/// rather than failing a whole listing.
fn parse_event(value: &Value) -> Option<TimeClockEvent> {
    Some(TimeClockEvent {
        id: value["id"].as_i64()?,
        kind: TimeClockKind::parse(value["type"].as_str()?)?,
        datetime: chrono::DateTime::parse_from_rfc3339(value["datetime"].as_str()?)
            .ok()?
            .with_timezone(&Utc),
    })
}

/// Extract the event array and sort ascending by `(datetime, id)`.
fn sorted_events(json: &Value) -> Vec<TimeClockEvent> {
    let mut events: Vec<TimeClockEvent> = json
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(parse_event)
        .collect();
    events.sort_by_key(TimeClockEvent::sort_key);
    events
}
