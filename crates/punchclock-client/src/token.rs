//! Token refresh guard — bounded-retry OAuth bookkeeping.
//!
//! Pure state machine, no I/O. The HTTP client asks `begin_refresh` whether a
//! 401 may be answered with a refresh, performs the refresh itself, then
//! installs the new tokens via `complete_refresh`.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use punchclock_core::error::{Error, Result};

/// Max 401-triggered refreshes within a single call chain.
pub const MAX_REFRESH_ATTEMPTS: u32 = 2;
/// Service-documented refresh token lifetime.
pub const REFRESH_WINDOW_DAYS: i64 = 90;
/// Proactive margin: a refresh token this close to expiry is treated as dead.
pub const EXPIRY_SAFETY_MARGIN_DAYS: i64 = 3;

/// Mutable token bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute refresh-token expiry; `None` when never tracked.
    pub expires_at: Option<DateTime<Utc>>,
    /// 401-triggered refreshes in the current call chain.
    pub refresh_attempts: u32,
}

impl TokenState {
    pub fn new(access_token: String, refresh_token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            refresh_attempts: 0,
        }
    }
}

/// Guards every outbound call with the bounded-retry refresh contract.
///
/// Lock discipline: the mutex is only held for field reads/writes, never
/// across an await.
pub struct TokenRefreshGuard {
    state: Mutex<TokenState>,
}

impl TokenRefreshGuard {
    pub fn new(state: TokenState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Current access token (bearer value).
    pub fn access_token(&self) -> String {
        self.lock().access_token.clone()
    }

    /// Copy of the full state, for persistence.
    pub fn snapshot(&self) -> TokenState {
        self.lock().clone()
    }

    /// Called on a 401. Decides whether a refresh is allowed right now.
    ///
    /// Returns the refresh token to use. Raises `AuthExpired` when the
    /// attempt cap is hit (resetting the counter so a later manual re-auth
    /// starts clean) or when the refresh token is already inside its expiry
    /// safety margin.
    pub fn begin_refresh(&self, now: DateTime<Utc>) -> Result<String> {
        let mut state = self.lock();

        if state.refresh_attempts >= MAX_REFRESH_ATTEMPTS {
            tracing::warn!(
                "🔒 Refresh attempt cap ({}) hit — abandoning call chain",
                MAX_REFRESH_ATTEMPTS
            );
            state.refresh_attempts = 0;
            return Err(Error::AuthExpired);
        }

        if let Some(expires_at) = state.expires_at
            && now >= expires_at - Duration::days(EXPIRY_SAFETY_MARGIN_DAYS)
        {
            tracing::warn!("🔒 Refresh token expired (or inside safety margin) — re-auth required");
            return Err(Error::AuthExpired);
        }

        state.refresh_attempts += 1;
        tracing::debug!(
            "🔄 Token refresh attempt {}/{}",
            state.refresh_attempts,
            MAX_REFRESH_ATTEMPTS
        );
        Ok(state.refresh_token.clone())
    }

    /// Install tokens from a successful refresh; extends the expiry by the
    /// service's fixed 90-day window. The attempt counter stays — only a
    /// successful *response* resets it.
    pub fn complete_refresh(
        &self,
        access_token: String,
        refresh_token: String,
        now: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        state.access_token = access_token;
        state.refresh_token = refresh_token;
        state.expires_at = Some(now + Duration::days(REFRESH_WINDOW_DAYS));
    }

    /// A request in the chain got a successful response.
    pub fn note_success(&self) {
        self.lock().refresh_attempts = 0;
    }

    /// Install tokens from an interactive re-authorization. Resets the
    /// attempt counter and starts a fresh 90-day window.
    pub fn reauthorize(&self, access_token: String, refresh_token: String, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.access_token = access_token;
        state.refresh_token = refresh_token;
        state.expires_at = Some(now + Duration::days(REFRESH_WINDOW_DAYS));
        state.refresh_attempts = 0;
    }

    /// Whole days until the refresh token expires: `ceil((expiry − now)/1d)`,
    /// floored at 0. `None` when no expiry is tracked.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> Option<i64> {
        let expires_at = self.lock().expires_at?;
        let secs = (expires_at - now).num_seconds();
        if secs <= 0 {
            return Some(0);
        }
        // Ceiling division; secs is known positive here.
        Some((secs + 86_399) / 86_400)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenState> {
        // A poisoned lock only means another thread panicked mid-update;
        // token fields are always individually valid.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
