//! Punchclock configuration system.
//!
//! TOML file at `~/.punchclock/config.toml`. Every field has a serde default
//! so a partial file (or none at all) still produces a working config.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Business-day timezone (IANA name). All "what day is it" and "HH:MM"
    /// decisions are made in this zone, never in raw UTC offsets.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub break_schedule: BreakScheduleConfig,
    #[serde(default)]
    pub auto_time_clock: AutoTimeClockConfig,
    #[serde(default)]
    pub power_monitor: PowerMonitorConfig,
}

fn default_timezone() -> String {
    "Asia/Tokyo".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            api: ApiConfig::default(),
            break_schedule: BreakScheduleConfig::default(),
            auto_time_clock: AutoTimeClockConfig::default(),
            power_monitor: PowerMonitorConfig::default(),
        }
    }
}

/// OAuth client + token bookkeeping for the remote attendance service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry of the refresh token (service grants 90 days).
    #[serde(default)]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

fn default_redirect_uri() -> String {
    "urn:ietf:wg:oauth:2.0:oob".into()
}
fn default_base_url() -> String {
    "https://api.attendance.example.com".into()
}
fn default_token_url() -> String {
    "https://accounts.attendance.example.com/oauth/token".into()
}

/// Randomized daily break schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "HH:MM" in the business timezone.
    #[serde(default = "default_break_start")]
    pub break_start_time: String,
    /// "HH:MM" in the business timezone.
    #[serde(default = "default_break_end")]
    pub break_end_time: String,
    /// Uniform jitter applied to both times, in minutes (±).
    #[serde(default = "default_random_offset")]
    pub random_offset_minutes: u32,
}

fn default_break_start() -> String {
    "12:00".into()
}
fn default_break_end() -> String {
    "13:00".into()
}
fn default_random_offset() -> u32 {
    5
}

impl Default for BreakScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            break_start_time: default_break_start(),
            break_end_time: default_break_end(),
            random_offset_minutes: default_random_offset(),
        }
    }
}

/// Startup / shutdown / end-of-day automation toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTimeClockConfig {
    #[serde(default)]
    pub auto_clock_in_on_startup: bool,
    #[serde(default)]
    pub auto_clock_out_on_shutdown: bool,
    #[serde(default)]
    pub auto_clock_out_after_time: AutoClockOutAfterTime,
    /// Skip all automation on Saturday/Sunday. Defaults to true.
    #[serde(default = "default_true")]
    pub disable_weekends: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AutoTimeClockConfig {
    fn default() -> Self {
        Self {
            auto_clock_in_on_startup: false,
            auto_clock_out_on_shutdown: false,
            auto_clock_out_after_time: AutoClockOutAfterTime::default(),
            disable_weekends: true,
        }
    }
}

/// After this local time, suspend/lock clocks out instead of starting a break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoClockOutAfterTime {
    #[serde(default)]
    pub enabled: bool,
    /// "HH:MM" in the business timezone.
    #[serde(default = "default_clock_out_time")]
    pub time: String,
}

fn default_clock_out_time() -> String {
    "17:00".into()
}

impl Default for AutoClockOutAfterTime {
    fn default() -> Self {
        Self {
            enabled: false,
            time: default_clock_out_time(),
        }
    }
}

/// Auto-break mode: suspend/lock starts a break, resume/unlock ends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerMonitorConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl AppConfig {
    /// Load config from the default path (`~/.punchclock/config.toml`).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
        Ok(config)
    }

    /// Save config, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// `~/.punchclock/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".punchclock")
            .join("config.toml")
    }

    /// Parse the configured business timezone.
    pub fn business_timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::Config(format!("Unknown timezone: {}", self.timezone)))
    }
}
