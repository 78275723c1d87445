//! # Punchclock Core
//!
//! Shared foundation for the Punchclock attendance automation engine:
//! time-clock event types, the `AttendanceApi` trait the automation layer is
//! written against, the TOML configuration model, and the error taxonomy.
//!
//! The remote attendance service is the single source of truth — nothing in
//! this workspace keeps a durable copy of the event log. Every higher layer
//! re-fetches today's events, derives the legal next action, and writes at
//! most one event per decision.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    ApiConfig, AppConfig, AutoClockOutAfterTime, AutoTimeClockConfig, BreakScheduleConfig,
    PowerMonitorConfig,
};
pub use error::{Error, Result};
pub use traits::AttendanceApi;
pub use types::{Notice, TimeClockEvent, TimeClockKind};
