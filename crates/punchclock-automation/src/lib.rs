//! # Punchclock Automation
//!
//! The orchestration engine: derives the legal next time-clock action from
//! the remote event log, fires randomized daily breaks, and reacts to OS
//! power-state signals.
//!
//! Three independent triggers share one piece of server-side truth:
//!
//! ```text
//! tokio interval (1/min) ──► BreakScheduleEngine.check_and_execute
//!                                 │ gate: resolver::can_execute
//! OS signals ──► PowerEventAutomator.handle(signal)
//!                                 │ gate: resolver + priority chain
//! process start ──► PowerSignal::Startup
//!                                 ▼
//!                        AttendanceApi (remote, authoritative)
//! ```
//!
//! No mutual exclusion is imposed across trigger sources. Both paths
//! re-fetch today's events before writing, and the remote service is the
//! final arbiter — an illegal-transition rejection from a race is a no-op,
//! not a failure.

pub mod day;
pub mod notify;
pub mod power;
pub mod resolver;
pub mod schedule;

pub use notify::Notifier;
pub use power::{PowerEventAutomator, PowerMonitor, PowerSignal};
pub use schedule::{BreakScheduleEngine, ScheduledBreak, spawn_schedule_loop};

#[cfg(test)]
pub(crate) mod testutil;
