//! # Punchclock Client
//!
//! The outbound side of the automation engine: a reqwest-based client for the
//! remote attendance service, and the token refresh guard that every call
//! passes through.
//!
//! The refresh contract is deliberately strict. A 401 may be answered with a
//! token refresh at most twice within one call chain; after that the chain is
//! abandoned with `AuthExpired` and the user has to re-authorize
//! interactively. A refresh token within 3 days of its expiry is treated as
//! already dead — better to demand re-auth early than to strand an unattended
//! machine with a token that dies overnight.

pub mod http;
pub mod token;

pub use http::AttendanceClient;
pub use token::{TokenRefreshGuard, TokenState};
