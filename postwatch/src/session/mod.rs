//! Session liveness and cookie refresh.
//!
//! # Architecture
//!
//! - [`SessionCredential`]: the portal cookie
//! - [`SessionState`]: credential plus liveness flag and cooldown stamps
//! - [`SessionCoordinator`]: gate + cooldown-gated refresh state machine
//! - [`CredentialSink`]: persists refreshed cookies
//!
//! The re-authentication procedure itself lives in [`crate::reauth`].

mod coordinator;
mod credential;
mod error;
mod sink;
mod state;
mod tracker;

pub use coordinator::{GateGuard, RefreshConfig, RefreshOutcome, SessionCoordinator};
pub use credential::{DEFAULT_COOKIE_NAME, SessionCredential};
pub use error::RefreshError;
pub use sink::{CredentialSink, EnvFileSink};
pub use state::{BeginRefresh, RefreshPhase, SessionState};
pub use tracker::{FailureInfo, RefreshFailureTracker, should_notify_failure};
