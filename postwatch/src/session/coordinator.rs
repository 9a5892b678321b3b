//! Session coordinator.
//!
//! Owns the session state, the mutual-exclusion gate around credential use, and
//! the cooldown-gated refresh state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::credential::SessionCredential;
use super::error::RefreshError;
use super::sink::CredentialSink;
use super::state::{BeginRefresh, RefreshPhase, SessionState};
use super::tracker::{FailureInfo, RefreshFailureTracker};
use crate::reauth::Reauthenticator;

/// Timing policy for credential refreshes.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Minimum spacing between the starts of two refresh attempts.
    pub cooldown: Duration,
    /// Upper bound for one re-authentication procedure.
    pub reauth_timeout: Duration,
    /// Expected credential lifetime (hint only).
    pub credential_lifetime: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2 * 60),
            reauth_timeout: Duration::from_secs(120),
            credential_lifetime: Duration::from_secs(5 * 3600),
        }
    }
}

/// What a call to [`SessionCoordinator::refresh_if_due`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The credential is not marked invalid.
    NotNeeded,
    /// The credential is invalid but the previous attempt is too recent.
    CoolingDown { remaining: Duration },
    /// A new credential was obtained and committed.
    Refreshed,
    /// The attempt failed; the liveness flag is set again.
    Failed {
        reason: String,
        consecutive_failures: u32,
    },
}

/// Proof that the caller holds the session gate.
///
/// Fetches and refreshes that must not interleave take one of these.
pub struct GateGuard<'a> {
    issuer: &'a SessionCoordinator,
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

/// Coordinates credential reads, invalidation and refresh.
pub struct SessionCoordinator {
    state: Mutex<SessionState>,
    gate: tokio::sync::Mutex<()>,
    reauthenticator: Arc<dyn Reauthenticator>,
    sink: Option<Arc<dyn CredentialSink>>,
    failure_tracker: RefreshFailureTracker,
    config: RefreshConfig,
}

impl SessionCoordinator {
    /// Create a coordinator seeded with the configured credential.
    pub fn new(
        seed: SessionCredential,
        reauthenticator: Arc<dyn Reauthenticator>,
        config: RefreshConfig,
    ) -> Self {
        Self::with_state(SessionState::new(seed, Utc::now()), reauthenticator, config)
    }

    /// Create a coordinator from an existing state snapshot.
    pub fn with_state(
        state: SessionState,
        reauthenticator: Arc<dyn Reauthenticator>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            gate: tokio::sync::Mutex::new(()),
            reauthenticator,
            sink: None,
            failure_tracker: RefreshFailureTracker::new(),
            config,
        }
    }

    /// Persist refreshed credentials through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn CredentialSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Acquire the gate. Waits for any fetch or refresh in progress.
    pub async fn enter(&self) -> GateGuard<'_> {
        GateGuard {
            issuer: self,
            _guard: self.gate.lock().await,
        }
    }

    /// Current credential. Never waits on the gate.
    pub fn credential(&self) -> SessionCredential {
        self.state.lock().credential().clone()
    }

    /// Record an authentication failure observed at `at`.
    pub fn mark_invalid(&self, at: DateTime<Utc>) {
        if self.state.lock().mark_invalid(at) {
            warn!(invalid_since = %at, "Session cookie rejected, refresh required");
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.state.lock().is_invalid()
    }

    pub fn phase(&self, now: DateTime<Utc>) -> RefreshPhase {
        self.state.lock().phase(now, self.config.cooldown)
    }

    /// Copy of the current state, for inspection.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Whether the credential has outlived its expected lifetime.
    pub fn is_past_lifetime(&self, now: DateTime<Utc>) -> bool {
        self.state
            .lock()
            .is_past_lifetime(now, self.config.credential_lifetime)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_tracker.failure_count()
    }

    /// Current streak of refresh failures, if any.
    pub fn failure_info(&self) -> Option<FailureInfo> {
        self.failure_tracker.failure_info()
    }

    /// Time before another refresh may start. Zero once the cooldown has elapsed.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.state
            .lock()
            .cooldown_remaining(now, self.config.cooldown)
            .unwrap_or(Duration::ZERO)
    }

    /// Run the refresh state machine once.
    ///
    /// Requires the gate so that no fetch observes the credential while it is
    /// being replaced. Failures of the re-authentication procedure are logged and
    /// reported through the outcome; they never escape as errors.
    #[instrument(skip(self, gate))]
    pub async fn refresh_if_due(&self, gate: &GateGuard<'_>, now: DateTime<Utc>) -> RefreshOutcome {
        debug_assert!(
            std::ptr::eq(gate.issuer, self),
            "gate guard belongs to another coordinator"
        );

        let begin = self
            .state
            .lock()
            .try_begin_refresh(now, self.config.cooldown);

        let invalid_since = match begin {
            BeginRefresh::NotNeeded => return RefreshOutcome::NotNeeded,
            BeginRefresh::CoolingDown { remaining } => {
                debug!(?remaining, "Refresh due but cooling down");
                return RefreshOutcome::CoolingDown { remaining };
            }
            BeginRefresh::InProgress => {
                // Unreachable while the gate is held; treat as a cooldown tick.
                debug!("Refresh already in progress");
                return RefreshOutcome::CoolingDown {
                    remaining: self.config.cooldown,
                };
            }
            BeginRefresh::Started { invalid_since } => invalid_since,
        };

        let attempt = Attempt::new(self, invalid_since);
        info!(%invalid_since, "Starting session re-authentication");

        let result = match tokio::time::timeout(
            self.config.reauth_timeout,
            self.reauthenticator.obtain_credential(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(self.config.reauth_timeout)),
        };

        match result {
            Ok(credential) => {
                let completed_at = Utc::now().max(now);
                attempt.commit(credential.clone(), completed_at);
                self.failure_tracker.clear();
                info!(?credential, "Session re-authentication successful");

                if let Some(sink) = &self.sink
                    && let Err(e) = sink.store(&credential).await
                {
                    warn!(error = %e, "Failed to persist refreshed cookie (non-fatal)");
                }

                RefreshOutcome::Refreshed
            }
            Err(e) => {
                attempt.abort();
                let consecutive_failures = self.failure_tracker.record_failure(&e.to_string());
                error!(
                    error = %e,
                    timeout = e.is_timeout(),
                    %consecutive_failures,
                    "Session re-authentication failed"
                );
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                    consecutive_failures,
                }
            }
        }
    }
}

/// An in-flight refresh attempt.
///
/// If the attempt is dropped without being settled (e.g. the task was
/// cancelled mid-procedure) the liveness flag is re-armed.
struct Attempt<'a> {
    coordinator: &'a SessionCoordinator,
    invalid_since: DateTime<Utc>,
    settled: bool,
}

impl<'a> Attempt<'a> {
    fn new(coordinator: &'a SessionCoordinator, invalid_since: DateTime<Utc>) -> Self {
        Self {
            coordinator,
            invalid_since,
            settled: false,
        }
    }

    fn commit(mut self, credential: SessionCredential, at: DateTime<Utc>) {
        self.coordinator
            .state
            .lock()
            .commit_refresh(credential, at);
        self.settled = true;
    }

    fn abort(mut self) {
        self.coordinator
            .state
            .lock()
            .abort_refresh(self.invalid_since);
        self.settled = true;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh attempt abandoned, re-arming liveness flag");
            self.coordinator
                .state
                .lock()
                .abort_refresh(self.invalid_since);
            self.coordinator
                .failure_tracker
                .record_failure("refresh cancelled");
        }
    }
}
