//! User-triggered application submission.
//!
//! An apply request takes the session gate for the POST and, when the portal
//! rejects the cookie, for one bounded refresh-then-retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::notification::{ApplyRequest, InteractionSource, Notifier};
use crate::portal::{ApplyResponse, JobSource};
use crate::session::{GateGuard, RefreshOutcome, SessionCoordinator};

/// Delay before polling for interactions again after an error.
const LISTENER_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What happened to an apply request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Submitted,
    /// Already applied, or the posting must be applied to on an external site.
    AlreadyApplied,
    /// The cookie was rejected and could not be refreshed in time.
    SessionExpired,
    /// Transport failure.
    Failed(String),
}

impl ApplyOutcome {
    /// Short label for the chat button.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Applied!",
            Self::AlreadyApplied => "Already applied",
            Self::SessionExpired => "Session expired",
            Self::Failed(_) => "Apply failed",
        }
    }

    /// Whether retrying cannot change the result.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Submitted | Self::AlreadyApplied)
    }
}

/// Submits applications through the shared session.
pub struct ApplyService {
    coordinator: Arc<SessionCoordinator>,
    source: Arc<dyn JobSource>,
}

impl ApplyService {
    pub fn new(coordinator: Arc<SessionCoordinator>, source: Arc<dyn JobSource>) -> Self {
        Self {
            coordinator,
            source,
        }
    }

    /// Apply to the posting `guid`.
    #[instrument(skip(self))]
    pub async fn apply(&self, guid: &str) -> ApplyOutcome {
        let gate = self.coordinator.enter().await;

        match self.submit(&gate, guid).await {
            Ok(ApplyResponse::Rejected(status)) => {
                warn!(%status, "Application rejected, cookie likely expired");
                self.coordinator.mark_invalid(Utc::now());
            }
            Ok(response) => return Self::settle(guid, response),
            Err(outcome) => return outcome,
        }

        match self.coordinator.refresh_if_due(&gate, Utc::now()).await {
            RefreshOutcome::Refreshed => {}
            other => {
                warn!(outcome = ?other, "Could not refresh session for application");
                return ApplyOutcome::SessionExpired;
            }
        }

        match self.submit(&gate, guid).await {
            Ok(ApplyResponse::Rejected(status)) => {
                warn!(%status, "Application rejected with a fresh cookie");
                self.coordinator.mark_invalid(Utc::now());
                ApplyOutcome::SessionExpired
            }
            Ok(response) => Self::settle(guid, response),
            Err(outcome) => outcome,
        }
    }

    async fn submit(
        &self,
        _gate: &GateGuard<'_>,
        guid: &str,
    ) -> Result<ApplyResponse, ApplyOutcome> {
        let credential = self.coordinator.credential();
        self.source.apply(&credential, guid).await.map_err(|e| {
            error!(error = %e, "Application request failed");
            ApplyOutcome::Failed(e.to_string())
        })
    }

    fn settle(guid: &str, response: ApplyResponse) -> ApplyOutcome {
        match response {
            ApplyResponse::Submitted => {
                info!(%guid, "Application submitted");
                ApplyOutcome::Submitted
            }
            ApplyResponse::AlreadyApplied => {
                info!(%guid, "Already applied or external application");
                ApplyOutcome::AlreadyApplied
            }
            ApplyResponse::Rejected(_) => ApplyOutcome::SessionExpired,
        }
    }

    /// Serve apply requests from `source` until cancelled.
    ///
    /// Each request runs in its own task; they serialize on the session gate.
    pub async fn run_listener(
        self: Arc<Self>,
        source: Arc<dyn InteractionSource>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) {
        info!("Apply listener started");

        loop {
            let batch = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                batch = source.next_requests() => batch,
            };

            let requests = match batch {
                Ok(requests) => requests,
                Err(e) => {
                    warn!(error = %e, "Failed to poll for apply requests");
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(LISTENER_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for request in requests {
                let service = Arc::clone(&self);
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move {
                    service.handle(&request, notifier.as_ref()).await;
                });
            }
        }

        debug!("Apply listener stopped");
    }

    async fn handle(&self, request: &ApplyRequest, notifier: &dyn Notifier) {
        let outcome = self.apply(&request.guid).await;
        if let Err(e) = notifier.report_apply(request, &outcome).await {
            warn!(guid = %request.guid, error = %e, "Failed to report apply outcome");
        }
    }
}
