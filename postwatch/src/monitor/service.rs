//! Posting monitor service.
//!
//! One long-lived poll loop: fetch under the session gate, hand unseen
//! postings to the scorer and notifier, then run the refresh state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::interval::IntervalPolicy;
use crate::notification::{Notifier, PostingNotice};
use crate::portal::{FetchOutcome, JobSource, Posting};
use crate::scoring::Scorer;
use crate::session::{GateGuard, RefreshOutcome, SessionCoordinator, should_notify_failure};
use crate::store::PostingStore;

/// Delivery attempts after which an undeliverable posting is recorded anyway.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Poll loop configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Base delay between two cycles.
    pub poll_interval: Duration,
    /// Interval multiplier applied after each successful refresh.
    pub backoff_factor: f64,
    /// Cap on the interval multiplier.
    pub max_backoff: u32,
    /// Also notify postings the scorer judged unfit.
    pub notify_unfit: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(600),
            backoff_factor: 1.0,
            max_backoff: 6,
            notify_unfit: true,
        }
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Postings listed by the portal (both fetches included).
    pub fetched: usize,
    /// Postings delivered to the notifier.
    pub notified: usize,
    /// Postings recorded as known without a notice (judged unfit).
    pub suppressed: usize,
    /// Postings recorded after repeated delivery failures.
    pub abandoned: usize,
    /// Outcome of the refresh check.
    pub refresh: RefreshOutcome,
}

/// Polls the portal and reports new postings.
pub struct PostingMonitor {
    coordinator: Arc<SessionCoordinator>,
    source: Arc<dyn JobSource>,
    store: Arc<dyn PostingStore>,
    notifier: Arc<dyn Notifier>,
    scorer: Option<Arc<dyn Scorer>>,
    config: MonitorConfig,
    lifetime_hint_logged: AtomicBool,
    delivery_failures: Mutex<HashMap<String, u32>>,
}

impl PostingMonitor {
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        source: Arc<dyn JobSource>,
        store: Arc<dyn PostingStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            coordinator,
            source,
            store,
            notifier,
            scorer: None,
            config,
            lifetime_hint_logged: AtomicBool::new(false),
            delivery_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Score postings with `scorer` before notifying.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval = ?self.config.poll_interval,
            scoring = self.scorer.is_some(),
            "Posting monitor started"
        );

        let mut policy = IntervalPolicy::new(
            self.config.poll_interval,
            self.config.backoff_factor,
            self.config.max_backoff,
            self.coordinator.config().cooldown,
        );

        loop {
            let report = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                report = self.run_cycle() => report,
            };

            let delay = policy.next_delay(&report.refresh);
            debug!(?report, ?delay, "Cycle complete");

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Posting monitor stopped");
    }

    /// Run one poll cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        self.log_lifetime_hint();

        let postings = {
            let gate = self.coordinator.enter().await;
            self.fetch(&gate).await
        };

        let mut report = CycleReport {
            fetched: postings.len(),
            notified: 0,
            suppressed: 0,
            abandoned: 0,
            refresh: RefreshOutcome::NotNeeded,
        };
        self.process(postings, &mut report).await;

        let gate = self.coordinator.enter().await;
        let mut refresh = self.coordinator.refresh_if_due(&gate, Utc::now()).await;
        let mut renewed_cookie_rejected = false;

        match &refresh {
            RefreshOutcome::Refreshed => {
                self.lifetime_hint_logged.store(false, Ordering::Relaxed);
                let postings = self.fetch(&gate).await;
                // A renewed cookie that is rejected at once leaves the session
                // invalid; poll again as soon as the cooldown allows.
                renewed_cookie_rejected = self.coordinator.is_invalid();
                drop(gate);

                report.fetched += postings.len();
                self.process(postings, &mut report).await;
            }
            RefreshOutcome::Failed {
                reason,
                consecutive_failures,
            } => {
                drop(gate);
                if should_notify_failure(*consecutive_failures) {
                    let since = self
                        .coordinator
                        .failure_info()
                        .map(|info| {
                            format!(
                                ", failing since {}",
                                info.first_failure.format("%Y-%m-%d %H:%M UTC")
                            )
                        })
                        .unwrap_or_default();
                    let text = format!(
                        "Session refresh failed ({consecutive_failures} in a row{since}): {reason}"
                    );
                    if let Err(e) = self.notifier.notify_status(&text).await {
                        warn!(error = %e, "Failed to send refresh failure notice");
                    }
                }
            }
            RefreshOutcome::NotNeeded | RefreshOutcome::CoolingDown { .. } => {}
        }

        if renewed_cookie_rejected {
            let remaining = self.coordinator.cooldown_remaining(Utc::now());
            warn!(?remaining, "Renewed session cookie was rejected");
            refresh = RefreshOutcome::CoolingDown { remaining };
        }

        report.refresh = refresh;
        report
    }

    /// List postings with the current credential. Requires the gate.
    async fn fetch(&self, _gate: &GateGuard<'_>) -> Vec<Posting> {
        let credential = self.coordinator.credential();
        match self.source.fetch_postings(&credential).await {
            Ok(FetchOutcome::Postings(postings)) => postings,
            Ok(FetchOutcome::Rejected(status)) => {
                debug!(%status, "Posting list rejected");
                self.coordinator.mark_invalid(Utc::now());
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "Failed to fetch postings");
                Vec::new()
            }
        }
    }

    /// Notify and record every posting not seen before, in discovery order.
    async fn process(&self, postings: Vec<Posting>, report: &mut CycleReport) {
        if postings.is_empty() {
            return;
        }

        let known = match self.store.load().await {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, "Failed to load known postings, skipping batch");
                return;
            }
        };

        let mut batch_seen = HashSet::new();
        for posting in postings {
            if known.contains(&posting.guid) || !batch_seen.insert(posting.guid.clone()) {
                continue;
            }

            let outcome = match self.emit(&posting).await {
                Some(notified) => {
                    self.delivery_failures.lock().remove(&posting.guid);
                    if notified {
                        &mut report.notified
                    } else {
                        &mut report.suppressed
                    }
                }
                None => {
                    let attempts = {
                        let mut failures = self.delivery_failures.lock();
                        let attempts = failures.entry(posting.guid.clone()).or_insert(0);
                        *attempts += 1;
                        *attempts
                    };
                    if attempts < MAX_DELIVERY_ATTEMPTS {
                        continue;
                    }
                    warn!(guid = %posting.guid, attempts, "Giving up on posting delivery");
                    self.delivery_failures.lock().remove(&posting.guid);
                    &mut report.abandoned
                }
            };

            if let Err(e) = self.store.append(std::slice::from_ref(&posting.guid)).await {
                warn!(guid = %posting.guid, error = %e, "Failed to record posting");
            }
            *outcome += 1;
        }
    }

    /// Build and deliver a notice.
    ///
    /// `Some(true)` when notified, `Some(false)` when suppressed as unfit,
    /// `None` when delivery failed and the posting should be retried.
    #[instrument(skip_all, fields(guid = %posting.guid))]
    async fn emit(&self, posting: &Posting) -> Option<bool> {
        let description = {
            let _gate = self.coordinator.enter().await;
            let credential = self.coordinator.credential();
            match self
                .source
                .fetch_description(&credential, &posting.guid)
                .await
            {
                Ok(description) => description,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch posting description");
                    String::new()
                }
            }
        };

        let mut notice = PostingNotice::new(
            &posting.guid,
            &posting.title,
            self.source.posting_url(&posting.guid),
            description,
        );

        if let Some(scorer) = &self.scorer
            && !notice.description.is_empty()
        {
            match scorer.summarize(&notice.description).await {
                Ok(summary) => notice.summary = Some(summary),
                Err(e) => warn!(error = %e, "Failed to summarize posting"),
            }
            match scorer.assess_fit(&notice.description).await {
                Ok(verdict) => notice.verdict = verdict,
                Err(e) => warn!(error = %e, "Failed to assess fit"),
            }
        }

        if let Some(verdict) = &notice.verdict
            && !verdict.fit
            && !self.config.notify_unfit
        {
            info!(title = %posting.title, "Posting judged unfit, not notifying");
            return Some(false);
        }

        match self.notifier.notify_posting(&notice).await {
            Ok(()) => {
                info!(title = %posting.title, "New posting notified");
                Some(true)
            }
            Err(e) => {
                warn!(error = %e, "Failed to notify posting, will retry next cycle");
                None
            }
        }
    }

    fn log_lifetime_hint(&self) {
        if self.coordinator.is_past_lifetime(Utc::now())
            && !self.lifetime_hint_logged.swap(true, Ordering::Relaxed)
        {
            info!(
                lifetime = ?self.coordinator.config().credential_lifetime,
                "Session cookie is past its expected lifetime, expecting a refresh soon"
            );
        }
    }
}
