//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::StatusCode;

use postwatch::apply::ApplyOutcome;
use postwatch::notification::{ApplyRequest, InteractionSource, Notifier, PostingNotice};
use postwatch::portal::{ApplyResponse, FetchOutcome, JobSource, PortalError, Posting};
use postwatch::reauth::Reauthenticator;
use postwatch::scoring::{FitVerdict, ScoreError, Scorer};
use postwatch::session::{
    RefreshConfig, RefreshError, SessionCoordinator, SessionCredential, SessionState,
};
use postwatch::store::PostingStore;

/// Detects portal calls overlapping a refresh or each other.
#[derive(Default)]
pub struct OverlapDetector {
    active: AtomicUsize,
    overlapped: AtomicBool,
}

impl OverlapDetector {
    pub async fn hold(&self, duration: Duration) {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

/// A portal that accepts exactly one cookie value.
pub struct FakePortal {
    accepted: Mutex<String>,
    renewals_rejected: AtomicBool,
    rejection: Mutex<StatusCode>,
    listing: Mutex<Vec<Posting>>,
    apply_responses: Mutex<HashMap<String, ApplyResponse>>,
    apply_transport_error: AtomicBool,
    seen_credentials: Mutex<Vec<String>>,
    applications: Mutex<Vec<(String, String)>>,
    detector: Arc<OverlapDetector>,
    call_duration: Duration,
}

impl FakePortal {
    pub fn new(accepted: &str, detector: Arc<OverlapDetector>) -> Arc<Self> {
        Arc::new(Self {
            accepted: Mutex::new(accepted.to_string()),
            renewals_rejected: AtomicBool::new(false),
            rejection: Mutex::new(StatusCode::FOUND),
            listing: Mutex::new(Vec::new()),
            apply_responses: Mutex::new(HashMap::new()),
            apply_transport_error: AtomicBool::new(false),
            seen_credentials: Mutex::new(Vec::new()),
            applications: Mutex::new(Vec::new()),
            detector,
            call_duration: Duration::from_millis(2),
        })
    }

    /// Accept `value` from now on, unless renewals are rejected.
    pub fn accept(&self, value: &str) {
        if !self.renewals_rejected.load(Ordering::SeqCst) {
            *self.accepted.lock() = value.to_string();
        }
    }

    /// Keep rejecting cookies issued by re-authentication.
    pub fn reject_renewals(&self) {
        self.renewals_rejected.store(true, Ordering::SeqCst);
    }

    /// Status returned for a rejected cookie (302 by default).
    pub fn set_rejection_status(&self, status: StatusCode) {
        *self.rejection.lock() = status;
    }

    pub fn set_listing(&self, guids: &[&str]) {
        *self.listing.lock() = guids
            .iter()
            .map(|g| Posting::new(*g, format!("Posting {g}")))
            .collect();
    }

    pub fn set_apply_response(&self, guid: &str, response: ApplyResponse) {
        self.apply_responses
            .lock()
            .insert(guid.to_string(), response);
    }

    pub fn fail_applications(&self) {
        self.apply_transport_error.store(true, Ordering::SeqCst);
    }

    /// Cookie values presented to the listing endpoint, in order.
    pub fn seen_credentials(&self) -> Vec<String> {
        self.seen_credentials.lock().clone()
    }

    /// `(guid, cookie value)` of each application that reached the portal.
    pub fn applications(&self) -> Vec<(String, String)> {
        self.applications.lock().clone()
    }

    fn is_accepted(&self, credential: &SessionCredential) -> bool {
        *self.accepted.lock() == credential.value()
    }
}

#[async_trait]
impl JobSource for FakePortal {
    fn posting_url(&self, guid: &str) -> String {
        format!("https://portal.test/Poste/{guid}")
    }

    async fn fetch_postings(
        &self,
        credential: &SessionCredential,
    ) -> Result<FetchOutcome, PortalError> {
        self.seen_credentials
            .lock()
            .push(credential.value().to_string());
        self.detector.hold(self.call_duration).await;

        if self.is_accepted(credential) {
            Ok(FetchOutcome::Postings(self.listing.lock().clone()))
        } else {
            Ok(FetchOutcome::Rejected(*self.rejection.lock()))
        }
    }

    async fn fetch_description(
        &self,
        _credential: &SessionCredential,
        guid: &str,
    ) -> Result<String, PortalError> {
        Ok(format!("Description of {guid}"))
    }

    async fn apply(
        &self,
        credential: &SessionCredential,
        guid: &str,
    ) -> Result<ApplyResponse, PortalError> {
        self.detector.hold(self.call_duration).await;

        if self.apply_transport_error.load(Ordering::SeqCst) {
            return Err(PortalError::Parse("connection reset".to_string()));
        }
        if !self.is_accepted(credential) {
            return Ok(ApplyResponse::Rejected(*self.rejection.lock()));
        }

        self.applications
            .lock()
            .push((guid.to_string(), credential.value().to_string()));
        Ok(self
            .apply_responses
            .lock()
            .get(guid)
            .copied()
            .unwrap_or(ApplyResponse::Submitted))
    }
}

/// Scripted re-authentication. Successful attempts make the portal accept the new cookie.
pub struct FakeReauth {
    portal: Arc<FakePortal>,
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    started_at: Mutex<Vec<DateTime<Utc>>>,
    delay: Duration,
    detector: Arc<OverlapDetector>,
}

impl FakeReauth {
    pub fn new(portal: Arc<FakePortal>, detector: Arc<OverlapDetector>) -> Arc<Self> {
        Self::with_delay(portal, detector, Duration::from_millis(5))
    }

    pub fn with_delay(portal: Arc<FakePortal>, detector: Arc<OverlapDetector>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            portal,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            started_at: Mutex::new(Vec::new()),
            delay,
            detector,
        })
    }

    /// Queue the result of the next attempt. Unscripted attempts succeed with `fresh-N`.
    pub fn push(&self, result: Result<&str, &str>) {
        self.script
            .lock()
            .push_back(result.map(str::to_string).map_err(str::to_string));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> Vec<DateTime<Utc>> {
        self.started_at.lock().clone()
    }
}

#[async_trait]
impl Reauthenticator for FakeReauth {
    async fn obtain_credential(&self) -> Result<SessionCredential, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.started_at.lock().push(Utc::now());
        self.detector.hold(self.delay).await;

        let scripted = self.script.lock().pop_front();
        match scripted.unwrap_or_else(|| Ok(format!("fresh-{n}"))) {
            Ok(value) => {
                self.portal.accept(&value);
                Ok(SessionCredential::aspxauth(value))
            }
            Err(reason) => Err(RefreshError::Browser(reason)),
        }
    }
}

/// Records everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    postings: Mutex<Vec<PostingNotice>>,
    statuses: Mutex<Vec<String>>,
    applies: Mutex<Vec<(String, ApplyOutcome)>>,
    failures_left: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` posting notices.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn posted_guids(&self) -> Vec<String> {
        self.postings.lock().iter().map(|n| n.guid.clone()).collect()
    }

    pub fn postings(&self) -> Vec<PostingNotice> {
        self.postings.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().clone()
    }

    pub fn applies(&self) -> Vec<(String, ApplyOutcome)> {
        self.applies.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn notify_posting(&self, notice: &PostingNotice) -> postwatch::Result<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(postwatch::Error::other("chat unavailable"));
        }
        self.postings.lock().push(notice.clone());
        Ok(())
    }

    async fn notify_status(&self, text: &str) -> postwatch::Result<()> {
        self.statuses.lock().push(text.to_string());
        Ok(())
    }

    async fn report_apply(
        &self,
        request: &ApplyRequest,
        outcome: &ApplyOutcome,
    ) -> postwatch::Result<()> {
        self.applies
            .lock()
            .push((request.guid.clone(), outcome.clone()));
        Ok(())
    }
}

/// Known-posting set kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    guids: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with(guids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            guids: Mutex::new(guids.iter().map(|g| g.to_string()).collect()),
        })
    }

    pub fn guids(&self) -> Vec<String> {
        self.guids.lock().clone()
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn load(&self) -> postwatch::Result<HashSet<String>> {
        Ok(self.guids.lock().iter().cloned().collect())
    }

    async fn append(&self, guids: &[String]) -> postwatch::Result<()> {
        self.guids.lock().extend_from_slice(guids);
        Ok(())
    }
}

/// Scores every posting with a fixed verdict.
pub struct FixedScorer {
    pub fit: bool,
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn summarize(&self, description: &str) -> Result<String, ScoreError> {
        Ok(format!("Summary: {description}"))
    }

    async fn assess_fit(&self, _description: &str) -> Result<Option<FitVerdict>, ScoreError> {
        Ok(Some(FitVerdict {
            fit: self.fit,
            analysis: if self.fit { "Good match" } else { "Missing skills" }.to_string(),
        }))
    }
}

/// Yields one scripted batch, then waits forever.
pub struct ScriptedInteractions {
    batches: Mutex<VecDeque<Vec<ApplyRequest>>>,
}

impl ScriptedInteractions {
    pub fn new(batches: Vec<Vec<ApplyRequest>>) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(batches.into()),
        })
    }
}

#[async_trait]
impl InteractionSource for ScriptedInteractions {
    async fn next_requests(&self) -> postwatch::Result<Vec<ApplyRequest>> {
        let next = self.batches.lock().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => std::future::pending().await,
        }
    }
}

pub fn refresh_config() -> RefreshConfig {
    RefreshConfig {
        cooldown: Duration::from_secs(120),
        reauth_timeout: Duration::from_secs(5),
        credential_lifetime: Duration::from_secs(5 * 3600),
    }
}

/// Wiring for one test: a portal accepting `valid`, seeded with `seed`.
pub struct Harness {
    pub detector: Arc<OverlapDetector>,
    pub portal: Arc<FakePortal>,
    pub reauth: Arc<FakeReauth>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl Harness {
    pub fn new(seed: &str, valid: &str) -> Self {
        let detector = Arc::new(OverlapDetector::default());
        let portal = FakePortal::new(valid, detector.clone());
        let reauth = FakeReauth::new(portal.clone(), detector.clone());
        let coordinator = Arc::new(SessionCoordinator::new(
            SessionCredential::aspxauth(seed),
            reauth.clone(),
            refresh_config(),
        ));
        Self {
            detector,
            portal,
            reauth,
            coordinator,
        }
    }

    /// Like [`Harness::new`] but starting from an explicit session state.
    pub fn with_state(state: SessionState, valid: &str) -> Self {
        let detector = Arc::new(OverlapDetector::default());
        let portal = FakePortal::new(valid, detector.clone());
        let reauth = FakeReauth::new(portal.clone(), detector.clone());
        let coordinator = Arc::new(SessionCoordinator::with_state(
            state,
            reauth.clone(),
            refresh_config(),
        ));
        Self {
            detector,
            portal,
            reauth,
            coordinator,
        }
    }
}
