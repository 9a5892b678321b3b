//! In-memory session state.
//!
//! Pure bookkeeping: the current credential, the liveness flag, and the refresh
//! cooldown stamps. All synchronization and I/O live in the coordinator.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::credential::SessionCredential;

/// Observable phase of the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// No refresh running and none blocked by the cooldown.
    Idle,
    /// A re-authentication procedure is running.
    RefreshInProgress,
    /// The credential is known bad but the cooldown has not elapsed yet.
    Cooldown { remaining: Duration },
}

/// Result of trying to enter `REFRESH_IN_PROGRESS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginRefresh {
    /// The credential is not marked invalid.
    NotNeeded,
    /// Another attempt already owns the transition.
    InProgress,
    /// The previous attempt started too recently.
    CoolingDown { remaining: Duration },
    /// The attempt may proceed. Carries the invalid-since stamp that was cleared,
    /// so a failed attempt can restore it.
    Started { invalid_since: DateTime<Utc> },
}

/// Session credential plus liveness and cooldown stamps.
#[derive(Debug, Clone)]
pub struct SessionState {
    credential: SessionCredential,
    /// When the current credential was installed.
    obtained_at: DateTime<Utc>,
    /// Liveness flag: `Some` while the credential is believed invalid.
    invalid_since: Option<DateTime<Utc>>,
    /// Start (or, after success, completion) of the most recent refresh attempt.
    last_refresh_attempt: Option<DateTime<Utc>>,
    refreshing: bool,
}

impl SessionState {
    pub fn new(credential: SessionCredential, obtained_at: DateTime<Utc>) -> Self {
        Self {
            credential,
            obtained_at,
            invalid_since: None,
            last_refresh_attempt: None,
            refreshing: false,
        }
    }

    #[inline]
    pub fn credential(&self) -> &SessionCredential {
        &self.credential
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.invalid_since.is_some()
    }

    #[inline]
    pub fn invalid_since(&self) -> Option<DateTime<Utc>> {
        self.invalid_since
    }

    #[inline]
    pub fn last_refresh_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_attempt
    }

    #[inline]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Seed the cooldown baseline, e.g. when resuming from a known attempt time.
    pub fn set_last_refresh_attempt(&mut self, at: Option<DateTime<Utc>>) {
        self.last_refresh_attempt = at;
    }

    /// Record that the remote service rejected the credential.
    ///
    /// Idempotent: the earliest observation wins. Returns `true` if the flag was
    /// not set before.
    pub fn mark_invalid(&mut self, at: DateTime<Utc>) -> bool {
        match self.invalid_since {
            Some(since) if since <= at => false,
            Some(_) => {
                self.invalid_since = Some(at);
                false
            }
            None => {
                self.invalid_since = Some(at);
                true
            }
        }
    }

    /// Time left before another refresh may start, or `None` if the cooldown has elapsed.
    ///
    /// An attempt is allowed only once `now - last_refresh_attempt` is strictly
    /// greater than `cooldown`.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_refresh_attempt?;
        let cooldown = TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX);
        let elapsed = now - last;
        if elapsed > cooldown {
            None
        } else {
            Some((cooldown - elapsed).to_std().unwrap_or(Duration::ZERO))
        }
    }

    pub fn phase(&self, now: DateTime<Utc>, cooldown: Duration) -> RefreshPhase {
        if self.refreshing {
            return RefreshPhase::RefreshInProgress;
        }
        if self.is_invalid()
            && let Some(remaining) = self.cooldown_remaining(now, cooldown)
        {
            return RefreshPhase::Cooldown { remaining };
        }
        RefreshPhase::Idle
    }

    /// `IDLE -> REFRESH_IN_PROGRESS`.
    ///
    /// On success the liveness flag is cleared and `last_refresh_attempt` is
    /// stamped with `now` before the caller starts the re-authentication.
    pub fn try_begin_refresh(&mut self, now: DateTime<Utc>, cooldown: Duration) -> BeginRefresh {
        if self.refreshing {
            return BeginRefresh::InProgress;
        }
        let Some(invalid_since) = self.invalid_since else {
            return BeginRefresh::NotNeeded;
        };
        if let Some(remaining) = self.cooldown_remaining(now, cooldown) {
            return BeginRefresh::CoolingDown { remaining };
        }

        self.invalid_since = None;
        self.last_refresh_attempt = Some(now);
        self.refreshing = true;
        BeginRefresh::Started { invalid_since }
    }

    /// `REFRESH_IN_PROGRESS -> IDLE` on success.
    ///
    /// Replaces the credential, clears the flag and moves the cooldown baseline
    /// to the completion time.
    pub fn commit_refresh(&mut self, credential: SessionCredential, at: DateTime<Utc>) {
        self.credential = credential;
        self.obtained_at = at;
        self.invalid_since = None;
        self.last_refresh_attempt = Some(at);
        self.refreshing = false;
    }

    /// `REFRESH_IN_PROGRESS -> IDLE` on failure.
    ///
    /// Re-arms the liveness flag; the cooldown stamp recorded at entry is kept.
    pub fn abort_refresh(&mut self, invalid_since: DateTime<Utc>) {
        self.refreshing = false;
        self.mark_invalid(invalid_since);
    }

    /// Whether the credential is older than its expected lifetime.
    ///
    /// Only a hint: a rejected request is what marks the credential invalid.
    pub fn is_past_lifetime(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        let lifetime = TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::MAX);
        now - self.obtained_at > lifetime
    }
}
