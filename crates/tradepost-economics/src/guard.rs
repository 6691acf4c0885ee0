/// RATE / ABUSE GUARD
///
/// Gates applied before a player accepts an order:
/// 1. Per-counterparty volume cap (no more than a fraction of total valuation
///    may be traded with any single partner)
/// 2. Cooldown between consecutive accepts, measured on the server clock
///
/// An accept is booked when admitted, so overlapping accepts see each other,
/// and the booking is undone if the authority refuses the trade.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Share of total valuation that may be traded with one counterparty
pub const DEFAULT_COUNTERPARTY_CAP_FRACTION: f64 = 0.10;

/// Minimum seconds between accepts
pub const DEFAULT_ACCEPT_COOLDOWN_SECS: i64 = 30;

/// Minimum seconds between accepts for premium accounts
pub const DEFAULT_PREMIUM_ACCEPT_COOLDOWN_SECS: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardPolicy {
    pub counterparty_cap_fraction: f64,
    pub accept_cooldown_secs: i64,
    pub premium_accept_cooldown_secs: i64,
}

impl GuardPolicy {
    pub fn new() -> Self {
        GuardPolicy {
            counterparty_cap_fraction: DEFAULT_COUNTERPARTY_CAP_FRACTION,
            accept_cooldown_secs: DEFAULT_ACCEPT_COOLDOWN_SECS,
            premium_accept_cooldown_secs: DEFAULT_PREMIUM_ACCEPT_COOLDOWN_SECS,
        }
    }

    pub fn validate(&self) -> Result<(), GuardRejection> {
        if !(self.counterparty_cap_fraction > 0.0 && self.counterparty_cap_fraction <= 1.0) {
            return Err(GuardRejection::InvalidPolicy(format!(
                "counterparty_cap_fraction must be in (0, 1], got {}",
                self.counterparty_cap_fraction
            )));
        }
        if self.accept_cooldown_secs < 0 || self.premium_accept_cooldown_secs < 0 {
            return Err(GuardRejection::InvalidPolicy(
                "cooldowns cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cooldown(&self, premium: bool) -> Duration {
        if premium {
            Duration::seconds(self.premium_accept_cooldown_secs)
        } else {
            Duration::seconds(self.accept_cooldown_secs)
        }
    }
}

impl Default for GuardPolicy {
    fn default() -> Self {
        GuardPolicy::new()
    }
}

#[derive(Debug, Default)]
struct GuardState {
    /// counterparty hash -> traded value this session, in-flight accepts included
    volumes: BTreeMap<String, f64>,
    /// counterparties with at least one acknowledged accept
    partners: BTreeSet<String>,
    last_accept: Option<DateTime<Utc>>,
}

pub struct RateGuard {
    policy: GuardPolicy,
    state: Mutex<GuardState>,
}

impl RateGuard {
    pub fn new(policy: GuardPolicy) -> Result<Self, GuardRejection> {
        policy.validate()?;
        Ok(RateGuard {
            policy,
            state: Mutex::new(GuardState::default()),
        })
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Cumulative value traded with `counterparty` this session
    pub fn traded_with(&self, counterparty: &str) -> f64 {
        self.state.lock().volumes.get(counterparty).copied().unwrap_or(0.0)
    }

    pub fn check_cooldown(&self, now: DateTime<Utc>, premium: bool) -> Result<(), GuardRejection> {
        self.cooldown_gate(&self.state.lock(), now, premium)
    }

    pub fn check_counterparty(
        &self,
        counterparty: &str,
        proposed_value: f64,
        total_valuation: f64,
    ) -> Result<(), GuardRejection> {
        self.counterparty_gate(&self.state.lock(), counterparty, proposed_value, total_valuation)
    }

    /// Run both gates without booking anything
    pub fn check(
        &self,
        counterparty: &str,
        proposed_value: f64,
        total_valuation: f64,
        now: DateTime<Utc>,
        premium: bool,
    ) -> Result<(), GuardRejection> {
        let state = self.state.lock();
        self.cooldown_gate(&state, now, premium)?;
        self.counterparty_gate(&state, counterparty, proposed_value, total_valuation)
    }

    /// Run both gates and book the accept under the same lock.
    ///
    /// The booking counts against later admissions until the returned
    /// [`Admission`] is committed or rolled back. Dropping it rolls back.
    pub fn try_admit(
        &self,
        counterparty: &str,
        proposed_value: f64,
        total_valuation: f64,
        now: DateTime<Utc>,
        premium: bool,
    ) -> Result<Admission<'_>, GuardRejection> {
        let mut state = self.state.lock();
        self.cooldown_gate(&state, now, premium)?;
        self.counterparty_gate(&state, counterparty, proposed_value, total_valuation)?;

        *state.volumes.entry(counterparty.to_string()).or_insert(0.0) += proposed_value;
        let previous_accept = state.last_accept.replace(now);
        log::debug!("Admitted accept with {}: value={}", counterparty, proposed_value);

        Ok(Admission {
            guard: self,
            counterparty: counterparty.to_string(),
            value: proposed_value,
            at: now,
            previous_accept,
            settled: false,
        })
    }

    /// Forget session volumes and cooldown
    pub fn reset_session(&self) {
        *self.state.lock() = GuardState::default();
    }

    fn cooldown_gate(&self, state: &GuardState, now: DateTime<Utc>, premium: bool) -> Result<(), GuardRejection> {
        if let Some(last) = state.last_accept {
            let ready_at = last + self.policy.cooldown(premium);
            if now < ready_at {
                return Err(GuardRejection::Cooldown {
                    remaining_secs: (ready_at - now).num_seconds().max(1),
                });
            }
        }
        Ok(())
    }

    fn counterparty_gate(
        &self,
        state: &GuardState,
        counterparty: &str,
        proposed_value: f64,
        total_valuation: f64,
    ) -> Result<(), GuardRejection> {
        let traded = state.volumes.get(counterparty).copied().unwrap_or(0.0);
        let cap = self.policy.counterparty_cap_fraction * total_valuation;
        if traded + proposed_value > cap {
            log::warn!(
                "Counterparty cap hit for {}: traded={} proposed={} cap={}",
                counterparty,
                traded,
                proposed_value,
                cap
            );
            return Err(GuardRejection::CounterpartyCap {
                counterparty: counterparty.to_string(),
                traded,
                proposed: proposed_value,
                cap,
            });
        }
        Ok(())
    }
}

/// Provisional booking of one accept
#[must_use = "an admission rolls back when dropped"]
pub struct Admission<'a> {
    guard: &'a RateGuard,
    counterparty: String,
    value: f64,
    at: DateTime<Utc>,
    previous_accept: Option<DateTime<Utc>>,
    settled: bool,
}

impl Admission<'_> {
    /// Keep the booking. Returns true for the first acknowledged trade with
    /// this counterparty in the session.
    pub fn commit(mut self) -> bool {
        self.settled = true;
        let first = self.guard.state.lock().partners.insert(self.counterparty.clone());
        first
    }

    /// Undo the booking
    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut state = self.guard.state.lock();
        let emptied = match state.volumes.get_mut(&self.counterparty) {
            Some(volume) => {
                *volume = (*volume - self.value).max(0.0);
                *volume <= 0.0
            }
            None => false,
        };
        if emptied && !state.partners.contains(&self.counterparty) {
            state.volumes.remove(&self.counterparty);
        }
        // A later admission owns the timestamp once it has moved on
        if state.last_accept == Some(self.at) {
            state.last_accept = self.previous_accept;
        }
        log::debug!("Rolled back accept with {}: value={}", self.counterparty, self.value);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.undo();
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GuardRejection {
    #[error("Trade volume with {counterparty} would exceed cap ({traded} + {proposed} > {cap})")]
    CounterpartyCap {
        counterparty: String,
        traded: f64,
        proposed: f64,
        cap: f64,
    },
    #[error("Accept cooldown active, {remaining_secs}s remaining")]
    Cooldown { remaining_secs: i64 },
    #[error("Invalid guard policy: {0}")]
    InvalidPolicy(String),
}
