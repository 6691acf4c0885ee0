//! Synchronized clock.
//!
//! Timestamps and cooldowns use server time so a player cannot skip a
//! cooldown by moving the local clock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

pub trait SyncClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Local clock corrected by the offset learned from the authority
#[derive(Debug, Default)]
pub struct ServerSyncedClock {
    offset: RwLock<Duration>,
}

impl ServerSyncedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the offset from a server timestamp
    pub fn sync(&self, server_time: DateTime<Utc>) {
        let offset = server_time - Utc::now();
        *self.offset.write() = offset;
        tracing::debug!(offset_ms = offset.num_milliseconds(), "clock synchronized");
    }

    pub fn offset(&self) -> Duration {
        *self.offset.read()
    }
}

impl SyncClock for ServerSyncedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.offset.read()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock { now: RwLock::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now = *now + by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }
}

impl SyncClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
