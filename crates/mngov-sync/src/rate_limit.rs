//! Per-masternode submission rate limiting for triggers and watchdogs.

use std::collections::{HashMap, VecDeque};

use mngov_core::{GovernanceObject, ObjectKind, Outpoint};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GovernanceConfig;

/// Timestamps kept per buffer.
pub const RATE_BUFFER_SIZE: usize = 5;

/// Whether rate checks apply to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheckMode {
    /// Rate checks run as configured.
    Normal,
    /// Rate checks always pass. Used when re-validating objects already accepted.
    Suspended,
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    /// The submission may proceed.
    pub allowed: bool,
    /// Allowed on the strength of the masternode's last good status, without recomputing.
    pub bypassed: bool,
}

impl RateCheck {
    const ALLOWED: Self = Self {
        allowed: true,
        bypassed: false,
    };
    const BYPASSED: Self = Self {
        allowed: true,
        bypassed: true,
    };
    const DENIED: Self = Self {
        allowed: false,
        bypassed: false,
    };
}

/// The most recent submission timestamps of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCheckBuffer {
    timestamps: VecDeque<i64>,
}

impl RateCheckBuffer {
    /// Appends a timestamp, dropping the oldest beyond [`RATE_BUFFER_SIZE`].
    pub fn add(&mut self, timestamp: i64) {
        if self.timestamps.len() == RATE_BUFFER_SIZE {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(timestamp);
    }

    /// Number of stored timestamps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Submissions per second over the `window` seconds ending at the latest timestamp.
    #[must_use]
    pub fn rate(&self, window: i64) -> f64 {
        let Some(latest) = self.timestamps.iter().copied().max() else {
            return 0.0;
        };
        let window = window.max(1);
        let count = self
            .timestamps
            .iter()
            .filter(|ts| **ts >= latest - window && **ts <= latest)
            .count();
        count as f64 / window as f64
    }
}

/// Rate state of one masternode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastObjectRecord {
    trigger_buffer: RateCheckBuffer,
    watchdog_buffer: RateCheckBuffer,
    status_ok: bool,
}

impl Default for LastObjectRecord {
    fn default() -> Self {
        Self {
            trigger_buffer: RateCheckBuffer::default(),
            watchdog_buffer: RateCheckBuffer::default(),
            status_ok: true,
        }
    }
}

impl LastObjectRecord {
    /// Whether the masternode's last checked submission was within its rate.
    #[must_use]
    pub const fn status_ok(&self) -> bool {
        self.status_ok
    }

    /// Buffer for a rate-limited kind.
    #[must_use]
    pub const fn buffer(&self, kind: &ObjectKind) -> Option<&RateCheckBuffer> {
        match kind {
            ObjectKind::Trigger(_) => Some(&self.trigger_buffer),
            ObjectKind::Watchdog => Some(&self.watchdog_buffer),
            _ => None,
        }
    }

    fn buffer_mut(&mut self, kind: &ObjectKind) -> Option<&mut RateCheckBuffer> {
        match kind {
            ObjectKind::Trigger(_) => Some(&mut self.trigger_buffer),
            ObjectKind::Watchdog => Some(&mut self.watchdog_buffer),
            _ => None,
        }
    }
}

/// Sliding-window rate limiter keyed by masternode outpoint.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    records: HashMap<Outpoint, LastObjectRecord>,
    enabled: bool,
    cycle_seconds: i64,
    watchdog_window: i64,
    max_per_window: f64,
    max_future_deviation: i64,
    reliable_propagation_time: i64,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            records: HashMap::new(),
            enabled: config.rate_limit.enabled,
            cycle_seconds: config.superblock_cycle_seconds(),
            watchdog_window: config.rate_limit.watchdog_window,
            max_per_window: f64::from(config.rate_limit.max_submissions_per_window) * config.rate_limit.fudge_factor,
            max_future_deviation: config.timing.max_time_future_deviation,
            reliable_propagation_time: config.timing.reliable_propagation_time,
        }
    }

    /// Rate record of a masternode, if it ever had an object accepted.
    #[must_use]
    pub fn record(&self, masternode: &Outpoint) -> Option<&LastObjectRecord> {
        self.records.get(masternode)
    }

    /// Number of masternodes with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, for persistence.
    pub fn records(&self) -> impl Iterator<Item = (&Outpoint, &LastObjectRecord)> {
        self.records.iter()
    }

    /// Replaces all records.
    pub fn restore(&mut self, records: impl IntoIterator<Item = (Outpoint, LastObjectRecord)>) {
        self.records = records.into_iter().collect();
    }

    /// Drops all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn window(&self, kind: &ObjectKind) -> Option<i64> {
        match kind {
            ObjectKind::Trigger(_) => Some(self.cycle_seconds),
            ObjectKind::Watchdog => Some(self.watchdog_window),
            _ => None,
        }
    }

    /// Checks whether an object fits within its masternode's submission rate.
    ///
    /// The record's buffers are never modified here; only a failed check with
    /// `update_fail_status` flips the record's status.
    pub fn check(
        &mut self,
        object: &GovernanceObject,
        update_fail_status: bool,
        force: bool,
        mode: RateCheckMode,
        synced: bool,
        now: i64,
    ) -> RateCheck {
        if !synced || !self.enabled || mode == RateCheckMode::Suspended {
            return RateCheck::ALLOWED;
        }
        let kind = object.kind();
        let Some(window) = self.window(&kind) else {
            return RateCheck::ALLOWED;
        };

        let timestamp = object.creation_time();
        let masternode = object.masternode();
        if timestamp < now - 2 * self.cycle_seconds {
            debug!(
                masternode = %masternode.to_short_string(),
                timestamp,
                now,
                "object too old for rate check"
            );
            return RateCheck::DENIED;
        }
        if timestamp > now + self.max_future_deviation {
            debug!(
                masternode = %masternode.to_short_string(),
                timestamp,
                now,
                "object too far in the future for rate check"
            );
            return RateCheck::DENIED;
        }

        let Some(record) = self.records.get_mut(&masternode) else {
            return RateCheck::ALLOWED;
        };
        if record.status_ok && !force {
            return RateCheck::BYPASSED;
        }

        let Some(mut buffer) = record.buffer(&kind).cloned() else {
            return RateCheck::ALLOWED;
        };
        buffer.add(timestamp);
        let rate = buffer.rate(window);
        let max_rate = self.max_per_window / window.max(1) as f64;
        if rate < max_rate {
            return RateCheck::ALLOWED;
        }

        debug!(
            masternode = %masternode.to_short_string(),
            kind = %kind,
            rate,
            max_rate,
            "masternode submission rate exceeded"
        );
        if update_fail_status {
            record.status_ok = false;
        }
        RateCheck::DENIED
    }

    /// Records an accepted object.
    ///
    /// Returns true when the object's timestamp is close enough to the future
    /// bound that peers may have rejected it, so it should be relayed again.
    pub fn record_accepted(&mut self, object: &GovernanceObject, now: i64) -> bool {
        let kind = object.kind();
        if !kind.is_rate_limited() {
            return false;
        }
        let timestamp = object.creation_time();
        let record = self.records.entry(object.masternode()).or_default();
        if let Some(buffer) = record.buffer_mut(&kind) {
            buffer.add(timestamp);
        }
        record.status_ok = true;
        timestamp > now + self.max_future_deviation - self.reliable_propagation_time
    }

    /// Returns true once `timestamp` is inside the reliable propagation window.
    #[must_use]
    pub const fn is_ready_for_relay(&self, timestamp: i64, now: i64) -> bool {
        timestamp <= now + self.max_future_deviation - self.reliable_propagation_time
    }

    /// Returns true while `timestamp` would still pass the rate check's age bounds.
    #[must_use]
    pub const fn is_within_time_bounds(&self, timestamp: i64, now: i64) -> bool {
        timestamp >= now - 2 * self.cycle_seconds && timestamp <= now + self.max_future_deviation
    }
}
