//! Selection of the single current watchdog.
//!
//! A fresh candidate replaces the current watchdog when the current one is
//! stale, or when the candidate's hash is numerically greater. Every node that
//! sees the same watchdogs converges on the same choice.

use std::collections::HashMap;

use mngov_core::Hash256;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of offering a watchdog to the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    /// The candidate is now current.
    pub accepted: bool,
    /// The watchdog it replaced, if any.
    pub previous: Option<Hash256>,
}

/// Persisted form of a [`WatchdogElection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogRecord {
    /// The current watchdog.
    pub current: Option<Hash256>,
    /// Creation time of the current watchdog.
    pub current_creation: i64,
    /// Tracked watchdogs and their expiry.
    pub expiries: Vec<(Hash256, i64)>,
}

/// Current watchdog and the expiry of every tracked watchdog.
#[derive(Debug, Clone, Default)]
pub struct WatchdogElection {
    current: Option<Hash256>,
    current_creation: i64,
    index: HashMap<Hash256, i64>,
    window: i64,
}

impl WatchdogElection {
    /// Creates an empty election for watchdogs living `window` seconds.
    #[must_use]
    pub fn new(window: i64) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// Persisted form of the election.
    #[must_use]
    pub fn to_record(&self) -> WatchdogRecord {
        WatchdogRecord {
            current: self.current,
            current_creation: self.current_creation,
            expiries: self.index.iter().map(|(hash, expires_at)| (*hash, *expires_at)).collect(),
        }
    }

    /// Restores persisted state, keeping this election's window.
    pub fn restore(&mut self, record: WatchdogRecord) {
        self.current = record.current;
        self.current_creation = record.current_creation;
        self.index = record.expiries.into_iter().collect();
    }

    /// The current watchdog.
    #[must_use]
    pub const fn current(&self) -> Option<Hash256> {
        self.current
    }

    /// Creation time of the current watchdog.
    #[must_use]
    pub const fn current_creation(&self) -> i64 {
        self.current_creation
    }

    /// Number of tracked watchdogs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if no watchdogs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Offers a candidate created at `creation`.
    pub fn offer(&mut self, hash: Hash256, creation: i64, now: i64) -> Offer {
        let half = self.window / 2;
        let accepted = match self.current {
            None => true,
            Some(current) => {
                let candidate_fresh = now - creation < half;
                let current_stale = now - self.current_creation > half;
                candidate_fresh && (current_stale || hash > current)
            }
        };
        if !accepted {
            return Offer {
                accepted,
                previous: None,
            };
        }

        let previous = self.current.replace(hash);
        self.current_creation = creation;
        info!(watchdog = %hash, creation, "new current watchdog");
        Offer { accepted, previous }
    }

    /// Tracks a watchdog until `expires_at`.
    pub fn register(&mut self, hash: Hash256, expires_at: i64) {
        self.index.insert(hash, expires_at);
    }

    /// Stops tracking a watchdog, clearing the current pointer if it matches.
    pub fn remove(&mut self, hash: &Hash256) {
        self.index.remove(hash);
        self.clear_current_if(hash);
    }

    /// Clears the current pointer if it is `hash`.
    pub fn clear_current_if(&mut self, hash: &Hash256) {
        if self.current.as_ref() == Some(hash) {
            self.current = None;
            self.current_creation = 0;
        }
    }

    /// Unindexes and returns every watchdog whose expiry has passed.
    ///
    /// The last remaining watchdog is never expired this way.
    pub fn expire_due(&mut self, now: i64) -> Vec<Hash256> {
        if self.index.len() <= 1 {
            return Vec::new();
        }
        let due: Vec<Hash256> = self
            .index
            .iter()
            .filter(|(_, expires_at)| **expires_at < now)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &due {
            self.remove(hash);
        }
        due
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.current = None;
        self.current_creation = 0;
        self.index.clear();
    }
}
