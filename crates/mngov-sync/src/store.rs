//! Ownership of governance objects across their lifecycle.
//!
//! An object hash lives in at most one of four places: the active map, the
//! postponed map (waiting for collateral confirmations), the masternode-orphan
//! map (waiting for its masternode to appear) or the erased map (remembered
//! only so it is not fetched again).

use std::collections::{HashMap, HashSet};

use mngov_core::{GovernanceObject, Hash256, ObjectKind, Outpoint, PeerId};
use serde::{Deserialize, Serialize};

/// Where a known hash currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Accepted and live.
    Active,
    /// Waiting for collateral confirmations.
    Postponed,
    /// Waiting for its masternode.
    MasternodeOrphan,
    /// Deleted; remembered until its deadline.
    Erased,
}

/// Why and until when an object is quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationInfo {
    /// Peer that sent the object.
    pub peer: Option<PeerId>,
    /// Absolute time after which the object is dropped.
    pub expires_at: i64,
}

/// The four object maps plus their side tables.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    active: HashMap<Hash256, GovernanceObject>,
    postponed: HashMap<Hash256, GovernanceObject>,
    masternode_orphans: HashMap<Hash256, (GovernanceObject, ExpirationInfo)>,
    erased: HashMap<Hash256, i64>,
    orphan_counter: HashMap<Outpoint, u32>,
    additional_relay: HashSet<Hash256>,
}

impl ObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where `hash` lives, if anywhere.
    #[must_use]
    pub fn location(&self, hash: &Hash256) -> Option<ObjectLocation> {
        if self.active.contains_key(hash) {
            Some(ObjectLocation::Active)
        } else if self.postponed.contains_key(hash) {
            Some(ObjectLocation::Postponed)
        } else if self.masternode_orphans.contains_key(hash) {
            Some(ObjectLocation::MasternodeOrphan)
        } else if self.erased.contains_key(hash) {
            Some(ObjectLocation::Erased)
        } else {
            None
        }
    }

    /// Returns true if `hash` is known in any map.
    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.location(hash).is_some()
    }

    /// Returns true if `hash` is active.
    #[must_use]
    pub fn is_active(&self, hash: &Hash256) -> bool {
        self.active.contains_key(hash)
    }

    /// Returns true if `hash` is postponed.
    #[must_use]
    pub fn is_postponed(&self, hash: &Hash256) -> bool {
        self.postponed.contains_key(hash)
    }

    /// An active object.
    #[must_use]
    pub fn get(&self, hash: &Hash256) -> Option<&GovernanceObject> {
        self.active.get(hash)
    }

    pub(crate) fn get_mut(&mut self, hash: &Hash256) -> Option<&mut GovernanceObject> {
        self.active.get_mut(hash)
    }

    /// Active objects.
    pub fn active(&self) -> impl Iterator<Item = (&Hash256, &GovernanceObject)> {
        self.active.iter()
    }

    pub(crate) fn active_mut(&mut self) -> impl Iterator<Item = (&Hash256, &mut GovernanceObject)> {
        self.active.iter_mut()
    }

    /// Number of active objects.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Inserts an accepted object. Returns false if it is already active.
    pub(crate) fn insert_active(&mut self, hash: Hash256, object: GovernanceObject) -> bool {
        debug_assert!(
            !self.postponed.contains_key(&hash) && !self.masternode_orphans.contains_key(&hash),
            "object must leave side maps before activation"
        );
        if self.active.contains_key(&hash) {
            return false;
        }
        self.active.insert(hash, object);
        true
    }

    pub(crate) fn remove_active(&mut self, hash: &Hash256) -> Option<GovernanceObject> {
        self.active.remove(hash)
    }

    // ========== Postponed ==========

    pub(crate) fn postpone(&mut self, hash: Hash256, object: GovernanceObject) {
        self.postponed.insert(hash, object);
    }

    /// A postponed object.
    #[must_use]
    pub fn postponed(&self, hash: &Hash256) -> Option<&GovernanceObject> {
        self.postponed.get(hash)
    }

    pub(crate) fn take_postponed(&mut self, hash: &Hash256) -> Option<GovernanceObject> {
        self.postponed.remove(hash)
    }

    /// Hashes of postponed objects.
    #[must_use]
    pub fn postponed_hashes(&self) -> Vec<Hash256> {
        self.postponed.keys().copied().collect()
    }

    /// Number of postponed objects.
    #[must_use]
    pub fn postponed_len(&self) -> usize {
        self.postponed.len()
    }

    // ========== Masternode orphans ==========

    pub(crate) fn quarantine(&mut self, hash: Hash256, object: GovernanceObject, info: ExpirationInfo) {
        self.masternode_orphans.insert(hash, (object, info));
    }

    /// A quarantined object and its expiry.
    #[must_use]
    pub fn quarantined(&self, hash: &Hash256) -> Option<(&GovernanceObject, &ExpirationInfo)> {
        self.masternode_orphans.get(hash).map(|(object, info)| (object, info))
    }

    pub(crate) fn take_quarantined(&mut self, hash: &Hash256) -> Option<(GovernanceObject, ExpirationInfo)> {
        let taken = self.masternode_orphans.remove(hash)?;
        self.release_orphan_slot(&taken.0.masternode());
        Some(taken)
    }

    /// Hashes of quarantined objects.
    #[must_use]
    pub fn quarantined_hashes(&self) -> Vec<Hash256> {
        self.masternode_orphans.keys().copied().collect()
    }

    /// Number of quarantined objects.
    #[must_use]
    pub fn quarantined_len(&self) -> usize {
        self.masternode_orphans.len()
    }

    /// Quarantine attempts charged to a masternode.
    #[must_use]
    pub fn orphan_attempts(&self, masternode: &Outpoint) -> u32 {
        self.orphan_counter.get(masternode).copied().unwrap_or(0)
    }

    pub(crate) fn charge_orphan_slot(&mut self, masternode: Outpoint) {
        *self.orphan_counter.entry(masternode).or_insert(0) += 1;
    }

    fn release_orphan_slot(&mut self, masternode: &Outpoint) {
        if let Some(count) = self.orphan_counter.get_mut(masternode) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.orphan_counter.remove(masternode);
            }
        }
    }

    // ========== Erased ==========

    pub(crate) fn record_erased(&mut self, hash: Hash256, deadline: i64) {
        self.erased.insert(hash, deadline);
    }

    /// Forgetting deadline of an erased hash.
    #[must_use]
    pub fn erased_deadline(&self, hash: &Hash256) -> Option<i64> {
        self.erased.get(hash).copied()
    }

    /// Number of erased hashes.
    #[must_use]
    pub fn erased_len(&self) -> usize {
        self.erased.len()
    }

    /// Forgets erased hashes whose deadline has passed. Returns how many were dropped.
    pub(crate) fn purge_erased(&mut self, now: i64) -> usize {
        let before = self.erased.len();
        self.erased.retain(|_, deadline| *deadline > now);
        before - self.erased.len()
    }

    // ========== Additional relay ==========

    pub(crate) fn schedule_relay(&mut self, hash: Hash256) {
        self.additional_relay.insert(hash);
    }

    pub(crate) fn unschedule_relay(&mut self, hash: &Hash256) {
        self.additional_relay.remove(hash);
    }

    /// Objects waiting for a second relay.
    #[must_use]
    pub fn relay_candidates(&self) -> Vec<Hash256> {
        self.additional_relay.iter().copied().collect()
    }

    // ========== Persistence ==========

    pub(crate) fn erased_entries(&self) -> Vec<(Hash256, i64)> {
        self.erased.iter().map(|(hash, deadline)| (*hash, *deadline)).collect()
    }

    /// Replaces the active and erased maps. Side maps start empty.
    pub(crate) fn restore(&mut self, objects: Vec<GovernanceObject>, erased: Vec<(Hash256, i64)>) {
        self.clear();
        self.active = objects.into_iter().map(|object| (object.hash(), object)).collect();
        self.erased = erased.into_iter().collect();
    }

    /// Empties every map.
    pub(crate) fn clear(&mut self) {
        self.active.clear();
        self.postponed.clear();
        self.masternode_orphans.clear();
        self.erased.clear();
        self.orphan_counter.clear();
        self.additional_relay.clear();
    }

    /// Active object counts by kind: (proposals, triggers, watchdogs, other).
    #[must_use]
    pub fn counts_by_kind(&self) -> (usize, usize, usize, usize) {
        self.active
            .values()
            .fold((0, 0, 0, 0), |(p, t, w, o), object| match object.kind() {
                ObjectKind::Proposal => (p + 1, t, w, o),
                ObjectKind::Trigger(_) => (p, t + 1, w, o),
                ObjectKind::Watchdog => (p, t, w + 1, o),
                ObjectKind::Other(_) => (p, t, w, o + 1),
            })
    }
}

/// Forgetting deadline for an erased object.
///
/// Watchdogs are forgotten when they would have expired, triggers once they
/// can no longer pass the rate limiter's age bound, everything else never.
#[must_use]
pub fn erased_deadline(
    object: &GovernanceObject,
    watchdog_expiration_time: i64,
    superblock_cycle_seconds: i64,
    deletion_delay: i64,
) -> i64 {
    match object.kind() {
        ObjectKind::Watchdog => object.creation_time() + watchdog_expiration_time,
        ObjectKind::Trigger(_) => object.creation_time() + 2 * superblock_cycle_seconds + deletion_delay,
        ObjectKind::Proposal | ObjectKind::Other(_) => i64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mngov_core::TriggerPayload;
    use test_case::test_case;

    fn masternode(n: u8) -> Outpoint {
        Outpoint::new(Hash256::from_bytes([n; 32]), 0)
    }

    fn object(kind: ObjectKind, creation_time: i64, mn: u8) -> GovernanceObject {
        GovernanceObject::new(
            Hash256::ZERO,
            1,
            creation_time,
            Hash256::digest(b"fee"),
            masternode(mn),
            kind,
            b"payload".to_vec(),
        )
    }

    #[test]
    fn test_location_tracks_single_map() {
        let mut store = ObjectStore::new();
        let obj = object(ObjectKind::Proposal, 100, 1);
        let hash = obj.hash();

        store.postpone(hash, obj);
        assert_eq!(store.location(&hash), Some(ObjectLocation::Postponed));

        let obj = store.take_postponed(&hash).unwrap();
        assert!(store.insert_active(hash, obj));
        assert_eq!(store.location(&hash), Some(ObjectLocation::Active));
        assert!(store.contains(&hash));

        store.remove_active(&hash);
        store.record_erased(hash, i64::MAX);
        assert_eq!(store.location(&hash), Some(ObjectLocation::Erased));
        assert!(store.get(&hash).is_none());
    }

    #[test]
    fn test_insert_active_twice() {
        let mut store = ObjectStore::new();
        let obj = object(ObjectKind::Proposal, 100, 1);
        let hash = obj.hash();
        assert!(store.insert_active(hash, obj.clone()));
        assert!(!store.insert_active(hash, obj));
        assert_eq!(store.active_len(), 1);
    }

    #[test]
    fn test_orphan_counter_follows_quarantine() {
        let mut store = ObjectStore::new();
        let obj = object(ObjectKind::Watchdog, 100, 7);
        let hash = obj.hash();
        let info = ExpirationInfo {
            peer: None,
            expires_at: 700,
        };

        store.charge_orphan_slot(masternode(7));
        store.quarantine(hash, obj, info);
        assert_eq!(store.orphan_attempts(&masternode(7)), 1);
        assert_eq!(store.location(&hash), Some(ObjectLocation::MasternodeOrphan));

        let (_, taken_info) = store.take_quarantined(&hash).unwrap();
        assert_eq!(taken_info, info);
        assert_eq!(store.orphan_attempts(&masternode(7)), 0);
        assert!(!store.contains(&hash));
    }

    #[test]
    fn test_purge_erased_uses_inclusive_deadline() {
        let mut store = ObjectStore::new();
        store.record_erased(Hash256::digest(b"a"), 100);
        store.record_erased(Hash256::digest(b"b"), 101);
        store.record_erased(Hash256::digest(b"c"), i64::MAX);

        assert_eq!(store.purge_erased(100), 1);
        assert_eq!(store.erased_len(), 2);
        assert_eq!(store.purge_erased(i64::MAX - 1), 1);
        assert_eq!(store.erased_deadline(&Hash256::digest(b"c")), Some(i64::MAX));
    }

    #[test_case(ObjectKind::Watchdog, 1_000 + 7_200 ; "watchdog")]
    #[test_case(ObjectKind::Trigger(TriggerPayload { event_block_height: 5 }), 1_000 + 2 * 50_000 + 600 ; "trigger")]
    #[test_case(ObjectKind::Proposal, i64::MAX ; "proposal")]
    #[test_case(ObjectKind::Other(3), i64::MAX ; "other")]
    fn test_erased_deadline(kind: ObjectKind, expected: i64) {
        let obj = object(kind, 1_000, 1);
        assert_eq!(erased_deadline(&obj, 7_200, 50_000, 600), expected);
    }

    #[test]
    fn test_counts_by_kind() {
        let mut store = ObjectStore::new();
        for (i, kind) in [ObjectKind::Proposal, ObjectKind::Proposal, ObjectKind::Watchdog]
            .into_iter()
            .enumerate()
        {
            let obj = object(kind, i as i64, 1);
            store.insert_active(obj.hash(), obj);
        }
        assert_eq!(store.counts_by_kind(), (2, 0, 1, 0));
    }

    #[test]
    fn test_restore_rebuilds_hashes() {
        let mut store = ObjectStore::new();
        let obj = object(ObjectKind::Proposal, 5, 2);
        let hash = obj.hash();
        store.restore(vec![obj], vec![(Hash256::digest(b"gone"), 10)]);
        assert!(store.is_active(&hash));
        assert_eq!(store.erased_len(), 1);
        assert!(store.postponed_hashes().is_empty());
    }
}
