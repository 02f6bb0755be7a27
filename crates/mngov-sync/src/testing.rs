//! In-memory collaborators for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use mngov_core::{GovernanceObject, GovernanceVote, Hash256, Outpoint, PeerId};
use parking_lot::Mutex;

use crate::collaborators::{
    Clock, MasternodeRegistry, MasternodeValidator, ObjectValidity, PeerInfo, PeerNetwork, SyncStatus,
    VoteValidity,
};
use crate::message::{InventoryItem, SyncRequest};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    #[must_use]
    pub const fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Jumps to `now`.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Validator answering [`ObjectValidity::Valid`] unless told otherwise per hash.
#[derive(Debug, Default)]
pub struct MockValidator {
    objects: Mutex<HashMap<Hash256, ObjectValidity>>,
    votes: Mutex<HashMap<Hash256, VoteValidity>>,
    collateral_checks: AtomicUsize,
}

impl MockValidator {
    /// Creates a validator that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer for an object hash.
    pub fn set_object(&self, hash: Hash256, validity: ObjectValidity) {
        self.objects.lock().insert(hash, validity);
    }

    /// Sets the answer for a vote hash.
    pub fn set_vote(&self, hash: Hash256, validity: VoteValidity) {
        self.votes.lock().insert(hash, validity);
    }

    /// Number of collateral re-checks performed.
    #[must_use]
    pub fn collateral_checks(&self) -> usize {
        self.collateral_checks.load(Ordering::SeqCst)
    }
}

impl MasternodeValidator for MockValidator {
    fn validate_object(&self, object: &GovernanceObject, _check_collateral: bool) -> ObjectValidity {
        self.objects
            .lock()
            .get(&object.hash())
            .cloned()
            .unwrap_or(ObjectValidity::Valid)
    }

    fn check_collateral(&self, object: &GovernanceObject, _height: u64) -> ObjectValidity {
        self.collateral_checks.fetch_add(1, Ordering::SeqCst);
        self.validate_object(object, true)
    }

    fn validate_vote(&self, vote: &GovernanceVote) -> VoteValidity {
        self.votes
            .lock()
            .get(&vote.hash())
            .cloned()
            .unwrap_or(VoteValidity::Valid)
    }
}

/// Sync status with independently settable flags. Fully synced by default.
#[derive(Debug)]
pub struct MockSyncStatus {
    synced: AtomicBool,
    masternode_list: AtomicBool,
    winners_list: AtomicBool,
}

impl MockSyncStatus {
    /// Creates a fully synced status.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            synced: AtomicBool::new(true),
            masternode_list: AtomicBool::new(true),
            winners_list: AtomicBool::new(true),
        }
    }

    /// Sets every flag at once.
    pub fn set_all(&self, value: bool) {
        self.synced.store(value, Ordering::SeqCst);
        self.masternode_list.store(value, Ordering::SeqCst);
        self.winners_list.store(value, Ordering::SeqCst);
    }

    /// Sets the fully-synced flag.
    pub fn set_synced(&self, value: bool) {
        self.synced.store(value, Ordering::SeqCst);
    }

    /// Sets the masternode-list flag.
    pub fn set_masternode_list_synced(&self, value: bool) {
        self.masternode_list.store(value, Ordering::SeqCst);
    }

    /// Sets the winners-list flag.
    pub fn set_winners_list_synced(&self, value: bool) {
        self.winners_list.store(value, Ordering::SeqCst);
    }
}

impl Default for MockSyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatus for MockSyncStatus {
    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn is_masternode_list_synced(&self) -> bool {
        self.masternode_list.load(Ordering::SeqCst)
    }

    fn is_winners_list_synced(&self) -> bool {
        self.winners_list.load(Ordering::SeqCst)
    }
}

/// Masternode registry that knows every outpoint except the forgotten ones.
#[derive(Debug)]
pub struct MockRegistry {
    enabled: AtomicUsize,
    forgotten: Mutex<HashSet<Outpoint>>,
    watchdog_votes: Mutex<HashMap<Outpoint, i64>>,
    removed: Mutex<Vec<Hash256>>,
    dirty: Mutex<Vec<Hash256>>,
}

impl MockRegistry {
    /// Creates a registry reporting `enabled` enabled masternodes.
    #[must_use]
    pub fn new(enabled: usize) -> Self {
        Self {
            enabled: AtomicUsize::new(enabled),
            forgotten: Mutex::new(HashSet::new()),
            watchdog_votes: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            dirty: Mutex::new(Vec::new()),
        }
    }

    /// Changes the enabled count.
    pub fn set_enabled(&self, enabled: usize) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Drops a masternode from the list.
    pub fn forget(&self, outpoint: Outpoint) {
        self.forgotten.lock().insert(outpoint);
    }

    /// Flags an object's votes as changed.
    pub fn mark_dirty(&self, hash: Hash256) {
        self.dirty.lock().push(hash);
    }

    /// Last recorded watchdog vote time of a masternode.
    #[must_use]
    pub fn watchdog_vote_time(&self, outpoint: &Outpoint) -> Option<i64> {
        self.watchdog_votes.lock().get(outpoint).copied()
    }

    /// Objects reported as erased, in order.
    #[must_use]
    pub fn removed_objects(&self) -> Vec<Hash256> {
        self.removed.lock().clone()
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MasternodeRegistry for MockRegistry {
    fn enabled_count(&self) -> usize {
        self.enabled.load(Ordering::SeqCst)
    }

    fn has_masternode(&self, outpoint: &Outpoint) -> bool {
        !self.forgotten.lock().contains(outpoint)
    }

    fn update_watchdog_vote_time(&self, outpoint: &Outpoint, time: i64) {
        self.watchdog_votes.lock().insert(*outpoint, time);
    }

    fn remove_governance_object(&self, hash: &Hash256) {
        self.removed.lock().push(*hash);
    }

    fn take_dirty_governance_hashes(&self) -> Vec<Hash256> {
        std::mem::take(&mut *self.dirty.lock())
    }
}

/// A network call captured by [`RecordingNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Object relayed.
    RelayObject(Hash256),
    /// Vote relayed.
    RelayVote(Hash256),
    /// Item requested from a peer.
    AskFor(PeerId, InventoryItem),
    /// Item advertised to a peer.
    PushInventory(PeerId, InventoryItem),
    /// Sync request sent.
    SyncRequest(PeerId, SyncRequest),
    /// Peer penalized.
    Penalize(PeerId, u32),
}

/// Network that records every call.
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    events: Mutex<Vec<NetworkEvent>>,
    peers: Mutex<Vec<PeerInfo>>,
}

impl RecordingNetwork {
    /// Creates a network with no peers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the connected peer list.
    pub fn set_peers(&self, peers: Vec<PeerInfo>) {
        *self.peers.lock() = peers;
    }

    /// Every recorded call, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<NetworkEvent> {
        self.events.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Hashes of relayed objects.
    #[must_use]
    pub fn relayed_objects(&self) -> Vec<Hash256> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                NetworkEvent::RelayObject(hash) => Some(*hash),
                _ => None,
            })
            .collect()
    }

    /// Hashes of relayed votes.
    #[must_use]
    pub fn relayed_votes(&self) -> Vec<Hash256> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                NetworkEvent::RelayVote(hash) => Some(*hash),
                _ => None,
            })
            .collect()
    }

    /// Penalties applied, as (peer, score).
    #[must_use]
    pub fn penalties(&self) -> Vec<(PeerId, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                NetworkEvent::Penalize(peer, score) => Some((*peer, *score)),
                _ => None,
            })
            .collect()
    }

    /// Sync requests sent, as (peer, request).
    #[must_use]
    pub fn sync_requests(&self) -> Vec<(PeerId, SyncRequest)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                NetworkEvent::SyncRequest(peer, request) => Some((*peer, request.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: NetworkEvent) {
        self.events.lock().push(event);
    }
}

impl PeerNetwork for RecordingNetwork {
    fn relay_object(&self, object: &GovernanceObject) {
        self.record(NetworkEvent::RelayObject(object.hash()));
    }

    fn relay_vote(&self, vote: &GovernanceVote) {
        self.record(NetworkEvent::RelayVote(vote.hash()));
    }

    fn ask_for(&self, peer: &PeerId, item: InventoryItem) {
        self.record(NetworkEvent::AskFor(*peer, item));
    }

    fn push_inventory(&self, peer: &PeerId, item: InventoryItem) {
        self.record(NetworkEvent::PushInventory(*peer, item));
    }

    fn send_sync_request(&self, peer: &PeerId, request: SyncRequest) {
        self.record(NetworkEvent::SyncRequest(*peer, request));
    }

    fn penalize(&self, peer: &PeerId, score: u32) {
        self.record(NetworkEvent::Penalize(*peer, score));
    }

    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().clone()
    }
}
