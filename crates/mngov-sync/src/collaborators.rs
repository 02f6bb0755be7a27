//! Interfaces to the rest of the node.
//!
//! The engine never talks to the chain, the masternode list or the network
//! directly. It goes through these traits, which the host implements.

use chrono::Utc;
use mngov_core::{GovernanceObject, GovernanceVote, Hash256, Outpoint, PeerId};
use serde::{Deserialize, Serialize};

use crate::message::{InventoryItem, SyncRequest};

/// Result of checking an object's signature and collateral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectValidity {
    /// Passes every check.
    Valid,
    /// The owning masternode is not in the local list yet.
    MissingMasternode,
    /// The collateral transaction lacks confirmations.
    MissingConfirmations,
    /// Fails a check for good.
    Invalid(String),
}

impl ObjectValidity {
    /// Returns true for [`ObjectValidity::Valid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Result of checking a vote's signature and masternode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteValidity {
    /// Passes every check.
    Valid,
    /// The voting masternode is not in the local list yet.
    MissingMasternode,
    /// Fails a check for good.
    Invalid(String),
}

/// Signature and collateral checks delegated to the masternode subsystem.
pub trait MasternodeValidator: Send + Sync {
    /// Validates an object's signature and, when asked, its collateral.
    fn validate_object(&self, object: &GovernanceObject, check_collateral: bool) -> ObjectValidity;

    /// Re-checks collateral confirmations against a given chain height.
    fn check_collateral(&self, object: &GovernanceObject, height: u64) -> ObjectValidity;

    /// Validates a vote's signature and masternode.
    fn validate_vote(&self, vote: &GovernanceVote) -> VoteValidity;
}

/// Progress of the node's initial sync.
pub trait SyncStatus: Send + Sync {
    /// Fully synced.
    fn is_synced(&self) -> bool;
    /// The masternode list is synced.
    fn is_masternode_list_synced(&self) -> bool;
    /// The payment winners list is synced.
    fn is_winners_list_synced(&self) -> bool;
}

/// The node's view of the masternode list.
pub trait MasternodeRegistry: Send + Sync {
    /// Number of enabled masternodes.
    fn enabled_count(&self) -> usize;
    /// Returns true if the outpoint belongs to a known masternode.
    fn has_masternode(&self, outpoint: &Outpoint) -> bool;
    /// Records when a masternode last voted on a watchdog.
    fn update_watchdog_vote_time(&self, outpoint: &Outpoint, time: i64);
    /// Notifies that an object was erased.
    fn remove_governance_object(&self, hash: &Hash256);
    /// Drains the hashes of objects whose masternode votes changed.
    fn take_dirty_governance_hashes(&self) -> Vec<Hash256>;
}

/// A connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer identity.
    pub id: PeerId,
    /// Negotiated protocol version.
    pub protocol_version: u32,
    /// Whether the peer is a masternode.
    pub is_masternode: bool,
}

impl PeerInfo {
    /// Creates a peer description.
    #[must_use]
    pub const fn new(id: PeerId, protocol_version: u32, is_masternode: bool) -> Self {
        Self {
            id,
            protocol_version,
            is_masternode,
        }
    }
}

/// Outbound network operations.
///
/// Called only after the governance lock is released.
pub trait PeerNetwork: Send + Sync {
    /// Announces an object to every peer.
    fn relay_object(&self, object: &GovernanceObject);
    /// Announces a vote to every peer.
    fn relay_vote(&self, vote: &GovernanceVote);
    /// Asks a peer to send an item.
    fn ask_for(&self, peer: &PeerId, item: InventoryItem);
    /// Advertises an item to a single peer.
    fn push_inventory(&self, peer: &PeerId, item: InventoryItem);
    /// Sends a sync request to a peer.
    fn send_sync_request(&self, peer: &PeerId, request: SyncRequest);
    /// Adds to a peer's misbehaviour score.
    fn penalize(&self, peer: &PeerId, score: u32);
    /// Currently connected peers.
    fn connected_peers(&self) -> Vec<PeerInfo>;
}

/// Source of wall-clock time in unix seconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
