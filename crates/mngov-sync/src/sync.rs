//! Inventory bookkeeping and sync request building/serving.

use std::collections::HashSet;

use mngov_core::{BloomFilter, Hash256, PeerId};
use tracing::debug;

use crate::collaborators::PeerInfo;
use crate::config::SyncConfig;
use crate::message::{InventoryItem, InventoryKind, SyncRequest};
use crate::store::ObjectStore;
use crate::votes::VoteResolver;

/// Hashes this node asked peers for and has not yet received.
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    requested_objects: HashSet<Hash256>,
    requested_votes: HashSet<Hash256>,
}

impl SyncCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding object requests.
    #[must_use]
    pub fn requested_objects_len(&self) -> usize {
        self.requested_objects.len()
    }

    /// Number of outstanding vote requests.
    #[must_use]
    pub fn requested_votes_len(&self) -> usize {
        self.requested_votes.len()
    }

    /// Decides whether an advertised item should be fetched.
    ///
    /// Returns true, and remembers the hash as requested, only for objects and
    /// votes not yet held or already requested.
    pub fn confirm_inventory(
        &mut self,
        item: &InventoryItem,
        store: &ObjectStore,
        votes: &VoteResolver,
        winners_synced: bool,
    ) -> bool {
        if !winners_synced {
            return false;
        }
        let fresh = match item.kind {
            InventoryKind::Object => {
                if store.is_active(&item.hash) || store.is_postponed(&item.hash) {
                    return false;
                }
                self.requested_objects.insert(item.hash)
            }
            InventoryKind::Vote => {
                if votes.is_indexed(&item.hash) {
                    return false;
                }
                self.requested_votes.insert(item.hash)
            }
            InventoryKind::Other(code) => {
                debug!(code, hash = %item.hash, "ignoring unknown inventory kind");
                return false;
            }
        };
        if fresh {
            debug!(hash = %item.hash, kind = ?item.kind, "inventory requested");
        }
        fresh
    }

    /// Consumes a pending request. Returns false if `hash` was never requested.
    pub fn accept_unsolicited(&mut self, hash: &Hash256, kind: InventoryKind) -> bool {
        match kind {
            InventoryKind::Object => self.requested_objects.remove(hash),
            InventoryKind::Vote => self.requested_votes.remove(hash),
            InventoryKind::Other(_) => false,
        }
    }

    /// Builds a request for `hash`'s votes (or every object for the zero hash).
    ///
    /// Peers new enough to understand filters get a bloom filter of the votes
    /// already held, when `use_filter` is set and the object is known.
    #[must_use]
    pub fn build_sync_request(
        &self,
        peer: &PeerInfo,
        hash: Hash256,
        use_filter: bool,
        store: &ObjectStore,
        config: &SyncConfig,
    ) -> SyncRequest {
        if !use_filter || peer.protocol_version < config.filter_proto_version {
            return SyncRequest::unfiltered(hash);
        }
        let Some(object) = store.get(&hash) else {
            return SyncRequest::unfiltered(hash);
        };

        let mut filter = BloomFilter::with_rate(config.filter_elements, config.filter_fp_rate, rand::random());
        for vote in object.votes().votes() {
            filter.insert_hash(&vote.hash());
        }
        debug!(
            peer = %peer.id,
            hash = %hash,
            votes = object.votes().len(),
            "built filtered sync request"
        );
        SyncRequest {
            hash,
            filter: Some(filter),
        }
    }

    /// Inventory to send in answer to a peer's sync request.
    ///
    /// The zero hash asks for every live object. Any other hash asks for that
    /// object's votes the peer's filter does not already cover, followed by
    /// the object itself.
    #[must_use]
    pub fn serve_sync_request(
        &self,
        peer: &PeerInfo,
        request: &SyncRequest,
        store: &ObjectStore,
        synced: bool,
        config: &SyncConfig,
    ) -> Vec<InventoryItem> {
        if peer.protocol_version < config.min_peer_proto_version {
            debug!(peer = %peer.id, version = peer.protocol_version, "sync request from outdated peer");
            return Vec::new();
        }
        if !synced {
            return Vec::new();
        }

        if request.hash.is_zero() {
            let items: Vec<InventoryItem> = store
                .active()
                .filter(|(_, object)| !object.is_marked_for_removal())
                .map(|(hash, _)| InventoryItem::object(*hash))
                .collect();
            debug!(peer = %peer.id, objects = items.len(), "serving object list");
            return items;
        }

        let Some(object) = store.get(&request.hash) else {
            return Vec::new();
        };
        if object.is_marked_for_removal() {
            return Vec::new();
        }
        let mut items: Vec<InventoryItem> = object
            .votes()
            .votes()
            .iter()
            .map(mngov_core::GovernanceVote::hash)
            .filter(|hash| request.filter.as_ref().is_none_or(|filter| !filter.contains_hash(hash)))
            .map(InventoryItem::vote)
            .collect();
        items.push(InventoryItem::object(request.hash));
        debug!(peer = %peer.id, hash = %request.hash, items = items.len(), "serving object votes");
        items
    }

    /// Sync requests for every orphan-vote parent not held locally.
    ///
    /// Each parent is asked of every connected peer that is not a masternode.
    #[must_use]
    pub fn orphan_object_requests(
        &self,
        parents: &[Hash256],
        peers: &[PeerInfo],
        store: &ObjectStore,
        config: &SyncConfig,
    ) -> Vec<(PeerId, SyncRequest)> {
        let mut requests = Vec::new();
        for parent in parents.iter().filter(|parent| !store.is_active(parent)) {
            for peer in peers.iter().filter(|peer| !peer.is_masternode) {
                requests.push((peer.id, self.build_sync_request(peer, *parent, false, store, config)));
            }
        }
        requests
    }

    pub(crate) fn clear(&mut self) {
        self.requested_objects.clear();
        self.requested_votes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mngov_core::{GovernanceObject, GovernanceVote, ObjectKind, Outpoint, VoteOutcome, VoteSignal};

    const NOW: i64 = 1_700_000_000;

    fn peer(n: u8, version: u32, is_masternode: bool) -> PeerInfo {
        PeerInfo::new(PeerId::from_bytes([n; 32]), version, is_masternode)
    }

    fn masternode(n: u8) -> Outpoint {
        Outpoint::new(Hash256::from_bytes([n; 32]), 0)
    }

    fn object_with_votes(votes: u8) -> GovernanceObject {
        let mut object = GovernanceObject::new(
            Hash256::ZERO,
            1,
            NOW,
            Hash256::digest(b"fee"),
            masternode(1),
            ObjectKind::Proposal,
            b"proposal".to_vec(),
        );
        let parent = object.hash();
        for mn in 0..votes {
            let vote = GovernanceVote::new(parent, masternode(mn + 10), VoteSignal::Funding, VoteOutcome::Yes, NOW);
            object.apply_vote(vote, 3_600).unwrap();
        }
        object
    }

    fn store_with(object: GovernanceObject) -> (ObjectStore, Hash256) {
        let mut store = ObjectStore::new();
        let hash = object.hash();
        store.insert_active(hash, object);
        (store, hash)
    }

    // ========== Inventory Tests ==========

    #[test]
    fn test_confirm_inventory_requires_winners_sync() {
        let mut sync = SyncCoordinator::new();
        let item = InventoryItem::object(Hash256::digest(b"x"));
        assert!(!sync.confirm_inventory(&item, &ObjectStore::new(), &VoteResolver::new(10), false));
        assert_eq!(sync.requested_objects_len(), 0);
    }

    #[test]
    fn test_confirm_inventory_deduplicates() {
        let mut sync = SyncCoordinator::new();
        let store = ObjectStore::new();
        let votes = VoteResolver::new(10);
        let item = InventoryItem::vote(Hash256::digest(b"v"));
        assert!(sync.confirm_inventory(&item, &store, &votes, true));
        assert!(!sync.confirm_inventory(&item, &store, &votes, true));
        assert_eq!(sync.requested_votes_len(), 1);
    }

    #[test]
    fn test_confirm_inventory_skips_held_objects() {
        let mut sync = SyncCoordinator::new();
        let (store, hash) = store_with(object_with_votes(0));
        let votes = VoteResolver::new(10);
        assert!(!sync.confirm_inventory(&InventoryItem::object(hash), &store, &votes, true));
        let other = InventoryItem {
            kind: InventoryKind::Other(9),
            hash: Hash256::digest(b"o"),
        };
        assert!(!sync.confirm_inventory(&other, &store, &votes, true));
    }

    #[test]
    fn test_accept_unsolicited_consumes_request() {
        let mut sync = SyncCoordinator::new();
        let hash = Hash256::digest(b"x");
        assert!(!sync.accept_unsolicited(&hash, InventoryKind::Object));
        sync.confirm_inventory(&InventoryItem::object(hash), &ObjectStore::new(), &VoteResolver::new(10), true);
        assert!(sync.accept_unsolicited(&hash, InventoryKind::Object));
        assert!(!sync.accept_unsolicited(&hash, InventoryKind::Object));
    }

    // ========== Request Tests ==========

    #[test]
    fn test_old_peer_gets_unfiltered_request() {
        let sync = SyncCoordinator::new();
        let (store, hash) = store_with(object_with_votes(3));
        let config = SyncConfig::default();
        let request = sync.build_sync_request(&peer(1, 70_207, false), hash, true, &store, &config);
        assert!(!request.is_filtered());
    }

    #[test]
    fn test_filter_covers_known_votes() {
        let sync = SyncCoordinator::new();
        let (store, hash) = store_with(object_with_votes(3));
        let config = SyncConfig::default();
        let request = sync.build_sync_request(&peer(1, 70_208, false), hash, true, &store, &config);
        let filter = request.filter.unwrap();
        for vote in store.get(&hash).unwrap().votes().votes() {
            assert!(filter.contains_hash(&vote.hash()));
        }
    }

    #[test]
    fn test_unknown_object_request_is_unfiltered() {
        let sync = SyncCoordinator::new();
        let request = sync.build_sync_request(
            &peer(1, 70_208, false),
            Hash256::digest(b"nope"),
            true,
            &ObjectStore::new(),
            &SyncConfig::default(),
        );
        assert_eq!(request, SyncRequest::unfiltered(Hash256::digest(b"nope")));
    }

    // ========== Serve Tests ==========

    #[test]
    fn test_serve_ignores_outdated_or_unsynced() {
        let sync = SyncCoordinator::new();
        let (store, _) = store_with(object_with_votes(1));
        let config = SyncConfig::default();
        let request = SyncRequest::unfiltered(Hash256::ZERO);
        assert!(sync.serve_sync_request(&peer(1, 70_000, false), &request, &store, true, &config).is_empty());
        assert!(sync.serve_sync_request(&peer(1, 70_208, false), &request, &store, false, &config).is_empty());
    }

    #[test]
    fn test_serve_zero_hash_lists_live_objects() {
        let sync = SyncCoordinator::new();
        let (mut store, live) = store_with(object_with_votes(0));
        let mut deleted = GovernanceObject::new(
            Hash256::ZERO,
            2,
            NOW,
            Hash256::digest(b"fee2"),
            masternode(2),
            ObjectKind::Proposal,
            b"p".to_vec(),
        );
        deleted.mark_cached_delete(NOW);
        store.insert_active(deleted.hash(), deleted);

        let items = sync.serve_sync_request(
            &peer(1, 70_208, false),
            &SyncRequest::unfiltered(Hash256::ZERO),
            &store,
            true,
            &SyncConfig::default(),
        );
        assert_eq!(items, vec![InventoryItem::object(live)]);
    }

    #[test]
    fn test_serve_filtered_votes_skips_known() {
        let sync = SyncCoordinator::new();
        let (store, hash) = store_with(object_with_votes(4));
        let config = SyncConfig::default();
        let votes: Vec<Hash256> = store.get(&hash).unwrap().votes().votes().iter().map(GovernanceVote::hash).collect();

        let mut filter = BloomFilter::with_rate(100, 0.0001, 1);
        filter.insert_hash(&votes[0]);
        filter.insert_hash(&votes[1]);
        let request = SyncRequest {
            hash,
            filter: Some(filter),
        };

        let items = sync.serve_sync_request(&peer(1, 70_208, false), &request, &store, true, &config);
        assert!(items.contains(&InventoryItem::vote(votes[2])));
        assert!(items.contains(&InventoryItem::vote(votes[3])));
        assert!(!items.contains(&InventoryItem::vote(votes[0])));
        assert_eq!(items.last(), Some(&InventoryItem::object(hash)));
    }

    #[test]
    fn test_orphan_requests_skip_masternode_peers() {
        let sync = SyncCoordinator::new();
        let (store, held) = store_with(object_with_votes(0));
        let missing = Hash256::digest(b"missing");
        let peers = vec![peer(1, 70_208, false), peer(2, 70_208, true), peer(3, 70_208, false)];

        let requests = sync.orphan_object_requests(&[held, missing], &peers, &store, &SyncConfig::default());
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|(_, request)| *request == SyncRequest::unfiltered(missing)));
        assert!(requests.iter().all(|(id, _)| *id != PeerId::from_bytes([2; 32])));
    }
}
