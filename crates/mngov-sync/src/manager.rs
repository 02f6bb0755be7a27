//! The locking public API over the governance state.
//!
//! Every public method takes the state lock exactly once, runs the locked
//! helpers, releases the lock and only then hands queued network actions to
//! the [`PeerNetwork`].

use std::fmt;
use std::sync::Arc;

use mngov_core::{GovernanceError, GovernanceObject, GovernanceResult, GovernanceVote, Hash256};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::admission::SubmitOutcome;
use crate::collaborators::{Clock, MasternodeRegistry, MasternodeValidator, PeerInfo, PeerNetwork, SyncStatus};
use crate::config::GovernanceConfig;
use crate::error::SyncResult;
use crate::message::{InventoryItem, InventoryKind, SyncRequest};
use crate::rate_limit::{RateCheck, RateCheckMode};
use crate::snapshot::{self, LoadOutcome};
use crate::state::{Context, GovernanceState, Outbox};
use crate::sweep::SweepReport;
use crate::votes::VoteDisposition;

/// The host services the engine depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Signature and collateral checks.
    pub validator: Arc<dyn MasternodeValidator>,
    /// Initial sync progress.
    pub sync_status: Arc<dyn SyncStatus>,
    /// Masternode list.
    pub registry: Arc<dyn MasternodeRegistry>,
    /// Outbound peer operations.
    pub network: Arc<dyn PeerNetwork>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Point-in-time counts of the governance state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GovernanceStats {
    /// Active objects.
    pub objects: usize,
    /// Active proposals.
    pub proposals: usize,
    /// Active triggers.
    pub triggers: usize,
    /// Active watchdogs.
    pub watchdogs: usize,
    /// Active objects of other kinds.
    pub other: usize,
    /// Objects waiting for collateral confirmations.
    pub postponed: usize,
    /// Objects waiting for their masternode.
    pub quarantined: usize,
    /// Erased hashes still remembered.
    pub erased: usize,
    /// Indexed votes.
    pub votes: usize,
    /// Votes waiting for their object.
    pub orphan_votes: usize,
    /// Votes known to be invalid.
    pub invalid_votes: usize,
    /// Masternodes with a rate record.
    pub rate_records: usize,
}

impl fmt::Display for GovernanceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Governance Objects: {} (Proposals: {}, Triggers: {}, Watchdogs: {}, Other: {}; Erased: {}), Votes: {}",
            self.objects,
            self.proposals,
            self.triggers,
            self.watchdogs,
            self.other,
            self.erased,
            self.votes
        )
    }
}

/// Thread-safe governance object and vote manager.
pub struct GovernanceManager {
    config: GovernanceConfig,
    collaborators: Collaborators,
    state: Mutex<GovernanceState>,
}

impl fmt::Debug for GovernanceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GovernanceManager {
    /// Creates a manager with empty state.
    #[must_use]
    pub fn new(config: GovernanceConfig, collaborators: Collaborators) -> Self {
        let state = Mutex::new(GovernanceState::new(&config));
        Self {
            config,
            collaborators,
            state,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut GovernanceState, &Context<'_>, &mut Outbox) -> R) -> R {
        let ctx = Context {
            config: &self.config,
            validator: self.collaborators.validator.as_ref(),
            sync_status: self.collaborators.sync_status.as_ref(),
            registry: self.collaborators.registry.as_ref(),
            now: self.collaborators.clock.now(),
        };
        let mut outbox = Outbox::default();
        let result = {
            let mut state = self.state.lock();
            f(&mut *state, &ctx, &mut outbox)
        };
        outbox.dispatch(self.collaborators.network.as_ref());
        result
    }

    // ==================== Objects ====================

    /// Handles an object received from a peer.
    ///
    /// Ignored until the masternode list is synced, from outdated peers, and
    /// when the object was never requested.
    pub fn process_object_message(&self, peer: &PeerInfo, object: GovernanceObject) -> SubmitOutcome {
        if !self.collaborators.sync_status.is_masternode_list_synced() {
            return SubmitOutcome::NotSynced;
        }
        if peer.protocol_version < self.config.sync.min_peer_proto_version {
            debug!(peer = %peer.id, version = peer.protocol_version, "object from outdated peer");
            return SubmitOutcome::Dropped {
                reason: format!("peer protocol version {} too old", peer.protocol_version),
            };
        }
        self.with_state(|state, ctx, outbox| {
            let hash = object.hash();
            if !state.sync.accept_unsolicited(&hash, InventoryKind::Object) {
                debug!(peer = %peer.id, hash = %hash, "unrequested object");
                return SubmitOutcome::Unrequested;
            }
            state.submit(object, Some(peer.id), ctx, outbox)
        })
    }

    /// Submits an object, either created locally (`source = None`) or already
    /// vetted by the caller.
    pub fn submit(&self, object: GovernanceObject, source: Option<&PeerInfo>) -> SubmitOutcome {
        let source = source.map(|peer| peer.id);
        self.with_state(|state, ctx, outbox| state.submit(object, source, ctx, outbox))
    }

    /// A copy of an active object.
    #[must_use]
    pub fn find(&self, hash: &Hash256) -> Option<GovernanceObject> {
        self.state.lock().store.get(hash).cloned()
    }

    /// Marks an active object for deletion. Returns false if it is not active.
    pub fn mark_cached_delete(&self, hash: &Hash256) -> bool {
        self.with_state(|state, ctx, _| match state.store.get_mut(hash) {
            Some(object) => {
                object.mark_cached_delete(ctx.now);
                info!(hash = %hash, "object marked for deletion");
                true
            }
            None => false,
        })
    }

    /// The current watchdog.
    #[must_use]
    pub fn current_watchdog(&self) -> Option<Hash256> {
        self.state.lock().watchdogs.current()
    }

    // ==================== Votes ====================

    /// Handles a vote received from a peer.
    ///
    /// Permanent errors penalize the peer, but only once the node is fully
    /// synced.
    pub fn process_vote_message(
        &self,
        peer: &PeerInfo,
        vote: GovernanceVote,
    ) -> GovernanceResult<VoteDisposition> {
        if !self.collaborators.sync_status.is_masternode_list_synced() {
            return Ok(VoteDisposition::NotSynced);
        }
        if peer.protocol_version < self.config.sync.min_peer_proto_version {
            return Err(GovernanceError::warning(format!(
                "peer protocol version {} too old",
                peer.protocol_version
            )));
        }
        self.with_state(|state, ctx, outbox| {
            let hash = vote.hash();
            if !state.sync.accept_unsolicited(&hash, InventoryKind::Vote) {
                debug!(peer = %peer.id, hash = %hash, "unrequested vote");
                return Ok(VoteDisposition::Unrequested);
            }
            let result = state.votes.process(&mut state.store, vote, Some(peer.id), ctx, outbox);
            if let Err(err) = &result {
                if err.is_permanent() && ctx.synced() {
                    outbox.penalize(peer.id, err.penalty());
                }
            }
            result
        })
    }

    /// Processes a locally created vote.
    pub fn process_vote(&self, vote: GovernanceVote) -> GovernanceResult<VoteDisposition> {
        self.with_state(|state, ctx, outbox| state.votes.process(&mut state.store, vote, None, ctx, outbox))
    }

    // ==================== Sync gating ====================

    /// Decides whether an advertised item should be fetched.
    pub fn confirm_inventory(&self, item: &InventoryItem) -> bool {
        let winners_synced = self.collaborators.sync_status.is_winners_list_synced();
        let mut state = self.state.lock();
        let state = &mut *state;
        state
            .sync
            .confirm_inventory(item, &state.store, &state.votes, winners_synced)
    }

    /// Consumes a pending object request.
    pub fn accept_object_message(&self, hash: &Hash256) -> bool {
        self.state.lock().sync.accept_unsolicited(hash, InventoryKind::Object)
    }

    /// Consumes a pending vote request.
    pub fn accept_vote_message(&self, hash: &Hash256) -> bool {
        self.state.lock().sync.accept_unsolicited(hash, InventoryKind::Vote)
    }

    /// Asks a peer for an object's votes, or for every object with the zero hash.
    pub fn request_governance_object(&self, peer: &PeerInfo, hash: Hash256, use_filter: bool) {
        self.with_state(|state, ctx, outbox| {
            let request = state
                .sync
                .build_sync_request(peer, hash, use_filter, &state.store, &ctx.config.sync);
            outbox.send_sync_request(peer.id, request);
        });
    }

    /// Answers a peer's sync request by advertising the matching inventory.
    ///
    /// Returns the advertised items.
    pub fn serve_sync_request(&self, peer: &PeerInfo, request: &SyncRequest) -> Vec<InventoryItem> {
        self.with_state(|state, ctx, outbox| {
            let items = state
                .sync
                .serve_sync_request(peer, request, &state.store, ctx.synced(), &ctx.config.sync);
            for item in &items {
                outbox.push_inventory(peer.id, *item);
            }
            items
        })
    }

    /// Requests the parents of orphan votes from every non-masternode peer.
    ///
    /// Returns the number of requests sent.
    pub fn request_orphan_objects(&self) -> usize {
        let peers = self.collaborators.network.connected_peers();
        self.with_state(|state, ctx, outbox| {
            let parents = state.votes.orphan_parents();
            let requests = state
                .sync
                .orphan_object_requests(&parents, &peers, &state.store, &ctx.config.sync);
            let sent = requests.len();
            for (peer, request) in requests {
                outbox.send_sync_request(peer, request);
            }
            sent
        })
    }

    // ==================== Rate limiting ====================

    /// Runs the submission rate check for an object without admitting it.
    pub fn masternode_rate_check(&self, object: &GovernanceObject, update_fail_status: bool, force: bool) -> RateCheck {
        self.with_state(|state, ctx, _| {
            state.rates.check(
                object,
                update_fail_status,
                force,
                RateCheckMode::Normal,
                ctx.synced(),
                ctx.now,
            )
        })
    }

    // ==================== Chain and maintenance ====================

    /// Records a new chain tip and retries postponed objects.
    pub fn updated_block_tip(&self, height: u64) {
        self.with_state(|state, ctx, outbox| {
            state.cached_height = height;
            debug!(height, "governance block tip updated");
            state.check_postponed_objects(ctx, outbox);
        });
    }

    /// Retries postponed objects. Returns the number activated.
    pub fn check_postponed_objects(&self) -> usize {
        self.with_state(|state, ctx, outbox| state.check_postponed_objects(ctx, outbox))
    }

    /// Retries objects waiting for their masternode. Returns the number activated.
    pub fn check_masternode_orphan_objects(&self) -> usize {
        self.with_state(|state, ctx, outbox| state.check_masternode_orphan_objects(ctx, outbox))
    }

    /// Drops expired orphan votes. Returns how many were dropped.
    pub fn clean_orphan_objects(&self) -> usize {
        self.with_state(|state, ctx, _| state.votes.clean_orphan_votes(ctx.now))
    }

    /// Runs one garbage collection pass.
    pub fn update_caches_and_clean(&self) -> SweepReport {
        self.with_state(|state, ctx, _| state.update_caches_and_clean(ctx))
    }

    /// Periodic maintenance. Does nothing until the node is synced.
    pub fn do_maintenance(&self) -> Option<SweepReport> {
        if !self.collaborators.sync_status.is_synced() {
            return None;
        }
        self.clean_orphan_objects();
        self.request_orphan_objects();
        self.check_masternode_orphan_objects();
        Some(self.update_caches_and_clean())
    }

    /// Counts of everything held.
    #[must_use]
    pub fn stats(&self) -> GovernanceStats {
        let state = self.state.lock();
        let (proposals, triggers, watchdogs, other) = state.store.counts_by_kind();
        GovernanceStats {
            objects: state.store.active_len(),
            proposals,
            triggers,
            watchdogs,
            other,
            postponed: state.store.postponed_len(),
            quarantined: state.store.quarantined_len(),
            erased: state.store.erased_len(),
            votes: state.votes.indexed_len(),
            orphan_votes: state.votes.orphan_len(),
            invalid_votes: state.votes.invalid_len(),
            rate_records: state.rates.len(),
        }
    }

    // ==================== Persistence ====================

    /// Serializes the persistent part of the state.
    pub fn save_snapshot(&self) -> SyncResult<Vec<u8>> {
        let snapshot = self.state.lock().snapshot();
        snapshot::encode(&snapshot)
    }

    /// Replaces the state with a snapshot. A snapshot of another version
    /// clears everything instead.
    pub fn load_snapshot(&self, bytes: &[u8]) -> SyncResult<LoadOutcome> {
        self.state.lock().load(bytes)
    }

    /// Drops all state.
    pub fn clear(&self) {
        self.state.lock().clear();
        info!("governance state cleared");
    }
}
