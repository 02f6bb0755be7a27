//! The lock-protected engine state and the per-call context.

use mngov_core::{GovernanceObject, GovernanceVote, PeerId};

use crate::collaborators::{MasternodeRegistry, MasternodeValidator, PeerNetwork, SyncStatus};
use crate::config::GovernanceConfig;
use crate::message::{InventoryItem, SyncRequest};
use crate::rate_limit::RateLimiter;
use crate::store::ObjectStore;
use crate::sync::SyncCoordinator;
use crate::votes::VoteResolver;
use crate::watchdog::WatchdogElection;

/// Everything guarded by the governance lock.
#[derive(Debug)]
pub(crate) struct GovernanceState {
    pub(crate) store: ObjectStore,
    pub(crate) rates: RateLimiter,
    pub(crate) watchdogs: WatchdogElection,
    pub(crate) votes: VoteResolver,
    pub(crate) sync: SyncCoordinator,
    pub(crate) cached_height: u64,
}

impl GovernanceState {
    pub(crate) fn new(config: &GovernanceConfig) -> Self {
        Self {
            store: ObjectStore::new(),
            rates: RateLimiter::new(config),
            watchdogs: WatchdogElection::new(config.timing.watchdog_expiration_time),
            votes: VoteResolver::new(config.limits.max_cache_size),
            sync: SyncCoordinator::new(),
            cached_height: 0,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.store.clear();
        self.rates.clear();
        self.watchdogs.clear();
        self.votes.clear();
        self.sync.clear();
    }
}

/// Read-only inputs for one locked operation. `now` is sampled once per call.
pub(crate) struct Context<'a> {
    pub(crate) config: &'a GovernanceConfig,
    pub(crate) validator: &'a dyn MasternodeValidator,
    pub(crate) sync_status: &'a dyn SyncStatus,
    pub(crate) registry: &'a dyn MasternodeRegistry,
    pub(crate) now: i64,
}

impl Context<'_> {
    pub(crate) fn synced(&self) -> bool {
        self.sync_status.is_synced()
    }
}

/// A network side effect decided under the lock.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    RelayObject(Box<GovernanceObject>),
    RelayVote(GovernanceVote),
    AskFor { peer: PeerId, item: InventoryItem },
    PushInventory { peer: PeerId, item: InventoryItem },
    SendSyncRequest { peer: PeerId, request: SyncRequest },
    Penalize { peer: PeerId, score: u32 },
}

/// Side effects queued until the lock is released.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    actions: Vec<Action>,
}

impl Outbox {
    pub(crate) fn relay_object(&mut self, object: &GovernanceObject) {
        self.actions.push(Action::RelayObject(Box::new(object.clone())));
    }

    pub(crate) fn relay_vote(&mut self, vote: GovernanceVote) {
        self.actions.push(Action::RelayVote(vote));
    }

    pub(crate) fn ask_for(&mut self, peer: PeerId, item: InventoryItem) {
        self.actions.push(Action::AskFor { peer, item });
    }

    pub(crate) fn push_inventory(&mut self, peer: PeerId, item: InventoryItem) {
        self.actions.push(Action::PushInventory { peer, item });
    }

    pub(crate) fn send_sync_request(&mut self, peer: PeerId, request: SyncRequest) {
        self.actions.push(Action::SendSyncRequest { peer, request });
    }

    pub(crate) fn penalize(&mut self, peer: PeerId, score: u32) {
        self.actions.push(Action::Penalize { peer, score });
    }

    /// Hands every queued action to the network, in order.
    pub(crate) fn dispatch(self, network: &dyn PeerNetwork) {
        for action in self.actions {
            match action {
                Action::RelayObject(object) => network.relay_object(&object),
                Action::RelayVote(vote) => network.relay_vote(&vote),
                Action::AskFor { peer, item } => network.ask_for(&peer, item),
                Action::PushInventory { peer, item } => network.push_inventory(&peer, item),
                Action::SendSyncRequest { peer, request } => network.send_sync_request(&peer, request),
                Action::Penalize { peer, score } => network.penalize(&peer, score),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn actions(&self) -> &[Action] {
        &self.actions
    }
}
