//! Shared setup for governance scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use mngov_core::{GovernanceObject, Hash256, ObjectKind, Outpoint, PeerId, TriggerPayload};
use mngov_sync::testing::{ManualClock, MockRegistry, MockSyncStatus, MockValidator, RecordingNetwork};
use mngov_sync::{Collaborators, GovernanceConfig, GovernanceManager, PeerInfo};

/// Wall clock at the start of every scenario.
pub const T0: i64 = 1_700_000_000;

/// Protocol version spoken by well-behaved peers.
pub const PROTOCOL_VERSION: u32 = 70_208;

/// A manager wired to recording collaborators.
pub struct Node {
    pub manager: Arc<GovernanceManager>,
    pub validator: Arc<MockValidator>,
    pub sync_status: Arc<MockSyncStatus>,
    pub registry: Arc<MockRegistry>,
    pub network: Arc<RecordingNetwork>,
    pub clock: Arc<ManualClock>,
}

impl Node {
    pub fn new() -> Self {
        Self::with_config(GovernanceConfig::default())
    }

    pub fn with_config(config: GovernanceConfig) -> Self {
        Self::build(config, MockRegistry::default())
    }

    pub fn build(config: GovernanceConfig, registry: MockRegistry) -> Self {
        let validator = Arc::new(MockValidator::new());
        let sync_status = Arc::new(MockSyncStatus::new());
        let registry = Arc::new(registry);
        let network = Arc::new(RecordingNetwork::new());
        let clock = Arc::new(ManualClock::new(T0));
        let collaborators = Collaborators {
            validator: validator.clone(),
            sync_status: sync_status.clone(),
            registry: registry.clone(),
            network: network.clone(),
            clock: clock.clone(),
        };
        Self {
            manager: Arc::new(GovernanceManager::new(config, collaborators)),
            validator,
            sync_status,
            registry,
            network,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        use mngov_sync::Clock;
        self.clock.now()
    }
}

pub fn peer(n: u8) -> PeerInfo {
    PeerInfo::new(peer_id(n), PROTOCOL_VERSION, false)
}

pub fn peer_id(n: u8) -> PeerId {
    PeerId::from_bytes([n; 32])
}

pub fn masternode(n: u8) -> Outpoint {
    Outpoint::new(Hash256::from_bytes([n; 32]), 0)
}

pub fn object(kind: ObjectKind, creation: i64, mn: u8) -> GovernanceObject {
    GovernanceObject::new(
        Hash256::ZERO,
        1,
        creation,
        Hash256::digest(&creation.to_le_bytes()),
        masternode(mn),
        kind,
        b"governance payload".to_vec(),
    )
}

pub fn proposal(creation: i64, mn: u8) -> GovernanceObject {
    object(ObjectKind::Proposal, creation, mn)
}

pub fn trigger(creation: i64, mn: u8) -> GovernanceObject {
    object(ObjectKind::Trigger(TriggerPayload { event_block_height: 100 }), creation, mn)
}

pub fn watchdog(creation: i64, mn: u8) -> GovernanceObject {
    object(ObjectKind::Watchdog, creation, mn)
}
