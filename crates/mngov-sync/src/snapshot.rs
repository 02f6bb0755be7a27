//! Versioned persistence of the governance state.
//!
//! Layout: a varint length-delimited version string followed by a JSON body.
//! A snapshot written under another version is rejected as a whole.

use mngov_core::{GovernanceObject, GovernanceVote, Hash256, Outpoint};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::rate_limit::LastObjectRecord;
use crate::state::GovernanceState;
use crate::votes::OrphanVote;
use crate::watchdog::WatchdogRecord;

/// Version tag written at the start of every snapshot.
pub const SNAPSHOT_VERSION: &str = "CGovernanceManager-Version-12";

/// What a snapshot load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// State replaced by the snapshot.
    Loaded {
        /// Number of active objects restored.
        objects: usize,
    },
    /// The snapshot carried another version; all state was cleared.
    VersionMismatch {
        /// Version found in the snapshot.
        found: String,
    },
}

/// Everything that survives a restart.
///
/// Postponed and quarantined objects are re-fetched from peers instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SnapshotState {
    objects: Vec<GovernanceObject>,
    erased: Vec<(Hash256, i64)>,
    watchdogs: WatchdogRecord,
    rate_records: Vec<(Outpoint, LastObjectRecord)>,
    invalid_votes: Vec<(Hash256, GovernanceVote)>,
    orphan_votes: Vec<(Hash256, OrphanVote)>,
}

pub(crate) enum Decoded {
    State(SnapshotState),
    VersionMismatch(String),
}

/// Encodes a snapshot body under [`SNAPSHOT_VERSION`].
pub(crate) fn encode(state: &SnapshotState) -> SyncResult<Vec<u8>> {
    let body = serde_json::to_vec(state)?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_VERSION.len() + body.len() + 2);
    prost::encode_length_delimiter(SNAPSHOT_VERSION.len(), &mut bytes)
        .map_err(|e| SyncError::Snapshot(e.to_string()))?;
    bytes.extend_from_slice(SNAPSHOT_VERSION.as_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> SyncResult<Decoded> {
    let mut cursor = bytes;
    let version_len = prost::decode_length_delimiter(&mut cursor)?;
    if version_len > cursor.len() {
        return Err(SyncError::Snapshot(format!(
            "version tag of {version_len} bytes exceeds snapshot"
        )));
    }
    let (version, body) = cursor.split_at(version_len);
    if version != SNAPSHOT_VERSION.as_bytes() {
        return Ok(Decoded::VersionMismatch(String::from_utf8_lossy(version).into_owned()));
    }
    Ok(Decoded::State(serde_json::from_slice(body)?))
}

impl GovernanceState {
    pub(crate) fn snapshot(&self) -> SnapshotState {
        SnapshotState {
            objects: self.store.active().map(|(_, object)| object.clone()).collect(),
            erased: self.store.erased_entries(),
            watchdogs: self.watchdogs.to_record(),
            rate_records: self
                .rates
                .records()
                .map(|(outpoint, record)| (*outpoint, record.clone()))
                .collect(),
            invalid_votes: self.votes.invalid_entries(),
            orphan_votes: self.votes.orphan_entries(),
        }
    }

    /// Replaces the state with a decoded snapshot, or clears it on a version mismatch.
    pub(crate) fn load(&mut self, bytes: &[u8]) -> SyncResult<LoadOutcome> {
        match decode(bytes)? {
            Decoded::VersionMismatch(found) => {
                warn!(found = %found, expected = SNAPSHOT_VERSION, "snapshot version mismatch, clearing state");
                self.clear();
                Ok(LoadOutcome::VersionMismatch { found })
            }
            Decoded::State(snapshot) => {
                self.clear();
                self.store.restore(snapshot.objects, snapshot.erased);
                self.rates.restore(snapshot.rate_records);
                self.watchdogs.restore(snapshot.watchdogs);
                self.votes
                    .restore(snapshot.invalid_votes, snapshot.orphan_votes, self.store.active());
                let objects = self.store.active_len();
                info!(objects, erased = self.store.erased_len(), "governance snapshot loaded");
                Ok(LoadOutcome::Loaded { objects })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Outbox;
    use crate::state::fixture::Fixture;
    use mngov_core::{ObjectKind, VoteOutcome, VoteSignal};

    const NOW: i64 = 1_700_000_000;

    fn masternode(n: u8) -> Outpoint {
        Outpoint::new(Hash256::from_bytes([n; 32]), 0)
    }

    fn populated(fx: &Fixture) -> (GovernanceState, Hash256, Hash256) {
        let mut state = GovernanceState::new(&fx.config);
        let object = GovernanceObject::new(
            Hash256::ZERO,
            1,
            NOW,
            Hash256::digest(b"fee"),
            masternode(1),
            ObjectKind::Watchdog,
            b"wd".to_vec(),
        );
        let hash = object.hash();
        state.submit(object, None, &fx.ctx(NOW), &mut Outbox::default());
        let vote = GovernanceVote::new(hash, masternode(2), VoteSignal::Funding, VoteOutcome::Yes, NOW);
        let vote_hash = vote.hash();
        state
            .votes
            .process(&mut state.store, vote, None, &fx.ctx(NOW), &mut Outbox::default())
            .unwrap();
        state.store.record_erased(Hash256::digest(b"gone"), NOW + 50);
        (state, hash, vote_hash)
    }

    #[test]
    fn test_snapshot_round_trip() {
        let fx = Fixture::new();
        let (state, hash, vote_hash) = populated(&fx);
        let bytes = encode(&state.snapshot()).unwrap();

        let mut restored = GovernanceState::new(&fx.config);
        let outcome = restored.load(&bytes).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { objects: 1 });
        assert!(restored.store.is_active(&hash));
        assert_eq!(restored.store.get(&hash).unwrap().votes().len(), 1);
        assert_eq!(restored.votes.parent_of(&vote_hash), Some(hash));
        assert_eq!(restored.watchdogs.current(), Some(hash));
        assert_eq!(restored.watchdogs.len(), 1);
        assert_eq!(restored.store.erased_deadline(&Hash256::digest(b"gone")), Some(NOW + 50));
        assert!(restored.rates.record(&masternode(1)).is_some());
    }

    #[test]
    fn test_version_mismatch_clears_state() {
        let fx = Fixture::new();
        let (mut state, hash, _) = populated(&fx);

        let mut bytes = Vec::new();
        prost::encode_length_delimiter(27, &mut bytes).unwrap();
        bytes.extend_from_slice(b"CGovernanceManager-Version-");
        bytes.extend_from_slice(b"{}");
        let outcome = state.load(&bytes).unwrap();
        assert!(matches!(outcome, LoadOutcome::VersionMismatch { .. }));
        assert!(!state.store.contains(&hash));
        assert_eq!(state.watchdogs.current(), None);
        assert!(state.rates.is_empty());
    }

    #[test]
    fn test_other_version_reported() {
        let fx = Fixture::new();
        let mut state = GovernanceState::new(&fx.config);
        let mut bytes = Vec::new();
        prost::encode_length_delimiter(29, &mut bytes).unwrap();
        bytes.extend_from_slice(b"CGovernanceManager-Version-11");
        assert_eq!(
            state.load(&bytes).unwrap(),
            LoadOutcome::VersionMismatch {
                found: "CGovernanceManager-Version-11".into()
            }
        );
    }

    #[test]
    fn test_truncated_snapshot_is_error() {
        let fx = Fixture::new();
        let mut state = GovernanceState::new(&fx.config);
        let mut bytes = Vec::new();
        prost::encode_length_delimiter(100, &mut bytes).unwrap();
        bytes.extend_from_slice(b"short");
        assert!(matches!(state.load(&bytes), Err(SyncError::Snapshot(_))));
    }

    #[test]
    fn test_corrupt_body_keeps_state() {
        let fx = Fixture::new();
        let (mut state, hash, _) = populated(&fx);
        let mut bytes = encode(&SnapshotState::default()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(state.load(&bytes).is_err());
        assert!(state.store.is_active(&hash));
    }
}
