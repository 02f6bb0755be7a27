//! Governance objects: proposals, triggers and watchdogs.

use crate::error::{GovernanceError, GovernanceResult};
use crate::hash::{Hash256, Outpoint};
use crate::vote::{GovernanceVote, VoteFile, VoteSignal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload carried by trigger objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    /// Block height at which the superblock payment fires.
    pub event_block_height: u64,
}

/// The kind of governance object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A budget proposal.
    Proposal,
    /// A superblock payment trigger.
    Trigger(TriggerPayload),
    /// A liveness heartbeat from a masternode.
    Watchdog,
    /// Unknown type code. Never valid.
    Other(u32),
}

impl ObjectKind {
    /// Returns true for kinds subject to per-masternode submission rate limits.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Trigger(_) | Self::Watchdog)
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Proposal => buf.push(1),
            Self::Trigger(payload) => {
                buf.push(2);
                buf.extend_from_slice(&payload.event_block_height.to_le_bytes());
            }
            Self::Watchdog => buf.push(3),
            Self::Other(code) => {
                buf.push(4);
                buf.extend_from_slice(&code.to_le_bytes());
            }
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposal => write!(f, "proposal"),
            Self::Trigger(payload) => write!(f, "trigger@{}", payload.event_block_height),
            Self::Watchdog => write!(f, "watchdog"),
            Self::Other(code) => write!(f, "other({code})"),
        }
    }
}

/// Node-local bookkeeping for an object. Never sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Valid signal has not been voted down.
    pub cached_valid: bool,
    /// Funding threshold reached.
    pub cached_funding: bool,
    /// Marked for deletion, by vote or locally.
    pub cached_delete: bool,
    /// Endorsement threshold reached.
    pub cached_endorsed: bool,
    /// Marked expired.
    pub expired: bool,
    /// Vote tallies need recomputing.
    pub dirty_cache: bool,
    /// When the object was first marked for deletion or expiry. Zero if never.
    pub deletion_time: i64,
    /// Result of the last local validity check.
    pub local_valid: bool,
    /// Reason the last local validity check failed.
    pub local_validity_error: String,
}

impl Default for ObjectState {
    fn default() -> Self {
        Self {
            cached_valid: true,
            cached_funding: false,
            cached_delete: false,
            cached_endorsed: false,
            expired: false,
            dirty_cache: false,
            deletion_time: 0,
            local_valid: false,
            local_validity_error: String::new(),
        }
    }
}

/// A gossiped governance object and the votes it has collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceObject {
    parent_hash: Hash256,
    revision: u32,
    creation_time: i64,
    collateral_hash: Hash256,
    masternode: Outpoint,
    kind: ObjectKind,
    data: Vec<u8>,
    signature: Vec<u8>,
    #[serde(default)]
    state: ObjectState,
    #[serde(default)]
    votes: VoteFile,
}

impl GovernanceObject {
    /// Creates an unsigned object with fresh local state.
    #[must_use]
    pub fn new(
        parent_hash: Hash256,
        revision: u32,
        creation_time: i64,
        collateral_hash: Hash256,
        masternode: Outpoint,
        kind: ObjectKind,
        data: Vec<u8>,
    ) -> Self {
        Self {
            parent_hash,
            revision,
            creation_time,
            collateral_hash,
            masternode,
            kind,
            data,
            signature: Vec::new(),
            state: ObjectState::default(),
            votes: VoteFile::new(),
        }
    }

    /// Attaches the owning masternode's signature.
    #[must_use]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Content hash over the identity fields. Signature and local state are not covered.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(128 + self.data.len());
        buf.extend_from_slice(self.parent_hash.as_bytes());
        buf.extend_from_slice(&self.revision.to_le_bytes());
        buf.extend_from_slice(&self.creation_time.to_le_bytes());
        buf.extend_from_slice(self.collateral_hash.as_bytes());
        self.masternode.write_to(&mut buf);
        self.kind.write_to(&mut buf);
        buf.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.data);
        Hash256::digest(&buf)
    }

    /// Parent object hash, zero for root objects.
    #[must_use]
    pub const fn parent_hash(&self) -> Hash256 {
        self.parent_hash
    }

    /// Revision number.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Creation time in unix seconds.
    #[must_use]
    pub const fn creation_time(&self) -> i64 {
        self.creation_time
    }

    /// Hash of the fee transaction paying for the object.
    #[must_use]
    pub const fn collateral_hash(&self) -> Hash256 {
        self.collateral_hash
    }

    /// Outpoint of the owning masternode.
    #[must_use]
    pub const fn masternode(&self) -> Outpoint {
        self.masternode
    }

    /// Object kind.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns true for watchdog objects.
    #[must_use]
    pub const fn is_watchdog(&self) -> bool {
        matches!(self.kind, ObjectKind::Watchdog)
    }

    /// Returns true for trigger objects.
    #[must_use]
    pub const fn is_trigger(&self) -> bool {
        matches!(self.kind, ObjectKind::Trigger(_))
    }

    /// Opaque payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Local bookkeeping.
    #[must_use]
    pub const fn state(&self) -> &ObjectState {
        &self.state
    }

    /// Votes collected so far.
    #[must_use]
    pub const fn votes(&self) -> &VoteFile {
        &self.votes
    }

    /// Returns true once marked for deletion or expired.
    #[must_use]
    pub const fn is_marked_for_removal(&self) -> bool {
        self.state.cached_delete || self.state.expired
    }

    /// Checks the rules that need nothing but the object itself.
    pub fn validate_self(&self, max_data_size: usize) -> GovernanceResult<()> {
        if self.data.len() > max_data_size {
            return Err(GovernanceError::DataTooLarge {
                size: self.data.len(),
                max: max_data_size,
            });
        }
        match self.kind {
            ObjectKind::Other(code) => Err(GovernanceError::permanent(
                format!("invalid object type {code}"),
                0,
            )),
            ObjectKind::Proposal if self.data.is_empty() => {
                Err(GovernanceError::permanent("proposal has no data", 0))
            }
            _ => Ok(()),
        }
    }

    /// Records the outcome of a local validity check.
    pub fn set_local_validity(&mut self, valid: bool, error: impl Into<String>) {
        self.state.local_valid = valid;
        self.state.local_validity_error = error.into();
    }

    /// Marks the object for deletion. The first call stamps the deletion time.
    pub fn mark_cached_delete(&mut self, now: i64) {
        self.state.cached_delete = true;
        if self.state.deletion_time == 0 {
            self.state.deletion_time = now;
        }
    }

    /// Marks the object expired. The first mark stamps the deletion time.
    pub fn mark_expired(&mut self, now: i64) {
        self.state.expired = true;
        if self.state.deletion_time == 0 {
            self.state.deletion_time = now;
        }
    }

    /// Flags the vote tallies for recomputation.
    pub fn set_dirty(&mut self) {
        self.state.dirty_cache = true;
    }

    /// Applies a vote, enforcing one current vote per masternode and signal.
    ///
    /// A vote must be strictly newer than the masternode's previous vote on the
    /// same signal and at least `vote_update_min` seconds after it.
    pub fn apply_vote(&mut self, vote: GovernanceVote, vote_update_min: i64) -> GovernanceResult<()> {
        if self.votes.contains(&vote.hash()) {
            return Err(GovernanceError::warning("duplicate vote"));
        }
        if let Some(previous) = self.votes.current_vote(&vote.masternode(), vote.signal()) {
            if previous.timestamp >= vote.timestamp() {
                return Err(GovernanceError::warning(format!(
                    "obsolete vote from {}: {} <= {}",
                    vote.masternode().to_short_string(),
                    vote.timestamp(),
                    previous.timestamp
                )));
            }
            if vote.timestamp() - previous.timestamp < vote_update_min {
                return Err(GovernanceError::warning(format!(
                    "masternode {} voting too often",
                    vote.masternode().to_short_string()
                )));
            }
        }
        self.votes.add(vote);
        self.state.dirty_cache = true;
        Ok(())
    }

    /// Drops the votes of every masternode matching `is_unknown`.
    ///
    /// Returns the number of votes removed.
    pub fn clear_masternode_votes(&mut self, is_unknown: impl Fn(&Outpoint) -> bool) -> usize {
        let removed = self.votes.remove_masternodes(is_unknown);
        if removed > 0 {
            self.state.dirty_cache = true;
        }
        removed
    }

    /// Yes minus no on a signal.
    #[must_use]
    pub fn absolute_yes_count(&self, signal: VoteSignal) -> i64 {
        self.votes.absolute_yes_count(signal)
    }

    /// Recomputes the funding/delete/endorsed/valid flags from the vote tallies.
    ///
    /// Does nothing while no masternodes are enabled. A delete mark, once set,
    /// is never cleared here.
    pub fn update_sentinel_variables(&mut self, enabled_masternodes: usize, min_quorum: usize, now: i64) {
        if enabled_masternodes == 0 {
            return;
        }
        let abs_vote_req = min_quorum.max(enabled_masternodes / 10) as i64;
        let abs_delete_req = min_quorum.max(2 * enabled_masternodes / 3) as i64;

        self.state.cached_funding = self.absolute_yes_count(VoteSignal::Funding) >= abs_vote_req;
        if self.absolute_yes_count(VoteSignal::Delete) >= abs_delete_req {
            self.mark_cached_delete(now);
        }
        self.state.cached_endorsed = self.absolute_yes_count(VoteSignal::Endorsed) >= abs_vote_req;
        self.state.cached_valid = -self.absolute_yes_count(VoteSignal::Valid) < abs_vote_req;
        self.state.dirty_cache = false;
    }

    /// Drops all local state and votes. Applied to objects received from the wire.
    pub fn reset_local_state(&mut self) {
        self.state = ObjectState::default();
        self.votes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::VoteOutcome;
    use test_case::test_case;

    fn masternode(n: u8) -> Outpoint {
        Outpoint::new(Hash256::from_bytes([n; 32]), 1)
    }

    fn object(kind: ObjectKind, data: &[u8]) -> GovernanceObject {
        GovernanceObject::new(
            Hash256::ZERO,
            1,
            1_000,
            Hash256::digest(b"fee"),
            masternode(1),
            kind,
            data.to_vec(),
        )
    }

    fn vote_on(obj: &GovernanceObject, mn: u8, signal: VoteSignal, outcome: VoteOutcome, ts: i64) -> GovernanceVote {
        GovernanceVote::new(obj.hash(), masternode(mn), signal, outcome, ts)
    }

    // ========== Identity Tests ==========

    #[test]
    fn hash_is_stable_across_local_state_changes() {
        let mut obj = object(ObjectKind::Proposal, b"{}");
        let before = obj.hash();
        obj.mark_cached_delete(5);
        obj.set_dirty();
        let signed = obj.clone().with_signature(vec![7; 65]);
        assert_eq!(before, obj.hash());
        assert_eq!(before, signed.hash());
    }

    #[test]
    fn hash_depends_on_kind() {
        let trigger = object(ObjectKind::Trigger(TriggerPayload { event_block_height: 10 }), b"x");
        let later = object(ObjectKind::Trigger(TriggerPayload { event_block_height: 11 }), b"x");
        let proposal = object(ObjectKind::Proposal, b"x");
        assert_ne!(trigger.hash(), later.hash());
        assert_ne!(trigger.hash(), proposal.hash());
    }

    // ========== Self Validation Tests ==========

    #[test_case(ObjectKind::Proposal, b"data", true ; "proposal with data")]
    #[test_case(ObjectKind::Proposal, b"", false ; "empty proposal")]
    #[test_case(ObjectKind::Watchdog, b"", true ; "watchdog")]
    #[test_case(ObjectKind::Trigger(TriggerPayload { event_block_height: 1 }), b"", true ; "trigger")]
    #[test_case(ObjectKind::Other(9), b"data", false ; "unknown kind")]
    fn self_rules(kind: ObjectKind, data: &[u8], ok: bool) {
        assert_eq!(object(kind, data).validate_self(16_384).is_ok(), ok);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let obj = object(ObjectKind::Proposal, &[0u8; 100]);
        assert_eq!(
            obj.validate_self(64),
            Err(GovernanceError::DataTooLarge { size: 100, max: 64 })
        );
    }

    #[test]
    fn rate_limited_kinds() {
        assert!(ObjectKind::Watchdog.is_rate_limited());
        assert!(ObjectKind::Trigger(TriggerPayload { event_block_height: 0 }).is_rate_limited());
        assert!(!ObjectKind::Proposal.is_rate_limited());
        assert!(!ObjectKind::Other(0).is_rate_limited());
    }

    // ========== Deletion Marks Tests ==========

    #[test]
    fn first_mark_stamps_deletion_time() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.mark_expired(100);
        obj.mark_cached_delete(200);
        assert_eq!(obj.state().deletion_time, 100);
        assert!(obj.is_marked_for_removal());
    }

    // ========== Vote Rule Tests ==========

    #[test]
    fn apply_vote_records_and_dirties() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        let vote = vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 1_000);
        assert!(obj.apply_vote(vote, 3600).is_ok());
        assert_eq!(obj.votes().len(), 1);
        assert!(obj.state().dirty_cache);
    }

    #[test]
    fn duplicate_vote_is_warning() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        let vote = vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 1_000);
        obj.apply_vote(vote.clone(), 3600).unwrap();
        assert!(matches!(obj.apply_vote(vote, 3600), Err(GovernanceError::Warning(_))));
    }

    #[test]
    fn obsolete_vote_is_warning() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.apply_vote(vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 10_000), 3600).unwrap();
        let older = vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::No, 5_000);
        let err = obj.apply_vote(older, 3600).unwrap_err();
        assert!(err.to_string().contains("obsolete"));
    }

    #[test]
    fn frequent_vote_is_warning() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.apply_vote(vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 10_000), 3600).unwrap();
        let soon = vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::No, 10_100);
        let err = obj.apply_vote(soon, 3600).unwrap_err();
        assert!(err.to_string().contains("too often"));

        let later = vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::No, 13_600);
        assert!(obj.apply_vote(later, 3600).is_ok());
    }

    #[test]
    fn different_signals_are_independent() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.apply_vote(vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 10_000), 3600).unwrap();
        let other = vote_on(&obj, 2, VoteSignal::Delete, VoteOutcome::Yes, 10_000);
        assert!(obj.apply_vote(other, 3600).is_ok());
    }

    #[test]
    fn clear_masternode_votes_marks_dirty() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.apply_vote(vote_on(&obj, 2, VoteSignal::Funding, VoteOutcome::Yes, 1), 0).unwrap();
        obj.apply_vote(vote_on(&obj, 3, VoteSignal::Funding, VoteOutcome::Yes, 1), 0).unwrap();
        obj.update_sentinel_variables(10, 1, 0);
        assert!(!obj.state().dirty_cache);

        assert_eq!(obj.clear_masternode_votes(|mn| *mn == masternode(2)), 1);
        assert!(obj.state().dirty_cache);
        assert_eq!(obj.clear_masternode_votes(|mn| *mn == masternode(9)), 0);
    }

    // ========== Sentinel Variable Tests ==========

    fn cast(obj: &mut GovernanceObject, count: u8, signal: VoteSignal, outcome: VoteOutcome) {
        for mn in 0..count {
            let vote = vote_on(obj, mn + 10, signal, outcome, 1_000);
            obj.apply_vote(vote, 0).unwrap();
        }
    }

    #[test]
    fn funding_threshold_uses_quorum() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        cast(&mut obj, 9, VoteSignal::Funding, VoteOutcome::Yes);
        obj.update_sentinel_variables(50, 10, 0);
        assert!(!obj.state().cached_funding);

        cast_one(&mut obj, 200, VoteSignal::Funding, VoteOutcome::Yes);
        obj.update_sentinel_variables(50, 10, 0);
        assert!(obj.state().cached_funding);
        assert!(!obj.state().dirty_cache);
    }

    fn cast_one(obj: &mut GovernanceObject, mn: u8, signal: VoteSignal, outcome: VoteOutcome) {
        let vote = vote_on(obj, mn, signal, outcome, 1_000);
        obj.apply_vote(vote, 0).unwrap();
    }

    #[test]
    fn delete_votes_mark_cached_delete() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        // 2/3 of 30 enabled = 20
        cast(&mut obj, 20, VoteSignal::Delete, VoteOutcome::Yes);
        obj.update_sentinel_variables(30, 10, 777);
        assert!(obj.state().cached_delete);
        assert_eq!(obj.state().deletion_time, 777);
    }

    #[test]
    fn local_delete_mark_survives_recompute() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.mark_cached_delete(5);
        obj.update_sentinel_variables(100, 10, 50);
        assert!(obj.state().cached_delete);
        assert_eq!(obj.state().deletion_time, 5);
    }

    #[test]
    fn no_votes_on_valid_invalidate() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        cast(&mut obj, 10, VoteSignal::Valid, VoteOutcome::No);
        obj.update_sentinel_variables(20, 10, 0);
        assert!(!obj.state().cached_valid);
    }

    #[test]
    fn no_enabled_masternodes_skips_recompute() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        obj.set_dirty();
        obj.update_sentinel_variables(0, 10, 0);
        assert!(obj.state().dirty_cache);
    }

    #[test]
    fn reset_local_state_drops_votes() {
        let mut obj = object(ObjectKind::Proposal, b"x");
        cast(&mut obj, 3, VoteSignal::Funding, VoteOutcome::Yes);
        obj.mark_expired(9);
        obj.reset_local_state();
        assert!(obj.votes().is_empty());
        assert_eq!(obj.state(), &ObjectState::default());
    }
}
