//! Governance votes and the per-object vote file.

use crate::hash::{Hash256, Outpoint};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What a vote is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteSignal {
    /// Fund the proposal.
    Funding,
    /// The object is valid.
    Valid,
    /// The object should be deleted.
    Delete,
    /// The object is endorsed.
    Endorsed,
}

impl VoteSignal {
    const fn code(self) -> u8 {
        match self {
            Self::Funding => 1,
            Self::Valid => 2,
            Self::Delete => 3,
            Self::Endorsed => 4,
        }
    }
}

/// The position taken by a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOutcome {
    /// In favour.
    Yes,
    /// Against.
    No,
    /// Neither.
    Abstain,
}

impl VoteOutcome {
    const fn code(self) -> u8 {
        match self {
            Self::Yes => 1,
            Self::No => 2,
            Self::Abstain => 3,
        }
    }
}

/// A masternode's vote on a governance object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceVote {
    parent_hash: Hash256,
    masternode: Outpoint,
    signal: VoteSignal,
    outcome: VoteOutcome,
    timestamp: i64,
    signature: Vec<u8>,
}

impl GovernanceVote {
    /// Creates an unsigned vote.
    #[must_use]
    pub const fn new(
        parent_hash: Hash256,
        masternode: Outpoint,
        signal: VoteSignal,
        outcome: VoteOutcome,
        timestamp: i64,
    ) -> Self {
        Self {
            parent_hash,
            masternode,
            signal,
            outcome,
            timestamp,
            signature: Vec::new(),
        }
    }

    /// Attaches a signature produced by the voting masternode.
    #[must_use]
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Content hash of the vote. The signature is not covered.
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(32 + 36 + 2 + 8);
        buf.extend_from_slice(self.parent_hash.as_bytes());
        self.masternode.write_to(&mut buf);
        buf.push(self.signal.code());
        buf.push(self.outcome.code());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        Hash256::digest(&buf)
    }

    /// Hash of the object this vote applies to.
    #[must_use]
    pub const fn parent_hash(&self) -> Hash256 {
        self.parent_hash
    }

    /// The voting masternode.
    #[must_use]
    pub const fn masternode(&self) -> Outpoint {
        self.masternode
    }

    /// The vote signal.
    #[must_use]
    pub const fn signal(&self) -> VoteSignal {
        self.signal
    }

    /// The vote outcome.
    #[must_use]
    pub const fn outcome(&self) -> VoteOutcome {
        self.outcome
    }

    /// Creation time in unix seconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Latest vote a masternode cast for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteInstance {
    /// Outcome of that vote.
    pub outcome: VoteOutcome,
    /// Timestamp of that vote.
    pub timestamp: i64,
}

/// Every vote known for one object, plus the current vote per masternode and signal.
///
/// Serialized as the plain list of votes; the indexes are rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<GovernanceVote>", into = "Vec<GovernanceVote>")]
pub struct VoteFile {
    votes: Vec<GovernanceVote>,
    hashes: HashSet<Hash256>,
    current: HashMap<(Outpoint, VoteSignal), VoteInstance>,
}

impl VoteFile {
    /// Creates an empty vote file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored votes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// Returns true when no votes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Returns true if a vote with this hash is stored.
    #[must_use]
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.hashes.contains(hash)
    }

    /// All stored votes in arrival order.
    #[must_use]
    pub fn votes(&self) -> &[GovernanceVote] {
        &self.votes
    }

    /// The masternode's current vote on a signal.
    #[must_use]
    pub fn current_vote(&self, masternode: &Outpoint, signal: VoteSignal) -> Option<VoteInstance> {
        self.current.get(&(*masternode, signal)).copied()
    }

    /// Stores a vote. Returns false if it was already present.
    pub fn add(&mut self, vote: GovernanceVote) -> bool {
        if !self.hashes.insert(vote.hash()) {
            return false;
        }
        let key = (vote.masternode(), vote.signal());
        let newer = self
            .current
            .get(&key)
            .is_none_or(|existing| existing.timestamp < vote.timestamp());
        if newer {
            self.current.insert(
                key,
                VoteInstance {
                    outcome: vote.outcome(),
                    timestamp: vote.timestamp(),
                },
            );
        }
        self.votes.push(vote);
        true
    }

    /// Removes every vote cast by a masternode matching `predicate`.
    ///
    /// Returns the number of votes removed.
    pub fn remove_masternodes(&mut self, predicate: impl Fn(&Outpoint) -> bool) -> usize {
        let before = self.votes.len();
        let hashes = &mut self.hashes;
        self.votes.retain(|vote| {
            if predicate(&vote.masternode()) {
                hashes.remove(&vote.hash());
                false
            } else {
                true
            }
        });
        self.current.retain(|(masternode, _), _| !predicate(masternode));
        before - self.votes.len()
    }

    /// Counts current (yes, no, abstain) votes on a signal.
    #[must_use]
    pub fn tally(&self, signal: VoteSignal) -> (u32, u32, u32) {
        self.current
            .iter()
            .filter(|((_, s), _)| *s == signal)
            .fold((0, 0, 0), |(yes, no, abstain), (_, instance)| match instance.outcome {
                VoteOutcome::Yes => (yes + 1, no, abstain),
                VoteOutcome::No => (yes, no + 1, abstain),
                VoteOutcome::Abstain => (yes, no, abstain + 1),
            })
    }

    /// Yes minus no on a signal.
    #[must_use]
    pub fn absolute_yes_count(&self, signal: VoteSignal) -> i64 {
        let (yes, no, _) = self.tally(signal);
        i64::from(yes) - i64::from(no)
    }

    /// Drops every vote.
    pub fn clear(&mut self) {
        self.votes.clear();
        self.hashes.clear();
        self.current.clear();
    }
}

impl From<Vec<GovernanceVote>> for VoteFile {
    fn from(votes: Vec<GovernanceVote>) -> Self {
        let mut file = Self::new();
        for vote in votes {
            file.add(vote);
        }
        file
    }
}

impl From<VoteFile> for Vec<GovernanceVote> {
    fn from(file: VoteFile) -> Self {
        file.votes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masternode(n: u8) -> Outpoint {
        Outpoint::new(Hash256::from_bytes([n; 32]), 0)
    }

    fn vote(mn: u8, signal: VoteSignal, outcome: VoteOutcome, ts: i64) -> GovernanceVote {
        GovernanceVote::new(Hash256::digest(b"parent"), masternode(mn), signal, outcome, ts)
    }

    #[test]
    fn hash_ignores_signature() {
        let v = vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100);
        let signed = v.clone().with_signature(vec![1, 2, 3]);
        assert_eq!(v.hash(), signed.hash());
        assert_eq!(signed.signature(), &[1, 2, 3]);
    }

    #[test]
    fn hash_covers_outcome_and_time() {
        let a = vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100);
        let b = vote(1, VoteSignal::Funding, VoteOutcome::No, 100);
        let c = vote(1, VoteSignal::Funding, VoteOutcome::Yes, 101);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut file = VoteFile::new();
        let v = vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100);
        assert!(file.add(v.clone()));
        assert!(!file.add(v.clone()));
        assert_eq!(file.len(), 1);
        assert!(file.contains(&v.hash()));
    }

    #[test]
    fn current_vote_tracks_latest() {
        let mut file = VoteFile::new();
        file.add(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100));
        file.add(vote(1, VoteSignal::Funding, VoteOutcome::No, 5000));
        let current = file.current_vote(&masternode(1), VoteSignal::Funding);
        assert_eq!(current.map(|c| c.outcome), Some(VoteOutcome::No));
        assert_eq!(file.tally(VoteSignal::Funding), (0, 1, 0));
    }

    #[test]
    fn tally_counts_one_per_masternode() {
        let mut file = VoteFile::new();
        file.add(vote(1, VoteSignal::Delete, VoteOutcome::Yes, 100));
        file.add(vote(2, VoteSignal::Delete, VoteOutcome::Yes, 100));
        file.add(vote(3, VoteSignal::Delete, VoteOutcome::No, 100));
        file.add(vote(4, VoteSignal::Funding, VoteOutcome::Yes, 100));
        assert_eq!(file.tally(VoteSignal::Delete), (2, 1, 0));
        assert_eq!(file.absolute_yes_count(VoteSignal::Delete), 1);
    }

    #[test]
    fn remove_masternodes_drops_votes_and_instances() {
        let mut file = VoteFile::new();
        file.add(vote(1, VoteSignal::Funding, VoteOutcome::Yes, 100));
        file.add(vote(2, VoteSignal::Funding, VoteOutcome::Yes, 100));
        let removed = file.remove_masternodes(|mn| *mn == masternode(1));
        assert_eq!(removed, 1);
        assert_eq!(file.len(), 1);
        assert!(file.current_vote(&masternode(1), VoteSignal::Funding).is_none());
        assert_eq!(file.tally(VoteSignal::Funding), (1, 0, 0));
    }

    #[test]
    fn serializes_as_vote_list_and_rebuilds_indexes() {
        let mut file = VoteFile::new();
        file.add(vote(1, VoteSignal::Valid, VoteOutcome::No, 100));
        file.add(vote(2, VoteSignal::Valid, VoteOutcome::No, 100));
        let json = serde_json::to_string(&file).unwrap();
        let restored: VoteFile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.tally(VoteSignal::Valid), (0, 2, 0));
    }
}
