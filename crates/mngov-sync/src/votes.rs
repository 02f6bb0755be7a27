//! Vote validation, application and the orphan-vote pool.

use mngov_core::{
    BoundedCache, BoundedMultiCache, GovernanceError, GovernanceObject, GovernanceResult, GovernanceVote, Hash256,
    PeerId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::VoteValidity;
use crate::message::SyncRequest;
use crate::state::{Context, Outbox};
use crate::store::ObjectStore;

/// How a vote was handled when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDisposition {
    /// Recorded on its parent object.
    Applied,
    /// Parent is expired or marked for deletion; vote ignored.
    Stale,
    /// Ignored because the masternode list is not synced yet.
    NotSynced,
    /// Ignored because the vote was never requested.
    Unrequested,
}

/// A vote waiting for its parent object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanVote {
    /// The vote.
    pub vote: GovernanceVote,
    /// Absolute time after which the vote is dropped.
    pub expires_at: i64,
}

/// Invalid-vote cache, orphan-vote pool and vote-to-object index.
#[derive(Debug, Clone)]
pub struct VoteResolver {
    invalid: BoundedCache<Hash256, GovernanceVote>,
    orphans: BoundedMultiCache<Hash256, OrphanVote>,
    index: BoundedCache<Hash256, Hash256>,
}

impl VoteResolver {
    /// Creates empty caches bounded to `capacity` entries each.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            invalid: BoundedCache::new(capacity),
            orphans: BoundedMultiCache::new(capacity),
            index: BoundedCache::new(capacity),
        }
    }

    /// Returns true if the vote was applied and is still indexed.
    #[must_use]
    pub fn is_indexed(&self, vote_hash: &Hash256) -> bool {
        self.index.contains_key(vote_hash)
    }

    /// Parent object of an applied vote.
    #[must_use]
    pub fn parent_of(&self, vote_hash: &Hash256) -> Option<Hash256> {
        self.index.get(vote_hash).copied()
    }

    /// Returns true if the vote is known to be invalid.
    #[must_use]
    pub fn is_known_invalid(&self, vote_hash: &Hash256) -> bool {
        self.invalid.contains_key(vote_hash)
    }

    /// Number of indexed votes.
    #[must_use]
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Number of queued orphan votes.
    #[must_use]
    pub fn orphan_len(&self) -> usize {
        self.orphans.len()
    }

    /// Number of cached invalid votes.
    #[must_use]
    pub fn invalid_len(&self) -> usize {
        self.invalid.len()
    }

    /// Parent hashes that orphan votes are waiting for.
    #[must_use]
    pub fn orphan_parents(&self) -> Vec<Hash256> {
        self.orphans.keys().copied().collect()
    }

    /// Orphan votes queued under a parent.
    pub fn orphans_for(&self, parent: &Hash256) -> impl Iterator<Item = &OrphanVote> {
        self.orphans.get_all(parent)
    }

    /// Validates a vote and applies it to its parent object.
    ///
    /// Votes for unknown parents are queued and the parent is requested from
    /// `source`. Votes for parents marked for removal are ignored.
    pub(crate) fn process(
        &mut self,
        store: &mut ObjectStore,
        vote: GovernanceVote,
        source: Option<PeerId>,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> GovernanceResult<VoteDisposition> {
        let hash = vote.hash();
        let penalty = ctx.config.voting.invalid_vote_penalty;
        if self.invalid.contains_key(&hash) {
            return Err(GovernanceError::permanent("vote is known to be invalid", penalty));
        }

        let parent = vote.parent_hash();
        let Some(object) = store.get_mut(&parent) else {
            let orphan = OrphanVote {
                vote,
                expires_at: ctx.now + ctx.config.timing.orphan_expiration_time,
            };
            if self.orphans.insert(parent, orphan) {
                if let Some(peer) = source {
                    outbox.send_sync_request(peer, SyncRequest::unfiltered(parent));
                }
            }
            debug!(vote = %hash, parent = %parent, "vote for unknown object queued");
            return Err(GovernanceError::warning(format!("unknown parent object {parent}")));
        };

        if object.is_marked_for_removal() {
            debug!(vote = %hash, parent = %parent, "vote for expired or deleted object ignored");
            return Ok(VoteDisposition::Stale);
        }

        match ctx.validator.validate_vote(&vote) {
            VoteValidity::Valid => {}
            VoteValidity::MissingMasternode => {
                return Err(GovernanceError::warning(format!(
                    "unknown masternode {}",
                    vote.masternode().to_short_string()
                )));
            }
            VoteValidity::Invalid(reason) => {
                warn!(vote = %hash, reason = %reason, "invalid vote");
                self.invalid.insert(hash, vote);
                return Err(GovernanceError::permanent(reason, penalty));
            }
        }

        self.apply(object, vote, ctx, outbox)?;
        Ok(VoteDisposition::Applied)
    }

    fn apply(
        &mut self,
        object: &mut GovernanceObject,
        vote: GovernanceVote,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> GovernanceResult<()> {
        let hash = vote.hash();
        object.apply_vote(vote.clone(), ctx.config.voting.vote_update_min)?;
        self.index.insert(hash, vote.parent_hash());
        if object.is_watchdog() {
            ctx.registry
                .update_watchdog_vote_time(&vote.masternode(), vote.timestamp());
        }
        debug!(vote = %hash, parent = %vote.parent_hash(), "vote applied");
        outbox.relay_vote(vote);
        Ok(())
    }

    /// Retries the orphan votes queued under a newly known object.
    ///
    /// Expired, invalid and applied votes leave the pool; the rest stay queued.
    /// Returns the number of votes applied.
    pub(crate) fn resolve_orphans(
        &mut self,
        object: &mut GovernanceObject,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> usize {
        let parent = object.hash();
        let pending: Vec<OrphanVote> = self.orphans.get_all(&parent).cloned().collect();
        let mut applied = 0;

        for orphan in pending {
            if orphan.expires_at < ctx.now {
                self.orphans.remove(&parent, &orphan);
                continue;
            }
            match ctx.validator.validate_vote(&orphan.vote) {
                VoteValidity::Valid => {}
                VoteValidity::MissingMasternode => continue,
                VoteValidity::Invalid(reason) => {
                    debug!(vote = %orphan.vote.hash(), reason = %reason, "orphan vote invalid");
                    self.orphans.remove(&parent, &orphan);
                    self.invalid.insert(orphan.vote.hash(), orphan.vote);
                    continue;
                }
            }
            if self.apply(object, orphan.vote.clone(), ctx, outbox).is_ok() {
                self.orphans.remove(&parent, &orphan);
                applied += 1;
            }
        }
        applied
    }

    /// Drops orphan votes whose expiry has passed. Returns how many were dropped.
    pub fn clean_orphan_votes(&mut self, now: i64) -> usize {
        let before = self.orphans.len();
        self.orphans.retain(|_, orphan| orphan.expires_at >= now);
        before - self.orphans.len()
    }

    /// Removes every index entry pointing at `parent`. Returns how many were removed.
    pub fn purge_object(&mut self, parent: &Hash256) -> usize {
        let before = self.index.len();
        self.index.retain(|_, indexed_parent| *indexed_parent != *parent);
        before - self.index.len()
    }

    pub(crate) fn invalid_entries(&self) -> Vec<(Hash256, GovernanceVote)> {
        self.invalid
            .entries_in_order()
            .into_iter()
            .map(|(hash, vote)| (*hash, vote.clone()))
            .collect()
    }

    pub(crate) fn orphan_entries(&self) -> Vec<(Hash256, OrphanVote)> {
        self.orphans
            .entries_in_order()
            .into_iter()
            .map(|(parent, orphan)| (*parent, orphan.clone()))
            .collect()
    }

    /// Restores the caches and rebuilds the index from the objects' vote files.
    pub(crate) fn restore<'a>(
        &mut self,
        invalid: Vec<(Hash256, GovernanceVote)>,
        orphans: Vec<(Hash256, OrphanVote)>,
        objects: impl Iterator<Item = (&'a Hash256, &'a GovernanceObject)>,
    ) {
        let capacity = self.index.capacity();
        self.invalid = BoundedCache::from_entries(capacity, invalid);
        self.orphans = BoundedMultiCache::from_entries(capacity, orphans);
        self.index = BoundedCache::new(capacity);
        for (parent, object) in objects {
            for vote in object.votes().votes() {
                self.index.insert(vote.hash(), *parent);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.invalid.clear();
        self.orphans.clear();
        self.index.clear();
    }
}
