//! Periodic cache refresh and garbage collection of governance objects.

use std::fmt;

use mngov_core::Hash256;
use tracing::{debug, info};

use crate::admission::update_local_validity;
use crate::state::{Context, GovernanceState};
use crate::store::erased_deadline;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Watchdogs whose expiry passed.
    pub expired_watchdogs: usize,
    /// Objects whose validity and tallies were recomputed.
    pub revalidated: usize,
    /// Objects moved to the erased map.
    pub erased: usize,
    /// Erased hashes forgotten.
    pub purged: usize,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expired watchdogs: {}, revalidated: {}, erased: {}, purged: {}",
            self.expired_watchdogs, self.revalidated, self.erased, self.purged
        )
    }
}

impl GovernanceState {
    /// One garbage collection pass.
    ///
    /// Expires watchdogs, drops votes of masternodes that left the list,
    /// recomputes dirty objects, erases objects marked long enough ago and
    /// forgets erased hashes past their deadline.
    pub(crate) fn update_caches_and_clean(&mut self, ctx: &Context<'_>) -> SweepReport {
        let mut report = SweepReport::default();

        for hash in self.watchdogs.expire_due(ctx.now) {
            if let Some(object) = self.store.get_mut(&hash) {
                object.mark_expired(ctx.now);
            }
            report.expired_watchdogs += 1;
        }

        for hash in ctx.registry.take_dirty_governance_hashes() {
            if let Some(object) = self.store.get_mut(&hash) {
                let removed = object.clear_masternode_votes(|outpoint| !ctx.registry.has_masternode(outpoint));
                object.set_dirty();
                debug!(hash = %hash, removed_votes = removed, "cleared votes of unknown masternodes");
            }
        }

        let enabled = ctx.registry.enabled_count();
        let deletion_delay = ctx.config.timing.deletion_delay;
        let mut to_erase: Vec<Hash256> = Vec::new();
        for (hash, object) in self.store.active_mut() {
            if object.state().dirty_cache {
                update_local_validity(&mut self.rates, object, ctx);
                object.update_sentinel_variables(enabled, ctx.config.voting.min_quorum, ctx.now);
                report.revalidated += 1;
            }

            let state = object.state();
            if state.cached_delete && object.is_watchdog() {
                self.watchdogs.clear_current_if(hash);
            }
            if (state.cached_delete || state.expired) && ctx.now - state.deletion_time >= deletion_delay {
                to_erase.push(*hash);
            }
        }

        let cycle_seconds = ctx.config.superblock_cycle_seconds();
        for hash in to_erase {
            let Some(object) = self.store.remove_active(&hash) else {
                continue;
            };
            ctx.registry.remove_governance_object(&hash);
            let purged_votes = self.votes.purge_object(&hash);
            self.watchdogs.remove(&hash);
            let deadline = erased_deadline(
                &object,
                ctx.config.timing.watchdog_expiration_time,
                cycle_seconds,
                deletion_delay,
            );
            self.store.record_erased(hash, deadline);
            info!(hash = %hash, kind = %object.kind(), purged_votes, "governance object erased");
            report.erased += 1;
        }

        report.purged = self.store.purge_erased(ctx.now);
        debug!(%report, "governance sweep finished");
        report
    }
}
