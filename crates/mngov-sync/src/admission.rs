//! Object admission: submit, quarantine, postpone and activate.

use std::fmt;

use mngov_core::{GovernanceError, GovernanceObject, Hash256, ObjectKind, PeerId};
use tracing::{debug, info, warn};

use crate::collaborators::ObjectValidity;
use crate::message::InventoryItem;
use crate::rate_limit::{RateCheckMode, RateLimiter};
use crate::state::{Context, GovernanceState, Outbox};
use crate::store::ExpirationInfo;

/// Reason attached to objects that fail the forced rate check.
pub const RATE_EXCEEDED_REASON: &str = "masternode attempting to create too many objects";

/// What happened to a submitted object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored as active.
    Accepted,
    /// Already known.
    Duplicate,
    /// Rejected for good; the source was penalized.
    Invalid {
        /// Why the object was rejected.
        reason: String,
    },
    /// Waiting for collateral confirmations.
    Postponed,
    /// Waiting for its masternode.
    Orphaned,
    /// Too many orphans from this masternode; asked the source again instead.
    Rerequested,
    /// Masternode exceeded its submission rate.
    RateLimited,
    /// Ignored without penalty.
    Dropped {
        /// Why the object was dropped.
        reason: String,
    },
    /// Ignored because the masternode list is not synced yet.
    NotSynced,
    /// Ignored because the object was never requested.
    Unrequested,
}

impl SubmitOutcome {
    /// Returns true for [`SubmitOutcome::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    fn dropped(reason: impl Into<String>) -> Self {
        Self::Dropped { reason: reason.into() }
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Invalid { reason } => write!(f, "invalid: {reason}"),
            Self::Postponed => write!(f, "postponed"),
            Self::Orphaned => write!(f, "orphaned"),
            Self::Rerequested => write!(f, "re-requested"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Dropped { reason } => write!(f, "dropped: {reason}"),
            Self::NotSynced => write!(f, "not synced"),
            Self::Unrequested => write!(f, "unrequested"),
        }
    }
}

/// Self-contained rules followed by the validator. No rate check.
pub(crate) fn check_object(object: &GovernanceObject, check_collateral: bool, ctx: &Context<'_>) -> ObjectValidity {
    match object.validate_self(ctx.config.limits.max_object_data_size) {
        Ok(()) => ctx.validator.validate_object(object, check_collateral),
        Err(GovernanceError::Permanent { reason, .. } | GovernanceError::Warning(reason)) => {
            ObjectValidity::Invalid(reason)
        }
        Err(err) => ObjectValidity::Invalid(err.to_string()),
    }
}

/// [`check_object`] plus a forced, non-mutating rate check for rate-limited kinds.
pub(crate) fn is_valid_locally(
    rates: &mut RateLimiter,
    object: &GovernanceObject,
    check_collateral: bool,
    mode: RateCheckMode,
    ctx: &Context<'_>,
) -> ObjectValidity {
    let validity = check_object(object, check_collateral, ctx);
    if validity.is_valid() && mode == RateCheckMode::Normal && object.kind().is_rate_limited() {
        let check = rates.check(object, false, true, mode, ctx.synced(), ctx.now);
        if !check.allowed {
            return ObjectValidity::Invalid(RATE_EXCEEDED_REASON.to_string());
        }
    }
    validity
}

/// Re-evaluates and stores an active object's local validity.
pub(crate) fn update_local_validity(rates: &mut RateLimiter, object: &mut GovernanceObject, ctx: &Context<'_>) {
    match is_valid_locally(rates, object, false, RateCheckMode::Suspended, ctx) {
        ObjectValidity::Valid => object.set_local_validity(true, ""),
        ObjectValidity::MissingMasternode => object.set_local_validity(false, "masternode not found"),
        ObjectValidity::MissingConfirmations => object.set_local_validity(false, "collateral not confirmed"),
        ObjectValidity::Invalid(reason) => object.set_local_validity(false, reason),
    }
}

impl GovernanceState {
    /// Runs an incoming object through admission.
    ///
    /// 1. Known hashes are duplicates
    /// 2. Rate check, without forcing
    /// 3. Object rules and validator, with collateral
    /// 4. Forced rate check when step 2 was bypassed
    /// 5. Route by validity: quarantine, postpone, reject or activate
    pub(crate) fn submit(
        &mut self,
        object: GovernanceObject,
        source: Option<PeerId>,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> SubmitOutcome {
        let hash = object.hash();

        // 1. Duplicate check
        if self.store.contains(&hash) {
            debug!(hash = %hash, "object already known");
            return SubmitOutcome::Duplicate;
        }

        // 2. Rate check
        let rate = self
            .rates
            .check(&object, true, false, RateCheckMode::Normal, ctx.synced(), ctx.now);
        if !rate.allowed {
            warn!(
                hash = %hash,
                masternode = %object.masternode().to_short_string(),
                "object rejected by rate check"
            );
            return SubmitOutcome::RateLimited;
        }

        // 3. Validity
        let validity = check_object(&object, true, ctx);

        // 4. Forced rate check
        if rate.bypassed && matches!(validity, ObjectValidity::Valid | ObjectValidity::MissingMasternode) {
            let forced = self
                .rates
                .check(&object, true, true, RateCheckMode::Normal, ctx.synced(), ctx.now);
            if !forced.allowed {
                warn!(
                    hash = %hash,
                    masternode = %object.masternode().to_short_string(),
                    "masternode exceeded submission rate"
                );
                return SubmitOutcome::RateLimited;
            }
        }

        // 5. Route
        match validity {
            ObjectValidity::Valid => self.add_object(object, source, ctx, outbox),
            ObjectValidity::MissingMasternode => self.quarantine(hash, object, source, ctx, outbox),
            ObjectValidity::MissingConfirmations => {
                info!(hash = %hash, "object postponed until collateral confirms");
                self.store.postpone(hash, object);
                SubmitOutcome::Postponed
            }
            ObjectValidity::Invalid(reason) => {
                warn!(hash = %hash, reason = %reason, "invalid governance object");
                if let Some(peer) = source {
                    outbox.penalize(peer, ctx.config.voting.invalid_object_penalty);
                }
                SubmitOutcome::Invalid { reason }
            }
        }
    }

    fn quarantine(
        &mut self,
        hash: Hash256,
        object: GovernanceObject,
        source: Option<PeerId>,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> SubmitOutcome {
        let masternode = object.masternode();
        if self.store.orphan_attempts(&masternode) >= ctx.config.limits.max_orphan_objects_per_masternode {
            debug!(
                hash = %hash,
                masternode = %masternode.to_short_string(),
                "too many orphan objects, asking again"
            );
            if let Some(peer) = source {
                outbox.ask_for(peer, InventoryItem::object(hash));
            }
            return SubmitOutcome::Rerequested;
        }

        self.store.charge_orphan_slot(masternode);
        let info = ExpirationInfo {
            peer: source,
            expires_at: ctx.now + ctx.config.timing.orphan_expiration_time,
        };
        self.store.quarantine(hash, object, info);
        info!(
            hash = %hash,
            masternode = %masternode.to_short_string(),
            "object quarantined until its masternode appears"
        );
        SubmitOutcome::Orphaned
    }

    /// Activates an object that passed admission.
    pub(crate) fn add_object(
        &mut self,
        mut object: GovernanceObject,
        source: Option<PeerId>,
        ctx: &Context<'_>,
        outbox: &mut Outbox,
    ) -> SubmitOutcome {
        let hash = object.hash();
        object.update_sentinel_variables(ctx.registry.enabled_count(), ctx.config.voting.min_quorum, ctx.now);

        match is_valid_locally(&mut self.rates, &object, true, RateCheckMode::Normal, ctx) {
            ObjectValidity::Valid => {}
            ObjectValidity::Invalid(reason) => {
                debug!(hash = %hash, reason = %reason, "object failed local validation");
                return SubmitOutcome::dropped(reason);
            }
            other => {
                debug!(hash = %hash, validity = ?other, "object no longer valid");
                return SubmitOutcome::dropped(format!("{other:?}"));
            }
        }

        if self.store.is_active(&hash) {
            return SubmitOutcome::Duplicate;
        }

        if object.is_watchdog() {
            let window = ctx.config.timing.watchdog_expiration_time;
            if (object.creation_time() - ctx.now).abs() > window {
                debug!(hash = %hash, creation = object.creation_time(), "watchdog outside expiration window");
                return SubmitOutcome::dropped("watchdog outside expiration window");
            }

            let offer = self.watchdogs.offer(hash, object.creation_time(), ctx.now);
            if !offer.accepted {
                if let (Some(peer), Some(current)) = (source, self.watchdogs.current()) {
                    outbox.push_inventory(peer, InventoryItem::object(current));
                }
                debug!(hash = %hash, "watchdog lost election");
                return SubmitOutcome::dropped("watchdog lost election");
            }
            if let Some(previous) = offer.previous.and_then(|previous| self.store.get_mut(&previous)) {
                previous.mark_expired(ctx.now);
            }
        }

        outbox.relay_object(&object);
        if self.rates.record_accepted(&object, ctx.now) {
            self.store.schedule_relay(hash);
        }

        let kind = object.kind();
        let creation = object.creation_time();
        self.store.insert_active(hash, object);
        if kind == ObjectKind::Watchdog {
            self.watchdogs
                .register(hash, creation + ctx.config.timing.watchdog_expiration_time);
        }

        let resolved = match self.store.get_mut(&hash) {
            Some(stored) => self.votes.resolve_orphans(stored, ctx, outbox),
            None => 0,
        };
        info!(hash = %hash, kind = %kind, resolved_votes = resolved, "governance object accepted");
        SubmitOutcome::Accepted
    }

    /// Retries postponed objects and sends pending additional relays.
    ///
    /// Returns the number of postponed objects activated.
    pub(crate) fn check_postponed_objects(&mut self, ctx: &Context<'_>, outbox: &mut Outbox) -> usize {
        if !ctx.synced() {
            return 0;
        }

        let mut activated = 0;
        for hash in self.store.postponed_hashes() {
            let Some(object) = self.store.postponed(&hash) else {
                continue;
            };
            match ctx.validator.check_collateral(object, self.cached_height) {
                ObjectValidity::MissingConfirmations => {}
                ObjectValidity::Valid => {
                    let Some(object) = self.store.take_postponed(&hash) else {
                        continue;
                    };
                    match is_valid_locally(&mut self.rates, &object, false, RateCheckMode::Normal, ctx) {
                        ObjectValidity::Valid => {
                            if self.add_object(object, None, ctx, outbox).is_accepted() {
                                activated += 1;
                            }
                        }
                        other => debug!(hash = %hash, validity = ?other, "postponed object dropped"),
                    }
                }
                other => {
                    self.store.take_postponed(&hash);
                    debug!(hash = %hash, validity = ?other, "postponed object dropped");
                }
            }
        }

        for hash in self.store.relay_candidates() {
            let Some(creation) = self.store.get(&hash).map(GovernanceObject::creation_time) else {
                self.store.unschedule_relay(&hash);
                continue;
            };
            if !self.rates.is_within_time_bounds(creation, ctx.now) {
                self.store.unschedule_relay(&hash);
                continue;
            }
            if self.rates.is_ready_for_relay(creation, ctx.now) {
                if let Some(object) = self.store.get(&hash) {
                    outbox.relay_object(object);
                }
                self.store.unschedule_relay(&hash);
                debug!(hash = %hash, "additional relay sent");
            }
        }

        activated
    }

    /// Re-checks objects quarantined for a missing masternode.
    ///
    /// Returns the number activated.
    pub(crate) fn check_masternode_orphan_objects(&mut self, ctx: &Context<'_>, outbox: &mut Outbox) -> usize {
        let mut activated = 0;
        for hash in self.store.quarantined_hashes() {
            let Some((object, info)) = self.store.quarantined(&hash) else {
                continue;
            };
            if info.expires_at < ctx.now {
                self.store.take_quarantined(&hash);
                debug!(hash = %hash, "quarantined object expired");
                continue;
            }
            match is_valid_locally(&mut self.rates, object, true, RateCheckMode::Normal, ctx) {
                ObjectValidity::MissingMasternode => {}
                ObjectValidity::Valid => {
                    if let Some((object, info)) = self.store.take_quarantined(&hash) {
                        if self.add_object(object, info.peer, ctx, outbox).is_accepted() {
                            activated += 1;
                        }
                    }
                }
                other => {
                    self.store.take_quarantined(&hash);
                    debug!(hash = %hash, validity = ?other, "quarantined object dropped");
                }
            }
        }
        activated
    }
}
