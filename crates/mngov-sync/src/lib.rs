//! # mngov-sync
//!
//! Propagation and admission engine for masternode governance objects.
//!
//! Peers gossip proposals, triggers, watchdogs and votes. The
//! [`GovernanceManager`] decides what is admitted, postponed or quarantined,
//! limits how fast each masternode may publish, elects the current watchdog,
//! parks votes whose object has not arrived yet and garbage collects deleted
//! and expired objects.
//!
//! ## Modules
//!
//! - [`admission`]: Object validation and the submission pipeline
//! - [`rate_limit`]: Per-masternode publication rate checks
//! - [`watchdog`]: Election of the single current watchdog
//! - [`votes`]: Vote indexing and orphan vote resolution
//! - [`sync`]: Inventory bookkeeping and sync request handling
//! - [`sweep`]: Cache refresh and garbage collection
//! - [`snapshot`]: Versioned persistence
//! - [`maintenance`]: Background maintenance task
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mngov_sync::{Collaborators, GovernanceConfig, GovernanceManager};
//!
//! let manager = Arc::new(GovernanceManager::new(GovernanceConfig::default(), collaborators));
//! let outcome = manager.process_object_message(&peer, object);
//! if outcome.is_accepted() {
//!     println!("{}", manager.stats());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod manager;
pub mod message;
pub mod rate_limit;
pub mod snapshot;
mod state;
pub mod store;
pub mod sweep;
pub mod sync;
pub mod votes;
pub mod watchdog;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use admission::{RATE_EXCEEDED_REASON, SubmitOutcome};
pub use collaborators::{
    Clock, MasternodeRegistry, MasternodeValidator, ObjectValidity, PeerInfo, PeerNetwork, SyncStatus,
    SystemClock, VoteValidity,
};
pub use config::{
    GovernanceConfig, GovernanceConfigBuilder, LimitsConfig, RateLimitConfig, SyncConfig, TimingConfig,
    VotingConfig,
};
pub use error::{SyncError, SyncResult};
pub use maintenance::{MaintenanceHandle, spawn_maintenance};
pub use manager::{Collaborators, GovernanceManager, GovernanceStats};
pub use message::{GovernanceMessage, InventoryItem, InventoryKind, SyncRequest, WIRE_VERSION};
pub use rate_limit::{RateCheck, RateCheckMode, RateLimiter};
pub use snapshot::{LoadOutcome, SNAPSHOT_VERSION};
pub use store::{ExpirationInfo, ObjectLocation, ObjectStore};
pub use sweep::SweepReport;
pub use sync::SyncCoordinator;
pub use votes::{OrphanVote, VoteDisposition, VoteResolver};
pub use watchdog::{WatchdogElection, WatchdogRecord};
