//! # mngov-core
//!
//! Primitives shared by the masternode governance engine.
//!
//! ## Core Types
//!
//! - [`Hash256`]: Content hash identifying objects and votes
//! - [`Outpoint`]: Collateral reference identifying a masternode
//! - [`PeerId`]: Identity of a remote peer
//! - [`GovernanceObject`]: A gossiped proposal, trigger or watchdog
//! - [`GovernanceVote`]: A masternode's vote on a governance object
//! - [`BoundedCache`] / [`BoundedMultiCache`]: Capacity-limited maps with insertion-order eviction
//! - [`BloomFilter`]: Probabilistic set used to filter vote sync responses

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bloom;
pub mod cache;
pub mod error;
pub mod hash;
pub mod object;
pub mod vote;

pub use bloom::BloomFilter;
pub use cache::{BoundedCache, BoundedMultiCache};
pub use error::{GovernanceError, GovernanceResult};
pub use hash::{Hash256, Outpoint, PeerId};
pub use object::{GovernanceObject, ObjectKind, ObjectState, TriggerPayload};
pub use vote::{GovernanceVote, VoteFile, VoteOutcome, VoteSignal};
