//! Governance wire messages with prost serialization.

use mngov_core::{BloomFilter, GovernanceObject, GovernanceVote, Hash256};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// What an inventory entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryKind {
    /// A governance object.
    Object,
    /// A governance vote.
    Vote,
    /// Anything else. Never fetched.
    Other(u32),
}

/// A (kind, hash) advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item kind.
    pub kind: InventoryKind,
    /// Item hash.
    pub hash: Hash256,
}

impl InventoryItem {
    /// Inventory entry for an object.
    #[must_use]
    pub const fn object(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Object,
            hash,
        }
    }

    /// Inventory entry for a vote.
    #[must_use]
    pub const fn vote(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Vote,
            hash,
        }
    }
}

/// Request for an object's votes, or for every object when `hash` is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Object whose votes are wanted. Zero asks for the full object list.
    pub hash: Hash256,
    /// Votes the requester already holds.
    pub filter: Option<BloomFilter>,
}

impl SyncRequest {
    /// Request without a filter.
    #[must_use]
    pub const fn unfiltered(hash: Hash256) -> Self {
        Self { hash, filter: None }
    }

    /// Returns true if a filter is attached.
    #[must_use]
    pub const fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }
}

/// Messages exchanged by the governance protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceMessage {
    /// A governance object.
    ObjectAnnounce(GovernanceObject),
    /// A vote on an object.
    VoteAnnounce(GovernanceVote),
    /// Request for votes or objects.
    SyncRequest(SyncRequest),
    /// Advertisement of held items.
    Inventory(Vec<InventoryItem>),
}

impl GovernanceMessage {
    /// Returns the message type as a string.
    #[must_use]
    pub const fn message_type(&self) -> &'static str {
        match self {
            Self::ObjectAnnounce(_) => "ObjectAnnounce",
            Self::VoteAnnounce(_) => "VoteAnnounce",
            Self::SyncRequest(_) => "SyncRequest",
            Self::Inventory(_) => "Inventory",
        }
    }

    const fn wire_type(&self) -> u32 {
        match self {
            Self::ObjectAnnounce(_) => wire_types::OBJECT_ANNOUNCE,
            Self::VoteAnnounce(_) => wire_types::VOTE_ANNOUNCE,
            Self::SyncRequest(_) => wire_types::SYNC_REQUEST,
            Self::Inventory(_) => wire_types::INVENTORY,
        }
    }
}

// ============ Prost Wire Format ============

/// Prost-encoded wrapper for governance messages.
#[derive(Clone, PartialEq, Message)]
pub struct WireGovernanceMessage {
    /// Message type discriminator.
    #[prost(uint32, tag = "1")]
    pub msg_type: u32,
    /// JSON-encoded payload.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// Protocol version for forward compatibility.
    #[prost(uint32, tag = "3")]
    pub version: u32,
}

/// Current wire protocol version.
pub const WIRE_VERSION: u32 = 1;

/// Message type constants for wire encoding.
pub mod wire_types {
    /// Object announce message type.
    pub const OBJECT_ANNOUNCE: u32 = 1;
    /// Vote announce message type.
    pub const VOTE_ANNOUNCE: u32 = 2;
    /// Sync request message type.
    pub const SYNC_REQUEST: u32 = 3;
    /// Inventory message type.
    pub const INVENTORY: u32 = 4;
}

impl GovernanceMessage {
    /// Encodes the message to prost wire format.
    ///
    /// Local object state and collected votes are not sent.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_wire(&self) -> SyncResult<Vec<u8>> {
        let payload = match self {
            Self::ObjectAnnounce(object) => {
                let mut stripped = object.clone();
                stripped.reset_local_state();
                serde_json::to_vec(&Self::ObjectAnnounce(stripped))?
            }
            _ => serde_json::to_vec(self)?,
        };

        let wire_msg = WireGovernanceMessage {
            msg_type: self.wire_type(),
            payload,
            version: WIRE_VERSION,
        };

        Ok(wire_msg.encode_to_vec())
    }

    /// Decodes a message from prost wire format.
    ///
    /// Objects larger than `max_object_data_size` are rejected, and any local
    /// state smuggled in with an object is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope is malformed, the version is newer
    /// than [`WIRE_VERSION`], the type is unknown or disagrees with the
    /// payload, an object is oversized, or a filter is malformed.
    pub fn decode_wire(bytes: &[u8], max_object_data_size: usize) -> SyncResult<Self> {
        let wire_msg = WireGovernanceMessage::decode(bytes)?;

        if wire_msg.version > WIRE_VERSION {
            return Err(SyncError::UnsupportedWireVersion {
                got: wire_msg.version,
                max: WIRE_VERSION,
            });
        }
        if !(wire_types::OBJECT_ANNOUNCE..=wire_types::INVENTORY).contains(&wire_msg.msg_type) {
            return Err(SyncError::UnknownMessageType(wire_msg.msg_type));
        }

        let mut message: Self = serde_json::from_slice(&wire_msg.payload)?;
        if message.wire_type() != wire_msg.msg_type {
            return Err(SyncError::Codec(format!(
                "message type {} does not match {} payload",
                wire_msg.msg_type,
                message.message_type()
            )));
        }

        match &mut message {
            Self::ObjectAnnounce(object) => {
                if object.data().len() > max_object_data_size {
                    return Err(SyncError::PayloadTooLarge {
                        size: object.data().len(),
                        max: max_object_data_size,
                    });
                }
                object.reset_local_state();
            }
            Self::SyncRequest(SyncRequest {
                filter: Some(filter), ..
            }) if !filter.is_well_formed() => {
                return Err(SyncError::Codec("malformed vote filter".into()));
            }
            _ => {}
        }

        Ok(message)
    }
}
