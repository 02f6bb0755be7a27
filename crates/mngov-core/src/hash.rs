//! Identifiers: content hashes, collateral outpoints and peer identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit content hash.
///
/// Ordering is numeric with the bytes read big-endian, so comparing two
/// hashes gives the same answer on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash256 {
    bytes: [u8; 32],
}

impl Hash256 {
    /// The all-zero hash, used as "none" on the wire.
    pub const ZERO: Self = Self { bytes: [0u8; 32] };

    /// Creates a hash from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Hashes arbitrary data with blake3.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        Self {
            bytes: *blake3::hash(data).as_bytes(),
        }
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Returns true for the all-zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.bytes == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.bytes).into_string())
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(hash: blake3::Hash) -> Self {
        Self {
            bytes: *hash.as_bytes(),
        }
    }
}

/// Reference to the collateral output that identifies a masternode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    /// Transaction holding the collateral.
    pub txid: Hash256,
    /// Output index within the transaction.
    pub index: u32,
}

impl Outpoint {
    /// Creates a new outpoint.
    #[must_use]
    pub const fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }

    /// Short human-readable form used in logs.
    #[must_use]
    pub fn to_short_string(&self) -> String {
        let txid = self.txid.to_string();
        let prefix: String = txid.chars().take(10).collect();
        format!("{prefix}-{}", self.index)
    }

    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.txid.as_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.txid, self.index)
    }
}

/// Unique identifier for a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    bytes: [u8; 32],
}

impl PeerId {
    /// Creates a `PeerId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes of the peer ID.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.bytes).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!Hash256::digest(b"x").is_zero());
        assert_eq!(Hash256::default(), Hash256::ZERO);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Hash256::digest(b"proposal"), Hash256::digest(b"proposal"));
        assert_ne!(Hash256::digest(b"proposal"), Hash256::digest(b"trigger"));
    }

    #[test]
    fn ordering_is_big_endian_numeric() {
        let mut low = [0u8; 32];
        low[31] = 0xff;
        let mut high = [0u8; 32];
        high[0] = 0x01;
        assert!(Hash256::from_bytes(high) > Hash256::from_bytes(low));
        assert!(Hash256::from_bytes(low) > Hash256::ZERO);
    }

    #[test]
    fn outpoint_display_contains_index() {
        let outpoint = Outpoint::new(Hash256::digest(b"collateral"), 7);
        assert!(outpoint.to_string().ends_with("-7"));
        assert!(outpoint.to_short_string().ends_with("-7"));
    }

    #[test]
    fn peer_id_roundtrip() {
        let peer = PeerId::from_bytes([9u8; 32]);
        assert_eq!(peer.as_bytes(), &[9u8; 32]);
        assert!(!peer.to_string().is_empty());
    }
}
