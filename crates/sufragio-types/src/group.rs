use crate::error::{SufragioError, SufragioResult};
use crate::DIGEST_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable group identifier, derived from the parish name under a fixed
/// domain tag. Replaces ad-hoc string keys so two spellings of the same
/// parish cannot create two groups.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub [u8; DIGEST_SIZE]);

impl GroupId {
    const CONTEXT: &'static str = "SUFRAGIO-v1-group-id";

    /// Derive the group id for a parish. Case- and whitespace-insensitive.
    pub fn for_parish(parish: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(Self::CONTEXT);
        hasher.update(parish.trim().to_lowercase().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hex encoding of the id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> SufragioResult<Self> {
        let bytes = hex::decode(s).map_err(|e| SufragioError::Serialization(e.to_string()))?;
        if bytes.len() != DIGEST_SIZE {
            return Err(SufragioError::Serialization("Invalid group id length".into()));
        }
        let mut arr = [0u8; DIGEST_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.to_hex())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Read-only snapshot of a group's descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group identifier.
    pub id: GroupId,
    /// Human-readable parish name the group was created for.
    pub parish: String,
    /// Fixed Merkle tree depth; capacity is 2^depth members.
    pub depth: usize,
    /// Number of member commitments appended so far.
    pub member_count: u64,
    /// Unix timestamp of group creation.
    pub created_at: i64,
}

impl GroupInfo {
    /// Maximum member count for this group's depth.
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }
}
