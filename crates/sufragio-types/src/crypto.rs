use crate::error::{SufragioError, SufragioResult};
use crate::DIGEST_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;

fn digest_from_hex(s: &str) -> SufragioResult<[u8; DIGEST_SIZE]> {
    let bytes = hex::decode(s).map_err(|e| SufragioError::Serialization(e.to_string()))?;
    if bytes.len() != DIGEST_SIZE {
        return Err(SufragioError::Serialization("Invalid digest length".into()));
    }
    let mut arr = [0u8; DIGEST_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Public identity commitment: a one-way Poseidon digest of the voter's
/// secret, usable as a Merkle leaf without revealing the secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; DIGEST_SIZE]);

impl Commitment {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hex encoding of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> SufragioResult<Self> {
        digest_from_hex(s).map(Self)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Root of a group's incremental Merkle tree over member commitments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(pub [u8; DIGEST_SIZE]);

impl MerkleRoot {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hex encoding of the root.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> SufragioResult<Self> {
        digest_from_hex(s).map(Self)
    }
}

impl fmt::Debug for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoot({})", self.to_hex())
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Deterministic digest of (identity secret, commitment, election scope).
/// Reproducible by the same identity in the same election, unlinkable to
/// the member otherwise; the double-vote detector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub [u8; DIGEST_SIZE]);

impl NullifierHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hex encoding of the nullifier.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> SufragioResult<Self> {
        digest_from_hex(s).map(Self)
    }
}

impl fmt::Debug for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullifierHash({})", self.to_hex())
    }
}

/// Scope tag binding nullifiers to one election. Derived from a fixed
/// domain tag plus the election identifier, never user-supplied raw.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElectionScope(pub [u8; DIGEST_SIZE]);

impl ElectionScope {
    const CONTEXT: &'static str = "SUFRAGIO-v1-election-scope";

    /// Derive the scope for a named election.
    pub fn for_election(election: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(Self::CONTEXT);
        hasher.update(election.trim().as_bytes());
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

    /// Hex encoding of the scope.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> SufragioResult<Self> {
        digest_from_hex(s).map(Self)
    }
}

impl fmt::Debug for ElectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElectionScope({})", self.to_hex())
    }
}
