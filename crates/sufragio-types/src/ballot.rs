use crate::crypto::{ElectionScope, MerkleRoot, NullifierHash};
use crate::group::GroupId;
use serde::{Deserialize, Serialize};

/// A ballot as submitted for verification: the four public values the
/// proof binds, the raw signal, and the opaque proof envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotSubmission {
    /// Target group (parish).
    pub group_id: GroupId,
    /// Tree root the prover claims membership under.
    pub root: MerkleRoot,
    /// Deterministic per-identity, per-election nullifier.
    pub nullifier_hash: NullifierHash,
    /// Election scope the nullifier is bound to.
    pub scope: ElectionScope,
    /// The message being anonymously endorsed (the vote choice).
    pub signal: String,
    /// Serialized membership proof.
    pub proof: Vec<u8>,
}

/// Result of a successful admission: everything the downstream tally
/// needs, and nothing that could deanonymize the voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedBallot {
    /// Group the ballot was cast in.
    pub group_id: GroupId,
    /// Root the proof verified against.
    pub root: MerkleRoot,
    /// Spent nullifier.
    pub nullifier_hash: NullifierHash,
    /// Election scope.
    pub scope: ElectionScope,
    /// The endorsed signal.
    pub signal: String,
    /// Unix timestamp of acceptance.
    pub accepted_at: i64,
}
