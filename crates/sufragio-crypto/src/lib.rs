//! Cryptographic core of sufragio: the canonical Poseidon hash, voter
//! identity derivation, the incremental membership tree, and the Groth16
//! membership proof used to cast a ballot anonymously.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod identity;
pub mod membership;
pub mod merkle;
pub mod poseidon;

pub use identity::{signal_hash_bytes, VoterIdentity};
pub use membership::{prove_membership, verify_membership_proof, MembershipProof};
pub use merkle::{IncrementalMerkleTree, MembershipWitness};
pub use poseidon::{
    bytes_to_fr, canonical_config, fr_to_bytes, poseidon_hash1, poseidon_hash2, poseidon_hash3,
    poseidon_hash_fields,
};
