//! Voter identity: a secret and a blinding scalar derived
//! deterministically from a passphrase, exposing only the Poseidon
//! commitment and the per-election nullifier. The secret never leaves
//! this module and is wiped on drop.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, poseidon_hash2, poseidon_hash3};
use ark_bn254::Fr;
use std::fmt;
use sufragio_types::{Commitment, ElectionScope, NullifierHash};
use zeroize::Zeroize;

const IDENTITY_SECRET_CONTEXT: &str = "SUFRAGIO-v1-identity-secret";
const IDENTITY_BLINDING_CONTEXT: &str = "SUFRAGIO-v1-identity-blinding";
const SIGNAL_CONTEXT: &str = "SUFRAGIO-v1-signal";

/// A voter's private identity material.
pub struct VoterIdentity {
    secret: [u8; 32],
    blinding: [u8; 32],
}

impl VoterIdentity {
    /// Derive an identity from user-supplied entropy. The same
    /// passphrase always yields the same identity, so a voter can
    /// re-derive it in a fresh session without any stored state.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            secret: derive_scalar(IDENTITY_SECRET_CONTEXT, passphrase.as_bytes()),
            blinding: derive_scalar(IDENTITY_BLINDING_CONTEXT, passphrase.as_bytes()),
        }
    }

    /// Reconstruct an identity from raw parts (e.g., a hardware token).
    pub fn from_parts(secret: [u8; 32], blinding: [u8; 32]) -> Self {
        Self { secret, blinding }
    }

    /// Public commitment: Poseidon(secret, blinding). Safe to publish as
    /// a Merkle leaf.
    pub fn commitment(&self) -> Commitment {
        let c = poseidon_hash2(self.secret_fr(), self.blinding_fr());
        Commitment::from_bytes(fr_to_bytes(&c))
    }

    /// Scoped nullifier: Poseidon(secret, commitment, scope). The same
    /// identity in the same election always yields the same value,
    /// independent of the signal.
    pub fn nullifier(&self, scope: &ElectionScope) -> NullifierHash {
        let commitment = poseidon_hash2(self.secret_fr(), self.blinding_fr());
        let n = poseidon_hash3(self.secret_fr(), commitment, bytes_to_fr(scope.as_bytes()));
        NullifierHash::from_bytes(fr_to_bytes(&n))
    }

    pub(crate) fn secret_fr(&self) -> Fr {
        bytes_to_fr(&self.secret)
    }

    pub(crate) fn blinding_fr(&self) -> Fr {
        bytes_to_fr(&self.blinding)
    }
}

impl fmt::Debug for VoterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoterIdentity([REDACTED])")
    }
}

impl Drop for VoterIdentity {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.blinding.zeroize();
    }
}

fn derive_scalar(context: &str, entropy: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(entropy);
    *hasher.finalize().as_bytes()
}

/// Hash a signal into the scalar field under the signal domain tag.
pub(crate) fn hash_signal(signal: &str) -> Fr {
    let mut hasher = blake3::Hasher::new_derive_key(SIGNAL_CONTEXT);
    hasher.update(signal.as_bytes());
    bytes_to_fr(hasher.finalize().as_bytes())
}

/// Byte form of the signal hash, as carried in proof envelopes.
pub fn signal_hash_bytes(signal: &str) -> [u8; 32] {
    fr_to_bytes(&hash_signal(signal))
}
