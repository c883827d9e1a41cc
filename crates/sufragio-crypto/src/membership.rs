//! Groth16 membership proofs on BN254.
//!
//! The circuit proves, without revealing the identity: (1) knowledge of
//! a secret whose commitment sits at some leaf of the group tree with
//! the public root, and (2) that the public nullifier is the canonical
//! scoped nullifier of that same secret. The signal hash enters the
//! constraint system through a square so its input wire is bound by the
//! proof: substituting a different signal after proving invalidates it.

use crate::identity::{hash_signal, VoterIdentity};
use crate::merkle::MembershipWitness;
use crate::poseidon::{bytes_to_fr, canonical_config, fr_to_bytes};
use ark_bn254::{Bn254, Fr};
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use sufragio_types::{ElectionScope, SufragioError, SufragioResult, MAX_TREE_DEPTH};

struct CircuitKeys {
    pk: ProvingKey<Bn254>,
    vk: PreparedVerifyingKey<Bn254>,
}

/// One key pair per tree depth; the circuit shape depends only on depth.
static KEYS: OnceLock<Mutex<HashMap<usize, Arc<CircuitKeys>>>> = OnceLock::new();

fn keys_for_depth(depth: usize) -> SufragioResult<Arc<CircuitKeys>> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(SufragioError::InvalidDepth(depth));
    }

    let cache = KEYS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache
        .lock()
        .map_err(|_| SufragioError::Crypto("Proving key cache poisoned".into()))?;

    if let Some(keys) = guard.get(&depth) {
        return Ok(Arc::clone(keys));
    }

    let mut rng = thread_rng();
    let setup_circuit = MembershipCircuit::blank(depth);
    let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(setup_circuit, &mut rng)
        .map_err(|e| SufragioError::Crypto(format!("Key generation failed: {}", e)))?;
    let pvk = Groth16::<Bn254>::process_vk(&vk)
        .map_err(|e| SufragioError::Crypto(format!("Verifying key processing failed: {}", e)))?;

    let keys = Arc::new(CircuitKeys { pk, vk: pvk });
    guard.insert(depth, Arc::clone(&keys));
    Ok(keys)
}

fn poseidon_gadget(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[&FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, canonical_config());
    for input in inputs {
        sponge.absorb(*input)?;
    }
    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}

#[derive(Clone)]
struct MembershipCircuit {
    depth: usize,
    // Private witness
    secret: Option<Fr>,
    blinding: Option<Fr>,
    leaf_index: Option<u64>,
    merkle_path: Option<Vec<Fr>>,
    // Public inputs, in allocation order
    merkle_root: Option<Fr>,
    nullifier: Option<Fr>,
    scope: Option<Fr>,
    signal_hash: Option<Fr>,
}

impl MembershipCircuit {
    fn blank(depth: usize) -> Self {
        Self {
            depth,
            secret: None,
            blinding: None,
            leaf_index: None,
            merkle_path: None,
            merkle_root: None,
            nullifier: None,
            scope: None,
            signal_hash: None,
        }
    }
}

impl ConstraintSynthesizer<Fr> for MembershipCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let secret = FpVar::new_witness(cs.clone(), || {
            self.secret.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let blinding = FpVar::new_witness(cs.clone(), || {
            self.blinding.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let path = self
            .merkle_path
            .unwrap_or_else(|| vec![Fr::from(0u64); self.depth]);
        if path.len() != self.depth {
            return Err(SynthesisError::Unsatisfiable);
        }
        let index = self.leaf_index.unwrap_or(0);

        let mut siblings = Vec::with_capacity(self.depth);
        let mut index_bits = Vec::with_capacity(self.depth);
        for (level, sibling) in path.iter().enumerate() {
            siblings.push(FpVar::new_witness(cs.clone(), || Ok(*sibling))?);
            // Index bits are witnesses, not constants, so one key pair
            // covers every leaf position at a given depth.
            let bit = (index >> level) & 1 == 1;
            index_bits.push(Boolean::new_witness(cs.clone(), || Ok(bit))?);
        }

        let merkle_root = FpVar::new_input(cs.clone(), || {
            self.merkle_root.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier = FpVar::new_input(cs.clone(), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let scope = FpVar::new_input(cs.clone(), || {
            self.scope.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let signal_hash = FpVar::new_input(cs.clone(), || {
            self.signal_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let commitment = poseidon_gadget(cs.clone(), &[&secret, &blinding])?;

        let mut current = commitment.clone();
        for (sibling, is_right) in siblings.iter().zip(index_bits.iter()) {
            let left = FpVar::conditionally_select(is_right, sibling, &current)?;
            let right = FpVar::conditionally_select(is_right, &current, sibling)?;
            current = poseidon_gadget(cs.clone(), &[&left, &right])?;
        }
        current.enforce_equal(&merkle_root)?;

        let expected_nullifier = poseidon_gadget(cs.clone(), &[&secret, &commitment, &scope])?;
        expected_nullifier.enforce_equal(&nullifier)?;

        // Tie the signal wire into the constraint system; an input that
        // appears in no constraint would be unconstrained in the
        // verification equation.
        let _signal_squared = signal_hash.square()?;

        Ok(())
    }
}

/// Opaque membership proof plus the four public values it binds.
#[derive(Clone, Serialize, Deserialize)]
pub struct MembershipProof {
    #[serde(with = "proof_serde")]
    proof: Proof<Bn254>,
    /// Root of the tree state the prover claims membership in.
    pub merkle_root: [u8; 32],
    /// Scoped nullifier of the proving identity.
    pub nullifier: [u8; 32],
    /// Election scope.
    pub scope: [u8; 32],
    /// Hash of the endorsed signal.
    pub signal_hash: [u8; 32],
    /// Tree depth the proof was generated for.
    pub depth: u32,
}

mod proof_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(proof: &Proof<Bn254>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .map_err(serde::ser::Error::custom)?;
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Proof<Bn254>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Proof::deserialize_compressed(&bytes[..]).map_err(serde::de::Error::custom)
    }
}

impl MembershipProof {
    /// Serialize to a storable/transmittable envelope.
    pub fn to_bytes(&self) -> SufragioResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SufragioError::Serialization(e.to_string()))
    }

    /// Deserialize from `to_bytes` output.
    pub fn from_bytes(bytes: &[u8]) -> SufragioResult<Self> {
        bincode::deserialize(bytes).map_err(|e| SufragioError::Serialization(e.to_string()))
    }

    /// Base64 envelope for text transports.
    pub fn to_base64(&self) -> SufragioResult<String> {
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            self.to_bytes()?,
        ))
    }

    /// Parse a base64 envelope.
    pub fn from_base64(s: &str) -> SufragioResult<Self> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
            .map_err(|e| SufragioError::Serialization(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// Generate a membership proof for `identity` at the position described
/// by `witness`, endorsing `signal` under `scope`.
///
/// The witness must come from the authoritative group state; an
/// inconsistent witness makes the circuit unsatisfiable and proving
/// fails rather than producing an invalid proof.
pub fn prove_membership(
    identity: &VoterIdentity,
    witness: &MembershipWitness,
    scope: &ElectionScope,
    signal: &str,
) -> SufragioResult<MembershipProof> {
    let depth = witness.siblings.len();
    let keys = keys_for_depth(depth)?;

    let scope_fr = bytes_to_fr(scope.as_bytes());
    let signal_fr = hash_signal(signal);
    let commitment_fr = bytes_to_fr(identity.commitment().as_bytes());
    let nullifier_fr = bytes_to_fr(identity.nullifier(scope).as_bytes());
    let root_fr = bytes_to_fr(&witness.root);
    let path: Vec<Fr> = witness.siblings.iter().map(bytes_to_fr).collect();

    // Cheap local check before the expensive proving step.
    let mut current = commitment_fr;
    let mut idx = witness.leaf_index;
    for sibling in &path {
        current = if idx & 1 == 1 {
            crate::poseidon::poseidon_hash2(*sibling, current)
        } else {
            crate::poseidon::poseidon_hash2(current, *sibling)
        };
        idx >>= 1;
    }
    if current != root_fr {
        return Err(SufragioError::Crypto(
            "Witness does not open to the claimed root".into(),
        ));
    }

    let circuit = MembershipCircuit {
        depth,
        secret: Some(identity.secret_fr()),
        blinding: Some(identity.blinding_fr()),
        leaf_index: Some(witness.leaf_index),
        merkle_path: Some(path),
        merkle_root: Some(root_fr),
        nullifier: Some(nullifier_fr),
        scope: Some(scope_fr),
        signal_hash: Some(signal_fr),
    };

    let mut rng = thread_rng();
    let proof = Groth16::<Bn254>::prove(&keys.pk, circuit, &mut rng)
        .map_err(|e| SufragioError::Crypto(format!("Proof generation failed: {}", e)))?;

    Ok(MembershipProof {
        proof,
        merkle_root: witness.root,
        nullifier: fr_to_bytes(&nullifier_fr),
        scope: *scope.as_bytes(),
        signal_hash: fr_to_bytes(&signal_fr),
        depth: depth as u32,
    })
}

/// Verify a membership proof against its embedded public values.
/// Returns `Ok(false)` for a well-formed but invalid proof; errors are
/// reserved for the proving system itself misbehaving.
pub fn verify_membership_proof(proof: &MembershipProof) -> SufragioResult<bool> {
    let keys = keys_for_depth(proof.depth as usize)?;

    let public_inputs = vec![
        bytes_to_fr(&proof.merkle_root),
        bytes_to_fr(&proof.nullifier),
        bytes_to_fr(&proof.scope),
        bytes_to_fr(&proof.signal_hash),
    ];

    Groth16::<Bn254>::verify_with_processed_vk(&keys.vk, &public_inputs, &proof.proof)
        .map_err(|e| SufragioError::Crypto(format!("Verification failed: {}", e)))
}
