//! Canonical Poseidon hash over the BN254 scalar field.
//!
//! Single source of truth for every digest in the protocol: identity
//! commitments, nullifiers, and Merkle tree nodes all go through these
//! functions, natively and in-circuit, so independently computed roots
//! are bit-exact.
//!
//! Parameters: width 3 (rate 2, capacity 1), 8 full rounds, 57 partial
//! rounds, x^5 S-box, Grain LFSR round constants (arkworks standard).
//! Every hash squeezes the first field element of the sponge.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use std::sync::OnceLock;

static CANONICAL_CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// The canonical Poseidon configuration. Thread-safe singleton.
pub fn canonical_config() -> &'static PoseidonConfig<Fr> {
    CANONICAL_CONFIG.get_or_init(|| {
        let rate = 2;
        let alpha = 5u64;
        let full_rounds = 8;
        let partial_rounds = 57;
        let field_bits = 254;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            field_bits,
            rate,
            full_rounds,
            partial_rounds,
            0, // skip_matrices
        );

        PoseidonConfig {
            full_rounds: full_rounds as usize,
            partial_rounds: partial_rounds as usize,
            alpha,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

/// Hash a sequence of field elements; returns the first squeezed element.
pub fn poseidon_hash_fields(inputs: &[Fr]) -> Fr {
    let config = canonical_config();
    let mut sponge = PoseidonSponge::new(config);
    for input in inputs {
        sponge.absorb(input);
    }
    let output: Vec<Fr> = sponge.squeeze_field_elements(1);
    output[0]
}

/// Hash one field element. Used for the zero-leaf of empty tree slots.
pub fn poseidon_hash1(input: Fr) -> Fr {
    poseidon_hash_fields(&[input])
}

/// Hash two field elements. The Merkle node combiner and the identity
/// commitment function.
pub fn poseidon_hash2(left: Fr, right: Fr) -> Fr {
    poseidon_hash_fields(&[left, right])
}

/// Hash three field elements. The scoped nullifier function.
pub fn poseidon_hash3(a: Fr, b: Fr, c: Fr) -> Fr {
    poseidon_hash_fields(&[a, b, c])
}

/// Canonical little-endian encoding of a field element.
pub fn fr_to_bytes(f: &Fr) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    f.serialize_compressed(&mut bytes[..])
        .expect("Fr fits in 32 bytes");
    bytes
}

/// Decode 32 bytes into a field element (reduced mod the field order).
pub fn bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = Fr::from(12345u64);
        let b = Fr::from(67890u64);

        assert_eq!(poseidon_hash2(a, b), poseidon_hash2(a, b));
        // Order matters
        assert_ne!(poseidon_hash2(a, b), poseidon_hash2(b, a));
    }

    #[test]
    fn test_arity_is_domain_separating() {
        let x = Fr::from(42u64);
        let zero = Fr::from(0u64);
        assert_ne!(poseidon_hash1(x), poseidon_hash2(x, zero));
    }

    #[test]
    fn test_field_bytes_round_trip() {
        let original = Fr::from(0xdeadbeefu64);
        let bytes = fr_to_bytes(&original);
        assert_eq!(bytes_to_fr(&bytes), original);
    }

    #[test]
    fn test_three_input_hash_differs_from_chained() {
        let (a, b, c) = (Fr::from(1u64), Fr::from(2u64), Fr::from(3u64));
        let absorbed = poseidon_hash3(a, b, c);
        let chained = poseidon_hash2(poseidon_hash2(a, b), c);
        assert_ne!(absorbed, chained);
    }
}
