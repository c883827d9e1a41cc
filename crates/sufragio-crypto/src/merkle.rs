//! Fixed-depth incremental Merkle tree over member commitments.
//!
//! Append recomputes only the path from the new leaf to the root using a
//! filled-subtree cache; empty slots use a canonical zero-value ladder
//! (`zeros[0] = Poseidon1(0)`), so any two implementations fed the same
//! leaf sequence produce bit-identical roots.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, poseidon_hash1, poseidon_hash2};
use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use sufragio_types::{Commitment, MerkleRoot, SufragioError, SufragioResult, MAX_TREE_DEPTH};

/// Everything a prover needs to demonstrate membership of one leaf:
/// its position, the sibling digest at every level, and the root the
/// path folds up to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipWitness {
    /// Leaf position (insertion order).
    pub leaf_index: u64,
    /// Sibling digest per level, leaf level first.
    pub siblings: Vec<[u8; 32]>,
    /// Root the witness was extracted under.
    pub root: [u8; 32],
}

/// Append-only Merkle tree of fixed depth.
pub struct IncrementalMerkleTree {
    depth: usize,
    zeros: Vec<Fr>,
    filled: Vec<Fr>,
    leaves: Vec<Fr>,
    root: Fr,
}

impl IncrementalMerkleTree {
    /// Create an empty tree. Depth bounds capacity at 2^depth leaves.
    pub fn new(depth: usize) -> SufragioResult<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(SufragioError::InvalidDepth(depth));
        }

        let mut zeros = Vec::with_capacity(depth + 1);
        let zero_leaf = poseidon_hash1(Fr::from(0u64));
        zeros.push(zero_leaf);
        let mut current = zero_leaf;
        for _ in 0..depth {
            current = poseidon_hash2(current, current);
            zeros.push(current);
        }

        Ok(Self {
            depth,
            root: zeros[depth],
            filled: vec![Fr::from(0u64); depth],
            zeros,
            leaves: Vec::new(),
        })
    }

    /// Rebuild a tree from a persisted leaf sequence.
    pub fn from_leaves(depth: usize, leaves: &[Commitment]) -> SufragioResult<Self> {
        let mut tree = Self::new(depth)?;
        for leaf in leaves {
            tree.insert(leaf)?;
        }
        Ok(tree)
    }

    /// Append a commitment, recomputing only the leaf-to-root path.
    /// Returns the new leaf's index.
    pub fn insert(&mut self, leaf: &Commitment) -> SufragioResult<u64> {
        if self.leaves.len() as u64 >= self.capacity() {
            return Err(SufragioError::Crypto("Merkle tree is full".into()));
        }

        let leaf_fr = bytes_to_fr(leaf.as_bytes());
        let index = self.leaves.len();
        self.leaves.push(leaf_fr);

        let mut idx = index;
        let mut current = leaf_fr;
        for level in 0..self.depth {
            if idx % 2 == 0 {
                self.filled[level] = current;
                current = poseidon_hash2(current, self.zeros[level]);
            } else {
                current = poseidon_hash2(self.filled[level], current);
            }
            idx /= 2;
        }
        self.root = current;

        Ok(index as u64)
    }

    /// Current root.
    pub fn root(&self) -> MerkleRoot {
        MerkleRoot::from_bytes(fr_to_bytes(&self.root))
    }

    /// Extract the membership witness for the leaf at `index`.
    pub fn witness(&self, index: u64) -> SufragioResult<MembershipWitness> {
        if index as usize >= self.leaves.len() {
            return Err(SufragioError::Crypto("Leaf index out of range".into()));
        }

        let mut level = self.leaves.clone();
        let mut siblings = Vec::with_capacity(self.depth);
        let mut idx = index as usize;

        for l in 0..self.depth {
            let sibling = level.get(idx ^ 1).copied().unwrap_or(self.zeros[l]);
            siblings.push(fr_to_bytes(&sibling));

            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i < level.len() {
                let left = level[i];
                let right = level.get(i + 1).copied().unwrap_or(self.zeros[l]);
                next.push(poseidon_hash2(left, right));
                i += 2;
            }
            level = next;
            idx /= 2;
        }

        Ok(MembershipWitness {
            leaf_index: index,
            siblings,
            root: fr_to_bytes(&self.root),
        })
    }

    /// Fold a leaf up a witness path and compare against the claimed
    /// root. This is the out-of-circuit mirror of the proof statement.
    pub fn verify_witness(leaf: &Commitment, witness: &MembershipWitness) -> bool {
        let mut current = bytes_to_fr(leaf.as_bytes());
        let mut idx = witness.leaf_index;
        for sibling in &witness.siblings {
            let sibling_fr = bytes_to_fr(sibling);
            current = if idx & 1 == 1 {
                poseidon_hash2(sibling_fr, current)
            } else {
                poseidon_hash2(current, sibling_fr)
            };
            idx >>= 1;
        }
        fr_to_bytes(&current) == witness.root
    }

    /// Recompute the root from scratch over an arbitrary leaf sequence.
    /// Used as an independent cross-check of the incremental root during
    /// recovery and in audits.
    pub fn root_over_leaves(depth: usize, leaves: &[Commitment]) -> SufragioResult<MerkleRoot> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(SufragioError::InvalidDepth(depth));
        }
        if leaves.len() as u64 > (1u64 << depth) {
            return Err(SufragioError::Crypto("Too many leaves for depth".into()));
        }

        let zero_leaf = poseidon_hash1(Fr::from(0u64));
        let mut zero = zero_leaf;
        let mut level: Vec<Fr> = leaves.iter().map(|c| bytes_to_fr(c.as_bytes())).collect();

        for _ in 0..depth {
            let mut next = Vec::with_capacity(level.len().div_ceil(2).max(1));
            let mut i = 0;
            if level.is_empty() {
                next.push(poseidon_hash2(zero, zero));
            }
            while i < level.len() {
                let left = level[i];
                let right = level.get(i + 1).copied().unwrap_or(zero);
                next.push(poseidon_hash2(left, right));
                i += 2;
            }
            level = next;
            zero = poseidon_hash2(zero, zero);
        }

        Ok(MerkleRoot::from_bytes(fr_to_bytes(&level[0])))
    }

    /// Number of leaves inserted.
    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Maximum leaf count: 2^depth.
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Tree depth.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn commitment(byte: u8) -> Commitment {
        // Low bytes so values stay below the field modulus.
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        Commitment::from_bytes(bytes)
    }

    #[test]
    fn test_rejects_invalid_depth() {
        assert!(matches!(
            IncrementalMerkleTree::new(0),
            Err(SufragioError::InvalidDepth(0))
        ));
        assert!(IncrementalMerkleTree::new(MAX_TREE_DEPTH + 1).is_err());
        assert!(IncrementalMerkleTree::new(MAX_TREE_DEPTH).is_ok());
    }

    #[test]
    fn test_empty_root_is_deterministic() {
        let a = IncrementalMerkleTree::new(4).unwrap();
        let b = IncrementalMerkleTree::new(4).unwrap();
        assert_eq!(a.root(), b.root());
        assert_eq!(
            a.root(),
            IncrementalMerkleTree::root_over_leaves(4, &[]).unwrap()
        );
    }

    #[test]
    fn test_insert_changes_root() {
        let mut tree = IncrementalMerkleTree::new(4).unwrap();
        let empty_root = tree.root();
        tree.insert(&commitment(1)).unwrap();
        let one_root = tree.root();
        assert_ne!(empty_root, one_root);
        tree.insert(&commitment(2)).unwrap();
        assert_ne!(one_root, tree.root());
    }

    #[test]
    fn test_depth_two_scenario() {
        // Depth 2 (capacity 4): four inserts succeed, the fifth fails,
        // and the final root is reproducible by an independent
        // from-scratch recomputation over the same sequence.
        let mut tree = IncrementalMerkleTree::new(2).unwrap();
        let members: Vec<Commitment> = (1..=4).map(commitment).collect();
        for (i, c) in members.iter().enumerate() {
            assert_eq!(tree.insert(c).unwrap(), i as u64);
        }
        assert!(tree.insert(&commitment(5)).is_err());

        let recomputed = IncrementalMerkleTree::root_over_leaves(2, &members).unwrap();
        assert_eq!(tree.root(), recomputed);
    }

    #[test]
    fn test_witness_verifies_for_every_leaf() {
        let mut tree = IncrementalMerkleTree::new(3).unwrap();
        let members: Vec<Commitment> = (1..=5).map(commitment).collect();
        for c in &members {
            tree.insert(c).unwrap();
        }

        for (i, c) in members.iter().enumerate() {
            let witness = tree.witness(i as u64).unwrap();
            assert_eq!(witness.siblings.len(), 3);
            assert!(IncrementalMerkleTree::verify_witness(c, &witness));
        }

        // Wrong leaf against a valid path fails.
        let witness = tree.witness(0).unwrap();
        assert!(!IncrementalMerkleTree::verify_witness(&members[1], &witness));

        // Out-of-range index is an error, not a panic.
        assert!(tree.witness(5).is_err());
    }

    #[test]
    fn test_rebuild_from_leaves_matches() {
        let mut tree = IncrementalMerkleTree::new(4).unwrap();
        let members: Vec<Commitment> = (1..=7).map(commitment).collect();
        for c in &members {
            tree.insert(c).unwrap();
        }

        let rebuilt = IncrementalMerkleTree::from_leaves(4, &members).unwrap();
        assert_eq!(tree.root(), rebuilt.root());
        assert_eq!(rebuilt.len(), 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_incremental_root_matches_recompute(
            raw in prop::collection::vec(any::<[u8; 32]>(), 1..16usize)
        ) {
            let leaves: Vec<Commitment> =
                raw.into_iter().map(Commitment::from_bytes).collect();

            let mut tree = IncrementalMerkleTree::new(4).unwrap();
            for leaf in &leaves {
                tree.insert(leaf).unwrap();
            }

            let recomputed =
                IncrementalMerkleTree::root_over_leaves(4, &leaves).unwrap();
            prop_assert_eq!(tree.root(), recomputed);
        }
    }
}
