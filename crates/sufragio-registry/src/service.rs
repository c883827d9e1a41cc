//! Client-facing proving contract.
//!
//! Checks the membership precondition and assembles the Merkle witness
//! before touching the proving capability, so a non-member gets a clean
//! `NotAMember` instead of an opaque proving failure, and a member gets
//! a submission whose proof, root, and nullifier are mutually
//! consistent.

use crate::registry::GroupRegistry;
use std::sync::Arc;
use sufragio_crypto::{prove_membership, VoterIdentity};
use sufragio_types::{
    BallotSubmission, ElectionScope, GroupId, MerkleRoot, NullifierHash, SufragioResult,
};
use tracing::debug;

pub struct ProofService {
    registry: Arc<GroupRegistry>,
}

impl ProofService {
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self { registry }
    }

    /// Produce a ballot submission proving that `identity` is a member
    /// of the group and endorses `signal` exactly once in this election.
    pub async fn request_proof(
        &self,
        identity: &VoterIdentity,
        group_id: &GroupId,
        scope: &ElectionScope,
        signal: &str,
    ) -> SufragioResult<BallotSubmission> {
        let commitment = identity.commitment();
        let witness = self.registry.merkle_witness(group_id, &commitment).await?;

        debug!(
            group = %group_id,
            leaf_index = witness.leaf_index,
            "Generating membership proof"
        );

        let proof = prove_membership(identity, &witness, scope, signal)?;

        Ok(BallotSubmission {
            group_id: *group_id,
            root: MerkleRoot::from_bytes(proof.merkle_root),
            nullifier_hash: NullifierHash::from_bytes(proof.nullifier),
            scope: *scope,
            signal: signal.to_string(),
            proof: proof.to_bytes()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RegistryStorage;
    use sufragio_types::SufragioError;

    #[tokio::test]
    async fn test_request_proof_requires_membership() {
        let storage = Arc::new(RegistryStorage::in_memory().unwrap());
        let registry = Arc::new(GroupRegistry::open(storage, 0).await.unwrap());
        let group_id = registry.create_group("Rumipamba", 3).await.unwrap();
        let service = ProofService::new(Arc::clone(&registry));

        let identity = VoterIdentity::from_passphrase("unregistered voter");
        let scope = ElectionScope::for_election("municipal-2025");

        assert!(matches!(
            service
                .request_proof(&identity, &group_id, &scope, "candidate-a")
                .await,
            Err(SufragioError::NotAMember(_))
        ));

        registry
            .add_member(&group_id, &identity.commitment())
            .await
            .unwrap();

        let submission = service
            .request_proof(&identity, &group_id, &scope, "candidate-a")
            .await
            .unwrap();

        assert_eq!(submission.root, registry.get_root(&group_id).await.unwrap());
        assert_eq!(submission.nullifier_hash, identity.nullifier(&scope));
        assert_eq!(submission.signal, "candidate-a");
    }
}
