//! Server-side admission pipeline.
//!
//! Each submission walks `Received → RootChecked → ProofChecked →
//! NullifierChecked → Accepted`, short-circuiting with a distinct typed
//! rejection at the first failing stage. The cheap checks run before
//! the expensive pairing verification, and the nullifier spend (the
//! durable side effect) happens last, so a rejected ballot never
//! consumes a nullifier.

use crate::ledger::NullifierLedger;
use crate::registry::GroupRegistry;
use crate::storage::RegistryStorage;
use std::sync::Arc;
use sufragio_crypto::{signal_hash_bytes, verify_membership_proof, MembershipProof};
use sufragio_types::{
    AcceptedBallot, BallotSubmission, SufragioError, SufragioResult,
};
use tracing::{debug, info, warn};

/// Stages of the admission pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    Received,
    RootChecked,
    ProofChecked,
    NullifierChecked,
    Accepted,
}

pub struct BallotVerifier {
    registry: Arc<GroupRegistry>,
    ledger: NullifierLedger,
    storage: Arc<RegistryStorage>,
}

impl BallotVerifier {
    pub fn new(
        registry: Arc<GroupRegistry>,
        ledger: NullifierLedger,
        storage: Arc<RegistryStorage>,
    ) -> Self {
        Self {
            registry,
            ledger,
            storage,
        }
    }

    /// Decide admit/reject for one submission.
    pub async fn submit(&self, submission: &BallotSubmission) -> SufragioResult<AcceptedBallot> {
        debug!(group = %submission.group_id, stage = ?VerifyStage::Received, "Ballot received");

        // 1. Root freshness. Cheap, and filters replays against
        //    superseded tree states before any cryptography runs.
        if !self
            .registry
            .is_fresh_root(&submission.group_id, &submission.root)
            .await?
        {
            warn!(group = %submission.group_id, "Rejected: stale or unknown root");
            return Err(SufragioError::StaleOrInvalidRoot(
                submission.group_id.to_hex(),
            ));
        }
        debug!(group = %submission.group_id, stage = ?VerifyStage::RootChecked, "Root is fresh");

        // 2. Envelope decode and public-value cross-checks, then the
        //    pairing verification itself.
        let proof = MembershipProof::from_bytes(&submission.proof)
            .map_err(|_| SufragioError::InvalidProof)?;

        let group_depth = self.registry.group_info(&submission.group_id).await?.depth;
        let consistent = proof.depth as usize == group_depth
            && proof.merkle_root == *submission.root.as_bytes()
            && proof.nullifier == *submission.nullifier_hash.as_bytes()
            && proof.scope == *submission.scope.as_bytes()
            && proof.signal_hash == signal_hash_bytes(&submission.signal);
        if !consistent {
            warn!(group = %submission.group_id, "Rejected: proof publics disagree with submission");
            return Err(SufragioError::InvalidProof);
        }

        if !verify_membership_proof(&proof)? {
            warn!(group = %submission.group_id, "Rejected: proof failed verification");
            return Err(SufragioError::InvalidProof);
        }
        debug!(group = %submission.group_id, stage = ?VerifyStage::ProofChecked, "Proof verified");

        // 3. Nullifier novelty: atomic test-and-set, the double-vote
        //    guard and the durable side effect of acceptance.
        self.ledger.spend(
            &submission.scope,
            &submission.nullifier_hash,
            &submission.group_id,
            proof.signal_hash,
        )?;
        debug!(group = %submission.group_id, stage = ?VerifyStage::NullifierChecked, "Nullifier spent");

        let ballot = AcceptedBallot {
            group_id: submission.group_id,
            root: submission.root,
            nullifier_hash: submission.nullifier_hash,
            scope: submission.scope,
            signal: submission.signal.clone(),
            accepted_at: chrono::Utc::now().timestamp(),
        };
        // Audit trail only; the nullifier insert above is what prevents
        // double counting.
        self.storage.record_ballot(&ballot)?;

        info!(group = %submission.group_id, stage = ?VerifyStage::Accepted, "Ballot accepted");
        Ok(ballot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ProofService;
    use sufragio_crypto::VoterIdentity;
    use sufragio_types::{Commitment, ElectionScope};

    struct Harness {
        registry: Arc<GroupRegistry>,
        service: ProofService,
        verifier: BallotVerifier,
        group_id: sufragio_types::GroupId,
        scope: ElectionScope,
    }

    async fn harness(root_history: usize) -> Harness {
        let storage = Arc::new(RegistryStorage::in_memory().unwrap());
        let registry = Arc::new(
            GroupRegistry::open(Arc::clone(&storage), root_history)
                .await
                .unwrap(),
        );
        let group_id = registry.create_group("Cotocollao", 3).await.unwrap();
        Harness {
            service: ProofService::new(Arc::clone(&registry)),
            verifier: BallotVerifier::new(
                Arc::clone(&registry),
                NullifierLedger::new(Arc::clone(&storage)),
                storage,
            ),
            registry,
            group_id,
            scope: ElectionScope::for_election("municipal-2025"),
        }
    }

    #[tokio::test]
    async fn test_accepts_valid_ballot() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();

        let accepted = h.verifier.submit(&submission).await.unwrap();
        assert_eq!(accepted.signal, "candidate-a");
        assert_eq!(accepted.nullifier_hash, voter.nullifier(&h.scope));
    }

    #[tokio::test]
    async fn test_double_vote_rejected_in_either_order() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        // Two submissions from the same identity, different signals:
        // same nullifier, so exactly one is accepted.
        let first = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();
        let second = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-b")
            .await
            .unwrap();

        assert!(h.verifier.submit(&second).await.is_ok());
        assert!(matches!(
            h.verifier.submit(&first).await,
            Err(SufragioError::DuplicateVote)
        ));
    }

    #[tokio::test]
    async fn test_stale_root_rejected_specifically() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();

        // The group mutates after proof generation.
        h.registry
            .add_member(&h.group_id, &Commitment::from_bytes([77; 32]))
            .await
            .unwrap();

        assert!(matches!(
            h.verifier.submit(&submission).await,
            Err(SufragioError::StaleOrInvalidRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_root_window_admits_older_proof() {
        let h = harness(1).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();

        // One append after proving stays inside the window of 1.
        h.registry
            .add_member(&h.group_id, &Commitment::from_bytes([77; 32]))
            .await
            .unwrap();

        assert!(h.verifier.submit(&submission).await.is_ok());
    }

    #[tokio::test]
    async fn test_vote_switching_rejected() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let mut submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();

        // A stolen proof replayed with a different choice.
        submission.signal = "candidate-b".into();

        assert!(matches!(
            h.verifier.submit(&submission).await,
            Err(SufragioError::InvalidProof)
        ));
    }

    #[tokio::test]
    async fn test_garbage_proof_bytes_rejected() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let mut submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();
        submission.proof = b"garbage".to_vec();

        assert!(matches!(
            h.verifier.submit(&submission).await,
            Err(SufragioError::InvalidProof)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_double_vote_single_acceptance() {
        let h = harness(0).await;
        let voter = VoterIdentity::from_passphrase("voter one");
        h.registry
            .add_member(&h.group_id, &voter.commitment())
            .await
            .unwrap();

        let submission = h
            .service
            .request_proof(&voter, &h.group_id, &h.scope, "candidate-a")
            .await
            .unwrap();

        let verifier = Arc::new(h.verifier);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let verifier = Arc::clone(&verifier);
            let submission = submission.clone();
            handles.push(tokio::spawn(async move {
                verifier.submit(&submission).await.is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
