//! Typed counterparts of the HTTP surface consumed by the web layer.
//!
//! The transport itself lives outside this crate; these structs give it
//! validated, explicitly-shaped bodies. Hex and base64 fields are
//! decoded into core types before any cryptographic step sees them.

use serde::{Deserialize, Serialize};
use sufragio_types::{
    BallotSubmission, Commitment, ElectionScope, GroupId, MerkleRoot, NullifierHash,
    SufragioError, SufragioResult,
};

/// `POST /register-identity` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterIdentityRequest {
    pub cedula: String,
    pub parroquia: String,
    /// Hex-encoded identity commitment.
    pub identity_commitment: String,
}

impl RegisterIdentityRequest {
    pub fn commitment(&self) -> SufragioResult<Commitment> {
        Commitment::from_hex(&self.identity_commitment)
    }
}

/// `POST /register-identity` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterIdentityResponse {
    /// Hex-encoded root after the append.
    pub root: String,
}

impl RegisterIdentityResponse {
    pub fn new(root: &MerkleRoot) -> Self {
        Self { root: root.to_hex() }
    }
}

/// `GET /merkle-root/:parroquia` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleRootResponse {
    pub merkle_root: String,
}

impl MerkleRootResponse {
    pub fn new(root: &MerkleRoot) -> Self {
        Self {
            merkle_root: root.to_hex(),
        }
    }
}

/// `POST /validate` body: everything the admission pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateRequest {
    pub cedula: String,
    pub parroquia: String,
    /// Hex-encoded claimed root.
    pub merkle_root: String,
    /// Hex-encoded nullifier.
    pub nullifier_hash: String,
    /// Hex-encoded election scope.
    pub scope: String,
    /// The vote choice being endorsed.
    pub signal: String,
    /// Base64 proof envelope.
    pub proof: String,
}

impl ValidateRequest {
    /// Decode into a typed submission. Fails on any malformed field
    /// before a single cryptographic operation runs.
    pub fn to_submission(&self) -> SufragioResult<BallotSubmission> {
        let proof = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &self.proof,
        )
        .map_err(|e| SufragioError::Serialization(e.to_string()))?;

        Ok(BallotSubmission {
            group_id: GroupId::for_parish(&self.parroquia),
            root: MerkleRoot::from_hex(&self.merkle_root)?,
            nullifier_hash: NullifierHash::from_hex(&self.nullifier_hash)?,
            scope: ElectionScope::from_hex(&self.scope)?,
            signal: self.signal.clone(),
            proof,
        })
    }
}

/// `POST /validate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateResponse {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// Rejection with the error's user-facing message. The taxonomy's
    /// messages are already non-leaking.
    pub fn rejected(error: &SufragioError) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_decodes_commitment() {
        let req = RegisterIdentityRequest {
            cedula: "1712345678".into(),
            parroquia: "Cotocollao".into(),
            identity_commitment: hex::encode([7u8; 32]),
        };
        assert_eq!(req.commitment().unwrap(), Commitment::from_bytes([7; 32]));

        let bad = RegisterIdentityRequest {
            identity_commitment: "xyz".into(),
            ..req
        };
        assert!(bad.commitment().is_err());
    }

    #[test]
    fn test_validate_request_round_trip() {
        let scope = ElectionScope::for_election("municipal-2025");
        let req = ValidateRequest {
            cedula: "1712345678".into(),
            parroquia: "Cotocollao".into(),
            merkle_root: hex::encode([1u8; 32]),
            nullifier_hash: hex::encode([2u8; 32]),
            scope: scope.to_hex(),
            signal: "candidate-a".into(),
            proof: base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b"envelope",
            ),
        };

        let submission = req.to_submission().unwrap();
        assert_eq!(submission.group_id, GroupId::for_parish("Cotocollao"));
        assert_eq!(submission.scope, scope);
        assert_eq!(submission.proof, b"envelope");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{
            "cedula": "1712345678",
            "parroquia": "Cotocollao",
            "identity_commitment": "00",
            "extra": true
        }"#;
        assert!(serde_json::from_str::<RegisterIdentityRequest>(json).is_err());
    }

    #[test]
    fn test_rejection_response_carries_message() {
        let resp = ValidateResponse::rejected(&SufragioError::DuplicateVote);
        assert!(!resp.valid);
        assert!(resp.error.is_some());

        let json = serde_json::to_string(&ValidateResponse::accepted()).unwrap();
        assert!(!json.contains("error"));
    }
}
