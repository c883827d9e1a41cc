#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ledger;
pub mod mirror;
pub mod registry;
pub mod roster;
pub mod service;
pub mod storage;
pub mod verifier;
pub mod wire;

pub use config::{RegistryConfig, StorageSettings, DEFAULT_PARISHES};
pub use ledger::NullifierLedger;
pub use mirror::{InMemoryMirror, RootMirror};
pub use registry::GroupRegistry;
pub use roster::EligibilityRoster;
pub use service::ProofService;
pub use storage::{RegistryStorage, SpentNullifier, StoredGroup};
pub use verifier::{BallotVerifier, VerifyStage};
pub use wire::{
    MerkleRootResponse, RegisterIdentityRequest, RegisterIdentityResponse, ValidateRequest,
    ValidateResponse,
};
