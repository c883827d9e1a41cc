//! The nullifier ledger: the set of `(scope, nullifier)` pairs already
//! accepted. Spending is an atomic test-and-set backed by storage
//! compare-and-swap; under concurrent submission of the same pair,
//! exactly one caller wins and the rest observe `DuplicateVote`.

use crate::storage::{RegistryStorage, SpentNullifier};
use std::sync::Arc;
use sufragio_types::{
    ElectionScope, GroupId, NullifierHash, SufragioError, SufragioResult,
};
use tracing::debug;

pub struct NullifierLedger {
    storage: Arc<RegistryStorage>,
}

impl NullifierLedger {
    pub fn new(storage: Arc<RegistryStorage>) -> Self {
        Self { storage }
    }

    /// Spend a nullifier. The insert is flushed before success is
    /// reported, so an accepted ballot can never be double-counted
    /// across a crash-and-retry.
    pub fn spend(
        &self,
        scope: &ElectionScope,
        hash: &NullifierHash,
        group_id: &GroupId,
        signal_hash: [u8; 32],
    ) -> SufragioResult<()> {
        let record = SpentNullifier {
            group_id: *group_id,
            signal_hash,
            accepted_at: chrono::Utc::now().timestamp(),
        };

        if !self.storage.try_spend(scope, hash, &record)? {
            return Err(SufragioError::DuplicateVote);
        }
        self.storage.flush()?;

        debug!(nullifier = %hash.to_hex(), "Nullifier spent");
        Ok(())
    }

    /// Whether a pair has already been accepted.
    pub fn is_spent(&self, scope: &ElectionScope, hash: &NullifierHash) -> SufragioResult<bool> {
        self.storage.is_spent(scope, hash)
    }

    /// Number of spent nullifiers across all scopes.
    pub fn spent_count(&self) -> usize {
        self.storage.spent_count()
    }
}
