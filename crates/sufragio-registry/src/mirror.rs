//! Seam for the optional on-chain membership mirror.
//!
//! The chain client itself is an external collaborator; this trait is
//! the contract the registry holds it to. Transport failures must map
//! to `ExternalService` so callers can retry them, and only them, with
//! backoff.

use async_trait::async_trait;
use std::collections::HashMap;
use sufragio_types::{Commitment, GroupId, MerkleRoot, SufragioResult};
use tokio::sync::RwLock;

#[async_trait]
pub trait RootMirror: Send + Sync {
    /// Submit a member addition to the mirrored group.
    async fn publish_member(
        &self,
        group_id: &GroupId,
        commitment: &Commitment,
    ) -> SufragioResult<()>;

    /// Fetch the mirrored root, or `None` if the group is not mirrored.
    async fn fetch_root(&self, group_id: &GroupId) -> SufragioResult<Option<MerkleRoot>>;
}

/// In-process mirror double for tests and demos.
#[derive(Default)]
pub struct InMemoryMirror {
    members: RwLock<HashMap<GroupId, Vec<Commitment>>>,
    roots: RwLock<HashMap<GroupId, MerkleRoot>>,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the mirrored root for a group, e.g. to simulate divergence.
    pub async fn set_root(&self, group_id: &GroupId, root: MerkleRoot) {
        self.roots.write().await.insert(*group_id, root);
    }

    pub async fn member_count(&self, group_id: &GroupId) -> usize {
        self.members
            .read()
            .await
            .get(group_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RootMirror for InMemoryMirror {
    async fn publish_member(
        &self,
        group_id: &GroupId,
        commitment: &Commitment,
    ) -> SufragioResult<()> {
        self.members
            .write()
            .await
            .entry(*group_id)
            .or_default()
            .push(*commitment);
        Ok(())
    }

    async fn fetch_root(&self, group_id: &GroupId) -> SufragioResult<Option<MerkleRoot>> {
        Ok(self.roots.read().await.get(group_id).copied())
    }
}
