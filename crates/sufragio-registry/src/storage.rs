//! sled-backed persistence for the registry: group descriptors, ordered
//! member rows, the nullifier ledger, and an accepted-ballot audit
//! trail. Membership and spent nullifiers survive process restarts.

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use sufragio_types::{
    AcceptedBallot, Commitment, ElectionScope, GroupId, NullifierHash, SufragioError,
    SufragioResult,
};
use tracing::info;

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"__schema_version__";

/// Persisted group descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGroup {
    pub parish: String,
    pub depth: u32,
    pub member_count: u64,
    pub created_at: i64,
}

/// Persisted record of a spent nullifier. Carries no member identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpentNullifier {
    pub group_id: GroupId,
    pub signal_hash: [u8; 32],
    pub accepted_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaInfo {
    version: u32,
    created_at: i64,
}

pub struct RegistryStorage {
    db: Db,
    schema: Tree,
    groups: Tree,
    members: Tree,
    nullifiers: Tree,
    ballots: Tree,
}

impl RegistryStorage {
    /// Open (or create) the registry database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        cache_capacity_bytes: u64,
        flush_every_ms: Option<u64>,
    ) -> SufragioResult<Self> {
        let path = path.as_ref();
        info!("Opening registry storage at {:?}", path);

        let db = sled::Config::new()
            .path(path)
            .cache_capacity(cache_capacity_bytes)
            .flush_every_ms(flush_every_ms)
            .open()
            .map_err(|e| SufragioError::Storage(format!("Failed to open database: {}", e)))?;

        let storage = Self::from_db(db)?;
        storage.ensure_schema()?;
        Ok(storage)
    }

    /// Ephemeral in-memory database for tests.
    pub fn in_memory() -> SufragioResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| SufragioError::Storage(format!("Failed to open temp database: {}", e)))?;
        let storage = Self::from_db(db)?;
        storage.ensure_schema()?;
        Ok(storage)
    }

    fn from_db(db: Db) -> SufragioResult<Self> {
        let schema = Self::open_tree(&db, "schema")?;
        let groups = Self::open_tree(&db, "groups")?;
        let members = Self::open_tree(&db, "members")?;
        let nullifiers = Self::open_tree(&db, "nullifiers")?;
        let ballots = Self::open_tree(&db, "ballots")?;

        Ok(Self {
            db,
            schema,
            groups,
            members,
            nullifiers,
            ballots,
        })
    }

    fn open_tree(db: &Db, name: &str) -> SufragioResult<Tree> {
        db.open_tree(name)
            .map_err(|e| SufragioError::Storage(format!("Failed to open {} tree: {}", name, e)))
    }

    fn ensure_schema(&self) -> SufragioResult<()> {
        match self
            .schema
            .get(SCHEMA_KEY)
            .map_err(|e| SufragioError::Storage(format!("Failed to read schema: {}", e)))?
        {
            Some(bytes) => {
                let info: SchemaInfo = bincode::deserialize(&bytes)
                    .map_err(|e| SufragioError::Storage(format!("Bad schema record: {}", e)))?;
                if info.version != CURRENT_SCHEMA_VERSION {
                    return Err(SufragioError::Storage(format!(
                        "Unsupported schema version {} (expected {})",
                        info.version, CURRENT_SCHEMA_VERSION
                    )));
                }
                Ok(())
            }
            None => {
                let info = SchemaInfo {
                    version: CURRENT_SCHEMA_VERSION,
                    created_at: chrono::Utc::now().timestamp(),
                };
                let bytes = bincode::serialize(&info)
                    .map_err(|e| SufragioError::Storage(format!("Schema serialize: {}", e)))?;
                self.schema
                    .insert(SCHEMA_KEY, bytes)
                    .map_err(|e| SufragioError::Storage(format!("Schema write: {}", e)))?;
                self.flush()
            }
        }
    }

    // ---- groups ----

    pub fn put_group(&self, id: &GroupId, group: &StoredGroup) -> SufragioResult<()> {
        let bytes = bincode::serialize(group)
            .map_err(|e| SufragioError::Serialization(e.to_string()))?;
        self.groups
            .insert(id.as_bytes(), bytes)
            .map_err(|e| SufragioError::Storage(format!("Failed to store group: {}", e)))?;
        Ok(())
    }

    pub fn get_group(&self, id: &GroupId) -> SufragioResult<Option<StoredGroup>> {
        match self
            .groups
            .get(id.as_bytes())
            .map_err(|e| SufragioError::Storage(format!("Failed to load group: {}", e)))?
        {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes)
                    .map_err(|e| SufragioError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn load_groups(&self) -> SufragioResult<Vec<(GroupId, StoredGroup)>> {
        let mut out = Vec::new();
        for entry in self.groups.iter() {
            let (key, value) = entry
                .map_err(|e| SufragioError::Storage(format!("Failed to iterate groups: {}", e)))?;
            let mut id = [0u8; 32];
            if key.len() != 32 {
                return Err(SufragioError::Storage("Invalid group key".into()));
            }
            id.copy_from_slice(&key);
            let group: StoredGroup = bincode::deserialize(&value)
                .map_err(|e| SufragioError::Serialization(e.to_string()))?;
            out.push((GroupId::from_bytes(id), group));
        }
        Ok(out)
    }

    // ---- members ----

    fn member_key(group: &GroupId, index: u64) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..32].copy_from_slice(group.as_bytes());
        key[32..].copy_from_slice(&index.to_be_bytes());
        key
    }

    pub fn append_member(
        &self,
        group: &GroupId,
        index: u64,
        commitment: &Commitment,
    ) -> SufragioResult<()> {
        self.members
            .insert(Self::member_key(group, index), commitment.as_bytes())
            .map_err(|e| SufragioError::Storage(format!("Failed to store member: {}", e)))?;
        Ok(())
    }

    /// Load a group's members in insertion order. Big-endian index keys
    /// make lexicographic iteration order the numeric order.
    pub fn load_members(&self, group: &GroupId) -> SufragioResult<Vec<Commitment>> {
        let mut out = Vec::new();
        for entry in self.members.scan_prefix(group.as_bytes()) {
            let (_, value) = entry
                .map_err(|e| SufragioError::Storage(format!("Failed to iterate members: {}", e)))?;
            if value.len() != 32 {
                return Err(SufragioError::Storage("Invalid member row".into()));
            }
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&value);
            out.push(Commitment::from_bytes(bytes));
        }
        Ok(out)
    }

    // ---- nullifiers ----

    fn nullifier_key(scope: &ElectionScope, hash: &NullifierHash) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(scope.as_bytes());
        key[32..].copy_from_slice(hash.as_bytes());
        key
    }

    /// Atomic test-and-set of a `(scope, nullifier)` pair. Returns
    /// `Ok(true)` for the single caller that inserted it, `Ok(false)` if
    /// it was already present. The double-vote guard; there is no
    /// check-then-insert variant.
    pub fn try_spend(
        &self,
        scope: &ElectionScope,
        hash: &NullifierHash,
        record: &SpentNullifier,
    ) -> SufragioResult<bool> {
        let value = bincode::serialize(record)
            .map_err(|e| SufragioError::Serialization(e.to_string()))?;
        let outcome = self
            .nullifiers
            .compare_and_swap(
                Self::nullifier_key(scope, hash),
                None::<&[u8]>,
                Some(value),
            )
            .map_err(|e| SufragioError::Storage(format!("Failed to spend nullifier: {}", e)))?;
        Ok(outcome.is_ok())
    }

    pub fn is_spent(&self, scope: &ElectionScope, hash: &NullifierHash) -> SufragioResult<bool> {
        self.nullifiers
            .contains_key(Self::nullifier_key(scope, hash))
            .map_err(|e| SufragioError::Storage(format!("Failed to read nullifier: {}", e)))
    }

    pub fn spent_count(&self) -> usize {
        self.nullifiers.len()
    }

    // ---- accepted ballots (audit trail) ----

    pub fn record_ballot(&self, ballot: &AcceptedBallot) -> SufragioResult<()> {
        let mut key = [0u8; 40];
        key[..8].copy_from_slice(&ballot.accepted_at.to_be_bytes());
        key[8..].copy_from_slice(ballot.nullifier_hash.as_bytes());
        let value = bincode::serialize(ballot)
            .map_err(|e| SufragioError::Serialization(e.to_string()))?;
        self.ballots
            .insert(key, value)
            .map_err(|e| SufragioError::Storage(format!("Failed to record ballot: {}", e)))?;
        Ok(())
    }

    pub fn load_ballots(&self, limit: usize) -> SufragioResult<Vec<AcceptedBallot>> {
        let mut out = Vec::with_capacity(limit);
        for entry in self.ballots.iter().rev().take(limit) {
            let (_, value) = entry
                .map_err(|e| SufragioError::Storage(format!("Failed to iterate ballots: {}", e)))?;
            out.push(
                bincode::deserialize(&value)
                    .map_err(|e| SufragioError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn flush(&self) -> SufragioResult<()> {
        self.db
            .flush()
            .map_err(|e| SufragioError::Storage(format!("Flush error: {}", e)))?;
        Ok(())
    }
}
