use thiserror::Error;

/// Protocol error taxonomy. Every variant is recoverable by the caller;
/// only `ExternalService` is worth retrying.
#[derive(Error, Debug)]
pub enum SufragioError {
    /// A group with this identifier already exists.
    #[error("Group already exists: {0}")]
    DuplicateGroup(String),

    /// No group is registered under this identifier.
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// The group has reached its 2^depth member capacity.
    #[error("Group {group} is full ({capacity} members)")]
    GroupFull {
        /// Parish name of the full group.
        group: String,
        /// Maximum member count for the group's tree depth.
        capacity: u64,
    },

    /// Tree depth outside the supported 1..=MAX_TREE_DEPTH range.
    #[error("Invalid tree depth: {0}")]
    InvalidDepth(usize),

    /// The commitment is already a member of the group.
    #[error("Commitment already registered in group: {0}")]
    DuplicateCommitment(String),

    /// The identity's commitment is not in the group, so no membership
    /// witness can be constructed.
    #[error("Identity is not a member of group: {0}")]
    NotAMember(String),

    /// The claimed root is neither the current root nor within the
    /// configured recent-root window.
    #[error("Stale or unknown merkle root for group: {0}")]
    StaleOrInvalidRoot(String),

    /// The zero-knowledge proof failed cryptographic verification or its
    /// public values do not match the submission.
    #[error("Membership proof rejected")]
    InvalidProof,

    /// A ballot with this nullifier was already accepted for this
    /// election. Carries no member information.
    #[error("A ballot was already accepted for this election")]
    DuplicateVote,

    /// The national id is not on the electoral roster.
    #[error("National id is not on the electoral roster")]
    UnknownVoter,

    /// The national id belongs to a different parish than requested.
    #[error("National id is not registered in the requested parish")]
    WrongParish,

    /// The locally computed root disagrees with the mirrored root.
    #[error("Local root diverges from mirrored root for group: {0}")]
    RootDivergence(String),

    /// Failure talking to an external collaborator (chain, network).
    #[error("External service failure: {0}")]
    ExternalService(String),

    /// Storage error: {0}
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error: {0}
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error: {0}
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Configuration error: {0}
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SufragioError {
    /// Whether a caller should retry with backoff. Only transient
    /// external failures qualify; cryptographic and logical rejections
    /// are final.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }
}

/// Convenience alias used across all sufragio crates.
pub type SufragioResult<T> = Result<T, SufragioError>;
