//! Registry configuration: data directory, election identifier, tree
//! sizing, root freshness window, and the parish list used for
//! bootstrap. Loaded from TOML and validated before anything opens.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sufragio_types::{ElectionScope, SufragioError, SufragioResult, DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH};

/// The 31 urban parishes of the pilot deployment.
pub const DEFAULT_PARISHES: &[&str] = &[
    "Belisario Quevedo",
    "Carcelén",
    "Centro Histórico",
    "Chilibulo",
    "Chillogallo",
    "Chimbacalle",
    "Cochapamba",
    "Comité del Pueblo",
    "Concepción",
    "Cotocollao",
    "El Condado",
    "El Inca",
    "Guamaní",
    "Iñaquito",
    "Itchimbía",
    "Jipijapa",
    "Kennedy",
    "La Argelia",
    "La Ecuatoriana",
    "La Ferroviaria",
    "La Libertad",
    "La Mena",
    "Magdalena",
    "Mariscal Sucre",
    "Ponceano",
    "Puengasí",
    "Quitumbe",
    "Rumipamba",
    "San Bartolo",
    "San Juan",
    "Solanda",
];

const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub cache_capacity_bytes: u64,
    pub flush_every_ms: Option<u64>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY,
            flush_every_ms: Some(DEFAULT_FLUSH_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Where the sled database lives.
    pub data_dir: PathBuf,
    /// Election identifier; the nullifier scope derives from it, so one
    /// identity gets one accepted ballot per election.
    pub election: String,
    /// Merkle tree depth for newly created groups.
    pub tree_depth: usize,
    /// How many superseded roots remain acceptable at verification
    /// time. 0 means exact-match against the current root only.
    pub root_history: usize,
    /// Parishes to create groups for at init time.
    pub parishes: Vec<String>,
    /// Optional path to the eligibility roster JSON.
    pub roster_path: Option<PathBuf>,
    pub storage: StorageSettings,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            election: "municipal-2025".to_string(),
            tree_depth: DEFAULT_TREE_DEPTH,
            root_history: 0,
            parishes: DEFAULT_PARISHES.iter().map(|s| s.to_string()).collect(),
            roster_path: None,
            storage: StorageSettings::default(),
        }
    }
}

/// Default to `~/.sufragio`, falling back to a relative directory when
/// no home is resolvable (containers).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sufragio"))
        .unwrap_or_else(|| PathBuf::from("sufragio-data"))
}

impl RegistryConfig {
    pub fn load(path: impl AsRef<Path>) -> SufragioResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SufragioError::Config(format!("Failed to read config: {}", e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| SufragioError::Config(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SufragioResult<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| SufragioError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SufragioError::Config(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path.as_ref(), raw)
            .map_err(|e| SufragioError::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> SufragioResult<()> {
        if self.election.trim().is_empty() {
            return Err(SufragioError::Config("Election identifier is empty".into()));
        }
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(SufragioError::InvalidDepth(self.tree_depth));
        }
        if self.parishes.is_empty() {
            return Err(SufragioError::Config("No parishes configured".into()));
        }
        Ok(())
    }

    /// The nullifier scope for the configured election.
    pub fn scope(&self) -> ElectionScope {
        ElectionScope::for_election(&self.election)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }
}
