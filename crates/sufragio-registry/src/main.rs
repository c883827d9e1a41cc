use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sufragio_crypto::VoterIdentity;
use sufragio_registry::{
    config::default_data_dir, BallotVerifier, EligibilityRoster, GroupRegistry, MerkleRootResponse,
    NullifierLedger, ProofService, RegisterIdentityResponse, RegistryConfig, RegistryStorage,
};
use sufragio_types::{BallotSubmission, Commitment, GroupId, SufragioError, SufragioResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sufragio", about = "Anonymous parish voting registry", version)]
struct Cli {
    /// Path to config.toml (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config and create one group per configured parish
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// List all groups
    Groups,
    /// Create a single group
    CreateGroup {
        parish: String,
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Register an identity commitment in a parish group
    Register {
        cedula: String,
        parish: String,
        /// Hex-encoded identity commitment
        commitment: String,
    },
    /// Show the current merkle root of a parish group
    Root { parish: String },
    /// List the member commitments of a parish group
    Members { parish: String },
    /// Generate a ballot submission for a registered identity
    Prove {
        parish: String,
        /// The vote choice to endorse
        signal: String,
        /// Identity passphrase
        #[arg(long)]
        passphrase: String,
        /// Write the submission JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify a ballot submission file and record acceptance
    Verify {
        /// Path to a submission JSON produced by `prove`
        file: PathBuf,
    },
    /// Show recently accepted ballots
    Ballots {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "info,sufragio_registry=debug,sufragio_crypto=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn resolve_config(cli: &Cli) -> SufragioResult<(PathBuf, RegistryConfig)> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));

    let mut config = if config_path.exists() {
        RegistryConfig::load(&config_path)?
    } else {
        RegistryConfig::default()
    };
    if cli.data_dir.is_some() {
        config.data_dir = data_dir;
    }
    config.validate()?;
    Ok((config_path, config))
}

async fn open_registry(config: &RegistryConfig) -> SufragioResult<(Arc<RegistryStorage>, Arc<GroupRegistry>)> {
    let storage = Arc::new(RegistryStorage::open(
        config.db_path(),
        config.storage.cache_capacity_bytes,
        config.storage.flush_every_ms,
    )?);
    let registry = Arc::new(GroupRegistry::open(Arc::clone(&storage), config.root_history).await?);
    Ok((storage, registry))
}

fn print_json<T: serde::Serialize>(value: &T) -> SufragioResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SufragioError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> SufragioResult<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let (config_path, config) = resolve_config(&cli)?;

    match &cli.command {
        Commands::Init { force } => {
            if config_path.exists() && !force {
                return Err(SufragioError::Config(format!(
                    "Config already exists at {:?}; use --force to overwrite",
                    config_path
                )));
            }
            config.save(&config_path)?;
            std::fs::create_dir_all(&config.data_dir)
                .map_err(|e| SufragioError::Config(format!("Failed to create data dir: {}", e)))?;

            let (_, registry) = open_registry(&config).await?;
            let created = registry
                .bootstrap_parishes(&config.parishes, config.tree_depth)
                .await?;
            info!(created, "Initialized registry");
            println!(
                "Initialized {} groups for election '{}' in {:?}",
                created, config.election, config.data_dir
            );
        }
        Commands::Groups => {
            let (_, registry) = open_registry(&config).await?;
            for group in registry.list_groups().await {
                println!(
                    "{:<24} depth={:<3} members={:<8} id={}",
                    group.parish, group.depth, group.member_count, group.id
                );
            }
        }
        Commands::CreateGroup { parish, depth } => {
            let (_, registry) = open_registry(&config).await?;
            let depth = depth.unwrap_or(config.tree_depth);
            let id = registry.create_group(parish, depth).await?;
            println!("Created group {} for parish '{}'", id, parish);
        }
        Commands::Register {
            cedula,
            parish,
            commitment,
        } => {
            let (_, registry) = open_registry(&config).await?;

            let group_id = match &config.roster_path {
                Some(path) => EligibilityRoster::load(path)?.check(cedula, parish)?,
                None => GroupId::for_parish(parish),
            };

            let commitment = Commitment::from_hex(commitment)?;
            let root = registry.add_member(&group_id, &commitment).await?;
            print_json(&RegisterIdentityResponse::new(&root))?;
        }
        Commands::Root { parish } => {
            let (_, registry) = open_registry(&config).await?;
            let root = registry.get_root(&GroupId::for_parish(parish)).await?;
            print_json(&MerkleRootResponse::new(&root))?;
        }
        Commands::Members { parish } => {
            let (_, registry) = open_registry(&config).await?;
            for member in registry.get_members(&GroupId::for_parish(parish)).await? {
                println!("{}", member);
            }
        }
        Commands::Prove {
            parish,
            signal,
            passphrase,
            out,
        } => {
            let (_, registry) = open_registry(&config).await?;
            let service = ProofService::new(Arc::clone(&registry));
            let identity = VoterIdentity::from_passphrase(passphrase);

            let submission = service
                .request_proof(&identity, &GroupId::for_parish(parish), &config.scope(), signal)
                .await?;

            let json = serde_json::to_string_pretty(&submission)
                .map_err(|e| SufragioError::Serialization(e.to_string()))?;
            match out {
                Some(path) => {
                    std::fs::write(path, json).map_err(|e| {
                        SufragioError::Config(format!("Failed to write submission: {}", e))
                    })?;
                    println!("Submission written to {:?}", path);
                }
                None => println!("{}", json),
            }
        }
        Commands::Verify { file } => {
            let raw = std::fs::read_to_string(file)
                .map_err(|e| SufragioError::Config(format!("Failed to read submission: {}", e)))?;
            let submission: BallotSubmission = serde_json::from_str(&raw)
                .map_err(|e| SufragioError::Serialization(e.to_string()))?;

            let (storage, registry) = open_registry(&config).await?;
            let verifier = BallotVerifier::new(
                Arc::clone(&registry),
                NullifierLedger::new(Arc::clone(&storage)),
                storage,
            );

            match verifier.submit(&submission).await {
                Ok(ballot) => {
                    println!("ACCEPTED signal='{}' nullifier={}", ballot.signal, ballot.nullifier_hash.to_hex());
                }
                Err(e) => {
                    println!("REJECTED: {}", e);
                    return Err(e);
                }
            }
        }
        Commands::Ballots { limit } => {
            let (storage, _) = open_registry(&config).await?;
            for ballot in storage.load_ballots(*limit)? {
                println!(
                    "{} group={} signal='{}' nullifier={}",
                    ballot.accepted_at,
                    ballot.group_id,
                    ballot.signal,
                    ballot.nullifier_hash.to_hex()
                );
            }
        }
    }

    Ok(())
}
