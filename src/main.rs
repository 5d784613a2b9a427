use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tzcluster_rs::micheline::ScriptShapeError;
use tzcluster_rs::{
    analyze_script, decode, encode, hash_key, pack, unpack, ClusterReport, Clusterer, Comparator,
    ComparatorConfig, CompareError, ContractMeta, DecodeError, Fingerprint, FingerprintError,
    ForgeError, MemoryStore, Micheline, ProjectId,
};

#[derive(Parser)]
#[command(name = "tzcluster", version, about = "Michelson contract codec and project clustering")]
struct Cli {
    /// Comparator configuration (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode hex Micheline bytes to JSON
    Decode {
        #[arg(value_name = "HEX")]
        input: String,
        /// Expect a packed value (0x05 marker)
        #[arg(long)]
        unpack: bool,
    },
    /// Encode Micheline JSON to hex
    Encode { json: String },
    /// Pack Micheline JSON (0x05 marker + encoding)
    Pack { json: String },
    /// Expression hash of a packed value
    HashKey { json: String },
    /// Fingerprint the sections of a script
    Fingerprint {
        #[arg(long, value_name = "FILE")]
        script: PathBuf,
    },
    /// Build contract metadata from a script
    Analyze {
        #[arg(long, value_name = "FILE")]
        script: PathBuf,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "mainnet")]
        network: String,
        #[arg(long)]
        manager: Option<String>,
    },
    /// Compare two contract metadata files
    Compare {
        a: PathBuf,
        b: PathBuf,
        /// Include per-metric scores
        #[arg(long)]
        breakdown: bool,
    },
    /// Cluster contracts (JSON lines of contract metadata) into projects
    Cluster {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ScriptShapeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("cluster task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Serialize)]
struct CompareOutput {
    same: bool,
    score: f64,
    calibration: tzcluster_rs::Calibration,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<BTreeMap<&'static str, f64>>,
}

#[derive(Serialize)]
struct Assignment<'a> {
    address: &'a str,
    network: &'a str,
    project_id: Option<ProjectId>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => ComparatorConfig::from_file(path)?,
        None => ComparatorConfig::default(),
    };

    match cli.command {
        Command::Decode { input, unpack: packed } => {
            let value = if packed {
                let bytes = hex::decode(input.trim().trim_start_matches("0x"))
                    .map_err(|_| DecodeError::InvalidHex)?;
                unpack(&bytes)?
            } else {
                decode(&input)?
            };
            println!("{value}");
        }
        Command::Encode { json } => {
            let value: Micheline = json.parse()?;
            println!("{}", hex::encode(encode(&value)?));
        }
        Command::Pack { json } => {
            let value: Micheline = json.parse()?;
            println!("{}", hex::encode(pack(&value)?));
        }
        Command::HashKey { json } => {
            let value: Micheline = json.parse()?;
            println!("{}", hash_key(&value)?);
        }
        Command::Fingerprint { script } => {
            let script: Micheline = read_to_string(&script)?.parse()?;
            let fingerprint = Fingerprint::from_script(&script)?;
            println!("{}", serde_json::to_string_pretty(&fingerprint)?);
        }
        Command::Analyze {
            script,
            address,
            network,
            manager,
        } => {
            let script: Micheline = read_to_string(&script)?.parse()?;
            let meta = analyze_script(&address, &network, manager.as_deref(), &script)?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Command::Compare { a, b, breakdown } => {
            let comparator = Comparator::new(config)?;
            let a: ContractMeta = serde_json::from_str(&read_to_string(&a)?)?;
            let b: ContractMeta = serde_json::from_str(&read_to_string(&b)?)?;
            let score = comparator.score(&a, &b)?;
            let output = CompareOutput {
                same: score.same,
                score: score.score,
                calibration: score.calibration,
                metrics: breakdown.then(|| comparator.breakdown(&a, &b).into_iter().collect()),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Cluster { input } => {
            let comparator = Comparator::new(config)?;
            let contracts = read_contracts(&input)?;
            for (network, report) in cluster_networks(comparator, contracts).await? {
                debug!(
                    network = %network,
                    assigned = report.assigned.len(),
                    pending = report.pending.len(),
                    "network_clustered"
                );
                for contract in report.assigned.iter().chain(&report.pending) {
                    let line = Assignment {
                        address: &contract.address,
                        network: &contract.network,
                        project_id: contract.project_id,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
            }
        }
    }
    Ok(())
}

fn read_to_string(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_contracts(path: &Path) -> Result<Vec<ContractMeta>, CliError> {
    read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(CliError::from))
        .collect()
}

/// Cluster each network on its own blocking task. Networks never share a
/// bucket; within a network contracts are processed in input order.
async fn cluster_networks(
    comparator: Comparator,
    contracts: Vec<ContractMeta>,
) -> Result<Vec<(String, ClusterReport)>, CliError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_network: HashMap<String, Vec<ContractMeta>> = HashMap::new();
    for contract in contracts {
        if !by_network.contains_key(&contract.network) {
            order.push(contract.network.clone());
        }
        by_network
            .entry(contract.network.clone())
            .or_default()
            .push(contract);
    }

    let mut tasks = JoinSet::new();
    for (network, contracts) in by_network {
        let comparator = comparator.clone();
        tasks.spawn_blocking(move || {
            info!(network = %network, contracts = contracts.len(), "clustering_network");
            let mut clusterer = Clusterer::new(comparator, MemoryStore::new());
            let report = clusterer.process_all(contracts);
            (network, report)
        });
    }

    let mut reports: HashMap<String, ClusterReport> = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (network, report) = joined?;
        reports.insert(network, report);
    }

    Ok(order
        .into_iter()
        .filter_map(|network| reports.remove(&network).map(|r| (network, r)))
        .collect())
}
