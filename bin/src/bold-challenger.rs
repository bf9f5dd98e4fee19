use anyhow::{anyhow, Result};
use bold_challenger_driver::TrackerConfig;
use bold_challenger_tree::TreeError;
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

mod snapshot;
use snapshot::{Replay, Snapshot};

/// Arguments for the `bold-challenger` binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count, env = "VERBOSITY")]
    v: u8,

    /// The JSON challenge snapshot to inspect.
    #[arg(
        long,
        short,
        help = "The JSON challenge snapshot to inspect.",
        env = "BOLD_CHALLENGER_SNAPSHOT"
    )]
    snapshot: PathBuf,

    /// The block number timers are computed at.
    #[arg(
        long,
        short,
        help = "The block number timers are computed at.",
        env = "BOLD_CHALLENGER_BLOCK"
    )]
    block: u64,

    /// An optional JSON tracker config. Only the validator name is used offline.
    #[arg(
        long,
        short,
        help = "An optional JSON tracker config.",
        env = "BOLD_CHALLENGER_CONFIG"
    )]
    config: Option<PathBuf>,
}

/// The timers of a royal edge at the inspected block.
#[derive(Serialize, Debug)]
struct EdgeReport {
    name: String,
    challenge_level: u8,
    start_height: u64,
    end_height: u64,
    rivaled: bool,
    local_timer: u64,
    inherited_timer: Option<u64>,
    /// Ancestor names, from the parent up to the block challenge root.
    ancestors: Option<Vec<String>>,
}

/// The confirmability of the block challenge root edge at the inspected block.
#[derive(Serialize, Debug)]
struct RootReport {
    name: String,
    root_inherited_timer: Option<u64>,
    confirmable: bool,
    essential_paths: usize,
    min_path_weight: u64,
    challenge_period: u64,
}

#[derive(Serialize, Debug)]
struct Report {
    block: u64,
    royal_edges: Vec<EdgeReport>,
    root: Option<RootReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command arguments
    let Args {
        v,
        snapshot,
        block,
        config,
    } = Args::parse();

    // Initialize the tracing subscriber
    init_tracing_subscriber(v)?;

    let config = match config {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::default(),
    };
    let snapshot = Snapshot::from_json_file(&snapshot)?;
    tracing::info!(
        target: "bold-challenger-cli",
        "Loaded challenge snapshot with {} edges for assertion {}",
        snapshot.edges.len(),
        snapshot.assertion_hash
    );

    let replay = snapshot.replay(&config.validator_name).await?;
    let report = Report {
        block,
        royal_edges: report_edges(&replay, block),
        root: report_root(&replay, snapshot.challenge_period, block).await?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn report_edges(replay: &Replay, block: u64) -> Vec<EdgeReport> {
    let tree = &replay.tree;
    let mut edges = tree.royal_edges();
    edges.sort_by(|a, b| {
        a.challenge_level
            .cmp(&b.challenge_level)
            .then(a.start_height.cmp(&b.start_height))
            .then(a.end_height.cmp(&b.end_height))
    });

    edges
        .into_iter()
        .map(|edge| {
            let name = replay.name(&edge.id);
            let local_timer = tree.local_timer(&edge, block);
            let inherited_timer = tree
                .inherited_timer(&edge.id, block)
                .map_err(|err| {
                    tracing::warn!(target: "bold-challenger-cli", "No inherited timer for {name}: {err}")
                })
                .ok();
            let ancestors = tree
                .compute_ancestors(&edge.id, block)
                .map(|ancestors| {
                    ancestors
                        .iter()
                        .map(|ancestor| replay.name(&ancestor.edge.id))
                        .collect::<Vec<_>>()
                })
                .map_err(|err| {
                    tracing::warn!(target: "bold-challenger-cli", "No ancestors for {name}: {err}")
                })
                .ok();
            tracing::info!(
                target: "bold-challenger-cli",
                edge = %name,
                challenge_level = %edge.challenge_level,
                local_timer,
                inherited_timer = ?inherited_timer,
                ancestors = ?ancestors,
                "Royal edge"
            );
            EdgeReport {
                name,
                challenge_level: edge.challenge_level.0,
                start_height: edge.start_height,
                end_height: edge.end_height,
                rivaled: tree.has_rival(&edge),
                local_timer,
                inherited_timer,
                ancestors,
            }
        })
        .collect()
}

async fn report_root(
    replay: &Replay,
    challenge_period: u64,
    block: u64,
) -> Result<Option<RootReport>> {
    let tree = &replay.tree;
    let root = match tree.block_challenge_root_edge() {
        Ok(root) => root,
        Err(err) if err.is_not_yet_available() => {
            tracing::warn!(target: "bold-challenger-cli", "No royal block challenge root edge: {err}");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let name = replay.name(&root.id);
    let root_inherited_timer = match tree.compute_root_inherited_timer(block).await {
        Ok(timer) => Some(timer),
        Err(err) if TreeError::is_not_yet_available_err(&err) => None,
        Err(err) => return Err(err),
    };
    let confirmability = match tree.is_confirmable_essential_edge(&root.id, challenge_period, block)
    {
        Ok(confirmability) => confirmability,
        Err(err) if err.is_not_yet_available() => {
            tracing::warn!(target: "bold-challenger-cli", "Essential paths of {name} incomplete: {err}");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    tracing::info!(
        target: "bold-challenger-cli",
        edge = %name,
        confirmable = confirmability.confirmable,
        min_path_weight = confirmability.min_weight,
        challenge_period,
        "Checked block challenge root edge"
    );
    Ok(Some(RootReport {
        name,
        root_inherited_timer,
        confirmable: confirmability.confirmable,
        essential_paths: confirmability.paths.len(),
        min_path_weight: confirmability.min_weight,
        challenge_period,
    }))
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
