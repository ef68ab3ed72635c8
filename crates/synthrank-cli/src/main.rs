//! Synthrank CLI
//!
//! The `synthrank` command inspects, validates, re-ranks and replays
//! candidate synthesis rounds.
//!
//! ## Commands
//!
//! - `extract`: Print the draft payload of raw model output
//! - `validate`: Check a round parameters file
//! - `rank`: Re-rank a saved artifact bundle with different options
//! - `replay`: Run a full round offline against canned responses

mod fixture;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use synthrank_core::{
    extract_draft, rerank_artifacts, CallbackSink, DefaultConfigBuilder, RankMode, RankOptions,
    RetryPolicy, RoundArtifacts, RoundEvent, RoundParameters, RoundRunner, RunnerConfig,
};
use tracing::{info, Level};

use crate::fixture::ReplayFixture;

#[derive(Parser)]
#[command(name = "synthrank")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Candidate synthesis and ranking rounds", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the <draft> payload of raw model output
    Extract {
        /// File holding the raw output (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Load and validate a round parameters file (TOML or JSON)
    Validate {
        #[arg(short, long)]
        params: PathBuf,
    },

    /// Re-rank a saved artifact bundle
    Rank {
        /// Artifact bundle (JSON) written by a previous round
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Ranking mode: composite or pareto
        #[arg(long)]
        mode: Option<RankMode>,

        /// Weight of the coverage term (0.0-1.0)
        #[arg(long)]
        coverage_weight: Option<f64>,

        /// Exclude candidates below the coverage threshold
        #[arg(long)]
        gate: bool,

        /// Coverage threshold used with --gate
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of winners
        #[arg(long)]
        top_n: Option<usize>,

        /// Write the re-ranked bundle here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the re-ranked bundle as JSON instead of a summary
        #[arg(long = "print-json")]
        print_json: bool,
    },

    /// Run a round offline against a fixture of canned responses
    Replay {
        #[arg(short, long)]
        params: PathBuf,

        /// JSON fixture with chat, generation, coverage and embedding replies
        #[arg(short, long)]
        fixture: PathBuf,

        /// Where to write the artifact bundle
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    synthrank_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Extract { input } => cmd_extract(input.as_deref()),
        Commands::Validate { params } => cmd_validate(&params),
        Commands::Rank {
            artifacts,
            mode,
            coverage_weight,
            gate,
            threshold,
            top_n,
            output,
            print_json,
        } => {
            let overrides = RankOverrides {
                mode,
                coverage_weight,
                gate,
                threshold,
                top_n,
            };
            cmd_rank(&artifacts, &overrides, output.as_deref(), print_json).map(|_| ())
        }
        Commands::Replay {
            params,
            fixture,
            output,
        } => cmd_replay(&params, &fixture, output.as_deref())
            .await
            .map(|_| ()),
    }
}

/// Print the draft payload of raw model output
fn cmd_extract(input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    println!("{}", extract_draft(&raw));
    Ok(())
}

/// Validate a parameters file and print a summary
fn cmd_validate(path: &Path) -> Result<()> {
    let params = read_params_file(path)?;
    params
        .validate()
        .with_context(|| format!("Invalid parameters in {:?}", path))?;

    println!("Parameters OK: {:?}", path);
    println!("  Source digest:    {}", params.source_digest());
    println!("  Candidates:       {}", params.candidate_models.join(", "));
    if params.anchor_models.is_empty() {
        println!("  Anchors:          (none)");
    } else {
        println!("  Anchors:          {}", params.anchor_models.join(", "));
    }
    println!("  Rank mode:        {}", params.rank_mode);
    println!("  Top N:            {}", params.top_n);
    println!("  Coverage weight:  {}", params.coverage_weight);
    if params.use_gate {
        println!("  Coverage gate:    >= {}", params.coverage_threshold);
    }
    Ok(())
}

/// Command-line overrides applied on top of a bundle's ranking options.
#[derive(Debug, Clone, Default)]
struct RankOverrides {
    mode: Option<RankMode>,
    coverage_weight: Option<f64>,
    gate: bool,
    threshold: Option<f64>,
    top_n: Option<usize>,
}

impl RankOverrides {
    fn apply(&self, base: RankOptions) -> Result<RankOptions> {
        let mut options = base;
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(weight) = self.coverage_weight {
            options.coverage_weight = weight;
        }
        if self.gate {
            options.use_gate = true;
        }
        if let Some(threshold) = self.threshold {
            options.coverage_threshold = threshold;
        }
        if let Some(top_n) = self.top_n {
            options.top_n = top_n;
        }

        options.validate()?;
        Ok(options)
    }
}

/// Re-rank a saved bundle
fn cmd_rank(
    path: &Path,
    overrides: &RankOverrides,
    output: Option<&Path>,
    print_json: bool,
) -> Result<RoundArtifacts> {
    let artifacts: RoundArtifacts = read_json_file(path)?;
    let options = overrides.apply(RankOptions::from_params(&artifacts.params))?;
    let reranked = rerank_artifacts(&artifacts, &options)?;
    info!(
        round_id = %reranked.round_id,
        mode = %options.mode,
        winners = reranked.winners.len(),
        "bundle re-ranked"
    );

    if print_json {
        println!("{}", serde_json::to_string_pretty(&reranked)?);
    } else {
        print_winners(&reranked);
    }
    if let Some(out) = output {
        write_json_file(out, &reranked)?;
        println!("Re-ranked bundle written to {:?}", out);
    }
    Ok(reranked)
}

/// Run a round against a fixture, streaming events as JSON lines
async fn cmd_replay(
    params_path: &Path,
    fixture_path: &Path,
    output: Option<&Path>,
) -> Result<RoundArtifacts> {
    let params = read_params_file(params_path)?;
    let fixture: ReplayFixture = read_json_file(fixture_path)?;
    let runner = RoundRunner::new(
        fixture.collaborators(),
        RunnerConfig::default().with_retry(RetryPolicy::none()),
    );

    let sink = CallbackSink::new(|event: RoundEvent| {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
        }
    });

    let artifacts = runner
        .run_round(&params, &DefaultConfigBuilder, &sink)
        .await
        .context("Round failed")?;

    if let Some(out) = output {
        write_json_file(out, &artifacts)?;
        info!(path = ?out, "artifacts written");
    }
    Ok(artifacts)
}

fn print_winners(artifacts: &RoundArtifacts) {
    println!("Round {}", artifacts.round_id);
    if artifacts.winners.is_empty() {
        println!("No rankable candidates.");
        return;
    }
    for (i, winner) in artifacts.winners.iter().enumerate() {
        println!(
            "{:>2}. {:<24} score={:.4} coverage={} similarity={}",
            i + 1,
            winner.model_id,
            winner.rank_score.unwrap_or(f64::NAN),
            fmt_opt(winner.coverage),
            fmt_opt(winner.norm_similarity),
        );
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

/// Parameters from TOML (`.toml`) or JSON (anything else).
fn read_params_file(path: &Path) -> Result<RoundParameters> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read params file: {:?}", path))?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {:?}", path))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
    }
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}
