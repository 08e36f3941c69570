//! chess-review - engine-backed review of a chess game.
//!
//! Reads the positions of a game, evaluates each one with a UCI engine,
//! labels every move and writes the requested reports.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chess_review::export::{text_report, write_ply_report};
use chess_review::{
    classify, AnalysisOrchestrator, BatchOutcome, EngineChannel, GameStats, Position,
    SavedAnalysis,
};
use clap::{Parser, Subcommand};
use config::ReviewConfig;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chess-review")]
#[command(about = "Engine-backed chess game review")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "review.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every position of a game and classify its moves
    Analyze {
        /// JSON array of {ply, fen, san} positions
        positions: PathBuf,
        /// Search depth per position
        #[arg(short, long)]
        depth: Option<u32>,
        /// Path to the UCI engine
        #[arg(short, long)]
        engine: Option<PathBuf>,
        /// Classification threshold in pawns
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Write the per-ply JSON report here
        #[arg(long)]
        json: Option<PathBuf>,
        /// Write the text report here
        #[arg(long)]
        txt: Option<PathBuf>,
        /// Save the analysis for later reuse
        #[arg(long)]
        save: Option<PathBuf>,
        /// Move text stored alongside a saved analysis
        #[arg(long)]
        moves_text: Option<PathBuf>,
    },
    /// Reclassify a saved analysis without an engine
    Classify {
        /// Saved analysis file
        saved: PathBuf,
        /// Classification threshold in pawns
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// Evaluate a single position
    Eval {
        /// Position in FEN notation
        fen: String,
        /// Search depth
        #[arg(short, long)]
        depth: Option<u32>,
        /// Path to the UCI engine
        #[arg(short, long)]
        engine: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ReviewConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Analyze {
            positions,
            depth,
            engine,
            threshold,
            json,
            txt,
            save,
            moves_text,
        } => {
            let config = config.with_overrides(engine, depth, threshold)?;
            let outputs = Outputs {
                json,
                txt,
                save,
                moves_text,
            };
            analyze(&config, &positions, &outputs).await
        }
        Commands::Classify { saved, threshold } => {
            let config = config.with_overrides(None, None, threshold)?;
            reclassify(&config, &saved)
        }
        Commands::Eval { fen, depth, engine } => {
            let config = config.with_overrides(engine, depth, None)?;
            eval(&config, &fen).await
        }
    }
}

/// Artifacts requested for an analysis run.
struct Outputs {
    json: Option<PathBuf>,
    txt: Option<PathBuf>,
    save: Option<PathBuf>,
    moves_text: Option<PathBuf>,
}

async fn start_engine(config: &ReviewConfig) -> anyhow::Result<EngineChannel> {
    let mut engine = EngineChannel::spawn(&config.engine_path, config.channel_config())
        .with_context(|| format!("starting {}", config.engine_path.display()))?;
    engine.initialize().await?;
    Ok(engine)
}

fn read_positions(path: &Path) -> anyhow::Result<Vec<Position>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

async fn analyze(config: &ReviewConfig, path: &Path, outputs: &Outputs) -> anyhow::Result<()> {
    let positions = read_positions(path)?;
    let engine = start_engine(config).await?;
    info!(
        engine = engine.name(),
        depth = config.depth,
        positions = positions.len(),
        "Starting analysis"
    );

    let orchestrator = Arc::new(AnalysisOrchestrator::new(engine, config.analysis_config()));
    orchestrator.load_game(positions)?;

    // Ctrl-C stops the sweep between positions
    let interrupt = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling analysis");
                orchestrator.cancel_batch();
            }
        }
    });

    let outcome = orchestrator.run_batch().await;
    interrupt.abort();
    let _ = interrupt.await;

    let result = match outcome? {
        BatchOutcome::Completed { analyzed, failed } => {
            if failed > 0 {
                warn!(failed, "Some positions could not be analyzed");
            }
            info!(analyzed, "Analysis complete");
            report(&orchestrator, outputs)
        }
        BatchOutcome::Cancelled { at_ply } => {
            println!("Analysis cancelled at ply {}", at_ply);
            Ok(())
        }
        other => Err(anyhow::anyhow!("unexpected batch outcome: {:?}", other)),
    };

    match Arc::try_unwrap(orchestrator) {
        Ok(orchestrator) => orchestrator.into_evaluator().terminate().await,
        Err(_) => warn!("Engine still in use, leaving it to exit on drop"),
    }
    result
}

fn report(
    orchestrator: &AnalysisOrchestrator<EngineChannel>,
    outputs: &Outputs,
) -> anyhow::Result<()> {
    let positions = orchestrator.positions();
    let history = orchestrator.history();
    let classification = orchestrator.classification();

    let text = text_report(&positions, &history, &classification);
    println!("{}", text);
    println!();
    print_stats(&orchestrator.stats());

    if let Some(path) = &outputs.txt {
        std::fs::write(path, &text).with_context(|| format!("writing {}", path.display()))?;
        println!("Text report written to {}", path.display());
    }
    if let Some(path) = &outputs.json {
        write_ply_report(path, &positions, &history, &classification)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("JSON report written to {}", path.display());
    }
    if let Some(path) = &outputs.save {
        let move_text = match &outputs.moves_text {
            Some(source) => std::fs::read_to_string(source)
                .with_context(|| format!("reading {}", source.display()))?,
            None => String::new(),
        };
        orchestrator
            .export(move_text)
            .write(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Analysis saved to {}", path.display());
    }
    Ok(())
}

fn reclassify(config: &ReviewConfig, path: &Path) -> anyhow::Result<()> {
    let saved = SavedAnalysis::read(path).with_context(|| format!("reading {}", path.display()))?;
    if saved.evaluation_history.is_empty() {
        bail!("{} contains no evaluations", path.display());
    }

    let classification = classify(&saved.evaluation_history, config.thresholds());
    for (ply, label) in &classification.labels {
        println!("{:>4}  {}", ply, label);
    }
    println!();

    let last_ply = saved
        .evaluation_history
        .iter()
        .map(|(ply, _)| ply)
        .max()
        .unwrap_or(0);
    print_stats(&classification.stats(last_ply));
    Ok(())
}

async fn eval(config: &ReviewConfig, fen: &str) -> anyhow::Result<()> {
    let mut engine = start_engine(config).await?;
    let result = engine.evaluate(fen, config.depth).await;
    engine.terminate().await;

    let result = result?;
    let best = if result.bestmove.is_empty() {
        "(none)"
    } else {
        result.bestmove.as_str()
    };
    println!("Eval: {}  Best: {}", result, best);
    Ok(())
}

fn print_stats(stats: &GameStats) {
    println!("Moves:        {}", stats.total_moves);
    println!("Blunders:     {}", stats.blunders);
    println!("Inaccuracies: {}", stats.inaccuracies);
    println!("Dubious:      {}", stats.dubious);
    println!("Accuracy:     {:.1}%", stats.accuracy_percent);
}
