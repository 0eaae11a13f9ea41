use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reorder_engine::infrastructure::{convert_file, TraceReader};
use reorder_engine::{
    parse_trace, verify_windows, ParsedTrace, PredictorConfig, RacePool, TraceContext, WindowConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reorder CLI
/// Predictive data-race detection over recorded traces
#[derive(Parser)]
#[command(name = "reorder", version)]
#[command(about = "Predict data races and check sequential consistency of recorded traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict races between conflicting accesses
    Predict {
        /// Binary trace file
        input: PathBuf,
        /// Print every racing pair and per-pair diagnostics
        #[arg(short, long)]
        verbose: bool,
        /// Write one witness file per race
        #[arg(short, long)]
        witness: bool,
        /// Directory for witness files
        #[arg(short, long, default_value = "witness")]
        output_dir: PathBuf,
        /// Worker threads (defaults to hardware concurrency)
        #[arg(short = 'p', long)]
        threads: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the trace has a sequentially consistent explanation
    Verify {
        /// Binary trace file
        input: PathBuf,
        /// Events per window
        #[arg(short = 's', long, default_value_t = 2)]
        window_size: usize,
        /// Per-window diagnostics
        #[arg(short, long)]
        verbose: bool,
        /// Estimate the search cost of each window by random walks
        #[arg(short, long)]
        estimate: bool,
        /// Seed for the cost estimate
        #[arg(long, requires = "estimate")]
        seed: Option<u64>,
    },
    /// Convert a text trace into the binary format
    Convert {
        /// Text trace, one `<kind> <thread> <name> <value>` per line
        input: PathBuf,
        /// Directory receiving the binary trace
        output_dir: PathBuf,
    },
    /// Print a binary trace, one event per line
    Dump {
        /// Binary trace file
        input: PathBuf,
    },
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Commands::Predict { verbose, .. } | Commands::Verify { verbose, .. } => *verbose,
            Commands::Convert { .. } | Commands::Dump { .. } => false,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.verbose());

    match cli.command {
        Commands::Predict {
            input,
            verbose,
            witness,
            output_dir,
            threads,
            json,
        } => {
            let config = PredictorConfig {
                verbose,
                witness,
                output_dir,
                threads,
            };
            predict(input, config, json)
        }
        Commands::Verify {
            input,
            window_size,
            verbose,
            estimate,
            seed,
        } => verify(
            input,
            WindowConfig {
                window_size,
                verbose,
                estimate,
                seed,
            },
        ),
        Commands::Convert { input, output_dir } => {
            let output = convert_file(&input, &output_dir)
                .with_context(|| format!("failed to convert {}", input.display()))?;
            println!("{}", output.display());
            Ok(())
        }
        Commands::Dump { input } => dump(input),
    }
}

fn predict(input: PathBuf, config: PredictorConfig, json: bool) -> Result<()> {
    let started = Instant::now();
    let verbose = config.verbose;

    let parsed = parse_trace(&input).with_context(|| format!("failed to read {}", input.display()))?;
    info!(threads = parsed.events.len(), events = parsed.len(), "trace loaded");

    let ParsedTrace { events, raw_ids } = parsed;
    let ctx = Arc::new(TraceContext::build(events));
    let pool = RacePool::new(ctx, config)
        .context("invalid predictor configuration")?
        .with_thread_ids(raw_ids);
    let report = pool.run();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Num races: {}", report.num_races());
    if verbose {
        for race in &report.races {
            println!(
                "{} {} ({} / {}, {} nodes)",
                race.first_seq, race.second_seq, race.first, race.second, race.nodes_explored
            );
        }
    }
    println!("Time: {} ms", started.elapsed().as_millis());
    Ok(())
}

fn verify(input: PathBuf, config: WindowConfig) -> Result<()> {
    let started = Instant::now();
    let mut reader =
        TraceReader::open(&input).with_context(|| format!("failed to open {}", input.display()))?;
    let report = verify_windows(&mut reader, &config)
        .with_context(|| format!("failed to verify {}", input.display()))?;

    println!("{}", if report.consistent { "consistent" } else { "not consistent" });
    if let Some(cost) = report.estimated_cost {
        println!("Estimated cost: {cost:.0}");
    }
    println!("Time: {} ms", started.elapsed().as_millis());
    Ok(())
}

fn dump(input: PathBuf) -> Result<()> {
    let reader =
        TraceReader::open(&input).with_context(|| format!("failed to open {}", input.display()))?;
    for event in reader {
        let event = event.with_context(|| format!("failed to read {}", input.display()))?;
        println!("{event}");
    }
    Ok(())
}
