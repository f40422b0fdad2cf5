//! Betatron controller CLI
//!
//! Runs the momentum controller against the closed-form proxy objective and
//! commits every iteration either in memory or to the instrument command
//! files.
//!
//! ```bash
//! betatron --iterations 40 \
//!     --mirror-file mirror_command/mirror_change.txt \
//!     --dispersion-file dazzler_command/dispersion.txt
//! ```

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bt_actuators::CommandFileSink;
use bt_optimizer::{
    ActuatorSink, IterationDriver, IterationResult, MomentumOptimizer, RecordingSink,
    SumCoupledProxy,
};
use bt_types::ControllerConfig;

#[derive(Parser, Debug)]
#[command(name = "betatron")]
#[command(about = "Momentum gradient descent over focus and dispersion commands")]
struct Args {
    /// JSON controller configuration (defaults to the beamline reference setup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured iteration limit
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Deformable-mirror command file (focus is slot 0)
    #[arg(long, requires = "dispersion_file")]
    mirror_file: Option<PathBuf>,

    /// Pulse-shaper command file (dispersion is the order2 line)
    #[arg(long, requires = "mirror_file")]
    dispersion_file: Option<PathBuf>,

    /// Start from the values currently in the command files
    #[arg(long, requires = "mirror_file")]
    seed_from_files: bool,

    /// Write the run summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write every iteration result as a JSON line
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(&args)
}

fn run(args: &Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ControllerConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ControllerConfig::reference(),
    };
    if let Some(n) = args.iterations {
        config.iteration_limit = n;
    }

    let mut sink: Box<dyn ActuatorSink> = match (&args.mirror_file, &args.dispersion_file) {
        (Some(mirror), Some(dispersion)) => {
            let files = CommandFileSink::reference(mirror, dispersion);
            if args.seed_from_files {
                for (name, value) in files.read_current()? {
                    if let Some(track) = config.track_mut(&name) {
                        info!("Seeding {} from command file: {}", name, value);
                        track.initial_value = value;
                    }
                }
            }
            Box::new(files)
        }
        _ => Box::new(RecordingSink::new()),
    };
    config.validate()?;

    let (tx, rx) = unbounded::<IterationResult>();
    let mut optimizer = MomentumOptimizer::new(&config)?.with_observer(tx);
    let mut evaluator = SumCoupledProxy::new(config.tracks.iter().map(|t| t.name.clone()));

    let driver = IterationDriver::from_config(&config);
    let outcome = driver.run(&mut optimizer, &mut evaluator, &mut sink);

    if let Some(path) = &args.trace {
        let mut file = fs::File::create(path)
            .with_context(|| format!("creating trace {}", path.display()))?;
        for result in rx.try_iter() {
            writeln!(file, "{}", serde_json::to_string(&result)?)?;
        }
        info!("Iteration trace written to {}", path.display());
    }

    let summary = match &outcome {
        Ok(summary) => summary,
        Err(failure) => failure.summary.as_ref(),
    };
    if let Some(best) = &summary.best {
        println!(
            "best count {:.4} at iteration {}: {:?}",
            best.objective, best.iteration, best.command
        );
    }
    println!("final command: {:?}", summary.final_command);

    if let Some(path) = &args.summary {
        fs::write(path, serde_json::to_string_pretty(summary)?)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!("Run summary written to {}", path.display());
    }

    outcome?;
    Ok(())
}
