use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use flate2::read::GzDecoder;
use serde::Deserialize;

use gait_tracker_rs::{GaitConfig, GaitError, Limb, MetricsAggregator, Sample};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LimbArg {
    Left,
    Right,
}

impl From<LimbArg> for Limb {
    fn from(arg: LimbArg) -> Limb {
        match arg {
            LimbArg::Left => Limb::Left,
            LimbArg::Right => Limb::Right,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Batch gait analytics over a recorded session", long_about = None)]
struct Args {
    /// Path to session_*.json[.gz] recording
    #[arg(long)]
    session: PathBuf,

    /// JSON config file (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analyze a single limb instead of the full two-limb report
    #[arg(long, value_enum)]
    limb: Option<LimbArg>,

    /// Override the contact threshold
    #[arg(long)]
    contact_threshold: Option<f64>,
}

#[derive(Deserialize)]
struct SessionFile {
    samples: Vec<Sample>,
}

fn load_session(path: &Path) -> anyhow::Result<SessionFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GaitConfig::from_json_file(path)?,
        None => GaitConfig::default(),
    };
    if let Some(threshold) = args.contact_threshold {
        config.contact_threshold = threshold;
    }
    config.validate()?;

    let mut session = load_session(&args.session).with_context(|| format!("loading {}", args.session.display()))?;
    // Analytics expects time order within each limb
    session.samples.sort_by_key(|s| s.timestamp_ms);
    log::info!("Loaded {} samples from {}", session.samples.len(), args.session.display());

    let cancel = Arc::new(AtomicBool::new(false));
    let aggregator = MetricsAggregator::new(config);
    let worker_cancel = cancel.clone();
    let limb = args.limb.map(Limb::from);

    let mut work = tokio::task::spawn_blocking(move || -> Result<String, GaitError> {
        let json = match limb {
            Some(limb) => {
                let samples: Vec<Sample> = session.samples.into_iter().filter(|s| s.limb == limb).collect();
                serde_json::to_string_pretty(&aggregator.analyze_cancellable(&samples, &worker_cancel)?)?
            }
            None => serde_json::to_string_pretty(&aggregator.analyze_session_cancellable(&session.samples, &worker_cancel)?)?,
        };
        Ok(json)
    });

    let result = tokio::select! {
        result = &mut work => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling analysis...");
            cancel.store(true, Ordering::Relaxed);
            work.await?
        }
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(GaitError::Cancelled) => eprintln!("Analysis cancelled"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
