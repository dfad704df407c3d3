use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use gait_tracker_rs::metrics::SessionReport;
use gait_tracker_rs::pipeline::{GaitPipeline, PipelineSummary};
use gait_tracker_rs::simulator::GaitSimulator;
use gait_tracker_rs::{GaitConfig, Limb, MetricsAggregator, ProcessedSample, Sample};

#[derive(Parser, Debug)]
#[command(name = "gait_tracker")]
#[command(about = "Live gait pipeline over simulated insoles, with a batch report at the end", long_about = None)]
struct Args {
    /// Duration in seconds of simulated walking
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// Sample interval in milliseconds
    #[arg(long, default_value = "50")]
    interval_ms: i64,

    /// Pace samples in wall-clock time instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Re-zero both limbs after this many seconds
    #[arg(long)]
    rezero_after: Option<u64>,

    /// JSON config file (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "gait_sessions")]
    output_dir: String,
}

#[derive(Serialize)]
struct SessionRecording<'a> {
    samples: &'a [Sample],
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    generated_at: String,
    duration_secs: u64,
    pipeline: &'a PipelineSummary,
    records_received: u64,
    report: &'a SessionReport,
}

/// Drains processed records, logging each step as it happens.
async fn consume(mut rx: mpsc::Receiver<ProcessedSample>) -> u64 {
    let mut received = 0u64;
    while let Some(record) = rx.recv().await {
        received += 1;
        if record.is_step {
            let e = record.euler.to_degrees();
            log::info!(
                "[{}] step #{} at {} ms (pitch {:.1}°, roll {:.1}°)",
                record.limb,
                record.step_count,
                record.timestamp_ms,
                e.pitch,
                e.roll
            );
        }
    }
    received
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GaitConfig::from_json_file(path)?,
        None => GaitConfig::default(),
    };

    println!("[{}] Gait Tracker Starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Interval: {} ms", args.interval_ms);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let (pipeline, out_rx) = GaitPipeline::spawn(&config);
    let consumer = tokio::spawn(consume(out_rx));

    let start_ms = Utc::now().timestamp_millis();
    let mut left = GaitSimulator::new(Limb::Left, start_ms).with_interval(args.interval_ms);
    let mut right = GaitSimulator::new(Limb::Right, start_ms).with_interval(args.interval_ms);
    let ticks = (args.duration * 1000) / args.interval_ms.max(1) as u64;
    let rezero_tick = args.rezero_after.map(|s| (s * 1000) / args.interval_ms.max(1) as u64);

    let mut recorded: Vec<Sample> = Vec::with_capacity(ticks as usize * 2);
    let mut pace = interval(Duration::from_millis(args.interval_ms.max(1) as u64));

    for tick in 0..ticks {
        if args.realtime {
            pace.tick().await;
        }
        if Some(tick) == rezero_tick {
            for limb in [Limb::Left, Limb::Right] {
                let offset = pipeline.limb(limb).rezero().await?;
                log::info!("[{}] zero reference set: {:?}", limb, offset.quaternion());
            }
        }

        for sample in [left.next(), right.next()].into_iter().flatten() {
            recorded.push(sample.clone());
            pipeline.submit(sample).await?;
        }

        if tick > 0 && tick % 200 == 0 {
            log::info!("{} samples submitted", recorded.len());
        }
    }

    let summary = pipeline.shutdown().await?;
    let received = consumer.await?;

    println!("[{}] Live pipeline done, running batch analytics...", ts_now());
    let aggregator = MetricsAggregator::new(config);
    let report = {
        let samples = recorded.clone();
        tokio::task::spawn_blocking(move || aggregator.analyze_session(&samples)).await?
    };

    let stamp = ts_now_clean();
    let session_path = format!("{}/session_{}.json", args.output_dir, stamp);
    std::fs::write(&session_path, serde_json::to_string(&SessionRecording { samples: &recorded })?)?;

    let output = ReportOutput {
        generated_at: Utc::now().to_rfc3339(),
        duration_secs: args.duration,
        pipeline: &summary,
        records_received: received,
        report: &report,
    };
    let report_path = format!("{}/report_{}.json", args.output_dir, stamp);
    std::fs::write(&report_path, serde_json::to_string_pretty(&output)?)?;

    println!("[{}] Final save: {} samples to {}", ts_now(), recorded.len(), session_path);
    println!("  Report: {}", report_path);
    println!(
        "  Left:  {} steps, cadence {:.1} spm, contact {:.0} ms",
        report.left.basic.step_count, report.left.basic.cadence, report.left.basic.avg_contact_time_ms
    );
    println!(
        "  Right: {} steps, cadence {:.1} spm, contact {:.0} ms",
        report.right.basic.step_count, report.right.basic.cadence, report.right.basic.avg_contact_time_ms
    );
    println!(
        "  Asymmetry: contact SI {:.1}%, load SI {:.1}% ({:?})",
        report.asymmetry.contact_time_si, report.asymmetry.load_si, report.asymmetry.severity
    );
    if summary.left.dropped + summary.right.dropped > 0 {
        println!("  Dropped records: {}", summary.left.dropped + summary.right.dropped);
    }

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
