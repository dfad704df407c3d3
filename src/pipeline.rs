// pipeline.rs - Async live pipeline
//
// One tokio task per limb owns that limb's LimbProcessor. Samples, mapping
// changes and re-zero requests all arrive on the same command channel, so a
// calibration can never race a sample update. Processed records go out with
// try_send: a slow consumer loses records, it never stalls fusion.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::axis::AxisMapping;
use crate::calibration::CalibrationOffset;
use crate::config::GaitConfig;
use crate::error::{GaitError, GaitResult};
use crate::limb::LimbProcessor;
use crate::types::{Limb, ProcessedSample, Sample};

#[derive(Debug)]
pub enum LimbCommand {
    Sample(Sample),
    SetMapping(AxisMapping),
    SetOffset(CalibrationOffset),
    Rezero(oneshot::Sender<CalibrationOffset>),
    Reset,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimbStats {
    pub processed: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub steps: u64,
}

async fn run_limb(
    mut processor: LimbProcessor,
    mut rx: mpsc::Receiver<LimbCommand>,
    output: mpsc::Sender<ProcessedSample>,
) -> (LimbProcessor, LimbStats) {
    let limb = processor.limb();
    let mut stats = LimbStats::default();
    let mut output_closed = false;

    log::info!("[{}] limb task started", limb);

    while let Some(command) = rx.recv().await {
        match command {
            LimbCommand::Sample(sample) => {
                let record = processor.process(&sample);
                stats.processed += 1;
                if output_closed {
                    continue;
                }
                match output.try_send(record) {
                    Ok(_) => stats.forwarded += 1,
                    Err(TrySendError::Full(_)) => {
                        // Consumer is behind, drop this record
                        stats.dropped += 1;
                        if stats.dropped % 100 == 1 {
                            log::warn!("[{}] output queue full, {} records dropped", limb, stats.dropped);
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        log::info!("[{}] output consumer gone, continuing without forwarding", limb);
                        output_closed = true;
                    }
                }
            }
            LimbCommand::SetMapping(mapping) => processor.set_mapping(mapping),
            LimbCommand::SetOffset(offset) => processor.set_offset(offset),
            LimbCommand::Rezero(reply) => {
                let offset = processor.rezero();
                let _ = reply.send(offset);
            }
            LimbCommand::Reset => processor.reset(),
        }
    }

    stats.steps = processor.step_count();
    log::info!(
        "[{}] limb task stopped: {} processed, {} forwarded, {} dropped",
        limb,
        stats.processed,
        stats.forwarded,
        stats.dropped
    );
    (processor, stats)
}

pub struct LimbHandle {
    limb: Limb,
    tx: mpsc::Sender<LimbCommand>,
    task: JoinHandle<(LimbProcessor, LimbStats)>,
}

impl LimbHandle {
    pub fn spawn(processor: LimbProcessor, output: mpsc::Sender<ProcessedSample>, capacity: usize) -> Self {
        let limb = processor.limb();
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run_limb(processor, rx, output));
        Self { limb, tx, task }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    async fn command(&self, command: LimbCommand) -> GaitResult<()> {
        self.tx.send(command).await.map_err(|_| GaitError::PipelineClosed(self.limb))
    }

    /// Queue a sample, waiting if the limb task is behind.
    pub async fn send(&self, sample: Sample) -> GaitResult<()> {
        self.command(LimbCommand::Sample(sample)).await
    }

    /// Queue a sample without waiting. Returns false if it was dropped.
    pub fn try_send(&self, sample: Sample) -> bool {
        self.tx.try_send(LimbCommand::Sample(sample)).is_ok()
    }

    pub async fn set_mapping(&self, mapping: AxisMapping) -> GaitResult<()> {
        self.command(LimbCommand::SetMapping(mapping)).await
    }

    pub async fn set_offset(&self, offset: CalibrationOffset) -> GaitResult<()> {
        self.command(LimbCommand::SetOffset(offset)).await
    }

    pub async fn reset(&self) -> GaitResult<()> {
        self.command(LimbCommand::Reset).await
    }

    /// Zero at the attitude reached after every sample queued so far.
    pub async fn rezero(&self) -> GaitResult<CalibrationOffset> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(LimbCommand::Rezero(reply_tx)).await?;
        reply_rx.await.map_err(|_| GaitError::PipelineClosed(self.limb))
    }

    /// Close the command channel and wait for queued work to drain.
    pub async fn shutdown(self) -> GaitResult<(LimbProcessor, LimbStats)> {
        drop(self.tx);
        self.task.await.map_err(|e| GaitError::TaskFailed(e.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub left: LimbStats,
    pub right: LimbStats,
}

pub struct GaitPipeline {
    left: LimbHandle,
    right: LimbHandle,
}

impl GaitPipeline {
    /// Start both limb tasks. The returned receiver carries processed records
    /// from both limbs.
    pub fn spawn(config: &GaitConfig) -> (Self, mpsc::Receiver<ProcessedSample>) {
        let (out_tx, out_rx) = mpsc::channel(config.output_queue_capacity);
        let pipeline = Self {
            left: LimbHandle::spawn(LimbProcessor::new(Limb::Left, config), out_tx.clone(), config.input_queue_capacity),
            right: LimbHandle::spawn(LimbProcessor::new(Limb::Right, config), out_tx, config.input_queue_capacity),
        };
        (pipeline, out_rx)
    }

    pub fn limb(&self, limb: Limb) -> &LimbHandle {
        match limb {
            Limb::Left => &self.left,
            Limb::Right => &self.right,
        }
    }

    pub async fn submit(&self, sample: Sample) -> GaitResult<()> {
        self.limb(sample.limb).send(sample).await
    }

    pub async fn shutdown(self) -> GaitResult<PipelineSummary> {
        let (_, left) = self.left.shutdown().await?;
        let (_, right) = self.right.shutdown().await?;
        Ok(PipelineSummary { left, right })
    }
}
