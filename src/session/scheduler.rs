//! The sampling and recording tasks of one running session.
//!
//! Each monitored resource kind runs as its own task around a shared
//! wall-clock-anchored ticker, so a slow sampler (the CPU measurement
//! window) never delays the other kinds. Within one kind, samples are
//! strictly sequential; the next tick's sample only starts after the
//! previous one finished. All samples funnel into the recorder task, the
//! single owner of the session's sink.
//!
//! Cancellation is cooperative and tick-aligned: the stop signal is
//! checked before a tick's sample begins, never raced against a sample in
//! flight, so an in-flight sample is always completed and handed to the
//! recorder before the task winds down.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::procfs::KindSampler;
use crate::procfs::stats::{ResourceKind, Sample, Scope};
use crate::recorder::SampleSink;

use super::now_ms;

/// Events raised toward the session supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ControlEvent {
    /// A process-scoped sampler found its target gone.
    TargetExited { kind: ResourceKind },
    /// The recorder exhausted its failure budget.
    SinkFailure,
}

/// Final accounting of the recorder task.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct RecorderStats {
    pub written: u64,
    pub failures: u64,
}

/// Drives periodic sampling of one resource kind until the session ends.
///
/// Ticks are anchored at `start + n * interval`; missed ticks are skipped
/// rather than replayed, so a stall never produces a catch-up burst. The
/// optional deadline is re-checked against the wall clock at every tick
/// rather than enforced as a hard timeout, which keeps it from truncating
/// a sample in flight.
pub(super) async fn run_sampler(
    mut sampler: KindSampler,
    scope: Scope,
    start: Instant,
    interval: Duration,
    deadline: Option<Instant>,
    mut stop: watch::Receiver<bool>,
    samples: mpsc::Sender<Sample>,
    control: mpsc::Sender<ControlEvent>,
) {
    let kind = sampler.kind();
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => {
                log::debug!("{kind} sampler observed stop request");
                break;
            }
            _ = ticker.tick() => {}
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                log::debug!("{kind} sampler reached the session duration");
                break;
            }
        }

        match sampler.sample().await {
            Ok(values) => {
                let sample = Sample::new(now_ms(), tick, kind, scope, values);
                if samples.send(sample).await.is_err() {
                    // The recorder is gone; the session is coming down.
                    break;
                }
                tick += 1;
            }
            Err(err) if scope == Scope::Process && err.is_unavailable() => {
                log::warn!("{kind} sample failed, target process likely exited: {err}");
                let _ = control.send(ControlEvent::TargetExited { kind }).await;
                break;
            }
            Err(err) => {
                log::warn!("skipping {kind} sample: {err}");
            }
        }
    }
}

/// Owns the session's sink and drains the sample channel into it.
///
/// A failed append keeps the sample queued and retries it in front of the
/// next one; `failure_threshold` consecutive failures raise
/// [`ControlEvent::SinkFailure`] and abandon the sink. Below the
/// threshold, failures are counted but sampling is unaffected.
///
/// Once the channel closes (every sampler task has ended), queued samples
/// get a final chance before the sink is finalized, so samples in flight
/// at stop time still reach the stream.
pub(super) async fn run_recorder<S: SampleSink>(
    mut sink: S,
    mut samples: mpsc::Receiver<Sample>,
    failure_threshold: u32,
    control: mpsc::Sender<ControlEvent>,
) -> RecorderStats {
    let mut stats = RecorderStats::default();
    let mut consecutive_failures: u32 = 0;
    let mut pending: VecDeque<Sample> = VecDeque::new();

    'recv: while let Some(sample) = samples.recv().await {
        pending.push_back(sample);
        while let Some(front) = pending.front() {
            match sink.append(front).await {
                Ok(()) => {
                    pending.pop_front();
                    stats.written += 1;
                    consecutive_failures = 0;
                }
                Err(err) => {
                    stats.failures += 1;
                    consecutive_failures += 1;
                    log::error!("failed to append sample to record stream: {err}");
                    if consecutive_failures >= failure_threshold {
                        log::error!(
                            "record failure threshold ({failure_threshold}) reached, forcing session stop"
                        );
                        let _ = control.send(ControlEvent::SinkFailure).await;
                        break 'recv;
                    }
                    break;
                }
            }
        }
    }

    while consecutive_failures < failure_threshold {
        let Some(front) = pending.front() else { break };
        match sink.append(front).await {
            Ok(()) => {
                pending.pop_front();
                stats.written += 1;
                consecutive_failures = 0;
            }
            Err(err) => {
                stats.failures += 1;
                consecutive_failures += 1;
                log::error!("failed to append sample to record stream: {err}");
            }
        }
    }

    if let Err(err) = sink.finalize().await {
        log::error!("failed to finalize record stream: {err}");
    }

    stats
}
