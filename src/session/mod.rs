//! The monitoring session lifecycle.
//!
//! A session is one bounded monitoring run: `IDLE -> RUNNING -> STOPPED`,
//! with `STOPPED` terminal. [`Session::start`] performs everything that can
//! fail up front (validation, process resolution, sampler setup, sink
//! creation) and hands back a [`SessionHandle`] to a running session; the
//! spawned supervisor task turns the first decisive event (explicit stop
//! request, duration drained, target exited, sink failure threshold) into
//! exactly one terminal [`StopReason`].
//!
//! On the way down, sampler tasks are joined first so in-flight samples
//! land in the recorder, then the recorder drains and finalizes the sink.
//! The record stream of a stopped session stays on disk and readable no
//! matter which reason stopped it.

mod error;
mod registry;
mod scheduler;

pub use error::StartError;
pub use registry::{SessionId, SessionRegistry};

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::config::MonitorConfig;
use crate::procfs::stats::{Sample, Scope};
use crate::procfs::{KindSampler, Target};
use crate::process::ProcessTable;
use crate::recorder::{self, CsvRecorder, SampleSink};

use scheduler::{ControlEvent, RecorderStats};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `request_stop` was called on the handle.
    Requested,
    /// The configured monitoring duration ran out.
    DurationElapsed,
    /// A process-scoped sample found the target gone.
    TargetExited,
    /// Consecutive record write failures exceeded the configured threshold.
    RecordFailureThreshold,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::Requested => "explicit stop request",
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::TargetExited => "target process exited",
            StopReason::RecordFailureThreshold => "record failure threshold exceeded",
        };
        f.write_str(reason)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped(StopReason),
}

/// Final accounting of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: StopReason,
    pub samples_written: u64,
    pub record_failures: u64,
    pub record_path: PathBuf,
    pub started_ms: u64,
    pub stopped_ms: u64,
}

/// Entry point for starting monitoring sessions.
pub struct Session;

impl Session {
    /// Validates the configuration, resolves the target and starts
    /// sampling.
    ///
    /// For process scope, resolution must succeed before anything else
    /// happens; system scope never blocks on resolution. The record stream
    /// is created under `config.record_dir`, named after the session
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns a [`StartError`] when the configuration is invalid, the
    /// process name resolves to no live process, a sampler source cannot
    /// be opened, or the record stream cannot be created. No session
    /// enters the running state in any of these cases.
    pub async fn start(config: MonitorConfig) -> Result<SessionHandle, StartError> {
        config.validate()?;
        let target = resolve_target(&config)?;
        let started_ms = now_ms();

        tokio::fs::create_dir_all(&config.record_dir)
            .await
            .map_err(|source| StartError::RecordDir {
                path: config.record_dir.clone(),
                source,
            })?;

        let process = target.pid().map(|pid| {
            (
                config.process_name.as_deref().unwrap_or_default(),
                pid.as_raw(),
            )
        });
        let record_path = config
            .record_dir
            .join(recorder::stream_file_name(process, started_ms));
        let sink = CsvRecorder::create(record_path.clone()).await?;

        Self::launch(config, target, sink, record_path, started_ms)
    }

    /// Spawns the sampling, recording and supervising tasks over an
    /// already-created sink.
    fn launch<S>(
        config: MonitorConfig,
        target: Target,
        sink: S,
        record_path: PathBuf,
        started_ms: u64,
    ) -> Result<SessionHandle, StartError>
    where
        S: SampleSink + Send + 'static,
    {
        let mut samplers = Vec::with_capacity(config.resource_kinds.len());
        for kind in &config.resource_kinds {
            samplers.push(KindSampler::open(
                *kind,
                target,
                &config.proc_root,
                config.cpu_window(),
            )?);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let (sample_tx, sample_rx) = mpsc::channel::<Sample>(64);
        let (control_tx, control_rx) = mpsc::channel::<ControlEvent>(8);

        let recorder_task = tokio::spawn(scheduler::run_recorder(
            sink,
            sample_rx,
            config.record_failure_threshold,
            control_tx.clone(),
        ));

        let start = Instant::now();
        let deadline = config.duration().map(|duration| start + duration);
        let scope = target.scope();

        let mut samplers_set = JoinSet::new();
        for sampler in samplers {
            samplers_set.spawn(scheduler::run_sampler(
                sampler,
                scope,
                start,
                config.interval(),
                deadline,
                stop_rx.clone(),
                sample_tx.clone(),
                control_tx.clone(),
            ));
        }
        // The tasks hold the only live senders from here on; the channels
        // close exactly when the last task ends.
        drop(sample_tx);
        drop(control_tx);
        drop(stop_rx);

        let kinds: Vec<&str> = config
            .resource_kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect();
        log::info!(
            "monitoring session started: scope={scope}, target={target:?}, kinds=[{}], interval={}s",
            kinds.join(","),
            config.interval_seconds,
        );

        let supervisor = tokio::spawn(supervise(
            samplers_set,
            recorder_task,
            control_rx,
            stop_tx.clone(),
            state_tx,
            record_path.clone(),
            started_ms,
        ));

        Ok(SessionHandle {
            stop: stop_tx,
            state: state_rx,
            record_path,
            done: supervisor,
        })
    }
}

/// A running (or just-stopped) monitoring session.
#[derive(Debug)]
pub struct SessionHandle {
    stop: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    record_path: PathBuf,
    done: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Requests a stop. Takes effect at the next tick boundary; samples in
    /// flight complete and get recorded first.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// The session's current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A watch on the lifecycle state, for waiting on session end without
    /// consuming the handle.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Path of this session's record stream.
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Waits for the session to end and returns the final report.
    pub async fn wait(self) -> SessionReport {
        self.done.await.expect("session supervisor task panicked")
    }

    /// Requests a stop and waits for the final report.
    pub async fn stop(self) -> SessionReport {
        self.request_stop();
        self.wait().await
    }
}

fn resolve_target(config: &MonitorConfig) -> Result<Target, StartError> {
    if config.scope != Scope::Process {
        return Ok(Target::System);
    }

    // validate() guarantees the name is present and non-empty.
    let name = config.process_name.as_deref().unwrap_or_default();
    let table = ProcessTable::new(&config.proc_root);
    match table.find_by_name(name)? {
        Some(pid) => {
            log::info!("resolved process `{name}` to pid {pid}");
            Ok(Target::Process(pid))
        }
        None => {
            log::error!("no live process named `{name}`");
            Err(StartError::Resolution(name.to_owned()))
        }
    }
}

/// Waits for the first decisive event, then winds the session down in
/// order: broadcast stop, join samplers (in-flight samples land), let the
/// recorder drain and finalize, publish the terminal state.
async fn supervise(
    mut samplers: JoinSet<()>,
    recorder_task: JoinHandle<RecorderStats>,
    mut control: mpsc::Receiver<ControlEvent>,
    stop: watch::Sender<bool>,
    state: watch::Sender<SessionState>,
    record_path: PathBuf,
    started_ms: u64,
) -> SessionReport {
    let mut stop_rx = stop.subscribe();

    let reason = loop {
        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                break StopReason::Requested;
            }
            event = control.recv() => match event {
                Some(ControlEvent::TargetExited { kind }) => {
                    log::warn!("stopping session: target exited (detected by {kind} sampler)");
                    break StopReason::TargetExited;
                }
                Some(ControlEvent::SinkFailure) => {
                    break StopReason::RecordFailureThreshold;
                }
                // Control closing means every task has already ended.
                None => break StopReason::DurationElapsed,
            },
            joined = samplers.join_next() => match joined {
                Some(result) => {
                    if let Err(err) = result {
                        log::error!("sampler task panicked: {err}");
                    }
                    if samplers.is_empty() {
                        break StopReason::DurationElapsed;
                    }
                }
                None => break StopReason::DurationElapsed,
            },
        }
    };

    stop.send_replace(true);
    while samplers.join_next().await.is_some() {}

    // All sample senders are dropped now; the recorder drains what is
    // queued, finalizes the sink and reports its accounting.
    let stats = match recorder_task.await {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("recorder task panicked: {err}");
            RecorderStats::default()
        }
    };

    let report = SessionReport {
        reason,
        samples_written: stats.written,
        record_failures: stats.failures,
        record_path,
        started_ms,
        stopped_ms: now_ms(),
    };

    state.send_replace(SessionState::Stopped(reason));
    log::info!(
        "monitoring session stopped ({reason}): {} samples recorded, {} write failures",
        stats.written,
        stats.failures,
    );

    report
}

/// Milliseconds since the UNIX epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::procfs::stats::ResourceKind;
    use crate::process::Pid;
    use std::time::Duration;

    fn fake_proc_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().expect("failed to create temp proc root");
        std::fs::write(
            root.path().join("stat"),
            "cpu  100 0 50 800 50 0 0 0 0 0\n",
        )
        .unwrap();
        std::fs::write(
            root.path().join("meminfo"),
            "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    250 kB\nBuffers:          10 kB\nCached:           20 kB\n",
        )
        .unwrap();
        std::fs::write(
            root.path().join("diskstats"),
            "   8       0 sda 1000 0 8000 0 500 0 4000 0 0 0 0\n",
        )
        .unwrap();
        std::fs::create_dir(root.path().join("net")).unwrap();
        std::fs::write(
            root.path().join("net/dev"),
            concat!(
                "Inter-|   Receive                                                |  Transmit\n",
                " face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
                "  eth0: 100 10 0 0 0 0 0 0 200 20 0 0 0 0 0 0\n",
            ),
        )
        .unwrap();
        root
    }

    fn test_config(proc_root: &std::path::Path, record_dir: &std::path::Path) -> MonitorConfig {
        MonitorConfig {
            resource_kinds: vec![ResourceKind::Cpu, ResourceKind::Memory],
            interval_seconds: 0.05,
            cpu_window_ms: 10,
            proc_root: proc_root.to_path_buf(),
            record_dir: record_dir.to_path_buf(),
            ..MonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_duration_bounded_session() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let config = MonitorConfig {
            duration_seconds: Some(0.23),
            ..test_config(proc_root.path(), record_dir.path())
        };

        let handle = Session::start(config).await.unwrap();
        assert_eq!(handle.state(), SessionState::Running);
        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("session did not end within its duration");

        assert_eq!(report.reason, StopReason::DurationElapsed);
        assert!(report.started_ms <= report.stopped_ms);

        let records = recorder::read_records(&report.record_path).unwrap();
        assert_eq!(records.len() as u64, report.samples_written);

        // Five anchored ticks fit into 230ms at a 50ms interval; allow one
        // tick of scheduling slack either way.
        for kind in [ResourceKind::Cpu, ResourceKind::Memory] {
            let of_kind: Vec<_> = records.iter().filter(|r| r.kind == kind).collect();
            assert!(
                (4..=6).contains(&of_kind.len()),
                "{kind}: expected about 5 samples, got {}",
                of_kind.len()
            );

            // Tick indices are contiguous from zero and timestamps never
            // step backwards within a kind.
            for (idx, record) in of_kind.iter().enumerate() {
                assert_eq!(record.tick, idx as u64);
            }
            for pair in of_kind.windows(2) {
                assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
            }
        }
    }

    #[tokio::test]
    async fn test_stop_request_ends_unbounded_session() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let config = test_config(proc_root.path(), record_dir.path());
        let handle = Session::start(config).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let report = tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop request was not honored");

        assert_eq!(report.reason, StopReason::Requested);
        assert!(report.samples_written >= 1);

        // The stream stays readable after the session stopped.
        let records = recorder::read_records(&report.record_path).unwrap();
        assert_eq!(records.len() as u64, report.samples_written);
    }

    #[tokio::test]
    async fn test_state_watch_observes_stop() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let config = MonitorConfig {
            duration_seconds: Some(0.12),
            ..test_config(proc_root.path(), record_dir.path())
        };

        let handle = Session::start(config).await.unwrap();
        let mut state = handle.state_watch();
        let state = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let SessionState::Stopped(reason) = *state.borrow() {
                    break SessionState::Stopped(reason);
                }
                if state.changed().await.is_err() {
                    break *state.borrow();
                }
            }
        })
        .await
        .expect("state never became stopped");

        assert_eq!(state, SessionState::Stopped(StopReason::DurationElapsed));
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_process_resolution_failure_blocks_start() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let config = MonitorConfig {
            scope: Scope::Process,
            process_name: Some("no-such-process".to_owned()),
            resource_kinds: vec![ResourceKind::Cpu, ResourceKind::Memory],
            ..test_config(proc_root.path(), record_dir.path())
        };

        let err = Session::start(config).await.unwrap_err();
        assert!(matches!(err, StartError::Resolution(name) if name == "no-such-process"));

        // Nothing was recorded: resolution fails before the sink exists.
        assert_eq!(std::fs::read_dir(record_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_blocks_start() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let config = MonitorConfig {
            resource_kinds: vec![],
            ..test_config(proc_root.path(), record_dir.path())
        };

        assert!(matches!(
            Session::start(config).await,
            Err(StartError::Config(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_target_exit_stops_session() {
        let record_dir = tempfile::tempdir().unwrap();

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn helper process");
        let pid = Pid::new(child.id());

        let config = MonitorConfig {
            scope: Scope::Process,
            process_name: Some("sleep".to_owned()),
            resource_kinds: vec![ResourceKind::Cpu, ResourceKind::Memory],
            interval_seconds: 0.05,
            cpu_window_ms: 10,
            record_dir: record_dir.path().to_path_buf(),
            ..MonitorConfig::default()
        };

        let started_ms = now_ms();
        let record_path = record_dir.path().join(recorder::stream_file_name(
            Some(("sleep", pid.as_raw())),
            started_ms,
        ));
        let sink = CsvRecorder::create(record_path.clone()).await.unwrap();
        let handle =
            Session::launch(config, Target::Process(pid), sink, record_path, started_ms)
                .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        child.kill().expect("failed to kill helper process");
        child.wait().expect("failed to reap helper process");

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("session did not notice the target exit");

        assert_eq!(report.reason, StopReason::TargetExited);

        // Samples recorded before the exit survive it.
        let records = recorder::read_records(&report.record_path).unwrap();
        assert_eq!(records.len() as u64, report.samples_written);
        assert!(records.iter().all(|r| r.scope == Scope::Process));
    }

    mod sink_failures {
        use super::*;
        use std::collections::HashSet;

        /// A sink failing on a scripted set of append calls (1-based).
        struct ScriptedSink {
            fail_on: HashSet<u64>,
            fail_from: Option<u64>,
            calls: u64,
        }

        impl ScriptedSink {
            fn failing_on(calls: impl IntoIterator<Item = u64>) -> Self {
                Self {
                    fail_on: calls.into_iter().collect(),
                    fail_from: None,
                    calls: 0,
                }
            }

            fn always_failing() -> Self {
                Self {
                    fail_on: HashSet::new(),
                    fail_from: Some(1),
                    calls: 0,
                }
            }
        }

        impl SampleSink for ScriptedSink {
            async fn append(&mut self, _sample: &Sample) -> recorder::Result<()> {
                self.calls += 1;
                let fail = self.fail_on.contains(&self.calls)
                    || self.fail_from.is_some_and(|from| self.calls >= from);
                if fail {
                    Err(recorder::Error::Append(std::io::Error::other(
                        "injected write failure",
                    )))
                } else {
                    Ok(())
                }
            }

            async fn finalize(&mut self) -> recorder::Result<()> {
                Ok(())
            }
        }

        #[tokio::test]
        async fn test_failures_below_threshold_do_not_stop() {
            let proc_root = fake_proc_root();
            let record_dir = tempfile::tempdir().unwrap();

            let config = MonitorConfig {
                resource_kinds: vec![ResourceKind::Memory],
                interval_seconds: 0.03,
                record_failure_threshold: 3,
                ..test_config(proc_root.path(), record_dir.path())
            };

            let sink = ScriptedSink::failing_on([2, 3]);
            let handle = Session::launch(
                config,
                Target::System,
                sink,
                record_dir.path().join("scripted.csv"),
                now_ms(),
            )
            .unwrap();

            tokio::time::sleep(Duration::from_millis(250)).await;
            let report = tokio::time::timeout(Duration::from_secs(5), handle.stop())
                .await
                .expect("stop request was not honored");

            // Two consecutive failures under a threshold of three: the
            // session keeps running until we stop it, and the failed
            // sample is retried rather than dropped.
            assert_eq!(report.reason, StopReason::Requested);
            assert_eq!(report.record_failures, 2);
            assert!(report.samples_written >= 3);
        }

        #[tokio::test]
        async fn test_threshold_exceeded_forces_stop() {
            let proc_root = fake_proc_root();
            let record_dir = tempfile::tempdir().unwrap();

            let config = MonitorConfig {
                resource_kinds: vec![ResourceKind::Memory],
                interval_seconds: 0.03,
                record_failure_threshold: 3,
                ..test_config(proc_root.path(), record_dir.path())
            };

            let sink = ScriptedSink::always_failing();
            let handle = Session::launch(
                config,
                Target::System,
                sink,
                record_dir.path().join("scripted.csv"),
                now_ms(),
            )
            .unwrap();

            let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
                .await
                .expect("threshold breach did not stop the session");

            assert_eq!(report.reason, StopReason::RecordFailureThreshold);
            assert_eq!(report.samples_written, 0);
            assert!(report.record_failures >= 3);
        }
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let proc_root = fake_proc_root();
        let record_dir = tempfile::tempdir().unwrap();

        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let handle = Session::start(test_config(proc_root.path(), record_dir.path()))
            .await
            .unwrap();
        let id = registry.register(handle);
        assert_eq!(registry.len(), 1);

        registry.request_stop_all();
        let handle = registry.remove(id).expect("session should be registered");
        assert!(registry.is_empty());
        assert!(registry.remove(id).is_none());

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("stop-all was not honored");
        assert_eq!(report.reason, StopReason::Requested);
    }
}
