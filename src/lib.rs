//! procwatch: a system and process performance monitor.
//!
//! The monitor samples CPU, memory, disk I/O and network counters from the
//! proc filesystem on a fixed wall-clock interval, for the whole system or
//! for one process resolved by name, and appends every sample to a durable
//! per-session record stream for later inspection.

use std::path::PathBuf;

pub mod config;
pub mod error;
pub mod fsutil;
pub mod process;
pub mod procfs;
pub mod recorder;
pub mod session;

use config::MonitorConfig;
use error::ResultOkLogExt;
use recorder::Summary;
use session::{Session, SessionRegistry, SessionState};

/// Runs the procwatch application: one monitoring session, driven until it
/// ends on its own (duration, target exit, sink failure) or an interrupt
/// arrives.
///
/// The configuration is loaded from the JSON file named by the
/// `PROCWATCH_CONFIG` environment variable; without it, the defaults apply
/// (system scope, all resource kinds, one-second interval, unbounded).
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded or the session
/// fails to start (invalid configuration, unresolvable process name,
/// unreadable procfs, sink creation failure).
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var_os("PROCWATCH_CONFIG") {
        Some(path) => MonitorConfig::load(PathBuf::from(path))?,
        None => MonitorConfig::default(),
    };

    let registry = SessionRegistry::new();
    let handle = Session::start(config).await?;
    log::info!("record stream: {}", handle.record_path().display());

    let mut state = handle.state_watch();
    let id = registry.register(handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, stopping session");
        }
        _ = state.wait_for(|state| matches!(*state, SessionState::Stopped(_))) => {}
    }

    let Some(handle) = registry.remove(id) else {
        return Ok(());
    };
    let report = handle.stop().await;

    if let Some(records) = recorder::read_records(&report.record_path).ok_log() {
        let summary = Summary::from_records(&records);
        for (kind, metric, stats) in summary.iter() {
            log::info!(
                "{kind}/{metric}: count={} min={:.3} mean={:.3} max={:.3}",
                stats.count(),
                stats.min(),
                stats.mean(),
                stats.max(),
            );
        }
    }

    Ok(())
}
