//! Core types for representing one timestamped resource reading.
//!
//! The stat submodules parse individual procfs files into strongly typed
//! counter structs; this module wraps one such reading into a [`Sample`],
//! the immutable record the scheduler stamps and the recorder persists.
//!
//! # Main types
//!
//! - [`ResourceKind`] / [`Scope`]: which resource class a sample describes
//!   and whether it covers the whole system or one process.
//! - [`SampleValues`]: enum over the typed per-kind value structs, with an
//!   ordered `metrics()` projection used by the record stream.
//! - [`Sample`]: timestamp + per-kind tick index + kind + scope + values.

mod cpu;
mod disk;
mod error;
mod io;
mod memory;
mod net;
mod parser;

pub use cpu::{CLOCK_TICKS_PER_SEC, CpuSample, CpuTimes, ProcessCpuTimes};
pub use disk::DiskIoStat;
pub use error::StatParseError;
pub use io::ProcessIoStat;
pub use memory::{MemInfo, ProcessMemory, ProcessMemorySample, SystemMemorySample};
pub use net::NetIoStat;
pub use parser::{KeyValueStat, SingleLineStat};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of resource a sample describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
    DiskIo,
    NetworkIo,
}

impl ResourceKind {
    /// All resource kinds, in their canonical order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Cpu,
        ResourceKind::Memory,
        ResourceKind::DiskIo,
        ResourceKind::NetworkIo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::DiskIo => "disk_io",
            ResourceKind::NetworkIo => "network_io",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

/// Whether a sample pertains to the whole system or one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    System,
    Process,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Process => "process",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Scope::System),
            "process" => Ok(Scope::Process),
            other => Err(UnknownVariant(other.to_owned())),
        }
    }
}

/// Error for parsing a [`ResourceKind`] or [`Scope`] label.
#[derive(Debug, thiserror::Error)]
#[error("unknown variant `{0}`")]
pub struct UnknownVariant(pub String);

/// One metric value. Counters are exact integers (byte and operation
/// counts); gauges are fractional (percentages).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

impl MetricValue {
    /// The value as a float, for statistics over mixed metric sets.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Counter(v) => v as f64,
            MetricValue::Gauge(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(v) => write!(f, "{v}"),
            MetricValue::Gauge(v) => write!(f, "{v:.3}"),
        }
    }
}

impl FromStr for MetricValue {
    type Err = std::num::ParseFloatError;

    /// Parses a metric value back from its record-stream form. Values with
    /// a fractional part become gauges, everything else a counter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(counter) = s.parse::<u64>() {
            return Ok(MetricValue::Counter(counter));
        }
        s.parse::<f64>().map(MetricValue::Gauge)
    }
}

/// The typed values of one sample, by resource kind and scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValues {
    Cpu(CpuSample),
    SystemMemory(SystemMemorySample),
    ProcessMemory(ProcessMemorySample),
    DiskIo(DiskIoStat),
    NetworkIo(NetIoStat),
}

impl SampleValues {
    /// The sample's metrics as ordered name/value pairs, the order being
    /// the record-stream column order for the variant.
    pub fn metrics(&self) -> Vec<(&'static str, MetricValue)> {
        use MetricValue::{Counter, Gauge};

        match *self {
            SampleValues::Cpu(cpu) => vec![
                ("cpu_percent", Gauge(cpu.total_percent)),
                ("user_percent", Gauge(cpu.user_percent)),
                ("system_percent", Gauge(cpu.system_percent)),
            ],
            SampleValues::SystemMemory(mem) => vec![
                ("total_bytes", Counter(mem.total_bytes)),
                ("used_bytes", Counter(mem.used_bytes)),
                ("available_bytes", Counter(mem.available_bytes)),
                ("used_percent", Gauge(mem.used_percent)),
            ],
            SampleValues::ProcessMemory(mem) => vec![
                ("rss_bytes", Counter(mem.rss_bytes)),
                ("vms_bytes", Counter(mem.vms_bytes)),
                ("rss_percent", Gauge(mem.rss_percent)),
            ],
            SampleValues::DiskIo(disk) => vec![
                ("read_ops", Counter(disk.read_ops)),
                ("write_ops", Counter(disk.write_ops)),
                ("read_bytes", Counter(disk.read_bytes)),
                ("write_bytes", Counter(disk.write_bytes)),
            ],
            SampleValues::NetworkIo(net) => vec![
                ("rx_bytes", Counter(net.rx_bytes)),
                ("rx_packets", Counter(net.rx_packets)),
                ("rx_errs", Counter(net.rx_errs)),
                ("rx_drop", Counter(net.rx_drop)),
                ("tx_bytes", Counter(net.tx_bytes)),
                ("tx_packets", Counter(net.tx_packets)),
                ("tx_errs", Counter(net.tx_errs)),
                ("tx_drop", Counter(net.tx_drop)),
            ],
        }
    }
}

/// One timestamped resource reading. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// UNIX epoch milliseconds at which the reading completed.
    timestamp_ms: u64,
    /// Index of this sample within its kind's recorded sequence.
    tick: u64,
    kind: ResourceKind,
    scope: Scope,
    values: SampleValues,
}

impl Sample {
    pub fn new(
        timestamp_ms: u64,
        tick: u64,
        kind: ResourceKind,
        scope: Scope,
        values: SampleValues,
    ) -> Self {
        Self {
            timestamp_ms,
            tick,
            kind,
            scope,
            values,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn values(&self) -> &SampleValues {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_labels_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("gpu".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_scope_labels_round_trip() {
        assert_eq!("system".parse::<Scope>().unwrap(), Scope::System);
        assert_eq!("process".parse::<Scope>().unwrap(), Scope::Process);
        assert!("container".parse::<Scope>().is_err());
    }

    #[test]
    fn test_metric_value_display_and_parse() {
        assert_eq!(MetricValue::Counter(4096).to_string(), "4096");
        assert_eq!(MetricValue::Gauge(12.5).to_string(), "12.500");

        assert_eq!("4096".parse::<MetricValue>().unwrap(), MetricValue::Counter(4096));
        assert_eq!(
            "12.500".parse::<MetricValue>().unwrap(),
            MetricValue::Gauge(12.5)
        );
    }

    #[test]
    fn test_cpu_metrics_projection() {
        let values = SampleValues::Cpu(CpuSample {
            total_percent: 40.0,
            user_percent: 30.0,
            system_percent: 10.0,
        });
        let metrics = values.metrics();

        assert_eq!(metrics[0], ("cpu_percent", MetricValue::Gauge(40.0)));
        assert_eq!(metrics.len(), 3);
    }

    #[test]
    fn test_network_metrics_projection_order() {
        let values = SampleValues::NetworkIo(NetIoStat {
            rx_bytes: 1,
            tx_bytes: 2,
            ..NetIoStat::default()
        });
        let names: Vec<&str> = values.metrics().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "rx_bytes",
                "rx_packets",
                "rx_errs",
                "rx_drop",
                "tx_bytes",
                "tx_packets",
                "tx_errs",
                "tx_drop"
            ]
        );
    }
}
