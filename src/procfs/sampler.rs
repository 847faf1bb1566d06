//! Per-kind resource samplers.
//!
//! A [`KindSampler`] is built once per monitored resource kind when a
//! session starts. It opens the procfs file(s) it needs up front and holds
//! the readers for the whole session, rewinding before every read; a
//! vanished file (the target process exited) then shows up as a read error
//! on the next tick rather than as a missing path.
//!
//! CPU samplers are the one case that takes wall-clock time: utilization
//! is only defined over an interval, so they read the time counters twice
//! with a cooperative [`tokio::time::sleep`] in between. The window length
//! is bounded by configuration and always shorter than the sampling
//! interval.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::fsutil::{self, FileOpenError};
use crate::process::Pid;

use super::stats::{
    CpuTimes, DiskIoStat, KeyValueStat, MemInfo, NetIoStat, ProcessCpuTimes, ProcessIoStat,
    ProcessMemory, ProcessMemorySample, ResourceKind, SampleValues, Scope, SingleLineStat,
    SystemMemorySample,
};
use super::utils::rewind_and_read;

/// Default length of the CPU utilization measurement window.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_millis(250);

/// What a session samples: the whole system, or one resolved process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    System,
    Process(Pid),
}

impl Target {
    pub fn scope(&self) -> Scope {
        match self {
            Target::System => Scope::System,
            Target::Process(_) => Scope::Process,
        }
    }

    pub fn pid(&self) -> Option<Pid> {
        match self {
            Target::System => None,
            Target::Process(pid) => Some(*pid),
        }
    }
}

/// Failure modes of a single sampling operation.
///
/// Raw OS errors are classified here and never cross the session boundary
/// unwrapped: unreadable sources (the usual sign the target process exited,
/// or a permission boundary) are [`Unavailable`], undecodable content is
/// [`Parse`], and kind/scope combinations the platform cannot provide are
/// [`Unsupported`].
///
/// [`Unavailable`]: SampleError::Unavailable
/// [`Parse`]: SampleError::Parse
/// [`Unsupported`]: SampleError::Unsupported
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("{kind} metrics are not available under {scope} scope")]
    Unsupported { kind: ResourceKind, scope: Scope },

    #[error("stat source unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    #[error("malformed stat source: {0}")]
    Parse(#[source] std::io::Error),
}

impl SampleError {
    /// Whether the underlying resource is gone (as opposed to misread).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SampleError::Unavailable(_))
    }

    fn classify(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::InvalidData {
            SampleError::Parse(err)
        } else {
            SampleError::Unavailable(err)
        }
    }
}

impl From<FileOpenError> for SampleError {
    fn from(err: FileOpenError) -> Self {
        SampleError::Unavailable(std::io::Error::new(err.source.kind(), err))
    }
}

/// A sampler for one (resource kind, target) pair.
#[derive(Debug)]
pub enum KindSampler {
    SystemCpu {
        stat: BufReader<File>,
        window: Duration,
    },
    ProcessCpu {
        stat: BufReader<File>,
        window: Duration,
    },
    SystemMemory {
        meminfo: BufReader<File>,
    },
    ProcessMemory {
        status: BufReader<File>,
        total_bytes: u64,
    },
    SystemDisk {
        diskstats: BufReader<File>,
    },
    ProcessDisk {
        io: BufReader<File>,
    },
    SystemNetwork {
        dev: BufReader<File>,
    },
}

impl KindSampler {
    /// Opens the procfs sources for sampling `kind` on `target`.
    ///
    /// # Arguments
    ///
    /// * `kind` - The resource class to sample.
    /// * `target` - System-wide, or a resolved process id.
    /// * `proc_root` - Root of the proc filesystem, normally `/proc`.
    /// * `cpu_window` - Measurement window for CPU percentage sampling.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Unavailable`] if a required file cannot be
    /// opened (e.g. the process exited between resolution and open), or
    /// [`SampleError::Unsupported`] for kind/scope combinations procfs
    /// cannot provide (per-process network counters).
    pub fn open(
        kind: ResourceKind,
        target: Target,
        proc_root: &Path,
        cpu_window: Duration,
    ) -> Result<Self, SampleError> {
        let open = |path: &Path| fsutil::open_file_reader(path).map_err(SampleError::from);
        let pid_dir = |pid: Pid| proc_root.join(pid.to_string());

        match (kind, target) {
            (ResourceKind::Cpu, Target::System) => Ok(KindSampler::SystemCpu {
                stat: open(&proc_root.join("stat"))?,
                window: cpu_window,
            }),
            (ResourceKind::Cpu, Target::Process(pid)) => Ok(KindSampler::ProcessCpu {
                stat: open(&pid_dir(pid).join("stat"))?,
                window: cpu_window,
            }),
            (ResourceKind::Memory, Target::System) => Ok(KindSampler::SystemMemory {
                meminfo: open(&proc_root.join("meminfo"))?,
            }),
            (ResourceKind::Memory, Target::Process(pid)) => {
                // Total system memory is fixed for the session; read it once
                // so the per-tick work is a single file.
                let mut meminfo = open(&proc_root.join("meminfo"))?;
                let info = MemInfo::from_reader(&mut meminfo).map_err(SampleError::classify)?;
                Ok(KindSampler::ProcessMemory {
                    status: open(&pid_dir(pid).join("status"))?,
                    total_bytes: info.total_bytes,
                })
            }
            (ResourceKind::DiskIo, Target::System) => Ok(KindSampler::SystemDisk {
                diskstats: open(&proc_root.join("diskstats"))?,
            }),
            (ResourceKind::DiskIo, Target::Process(pid)) => Ok(KindSampler::ProcessDisk {
                io: open(&pid_dir(pid).join("io"))?,
            }),
            (ResourceKind::NetworkIo, Target::System) => Ok(KindSampler::SystemNetwork {
                dev: open(&proc_root.join("net/dev"))?,
            }),
            (ResourceKind::NetworkIo, Target::Process(_)) => Err(SampleError::Unsupported {
                kind,
                scope: target.scope(),
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            KindSampler::SystemCpu { .. } | KindSampler::ProcessCpu { .. } => ResourceKind::Cpu,
            KindSampler::SystemMemory { .. } | KindSampler::ProcessMemory { .. } => {
                ResourceKind::Memory
            }
            KindSampler::SystemDisk { .. } | KindSampler::ProcessDisk { .. } => {
                ResourceKind::DiskIo
            }
            KindSampler::SystemNetwork { .. } => ResourceKind::NetworkIo,
        }
    }

    /// Takes one reading.
    ///
    /// CPU variants suspend for their measurement window between the two
    /// counter reads; every other variant is a single near-instantaneous
    /// read.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Unavailable`] when the source cannot be read
    /// (for process targets this usually means the process exited) and
    /// [`SampleError::Parse`] when the content does not decode.
    pub async fn sample(&mut self) -> Result<SampleValues, SampleError> {
        match self {
            KindSampler::SystemCpu { stat, window } => {
                let first =
                    rewind_and_read(stat, CpuTimes::from_reader).map_err(SampleError::classify)?;
                tokio::time::sleep(*window).await;
                let second =
                    rewind_and_read(stat, CpuTimes::from_reader).map_err(SampleError::classify)?;
                Ok(SampleValues::Cpu(second.percent_since(&first)))
            }
            KindSampler::ProcessCpu { stat, window } => {
                let first = rewind_and_read(stat, ProcessCpuTimes::from_reader)
                    .map_err(SampleError::classify)?;
                let started = tokio::time::Instant::now();
                tokio::time::sleep(*window).await;
                let second = rewind_and_read(stat, ProcessCpuTimes::from_reader)
                    .map_err(SampleError::classify)?;
                // The sleep can overshoot under load; divide by the time
                // that actually passed.
                Ok(SampleValues::Cpu(
                    second.percent_over(&first, started.elapsed()),
                ))
            }
            KindSampler::SystemMemory { meminfo } => {
                let info = rewind_and_read(meminfo, MemInfo::from_reader)
                    .map_err(SampleError::classify)?;
                Ok(SampleValues::SystemMemory(SystemMemorySample::from(info)))
            }
            KindSampler::ProcessMemory { status, total_bytes } => {
                let mem = rewind_and_read(status, ProcessMemory::from_reader)
                    .map_err(SampleError::classify)?;
                Ok(SampleValues::ProcessMemory(ProcessMemorySample {
                    rss_bytes: mem.rss_bytes,
                    vms_bytes: mem.vms_bytes,
                    rss_percent: mem.rss_percent(*total_bytes),
                }))
            }
            KindSampler::SystemDisk { diskstats } => {
                let stat = rewind_and_read(diskstats, DiskIoStat::from_reader)
                    .map_err(SampleError::classify)?;
                Ok(SampleValues::DiskIo(stat))
            }
            KindSampler::ProcessDisk { io } => {
                let stat = rewind_and_read(io, ProcessIoStat::from_reader)
                    .map_err(SampleError::classify)?;
                Ok(SampleValues::DiskIo(stat.into()))
            }
            KindSampler::SystemNetwork { dev } => {
                let stat = rewind_and_read(dev, NetIoStat::from_reader)
                    .map_err(SampleError::classify)?;
                Ok(SampleValues::NetworkIo(stat))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().expect("failed to create temp proc root");
        std::fs::write(
            root.path().join("stat"),
            "cpu  100 0 50 800 50 0 0 0 0 0\nintr 12345\n",
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

        let pid_dir = root.path().join("4242");
        std::fs::create_dir(&pid_dir).unwrap();
        std::fs::write(
            pid_dir.join("stat"),
            "4242 (worker) S 1 4242 4242 0 -1 0 0 0 0 0 40 10 0 0 20 0 1 0 0 0 0 0\n",
        )
        .unwrap();
        std::fs::write(
            pid_dir.join("status"),
            "Name:   worker\nVmSize:   500 kB\nVmRSS:    250 kB\n",
        )
        .unwrap();
        std::fs::write(
            pid_dir.join("io"),
            "rchar: 1\nwchar: 2\nsyscr: 3\nsyscw: 4\nread_bytes: 5\nwrite_bytes: 6\n",
        )
        .unwrap();
        root
    }

    fn window() -> Duration {
        Duration::from_millis(1)
    }

    #[tokio::test]
    async fn test_system_cpu_sampler_static_counters() {
        let root = fake_proc_root();
        let mut sampler =
            KindSampler::open(ResourceKind::Cpu, Target::System, root.path(), window()).unwrap();

        // Counters do not move between the two reads of a static file, so
        // the computed utilization must be all-zero rather than an error.
        match sampler.sample().await.unwrap() {
            SampleValues::Cpu(cpu) => assert_eq!(cpu.total_percent, 0.0),
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_cpu_sampler() {
        let root = fake_proc_root();
        let mut sampler = KindSampler::open(
            ResourceKind::Cpu,
            Target::Process(Pid::new(4242)),
            root.path(),
            window(),
        )
        .unwrap();

        match sampler.sample().await.unwrap() {
            SampleValues::Cpu(cpu) => assert_eq!(cpu.total_percent, 0.0),
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_system_memory_sampler() {
        let root = fake_proc_root();
        let mut sampler =
            KindSampler::open(ResourceKind::Memory, Target::System, root.path(), window())
                .unwrap();

        match sampler.sample().await.unwrap() {
            SampleValues::SystemMemory(mem) => {
                assert_eq!(mem.total_bytes, 1000 * 1024);
                assert_eq!(mem.used_bytes, 750 * 1024);
                assert!((mem.used_percent - 75.0).abs() < 1e-9);
            }
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_memory_sampler() {
        let root = fake_proc_root();
        let mut sampler = KindSampler::open(
            ResourceKind::Memory,
            Target::Process(Pid::new(4242)),
            root.path(),
            window(),
        )
        .unwrap();

        match sampler.sample().await.unwrap() {
            SampleValues::ProcessMemory(mem) => {
                assert_eq!(mem.rss_bytes, 250 * 1024);
                assert_eq!(mem.vms_bytes, 500 * 1024);
                assert!((mem.rss_percent - 25.0).abs() < 1e-9);
            }
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disk_and_network_samplers() {
        let root = fake_proc_root();

        let mut disk =
            KindSampler::open(ResourceKind::DiskIo, Target::System, root.path(), window())
                .unwrap();
        match disk.sample().await.unwrap() {
            SampleValues::DiskIo(io) => {
                assert_eq!(io.read_ops, 1000);
                assert_eq!(io.read_bytes, 8000 * 512);
            }
            other => panic!("unexpected sample values: {other:?}"),
        }

        let mut net =
            KindSampler::open(ResourceKind::NetworkIo, Target::System, root.path(), window())
                .unwrap();
        match net.sample().await.unwrap() {
            SampleValues::NetworkIo(io) => {
                assert_eq!(io.rx_bytes, 100);
                assert_eq!(io.tx_bytes, 200);
            }
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_disk_sampler_uses_io_counters() {
        let root = fake_proc_root();
        let mut sampler = KindSampler::open(
            ResourceKind::DiskIo,
            Target::Process(Pid::new(4242)),
            root.path(),
            window(),
        )
        .unwrap();

        match sampler.sample().await.unwrap() {
            SampleValues::DiskIo(io) => {
                assert_eq!(io.read_ops, 3);
                assert_eq!(io.write_ops, 4);
                assert_eq!(io.read_bytes, 5);
                assert_eq!(io.write_bytes, 6);
            }
            other => panic!("unexpected sample values: {other:?}"),
        }
    }

    #[test]
    fn test_process_network_unsupported() {
        let root = fake_proc_root();
        let err = KindSampler::open(
            ResourceKind::NetworkIo,
            Target::Process(Pid::new(4242)),
            root.path(),
            window(),
        )
        .unwrap_err();

        assert!(matches!(err, SampleError::Unsupported { .. }));
    }

    #[test]
    fn test_open_missing_pid_is_unavailable() {
        let root = fake_proc_root();
        let err = KindSampler::open(
            ResourceKind::Cpu,
            Target::Process(Pid::new(1)),
            root.path(),
            window(),
        )
        .unwrap_err();

        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_corrupted_source_is_parse_error() {
        let root = fake_proc_root();
        let mut sampler = KindSampler::open(
            ResourceKind::DiskIo,
            Target::Process(Pid::new(4242)),
            root.path(),
            window(),
        )
        .unwrap();

        // The reader was opened against the original content; the rewrite
        // lands on the same inode, so the next rewound read sees it.
        std::fs::write(root.path().join("4242/io"), "syscr: broken\n").unwrap();
        let err = sampler.sample().await.unwrap_err();
        assert!(matches!(err, SampleError::Parse(_)));
    }
}
