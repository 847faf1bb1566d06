//! Block device I/O counters from `/proc/diskstats`.
//!
//! Each line of `/proc/diskstats` describes one block device with positional
//! fields. Counters are aggregated across whole-disk devices into a single
//! [`DiskIoStat`]; partitions are skipped (their traffic is already counted
//! on the parent disk) and virtual devices such as loop and ramdisks are
//! ignored. Sector counts are converted to bytes with the fixed 512-byte
//! sector unit procfs uses regardless of the device's native sector size.

use std::io::BufRead;

/// Aggregated block I/O counters, summed across physical disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskIoStat {
    /// Completed read operations.
    pub read_ops: u64,
    /// Completed write operations.
    pub write_ops: u64,
    /// Bytes read.
    pub read_bytes: u64,
    /// Bytes written.
    pub write_bytes: u64,
}

impl std::ops::AddAssign for DiskIoStat {
    fn add_assign(&mut self, rhs: Self) {
        self.read_ops += rhs.read_ops;
        self.write_ops += rhs.write_ops;
        self.read_bytes += rhs.read_bytes;
        self.write_bytes += rhs.write_bytes;
    }
}

/// Fixed sector unit of `/proc/diskstats` sector counters.
const SECTOR_SIZE: u64 = 512;

const IGNORED_DEVICES: [&str; 7] = ["loop", "ram", "zram", "dm-", "md", "sr", "fd"];

/// Whether a device should be excluded from aggregation by name.
fn is_ignored_device(name: &str) -> bool {
    IGNORED_DEVICES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Whether a device name denotes a partition rather than a whole disk.
///
/// Classic disk names (`sda`, `vdb`, `xvda`, `hdc`) gain a trailing digit
/// for partitions; nvme and mmc devices insert a `p<n>` suffix instead
/// (`nvme0n1p2`, `mmcblk0p1`).
fn is_partition(name: &str) -> bool {
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return name
            .rsplit_once('p')
            .is_some_and(|(_, rest)| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
    }

    ["sd", "hd", "vd", "xvd"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
        && name.ends_with(|c: char| c.is_ascii_digit())
}

/// Parses one `/proc/diskstats` line into its device name and counters.
///
/// Field layout after major/minor/name: reads completed, reads merged,
/// sectors read, read time, writes completed, writes merged, sectors
/// written. Returns `None` for lines with too few fields.
fn parse_device_line(line: &str) -> Option<(&str, DiskIoStat)> {
    let mut fields = line.split_whitespace().skip(2);
    let name = fields.next()?;

    let read_ops = fields.next()?.parse().unwrap_or(0);
    let mut fields = fields.skip(1);
    let read_sectors: u64 = fields.next()?.parse().unwrap_or(0);
    let mut fields = fields.skip(1);
    let write_ops = fields.next()?.parse().unwrap_or(0);
    let mut fields = fields.skip(1);
    let write_sectors: u64 = fields.next()?.parse().unwrap_or(0);

    Some((
        name,
        DiskIoStat {
            read_ops,
            write_ops,
            read_bytes: read_sectors * SECTOR_SIZE,
            write_bytes: write_sectors * SECTOR_SIZE,
        },
    ))
}

impl DiskIoStat {
    /// Reads and aggregates `/proc/diskstats` content from a reader.
    ///
    /// # Errors
    ///
    /// Returns `Err(std::io::Error)` only when reading from the input
    /// fails; malformed lines are skipped.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = DiskIoStat::default();
        let mut line = String::new();

        while buf.read_line(&mut line)? != 0 {
            if let Some((name, device)) = parse_device_line(&line) {
                if !is_ignored_device(name) && !is_partition(name) {
                    stat += device;
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}
