//! Network interface counters from `/proc/net/dev`.
//!
//! The file carries two header lines followed by one line per interface,
//! `iface: <8 receive fields> <8 transmit fields>`. The monitor records the
//! byte, packet, error and drop counters of each direction and sums them
//! across physical interfaces; loopback and common virtual interfaces are
//! excluded so local chatter does not inflate the numbers.

use std::io::BufRead;

/// Aggregated network traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetIoStat {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Packets received.
    pub rx_packets: u64,
    /// Receive errors.
    pub rx_errs: u64,
    /// Inbound packets dropped.
    pub rx_drop: u64,

    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Packets transmitted.
    pub tx_packets: u64,
    /// Transmit errors.
    pub tx_errs: u64,
    /// Outbound packets dropped.
    pub tx_drop: u64,
}

impl std::ops::AddAssign for NetIoStat {
    fn add_assign(&mut self, rhs: Self) {
        self.rx_bytes += rhs.rx_bytes;
        self.rx_packets += rhs.rx_packets;
        self.rx_errs += rhs.rx_errs;
        self.rx_drop += rhs.rx_drop;
        self.tx_bytes += rhs.tx_bytes;
        self.tx_packets += rhs.tx_packets;
        self.tx_errs += rhs.tx_errs;
        self.tx_drop += rhs.tx_drop;
    }
}

const IGNORED_INTERFACES: [&str; 5] = ["lo", "veth", "docker", "br-", "virbr"];

/// Number of per-direction counter fields in a `/proc/net/dev` line.
const DIRECTION_FIELDS: usize = 8;

fn is_ignored_interface(iface: &str) -> bool {
    IGNORED_INTERFACES
        .iter()
        .any(|prefix| iface.starts_with(prefix))
}

/// Parses the counters of one interface line.
///
/// Takes the first four fields of each direction block (bytes, packets,
/// errs, drop) and skips the rest. Returns `None` when the line is not an
/// interface line or carries too few fields.
fn parse_interface_line(line: &str) -> Option<(&str, NetIoStat)> {
    let (iface, data) = line.trim().split_once(':')?;
    let mut fields = data.split_whitespace();

    let mut direction = |out: &mut [u64; 4]| -> Option<()> {
        for slot in out.iter_mut() {
            *slot = fields.next()?.parse().unwrap_or(0);
        }
        for _ in 4..DIRECTION_FIELDS {
            fields.next()?;
        }
        Some(())
    };

    let mut rx = [0u64; 4];
    let mut tx = [0u64; 4];
    direction(&mut rx)?;
    direction(&mut tx)?;

    Some((
        iface.trim(),
        NetIoStat {
            rx_bytes: rx[0],
            rx_packets: rx[1],
            rx_errs: rx[2],
            rx_drop: rx[3],
            tx_bytes: tx[0],
            tx_packets: tx[1],
            tx_errs: tx[2],
            tx_drop: tx[3],
        },
    ))
}

impl NetIoStat {
    /// Reads and aggregates `/proc/net/dev` content from a reader.
    ///
    /// # Errors
    ///
    /// Returns `Err(std::io::Error)` only when reading from the input
    /// fails; malformed lines are skipped.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = NetIoStat::default();
        let mut line = String::new();

        // The first two lines are column headers.
        for _ in 0..2 {
            buf.read_line(&mut line)?;
            line.clear();
        }

        while buf.read_line(&mut line)? != 0 {
            if let Some((iface, counters)) = parse_interface_line(&line) {
                if !is_ignored_interface(iface) {
                    stat += counters;
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";

    #[test]
    fn test_empty_input() {
        let data = b"";
        let stat = NetIoStat::from_reader(&mut &data[..]).unwrap();
        assert_eq!(stat, NetIoStat::default());
    }

    #[test]
    fn test_only_headers() {
        let stat = NetIoStat::from_reader(&mut HEADER.as_bytes()).unwrap();
        assert_eq!(stat, NetIoStat::default());
    }

    #[test]
    fn test_parse_single_interface() {
        let data = format!(
            "{HEADER}  eth0: 10240    100     2    1    0     0          0         0  20480   200     4    3    0     0       0          0\n"
        );
        let stat = NetIoStat::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.rx_bytes, 10240);
        assert_eq!(stat.rx_packets, 100);
        assert_eq!(stat.rx_errs, 2);
        assert_eq!(stat.rx_drop, 1);
        assert_eq!(stat.tx_bytes, 20480);
        assert_eq!(stat.tx_packets, 200);
        assert_eq!(stat.tx_errs, 4);
        assert_eq!(stat.tx_drop, 3);
    }

    #[test]
    fn test_loopback_and_virtual_ignored() {
        let data = format!(
            "{HEADER}\
    lo: 999 999 9 9 0 0 0 0 999 999 9 9 0 0 0 0
 veth0: 999 999 9 9 0 0 0 0 999 999 9 9 0 0 0 0
docker0: 999 999 9 9 0 0 0 0 999 999 9 9 0 0 0 0
br-abc: 999 999 9 9 0 0 0 0 999 999 9 9 0 0 0 0
virbr0: 999 999 9 9 0 0 0 0 999 999 9 9 0 0 0 0
"
        );
        let stat = NetIoStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat, NetIoStat::default());
    }

    #[test]
    fn test_multiple_interfaces_summed() {
        let data = format!(
            "{HEADER}\
  eth0: 100 200 0 0 0 0 0 0 300 400 0 0 0 0 0 0
  wlan0: 10 20 0 0 0 0 0 0 30 40 0 0 0 0 0 0
"
        );
        let stat = NetIoStat::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.rx_bytes, 110);
        assert_eq!(stat.rx_packets, 220);
        assert_eq!(stat.tx_bytes, 330);
        assert_eq!(stat.tx_packets, 440);
    }

    #[test]
    fn test_truncated_line_skipped() {
        let data = format!("{HEADER} badif: 123 456\n");
        let stat = NetIoStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat, NetIoStat::default());
    }

    #[test]
    fn test_unparsable_counter_becomes_zero() {
        let data = format!(
            "{HEADER}  eth0: xyz abc 0 0 0 0 0 0 20480 200 0 0 0 0 0 0\n"
        );
        let stat = NetIoStat::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.rx_bytes, 0);
        assert_eq!(stat.rx_packets, 0);
        assert_eq!(stat.tx_bytes, 20480);
        assert_eq!(stat.tx_packets, 200);
    }
}
