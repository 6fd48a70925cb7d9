use crate::structs::*;
use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

/// Statistics of a capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub packets_count: usize,
    pub payload_bytes: usize,
    /// Distinct conversations, both directions counted once
    pub flows_count: usize,
    /// Connection attempts (SYN without ACK)
    pub handshakes_count: usize,
    pub first_ts: Option<Duration>,
    pub last_ts: Option<Duration>,
    /// Number of packets older than the packet before them
    pub inversions_count: usize,
}

impl CaptureSummary {
    pub fn from_packets(packets: &[PacketDescriptor]) -> Self {
        let flows: HashSet<FlowKey> = packets.iter().map(|p| p.flow_key()).collect();
        CaptureSummary {
            packets_count: packets.len(),
            payload_bytes: packets.iter().map(|p| p.payload_len()).sum(),
            flows_count: flows.len(),
            handshakes_count: packets
                .iter()
                .filter(|p| p.flags == TcpFlagSet::SYN)
                .count(),
            first_ts: packets.iter().map(|p| p.timestamp).min(),
            last_ts: packets.iter().map(|p| p.timestamp).max(),
            inversions_count: packets
                .windows(2)
                .filter(|w| w[1].timestamp < w[0].timestamp)
                .count(),
        }
    }

    pub fn duration(&self) -> Duration {
        match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) => last - first,
            _ => Duration::ZERO,
        }
    }
}

impl Display for CaptureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "packets:     {}", self.packets_count)?;
        writeln!(f, "payload:     {} bytes", self.payload_bytes)?;
        writeln!(f, "flows:       {}", self.flows_count)?;
        writeln!(f, "handshakes:  {}", self.handshakes_count)?;
        if let Some(first) = self.first_ts {
            writeln!(f, "start:       {}.{:06}", first.as_secs(), first.subsec_micros())?;
        }
        writeln!(
            f,
            "duration:    {}",
            humantime::format_duration(self.duration())
        )?;
        write!(f, "inversions:  {}", self.inversions_count)
    }
}
