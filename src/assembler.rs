use crate::error::{Error, Result};
use crate::export;
use crate::structs::*;
use std::path::Path;

/// How the segments of a capture are put together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    /// Keep the segments in the order they were added
    #[default]
    Concatenate,
    /// Like "Concatenate", but refuse a capture whose timestamps go backward
    Strict,
    /// Stable sort of the whole capture by timestamp
    Sort,
}

/// Puts independently synthesized packet sequences into one capture.
///
/// Segments are expected to be chained by the caller: each synthesis should start at the
/// "next time" returned by the previous one.
#[derive(Debug, Default)]
pub struct CaptureAssembler {
    segments: Vec<Vec<PacketDescriptor>>,
    policy: OrderPolicy,
}

impl CaptureAssembler {
    pub fn new(policy: OrderPolicy) -> Self {
        CaptureAssembler {
            segments: vec![],
            policy,
        }
    }

    pub fn push(&mut self, packets: Vec<PacketDescriptor>) -> &mut Self {
        self.segments.push(packets);
        self
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge the segments into one ordered capture
    pub fn assemble(self) -> Result<Vec<PacketDescriptor>> {
        let mut capture = Vec::with_capacity(self.len());
        for segment in self.segments {
            capture.extend(segment);
        }
        match self.policy {
            OrderPolicy::Concatenate => {}
            OrderPolicy::Strict => {
                if let Some(i) = capture
                    .windows(2)
                    .position(|w| w[1].timestamp < w[0].timestamp)
                {
                    return Err(Error::Ordering(format!(
                        "packet {} at {:?} comes after a packet at {:?}",
                        i + 1,
                        capture[i + 1].timestamp,
                        capture[i].timestamp
                    )));
                }
            }
            OrderPolicy::Sort => {
                log::info!("Sorting the packets");
                capture.sort_by_key(|p| p.timestamp);
            }
        }
        Ok(capture)
    }

    /// Assemble the capture and write it into a pcap file. Returns the number of packets.
    pub fn export(self, path: &Path) -> Result<usize> {
        let capture = self.assemble()?;
        export::write_pcap(path, &capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RandomFlowConfig, TransferConfig};
    use crate::random_flow::synthesize_random_flows;
    use crate::transfer::{synthesize_scripted_transfer, FileTransferPlan};
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;
    use std::time::Duration;

    fn timestamps(packets: &[PacketDescriptor]) -> Vec<Duration> {
        packets.iter().map(|p| p.timestamp).collect()
    }

    #[test]
    fn test_chained_segments() {
        let config = RandomFlowConfig::default();
        let before = synthesize_random_flows(&config, 100, Duration::from_secs(10), 0).unwrap();
        let plan = FileTransferPlan::new("f", vec![7; 2000], 512).unwrap();
        let transfer = synthesize_scripted_transfer(
            &TransferConfig::default(),
            &plan,
            before.next_time,
            &mut Pcg32::seed_from_u64(0),
        )
        .unwrap();
        let after = synthesize_random_flows(&config, 100, transfer.next_time, 1).unwrap();
        let total = before.packets.len() + transfer.packets.len() + after.packets.len();

        let mut assembler = CaptureAssembler::new(OrderPolicy::Strict);
        assembler
            .push(before.packets)
            .push(transfer.packets)
            .push(after.packets);
        assert_eq!(assembler.len(), total);
        let capture = assembler.assemble().unwrap();
        assert_eq!(capture.len(), total);
        let ts = timestamps(&capture);
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_overlapping_segments() {
        let config = RandomFlowConfig::default();
        let a = synthesize_random_flows(&config, 20, Duration::from_secs(10), 0).unwrap();
        // starts in the middle of the first segment
        let b = synthesize_random_flows(&config, 20, Duration::from_secs(10), 1).unwrap();

        let mut assembler = CaptureAssembler::new(OrderPolicy::Concatenate);
        assembler.push(a.packets.clone()).push(b.packets.clone());
        let capture = assembler.assemble().unwrap();
        assert_eq!(&capture[..a.packets.len()], &a.packets[..]);
        assert_eq!(&capture[a.packets.len()..], &b.packets[..]);

        let mut assembler = CaptureAssembler::new(OrderPolicy::Strict);
        assembler.push(a.packets.clone()).push(b.packets.clone());
        assert!(matches!(assembler.assemble(), Err(Error::Ordering(_))));

        let mut assembler = CaptureAssembler::new(OrderPolicy::Sort);
        assembler.push(a.packets.clone()).push(b.packets.clone());
        let capture = assembler.assemble().unwrap();
        let ts = timestamps(&capture);
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
        // the sort is stable: both segments start at the same time
        assert_eq!(capture[0], a.packets[0]);
        assert_eq!(capture[1], b.packets[0]);
    }

    #[test]
    fn test_export_rejects_inversion() {
        let dir = tempfile::tempdir().unwrap();
        let config = RandomFlowConfig::default();
        let a = synthesize_random_flows(&config, 20, Duration::from_secs(20), 0).unwrap();
        let b = synthesize_random_flows(&config, 20, Duration::from_secs(10), 1).unwrap();

        let path = dir.path().join("strict.pcap");
        let mut assembler = CaptureAssembler::new(OrderPolicy::Strict);
        assembler.push(a.packets.clone()).push(b.packets.clone());
        assert!(assembler.export(&path).is_err());
        assert!(!path.exists());

        let path = dir.path().join("sorted.pcap");
        let mut assembler = CaptureAssembler::new(OrderPolicy::Sort);
        assembler.push(a.packets.clone()).push(b.packets.clone());
        let n = assembler.export(&path).unwrap();
        assert_eq!(n, a.packets.len() + b.packets.len());
        let read = export::read_pcap(&path).unwrap();
        assert_eq!(read[0].timestamp, Duration::from_secs(10));
    }

    #[test]
    fn test_empty() {
        let assembler = CaptureAssembler::default();
        assert!(assembler.is_empty());
        assert!(assembler.assemble().unwrap().is_empty());
    }
}
