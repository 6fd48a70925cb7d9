use crate::clock::SessionClock;
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::flow::{FlowWriter, IpIdPolicy};
use crate::random_flow::RandomFlowSynthesizer;
use crate::sequence::SequenceState;
use crate::structs::*;
use rand_core::RngCore;
use std::num::Wrapping;
use std::ops::Range;
use std::time::Duration;

/// Marks the end of the file content
pub const END_OF_FILE: u8 = 0;

/// A file to transfer, and how to cut it into segments
#[derive(Debug, Clone)]
pub struct FileTransferPlan {
    pub file_name: String,
    pub content: Vec<u8>,
    pub chunk_size: usize,
}

impl FileTransferPlan {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("the chunk size must be positive".into()));
        }
        if chunk_size > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidArgument(format!(
                "chunk size {chunk_size} is larger than {MAX_PAYLOAD_LEN} bytes"
            )));
        }
        let file_name = file_name.into();
        if file_name.contains('\n') {
            return Err(Error::InvalidArgument(
                "the file name cannot contain a newline".into(),
            ));
        }
        Ok(FileTransferPlan {
            file_name,
            content,
            chunk_size,
        })
    }

    /// The content in consecutive slices of `chunk_size` bytes. The last one may be shorter.
    pub fn chunks(&self) -> std::slice::Chunks<'_, u8> {
        self.content.chunks(self.chunk_size)
    }

    /// The control line announcing the file, such as "C0644 1300 notes.txt\n"
    pub fn control_header(&self, file_mode: u32) -> Vec<u8> {
        format!(
            "C{:04o} {} {}\n",
            file_mode,
            self.content.len(),
            self.file_name
        )
        .into_bytes()
    }
}

/// The output of a scripted transfer
#[derive(Debug, Clone)]
pub struct ScriptedTransfer {
    /// Pre-noise, transfer and post-noise packets, in that order
    pub packets: Vec<PacketDescriptor>,
    /// Timestamp of the SYN of the transfer
    pub flow_start: Duration,
    /// Position of the transfer packets in "packets"
    pub flow_range: Range<usize>,
    /// The earliest timestamp at which another synthesis can start
    pub next_time: Duration,
}

impl ScriptedTransfer {
    pub fn transfer_packets(&self) -> &[PacketDescriptor] {
        &self.packets[self.flow_range.clone()]
    }
}

/// Generates a file transfer over a simplified SCP-like protocol
#[derive(Debug, Clone)]
pub struct ScriptedTransferSynthesizer {
    config: TransferConfig,
    noise: Option<RandomFlowSynthesizer>,
}

impl ScriptedTransferSynthesizer {
    pub fn new(config: TransferConfig) -> Result<Self> {
        config.validate()?;
        let noise = if config.pre_noise > 0 || config.post_noise > 0 {
            Some(RandomFlowSynthesizer::new(config.noise.clone())?)
        } else {
            None
        };
        Ok(ScriptedTransferSynthesizer { config, noise })
    }

    fn add_noise(
        &self,
        rng: &mut impl RngCore,
        count: u64,
        start: Duration,
        packets: &mut Vec<PacketDescriptor>,
    ) -> Result<Duration> {
        match &self.noise {
            Some(noise) if count > 0 => {
                let mut timeline = noise.synthesize(rng, count, start)?;
                packets.append(&mut timeline.packets);
                Ok(timeline.next_time)
            }
            _ => Ok(start),
        }
    }

    /// Generate the transfer of a file, server to client.
    ///
    /// The flow is a handshake, the control header, one data segment per chunk, the
    /// end-of-file byte and a teardown. Every data segment is immediately acknowledged by the
    /// client. With a fixed gap, the transfer itself does not depend on the generator: only
    /// the noise does.
    pub fn synthesize(
        &self,
        rng: &mut impl RngCore,
        plan: &FileTransferPlan,
        start: Duration,
    ) -> Result<ScriptedTransfer> {
        let config = &self.config;
        let header = plan.control_header(config.file_mode);
        if header.len() > MAX_PAYLOAD_LEN {
            return Err(Error::InvalidArgument(format!(
                "the control header of \"{}\" does not fit in a packet",
                plan.file_name
            )));
        }
        let mut packets = vec![];

        let flow_start = self.add_noise(rng, config.pre_noise, start, &mut packets)?;
        let first = packets.len();

        let mut clock = SessionClock::new(flow_start, config.jitter)?;
        let mut flow = FlowWriter::new(
            config.endpoints,
            SequenceState::new(config.initial_seq_client, config.initial_seq_server),
            IpIdPolicy::Sequential(Wrapping(config.initial_ip_id)),
            &mut clock,
            &mut packets,
        );
        flow.handshake(rng)?;
        flow.exchange(rng, PacketDirection::Backward, header)?;
        for chunk in plan.chunks() {
            flow.exchange(rng, PacketDirection::Backward, chunk.to_vec())?;
        }
        flow.exchange(rng, PacketDirection::Backward, vec![END_OF_FILE])?;
        flow.teardown(rng)?;

        let flow_range = first..packets.len();
        log::debug!(
            "Transfer of \"{}\" ({} bytes) in {} packets, from {:?} to {:?}",
            plan.file_name,
            plan.content.len(),
            flow_range.len(),
            flow_start,
            clock.now()
        );

        let next_time = self.add_noise(rng, config.post_noise, clock.now(), &mut packets)?;

        Ok(ScriptedTransfer {
            packets,
            flow_start,
            flow_range,
            next_time,
        })
    }
}

/// Generate a file transfer, possibly surrounded by random noise
pub fn synthesize_scripted_transfer(
    config: &TransferConfig,
    plan: &FileTransferPlan,
    start: Duration,
    rng: &mut impl RngCore,
) -> Result<ScriptedTransfer> {
    ScriptedTransferSynthesizer::new(config.clone())?.synthesize(rng, plan, start)
}
