use crate::clock::SessionClock;
use crate::error::Result;
use crate::sequence::SequenceState;
use crate::structs::*;
use rand::Rng;
use rand_core::RngCore;
use std::num::Wrapping;

/// How the IPv4 identification field is filled
#[derive(Debug, Clone, Copy)]
pub(crate) enum IpIdPolicy {
    /// A random value for each packet
    Random,
    /// Consecutive values starting from the given one
    Sequential(Wrapping<u16>),
}

/// Emits the packets of one flow, keeping the TCP counters and the timestamps consistent.
///
/// Each method emits one complete phase, so a flow can only be interrupted between phases.
pub(crate) struct FlowWriter<'a> {
    endpoints: FlowEndpoints,
    state: SequenceState,
    ip_id: IpIdPolicy,
    clock: &'a mut SessionClock,
    packets: &'a mut Vec<PacketDescriptor>,
}

impl<'a> FlowWriter<'a> {
    pub fn new(
        endpoints: FlowEndpoints,
        state: SequenceState,
        ip_id: IpIdPolicy,
        clock: &'a mut SessionClock,
        packets: &'a mut Vec<PacketDescriptor>,
    ) -> Self {
        FlowWriter {
            endpoints,
            state,
            ip_id,
            clock,
            packets,
        }
    }

    /// Number of packets in the output, including those emitted before this flow
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    fn next_ip_id(&mut self, rng: &mut impl RngCore) -> u16 {
        match &mut self.ip_id {
            IpIdPolicy::Random => rng.gen_range(1..65535),
            IpIdPolicy::Sequential(id) => {
                let current = id.0;
                *id += Wrapping(1);
                current
            }
        }
    }

    /// Build one packet and append it to the output
    pub fn emit(
        &mut self,
        rng: &mut impl RngCore,
        direction: PacketDirection,
        flags: TcpFlagSet,
        payload: Option<Vec<u8>>,
    ) -> Result<()> {
        // an empty payload is the same as no payload on the wire
        let payload = payload.filter(|p| !p.is_empty());
        let payload_len = payload.as_ref().map_or(0, |p| p.len());
        let (seq, ack) = self.state.stamp(direction, flags, payload_len);
        let ip_id = self.next_ip_id(rng);
        let timestamp = self.clock.take(rng)?;
        let (src, dst) = self.endpoints.oriented(direction);
        let packet = PacketDescriptor {
            src_mac: src.mac,
            dst_mac: dst.mac,
            src_ip: src.ip,
            dst_ip: dst.ip,
            ip_id,
            src_port: src.port,
            dst_port: dst.port,
            flags,
            seq,
            ack,
            payload,
            timestamp,
        };
        log::trace!(
            "{:?} {} seq={} ack={} len={}",
            direction,
            flags,
            seq,
            ack,
            payload_len
        );
        self.packets.push(packet);
        Ok(())
    }

    /// SYN, SYN-ACK, ACK
    pub fn handshake(&mut self, rng: &mut impl RngCore) -> Result<()> {
        self.emit(rng, PacketDirection::Forward, TcpFlagSet::SYN, None)?;
        self.emit(rng, PacketDirection::Backward, TcpFlagSet::SYN_ACK, None)?;
        self.emit(rng, PacketDirection::Forward, TcpFlagSet::ACK, None)
    }

    /// A PSH-ACK carrying the payload, immediately acknowledged by the peer
    pub fn exchange(
        &mut self,
        rng: &mut impl RngCore,
        direction: PacketDirection,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.emit(rng, direction, TcpFlagSet::PSH_ACK, Some(payload))?;
        self.emit(rng, direction.into_reverse(), TcpFlagSet::ACK, None)
    }

    /// The server closes first, then the client
    pub fn teardown(&mut self, rng: &mut impl RngCore) -> Result<()> {
        self.emit(rng, PacketDirection::Backward, TcpFlagSet::FIN_ACK, None)?;
        self.emit(rng, PacketDirection::Forward, TcpFlagSet::ACK, None)?;
        self.emit(rng, PacketDirection::Forward, TcpFlagSet::FIN_ACK, None)?;
        self.emit(rng, PacketDirection::Backward, TcpFlagSet::ACK, None)
    }
}
