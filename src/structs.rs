use pnet::util::MacAddr;
use pnet_packet::tcp::TcpFlags;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Largest TCP payload that fits in an IPv4 packet with minimal IPv4 and TCP headers
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - 40;

/// The direction of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketDirection {
    /// client to server
    Forward,
    /// server to client
    Backward,
}

impl PacketDirection {
    pub fn into_reverse(self) -> PacketDirection {
        match self {
            PacketDirection::Forward => PacketDirection::Backward,
            PacketDirection::Backward => PacketDirection::Forward,
        }
    }
}

/// The TCP control flags used by the synthesizers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TcpFlagSet {
    /// SYN flag?
    pub s_flag: bool,
    /// ACK flag?
    pub a_flag: bool,
    /// FIN flag?
    pub f_flag: bool,
    /// PSH flag?
    pub p_flag: bool,
}

impl TcpFlagSet {
    pub const SYN: TcpFlagSet = TcpFlagSet {
        s_flag: true,
        a_flag: false,
        f_flag: false,
        p_flag: false,
    };
    pub const SYN_ACK: TcpFlagSet = TcpFlagSet {
        s_flag: true,
        a_flag: true,
        f_flag: false,
        p_flag: false,
    };
    pub const ACK: TcpFlagSet = TcpFlagSet {
        s_flag: false,
        a_flag: true,
        f_flag: false,
        p_flag: false,
    };
    pub const PSH_ACK: TcpFlagSet = TcpFlagSet {
        s_flag: false,
        a_flag: true,
        f_flag: false,
        p_flag: true,
    };
    pub const FIN_ACK: TcpFlagSet = TcpFlagSet {
        s_flag: false,
        a_flag: true,
        f_flag: true,
        p_flag: false,
    };

    /// Number of sequence units consumed by the control flags alone
    pub fn control_units(&self) -> u32 {
        self.s_flag as u32 + self.f_flag as u32
    }

    /// The flags as the TCP header byte
    pub fn to_bits(&self) -> u8 {
        (self.s_flag as u8 * TcpFlags::SYN)
            | (self.a_flag as u8 * TcpFlags::ACK)
            | (self.f_flag as u8 * TcpFlags::FIN)
            | (self.p_flag as u8 * TcpFlags::PSH)
    }

    /// Read the flags from a TCP header byte. Other flags are ignored.
    pub fn from_bits(bits: u8) -> Self {
        TcpFlagSet {
            s_flag: bits & TcpFlags::SYN != 0,
            a_flag: bits & TcpFlags::ACK != 0,
            f_flag: bits & TcpFlags::FIN != 0,
            p_flag: bits & TcpFlags::PSH != 0,
        }
    }
}

impl Display for TcpFlagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.f_flag {
            write!(f, "F")?;
        }
        if self.s_flag {
            write!(f, "S")?;
        }
        if self.p_flag {
            write!(f, "P")?;
        }
        if self.a_flag {
            write!(f, "A")?;
        }
        Ok(())
    }
}

/// One side of a TCP conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// The client and server of a flow, chosen once for the whole flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowEndpoints {
    pub client: Endpoint,
    pub server: Endpoint,
}

impl FlowEndpoints {
    /// Returns (source, destination) for a packet sent in that direction
    pub fn oriented(&self, direction: PacketDirection) -> (&Endpoint, &Endpoint) {
        match direction {
            PacketDirection::Forward => (&self.client, &self.server),
            PacketDirection::Backward => (&self.server, &self.client),
        }
    }
}

/// A fully described TCP/IPv4 packet over Ethernet.
///
/// The descriptor is flat: every layer has its own named fields and the bytes on the wire are
/// only computed at export time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// IPv4 identification field
    pub ip_id: u16,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TcpFlagSet,
    pub seq: u32,
    /// Zero when the ACK flag is not set
    pub ack: u32,
    pub payload: Option<Vec<u8>>,
    /// Capture timestamp, since the Unix epoch
    pub timestamp: Duration,
}

impl PacketDescriptor {
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }

    /// The 4-uplet identifying the flow of this packet, normalized so that both directions
    /// of a conversation share the same key
    pub fn flow_key(&self) -> FlowKey {
        let mut key = FlowKey {
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            src_port: self.src_port,
            dst_port: self.dst_port,
        };
        key.normalize();
        key
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
/// A TCP flow identifier
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn normalize(&mut self) {
        if self.src_ip > self.dst_ip
            || (self.src_ip == self.dst_ip && self.src_port > self.dst_port)
        {
            std::mem::swap(&mut self.src_ip, &mut self.dst_ip);
            std::mem::swap(&mut self.src_port, &mut self.dst_port);
        }
    }
}

#[derive(Debug, Clone)]
/// The packets of one synthesis call, and the earliest timestamp at which the next synthesis
/// may start
pub struct FlowTimeline {
    pub packets: Vec<PacketDescriptor>,
    pub next_time: Duration,
}
