use crate::structs::*;
use std::num::Wrapping;

/// Sequence bookkeeping of one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionalSequenceState {
    /// Next sequence number to send
    pub next_seq: Wrapping<u32>,
    /// Next acknowledgment number expected, i.e., the peer's next sequence number
    pub next_ack: Wrapping<u32>,
}

/// The TCP counters of a flow, for both directions.
///
/// Sequence arithmetic is modulo 2^32, like on the wire.
#[derive(Debug, Clone)]
pub struct SequenceState {
    forward: DirectionalSequenceState,
    backward: DirectionalSequenceState,
}

impl SequenceState {
    /// Nothing is acknowledged before the peer's SYN has been seen
    pub fn new(initial_seq_client: u32, initial_seq_server: u32) -> Self {
        SequenceState {
            forward: DirectionalSequenceState {
                next_seq: Wrapping(initial_seq_client),
                next_ack: Wrapping(0),
            },
            backward: DirectionalSequenceState {
                next_seq: Wrapping(initial_seq_server),
                next_ack: Wrapping(0),
            },
        }
    }

    pub fn get(&self, direction: PacketDirection) -> &DirectionalSequenceState {
        match direction {
            PacketDirection::Forward => &self.forward,
            PacketDirection::Backward => &self.backward,
        }
    }

    fn get_mut(&mut self, direction: PacketDirection) -> &mut DirectionalSequenceState {
        match direction {
            PacketDirection::Forward => &mut self.forward,
            PacketDirection::Backward => &mut self.backward,
        }
    }

    /// Advance the sequence number of a direction by `units`.
    ///
    /// Returns the sequence number to put in the packet being built (the value before the
    /// advance). The other direction now expects to acknowledge the new value.
    pub fn advance(&mut self, direction: PacketDirection, units: u32) -> u32 {
        let sender = self.get_mut(direction);
        let seq = sender.next_seq;
        sender.next_seq += Wrapping(units);
        let next = sender.next_seq;
        self.get_mut(direction.into_reverse()).next_ack = next;
        seq.0
    }

    /// Compute the (sequence, acknowledgment) numbers of a packet and update the counters.
    ///
    /// The packet consumes its payload length plus one unit per SYN or FIN flag. The
    /// acknowledgment is zero when the ACK flag is not set.
    pub fn stamp(
        &mut self,
        direction: PacketDirection,
        flags: TcpFlagSet,
        payload_len: usize,
    ) -> (u32, u32) {
        let ack = if flags.a_flag {
            self.get(direction).next_ack.0
        } else {
            0
        };
        let seq = self.advance(direction, payload_len as u32 + flags.control_units());
        (seq, ack)
    }
}
