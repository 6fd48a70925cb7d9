use crate::address::AddressPool;
use crate::clock::SessionClock;
use crate::config::RandomFlowConfig;
use crate::error::{Error, Result};
use crate::flow::{FlowWriter, IpIdPolicy};
use crate::sequence::SequenceState;
use crate::structs::*;
use rand::Rng;
use rand_core::{RngCore, SeedableRng};
use rand_pcg::Pcg32;
use std::time::Duration;

/// Upper bound of the preallocated packet buffer
const PREALLOCATED: usize = 1 << 16;

/// Generates background TCP flows with random endpoints, payloads and timing
#[derive(Debug, Clone)]
pub struct RandomFlowSynthesizer {
    config: RandomFlowConfig,
    pool: AddressPool,
}

impl RandomFlowSynthesizer {
    pub fn new(config: RandomFlowConfig) -> Result<Self> {
        config.validate()?;
        let pool = AddressPool::new(config.pool.clone())?;
        Ok(RandomFlowSynthesizer { config, pool })
    }

    fn random_payload(&self, rng: &mut impl RngCore) -> Vec<u8> {
        let (min, max) = self.config.payload_size;
        let mut payload = vec![0; rng.gen_range(min..=max)];
        rng.fill_bytes(&mut payload);
        payload
    }

    /// Generate complete flows until at least `target_count` packets are emitted.
    ///
    /// A flow is made of a handshake, one to three bursts and a teardown. When the target is
    /// reached, the current phase is finished but no other phase is started, so the output can
    /// be slightly longer than the target and a flow may lack its teardown (unless
    /// `finish_flows` is set). The next time of the timeline is one gap after the last packet.
    pub fn synthesize(
        &self,
        rng: &mut impl RngCore,
        target_count: u64,
        start: Duration,
    ) -> Result<FlowTimeline> {
        if target_count == 0 {
            return Err(Error::InvalidArgument(
                "the target packet count must be positive".into(),
            ));
        }
        let target = usize::try_from(target_count).map_err(|_| {
            Error::InvalidArgument(format!("cannot generate {target_count} packets"))
        })?;
        let mut clock = SessionClock::new(start, self.config.jitter)?;
        let mut packets: Vec<PacketDescriptor> = Vec::with_capacity(target.min(PREALLOCATED));
        let mut flow_count = 0;

        while packets.len() < target {
            let endpoints = self.pool.draw_endpoints(rng);
            let state = SequenceState::new(rng.next_u32(), rng.next_u32());
            let mut flow =
                FlowWriter::new(endpoints, state, IpIdPolicy::Random, &mut clock, &mut packets);
            flow_count += 1;

            flow.handshake(rng)?;
            if flow.len() < target {
                let bursts = rng.gen_range(1..=3);
                for _ in 0..bursts {
                    if flow.len() >= target {
                        break;
                    }
                    let direction = if rng.gen_bool(0.5) {
                        PacketDirection::Backward
                    } else {
                        PacketDirection::Forward
                    };
                    let payload = self.random_payload(rng);
                    flow.exchange(rng, direction, payload)?;
                }
            }
            if flow.len() < target || self.config.finish_flows {
                flow.teardown(rng)?;
            }
        }

        log::debug!(
            "{} random packets in {} flows, from {:?} to {:?}",
            packets.len(),
            flow_count,
            start,
            clock.now()
        );
        Ok(FlowTimeline {
            packets,
            next_time: clock.now(),
        })
    }
}

/// Generate random background flows from a seed.
///
/// Two calls with the same arguments produce the same packets.
pub fn synthesize_random_flows(
    config: &RandomFlowConfig,
    target_count: u64,
    start: Duration,
    seed: u64,
) -> Result<FlowTimeline> {
    let mut rng = Pcg32::seed_from_u64(seed);
    RandomFlowSynthesizer::new(config.clone())?.synthesize(&mut rng, target_count, start)
}
