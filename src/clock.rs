use crate::error::{check_range, Error, Result};
use rand::distributions::Distribution;
use rand_core::RngCore;
use rand_distr::Uniform;
use std::time::Duration;

/// Produces the timestamps of a flow
#[derive(Debug, Clone)]
pub struct SessionClock {
    current_ts: Duration,
    jitter: Uniform<Duration>,
}

impl SessionClock {
    pub fn new(start: Duration, jitter: (Duration, Duration)) -> Result<Self> {
        check_range("jitter", jitter)?;
        Ok(SessionClock {
            current_ts: start,
            jitter: Uniform::new_inclusive(jitter.0, jitter.1),
        })
    }

    /// Return the current timestamp, then move forward by a random gap.
    ///
    /// Fails if the next timestamp cannot be represented.
    pub fn take(&mut self, rng: &mut impl RngCore) -> Result<Duration> {
        let ts = self.current_ts;
        self.current_ts = ts.checked_add(self.jitter.sample(rng)).ok_or_else(|| {
            Error::InvalidArgument(format!("timestamp overflow after {ts:?}"))
        })?;
        Ok(ts)
    }

    /// The timestamp that the next call to "take" will return
    pub fn now(&self) -> Duration {
        self.current_ts
    }
}
