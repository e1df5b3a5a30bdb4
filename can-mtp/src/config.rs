//! Engine configuration.

use core::time::Duration;

use crate::errors::MtpError;

/// Tunable timing for an engine instance.
#[derive(Debug, Clone)]
pub struct MtpConfig {
    /// How long any non-idle state may persist before the machine is
    /// forced back to idle and the in-flight transfer dropped.
    pub state_timeout: Duration,
    /// Upper bound on how long a blocking send waits for the machine to
    /// become free.
    pub send_timeout: Duration,
    /// Pacing between the frames of a segmented transmission.
    pub wait_time: Duration,
    /// Back-off applied before retransmitting after yielding the bus to a
    /// higher-priority peer.
    pub holdoff_delay: Duration,
}

impl Default for MtpConfig {
    fn default() -> Self {
        Self {
            state_timeout: Duration::from_millis(100),
            send_timeout: Duration::from_millis(5000),
            wait_time: Duration::from_millis(20),
            holdoff_delay: Duration::from_millis(20),
        }
    }
}

impl MtpConfig {
    /// Reject timings that collapse to zero milliseconds or that would
    /// starve the machine.
    ///
    /// The two timeouts may not be zero, since a zero timeout would abort
    /// every transfer on its first tick. `wait_time` must stay below
    /// `state_timeout`: pacing holds the machine in its sending state
    /// without refreshing the state timer, so a pacing window at or beyond
    /// the timeout would abort every segmented send mid-transfer.
    /// `holdoff_delay` needs no such bound (zero included) — it is
    /// consulted only from the idle state, which carries no timer
    /// obligation.
    pub fn validate(&self) -> Result<(), MtpError> {
        if self.state_timeout.as_millis() == 0 || self.send_timeout.as_millis() == 0 {
            return Err(MtpError::InvalidConfig);
        }
        if self.wait_time >= self.state_timeout {
            return Err(MtpError::InvalidConfig);
        }
        Ok(())
    }
}
