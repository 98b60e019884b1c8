//! Steady-state progress polling while the wizard is on the progress step

use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, instrument};

use super::Wizard;

/// Whether the poll loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Samples worker progress on a fixed interval for one visit to the
/// progress step.
///
/// Each poller is tied to the generation it was started for. Once the wizard
/// leaves progress the generation moves on and the poller stops issuing
/// requests; a response that was already in flight is discarded.
pub struct ProgressPoller {
    wizard: Wizard,
    generation: u64,
    interval: Duration,
}

impl ProgressPoller {
    pub fn new(wizard: Wizard, generation: u64, interval: Duration) -> Self {
        Self {
            wizard,
            generation,
            interval,
        }
    }

    #[instrument(skip(self), fields(generation = self.generation))]
    pub async fn run(self) {
        // First sample one interval after entering the step
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if !self.wizard.is_poll_active(self.generation) {
                debug!("Poll generation retired, stopping");
                break;
            }

            let result = self.wizard.client().get_progress().await;
            if self.wizard.apply_poll(self.generation, result) == PollControl::Stop {
                break;
            }
        }
    }
}
