use serde::{Deserialize, Serialize};

/// Epoch / minibatch / global step counters for one training run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainClock {
    pub epoch: usize,
    pub minibatch: usize,
    pub step: usize,
}

impl TrainClock {
    pub fn starting_at(epoch: usize) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    /// One optimizer step.
    pub fn tick(&mut self) {
        self.minibatch += 1;
        self.step += 1;
    }

    /// End of an epoch.
    pub fn tock(&mut self) {
        self.epoch += 1;
        self.minibatch = 0;
    }
}
