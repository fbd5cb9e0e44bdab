//! Inter-request pacing
//!
//! The remote collections rate-limit aggressively, so the pipeline pauses
//! after every network-bound step. The pause is a collaborator rather than a
//! bare `sleep` so tests can count and skip it.

use std::time::Duration;

use tokio::time::sleep;

#[allow(async_fn_in_trait)]
pub trait Pacer {
    async fn pause(&self);
}

/// Fixed delay after each network call
#[derive(Debug, Clone, Copy)]
pub struct DelayPacer {
    delay: Duration,
}

impl DelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Pacer for DelayPacer {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}
