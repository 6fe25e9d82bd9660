//! Dry-run sender: reports success for every destination, delivers nothing.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use relaypost_core::error::Result;
use relaypost_core::traits::Sender;
use relaypost_core::types::SendOutcome;

#[derive(Debug, Default)]
pub struct SimulatedSender {
    sends: AtomicUsize,
}

impl SimulatedSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sends accepted so far.
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sender for SimulatedSender {
    fn name(&self) -> &str { "simulated" }

    async fn send_text(&self, destination: &str, message: &str) -> Result<SendOutcome> {
        self.sends.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            destination,
            chars = message.chars().count(),
            "simulated send"
        );
        Ok(SendOutcome::delivered())
    }
}
