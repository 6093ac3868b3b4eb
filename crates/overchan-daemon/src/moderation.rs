//! Moderation engine attachment.
//!
//! The engine that interprets control-group articles is an external
//! collaborator. The daemon forwards every `ctl` article onto this
//! channel; whoever holds the receiver consumes moderation events.

use overchan_wire::Article;
use tokio::sync::mpsc;

/// Capacity of the moderation queue.
const MODERATION_CHANNEL_CAP: usize = 16;

/// The daemon-held sender plus the takeable engine-side receiver.
pub struct ModerationQueue {
    tx: mpsc::Sender<Article>,
    rx: Option<mpsc::Receiver<Article>>,
}

impl ModerationQueue {
    /// Create the queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(MODERATION_CHANNEL_CAP);
        Self { tx, rx: Some(rx) }
    }

    /// Sender for the dispatcher.
    pub fn sender(&self) -> mpsc::Sender<Article> {
        self.tx.clone()
    }

    /// Hand the receiver to the moderation engine. Can be taken once.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<Article>> {
        self.rx.take()
    }
}

impl Default for ModerationQueue {
    fn default() -> Self {
        Self::new()
    }
}
