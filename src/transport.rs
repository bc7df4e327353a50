use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::model::{IncomingUpdate, PressTarget};

/// Outbound actions on the chat session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Press a button: click it in place for inline keyboards, or send its
    /// label for reply keyboards.
    async fn press(&self, target: &PressTarget) -> Result<()>;

    /// Send plain text to a peer (username or numeric chat id).
    async fn send_text(&self, peer: &str, text: &str) -> Result<()>;
}

/// Inbound message stream; returns updates with `update_id >= offset`,
/// waiting up to `timeout` when none are ready.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<IncomingUpdate>>;
}
