use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::Jsep;

/// Local media endpoint negotiated through the gateway handshake.
#[async_trait]
pub trait MediaPeer: Send {
    type Track: Send;

    async fn set_remote_description(&mut self, offer: Jsep) -> Result<()>;
    async fn create_answer(&mut self) -> Result<Jsep>;
    /// Applies `answer` locally and returns the description to send to the gateway.
    async fn set_local_description(&mut self, answer: Jsep) -> Result<Jsep>;
    async fn bind_playback(&mut self, track: Self::Track) -> Result<()>;
}
