//! WebRTC media transport for the audio bridge listener.

pub mod peer;
pub mod playback;
pub mod publish;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use peer::WebRtcPeer;
pub use playback::{PacketSource, PlaybackSink, PlaybackStats};
pub use publish::SilencePublisher;

const ICE_URL_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MediaConfig {
    pub stun_servers: Vec<String>,
    /// Publish an outbound Opus track carrying silence.
    pub send_audio: bool,
}

pub fn validate_config(cfg: &MediaConfig) -> Result<()> {
    for server in &cfg.stun_servers {
        let server = server.trim();
        if server.is_empty() {
            anyhow::bail!("ice server entries cannot be blank");
        }
        if !ICE_URL_SCHEMES
            .iter()
            .any(|scheme| server.starts_with(scheme))
        {
            anyhow::bail!("unsupported ice server url '{server}'");
        }
    }

    Ok(())
}
