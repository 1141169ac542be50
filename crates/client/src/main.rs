mod config;
mod gateway;
mod telemetry;

use anyhow::Result;
use clap::{ArgAction, Args, Parser};
use murmur_media::WebRtcPeer;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::{CliOverrides, ClientConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(
    name = "murmur-client",
    version,
    about = "Listens to a Janus audio bridge room over WebRTC"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args, Debug, Default, Clone)]
struct ConfigArgs {
    /// Gateway WebSocket URL, e.g. ws://localhost:8188/
    #[arg(long)]
    gateway_url: Option<String>,
    #[arg(long)]
    protocol: Option<String>,
    #[arg(long)]
    plugin: Option<String>,
    /// Audio bridge room to join after attaching.
    #[arg(long)]
    room: Option<u64>,
    #[arg(long)]
    display: Option<String>,
    #[arg(long)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    keepalive_interval_secs: Option<u64>,
    #[arg(long)]
    handshake_timeout_secs: Option<u64>,
    #[arg(long = "stun-server", action = ArgAction::Append)]
    stun_server: Vec<String>,
    /// Publish a silent outbound audio track alongside the received mix.
    #[arg(long)]
    send_audio: Option<bool>,
}

impl ConfigArgs {
    fn into_overrides(self) -> CliOverrides {
        let stun_servers = if self.stun_server.is_empty() {
            None
        } else {
            Some(self.stun_server)
        };
        CliOverrides {
            gateway_url: self.gateway_url,
            protocol: self.protocol,
            plugin: self.plugin,
            room: self.room,
            display: self.display,
            log_format: self.log_format,
            keepalive_interval_secs: self.keepalive_interval_secs,
            handshake_timeout_secs: self.handshake_timeout_secs,
            stun_servers,
            send_audio: self.send_audio,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = cli.config.into_overrides();
    let mut config = ClientConfig::load()?;
    config.apply_overrides(&overrides)?;

    telemetry::init(&config);
    run(config).await
}

async fn run(config: ClientConfig) -> Result<()> {
    info!(
        gateway = %config.gateway_url,
        plugin = %config.plugin,
        room = ?config.room,
        "starting audio bridge listener"
    );

    let (peer, tracks) = WebRtcPeer::new(&config.media).await?;
    let mut peer = gateway::run_session(&config, peer, tracks, shutdown_signal()).await?;

    if let Some(playback) = peer.playback() {
        let stats = playback.stats();
        info!(packets = stats.packets, bytes = stats.bytes, "playback summary");
    }
    if let Err(err) = peer.close().await {
        warn!(%err, "failed to close peer connection");
    }

    info!("listener stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_convert_and_apply() {
        let cli = Cli::parse_from([
            "murmur-client",
            "--gateway-url",
            "ws://janus.test:8188/",
            "--room",
            "1234",
            "--display",
            "night-owl",
            "--log-format",
            "json",
            "--stun-server",
            "stun:stun.one.test:3478",
            "--stun-server",
            "stun:stun.two.test:3478",
            "--send-audio",
            "true",
        ]);
        let overrides = cli.config.into_overrides();
        assert_eq!(overrides.room, Some(1234));
        assert_eq!(overrides.stun_servers.as_ref().map(Vec::len), Some(2));

        let mut config = ClientConfig::default();
        config.apply_overrides(&overrides).expect("overrides apply");
        assert_eq!(config.gateway_url, "ws://janus.test:8188/");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.display.as_deref(), Some("night-owl"));
        assert_eq!(config.media.stun_servers[1], "stun:stun.two.test:3478");
        assert!(config.media.send_audio);
        assert!(config.client_options().send_audio);
    }

    #[test]
    fn empty_cli_leaves_config_untouched() {
        let cli = Cli::parse_from(["murmur-client"]);
        let mut config = ClientConfig::default();
        config
            .apply_overrides(&cli.config.into_overrides())
            .expect("defaults validate");
        assert_eq!(config, ClientConfig::default());
    }
}
