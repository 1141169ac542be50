use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use murmur_sfu_client::{Jsep, MediaPeer, SdpType};
use tokio::sync::mpsc;
use tracing::{info, warn};
use webrtc::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine,
        APIBuilder,
    },
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::sdp_type::RTCSdpType, sdp::session_description::RTCSessionDescription,
        RTCPeerConnection,
    },
    track::{track_local::TrackLocal, track_remote::TrackRemote},
};

use crate::{
    playback::PlaybackSink,
    publish::{opus_track, SilencePublisher},
    MediaConfig,
};

/// WebRTC endpoint answering the gateway's offers. It always receives and,
/// when configured, also publishes a silent Opus track.
pub struct WebRtcPeer {
    connection: Arc<RTCPeerConnection>,
    playback: Option<PlaybackSink>,
    publisher: Option<SilencePublisher>,
}

impl WebRtcPeer {
    /// Builds the peer connection. Inbound tracks are delivered on the returned
    /// receiver so the signaling loop can hand them back through
    /// [`MediaPeer::bind_playback`].
    pub async fn new(config: &MediaConfig) -> Result<(Self, mpsc::UnboundedReceiver<Arc<TrackRemote>>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("failed to register codecs")?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .context("failed to register interceptors")?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let connection = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .context("failed to create peer connection")?,
        );

        connection.on_peer_connection_state_change(Box::new(|state: RTCPeerConnectionState| {
            match state {
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected => {
                    warn!(%state, "peer connection degraded");
                }
                _ => info!(%state, "peer connection state changed"),
            }
            Box::pin(async {})
        }));

        // The outbound track must exist before the offer arrives so the
        // answer negotiates sendrecv instead of recvonly.
        let publisher = if config.send_audio {
            let track = opus_track("murmur");
            connection
                .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .context("failed to add outbound audio track")?;
            info!("publishing silent outbound audio track");
            Some(SilencePublisher::spawn(track))
        } else {
            None
        };

        let (track_tx, track_rx) = mpsc::unbounded_channel();
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            info!(kind = %track.kind(), ssrc = track.ssrc(), "received remote track");
            if track_tx.send(track).is_err() {
                warn!("signaling loop gone; dropping remote track");
            }
            Box::pin(async {})
        }));

        Ok((
            Self {
                connection,
                playback: None,
                publisher,
            },
            track_rx,
        ))
    }

    pub fn playback(&self) -> Option<&PlaybackSink> {
        self.playback.as_ref()
    }

    pub fn publisher(&self) -> Option<&SilencePublisher> {
        self.publisher.as_ref()
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(playback) = self.playback.take() {
            playback.close();
        }
        if let Some(publisher) = self.publisher.take() {
            publisher.close();
        }
        self.connection
            .close()
            .await
            .context("failed to close peer connection")
    }
}

fn to_jsep(description: RTCSessionDescription) -> Result<Jsep> {
    Ok(Jsep {
        sdp_type: sdp_type_from_rtc(description.sdp_type)?,
        sdp: description.sdp,
        trickle: None,
    })
}

fn sdp_type_from_rtc(sdp_type: RTCSdpType) -> Result<SdpType> {
    match sdp_type {
        RTCSdpType::Offer => Ok(SdpType::Offer),
        RTCSdpType::Answer => Ok(SdpType::Answer),
        RTCSdpType::Pranswer => Ok(SdpType::Pranswer),
        RTCSdpType::Rollback => Ok(SdpType::Rollback),
        RTCSdpType::Unspecified => Err(anyhow!("session description has no type")),
    }
}

#[async_trait]
impl MediaPeer for WebRtcPeer {
    type Track = Arc<TrackRemote>;

    async fn set_remote_description(&mut self, offer: Jsep) -> Result<()> {
        if !offer.is_offer() {
            bail!("expected an offer, got {:?}", offer.sdp_type);
        }
        let description = RTCSessionDescription::offer(offer.sdp).context("invalid offer SDP")?;
        self.connection
            .set_remote_description(description)
            .await
            .context("failed to set remote description")
    }

    async fn create_answer(&mut self) -> Result<Jsep> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .context("failed to create answer")?;
        to_jsep(answer)
    }

    async fn set_local_description(&mut self, answer: Jsep) -> Result<Jsep> {
        let description = RTCSessionDescription::answer(answer.sdp).context("invalid answer SDP")?;

        // Janus expects full candidates in the answer; no trickle is sent.
        let mut gathered = self.connection.gathering_complete_promise().await;
        self.connection
            .set_local_description(description)
            .await
            .context("failed to set local description")?;
        let _ = gathered.recv().await;

        let local = self
            .connection
            .local_description()
            .await
            .ok_or_else(|| anyhow!("local description missing after gathering"))?;
        to_jsep(local)
    }

    async fn bind_playback(&mut self, track: Self::Track) -> Result<()> {
        if self.playback.is_some() {
            bail!("playback already bound");
        }
        info!(kind = %track.kind(), ssrc = track.ssrc(), "starting playback sink");
        self.playback = Some(PlaybackSink::spawn(track));
        Ok(())
    }
}
