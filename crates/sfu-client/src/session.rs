//! Handshake driver for a single gateway connection.
//!
//! `SignalingClient` is fed transport callbacks (open, frame, error, close) and
//! inbound media tracks from one event loop. It walks the
//! create → attach → offer/answer sequence and writes requests through its
//! [`Outbox`].

use serde::de::Error as DeError;
use tracing::{debug, info, warn};

use crate::{
    error::SignalingError,
    outbox::{FrameSink, Outbox},
    peer::MediaPeer,
    protocol::{Capability, ErrorMessage, EventMessage, GatewayMessage, Request, SuccessMessage},
    transaction::{RequestKind, TransactionRegistry, TransactionTag},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub capability: Capability,
    /// Audio bridge room to join once the plugin handle is attached.
    pub room: Option<u64>,
    pub display: Option<String>,
    /// Whether the local peer publishes audio into the room.
    pub send_audio: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            capability: Capability::audio_bridge(),
            room: None,
            display: None,
            send_audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    SessionPending,
    SessionEstablished,
    JoinedAwaitingOffer,
    MediaNegotiating,
    MediaActive,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::SessionPending => "session_pending",
            HandshakeState::SessionEstablished => "session_established",
            HandshakeState::JoinedAwaitingOffer => "joined_awaiting_offer",
            HandshakeState::MediaNegotiating => "media_negotiating",
            HandshakeState::MediaActive => "media_active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoredReason {
    UnknownTransaction(TransactionTag),
    UnexpectedEventOrdering { kind: String },
}

/// Observable outcome of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    SessionCreated { session_id: u64 },
    Attached { handle_id: Option<u64> },
    AnswerSent { transaction: TransactionTag },
    AwaitingOffer,
    Acknowledged(RequestKind),
    GatewayError {
        request: Option<RequestKind>,
        code: i64,
        reason: String,
    },
    Notification(String),
    Ignored(IgnoredReason),
}

pub struct SignalingClient<P: MediaPeer> {
    options: ClientOptions,
    state: HandshakeState,
    session_id: Option<u64>,
    handle_id: Option<u64>,
    registry: TransactionRegistry,
    outbox: Outbox,
    peer: P,
    playback_bound: bool,
}

impl<P: MediaPeer> SignalingClient<P> {
    pub fn new(options: ClientOptions, peer: P, sink: Box<dyn FrameSink>) -> Self {
        Self {
            options,
            state: HandshakeState::Disconnected,
            session_id: None,
            handle_id: None,
            registry: TransactionRegistry::new(),
            outbox: Outbox::new(sink),
            peer,
            playback_bound: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    pub fn handle_id(&self) -> Option<u64> {
        self.handle_id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    /// Consumes the client, returning the media peer for teardown.
    pub fn into_peer(self) -> P {
        self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// True once the plugin handle is attached.
    pub fn handshake_complete(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::JoinedAwaitingOffer
                | HandshakeState::MediaNegotiating
                | HandshakeState::MediaActive
        )
    }

    /// Hands `frame` to the outbox. Frames queue while connecting and are
    /// refused after close.
    pub fn send(&mut self, frame: String) -> Result<(), SignalingError> {
        self.outbox.send(frame)
    }

    fn send_request(&mut self, request: &Request) -> Result<(), SignalingError> {
        let frame = request.to_frame()?;
        debug!(transaction = %request.transaction(), "sending gateway request");
        self.outbox.send(frame)
    }

    pub fn on_transport_open(&mut self) -> Result<(), SignalingError> {
        info!("signaling transport open");
        self.outbox.open()?;

        let transaction = self.registry.issue(RequestKind::Create);
        self.send_request(&Request::Create { transaction })?;
        self.state = HandshakeState::SessionPending;
        Ok(())
    }

    pub async fn on_transport_message(&mut self, raw: &str) -> Result<Dispatch, SignalingError> {
        let message = GatewayMessage::parse(raw)?;
        debug!(kind = message.kind(), state = self.state.as_str(), "gateway message");

        let dispatch = match message {
            GatewayMessage::Success(success) => self.handle_success(success)?,
            GatewayMessage::Ack(ack) => match self.registry.resolve(&ack.transaction) {
                Some(kind) => Dispatch::Acknowledged(kind),
                None => Dispatch::Ignored(IgnoredReason::UnknownTransaction(ack.transaction)),
            },
            GatewayMessage::Event(event) => self.handle_event(event).await?,
            GatewayMessage::Error(error) => self.handle_error(error),
            GatewayMessage::Notification { kind, body } => {
                info!(%kind, sender = ?body.sender, reason = ?body.reason, "gateway notification");
                Dispatch::Notification(kind)
            }
            GatewayMessage::Other(kind) => {
                Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering { kind })
            }
        };

        if let Dispatch::Ignored(reason) = &dispatch {
            debug!(?reason, state = self.state.as_str(), "ignoring gateway message");
        }
        Ok(dispatch)
    }

    fn handle_success(&mut self, success: SuccessMessage) -> Result<Dispatch, SignalingError> {
        match self.registry.resolve(&success.transaction) {
            Some(RequestKind::Create) => self.on_session_created(success),
            Some(RequestKind::Attach) => self.on_attached(success),
            Some(kind) => Ok(Dispatch::Acknowledged(kind)),
            None => Ok(Dispatch::Ignored(IgnoredReason::UnknownTransaction(
                success.transaction,
            ))),
        }
    }

    fn on_session_created(&mut self, success: SuccessMessage) -> Result<Dispatch, SignalingError> {
        if self.session_id.is_some() || self.state != HandshakeState::SessionPending {
            return Ok(Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering {
                kind: "success".into(),
            }));
        }
        let session_id = success.data.map(|data| data.id).ok_or_else(|| {
            SignalingError::MalformedMessage(serde_json::Error::custom(
                "create response is missing `data.id`",
            ))
        })?;

        info!(session_id, "gateway session created");
        self.session_id = Some(session_id);
        self.state = HandshakeState::SessionEstablished;

        let transaction = self.registry.issue(RequestKind::Attach);
        self.send_request(&Request::Attach {
            session_id,
            transaction,
            plugin: self.options.capability.plugin().to_owned(),
        })?;
        Ok(Dispatch::SessionCreated { session_id })
    }

    fn on_attached(&mut self, success: SuccessMessage) -> Result<Dispatch, SignalingError> {
        let Some(session_id) = self.session_id else {
            return Ok(Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering {
                kind: "success".into(),
            }));
        };
        if self.state != HandshakeState::SessionEstablished {
            return Ok(Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering {
                kind: "success".into(),
            }));
        }

        self.handle_id = success.data.map(|data| data.id);
        self.state = HandshakeState::JoinedAwaitingOffer;
        info!(
            plugin = self.options.capability.plugin(),
            handle_id = ?self.handle_id,
            "attached to plugin; waiting for SDP offer"
        );

        if let Some(room) = self.options.room {
            let transaction = self.registry.issue(RequestKind::RoomJoin);
            let request = Request::join_room(
                session_id,
                self.handle_id,
                transaction,
                room,
                self.options.display.as_deref(),
                self.options.send_audio,
            );
            self.send_request(&request)?;
        }

        Ok(Dispatch::Attached {
            handle_id: self.handle_id,
        })
    }

    async fn handle_event(&mut self, event: EventMessage) -> Result<Dispatch, SignalingError> {
        if !event.is_capability_event(&self.options.capability) {
            return Ok(Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering {
                kind: "event".into(),
            }));
        }
        let Some(offer) = event.offer().cloned() else {
            info!("plugin event carried no SDP offer; still waiting");
            return Ok(Dispatch::AwaitingOffer);
        };
        let Some(session_id) = self.session_id else {
            return Ok(Dispatch::Ignored(IgnoredReason::UnexpectedEventOrdering {
                kind: "event".into(),
            }));
        };

        info!("received SDP offer; applying remote description");
        self.peer.set_remote_description(offer).await?;
        let answer = self.peer.create_answer().await?;
        let local = self.peer.set_local_description(answer).await?;

        let transaction = match event.transaction {
            Some(tag) => {
                self.registry.resolve(&tag);
                self.registry.register(tag.clone(), RequestKind::Answer)?;
                tag
            }
            None => self.registry.issue(RequestKind::Answer),
        };
        self.send_request(&Request::answer(
            session_id,
            self.handle_id,
            transaction.clone(),
            local,
        ))?;

        if self.state != HandshakeState::MediaActive {
            self.state = HandshakeState::MediaNegotiating;
        }
        info!(%transaction, "sent SDP answer");
        Ok(Dispatch::AnswerSent { transaction })
    }

    fn handle_error(&mut self, error: ErrorMessage) -> Dispatch {
        let request = error
            .transaction
            .as_ref()
            .and_then(|tag| self.registry.resolve(tag));
        warn!(
            code = error.error.code,
            reason = %error.error.reason,
            ?request,
            "gateway returned error"
        );
        Dispatch::GatewayError {
            request,
            code: error.error.code,
            reason: error.error.reason,
        }
    }

    /// Binds playback to the first inbound track; later tracks are ignored.
    pub async fn on_remote_track(&mut self, track: P::Track) -> Result<bool, SignalingError> {
        if self.playback_bound {
            debug!("playback already bound; ignoring additional track");
            return Ok(false);
        }
        self.peer.bind_playback(track).await?;
        self.playback_bound = true;
        self.state = HandshakeState::MediaActive;
        info!("inbound audio track bound to playback");
        Ok(true)
    }

    pub fn on_transport_error(&mut self, reason: &str) {
        warn!(%reason, state = self.state.as_str(), "signaling transport error");
        self.disconnect();
    }

    pub fn on_transport_closed(&mut self) {
        info!(state = self.state.as_str(), "signaling transport closed");
        self.disconnect();
    }

    fn disconnect(&mut self) {
        self.state = HandshakeState::Disconnected;
        self.outbox.close();
        self.registry.clear();
        self.session_id = None;
        self.handle_id = None;
    }

    /// Sends a session keepalive. Returns `false` when no session exists yet.
    pub fn keepalive(&mut self) -> Result<bool, SignalingError> {
        let Some(session_id) = self.session_id else {
            return Ok(false);
        };
        let transaction = self.registry.issue(RequestKind::Keepalive);
        self.send_request(&Request::Keepalive {
            session_id,
            transaction,
        })?;
        Ok(true)
    }

    /// Detaches the plugin handle and destroys the gateway session.
    pub fn destroy(&mut self) -> Result<(), SignalingError> {
        let session_id = self.session_id.take().ok_or(SignalingError::NoSession)?;
        if let Some(handle_id) = self.handle_id.take() {
            let transaction = self.registry.issue(RequestKind::Detach);
            self.send_request(&Request::Detach {
                session_id,
                handle_id,
                transaction,
            })?;
        }
        let transaction = self.registry.issue(RequestKind::Destroy);
        self.send_request(&Request::Destroy {
            session_id,
            transaction,
        })?;
        info!(session_id, "gateway session destroyed");
        self.state = HandshakeState::Disconnected;
        Ok(())
    }
}
