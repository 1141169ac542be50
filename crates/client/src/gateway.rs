use std::{future::Future, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use murmur_sfu_client::{Dispatch, MediaPeer, SignalingClient, SignalingError};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ClientConfig;

type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the gateway WebSocket, offering `protocol` as the sub-protocol.
pub async fn connect(url: &str, protocol: &str) -> Result<GatewaySocket> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid gateway url '{url}'"))?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_str(protocol).context("invalid websocket sub-protocol")?,
    );

    let (socket, response) = connect_async(request)
        .await
        .with_context(|| format!("failed to connect to gateway at {url}"))?;
    debug!(status = %response.status(), "websocket handshake complete");
    Ok(socket)
}

/// Drives one signaling session until shutdown or transport loss, returning
/// the media peer so the caller can tear it down.
pub async fn run_session<P, S>(
    config: &ClientConfig,
    peer: P,
    tracks: mpsc::UnboundedReceiver<P::Track>,
    shutdown: S,
) -> Result<P>
where
    P: MediaPeer,
    S: Future<Output = ()>,
{
    let connection_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "signaling",
        connection_id = %connection_id,
        gateway = %config.gateway_url
    );
    drive(config, peer, tracks, shutdown).instrument(span).await
}

async fn drive<P, S>(
    config: &ClientConfig,
    peer: P,
    mut tracks: mpsc::UnboundedReceiver<P::Track>,
    shutdown: S,
) -> Result<P>
where
    P: MediaPeer,
    S: Future<Output = ()>,
{
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let mut client = SignalingClient::new(config.client_options(), peer, Box::new(frame_tx));

    let mut socket = connect(&config.gateway_url, &config.protocol).await?;
    client.on_transport_open()?;

    let mut keepalive = config.keepalive_interval().map(keepalive_timer);
    let handshake_deadline = config.handshake_timeout().map(|limit| Instant::now() + limit);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; leaving gateway session");
                match client.destroy() {
                    Ok(()) | Err(SignalingError::NoSession) => {}
                    Err(err) => warn!(%err, "failed to queue session teardown"),
                }
                while let Ok(frame) = frame_rx.try_recv() {
                    if let Err(err) = socket.send(Message::Text(frame.into())).await {
                        warn!(%err, "failed to flush teardown frame");
                        break;
                    }
                }
                if let Err(err) = socket.close(None).await {
                    debug!(%err, "websocket close failed");
                }
                client.on_transport_closed();
                break;
            }
            Some(frame) = frame_rx.recv() => {
                if let Err(err) = socket.send(Message::Text(frame.into())).await {
                    client.on_transport_error(&err.to_string());
                    return Err(anyhow!(err).context("failed to send gateway frame"));
                }
            }
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match client.on_transport_message(text.as_str()).await {
                        Ok(Dispatch::Ignored(reason)) => debug!(?reason, "gateway message ignored"),
                        Ok(dispatch) => debug!(?dispatch, state = client.state().as_str(), "gateway message handled"),
                        Err(err) => warn!(%err, "failed to handle gateway message"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "gateway closed the connection");
                    return finish_closed(client);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    client.on_transport_error(&err.to_string());
                    return Err(anyhow!(err).context("gateway transport failed"));
                }
                None => return finish_closed(client),
            },
            Some(track) = tracks.recv() => {
                match client.on_remote_track(track).await {
                    Ok(true) => info!("playback bound to remote track"),
                    Ok(false) => debug!("additional remote track ignored"),
                    Err(err) => warn!(%err, "failed to bind playback"),
                }
            }
            _ = next_tick(&mut keepalive) => {
                if client.keepalive()? {
                    debug!("keepalive sent");
                }
            }
            _ = wait_until(handshake_deadline), if !client.handshake_complete() => {
                client.on_transport_error("handshake timed out");
                bail!(
                    "gateway handshake did not complete within {}s",
                    config.handshake_timeout_secs
                );
            }
        }
    }

    Ok(client.into_peer())
}

fn finish_closed<P: MediaPeer>(mut client: SignalingClient<P>) -> Result<P> {
    let completed = client.handshake_complete();
    client.on_transport_closed();
    if !completed {
        bail!("gateway closed the connection before the handshake completed");
    }
    Ok(client.into_peer())
}

fn keepalive_timer(period: Duration) -> Interval {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        extract::{
            ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
            State,
        },
        response::Response,
        routing::get,
        Router,
    };
    use murmur_sfu_client::Jsep;
    use serde_json::{json, Value};
    use std::io::ErrorKind;
    use tokio::{net::TcpListener, sync::oneshot, time::timeout};

    #[derive(Default)]
    struct ScriptedPeer {
        remote: Vec<Jsep>,
    }

    #[async_trait]
    impl MediaPeer for ScriptedPeer {
        type Track = ();

        async fn set_remote_description(&mut self, offer: Jsep) -> anyhow::Result<()> {
            self.remote.push(offer);
            Ok(())
        }

        async fn create_answer(&mut self) -> anyhow::Result<Jsep> {
            Ok(Jsep::answer("v=0 answer"))
        }

        async fn set_local_description(&mut self, answer: Jsep) -> anyhow::Result<Jsep> {
            Ok(answer)
        }

        async fn bind_playback(&mut self, _track: ()) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        Handshake,
        Silent,
        HangUp,
    }

    #[derive(Clone)]
    struct GatewayState {
        script: Script,
        frames: mpsc::UnboundedSender<Value>,
    }

    async fn bind_test_listener() -> Option<TcpListener> {
        match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => Some(listener),
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                eprintln!("skipping websocket test due to permission error: {err}");
                None
            }
            Err(err) => panic!("failed to bind test listener: {err}"),
        }
    }

    async fn gateway_ws(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
        ws.protocols(["janus-protocol"])
            .on_upgrade(move |socket| play_script(socket, state))
    }

    async fn reply(socket: &mut WebSocket, value: Value) {
        socket
            .send(WsMessage::Text(value.to_string().into()))
            .await
            .expect("gateway send");
    }

    async fn play_script(mut socket: WebSocket, state: GatewayState) {
        while let Some(Ok(message)) = socket.recv().await {
            let WsMessage::Text(text) = message else {
                continue;
            };
            let frame: Value = serde_json::from_str(text.as_str()).expect("client sends json");
            let _ = state.frames.send(frame.clone());

            match state.script {
                Script::Silent => {}
                Script::HangUp => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    return;
                }
                Script::Handshake => {
                    let transaction = frame["transaction"].clone();
                    match frame["janus"].as_str() {
                        Some("create") => {
                            reply(
                                &mut socket,
                                json!({"janus": "success", "transaction": transaction, "data": {"id": 42}}),
                            )
                            .await;
                        }
                        Some("attach") => {
                            reply(
                                &mut socket,
                                json!({"janus": "success", "transaction": transaction, "session_id": 42, "data": {"id": 7}}),
                            )
                            .await;
                            reply(
                                &mut socket,
                                json!({
                                    "janus": "event",
                                    "transaction": "gw-offer-1",
                                    "sender": 7,
                                    "plugindata": {
                                        "plugin": "janus.plugin.audiobridge",
                                        "data": {"audiobridge": "event"}
                                    },
                                    "jsep": {"type": "offer", "sdp": "v=0 offer"}
                                }),
                            )
                            .await;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn spawn_gateway(script: Script) -> Option<(String, mpsc::UnboundedReceiver<Value>)> {
        let listener = bind_test_listener().await?;
        let addr = listener.local_addr().expect("local addr");
        let (frames, received) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/", get(gateway_ws))
            .with_state(GatewayState { script, frames });
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake gateway");
        });
        Some((format!("ws://{addr}/"), received))
    }

    fn test_config(url: String) -> ClientConfig {
        ClientConfig {
            gateway_url: url,
            keepalive_interval_secs: 0,
            ..ClientConfig::default()
        }
    }

    async fn next_frame(received: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("frame arrives in time")
            .expect("gateway still running")
    }

    #[tokio::test]
    async fn answers_gateway_offer_and_tears_down_on_shutdown() {
        let Some((url, mut received)) = spawn_gateway(Script::Handshake).await else {
            return;
        };
        let config = test_config(url);
        let (_track_tx, tracks) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let session = tokio::spawn(async move {
            run_session(&config, ScriptedPeer::default(), tracks, async move {
                let _ = stop_rx.await;
            })
            .await
        });

        let create = next_frame(&mut received).await;
        assert_eq!(create["janus"], "create");
        let attach = next_frame(&mut received).await;
        assert_eq!(attach["janus"], "attach");
        assert_eq!(attach["session_id"], 42);
        assert_eq!(attach["plugin"], "janus.plugin.audiobridge");

        let answer = next_frame(&mut received).await;
        assert_eq!(answer["janus"], "message");
        assert_eq!(answer["transaction"], "gw-offer-1");
        assert_eq!(answer["handle_id"], 7);
        assert_eq!(answer["body"]["request"], "answer");
        assert_eq!(answer["jsep"]["type"], "answer");
        assert_eq!(answer["jsep"]["sdp"], "v=0 answer");

        stop_tx.send(()).expect("session still running");
        let detach = next_frame(&mut received).await;
        assert_eq!(detach["janus"], "detach");
        let destroy = next_frame(&mut received).await;
        assert_eq!(destroy["janus"], "destroy");

        let peer = timeout(Duration::from_secs(5), session)
            .await
            .expect("session ends after shutdown")
            .expect("session task")
            .expect("session succeeds");
        assert_eq!(peer.remote.len(), 1);
        assert_eq!(peer.remote[0].sdp, "v=0 offer");
    }

    #[tokio::test]
    async fn handshake_timeout_is_reported() {
        let Some((url, mut received)) = spawn_gateway(Script::Silent).await else {
            return;
        };
        let config = ClientConfig {
            handshake_timeout_secs: 1,
            ..test_config(url)
        };
        let (_track_tx, tracks) = mpsc::unbounded_channel();

        let result = timeout(
            Duration::from_secs(5),
            run_session(&config, ScriptedPeer::default(), tracks, std::future::pending()),
        )
        .await
        .expect("timeout fires before the test deadline");

        let err = result.err().expect("handshake must fail");
        assert!(err.to_string().contains("did not complete"));
        assert_eq!(next_frame(&mut received).await["janus"], "create");
    }

    #[tokio::test]
    async fn early_close_is_an_error() {
        let Some((url, _received)) = spawn_gateway(Script::HangUp).await else {
            return;
        };
        let config = test_config(url);
        let (_track_tx, tracks) = mpsc::unbounded_channel();

        let result = timeout(
            Duration::from_secs(5),
            run_session(&config, ScriptedPeer::default(), tracks, std::future::pending()),
        )
        .await
        .expect("session ends when the gateway hangs up");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_gateway_fails_to_connect() {
        let Some(listener) = bind_test_listener().await else {
            return;
        };
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let err = connect(&format!("ws://{addr}/"), "janus-protocol")
            .await
            .err()
            .expect("nothing is listening");
        assert!(err.to_string().contains("failed to connect"));
    }
}
