//! Janus gateway wire format.
//!
//! Every frame is a UTF-8 JSON object whose `janus` field names the message
//! kind. Requests carry a `transaction` tag that the gateway echoes back.

use serde::{de::Error as DeError, Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{error::SignalingError, transaction::TransactionTag};

pub const AUDIO_BRIDGE_PLUGIN: &str = "janus.plugin.audiobridge";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description envelope exchanged with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jsep {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trickle: Option<bool>,
}

impl Jsep {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
            trickle: None,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
            trickle: None,
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// A named gateway plugin that a session attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    plugin: String,
}

impl Capability {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    pub fn audio_bridge() -> Self {
        Self::new(AUDIO_BRIDGE_PLUGIN)
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Key the plugin uses inside `plugindata.data`, e.g. `audiobridge`.
    pub fn event_key(&self) -> &str {
        self.plugin.rsplit('.').next().unwrap_or(&self.plugin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "janus", rename_all = "lowercase")]
pub enum Request {
    Create {
        transaction: TransactionTag,
    },
    Attach {
        session_id: u64,
        transaction: TransactionTag,
        plugin: String,
    },
    Message {
        session_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handle_id: Option<u64>,
        transaction: TransactionTag,
        body: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jsep: Option<Jsep>,
    },
    Keepalive {
        session_id: u64,
        transaction: TransactionTag,
    },
    Detach {
        session_id: u64,
        handle_id: u64,
        transaction: TransactionTag,
    },
    Destroy {
        session_id: u64,
        transaction: TransactionTag,
    },
}

impl Request {
    pub fn answer(
        session_id: u64,
        handle_id: Option<u64>,
        transaction: TransactionTag,
        jsep: Jsep,
    ) -> Self {
        Request::Message {
            session_id,
            handle_id,
            transaction,
            body: json!({ "request": "answer" }),
            jsep: Some(jsep),
        }
    }

    pub fn join_room(
        session_id: u64,
        handle_id: Option<u64>,
        transaction: TransactionTag,
        room: u64,
        display: Option<&str>,
        send_audio: bool,
    ) -> Self {
        let mut body = json!({ "request": "join", "room": room });
        if let Some(display) = display {
            body["display"] = Value::String(display.to_owned());
        }
        if send_audio {
            body["audio"] = Value::Bool(true);
        }
        Request::Message {
            session_id,
            handle_id,
            transaction,
            body,
            jsep: None,
        }
    }

    pub fn transaction(&self) -> &TransactionTag {
        match self {
            Request::Create { transaction }
            | Request::Attach { transaction, .. }
            | Request::Message { transaction, .. }
            | Request::Keepalive { transaction, .. }
            | Request::Detach { transaction, .. }
            | Request::Destroy { transaction, .. } => transaction,
        }
    }

    pub fn to_frame(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(SignalingError::Serialize)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IdData {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PluginData {
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SuccessMessage {
    pub transaction: TransactionTag,
    #[serde(default)]
    pub data: Option<IdData>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AckMessage {
    pub transaction: TransactionTag,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventMessage {
    #[serde(default)]
    pub transaction: Option<TransactionTag>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
    #[serde(default)]
    pub jsep: Option<Jsep>,
}

impl EventMessage {
    /// True when `plugindata.data.<event key>` is the string `"event"`.
    pub fn is_capability_event(&self, capability: &Capability) -> bool {
        self.plugindata
            .as_ref()
            .and_then(|plugindata| plugindata.data.get(capability.event_key()))
            .and_then(Value::as_str)
            .is_some_and(|value| value == "event")
    }

    pub fn offer(&self) -> Option<&Jsep> {
        self.jsep.as_ref().filter(|jsep| jsep.is_offer())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayFault {
    pub code: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorMessage {
    #[serde(default)]
    pub transaction: Option<TransactionTag>,
    pub error: GatewayFault,
}

/// Unsolicited gateway notifications about the media path.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    Success(SuccessMessage),
    Ack(AckMessage),
    Event(EventMessage),
    Error(ErrorMessage),
    Notification { kind: String, body: Notification },
    Other(String),
}

const NOTIFICATION_KINDS: [&str; 6] = ["webrtcup", "media", "hangup", "slowlink", "timeout", "detached"];

impl GatewayMessage {
    pub fn parse(raw: &str) -> Result<Self, SignalingError> {
        let value: Value = serde_json::from_str(raw).map_err(SignalingError::MalformedMessage)?;
        let kind = value
            .get("janus")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SignalingError::MalformedMessage(serde_json::Error::custom(
                    "missing string field `janus`",
                ))
            })?
            .to_owned();
        let message = match kind.as_str() {
            "success" => GatewayMessage::Success(decode(value)?),
            "ack" => GatewayMessage::Ack(decode(value)?),
            "event" => GatewayMessage::Event(decode(value)?),
            "error" => GatewayMessage::Error(decode(value)?),
            other if NOTIFICATION_KINDS.contains(&other) => GatewayMessage::Notification {
                body: decode(value)?,
                kind: other.to_owned(),
            },
            other => GatewayMessage::Other(other.to_owned()),
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            GatewayMessage::Success(_) => "success",
            GatewayMessage::Ack(_) => "ack",
            GatewayMessage::Event(_) => "event",
            GatewayMessage::Error(_) => "error",
            GatewayMessage::Notification { kind, .. } | GatewayMessage::Other(kind) => kind,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, SignalingError> {
    serde_json::from_value(value).map_err(SignalingError::MalformedMessage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(value: &str) -> TransactionTag {
        TransactionTag::from(value)
    }

    #[test]
    fn create_request_matches_wire_shape() {
        let frame = Request::Create {
            transaction: tag("create_abc"),
        }
        .to_frame()
        .expect("encode");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({ "janus": "create", "transaction": "create_abc" }));
    }

    #[test]
    fn attach_request_names_plugin_and_session() {
        let request = Request::Attach {
            session_id: 42,
            transaction: tag("join_xyz"),
            plugin: AUDIO_BRIDGE_PLUGIN.to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "janus": "attach",
                "session_id": 42,
                "transaction": "join_xyz",
                "plugin": "janus.plugin.audiobridge"
            })
        );
    }

    #[test]
    fn answer_message_carries_body_and_jsep() {
        let request = Request::answer(42, None, tag("evt-1"), Jsep::answer("v=0"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "janus": "message",
                "session_id": 42,
                "transaction": "evt-1",
                "body": { "request": "answer" },
                "jsep": { "type": "answer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn join_room_includes_display_when_present() {
        let request =
            Request::join_room(7, Some(9), tag("join_room"), 1234, Some("listener"), false);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["handle_id"], 9);
        assert_eq!(
            value["body"],
            json!({ "request": "join", "room": 1234, "display": "listener" })
        );

        let request = Request::join_room(7, Some(9), tag("join_room"), 1234, None, true);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["body"],
            json!({ "request": "join", "room": 1234, "audio": true })
        );
    }

    #[test]
    fn parses_create_success() {
        let message =
            GatewayMessage::parse(r#"{"janus":"success","transaction":"create_abc","data":{"id":42}}"#)
                .expect("parse");
        let GatewayMessage::Success(success) = message else {
            panic!("expected success, got {message:?}");
        };
        assert_eq!(success.transaction.as_str(), "create_abc");
        assert_eq!(success.data, Some(IdData { id: 42 }));
    }

    #[test]
    fn media_event_exposes_offer() {
        let raw = r#"{
            "janus": "event",
            "transaction": "join_1",
            "plugindata": { "plugin": "janus.plugin.audiobridge", "data": { "audiobridge": "event" } },
            "jsep": { "type": "offer", "sdp": "v=0 offer" }
        }"#;
        let GatewayMessage::Event(event) = GatewayMessage::parse(raw).unwrap() else {
            panic!("expected event");
        };
        assert!(event.is_capability_event(&Capability::audio_bridge()));
        assert_eq!(event.offer().map(|jsep| jsep.sdp.as_str()), Some("v=0 offer"));
    }

    #[test]
    fn answer_jsep_is_not_treated_as_offer() {
        let raw = r#"{"janus":"event","plugindata":{"data":{"audiobridge":"event"}},"jsep":{"type":"answer","sdp":"x"}}"#;
        let GatewayMessage::Event(event) = GatewayMessage::parse(raw).unwrap() else {
            panic!("expected event");
        };
        assert!(event.offer().is_none());
    }

    #[test]
    fn other_plugin_events_do_not_match_capability() {
        let raw = r#"{"janus":"event","plugindata":{"data":{"videoroom":"event"}}}"#;
        let GatewayMessage::Event(event) = GatewayMessage::parse(raw).unwrap() else {
            panic!("expected event");
        };
        assert!(!event.is_capability_event(&Capability::audio_bridge()));
    }

    #[test]
    fn rejects_frames_without_kind() {
        let err = GatewayMessage::parse(r#"{"transaction":"t"}"#).unwrap_err();
        assert!(matches!(err, SignalingError::MalformedMessage(_)));

        let err = GatewayMessage::parse("not json").unwrap_err();
        assert!(matches!(err, SignalingError::MalformedMessage(_)));
    }

    #[test]
    fn rejects_unknown_sdp_type() {
        let raw = r#"{"janus":"event","jsep":{"type":"bogus","sdp":"x"}}"#;
        assert!(matches!(
            GatewayMessage::parse(raw),
            Err(SignalingError::MalformedMessage(_))
        ));
    }

    #[test]
    fn unknown_kinds_and_notifications_are_preserved() {
        let message = GatewayMessage::parse(r#"{"janus":"webrtcup","sender":5}"#).unwrap();
        assert_eq!(message.kind(), "webrtcup");
        assert!(matches!(message, GatewayMessage::Notification { .. }));

        let message = GatewayMessage::parse(r#"{"janus":"trickle"}"#).unwrap();
        assert_eq!(message, GatewayMessage::Other("trickle".into()));
    }

    #[test]
    fn capability_event_key_is_last_segment() {
        assert_eq!(Capability::audio_bridge().event_key(), "audiobridge");
        assert_eq!(Capability::new("echotest").event_key(), "echotest");
    }
}
