//! Voice SFU signaling client for Janus-style audio bridge gateways.
//!
//! The crate is sans-IO: it turns gateway frames into state transitions and
//! outbound frames, and leaves sockets and media engines to its callers.

pub mod error;
pub mod outbox;
pub mod peer;
pub mod protocol;
pub mod session;
pub mod transaction;

pub use error::SignalingError;
pub use outbox::{FrameSink, Outbox, TransportState};
pub use peer::MediaPeer;
pub use protocol::{Capability, GatewayMessage, Jsep, Request, SdpType};
pub use session::{ClientOptions, Dispatch, HandshakeState, IgnoredReason, SignalingClient};
pub use transaction::{RequestKind, TransactionRegistry, TransactionTag};
