use std::collections::VecDeque;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::SignalingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
}

/// Destination for serialized frames once the transport is writable.
pub trait FrameSink: Send {
    fn transmit(&mut self, frame: String) -> Result<(), SignalingError>;
}

impl FrameSink for UnboundedSender<String> {
    fn transmit(&mut self, frame: String) -> Result<(), SignalingError> {
        self.send(frame).map_err(|_| SignalingError::TransportClosed)
    }
}

/// Serializes outbound frames, holding them back until the transport opens.
/// Once closed, frames are refused until the next `open`.
pub struct Outbox {
    state: TransportState,
    pending: VecDeque<String>,
    sink: Box<dyn FrameSink>,
}

impl Outbox {
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            state: TransportState::Connecting,
            pending: VecDeque::new(),
            sink,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn send(&mut self, frame: String) -> Result<(), SignalingError> {
        match self.state {
            TransportState::Open => {
                debug!(bytes = frame.len(), "sending frame");
                self.sink.transmit(frame)
            }
            TransportState::Connecting => {
                debug!(queued = self.pending.len() + 1, "transport not open; queueing frame");
                self.pending.push_back(frame);
                Ok(())
            }
            TransportState::Closed => {
                warn!(bytes = frame.len(), "transport closed; dropping frame");
                Err(SignalingError::TransportClosed)
            }
        }
    }

    /// Marks the transport open and flushes queued frames in enqueue order.
    pub fn open(&mut self) -> Result<usize, SignalingError> {
        self.state = TransportState::Open;
        let mut flushed = 0;
        while let Some(frame) = self.pending.pop_front() {
            if let Err(err) = self.sink.transmit(frame.clone()) {
                self.pending.push_front(frame);
                return Err(err);
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "flushed queued frames");
        }
        Ok(flushed)
    }

    pub fn close(&mut self) {
        self.state = TransportState::Closed;
        if !self.pending.is_empty() {
            warn!(dropped = self.pending.len(), "discarding queued frames on close");
            self.pending.clear();
        }
    }
}
