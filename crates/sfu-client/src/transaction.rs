use std::{collections::HashMap, fmt};

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::error::SignalingError;

const TAG_SUFFIX_LEN: usize = 12;

/// Correlation token attached to a request and echoed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionTag(String);

impl TransactionTag {
    pub fn generate(kind: RequestKind) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TAG_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{}_{}", kind.prefix(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionTag {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TransactionTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TransactionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Create,
    Attach,
    RoomJoin,
    Answer,
    Keepalive,
    Detach,
    Destroy,
}

impl RequestKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RequestKind::Create => "create",
            RequestKind::Attach => "join",
            RequestKind::RoomJoin => "room",
            RequestKind::Answer => "answer",
            RequestKind::Keepalive => "keepalive",
            RequestKind::Detach => "detach",
            RequestKind::Destroy => "destroy",
        }
    }
}

/// Outstanding requests keyed by the tag they were sent with.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    pending: HashMap<TransactionTag, RequestKind>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh tag for `kind` and records it as outstanding.
    pub fn issue(&mut self, kind: RequestKind) -> TransactionTag {
        loop {
            let tag = TransactionTag::generate(kind);
            if !self.pending.contains_key(&tag) {
                self.pending.insert(tag.clone(), kind);
                return tag;
            }
        }
    }

    pub fn register(&mut self, tag: TransactionTag, kind: RequestKind) -> Result<(), SignalingError> {
        if self.pending.contains_key(&tag) {
            return Err(SignalingError::DuplicateTransaction(tag.0));
        }
        self.pending.insert(tag, kind);
        Ok(())
    }

    pub fn resolve(&mut self, tag: &TransactionTag) -> Option<RequestKind> {
        self.pending.remove(tag)
    }

    pub fn peek(&self, tag: &TransactionTag) -> Option<RequestKind> {
        self.pending.get(tag).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
