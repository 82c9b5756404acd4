//! Identifier generation for messages and sessions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// A new XML ID. Never starts with a digit.
    fn message_id(&self) -> String;

    /// A new IdP session index.
    fn session_index(&self) -> String;
}

/// Random identifiers from UUIDv4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn message_id(&self) -> String {
        // xsd:ID must not start with a digit
        let uuid = Uuid::new_v4().to_string();
        format!("_{}", &uuid[1..])
    }

    fn session_index(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Predictable identifiers: `_{prefix}{n}` and `session-{n}`.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceIdGenerator {
    /// Creates a generator starting at 1.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn message_id(&self) -> String {
        format!("_{}{}", self.prefix, self.bump())
    }

    fn session_index(&self) -> String {
        format!("session-{}", self.bump())
    }
}
