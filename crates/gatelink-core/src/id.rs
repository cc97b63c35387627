//! Correlation ID generation.
//!
//! Every outbound request frame carries an ID that the server echoes back in
//! its response. IDs only need to be unique among requests still in flight,
//! but the default generator hands out UUIDs so they never repeat at all.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of correlation IDs for request frames.
pub trait IdGenerator: Send + Sync {
    /// Produce the next ID.
    fn next_id(&self) -> String;
}

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// UUID v4 generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid()
    }
}

/// Monotonic `prefix-N` generator.
///
/// Predictable IDs make wire traces easy to read, which is mostly useful in
/// tests and when debugging against a local gateway.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Create a generator whose first ID is `{prefix}-1`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
