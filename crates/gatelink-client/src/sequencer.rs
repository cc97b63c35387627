//! Event sequence tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hole in the event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGap {
    /// Sequence number that should have come next.
    pub expected: u64,
    /// Sequence number that actually arrived.
    pub received: u64,
}

impl fmt::Display for SequenceGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event gap detected (expected seq {}, got {})",
            self.expected, self.received
        )
    }
}

/// Cursor over the `seq` numbers of one connection.
///
/// Gaps are advisory; the cursor always advances to the latest value seen.
#[derive(Debug, Default)]
pub struct EventSequencer {
    last: Option<u64>,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seq`, reporting a gap if numbers were skipped.
    pub fn observe(&mut self, seq: Option<u64>) -> Option<SequenceGap> {
        let seq = seq?;
        let gap = match self.last {
            Some(last) if seq > last.saturating_add(1) => Some(SequenceGap {
                expected: last + 1,
                received: seq,
            }),
            _ => None,
        };
        self.last = Some(seq);
        gap
    }

    /// Last sequence number seen on this connection.
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Forget the cursor; called for every new connection.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
