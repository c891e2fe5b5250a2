//! Transaction id generation for MBAP framing
//!
//! A TCP master stamps every request with a transaction id and expects the
//! server to echo it. Ids are shared by clones and wrap after 0xFFFF.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Transaction id counter
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct TransactionIds {
    next: Arc<AtomicU16>,
}

impl TransactionIds {
    /// First id handed out
    pub const INITIAL: u16 = 1;

    pub fn new() -> Self {
        Self::starting_at(Self::INITIAL)
    }

    /// Start the counter at an arbitrary id
    pub fn starting_at(id: u16) -> Self {
        Self {
            next: Arc::new(AtomicU16::new(id)),
        }
    }

    /// Get next transaction id
    ///
    /// Wraps around to 0 after 65535.
    pub fn next_id(&self) -> u16 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Peek at the id the next call will return
    pub fn peek(&self) -> u16 {
        self.next.load(Ordering::Acquire)
    }
}

impl Default for TransactionIds {
    fn default() -> Self {
        Self::new()
    }
}
