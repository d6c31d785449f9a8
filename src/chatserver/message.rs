// Message types and the bounded in-memory message log

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default number of messages kept in memory
pub const DEFAULT_STORAGE_LIMIT: usize = 1000;

/// A posted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Nickname of the sender
    #[serde(rename = "who")]
    pub sender: String,
    /// Global sequence number assigned at acceptance
    #[serde(rename = "n")]
    pub sequence: u64,
    /// Message content
    pub text: String,
}

/// Errors returned by [`MessageLog`] queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// The watermark is beyond any sequence ever issued
    #[error("requested message number is too big ({last}, last is {total})")]
    OutOfRange { last: u64, total: u64 },
}

/// Read-only snapshot of the log counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    /// Messages ever accepted
    pub total: u64,
    /// Messages currently retained
    pub stored: usize,
    /// Retention limit
    #[serde(rename = "size limit")]
    pub limit: usize,
}

#[derive(Debug, Default)]
struct LogState {
    total: u64,
    retained: VecDeque<Message>,
}

/// Bounded, ordered store of posted messages
///
/// The counter and the retained messages live under one lock so that a
/// sequence number becomes visible to [`MessageLog::since`] in the same step
/// that assigns it.
#[derive(Debug)]
pub struct MessageLog {
    state: RwLock<LogState>,
    limit: usize,
}

impl MessageLog {
    /// Create an empty log keeping at most `limit` messages
    pub fn new(limit: usize) -> Self {
        Self {
            state: RwLock::new(LogState {
                total: 0,
                retained: VecDeque::with_capacity(limit.min(DEFAULT_STORAGE_LIMIT)),
            }),
            limit: limit.max(1),
        }
    }

    /// Accept a message, assigning it the next sequence number
    pub async fn append(&self, sender: String, text: String) -> Message {
        let mut state = self.state.write().await;

        state.total += 1;
        let message = Message {
            sender,
            sequence: state.total,
            text,
        };

        // Enforce the retention limit (FIFO)
        while state.retained.len() >= self.limit {
            state.retained.pop_front();
        }

        state.retained.push_back(message.clone());
        message
    }

    /// Retained messages with a sequence strictly greater than `last`
    pub async fn since(&self, last: u64) -> Result<Vec<Message>, LogError> {
        let state = self.state.read().await;

        if last > state.total {
            return Err(LogError::OutOfRange {
                last,
                total: state.total,
            });
        }

        // Retained messages are sorted, so skip the prefix at or below `last`
        let start = state.retained.partition_point(|m| m.sequence <= last);
        Ok(state.retained.range(start..).cloned().collect())
    }

    /// Snapshot of the counters
    pub async fn stats(&self) -> LogStats {
        let state = self.state.read().await;

        LogStats {
            total: state.total,
            stored: state.retained.len(),
            limit: self.limit,
        }
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_LIMIT)
    }
}
