//! Client configuration.
//!
//! Both configs deserialize with every field optional, so an embedder's
//! config file only needs to name what it overrides.

use serde::Deserialize;

/// Configuration for [`crate::StatefulCallClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CallClientConfig {
    /// Ended calls kept in `calls_ended`; the oldest is dropped first.
    pub max_ended_calls: usize,
    /// Departed participants kept per call in `remote_participants_ended`.
    pub max_ended_participants: usize,
}

impl Default for CallClientConfig {
    fn default() -> Self {
        Self { max_ended_calls: 10, max_ended_participants: 16 }
    }
}

/// Configuration for [`crate::StatefulChatClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChatClientConfig {
    /// Typing indicators kept per thread; the oldest is dropped first.
    pub max_typing_indicators: usize,
    /// Age after which a typing indicator is no longer shown.
    pub typing_indicator_ttl_ms: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self { max_typing_indicators: 32, typing_indicator_ttl_ms: 8000 }
    }
}
