use serde::{Deserialize, Serialize};

/// What a stream does when a subscriber's inbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): drop the message for that subscriber and log it.
    Drop,
    /// .send().await: wait for room. Nothing is lost.
    #[serde(alias = "backpressure")]
    BackPressure,
}

/// Engine-wide channel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of every operator inbox and subscription.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default = "default_overflow")]
    pub overflow: OverflowPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            overflow: default_overflow(),
        }
    }
}

fn default_buffer() -> usize {
    1024
}
fn default_overflow() -> OverflowPolicy {
    OverflowPolicy::BackPressure
}
