//! Test data builders for creating test objects

use message_pipeline::player::RecordedSource;
use message_pipeline::types::{MessageEvent, Time};
use serde_json::json;

/// Message on `topic` at `ms` milliseconds, carrying its own timestamp
pub fn message(topic: &str, ms: u64) -> MessageEvent {
    MessageEvent::new(topic, "test/Msg", Time::from_millis(ms), json!({ "t": ms }))
}

/// Builder for recorded sources with evenly spaced messages
pub struct SourceBuilder {
    name: String,
    messages: Vec<MessageEvent>,
}

impl SourceBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: Vec::new(),
        }
    }

    /// Add `count` messages on `topic`, one every `period_ms` starting at `start_ms`
    pub fn topic(mut self, topic: &str, start_ms: u64, period_ms: u64, count: u64) -> Self {
        self.messages
            .extend((0..count).map(|i| message(topic, start_ms + i * period_ms)));
        self
    }

    pub fn message(mut self, topic: &str, ms: u64) -> Self {
        self.messages.push(message(topic, ms));
        self
    }

    pub fn build(self) -> RecordedSource {
        RecordedSource::new(self.name, self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_builder() {
        let source = SourceBuilder::new("s")
            .topic("/a", 0, 100, 3)
            .message("/b", 50)
            .build();

        assert_eq!(source.messages.len(), 4);
        assert_eq!(source.start_time(), Time::from_millis(0));
        assert_eq!(source.end_time(), Time::from_millis(200));
    }
}
