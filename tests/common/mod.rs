//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use message_pipeline::pipeline::{MessagePipeline, MessagePipelineContext};
use message_pipeline::player::RecordedPlayer;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for anything a test awaits
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Emit one frame and render it, returning the context the frame produced
pub async fn render_frame(
    player: &RecordedPlayer,
    pipeline: &MessagePipeline,
    elapsed: Duration,
) -> Arc<MessagePipelineContext> {
    render_frame_with(player, pipeline, elapsed, |_| {}).await
}

/// Like [`render_frame`], running `on_render` before acknowledging the frame
pub async fn render_frame_with<F>(
    player: &RecordedPlayer,
    pipeline: &MessagePipeline,
    elapsed: Duration,
    on_render: F,
) -> Arc<MessagePipelineContext>
where
    F: FnOnce(&MessagePipelineContext),
{
    let mut rx = pipeline.subscribe();
    let frame = player.emit_frame(elapsed);
    let render = async {
        loop {
            rx.changed().await.expect("pipeline dropped");
            let context = rx.borrow_and_update().clone();
            if context.render_done.is_some() {
                on_render(&context);
                pipeline.render_committed();
                return context;
            }
        }
    };

    let (emitted, context) = tokio::time::timeout(test_timeout(), async {
        tokio::join!(frame, render)
    })
    .await
    .expect("frame was not rendered in time");
    assert!(emitted, "player did not emit a frame");
    context
}

/// Topics of a subscriber's messages in delivery order
pub fn delivered_topics(context: &MessagePipelineContext, subscriber: &str) -> Vec<String> {
    context
        .messages_for(subscriber)
        .map(|messages| messages.iter().map(|m| m.topic.clone()).collect())
        .unwrap_or_default()
}
