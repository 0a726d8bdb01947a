//! Message pipeline demo
//!
//! Plays back a synthetic recording through the pipeline to two panels and
//! logs what each panel receives per frame.

use message_pipeline::{
    config::PipelineConfig,
    logging,
    notify::TracingNotifier,
    pipeline::{MessagePipeline, MessagePipelineProvider, PipelineEnvironment},
    player::{RecordedPlayer, RecordedSource},
    types::{MessageEvent, PreloadType, Subscription, Time},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Wall time between frames
const TICK: Duration = Duration::from_millis(50);

fn demo_source() -> RecordedSource {
    let mut messages = Vec::new();
    for i in 0..100u64 {
        let t = i as f64 * 0.05;
        messages.push(MessageEvent::new(
            "/odom",
            "nav/Odometry",
            Time::from_millis(i * 50),
            json!({ "x": t.cos(), "y": t.sin(), "heading": t }),
        ));
        if i % 20 == 0 {
            messages.push(MessageEvent::new(
                "/status",
                "diag/Status",
                Time::from_millis(i * 50),
                json!({ "level": "ok", "seq": i / 20 }),
            ));
        }
    }
    RecordedSource::new("demo", messages)
}

/// Stand-in for a UI thread: draws each frame and acknowledges it
async fn render_loop(pipeline: MessagePipeline) {
    let mut rx = pipeline.subscribe();
    while rx.changed().await.is_ok() {
        let context = rx.borrow_and_update().clone();

        for (panel, messages) in context.message_events_by_subscriber_id.iter() {
            tracing::info!("{} received {} messages", panel, messages.len());
        }

        if context.messages_for("plot").is_some() {
            // Plot uploads its buffers asynchronously before the next frame
            let resume = pipeline.pause_frame("plot");
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                resume.resume();
            });
        }

        pipeline.render_committed();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::load_or_default();
    let _log_guard = logging::init(&config.logging);

    tracing::info!("Starting message pipeline demo");

    let source = demo_source();
    let end = source.end_time();
    let player = RecordedPlayer::new(source);

    let env = PipelineEnvironment::from_config(&config, Arc::new(TracingNotifier))?;
    let provider = MessagePipelineProvider::new(Some(player.clone()), env, &config);
    let pipeline = provider.pipeline();

    pipeline.set_subscriptions(
        "plot",
        vec![Subscription::new("/odom").with_fields(["x", "y"])],
    );
    pipeline.set_subscriptions(
        "status",
        vec![Subscription::new("/status").with_preload(PreloadType::Full)],
    );

    let mut rx = pipeline.subscribe();
    let renderer = tokio::spawn(render_loop(pipeline.clone()));
    let runner = tokio::spawn(player.clone().run(TICK));

    rx.wait_for(|context| context.capabilities().can_play()).await?;
    if !pipeline.start_playback() {
        anyhow::bail!("Player does not support playback control");
    }
    pipeline.set_playback_speed(2.0);

    while player.current_time() < end {
        tokio::time::sleep(TICK).await;
    }

    tracing::info!("Reached end of recording at {:?}", player.current_time());
    provider.shutdown();
    runner.await?;
    renderer.abort();

    Ok(())
}
