//! Benchmarks for subscription merging and message fan-out
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use message_pipeline::pipeline::{PipelineAction, PipelineStore};
use message_pipeline::subscriptions::merge_subscriptions;
use message_pipeline::types::{
    ActiveData, MessageEvent, PlayerState, PreloadType, Subscription, Time,
};
use serde_json::json;
use std::sync::Arc;

fn panel_subscriptions(panels: usize) -> Vec<Subscription> {
    (0..panels)
        .flat_map(|panel| {
            (0..8).map(move |topic| {
                let sub = Subscription::new(format!("/topic_{}", (panel + topic) % 32))
                    .with_fields([format!("field_{}", panel % 5)]);
                if panel % 4 == 0 {
                    sub.with_preload(PreloadType::Full)
                } else {
                    sub
                }
            })
        })
        .collect()
}

fn bench_merge_subscriptions(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_subscriptions");

    for panels in [4, 32, 256].iter() {
        let subs = panel_subscriptions(*panels);
        group.throughput(Throughput::Elements(subs.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(panels), &subs, |b, subs| {
            b.iter(|| black_box(merge_subscriptions(subs.iter())));
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for messages in [100, 1_000, 10_000].iter() {
        let mut store = PipelineStore::new(None);
        for panel in 0..16 {
            store.dispatch(PipelineAction::UpdateSubscriber {
                id: format!("panel_{}", panel),
                payloads: (0..4)
                    .map(|t| Subscription::new(format!("/topic_{}", (panel + t) % 16)))
                    .collect(),
            });
        }

        let batch: Vec<MessageEvent> = (0..*messages as u64)
            .map(|i| {
                MessageEvent::new(
                    format!("/topic_{}", i % 16),
                    "bench/Msg",
                    Time::from_millis(i),
                    json!({ "value": i }),
                )
            })
            .collect();

        group.throughput(Throughput::Elements(*messages as u64));
        group.bench_with_input(BenchmarkId::from_parameter(messages), &batch, |b, batch| {
            b.iter(|| {
                // A fresh Arc each cycle so the store buckets the batch
                let state = PlayerState {
                    active_data: Some(ActiveData {
                        messages: Arc::from(batch.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                store.dispatch(PipelineAction::UpdatePlayerState {
                    player_state: state,
                    render_done: None,
                });
                black_box(store.context())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge_subscriptions, bench_fan_out);
criterion_main!(benches);
