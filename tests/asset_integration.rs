//! Asset fetching through the pipeline handle

mod common;

use common::builders::SourceBuilder;
use common::mock_helpers::{test_environment, StaticHttp};
use message_pipeline::assets::{AbortController, FetchAssetOptions};
use message_pipeline::config::PipelineConfig;
use message_pipeline::pipeline::MessagePipelineProvider;
use message_pipeline::player::RecordedPlayer;
use message_pipeline::PipelineError;
use std::sync::Arc;

#[tokio::test]
async fn test_package_uri_resolves_against_reference() {
    let http = Arc::new(
        StaticHttp::new().with("https://cdn.example.com/share/arm/meshes/link1.stl", b"solid"),
    );
    let (env, _notifications) = test_environment(http.clone());
    let player = RecordedPlayer::new(SourceBuilder::new("empty").build());
    let provider = MessagePipelineProvider::new(Some(player), env, &PipelineConfig::default());

    let options = FetchAssetOptions::default()
        .with_reference_url("https://cdn.example.com/share/arm/urdf/model.urdf");
    let asset = provider
        .pipeline()
        .fetch_asset("package://arm/meshes/link1.stl", options)
        .await
        .unwrap();

    assert_eq!(asset.data, b"solid");
    assert_eq!(
        http.requests(),
        vec![
            "package://arm/meshes/link1.stl".to_string(),
            "https://cdn.example.com/share/arm/meshes/link1.stl".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_http_status_error_is_reported() {
    let http = Arc::new(StaticHttp::new().with_status("https://host/gone.png", 410, "Gone"));
    let (env, _notifications) = test_environment(http);
    let provider = MessagePipelineProvider::new(None, env, &PipelineConfig::default());

    let err = provider
        .pipeline()
        .fetch_asset("https://host/gone.png", FetchAssetOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Error 410 (Gone) fetching https://host/gone.png");
}

#[tokio::test]
async fn test_unresolvable_package_names_uri() {
    let (env, _notifications) = test_environment(Arc::new(StaticHttp::new()));
    let provider = MessagePipelineProvider::new(None, env, &PipelineConfig::default());

    let err = provider
        .pipeline()
        .fetch_asset("package://arm/missing.stl", FetchAssetOptions::default())
        .await
        .unwrap_err();

    match err {
        PipelineError::Asset { uri, .. } => assert_eq!(uri, "package://arm/missing.stl"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_aborted_fetch_does_not_hit_network() {
    let http = Arc::new(StaticHttp::new().with("https://host/a.png", b"png"));
    let (env, _notifications) = test_environment(http.clone());
    let provider = MessagePipelineProvider::new(None, env, &PipelineConfig::default());

    let controller = AbortController::new();
    controller.abort();
    let err = provider
        .pipeline()
        .fetch_asset(
            "https://host/a.png",
            FetchAssetOptions::default().with_abort(controller.signal()),
        )
        .await
        .unwrap_err();

    assert!(err.is_aborted());
    assert!(http.requests().is_empty());
}
