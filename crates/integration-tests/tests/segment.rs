mod harness;

use harness::config::ConfigBuilder;
use harness::mock_model::MockModel;
use harness::mock_platform::MockPlatform;
use harness::server::TestServer;
use serde_json::{Value, json};

async fn start() -> (MockModel, MockPlatform, TestServer) {
    let model = MockModel::start().await.unwrap();
    let platform = MockPlatform::start().await.unwrap();
    let config = ConfigBuilder::new(&model.base_url())
        .with_platform(&platform.base_url(), None)
        .build();
    let server = TestServer::start(config).await.unwrap();

    (model, platform, server)
}

async fn transcribe(server: &TestServer, body: Value) -> (u16, Value) {
    let resp = server
        .client()
        .post(server.url("/transcribe-segment"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn segment_is_transcribed() {
    let (model, _platform, server) = start().await;

    let (status, body) = transcribe(
        &server,
        json!({"audio_url": "/test.mp3", "start_time": 1.5, "end_time": 6.0, "task_id": 3}),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["transcription"], "Birinchi gap Ikkinchi gap");
    assert_eq!(body["language"], "Uzbek");
    assert_eq!(body["gender"], "Female");
    assert_eq!(body["emotion"], "Neutral");
    assert!((body["confidence"].as_f64().unwrap() - 0.85).abs() < 1e-9);

    // summary and entities are never requested for a segment
    assert_eq!(model.calls("summary"), 0);
    assert_eq!(model.calls("entities"), 0);
    assert_eq!(model.request_count(), 4);
}

#[tokio::test]
async fn invalid_window_is_rejected() {
    let (model, _platform, server) = start().await;

    let (status, body) = transcribe(
        &server,
        json!({"audio_url": "/test.mp3", "start_time": 5.0, "end_time": 2.0}),
    )
    .await;

    assert_eq!(status, 422);
    assert_eq!(body["error"]["type"], "validation_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("end_time"));

    let (status, _) = transcribe(&server, json!({"audio_url": "/test.mp3"})).await;
    assert_eq!(status, 422);

    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn unavailable_audio_fails_the_request() {
    let (model, _platform, server) = start().await;

    let (status, body) = transcribe(
        &server,
        json!({"audio_url": "/missing.mp3", "start_time": 0.0, "end_time": 2.0}),
    )
    .await;

    assert_eq!(status, 502);
    assert_eq!(body["error"]["type"], "audio_fetch_error");
    assert_eq!(model.request_count(), 0);
}
