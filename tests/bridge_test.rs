//! Message bridge tests: request routing and wire shapes.

mod common;

use std::time::Duration;

use cf_core::ErrorKind;
use cf_pipeline::SyntheticMedia;
use clipforge::bridge::{BridgeRequest, BridgeResponse, StartConversion};
use common::TestHarness;
use serde_json::json;

fn start(file_name: &str, format: &str) -> BridgeRequest {
    BridgeRequest::StartConversion {
        data: StartConversion::new(vec![0u8; 256], file_name, format, "high"),
    }
}

#[tokio::test(start_paused = true)]
async fn status_wire_shape() {
    let h = TestHarness::new(SyntheticMedia::video(4.0));
    let bridge = h.bridge();
    let mut client = bridge.connect();

    let response = client.request(start("clip.mp4", "mp3")).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "started");
    assert!(json["jobId"].is_string());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let json = serde_json::to_value(client.request(BridgeRequest::GetStatus).await.unwrap()).unwrap();
    assert_eq!(json["type"], "status");
    assert_eq!(json["inProgress"], true);
    assert!(json["progress"]["percent"].is_u64());
    assert!(json["progress"]["status"].is_string());
}

#[tokio::test(start_paused = true)]
async fn second_start_gets_already_running_error() {
    let h = TestHarness::new(SyntheticMedia::video(4.0));
    let bridge = h.bridge();
    let mut first = bridge.connect();
    let mut second = bridge.connect();

    first.start_conversion(StartConversion::new(vec![0u8; 8], "a.mp4", "mp3", "low"))
        .await
        .unwrap();
    let response = second.request(start("b.mp4", "wav")).await.unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json,
        json!({
            "type": "error",
            "errorKind": "AlreadyRunningError",
            "message": json["message"].clone(),
        })
    );
    assert!(json["message"].as_str().unwrap().contains("already in progress"));
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_are_answered_with_typed_errors() {
    let h = TestHarness::new(SyntheticMedia::audio(1.0));
    let bridge = h.bridge();
    let mut client = bridge.connect();

    match client.request(start("clip.mp4", "exe")).await.unwrap() {
        BridgeResponse::Error(failure) => assert_eq!(failure.error_kind, ErrorKind::UnsupportedFormat),
        other => panic!("unexpected response: {other:?}"),
    }
    match client.request(start("song.mp3", "mp4")).await.unwrap() {
        BridgeResponse::Error(failure) => {
            assert_eq!(failure.error_kind, ErrorKind::UnsupportedConversion)
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert!(!client.is_conversion_in_progress().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn result_wire_shape_for_success_and_failure() {
    let h = TestHarness::new(SyntheticMedia::video(1.0).without_audio());
    let bridge = h.bridge();
    let mut client = bridge.connect();

    let job_id = client
        .start_conversion(StartConversion::new(vec![0u8; 8], "mute.mp4", "mp3", "high"))
        .await
        .unwrap();
    let result = client.wait_for_completion(job_id).await.unwrap();
    let json = serde_json::to_value(BridgeResponse::Result(result)).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["errorKind"], "NoAudioTrack");
    assert!(json.get("data").is_none());

    let job_id = client
        .start_conversion(StartConversion::new(vec![0u8; 8], "mute.mp4", "webm", "high"))
        .await
        .unwrap();
    let result = client.wait_for_completion(job_id).await.unwrap();
    let json = serde_json::to_value(BridgeResponse::Result(result)).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["fileName"], "mute.webm");
    assert_eq!(json["data"]["mimeType"], "video/webm;codecs=vp9,opus");
    assert!(json["data"]["size"].as_u64().unwrap() > 0);
    assert!(json.get("error").is_none());
}

#[tokio::test(start_paused = true)]
async fn shutting_down_the_bridge_leaves_the_job_running() {
    let h = TestHarness::new(SyntheticMedia::audio(3.0));
    let bridge = h.bridge();
    let mut client = bridge.connect();
    client
        .start_conversion(StartConversion::new(vec![0u8; 8], "song.wav", "mp3", "medium"))
        .await
        .unwrap();

    bridge.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let failure = client.status().await.unwrap_err();
    assert_eq!(failure.error_kind, ErrorKind::Internal);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let finished = h.coordinator.take_result().unwrap();
    assert!(finished.result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn quality_labels_on_the_wire_match_exactly() {
    let h = TestHarness::new(SyntheticMedia::video(1.0));
    let bridge = h.bridge();
    let mut client = bridge.connect();

    for (quality, expected) in [("HIGH", 192_000), (" low", 192_000), ("high", 320_000)] {
        let job_id = client
            .start_conversion(StartConversion::new(vec![0u8; 8], "clip.mp4", "mp3", quality))
            .await
            .unwrap();
        let result = client.wait_for_completion(job_id).await.unwrap();
        assert!(result.success, "{quality:?}");
        let options = h.runtime.last_encoder_options().unwrap();
        assert_eq!(options.audio_bits_per_second, expected, "{quality:?}");
    }
}
