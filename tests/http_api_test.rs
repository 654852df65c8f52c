//! End-to-end tests of the HTTP API against a running bridge with a mock device.

use hyper::{Body, Client, Method, Request, StatusCode};
use serde_json::{json, Value};
use serial_bridge::config::BridgeConfig;
use serial_bridge::device::mock::MockDevice;
use serial_bridge::{Bridge, BridgeHandle};
use std::time::Duration;

fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.timing.poll_interval_ms = 5;
    config.timing.animation_tick_ms = 1;
    config.timing.ceiling_pause_ms = 10;
    config
}

async fn start(device: &MockDevice) -> BridgeHandle {
    Bridge::new(test_config(), device.clone())
        .start()
        .await
        .expect("bridge should start")
}

struct Reply {
    status: StatusCode,
    headers: hyper::HeaderMap,
    body: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("response should be JSON")
    }
}

async fn request(handle: &BridgeHandle, method: Method, path: &str, body: &str) -> Reply {
    let uri = format!("http://{}{}", handle.local_addr(), path);
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = Client::new().request(req).await.expect("request failed");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

async fn get(handle: &BridgeHandle, path: &str) -> Reply {
    request(handle, Method::GET, path, "").await
}

/// Poll `path` until its JSON body satisfies `check`, then return that body.
async fn wait_for<F>(handle: &BridgeHandle, path: &str, check: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let body = get(handle, path).await.json();
            if check(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within timeout")
}

#[tokio::test]
async fn data_starts_empty_then_tracks_device() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let reply = get(&handle, "/data").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({}));

    device.push_line(r#"{"temp": 21.5, "humidity": 40}"#);
    wait_for(&handle, "/data", |v| *v != json!({})).await;
    assert_eq!(
        get(&handle, "/data").await.json(),
        json!({"temp": 21.5, "humidity": 40})
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn non_json_lines_are_wrapped() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    device.push_line("BOOT OK");
    wait_for(&handle, "/data", |v| *v != json!({})).await;
    assert_eq!(get(&handle, "/data").await.json(), json!({"raw_data": "BOOT OK"}));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn blank_line_replaces_record_with_empty_raw() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    device.push_line(r#"{"a": 1}"#);
    wait_for(&handle, "/data", |v| *v == json!({"a": 1})).await;

    device.push_line("");
    wait_for(&handle, "/data", |v| *v == json!({"raw_data": ""})).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn new_record_replaces_old_one() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    device.push_line(r#"{"a": 1}"#);
    wait_for(&handle, "/data", |v| *v == json!({"a": 1})).await;

    device.push_line(r#"{"b": 2}"#);
    wait_for(&handle, "/data", |v| *v == json!({"b": 2})).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn progress_runs_one_cycle() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    assert_eq!(
        get(&handle, "/progress").await.json(),
        json!({"progress": 0, "direction": 1, "running": false})
    );

    let started = get(&handle, "/start_animation").await;
    assert_eq!(started.json(), json!({"status": "animation_started"}));

    let turned = wait_for(&handle, "/progress", |v| v["direction"] == json!(-1)).await;
    assert!(turned["progress"].as_u64().is_some_and(|p| p > 0));

    let done = wait_for(&handle, "/progress", |v| v["running"] == json!(false)).await;
    assert_eq!(done, json!({"progress": 0, "direction": -1, "running": false}));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn stop_freezes_value() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    get(&handle, "/start_animation").await;
    wait_for(&handle, "/progress", |v| {
        v["progress"].as_u64().is_some_and(|p| p > 0)
    })
    .await;

    let stopped = get(&handle, "/stop_animation").await;
    assert_eq!(stopped.json(), json!({"status": "animation_stopped"}));

    let frozen = get(&handle, "/progress").await.json();
    assert_eq!(frozen["running"], json!(false));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(get(&handle, "/progress").await.json(), frozen);

    let restarted = get(&handle, "/start_animation").await;
    assert_eq!(restarted.status, StatusCode::OK);
    let progress = get(&handle, "/progress").await.json();
    assert_eq!(progress["running"], json!(true));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn command_is_written_to_device() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let reply = request(&handle, Method::POST, "/command", r#"{"command": "LED ON"}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"status": "success", "command": "LED ON"}));
    assert_eq!(device.written(), b"LED ON\n".to_vec());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn command_without_device_reports_failure() {
    let device = MockDevice::new();
    device.set_fail_open(true);
    let handle = start(&device).await;

    let reply = request(&handle, Method::POST, "/command", r#"{"command": "PING"}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!({"status": "failed", "command": "PING"}));
    assert!(device.written().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn bad_command_bodies_get_soft_errors() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let reply = request(&handle, Method::POST, "/command", "{oops").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": "Invalid JSON data"})
    );

    let reply = request(&handle, Method::POST, "/command", r#"{"cmd": "PING"}"#).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": "No command provided"})
    );
    assert!(device.written().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_command_body_is_refused() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let padding = " ".repeat(serial_bridge::api::MAX_COMMAND_BODY);
    let body = format!(r#"{{"command": "PING"}}{padding}"#);
    let reply = request(&handle, Method::POST, "/command", &body).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": "Invalid JSON data"})
    );
    assert!(device.written().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_paths_are_404_with_empty_body() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let reply = get(&handle, "/nope").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.body.is_empty());

    let reply = request(&handle, Method::POST, "/data", "{}").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn responses_allow_any_origin() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    for path in ["/data", "/progress", "/"] {
        let reply = get(&handle, path).await;
        assert_eq!(reply.headers["access-control-allow-origin"], "*", "{path}");
    }

    let preflight = request(&handle, Method::OPTIONS, "/command", "").await;
    assert_eq!(preflight.status, StatusCode::NO_CONTENT);
    assert_eq!(preflight.headers["access-control-allow-origin"], "*");
    assert_eq!(
        preflight.headers["access-control-allow-methods"],
        "GET, POST, OPTIONS"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_recovers_late_device() {
    let device = MockDevice::new();
    device.set_fail_open(true);
    let handle = start(&device).await;

    assert_eq!(
        get(&handle, "/reconnect").await.json(),
        json!({"status": "disconnected"})
    );

    device.set_fail_open(false);
    assert_eq!(
        get(&handle, "/reconnect").await.json(),
        json!({"status": "connected"})
    );

    device.push_line(r#"{"late": true}"#);
    wait_for(&handle, "/data", |v| *v == json!({"late": true})).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn status_page_reports_connection() {
    let device = MockDevice::new();
    let handle = start(&device).await;

    let reply = get(&handle, "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(reply.body.contains("Serial Handler Status"));
    assert!(reply.body.contains("Serial Connection: Connected"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_the_port() {
    let device = MockDevice::new();
    let handle = start(&device).await;
    let addr = handle.local_addr();
    let link = std::sync::Arc::clone(handle.link());

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown should not hang")
        .unwrap();

    assert!(!link.is_open());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
