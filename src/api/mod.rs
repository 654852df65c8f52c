//! HTTP API
//!
//! A small `hyper` server exposing the shared state and the device link:
//!
//! | Method | Path | Behavior |
//! |---|---|---|
//! | GET | `/data` | Latest telemetry record as JSON |
//! | GET | `/progress` | `{progress, direction, running}` |
//! | GET | `/start_animation` | Reset progress to `{0, +1, running}` |
//! | GET | `/stop_animation` | Clear `running` only |
//! | GET | `/reconnect` | Retry opening the device |
//! | GET | `/` | HTML status page |
//! | POST | `/command` | `{"command": "..."}` forwarded to the device |
//! | OPTIONS | any of the above | CORS preflight |
//!
//! Anything else is a 404 with an empty body. Bad request bodies never produce an
//! HTTP error: they get a 200 with `{"status": "error", "message": ...}`.
//!
//! # Usage
//! ```rust,ignore
//! let ctx = Arc::new(ApiContext::new(state, link));
//! let (addr, server) = api::spawn_server("127.0.0.1:8000".parse()?, ctx, shutdown_rx)?;
//! ```

pub mod responses;
pub mod status_page;

use crate::device::DeviceLink;
use crate::error::{AppResult, BridgeError};
use crate::state::SharedState;
use hyper::body::HttpBody;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response};
use serde_json::{json, Value as JsonValue};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Paths served by the API, used to answer CORS preflights.
pub const ROUTES: &[&str] = &[
    "/",
    "/data",
    "/progress",
    "/start_animation",
    "/stop_animation",
    "/reconnect",
    "/command",
];

/// Largest `/command` body accepted, in bytes.
pub const MAX_COMMAND_BODY: usize = 4 * 1024;

/// What the handlers need: the state store and the device link.
#[derive(Debug, Clone)]
pub struct ApiContext {
    state: Arc<SharedState>,
    link: Arc<DeviceLink>,
}

impl ApiContext {
    /// Bundle the store and the link for the handlers.
    pub fn new(state: Arc<SharedState>, link: Arc<DeviceLink>) -> Self {
        Self { state, link }
    }
}

/// Why a `/command` body was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRejection {
    /// Body missing or not JSON
    InvalidJson,
    /// JSON without a non-empty string `command`
    MissingCommand,
}

impl CommandRejection {
    /// Message sent back to the client.
    pub fn message(self) -> &'static str {
        match self {
            CommandRejection::InvalidJson => "Invalid JSON data",
            CommandRejection::MissingCommand => "No command provided",
        }
    }
}

/// Extract the command string from a `/command` request body.
pub fn parse_command(body: &[u8]) -> Result<String, CommandRejection> {
    let value: JsonValue =
        serde_json::from_slice(body).map_err(|_| CommandRejection::InvalidJson)?;

    match value.get("command") {
        Some(JsonValue::String(command)) if !command.is_empty() => Ok(command.clone()),
        _ => Err(CommandRejection::MissingCommand),
    }
}

/// Bind `addr` and serve until `shutdown` turns true.
///
/// Returns the bound address (useful with port 0) and the server task. Binding
/// happens before this returns, so a port that is already taken is reported here.
pub fn spawn_server(
    addr: SocketAddr,
    ctx: Arc<ApiContext>,
    mut shutdown: watch::Receiver<bool>,
) -> AppResult<(SocketAddr, JoinHandle<AppResult<()>>)> {
    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let ctx = Arc::clone(&ctx);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle_request(req, Arc::clone(&ctx))
            }))
        }
    });

    let server = hyper::Server::try_bind(&addr)?.serve(make_service);
    let local_addr = server.local_addr();

    let graceful = server.with_graceful_shutdown(async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    });

    info!(address = %local_addr, "HTTP API listening");

    let task = tokio::spawn(async move {
        graceful.await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            BridgeError::from(e)
        })
    });

    Ok((local_addr, task))
}

/// Route one request.
pub async fn handle_request(
    req: Request<Body>,
    ctx: Arc<ApiContext>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "HTTP request");

    let response = match (method, path.as_str()) {
        (Method::GET, "/data") => responses::json(&ctx.state.telemetry().to_json()),
        (Method::GET, "/progress") => {
            let progress = ctx.state.progress();
            responses::json(&json!({
                "progress": progress.value(),
                "direction": progress.direction().step(),
                "running": progress.is_running(),
            }))
        }
        (Method::GET, "/start_animation") => {
            ctx.state.start_animation();
            info!("Progress animation started");
            responses::json(&json!({"status": "animation_started"}))
        }
        (Method::GET, "/stop_animation") => {
            let progress = ctx.state.stop_animation();
            info!(value = progress.value(), "Progress animation stopped");
            responses::json(&json!({"status": "animation_stopped"}))
        }
        (Method::GET, "/reconnect") => reconnect(&ctx).await,
        (Method::GET, "/") => responses::html(status_page::render(&ctx.state.snapshot())),
        (Method::POST, "/command") => send_command(req, &ctx).await,
        (Method::OPTIONS, path) if ROUTES.contains(&path) => responses::preflight(),
        _ => responses::not_found(),
    };

    Ok(response)
}

async fn send_command(req: Request<Body>, ctx: &ApiContext) -> Response<Body> {
    let body = match read_body(req.into_body(), MAX_COMMAND_BODY).await {
        Ok(body) => body,
        Err(reason) => {
            warn!(%reason, "Failed to read command body");
            return responses::soft_error(CommandRejection::InvalidJson.message());
        }
    };

    let command = match parse_command(&body) {
        Ok(command) => command,
        Err(rejection) => {
            debug!(?rejection, "Rejected command request");
            return responses::soft_error(rejection.message());
        }
    };

    let link = Arc::clone(&ctx.link);
    let line = command.clone();
    let sent = match tokio::task::spawn_blocking(move || link.send_line(&line)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(command = %command, error = %err, "Error sending command");
            false
        }
        Err(err) => {
            warn!(command = %command, error = %err, "Command task panicked");
            false
        }
    };

    responses::json(&json!({
        "status": if sent { "success" } else { "failed" },
        "command": command,
    }))
}

/// Collect a request body, giving up once it grows past `limit` bytes.
async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, String> {
    let declared = body.size_hint().lower();
    if declared > limit as u64 {
        return Err(format!("body of {declared} bytes exceeds {limit}"));
    }

    let mut collected = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        if collected.len() + chunk.len() > limit {
            return Err(format!("body exceeds {limit} bytes"));
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(collected)
}

async fn reconnect(ctx: &ApiContext) -> Response<Body> {
    if !ctx.link.is_open() {
        let link = Arc::clone(&ctx.link);
        if let Err(err) = tokio::task::spawn_blocking(move || link.connect()).await {
            warn!(error = %err, "Reconnect task panicked");
        }
    }

    responses::json(&json!({"status": ctx.state.connection().as_str()}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::mock::MockDevice;
    use hyper::StatusCode;

    fn context() -> (MockDevice, Arc<ApiContext>) {
        let device = MockDevice::new();
        let link = Arc::new(DeviceLink::new(DeviceConfig::default(), device.clone()));
        let state = Arc::new(SharedState::new(link.subscribe_status()));
        (device, Arc::new(ApiContext::new(state, link)))
    }

    async fn call(ctx: &Arc<ApiContext>, method: Method, path: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = handle_request(req, Arc::clone(ctx)).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn as_json(body: &str) -> JsonValue {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn parse_command_accepts_string_command() {
        assert_eq!(parse_command(br#"{"command": "PING"}"#), Ok("PING".to_string()));
    }

    #[test]
    fn parse_command_rejections() {
        assert_eq!(parse_command(b""), Err(CommandRejection::InvalidJson));
        assert_eq!(parse_command(b"{nope"), Err(CommandRejection::InvalidJson));
        assert_eq!(parse_command(b"{}"), Err(CommandRejection::MissingCommand));
        assert_eq!(
            parse_command(br#"{"command": ""}"#),
            Err(CommandRejection::MissingCommand)
        );
        assert_eq!(
            parse_command(br#"{"command": 5}"#),
            Err(CommandRejection::MissingCommand)
        );
        assert_eq!(parse_command(b"[1, 2]"), Err(CommandRejection::MissingCommand));
    }

    #[tokio::test]
    async fn command_without_device_fails_softly() {
        let (_device, ctx) = context();
        let (status, body) = call(&ctx, Method::POST, "/command", r#"{"command":"PING"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({"status": "failed", "command": "PING"}));
    }

    #[tokio::test]
    async fn command_reaches_connected_device() {
        let (device, ctx) = context();
        ctx.link.connect().unwrap();

        let (_, body) = call(&ctx, Method::POST, "/command", r#"{"command":"LED ON"}"#).await;
        assert_eq!(as_json(&body), json!({"status": "success", "command": "LED ON"}));
        assert_eq!(device.written_lines(), vec!["LED ON"]);
    }

    #[tokio::test]
    async fn invalid_json_is_a_soft_error() {
        let (_device, ctx) = context();
        let (status, body) = call(&ctx, Method::POST, "/command", "not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            as_json(&body),
            json!({"status": "error", "message": "Invalid JSON data"})
        );
    }

    #[tokio::test]
    async fn oversized_command_is_rejected_unsent() {
        let (device, ctx) = context();
        ctx.link.connect().unwrap();

        let padding = " ".repeat(MAX_COMMAND_BODY);
        let body = format!(r#"{{"command": "PING"}}{padding}"#);
        let (status, reply) = call(&ctx, Method::POST, "/command", &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            as_json(&reply),
            json!({"status": "error", "message": "Invalid JSON data"})
        );
        assert!(device.written().is_empty());
    }

    #[tokio::test]
    async fn streamed_body_is_cut_off_at_limit() {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            for _ in 0..8 {
                let chunk = hyper::body::Bytes::from(vec![b' '; 1024]);
                if tx.send_data(chunk).await.is_err() {
                    break;
                }
            }
        });

        assert!(read_body(body, 4096).await.is_err());
    }

    #[tokio::test]
    async fn small_body_is_read_whole() {
        let body = Body::from(r#"{"command": "PING"}"#);
        assert_eq!(
            read_body(body, MAX_COMMAND_BODY).await.unwrap(),
            br#"{"command": "PING"}"#.to_vec()
        );
    }

    #[tokio::test]
    async fn progress_reports_signed_direction() {
        let (_device, ctx) = context();
        ctx.state.start_animation();
        for _ in 0..101 {
            ctx.state.advance_progress();
        }
        let (_, body) = call(&ctx, Method::GET, "/progress", "").await;
        assert_eq!(
            as_json(&body),
            json!({"progress": 99, "direction": -1, "running": true})
        );
    }

    #[tokio::test]
    async fn query_string_is_ignored() {
        let (_device, ctx) = context();
        let (status, body) = call(&ctx, Method::GET, "/data?t=123", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({}));
    }

    #[tokio::test]
    async fn reconnect_opens_the_device() {
        let (device, ctx) = context();
        device.set_fail_open(true);
        let (_, body) = call(&ctx, Method::GET, "/reconnect", "").await;
        assert_eq!(as_json(&body), json!({"status": "disconnected"}));

        device.set_fail_open(false);
        let (_, body) = call(&ctx, Method::GET, "/reconnect", "").await;
        assert_eq!(as_json(&body), json!({"status": "connected"}));

        let (_, body) = call(&ctx, Method::GET, "/reconnect", "").await;
        assert_eq!(as_json(&body), json!({"status": "connected"}));
        assert_eq!(device.open_count(), 1);
    }

    #[tokio::test]
    async fn unknown_routes_are_empty_404s() {
        let (_device, ctx) = context();
        for (method, path) in [
            (Method::GET, "/missing"),
            (Method::POST, "/data"),
            (Method::GET, "/command"),
            (Method::DELETE, "/"),
            (Method::OPTIONS, "/missing"),
        ] {
            let (status, body) = call(&ctx, method, path, "").await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn occupied_port_fails_to_bind() {
        let (_device, ctx) = context();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (_tx, rx) = watch::channel(false);

        let result = spawn_server(taken.local_addr().unwrap(), ctx, rx);
        assert!(matches!(result, Err(BridgeError::Server(_))));
    }

    #[tokio::test]
    async fn preflight_on_known_route() {
        let (_device, ctx) = context();
        let (status, _) = call(&ctx, Method::OPTIONS, "/command", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
