//! Response builders shared by the routes.
//!
//! Every JSON and HTML response carries `Access-Control-Allow-Origin: *` so any
//! local page may call the API.

use hyper::header::{self, HeaderValue};
use hyper::{Body, Response, StatusCode};
use serde_json::{json, Value as JsonValue};

/// 200 with a JSON body.
pub fn json(body: &JsonValue) -> Response<Body> {
    with_content(body.to_string(), "application/json")
}

/// 200 with an HTML body.
pub fn html(body: String) -> Response<Body> {
    with_content(body, "text/html; charset=utf-8")
}

/// 200 `{"status": "error", "message": ...}`. Malformed requests are answered
/// this way rather than with an HTTP error status.
pub fn soft_error(message: &str) -> Response<Body> {
    json(&json!({"status": "error", "message": message}))
}

/// 404 with an empty body.
pub fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// 204 answer to a CORS preflight.
pub fn preflight() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any_origin());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn any_origin() -> HeaderValue {
    HeaderValue::from_static("*")
}

fn with_content(body: String, content_type: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any_origin());
    response
}
