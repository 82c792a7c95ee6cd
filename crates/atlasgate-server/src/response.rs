//! Response construction with the headers every gateway reply carries.

use bytes::Bytes;
use hyper::{
    Response, StatusCode,
    header::{self, HeaderValue},
};
use serde::Serialize;
use tracing::warn;

use crate::error::GatewayError;

pub const CACHE_CONTROL: &str = "public, max-age=2592000";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A body response with content type, length, caching and CORS headers.
pub fn bytes(status: StatusCode, content_type: &str, body: Bytes) -> Response<Bytes> {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));
    let length = HeaderValue::from(body.len());

    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, length);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Response<Bytes> {
    bytes(StatusCode::OK, content_type, body.into())
}

pub fn text(status: StatusCode, message: impl Into<String>) -> Response<Bytes> {
    bytes(
        status,
        "text/plain; charset=utf-8",
        Bytes::from(message.into()),
    )
}

/// Pretty-printed JSON.
pub fn json<T: Serialize>(value: &T) -> Response<Bytes> {
    match serde_json::to_vec_pretty(value) {
        Ok(body) => bytes(StatusCode::OK, "application/json", Bytes::from(body)),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn error(err: &GatewayError) -> Response<Bytes> {
    let status = err.status();
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %err, "Request failed");
    }
    text(status, err.body())
}

/// Content type for a file name, by extension.
pub fn mime_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}
