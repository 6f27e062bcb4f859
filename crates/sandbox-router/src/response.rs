use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{
        HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
    },
    Response, StatusCode,
};
use serde_json::Value;

use crate::{error::RouterError, EXPIRES_IN_HEADER};

pub type Body = Full<Bytes>;

fn with_cors(status: StatusCode, body: Body) -> Response<Body> {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    resp
}

/// Plain-text response carrying the CORS header.
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    with_cors(status, Full::new(body.into()))
}

/// JSON response carrying the CORS header.
pub fn json(status: StatusCode, value: &Value) -> Response<Body> {
    let mut resp = with_cors(status, Full::new(Bytes::from(value.to_string())));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Canonical document plus its remaining lifetime.
pub fn document(value: &Value, expires_in_secs: i64) -> Response<Body> {
    let mut resp = json(StatusCode::OK, value);
    resp.headers_mut()
        .insert(EXPIRES_IN_HEADER, HeaderValue::from(expires_in_secs));
    resp
}

pub fn head() -> Response<Body> {
    with_cors(StatusCode::OK, Full::new(Bytes::new()))
}

pub fn preflight() -> Response<Body> {
    let mut resp = with_cors(StatusCode::OK, Full::new(Bytes::new()));
    let headers = resp.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Accept, Content-Type"),
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

pub fn not_found() -> Response<Body> {
    text(StatusCode::NOT_FOUND, "Not found")
}

pub fn error(err: &RouterError) -> Response<Body> {
    text(err.status(), err.public_message())
}
