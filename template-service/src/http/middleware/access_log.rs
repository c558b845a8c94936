//! Structured access log
//!
//! One event per request: `info` "Access log" when the handler returned, or
//! `error` "Error log" when it panicked. The event carries the request id, a
//! request record, a response record and the time taken. Credentials are
//! masked in headers and JSON bodies before anything is logged.
//!
//! Only JSON request bodies are buffered, within axum's default body limit
//! (2 MiB); larger ones are refused with 413. A handler panic is logged with the backtrace
//! captured by the panic hook this module installs.
//!
//! Paths containing any of `disabled_log_endpoints` are passed straight
//! through.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::Instant;

use axum::body::{to_bytes, Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::CommonSettings;
use crate::error::{ErrorBody, ErrorCode};

/// Response header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-api-request-id";

/// Replacement for masked values
pub const MASK: &str = "********";

const SENSITIVE_KEYS: &[&str] = &["password", "token", "authorization", "cookie", "set-cookie"];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Mask sensitive keys in a JSON value, descending into objects and arrays.
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive(&key) {
                        (key, Value::String(MASK.to_string()))
                    } else {
                        (key, redact(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

/// Headers as a JSON object with sensitive values masked.
pub fn redact_headers(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let value = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(value));
    }
    redact(Value::Object(map))
}

fn client_ip(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that stores the panicking thread's backtrace for
/// [`take_panic_backtrace`].
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Backtrace of the last panic on this thread. `catch_unwind` returns on the
/// thread that panicked, so this must be read before the next `.await`.
fn take_panic_backtrace() -> String {
    PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "unavailable".to_string())
}

fn body_too_large(length: u64, max_body: usize) -> Value {
    json!({
        "detail": format!("Body too large to display. {} bytes of {} allowed", length, max_body),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Build the request record; JSON bodies are buffered and put back.
async fn capture_request(request: Request, max_body: usize) -> Result<(Value, Request), Response> {
    let path = match request.uri().query() {
        Some(query) => format!("{}?{}", request.uri().path(), query),
        None => request.uri().path().to_string(),
    };
    let mut record = json!({
        "method": request.method().as_str(),
        "path": path,
        "ip": client_ip(&request),
        "headers": redact_headers(request.headers()),
    });

    if !is_json(request.headers()) {
        return Ok((record, request));
    }

    // A bare request carries no `DefaultBodyLimit`, so the default limit applies.
    let (parts, body) = request.into_parts();
    let bare = axum::http::Request::new(body);
    let bytes = match Bytes::from_request(bare, &()).await {
        Ok(bytes) => bytes,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Failed to buffer request body");
            let body = ErrorBody {
                message: rejection.body_text(),
                code: ErrorCode::BadRequest,
            };
            return Err((rejection.status(), Json(body)).into_response());
        }
    };
    if bytes.len() > max_body {
        record["body"] = body_too_large(bytes.len() as u64, max_body);
    } else if let Ok(body) = serde_json::from_slice::<Value>(&bytes) {
        record["body"] = redact(body);
    }

    Ok((record, Request::from_parts(parts, Body::from(bytes))))
}

/// Build the response record; JSON bodies are buffered and put back.
async fn capture_response(response: Response, max_body: usize) -> (Value, Response) {
    let mut record = json!({
        "status_code": response.status().as_u16(),
        "headers": redact_headers(response.headers()),
    });

    if !is_json(response.headers()) {
        return (record, response);
    }

    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let Some(length) = declared.or_else(|| response.body().size_hint().exact()) else {
        return (record, response);
    };

    if length > max_body as u64 {
        record["body"] = body_too_large(length, max_body);
        return (record, response);
    }

    let (mut parts, body) = response.into_parts();
    match to_bytes(body, max_body).await {
        Ok(bytes) => {
            record["body"] = match serde_json::from_slice::<Value>(&bytes) {
                Ok(body) => redact(body),
                Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            };
            (record, Response::from_parts(parts, Body::from(bytes)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer response body");
            parts.headers.remove(CONTENT_LENGTH);
            (record, Response::from_parts(parts, Body::empty()))
        }
    }
}

/// Access log middleware; install with
/// `from_fn_with_state(Arc<CommonSettings>, access_log)`.
pub async fn access_log(
    State(common): State<Arc<CommonSettings>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if common
        .disabled_log_endpoints
        .iter()
        .any(|endpoint| path.contains(endpoint.as_str()))
    {
        return next.run(request).await;
    }

    install_panic_hook();
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    let max_body = common.logger_body_content_max_size;
    let (request_record, request) = match capture_request(request, max_body).await {
        Ok(captured) => captured,
        Err(response) => return response,
    };

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let (mut response, mut response_record, failure) = match outcome {
        Ok(response) => {
            let (record, response) = capture_response(response, max_body).await;
            (response, record, None)
        }
        Err(payload) => {
            let backtrace = take_panic_backtrace();
            let message = panic_message(payload.as_ref());
            let body = ErrorBody {
                message: message.clone(),
                code: ErrorCode::InternalError,
            };
            let response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            let record = json!({ "status_code": StatusCode::INTERNAL_SERVER_ERROR.as_u16() });
            (response, record, Some((message, backtrace)))
        }
    };

    response_record["time_taken"] = Value::String(format!("{:.4}s", start.elapsed().as_secs_f64()));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    match failure {
        None => tracing::info!(
            x_request_id = %request_id,
            request = %request_record,
            response = %response_record,
            "Access log"
        ),
        Some((message, backtrace)) => tracing::error!(
            x_request_id = %request_id,
            request = %request_record,
            response = %response_record,
            error = %message,
            backtrace = %backtrace,
            "Error log"
        ),
    }

    response
}
