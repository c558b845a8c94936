//! Double-submit cookie CSRF protection
//!
//! Safe methods (GET, HEAD, OPTIONS, TRACE) pass through and get a token
//! cookie if they did not bring one. Every other method must echo the cookie
//! value back in the CSRF header (or, when enabled, a form field named like the
//! cookie), and over HTTPS must come from an allowed `Origin`/`Referer` host.
//!
//! The header is checked first; the body is only read when the header is
//! absent and form fields are allowed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Form;
use uuid::Uuid;

use crate::config::AuthSettings;

/// Largest form body read when looking for the token field.
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// The request's CSRF token, available to handlers as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Value of cookie `name`, if the request carries it.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn is_secure(request: &Request) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn has_allowed_origin(headers: &HeaderMap, allowed_hosts: &[String]) -> bool {
    let source = headers
        .get(ORIGIN)
        .or_else(|| headers.get(REFERER))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let Some(host) = source
        .and_then(|s| s.parse::<Uri>().ok())
        .and_then(|uri| uri.host().map(str::to_owned))
    else {
        return false;
    };
    allowed_hosts.iter().any(|allowed| *allowed == host)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn forbidden(reason: &'static str) -> Response {
    tracing::warn!(reason, "CSRF check failed");
    (StatusCode::FORBIDDEN, reason).into_response()
}

/// Buffer the body, look for the token field, then put the body back.
async fn form_token(request: Request, field: &str) -> Result<(Request, Option<String>), Response> {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(forbidden("Request body could not be read")),
    };

    let probe = axum::http::Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(bytes.clone()))
        .map_err(|_| forbidden("Request body could not be read"))?;
    let token = Form::<HashMap<String, String>>::from_request(probe, &())
        .await
        .ok()
        .and_then(|Form(mut fields)| fields.remove(field))
        .filter(|t| !t.is_empty());

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

/// CSRF middleware; install with `from_fn_with_state(Arc<AuthSettings>, csrf)`.
pub async fn csrf(State(auth): State<Arc<AuthSettings>>, mut request: Request, next: Next) -> Response {
    if !auth.csrf_enabled {
        return next.run(request).await;
    }

    let cookie_token = cookie_value(request.headers(), &auth.csrf_cookie_name);

    if is_safe_method(request.method()) {
        let (token, issued) = match cookie_token {
            Some(token) => (token, false),
            None => (Uuid::new_v4().to_string(), true),
        };
        request.extensions_mut().insert(CsrfToken(token.clone()));

        let mut response = next.run(request).await;
        if issued {
            let cookie = format!(
                "{}={}; Max-Age={}; Path=/; SameSite=Lax",
                auth.csrf_cookie_name, token, auth.csrf_expire_time
            );
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, "Invalid CSRF cookie header"),
            }
        }
        return response;
    }

    let Some(cookie_token) = cookie_token else {
        return forbidden("No CSRF cookie found");
    };

    let header_token = if auth.csrf_allow_header_param {
        request
            .headers()
            .get(auth.csrf_header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    } else {
        None
    };

    let submitted = match header_token {
        Some(token) => Some(token),
        None if auth.csrf_allow_form_param && is_form(request.headers()) => {
            let (restored, token) = match form_token(request, &auth.csrf_cookie_name).await {
                Ok(found) => found,
                Err(response) => return response,
            };
            request = restored;
            token
        }
        None => None,
    };

    let Some(submitted) = submitted else {
        return forbidden("CSRF token not found in form data or request headers");
    };
    if submitted != cookie_token {
        return forbidden("CSRF token in header or form does not match the cookie");
    }

    if is_secure(&request) && !has_allowed_origin(request.headers(), &auth.csrf_allowed_hosts) {
        return forbidden("Referer or origin is not allowed");
    }

    request.extensions_mut().insert(CsrfToken(cookie_token));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn auth() -> AuthSettings {
        AuthSettings {
            csrf_enabled: true,
            csrf_expire_time: 60,
            csrf_cookie_name: "csrftoken".into(),
            csrf_header_name: "X-CSRFToken".into(),
            csrf_allowed_hosts: vec!["localhost".into()],
            csrf_allow_header_param: true,
            csrf_allow_form_param: false,
        }
    }

    async fn echo_token(Extension(CsrfToken(token)): Extension<CsrfToken>, body: String) -> String {
        format!("{}|{}", token, body)
    }

    fn app(auth: AuthSettings) -> Router {
        Router::new()
            .route("/", get(echo_token).post(echo_token))
            .layer(from_fn_with_state(Arc::new(auth), csrf))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn reads_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; csrftoken=abc; b=2"));
        assert_eq!(cookie_value(&headers, "csrftoken").as_deref(), Some("abc"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn origin_host_must_be_allowed() {
        let allowed = vec!["localhost".to_string()];
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://localhost:8000"));
        assert!(has_allowed_origin(&headers, &allowed));

        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://evil.example/page"));
        assert!(!has_allowed_origin(&headers, &allowed));

        assert!(!has_allowed_origin(&HeaderMap::new(), &allowed));
    }

    #[tokio::test]
    async fn safe_request_without_cookie_gets_one() {
        let response = app(auth())
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("csrftoken="));
        assert!(cookie.contains("Max-Age=60"));

        let token = cookie["csrftoken=".len()..].split(';').next().unwrap().to_string();
        assert!(Uuid::parse_str(&token).is_ok());
        assert!(body_text(response).await.starts_with(&token));
    }

    #[tokio::test]
    async fn safe_request_with_cookie_keeps_it() {
        let response = app(auth())
            .oneshot(
                HttpRequest::get("/")
                    .header(COOKIE, "csrftoken=existing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(body_text(response).await, "existing|");
    }

    #[tokio::test]
    async fn unsafe_request_with_matching_header_passes() {
        let response = app(auth())
            .oneshot(
                HttpRequest::post("/")
                    .header(COOKIE, "csrftoken=t1")
                    .header("X-CSRFToken", "t1")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "t1|payload");
    }

    #[tokio::test]
    async fn unsafe_request_failures_are_403() {
        let cases = [
            (None, Some("t1"), "No CSRF cookie found"),
            (Some("csrftoken=t1"), None, "CSRF token not found in form data or request headers"),
            (Some("csrftoken=t1"), Some("t2"), "CSRF token in header or form does not match the cookie"),
        ];

        for (cookie, header, reason) in cases {
            let mut builder = HttpRequest::post("/");
            if let Some(cookie) = cookie {
                builder = builder.header(COOKIE, cookie);
            }
            if let Some(header) = header {
                builder = builder.header("X-CSRFToken", header);
            }

            let response = app(auth())
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(body_text(response).await, reason);
        }
    }

    #[tokio::test]
    async fn secure_request_checks_origin() {
        let request = |origin: &'static str| {
            HttpRequest::post("/")
                .header(COOKIE, "csrftoken=t1")
                .header("X-CSRFToken", "t1")
                .header("X-Forwarded-Proto", "https")
                .header(ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };

        let ok = app(auth()).oneshot(request("https://localhost")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let bad = app(auth()).oneshot(request("https://evil.example")).await.unwrap();
        assert_eq!(bad.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn form_field_accepted_and_body_restored() {
        let mut settings = auth();
        settings.csrf_allow_form_param = true;

        let response = app(settings)
            .oneshot(
                HttpRequest::post("/")
                    .header(COOKIE, "csrftoken=t1")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("name=x&csrftoken=t1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "t1|name=x&csrftoken=t1");
    }

    #[tokio::test]
    async fn form_field_ignored_unless_enabled() {
        let response = app(auth())
            .oneshot(
                HttpRequest::post("/")
                    .header(COOKIE, "csrftoken=t1")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("csrftoken=t1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn disabled_middleware_passes_everything() {
        let mut settings = auth();
        settings.csrf_enabled = false;

        let response = app(settings)
            .oneshot(HttpRequest::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // No token extension either, so the handler's extractor rejects.
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
