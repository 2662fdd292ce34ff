//! Gateway Middleware
//!
//! Double-submit CSRF guard and client address extraction.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Method, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use platform::client::extract_client_ip;
use platform::cookie::extract_cookie;
use platform::crypto::{constant_time_eq, random_token};

use crate::application::config::GatewayConfig;
use crate::error::GatewayError;

/// Bytes of entropy in each CSRF token
const CSRF_TOKEN_BYTES: usize = 32;

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Safe methods get a fresh token cookie on the way out. Anything else must
/// echo the cookie in the CSRF header or is rejected with 403.
pub async fn csrf_guard(
    State(config): State<Arc<GatewayConfig>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if is_safe_method(req.method()) {
        let mut response = next.run(req).await;
        match config.csrf_cookie().header_value(&random_token(CSRF_TOKEN_BYTES)) {
            Some(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            None => tracing::error!("CSRF cookie name is not a valid header value"),
        }
        return response;
    }

    let headers = req.headers();
    let from_cookie = extract_cookie(headers, &config.csrf_cookie_name);
    let from_header = headers
        .get(config.csrf_header_name.as_str())
        .and_then(|v| v.to_str().ok());

    let matched = match (from_cookie.as_deref(), from_header) {
        (Some(cookie), Some(header)) if !cookie.is_empty() => {
            constant_time_eq(cookie.as_bytes(), header.as_bytes())
        }
        _ => false,
    };

    if !matched {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            cookie_present = from_cookie.is_some(),
            header_present = from_header.is_some(),
            "CSRF check failed"
        );
        return GatewayError::CsrfRejected.into_response();
    }

    next.run(req).await
}

/// Client address as seen by the outermost trusted proxy, else the socket peer
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientAddr
where
    Arc<GatewayConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<GatewayConfig>::from_ref(state);
        let direct = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(ClientAddr(extract_client_ip(
            &parts.headers,
            direct,
            config.trusted_proxy_hops,
        )))
    }
}
