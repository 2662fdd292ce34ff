//! HTTP Handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRef, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use platform::cookie::extract_cookie;

use crate::application::config::GatewayConfig;
use crate::application::send_code::{SendCodeInput, SendCodeUseCase};
use crate::application::session_signer::SessionSigner;
use crate::application::verify_code::{VerifyCodeInput, VerifyCodeUseCase};
use crate::domain::collaborators::{IdentityResolver, Mailer};
use crate::domain::repository::GatewayRepository;
use crate::domain::value_objects::{Email, FlowState};
use crate::error::{GatewayError, GatewayResult};
use crate::presentation::dto::{
    AuthorizeQuery, HealthResponse, SendCodeRequest, SendCodeResponse, VerifyCodeRequest,
    VerifyCodeResponse,
};
use crate::presentation::middleware::ClientAddr;
use crate::presentation::pages::{self, PageStep, PageView};

/// Shared state for gateway handlers
pub struct GatewayAppState<R, M, I> {
    pub repo: Arc<R>,
    pub mailer: Arc<M>,
    pub resolver: Arc<I>,
    pub config: Arc<GatewayConfig>,
    pub sessions: SessionSigner,
}

// Manual impl: everything is behind an Arc, so no `Clone` bound on R, M or I.
impl<R, M, I> Clone for GatewayAppState<R, M, I> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            mailer: self.mailer.clone(),
            resolver: self.resolver.clone(),
            config: self.config.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<R, M, I> FromRef<GatewayAppState<R, M, I>> for Arc<GatewayConfig> {
    fn from_ref(state: &GatewayAppState<R, M, I>) -> Self {
        state.config.clone()
    }
}

impl<R, M, I> GatewayAppState<R, M, I> {
    pub fn new(repo: R, mailer: M, resolver: I, config: GatewayConfig) -> Self {
        let sessions = SessionSigner::new(config.session_secret, config.cookie_ttl_ms());
        Self {
            repo: Arc::new(repo),
            mailer: Arc::new(mailer),
            resolver: Arc::new(resolver),
            config: Arc::new(config),
            sessions,
        }
    }

    /// Flow state from the session cookie, if present and intact
    fn flow_state(&self, headers: &HeaderMap) -> GatewayResult<FlowState> {
        let token = extract_cookie(headers, &self.config.session_cookie_name)
            .ok_or(GatewayError::SessionInvalid)?;
        self.sessions
            .verify(&token, Utc::now().timestamp_millis())
            .inspect_err(|_| tracing::info!("Rejected session cookie"))
    }

    fn session_cookie(&self, state: &FlowState) -> GatewayResult<HeaderValue> {
        let token = self.sessions.sign(state, Utc::now().timestamp_millis())?;
        self.config
            .session_cookie()
            .header_value(&token)
            .ok_or_else(|| GatewayError::Internal("session cookie header".to_string()))
    }

    fn clear_session_cookie(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.config.session_cookie().build_delete_cookie()).ok()
    }
}

/// GET /oauth/authorize
pub async fn authorize<R, M, I>(
    State(state): State<GatewayAppState<R, M, I>>,
    ClientAddr(client_ip): ClientAddr,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> GatewayResult<Response>
where
    R: GatewayRepository,
    M: Mailer + Send + Sync + 'static,
    I: IdentityResolver + Send + Sync + 'static,
{
    let Query(query) = query.map_err(|e| GatewayError::Validation(e.body_text()))?;
    let request_uri = required(query.request_uri, "request_uri")?;
    let client_id = required(query.client_id, "client_id")?;

    let mut flow = FlowState::new(request_uri, client_id);
    let mut step = PageStep::Email;

    if let Some(hint) = query.login_hint.filter(|h| Email::looks_like_email(h)) {
        let use_case =
            SendCodeUseCase::new(state.repo.clone(), state.mailer.clone(), state.config.clone());
        match use_case
            .execute(SendCodeInput {
                email: hint,
                client_ip,
            })
            .await
        {
            Ok(output) => {
                flow = flow.with_email(&output.email);
                step = PageStep::Code {
                    email: output.email.as_str().to_string(),
                    masked_email: output.masked_email,
                };
            }
            // Fall back to the email step; the user can retry from there.
            Err(GatewayError::RateLimited | GatewayError::Validation(_)) => {}
            Err(e) => return Err(e),
        }
    }

    let cookie = state.session_cookie(&flow)?;
    let page = pages::render_sign_in_page(&PageView {
        step,
        csrf_cookie_name: &state.config.csrf_cookie_name,
        csrf_header_name: &state.config.csrf_header_name,
    });

    tracing::info!(client_id = %flow.client_id, "Rendered sign-in page");

    Ok((
        [
            (header::SET_COOKIE, cookie),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Html(page),
    )
        .into_response())
}

/// POST /oauth/send-code
pub async fn send_code<R, M, I>(
    State(state): State<GatewayAppState<R, M, I>>,
    ClientAddr(client_ip): ClientAddr,
    headers: HeaderMap,
    payload: Result<Json<SendCodeRequest>, JsonRejection>,
) -> GatewayResult<Response>
where
    R: GatewayRepository,
    M: Mailer + Send + Sync + 'static,
    I: IdentityResolver + Send + Sync + 'static,
{
    let flow = state.flow_state(&headers)?;
    let Json(req) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;

    let use_case =
        SendCodeUseCase::new(state.repo.clone(), state.mailer.clone(), state.config.clone());
    let output = use_case
        .execute(SendCodeInput {
            email: req.email,
            client_ip,
        })
        .await?;

    let cookie = state.session_cookie(&flow.with_email(&output.email))?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SendCodeResponse {
            ok: true,
            email: output.masked_email,
        }),
    )
        .into_response())
}

/// POST /oauth/verify-code
pub async fn verify_code<R, M, I>(
    State(state): State<GatewayAppState<R, M, I>>,
    headers: HeaderMap,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> GatewayResult<Response>
where
    R: GatewayRepository,
    M: Mailer + Send + Sync + 'static,
    I: IdentityResolver + Send + Sync + 'static,
{
    let flow = state.flow_state(&headers)?;
    let Json(req) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;

    let use_case =
        VerifyCodeUseCase::new(state.repo.clone(), state.resolver.clone(), state.config.clone());
    let result = use_case
        .execute(VerifyCodeInput {
            email: req.email,
            code: req.code,
            state: flow,
        })
        .await;

    match result {
        Ok(output) => {
            let mut response = VerifyCodeResponse::success(output.redirect).into_response();
            if let Some(clear) = state.clear_session_cookie() {
                response.headers_mut().append(header::SET_COOKIE, clear);
            }
            Ok(response)
        }
        Err(GatewayError::Otp(reason)) => {
            tracing::debug!(reason = %reason, "Verification failed");
            Ok(VerifyCodeResponse::failure().into_response())
        }
        Err(GatewayError::RateLimited) => Ok(VerifyCodeResponse::failure().into_response()),
        Err(e) => Err(e),
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /oauth/assets/otp.js
pub async fn otp_script() -> impl IntoResponse {
    asset("application/javascript; charset=utf-8", pages::OTP_SCRIPT)
}

/// GET /oauth/assets/otp.css
pub async fn otp_style() -> impl IntoResponse {
    asset("text/css; charset=utf-8", pages::OTP_STYLE)
}

fn asset(content_type: &'static str, body: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        body,
    )
        .into_response()
}

fn required(value: Option<String>, name: &str) -> GatewayResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(GatewayError::Validation(format!("{} is required", name))),
    }
}
