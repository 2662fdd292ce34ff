//! Gateway Router

use axum::http::{HeaderName, HeaderValue, header};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::application::config::GatewayConfig;
use crate::domain::collaborators::{IdentityResolver, Mailer};
use crate::domain::repository::GatewayRepository;
use crate::infra::postgres::PgGatewayRepository;
use crate::presentation::handlers::{self, GatewayAppState};
use crate::presentation::middleware::csrf_guard;
use crate::presentation::pages::{SCRIPT_PATH, STYLE_PATH};

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; script-src 'self'; style-src 'self'; \
     connect-src 'self'; img-src 'self'; form-action 'self'; frame-ancestors 'none'; base-uri 'none'";

const STRICT_TRANSPORT_SECURITY: &str = "max-age=63072000; includeSubDomains";

/// Create the gateway router with PostgreSQL repository
pub fn gateway_router<M, I>(
    repo: PgGatewayRepository,
    mailer: M,
    resolver: I,
    config: GatewayConfig,
) -> Router
where
    M: Mailer + Send + Sync + 'static,
    I: IdentityResolver + Send + Sync + 'static,
{
    gateway_router_generic(repo, mailer, resolver, config)
}

/// Create a generic gateway router for any repository implementation
pub fn gateway_router_generic<R, M, I>(repo: R, mailer: M, resolver: I, config: GatewayConfig) -> Router
where
    R: GatewayRepository,
    M: Mailer + Send + Sync + 'static,
    I: IdentityResolver + Send + Sync + 'static,
{
    let state = GatewayAppState::new(repo, mailer, resolver, config);
    let csrf_config = state.config.clone();

    Router::new()
        .route("/oauth/authorize", get(handlers::authorize::<R, M, I>))
        .route("/oauth/send-code", post(handlers::send_code::<R, M, I>))
        .route("/oauth/verify-code", post(handlers::verify_code::<R, M, I>))
        .route(SCRIPT_PATH, get(handlers::otp_script))
        .route(STYLE_PATH, get(handlers::otp_style))
        .route("/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(csrf_config, csrf_guard))
        // Outermost, so CSRF rejections carry the headers too
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("cross-origin-opener-policy"),
                    HeaderValue::from_static("same-origin"),
                )),
        )
        .with_state(state)
}
