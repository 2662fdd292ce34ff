//! Router-level tests for the gateway crate
//!
//! Drives the full axum router (CSRF guard, security headers, handlers)
//! against the in-memory store, a recording mailer and a fixed identity table.

#[cfg(test)]
mod support {
    use std::collections::HashMap;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::application::config::GatewayConfig;
    use crate::infra::identity::StaticIdentityResolver;
    use crate::infra::mailer::RecordingMailer;
    use crate::infra::memory::InMemoryGatewayRepository;
    use crate::presentation::router::gateway_router_generic;

    pub const REQUEST_URI: &str = "urn:ietf:params:oauth:request_uri:req-1";
    pub const CLIENT_ID: &str = "https://app.example/client-metadata.json";

    pub struct TestResponse {
        pub status: StatusCode,
        pub headers: HeaderMap,
        pub body: String,
    }

    impl TestResponse {
        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }

        pub fn set_cookies(&self) -> Vec<String> {
            self.headers
                .get_all(header::SET_COOKIE)
                .iter()
                .map(|v| v.to_str().unwrap().to_string())
                .collect()
        }

        pub fn set_cookie(&self, name: &str) -> Option<String> {
            let prefix = format!("{}=", name);
            self.set_cookies().into_iter().find(|c| c.starts_with(&prefix))
        }
    }

    /// Browser stand-in: keeps cookies and echoes the CSRF cookie in the header
    pub struct TestClient {
        pub router: Router,
        pub repo: InMemoryGatewayRepository,
        pub mailer: RecordingMailer,
        pub config: GatewayConfig,
        pub cookies: HashMap<String, String>,
    }

    impl TestClient {
        pub fn new() -> Self {
            Self::with(GatewayConfig::development(), StaticIdentityResolver::empty())
        }

        pub fn with(config: GatewayConfig, resolver: StaticIdentityResolver) -> Self {
            let repo = InMemoryGatewayRepository::new();
            let mailer = RecordingMailer::default();
            let router =
                gateway_router_generic(repo.clone(), mailer.clone(), resolver, config.clone());
            Self {
                router,
                repo,
                mailer,
                config,
                cookies: HashMap::new(),
            }
        }

        fn cookie_header(&self) -> String {
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ")
        }

        async fn send(&mut self, request: Request<Body>) -> TestResponse {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

            for cookie in headers.get_all(header::SET_COOKIE) {
                let cookie = cookie.to_str().unwrap();
                let pair = cookie.split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                if value.is_empty() || cookie.contains("Max-Age=0") {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_string(), value.to_string());
                }
            }

            TestResponse {
                status,
                headers,
                body: String::from_utf8(bytes.to_vec()).unwrap(),
            }
        }

        pub async fn get(&mut self, uri: &str) -> TestResponse {
            let request = Request::builder()
                .uri(uri)
                .header(header::COOKIE, self.cookie_header())
                .body(Body::empty())
                .unwrap();
            self.send(request).await
        }

        pub async fn authorize(&mut self, login_hint: Option<&str>) -> TestResponse {
            let mut uri = format!(
                "/oauth/authorize?request_uri={}&client_id={}",
                urlencode(REQUEST_URI),
                urlencode(CLIENT_ID)
            );
            if let Some(hint) = login_hint {
                uri.push_str(&format!("&login_hint={}", urlencode(hint)));
            }
            self.get(&uri).await
        }

        /// POST with the CSRF header copied from the cookie jar
        pub async fn post(&mut self, uri: &str, body: serde_json::Value) -> TestResponse {
            let token = self.cookies.get("csrf-token").cloned().unwrap_or_default();
            self.post_with_csrf(uri, body, Some(&token)).await
        }

        pub async fn post_with_csrf(
            &mut self,
            uri: &str,
            body: serde_json::Value,
            csrf_header: Option<&str>,
        ) -> TestResponse {
            self.post_with_headers(uri, body, csrf_header, &[]).await
        }

        pub async fn post_with_headers(
            &mut self,
            uri: &str,
            body: serde_json::Value,
            csrf_header: Option<&str>,
            extra: &[(&str, &str)],
        ) -> TestResponse {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, self.cookie_header());
            if let Some(token) = csrf_header {
                builder = builder.header("x-csrf-token", token);
            }
            for (name, value) in extra {
                builder = builder.header(*name, *value);
            }
            let request = builder.body(Body::from(body.to_string())).unwrap();
            self.send(request).await
        }

        /// send-code as relayed by a proxy that set `X-Forwarded-For`
        pub async fn send_code_forwarded(&mut self, email: &str, forwarded_for: &str) -> TestResponse {
            let token = self.cookies.get("csrf-token").cloned().unwrap_or_default();
            self.post_with_headers(
                "/oauth/send-code",
                serde_json::json!({ "email": email }),
                Some(&token),
                &[("x-forwarded-for", forwarded_for)],
            )
            .await
        }

        pub async fn send_code(&mut self, email: &str) -> TestResponse {
            self.post("/oauth/send-code", serde_json::json!({ "email": email }))
                .await
        }

        pub async fn verify_code(&mut self, email: &str, code: &str) -> TestResponse {
            self.post(
                "/oauth/verify-code",
                serde_json::json!({ "email": email, "code": code }),
            )
            .await
        }
    }

    pub fn urlencode(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }

    /// A code guaranteed to differ from `code`
    pub fn wrong_code(code: &str) -> String {
        if code == "000000" {
            "111111".to_string()
        } else {
            "000000".to_string()
        }
    }
}

#[cfg(test)]
mod health_tests {
    use super::support::*;
    use axum::http::{StatusCode, header};

    #[tokio::test]
    async fn test_health() {
        let mut client = TestClient::new();
        let response = client.get("/health").await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_security_headers_on_every_route() {
        let mut client = TestClient::new();
        for response in [
            client.get("/health").await,
            client.authorize(None).await,
            client.get("/oauth/assets/otp.js").await,
            client.post_with_csrf("/oauth/send-code", serde_json::json!({}), None).await,
        ] {
            let h = &response.headers;
            assert!(h.get(header::STRICT_TRANSPORT_SECURITY).is_some());
            assert_eq!(h.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
            assert_eq!(h.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
            let csp = h.get(header::CONTENT_SECURITY_POLICY).unwrap().to_str().unwrap();
            assert!(csp.contains("default-src 'none'"));
            assert!(csp.contains("frame-ancestors 'none'"));
        }
    }

    #[tokio::test]
    async fn test_assets_served() {
        let mut client = TestClient::new();
        let script = client.get("/oauth/assets/otp.js").await;
        assert_eq!(script.status, StatusCode::OK);
        assert!(
            script.headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("application/javascript")
        );
        assert!(script.body.contains("x-csrf-token") || script.body.contains("csrfHeader"));

        let style = client.get("/oauth/assets/otp.css").await;
        assert_eq!(style.status, StatusCode::OK);
    }
}

#[cfg(test)]
mod csrf_tests {
    use super::support::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_get_always_sets_fresh_csrf_cookie() {
        let mut client = TestClient::new();
        let first = client.get("/health").await;
        let second = client.get("/health").await;

        let a = first.set_cookie("csrf-token").unwrap();
        let b = second.set_cookie("csrf-token").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("HttpOnly"));
        assert!(a.contains("Max-Age=600"));
    }

    #[tokio::test]
    async fn test_post_without_header_rejected() {
        let mut client = TestClient::new();
        client.authorize(None).await;
        let response = client
            .post_with_csrf(
                "/oauth/send-code",
                serde_json::json!({ "email": "a@example.com" }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(client.mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_post_with_mismatched_header_rejected() {
        let mut client = TestClient::new();
        client.authorize(None).await;
        let token = client.cookies["csrf-token"].clone();

        let mut flipped = token.clone().into_bytes();
        flipped[0] = if flipped[0] == b'A' { b'B' } else { b'A' };
        let flipped = String::from_utf8(flipped).unwrap();
        let shorter = &token[..token.len() - 1];

        for header in [flipped.as_str(), shorter, ""] {
            let response = client
                .post_with_csrf(
                    "/oauth/verify-code",
                    serde_json::json!({ "email": "a@example.com", "code": "123456" }),
                    Some(header),
                )
                .await;
            assert_eq!(response.status, StatusCode::FORBIDDEN, "header {:?}", header);
        }
    }

    #[tokio::test]
    async fn test_post_without_cookie_rejected() {
        let mut client = TestClient::new();
        let response = client
            .post_with_csrf(
                "/oauth/send-code",
                serde_json::json!({ "email": "a@example.com" }),
                Some("forged-token"),
            )
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }
}

#[cfg(test)]
mod authorize_tests {
    use super::support::*;
    use crate::domain::repository::AccountRepository;
    use crate::domain::value_objects::{Email, Identity};
    use axum::http::{StatusCode, header};

    #[tokio::test]
    async fn test_missing_parameters_rejected() {
        let mut client = TestClient::new();
        let response = client.get("/oauth/authorize?client_id=x").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["status"], 400);
    }

    #[tokio::test]
    async fn test_email_step_sets_cookies() {
        let mut client = TestClient::new();
        let response = client.authorize(None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(
            response.headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        assert!(response.body.contains(r#"<section id="email-step">"#));

        let session = response.set_cookie("auth-session").unwrap();
        assert!(session.contains("HttpOnly"));
        assert!(session.contains("Max-Age=600"));
        assert!(response.set_cookie("csrf-token").is_some());
        assert_eq!(client.mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_login_hint_sends_code() {
        let mut client = TestClient::new();
        let response = client.authorize(Some("Alice@Example.com")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.contains(r#"<section id="code-step">"#));
        assert!(response.body.contains("a***@example.com"));
        assert!(client.mailer.last_code("alice@example.com").is_some());
    }

    #[tokio::test]
    async fn test_non_email_hint_shows_email_step() {
        let mut client = TestClient::new();
        let response = client.authorize(Some("alice.bsky.social")).await;
        assert!(response.body.contains(r#"<section id="email-step">"#));
        assert_eq!(client.mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_registered_and_unknown_email_look_identical() {
        let mut client = TestClient::new();
        client
            .repo
            .link_identity(
                &Email::parse("alice@example.com").unwrap(),
                &Identity {
                    did: "did:plc:alice".to_string(),
                    handle: None,
                },
            )
            .await
            .unwrap();

        let known = client.authorize(Some("alice@example.com")).await;
        let unknown = client.authorize(Some("annie@example.com")).await;

        assert_eq!(known.status, unknown.status);
        assert_eq!(
            known.body.replace("alice@example.com", "EMAIL"),
            unknown.body.replace("annie@example.com", "EMAIL")
        );

        client.authorize(None).await;
        let known = client.send_code("alice@example.com").await;
        let unknown = client.send_code("annie@example.com").await;
        assert_eq!(known.status, StatusCode::OK);
        assert_eq!(known.status, unknown.status);
        assert_eq!(known.json(), unknown.json());
        assert_eq!(known.json(), serde_json::json!({ "ok": true, "email": "a***@example.com" }));
    }
}

#[cfg(test)]
mod flow_tests {
    use super::support::*;
    use crate::application::callback_signer::CallbackSigner;
    use crate::domain::value_objects::{Email, Identity};
    use crate::infra::identity::StaticIdentityResolver;
    use crate::application::config::GatewayConfig;
    use axum::http::StatusCode;
    use platform::rate_limit::RateLimitConfig;

    const EMAIL: &str = "a@example.com";

    fn email() -> Email {
        Email::parse(EMAIL).unwrap()
    }

    fn assert_generic_failure(response: &TestResponse) {
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.json(),
            serde_json::json!({ "ok": false, "error": "invalid_code" })
        );
    }

    #[tokio::test]
    async fn test_attempt_exhaustion_then_resend() {
        let mut client = TestClient::new();
        client.authorize(None).await;

        let response = client.send_code(EMAIL).await;
        assert_eq!(response.status, StatusCode::OK);
        let token = client.repo.latest_token(&email()).await.unwrap();
        assert_eq!(token.attempts, 0);
        assert!(!token.used);

        let code = client.mailer.last_code(EMAIL).unwrap();
        for _ in 0..5 {
            let response = client.verify_code(EMAIL, &wrong_code(&code)).await;
            assert_generic_failure(&response);
        }
        let token = client.repo.latest_token(&email()).await.unwrap();
        assert_eq!(token.attempts, 5);
        assert_eq!(token.attempts, token.max_attempts);

        // Correct code, exhausted token
        assert_generic_failure(&client.verify_code(EMAIL, &code).await);

        client.send_code(EMAIL).await;
        let fresh = client.mailer.last_code(EMAIL).unwrap();
        let response = client.verify_code(EMAIL, &fresh).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["ok"], true);

        let token = client.repo.latest_token(&email()).await.unwrap();
        assert!(token.used);

        let redirect = url::Url::parse(body["redirect"].as_str().unwrap()).unwrap();
        assert_eq!(redirect.path(), "/oauth/authorize");
        let params: std::collections::HashMap<String, String> =
            redirect.query_pairs().into_owned().collect();
        assert_eq!(params["request_uri"], REQUEST_URI);
        assert_eq!(params["client_id"], CLIENT_ID);

        let signer = CallbackSigner::new(
            client.config.callback_secret,
            client.config.issuer.clone(),
            client.config.pds_url.clone(),
            60,
        );
        let claims = signer
            .verify(&params["otp_assertion"], chrono::Utc::now().timestamp())
            .unwrap();
        assert_eq!(claims.email, EMAIL);
        assert_eq!(claims.request_uri, REQUEST_URI);

        // Session is cleared; the used code cannot be replayed.
        assert!(!client.cookies.contains_key("auth-session"));
    }

    #[tokio::test]
    async fn test_login_hint_flow_verifies() {
        let identity = Identity {
            did: "did:plc:alice".to_string(),
            handle: Some("alice.test".to_string()),
        };
        let mut client = TestClient::with(
            GatewayConfig::development(),
            StaticIdentityResolver::with(EMAIL, identity),
        );
        client.authorize(Some(EMAIL)).await;
        let code = client.mailer.last_code(EMAIL).unwrap();

        let response = client.verify_code(EMAIL, &code).await;
        let body = response.json();
        assert_eq!(body["ok"], true);

        let redirect = url::Url::parse(body["redirect"].as_str().unwrap()).unwrap();
        let assertion = redirect
            .query_pairs()
            .find(|(k, _)| k == "otp_assertion")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let signer = CallbackSigner::new(
            client.config.callback_secret,
            client.config.issuer.clone(),
            client.config.pds_url.clone(),
            60,
        );
        let claims = signer.verify(&assertion, chrono::Utc::now().timestamp()).unwrap();
        assert_eq!(claims.did.as_deref(), Some("did:plc:alice"));
        assert_eq!(claims.handle.as_deref(), Some("alice.test"));
    }

    #[tokio::test]
    async fn test_verify_requires_session() {
        let mut client = TestClient::new();
        client.get("/health").await;
        let response = client.verify_code(EMAIL, "123456").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json()["action"].is_string());
    }

    #[tokio::test]
    async fn test_tampered_session_restarts_flow() {
        let mut client = TestClient::new();
        client.authorize(None).await;
        let session = client.cookies["auth-session"].clone();
        let (payload, mac) = session.rsplit_once('.').unwrap();
        let forged = format!("{}x.{}", payload, mac);
        client.cookies.insert("auth-session".to_string(), forged);

        let response = client.send_code(EMAIL).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(client.mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_code_for_other_email_rejected() {
        let mut client = TestClient::new();
        client.authorize(None).await;
        client.send_code(EMAIL).await;
        let code = client.mailer.last_code(EMAIL).unwrap();

        // Session now points at b@example.com
        client.send_code("b@example.com").await;
        assert_generic_failure(&client.verify_code(EMAIL, &code).await);
    }

    #[tokio::test]
    async fn test_verify_rate_limit_is_generic() {
        let config = GatewayConfig {
            verify_code_email_limit: RateLimitConfig::new(2, 900),
            ..GatewayConfig::development()
        };
        let mut client = TestClient::with(config, StaticIdentityResolver::empty());
        client.authorize(None).await;
        client.send_code(EMAIL).await;
        let code = client.mailer.last_code(EMAIL).unwrap();

        assert_generic_failure(&client.verify_code(EMAIL, &wrong_code(&code)).await);
        assert_generic_failure(&client.verify_code(EMAIL, &wrong_code(&code)).await);
        // Blocked before the store is consulted
        assert_generic_failure(&client.verify_code(EMAIL, &code).await);
        assert_eq!(client.repo.latest_token(&email()).await.unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_send_code_address_limit_is_429() {
        let config = GatewayConfig {
            send_code_ip_limit: RateLimitConfig::new(1, 900),
            ..GatewayConfig::development()
        };
        let mut client = TestClient::with(config, StaticIdentityResolver::empty());
        client.authorize(None).await;
        assert_eq!(client.send_code(EMAIL).await.status, StatusCode::OK);
        assert_eq!(
            client.send_code(EMAIL).await.status,
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_reset_address_limit() {
        let config = GatewayConfig {
            send_code_ip_limit: RateLimitConfig::new(1, 900),
            ..GatewayConfig::development()
        };
        let mut client = TestClient::with(config, StaticIdentityResolver::empty());
        client.authorize(None).await;

        let first = client.send_code_forwarded(EMAIL, "198.51.100.1").await;
        assert_eq!(first.status, StatusCode::OK);
        let second = client.send_code_forwarded(EMAIL, "198.51.100.2").await;
        assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_address_limit_keys_on_proxy_appended_entry() {
        let config = GatewayConfig {
            send_code_ip_limit: RateLimitConfig::new(1, 900),
            trusted_proxy_hops: 1,
            ..GatewayConfig::development()
        };
        let mut client = TestClient::with(config, StaticIdentityResolver::empty());
        client.authorize(None).await;

        let first = client
            .send_code_forwarded(EMAIL, "198.51.100.1, 203.0.113.9")
            .await;
        assert_eq!(first.status, StatusCode::OK);
        // Spoofed left-hand entry changed, real peer did not
        let spoofed = client
            .send_code_forwarded(EMAIL, "198.51.100.2, 203.0.113.9")
            .await;
        assert_eq!(spoofed.status, StatusCode::TOO_MANY_REQUESTS);
        // A different client behind the same proxy has its own window
        let other = client
            .send_code_forwarded(EMAIL, "203.0.113.10")
            .await;
        assert_eq!(other.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let mut client = TestClient::new();
        client.authorize(None).await;
        let response = client
            .post("/oauth/send-code", serde_json::json!({ "email": 42 }))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
}
