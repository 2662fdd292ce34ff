//! Data Transfer Objects

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Generic failure code; the only one verify-code ever returns
pub const INVALID_CODE: &str = "invalid_code";

/// `GET /oauth/authorize` query
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub request_uri: Option<String>,
    pub client_id: Option<String>,
    pub login_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendCodeResponse {
    pub ok: bool,
    /// Masked form only
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyCodeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyCodeResponse {
    pub fn success(redirect: String) -> Self {
        Self {
            ok: true,
            redirect: Some(redirect),
            error: None,
        }
    }

    /// Identical for every failure reason
    pub fn failure() -> Self {
        Self {
            ok: false,
            redirect: None,
            error: Some(INVALID_CODE.to_string()),
        }
    }
}

impl IntoResponse for VerifyCodeResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_body_shape() {
        let json = serde_json::to_value(VerifyCodeResponse::failure()).unwrap();
        assert_eq!(json, serde_json::json!({"ok": false, "error": "invalid_code"}));
    }

    #[test]
    fn test_success_body_shape() {
        let json =
            serde_json::to_value(VerifyCodeResponse::success("https://pds/x".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"ok": true, "redirect": "https://pds/x"}));
    }
}
