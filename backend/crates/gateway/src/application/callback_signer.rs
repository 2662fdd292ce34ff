//! Callback Signer
//!
//! Short-lived HS256 JWS handed to the PDS after a successful verification.
//! Every success gets a fresh `jti`; replay protection is the consumer's job.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Email, FlowState, Identity};
use crate::error::{GatewayError, GatewayResult};
use platform::crypto::{constant_time_eq, from_base64url, hmac_sha256, to_base64url};

/// Pre-encoded `{"alg":"HS256","typ":"JWT"}`
const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub request_uri: String,
    pub client_id: String,
    /// Unix seconds
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Clone)]
pub struct CallbackSigner {
    secret: [u8; 32],
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl CallbackSigner {
    pub fn new(
        secret: [u8; 32],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl_secs: i64,
    ) -> Self {
        Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_secs,
        }
    }

    /// Claims for one completed verification
    pub fn claims_for(
        &self,
        email: &Email,
        identity: Option<&Identity>,
        state: &FlowState,
        now_secs: i64,
    ) -> CallbackClaims {
        let did = identity.map(|i| i.did.clone());
        CallbackClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: did.clone().unwrap_or_else(|| email.as_str().to_string()),
            email: email.as_str().to_string(),
            did,
            handle: identity.and_then(|i| i.handle.clone()),
            request_uri: state.request_uri.clone(),
            client_id: state.client_id.clone(),
            iat: now_secs,
            exp: now_secs + self.ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn sign(&self, claims: &CallbackClaims) -> GatewayResult<String> {
        let claims_json = serde_json::to_vec(claims)
            .map_err(|e| GatewayError::Internal(format!("assertion encode: {}", e)))?;
        let signing_input = format!(
            "{}.{}",
            to_base64url(HEADER_JSON.as_bytes()),
            to_base64url(&claims_json)
        );
        let mac = hmac_sha256(&self.secret, signing_input.as_bytes());
        Ok(format!("{}.{}", signing_input, to_base64url(&mac)))
    }

    /// Check structure, algorithm, MAC, issuer, audience and expiry
    pub fn verify(&self, assertion: &str, now_secs: i64) -> GatewayResult<CallbackClaims> {
        let invalid = || GatewayError::Validation("invalid assertion".to_string());

        let mut parts = assertion.split('.');
        let (Some(header), Some(claims), Some(mac), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let supplied = from_base64url(mac).map_err(|_| invalid())?;
        let expected = hmac_sha256(&self.secret, format!("{}.{}", header, claims).as_bytes());
        if !constant_time_eq(&expected, &supplied) {
            return Err(invalid());
        }

        let header: serde_json::Value =
            serde_json::from_slice(&from_base64url(header).map_err(|_| invalid())?)
                .map_err(|_| invalid())?;
        if header.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
            return Err(invalid());
        }

        let claims: CallbackClaims =
            serde_json::from_slice(&from_base64url(claims).map_err(|_| invalid())?)
                .map_err(|_| invalid())?;

        if claims.iss != self.issuer || claims.aud != self.audience || now_secs >= claims.exp {
            return Err(invalid());
        }

        Ok(claims)
    }
}
