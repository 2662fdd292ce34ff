//! Session Signer
//!
//! Stateless flow state in a cookie: `<base64url(json)>.<base64url(hmac)>`.
//! The MAC covers the encoded bytes. The payload carries its own expiry so
//! freshness does not depend on the browser honouring cookie max-age.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::FlowState;
use crate::error::{GatewayError, GatewayResult};
use platform::crypto::{constant_time_eq, from_base64url, hmac_sha256, to_base64url};

#[derive(Serialize, Deserialize)]
struct SessionPayload {
    #[serde(flatten)]
    state: FlowState,
    /// Expiry, unix milliseconds
    exp: i64,
}

#[derive(Clone)]
pub struct SessionSigner {
    secret: [u8; 32],
    ttl_ms: i64,
}

impl SessionSigner {
    pub fn new(secret: [u8; 32], ttl_ms: i64) -> Self {
        Self { secret, ttl_ms }
    }

    pub fn sign(&self, state: &FlowState, now_ms: i64) -> GatewayResult<String> {
        let payload = SessionPayload {
            state: state.clone(),
            exp: now_ms + self.ttl_ms,
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| GatewayError::Internal(format!("session encode: {}", e)))?;
        let encoded = to_base64url(&json);
        let mac = hmac_sha256(&self.secret, encoded.as_bytes());
        Ok(format!("{}.{}", encoded, to_base64url(&mac)))
    }

    /// Any structural, MAC or expiry failure is `SessionInvalid`
    pub fn verify(&self, token: &str, now_ms: i64) -> GatewayResult<FlowState> {
        let (encoded, mac_b64) = token.rsplit_once('.').ok_or(GatewayError::SessionInvalid)?;
        let supplied = from_base64url(mac_b64).map_err(|_| GatewayError::SessionInvalid)?;
        let expected = hmac_sha256(&self.secret, encoded.as_bytes());

        if !constant_time_eq(&expected, &supplied) {
            return Err(GatewayError::SessionInvalid);
        }

        let json = from_base64url(encoded).map_err(|_| GatewayError::SessionInvalid)?;
        let payload: SessionPayload =
            serde_json::from_slice(&json).map_err(|_| GatewayError::SessionInvalid)?;

        if now_ms >= payload.exp {
            return Err(GatewayError::SessionInvalid);
        }

        Ok(payload.state)
    }
}
