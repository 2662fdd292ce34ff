//! Identity Resolvers
//!
//! Upstream lookup of the DID and handle the PDS holds for an email.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::domain::collaborators::IdentityResolver;
use crate::domain::value_objects::{Email, Identity};
use crate::error::{GatewayError, GatewayResult};

const SEARCH_ACCOUNTS_PATH: &str = "/xrpc/com.atproto.admin.searchAccounts";
const ADMIN_USER: &str = "admin";

/// Resolver for deployments without upstream lookup
#[derive(Debug, Clone, Default)]
pub struct NoIdentityResolver;

impl IdentityResolver for NoIdentityResolver {
    async fn resolve(&self, _email: &Email) -> GatewayResult<Option<Identity>> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct SearchAccountsResponse {
    #[serde(default)]
    accounts: Vec<AccountView>,
}

#[derive(Deserialize)]
struct AccountView {
    did: String,
    handle: Option<String>,
    email: Option<String>,
}

impl SearchAccountsResponse {
    /// Search is prefix-based upstream; only an exact email match counts
    fn into_identity(self, email: &Email) -> Option<Identity> {
        self.accounts
            .into_iter()
            .find(|a| {
                a.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email.as_str()))
            })
            .map(|a| Identity {
                did: a.did,
                handle: a.handle,
            })
    }
}

/// Queries the PDS admin API with basic auth
#[derive(Debug, Clone)]
pub struct PdsIdentityResolver {
    client: reqwest::Client,
    search_url: Url,
    admin_password: String,
}

impl PdsIdentityResolver {
    pub fn new(pds_url: &str, admin_password: impl Into<String>) -> GatewayResult<Self> {
        let search_url = Url::parse(pds_url)
            .and_then(|base| base.join(SEARCH_ACCOUNTS_PATH))
            .map_err(|e| GatewayError::Internal(format!("PDS URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Internal(format!("identity client: {}", e)))?;

        Ok(Self {
            client,
            search_url,
            admin_password: admin_password.into(),
        })
    }
}

impl IdentityResolver for PdsIdentityResolver {
    async fn resolve(&self, email: &Email) -> GatewayResult<Option<Identity>> {
        let response = self
            .client
            .get(self.search_url.clone())
            .query(&[("email", email.as_str())])
            .basic_auth(ADMIN_USER, Some(&self.admin_password))
            .send()
            .await
            .map_err(|e| GatewayError::Identity(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Identity(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let body: SearchAccountsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Identity(e.to_string()))?;

        Ok(body.into_identity(email))
    }
}

/// Test double with a fixed email → identity table
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    known: std::collections::HashMap<String, Identity>,
}

#[cfg(test)]
impl StaticIdentityResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(email: &str, identity: Identity) -> Self {
        let mut known = std::collections::HashMap::new();
        known.insert(email.to_string(), identity);
        Self { known }
    }
}

#[cfg(test)]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, email: &Email) -> GatewayResult<Option<Identity>> {
        Ok(self.known.get(email.as_str()).cloned())
    }
}
