//! Identity federation with an external OAuth provider.
//!
//! The provider proves who a person is; everything else (roles, groups,
//! sessions) is managed here. A federator turns an authorization code into
//! an [`ExternalProfile`] in two calls and is never retried automatically.

use crate::error::FederationError;
use async_trait::async_trait;
use gatehouse_core::Result;
use serde::{Deserialize, Serialize};

/// Profile data returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    /// The provider's stable subject id for this person.
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Where to send the browser to start a login, and the state nonce that
/// must come back on the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// An external identity provider.
#[async_trait]
pub trait IdentityFederator: Send + Sync {
    /// Builds the provider authorization URL with a fresh state nonce.
    fn authorization_url(&self) -> Result<AuthorizationRequest, FederationError>;

    /// Exchanges an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, FederationError>;

    /// Fetches the profile of the person a provider access token belongs to.
    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<ExternalProfile, FederationError>;
}

#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedFederator;

#[cfg(any(test, feature = "testing"))]
mod scripted {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A provider that answers from a fixed table of codes.
    ///
    /// Each registered code maps to a provider token `token-<code>`, which in
    /// turn maps to the registered profile. Unknown codes fail the exchange.
    #[derive(Debug, Default)]
    pub struct ScriptedFederator {
        profiles: Mutex<HashMap<String, ExternalProfile>>,
        failure: Mutex<Option<FederationError>>,
    }

    impl ScriptedFederator {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers the profile returned for an authorization code.
        pub fn register(&self, code: &str, profile: ExternalProfile) {
            if let Ok(mut profiles) = self.profiles.lock() {
                profiles.insert(format!("token-{code}"), profile);
            }
        }

        /// Makes every following exchange fail with the given error.
        pub fn fail_with(&self, error: FederationError) {
            if let Ok(mut failure) = self.failure.lock() {
                *failure = Some(error);
            }
        }

        fn scripted_failure(&self) -> Option<FederationError> {
            self.failure.lock().ok().and_then(|f| f.clone())
        }
    }

    #[async_trait]
    impl IdentityFederator for ScriptedFederator {
        fn authorization_url(&self) -> Result<AuthorizationRequest, FederationError> {
            Ok(AuthorizationRequest {
                url: "https://idp.test/authorize?state=scripted-state".to_string(),
                state: "scripted-state".to_string(),
            })
        }

        async fn exchange_code(&self, code: &str) -> Result<String, FederationError> {
            if let Some(error) = self.scripted_failure() {
                return Err(error.into());
            }
            let token = format!("token-{code}");
            let known = self
                .profiles
                .lock()
                .map(|profiles| profiles.contains_key(&token))
                .unwrap_or(false);
            if known {
                Ok(token)
            } else {
                Err(FederationError::CodeExchange {
                    reason: "invalid_grant".to_string(),
                }
                .into())
            }
        }

        async fn fetch_profile(
            &self,
            access_token: &str,
        ) -> Result<ExternalProfile, FederationError> {
            self.profiles
                .lock()
                .ok()
                .and_then(|profiles| profiles.get(access_token).cloned())
                .ok_or_else(|| FederationError::ProfileRequest { status: 401 }.into())
        }
    }
}
