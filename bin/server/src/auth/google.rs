//! Google as the external identity provider.
//!
//! The browser is sent to Google's consent screen with the email and profile
//! scopes. On callback the authorization code is exchanged for a Google access
//! token, which is then used once to read the userinfo endpoint.

use async_trait::async_trait;
use gatehouse_access::{
    AuthorizationRequest, ExternalProfile, FederationError, IdentityFederator, OAuthConfig,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RequestTokenError,
    Scope, TokenResponse, TokenUrl, basic::BasicClient,
};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::error::Error as StdError;

/// Profile fields returned by Google's userinfo endpoint.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleUserInfo {
    fn into_profile(self) -> Result<ExternalProfile, FederationError> {
        if self.id.trim().is_empty() {
            return Err(FederationError::MalformedProfile {
                reason: "profile has no id".to_string(),
            });
        }
        Ok(ExternalProfile {
            external_id: self.id,
            email: self.email,
            name: self.name,
            avatar_url: self.picture.filter(|p| !p.is_empty()),
        })
    }
}

/// OAuth client for Google sign-in.
#[derive(Clone)]
pub struct GoogleFederator {
    config: OAuthConfig,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: reqwest::Client,
}

impl std::fmt::Debug for GoogleFederator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleFederator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GoogleFederator {
    /// Creates a federator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: OAuthConfig) -> Result<Self, Report<FederationError>> {
        let auth_url = AuthUrl::new(config.auth_url().to_string())
            .map_err(|e| misconfigured(format!("invalid auth URL: {e}")))?;
        let token_url = TokenUrl::new(config.token_url().to_string())
            .map_err(|e| misconfigured(format!("invalid token URL: {e}")))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| misconfigured(format!("invalid redirect URL: {e}")))?;
        reqwest::Url::parse(config.userinfo_url())
            .map_err(|e| misconfigured(format!("invalid userinfo URL: {e}")))?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout())
            .build()
            .map_err(|e| misconfigured(format!("HTTP client error: {e}")))?;

        Ok(Self {
            config,
            auth_url,
            token_url,
            redirect_url,
            http,
        })
    }
}

#[async_trait]
impl IdentityFederator for GoogleFederator {
    fn authorization_url(&self) -> Result<AuthorizationRequest, Report<FederationError>> {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let mut auth_request = client.authorize_url(CsrfToken::new_random);
        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, csrf_token) = auth_request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: csrf_token.secret().clone(),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, Report<FederationError>> {
        let client = BasicClient::new(ClientId::new(self.config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match &e {
                RequestTokenError::ServerResponse(response) => FederationError::CodeExchange {
                    reason: response.error().to_string(),
                },
                _ if caused_by_timeout(&e) => FederationError::Timeout {
                    operation: "code exchange".to_string(),
                },
                _ => FederationError::CodeExchange {
                    reason: e.to_string(),
                },
            })?;

        Ok(token.access_token().secret().clone())
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<ExternalProfile, Report<FederationError>> {
        let response = self
            .http
            .get(self.config.userinfo_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error("profile request", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FederationError::ProfileRequest {
                status: status.as_u16(),
            }
            .into());
        }

        let info: GoogleUserInfo = response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error("profile request", &e)
            } else {
                FederationError::MalformedProfile {
                    reason: e.to_string(),
                }
            }
        })?;
        Ok(info.into_profile()?)
    }
}

fn misconfigured(reason: String) -> FederationError {
    FederationError::Configuration { reason }
}

fn transport_error(operation: &str, error: &reqwest::Error) -> FederationError {
    if error.is_timeout() {
        FederationError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        FederationError::Transport {
            reason: error.to_string(),
        }
    }
}

fn caused_by_timeout(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(reqwest_error) = err.downcast_ref::<reqwest::Error>()
            && reqwest_error.is_timeout()
        {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use serde_json::json;
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    fn config_for(base: &str, timeout_seconds: u64) -> OAuthConfig {
        OAuthConfig::builder(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://api.example.com/auth/callback".to_string(),
        )
        .endpoints(
            format!("{base}/authorize"),
            format!("{base}/token"),
            format!("{base}/userinfo"),
        )
        .timeout_seconds(timeout_seconds)
        .build()
    }

    fn kind<T: std::fmt::Debug>(result: Result<T, Report<FederationError>>) -> FederationError {
        result.expect_err("should fail").current_context().clone()
    }

    #[test]
    fn authorization_url_carries_scopes_and_state() {
        let federator =
            GoogleFederator::new(OAuthConfig::new(
                "client-id".to_string(),
                "client-secret".to_string(),
                "https://api.example.com/auth/callback".to_string(),
            ))
            .expect("federator");

        let first = federator.authorization_url().expect("url");
        let second = federator.authorization_url().expect("url");

        assert!(first.url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(first.url.contains("client_id=client-id"));
        assert!(first.url.contains("userinfo.email"));
        assert!(first.url.contains("userinfo.profile"));
        assert!(first.url.contains("access_type=offline"));
        assert!(first.url.contains(&format!("state={}", first.state)));
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn invalid_redirect_uri_is_a_configuration_error() {
        let config = OAuthConfig::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "not a url".to_string(),
        );
        assert!(matches!(
            kind(GoogleFederator::new(config)),
            FederationError::Configuration { .. }
        ));
    }

    #[tokio::test]
    async fn exchanges_code_and_reads_profile() {
        let base = serve(
            Router::new()
                .route(
                    "/token",
                    post(|| async {
                        Json(json!({
                            "access_token": "google-token",
                            "token_type": "Bearer",
                            "expires_in": 3600
                        }))
                    }),
                )
                .route(
                    "/userinfo",
                    get(|| async {
                        Json(json!({
                            "id": "10769150350006150715113082367",
                            "email": "jane@example.com",
                            "name": "Jane Doe",
                            "picture": "https://example.com/jane.png"
                        }))
                    }),
                ),
        )
        .await;
        let federator = GoogleFederator::new(config_for(&base, 5)).expect("federator");

        let token = federator.exchange_code("auth-code").await.expect("exchange");
        assert_eq!(token, "google-token");

        let profile = federator.fetch_profile(&token).await.expect("profile");
        assert_eq!(profile.external_id, "10769150350006150715113082367");
        assert_eq!(profile.email, "jane@example.com");
        assert_eq!(profile.name, "Jane Doe");
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://example.com/jane.png")
        );
    }

    #[tokio::test]
    async fn rejected_code_is_a_code_exchange_error() {
        let base = serve(Router::new().route(
            "/token",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant" })),
                )
            }),
        ))
        .await;
        let federator = GoogleFederator::new(config_for(&base, 5)).expect("federator");

        assert!(matches!(
            kind(federator.exchange_code("stale").await),
            FederationError::CodeExchange { ref reason } if reason.contains("invalid_grant")
        ));
    }

    #[tokio::test]
    async fn profile_errors_are_classified() {
        let base = serve(
            Router::new()
                .route(
                    "/userinfo",
                    get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
                )
                .route(
                    "/broken/userinfo",
                    get(|| async { Json(json!({ "email": "no-id@example.com" })) }),
                ),
        )
        .await;

        let federator = GoogleFederator::new(config_for(&base, 5)).expect("federator");
        assert_eq!(
            kind(federator.fetch_profile("token").await),
            FederationError::ProfileRequest { status: 503 }
        );

        let broken =
            GoogleFederator::new(config_for(&format!("{base}/broken"), 5)).expect("federator");
        assert!(matches!(
            kind(broken.fetch_profile("token").await),
            FederationError::MalformedProfile { .. }
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let base = serve(Router::new().route(
            "/userinfo",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "id": "late" }))
            }),
        ))
        .await;
        let federator = GoogleFederator::new(config_for(&base, 1)).expect("federator");

        assert!(matches!(
            kind(federator.fetch_profile("token").await),
            FederationError::Timeout { .. }
        ));
    }
}
