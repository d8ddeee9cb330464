//! HTTP routing.
//!
//! Public routes drive the login flow. Everything under `/api` sits behind a
//! gate layer: `/api/profile` needs only a valid access token, while the
//! admin routes require the `admin` role plus the permission matching the
//! operation.

use axum::{
    Router, middleware,
    routing::{MethodRouter, get, post, put},
};
use gatehouse_access::{DefaultRole, Gate};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::{self, AppState, require};

/// Wraps a route so that every request must pass `gate`.
fn guarded(
    route: MethodRouter<Arc<AppState>>,
    state: &Arc<AppState>,
    gate: Gate,
) -> MethodRouter<Arc<AppState>> {
    route.route_layer(middleware::from_fn_with_state(
        (state.clone(), gate),
        require,
    ))
}

fn admin(permission: &str) -> Gate {
    Gate::new()
        .require_role(DefaultRole::Admin.name())
        .require_permission(permission)
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        // Auth routes
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/refresh", post(auth::refresh))
        // Authenticated routes
        .route(
            "/api/profile",
            guarded(get(api::profile), &state, Gate::new()),
        )
        // Administration
        .route(
            "/api/admin/users",
            guarded(get(api::list_users), &state, admin("users:read")),
        )
        .route(
            "/api/admin/users/{id}/groups",
            guarded(put(api::assign_user_groups), &state, admin("users:write")),
        )
        .route(
            "/api/admin/users/{id}/roles",
            guarded(put(api::assign_user_roles), &state, admin("roles:write")),
        )
        .route(
            "/api/admin/groups",
            guarded(get(api::list_groups), &state, admin("groups:read")).merge(guarded(
                post(api::create_group),
                &state,
                admin("groups:write"),
            )),
        )
        .route(
            "/api/admin/groups/{id}/roles",
            guarded(put(api::assign_group_roles), &state, admin("groups:write")),
        )
        .route(
            "/api/admin/roles",
            guarded(get(api::list_roles), &state, admin("roles:read")).merge(guarded(
                post(api::create_role),
                &state,
                admin("roles:write"),
            )),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use gatehouse_access::{
        ExternalProfile, FederationError, MemoryStore, ScriptedFederator, TokenCodec,
        TokenLifetimes,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const FRONTEND: &str = "https://app.example.com/done?from=login";
    const STATE_COOKIE: &str = "auth_state=scripted-state";

    struct Harness {
        app: Router,
        federator: Arc<ScriptedFederator>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let federator = Arc::new(ScriptedFederator::new());
        let codec = TokenCodec::new(b"router-test-secret", TokenLifetimes::default());
        let state = Arc::new(AppState::new(
            store,
            federator.clone(),
            codec,
            FRONTEND.to_string(),
            false,
        ));
        Harness {
            app: router(state),
            federator,
        }
    }

    fn profile(name: &str) -> ExternalProfile {
        ExternalProfile {
            external_id: format!("google-{name}"),
            email: format!("{name}@example.com"),
            name: name.to_string(),
            avatar_url: None,
        }
    }

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).expect("json body")
        }

        fn header(&self, name: header::HeaderName) -> &str {
            self.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Reply {
        let response = app.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body")
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn callback(code: &str, state: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(format!("/auth/callback?code={code}&state={state}"));
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("request")
    }

    struct Tokens {
        access: String,
        refresh: String,
    }

    /// Completes a login for a registered person and returns its tokens.
    async fn sign_in(harness: &Harness, name: &str) -> Tokens {
        let code = format!("{name}-code");
        harness.federator.register(&code, profile(name));

        let reply = send(
            &harness.app,
            callback(&code, "scripted-state", Some(STATE_COOKIE)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);

        let location = reqwest::Url::parse(reply.header(header::LOCATION)).expect("location");
        let param = |key: &str| {
            location
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .expect("token param")
        };
        Tokens {
            access: param("access_token"),
            refresh: param("refresh_token"),
        }
    }

    fn find_user<'a>(users: &'a Value, name: &str) -> &'a Value {
        let email = format!("{name}@example.com");
        users
            .as_array()
            .and_then(|users| users.iter().find(|u| u["email"] == email.as_str()))
            .expect("user listed")
    }

    #[tokio::test]
    async fn health_is_public() {
        let reply = send(&harness().app, get_with("/health", None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, b"ok");
    }

    #[tokio::test]
    async fn login_returns_url_and_sets_state_cookie() {
        let reply = send(&harness().app, get_with("/auth/login", None)).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            reply.json()["url"],
            "https://idp.test/authorize?state=scripted-state"
        );
        let cookie = reply.header(header::SET_COOKIE);
        assert!(cookie.starts_with(STATE_COOKIE));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=600"));
    }

    #[tokio::test]
    async fn callback_requires_code_and_matching_state() {
        let harness = harness();
        harness.federator.register("good", profile("alice"));

        let missing_code = send(
            &harness.app,
            get_with("/auth/callback?state=scripted-state", None),
        )
        .await;
        assert_eq!(missing_code.status, StatusCode::BAD_REQUEST);
        assert!(missing_code.json()["error"].is_string());

        let missing_cookie = send(&harness.app, callback("good", "scripted-state", None)).await;
        assert_eq!(missing_cookie.status, StatusCode::BAD_REQUEST);

        let mismatch = send(
            &harness.app,
            callback("good", "forged-state", Some(STATE_COOKIE)),
        )
        .await;
        assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_redirects_with_tokens_and_clears_cookie() {
        let harness = harness();
        harness.federator.register("good", profile("alice"));

        let reply = send(
            &harness.app,
            callback("good", "scripted-state", Some(STATE_COOKIE)),
        )
        .await;

        assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
        let location = reply.header(header::LOCATION);
        assert!(location.starts_with("https://app.example.com/done?from=login&access_token="));
        assert!(location.contains("&refresh_token="));
        let cleared = reply.header(header::SET_COOKIE);
        assert!(cleared.starts_with("auth_state="));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn callback_reports_provider_failure_as_bad_gateway() {
        let harness = harness();
        harness.federator.fail_with(FederationError::Timeout {
            operation: "code exchange".to_string(),
        });

        let reply = send(
            &harness.app,
            callback("any", "scripted-state", Some(STATE_COOKIE)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
        assert_eq!(reply.json(), json!({ "error": "identity provider error" }));
    }

    #[tokio::test]
    async fn refresh_validates_body_and_token_kind() {
        let harness = harness();
        let tokens = sign_in(&harness, "alice").await;

        let malformed = send(
            &harness.app,
            Request::post("/auth/refresh")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await;
        assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

        let wrong_kind = send(
            &harness.app,
            json_request(
                "POST",
                "/auth/refresh",
                None,
                json!({ "refresh_token": tokens.access }),
            ),
        )
        .await;
        assert_eq!(wrong_kind.status, StatusCode::UNAUTHORIZED);

        let refreshed = send(
            &harness.app,
            json_request(
                "POST",
                "/auth/refresh",
                None,
                json!({ "refresh_token": tokens.refresh }),
            ),
        )
        .await;
        assert_eq!(refreshed.status, StatusCode::OK);
        let body = refreshed.json();
        assert_eq!(body["expires_in"], 900);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert!(body["access_token"].is_string());
    }

    #[tokio::test]
    async fn profile_requires_a_bearer_token() {
        let harness = harness();
        let tokens = sign_in(&harness, "alice").await;

        let anonymous = send(&harness.app, get_with("/api/profile", None)).await;
        assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

        let garbage = send(&harness.app, get_with("/api/profile", Some("garbage"))).await;
        assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

        let reply = send(&harness.app, get_with("/api/profile", Some(&tokens.access))).await;
        assert_eq!(reply.status, StatusCode::OK);
        let body = reply.json();
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["roles"], json!(["admin"]));
    }

    #[tokio::test]
    async fn admin_routes_are_denied_to_regular_users() {
        let harness = harness();
        let admin = sign_in(&harness, "alice").await;
        let user = sign_in(&harness, "bob").await;

        let denied = send(&harness.app, get_with("/api/admin/users", Some(&user.access))).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let listed = send(&harness.app, get_with("/api/admin/users", Some(&admin.access))).await;
        assert_eq!(listed.status, StatusCode::OK);
        let users = listed.json();
        assert_eq!(users.as_array().map(Vec::len), Some(2));
        assert_eq!(find_user(&users, "bob")["roles"], json!(["user"]));
    }

    #[tokio::test]
    async fn group_assignment_reaches_refreshed_tokens() {
        let harness = harness();
        let admin = sign_in(&harness, "alice").await;
        let bob = sign_in(&harness, "bob").await;

        let created = send(
            &harness.app,
            json_request(
                "POST",
                "/api/admin/roles",
                Some(&admin.access),
                json!({ "name": "auditor", "permissions": ["audit:read"] }),
            ),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let role_id = created.json()["id"].as_str().expect("role id").to_string();

        let group = send(
            &harness.app,
            json_request(
                "POST",
                "/api/admin/groups",
                Some(&admin.access),
                json!({ "name": "audit", "role_ids": [role_id] }),
            ),
        )
        .await;
        assert_eq!(group.status, StatusCode::CREATED);
        let group_id = group.json()["id"].as_str().expect("group id").to_string();

        let users = send(&harness.app, get_with("/api/admin/users", Some(&admin.access)))
            .await
            .json();
        let bob_id = find_user(&users, "bob")["id"]
            .as_str()
            .expect("user id")
            .to_string();

        let assigned = send(
            &harness.app,
            json_request(
                "PUT",
                &format!("/api/admin/users/{bob_id}/groups"),
                Some(&admin.access),
                json!({ "group_ids": [group_id] }),
            ),
        )
        .await;
        assert_eq!(assigned.status, StatusCode::OK);

        let refreshed = send(
            &harness.app,
            json_request(
                "POST",
                "/auth/refresh",
                None,
                json!({ "refresh_token": bob.refresh }),
            ),
        )
        .await
        .json();
        assert_eq!(refreshed["user"]["groups"], json!(["audit"]));
        assert_eq!(refreshed["user"]["roles"], json!(["auditor", "user"]));
        assert!(
            refreshed["user"]["permissions"]
                .as_array()
                .is_some_and(|p| p.contains(&json!("audit:read")))
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_rejected() {
        let harness = harness();
        let admin = sign_in(&harness, "alice").await;

        let malformed = send(
            &harness.app,
            json_request(
                "PUT",
                "/api/admin/users/not-an-id/roles",
                Some(&admin.access),
                json!({ "role_ids": [] }),
            ),
        )
        .await;
        assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

        let unknown = send(
            &harness.app,
            json_request(
                "PUT",
                &format!("/api/admin/groups/{}/roles", gatehouse_core::GroupId::new()),
                Some(&admin.access),
                json!({ "role_ids": [] }),
            ),
        )
        .await;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    }
}
