//! Federated login, role-based access control and session tokens for gatehouse.
//!
//! This crate provides:
//! - The access model (`User`, `Group`, `Role`, `DefaultRole`)
//! - Permission resolution across direct and group-inherited roles
//! - Signed access and refresh tokens (`TokenCodec`)
//! - The identity provider boundary (`IdentityFederator`)
//! - The persistence boundary (`IdentityStore`) with an in-memory store
//! - Login and refresh orchestration (`SessionIssuer`)
//! - Request gating (`AccessGate`, `Gate`)
//! - Administrative operations (`Directory`)
//!
//! # Access Model
//!
//! A user's effective permissions are the union of the permissions of its
//! direct roles and of the roles of every group it belongs to. Groups do not
//! nest. The first user ever registered receives the `admin` role; everyone
//! after that receives `user`.
//!
//! # Example
//!
//! ```
//! use gatehouse_access::{
//!     AccessGate, Gate, Group, Role, TokenCodec, TokenLifetimes, User,
//!     ExternalProfile, DefaultRole, AccessDetails, TokenGrant, resolve,
//! };
//!
//! let profile = ExternalProfile {
//!     external_id: "1234".to_string(),
//!     email: "alice@example.com".to_string(),
//!     name: "Alice".to_string(),
//!     avatar_url: None,
//! };
//! let user = User::from_profile(&profile, vec![DefaultRole::User.to_role().into()]);
//! let access = resolve(&user);
//! assert!(access.has_permission("profile:read"));
//!
//! let codec = TokenCodec::new(b"example-secret", TokenLifetimes::default());
//! let details = AccessDetails::new(&user, access);
//! let token = codec
//!     .issue(TokenGrant::Access(&details), user.id(), TokenLifetimes::DEFAULT_ACCESS)
//!     .expect("issue");
//!
//! let gate = AccessGate::new(codec);
//! let header = format!("Bearer {}", token.token);
//! assert!(gate.authorize(Some(&header), &Gate::new().require_role("user")).is_ok());
//! assert!(gate.authorize(Some(&header), &Gate::new().require_role("admin")).is_err());
//! ```

pub mod directory;
pub mod error;
pub mod federation;
pub mod gate;
pub mod group;
pub mod memory;
pub mod oauth;
pub mod permissions;
pub mod role;
pub mod session;
pub mod store;
pub mod token;
pub mod user;

// Re-export main types at crate root
pub use directory::{Directory, NewGroup, NewRole, parse_id, parse_ids};
pub use error::{AccessError, FederationError, StoreError, TokenError};
#[cfg(any(test, feature = "testing"))]
pub use federation::ScriptedFederator;
pub use federation::{AuthorizationRequest, ExternalProfile, IdentityFederator};
pub use gate::{AccessGate, Gate, Principal, Requirement, bearer_token};
pub use group::Group;
pub use memory::MemoryStore;
pub use oauth::{OAuthConfig, OAuthConfigBuilder};
pub use permissions::{ResolvedAccess, resolve};
pub use role::{DefaultRole, DefaultRoles, Role, RoleRef};
pub use session::{Session, SessionIssuer, UserSummary};
pub use store::IdentityStore;
pub use token::{
    AUDIENCE, AccessDetails, Claims, ISSUER, IssuedToken, TokenCodec, TokenGrant, TokenKind,
    TokenLifetimes, TokenPair,
};
pub use user::User;
