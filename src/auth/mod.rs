//! Bearer-token authentication and scope authorization
//!
//! # Request flow
//!
//! 1. [`KeySetCache`] fetches and caches the identity provider's JWKS,
//!    refreshing on unknown key id or expiry (single-flight).
//! 2. [`TokenValidator`] verifies the token signature and standard claims
//!    (`alg` allow-list, `iss`, `aud`, `exp`/`nbf` with clock skew) and
//!    extracts the scope set.
//! 3. [`Authorizer`] decides whether the scope set grants access to the
//!    requested project.
//!
//! Validation and authorization run fresh on every request; only the key
//! set is cached. Failure to reach the identity provider fails closed.

pub mod jwks;
pub mod scopes;
pub mod validator;

pub use jwks::{FetchError, KeySetCache, default_jwks_uri};
pub use scopes::{Authorizer, AuthzError, ScopePattern, ScopeRequirement};
pub use validator::{AuthError, TokenClaims, TokenValidator};
