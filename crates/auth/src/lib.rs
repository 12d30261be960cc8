//! `payrun-auth`: token verification and role checks.
//!
//! Decoupled from HTTP and storage: the API layer extracts the bearer token
//! and maps these errors onto status codes.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use authorize::{AuthzError, require_any_role};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError};
pub use roles::Role;
