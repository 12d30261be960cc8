use thiserror::Error;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' is not allowed (requires one of: {required})")]
    Forbidden { role: String, required: String },
}

/// Allow the request if `role` is one of `allowed`.
///
/// Pure policy check: no IO, no panics.
pub fn require_any_role(role: &Role, allowed: &[&str]) -> Result<(), AuthzError> {
    if allowed.iter().any(|a| *a == role.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: role.as_str().to_string(),
            required: allowed.join(", "),
        })
    }
}
