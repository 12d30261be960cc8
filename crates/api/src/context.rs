use payrun_auth::{JwtClaims, Role};
use payrun_core::UserId;
use payrun_payroll::Requester;

/// Authenticated user for a request, derived from verified token claims.
///
/// Inserted by the auth middleware; every protected handler can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
    email: String,
    role: Role,
}

impl UserContext {
    pub fn new(user_id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
        }
    }

    pub fn from_claims(claims: JwtClaims) -> Self {
        Self::new(claims.sub, claims.email, claims.role)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// The requester recorded on an enqueued payroll job.
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id,
            email: self.email.clone(),
            role: self.role.as_str().to_string(),
        }
    }
}
