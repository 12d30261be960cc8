use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier carried in tokens.
///
/// Kept as an opaque string so unknown roles still decode; route guards
/// compare against the well-known constructors below.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const HR: &'static str = "hr";
    pub const MANAGER: &'static str = "manager";
    pub const EMPLOYEE: &'static str = "employee";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self(Cow::Borrowed(Self::ADMIN))
    }

    pub fn hr() -> Self {
        Self(Cow::Borrowed(Self::HR))
    }

    pub fn manager() -> Self {
        Self(Cow::Borrowed(Self::MANAGER))
    }

    pub fn employee() -> Self {
        Self(Cow::Borrowed(Self::EMPLOYEE))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
