//! Organization member roles.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEMBER: &str = "member";
pub const ROLE_VIEWER: &str = "viewer";

pub const VALID_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MEMBER, ROLE_VIEWER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Admin,
    #[default]
    Member,
    Viewer,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => ROLE_ADMIN,
            Self::Member => ROLE_MEMBER,
            Self::Viewer => ROLE_VIEWER,
        }
    }

    /// Strict parse; the input must be an exact lowercase role name.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            ROLE_ADMIN => Ok(Self::Admin),
            ROLE_MEMBER => Ok(Self::Member),
            ROLE_VIEWER => Ok(Self::Viewer),
            other => Err(CoreError::unknown("role", other, VALID_ROLES)),
        }
    }

    /// Lenient parse for user-supplied tokens: trimmed, case-insensitive,
    /// falling back to `default` for anything unrecognized.
    pub fn normalize(token: &str, default: OrgRole) -> OrgRole {
        Self::from_str(&token.trim().to_ascii_lowercase()).unwrap_or(default)
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
