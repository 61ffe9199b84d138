//! User role model

use serde::{Deserialize, Serialize};

use crate::constants::roles;

/// Role of the caller, as asserted by the authentication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

impl UserRole {
    /// Get role as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => roles::STUDENT,
            Self::Instructor => roles::INSTRUCTOR,
            Self::Admin => roles::ADMIN,
        }
    }

    /// Parse role from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            roles::STUDENT => Some(Self::Student),
            roles::INSTRUCTOR => Some(Self::Instructor),
            roles::ADMIN => Some(Self::Admin),
            _ => None,
        }
    }

    /// Staff may run and submit without being enrolled and may read any attempt
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Instructor | Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
