// libs/identity-cell/src/models.rs
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// ROLES
// ==============================================================================

/// Canonical role names held in the identity store. Every role other than
/// `Customer` counts as staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Customer,
    Therapist,
    Receptionist,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Customer,
        Role::Therapist,
        Role::Receptionist,
        Role::Manager,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Therapist => "Therapist",
            Role::Receptionist => "Receptionist",
            Role::Manager => "Manager",
            Role::Admin => "Admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Customer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Customer" => Ok(Role::Customer),
            "Therapist" => Ok(Role::Therapist),
            "Receptionist" => Ok(Role::Receptionist),
            "Manager" => Ok(Role::Manager),
            "Admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

/// A user as stored in the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A resolved caller: the stable user id behind a bearer token plus the
/// role set held at resolution time.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub roles: HashSet<Role>,
}

impl AuthenticatedPrincipal {
    pub fn holds(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn holds_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}
