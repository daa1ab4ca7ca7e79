use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of platform roles. Every permission decision matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Pharmacist,
    Delivery,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Pharmacist => "pharmacist",
            Role::Delivery => "delivery",
            Role::Admin => "admin",
        }
    }

    /// Pharmacists and admins may verify prescriptions and manage orders.
    pub fn is_staff(&self) -> bool {
        match self {
            Role::Pharmacist | Role::Admin => true,
            Role::Patient | Role::Delivery => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "pharmacist" => Ok(Role::Pharmacist),
            "delivery" => Ok(Role::Delivery),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    /// Whether this actor may act on behalf of `pharmacy_id`: the pharmacist who owns it, or any admin.
    pub fn manages_pharmacy(&self, pharmacy_id: Option<i32>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Pharmacist => pharmacy_id == Some(self.id),
            Role::Patient | Role::Delivery => false,
        }
    }
}
