use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractorId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for ContractorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates an opaque identifier for a newly created record.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Contractor,
    Admin,
}

/// An already-authenticated caller. Authentication happens upstream; the
/// engine only compares roles and ownership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::User }
    }

    pub fn contractor(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Contractor }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_user(&self, user_id: &UserId) -> bool {
        self.role == Role::User && self.id == user_id.0
    }

    pub fn as_contractor(&self) -> Option<ContractorId> {
        (self.role == Role::Contractor).then(|| ContractorId(self.id.clone()))
    }
}

/// Read-only projection served by the contractor directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractorInfo {
    pub id: ContractorId,
    pub display_name: String,
    pub company_name: Option<String>,
    pub rating: Option<f32>,
}
