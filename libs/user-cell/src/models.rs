use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::auth::StaffRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub role: StaffRole,
    pub unit_id: Option<Uuid>,
    /// Null is treated as active.
    pub is_active: Option<bool>,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Embedded `units(name,location)` when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Value>,
}

impl Profile {
    pub fn active(&self) -> bool {
        self.is_active != Some(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<StaffRole>,
    pub unit_id: Option<Uuid>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<StaffRole>,
    pub unit_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.role.is_none() && self.unit_id.is_none() && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_role: BTreeMap<String, usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    SelfLockout(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        UserError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for UserError {
    fn from(err: serde_json::Error) -> Self {
        UserError::DatabaseError(err.to_string())
    }
}
