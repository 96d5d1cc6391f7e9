use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Lab staff role as stored in `profiles.role`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Manager,
    Technician,
    Auditor,
}

impl StaffRole {
    pub const ALL: [StaffRole; 4] = [
        StaffRole::Admin,
        StaffRole::Manager,
        StaffRole::Technician,
        StaffRole::Auditor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Manager => "manager",
            StaffRole::Technician => "technician",
            StaffRole::Auditor => "auditor",
        }
    }

    pub fn is_supervisor(&self) -> bool {
        matches!(self, StaffRole::Admin | StaffRole::Manager)
    }

    /// Auditors only read; every other role may move stock.
    pub fn can_handle_stock(&self) -> bool {
        !matches!(self, StaffRole::Auditor)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(StaffRole::Admin),
            "manager" => Ok(StaffRole::Manager),
            "technician" => Ok(StaffRole::Technician),
            "auditor" => Ok(StaffRole::Auditor),
            other => Err(format!("Unknown staff role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_role_round_trips_through_str() {
        for role in StaffRole::ALL {
            assert_eq!(role.as_str().parse::<StaffRole>().unwrap(), role);
        }
        assert!("Admin ".parse::<StaffRole>().is_ok());
        assert!("authenticated".parse::<StaffRole>().is_err());
    }

    #[test]
    fn only_admin_and_manager_supervise() {
        assert!(StaffRole::Admin.is_supervisor());
        assert!(StaffRole::Manager.is_supervisor());
        assert!(!StaffRole::Technician.is_supervisor());
        assert!(!StaffRole::Auditor.can_handle_stock());
        assert!(StaffRole::Technician.can_handle_stock());
    }
}
