use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

// ==============================================================================
// REAGENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reagent {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub reagent_type: Option<String>,
    pub unit_measure: String,
    #[serde(default)]
    pub minimum_stock: f64,
    pub storage_conditions: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReagentRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub reagent_type: Option<String>,
    pub unit_measure: String,
    #[serde(default)]
    pub minimum_stock: f64,
    pub storage_conditions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReagentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub reagent_type: Option<String>,
    pub unit_measure: Option<String>,
    pub minimum_stock: Option<f64>,
    pub storage_conditions: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReagentQuery {
    #[serde(default)]
    pub include_inactive: bool,
    pub search: Option<String>,
}

// ==============================================================================
// UNITS AND MANUFACTURERS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUnitRequest {
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: Uuid,
    pub name: String,
    pub contact_info: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateManufacturerRequest {
    pub name: String,
    pub contact_info: Option<String>,
}

// ==============================================================================
// EXAM TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredReagent {
    pub reagent_id: Uuid,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub required_reagents: Vec<RequiredReagent>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExamTypeRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub required_reagents: Vec<RequiredReagent>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Reagent not found")]
    ReagentNotFound,

    #[error("Exam type not found")]
    ExamTypeNotFound,

    #[error("An active reagent named '{0}' already exists")]
    DuplicateReagent(String),

    #[error("'{0}' already exists")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        CatalogError::DatabaseError(err.to_string())
    }
}
