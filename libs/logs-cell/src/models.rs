use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use inventory_cell::models::ActionType;

// ==============================================================================
// ROWS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

/// `reagent_lots!inner(...)` as embedded in a log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLot {
    pub lot_number: String,
    pub unit_id: Option<Uuid>,
    pub reagents: Option<NameRef>,
    pub units: Option<NameRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub reagent_lot_id: Uuid,
    /// Kept as text so rows written by older clients still load.
    pub action_type: String,
    pub quantity_before: f64,
    pub quantity_after: f64,
    pub quantity_changed: f64,
    pub user_id: Option<String>,
    pub appointment_id: Option<Uuid>,
    pub notes: Option<String>,
    pub points_awarded: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub reagent_lots: Option<LogLot>,
}

/// A log row with the names a reader needs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEntryView {
    pub id: Uuid,
    pub timestamp: Option<DateTime<Utc>>,
    pub action_type: String,
    pub reagent_lot_id: Uuid,
    pub reagent_name: Option<String>,
    pub lot_number: Option<String>,
    pub unit_id: Option<Uuid>,
    pub unit_name: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub quantity_before: f64,
    pub quantity_after: f64,
    pub quantity_changed: f64,
    pub appointment_id: Option<Uuid>,
    pub points_awarded: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogSummary {
    pub total: usize,
    pub by_action: BTreeMap<String, usize>,
}

// ==============================================================================
// QUERIES
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub action_type: Option<ActionType>,
    pub user_id: Option<String>,
    pub unit_id: Option<Uuid>,
    pub reagent_lot_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LogsError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for LogsError {
    fn from(err: anyhow::Error) -> Self {
        LogsError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for LogsError {
    fn from(err: serde_json::Error) -> Self {
        LogsError::DatabaseError(err.to_string())
    }
}
