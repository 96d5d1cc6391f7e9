// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

use inventory_cell::models::LedgerError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub exam_type_id: Option<Uuid>,
    pub unit_id: Uuid,
    pub patient_name: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub completed_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Embedded `exam_types(name)` when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_types: Option<Value>,
    /// Embedded `units(name)` when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// RESERVATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Active,
    Consumed,
    Released,
    Expired,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Active => write!(f, "active"),
            ReservationStatus::Consumed => write!(f, "consumed"),
            ReservationStatus::Released => write!(f, "released"),
            ReservationStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub reagent_lot_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub quantity_reserved: f64,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ReservationStatus,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A required reagent no lot at the unit could cover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shortage {
    pub reagent_id: Uuid,
    pub quantity_required: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub reservations: Vec<Reservation>,
    pub shortages: Vec<Shortage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChangeOutcome {
    pub appointment: Appointment,
    pub released_reservations: usize,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub exam_type_id: Uuid,
    pub unit_id: Uuid,
    pub patient_name: String,
    pub scheduled_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub status: Option<AppointmentStatus>,
    pub unit_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Exam type not found or inactive")]
    ExamTypeNotFound,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment was modified by another operation; reload and retry")]
    ConcurrentModification,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        AppointmentError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::DatabaseError(err.to_string())
    }
}

impl From<LedgerError> for AppointmentError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Forbidden(msg) => AppointmentError::Forbidden(msg),
            LedgerError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}
