use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ==============================================================================
// LOT STATE
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    #[default]
    Active,
    Expired,
    Disposed,
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotStatus::Active => write!(f, "active"),
            LotStatus::Expired => write!(f, "expired"),
            LotStatus::Disposed => write!(f, "disposed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn is_critical(&self) -> bool {
        matches!(self, Criticality::Critical)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Register,
    Consume,
    Transfer,
    Dispose,
    Adjust,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Register => "register",
            ActionType::Consume => "consume",
            ActionType::Transfer => "transfer",
            ActionType::Dispose => "dispose",
            ActionType::Adjust => "adjust",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Normal,
    Low,
    Critical,
    Expired,
    Disposed,
}

// ==============================================================================
// LOTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReagentSummary {
    pub id: Option<Uuid>,
    pub name: String,
    pub unit_measure: Option<String>,
    pub minimum_stock: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReagentLot {
    pub id: Uuid,
    pub reagent_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub manufacturer_id: Option<Uuid>,
    pub lot_number: String,
    pub location: Option<String>,
    pub expiry_date: NaiveDate,
    pub initial_quantity: f64,
    pub current_quantity: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reserved_quantity: f64,
    pub minimum_stock: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub criticality_level: Criticality,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: LotStatus,
    pub storage_conditions: Option<String>,
    pub qr_code_data: Option<String>,
    pub blockchain_hash: Option<String>,
    pub quality_score: Option<f64>,
    pub registered_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reagents: Option<ReagentSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturers: Option<NamedRef>,
}

impl ReagentLot {
    pub fn reagent_name(&self) -> &str {
        self.reagents.as_ref().map(|r| r.name.as_str()).unwrap_or("")
    }

    pub fn unit_measure(&self) -> Option<&str> {
        self.reagents.as_ref().and_then(|r| r.unit_measure.as_deref())
    }

    /// Lot minimum, falling back to the reagent's catalog minimum.
    pub fn effective_minimum(&self) -> f64 {
        self.minimum_stock
            .or_else(|| self.reagents.as_ref().and_then(|r| r.minimum_stock))
            .unwrap_or(0.0)
    }
}

/// A lot as returned to clients, with the derived stock figures.
#[derive(Debug, Clone, Serialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: ReagentLot,
    pub available_quantity: f64,
    pub stock_status: StockStatus,
}

// ==============================================================================
// LEDGER REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterLotRequest {
    pub reagent_id: Uuid,
    pub manufacturer_id: Option<Uuid>,
    pub unit_id: Uuid,
    pub lot_number: String,
    pub initial_quantity: f64,
    pub expiry_date: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub criticality_level: Criticality,
    pub minimum_stock: Option<f64>,
    pub storage_conditions: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub quantity: f64,
    pub appointment_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub quantity: f64,
    pub to_location: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardRequest {
    pub reason: String,
    #[serde(default)]
    pub checklist: Vec<u8>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub new_quantity: f64,
    pub reason: String,
}

/// Row written to `consumption_logs`.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub reagent_lot_id: Uuid,
    pub action_type: ActionType,
    pub quantity_before: f64,
    pub quantity_after: f64,
    pub quantity_changed: f64,
    pub user_id: String,
    pub appointment_id: Option<Uuid>,
    pub notes: Option<String>,
    pub points_awarded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerOutcome {
    pub lot: LotView,
    pub log: Value,
    pub audit_hash: Option<String>,
    pub points_awarded: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscardCertificate {
    pub certificate_id: String,
    pub reagent: String,
    pub lot_number: String,
    pub quantity: f64,
    pub unit_measure: Option<String>,
    pub reason: String,
    pub discarded_by: String,
    pub discarded_at: DateTime<Utc>,
    pub checklist_items: usize,
    pub photos_attached: usize,
    pub audit_registered: bool,
}

// ==============================================================================
// QUERIES
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotQuery {
    pub unit_id: Option<Uuid>,
    pub reagent_id: Option<Uuid>,
    pub status: Option<LotStatus>,
    pub stock_status: Option<StockStatus>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitStock {
    pub unit_id: Option<Uuid>,
    pub unit_name: Option<String>,
    pub total_quantity: f64,
    pub available_quantity: f64,
    pub reserved_quantity: f64,
    pub percent_available: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub active_lots: usize,
    pub low_stock_lots: usize,
    pub expiring_soon_lots: usize,
    pub consumptions_today: usize,
    pub units: Vec<UnitStock>,
}

// ==============================================================================
// QR, AUDIT CHAIN, QUALITY CONTROL
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub lot_id: Uuid,
    pub reagent_name: String,
    pub lot_number: String,
    pub manufacturer: Option<String>,
    pub expiry_date: NaiveDate,
    pub quantity: f64,
    pub unit_measure: Option<String>,
    pub location: Option<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    /// Raw text decoded from the QR image.
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrintQrRequest {
    pub print_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainEntry {
    pub id: Option<Uuid>,
    pub transaction_hash: String,
    pub transaction_type: String,
    pub reagent_lot_id: Option<Uuid>,
    pub data_hash: String,
    pub status: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QcResult {
    Pass,
    Fail,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQualityControlRequest {
    pub test_type: String,
    pub test_result: QcResult,
    pub observations: Option<String>,
    pub next_test_due: Option<NaiveDate>,
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityControl {
    pub id: Uuid,
    pub reagent_lot_id: Uuid,
    pub test_type: String,
    pub test_result: Option<String>,
    pub observations: Option<String>,
    pub next_test_due: Option<NaiveDate>,
    pub parameters: Option<Value>,
    pub tested_by: Option<String>,
    pub test_date: Option<DateTime<Utc>>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Lot not found")]
    LotNotFound,

    #[error("Reagent not found or inactive")]
    ReagentNotFound,

    #[error("Lot number '{0}' is already registered for this reagent")]
    DuplicateLot(String),

    #[error("Lot is {0} and cannot be used")]
    LotNotActive(LotStatus),

    #[error("Lot expired on {0}")]
    LotExpired(NaiveDate),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: f64, available: f64 },

    #[error("Lot has {0} reserved; release reservations first")]
    ReservationsOutstanding(f64),

    #[error("Lot was modified by another operation; reload and retry")]
    ConcurrentModification,

    #[error("Invalid QR payload: {0}")]
    InvalidQrPayload(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::DatabaseError(err.to_string())
    }
}
