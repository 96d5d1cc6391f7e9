use chrono::{Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gamification_cell::models::{AwardContext, ScoredAction};
use gamification_cell::services::{points_for, GamificationService};
use shared_config::AppConfig;
use shared_database::{is_conflict, require_role, SupabaseClient};
use shared_models::auth::StaffRole;

use crate::models::{
    ActionType, AdjustRequest, ConsumeRequest, DiscardCertificate, DiscardRequest, LedgerError,
    LedgerOutcome, LogEntry, LotStatus, RegisterLotRequest, ReagentLot, TransferRequest,
};
use crate::services::audit_chain::AuditChainService;
use crate::services::qr::QrSigner;
use crate::services::rules::{
    plan_adjust, plan_consume, plan_release, plan_reserve, plan_transfer, round_quantity,
    to_view, validate_discard, validate_registration, QuantityChange,
};

/// Lot columns plus the catalog names most responses need.
pub const LOT_SELECT: &str = "*,reagents(id,name,unit_measure,minimum_stock),units(id,name),manufacturers(id,name)";

pub const STOCK_HANDLERS: &[StaffRole] = &[StaffRole::Admin, StaffRole::Manager, StaffRole::Technician];
pub const SUPERVISORS: &[StaffRole] = &[StaffRole::Admin, StaffRole::Manager];

fn scored(action: ActionType) -> ScoredAction {
    match action {
        ActionType::Register => ScoredAction::Register,
        ActionType::Consume => ScoredAction::Consume,
        ActionType::Transfer => ScoredAction::Transfer,
        ActionType::Dispose => ScoredAction::Dispose,
        ActionType::Adjust => ScoredAction::Adjust,
    }
}

fn guard_path(lot_id: Uuid, current: f64, reserved: f64) -> String {
    format!(
        "/rest/v1/reagent_lots?id=eq.{}&current_quantity=eq.{}&reserved_quantity=eq.{}&select={}",
        lot_id, current, reserved, LOT_SELECT
    )
}

pub async fn fetch_lot(supabase: &SupabaseClient, lot_id: &str, auth_token: &str) -> Result<ReagentLot, LedgerError> {
    let path = format!("/rest/v1/reagent_lots?id=eq.{}&select={}", lot_id, LOT_SELECT);
    let rows: Vec<Value> = supabase.request(Method::GET, &path, Some(auth_token), None).await?;
    let row = rows.into_iter().next().ok_or(LedgerError::LotNotFound)?;
    Ok(serde_json::from_value(row)?)
}

/// A reservation drawn down by a consume: `held` before, `left` after.
struct Settlement {
    id: String,
    held: f64,
    left: f64,
}

/// Every mutation of `current_quantity` / `reserved_quantity` goes through here.
pub struct LedgerService {
    supabase: SupabaseClient,
    audit: AuditChainService,
    gamification: GamificationService,
    qr: QrSigner,
    expiry_warning_days: i64,
}

impl LedgerService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            audit: AuditChainService::new(config),
            gamification: GamificationService::new(config),
            qr: QrSigner::new(&config.qr_signing_secret),
            expiry_warning_days: config.expiry_warning_days,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn ensure_role(&self, user_id: &str, auth_token: &str, allowed: &[StaffRole]) -> Result<StaffRole, LedgerError> {
        require_role(&self.supabase, user_id, auth_token, allowed)
            .await
            .map_err(|e| LedgerError::Forbidden(e.to_string()))
    }

    pub async fn get_lot(&self, lot_id: &str, auth_token: &str) -> Result<ReagentLot, LedgerError> {
        fetch_lot(&self.supabase, lot_id, auth_token).await
    }

    /// Conditional PATCH: applies only if nobody changed the quantities since `lot` was read.
    async fn guarded_update(
        &self,
        lot: &ReagentLot,
        change: QuantityChange,
        extra: Map<String, Value>,
        auth_token: &str,
    ) -> Result<ReagentLot, LedgerError> {
        let mut body = extra;
        body.insert("current_quantity".to_string(), json!(change.current));
        body.insert("reserved_quantity".to_string(), json!(change.reserved));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = guard_path(lot.id, lot.current_quantity, lot.reserved_quantity);
        let rows = self.supabase.patch_returning(&path, auth_token, Value::Object(body)).await?;

        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => {
                warn!("Lot {} changed underneath us (expected current={}, reserved={})",
                      lot.id, lot.current_quantity, lot.reserved_quantity);
                return Err(LedgerError::ConcurrentModification);
            }
        };

        let mut updated: ReagentLot = serde_json::from_value(row)?;
        if updated.reagents.is_none() {
            updated.reagents = lot.reagents.clone();
        }
        if updated.units.is_none() {
            updated.units = lot.units.clone();
        }
        if updated.manufacturers.is_none() {
            updated.manufacturers = lot.manufacturers.clone();
        }
        Ok(updated)
    }

    /// Inverse of a guarded update, used when the log row could not be written.
    async fn restore(&self, after: &ReagentLot, before: &ReagentLot, restored_keys: &[&str], auth_token: &str) {
        let previous = serde_json::to_value(before).unwrap_or(Value::Null);
        let mut body = Map::new();
        body.insert("current_quantity".to_string(), json!(before.current_quantity));
        body.insert("reserved_quantity".to_string(), json!(before.reserved_quantity));
        for key in restored_keys {
            body.insert(key.to_string(), previous[*key].clone());
        }

        let path = guard_path(after.id, after.current_quantity, after.reserved_quantity);
        match self.supabase.patch_returning(&path, auth_token, Value::Object(body)).await {
            Ok(rows) if !rows.is_empty() => info!("Restored lot {} after failed log write", before.id),
            Ok(_) => error!("Could not restore lot {}: modified again before compensation", before.id),
            Err(e) => error!("Could not restore lot {}: {}", before.id, e),
        }
    }

    async fn write_log(&self, entry: &LogEntry, auth_token: &str) -> Result<Value, LedgerError> {
        let rows = self.supabase
            .insert_returning("/rest/v1/consumption_logs", auth_token, serde_json::to_value(entry)?)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| LedgerError::DatabaseError("Log insert returned no rows".to_string()))
    }

    /// Lot first, then the log row; a failed log write rolls the lot back.
    async fn commit(
        &self,
        lot: &ReagentLot,
        change: QuantityChange,
        extra: Map<String, Value>,
        entry: LogEntry,
        auth_token: &str,
    ) -> Result<(ReagentLot, Value), LedgerError> {
        let restored_keys: Vec<String> = extra.keys().cloned().collect();
        let updated = self.guarded_update(lot, change, extra, auth_token).await?;

        match self.write_log(&entry, auth_token).await {
            Ok(log) => Ok((updated, log)),
            Err(e) => {
                error!("Log write failed for {} on lot {}: {}", entry.action_type.as_str(), lot.id, e);
                let keys: Vec<&str> = restored_keys.iter().map(String::as_str).collect();
                self.restore(&updated, lot, &keys, auth_token).await;
                Err(LedgerError::DatabaseError(format!("Failed to write ledger log: {}", e)))
            }
        }
    }

    /// Audit link and points; neither can undo a committed ledger write.
    async fn finish(
        &self,
        lot: ReagentLot,
        log: Value,
        action: ActionType,
        details: Value,
        context: AwardContext,
        user_id: &str,
        auth_token: &str,
    ) -> LedgerOutcome {
        let mut lot = lot;
        let audit_hash = if lot.criticality_level.is_critical() {
            match self.audit.record(&lot, action, details, auth_token).await {
                Ok(hash) => {
                    lot.blockchain_hash = Some(hash.clone());
                    Some(hash)
                }
                Err(e) => {
                    error!("Audit chain write failed for lot {}: {}", lot.id, e);
                    None
                }
            }
        } else {
            None
        };

        let points_awarded = self.gamification
            .award_best_effort(user_id, scored(action), context, auth_token)
            .await
            .map(|outcome| outcome.points_awarded + outcome.streak_bonus);

        LedgerOutcome {
            lot: to_view(lot, Self::today()),
            log,
            audit_hash,
            points_awarded,
        }
    }

    fn near_expiry(&self, lot: &ReagentLot) -> bool {
        lot.expiry_date <= Self::today() + Duration::days(self.expiry_warning_days)
    }

    // ==========================================================================
    // REGISTER
    // ==========================================================================

    pub async fn register(
        &self,
        request: RegisterLotRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        debug!("Registering lot {} of reagent {}", request.lot_number, request.reagent_id);

        validate_registration(&request, Self::today())?;
        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;

        let reagent_path = format!(
            "/rest/v1/reagents?id=eq.{}&is_active=eq.true&select=id,name,unit_measure,minimum_stock",
            request.reagent_id
        );
        let reagents: Vec<Value> = self.supabase.request(Method::GET, &reagent_path, Some(auth_token), None).await?;
        if reagents.is_empty() {
            return Err(LedgerError::ReagentNotFound);
        }

        let lot_number = request.lot_number.trim().to_string();
        let duplicate_path = format!(
            "/rest/v1/reagent_lots?reagent_id=eq.{}&lot_number=eq.{}&select=id",
            request.reagent_id,
            urlencoding::encode(&lot_number)
        );
        let existing: Vec<Value> = self.supabase.request(Method::GET, &duplicate_path, Some(auth_token), None).await?;
        if !existing.is_empty() {
            warn!("Duplicate lot number {} for reagent {}", lot_number, request.reagent_id);
            return Err(LedgerError::DuplicateLot(lot_number));
        }

        let quantity = round_quantity(request.initial_quantity);
        let lot_id = Uuid::new_v4();
        let now = Utc::now();

        // The id is chosen here so the signed label can be stored with the row.
        let mut draft: ReagentLot = serde_json::from_value(json!({
            "id": lot_id,
            "reagent_id": request.reagent_id,
            "unit_id": request.unit_id,
            "manufacturer_id": request.manufacturer_id,
            "lot_number": lot_number,
            "location": request.location.trim(),
            "expiry_date": request.expiry_date,
            "initial_quantity": quantity,
            "current_quantity": quantity,
            "reserved_quantity": 0.0,
            "minimum_stock": request.minimum_stock,
            "criticality_level": request.criticality_level,
            "status": LotStatus::Active,
            "storage_conditions": request.storage_conditions,
            "registered_by": user_id,
            "reagents": reagents[0],
        }))?;
        let label = self.qr.sign(QrSigner::payload_for(&draft, now))?;
        draft.qr_code_data = Some(serde_json::to_string(&label)?);

        let mut row = serde_json::to_value(&draft)?;
        if let Some(object) = row.as_object_mut() {
            object.retain(|key, value| {
                !value.is_null() && !matches!(key.as_str(), "reagents" | "units" | "manufacturers")
            });
        }

        let path = format!("/rest/v1/reagent_lots?select={}", LOT_SELECT);
        let inserted = self.supabase.insert_returning(&path, auth_token, row).await.map_err(|e| {
            if is_conflict(&e) {
                LedgerError::DuplicateLot(draft.lot_number.clone())
            } else {
                LedgerError::from(e)
            }
        })?;
        let mut lot: ReagentLot = match inserted.into_iter().next() {
            Some(row) => serde_json::from_value(row)?,
            None => return Err(LedgerError::DatabaseError("Lot insert returned no rows".to_string())),
        };
        if lot.reagents.is_none() {
            lot.reagents = draft.reagents.clone();
        }

        let critical = lot.criticality_level.is_critical();
        let entry = LogEntry {
            reagent_lot_id: lot.id,
            action_type: ActionType::Register,
            quantity_before: 0.0,
            quantity_after: quantity,
            quantity_changed: quantity,
            user_id: user_id.to_string(),
            appointment_id: None,
            notes: request.notes.clone(),
            points_awarded: points_for(ScoredAction::Register, critical),
        };

        let log = match self.write_log(&entry, auth_token).await {
            Ok(log) => log,
            Err(e) => {
                error!("Register log failed for lot {}: {}", lot.id, e);
                let path = format!(
                    "/rest/v1/reagent_lots?id=eq.{}&current_quantity=eq.{}&reserved_quantity=eq.0",
                    lot.id, quantity
                );
                if let Err(cleanup) = self.supabase.request::<Value>(Method::DELETE, &path, Some(auth_token), None).await {
                    error!("Could not remove unlogged lot {}: {}", lot.id, cleanup);
                }
                return Err(LedgerError::DatabaseError(format!("Failed to write ledger log: {}", e)));
            }
        };

        info!("Lot {} ({}) registered with {} by {}", lot.id, lot.lot_number, quantity, user_id);

        let details = json!({
            "reagent": lot.reagent_name(),
            "lot_number": lot.lot_number,
            "quantity": quantity,
            "expiry_date": lot.expiry_date,
            "location": lot.location,
        });
        let context = AwardContext { critical, near_expiry: false };
        Ok(self.finish(lot, log, ActionType::Register, details, context, user_id, auth_token).await)
    }

    // ==========================================================================
    // CONSUME
    // ==========================================================================

    async fn active_reservations(
        &self,
        appointment_id: Uuid,
        lot_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Value>, LedgerError> {
        let path = format!(
            "/rest/v1/reagent_reservations?appointment_id=eq.{}&reagent_lot_id=eq.{}&status=eq.active&select=id,quantity_reserved&order=created_at.asc",
            appointment_id, lot_id
        );
        Ok(self.supabase.request(Method::GET, &path, Some(auth_token), None).await?)
    }

    /// Draws `used` from the appointment's reservations, oldest first.
    ///
    /// Each claim only applies while the row is still active with the quantity we read, so a
    /// reservation the sweeper or a cancellation got to first fails the whole settlement and
    /// the claims already made are put back.
    async fn settle_reservations(
        &self,
        reservations: &[Value],
        used: f64,
        auth_token: &str,
    ) -> Result<Vec<Settlement>, LedgerError> {
        let mut settled = Vec::new();
        let mut remaining = used;
        for reservation in reservations {
            if remaining <= 0.0 {
                break;
            }
            let Some(id) = reservation["id"].as_str() else { continue };
            let held = reservation["quantity_reserved"].as_f64().unwrap_or(0.0);
            let taken = held.min(remaining);
            remaining = round_quantity(remaining - taken);

            let settlement = Settlement { id: id.to_string(), held, left: round_quantity(held - taken) };
            let body = if settlement.left <= 0.0 {
                json!({ "status": "consumed" })
            } else {
                json!({ "quantity_reserved": settlement.left })
            };
            let path = format!(
                "/rest/v1/reagent_reservations?id=eq.{}&status=eq.active&quantity_reserved=eq.{}",
                id, held
            );

            match self.supabase.patch_returning(&path, auth_token, body).await {
                Ok(rows) if !rows.is_empty() => settled.push(settlement),
                Ok(_) => {
                    warn!("Reservation {} changed before it could be settled", id);
                    self.unsettle(&settled, auth_token).await;
                    return Err(LedgerError::ConcurrentModification);
                }
                Err(e) => {
                    error!("Could not settle reservation {}: {}", id, e);
                    self.unsettle(&settled, auth_token).await;
                    return Err(LedgerError::from(e));
                }
            }
        }
        Ok(settled)
    }

    /// Puts claimed reservations back the way they were read.
    async fn unsettle(&self, settled: &[Settlement], auth_token: &str) {
        for settlement in settled {
            let (path, body) = if settlement.left <= 0.0 {
                (
                    format!("/rest/v1/reagent_reservations?id=eq.{}&status=eq.consumed", settlement.id),
                    json!({ "status": "active" }),
                )
            } else {
                (
                    format!(
                        "/rest/v1/reagent_reservations?id=eq.{}&status=eq.active&quantity_reserved=eq.{}",
                        settlement.id, settlement.left
                    ),
                    json!({ "quantity_reserved": settlement.held }),
                )
            };

            match self.supabase.patch_returning(&path, auth_token, body).await {
                Ok(rows) if !rows.is_empty() => info!("Reservation {} put back after failed consume", settlement.id),
                Ok(_) => error!("Could not put back reservation {}: modified again", settlement.id),
                Err(e) => error!("Could not put back reservation {}: {}", settlement.id, e),
            }
        }
    }

    pub async fn consume(
        &self,
        lot_id: &str,
        request: ConsumeRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        debug!("Consuming {} from lot {}", request.quantity, lot_id);

        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;
        let lot = self.get_lot(lot_id, auth_token).await?;

        let reservations = match request.appointment_id {
            Some(appointment_id) => self.active_reservations(appointment_id, lot.id, auth_token).await?,
            None => Vec::new(),
        };
        let credit: f64 = reservations.iter()
            .filter_map(|r| r["quantity_reserved"].as_f64())
            .sum();

        let plan = plan_consume(&lot, request.quantity, credit, Self::today()).map_err(|e| {
            warn!("Consume rejected on lot {}: {}", lot.id, e);
            e
        })?;

        let critical = lot.criticality_level.is_critical();
        let entry = LogEntry {
            reagent_lot_id: lot.id,
            action_type: ActionType::Consume,
            quantity_before: lot.current_quantity,
            quantity_after: plan.after.current,
            quantity_changed: plan.quantity,
            user_id: user_id.to_string(),
            appointment_id: request.appointment_id,
            notes: request.notes.clone(),
            points_awarded: points_for(ScoredAction::Consume, critical),
        };

        // Reservations are claimed before the lot gives up their quantity.
        let settled = if plan.credit_used > 0.0 {
            self.settle_reservations(&reservations, plan.credit_used, auth_token).await?
        } else {
            Vec::new()
        };

        let (updated, log) = match self.commit(&lot, plan.after, Map::new(), entry, auth_token).await {
            Ok(committed) => committed,
            Err(e) => {
                self.unsettle(&settled, auth_token).await;
                return Err(e);
            }
        };

        info!("Consumed {} from lot {} ({} -> {})", plan.quantity, lot.id, lot.current_quantity, plan.after.current);

        let details = json!({
            "quantity": plan.quantity,
            "quantity_before": lot.current_quantity,
            "quantity_after": plan.after.current,
            "appointment_id": request.appointment_id,
        });
        let context = AwardContext { critical, near_expiry: self.near_expiry(&lot) };
        Ok(self.finish(updated, log, ActionType::Consume, details, context, user_id, auth_token).await)
    }

    // ==========================================================================
    // TRANSFER
    // ==========================================================================

    pub async fn transfer(
        &self,
        lot_id: &str,
        request: TransferRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        debug!("Transferring {} of lot {} to {}", request.quantity, lot_id, request.to_location);

        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;
        let lot = self.get_lot(lot_id, auth_token).await?;
        let change = plan_transfer(&lot, &request, Self::today())?;

        let from = lot.location.clone().unwrap_or_default();
        let to = request.to_location.trim().to_string();
        let reason = request.reason.trim().to_string();
        let quantity = round_quantity(request.quantity);
        let critical = lot.criticality_level.is_critical();

        let mut extra = Map::new();
        extra.insert("location".to_string(), json!(to));

        let entry = LogEntry {
            reagent_lot_id: lot.id,
            action_type: ActionType::Transfer,
            quantity_before: lot.current_quantity,
            quantity_after: change.current,
            quantity_changed: quantity,
            user_id: user_id.to_string(),
            appointment_id: None,
            notes: Some(format!("Transfer: {} -> {}. Reason: {}", from, to, reason)),
            points_awarded: points_for(ScoredAction::Transfer, critical),
        };

        let (updated, log) = self.commit(&lot, change, extra, entry, auth_token).await?;
        info!("Transferred {} of lot {} from {} to {}", quantity, lot.id, from, to);

        let details = json!({
            "from": from,
            "to": to,
            "quantity": quantity,
            "reason": reason,
            "user": user_id,
        });
        let context = AwardContext { critical, near_expiry: false };
        Ok(self.finish(updated, log, ActionType::Transfer, details, context, user_id, auth_token).await)
    }

    // ==========================================================================
    // DISCARD
    // ==========================================================================

    pub async fn discard(
        &self,
        lot_id: &str,
        request: DiscardRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<(LedgerOutcome, DiscardCertificate), LedgerError> {
        debug!("Discarding lot {}", lot_id);

        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;
        let lot = self.get_lot(lot_id, auth_token).await?;
        validate_discard(&lot, &request).map_err(|e| {
            warn!("Discard rejected on lot {}: {}", lot.id, e);
            e
        })?;

        let quantity = lot.current_quantity;
        let reason = request.reason.trim().to_string();
        let critical = lot.criticality_level.is_critical();

        let mut notes = format!("Discard: {}. Checklist completed.", reason);
        if let Some(extra_notes) = request.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            notes.push_str(&format!(" Notes: {}", extra_notes));
        }

        let mut extra = Map::new();
        extra.insert("status".to_string(), json!(LotStatus::Disposed));

        let entry = LogEntry {
            reagent_lot_id: lot.id,
            action_type: ActionType::Dispose,
            quantity_before: quantity,
            quantity_after: 0.0,
            quantity_changed: quantity,
            user_id: user_id.to_string(),
            appointment_id: None,
            notes: Some(notes),
            points_awarded: points_for(ScoredAction::Dispose, critical),
        };

        let change = QuantityChange { current: 0.0, reserved: lot.reserved_quantity };
        let (updated, log) = self.commit(&lot, change, extra, entry, auth_token).await?;
        info!("Lot {} disposed ({} discarded) by {}", lot.id, quantity, user_id);

        let details = json!({
            "reason": reason,
            "quantity": quantity,
            "checklist_completed": true,
            "photos_count": request.photos.len(),
            "user": user_id,
        });
        let context = AwardContext { critical, near_expiry: false };
        let outcome = self.finish(updated, log, ActionType::Dispose, details, context, user_id, auth_token).await;

        let now = Utc::now();
        let certificate = DiscardCertificate {
            certificate_id: format!("CERT_{}_{}", now.timestamp_millis(), lot.id),
            reagent: lot.reagent_name().to_string(),
            lot_number: lot.lot_number.clone(),
            quantity,
            unit_measure: lot.unit_measure().map(str::to_string),
            reason,
            discarded_by: user_id.to_string(),
            discarded_at: now,
            checklist_items: request.checklist.len(),
            photos_attached: request.photos.len(),
            audit_registered: outcome.audit_hash.is_some(),
        };

        Ok((outcome, certificate))
    }

    // ==========================================================================
    // ADJUST
    // ==========================================================================

    pub async fn adjust(
        &self,
        lot_id: &str,
        request: AdjustRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        debug!("Adjusting lot {} to {}", lot_id, request.new_quantity);

        self.ensure_role(user_id, auth_token, SUPERVISORS).await?;
        let lot = self.get_lot(lot_id, auth_token).await?;
        let change = plan_adjust(&lot, &request)?;
        let critical = lot.criticality_level.is_critical();

        // Positive when stock goes down, like every other ledger action.
        let delta = round_quantity(lot.current_quantity - change.current);
        let entry = LogEntry {
            reagent_lot_id: lot.id,
            action_type: ActionType::Adjust,
            quantity_before: lot.current_quantity,
            quantity_after: change.current,
            quantity_changed: delta,
            user_id: user_id.to_string(),
            appointment_id: None,
            notes: Some(format!("Adjustment: {}", request.reason.trim())),
            points_awarded: points_for(ScoredAction::Adjust, critical),
        };

        let (updated, log) = self.commit(&lot, change, Map::new(), entry, auth_token).await?;
        info!("Lot {} adjusted {} -> {} by {}", lot.id, lot.current_quantity, change.current, user_id);

        let details = json!({
            "quantity_before": lot.current_quantity,
            "quantity_after": change.current,
            "reason": request.reason.trim(),
        });
        let context = AwardContext { critical, near_expiry: false };
        Ok(self.finish(updated, log, ActionType::Adjust, details, context, user_id, auth_token).await)
    }

    // ==========================================================================
    // RESERVE / RELEASE
    // ==========================================================================

    /// Holds `quantity` on the lot; reservation rows are written by the caller.
    pub async fn reserve(&self, lot: &ReagentLot, quantity: f64, auth_token: &str) -> Result<ReagentLot, LedgerError> {
        let change = plan_reserve(lot, quantity, Self::today())?;
        let updated = self.guarded_update(lot, change, Map::new(), auth_token).await?;
        info!("Reserved {} on lot {} (reserved {} -> {})", quantity, lot.id, lot.reserved_quantity, change.reserved);
        Ok(updated)
    }

    pub async fn release(&self, lot_id: &str, quantity: f64, auth_token: &str) -> Result<ReagentLot, LedgerError> {
        let lot = self.get_lot(lot_id, auth_token).await?;
        let change = plan_release(&lot, quantity);
        if change.reserved == lot.reserved_quantity {
            return Ok(lot);
        }

        let updated = self.guarded_update(&lot, change, Map::new(), auth_token).await?;
        info!("Released {} on lot {} (reserved {} -> {})",
              round_quantity(lot.reserved_quantity - change.reserved), lot.id, lot.reserved_quantity, change.reserved);
        Ok(updated)
    }
}
