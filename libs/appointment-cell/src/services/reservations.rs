// libs/appointment-cell/src/services/reservations.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use inventory_cell::models::{LedgerError, ReagentLot};
use inventory_cell::services::ledger::LOT_SELECT;
use inventory_cell::services::rules::available;
use inventory_cell::LedgerService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{AppointmentError, Reservation, ReservationStatus, Shortage};

/// PostgREST-safe timestamp (no `+` offset to escape).
pub fn query_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Lots, in the given order, whose available quantity covers `quantity`.
pub fn covering_lots(lots: &[ReagentLot], quantity: f64) -> Vec<&ReagentLot> {
    lots.iter().filter(|lot| available(lot) >= quantity).collect()
}

pub struct ReservationService {
    supabase: SupabaseClient,
    ledger: LedgerService,
    ttl_hours: i64,
}

impl ReservationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            ledger: LedgerService::new(config),
            ttl_hours: config.reservation_ttl_hours,
        }
    }

    async fn candidate_lots(
        &self,
        reagent_id: Uuid,
        unit_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ReagentLot>, AppointmentError> {
        let path = format!(
            "/rest/v1/reagent_lots?reagent_id=eq.{}&unit_id=eq.{}&status=eq.active&expiry_date=gte.{}&order=expiry_date.asc&select={}",
            reagent_id,
            unit_id,
            Utc::now().date_naive(),
            LOT_SELECT
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    /// Holds `quantity` of a reagent for the appointment on the soonest-expiring covering lot.
    pub async fn reserve_for(
        &self,
        appointment_id: Uuid,
        unit_id: Uuid,
        reagent_id: Uuid,
        quantity: f64,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Result<Reservation, Shortage>, AppointmentError> {
        let shortage = |reason: &str| Shortage {
            reagent_id,
            quantity_required: quantity,
            reason: reason.to_string(),
        };

        let lots = self.candidate_lots(reagent_id, unit_id, auth_token).await?;
        let candidates = covering_lots(&lots, quantity);
        if candidates.is_empty() {
            warn!("No lot of reagent {} at unit {} covers {}", reagent_id, unit_id, quantity);
            return Ok(Err(shortage("No active lot at this unit has enough available stock")));
        }

        // A lot that changes underneath us is skipped for the next candidate.
        let mut held = None;
        for lot in candidates {
            match self.ledger.reserve(lot, quantity, auth_token).await {
                Ok(updated) => {
                    held = Some(updated);
                    break;
                }
                Err(LedgerError::ConcurrentModification) | Err(LedgerError::InsufficientStock { .. }) => {
                    debug!("Lot {} no longer reservable, trying next", lot.id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some(lot) = held else {
            return Ok(Err(shortage("Every covering lot changed while reserving")));
        };

        let body = json!({
            "reagent_lot_id": lot.id,
            "appointment_id": appointment_id,
            "quantity_reserved": quantity,
            "expires_at": (Utc::now() + Duration::hours(self.ttl_hours)).to_rfc3339(),
            "status": ReservationStatus::Active,
            "created_by": user_id,
        });

        let inserted = match self.supabase.insert_returning("/rest/v1/reagent_reservations", auth_token, body).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Reservation row for lot {} failed: {}", lot.id, e);
                if let Err(undo) = self.ledger.release(&lot.id.to_string(), quantity, auth_token).await {
                    error!("Could not hand back {} on lot {}: {}", quantity, lot.id, undo);
                }
                return Err(AppointmentError::DatabaseError(format!("Failed to record reservation: {}", e)));
            }
        };

        let row = inserted.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Reservation insert returned no rows".to_string()))?;
        let reservation: Reservation = serde_json::from_value(row)?;

        info!("Reserved {} of reagent {} on lot {} for appointment {}",
              quantity, reagent_id, lot.id, appointment_id);
        Ok(Ok(reservation))
    }

    pub async fn for_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Vec<Reservation>, AppointmentError> {
        let path = format!(
            "/rest/v1/reagent_reservations?appointment_id=eq.{}&order=created_at.asc",
            appointment_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    /// Moves an active reservation to `status` and hands its quantity back to the lot.
    /// Returns false when someone else already settled it.
    async fn settle(&self, reservation: &Reservation, status: ReservationStatus, auth_token: &str) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/reagent_reservations?id=eq.{}&status=eq.active", reservation.id);
        let claimed = self.supabase
            .patch_returning(&path, auth_token, json!({ "status": status }))
            .await?;
        if claimed.is_empty() {
            return Ok(false);
        }

        if let Err(e) = self.ledger
            .release(&reservation.reagent_lot_id.to_string(), reservation.quantity_reserved, auth_token)
            .await
        {
            error!("Reservation {} marked {} but lot {} kept its hold: {}",
                   reservation.id, status, reservation.reagent_lot_id, e);
        }
        Ok(true)
    }

    /// Releases the given reservations; failures are logged and skipped.
    pub async fn release_all(&self, reservations: &[Reservation], auth_token: &str) -> usize {
        let mut released = 0;
        for reservation in reservations {
            match self.settle(reservation, ReservationStatus::Released, auth_token).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => error!("Could not release reservation {}: {}", reservation.id, e),
            }
        }
        released
    }

    pub async fn release_for_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<usize, AppointmentError> {
        let active: Vec<Reservation> = self.for_appointment(appointment_id, auth_token).await?
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Active)
            .collect();

        let mut released = 0;
        for reservation in &active {
            if self.settle(reservation, ReservationStatus::Released, auth_token).await? {
                released += 1;
            }
        }

        if released > 0 {
            info!("Released {} reservations of appointment {}", released, appointment_id);
        }
        Ok(released)
    }

    /// Expires every active reservation past `expires_at`.
    pub async fn expire_stale(&self, auth_token: &str) -> Result<usize, AppointmentError> {
        let path = format!(
            "/rest/v1/reagent_reservations?status=eq.active&expires_at=lt.{}&order=expires_at.asc",
            query_timestamp(Utc::now())
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let stale: Vec<Reservation> = rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?;

        let mut expired = 0;
        for reservation in &stale {
            match self.settle(reservation, ReservationStatus::Expired, auth_token).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not expire reservation {}: {}", reservation.id, e),
            }
        }

        info!("Reservation sweep expired {} of {} stale holds", expired, stale.len());
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn lot(current: f64, reserved: f64) -> ReagentLot {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "reagent_id": Uuid::new_v4(),
            "unit_id": Uuid::new_v4(),
            "manufacturer_id": null,
            "lot_number": "L-1",
            "location": "Shelf 1",
            "expiry_date": "2099-01-01",
            "initial_quantity": 100.0,
            "current_quantity": current,
            "reserved_quantity": reserved,
            "minimum_stock": null,
            "criticality_level": "medium",
            "status": "active",
            "storage_conditions": null,
            "qr_code_data": null,
            "blockchain_hash": null,
            "quality_score": null,
            "registered_by": null,
            "created_at": null,
            "updated_at": null
        }))
        .unwrap()
    }

    #[test]
    fn keeps_expiry_order_of_covering_lots() {
        let lots = vec![lot(10.0, 8.0), lot(30.0, 0.0), lot(50.0, 0.0)];
        let covering = covering_lots(&lots, 5.0);
        assert_eq!(covering.len(), 2);
        assert_eq!(covering[0].id, lots[1].id);
        assert_eq!(covering[1].id, lots[2].id);
    }

    #[test]
    fn no_lot_when_nothing_covers() {
        let lots = vec![lot(4.0, 0.0), lot(10.0, 7.0)];
        assert!(covering_lots(&lots, 5.0).is_empty());
    }

    #[test]
    fn timestamp_has_no_plus_sign() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(query_timestamp(at), "2024-03-09T14:05:00Z");
    }
}
