// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use catalog_cell::models::CatalogError;
use catalog_cell::CatalogService;
use inventory_cell::services::ledger::{STOCK_HANDLERS, SUPERVISORS};
use shared_config::AppConfig;
use shared_database::{require_role, SupabaseClient};
use shared_models::auth::StaffRole;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentQuery, AppointmentStatus,
    BookingOutcome, CreateAppointmentRequest, Reservation, StatusChangeOutcome,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::reservations::{query_timestamp, ReservationService};

const APPOINTMENT_SELECT: &str = "*,exam_types(name),units(name)";
const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 500;

pub struct AppointmentService {
    supabase: SupabaseClient,
    catalog: CatalogService,
    reservations: ReservationService,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            catalog: CatalogService::new(config),
            reservations: ReservationService::new(config),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    async fn ensure_role(&self, user_id: &str, auth_token: &str, allowed: &[StaffRole]) -> Result<StaffRole, AppointmentError> {
        require_role(&self.supabase, user_id, auth_token, allowed)
            .await
            .map_err(|e| AppointmentError::Forbidden(e.to_string()))
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<BookingOutcome, AppointmentError> {
        debug!("Booking exam type {} at unit {} for {}", request.exam_type_id, request.unit_id, request.scheduled_date);

        self.lifecycle.validate_booking(&request, Utc::now())?;
        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;

        let exam_type = match self.catalog.get_exam_type(&request.exam_type_id.to_string(), auth_token).await {
            Ok(exam_type) if exam_type.is_active => exam_type,
            Ok(_) | Err(CatalogError::ExamTypeNotFound) => return Err(AppointmentError::ExamTypeNotFound),
            Err(e) => return Err(AppointmentError::DatabaseError(e.to_string())),
        };

        let body = json!({
            "exam_type_id": request.exam_type_id,
            "unit_id": request.unit_id,
            "patient_name": request.patient_name.trim(),
            "scheduled_date": request.scheduled_date.to_rfc3339(),
            "notes": request.notes,
            "status": AppointmentStatus::Scheduled,
            "created_by": user_id,
        });
        let rows = self.supabase.insert_returning("/rest/v1/appointments", auth_token, body).await?;
        let row = rows.into_iter().next()
            .ok_or_else(|| AppointmentError::DatabaseError("Appointment insert returned no rows".to_string()))?;
        let appointment: Appointment = serde_json::from_value(row)?;

        info!("Appointment {} booked for exam {} by {}", appointment.id, exam_type.name, user_id);

        let mut reservations = Vec::new();
        let mut shortages = Vec::new();
        for required in &exam_type.required_reagents {
            match self.reservations
                .reserve_for(appointment.id, request.unit_id, required.reagent_id, required.quantity, user_id, auth_token)
                .await
            {
                Ok(Ok(reservation)) => reservations.push(reservation),
                Ok(Err(shortage)) => shortages.push(shortage),
                Err(e) => {
                    error!("Booking {} failed while reserving reagent {}: {}", appointment.id, required.reagent_id, e);
                    self.abandon_booking(&appointment, &reservations, auth_token).await;
                    return Err(e);
                }
            }
        }

        if !shortages.is_empty() {
            warn!("Appointment {} is short on {} reagents", appointment.id, shortages.len());
        }

        Ok(BookingOutcome { appointment, reservations, shortages })
    }

    /// Hands back the holds of a booking that could not be completed and cancels it.
    async fn abandon_booking(&self, appointment: &Appointment, reservations: &[Reservation], auth_token: &str) {
        let released = self.reservations.release_all(reservations, auth_token).await;

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, AppointmentStatus::Scheduled
        );
        let body = json!({
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339(),
        });
        match self.supabase.patch_returning(&path, auth_token, body).await {
            Ok(rows) if !rows.is_empty() => {
                info!("Cancelled unfinished booking {} ({} holds released)", appointment.id, released)
            }
            Ok(_) => error!("Unfinished booking {} was modified before it could be cancelled", appointment.id),
            Err(e) => error!("Could not cancel unfinished booking {}: {}", appointment.id, e),
        }
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn list_appointments(&self, query: &AppointmentQuery, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments: {:?}", query);

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let mut path = format!(
            "/rest/v1/appointments?select={}&order=scheduled_date.asc&limit={}",
            APPOINTMENT_SELECT, limit
        );
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(unit_id) = query.unit_id {
            path.push_str(&format!("&unit_id=eq.{}", unit_id));
        }
        if let Some(from) = query.from {
            path.push_str(&format!("&scheduled_date=gte.{}", query_timestamp(from)));
        }
        if let Some(to) = query.to {
            path.push_str(&format!("&scheduled_date=lte.{}", query_timestamp(to)));
        }

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    async fn fetch_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&select={}", appointment_id, APPOINTMENT_SELECT);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Err(AppointmentError::NotFound),
        }
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = self.fetch_appointment(appointment_id, auth_token).await?;
        let reservations = self.reservations.for_appointment(appointment_id, auth_token).await?;
        Ok(AppointmentDetails { appointment, reservations })
    }

    // ==========================================================================
    // STATUS
    // ==========================================================================

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        user_id: &str,
        auth_token: &str,
    ) -> Result<StatusChangeOutcome, AppointmentError> {
        debug!("Moving appointment {} to {}", appointment_id, new_status);

        self.ensure_role(user_id, auth_token, STOCK_HANDLERS).await?;
        let current = self.fetch_appointment(appointment_id, auth_token).await?;
        self.lifecycle.validate_status_transition(current.status, new_status)?;

        let mut body = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if new_status == AppointmentStatus::Completed {
            body["completed_by"] = json!(user_id);
        }

        // Only applies if nobody moved the appointment since we read it.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&select={}",
            appointment_id, current.status, APPOINTMENT_SELECT
        );
        let rows = self.supabase.patch_returning(&path, auth_token, body).await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            warn!("Appointment {} changed status underneath us", appointment_id);
            AppointmentError::ConcurrentModification
        })?;
        let appointment: Appointment = serde_json::from_value(row)?;

        let released_reservations = if self.lifecycle.releases_reservations(new_status) {
            self.reservations.release_for_appointment(appointment_id, auth_token).await?
        } else {
            0
        };

        info!("Appointment {} {} -> {} by {}", appointment_id, current.status, new_status, user_id);
        Ok(StatusChangeOutcome { appointment, released_reservations })
    }

    // ==========================================================================
    // RESERVATION SWEEP
    // ==========================================================================

    pub async fn expire_reservations(&self, user_id: &str, auth_token: &str) -> Result<usize, AppointmentError> {
        self.ensure_role(user_id, auth_token, SUPERVISORS).await?;
        self.reservations.expire_stale(auth_token).await
    }
}
