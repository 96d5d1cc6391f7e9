use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{require_role, SupabaseClient};

use crate::models::{
    DashboardSummary, LedgerError, LotQuery, LotView, QrPayload, ReagentLot, StockStatus, UnitStock,
};
use crate::services::ledger::{fetch_lot, LOT_SELECT, SUPERVISORS};
use crate::services::qr::QrSigner;
use crate::services::rules::{is_past_expiry, round_quantity, to_view};

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;

fn matches_search(lot: &ReagentLot, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    lot.reagent_name().to_lowercase().contains(&needle)
        || lot.lot_number.to_lowercase().contains(&needle)
        || lot.location.as_deref().unwrap_or("").to_lowercase().contains(&needle)
}

/// Totals per unit over the given lots, sorted by unit name.
pub fn unit_totals(lots: &[LotView]) -> Vec<UnitStock> {
    let mut grouped: BTreeMap<(String, Option<Uuid>), (f64, f64)> = BTreeMap::new();
    for view in lots {
        let name = view.lot.units.as_ref().map(|u| u.name.clone()).unwrap_or_default();
        let entry = grouped.entry((name, view.lot.unit_id)).or_insert((0.0, 0.0));
        entry.0 += view.lot.current_quantity;
        entry.1 += view.lot.reserved_quantity;
    }

    grouped.into_iter()
        .map(|((name, unit_id), (total, reserved))| {
            let available = (total - reserved).max(0.0);
            let percent = if total > 0.0 { available / total * 100.0 } else { 0.0 };
            UnitStock {
                unit_id,
                unit_name: if name.is_empty() { None } else { Some(name) },
                total_quantity: round_quantity(total),
                available_quantity: round_quantity(available),
                reserved_quantity: round_quantity(reserved),
                percent_available: (percent * 10.0).round() / 10.0,
            }
        })
        .collect()
}

pub struct LotQueryService {
    supabase: SupabaseClient,
    qr: QrSigner,
    expiry_warning_days: i64,
}

impl LotQueryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            qr: QrSigner::new(&config.qr_signing_secret),
            expiry_warning_days: config.expiry_warning_days,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn fetch_lots(&self, filters: &str, auth_token: &str) -> Result<Vec<ReagentLot>, LedgerError> {
        let path = format!("/rest/v1/reagent_lots?select={}&order=expiry_date.asc{}", LOT_SELECT, filters);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(LedgerError::from))
            .collect()
    }

    pub async fn list_lots(&self, query: &LotQuery, auth_token: &str) -> Result<Vec<LotView>, LedgerError> {
        debug!("Listing lots: {:?}", query);

        let mut filters = String::new();
        if let Some(unit_id) = query.unit_id {
            filters.push_str(&format!("&unit_id=eq.{}", unit_id));
        }
        if let Some(reagent_id) = query.reagent_id {
            filters.push_str(&format!("&reagent_id=eq.{}", reagent_id));
        }
        if let Some(status) = query.status {
            filters.push_str(&format!("&status=eq.{}", status));
        }

        let today = Self::today();
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let limit = query.limit.map(|l| l as usize).unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0) as usize;

        let lots = self.fetch_lots(&filters, auth_token).await?;
        let views = lots.into_iter()
            .filter(|lot| search.map_or(true, |needle| matches_search(lot, needle)))
            .map(|lot| to_view(lot, today))
            .filter(|view| query.stock_status.map_or(true, |wanted| view.stock_status == wanted))
            .skip(offset)
            .take(limit)
            .collect();

        Ok(views)
    }

    pub async fn get_lot(&self, lot_id: &str, auth_token: &str) -> Result<LotView, LedgerError> {
        let lot = fetch_lot(&self.supabase, lot_id, auth_token).await?;
        Ok(to_view(lot, Self::today()))
    }

    /// Active lots expiring between today and `days` from now.
    pub async fn expiring(&self, days: Option<i64>, auth_token: &str) -> Result<Vec<LotView>, LedgerError> {
        let days = days.unwrap_or(self.expiry_warning_days).max(0);
        let today = Self::today();
        let horizon = today + Duration::days(days);

        let filters = format!(
            "&status=eq.active&and=(expiry_date.gte.{},expiry_date.lte.{})",
            today, horizon
        );
        let lots = self.fetch_lots(&filters, auth_token).await?;
        Ok(lots.into_iter().map(|lot| to_view(lot, today)).collect())
    }

    pub async fn dashboard(&self, auth_token: &str) -> Result<DashboardSummary, LedgerError> {
        let today = Self::today();
        let horizon = today + Duration::days(self.expiry_warning_days);

        let lots = self.fetch_lots("&status=eq.active", auth_token).await?;
        let views: Vec<LotView> = lots.into_iter().map(|lot| to_view(lot, today)).collect();

        let low_stock_lots = views.iter()
            .filter(|v| matches!(v.stock_status, StockStatus::Low | StockStatus::Critical))
            .count();
        let expiring_soon_lots = views.iter()
            .filter(|v| !is_past_expiry(&v.lot, today) && v.lot.expiry_date <= horizon)
            .count();

        let path = format!(
            "/rest/v1/consumption_logs?action_type=eq.consume&created_at=gte.{}T00:00:00Z&select=id",
            today
        );
        let consumptions: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(DashboardSummary {
            active_lots: views.len(),
            low_stock_lots,
            expiring_soon_lots,
            consumptions_today: consumptions.len(),
            units: unit_totals(&views),
        })
    }

    /// Flips active lots past their expiry date to `expired`.
    pub async fn mark_expired(&self, user_id: &str, auth_token: &str) -> Result<usize, LedgerError> {
        require_role(&self.supabase, user_id, auth_token, SUPERVISORS)
            .await
            .map_err(|e| LedgerError::Forbidden(e.to_string()))?;

        let path = format!(
            "/rest/v1/reagent_lots?status=eq.active&expiry_date=lt.{}&select=id",
            Self::today()
        );
        let body = json!({ "status": "expired", "updated_at": Utc::now().to_rfc3339() });
        let rows = self.supabase.patch_returning(&path, auth_token, body).await?;

        info!("Marked {} lots as expired", rows.len());
        Ok(rows.len())
    }

    // ==========================================================================
    // LABELS
    // ==========================================================================

    pub async fn label(&self, lot_id: &str, auth_token: &str) -> Result<QrPayload, LedgerError> {
        let lot = fetch_lot(&self.supabase, lot_id, auth_token).await?;
        let registered_at = lot.created_at.unwrap_or_else(Utc::now);
        self.qr.sign(QrSigner::payload_for(&lot, registered_at))
    }

    pub async fn print_label(
        &self,
        lot_id: &str,
        print_reason: Option<String>,
        user_id: &str,
        auth_token: &str,
    ) -> Result<QrPayload, LedgerError> {
        let payload = self.label(lot_id, auth_token).await?;

        let body = json!({
            "reagent_lot_id": payload.lot_id,
            "printed_by": user_id,
            "print_reason": print_reason,
        });
        self.supabase.insert_returning("/rest/v1/qr_print_history", auth_token, body).await?;

        info!("Label for lot {} printed by {}", payload.lot_id, user_id);
        Ok(payload)
    }

    /// Verifies a scanned label and returns the live lot behind it.
    pub async fn scan(&self, data: &str, auth_token: &str) -> Result<(QrPayload, LotView), LedgerError> {
        let payload = self.qr.verify(data)?;
        let lot = fetch_lot(&self.supabase, &payload.lot_id.to_string(), auth_token).await?;
        Ok((payload, to_view(lot, Self::today())))
    }
}
