use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use gamification_cell::models::{AwardContext, ScoredAction};
use gamification_cell::services::GamificationService;
use shared_config::AppConfig;
use shared_database::{require_role, SupabaseClient};

use crate::models::{CreateQualityControlRequest, LedgerError, QcResult, QualityControl};
use crate::services::ledger::{fetch_lot, STOCK_HANDLERS};

/// Share of passing tests, in percent.
pub fn quality_score(results: &[String]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let passed = results.iter().filter(|r| r.as_str() == "pass").count();
    Some((passed as f64 / results.len() as f64 * 1000.0).round() / 10.0)
}

pub struct QualityControlService {
    supabase: SupabaseClient,
    gamification: GamificationService,
}

impl QualityControlService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            gamification: GamificationService::new(config),
        }
    }

    pub async fn record(
        &self,
        lot_id: &str,
        request: CreateQualityControlRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<QualityControl, LedgerError> {
        debug!("Recording {} QC on lot {}", request.test_type, lot_id);

        if request.test_type.trim().is_empty() {
            return Err(LedgerError::ValidationError("Test type is required".to_string()));
        }
        require_role(&self.supabase, user_id, auth_token, STOCK_HANDLERS)
            .await
            .map_err(|e| LedgerError::Forbidden(e.to_string()))?;
        let lot = fetch_lot(&self.supabase, lot_id, auth_token).await?;

        let body = json!({
            "reagent_lot_id": lot.id,
            "test_type": request.test_type.trim(),
            "test_result": request.test_result,
            "observations": request.observations,
            "next_test_due": request.next_test_due,
            "parameters": request.parameters,
            "tested_by": user_id,
            "test_date": Utc::now().to_rfc3339(),
        });
        let rows = self.supabase.insert_returning("/rest/v1/quality_controls", auth_token, body).await?;
        let row = rows.into_iter().next()
            .ok_or_else(|| LedgerError::DatabaseError("Quality control insert returned no rows".to_string()))?;
        let control: QualityControl = serde_json::from_value(row)?;

        if request.test_result == QcResult::Fail {
            warn!("Lot {} failed {} quality control", lot.id, control.test_type);
        }
        self.refresh_score(lot_id, auth_token).await;
        self.gamification
            .award_best_effort(
                user_id,
                ScoredAction::QualityControl,
                AwardContext { critical: lot.criticality_level.is_critical(), near_expiry: false },
                auth_token,
            )
            .await;

        info!("Quality control {} recorded for lot {}", control.id, lot.id);
        Ok(control)
    }

    async fn refresh_score(&self, lot_id: &str, auth_token: &str) {
        let path = format!("/rest/v1/quality_controls?reagent_lot_id=eq.{}&select=test_result", lot_id);
        let rows: Vec<Value> = match self.supabase.request(Method::GET, &path, Some(auth_token), None).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not load quality history for lot {}: {}", lot_id, e);
                return;
            }
        };

        let results: Vec<String> = rows.iter()
            .filter_map(|r| r["test_result"].as_str().map(str::to_string))
            .collect();
        if let Some(score) = quality_score(&results) {
            let path = format!("/rest/v1/reagent_lots?id=eq.{}", lot_id);
            let body = json!({ "quality_score": score });
            if let Err(e) = self.supabase.request::<Value>(Method::PATCH, &path, Some(auth_token), Some(body)).await {
                warn!("Could not update quality score for lot {}: {}", lot_id, e);
            }
        }
    }

    pub async fn list(&self, lot_id: &str, auth_token: &str) -> Result<Vec<QualityControl>, LedgerError> {
        let path = format!("/rest/v1/quality_controls?reagent_lot_id=eq.{}&order=test_date.desc", lot_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(LedgerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_pass_share() {
        assert_eq!(quality_score(&[]), None);
        let results: Vec<String> = ["pass", "fail", "pass"].iter().map(|s| s.to_string()).collect();
        assert_eq!(quality_score(&results), Some(66.7));
    }
}
