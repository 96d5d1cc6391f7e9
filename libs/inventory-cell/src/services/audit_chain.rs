use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{ActionType, AuditChainEntry, LedgerError, ReagentLot};

pub fn transaction_hash(action: ActionType, at: DateTime<Utc>, lot_id: &str) -> String {
    format!("{}_{}_{}", action.as_str().to_uppercase(), at.timestamp_millis(), lot_id)
}

/// Hex SHA-256 over the payload's JSON, which already carries the previous hash.
pub fn data_hash(payload: &Value) -> String {
    let digest = Sha256::digest(payload.to_string().as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Hash-linked audit records for critical lots, kept in `blockchain_transactions`.
pub struct AuditChainService {
    supabase: SupabaseClient,
}

impl AuditChainService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn previous_hash(&self, lot_id: &str, auth_token: &str) -> Result<Option<String>, LedgerError> {
        let path = format!(
            "/rest/v1/blockchain_transactions?reagent_lot_id=eq.{}&select=data_hash&order=timestamp.desc&limit=1",
            lot_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        Ok(rows.first().and_then(|row| row["data_hash"].as_str()).map(str::to_string))
    }

    /// Appends one link for `lot` and stamps the lot with the new hash.
    ///
    /// Links are written after the ledger commit, outside the lot's quantity guard, so two
    /// actions racing on one lot can both read the same previous hash. The lot is only stamped
    /// while it still points at that hash: a forked link is kept in the table and logged, and
    /// the lot keeps pointing at the link that won.
    pub async fn record(
        &self,
        lot: &ReagentLot,
        action: ActionType,
        details: Value,
        auth_token: &str,
    ) -> Result<String, LedgerError> {
        let lot_id = lot.id.to_string();
        let now = Utc::now();
        let previous = self.previous_hash(&lot_id, auth_token).await?;

        let payload = json!({
            "action": action.as_str(),
            "lot_id": lot_id,
            "lot_number": lot.lot_number,
            "details": details,
            "previous_hash": previous,
            "recorded_at": now.to_rfc3339(),
        });
        let hash = data_hash(&payload);

        let body = json!({
            "transaction_hash": transaction_hash(action, now, &lot_id),
            "transaction_type": action.as_str(),
            "reagent_lot_id": lot_id,
            "data_hash": hash,
            "status": "confirmed",
            "timestamp": now.to_rfc3339(),
        });
        self.supabase.insert_returning("/rest/v1/blockchain_transactions", auth_token, body).await?;

        let head = match &previous {
            Some(previous) => format!("eq.{}", previous),
            None => "is.null".to_string(),
        };
        let path = format!("/rest/v1/reagent_lots?id=eq.{}&blockchain_hash={}", lot_id, head);
        let stamped = self.supabase
            .patch_returning(&path, auth_token, json!({ "blockchain_hash": hash }))
            .await?;

        if stamped.is_empty() {
            warn!("Audit chain for lot {} forked: {} was appended after a concurrent link", lot_id, hash);
        } else {
            info!("Audit chain {} for lot {} -> {}", action.as_str(), lot_id, hash);
        }
        Ok(hash)
    }

    pub async fn list(&self, lot_id: &str, auth_token: &str) -> Result<Vec<AuditChainEntry>, LedgerError> {
        debug!("Listing audit chain for lot {}", lot_id);
        let path = format!(
            "/rest/v1/blockchain_transactions?reagent_lot_id=eq.{}&order=timestamp.asc",
            lot_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(LedgerError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transaction_hash_has_type_millis_and_lot() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            transaction_hash(ActionType::Transfer, at, "lot-1"),
            format!("TRANSFER_{}_lot-1", at.timestamp_millis())
        );
    }

    #[test]
    fn data_hash_changes_with_previous_link() {
        let first = data_hash(&json!({ "details": { "q": 1 }, "previous_hash": null }));
        let second = data_hash(&json!({ "details": { "q": 1 }, "previous_hash": first }));

        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
        assert_eq!(first, data_hash(&json!({ "previous_hash": null, "details": { "q": 1 } })));
    }
}
