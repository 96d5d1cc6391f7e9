use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{LogEntryView, LogQuery, LogRecord, LogSummary, LogsError};

const LOG_SELECT: &str = "*,reagent_lots!inner(lot_number,unit_id,reagents(name),units(name))";
const DEFAULT_PAGE_SIZE: u32 = 200;
const MAX_PAGE_SIZE: u32 = 1000;
/// Upper bound on rows scanned for search, summaries and exports.
const MAX_SCAN_ROWS: u32 = 10_000;

fn query_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn to_view(record: LogRecord, names: &HashMap<String, String>) -> LogEntryView {
    let lot = record.reagent_lots.as_ref();
    LogEntryView {
        id: record.id,
        timestamp: record.created_at,
        reagent_lot_id: record.reagent_lot_id,
        reagent_name: lot.and_then(|l| l.reagents.as_ref()).map(|r| r.name.clone()),
        lot_number: lot.map(|l| l.lot_number.clone()),
        unit_id: lot.and_then(|l| l.unit_id),
        unit_name: lot.and_then(|l| l.units.as_ref()).map(|u| u.name.clone()),
        user_name: record.user_id.as_ref().and_then(|id| names.get(id)).cloned(),
        user_id: record.user_id,
        action_type: record.action_type,
        quantity_before: record.quantity_before,
        quantity_after: record.quantity_after,
        quantity_changed: record.quantity_changed,
        appointment_id: record.appointment_id,
        points_awarded: record.points_awarded,
        notes: record.notes,
    }
}

/// Case-insensitive match on reagent, lot number, actor and notes.
pub fn matches_search(entry: &LogEntryView, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    [
        entry.reagent_name.as_deref(),
        entry.lot_number.as_deref(),
        entry.user_name.as_deref(),
        entry.notes.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

pub fn summarize(entries: &[LogEntryView]) -> LogSummary {
    let mut by_action: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        *by_action.entry(entry.action_type.clone()).or_insert(0) += 1;
    }
    LogSummary { total: entries.len(), by_action }
}

pub struct LogService {
    supabase: SupabaseClient,
}

impl LogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn filters(query: &LogQuery) -> Result<String, LogsError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(LogsError::ValidationError("'from' must not be after 'to'".to_string()));
            }
        }

        let mut filters = String::new();
        if let Some(action) = query.action_type {
            filters.push_str(&format!("&action_type=eq.{}", action.as_str()));
        }
        if let Some(user_id) = query.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            filters.push_str(&format!("&user_id=eq.{}", urlencoding::encode(user_id)));
        }
        if let Some(lot_id) = query.reagent_lot_id {
            filters.push_str(&format!("&reagent_lot_id=eq.{}", lot_id));
        }
        if let Some(unit_id) = query.unit_id {
            filters.push_str(&format!("&reagent_lots.unit_id=eq.{}", unit_id));
        }
        if let Some(from) = query.from {
            filters.push_str(&format!("&created_at=gte.{}", query_timestamp(from)));
        }
        if let Some(to) = query.to {
            filters.push_str(&format!("&created_at=lte.{}", query_timestamp(to)));
        }
        Ok(filters)
    }

    async fn actor_names(&self, records: &[LogRecord], auth_token: &str) -> HashMap<String, String> {
        let ids: HashSet<&str> = records.iter().filter_map(|r| r.user_id.as_deref()).collect();
        if ids.is_empty() {
            return HashMap::new();
        }

        let list = ids.into_iter().collect::<Vec<_>>().join(",");
        let path = format!("/rest/v1/profiles?id=in.({})&select=id,full_name", list);
        match self.supabase.request::<Vec<Value>>(Method::GET, &path, Some(auth_token), None).await {
            Ok(rows) => rows.iter()
                .filter_map(|row| Some((row["id"].as_str()?.to_string(), row["full_name"].as_str()?.to_string())))
                .collect(),
            Err(e) => {
                // Rows go out without names.
                warn!("Could not resolve log actor names: {}", e);
                HashMap::new()
            }
        }
    }

    async fn fetch(&self, filters: &str, limit: u32, offset: u32, auth_token: &str) -> Result<Vec<LogEntryView>, LogsError> {
        let path = format!(
            "/rest/v1/consumption_logs?select={}&order=created_at.desc&limit={}&offset={}{}",
            LOG_SELECT, limit, offset, filters
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let records: Vec<LogRecord> = rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?;

        let names = self.actor_names(&records, auth_token).await;
        Ok(records.into_iter().map(|r| to_view(r, &names)).collect())
    }

    /// Every row matching the filters and search, newest first, up to the scan bound.
    async fn scan(&self, query: &LogQuery, auth_token: &str) -> Result<Vec<LogEntryView>, LogsError> {
        let filters = Self::filters(query)?;
        let entries = self.fetch(&filters, MAX_SCAN_ROWS, 0, auth_token).await?;

        Ok(match query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => entries.into_iter().filter(|e| matches_search(e, needle)).collect(),
            None => entries,
        })
    }

    pub async fn list_logs(&self, query: &LogQuery, auth_token: &str) -> Result<Vec<LogEntryView>, LogsError> {
        debug!("Listing logs: {:?}", query);

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        if query.search.as_deref().map_or(true, |s| s.trim().is_empty()) {
            let filters = Self::filters(query)?;
            return self.fetch(&filters, limit, offset, auth_token).await;
        }

        // Search spans actor names, which come from a second query.
        Ok(self.scan(query, auth_token).await?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    pub async fn summary(&self, query: &LogQuery, auth_token: &str) -> Result<LogSummary, LogsError> {
        let entries = self.scan(query, auth_token).await?;
        Ok(summarize(&entries))
    }

    pub async fn export(&self, query: &LogQuery, auth_token: &str) -> Result<Vec<LogEntryView>, LogsError> {
        let entries = self.scan(query, auth_token).await?;
        debug!("Exporting {} log rows", entries.len());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_filter_is_encoded() {
        let query = LogQuery {
            user_id: Some("u1&action_type=eq.dispose".to_string()),
            ..Default::default()
        };
        let filters = LogService::filters(&query).unwrap();
        assert_eq!(filters, "&user_id=eq.u1%26action_type%3Deq.dispose");
    }

    #[test]
    fn blank_user_filter_is_ignored() {
        let query = LogQuery { user_id: Some("  ".to_string()), ..Default::default() };
        assert_eq!(LogService::filters(&query).unwrap(), "");
    }
}
