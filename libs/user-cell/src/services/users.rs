use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::{require_role, SupabaseClient};
use shared_models::auth::StaffRole;

use crate::models::{Profile, UpdateUserRequest, UserError, UserQuery, UserStats};

const PROFILE_SELECT: &str = "*,units(name,location)";

/// An admin editing their own profile may not lock themselves out.
pub fn check_self_update(actor_id: &str, target_id: &str, request: &UpdateUserRequest) -> Result<(), UserError> {
    if actor_id != target_id {
        return Ok(());
    }
    if request.is_active == Some(false) {
        return Err(UserError::SelfLockout("You cannot deactivate your own account".to_string()));
    }
    if matches!(request.role, Some(role) if role != StaffRole::Admin) {
        return Err(UserError::SelfLockout("You cannot remove your own admin role".to_string()));
    }
    Ok(())
}

pub fn user_stats(profiles: &[Profile]) -> UserStats {
    let mut by_role: BTreeMap<String, usize> = StaffRole::ALL.iter()
        .map(|role| (role.to_string(), 0))
        .collect();
    for profile in profiles {
        *by_role.entry(profile.role.to_string()).or_insert(0) += 1;
    }

    let active = profiles.iter().filter(|p| p.active()).count();
    UserStats {
        total: profiles.len(),
        active,
        inactive: profiles.len() - active,
        by_role,
    }
}

pub struct UserService {
    supabase: SupabaseClient,
}

impl UserService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Profile>, UserError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(UserError::from))
            .collect()
    }

    pub async fn list_users(&self, query: &UserQuery, auth_token: &str) -> Result<Vec<Profile>, UserError> {
        debug!("Listing users: {:?}", query);

        let mut path = format!("/rest/v1/profiles?select={}&order=created_at.desc", PROFILE_SELECT);
        if let Some(role) = query.role {
            path.push_str(&format!("&role=eq.{}", role));
        }
        if let Some(unit_id) = query.unit_id {
            path.push_str(&format!("&unit_id=eq.{}", unit_id));
        }
        match query.active {
            Some(true) => path.push_str("&is_active=not.is.false"),
            Some(false) => path.push_str("&is_active=is.false"),
            None => {}
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&full_name=ilike.*{}*", urlencoding::encode(search)));
        }

        self.fetch(&path, auth_token).await
    }

    pub async fn get_user(&self, user_id: &str, auth_token: &str) -> Result<Profile, UserError> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select={}", user_id, PROFILE_SELECT);
        self.fetch(&path, auth_token).await?
            .into_iter()
            .next()
            .ok_or(UserError::NotFound)
    }

    pub async fn update_user(
        &self,
        target_id: &str,
        request: UpdateUserRequest,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<Profile, UserError> {
        debug!("User {} updating profile {}", actor_id, target_id);

        if request.is_empty() {
            return Err(UserError::ValidationError("Nothing to update".to_string()));
        }
        if matches!(request.full_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(UserError::ValidationError("Full name cannot be empty".to_string()));
        }

        require_role(&self.supabase, actor_id, auth_token, &[StaffRole::Admin])
            .await
            .map_err(|e| UserError::Forbidden(e.to_string()))?;
        check_self_update(actor_id, target_id, &request).map_err(|e| {
            warn!("Admin {} tried to lock themselves out", actor_id);
            e
        })?;

        let mut body = Map::new();
        if let Some(full_name) = &request.full_name {
            body.insert("full_name".to_string(), json!(full_name.trim()));
        }
        if let Some(role) = request.role {
            body.insert("role".to_string(), json!(role));
        }
        if let Some(unit_id) = request.unit_id {
            body.insert("unit_id".to_string(), json!(unit_id));
        }
        if let Some(is_active) = request.is_active {
            body.insert("is_active".to_string(), json!(is_active));
        }
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/profiles?id=eq.{}&select={}", target_id, PROFILE_SELECT);
        let rows = self.supabase.patch_returning(&path, auth_token, Value::Object(body)).await?;
        let row = rows.into_iter().next().ok_or(UserError::NotFound)?;
        let profile: Profile = serde_json::from_value(row)?;

        info!("Profile {} updated by {} (role {}, active {})", profile.id, actor_id, profile.role, profile.active());
        Ok(profile)
    }

    pub async fn stats(&self, auth_token: &str) -> Result<UserStats, UserError> {
        let profiles = self.fetch("/rest/v1/profiles?select=id,full_name,role,unit_id,is_active,avatar_url,created_at,updated_at", auth_token).await?;
        Ok(user_stats(&profiles))
    }
}
