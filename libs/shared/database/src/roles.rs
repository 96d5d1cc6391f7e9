use anyhow::{Result, anyhow};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use shared_models::auth::StaffRole;
use shared_models::error::AppError;

use crate::supabase::SupabaseClient;

/// Reads the caller's staff role from `profiles`. Inactive profiles have no role.
pub async fn current_user_role(
    client: &SupabaseClient,
    user_id: &str,
    auth_token: &str,
) -> Result<StaffRole> {
    let path = format!("/rest/v1/profiles?id=eq.{}&select=role,is_active", user_id);
    let rows: Vec<Value> = client.request(Method::GET, &path, Some(auth_token), None).await?;

    let profile = rows.first()
        .ok_or_else(|| anyhow!("No profile for user {}", user_id))?;

    if profile["is_active"].as_bool() == Some(false) {
        return Err(anyhow!("Profile {} is inactive", user_id));
    }

    let role = profile["role"].as_str()
        .ok_or_else(|| anyhow!("Profile {} has no role", user_id))?
        .parse::<StaffRole>()
        .map_err(|e| anyhow!(e))?;

    debug!("Resolved role {} for user {}", role, user_id);
    Ok(role)
}

/// Resolves the caller's role and checks it against `allowed`.
pub async fn require_role(
    client: &SupabaseClient,
    user_id: &str,
    auth_token: &str,
    allowed: &[StaffRole],
) -> Result<StaffRole, AppError> {
    let role = current_user_role(client, user_id, auth_token)
        .await
        .map_err(|e| {
            warn!("Role lookup failed for {}: {}", user_id, e);
            AppError::Forbidden(e.to_string())
        })?;

    if !allowed.contains(&role) {
        warn!("User {} with role {} denied (needs one of {:?})", user_id, role, allowed);
        return Err(AppError::Forbidden(format!("Role {} is not allowed to perform this action", role)));
    }

    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shared_config::AppConfig;
    use wiremock::{MockServer, Mock, ResponseTemplate};
    use wiremock::matchers::{method, path, query_param};

    async fn mount_profile(server: &MockServer, user_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", format!("eq.{}", user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn technician_cannot_pass_supervisor_guard() {
        let server = MockServer::start().await;
        mount_profile(&server, "u1", json!([{"role": "technician", "is_active": true}])).await;
        let client = SupabaseClient::new(&AppConfig::for_supabase(&server.uri(), "anon", "secret"));

        let result = require_role(&client, "u1", "token", &[StaffRole::Admin, StaffRole::Manager]).await;
        assert_matches!(result, Err(AppError::Forbidden(_)));

        let role = require_role(&client, "u1", "token", &[StaffRole::Technician]).await.unwrap();
        assert_eq!(role, StaffRole::Technician);
    }

    #[tokio::test]
    async fn inactive_profile_is_forbidden() {
        let server = MockServer::start().await;
        mount_profile(&server, "u2", json!([{"role": "admin", "is_active": false}])).await;
        let client = SupabaseClient::new(&AppConfig::for_supabase(&server.uri(), "anon", "secret"));

        let result = require_role(&client, "u2", "token", &StaffRole::ALL).await;
        assert_matches!(result, Err(AppError::Forbidden(_)));
    }
}
