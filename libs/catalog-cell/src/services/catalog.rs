use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::{is_conflict, require_role, SupabaseClient};
use shared_models::auth::StaffRole;

use crate::models::{
    CatalogError, CreateExamTypeRequest, CreateManufacturerRequest, CreateReagentRequest,
    CreateUnitRequest, ExamType, Manufacturer, Reagent, ReagentQuery, Unit, UpdateReagentRequest,
};
use crate::services::validation::{validate_exam_type, validate_new_reagent, validate_reagent_update};

const CATALOG_EDITORS: &[StaffRole] = &[StaffRole::Admin, StaffRole::Manager];

pub struct CatalogService {
    supabase: SupabaseClient,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn ensure_editor(&self, user_id: &str, auth_token: &str) -> Result<(), CatalogError> {
        require_role(&self.supabase, user_id, auth_token, CATALOG_EDITORS)
            .await
            .map(|_| ())
            .map_err(|e| CatalogError::Forbidden(e.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, auth_token: &str) -> Result<Vec<T>, CatalogError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, Some(auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| CatalogError::DatabaseError(e.to_string())))
            .collect()
    }

    async fn insert_one<T: DeserializeOwned>(
        &self,
        path: &str,
        auth_token: &str,
        body: Value,
        name: &str,
    ) -> Result<T, CatalogError> {
        let rows = self.supabase.insert_returning(path, auth_token, body).await.map_err(|e| {
            if is_conflict(&e) {
                CatalogError::Duplicate(name.to_string())
            } else {
                CatalogError::DatabaseError(e.to_string())
            }
        })?;

        let row = rows.into_iter().next()
            .ok_or_else(|| CatalogError::DatabaseError("Insert returned no rows".to_string()))?;
        serde_json::from_value(row).map_err(|e| CatalogError::DatabaseError(e.to_string()))
    }

    // ==========================================================================
    // REAGENTS
    // ==========================================================================

    pub async fn list_reagents(&self, query: &ReagentQuery, auth_token: &str) -> Result<Vec<Reagent>, CatalogError> {
        debug!("Listing reagents: {:?}", query);

        let mut path = "/rest/v1/reagents?order=name.asc".to_string();
        if !query.include_inactive {
            path.push_str("&is_active=eq.true");
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&name=ilike.*{}*", urlencoding::encode(search)));
        }

        self.fetch(&path, auth_token).await
    }

    pub async fn get_reagent(&self, reagent_id: &str, auth_token: &str) -> Result<Reagent, CatalogError> {
        let path = format!("/rest/v1/reagents?id=eq.{}", reagent_id);
        self.fetch::<Reagent>(&path, auth_token).await?
            .into_iter()
            .next()
            .ok_or(CatalogError::ReagentNotFound)
    }

    async fn ensure_name_free(&self, name: &str, except_id: Option<&str>, auth_token: &str) -> Result<(), CatalogError> {
        let path = format!(
            "/rest/v1/reagents?name=ilike.{}&is_active=eq.true&select=id",
            urlencoding::encode(name.trim())
        );
        let existing: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        let clash = existing.iter()
            .any(|row| row["id"].as_str() != except_id);
        if clash {
            warn!("Rejected duplicate reagent name: {}", name);
            return Err(CatalogError::DuplicateReagent(name.trim().to_string()));
        }
        Ok(())
    }

    pub async fn create_reagent(
        &self,
        request: CreateReagentRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Reagent, CatalogError> {
        debug!("Creating reagent: {}", request.name);

        validate_new_reagent(&request)?;
        self.ensure_editor(user_id, auth_token).await?;
        self.ensure_name_free(&request.name, None, auth_token).await?;

        let body = json!({
            "name": request.name.trim(),
            "description": request.description,
            "type": request.reagent_type,
            "unit_measure": request.unit_measure.trim(),
            "minimum_stock": request.minimum_stock,
            "storage_conditions": request.storage_conditions,
            "is_active": true,
        });

        let reagent: Reagent = self.insert_one("/rest/v1/reagents", auth_token, body, request.name.trim()).await?;
        info!("Reagent {} created by {}", reagent.id, user_id);
        Ok(reagent)
    }

    pub async fn update_reagent(
        &self,
        reagent_id: &str,
        request: UpdateReagentRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Reagent, CatalogError> {
        debug!("Updating reagent: {}", reagent_id);

        validate_reagent_update(&request)?;
        self.ensure_editor(user_id, auth_token).await?;
        self.get_reagent(reagent_id, auth_token).await?;

        if let Some(name) = &request.name {
            self.ensure_name_free(name, Some(reagent_id), auth_token).await?;
        }

        let mut update = Map::new();
        if let Some(name) = request.name {
            update.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(description) = request.description {
            update.insert("description".to_string(), json!(description));
        }
        if let Some(reagent_type) = request.reagent_type {
            update.insert("type".to_string(), json!(reagent_type));
        }
        if let Some(unit_measure) = request.unit_measure {
            update.insert("unit_measure".to_string(), json!(unit_measure.trim()));
        }
        if let Some(minimum_stock) = request.minimum_stock {
            update.insert("minimum_stock".to_string(), json!(minimum_stock));
        }
        if let Some(storage_conditions) = request.storage_conditions {
            update.insert("storage_conditions".to_string(), json!(storage_conditions));
        }
        if let Some(is_active) = request.is_active {
            update.insert("is_active".to_string(), json!(is_active));
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/reagents?id=eq.{}", reagent_id);
        let rows = self.supabase.patch_returning(&path, auth_token, Value::Object(update)).await?;
        let row = rows.into_iter().next().ok_or(CatalogError::ReagentNotFound)?;

        info!("Reagent {} updated by {}", reagent_id, user_id);
        serde_json::from_value(row).map_err(|e| CatalogError::DatabaseError(e.to_string()))
    }

    /// Soft delete: lots and logs keep pointing at the row.
    pub async fn deactivate_reagent(&self, reagent_id: &str, user_id: &str, auth_token: &str) -> Result<(), CatalogError> {
        self.ensure_editor(user_id, auth_token).await?;

        let path = format!("/rest/v1/reagents?id=eq.{}", reagent_id);
        let body = json!({ "is_active": false, "updated_at": Utc::now().to_rfc3339() });
        let rows = self.supabase.patch_returning(&path, auth_token, body).await?;
        if rows.is_empty() {
            return Err(CatalogError::ReagentNotFound);
        }

        info!("Reagent {} deactivated by {}", reagent_id, user_id);
        Ok(())
    }

    // ==========================================================================
    // UNITS AND MANUFACTURERS
    // ==========================================================================

    pub async fn list_units(&self, auth_token: &str) -> Result<Vec<Unit>, CatalogError> {
        self.fetch("/rest/v1/units?is_active=eq.true&order=name.asc", auth_token).await
    }

    pub async fn create_unit(&self, request: CreateUnitRequest, user_id: &str, auth_token: &str) -> Result<Unit, CatalogError> {
        if request.name.trim().is_empty() {
            return Err(CatalogError::ValidationError("Unit name is required".to_string()));
        }
        self.ensure_editor(user_id, auth_token).await?;

        let body = json!({
            "name": request.name.trim(),
            "description": request.description,
            "address": request.address,
            "is_active": true,
        });
        self.insert_one("/rest/v1/units", auth_token, body, request.name.trim()).await
    }

    pub async fn list_manufacturers(&self, auth_token: &str) -> Result<Vec<Manufacturer>, CatalogError> {
        self.fetch("/rest/v1/manufacturers?is_active=eq.true&order=name.asc", auth_token).await
    }

    pub async fn create_manufacturer(
        &self,
        request: CreateManufacturerRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Manufacturer, CatalogError> {
        if request.name.trim().is_empty() {
            return Err(CatalogError::ValidationError("Manufacturer name is required".to_string()));
        }
        self.ensure_editor(user_id, auth_token).await?;

        let body = json!({
            "name": request.name.trim(),
            "contact_info": request.contact_info,
            "is_active": true,
        });
        self.insert_one("/rest/v1/manufacturers", auth_token, body, request.name.trim()).await
    }

    // ==========================================================================
    // EXAM TYPES
    // ==========================================================================

    pub async fn list_exam_types(&self, auth_token: &str) -> Result<Vec<ExamType>, CatalogError> {
        self.fetch("/rest/v1/exam_types?is_active=eq.true&order=name.asc", auth_token).await
    }

    pub async fn get_exam_type(&self, exam_type_id: &str, auth_token: &str) -> Result<ExamType, CatalogError> {
        let path = format!("/rest/v1/exam_types?id=eq.{}", exam_type_id);
        self.fetch::<ExamType>(&path, auth_token).await?
            .into_iter()
            .next()
            .ok_or(CatalogError::ExamTypeNotFound)
    }

    pub async fn create_exam_type(
        &self,
        request: CreateExamTypeRequest,
        user_id: &str,
        auth_token: &str,
    ) -> Result<ExamType, CatalogError> {
        debug!("Creating exam type: {}", request.name);

        validate_exam_type(&request)?;
        self.ensure_editor(user_id, auth_token).await?;

        let body = json!({
            "name": request.name.trim(),
            "description": request.description,
            "required_reagents": request.required_reagents,
            "is_active": true,
        });
        let exam_type: ExamType = self.insert_one("/rest/v1/exam_types", auth_token, body, request.name.trim()).await?;

        info!("Exam type {} created with {} required reagents", exam_type.id, exam_type.required_reagents.len());
        Ok(exam_type)
    }
}
