use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Non-2xx answers from the backend, kept typed so callers can tell a unique
/// violation or a row-level-security denial from a transport failure.
#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl SupabaseError {
    fn from_response(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SupabaseError::Auth(body),
            404 => SupabaseError::NotFound(body),
            409 => SupabaseError::Conflict(body),
            code => SupabaseError::Api { status: code, body },
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)
            .map_err(|_| anyhow!("Invalid Supabase anon key"))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| anyhow!("Invalid bearer token"))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(SupabaseError::from_response(status, text).into());
        }

        // 204 and empty bodies decode as JSON null
        let data = if text.trim().is_empty() {
            serde_json::from_value::<T>(Value::Null)?
        } else {
            serde_json::from_str::<T>(&text)?
        };
        Ok(data)
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );
        headers
    }

    /// POST rows and return what the backend stored.
    pub async fn insert_returning(&self, path: &str, auth_token: &str, body: Value) -> Result<Vec<Value>> {
        self.request_with_headers(
            Method::POST,
            path,
            Some(auth_token),
            Some(body),
            Some(Self::representation_headers()),
        ).await
    }

    /// PATCH the rows matched by the filters in `path`; an empty result means nothing matched.
    pub async fn patch_returning(&self, path: &str, auth_token: &str, body: Value) -> Result<Vec<Value>> {
        self.request_with_headers(
            Method::PATCH,
            path,
            Some(auth_token),
            Some(body),
            Some(Self::representation_headers()),
        ).await
    }
}

/// True when the error came back from the backend as HTTP 409.
pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SupabaseError>(), Some(SupabaseError::Conflict(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::{MockServer, Mock, ResponseTemplate};
    use wiremock::matchers::{method, path, header, query_param};

    fn client_for(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(&AppConfig::for_supabase(&server.uri(), "test-anon-key", "secret"))
    }

    #[tokio::test]
    async fn sends_apikey_and_bearer_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/units"))
            .and(query_param("is_active", "eq.true"))
            .and(header("apikey", "test-anon-key"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let rows: Vec<Value> = client_for(&server)
            .request(Method::GET, "/rest/v1/units?is_active=eq.true", Some("user-token"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn conflict_status_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/reagent_lots"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key value"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .insert_returning("/rest/v1/reagent_lots", "token", json!({}))
            .await
            .unwrap_err();
        assert!(is_conflict(&err));
        assert_matches!(err.downcast_ref::<SupabaseError>(), Some(SupabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_body_decodes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value: Value = client_for(&server)
            .request(Method::PATCH, "/rest/v1/profiles?id=eq.1", Some("token"), Some(json!({})))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }
}
