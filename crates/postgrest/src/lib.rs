//! PostgREST client for recipe-sync
//!
//! A small request builder over the Supabase REST endpoint
//! (`<url>/rest/v1/<table>`). It covers what the recipe gateway needs:
//!
//! - `select` with equality filters, ordering and offset pagination
//! - `insert`, `update` and `delete` returning the affected representation
//! - structured API errors carrying the HTTP status and PostgREST code

use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Error body returned by PostgREST on non-2xx responses
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// HTTP status of an API error, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. }
            | PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(e) => e.status(),
            _ => None,
        }
    }

    /// PostgREST error code such as `PGRST116`
    pub fn code(&self) -> Option<&str> {
        match self {
            PostgrestError::ApiError { details, .. } => details.code.as_deref(),
            _ => None,
        }
    }

    /// Whether the request gave up waiting for the server
    pub fn is_timeout(&self) -> bool {
        matches!(self, PostgrestError::NetworkError(e) if e.is_timeout())
    }
}

/// Sort direction for `order`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Request builder for a single table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: HashMap<String, String>,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value for {}", key))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Authenticate the request as a signed-in user
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query_params
            .insert("select".to_string(), columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.query_params
            .insert(column.to_string(), format!("eq.{}", value));
        self
    }

    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.query_params
            .insert("order".to_string(), format!("{}.{}", column, order.as_str()));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.query_params
            .insert("limit".to_string(), count.to_string());
        self
    }

    pub fn offset(mut self, count: usize) -> Self {
        self.query_params
            .insert("offset".to_string(), count.to_string());
        self
    }

    /// Run the select and decode every returned row
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, None::<&()>, false).await?;
        let body = Self::read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Vec<T>>(&body)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Insert and return the created representation
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let response = self.send(Method::POST, Some(&values), true).await?;
        Self::read_representation(response).await
    }

    /// Patch every row matched by the current filters
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let response = self.send(Method::PATCH, Some(&values), true).await?;
        Self::read_representation(response).await
    }

    /// Delete every row matched by the current filters
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        let response = self.send(Method::DELETE, None::<&()>, true).await?;
        Self::read_representation(response).await
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        body: Option<&B>,
        return_representation: bool,
    ) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut headers = self.headers.clone();
        if return_representation {
            headers.insert(
                HeaderName::from_static("prefer"),
                HeaderValue::from_static("return=representation"),
            );
        }

        let mut request = self.http_client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(PostgrestError::NetworkError)?;
        let status = response.status();
        trace!("response status {}", status);

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => Err(PostgrestError::ApiError { details, status }),
            Err(_) => Err(PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            }),
        }
    }

    async fn read_body(response: Response) -> Result<String, PostgrestError> {
        response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })
    }

    // 204 No Content comes back as Null
    async fn read_representation(response: Response) -> Result<Value, PostgrestError> {
        let body = Self::read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str::<Value>(&body)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}
