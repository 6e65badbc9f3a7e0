//! Handler unit contract

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use poststack_store::StoreError;

/// Environment entry naming the table a unit operates on
pub const TABLE_NAME_VAR: &str = "TABLE_NAME";

/// Unit faults. Any fault maps to the platform 502 response; a fault never
/// tears down the surrounding process.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("store fault: {0}")]
    Store(#[from] StoreError),

    #[error("invocation fault: {0}")]
    Fault(String),
}

/// What a unit is invoked with
#[derive(Debug, Clone)]
pub struct UnitRequest {
    pub method: Method,
    pub path_params: HashMap<String, String>,
    pub body: Option<Bytes>,
}

impl UnitRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_params: HashMap::new(),
            body: None,
        }
    }

    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Required path parameter; absence is a wiring fault, not a client error
    pub fn path_param(&self, name: &str) -> Result<&str, UnitError> {
        self.path_params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| UnitError::Fault(format!("missing path parameter: {name}")))
    }
}

/// Status code plus JSON-serializable body
#[derive(Debug, Clone, PartialEq)]
pub struct UnitResponse {
    pub status: u16,
    pub body: Value,
}

impl UnitResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn created(body: Value) -> Self {
        Self { status: 201, body }
    }

    pub fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            body: serde_json::json!({ "message": message }),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: 404,
            body: serde_json::json!({ "message": message }),
        }
    }
}

/// Per-unit configuration injected at declaration time
#[derive(Debug, Clone, Default)]
pub struct UnitConfig {
    pub unit_name: String,
    pub environment: HashMap<String, String>,
}

impl UnitConfig {
    pub fn new(unit_name: impl Into<String>, environment: HashMap<String, String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            environment,
        }
    }

    /// Resolve the configured table name at invocation time
    pub fn table_name(&self) -> Result<&str, UnitError> {
        self.environment
            .get(TABLE_NAME_VAR)
            .map(String::as_str)
            .ok_or_else(|| UnitError::Fault(format!("{TABLE_NAME_VAR} not configured")))
    }
}

/// Stateless compute invoked once per request
#[async_trait]
pub trait HandlerUnit: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: UnitRequest) -> Result<UnitResponse, UnitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_resolution() {
        let config = UnitConfig::new(
            "posts",
            HashMap::from([(TABLE_NAME_VAR.to_string(), "posts-table".to_string())]),
        );
        assert_eq!(config.table_name().unwrap(), "posts-table");

        let bare = UnitConfig::new("posts", HashMap::new());
        assert!(matches!(bare.table_name(), Err(UnitError::Fault(_))));
    }

    #[test]
    fn test_missing_path_param_is_a_fault() {
        let request = UnitRequest::new(Method::GET);
        assert!(matches!(request.path_param("id"), Err(UnitError::Fault(_))));

        let request = request.with_path_param("id", "a");
        assert_eq!(request.path_param("id").unwrap(), "a");
    }
}
