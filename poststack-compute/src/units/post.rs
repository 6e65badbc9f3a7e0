//! Item unit: fetch and remove a single item

use async_trait::async_trait;
use http::Method;
use serde_json::{json, Value};
use tracing::info;

use poststack_store::StoreClient;

use crate::unit::{HandlerUnit, UnitConfig, UnitError, UnitRequest, UnitResponse};

/// Backs `GET /posts/{id}` and `DELETE /posts/{id}`
pub struct PostUnit {
    config: UnitConfig,
    store: StoreClient,
}

impl PostUnit {
    pub fn new(config: UnitConfig, store: StoreClient) -> Self {
        Self { config, store }
    }

    fn fetch(&self, id: &str) -> Result<UnitResponse, UnitError> {
        let table = self.config.table_name()?;
        match self.store.get_item(table, id)? {
            Some(item) => Ok(UnitResponse::ok(Value::Object(item))),
            None => Ok(UnitResponse::not_found("Item not found")),
        }
    }

    fn remove(&self, id: &str) -> Result<UnitResponse, UnitError> {
        let table = self.config.table_name()?;
        // Idempotent: removing a missing key succeeds the same way.
        self.store.delete_item(table, id)?;
        info!(unit = %self.config.unit_name, pk = id, "deleted item");
        Ok(UnitResponse::ok(json!({ "deleted": id })))
    }
}

#[async_trait]
impl HandlerUnit for PostUnit {
    fn name(&self) -> &str {
        &self.config.unit_name
    }

    async fn invoke(&self, request: UnitRequest) -> Result<UnitResponse, UnitError> {
        let id = request.path_param("id")?;
        match request.method {
            Method::GET => self.fetch(id),
            Method::DELETE => self.remove(id),
            other => Err(UnitError::Fault(format!("unroutable method: {other}"))),
        }
    }
}
