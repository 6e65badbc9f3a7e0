//! Collection unit: list and create items

use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use tracing::info;

use poststack_store::{Item, StoreClient};

use crate::unit::{HandlerUnit, UnitConfig, UnitError, UnitRequest, UnitResponse};

/// Backs `GET /posts` and `POST /posts`
pub struct PostsUnit {
    config: UnitConfig,
    store: StoreClient,
}

impl PostsUnit {
    pub fn new(config: UnitConfig, store: StoreClient) -> Self {
        Self { config, store }
    }

    fn list(&self) -> Result<UnitResponse, UnitError> {
        let table = self.config.table_name()?;
        let items = self.store.scan(table)?;
        Ok(UnitResponse::ok(Value::Array(
            items.into_iter().map(Value::Object).collect(),
        )))
    }

    fn create(&self, request: &UnitRequest) -> Result<UnitResponse, UnitError> {
        let table = self.config.table_name()?;

        let Some(body) = request.body.as_deref() else {
            return Ok(UnitResponse::bad_request("Request body is required"));
        };
        let Ok(Value::Object(mut item)) = serde_json::from_slice::<Value>(body) else {
            return Ok(UnitResponse::bad_request("Body must be a JSON object"));
        };

        // Accept a caller-supplied string pk; assign one otherwise.
        let assign_pk = match item.get("pk") {
            None => true,
            Some(Value::String(s)) if !s.is_empty() => false,
            Some(_) => return Ok(UnitResponse::bad_request("pk must be a non-empty string")),
        };
        if assign_pk {
            item.insert(
                "pk".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let stored: Item = self.store.put_item(table, item)?;
        info!(unit = %self.config.unit_name, pk = %stored["pk"], "stored item");
        Ok(UnitResponse::created(Value::Object(stored)))
    }
}

#[async_trait]
impl HandlerUnit for PostsUnit {
    fn name(&self) -> &str {
        &self.config.unit_name
    }

    async fn invoke(&self, request: UnitRequest) -> Result<UnitResponse, UnitError> {
        match request.method {
            Method::GET => self.list(),
            Method::POST => self.create(&request),
            // Routing never dispatches anything else here.
            other => Err(UnitError::Fault(format!("unroutable method: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::TABLE_NAME_VAR;
    use poststack_store::{GrantSet, TableSpec, TableStorage};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn unit() -> PostsUnit {
        let storage = Arc::new(TableStorage::new());
        storage.create_table(TableSpec::new("posts-table", "pk")).unwrap();
        let grants = Arc::new(GrantSet::new());
        grants.grant_read_write("posts-table", "posts");

        PostsUnit::new(
            UnitConfig::new(
                "posts",
                HashMap::from([(TABLE_NAME_VAR.to_string(), "posts-table".to_string())]),
            ),
            StoreClient::new(storage, grants, "posts"),
        )
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let unit = unit();

        let created = unit
            .invoke(
                UnitRequest::new(Method::POST).with_body(r#"{"pk":"a","text":"hi"}"#),
            )
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(created.body["pk"], json!("a"));
        assert_eq!(created.body["text"], json!("hi"));

        let listed = unit.invoke(UnitRequest::new(Method::GET)).await.unwrap();
        assert_eq!(listed.status, 200);
        assert_eq!(listed.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_assigns_pk_when_absent() {
        let unit = unit();

        let created = unit
            .invoke(UnitRequest::new(Method::POST).with_body(r#"{"text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(created.status, 201);
        assert!(created.body["pk"].as_str().is_some_and(|pk| !pk.is_empty()));
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let unit = unit();

        for body in ["not json", "[1,2,3]", r#"{"pk": 7}"#] {
            let response = unit
                .invoke(UnitRequest::new(Method::POST).with_body(body))
                .await
                .unwrap();
            assert_eq!(response.status, 400, "body {body:?}");
        }

        let response = unit.invoke(UnitRequest::new(Method::POST)).await.unwrap();
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_ungranted_unit_faults() {
        let storage = Arc::new(TableStorage::new());
        storage.create_table(TableSpec::new("posts-table", "pk")).unwrap();
        let unit = PostsUnit::new(
            UnitConfig::new(
                "posts",
                HashMap::from([(TABLE_NAME_VAR.to_string(), "posts-table".to_string())]),
            ),
            StoreClient::new(storage, Arc::new(GrantSet::new()), "posts"),
        );

        let err = unit.invoke(UnitRequest::new(Method::GET)).await.unwrap_err();
        assert!(matches!(err, UnitError::Store(_)));
    }
}
