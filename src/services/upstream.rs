use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::permissions::Resource;

/// The CRUD backends this gateway fronts (dataset services, user admin, and
/// friends). They are external collaborators; the pipeline only needs these
/// five calls.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn list(&self, resource: Resource) -> Result<Value, ApiError>;
    async fn fetch(&self, resource: Resource, id: &str) -> Result<Value, ApiError>;
    async fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError>;
    async fn update(&self, resource: Resource, id: &str, body: Value) -> Result<Value, ApiError>;
    async fn remove(&self, resource: Resource, id: &str) -> Result<Value, ApiError>;
}

/// In-memory upstream with seeded sample records. Stands in for the real
/// dataset/user services in development and tests.
pub struct DemoUpstream {
    records: RwLock<HashMap<Resource, Vec<Value>>>,
}

impl DemoUpstream {
    pub fn seeded() -> Self {
        let mut records = HashMap::new();
        records.insert(
            Resource::Data,
            vec![
                json!({"id": "ds-001", "name": "Soil moisture survey", "rows": 4820}),
                json!({"id": "ds-002", "name": "River quality 2025", "rows": 1210}),
            ],
        );
        records.insert(
            Resource::User,
            vec![
                json!({"id": "u-admin", "username": "admin", "role": "admin"}),
                json!({"id": "u-alice", "username": "alice", "role": "user"}),
            ],
        );
        records.insert(
            Resource::Report,
            vec![json!({"id": "rp-001", "title": "Q2 emissions summary"})],
        );
        records.insert(
            Resource::Setting,
            vec![json!({"id": "st-retention", "value": "90d"})],
        );
        Self {
            records: RwLock::new(records),
        }
    }

    fn id_of(record: &Value) -> Option<&str> {
        record.get("id").and_then(Value::as_str)
    }
}

#[async_trait]
impl Upstream for DemoUpstream {
    async fn list(&self, resource: Resource) -> Result<Value, ApiError> {
        let records = self.records.read().await;
        let items = records.get(&resource).cloned().unwrap_or_default();
        Ok(json!({ "items": items, "total": items.len() }))
    }

    async fn fetch(&self, resource: Resource, id: &str) -> Result<Value, ApiError> {
        let records = self.records.read().await;
        records
            .get(&resource)
            .and_then(|items| items.iter().find(|r| Self::id_of(r) == Some(id)))
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' not found", resource, id)))
    }

    async fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError> {
        let mut record = match body {
            Value::Object(map) => Value::Object(map),
            _ => return Err(ApiError::invalid_request("Request body must be a JSON object")),
        };
        record["id"] = json!(format!("{}-{}", resource, Uuid::new_v4()));
        record["created_at"] = json!(Utc::now());

        let mut records = self.records.write().await;
        records.entry(resource).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, resource: Resource, id: &str, body: Value) -> Result<Value, ApiError> {
        let Value::Object(changes) = body else {
            return Err(ApiError::invalid_request("Request body must be a JSON object"));
        };

        let mut records = self.records.write().await;
        let items = records
            .entry(resource)
            .or_default()
            .iter_mut()
            .find(|r| Self::id_of(r) == Some(id));
        let Some(record) = items else {
            return Err(ApiError::not_found(format!("{} '{}' not found", resource, id)));
        };

        if let Value::Object(fields) = record {
            for (key, value) in changes {
                if key != "id" {
                    fields.insert(key, value);
                }
            }
            fields.insert("updated_at".to_string(), json!(Utc::now()));
        }
        Ok(record.clone())
    }

    async fn remove(&self, resource: Resource, id: &str) -> Result<Value, ApiError> {
        let mut records = self.records.write().await;
        let items = records.entry(resource).or_default();
        let before = items.len();
        items.retain(|r| Self::id_of(r) != Some(id));
        if items.len() == before {
            return Err(ApiError::not_found(format!("{} '{}' not found", resource, id)));
        }
        Ok(json!({ "deleted": id }))
    }
}
