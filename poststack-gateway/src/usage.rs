//! API keys and usage plans
//!
//! A usage plan associates one or more API keys with the (api, stage) pairs
//! they admit. The key value is generated once and never caller-supplied;
//! only the key id is surfaced as a stack output.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

/// An opaque credential
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub key_id: String,
    /// The secret value callers present in the `x-api-key` header
    pub value: String,
    pub enabled: bool,
    pub created_date: DateTime<Utc>,
}

/// A (api, stage) pair a plan admits requests to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStage {
    pub api_id: String,
    pub stage_name: String,
}

/// Association between keys and the stages they may call
///
/// No quota or rate values are carried; admission is the binary key check.
#[derive(Debug, Clone)]
pub struct UsagePlan {
    pub plan_id: String,
    pub name: String,
    pub api_stages: Vec<ApiStage>,
    pub key_ids: Vec<String>,
}

/// Declaration-time usage-plan errors; fatal at assembly
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("API key not found: {0}")]
    KeyNotFound(String),

    #[error("Usage plan not found: {0}")]
    PlanNotFound(String),
}

/// Request-time admission failures; both map to 403
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Missing API key")]
    MissingKey,

    #[error("Invalid API key")]
    InvalidKey,
}

/// In-memory key and plan storage
#[derive(Debug, Default)]
pub struct UsagePlanStorage {
    keys: DashMap<String, ApiKey>,    // key: key_id
    plans: DashMap<String, UsagePlan>, // key: plan_id
}

impl UsagePlanStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new API key with a generated opaque value
    pub fn create_api_key(&self) -> ApiKey {
        let key = ApiKey {
            key_id: Self::generate_id(),
            value: format!(
                "{}{}",
                Uuid::new_v4().simple(),
                Uuid::new_v4().simple()
            ),
            enabled: true,
            created_date: Utc::now(),
        };
        self.keys.insert(key.key_id.clone(), key.clone());
        key
    }

    pub fn get_api_key(&self, key_id: &str) -> Option<ApiKey> {
        self.keys.get(key_id).map(|k| k.clone())
    }

    pub fn set_key_enabled(&self, key_id: &str, enabled: bool) -> Result<(), UsageError> {
        let mut key = self
            .keys
            .get_mut(key_id)
            .ok_or_else(|| UsageError::KeyNotFound(key_id.to_string()))?;
        key.enabled = enabled;
        Ok(())
    }

    pub fn create_usage_plan(&self, name: &str, api_stages: Vec<ApiStage>) -> UsagePlan {
        let plan = UsagePlan {
            plan_id: Self::generate_id(),
            name: name.to_string(),
            api_stages,
            key_ids: Vec::new(),
        };
        self.plans.insert(plan.plan_id.clone(), plan.clone());
        plan
    }

    /// Attach a key to a plan
    pub fn add_key_to_plan(&self, plan_id: &str, key_id: &str) -> Result<(), UsageError> {
        if !self.keys.contains_key(key_id) {
            return Err(UsageError::KeyNotFound(key_id.to_string()));
        }

        let mut plan = self
            .plans
            .get_mut(plan_id)
            .ok_or_else(|| UsageError::PlanNotFound(plan_id.to_string()))?;
        if !plan.key_ids.iter().any(|k| k == key_id) {
            plan.key_ids.push(key_id.to_string());
        }
        Ok(())
    }

    /// Check a presented key value against the plans covering (api, stage)
    ///
    /// Runs before any handler unit; a rejected request is never dispatched.
    pub fn admission(
        &self,
        api_id: &str,
        stage_name: &str,
        provided: Option<&str>,
    ) -> Result<(), AdmissionError> {
        let Some(value) = provided else {
            return Err(AdmissionError::MissingKey);
        };

        let key = self
            .keys
            .iter()
            .find(|k| k.value == value && k.enabled)
            .map(|k| k.key_id.clone());

        let Some(key_id) = key else {
            warn!(api_id, stage_name, "rejected request with unknown API key");
            return Err(AdmissionError::InvalidKey);
        };

        let admitted = self.plans.iter().any(|plan| {
            plan.key_ids.iter().any(|k| *k == key_id)
                && plan
                    .api_stages
                    .iter()
                    .any(|s| s.api_id == api_id && s.stage_name == stage_name)
        });

        if admitted {
            Ok(())
        } else {
            warn!(api_id, stage_name, key_id = %key_id, "API key not attached to a plan for this stage");
            Err(AdmissionError::InvalidKey)
        }
    }

    fn generate_id() -> String {
        Uuid::new_v4().to_string().replace('-', "")[..10].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_plan(storage: &UsagePlanStorage, api_id: &str, stage: &str) -> ApiKey {
        let key = storage.create_api_key();
        let plan = storage.create_usage_plan(
            "Usage Plan",
            vec![ApiStage {
                api_id: api_id.to_string(),
                stage_name: stage.to_string(),
            }],
        );
        storage.add_key_to_plan(&plan.plan_id, &key.key_id).unwrap();
        key
    }

    #[test]
    fn test_valid_key_is_admitted() {
        let storage = UsagePlanStorage::new();
        let key = bound_plan(&storage, "api-1", "prod");

        storage.admission("api-1", "prod", Some(&key.value)).unwrap();
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let storage = UsagePlanStorage::new();
        bound_plan(&storage, "api-1", "prod");

        let err = storage.admission("api-1", "prod", None).unwrap_err();
        assert_eq!(err, AdmissionError::MissingKey);
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        let storage = UsagePlanStorage::new();
        bound_plan(&storage, "api-1", "prod");

        let err = storage
            .admission("api-1", "prod", Some("not-a-key"))
            .unwrap_err();
        assert_eq!(err, AdmissionError::InvalidKey);
    }

    #[test]
    fn test_key_for_other_stage_is_rejected() {
        let storage = UsagePlanStorage::new();
        let key = bound_plan(&storage, "api-1", "prod");

        let err = storage
            .admission("api-1", "staging", Some(&key.value))
            .unwrap_err();
        assert_eq!(err, AdmissionError::InvalidKey);

        let err = storage
            .admission("api-2", "prod", Some(&key.value))
            .unwrap_err();
        assert_eq!(err, AdmissionError::InvalidKey);
    }

    #[test]
    fn test_unattached_key_is_rejected() {
        let storage = UsagePlanStorage::new();
        bound_plan(&storage, "api-1", "prod");
        let loose_key = storage.create_api_key();

        let err = storage
            .admission("api-1", "prod", Some(&loose_key.value))
            .unwrap_err();
        assert_eq!(err, AdmissionError::InvalidKey);
    }

    #[test]
    fn test_disabled_key_is_rejected() {
        let storage = UsagePlanStorage::new();
        let key = bound_plan(&storage, "api-1", "prod");
        storage.set_key_enabled(&key.key_id, false).unwrap();

        let err = storage
            .admission("api-1", "prod", Some(&key.value))
            .unwrap_err();
        assert_eq!(err, AdmissionError::InvalidKey);
    }

    #[test]
    fn test_key_values_are_unique_and_opaque() {
        let storage = UsagePlanStorage::new();
        let a = storage.create_api_key();
        let b = storage.create_api_key();

        assert_ne!(a.value, b.value);
        assert_ne!(a.key_id, a.value);
        assert!(a.enabled);
    }
}
