//! REST gateway model for poststack
//!
//! The gateway is a declarative model: a REST API with a deployment stage,
//! a resource tree mapping (path, method) pairs to handler-unit
//! integrations, and an API-key/usage-plan pair gating admission. Matching
//! and admission are pure lookups against this model; serving is done by
//! the `poststack` dispatcher.

pub mod storage;
pub mod usage;

pub use storage::{
    ApiGatewayStorage, CorsPolicy, GatewayError, Integration, MethodBinding, Resource, RestApi,
    RouteError, RouteMatch, Stage,
};
pub use usage::{AdmissionError, ApiKey, ApiStage, UsageError, UsagePlan, UsagePlanStorage};
