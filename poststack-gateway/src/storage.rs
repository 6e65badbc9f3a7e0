//! REST API, resource tree, and method bindings

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::Method;
use std::collections::HashMap;
use uuid::Uuid;

/// Cross-origin policy declared on an API
///
/// The default is deliberately permissive: every origin and method is
/// allowed on preflight. This is not a security boundary; admission is.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
}

impl CorsPolicy {
    /// Allow all origins and all methods
    pub fn allow_all() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: vec!["*".to_string()],
        }
    }

    pub fn allow_origin_header(&self) -> String {
        self.allow_origins.join(",")
    }

    pub fn allow_methods_header(&self) -> String {
        self.allow_methods.join(",")
    }
}

/// A REST API with its auto-created root resource
#[derive(Debug, Clone)]
pub struct RestApi {
    pub api_id: String,
    pub name: String,
    pub root_resource_id: String,
    pub cors: CorsPolicy,
    pub created_date: DateTime<Utc>,
}

/// A deployment stage; the unit usage plans bind against
#[derive(Debug, Clone)]
pub struct Stage {
    pub api_id: String,
    pub stage_name: String,
    pub created_date: DateTime<Utc>,
}

/// A node in the routing tree
#[derive(Debug, Clone)]
pub struct Resource {
    pub resource_id: String,
    pub api_id: String,
    pub parent_id: Option<String>,
    /// One path segment; `{name}` is a parameter capture
    pub path_part: String,
    /// Full path from the root, e.g. `/posts/{id}`
    pub path: String,
}

impl Resource {
    /// The parameter name if this node is a capture segment
    fn capture_name(&self) -> Option<&str> {
        self.path_part
            .strip_prefix('{')
            .and_then(|p| p.strip_suffix('}'))
    }
}

/// Integration backing a method
#[derive(Debug, Clone)]
pub enum Integration {
    /// Proxy the full request to a handler unit, by name
    Proxy { unit_name: String },
}

impl Integration {
    pub fn unit_name(&self) -> &str {
        match self {
            Self::Proxy { unit_name } => unit_name,
        }
    }
}

/// A (resource, method) registration
#[derive(Debug, Clone)]
pub struct MethodBinding {
    pub resource_id: String,
    pub http_method: Method,
    pub api_key_required: bool,
    pub integration: Integration,
}

/// Declaration-time gateway errors; fatal at assembly
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("API not found: {0}")]
    ApiNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Stage already exists: {0}")]
    StageExists(String),

    #[error("Resource already exists under parent: {0}")]
    ResourceExists(String),

    #[error("Method already bound: {method} on {resource_id}")]
    MethodExists { resource_id: String, method: Method },

    #[error("Invalid path part: {0:?}")]
    InvalidPathPart(String),
}

/// Request-time routing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No resource matches the path
    PathNotFound,
    /// The path matches a resource with no binding for this method
    MethodNotAllowed,
}

/// A matched route, ready for admission and dispatch
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub unit_name: String,
    pub api_key_required: bool,
    pub path_params: HashMap<String, String>,
}

/// In-memory gateway model
#[derive(Debug, Default)]
pub struct ApiGatewayStorage {
    apis: DashMap<String, RestApi>,
    stages: DashMap<String, Stage>,           // key: "{api_id}/{stage_name}"
    resources: DashMap<String, Resource>,     // key: resource_id
    methods: DashMap<String, MethodBinding>,  // key: "{resource_id}/{METHOD}"
}

impl ApiGatewayStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a REST API with an empty root resource
    pub fn create_rest_api(&self, name: &str, cors: CorsPolicy) -> RestApi {
        let api_id = Self::generate_id();
        let root_resource_id = Self::generate_id();

        let root = Resource {
            resource_id: root_resource_id.clone(),
            api_id: api_id.clone(),
            parent_id: None,
            path_part: String::new(),
            path: "/".to_string(),
        };
        self.resources.insert(root_resource_id.clone(), root);

        let api = RestApi {
            api_id: api_id.clone(),
            name: name.to_string(),
            root_resource_id,
            cors,
            created_date: Utc::now(),
        };
        self.apis.insert(api_id, api.clone());
        api
    }

    pub fn get_api(&self, api_id: &str) -> Option<RestApi> {
        self.apis.get(api_id).map(|a| a.clone())
    }

    pub fn create_stage(&self, api_id: &str, stage_name: &str) -> Result<Stage, GatewayError> {
        if !self.apis.contains_key(api_id) {
            return Err(GatewayError::ApiNotFound(api_id.to_string()));
        }

        let key = format!("{}/{}", api_id, stage_name);
        if self.stages.contains_key(&key) {
            return Err(GatewayError::StageExists(stage_name.to_string()));
        }

        let stage = Stage {
            api_id: api_id.to_string(),
            stage_name: stage_name.to_string(),
            created_date: Utc::now(),
        };
        self.stages.insert(key, stage.clone());
        Ok(stage)
    }

    pub fn get_stage(&self, api_id: &str, stage_name: &str) -> Option<Stage> {
        self.stages
            .get(&format!("{}/{}", api_id, stage_name))
            .map(|s| s.clone())
    }

    /// Add a child resource under `parent_id`
    pub fn add_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> Result<Resource, GatewayError> {
        if path_part.is_empty() || path_part.contains('/') {
            return Err(GatewayError::InvalidPathPart(path_part.to_string()));
        }

        let parent = self
            .resources
            .get(parent_id)
            .map(|r| r.clone())
            .ok_or_else(|| GatewayError::ResourceNotFound(parent_id.to_string()))?;
        if parent.api_id != api_id {
            return Err(GatewayError::ApiNotFound(api_id.to_string()));
        }

        let sibling_exists = self.resources.iter().any(|r| {
            r.parent_id.as_deref() == Some(parent_id) && r.path_part == path_part
        });
        if sibling_exists {
            return Err(GatewayError::ResourceExists(path_part.to_string()));
        }

        let path = if parent.path == "/" {
            format!("/{}", path_part)
        } else {
            format!("{}/{}", parent.path, path_part)
        };

        let resource = Resource {
            resource_id: Self::generate_id(),
            api_id: api_id.to_string(),
            parent_id: Some(parent_id.to_string()),
            path_part: path_part.to_string(),
            path,
        };
        self.resources
            .insert(resource.resource_id.clone(), resource.clone());
        Ok(resource)
    }

    /// Bind an HTTP method on a resource to an integration
    pub fn put_method(
        &self,
        resource_id: &str,
        http_method: Method,
        integration: Integration,
        api_key_required: bool,
    ) -> Result<MethodBinding, GatewayError> {
        if !self.resources.contains_key(resource_id) {
            return Err(GatewayError::ResourceNotFound(resource_id.to_string()));
        }

        let key = format!("{}/{}", resource_id, http_method);
        if self.methods.contains_key(&key) {
            return Err(GatewayError::MethodExists {
                resource_id: resource_id.to_string(),
                method: http_method,
            });
        }

        let binding = MethodBinding {
            resource_id: resource_id.to_string(),
            http_method,
            api_key_required,
            integration,
        };
        self.methods.insert(key, binding.clone());
        Ok(binding)
    }

    /// Methods bound on a resource (for preflight and 405 reporting)
    pub fn methods_for(&self, resource_id: &str) -> Vec<Method> {
        self.methods
            .iter()
            .filter(|m| m.resource_id == resource_id)
            .map(|m| m.http_method.clone())
            .collect()
    }

    /// Resolve a (method, path) pair against the routing tree
    ///
    /// Literal segments win over parameter captures. An unmatched path is
    /// `PathNotFound`; a matched path whose resource has no binding for the
    /// method is `MethodNotAllowed`.
    pub fn match_request(
        &self,
        api_id: &str,
        method: &Method,
        path: &str,
    ) -> Result<RouteMatch, RouteError> {
        let api = self.apis.get(api_id).ok_or(RouteError::PathNotFound)?;

        let mut current = api.root_resource_id.clone();
        let mut path_params = HashMap::new();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children: Vec<Resource> = self
                .resources
                .iter()
                .filter(|r| r.parent_id.as_deref() == Some(current.as_str()))
                .map(|r| r.clone())
                .collect();

            let literal = children.iter().find(|r| r.path_part == segment);
            let capture = children.iter().find(|r| r.capture_name().is_some());

            match literal.or(capture) {
                Some(resource) => {
                    if let Some(name) = resource.capture_name() {
                        path_params.insert(name.to_string(), segment.to_string());
                    }
                    current = resource.resource_id.clone();
                }
                None => return Err(RouteError::PathNotFound),
            }
        }

        let key = format!("{}/{}", current, method);
        match self.methods.get(&key) {
            Some(binding) => Ok(RouteMatch {
                unit_name: binding.integration.unit_name().to_string(),
                api_key_required: binding.api_key_required,
                path_params,
            }),
            None if self.methods_for(&current).is_empty() => Err(RouteError::PathNotFound),
            None => Err(RouteError::MethodNotAllowed),
        }
    }

    fn generate_id() -> String {
        // Gateway identifiers are short and alphanumeric
        Uuid::new_v4().to_string().replace('-', "")[..10].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(unit: &str) -> Integration {
        Integration::Proxy {
            unit_name: unit.to_string(),
        }
    }

    /// Build the two-level posts tree used by the stack
    fn posts_api(storage: &ApiGatewayStorage) -> RestApi {
        let api = storage.create_rest_api("RestAPI", CorsPolicy::allow_all());
        let posts = storage
            .add_resource(&api.api_id, &api.root_resource_id, "posts")
            .unwrap();
        let post = storage
            .add_resource(&api.api_id, &posts.resource_id, "{id}")
            .unwrap();

        storage
            .put_method(&posts.resource_id, Method::GET, proxy("posts"), true)
            .unwrap();
        storage
            .put_method(&posts.resource_id, Method::POST, proxy("posts"), true)
            .unwrap();
        storage
            .put_method(&post.resource_id, Method::GET, proxy("post"), true)
            .unwrap();
        storage
            .put_method(&post.resource_id, Method::DELETE, proxy("post"), true)
            .unwrap();
        api
    }

    #[test]
    fn test_match_collection_route() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);

        let matched = storage
            .match_request(&api.api_id, &Method::GET, "/posts")
            .unwrap();
        assert_eq!(matched.unit_name, "posts");
        assert!(matched.api_key_required);
        assert!(matched.path_params.is_empty());
    }

    #[test]
    fn test_match_item_route_captures_id() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);

        let matched = storage
            .match_request(&api.api_id, &Method::DELETE, "/posts/abc-123")
            .unwrap();
        assert_eq!(matched.unit_name, "post");
        assert_eq!(matched.path_params.get("id").unwrap(), "abc-123");
    }

    #[test]
    fn test_undeclared_method_is_method_not_allowed() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);

        let err = storage
            .match_request(&api.api_id, &Method::PATCH, "/posts")
            .unwrap_err();
        assert_eq!(err, RouteError::MethodNotAllowed);
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);

        for path in ["/comments", "/posts/a/extra", "/"] {
            let err = storage
                .match_request(&api.api_id, &Method::GET, path)
                .unwrap_err();
            assert_eq!(err, RouteError::PathNotFound, "path {path}");
        }
    }

    #[test]
    fn test_literal_segment_wins_over_capture() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);
        let posts = storage
            .resources
            .iter()
            .find(|r| r.path == "/posts")
            .map(|r| r.resource_id.clone())
            .unwrap();
        let special = storage
            .add_resource(&api.api_id, &posts, "latest")
            .unwrap();
        storage
            .put_method(&special.resource_id, Method::GET, proxy("latest"), true)
            .unwrap();

        let matched = storage
            .match_request(&api.api_id, &Method::GET, "/posts/latest")
            .unwrap();
        assert_eq!(matched.unit_name, "latest");
        assert!(matched.path_params.is_empty());
    }

    #[test]
    fn test_double_method_registration_is_fatal() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);
        let posts = storage
            .resources
            .iter()
            .find(|r| r.path == "/posts")
            .map(|r| r.resource_id.clone())
            .unwrap();

        let err = storage
            .put_method(&posts, Method::GET, proxy("posts"), true)
            .unwrap_err();
        assert!(matches!(err, GatewayError::MethodExists { .. }));
    }

    #[test]
    fn test_duplicate_sibling_resource_is_fatal() {
        let storage = ApiGatewayStorage::new();
        let api = posts_api(&storage);

        let err = storage
            .add_resource(&api.api_id, &api.root_resource_id, "posts")
            .unwrap_err();
        assert!(matches!(err, GatewayError::ResourceExists(_)));
    }

    #[test]
    fn test_duplicate_stage_is_fatal() {
        let storage = ApiGatewayStorage::new();
        let api = storage.create_rest_api("RestAPI", CorsPolicy::allow_all());
        storage.create_stage(&api.api_id, "prod").unwrap();

        let err = storage.create_stage(&api.api_id, "prod").unwrap_err();
        assert!(matches!(err, GatewayError::StageExists(_)));
    }
}
