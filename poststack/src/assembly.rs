//! Stack assembly
//!
//! Two-phase build: declaration methods record resources and hand back
//! typed handles, link methods record edges between handles, and `synth()`
//! provisions everything in one forward pass. Later declarations may
//! reference identifiers of earlier ones through their handles; nothing is
//! instantiated until synth. Any collision aborts assembly entirely.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use poststack_compute::{HandlerUnit, UnitConfig};
use poststack_gateway::{
    ApiGatewayStorage, ApiKey, ApiStage, CorsPolicy, GatewayError, Integration, RestApi,
    UsageError, UsagePlanStorage,
};
use poststack_store::{GrantSet, StoreClient, StoreError, TableSpec, TableStorage};

/// Assembly failures are fatal; there is no partial-deployment recovery
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("name collision: {0}")]
    NameCollision(String),

    #[error("no REST API declared")]
    MissingApi,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("usage plan error: {0}")]
    Usage(#[from] UsageError),
}

// Typed handles returned by the declaration phase. They carry no generated
// identifiers; those exist only after synth.
#[derive(Debug, Clone, Copy)]
pub struct TableHandle(usize);
#[derive(Debug, Clone, Copy)]
pub struct ApiHandle(usize);
#[derive(Debug, Clone, Copy)]
pub struct KeyHandle(usize);
#[derive(Debug, Clone, Copy)]
pub struct PlanHandle(usize);
#[derive(Debug, Clone, Copy)]
pub struct UnitHandle(usize);
#[derive(Debug, Clone, Copy)]
pub struct ResourceHandle(usize);

type UnitFactory = Box<dyn Fn(UnitConfig, StoreClient) -> Arc<dyn HandlerUnit> + Send + Sync>;

struct ApiDecl {
    name: String,
    cors: CorsPolicy,
    stage_name: String,
}

struct UnitDecl {
    name: String,
    environment: HashMap<String, String>,
    factory: UnitFactory,
}

struct ResourceDecl {
    api: usize,
    parent: Option<usize>,
    path_part: String,
}

struct RouteDecl {
    resource: usize,
    method: Method,
    unit: usize,
    api_key_required: bool,
}

/// Records declarations and links, then provisions them with [`synth`]
///
/// [`synth`]: StackBuilder::synth
pub struct StackBuilder {
    stack_name: String,
    tables: Vec<TableSpec>,
    apis: Vec<ApiDecl>,
    key_count: usize,
    plans: Vec<String>,
    units: Vec<UnitDecl>,
    resources: Vec<ResourceDecl>,
    routes: Vec<RouteDecl>,
    plan_bindings: Vec<(usize, usize, usize)>, // (plan, api, key)
    grants: Vec<(usize, usize)>,               // (table, unit)
    key_outputs: Vec<(String, usize)>,         // (output name, key)
}

impl StackBuilder {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            tables: Vec::new(),
            apis: Vec::new(),
            key_count: 0,
            plans: Vec::new(),
            units: Vec::new(),
            resources: Vec::new(),
            routes: Vec::new(),
            plan_bindings: Vec::new(),
            grants: Vec::new(),
            key_outputs: Vec::new(),
        }
    }

    // === Declaration phase ===

    pub fn declare_table(&mut self, spec: TableSpec) -> Result<TableHandle, AssemblyError> {
        if self.tables.iter().any(|t| t.table_name == spec.table_name) {
            return Err(AssemblyError::NameCollision(spec.table_name));
        }
        self.tables.push(spec);
        Ok(TableHandle(self.tables.len() - 1))
    }

    /// The declared name a table handle resolves to, usable in environments
    pub fn table_name(&self, table: TableHandle) -> &str {
        &self.tables[table.0].table_name
    }

    /// Declare a REST API together with its deployment stage
    pub fn declare_rest_api(
        &mut self,
        name: &str,
        cors: CorsPolicy,
        stage_name: &str,
    ) -> ApiHandle {
        self.apis.push(ApiDecl {
            name: name.to_string(),
            cors,
            stage_name: stage_name.to_string(),
        });
        ApiHandle(self.apis.len() - 1)
    }

    pub fn declare_api_key(&mut self) -> KeyHandle {
        self.key_count += 1;
        KeyHandle(self.key_count - 1)
    }

    pub fn declare_usage_plan(&mut self, name: &str) -> PlanHandle {
        self.plans.push(name.to_string());
        PlanHandle(self.plans.len() - 1)
    }

    pub fn declare_unit<F>(
        &mut self,
        name: &str,
        environment: HashMap<String, String>,
        factory: F,
    ) -> Result<UnitHandle, AssemblyError>
    where
        F: Fn(UnitConfig, StoreClient) -> Arc<dyn HandlerUnit> + Send + Sync + 'static,
    {
        if self.units.iter().any(|u| u.name == name) {
            return Err(AssemblyError::NameCollision(name.to_string()));
        }
        self.units.push(UnitDecl {
            name: name.to_string(),
            environment,
            factory: Box::new(factory),
        });
        Ok(UnitHandle(self.units.len() - 1))
    }

    // === Linking phase ===

    /// Bind a usage plan to an API's stage and attach a key to it
    pub fn bind_usage_plan(&mut self, plan: PlanHandle, api: ApiHandle, key: KeyHandle) {
        self.plan_bindings.push((plan.0, api.0, key.0));
    }

    /// Grant a unit read/write capability on a table
    pub fn grant_read_write(&mut self, table: TableHandle, unit: UnitHandle) {
        self.grants.push((table.0, unit.0));
    }

    /// Add a path segment under a parent resource (the API root when `None`)
    pub fn add_resource(
        &mut self,
        api: ApiHandle,
        parent: Option<ResourceHandle>,
        path_part: &str,
    ) -> Result<ResourceHandle, AssemblyError> {
        let parent_idx = parent.map(|p| p.0);
        let duplicate = self.resources.iter().any(|r| {
            r.api == api.0 && r.parent == parent_idx && r.path_part == path_part
        });
        if duplicate {
            return Err(AssemblyError::NameCollision(path_part.to_string()));
        }
        self.resources.push(ResourceDecl {
            api: api.0,
            parent: parent_idx,
            path_part: path_part.to_string(),
        });
        Ok(ResourceHandle(self.resources.len() - 1))
    }

    /// Register a method on a resource, integrated with a unit
    pub fn route(
        &mut self,
        resource: ResourceHandle,
        method: Method,
        unit: UnitHandle,
        api_key_required: bool,
    ) -> Result<(), AssemblyError> {
        let duplicate = self
            .routes
            .iter()
            .any(|r| r.resource == resource.0 && r.method == method);
        if duplicate {
            return Err(AssemblyError::NameCollision(format!(
                "{method} on resource {}",
                self.resources[resource.0].path_part
            )));
        }
        self.routes.push(RouteDecl {
            resource: resource.0,
            method,
            unit: unit.0,
            api_key_required,
        });
        Ok(())
    }

    /// Surface a key's identifier (never its value) as a stack output
    pub fn output_key_id(&mut self, name: &str, key: KeyHandle) {
        self.key_outputs.push((name.to_string(), key.0));
    }

    // === Provisioning ===

    /// Single forward pass: store, then gateway/keys/plans, then units and
    /// grants, then the routing tree. No retries; the first error aborts.
    pub fn synth(self) -> Result<DeployedStack, AssemblyError> {
        info!(stack = %self.stack_name, "assembling stack");

        let table_names: Vec<String> = self.tables.iter().map(|t| t.table_name.clone()).collect();

        let store = Arc::new(TableStorage::new());
        for spec in self.tables {
            let description = store.create_table(spec)?;
            info!(table = %description.table_name, "created table");
        }

        let gateway = Arc::new(ApiGatewayStorage::new());
        let mut apis = Vec::with_capacity(self.apis.len());
        for decl in &self.apis {
            let api = gateway.create_rest_api(&decl.name, decl.cors.clone());
            gateway.create_stage(&api.api_id, &decl.stage_name)?;
            info!(api = %decl.name, api_id = %api.api_id, stage = %decl.stage_name, "created REST API");
            apis.push(api);
        }

        let usage = Arc::new(UsagePlanStorage::new());
        let keys: Vec<ApiKey> = (0..self.key_count).map(|_| usage.create_api_key()).collect();
        for (plan_idx, plan_name) in self.plans.iter().enumerate() {
            let stages: Vec<ApiStage> = self
                .plan_bindings
                .iter()
                .filter(|(p, _, _)| *p == plan_idx)
                .map(|(_, api, _)| ApiStage {
                    api_id: apis[*api].api_id.clone(),
                    stage_name: self.apis[*api].stage_name.clone(),
                })
                .collect();
            let plan = usage.create_usage_plan(plan_name, stages);
            for (_, _, key) in self.plan_bindings.iter().filter(|(p, _, _)| *p == plan_idx) {
                usage.add_key_to_plan(&plan.plan_id, &keys[*key].key_id)?;
            }
        }

        let grants = Arc::new(GrantSet::new());
        for (table, unit) in &self.grants {
            let table_name = &table_names[*table];
            let unit_name = &self.units[*unit].name;
            grants.grant_read_write(table_name, unit_name);
            info!(table = %table_name, unit = %unit_name, "granted read/write");
        }

        let mut units: HashMap<String, Arc<dyn HandlerUnit>> = HashMap::new();
        for decl in &self.units {
            let config = UnitConfig::new(&decl.name, decl.environment.clone());
            let client = StoreClient::new(store.clone(), grants.clone(), &decl.name);
            units.insert(decl.name.clone(), (decl.factory)(config, client));
            info!(unit = %decl.name, "instantiated handler unit");
        }

        let mut resource_ids: Vec<String> = Vec::with_capacity(self.resources.len());
        for decl in &self.resources {
            let api = &apis[decl.api];
            let parent_id = match decl.parent {
                Some(p) => resource_ids[p].clone(),
                None => api.root_resource_id.clone(),
            };
            let resource = gateway.add_resource(&api.api_id, &parent_id, &decl.path_part)?;
            resource_ids.push(resource.resource_id);
        }

        for decl in &self.routes {
            let resource_id = &resource_ids[decl.resource];
            let unit_name = self.units[decl.unit].name.clone();
            gateway.put_method(
                resource_id,
                decl.method.clone(),
                Integration::Proxy { unit_name },
                decl.api_key_required,
            )?;
        }

        let api = apis.first().cloned().ok_or(AssemblyError::MissingApi)?;
        let stage_name = self.apis[0].stage_name.clone();

        let outputs = StackOutputs {
            values: self
                .key_outputs
                .iter()
                .map(|(name, key)| (name.clone(), keys[*key].key_id.clone()))
                .collect(),
        };
        for (name, value) in &outputs.values {
            info!(output = %name, value = %value, "stack output");
        }

        Ok(DeployedStack {
            store,
            grants,
            gateway,
            usage,
            units,
            api,
            stage_name,
            keys,
            outputs,
        })
    }
}

/// Observable outputs of assembly, by name
#[derive(Debug, Clone, Default)]
pub struct StackOutputs {
    values: Vec<(String, String)>,
}

impl StackOutputs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A provisioned stack, ready to serve
pub struct DeployedStack {
    pub store: Arc<TableStorage>,
    pub grants: Arc<GrantSet>,
    pub gateway: Arc<ApiGatewayStorage>,
    pub usage: Arc<UsagePlanStorage>,
    pub units: HashMap<String, Arc<dyn HandlerUnit>>,
    /// The API the dispatcher serves (the first declared)
    pub api: RestApi,
    pub stage_name: String,
    keys: Vec<ApiKey>,
    pub outputs: StackOutputs,
}

impl std::fmt::Debug for DeployedStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployedStack")
            .field("api", &self.api)
            .field("stage_name", &self.stage_name)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl DeployedStack {
    /// The issued keys. The secret value stays in-process; only ids appear
    /// in outputs.
    pub fn api_keys(&self) -> &[ApiKey] {
        &self.keys
    }

    pub fn api_key(&self, key_id: &str) -> Option<&ApiKey> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }

    /// Tear down tables per their removal policy
    pub fn teardown(&self) {
        self.store.drop_all();
    }
}
