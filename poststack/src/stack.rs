//! The posts stack
//!
//! One pay-per-request table, one REST API with allow-all CORS behind an
//! API key and usage plan, and two handler units with read/write grants:
//! "posts" for the collection routes and "post" for the item routes.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use poststack_compute::{PostUnit, PostsUnit, TABLE_NAME_VAR};
use poststack_gateway::CorsPolicy;
use poststack_store::TableSpec;

use crate::assembly::{AssemblyError, DeployedStack, StackBuilder};
use crate::config::StackConfig;

/// Output name carrying the API key identifier
pub const API_KEY_ID_OUTPUT: &str = "ApiKeyId";

/// Assemble the posts stack
pub fn posts_stack(config: &StackConfig) -> Result<DeployedStack, AssemblyError> {
    let mut stack = StackBuilder::new("posts-stack");

    // Declaration phase: named handles, nothing provisioned yet.
    let table = stack.declare_table(TableSpec::new(&config.table_name, "pk"))?;
    let api = stack.declare_rest_api(&config.api_name, CorsPolicy::allow_all(), &config.stage_name);
    let key = stack.declare_api_key();
    let plan = stack.declare_usage_plan("Usage Plan");

    let environment = HashMap::from([(
        TABLE_NAME_VAR.to_string(),
        stack.table_name(table).to_string(),
    )]);
    let posts_unit = stack.declare_unit("posts", environment.clone(), |cfg, store| {
        Arc::new(PostsUnit::new(cfg, store)) as _
    })?;
    let post_unit = stack.declare_unit("post", environment, |cfg, store| {
        Arc::new(PostUnit::new(cfg, store)) as _
    })?;

    // Linking phase: wire the handles together.
    stack.bind_usage_plan(plan, api, key);
    stack.grant_read_write(table, posts_unit);
    stack.grant_read_write(table, post_unit);

    let posts = stack.add_resource(api, None, "posts")?;
    let post = stack.add_resource(api, Some(posts), "{id}")?;
    stack.route(posts, Method::GET, posts_unit, true)?;
    stack.route(posts, Method::POST, posts_unit, true)?;
    stack.route(post, Method::GET, post_unit, true)?;
    stack.route(post, Method::DELETE, post_unit, true)?;

    stack.output_key_id(API_KEY_ID_OUTPUT, key);

    stack.synth()
}
