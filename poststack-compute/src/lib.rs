//! Handler units for poststack
//!
//! A handler unit is stateless compute invoked once per request with the
//! HTTP method, path parameters, and body. Units reach the store only
//! through a grant-checked [`StoreClient`], resolving the table from the
//! `TABLE_NAME` entry in their injected environment.

pub mod unit;
pub mod units;

pub use unit::{HandlerUnit, UnitConfig, UnitError, UnitRequest, UnitResponse, TABLE_NAME_VAR};
pub use units::{PostUnit, PostsUnit};
