//! Key-value table storage for poststack
//!
//! Tables hold schemaless JSON items keyed by a declared partition key.
//! All access from compute goes through [`StoreClient`], which enforces the
//! capability grants recorded in a [`GrantSet`].

pub mod access;
pub mod storage;

pub use access::{AccessMode, Capability, GrantSet, StoreClient};
pub use storage::{
    BillingMode, Item, RemovalPolicy, StoreError, TableDescription, TableSpec, TableStorage,
};
