//! poststack - a declarative posts stack
//!
//! Assembles a key-value store, an API-key-gated REST gateway, and two
//! handler units into one servable deployment. Assembly is two-phase:
//! declarations produce typed handles, links wire handles together, and
//! `synth()` makes a single forward pass that provisions everything or
//! aborts.

pub mod assembly;
pub mod config;
pub mod router;
pub mod stack;

pub use assembly::{AssemblyError, DeployedStack, StackBuilder, StackOutputs};
pub use config::{Config, StackConfig};
pub use router::create_router;
pub use stack::posts_stack;
