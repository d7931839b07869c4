//! # kubroker-engine
//!
//! Turns broker operations into cluster changes:
//!
//! - [`render`]: the four-stage manifest pipeline (identity substitution,
//!   parameters, plan quota, post-deploy).
//! - [`extension`]: the per-service hook contract and its registry, with the
//!   built-in implementations in [`extensions`].
//! - [`Broker`]: the provisioning state machine over a catalog, a store and
//!   a cluster reconciler.

pub mod editing;
mod error;
pub mod extension;
pub mod extensions;
mod lock;
mod orchestrator;
pub mod render;
mod types;

pub use error::{BrokerError, ErrorKind, RenderStage, Result};
pub use extension::{
    DynExtension, ExtensionError, ExtensionRegistry, HookResult, ServiceExtension,
};
pub use extensions::{DefaultExtension, ZookeeperExtension, builtin_registry};
pub use lock::{InstanceGuard, InstanceLocks};
pub use orchestrator::Broker;
pub use types::{
    Acknowledgement, BindRequest, BindResponse, Credentials, DeprovisionRequest,
    LastOperationRequest, LastOperationResponse, Operation, OperationState, ProvisionRequest,
    UnbindRequest, UpdateRequest,
};
