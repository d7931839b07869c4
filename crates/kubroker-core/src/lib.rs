//! Core types shared by every kubroker crate.
//!
//! - [`catalog`]: offered services, plans, quota tuples and the read-only
//!   [`Catalog`] registry built once at startup.
//! - [`instance`]: the persisted [`InstanceRecord`].
//! - [`params`]: helpers for the free-form request parameter map.

pub mod catalog;
pub mod error;
pub mod instance;
pub mod params;

pub use catalog::{
    Catalog, CatalogBuilder, InputParametersSchema, OfferingConfig, ParameterProperty, Plan,
    Quota, Schemas, ServiceBindingSchema, ServiceInstanceSchema, ServiceOffering,
    generate_id, generate_offering,
};
pub use error::{CatalogError, Result};
pub use instance::InstanceRecord;
pub use params::{INSTANCE_NAME_PARAM, NAMESPACE_PARAM, Parameters, merge_params, string_param};
