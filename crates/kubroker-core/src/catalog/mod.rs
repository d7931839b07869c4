//! Service catalog: offerings, plans and the registry that resolves incoming
//! service/plan identifiers.

mod generate;
mod model;
mod quota;
mod registry;

pub use generate::{OfferingConfig, ParameterProperty, generate_id, generate_offering};
pub use model::{
    InputParametersSchema, Plan, Schemas, ServiceBindingSchema, ServiceInstanceSchema,
    ServiceOffering,
};
pub use quota::Quota;
pub use registry::{Catalog, CatalogBuilder, GENERATED_SUFFIX};
