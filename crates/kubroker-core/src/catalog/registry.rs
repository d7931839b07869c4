//! Read-only catalog registry.
//!
//! Built once at startup from pre-generated offering descriptors and raw
//! manifest templates. Nothing mutates a [`Catalog`] after [`CatalogBuilder::build`],
//! so it is shared behind an `Arc` and queried without locking.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::model::{Plan, ServiceOffering};
use crate::error::{CatalogError, Result};

/// File name suffix that marks an offering descriptor inside a catalog directory.
pub const GENERATED_SUFFIX: &str = "_generated.json";

#[derive(Debug, Default)]
pub struct Catalog {
    services: Vec<ServiceOffering>,
    /// service id -> index into `services`
    by_id: HashMap<String, usize>,
    /// service id -> plan id -> index into that offering's plans
    plans: HashMap<String, HashMap<String, usize>>,
    /// service name -> raw template text
    templates: HashMap<String, String>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Loads every descriptor and template found directly under `dir`.
    ///
    /// Files ending in [`GENERATED_SUFFIX`] are parsed as offerings; every
    /// other regular, non-hidden file is a template registered under its
    /// name up to the first `.`.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, unparsable descriptors and duplicate
    /// service names, ids or templates.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let io_err = |source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut entries = fs::read_dir(dir)
            .map_err(io_err)?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(io_err)?;
        entries.sort_by_key(|e| e.file_name());

        let mut builder = Self::builder();
        for entry in entries {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }

            let data = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;

            if file_name.ends_with(GENERATED_SUFFIX) {
                let offering: ServiceOffering =
                    serde_json::from_str(&data).map_err(|source| CatalogError::Descriptor {
                        path: path.display().to_string(),
                        source,
                    })?;
                debug!(file = %file_name, service = %offering.name, "Loaded offering descriptor");
                builder = builder.offering(offering);
            } else {
                let name = file_name.split('.').next().unwrap_or(&file_name).to_string();
                debug!(file = %file_name, service = %name, "Loaded manifest template");
                builder = builder.try_template(name, data)?;
            }
        }

        let catalog = builder.build()?;
        info!(
            dir = %dir.display(),
            services = catalog.services.len(),
            templates = catalog.templates.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn services(&self) -> &[ServiceOffering] {
        &self.services
    }

    pub fn offering(&self, service_id: &str) -> Result<&ServiceOffering> {
        self.by_id
            .get(service_id)
            .map(|&idx| &self.services[idx])
            .ok_or_else(|| CatalogError::service_not_found(service_id))
    }

    pub fn service_name(&self, service_id: &str) -> Result<&str> {
        self.offering(service_id).map(|o| o.name.as_str())
    }

    pub fn plan(&self, service_id: &str, plan_id: &str) -> Result<&Plan> {
        let offering = self.offering(service_id)?;
        self.plans
            .get(service_id)
            .and_then(|plans| plans.get(plan_id))
            .map(|&idx| &offering.plans[idx])
            .ok_or_else(|| CatalogError::plan_not_found(service_id, plan_id))
    }

    pub fn template(&self, service_name: &str) -> Result<&str> {
        self.templates
            .get(service_name)
            .map(String::as_str)
            .ok_or_else(|| CatalogError::template_not_found(service_name))
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Accumulates offerings and templates, validating them in [`CatalogBuilder::build`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    services: Vec<ServiceOffering>,
    templates: HashMap<String, String>,
    duplicate_template: Option<String>,
}

impl CatalogBuilder {
    #[must_use]
    pub fn offering(mut self, offering: ServiceOffering) -> Self {
        self.services.push(offering);
        self
    }

    /// Parses a JSON offering descriptor and adds it.
    pub fn offering_json(self, json: &str) -> Result<Self> {
        let offering = serde_json::from_str(json).map_err(|source| CatalogError::Descriptor {
            path: "<inline>".into(),
            source,
        })?;
        Ok(self.offering(offering))
    }

    /// Registers a template; a second template for the same service is
    /// reported by [`CatalogBuilder::build`].
    #[must_use]
    pub fn template(mut self, service_name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = service_name.into();
        if self.templates.insert(name.clone(), text.into()).is_some() {
            self.duplicate_template.get_or_insert(name);
        }
        self
    }

    fn try_template(self, service_name: String, text: String) -> Result<Self> {
        if self.templates.contains_key(&service_name) {
            return Err(CatalogError::DuplicateTemplate(service_name));
        }
        Ok(self.template(service_name, text))
    }

    pub fn build(self) -> Result<Catalog> {
        if let Some(name) = self.duplicate_template {
            return Err(CatalogError::DuplicateTemplate(name));
        }

        let mut names = HashSet::new();
        let mut by_id = HashMap::new();
        let mut plans = HashMap::new();

        for (idx, offering) in self.services.iter().enumerate() {
            if !names.insert(offering.name.clone()) {
                return Err(CatalogError::DuplicateServiceName(offering.name.clone()));
            }
            if by_id.insert(offering.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateServiceId(offering.id.clone()));
            }

            let mut plan_names = HashSet::new();
            let mut plan_index = HashMap::new();
            for (pidx, plan) in offering.plans.iter().enumerate() {
                if !plan_names.insert(plan.name.as_str()) {
                    return Err(CatalogError::DuplicatePlanName {
                        service: offering.name.clone(),
                        plan: plan.name.clone(),
                    });
                }
                if plan.has_quota() {
                    let quota = plan.quota()?;
                    if quota.plan_name() != plan.name {
                        return Err(CatalogError::invalid_quota(format!(
                            "plan {} does not match its quota {}",
                            plan.name,
                            quota.plan_name()
                        )));
                    }
                }
                plan_index.insert(plan.id.clone(), pidx);
            }
            plans.insert(offering.id.clone(), plan_index);
        }

        Ok(Catalog {
            services: self.services,
            by_id,
            plans,
            templates: self.templates,
        })
    }
}
