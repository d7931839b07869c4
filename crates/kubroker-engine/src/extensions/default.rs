use crate::extension::ServiceExtension;

/// Extension whose hooks are all no-ops; the template is used as rendered.
#[derive(Debug, Clone)]
pub struct DefaultExtension {
    name: String,
}

impl DefaultExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ServiceExtension for DefaultExtension {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubroker_cluster::ServiceMap;
    use kubroker_core::Parameters;

    #[test]
    fn test_hooks_pass_manifest_through() {
        let ext = DefaultExtension::new("redis");
        let manifest = "kind: Service\n";
        assert_eq!(ext.apply_parameters(manifest, &Parameters::new()).unwrap(), manifest);
        assert_eq!(ext.apply_special(manifest, &ServiceMap::new()).unwrap(), manifest);
        assert_eq!(ext.dashboard_url(&Parameters::new(), &ServiceMap::new()).unwrap(), None);
    }
}
