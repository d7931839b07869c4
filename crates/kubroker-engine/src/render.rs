//! The four-stage manifest rendering pipeline.
//!
//! 1. identity: the raw template is rendered with handlebars in strict mode
//!    against `{Id, Namespace, InstanceName}`; an unresolved placeholder is
//!    an error.
//! 2. parameters: the extension's `apply_parameters` hook.
//! 3. plan: the extension's `apply_plan` hook.
//! 4. post-deploy: the extension's `apply_special` hook, run separately by
//!    [`RenderPipeline::finish`] once the Service documents exist.
//!
//! Any failing stage aborts the render and no text is returned.

use handlebars::Handlebars;
use kubroker_cluster::ServiceMap;
use kubroker_core::{Parameters, Plan};
use serde_json::json;
use tracing::debug;

use crate::error::{BrokerError, RenderStage, Result};
use crate::extension::ServiceExtension;

/// Identity substitutions available to raw templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityContext<'a> {
    pub instance_id: &'a str,
    pub namespace: &'a str,
    pub instance_name: &'a str,
}

/// Strict handlebars renderer for the identity stage.
#[derive(Debug)]
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    pub fn render_identity(&self, template: &str, identity: &IdentityContext<'_>) -> Result<String> {
        let data = json!({
            "Id": identity.instance_id,
            "Namespace": identity.namespace,
            "InstanceName": identity.instance_name,
        });
        self.handlebars
            .render_template(template, &data)
            .map_err(|e| BrokerError::render(RenderStage::Identity, e))
    }
}

/// Runs the pipeline stages for one service extension.
pub struct RenderPipeline<'a> {
    renderer: &'a TemplateRenderer,
    extension: &'a dyn ServiceExtension,
}

impl<'a> RenderPipeline<'a> {
    pub fn new(renderer: &'a TemplateRenderer, extension: &'a dyn ServiceExtension) -> Self {
        Self {
            renderer,
            extension,
        }
    }

    /// Identity, parameter and plan stages.
    pub fn render(
        &self,
        template: &str,
        identity: &IdentityContext<'_>,
        params: &Parameters,
        plan: &Plan,
    ) -> Result<String> {
        let text = self.renderer.render_identity(template, identity)?;
        let text = self
            .extension
            .apply_parameters(&text, params)
            .map_err(|e| BrokerError::render(RenderStage::Parameters, e))?;
        let text = self
            .extension
            .apply_plan(&text, plan)
            .map_err(|e| BrokerError::render(RenderStage::Plan, e))?;
        debug!(
            service = self.extension.name(),
            instance_id = identity.instance_id,
            bytes = text.len(),
            "Rendered manifest"
        );
        Ok(text)
    }

    /// Post-deploy stage.
    pub fn finish(&self, manifest: &str, services: &ServiceMap) -> Result<String> {
        self.extension
            .apply_special(manifest, services)
            .map_err(|e| BrokerError::render(RenderStage::PostDeploy, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{ExtensionError, HookResult};
    use crate::extensions::DefaultExtension;

    const TEMPLATE: &str = "metadata:\n  name: {{InstanceName}}\n  namespace: {{Namespace}}\n  labels:\n    kubroker.io/instance: \"{{Id}}\"\n";

    fn identity() -> IdentityContext<'static> {
        IdentityContext {
            instance_id: "i1",
            namespace: "ns1",
            instance_name: "app1",
        }
    }

    fn plan() -> Plan {
        serde_json::from_value(json!({"id": "p1", "name": "p-1-1Gi-10Gi"})).unwrap()
    }

    #[test]
    fn test_identity_stage() {
        let out = TemplateRenderer::new()
            .render_identity(TEMPLATE, &identity())
            .unwrap();
        assert!(out.contains("name: app1"));
        assert!(out.contains("namespace: ns1"));
        assert!(out.contains("kubroker.io/instance: \"i1\""));
    }

    #[test]
    fn test_unresolved_placeholder_is_error() {
        let err = TemplateRenderer::new()
            .render_identity("replicas: {{Replicas}}", &identity())
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Render {
                stage: RenderStage::Identity,
                ..
            }
        ));
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let ctx = IdentityContext {
            instance_name: "a&b<c>",
            ..identity()
        };
        let out = TemplateRenderer::new()
            .render_identity("{{InstanceName}}", &ctx)
            .unwrap();
        assert_eq!(out, "a&b<c>");
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = TemplateRenderer::new();
        let ext = DefaultExtension::new("zookeeper");
        let pipeline = RenderPipeline::new(&renderer, &ext);
        let params = Parameters::new();

        let first = pipeline.render(TEMPLATE, &identity(), &params, &plan()).unwrap();
        let second = pipeline.render(TEMPLATE, &identity(), &params, &plan()).unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.finish(&first, &ServiceMap::new()).unwrap(), first);
    }

    struct Rejecting;

    impl ServiceExtension for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn apply_plan(&self, _manifest: &str, plan: &Plan) -> HookResult<String> {
            Err(ExtensionError::new(format!("plan {} unsupported", plan.name)))
        }
    }

    #[test]
    fn test_hook_failure_aborts_with_stage() {
        let renderer = TemplateRenderer::new();
        let pipeline = RenderPipeline::new(&renderer, &Rejecting);
        let err = pipeline
            .render(TEMPLATE, &identity(), &Parameters::new(), &plan())
            .unwrap_err();
        match err {
            BrokerError::Render { stage, message } => {
                assert_eq!(stage, RenderStage::Plan);
                assert_eq!(message, "plan p-1-1Gi-10Gi unsupported");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
