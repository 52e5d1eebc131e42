//! Artifact publishing for succeeded legs.
//!
//! Destination keys and tags are rendered with the same substitution
//! engine as steps, so a destination is a deterministic pure function of
//! (leg, trigger). The publisher is invoked exactly once per succeeded
//! leg and never retries; a failed publish surfaces as `Error::Publish`.

use flywheel_core::interpolation::Substituter;
use flywheel_core::ports::{ImageRegistry, ObjectStore};
use flywheel_core::spec::{Leg, PublishSpec};
use flywheel_core::trigger::TriggerContext;
use flywheel_core::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Render a destination template (`${ARCH}/${REF_TAG}` style) for a leg.
pub fn render_destination(template: &str, leg: &Leg, trigger: &TriggerContext) -> Result<String> {
    Substituter::new(leg, trigger).substitute(template, "publish destination")
}

pub struct Publisher {
    spec: PublishSpec,
    workspace: PathBuf,
    object_store: Option<Arc<dyn ObjectStore>>,
    registry: Option<Arc<dyn ImageRegistry>>,
}

impl Publisher {
    pub fn new(spec: PublishSpec, workspace: PathBuf) -> Self {
        Self {
            spec,
            workspace,
            object_store: None,
            registry: None,
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn ImageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Push this leg's artifacts to the configured sinks.
    pub async fn publish(&self, leg: &Leg, trigger: &TriggerContext) -> Result<()> {
        if let Some(target) = &self.spec.object {
            let store = self
                .object_store
                .as_ref()
                .ok_or_else(|| Error::Publish("no object store configured".to_string()))?;

            let key = render_destination(&target.key, leg, trigger)?;
            let source = render_destination(&target.source, leg, trigger)?;
            let path = self.workspace.join(&source);
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                Error::Publish(format!("cannot read artifact {}: {}", path.display(), e))
            })?;

            info!(leg = %leg.display_name(), key = %key, size = bytes.len(), "Pushing artifact to object store");
            store.put(&key, bytes, &target.content_type).await?;
        }

        if let Some(target) = &self.spec.image {
            let registry = self
                .registry
                .as_ref()
                .ok_or_else(|| Error::Publish("no image registry configured".to_string()))?;

            let tag = render_destination(&target.tag, leg, trigger)?;
            let image = render_destination(&target.image, leg, trigger)?;

            info!(leg = %leg.display_name(), repository = %target.repository, tag = %tag, "Pushing image to registry");
            registry.push(&target.repository, &tag, &image).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn leg(arch: &str) -> Leg {
        let mut bindings = BTreeMap::new();
        bindings.insert("ARCH".to_string(), arch.to_string());
        Leg::new(0, bindings)
    }

    #[test]
    fn test_destination_is_deterministic() {
        let trigger = TriggerContext::tag("v0.9.0", "abc123");
        let leg = leg("amd64");

        let first = render_destination("${ARCH}/${REF_TAG}/server", &leg, &trigger).unwrap();
        let second = render_destination("${ARCH}/${REF_TAG}/server", &leg, &trigger).unwrap();
        assert_eq!(first, "amd64/v0.9.0/server");
        assert_eq!(first, second);
    }

    #[test]
    fn test_destination_falls_back_to_commit_without_tag() {
        let trigger = TriggerContext::push("main", "abc123");
        let key = render_destination("${ARCH}/${REF_TAG}", &leg("arm64"), &trigger).unwrap();
        assert_eq!(key, "arm64/abc123");
    }

    #[test]
    fn test_unresolved_destination_reference_fails() {
        let trigger = TriggerContext::push("main", "abc123");
        let err = render_destination("${NOPE}/x", &leg("amd64"), &trigger).unwrap_err();
        assert!(matches!(err, Error::Substitution { .. }));
    }
}
