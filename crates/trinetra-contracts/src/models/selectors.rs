use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Picks `requested` when it supports `capability`, otherwise the registry's first
    /// capable model along with the reason the request was not honored.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let (fallback_reason, requested_text) = match requested {
            Some(requested_value) => {
                if let Some(model) = self.registry.ensure(requested_value, capability) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(requested_value.to_string()),
                        fallback_reason: None,
                    });
                }
                (
                    Some(format!(
                        "Requested model '{requested_value}' unavailable for capability '{capability}'."
                    )),
                    Some(requested_value.to_string()),
                )
            }
            None => (None, None),
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn registry_of(specs: &[ModelSpec]) -> ModelRegistry {
        let models: IndexMap<String, ModelSpec> = specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.clone()))
            .collect();
        ModelRegistry::new(Some(models))
    }

    #[test]
    fn selector_honors_capable_request() {
        let selection = ModelSelector::new(None)
            .select(Some("gemini-2.5-flash"), Capability::Chat)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn selector_falls_back_when_requested_model_lacks_capability() {
        let selection = ModelSelector::new(None)
            .select(Some("imagen-4.0-generate-001"), Capability::ImageEdit)
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash-image");
        assert_eq!(selection.requested.as_deref(), Some("imagen-4.0-generate-001"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'imagen-4.0-generate-001' unavailable for capability 'image_edit'.")
        );
    }

    #[test]
    fn selector_without_request_uses_first_capable_model() {
        let selection = ModelSelector::new(None)
            .select(None, Capability::ImageSynthesis)
            .unwrap();
        assert_eq!(selection.model.name, "imagen-4.0-generate-001");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn selector_errors_when_nothing_is_capable() {
        let registry = registry_of(&[ModelSpec::new("text-only", "gemini", &[Capability::Chat])]);
        let err = ModelSelector::new(Some(registry))
            .select(Some("text-only"), Capability::ImageEdit)
            .unwrap_err();
        assert_eq!(err, "No models available for capability 'image_edit'.");
    }

    #[test]
    fn backend_registry_only_lists_that_backend() {
        let dryrun = ModelRegistry::for_backend("dryrun");
        for capability in [
            Capability::Chat,
            Capability::ImageSynthesis,
            Capability::ImageEdit,
        ] {
            let models = dryrun.by_capability(capability);
            assert!(!models.is_empty());
            assert!(models.iter().all(|model| model.backend == "dryrun"));
        }
        assert!(dryrun.get("gemini-2.5-pro").is_none());
        assert_eq!(
            dryrun.by_capability(Capability::Chat)[0].name,
            "dryrun-chat-1"
        );
    }
}
