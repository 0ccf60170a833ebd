use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Chat,
    ImageSynthesis,
    ImageEdit,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::ImageSynthesis => "image_synthesis",
            Capability::ImageEdit => "image_edit",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub backend: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn new(name: &str, backend: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            backend: backend.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Ordered catalogue of known models. Insertion order decides the default for a capability.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn for_backend(backend: &str) -> Self {
        let models = default_models()
            .into_iter()
            .filter(|(_, model)| model.backend == backend)
            .collect();
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::*;

    let rows: [(&str, &str, &[Capability]); 8] = [
        ("gemini-2.5-pro", "gemini", &[Chat]),
        ("gemini-2.5-flash", "gemini", &[Chat]),
        ("imagen-4.0-generate-001", "gemini", &[ImageSynthesis]),
        ("imagen-4.0-ultra-generate-001", "gemini", &[ImageSynthesis]),
        ("gemini-2.5-flash-image", "gemini", &[ImageEdit]),
        ("dryrun-chat-1", "dryrun", &[Chat]),
        ("dryrun-image-1", "dryrun", &[ImageSynthesis]),
        ("dryrun-edit-1", "dryrun", &[ImageEdit]),
    ];

    rows.into_iter()
        .map(|(name, backend, capabilities)| {
            (name.to_string(), ModelSpec::new(name, backend, capabilities))
        })
        .collect()
}
