use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;
use trinetra_contracts::models::{Capability, ModelRegistry, ModelSelector};

use crate::backend::GenerativeBackend;
use crate::dryrun::DryrunBackend;
use crate::error::ConfigError;
use crate::gemini::GeminiBackend;

const CREDENTIAL_VARS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Gemini,
    Dryrun,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Dryrun => "dryrun",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(BackendKind::Gemini),
            "dryrun" | "offline" => Ok(BackendKind::Dryrun),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models bound to the three remote operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub chat: String,
    pub synthesis: String,
    pub edit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub chat_model: Option<String>,
    pub synthesis_model: Option<String>,
    pub edit_model: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the configuration from a variable lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("TRINETRA_BACKEND") {
            Some(raw) => raw.parse()?,
            None => BackendKind::default(),
        };
        let request_timeout = match lookup("TRINETRA_REQUEST_TIMEOUT") {
            Some(raw) => Some(parse_timeout(&raw)?),
            None => None,
        };
        Ok(Self {
            backend,
            api_key: CREDENTIAL_VARS.iter().find_map(|key| lookup(key)),
            api_base: lookup("GEMINI_API_BASE"),
            chat_model: lookup("TRINETRA_CHAT_MODEL"),
            synthesis_model: lookup("TRINETRA_IMAGE_MODEL"),
            edit_model: lookup("TRINETRA_EDIT_MODEL"),
            request_timeout,
        })
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Resolves each requested model against the backend's registry, falling back to the
    /// registry default (with a warning) when a request is unknown or incapable.
    pub fn resolve_models(&self) -> Result<ModelChoice, ConfigError> {
        let selector = ModelSelector::new(Some(ModelRegistry::for_backend(self.backend.as_str())));
        let pick = |requested: Option<&String>, capability: Capability| {
            let selection = selector
                .select(requested.map(String::as_str), capability)
                .map_err(ConfigError::NoModel)?;
            if let Some(reason) = selection.fallback_reason.as_deref() {
                warn!(model = %selection.model.name, "{reason}");
            }
            Ok::<String, ConfigError>(selection.model.name)
        };
        Ok(ModelChoice {
            chat: pick(self.chat_model.as_ref(), Capability::Chat)?,
            synthesis: pick(self.synthesis_model.as_ref(), Capability::ImageSynthesis)?,
            edit: pick(self.edit_model.as_ref(), Capability::ImageEdit)?,
        })
    }

    /// Instantiates the configured backend. A missing credential is fatal for Gemini.
    pub fn build_backend(&self) -> Result<Arc<dyn GenerativeBackend>> {
        match self.backend {
            BackendKind::Dryrun => Ok(Arc::new(DryrunBackend)),
            BackendKind::Gemini => {
                let api_key = self
                    .api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingCredential)?;
                Ok(Arc::new(GeminiBackend::new(
                    api_key,
                    self.api_base.as_deref(),
                    self.request_timeout,
                )?))
            }
        }
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidTimeout(raw.to_string()))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::InvalidTimeout(raw.to_string()));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn api_key_wins_over_fallback_credentials() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "google"),
            ("API_KEY", "primary"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));

        let fallback =
            EngineConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "gemini")])).unwrap();
        assert_eq!(fallback.api_key.as_deref(), Some("gemini"));
    }

    #[test]
    fn missing_credential_is_fatal_for_gemini_only() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, BackendKind::Gemini);
        let err = config.build_backend().err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingCredential)
        ));

        let dryrun = config.with_backend(BackendKind::Dryrun).build_backend().unwrap();
        assert_eq!(dryrun.name(), "dryrun");
    }

    #[test]
    fn gemini_backend_builds_with_credential() {
        let config = EngineConfig::from_lookup(lookup_from(&[("API_KEY", "k")])).unwrap();
        assert_eq!(config.build_backend().unwrap().name(), "gemini");
    }

    #[test]
    fn default_models_match_each_operation() {
        let config = EngineConfig::default();
        assert_eq!(
            config.resolve_models().unwrap(),
            ModelChoice {
                chat: "gemini-2.5-pro".to_string(),
                synthesis: "imagen-4.0-generate-001".to_string(),
                edit: "gemini-2.5-flash-image".to_string(),
            }
        );

        let dryrun = EngineConfig::default().with_backend(BackendKind::Dryrun);
        assert_eq!(dryrun.resolve_models().unwrap().chat, "dryrun-chat-1");
    }

    #[test]
    fn incapable_model_override_falls_back() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("TRINETRA_CHAT_MODEL", "gemini-2.5-flash"),
            ("TRINETRA_EDIT_MODEL", "imagen-4.0-generate-001"),
        ]))
        .unwrap();
        let models = config.resolve_models().unwrap();
        assert_eq!(models.chat, "gemini-2.5-flash");
        assert_eq!(models.edit, "gemini-2.5-flash-image");
    }

    #[test]
    fn backend_and_timeout_are_parsed() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("TRINETRA_BACKEND", "Dryrun"),
            ("TRINETRA_REQUEST_TIMEOUT", "2.5"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Dryrun);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));

        assert!(matches!(
            EngineConfig::from_lookup(lookup_from(&[("TRINETRA_BACKEND", "openai")])),
            Err(ConfigError::UnknownBackend(name)) if name == "openai"
        ));
        assert!(matches!(
            EngineConfig::from_lookup(lookup_from(&[("TRINETRA_REQUEST_TIMEOUT", "-1")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }
}
