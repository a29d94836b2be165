//! Model resolution with single-hop fallback.
//!
//! `resolve` turns a model name into a live backend handle. Unknown names
//! and construction failures fall back once to [`FALLBACK_MODEL`]; the
//! fallback itself never falls back, so resolution cannot cycle.

use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::{EngineError, Result};
use crate::llm::backend::ResolvedBackend;
use crate::llm::registry::{self, ModelPlatform, ModelSpec, Task, FALLBACK_MODEL};

#[derive(Clone)]
pub struct ModelResolver {
    credentials: Credentials,
}

impl ModelResolver {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Resolve a model name to a live backend handle.
    ///
    /// Unknown names are substituted with the fallback model when
    /// `allow_fallback` is set, otherwise resolution fails with
    /// [`EngineError::UnknownModel`]. Construction failures retry once
    /// against the fallback model, then propagate.
    pub fn resolve(&self, name: &str, allow_fallback: bool) -> Result<ResolvedBackend> {
        self.resolve_with_temperature(name, allow_fallback, None)
    }

    /// Like [`resolve`](Self::resolve), with a caller-supplied temperature.
    /// Reasoning-tier models ignore the override and run pinned.
    pub fn resolve_with_temperature(
        &self,
        name: &str,
        allow_fallback: bool,
        temperature: Option<f64>,
    ) -> Result<ResolvedBackend> {
        let name = if registry::is_known_model(name) {
            name
        } else if allow_fallback {
            warn!(
                requested = name,
                fallback = FALLBACK_MODEL,
                "model not in registry, substituting fallback"
            );
            FALLBACK_MODEL
        } else {
            return Err(EngineError::UnknownModel(name.to_string()));
        };

        let spec = registry::spec(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))?;

        match self.build(spec, temperature) {
            Ok(backend) => {
                info!(
                    model = spec.name,
                    temperature = backend.temperature(),
                    "resolved model backend"
                );
                Ok(backend)
            }
            // Single fallback hop: never recurse when the failing model
            // already is the fallback.
            Err(e) if allow_fallback && spec.name != FALLBACK_MODEL => {
                warn!(
                    model = spec.name,
                    fallback = FALLBACK_MODEL,
                    "backend init failed, retrying with fallback: {}",
                    e
                );
                self.resolve_with_temperature(FALLBACK_MODEL, false, temperature)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the designated default model for an engine task.
    pub fn resolve_for_task(&self, task: Task) -> Result<ResolvedBackend> {
        let name = registry::default_model(task);
        self.resolve(name, true)
    }

    fn build(&self, spec: &'static ModelSpec, temperature: Option<f64>) -> Result<ResolvedBackend> {
        let temperature = spec.effective_temperature(temperature);
        let (api_key, base_url) = match spec.platform {
            ModelPlatform::OpenAi => {
                let key = self.credentials.openai_api_key.clone().ok_or_else(|| {
                    EngineError::BackendInit {
                        model: spec.name.to_string(),
                        reason: "OPENAI_API_KEY not set".to_string(),
                    }
                })?;
                (Some(key), self.credentials.openai_base_url.clone())
            }
            ModelPlatform::Groq => {
                let key = self.credentials.groq_api_key.clone().ok_or_else(|| {
                    EngineError::BackendInit {
                        model: spec.name.to_string(),
                        reason: "GROQ_API_KEY not set".to_string(),
                    }
                })?;
                (Some(key), self.credentials.groq_base_url.clone())
            }
            // Local runtime, no credential.
            ModelPlatform::Ollama => (None, self.credentials.ollama_base_url.clone()),
        };

        Ok(ResolvedBackend::new(spec, api_key, base_url, temperature))
    }
}
