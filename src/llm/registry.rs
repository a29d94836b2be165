//! Static model catalog.
//!
//! Every model the engine can talk to is declared here, with its platform,
//! default sampling temperature and capability tier. The registry is built
//! once at startup and never mutated; resolution happens per request.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported model platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPlatform {
    OpenAi,
    Groq,
    Ollama,
}

/// Model capability tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCapability {
    /// Complex reasoning tasks (SQL generation, analysis)
    Reasoning,
    /// General-purpose tasks
    General,
    /// Speed-optimized tasks
    Fast,
    /// Balance of speed and capability
    Balanced,
}

/// Configuration for a single model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSpec {
    pub name: &'static str,
    pub platform: ModelPlatform,
    pub display_name: &'static str,
    pub description: &'static str,
    pub capability: ModelCapability,
    pub temperature: f64,
    pub best_for: &'static [&'static str],
}

impl ModelSpec {
    /// Reasoning-tier OpenAI models reject caller temperatures and must run
    /// at their registry value.
    pub fn pins_temperature(&self) -> bool {
        self.platform == ModelPlatform::OpenAi && self.capability == ModelCapability::Reasoning
    }

    /// Effective temperature for a request, honoring temperature pinning.
    pub fn effective_temperature(&self, requested: Option<f64>) -> f64 {
        if self.pins_temperature() {
            self.temperature
        } else {
            requested.unwrap_or(self.temperature)
        }
    }
}

/// Model substituted when a requested model is unknown or fails to init.
pub const FALLBACK_MODEL: &str = "llama-3.1-8b-instant";

/// Engine tasks with a designated default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    SqlGeneration,
    DataAnalysis,
    Chat,
    Visualization,
}

/// Default model for a task.
pub fn default_model(task: Task) -> &'static str {
    match task {
        Task::SqlGeneration => "o1-mini",
        Task::DataAnalysis => "gpt-4o",
        Task::Chat => "gpt-4o-mini",
        Task::Visualization => "gpt-4o-mini",
    }
}

lazy_static! {
    static ref AVAILABLE_MODELS: HashMap<&'static str, ModelSpec> = {
        let specs = [
            ModelSpec {
                name: "o1",
                platform: ModelPlatform::OpenAi,
                display_name: "OpenAI o1",
                description: "Most advanced reasoning model for complex problem-solving",
                capability: ModelCapability::Reasoning,
                temperature: 1.0,
                best_for: &["Complex SQL queries", "Advanced data analysis", "Multi-step reasoning"],
            },
            ModelSpec {
                name: "o1-mini",
                platform: ModelPlatform::OpenAi,
                display_name: "OpenAI o1-mini",
                description: "Fast reasoning model optimized for STEM tasks",
                capability: ModelCapability::Reasoning,
                temperature: 1.0,
                best_for: &["SQL query generation", "Data validation", "Quick analysis"],
            },
            ModelSpec {
                name: "gpt-4o",
                platform: ModelPlatform::OpenAi,
                display_name: "GPT-4o",
                description: "Flagship model with high intelligence and multimodal capabilities",
                capability: ModelCapability::General,
                temperature: 0.0,
                best_for: &["Data analysis", "Complex queries", "Report generation"],
            },
            ModelSpec {
                name: "gpt-4o-mini",
                platform: ModelPlatform::OpenAi,
                display_name: "GPT-4o Mini",
                description: "Fast and cost-effective model for everyday tasks",
                capability: ModelCapability::Fast,
                temperature: 0.0,
                best_for: &["Chat responses", "Formatting results", "Quick queries"],
            },
            ModelSpec {
                name: "gpt-3.5-turbo",
                platform: ModelPlatform::OpenAi,
                display_name: "GPT-3.5 Turbo",
                description: "Legacy model, fast and cost-effective",
                capability: ModelCapability::Fast,
                temperature: 0.0,
                best_for: &["Simple queries", "Basic formatting"],
            },
            ModelSpec {
                name: "llama-3.1-8b-instant",
                platform: ModelPlatform::Groq,
                display_name: "Llama 3.1 8B",
                description: "Fast and efficient open-source model",
                capability: ModelCapability::Fast,
                temperature: 0.0,
                best_for: &["Quick responses", "Simple queries", "Fallback option"],
            },
            ModelSpec {
                name: "gemma2-9b-it",
                platform: ModelPlatform::Groq,
                display_name: "Gemma 2 9B",
                description: "Google's efficient instruction-tuned model",
                capability: ModelCapability::Balanced,
                temperature: 0.0,
                best_for: &["General queries", "Data formatting", "Visualization recommendations"],
            },
            ModelSpec {
                name: "mixtral-8x7b-32768",
                platform: ModelPlatform::Groq,
                display_name: "Mixtral 8x7B",
                description: "High-capability mixture-of-experts model",
                capability: ModelCapability::General,
                temperature: 0.0,
                best_for: &["Complex analysis", "Long context tasks"],
            },
        ];
        specs.into_iter().map(|s| (s.name, s)).collect()
    };
}

/// Look up a model by name.
pub fn spec(name: &str) -> Option<&'static ModelSpec> {
    AVAILABLE_MODELS.get(name)
}

/// Check whether a model name is in the registry.
pub fn is_known_model(name: &str) -> bool {
    AVAILABLE_MODELS.contains_key(name)
}

/// All model names for a platform.
pub fn models_by_platform(platform: ModelPlatform) -> Vec<&'static str> {
    let mut names: Vec<_> = AVAILABLE_MODELS
        .values()
        .filter(|s| s.platform == platform)
        .map(|s| s.name)
        .collect();
    names.sort();
    names
}

/// All model names with a capability tier.
pub fn models_by_capability(capability: ModelCapability) -> Vec<&'static str> {
    let mut names: Vec<_> = AVAILABLE_MODELS
        .values()
        .filter(|s| s.capability == capability)
        .map(|s| s.name)
        .collect();
    names.sort();
    names
}

/// Metadata for every registered model, for catalog listings.
pub fn available_models() -> Vec<serde_json::Value> {
    let mut specs: Vec<_> = AVAILABLE_MODELS.values().collect();
    specs.sort_by_key(|s| s.name);
    specs
        .into_iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name,
                "display_name": s.display_name,
                "description": s.description,
                "platform": s.platform,
                "capability": s.capability,
                "temperature": s.temperature,
                "best_for": s.best_for,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_model_is_registered() {
        assert!(is_known_model(FALLBACK_MODEL));
    }

    #[test]
    fn reasoning_models_pin_temperature() {
        let o1_mini = spec("o1-mini").unwrap();
        assert!(o1_mini.pins_temperature());
        assert_eq!(o1_mini.effective_temperature(Some(0.2)), 1.0);

        let gpt4o = spec("gpt-4o").unwrap();
        assert!(!gpt4o.pins_temperature());
        assert_eq!(gpt4o.effective_temperature(Some(0.7)), 0.7);
        assert_eq!(gpt4o.effective_temperature(None), 0.0);
    }

    #[test]
    fn platform_listing_covers_groq_models() {
        let groq = models_by_platform(ModelPlatform::Groq);
        assert!(groq.contains(&"llama-3.1-8b-instant"));
        assert!(groq.contains(&"gemma2-9b-it"));
        assert!(!groq.contains(&"gpt-4o"));
    }

    #[test]
    fn capability_listing_covers_reasoning_models() {
        assert_eq!(
            models_by_capability(ModelCapability::Reasoning),
            vec!["o1", "o1-mini"]
        );
        assert!(models_by_capability(ModelCapability::Fast).contains(&"gpt-4o-mini"));
    }

    #[test]
    fn task_defaults_are_known_models() {
        for task in [
            Task::SqlGeneration,
            Task::DataAnalysis,
            Task::Chat,
            Task::Visualization,
        ] {
            assert!(is_known_model(default_model(task)));
        }
    }
}
