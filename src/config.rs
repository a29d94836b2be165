//! Environment-driven configuration.
//!
//! Credentials are read once at startup and passed explicitly to the
//! resolver, so concurrent requests never share mutable client state.

use std::env;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// API credentials and endpoints for the supported model platforms.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openai_base_url: String,
    pub groq_base_url: String,
    pub ollama_base_url: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            groq_api_key: None,
            openai_base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            groq_base_url: GROQ_DEFAULT_BASE_URL.to_string(),
            ollama_base_url: OLLAMA_DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Credentials {
    /// Load credentials from the environment, falling back to the public
    /// endpoint for each platform when no override is set.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            groq_api_key: non_empty_var("GROQ_API_KEY"),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| OPENAI_DEFAULT_BASE_URL.to_string()),
            groq_base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| GROQ_DEFAULT_BASE_URL.to_string()),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| OLLAMA_DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
