use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use civic_config::{DEFAULT_GEMINI_API_KEY_ENV, InferenceConfig, InferenceProviderKind};
use serde_json::{Value, json};
use thiserror::Error;

mod tasks;

pub use tasks::{
    INSIGHTS_FALLBACK, RoutingDecision, RoutingSource, STATUS_REPLY_FALLBACK, fallback_department,
    report_insights, route_department, status_reply,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";
const MOCK_MODEL_NAME: &str = "mock";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOverrides {
    pub provider: Option<InferenceProviderKind>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Clone)]
pub struct LoadedProvider {
    pub provider: Arc<dyn AssistantProvider>,
    pub provider_name: String,
    pub model_name: String,
}

impl std::fmt::Debug for LoadedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProvider")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing Gemini API key in {0}")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Text-in, text-out generative assistant.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferError>;
}

/// Offline provider. Replies with a canned text when one is configured,
/// otherwise echoes the final instruction line of the prompt.
#[derive(Debug, Default, Clone)]
pub struct MockProvider {
    reply: Option<String>,
}

impl MockProvider {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }
}

#[async_trait]
impl AssistantProvider for MockProvider {
    async fn complete(&self, prompt: &str) -> Result<String, InferError> {
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }

        let last_line = prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        Ok(format!("[mock] {last_line}"))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn from_env_key(api_key_env: &str, model: Option<String>) -> Result<Self, InferError> {
        let api_key = read_env_non_empty(api_key_env)
            .ok_or_else(|| InferError::MissingApiKey(api_key_env.to_owned()))?;

        Ok(Self::new(api_key, resolve_gemini_model(model)))
    }

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            api_base: GEMINI_API_BASE.to_owned(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        )
    }
}

#[async_trait]
impl AssistantProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, InferError> {
        let body = json!({
            "contents": [
                {
                    "parts": [
                        {
                            "text": prompt
                        }
                    ]
                }
            ]
        });

        let response_value: Value = self
            .client
            .post(self.endpoint_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_gemini_text_part(&response_value).map(|text| text.trim().to_owned())
    }
}

/// Resolves the configured provider, with command-line overrides taking
/// precedence. `auto` picks Gemini only when the API key variable is set.
pub fn load_provider(
    config: &InferenceConfig,
    overrides: ProviderOverrides,
) -> Result<LoadedProvider, InferError> {
    let selected_provider = overrides.provider.unwrap_or(config.provider);
    let selected_model = first_non_empty(overrides.model, config.model.clone());
    let selected_api_key_env =
        first_non_empty(overrides.api_key_env, Some(config.api_key_env.clone()))
            .unwrap_or_else(|| DEFAULT_GEMINI_API_KEY_ENV.to_owned());

    match selected_provider {
        InferenceProviderKind::Auto => match read_env_non_empty(&selected_api_key_env) {
            Some(api_key) => Ok(gemini(GeminiProvider::new(
                api_key,
                resolve_gemini_model(selected_model),
            ))),
            None => Ok(mock()),
        },
        InferenceProviderKind::Mock => Ok(mock()),
        InferenceProviderKind::Gemini => Ok(gemini(GeminiProvider::from_env_key(
            &selected_api_key_env,
            selected_model,
        )?)),
    }
}

fn mock() -> LoadedProvider {
    LoadedProvider {
        provider: Arc::new(MockProvider::default()),
        provider_name: InferenceProviderKind::Mock.as_str().to_owned(),
        model_name: MOCK_MODEL_NAME.to_owned(),
    }
}

fn gemini(provider: GeminiProvider) -> LoadedProvider {
    LoadedProvider {
        model_name: provider.model().to_owned(),
        provider: Arc::new(provider),
        provider_name: InferenceProviderKind::Gemini.as_str().to_owned(),
    }
}

fn extract_gemini_text_part(response: &Value) -> Result<&str, InferError> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InferError::InvalidResponse("missing candidates[0].content.parts[0].text".to_owned())
        })
}

fn resolve_gemini_model(model: Option<String>) -> String {
    normalize_optional(model).unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_owned())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}

fn read_env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_env_name(tag: &str) -> String {
        format!(
            "CIVIC_TEST_{tag}_{}_{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        )
    }

    #[tokio::test]
    async fn mock_provider_echoes_final_instruction_or_canned_reply() {
        let echo = MockProvider::default()
            .complete("Context line\nAnswer briefly.\n\n")
            .await
            .expect("mock reply");
        assert_eq!(echo, "[mock] Answer briefly.");

        let canned = MockProvider::with_reply("Water")
            .complete("anything")
            .await
            .expect("canned reply");
        assert_eq!(canned, "Water");
    }

    #[test]
    fn load_provider_auto_chooses_mock_when_key_missing() {
        let config = InferenceConfig {
            api_key_env: unique_env_name("MISSING"),
            ..InferenceConfig::default()
        };

        let loaded = load_provider(&config, ProviderOverrides::default()).expect("load provider");
        assert_eq!(loaded.provider_name, InferenceProviderKind::Mock.as_str());
        assert_eq!(loaded.model_name, MOCK_MODEL_NAME);
    }

    #[test]
    fn load_provider_auto_chooses_gemini_when_key_present() {
        let env_name = unique_env_name("GEMINI_KEY");

        // SAFETY: test-scoped environment variable with unique name.
        unsafe {
            env::set_var(&env_name, "test-key");
        }

        let loaded = load_provider(
            &InferenceConfig::default(),
            ProviderOverrides {
                provider: Some(InferenceProviderKind::Auto),
                api_key_env: Some(env_name.clone()),
                ..ProviderOverrides::default()
            },
        )
        .expect("load provider");

        assert_eq!(loaded.provider_name, InferenceProviderKind::Gemini.as_str());
        assert_eq!(loaded.model_name, GEMINI_DEFAULT_MODEL);

        // SAFETY: cleanup of test-scoped environment variable.
        unsafe {
            env::remove_var(env_name);
        }
    }

    #[test]
    fn explicit_gemini_without_key_is_an_error() {
        let err = load_provider(
            &InferenceConfig::default(),
            ProviderOverrides {
                provider: Some(InferenceProviderKind::Gemini),
                api_key_env: Some(unique_env_name("ABSENT")),
                model: Some("gemini-custom".to_owned()),
            },
        )
        .expect_err("missing key");
        assert!(matches!(err, InferError::MissingApiKey(_)));
    }

    #[test]
    fn gemini_response_text_extraction() {
        let response = json!({
            "candidates": [
                { "content": { "parts": [ { "text": "Roads" } ] } }
            ]
        });
        assert_eq!(
            extract_gemini_text_part(&response).expect("text part"),
            "Roads"
        );
        assert!(matches!(
            extract_gemini_text_part(&json!({ "candidates": [] })),
            Err(InferError::InvalidResponse(_))
        ));
    }

    #[test]
    fn gemini_endpoint_embeds_model_and_key() {
        let provider = GeminiProvider::new("k".to_owned(), resolve_gemini_model(Some("  ".into())));
        assert_eq!(
            provider.endpoint_url(),
            format!("{GEMINI_API_BASE}/models/{GEMINI_DEFAULT_MODEL}:generateContent?key=k")
        );
    }
}
