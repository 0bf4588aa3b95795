use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::OllamaConfig;
use crate::error::{Result, YakushaError};
use super::common::{build_remote_prompt, ChatMessage};
use super::{FailureStyle, Translation, Translator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// Model listing as returned by the daemon.
///
/// Accepts `{"models": [...]}` or a bare array, with entries carrying
/// `model`, only `name` (older daemons), or just a string. Other entries
/// are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ListingShape")]
pub struct ModelListing {
    pub models: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingShape {
    Wrapped {
        #[serde(default)]
        models: Vec<ModelEntry>,
    },
    Bare(Vec<ModelEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelEntry {
    Tagged { model: String },
    Named { name: String },
    Plain(String),
    Unrecognized(serde::de::IgnoredAny),
}

impl From<ListingShape> for ModelListing {
    fn from(shape: ListingShape) -> Self {
        let entries = match shape {
            ListingShape::Wrapped { models } => models,
            ListingShape::Bare(models) => models,
        };
        let models = entries
            .into_iter()
            .filter_map(|entry| match entry {
                ModelEntry::Tagged { model } => Some(model),
                ModelEntry::Named { name } => Some(name),
                ModelEntry::Plain(name) => Some(name),
                ModelEntry::Unrecognized(_) => None,
            })
            .collect();
        Self { models }
    }
}

/// The two daemon calls the adapter relies on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OllamaApi: Send + Sync {
    async fn list_models(&self) -> Result<ModelListing>;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// HTTP client for an ollama daemon
pub struct OllamaClient {
    client: Client,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl OllamaApi for OllamaClient {
    async fn list_models(&self) -> Result<ModelListing> {
        let url = format!("{}/api/tags", self.endpoint);
        debug!("Listing ollama models at: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| YakushaError::ConnectionUnavailable(format!("Failed to connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(YakushaError::ConnectionUnavailable(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| YakushaError::ConnectionUnavailable(format!("Failed to parse model listing: {}", e)))
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.endpoint);
        debug!("Sending chat request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| YakushaError::Generation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(YakushaError::Generation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| YakushaError::Generation(format!("Failed to parse response: {}", e)))
    }
}

/// Translates through a model served by a local ollama daemon
pub struct OllamaTranslator {
    config: OllamaConfig,
    target_language: String,
    api: Box<dyn OllamaApi>,
    /// Models reported by the daemon; present once connectivity is verified
    available_models: Option<Vec<String>>,
}

impl OllamaTranslator {
    pub fn new(config: OllamaConfig, target_language: &str) -> Result<Self> {
        let client = OllamaClient::new(&config.endpoint, Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_api(config, target_language, Box::new(client)))
    }

    pub fn with_api(config: OllamaConfig, target_language: &str, api: Box<dyn OllamaApi>) -> Self {
        Self {
            config,
            target_language: target_language.to_string(),
            api,
            available_models: None,
        }
    }

    pub fn available_models(&self) -> Option<&[String]> {
        self.available_models.as_deref()
    }

    fn chat_request(&self, text: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::user(build_remote_prompt(text, &self.target_language))],
            stream: false,
            options: self
                .config
                .temperature
                .map(|temperature| ChatOptions { temperature }),
        }
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn load(&mut self) -> Result<()> {
        if self.available_models.is_some() {
            return Ok(());
        }

        info!(model = %self.config.model, "loading ollama model");

        match self.api.list_models().await {
            Ok(listing) => {
                // The daemon pulls a missing model on the first chat call
                let present = listing.models.iter().any(|m| m == &self.config.model);
                debug!(model = %self.config.model, present, "ollama model lookup");
                info!(available_models = listing.models.len(), "ollama connection successful");
                self.available_models = Some(listing.models);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to connect to ollama");
                Err(match e {
                    YakushaError::ConnectionUnavailable(_) => e,
                    other => YakushaError::ConnectionUnavailable(other.to_string()),
                })
            }
        }
    }

    async fn try_translate(&mut self, text: &str) -> Result<Translation> {
        if text.trim().is_empty() {
            return Ok(Translation::Skipped);
        }

        if self.available_models.is_none() {
            self.load().await?;
        }

        let request = self.chat_request(text);

        match self.api.chat(request).await {
            Ok(response) => Ok(Translation::Translated(response.message.content.trim().to_string())),
            Err(e) => {
                error!(error = %e, "ollama translation failed");
                Ok(Translation::Failed(e.to_string()))
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.available_models.is_some()
    }

    fn failure_style(&self) -> FailureStyle {
        FailureStyle::Marked
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::common::Role;

    fn listing(names: &[&str]) -> ModelListing {
        ModelListing {
            models: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn translator_with(api: MockOllamaApi) -> OllamaTranslator {
        OllamaTranslator::with_api(OllamaConfig::default(), "Thai", Box::new(api))
    }

    #[test]
    fn test_listing_current_shape() {
        let parsed: ModelListing = serde_json::from_str(
            r#"{"models":[{"name":"gemma3:4b","model":"gemma3:4b","size":3338801804}]}"#,
        )
        .unwrap();
        assert_eq!(parsed, listing(&["gemma3:4b"]));
    }

    #[test]
    fn test_listing_legacy_shapes() {
        let named: ModelListing =
            serde_json::from_str(r#"{"models":[{"name":"llama3.2:3b"},{"name":"qwen2.5:7b"}]}"#)
                .unwrap();
        assert_eq!(named, listing(&["llama3.2:3b", "qwen2.5:7b"]));

        let bare: ModelListing = serde_json::from_str(r#"["gemma3:4b", {"model":"phi4"}]"#).unwrap();
        assert_eq!(bare, listing(&["gemma3:4b", "phi4"]));

        let empty: ModelListing = serde_json::from_str("{}").unwrap();
        assert!(empty.models.is_empty());
    }

    #[test]
    fn test_listing_skips_unrecognized_entries() {
        let parsed: ModelListing = serde_json::from_str(
            r#"{"models":[{"digest":"a80c4f17acd5"},{"model":"gemma3:4b"},{"name":7},null]}"#,
        )
        .unwrap();
        assert_eq!(parsed, listing(&["gemma3:4b"]));
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let translator = translator_with(MockOllamaApi::new());
        let json = serde_json::to_value(translator.chat_request("猫")).unwrap();

        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("options").is_none());
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models()
            .times(1)
            .returning(|| Ok(listing(&["gemma3:4b"])));

        let mut translator = translator_with(api);
        assert!(!translator.is_loaded());

        translator.load().await.unwrap();
        translator.load().await.unwrap();
        assert!(translator.is_loaded());
        assert_eq!(translator.available_models().unwrap(), ["gemma3:4b".to_string()]);
    }

    #[tokio::test]
    async fn test_load_does_not_require_model_present() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models().returning(|| Ok(listing(&[])));

        let mut translator = translator_with(api);
        translator.load().await.unwrap();
        assert!(translator.is_loaded());
    }

    #[tokio::test]
    async fn test_unreachable_daemon() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models()
            .returning(|| Err(YakushaError::Generation("connection refused".to_string())));
        api.expect_chat().times(0);

        let mut translator = translator_with(api);

        let err = translator.load().await.unwrap_err();
        assert!(matches!(err, YakushaError::ConnectionUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
        assert!(!translator.is_loaded());

        let err = translator.translate("こんにちは").await.unwrap_err();
        assert!(matches!(err, YakushaError::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_blank_input_skips_backend() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models().times(0);
        api.expect_chat().times(0);

        let mut translator = translator_with(api);
        assert_eq!(translator.translate("").await.unwrap(), "");
        assert_eq!(translator.translate("   ").await.unwrap(), "");
        assert!(!translator.is_loaded());
    }

    #[tokio::test]
    async fn test_translate_loads_and_trims() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models()
            .times(1)
            .returning(|| Ok(listing(&["gemma3:4b"])));
        api.expect_chat()
            .withf(|request| {
                request.model == "gemma3:4b"
                    && !request.stream
                    && request.messages.len() == 1
                    && request.messages[0].role == Role::User
                    && request.messages[0].content.contains("to Thai.")
                    && request.messages[0].content.ends_with("こんにちは")
            })
            .times(2)
            .returning(|_| {
                Ok(ChatResponse {
                    message: ChatMessage::assistant("  สวัสดี\n"),
                })
            });

        let mut translator = translator_with(api);
        assert_eq!(translator.translate("こんにちは").await.unwrap(), "สวัสดี");
        assert_eq!(translator.translate("こんにちは").await.unwrap(), "สวัสดี");
        assert!(translator.is_loaded());
    }

    #[tokio::test]
    async fn test_generation_failure_is_marked() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models().returning(|| Ok(listing(&["gemma3:4b"])));
        api.expect_chat()
            .returning(|_| Err(YakushaError::Generation("model runner crashed".to_string())));

        let mut translator = translator_with(api);
        let output = translator.translate("こんにちは").await.unwrap();

        assert!(output.starts_with("[Error: "));
        assert!(output.contains("Error:"));
        assert!(output.contains("model runner crashed"));
        assert!(output.ends_with(']'));
    }

    #[tokio::test]
    async fn test_temperature_option_forwarded() {
        let mut api = MockOllamaApi::new();
        api.expect_list_models().returning(|| Ok(listing(&[])));
        api.expect_chat()
            .withf(|request| request.options == Some(ChatOptions { temperature: 0.2 }))
            .returning(|_| {
                Ok(ChatResponse {
                    message: ChatMessage::assistant("ok"),
                })
            });

        let config = OllamaConfig {
            temperature: Some(0.2),
            ..OllamaConfig::default()
        };
        let mut translator = OllamaTranslator::with_api(config, "Thai", Box::new(api));
        assert_eq!(translator.translate("はい").await.unwrap(), "ok");
    }
}
