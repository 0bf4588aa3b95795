use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, error, info};

use crate::config::LlamaCppConfig;
use crate::error::{Result, YakushaError};
use super::common::{build_local_prompt, ChatMessage, GenerationParams, ModelParams};
use super::{FailureStyle, Translation, Translator};

/// A loaded in-process model able to answer one chat turn
#[cfg_attr(test, mockall::automock)]
pub trait ChatModel: Send {
    /// Generate the assistant reply for `messages`
    fn create_chat_completion(
        &mut self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String>;
}

/// Constructs a [`ChatModel`] from a model file
#[cfg_attr(test, mockall::automock)]
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path, params: &ModelParams) -> Result<Box<dyn ChatModel>>;
}

/// Loader used when the crate is built without the `llama-cpp` feature
#[cfg(not(feature = "llama-cpp"))]
struct UnsupportedLoader;

#[cfg(not(feature = "llama-cpp"))]
impl ModelLoader for UnsupportedLoader {
    fn load(&self, _path: &Path, _params: &ModelParams) -> Result<Box<dyn ChatModel>> {
        Err(YakushaError::ModelLoad(
            "built without llama-cpp support, enable the `llama-cpp` feature".to_string(),
        ))
    }
}

fn default_loader() -> Box<dyn ModelLoader> {
    #[cfg(feature = "llama-cpp")]
    {
        Box::new(super::llama_cpp::LlamaCppLoader)
    }
    #[cfg(not(feature = "llama-cpp"))]
    {
        Box::new(UnsupportedLoader)
    }
}

/// Translates with a GGUF model loaded in-process
pub struct LlamaCppTranslator {
    config: LlamaCppConfig,
    target_language: String,
    loader: Box<dyn ModelLoader>,
    model: Option<Box<dyn ChatModel>>,
}

impl LlamaCppTranslator {
    pub fn new(config: LlamaCppConfig, target_language: &str) -> Self {
        Self::with_loader(config, target_language, default_loader())
    }

    pub fn with_loader(
        config: LlamaCppConfig,
        target_language: &str,
        loader: Box<dyn ModelLoader>,
    ) -> Self {
        Self {
            config,
            target_language: target_language.to_string(),
            loader,
            model: None,
        }
    }

    fn model_params(&self) -> ModelParams {
        ModelParams {
            n_ctx: self.config.n_ctx,
            n_gpu_layers: self.config.n_gpu_layers,
        }
    }

    fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stop: self.config.stop.clone(),
        }
    }
}

#[async_trait]
impl Translator for LlamaCppTranslator {
    async fn load(&mut self) -> Result<()> {
        if self.model.is_some() {
            return Ok(());
        }

        let path = self.config.model_path.as_path();
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(YakushaError::ModelNotFound(path.display().to_string()));
        }

        info!(path = %path.display(), "loading llamacpp model");

        match self.loader.load(path, &self.model_params()) {
            Ok(model) => {
                self.model = Some(model);
                info!(path = %path.display(), "llamacpp model loaded");
                Ok(())
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load llamacpp model");
                Err(e)
            }
        }
    }

    async fn try_translate(&mut self, text: &str) -> Result<Translation> {
        if text.trim().is_empty() {
            return Ok(Translation::Skipped);
        }

        if self.model.is_none() {
            self.load().await?;
        }

        let messages = [ChatMessage::user(build_local_prompt(text, &self.target_language))];
        let params = self.generation_params();

        debug!(text = %text, "llamacpp translating");

        let Some(model) = self.model.as_mut() else {
            return Err(YakushaError::ModelLoad("model handle missing after load".to_string()));
        };

        match model.create_chat_completion(&messages, &params) {
            Ok(output) => {
                let result = output.trim().to_string();
                info!(result = %result, "llamacpp result");
                Ok(Translation::Translated(result))
            }
            Err(e) => {
                error!(error = %e, "llamacpp generation failed");
                Ok(Translation::Failed(e.to_string()))
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn failure_style(&self) -> FailureStyle {
        FailureStyle::Silent
    }

    fn name(&self) -> &str {
        "llama-cpp"
    }
}
