// Swappable translation backends
//
// Adapters are selected through a factory at configuration time:
// - LlamaCpp: quantized GGUF model running in-process
// - Ollama: model served by a local ollama daemon
//
// Both load lazily on the first translation and never share state.

pub mod common;
pub mod llama;
#[cfg(feature = "llama-cpp")]
pub mod llama_cpp;
pub mod ollama;

use async_trait::async_trait;

pub use common::*;
pub use llama::{ChatModel, LlamaCppTranslator, ModelLoader};
pub use ollama::{OllamaApi, OllamaClient, OllamaTranslator};

use crate::config::{BackendKind, TranslatorConfig};
use crate::error::Result;

/// Outcome of translating one text unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Backend produced a translation
    Translated(String),
    /// Input was blank, the backend was not consulted
    Skipped,
    /// Backend failed for this unit only
    Failed(String),
}

/// How an adapter renders a failed unit as plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStyle {
    /// Failure looks like no output
    Silent,
    /// Failure becomes a visible `[Error: ...]` marker
    Marked,
}

impl Translation {
    pub fn render(self, style: FailureStyle) -> String {
        match self {
            Self::Translated(text) => text,
            Self::Skipped => String::new(),
            Self::Failed(reason) => match style {
                FailureStyle::Silent => String::new(),
                FailureStyle::Marked => format!("[Error: {}]", reason),
            },
        }
    }
}

/// Main trait for translation backends
#[async_trait]
pub trait Translator: Send {
    /// Initialize the backend; later calls are no-ops once it succeeded
    async fn load(&mut self) -> Result<()>;

    /// Translate one source string, loading the backend on demand.
    ///
    /// Load failures are returned as errors. Generation failures are
    /// contained in [`Translation::Failed`].
    async fn try_translate(&mut self, text: &str) -> Result<Translation>;

    /// Whether the backend handle is present
    fn is_loaded(&self) -> bool;

    fn failure_style(&self) -> FailureStyle;

    fn name(&self) -> &str;

    /// Translate and render failures the way this backend signals them
    async fn translate(&mut self, text: &str) -> Result<String> {
        let style = self.failure_style();
        Ok(self.try_translate(text).await?.render(style))
    }
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create a translator for the configured backend
    pub fn create_translator(config: &TranslatorConfig) -> Result<Box<dyn Translator>> {
        match config.backend {
            BackendKind::LlamaCpp => Ok(Box::new(LlamaCppTranslator::new(
                config.llama_cpp.clone(),
                &config.target_language,
            ))),
            BackendKind::Ollama => Ok(Box::new(OllamaTranslator::new(
                config.ollama.clone(),
                &config.target_language,
            )?)),
        }
    }
}
