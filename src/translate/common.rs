use serde::{Deserialize, Serialize};

/// Label placed before the Japanese source in the local prompt
pub const SOURCE_LABEL: &str = "Japanese:";

/// Label the local model is asked to continue after
pub const TARGET_LABEL: &str = "Translation:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Role-tagged chat message, the shape both backends consume and produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request sampling parameters for the in-process runtime
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

/// Parameters the in-process runtime is constructed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelParams {
    pub n_ctx: u32,
    /// Negative means every layer
    pub n_gpu_layers: i32,
}

pub fn default_stop_sequences() -> Vec<String> {
    vec![
        "\n".to_string(),
        SOURCE_LABEL.to_string(),
        TARGET_LABEL.to_string(),
    ]
}

/// Single-turn prompt for the in-process model.
///
/// Instructions are inlined into the user turn: several instruction-tuned
/// families (Gemma in particular) drop or mangle a separate system role.
pub fn build_local_prompt(text: &str, target_language: &str) -> String {
    format!(
        "You are an honest professional translator who never changes the meaning of a sentence. \
         Translate the following Japanese text to {}. \
         Use a natural tone suitable for visual novels and games. Keep honorifics where present. \
         Output only the translated text, do not add any notes or explanations.\n\
         \n\
         {} {}\n\
         {}",
        target_language, SOURCE_LABEL, text, TARGET_LABEL
    )
}

/// Single-turn prompt for the ollama daemon
pub fn build_remote_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following Japanese text to {}. \
         Only provide the translation, no explanations:\n\n{}",
        target_language, text
    )
}
