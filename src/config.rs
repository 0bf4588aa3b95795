use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, YakushaError};

// Default values for the in-process model
fn default_n_ctx() -> u32 {
    2048
}

fn default_n_gpu_layers() -> i32 {
    // -1 offloads every layer when an accelerator is present
    -1
}

fn default_max_tokens() -> u32 {
    256
}

fn default_local_temperature() -> f32 {
    0.3
}

fn default_stop_sequences() -> Vec<String> {
    crate::translate::common::default_stop_sequences()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub accelerator: AcceleratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Which backend adapter to construct
    #[serde(default)]
    pub backend: BackendKind,
    /// Free-form target language label inserted into prompts
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub llama_cpp: LlamaCppConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_target_language() -> String {
    "Thai".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Quantized GGUF model loaded in-process
    LlamaCpp,
    /// Model served by a local ollama daemon
    #[default]
    Ollama,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LlamaCpp => write!(f, "llama-cpp"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llama-cpp" | "llamacpp" | "llama" | "gguf" => Ok(Self::LlamaCpp),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Unknown translation backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaCppConfig {
    /// Path to the GGUF model file
    #[serde(default)]
    pub model_path: PathBuf,
    /// Context window in tokens
    #[serde(default = "default_n_ctx")]
    pub n_ctx: u32,
    /// Layers to place on the GPU, -1 for all of them
    #[serde(default = "default_n_gpu_layers")]
    pub n_gpu_layers: i32,
    /// Sampling temperature
    #[serde(default = "default_local_temperature")]
    pub temperature: f32,
    /// Maximum generated tokens per translation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Generation halts at the first of these substrings
    #[serde(default = "default_stop_sequences")]
    pub stop: Vec<String>,
}

impl Default for LlamaCppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            n_ctx: default_n_ctx(),
            n_gpu_layers: default_n_gpu_layers(),
            temperature: default_local_temperature(),
            max_tokens: default_max_tokens(),
            stop: default_stop_sequences(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama endpoint URL
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    /// Model name as known to the daemon (e.g. "gemma3:4b")
    #[serde(default = "default_ollama_model")]
    pub model: String,
    /// Transport timeout for a single request
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperature, daemon default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "gemma3:4b".to_string()
}

fn default_ollama_timeout() -> u64 {
    300
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// Run the library path bootstrap before loading an in-process model
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interpreter asked for its package installation roots
    #[serde(default = "default_python")]
    pub python: String,
    /// Vendor directory looked up under each package root
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: String,
    /// Components whose `bin` directory is registered, in lookup order
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    /// Explicit package roots; when non-empty the interpreter is not queried
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_roots: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_python() -> String {
    "python".to_string()
}

fn default_vendor_dir() -> String {
    "nvidia".to_string()
}

fn default_components() -> Vec<String> {
    vec![
        "cudnn".to_string(),
        "cublas".to_string(),
        "cuda_runtime".to_string(),
    ]
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            target_language: default_target_language(),
            llama_cpp: LlamaCppConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            python: default_python(),
            vendor_dir: default_vendor_dir(),
            components: default_components(),
            package_roots: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| YakushaError::Config(format!("Failed to read config file: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| YakushaError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| YakushaError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load the given file, else `config.toml` in the working directory, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new("config.toml");
                if local.exists() {
                    info!("Found config.toml in current directory, loading...");
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_tuning() {
        let config = Config::default();
        assert_eq!(config.translator.backend, BackendKind::Ollama);
        assert_eq!(config.translator.llama_cpp.n_ctx, 2048);
        assert_eq!(config.translator.llama_cpp.n_gpu_layers, -1);
        assert_eq!(config.translator.llama_cpp.max_tokens, 256);
        assert_eq!(
            config.translator.llama_cpp.stop,
            vec!["\n", "Japanese:", "Translation:"]
        );
        assert_eq!(
            config.accelerator.components,
            vec!["cudnn", "cublas", "cuda_runtime"]
        );
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [translator]
            backend = "llama-cpp"
            target_language = "Brazilian Portuguese"

            [translator.llama_cpp]
            model_path = "models/gemma-2-9b-it-Q4_K_M.gguf"
            "#,
        )
        .unwrap();

        assert_eq!(config.translator.backend, BackendKind::LlamaCpp);
        assert_eq!(config.translator.target_language, "Brazilian Portuguese");
        assert_eq!(config.translator.llama_cpp.temperature, 0.3);
        assert_eq!(config.translator.ollama.endpoint, "http://localhost:11434");
        assert!(config.accelerator.enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.translator.ollama.model = "qwen2.5:7b".to_string();
        config.accelerator.package_roots = vec![PathBuf::from("/opt/site-packages")];
        config.save_to_file(&path).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.translator.ollama.model, "qwen2.5:7b");
        assert_eq!(
            reloaded.accelerator.package_roots,
            vec![PathBuf::from("/opt/site-packages")]
        );
    }

    #[test]
    fn test_malformed_file_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[translator\nbackend = ").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, YakushaError::Toml(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("Llama-CPP".parse::<BackendKind>().unwrap(), BackendKind::LlamaCpp);
        assert!("m2m100".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::LlamaCpp.to_string(), "llama-cpp");
    }
}
