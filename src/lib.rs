//! Yakusha - swappable Japanese translation backends
//!
//! Translates game and visual novel text from Japanese with either a
//! quantized GGUF model loaded in-process through llama.cpp, or a model
//! served by a local ollama daemon, behind one `Translator` trait.
//!
//! On Windows, call [`accelerator::setup_accelerator_paths`] once at startup
//! so GPU libraries installed as package payloads can be found by the loader.

pub mod accelerator;
pub mod cli;
pub mod config;
pub mod error;
pub mod translate;
