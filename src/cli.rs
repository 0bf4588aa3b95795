use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate Japanese text, from arguments or one line at a time from stdin
    Translate {
        /// Text units to translate; stdin is read when none are given
        text: Vec<String>,

        /// Translation backend (llama-cpp or ollama)
        #[arg(short, long)]
        backend: Option<String>,

        /// Target language label, e.g. "Thai" or "Brazilian Portuguese"
        #[arg(short, long)]
        target_language: Option<String>,

        /// GGUF file for llama-cpp, model name for ollama
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Load the configured backend and report whether it is usable
    Check {
        /// Translation backend (llama-cpp or ollama)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Show the accelerator library directories that would be registered
    AccelPaths,

    /// Write the default configuration
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}
