//! Yakusha - command-line entry point
//!
//! Loads the configuration, prepares accelerator library paths when an
//! in-process model is used, then drives the selected translation backend.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use yakusha::accelerator::{AcceleratorBootstrap, Platform, ProcessLoaderEnvironment};
use yakusha::cli::{Args, Commands};
use yakusha::config::{BackendKind, Config};
use yakusha::translate::{Translator, TranslatorFactory};

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args.command)?;

    // Search path changes must happen before the runtime spawns worker threads
    if uses_backend(&args.command)
        && config.translator.backend == BackendKind::LlamaCpp
        && config.accelerator.enabled
    {
        AcceleratorBootstrap::from_config(&config.accelerator).run(&mut ProcessLoaderEnvironment);
    }

    tokio::runtime::Runtime::new()?.block_on(run(args.command, config))
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Translate { text, .. } => {
            let mut translator = create_translator(&config)?;

            if text.is_empty() {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Some(line) = lines.next_line().await? {
                    println!("{}", translator.translate(&line).await?);
                }
            } else {
                for unit in &text {
                    println!("{}", translator.translate(unit).await?);
                }
            }
        }
        Commands::Check { .. } => {
            let mut translator = create_translator(&config)?;

            translator
                .load()
                .await
                .with_context(|| format!("{} backend is not usable", translator.name()))?;
            println!("{} backend ready: {}", translator.name(), translator.is_loaded());
        }
        Commands::AccelPaths => {
            let bootstrap = AcceleratorBootstrap::from_config(&config.accelerator)
                .on_platform(Platform::Windows);
            let set = bootstrap.discover()?;

            if set.is_empty() {
                println!("No accelerator library directories found.");
            } else {
                for path in set.iter() {
                    println!("{}", path.display());
                }
            }
            if !Platform::current().needs_explicit_registration() {
                println!("(registration is skipped on this platform)");
            }
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            info!("Wrote configuration to {}", output.display());
        }
    }

    Ok(())
}

fn uses_backend(command: &Commands) -> bool {
    matches!(command, Commands::Translate { .. } | Commands::Check { .. })
}

fn apply_overrides(config: &mut Config, command: &Commands) -> Result<()> {
    let (backend, target_language, model) = match command {
        Commands::Translate {
            backend,
            target_language,
            model,
            ..
        } => (backend, target_language, model),
        Commands::Check { backend } => (backend, &None, &None),
        _ => return Ok(()),
    };

    if let Some(backend) = backend {
        config.translator.backend = backend.parse::<BackendKind>().map_err(anyhow::Error::msg)?;
    }
    if let Some(language) = target_language {
        config.translator.target_language = language.clone();
    }
    if let Some(model) = model {
        match config.translator.backend {
            BackendKind::LlamaCpp => config.translator.llama_cpp.model_path = PathBuf::from(model),
            BackendKind::Ollama => config.translator.ollama.model = model.clone(),
        }
    }
    Ok(())
}

fn create_translator(config: &Config) -> Result<Box<dyn Translator>> {
    info!(
        "Using {} backend, translating to {}",
        config.translator.backend, config.translator.target_language
    );
    Ok(TranslatorFactory::create_translator(&config.translator)?)
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".yakusha").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "yakusha.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stdout carries translations, so console logs go to stderr
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
