// Accelerator library path bootstrap
//
// GPU runtimes shipped as package payloads (e.g. nvidia-cudnn-cu12 wheels)
// land in `<package root>/nvidia/<component>/bin`, which the Windows loader
// never searches on its own. This module finds those directories and makes
// them visible to the loader before any accelerated runtime initializes.
//
// Discovery and environment mutation are separate steps so discovery can be
// exercised without touching process state.

pub mod loader;
pub mod site;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use loader::{LoaderEnvironment, ProcessLoaderEnvironment};
pub use site::{PackageRoots, PythonSiteLocator, SiteLocator, StaticSiteLocator};

use crate::config::AcceleratorConfig;
use crate::error::{Result, YakushaError};

/// Ordered, duplicate-free list of accelerator library directories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorLibrarySet {
    paths: Vec<PathBuf>,
}

impl AcceleratorLibrarySet {
    fn insert(&mut self, path: PathBuf) -> bool {
        if self.paths.contains(&path) {
            return false;
        }
        self.paths.push(path);
        true
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    /// The discovered directories placed ahead of `existing`
    pub fn prepend_to(&self, existing: Option<&OsString>) -> Result<OsString> {
        let current: Vec<PathBuf> = match existing {
            Some(value) if !value.is_empty() => std::env::split_paths(value).collect(),
            _ => Vec::new(),
        };

        std::env::join_paths(self.paths.iter().chain(current.iter()))
            .map_err(|e| YakushaError::Bootstrap(format!("Cannot build search path: {}", e)))
    }
}

/// Platform families, by how their loader finds accelerator libraries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Loader only searches explicitly registered directories
    Windows,
    /// Accelerator libraries are discoverable by default
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Other
        }
    }

    pub fn needs_explicit_registration(self) -> bool {
        matches!(self, Self::Windows)
    }
}

fn dir_exists(path: &Path) -> io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Collect `<root>/<vendor_dir>/<component>/bin` directories.
///
/// Roots without a vendor directory and components without `bin` are
/// skipped. Order follows `roots`, then `components`; a directory reachable
/// from several roots appears once.
pub fn discover_accelerator_paths(
    roots: &[PathBuf],
    vendor_dir: &str,
    components: &[String],
) -> Result<AcceleratorLibrarySet> {
    let mut set = AcceleratorLibrarySet::default();

    for root in roots {
        let vendor = root.join(vendor_dir);
        if !dir_exists(&vendor)? {
            continue;
        }

        for component in components {
            let bin = vendor.join(component).join("bin");
            if dir_exists(&bin)? {
                let bin = std::path::absolute(&bin)?;
                if set.insert(bin.clone()) {
                    debug!(path = %bin.display(), "found accelerator library path");
                }
            }
        }
    }

    Ok(set)
}

/// Prepend `set` to the search path and register each directory with the
/// loader where supported. Per-directory registration failures are logged.
pub fn apply_accelerator_paths(
    set: &AcceleratorLibrarySet,
    env: &mut dyn LoaderEnvironment,
) -> Result<()> {
    if set.is_empty() {
        return Ok(());
    }

    let search_path = set.prepend_to(env.search_path().as_ref())?;
    env.set_search_path(search_path);

    if env.supports_directory_registration() {
        for path in set.iter() {
            if let Err(e) = env.register_directory(path) {
                warn!(path = %path.display(), error = %e, "failed to add dll directory");
            }
        }
    }

    Ok(())
}

/// One-shot startup step making accelerator libraries loadable
pub struct AcceleratorBootstrap {
    platform: Platform,
    locator: Box<dyn SiteLocator>,
    vendor_dir: String,
    components: Vec<String>,
}

impl AcceleratorBootstrap {
    pub fn new(config: &AcceleratorConfig, locator: Box<dyn SiteLocator>) -> Self {
        Self {
            platform: Platform::current(),
            locator,
            vendor_dir: config.vendor_dir.clone(),
            components: config.components.clone(),
        }
    }

    /// Explicit roots from the config win over asking the interpreter
    pub fn from_config(config: &AcceleratorConfig) -> Self {
        let locator: Box<dyn SiteLocator> = if config.package_roots.is_empty() {
            Box::new(PythonSiteLocator::new(&config.python))
        } else {
            Box::new(StaticSiteLocator::new(config.package_roots.clone()))
        };
        Self::new(config, locator)
    }

    pub fn on_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Discovery only; empty without enumerating anything on platforms that
    /// find accelerator libraries by default
    pub fn discover(&self) -> Result<AcceleratorLibrarySet> {
        if !self.platform.needs_explicit_registration() {
            return Ok(AcceleratorLibrarySet::default());
        }

        let roots = self.locator.package_roots()?.candidates();
        discover_accelerator_paths(&roots, &self.vendor_dir, &self.components)
    }

    /// Discover and apply. Never fails: any error leaves the environment
    /// as it was and is logged as a warning.
    pub fn run(&self, env: &mut dyn LoaderEnvironment) -> AcceleratorLibrarySet {
        if !self.platform.needs_explicit_registration() {
            return AcceleratorLibrarySet::default();
        }

        let set = match self.discover() {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "failed to setup cuda paths");
                return AcceleratorLibrarySet::default();
            }
        };

        if let Err(e) = apply_accelerator_paths(&set, env) {
            warn!(error = %e, "failed to setup cuda paths");
            return AcceleratorLibrarySet::default();
        }

        if set.is_empty() {
            debug!(count = 0, "no accelerator library paths found");
        } else {
            info!(count = set.len(), "configured cuda paths");
        }
        set
    }
}

/// Register accelerator library directories with the default settings.
/// Call once at startup, before any accelerated runtime is initialized.
pub fn setup_accelerator_paths() {
    setup_accelerator_paths_with(&AcceleratorConfig::default());
}

pub fn setup_accelerator_paths_with(config: &AcceleratorConfig) -> AcceleratorLibrarySet {
    if !Platform::current().needs_explicit_registration() {
        return AcceleratorLibrarySet::default();
    }
    AcceleratorBootstrap::from_config(config).run(&mut ProcessLoaderEnvironment)
}
