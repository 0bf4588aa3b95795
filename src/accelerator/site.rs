use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use crate::error::{Result, YakushaError};

// Prints the interpreter's site-level and user-level package roots as JSON
const SITE_QUERY: &str = "import json, site; \
print(json.dumps({'site': site.getsitepackages(), 'user': site.getusersitepackages()}))";

/// Package installation roots to search for accelerator payloads
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageRoots {
    /// Site-level installation roots
    #[serde(default)]
    pub site: Vec<PathBuf>,
    /// User-level installation root, when the platform has one
    #[serde(default)]
    pub user: Option<PathBuf>,
}

impl PackageRoots {
    /// Site roots followed by the user root
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut roots = self.site.clone();
        if let Some(user) = &self.user {
            if !user.as_os_str().is_empty() {
                roots.push(user.clone());
            }
        }
        roots
    }
}

/// Source of package installation roots
#[cfg_attr(test, mockall::automock)]
pub trait SiteLocator: Send + Sync {
    fn package_roots(&self) -> Result<PackageRoots>;
}

/// Asks a Python interpreter where its packages live
pub struct PythonSiteLocator {
    interpreter: String,
}

impl PythonSiteLocator {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }
}

impl SiteLocator for PythonSiteLocator {
    fn package_roots(&self) -> Result<PackageRoots> {
        let output = Command::new(&self.interpreter)
            .arg("-c")
            .arg(SITE_QUERY)
            .output()
            .map_err(|e| {
                YakushaError::Bootstrap(format!("Failed to execute {}: {}", self.interpreter, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(YakushaError::Bootstrap(format!(
                "Package root query failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(interpreter = %self.interpreter, report = %stdout.trim(), "package roots reported");
        parse_site_report(&stdout)
    }
}

fn parse_site_report(report: &str) -> Result<PackageRoots> {
    Ok(serde_json::from_str(report.trim())?)
}

/// Fixed roots taken from configuration
pub struct StaticSiteLocator {
    roots: PackageRoots,
}

impl StaticSiteLocator {
    pub fn new(site: Vec<PathBuf>) -> Self {
        Self {
            roots: PackageRoots { site, user: None },
        }
    }
}

impl SiteLocator for StaticSiteLocator {
    fn package_roots(&self) -> Result<PackageRoots> {
        Ok(self.roots.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_site_report() {
        let roots = parse_site_report(
            r#"{"site": ["C:\\Python312", "C:\\Python312\\Lib\\site-packages"], "user": "C:\\Users\\me\\AppData\\Roaming\\Python\\Python312\\site-packages"}
"#,
        )
        .unwrap();

        assert_eq!(roots.site.len(), 2);
        assert_eq!(roots.candidates().len(), 3);
        assert_eq!(
            roots.candidates().last().unwrap(),
            &PathBuf::from("C:\\Users\\me\\AppData\\Roaming\\Python\\Python312\\site-packages")
        );
    }

    #[test]
    fn test_missing_user_root_is_skipped() {
        let roots = parse_site_report(r#"{"site": ["/usr/lib/python3/dist-packages"], "user": null}"#).unwrap();
        assert_eq!(roots.candidates(), vec![PathBuf::from("/usr/lib/python3/dist-packages")]);

        let roots = parse_site_report(r#"{"site": [], "user": ""}"#).unwrap();
        assert!(roots.candidates().is_empty());
    }

    #[test]
    fn test_garbage_report_is_an_error() {
        assert!(parse_site_report("Python 2.7.18").is_err());
    }

    #[test]
    fn test_static_locator() {
        let locator = StaticSiteLocator::new(vec![PathBuf::from("/opt/venv/lib/site-packages")]);
        let roots = locator.package_roots().unwrap();
        assert_eq!(roots.candidates(), vec![PathBuf::from("/opt/venv/lib/site-packages")]);
    }
}
