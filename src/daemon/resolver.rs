//! Locating the daemon distribution for a requested version.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::bsp::config::APP_DIR;
use crate::utils::error::BridgeError;

/// Resolves a daemon version to the files making up its classpath.
#[async_trait]
pub trait DaemonResolver: Send + Sync {
    async fn resolve(&self, version: &str) -> Result<Vec<PathBuf>>;
}

/// Looks for `*.jar` files in `<root>/<version>/`.
pub struct LocalDistribution {
    root: PathBuf,
}

impl LocalDistribution {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data_dir>/bsp-bridge/daemon`, or a temp-dir fallback.
    pub fn default_root() -> PathBuf {
        dirs::data_dir().unwrap_or_else(std::env::temp_dir).join(APP_DIR).join("daemon")
    }

    fn scan(&self, version: &str) -> Result<Vec<PathBuf>, String> {
        if !is_single_component(version) {
            return Err("invalid version: must be a single path component".to_string());
        }
        let dir = self.root.join(version);
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| format!("cannot read {}: {e}", dir.display()))?;

        let mut jars: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "jar"))
            .collect();
        jars.sort();

        if jars.is_empty() {
            return Err(format!("no jar files in {}", dir.display()));
        }
        Ok(jars)
    }
}

/// Whether `version` names exactly one directory entry below the root.
fn is_single_component(version: &str) -> bool {
    let mut components = Path::new(version).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

impl Default for LocalDistribution {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

#[async_trait]
impl DaemonResolver for LocalDistribution {
    async fn resolve(&self, version: &str) -> Result<Vec<PathBuf>> {
        let jars = self.scan(version).map_err(|message| BridgeError::Resolution {
            version: version.to_string(),
            message,
        })?;
        tracing::debug!("Resolved daemon {version} to {} jar(s)", jars.len());
        Ok(jars)
    }
}
