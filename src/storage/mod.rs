//! Storage path resolution for database targets.
//!
//! The host platform decides where relative database names live and,
//! optionally, where the engine should put temporary files.
use crate::core::Result;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Name of the transient in-memory database.
pub const MEMORY: &str = ":memory:";

/// Host collaborator that turns database names into absolute writable paths.
pub trait StorageLocator: Send + Sync {
    /// Resolves a caller-given database name to an absolute path.
    fn resolve(&self, name: &str) -> Result<PathBuf>;

    /// Directory the engine should use for temp files, if the host designates one.
    fn temp_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Resolves relative names against the platform's local data directory.
#[derive(Debug, Clone, Default)]
pub struct DataDirLocator {
    base: Option<PathBuf>,
    temp: Option<PathBuf>,
}

impl DataDirLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the base directory (the `[storage] data_dir` setting).
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_temp_dir(mut self, temp: impl Into<PathBuf>) -> Self {
        self.temp = Some(temp.into());
        self
    }

    fn base_dir(&self) -> Result<PathBuf> {
        if let Some(base) = &self.base {
            return Ok(base.clone());
        }
        match dirs::data_local_dir() {
            Some(dir) => Ok(dir),
            None => Ok(std::env::current_dir()?),
        }
    }
}

impl StorageLocator for DataDirLocator {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return Ok(normalize(path));
        }
        let resolved = normalize(&self.base_dir()?.join(path));
        debug!("Resolved database name {} to {:?}", name, resolved);
        Ok(resolved)
    }

    fn temp_dir(&self) -> Option<PathBuf> {
        self.temp.clone()
    }
}

/// Resolves relative names against a fixed directory.
#[derive(Debug, Clone)]
pub struct FixedDirLocator(pub PathBuf);

impl StorageLocator for FixedDirLocator {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        Ok(normalize(&self.0.join(name)))
    }
}

/// Lexically normalizes a path: drops `.` and folds `..` into its parent.
/// The file does not need to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_dots() {
        assert_eq!(
            normalize(Path::new("/data/./app/../shop.db")),
            PathBuf::from("/data/shop.db")
        );
    }

    #[test]
    fn test_fixed_dir_locator() {
        let locator = FixedDirLocator(PathBuf::from("/srv/db"));
        assert_eq!(
            locator.resolve("shop.db").unwrap(),
            PathBuf::from("/srv/db/shop.db")
        );
        assert_eq!(
            locator.resolve("sub/../shop.db").unwrap(),
            locator.resolve("shop.db").unwrap()
        );
        assert!(locator.temp_dir().is_none());
    }

    #[test]
    fn test_data_dir_locator_keeps_absolute_paths() {
        let locator = DataDirLocator::new().with_base("/var/lib/app");
        assert_eq!(
            locator.resolve("/tmp/x.db").unwrap(),
            PathBuf::from("/tmp/x.db")
        );
        assert_eq!(
            locator.resolve("x.db").unwrap(),
            PathBuf::from("/var/lib/app/x.db")
        );
    }
}
