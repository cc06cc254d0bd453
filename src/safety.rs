use std::path::{Path, PathBuf};
use thiserror::Error;

/// Write guard keeping persisted units inside the resolved dist root.
///
/// Dist trees are walked without following symlinks, but a unit path can
/// still resolve elsewhere (a symlinked file, a `..` component handed in by
/// another unit source). Every write is checked against the canonical root.
#[derive(Debug, Clone)]
pub struct RootGuard {
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside the dist root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RootGuard {
    /// Create a guard for `root`, canonicalizing it to resolve symlinks.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that `path` resolves inside the root.
    ///
    /// Relative paths are resolved against the root. Returns the canonical
    /// path on success.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = canonicalize(&absolute)?;
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }
        Ok(canonical)
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize()
        .map_err(|source| SafetyError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })
}
