//! Target provider: where the host's dist lives and which files in it are units.

use crate::safety::{RootGuard, SafetyError};
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use walkdir::WalkDir;

/// Environment variable naming the dist directory explicitly.
pub const DIST_ENV: &str = "OPENCLAW_DIST";

const PACKAGE_DIST: &str = "lib/node_modules/openclaw/dist";

/// No candidate dist directory exists. Fatal for the whole run.
#[derive(Debug, Error)]
#[error("cannot locate the OpenClaw dist directory (probed: {})", ProbedList(.probed))]
pub struct RootNotFound {
    pub probed: Vec<PathBuf>,
}

struct ProbedList<'a>(&'a [PathBuf]);

impl fmt::Display for ProbedList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "nothing");
        }
        for (idx, path) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// Pick the dist root.
///
/// An explicit override always wins and must be a directory. Otherwise the
/// first candidate that is a directory wins.
pub fn resolve_root(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<PathBuf, RootNotFound> {
    if let Some(path) = explicit {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
        return Err(RootNotFound {
            probed: vec![path.to_path_buf()],
        });
    }

    candidates
        .iter()
        .find(|candidate| candidate.is_dir())
        .cloned()
        .ok_or_else(|| RootNotFound {
            probed: candidates.to_vec(),
        })
}

/// Conventional install locations, most specific first.
///
/// Order: `$OPENCLAW_DIST`, nvm installs (newest node first), the global npm
/// root, the prefix of the `openclaw` binary on `PATH`, then system prefixes.
pub fn discover_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = env::var_os(DIST_ENV).filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(dir));
    }
    if let Some(home) = home::home_dir() {
        candidates.extend(nvm_candidates(&home.join(".nvm/versions/node")));
    }
    if let Some(root) = npm_global_root() {
        candidates.push(root.join("openclaw/dist"));
    }
    if let Some(prefix) = openclaw_prefix() {
        candidates.push(prefix.join(PACKAGE_DIST));
    }
    candidates.push(PathBuf::from("/usr/local").join(PACKAGE_DIST));
    candidates.push(PathBuf::from("/usr").join(PACKAGE_DIST));

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|path| seen.insert(path.clone()));
    candidates
}

/// `<nvm>/<version>/lib/node_modules/openclaw/dist` for every installed node,
/// newest first.
fn nvm_candidates(nvm_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(nvm_dir) else {
        return Vec::new();
    };

    let mut versions: Vec<(Option<semver::Version>, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (crate::catalog::parse_version(&name).ok(), entry.path())
        })
        .collect();

    // Unparsable names sort last, then by path for stability.
    versions.sort_by(|(va, pa), (vb, pb)| vb.cmp(va).then_with(|| pa.cmp(pb)));
    versions
        .into_iter()
        .map(|(_, path)| path.join(PACKAGE_DIST))
        .collect()
}

fn npm_global_root() -> Option<PathBuf> {
    let output = Command::new("npm").args(["root", "-g"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!root.is_empty()).then(|| PathBuf::from(root))
}

/// Install prefix of the `openclaw` executable: `<prefix>/bin/openclaw`
/// usually links into `<prefix>/lib/node_modules/openclaw`.
fn openclaw_prefix() -> Option<PathBuf> {
    let output = Command::new("which").arg("openclaw").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let bin = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    let resolved = fs::canonicalize(&bin).unwrap_or(bin);
    // walk up to the prefix holding both `bin` and `lib/node_modules`
    resolved
        .ancestors()
        .find(|dir| dir.join("lib/node_modules").is_dir() && dir.join("bin").is_dir())
        .map(Path::to_path_buf)
}

/// Host version from `<root>/../package.json`, if readable.
pub fn host_version(root: &Path) -> Option<String> {
    // `.` and `dist/..` have no usable lexical parent
    let root = fs::canonicalize(root).ok()?;
    let manifest = root.parent()?.join("package.json");
    let raw = fs::read_to_string(&manifest).ok()?;
    let json: serde_json::Value = serde_json::from_str(&raw).ok()?;
    json.get("version")?.as_str().map(str::to_string)
}

/// File-extension predicate selecting which files are units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Extensions are matched case-sensitively, with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(["js"])
    }
}

/// Where units come from and where patched content goes.
pub trait UnitSource {
    /// Every unit path, in a stable order.
    fn list(&self) -> Result<Vec<PathBuf>, TargetError>;

    fn read(&self, path: &Path) -> Result<String, TargetError>;

    /// Replace the whole content of `path`.
    fn write(&self, path: &Path, content: &str) -> Result<(), TargetError>;
}

/// Units on disk under a dist root.
#[derive(Debug, Clone)]
pub struct FsTarget {
    root: PathBuf,
    filter: ExtensionFilter,
    guard: RootGuard,
}

impl FsTarget {
    pub fn new(root: impl Into<PathBuf>, filter: ExtensionFilter) -> Result<Self, TargetError> {
        let root = root.into();
        let guard = RootGuard::new(&root)?;
        Ok(Self {
            root,
            filter,
            guard,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl UnitSource for FsTarget {
    fn list(&self) -> Result<Vec<PathBuf>, TargetError> {
        let mut units = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(TargetError::Walk {
                        root: self.root.clone(),
                        source,
                    });
                }
                Err(source) => {
                    tracing::warn!(error = %source, "skipping unreadable entry");
                    continue;
                }
            };
            // a symlinked unit counts when it resolves to a file; `write`
            // still refuses targets outside the root
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if is_file && self.filter.matches(entry.path()) {
                units.push(entry.into_path());
            }
        }

        Ok(units)
    }

    fn read(&self, path: &Path) -> Result<String, TargetError> {
        fs::read_to_string(path).map_err(|source| TargetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), TargetError> {
        let checked = self.guard.validate_path(path)?;
        atomic_write(&checked, content.as_bytes()).map_err(|source| TargetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Atomic file write: tempfile + fsync + rename, keeping the original
/// file's permissions.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        )
    })?;

    let permissions = fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
