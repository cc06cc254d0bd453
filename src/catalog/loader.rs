use crate::catalog::schema::{Catalog, Metadata, Phase, Rule, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk catalog layout: `[meta]`, `[[phases]]`, `[[rules]]`.
#[derive(Debug, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    meta: Metadata,
    #[serde(default)]
    phases: Vec<Phase>,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Where a catalog's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOrigin {
    Inline,
    File(PathBuf),
}

impl fmt::Display for CatalogOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogOrigin::Inline => f.write_str("inline"),
            CatalogOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read rule catalog {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("rule catalog ({origin}) is not valid TOML: {error}")]
    Toml {
        origin: CatalogOrigin,
        #[source]
        error: toml_edit::de::Error,
    },
    #[error("invalid rule catalog ({origin}): {error}")]
    Validation {
        origin: CatalogOrigin,
        #[source]
        error: ValidationError,
    },
}

fn parse(input: &str, origin: CatalogOrigin) -> Result<Catalog, CatalogError> {
    let file: CatalogFile = match toml_edit::de::from_str(input) {
        Ok(file) => file,
        Err(error) => return Err(CatalogError::Toml { origin, error }),
    };
    Catalog::new(file.meta, file.phases, file.rules)
        .map_err(|error| CatalogError::Validation { origin, error })
}

pub fn load_from_str(input: &str) -> Result<Catalog, CatalogError> {
    parse(input, CatalogOrigin::Inline)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|error| CatalogError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    parse(&contents, CatalogOrigin::File(path.to_path_buf()))
}
