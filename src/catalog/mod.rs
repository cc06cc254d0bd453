pub mod builtin;
pub mod gate;
pub mod loader;
pub mod schema;

pub use gate::{gate, parse_requirement, parse_version, SkippedPhase, VersionError};
pub use loader::{load_from_path, load_from_str, CatalogError, CatalogOrigin};
pub use schema::{
    Candidate, Catalog, Metadata, Phase, Rule, ValidationError, ValidationIssue,
};
