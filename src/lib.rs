//! OpenClaw Patcher: idempotent text patches for a bundled JavaScript host.
//!
//! A [`Catalog`] of declarative find/replace rules, grouped into phases, is
//! applied to every unit (file) of a dist tree. Each rule carries an anchor
//! (precondition substring), one or more search candidates with their
//! replacements, and an idempotence marker that proves the rule already ran.
//!
//! # Architecture
//!
//! - [`applier::apply`] is pure: content in, content and per-rule outcomes out.
//! - [`run::run`] drives the applier over a [`target::UnitSource`] in
//!   simulate or live mode and collects a [`RunSummary`].
//! - [`target`] finds the dist root and reads/writes units on disk.
//! - [`report`] renders summaries and diffs for the console.
//!
//! # Safety
//!
//! - Nothing is written unless a rule applied
//! - Atomic file writes (tempfile + fsync + rename)
//! - Writes outside the dist root are refused
//! - Rerunning a catalog is a no-op
//!
//! # Example
//!
//! ```
//! use openclaw_patcher::{apply, Catalog, Metadata, Outcome, Phase, Rule};
//!
//! let catalog = Catalog::new(
//!     Metadata::default(),
//!     vec![Phase::new("calls", "Call sites")],
//!     vec![Rule::new("add-z", "calls", "call(", "call(x, y)", "call(x, y, z)")
//!         .marker("call(x, y, z)")
//!         .repeating()],
//! )
//! .unwrap();
//!
//! let first = apply("call(x, y); call(x, y);", catalog.rules());
//! assert_eq!(first.content, "call(x, y, z); call(x, y, z);");
//!
//! let second = apply(&first.content, catalog.rules());
//! assert_eq!(second.outcomes[0].outcome, Outcome::AlreadyApplied);
//! ```

pub mod applier;
pub mod catalog;
pub mod report;
pub mod run;
pub mod safety;
pub mod target;

// Re-exports
pub use applier::{apply, Application, Outcome, OutcomeKind, RuleOutcome};
pub use catalog::{
    load_from_path, load_from_str, Catalog, CatalogError, Metadata, Phase, Rule,
    ValidationError,
};
pub use run::{run, run_observed, Mode, RunError, RunSummary};
pub use safety::{RootGuard, SafetyError};
pub use target::{resolve_root, ExtensionFilter, FsTarget, RootNotFound, TargetError, UnitSource};
