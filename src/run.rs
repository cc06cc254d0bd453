//! Run orchestrator - drives the applier over every unit and tallies outcomes.
//!
//! Units are independent: one unit's I/O failure is recorded and the run moves
//! on. Simulate and live runs execute the same applier calls and produce the
//! same tallies; only live runs persist.
//!
//! Two runs against the same dist tree at once race on each unit's
//! read-modify-write (last writer wins). Nothing here prevents that.

use crate::applier::{self, Outcome, RuleOutcome};
use crate::catalog::{Catalog, SkippedPhase};
use crate::target::{TargetError, UnitSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Evaluate every rule but persist nothing
    Simulate,
    /// Persist every unit a rule changed
    Live,
}

impl Mode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Mode::Simulate
        } else {
            Mode::Live
        }
    }

    pub fn is_live(self) -> bool {
        self == Mode::Live
    }
}

/// One text file being patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub path: PathBuf,
    pub content: String,
    pub modified: bool,
}

/// Per-phase outcome counters, counted per (unit, rule) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTally {
    pub phase: String,
    pub title: String,
    pub applied: usize,
    pub already_applied: usize,
    pub near_miss: usize,
    pub not_applicable: usize,
}

impl PhaseTally {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Applied { .. } => self.applied += 1,
            Outcome::AlreadyApplied => self.already_applied += 1,
            Outcome::NearMiss(_) => self.near_miss += 1,
            Outcome::NotApplicable => self.not_applicable += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearMiss {
    pub path: PathBuf,
    pub rule_id: String,
    pub phase: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Everything a reporter needs after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: Mode,
    pub units_examined: usize,
    /// In catalog phase order
    pub phases: Vec<PhaseTally>,
    /// Units changed (live) or that would change (simulate)
    pub modified: Vec<PathBuf>,
    pub near_misses: Vec<NearMiss>,
    pub failures: Vec<UnitFailure>,
    pub skipped_phases: Vec<SkippedPhase>,
}

impl RunSummary {
    fn new(mode: Mode, catalog: &Catalog) -> Self {
        Self {
            mode,
            units_examined: 0,
            phases: catalog
                .phases()
                .iter()
                .map(|phase| PhaseTally {
                    phase: phase.id().to_string(),
                    title: phase.title().to_string(),
                    ..PhaseTally::default()
                })
                .collect(),
            modified: Vec::new(),
            near_misses: Vec::new(),
            failures: Vec::new(),
            skipped_phases: Vec::new(),
        }
    }

    pub fn tally(&self, phase: &str) -> Option<&PhaseTally> {
        self.phases.iter().find(|tally| tally.phase == phase)
    }

    pub fn total_applied(&self) -> usize {
        self.phases.iter().map(|tally| tally.applied).sum()
    }

    pub fn total_already_applied(&self) -> usize {
        self.phases.iter().map(|tally| tally.already_applied).sum()
    }

    /// Nothing pending, no drift, no failures.
    pub fn is_clean(&self) -> bool {
        self.total_applied() == 0 && self.near_misses.is_empty() && self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to enumerate units: {0}")]
    Listing(#[source] TargetError),
}

/// A unit whose content the rules changed.
#[derive(Debug, Clone, Copy)]
pub struct UnitChange<'a> {
    pub path: &'a Path,
    pub before: &'a str,
    pub after: &'a str,
}

/// Run `catalog` over every unit of `source`.
pub fn run<S>(source: &S, catalog: &Catalog, mode: Mode) -> Result<RunSummary, RunError>
where
    S: UnitSource + ?Sized,
{
    run_observed(source, catalog, mode, |_| {})
}

/// Like [`run`], calling `observer` for each unit that changed (after it was
/// persisted, in live mode).
pub fn run_observed<S, F>(
    source: &S,
    catalog: &Catalog,
    mode: Mode,
    mut observer: F,
) -> Result<RunSummary, RunError>
where
    S: UnitSource + ?Sized,
    F: FnMut(&UnitChange<'_>),
{
    let paths = source.list().map_err(RunError::Listing)?;
    let mut summary = RunSummary::new(mode, catalog);
    let phase_slots: HashMap<String, usize> = summary
        .phases
        .iter()
        .enumerate()
        .map(|(idx, tally)| (tally.phase.clone(), idx))
        .collect();

    tracing::debug!(units = paths.len(), rules = catalog.rules().len(), ?mode, "starting run");

    for path in paths {
        summary.units_examined += 1;

        let original = match source.read(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read unit");
                summary.failures.push(UnitFailure {
                    path,
                    error: err.to_string(),
                });
                continue;
            }
        };

        let application = applier::apply(&original, catalog.rules());
        for rule_outcome in &application.outcomes {
            record(&mut summary, &phase_slots, &path, rule_outcome);
        }

        let mut unit = Unit {
            path,
            content: application.content,
            modified: false,
        };
        if !application.outcomes.iter().any(|o| o.outcome.is_applied()) {
            continue;
        }

        if mode.is_live() {
            if let Err(err) = source.write(&unit.path, &unit.content) {
                tracing::warn!(path = %unit.path.display(), error = %err, "failed to write unit");
                summary.failures.push(UnitFailure {
                    path: unit.path,
                    error: err.to_string(),
                });
                continue;
            }
        }
        unit.modified = true;

        tracing::info!(path = %unit.path.display(), live = mode.is_live(), "unit patched");
        observer(&UnitChange {
            path: &unit.path,
            before: &original,
            after: &unit.content,
        });
        summary.modified.push(unit.path);
    }

    Ok(summary)
}

fn record(
    summary: &mut RunSummary,
    phase_slots: &HashMap<String, usize>,
    path: &Path,
    rule_outcome: &RuleOutcome,
) {
    if let Some(&slot) = phase_slots.get(&rule_outcome.phase) {
        summary.phases[slot].record(&rule_outcome.outcome);
    }

    match &rule_outcome.outcome {
        Outcome::NotApplicable => {}
        Outcome::NearMiss(message) => {
            tracing::warn!(
                path = %path.display(),
                rule = %rule_outcome.rule_id,
                "{message}"
            );
            summary.near_misses.push(NearMiss {
                path: path.to_path_buf(),
                rule_id: rule_outcome.rule_id.clone(),
                phase: rule_outcome.phase.clone(),
                message: message.clone(),
            });
        }
        Outcome::Applied { left_over, .. } if *left_over > 0 => {
            tracing::warn!(
                path = %path.display(),
                rule = %rule_outcome.rule_id,
                left_over,
                "rule applied to the first occurrence only; further occurrences left unpatched"
            );
        }
        outcome => {
            tracing::debug!(
                path = %path.display(),
                rule = %rule_outcome.rule_id,
                %outcome,
                "rule evaluated"
            );
        }
    }
}
