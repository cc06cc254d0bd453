//! Console reporter.
//!
//! Everything renders to a `String` so the binary decides where it goes;
//! colors follow `colored`'s global override (NO_COLOR, non-tty).

use crate::catalog::Catalog;
use crate::run::{Mode, RunSummary};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::path::Path;

const DIFF_CONTEXT: usize = 3;

/// Header printed before a run.
pub fn banner(root: &Path, host_version: Option<&str>, mode: Mode) -> String {
    Banner {
        root,
        host_version,
        mode,
    }
    .to_string()
}

/// One line per unit that changed.
pub fn unit_line(root: &Path, path: &Path, mode: Mode) -> String {
    let rel = relative(root, path);
    match mode {
        Mode::Simulate => format!("{} Would patch {}", "~".cyan(), rel),
        Mode::Live => format!("{} Patched {}", "✓".green(), rel),
    }
}

/// Unified diff of one unit, paths shown relative to `root`.
pub fn unified_diff(root: &Path, path: &Path, before: &str, after: &str) -> String {
    UnitDiff {
        rel: relative(root, path),
        before,
        after,
    }
    .to_string()
}

/// End-of-run summary. Always rendered, even when nothing applied.
pub fn summary(summary: &RunSummary, root: &Path) -> String {
    Summary { summary, root }.to_string()
}

/// `verify` verdict line.
pub fn verdict(summary: &RunSummary) -> String {
    let pending = summary.total_applied();
    if summary.is_clean() {
        return format!("{} All applicable patches are in place", "✓".green());
    }
    format!(
        "{} {} pending, {} near-miss, {} failed",
        "✗".red(),
        pending,
        summary.near_misses.len(),
        summary.failures.len()
    )
}

/// Phases and rules of a catalog, in application order.
pub fn catalog_listing(catalog: &Catalog) -> String {
    Listing(catalog).to_string()
}

struct Banner<'a> {
    root: &'a Path,
    host_version: Option<&'a str>,
    mode: Mode,
}

impl fmt::Display for Banner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OpenClaw dist: {}", self.root.display())?;
        writeln!(f, "Version: {}", self.host_version.unwrap_or("unknown"))?;
        match self.mode {
            Mode::Simulate => writeln!(f, "Mode: {}", "DRY RUN".cyan()),
            Mode::Live => writeln!(f, "Mode: LIVE"),
        }
    }
}

struct UnitDiff<'a> {
    rel: String,
    before: &'a str,
    after: &'a str,
}

impl fmt::Display for UnitDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", format!("--- {} (original)", self.rel).dimmed())?;
        writeln!(f, "{}", format!("+++ {} (patched)", self.rel).dimmed())?;

        let diff = TextDiff::from_lines(self.before, self.after);
        for hunk in diff.unified_diff().context_radius(DIFF_CONTEXT).iter_hunks() {
            writeln!(f, "{}", hunk.header().to_string().cyan())?;
            for change in hunk.iter_changes() {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{change}").red(),
                    ChangeTag::Insert => format!("+{change}").green(),
                    ChangeTag::Equal => format!(" {change}").normal(),
                };
                // `Change` supplies the newline a final line lacks
                write!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

struct Summary<'a> {
    summary: &'a RunSummary,
    root: &'a Path,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary;
        writeln!(f, "\n{}", "Summary:".bold())?;

        for tally in &summary.phases {
            writeln!(
                f,
                "  {:<28} {} applied, {} already applied, {} near-miss, {} not applicable",
                tally.title,
                tally.applied.to_string().green(),
                tally.already_applied.to_string().yellow(),
                tally.near_miss.to_string().red(),
                tally.not_applicable,
            )?;
        }
        for skipped in &summary.skipped_phases {
            writeln!(
                f,
                "  {} {} skipped ({})",
                "⊘".cyan(),
                skipped.phase,
                skipped.reason
            )?;
        }

        let verb = match summary.mode {
            Mode::Simulate => "would be patched",
            Mode::Live => "patched",
        };
        writeln!(
            f,
            "  {} unit(s) examined, {} {}",
            summary.units_examined,
            summary.modified.len(),
            verb
        )?;

        if !summary.near_misses.is_empty() {
            writeln!(f, "\n{}", "Near-misses (host output drifted):".yellow().bold())?;
            for miss in &summary.near_misses {
                writeln!(
                    f,
                    "  {} {}: {}",
                    "⚠".yellow(),
                    relative(self.root, &miss.path),
                    miss.message
                )?;
            }
        }

        if !summary.failures.is_empty() {
            writeln!(f, "\n{}", "Failures:".red().bold())?;
            for failure in &summary.failures {
                writeln!(
                    f,
                    "  {} {}: {}",
                    "✗".red(),
                    relative(self.root, &failure.path),
                    failure.error
                )?;
            }
        }

        f.write_str(hint(summary))
    }
}

fn hint(summary: &RunSummary) -> &'static str {
    if !summary.modified.is_empty() {
        return match summary.mode {
            Mode::Live => {
                "\nRestart the OpenClaw gateway to apply changes:\n  openclaw gateway restart\n"
            }
            Mode::Simulate => "\nRun again without --dry-run to apply.\n",
        };
    }
    if summary.total_already_applied() > 0 && summary.near_misses.is_empty() {
        return "\nAll patches already applied. Nothing to do.\n";
    }
    if summary.failures.is_empty() {
        return concat!(
            "\nNothing to patch: already patched or patterns not found.\n",
            "If you just ran `openclaw update`, the dist files may have changed.\n",
            "Check with --dry-run to diagnose.\n"
        );
    }
    ""
}

struct Listing<'a>(&'a Catalog);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catalog = self.0;
        if !catalog.meta().name.is_empty() {
            writeln!(f, "{}", catalog.meta().name.bold())?;
        }
        if let Some(description) = &catalog.meta().description {
            writeln!(f, "{}", description.dimmed())?;
        }

        for phase in catalog.phases() {
            let range = phase
                .version_range()
                .map(|range| format!(" [{range}]"))
                .unwrap_or_default();
            writeln!(f, "\n{} ({}){}", phase.title().bold(), phase.id(), range)?;
            for rule in catalog.rules_in(phase.id()) {
                let mut flags = Vec::new();
                if !rule.applies_once() {
                    flags.push("repeating".to_string());
                }
                if !rule.search_variants().is_empty() {
                    flags.push(format!("{} variant(s)", rule.search_variants().len()));
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", flags.join(", "))
                };
                writeln!(f, "  - {}{}", rule.id(), flags.dimmed())?;
                if let Some(description) = rule.description() {
                    writeln!(f, "      {description}")?;
                }
            }
        }
        Ok(())
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
