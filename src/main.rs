use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use openclaw_patcher::catalog::{self, builtin};
use openclaw_patcher::report;
use openclaw_patcher::target::{self, ExtensionFilter, FsTarget};
use openclaw_patcher::{run_observed, Catalog, Mode, RunSummary};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openclaw-patcher")]
#[command(about = "Idempotent patches for the OpenClaw dist bundle", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// OpenClaw dist directory (auto-detected if not specified)
    #[arg(short = 'd', long)]
    dist_dir: Option<PathBuf>,

    /// Catalog file to use instead of the built-in one
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// File extensions treated as units
    #[arg(short, long = "ext", default_value = "js", num_args = 1..)]
    ext: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the catalog to the dist directory
    Apply {
        #[command(flatten)]
        target: TargetArgs,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(long)]
        diff: bool,
    },

    /// Check that every applicable patch is already in place
    Verify {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List phases and rules of the catalog
    List {
        /// Catalog file to use instead of the built-in one
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            target,
            dry_run,
            diff,
        } => cmd_apply(target, dry_run, diff),

        Commands::Verify { target } => cmd_verify(target),

        Commands::List { catalog } => cmd_list(catalog.as_deref()),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("openclaw_patcher={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => Ok(catalog::load_from_path(path)?),
        None => builtin::openclaw().context("built-in catalog is invalid"),
    }
}

/// Everything a run needs: root, unit source, gated catalog.
struct Prepared {
    root: PathBuf,
    host_version: Option<String>,
    source: FsTarget,
    catalog: Catalog,
    skipped: Vec<catalog::SkippedPhase>,
}

fn prepare(args: &TargetArgs) -> Result<Prepared> {
    let full = load_catalog(args.catalog.as_deref())?;

    let candidates = if args.dist_dir.is_some() {
        Vec::new()
    } else {
        target::discover_candidates()
    };
    let root = target::resolve_root(args.dist_dir.as_deref(), &candidates)?;
    let host_version = target::host_version(&root);

    let (catalog, skipped) = match catalog::gate(&full, host_version.as_deref()) {
        Ok(gated) => gated,
        Err(err) => {
            eprintln!(
                "{}",
                format!("Warning: {err}; treating host version as unknown").yellow()
            );
            catalog::gate(&full, None)?
        }
    };

    let source = FsTarget::new(root.clone(), ExtensionFilter::new(&args.ext))?;
    Ok(Prepared {
        root,
        host_version,
        source,
        catalog,
        skipped,
    })
}

fn execute(prepared: &Prepared, mode: Mode, show_diff: bool) -> Result<RunSummary> {
    let root = prepared.root.as_path();
    let mut summary = run_observed(&prepared.source, &prepared.catalog, mode, |change| {
        println!("{}", report::unit_line(root, change.path, mode));
        if show_diff {
            print!(
                "{}",
                report::unified_diff(root, change.path, change.before, change.after)
            );
        }
    })?;
    summary.skipped_phases = prepared.skipped.clone();
    Ok(summary)
}

fn cmd_apply(args: TargetArgs, dry_run: bool, show_diff: bool) -> Result<()> {
    let prepared = prepare(&args)?;
    let mode = Mode::from_dry_run(dry_run);

    println!(
        "{}",
        report::banner(&prepared.root, prepared.host_version.as_deref(), mode)
    );

    let summary = execute(&prepared, mode, show_diff)?;
    print!("{}", report::summary(&summary, &prepared.root));

    if !summary.failures.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_verify(args: TargetArgs) -> Result<()> {
    let prepared = prepare(&args)?;

    println!("{}", "Verifying patches...".bold());
    println!(
        "{}",
        report::banner(&prepared.root, prepared.host_version.as_deref(), Mode::Simulate)
    );

    let summary = execute(&prepared, Mode::Simulate, false)?;
    print!("{}", report::summary(&summary, &prepared.root));
    println!("\n{}", report::verdict(&summary));

    if !summary.is_clean() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    print!("{}", report::catalog_listing(&catalog));
    Ok(())
}
