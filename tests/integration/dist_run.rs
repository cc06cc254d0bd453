//! Whole runs against a mock dist tree on disk.

use crate::bundle;
use openclaw_patcher::catalog::{self, builtin};
use openclaw_patcher::run::{run, run_observed, Mode};
use openclaw_patcher::target::{host_version, resolve_root, ExtensionFilter, FsTarget};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `<tmp>/package.json` plus `<tmp>/dist/...`, the layout of an npm install.
fn setup_install(version: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        format!(r#"{{ "name": "openclaw", "version": "{version}" }}"#),
    )
    .unwrap();

    let dist = dir.path().join("dist");
    fs::create_dir_all(dist.join("plugins")).unwrap();
    fs::write(dist.join("config-BfX2.js"), bundle::config_chunk()).unwrap();
    fs::write(dist.join("reply-Q9aL.js"), bundle::media_chunk()).unwrap();
    fs::write(dist.join("reply-Q9aL.js.map"), bundle::media_chunk()).unwrap();
    fs::write(dist.join("plugins/edited-7cKd.js"), bundle::nested_handler_chunk()).unwrap();
    fs::write(dist.join("vendor-0aa1.js"), bundle::vendor_chunk()).unwrap();
    dir
}

fn dist(install: &TempDir) -> PathBuf {
    install.path().join("dist")
}

fn snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().to_path_buf(), fs::read_to_string(e.path()).unwrap()))
        .collect();
    files.sort();
    files
}

#[test]
fn test_live_run_patches_dist() {
    let install = setup_install("2026.2.14");
    let root = dist(&install);
    let source = FsTarget::new(&root, ExtensionFilter::default()).unwrap();
    let catalog = builtin::openclaw().unwrap();

    let summary = run(&source, &catalog, Mode::Live).unwrap();

    assert_eq!(summary.units_examined, 4, "the .map file is not a unit");
    assert_eq!(summary.modified.len(), 3);
    assert!(summary.failures.is_empty());
    assert!(summary.near_misses.is_empty());

    let schema = summary.tally("config-schema").unwrap();
    assert_eq!((schema.applied, schema.not_applicable), (1, 3));
    let media = summary.tally("local-bot-api-url").unwrap();
    assert_eq!((media.applied, media.not_applicable), (6, 18));
    let file_id = summary.tally("file-id-injection").unwrap();
    assert_eq!((file_id.applied, file_id.not_applicable), (2, 2));

    let reply = fs::read_to_string(root.join("reply-Q9aL.js")).unwrap();
    assert!(reply.contains(builtin::MARKER_URL));
    let map = fs::read_to_string(root.join("reply-Q9aL.js.map")).unwrap();
    assert_eq!(map, bundle::media_chunk());
    let vendor = fs::read_to_string(root.join("vendor-0aa1.js")).unwrap();
    assert_eq!(vendor, bundle::vendor_chunk());
}

#[test]
fn test_rerun_changes_nothing() {
    let install = setup_install("2026.2.14");
    let root = dist(&install);
    let source = FsTarget::new(&root, ExtensionFilter::default()).unwrap();
    let catalog = builtin::openclaw().unwrap();

    run(&source, &catalog, Mode::Live).unwrap();
    let patched = snapshot(&root);

    let again = run(&source, &catalog, Mode::Live).unwrap();
    assert!(again.modified.is_empty());
    assert!(again.is_clean());
    assert_eq!(again.total_already_applied(), 9);
    assert_eq!(snapshot(&root), patched);
}

#[test]
fn test_simulate_reports_like_live_without_writing() {
    let simulated_install = setup_install("2026.2.14");
    let simulated_root = dist(&simulated_install);
    let pristine = snapshot(&simulated_root);
    let simulated = run(
        &FsTarget::new(&simulated_root, ExtensionFilter::default()).unwrap(),
        &builtin::openclaw().unwrap(),
        Mode::Simulate,
    )
    .unwrap();
    assert_eq!(snapshot(&simulated_root), pristine);

    let live_install = setup_install("2026.2.14");
    let live_root = dist(&live_install);
    let live = run(
        &FsTarget::new(&live_root, ExtensionFilter::default()).unwrap(),
        &builtin::openclaw().unwrap(),
        Mode::Live,
    )
    .unwrap();

    assert_eq!(simulated.phases, live.phases);
    let relative = |paths: &[PathBuf], root: &Path| -> Vec<PathBuf> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect()
    };
    assert_eq!(
        relative(&simulated.modified, &simulated_root),
        relative(&live.modified, &live_root)
    );
}

#[test]
fn test_observer_after_content_matches_disk() {
    let install = setup_install("2026.2.14");
    let root = dist(&install);
    let source = FsTarget::new(&root, ExtensionFilter::default()).unwrap();

    let mut seen = Vec::new();
    run_observed(&source, &builtin::openclaw().unwrap(), Mode::Live, |change| {
        seen.push((change.path.to_path_buf(), change.after.to_string()));
    })
    .unwrap();

    assert_eq!(seen.len(), 3);
    for (path, after) in seen {
        assert_eq!(fs::read_to_string(path).unwrap(), after);
    }
}

const GATED_CATALOG: &str = r#"
[meta]
name = "gated"

[[phases]]
id = "schema"
title = "Config schema"

[[phases]]
id = "future"
title = "Needs a newer host"
version_range = ">=2027.1.0"

[[rules]]
id = "schema-url"
phase = "schema"
anchor = "mediaMaxMb: z.number()"
search = "mediaMaxMb: z.number().positive().optional(),\n\ttimeoutSeconds:"
replacement = "mediaMaxMb: z.number().positive().optional(),\n\tlocalBotApiUrl: z.string().optional(),\n\ttimeoutSeconds:"
marker = "localBotApiUrl: z.string().optional()"

[[rules]]
id = "noop-rename"
phase = "future"
anchor = "export function noop"
search = "export function noop()"
replacement = "export function noop(_unused)"
marker = "noop(_unused)"
"#;

#[test]
fn test_phase_gated_by_host_version() {
    let install = setup_install("2026.2.14");
    let root = dist(&install);
    let catalog_path = install.path().join("gated.toml");
    fs::write(&catalog_path, GATED_CATALOG).unwrap();

    let full = catalog::load_from_path(&catalog_path).unwrap();
    let version = host_version(&root);
    assert_eq!(version.as_deref(), Some("2026.2.14"));

    let (gated, skipped) = catalog::gate(&full, version.as_deref()).unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].phase, "future");

    let source = FsTarget::new(&root, ExtensionFilter::default()).unwrap();
    let summary = run(&source, &gated, Mode::Live).unwrap();
    assert_eq!(summary.modified, vec![root.join("config-BfX2.js")]);
    assert!(summary.tally("future").is_none());
    assert_eq!(
        fs::read_to_string(root.join("vendor-0aa1.js")).unwrap(),
        bundle::vendor_chunk()
    );
}

#[test]
fn test_missing_root_aborts_before_any_unit() {
    let install = TempDir::new().unwrap();
    let candidates = vec![
        install.path().join("nvm/lib/node_modules/openclaw/dist"),
        install.path().join("usr/lib/node_modules/openclaw/dist"),
    ];
    let err = resolve_root(None, &candidates).unwrap_err();
    assert_eq!(err.probed, candidates);
}

#[cfg(unix)]
#[test]
fn test_unwritable_unit_does_not_stop_run() {
    use std::os::unix::fs::PermissionsExt;

    let install = setup_install("2026.2.14");
    let root = dist(&install);
    let locked = root.join("plugins");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores directory permissions; nothing to observe then.
    let canary = locked.join(".canary");
    if fs::write(&canary, "").is_ok() {
        fs::remove_file(&canary).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let source = FsTarget::new(&root, ExtensionFilter::default()).unwrap();
    let summary = run(&source, &builtin::openclaw().unwrap(), Mode::Live).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].path.ends_with("plugins/edited-7cKd.js"));
    assert_eq!(summary.modified.len(), 2);
}
