#![deny(missing_docs)]

//! # outfitter
//!
//! Converge a workstation to a declared end-state: a manifest names the apps
//! that must be installed, the config files that must be placed, and the
//! invariants that must hold; `capture` produces one from a reference
//! machine, `apply` makes a target machine match it, and every run is
//! recorded so it can be reported, diffed, verified, and reverted.
//!
//! This crate is the library: one `do_*` entry point per command, all
//! consuming a [`Session`][] assembled from a [`Config`][]. The CLI binary is
//! a thin envelope-printing shell over these.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use outfitter_schema::{
    Action, ActionStatus, Capabilities, DoctorCheck, DoctorReport, EventBody, Plan, RestoreAction,
    RestoreJournal, RunRecord, RunSummary,
};
use serde::Serialize;
use tracing::{info, warn};

pub mod bundle;
pub mod catalog;
pub mod driver;
pub mod errors;
pub mod events;
pub mod jsonc;
pub mod manifest;
pub mod paths;
pub mod planner;
pub mod pool;
pub mod restore;
pub mod revert;
pub mod sensitive;
pub mod state;
pub mod verify;

#[cfg(test)]
mod tests;

pub use errors::{OutfitterError, OutfitterResult};

use crate::catalog::Catalog;
use crate::driver::{DriverRegistry, PackageDriver};
use crate::events::{EventSink, EventsMode};
use crate::manifest::{LoadOptions, LoadedManifest, Manifest, VerifyCheck};
use crate::state::StateStore;

/// The version of this crate (stamped into envelopes and metadata)
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The platform tag app refs are keyed by on this host
pub fn host_platform() -> &'static str {
    if cfg!(windows) {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    }
}

/// Global config for commands
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the persisted state layout
    pub state_root: Utf8PathBuf,
    /// Where config modules live
    pub modules_dir: Utf8PathBuf,
    /// Where user-authored profiles live
    pub profiles_dir: Utf8PathBuf,
    /// Driver override (`None` picks the platform default)
    pub driver: Option<String>,
    /// Platform tag override (defaults to the host's)
    pub platform: String,
    /// Worker pool size for app installs
    pub parallel: usize,
    /// Whether to stream JSONL events
    pub events: EventsMode,
}

impl Config {
    /// A config rooted at the default state root
    pub fn new_default() -> OutfitterResult<Self> {
        let state_root = StateStore::default_root()?;
        Ok(Config {
            modules_dir: state_root.join("modules"),
            profiles_dir: state_root.join("manifests"),
            state_root,
            driver: None,
            platform: host_platform().to_owned(),
            parallel: 1,
            events: EventsMode::Off,
        })
    }
}

/// Per-command machinery: a minted run id, the state store, the catalog,
/// the driver registry, and the event sink
pub struct Session {
    /// The config this session was assembled from
    pub config: Config,
    /// The state layer
    pub state: StateStore,
    /// The module catalog (explicit store, not a global)
    pub catalog: Catalog,
    /// The drivers compiled into this build
    pub drivers: DriverRegistry,
    /// This command's run id
    pub run_id: String,
    /// This command's event sink
    pub sink: EventSink,
    /// Cooperative interrupt flag the worker pool honors
    pub interrupt: Arc<AtomicBool>,
}

impl Session {
    /// Assemble a session for one command execution
    pub fn new(config: Config) -> OutfitterResult<Self> {
        let state = StateStore::new(config.state_root.clone());
        state.ensure_layout()?;
        let run_id = state.new_run_id();
        let sink = EventSink::new(config.events, &run_id);
        Ok(Session {
            catalog: Catalog::new(config.modules_dir.clone()),
            drivers: DriverRegistry::new(),
            state,
            run_id,
            sink,
            interrupt: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    fn select_driver(&self) -> OutfitterResult<&dyn PackageDriver> {
        self.drivers.select(self.config.driver.as_deref())
    }

    fn load_manifest(&mut self, path: &Utf8Path) -> OutfitterResult<LoadedManifest> {
        manifest::load(path, &mut self.catalog, &LoadOptions::default())
    }

    fn record(
        &self,
        command: &str,
        dry_run: bool,
        manifest: Option<outfitter_schema::ManifestInfo>,
        actions: Vec<Action>,
        warnings: Vec<String>,
    ) -> RunRecord {
        let mut summary = RunSummary::default();
        for action in &actions {
            summary.record(action.status());
        }
        RunRecord {
            run_id: self.run_id.clone(),
            timestamp: state::now_utc(),
            command: command.to_owned(),
            dry_run,
            manifest,
            summary,
            actions,
            warnings,
            reverted_restore_run_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

/// Build and persist a plan for a manifest without executing anything
pub fn do_plan(session: &mut Session, manifest_path: &Utf8Path) -> OutfitterResult<Plan> {
    let loaded = session.load_manifest(manifest_path)?;
    let driver = session.select_driver()?;
    let observed = driver.list_installed()?;

    session.sink.phase("plan");
    let plan = planner::build_plan(
        &loaded,
        &observed,
        &planner::PlanInputs {
            driver: driver.name(),
            platform: &session.config.platform,
            run_id: &session.run_id,
            created_utc: &state::now_utc(),
        },
    );
    let plan_path = session.state.save_plan(&plan)?;
    session.sink.artifact("plan", plan_path.as_str());

    let record = session.record(
        "plan",
        false,
        Some(loaded.info()),
        vec![],
        plan.warnings.clone(),
    );
    session.state.save_run_record(&record)?;
    Ok(plan)
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Where an apply gets its action list from
#[derive(Debug, Clone)]
pub enum ApplySource {
    /// Plan a manifest now, then execute
    Manifest(Utf8PathBuf),
    /// Re-execute a previously persisted plan without re-querying the driver
    Plan(Utf8PathBuf),
}

/// Knobs for `apply` (and the executor `restore`/`verify` share)
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Report what would happen without doing it
    pub dry_run: bool,
    /// Execute restore actions (off by default: plan-visible, not run)
    pub enable_restore: bool,
    /// Bundle payload root, probed before the manifest dir for sources
    pub payload_root: Option<Utf8PathBuf>,
}

/// What an apply produced
#[derive(Debug)]
pub struct ApplyReport {
    /// The executed plan
    pub plan: Plan,
    /// The persisted run record
    pub record: RunRecord,
    /// Where the restore journal went, when one was written
    pub journal_path: Option<Utf8PathBuf>,
}

/// Execute a plan (fresh or reloaded) against the live system
pub fn do_apply(
    session: &mut Session,
    source: &ApplySource,
    opts: &ApplyOptions,
) -> OutfitterResult<ApplyReport> {
    let (plan, manifest_dir) = match source {
        ApplySource::Manifest(path) => {
            let loaded = session.load_manifest(path)?;
            let driver = session.select_driver()?;
            let observed = driver.list_installed()?;
            let plan = planner::build_plan(
                &loaded,
                &observed,
                &planner::PlanInputs {
                    driver: driver.name(),
                    platform: &session.config.platform,
                    run_id: &session.run_id,
                    created_utc: &state::now_utc(),
                },
            );
            session.state.save_plan(&plan)?;
            (plan, loaded.dir.clone())
        }
        ApplySource::Plan(path) => {
            let plan = StateStore::load_plan_file(path)?;
            let manifest_dir = plan
                .manifest
                .as_ref()
                .and_then(|m| Utf8Path::new(&m.path).parent().map(|p| p.to_owned()))
                .unwrap_or_else(|| Utf8PathBuf::from("."));
            (plan, manifest_dir)
        }
    };

    let mut actions = plan.actions.clone();
    let mut warnings = plan.warnings.clone();

    execute_apps(session, &mut actions, opts)?;
    let journal_path = execute_restores(session, &mut actions, &manifest_dir, opts, &mut warnings)?;
    execute_verifies(session, &mut actions, opts.dry_run)?;

    let record = session.record(
        "apply",
        opts.dry_run,
        plan.manifest.clone(),
        actions,
        warnings,
    );
    session.state.save_run_record(&record)?;
    session.sink.summary(&record.summary);
    Ok(ApplyReport {
        plan,
        record,
        journal_path,
    })
}

/// Drive the app actions through the worker pool
fn execute_apps(
    session: &Session,
    actions: &mut [Action],
    opts: &ApplyOptions,
) -> OutfitterResult<()> {
    session.sink.phase("apps");

    let mut jobs = vec![];
    for (index, action) in actions.iter_mut().enumerate() {
        let Action::App(app) = action else { continue };
        match app.status {
            ActionStatus::Skip => {
                // dry-run accounting counts an already-installed app as a
                // success; a real apply counts it as skipped
                app.status = if opts.dry_run {
                    ActionStatus::DryRun
                } else {
                    ActionStatus::Skipped
                };
            }
            ActionStatus::Install => {
                if opts.dry_run {
                    app.status = ActionStatus::DryRun;
                } else {
                    jobs.push(pool::InstallJob {
                        index,
                        id: app.id.clone(),
                        package_ref: app.package_ref.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    if jobs.is_empty() {
        return Ok(());
    }

    let driver = session.select_driver()?;
    let results = pool::run_installs(
        jobs,
        driver,
        session.config.parallel,
        &session.sink,
        &session.interrupt,
    );
    for (index, outcome) in results {
        if let Action::App(app) = &mut actions[index] {
            if outcome.success {
                app.status = ActionStatus::Success;
            } else {
                app.status = ActionStatus::Failed;
                app.error = outcome.error;
            }
        }
    }
    Ok(())
}

/// Drive the restore actions sequentially in plan order
fn execute_restores(
    session: &Session,
    actions: &mut [Action],
    manifest_dir: &Utf8Path,
    opts: &ApplyOptions,
    warnings: &mut Vec<String>,
) -> OutfitterResult<Option<Utf8PathBuf>> {
    let restore_indices: Vec<usize> = actions
        .iter()
        .enumerate()
        .filter(|(_, a)| matches!(a, Action::Restore(_)))
        .map(|(i, _)| i)
        .collect();
    if restore_indices.is_empty() {
        return Ok(None);
    }
    session.sink.phase("restore");

    if !opts.enable_restore {
        for index in restore_indices {
            if let Action::Restore(r) = &mut actions[index] {
                r.status = ActionStatus::Skipped;
                r.reason = Some("restore not enabled".to_owned());
            }
        }
        return Ok(None);
    }

    let ctx = restore::RestoreContext {
        run_id: &session.run_id,
        manifest_dir,
        payload_root: opts.payload_root.as_deref(),
        state: &session.state,
        dry_run: opts.dry_run,
        elevated: restore::process_is_elevated(),
    };

    let mut entries = vec![];
    for index in restore_indices {
        let Action::Restore(action) = &actions[index] else {
            continue;
        };
        let item = restore_item_from_action(action);
        let outcome = restore::apply_item(&item, &ctx);
        warnings.extend(outcome.warnings.clone());

        if let Action::Restore(action) = &mut actions[index] {
            apply_entry_to_action(action, &outcome, opts.dry_run);
            session
                .sink
                .item("restore", serde_json::to_value(&*action).unwrap_or_default());
        }
        if !opts.dry_run {
            entries.push(outcome.entry);
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }
    let journal = RestoreJournal {
        run_id: session.run_id.clone(),
        manifest_path: Some(manifest_dir.to_string()),
        entries,
    };
    let journal_path = session.state.save_journal(&journal)?;
    session.sink.artifact("restore", journal_path.as_str());
    Ok(Some(journal_path))
}

/// Rebuild the manifest item a restore action was planned from; the plan
/// carries every executable field so `apply --plan` replays faithfully
fn restore_item_from_action(action: &RestoreAction) -> manifest::RestoreItem {
    manifest::RestoreItem {
        kind: action.restore_type,
        source: action.source.clone(),
        target: action.target.clone(),
        backup: action.backup,
        requires_admin: action.requires_admin,
        format: action.format,
        array_strategy: action.array_strategy,
        dedupe: action.dedupe,
        newline: action.newline,
        from_module: None,
    }
}

fn apply_entry_to_action(
    action: &mut RestoreAction,
    outcome: &restore::RestoreOutcome,
    dry_run: bool,
) {
    use outfitter_schema::JournalAction;
    action.warnings = outcome.warnings.clone();
    match outcome.entry.action {
        JournalAction::Restored => {
            action.status = if dry_run {
                ActionStatus::DryRun
            } else {
                ActionStatus::Success
            };
        }
        JournalAction::SkippedUpToDate => {
            action.status = if dry_run {
                ActionStatus::DryRun
            } else {
                ActionStatus::Skipped
            };
            action.reason = Some("up to date".to_owned());
        }
        JournalAction::SkippedMissingSource | JournalAction::Failed => {
            action.status = ActionStatus::Failed;
            action.error = outcome.entry.error.clone();
        }
    }
}

/// Drive the verify actions sequentially in plan order
fn execute_verifies(
    session: &Session,
    actions: &mut [Action],
    dry_run: bool,
) -> OutfitterResult<()> {
    let has_verifies = actions.iter().any(|a| matches!(a, Action::Verify(_)));
    if !has_verifies {
        return Ok(());
    }
    session.sink.phase("verify");

    for action in actions.iter_mut() {
        let Action::Verify(v) = action else { continue };
        if dry_run {
            v.status = ActionStatus::DryRun;
            continue;
        }
        let check = verify_check_from_action(v);
        match verify::check(&check) {
            Ok(outcome) => {
                v.message = Some(outcome.message);
                v.status = if outcome.success {
                    ActionStatus::Success
                } else {
                    ActionStatus::Failed
                };
            }
            Err(e) => {
                v.status = ActionStatus::Failed;
                v.error = Some(e.to_string());
            }
        }
        session
            .sink
            .item("verify", serde_json::to_value(&*v).unwrap_or_default());
    }
    Ok(())
}

fn verify_check_from_action(action: &outfitter_schema::VerifyAction) -> VerifyCheck {
    match action.verify_type {
        outfitter_schema::VerifyType::FileExists => VerifyCheck::FileExists {
            path: action.path.clone().unwrap_or_default(),
        },
        outfitter_schema::VerifyType::CommandExists => VerifyCheck::CommandExists {
            command: action.command.clone().unwrap_or_default(),
        },
        outfitter_schema::VerifyType::CommandSucceeds => VerifyCheck::CommandSucceeds {
            command: action.command.clone().unwrap_or_default(),
        },
    }
}

// ---------------------------------------------------------------------------
// restore / verify / revert
// ---------------------------------------------------------------------------

/// Execute only a manifest's restore items (requires `--enable-restore`)
pub fn do_restore(
    session: &mut Session,
    manifest_path: &Utf8Path,
    opts: &ApplyOptions,
) -> OutfitterResult<ApplyReport> {
    if !opts.enable_restore {
        return Err(OutfitterError::InvalidArgument {
            message: "restore requires --enable-restore".to_owned(),
            help: Some("pass --enable-restore to confirm file modifications".to_owned()),
        });
    }
    let loaded = session.load_manifest(manifest_path)?;
    let plan = planner::build_plan(
        &loaded,
        &BTreeSet::new(),
        &planner::PlanInputs {
            driver: "none",
            platform: &session.config.platform,
            run_id: &session.run_id,
            created_utc: &state::now_utc(),
        },
    );
    let mut actions: Vec<Action> = plan
        .actions
        .into_iter()
        .filter(|a| matches!(a, Action::Restore(_)))
        .collect();
    let mut warnings = plan.warnings;

    let journal_path =
        execute_restores(session, &mut actions, &loaded.dir, opts, &mut warnings)?;

    let record = session.record(
        "restore",
        opts.dry_run,
        Some(loaded.info()),
        actions,
        warnings,
    );
    session.state.save_run_record(&record)?;
    session.sink.summary(&record.summary);
    Ok(ApplyReport {
        plan: Plan {
            run_id: session.run_id.clone(),
            created_utc: state::now_utc(),
            driver: "none".to_owned(),
            platform: session.config.platform.clone(),
            manifest: Some(loaded.info()),
            actions: record.actions.clone(),
            summary: Default::default(),
            warnings: record.warnings.clone(),
        },
        record,
        journal_path,
    })
}

/// Check a manifest's verify items against the live system
pub fn do_verify(session: &mut Session, manifest_path: &Utf8Path) -> OutfitterResult<RunRecord> {
    let loaded = session.load_manifest(manifest_path)?;
    let plan = planner::build_plan(
        &loaded,
        &BTreeSet::new(),
        &planner::PlanInputs {
            driver: "none",
            platform: &session.config.platform,
            run_id: &session.run_id,
            created_utc: &state::now_utc(),
        },
    );
    let mut actions: Vec<Action> = plan
        .actions
        .into_iter()
        .filter(|a| matches!(a, Action::Verify(_)))
        .collect();

    execute_verifies(session, &mut actions, false)?;

    let record = session.record("verify", false, Some(loaded.info()), actions, plan.warnings);
    session.state.save_run_record(&record)?;
    session.sink.summary(&record.summary);
    Ok(record)
}

/// Undo a prior restore using its journal (the most recent one by default)
pub fn do_revert(
    session: &mut Session,
    restore_run_id: Option<&str>,
    dry_run: bool,
) -> OutfitterResult<RunRecord> {
    let journal = match restore_run_id {
        Some(id) => session.state.load_journal(id)?,
        None => session.state.load_latest_journal()?,
    };
    info!("reverting restore run {}", journal.run_id);
    session.sink.phase("revert");

    let results = revert::revert_journal(
        &journal,
        &revert::RevertContext {
            state: &session.state,
            run_id: &session.run_id,
            dry_run,
        },
    );

    let actions: Vec<Action> = results
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            Action::Restore(RestoreAction {
                id: format!("revert-{idx}"),
                restore_type: outfitter_schema::RestoreType::Copy,
                source: String::new(),
                target: r.target.clone(),
                backup: None,
                requires_admin: false,
                format: Default::default(),
                array_strategy: Default::default(),
                dedupe: false,
                newline: Default::default(),
                status: r.status,
                reason: Some(r.detail.clone()),
                error: None,
                warnings: vec![],
            })
        })
        .collect();

    let mut record = session.record("revert", dry_run, None, actions, vec![]);
    record.reverted_restore_run_id = Some(journal.run_id.clone());
    session.state.save_run_record(&record)?;
    session.sink.summary(&record.summary);
    Ok(record)
}

// ---------------------------------------------------------------------------
// capture
// ---------------------------------------------------------------------------

/// Knobs for `capture`
#[derive(Debug, Clone, Default)]
pub struct CaptureArgs {
    /// Profile name (locates the output under the profiles dir)
    pub profile: Option<String>,
    /// Explicit output path (overrides `profile`)
    pub out_manifest: Option<Utf8PathBuf>,
    /// Keep runtime/framework packages in the capture
    pub include_runtimes: bool,
    /// Keep store-distributed apps in the capture
    pub include_store_apps: bool,
    /// Emit the smallest useful manifest (no templates, no captured stamp)
    pub minimize: bool,
    /// Seed the captured manifest with an example restore item
    pub include_restore_template: bool,
    /// Seed the captured manifest with an example verify item
    pub include_verify_template: bool,
    /// Match installed apps against the module catalog
    pub discover: bool,
    /// Write an include template listing apps no module matched
    pub discover_write_manual_include: bool,
    /// Merge into an existing manifest instead of overwriting it
    pub update: bool,
    /// With `update`: drop apps whose refs are no longer installed
    pub prune_missing_apps: bool,
    /// Package matched config files into a bundle zip
    pub with_config: bool,
    /// Explicit module selection for `--with-config`
    pub config_modules: Vec<String>,
    /// Also stage the config payload into this directory
    pub payload_out: Option<Utf8PathBuf>,
}

/// What a capture produced
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    /// Where the manifest was written
    pub manifest_path: String,
    /// Apps captured
    pub app_count: usize,
    /// Module ids discovery matched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discovered_modules: Vec<String>,
    /// Bundle zip, when `--with-config` was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<String>,
    /// Non-fatal warnings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Observe the live system and write a profile for it
pub fn do_capture(session: &mut Session, args: &CaptureArgs) -> OutfitterResult<CaptureOutcome> {
    let driver = session.select_driver()?;
    session.sink.phase("capture");

    let export_dir = temp_dir::TempDir::new()?;
    let export_path = Utf8Path::from_path(export_dir.path())
        .expect("temp dirs are utf-8")
        .join("driver-export.json");
    let export = driver.export(&export_path)?;
    let mut warnings = export.warnings.clone();
    if export.refs.is_empty() {
        return Err(OutfitterError::CaptureEmpty {
            driver: driver.name().to_owned(),
        });
    }

    let mut refs: Vec<String> = export.refs;
    if !args.include_runtimes {
        refs.retain(|r| !looks_like_runtime(r));
    }
    if !args.include_store_apps {
        refs.retain(|r| !looks_like_store_app(r));
    }
    refs = refs.into_iter().unique().collect();

    let out_path = match (&args.out_manifest, &args.profile) {
        (Some(path), _) => path.clone(),
        (None, Some(name)) => session.config.profiles_dir.join(format!("{name}.jsonc")),
        (None, None) => {
            return Err(OutfitterError::InvalidArgument {
                message: "capture needs --profile or --out-manifest".to_owned(),
                help: Some("pass --profile <name> to write under the profiles dir".to_owned()),
            })
        }
    };

    let platform = session.config.platform.clone();
    let mut manifest = if args.update && out_path.exists() {
        let existing = manifest::load(
            &out_path,
            &mut session.catalog,
            &LoadOptions {
                skip_module_expansion: true,
            },
        )?;
        existing.manifest
    } else {
        Manifest {
            name: args
                .profile
                .clone()
                .unwrap_or_else(|| out_path.file_stem().unwrap_or("captured").to_owned()),
            ..Default::default()
        }
    };

    merge_captured_apps(&mut manifest, &refs, &platform, args.prune_missing_apps);
    if !args.minimize {
        manifest.captured = Some(state::now_utc());
    }

    if args.include_restore_template && manifest.restore.is_empty() {
        manifest.restore.push(manifest::RestoreItem {
            kind: outfitter_schema::RestoreType::Copy,
            source: "configs/example.json".to_owned(),
            target: "${home}/example.json".to_owned(),
            backup: Some(true),
            requires_admin: false,
            format: Default::default(),
            array_strategy: Default::default(),
            dedupe: false,
            newline: Default::default(),
            from_module: None,
        });
    }
    if args.include_verify_template && manifest.verify.is_empty() {
        manifest.verify.push(manifest::VerifyItem {
            check: VerifyCheck::CommandExists {
                command: "git".to_owned(),
            },
            from_module: None,
        });
    }

    let mut discovered = vec![];
    if args.discover {
        let matches = session
            .catalog
            .matches_for_apps(&refs, &catalog::Discoveries::default())?;
        for matched in &matches {
            discovered.push(matched.module_id.clone());
            if !manifest.config_modules.contains(&matched.module_id) {
                manifest.config_modules.push(matched.module_id.clone());
            }
        }
        if args.discover_write_manual_include {
            write_manual_include(session, &manifest, &refs, &matches, &platform)?;
        }
    }

    let manifest_json = serde_json::to_string_pretty(&serde_json::to_value(&manifest)?)?;
    axoasset::LocalAsset::write_new_all(&manifest_json, &out_path)?;
    session.sink.artifact("capture", out_path.as_str());
    info!("captured {} apps to {out_path}", manifest.apps.len());

    if let Some(payload_out) = &args.payload_out {
        let selection = if args.config_modules.is_empty() {
            manifest.config_modules.clone()
        } else {
            args.config_modules.clone()
        };
        let report = session.catalog.capture_files(&selection, payload_out)?;
        warnings.extend(report.warnings);
    }

    let mut bundle_path = None;
    if args.with_config {
        let loaded = session.load_manifest(&out_path)?;
        let zip_path = out_path.with_extension("zip");
        let report = bundle::create_bundle(
            &loaded,
            &zip_path,
            &refs,
            &mut session.catalog,
            CLI_VERSION,
            warnings.clone(),
        )?;
        session.sink.artifact("capture", report.zip_path.as_str());
        warnings.extend(report.capture.warnings);
        bundle_path = Some(report.zip_path.to_string());
    }

    let record = session.record("capture", false, None, vec![], warnings.clone());
    session.state.save_run_record(&record)?;

    Ok(CaptureOutcome {
        manifest_path: out_path.to_string(),
        app_count: manifest.apps.len(),
        discovered_modules: discovered,
        bundle_path,
        warnings,
    })
}

/// Fold observed refs into a manifest's app list, preserving authored entries
fn merge_captured_apps(
    manifest: &mut Manifest,
    refs: &[String],
    platform: &str,
    prune_missing: bool,
) {
    let observed: BTreeSet<&str> = refs.iter().map(|s| s.as_str()).collect();

    if prune_missing {
        manifest.apps.retain(|app| {
            app.ref_for(platform)
                .map(|r| observed.contains(r))
                .unwrap_or(true)
        });
    }

    let known: BTreeSet<String> = manifest
        .apps
        .iter()
        .filter_map(|a| a.ref_for(platform).map(|r| r.to_owned()))
        .collect();
    let mut used_ids: BTreeSet<String> = manifest.apps.iter().map(|a| a.id.clone()).collect();
    for package_ref in refs {
        if known.contains(package_ref) {
            continue;
        }
        // prefer the short slug; disambiguate with the full ref when taken
        let mut id = slug_for_ref(package_ref);
        if used_ids.contains(&id) {
            id = slugify(package_ref);
        }
        used_ids.insert(id.clone());
        let mut app = manifest::AppEntry {
            id,
            ..Default::default()
        };
        app.refs.insert(platform.to_owned(), package_ref.clone());
        manifest.apps.push(app);
    }
}

/// Derive an app slug from a package ref (`Git.Git` → `git`)
fn slug_for_ref(package_ref: &str) -> String {
    let last = package_ref
        .rsplit(['.', '/'])
        .next()
        .unwrap_or(package_ref);
    slugify(last)
}

fn slugify(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug.trim_matches('-').to_owned()
}

/// Heuristic for runtime/framework packages nobody lists in a profile
fn looks_like_runtime(package_ref: &str) -> bool {
    let lower = package_ref.to_ascii_lowercase();
    lower.contains("vcredist")
        || lower.contains(".dotnet")
        || lower.contains("windowsappruntime")
        || lower.contains("edgewebview")
        || lower.ends_with("runtime")
}

/// Heuristic for store-distributed apps (opaque store ids, not `Vendor.App`)
fn looks_like_store_app(package_ref: &str) -> bool {
    package_ref.len() >= 10
        && !package_ref.contains('.')
        && package_ref.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Write an include template listing apps discovery couldn't match
fn write_manual_include(
    session: &Session,
    manifest: &Manifest,
    refs: &[String],
    matches: &[catalog::ModuleMatch],
    platform: &str,
) -> OutfitterResult<()> {
    // refs some module claimed via a winget pattern
    let matched_refs: BTreeSet<&str> = matches
        .iter()
        .flat_map(|m| m.reasons.iter())
        .filter(|r| r.field == "winget")
        .map(|r| r.value.as_str())
        .collect();
    let unmatched: Vec<&String> = refs
        .iter()
        .filter(|r| !matched_refs.contains(r.as_str()))
        .collect();

    let mut fragment = Manifest {
        name: format!("{}-manual", manifest.name),
        ..Default::default()
    };
    for package_ref in unmatched {
        let mut app = manifest::AppEntry {
            id: slug_for_ref(package_ref),
            ..Default::default()
        };
        app.refs.insert(platform.to_owned(), package_ref.clone());
        fragment.apps.push(app);
    }
    let dir = session.config.profiles_dir.join("includes");
    let path = dir.join(format!("{}-manual.jsonc", manifest.name));
    let json = serde_json::to_string_pretty(&serde_json::to_value(&fragment)?)?;
    axoasset::LocalAsset::write_new_all(&json, &path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// report / diff / doctor / validate / capabilities
// ---------------------------------------------------------------------------

/// Which run records `report` should render
#[derive(Debug, Clone)]
pub enum ReportSelector {
    /// One specific run
    RunId(String),
    /// The newest run
    Latest,
    /// The N newest runs
    LastN(usize),
}

/// Load the run records a selector names, newest first
pub fn do_report(session: &Session, selector: &ReportSelector) -> OutfitterResult<Vec<RunRecord>> {
    match selector {
        ReportSelector::RunId(id) => Ok(vec![session.state.load_run_record(id)?]),
        ReportSelector::Latest => match session.state.load_latest_run_record()? {
            Some(record) => Ok(vec![record]),
            None => Ok(vec![]),
        },
        ReportSelector::LastN(n) => session.state.load_last_run_records(*n),
    }
}

/// What changed between two manifests
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    /// App ids present in B but not A
    pub apps_added: Vec<String>,
    /// App ids present in A but not B
    pub apps_removed: Vec<String>,
    /// Restore item count delta (B minus A)
    pub restore_delta: i64,
    /// Verify item count delta (B minus A)
    pub verify_delta: i64,
    /// Whether the expanded documents hash identically
    pub identical: bool,
    /// Unified text diff of the canonical forms
    pub text_diff: String,
}

/// Compare two manifests semantically and textually
pub fn do_diff(
    session: &mut Session,
    file_a: &Utf8Path,
    file_b: &Utf8Path,
) -> OutfitterResult<DiffReport> {
    let a = session.load_manifest(file_a)?;
    let b = session.load_manifest(file_b)?;

    let ids_a: BTreeSet<&str> = a.manifest.app_ids().collect();
    let ids_b: BTreeSet<&str> = b.manifest.app_ids().collect();

    let canon_a = pretty_canonical(&a.manifest)?;
    let canon_b = pretty_canonical(&b.manifest)?;
    let text_diff = similar::TextDiff::from_lines(&canon_a, &canon_b)
        .unified_diff()
        .header(file_a.as_str(), file_b.as_str())
        .to_string();

    Ok(DiffReport {
        apps_added: ids_b.difference(&ids_a).map(|s| s.to_string()).collect(),
        apps_removed: ids_a.difference(&ids_b).map(|s| s.to_string()).collect(),
        restore_delta: b.manifest.restore.len() as i64 - a.manifest.restore.len() as i64,
        verify_delta: b.manifest.verify.len() as i64 - a.manifest.verify.len() as i64,
        identical: a.expanded_hash == b.expanded_hash,
        text_diff,
    })
}

fn pretty_canonical(manifest: &Manifest) -> OutfitterResult<String> {
    let value = serde_json::to_value(manifest)?;
    Ok(serde_json::to_string_pretty(&manifest::canonicalize(&value))?)
}

/// Health-check the environment this tool depends on
pub fn do_doctor(session: &mut Session) -> OutfitterResult<DoctorReport> {
    let mut checks = vec![];

    let state_ok = session.state.ensure_layout().is_ok();
    checks.push(DoctorCheck {
        name: "state-root-writable".to_owned(),
        ok: state_ok,
        message: format!("state root {}", session.state.root()),
    });

    let driver_name = session
        .config
        .driver
        .clone()
        .unwrap_or_else(|| driver::DEFAULT_DRIVER.to_owned());
    let driver_ok = session
        .drivers
        .get(&driver_name)
        .map(|d| d.available())
        .unwrap_or(false);
    checks.push(DoctorCheck {
        name: "driver-available".to_owned(),
        ok: driver_ok,
        message: format!("driver '{driver_name}'"),
    });

    let module_count = session.catalog.len();
    match module_count {
        Ok(count) => {
            let warnings = session.catalog.warnings()?.len();
            checks.push(DoctorCheck {
                name: "catalog".to_owned(),
                ok: true,
                message: format!("{count} modules, {warnings} warnings"),
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "catalog".to_owned(),
            ok: false,
            message: e.to_string(),
        }),
    }

    checks.push(DoctorCheck {
        name: "profiles-dir".to_owned(),
        ok: session.config.profiles_dir.is_dir(),
        message: format!("profiles dir {}", session.config.profiles_dir),
    });

    checks.push(DoctorCheck {
        name: "elevation".to_owned(),
        ok: true,
        message: if restore::process_is_elevated() {
            "process is elevated".to_owned()
        } else {
            "process is not elevated (requiresAdmin items will fail)".to_owned()
        },
    });

    let ok = checks.iter().all(|c| c.ok);
    if !ok {
        warn!("doctor found problems");
    }
    Ok(DoctorReport { ok, checks })
}

/// What `validate-bundle` found
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleValidation {
    /// Whether everything checked out
    pub ok: bool,
    /// Contract violations
    pub errors: Vec<String>,
    /// Soft findings
    pub warnings: Vec<String>,
}

/// Validate a manifest (and optionally the bundle wrapping it)
pub fn do_validate_bundle(
    session: &mut Session,
    manifest_path: Option<&Utf8Path>,
    bundle_path: Option<&Utf8Path>,
) -> OutfitterResult<BundleValidation> {
    let mut errors = vec![];
    let mut warnings = vec![];

    if let Some(zip) = bundle_path {
        match bundle::expand_bundle(zip) {
            Ok(expanded) => {
                let validation = manifest::validate_profile(&expanded.manifest_path)?;
                errors.extend(validation.errors);
                warnings.extend(validation.warnings);
                if expanded.metadata.is_none() {
                    warnings.push("bundle has no metadata.json".to_owned());
                }
                expanded.cleanup()?;
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    if let Some(path) = manifest_path {
        let validation = manifest::validate_profile(path)?;
        let manifest_had_no_errors = validation.errors.is_empty();
        errors.extend(validation.errors);
        warnings.extend(validation.warnings);
        // a parseable manifest should also survive full expansion
        if manifest_had_no_errors {
            if let Err(e) = session.load_manifest(path) {
                errors.push(e.to_string());
            }
        }
    } else if bundle_path.is_none() {
        return Err(OutfitterError::InvalidArgument {
            message: "validate-bundle needs --manifest or --bundle".to_owned(),
            help: None,
        });
    }

    Ok(BundleValidation {
        ok: errors.is_empty(),
        errors,
        warnings,
    })
}

/// The schema/command/feature matrix
pub fn do_capabilities(session: &Session) -> Capabilities {
    Capabilities {
        schema_version: outfitter_schema::SCHEMA_VERSION.to_owned(),
        cli_version: CLI_VERSION.to_owned(),
        commands: [
            "capture",
            "plan",
            "apply",
            "restore",
            "revert",
            "verify",
            "report",
            "diff",
            "doctor",
            "validate-bundle",
            "capabilities",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        drivers: session.drivers.names().iter().map(|s| s.to_string()).collect(),
        verifiers: vec![
            "file-exists".to_owned(),
            "command-exists".to_owned(),
            "command-succeeds".to_owned(),
        ],
        restore_types: vec!["copy".to_owned(), "merge".to_owned(), "append".to_owned()],
        features: vec![
            "events-jsonl".to_owned(),
            "apply-from-plan".to_owned(),
            "bundles".to_owned(),
            "discovery".to_owned(),
        ],
    }
}

/// Emit a phase event when entering a pipeline stage (re-exported for the
/// CLI's progress narration)
pub fn emit_phase(session: &Session, phase: &str) {
    session.sink.emit(phase, EventBody::Phase {});
}
