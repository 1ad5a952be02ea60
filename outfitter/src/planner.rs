//! The planner: diff a loaded manifest against the observed installed set
//! into a deterministic, ordered action list.
//!
//! All work is precomputed here before anything executes; the applier only
//! walks the list. Output order is authoritative: apps in manifest order,
//! then restores in expanded order, then verifies in expanded order.

use std::collections::BTreeSet;

use outfitter_schema::{
    Action, ActionStatus, AppAction, Plan, PlanSummary, RestoreAction, VerifyAction,
};
use tracing::debug;

use crate::manifest::{LoadedManifest, VerifyCheck};

/// Inputs the planner needs beyond the manifest itself
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    /// The driver whose installed set we diffed against
    pub driver: &'a str,
    /// The active platform tag (`windows`, `macos`, `linux`)
    pub platform: &'a str,
    /// Run id of the command building this plan
    pub run_id: &'a str,
    /// Clock value stamped into the plan
    pub created_utc: &'a str,
}

/// Diff the manifest against the observed installed set
pub fn build_plan(
    loaded: &LoadedManifest,
    observed: &BTreeSet<String>,
    inputs: &PlanInputs<'_>,
) -> Plan {
    let manifest = &loaded.manifest;
    let mut actions = vec![];
    let mut summary = PlanSummary::default();
    let mut warnings = loaded.warnings.clone();

    for app in &manifest.apps {
        let Some(package_ref) = app.ref_for(inputs.platform) else {
            warnings.push(format!(
                "app '{}' has no ref for platform '{}'",
                app.id, inputs.platform
            ));
            continue;
        };
        let action = if observed.contains(package_ref) {
            summary.skip += 1;
            AppAction {
                id: app.id.clone(),
                package_ref: package_ref.to_owned(),
                driver: inputs.driver.to_owned(),
                status: ActionStatus::Skip,
                reason: Some("already installed".to_owned()),
                error: None,
            }
        } else {
            summary.install += 1;
            AppAction {
                id: app.id.clone(),
                package_ref: package_ref.to_owned(),
                driver: inputs.driver.to_owned(),
                status: ActionStatus::Install,
                reason: None,
                error: None,
            }
        };
        actions.push(Action::App(action));
    }

    for (idx, item) in manifest.restore.iter().enumerate() {
        summary.restore += 1;
        actions.push(Action::Restore(RestoreAction {
            id: format!("restore-{idx}"),
            restore_type: item.kind,
            source: item.source.clone(),
            target: item.target.clone(),
            backup: item.backup,
            requires_admin: item.requires_admin,
            format: item.format,
            array_strategy: item.array_strategy,
            dedupe: item.dedupe,
            newline: item.newline,
            status: ActionStatus::Restore,
            reason: None,
            error: None,
            warnings: vec![],
        }));
    }

    for (idx, item) in manifest.verify.iter().enumerate() {
        summary.verify += 1;
        let (path, command) = match &item.check {
            VerifyCheck::FileExists { path } => (Some(path.clone()), None),
            VerifyCheck::CommandExists { command }
            | VerifyCheck::CommandSucceeds { command } => (None, Some(command.clone())),
        };
        actions.push(Action::Verify(VerifyAction {
            id: format!("verify-{idx}"),
            verify_type: item.check.verify_type(),
            path,
            command,
            status: ActionStatus::Verify,
            message: None,
            error: None,
        }));
    }

    debug!(
        "planned {} actions (install {}, skip {}, restore {}, verify {})",
        actions.len(),
        summary.install,
        summary.skip,
        summary.restore,
        summary.verify
    );

    Plan {
        run_id: inputs.run_id.to_owned(),
        created_utc: inputs.created_utc.to_owned(),
        driver: inputs.driver.to_owned(),
        platform: inputs.platform.to_owned(),
        manifest: Some(loaded.info()),
        actions,
        summary,
        warnings,
    }
}
