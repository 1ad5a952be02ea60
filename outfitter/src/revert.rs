//! The reverter: consume a restore journal and invert its entries.
//!
//! Entries are processed in reverse order. Every mutation takes a safety
//! backup of the current target under the *revert's* run id first, so a
//! revert is itself revertable by hand. Failures are per-entry; there is no
//! cross-entry rollback.

use camino::Utf8PathBuf;
use outfitter_schema::{ActionStatus, JournalAction, JournalEntry, RestoreJournal};
use tracing::{info, warn};

use crate::restore::{copy_any, remove_any};
use crate::state::StateStore;

/// Everything a revert needs
pub struct RevertContext<'a> {
    /// Where safety backups go
    pub state: &'a StateStore,
    /// The revert command's own run id (keys the safety backups)
    pub run_id: &'a str,
    /// Report what would happen without touching the filesystem
    pub dry_run: bool,
}

/// What happened to one journal entry during revert
#[derive(Debug, Clone)]
pub struct RevertEntryResult {
    /// The entry's target path expression
    pub target: String,
    /// Terminal status of this inversion
    pub status: ActionStatus,
    /// Human explanation
    pub detail: String,
}

/// Invert a journal, newest entry first
pub fn revert_journal(
    journal: &RestoreJournal,
    ctx: &RevertContext<'_>,
) -> Vec<RevertEntryResult> {
    journal
        .entries
        .iter()
        .rev()
        .map(|entry| revert_entry(entry, ctx))
        .collect()
}

fn revert_entry(entry: &JournalEntry, ctx: &RevertContext<'_>) -> RevertEntryResult {
    let target_display = entry
        .target_path
        .clone()
        .unwrap_or_else(|| entry.target.clone());

    if entry.action != JournalAction::Restored {
        return RevertEntryResult {
            target: target_display,
            status: ActionStatus::Skipped,
            detail: "entry did not modify the target".to_owned(),
        };
    }

    let Some(target_path) = entry.target_path.as_deref().map(Utf8PathBuf::from) else {
        return RevertEntryResult {
            target: target_display,
            status: ActionStatus::Failed,
            detail: "journal entry has no resolved target path".to_owned(),
        };
    };

    let backup_path = entry.backup_path.as_deref().map(Utf8PathBuf::from);
    let backup_usable = entry.backup_created
        && backup_path.as_ref().map(|p| p.exists()).unwrap_or(false);

    if backup_usable {
        let backup_path = backup_path.unwrap();
        if ctx.dry_run {
            return RevertEntryResult {
                target: target_display,
                status: ActionStatus::DryRun,
                detail: format!("would restore {target_path} from {backup_path}"),
            };
        }
        if let Err(e) = safety_backup(&target_path, ctx) {
            return failed(target_display, format!("safety backup failed: {e}"));
        }
        match copy_any(&backup_path, &target_path) {
            Ok(()) => {
                info!("reverted {target_path} from {backup_path}");
                RevertEntryResult {
                    target: target_display,
                    status: ActionStatus::Success,
                    detail: format!("restored from {backup_path}"),
                }
            }
            Err(e) => failed(target_display, format!("copy from backup failed: {e}")),
        }
    } else if !entry.target_existed_before {
        if ctx.dry_run {
            return RevertEntryResult {
                target: target_display,
                status: ActionStatus::DryRun,
                detail: format!("would delete {target_path}"),
            };
        }
        if let Err(e) = safety_backup(&target_path, ctx) {
            return failed(target_display, format!("safety backup failed: {e}"));
        }
        match remove_any(&target_path) {
            Ok(()) => {
                info!("reverted {target_path} by deletion");
                RevertEntryResult {
                    target: target_display,
                    status: ActionStatus::Success,
                    detail: "deleted (restore created it)".to_owned(),
                }
            }
            Err(e) => failed(target_display, format!("delete failed: {e}")),
        }
    } else {
        warn!("can't revert {target_path}: no backup and target pre-existed");
        RevertEntryResult {
            target: target_display,
            status: ActionStatus::Skipped,
            detail: "no backup available and target existed before restore".to_owned(),
        }
    }
}

/// Preserve the current target under the revert's own run id
fn safety_backup(
    target_path: &camino::Utf8Path,
    ctx: &RevertContext<'_>,
) -> crate::errors::OutfitterResult<()> {
    if !target_path.exists() {
        return Ok(());
    }
    let backup = ctx.state.backup_path_for(ctx.run_id, target_path);
    copy_any(target_path, &backup)
}

fn failed(target: String, detail: String) -> RevertEntryResult {
    RevertEntryResult {
        target,
        status: ActionStatus::Failed,
        detail,
    }
}
