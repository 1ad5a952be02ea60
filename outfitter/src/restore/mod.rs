//! The restorer: typed file operations with backup-before-write, idempotence
//! skips, and journaling.
//!
//! Every non-dry-run attempt produces a journal entry with enough state to
//! invert it later; the journal, not the run record, is what revert
//! consumes. Failures here are per-item: they're recorded and the run moves
//! on.

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use outfitter_schema::{JournalAction, JournalEntry, MergeFormat};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::OutfitterResult;
use crate::manifest::RestoreItem;
use crate::state::StateStore;
use crate::{jsonc, paths, sensitive};

pub mod append;
pub mod merge;

/// Two files whose mtimes differ by no more than this still count as equal
pub const MTIME_TOLERANCE_SECS: u64 = 2;

/// Everything one restore item needs to execute
pub struct RestoreContext<'a> {
    /// The run this restore belongs to (keys the backup tree)
    pub run_id: &'a str,
    /// Directory of the manifest (fallback root for relative sources)
    pub manifest_dir: &'a Utf8Path,
    /// Bundle payload root, probed before the manifest dir
    pub payload_root: Option<&'a Utf8Path>,
    /// Where backups go
    pub state: &'a StateStore,
    /// Report what would happen without touching the filesystem
    pub dry_run: bool,
    /// Whether this process can satisfy `requiresAdmin` items
    pub elevated: bool,
}

/// The result of one restore attempt
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// The journal entry describing what happened
    pub entry: JournalEntry,
    /// Non-fatal warnings (sensitive target path etc.)
    pub warnings: Vec<String>,
}

/// Whether this process runs with elevated privileges
pub fn process_is_elevated() -> bool {
    #[cfg(unix)]
    {
        // effective uid, not real uid: sudo counts
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(windows)]
    {
        // only administrators can write into System32
        let windir = std::env::var("windir").unwrap_or_else(|_| "C:\\Windows".to_owned());
        let probe = std::path::Path::new(&windir)
            .join("System32")
            .join(format!("outfitter-elev-{}.tmp", std::process::id()));
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

/// Apply one restore item, producing the journal entry for it
pub fn apply_item(item: &RestoreItem, ctx: &RestoreContext<'_>) -> RestoreOutcome {
    let mut warnings = vec![];
    let mut entry = JournalEntry {
        kind: item.kind,
        source: item.source.clone(),
        target: item.target.clone(),
        resolved_source_path: None,
        target_path: None,
        backup_requested: item.wants_backup(),
        target_existed_before: false,
        backup_created: false,
        backup_path: None,
        action: JournalAction::Failed,
        error: None,
    };

    // resolve the source: payload root first (when the file is actually
    // there), manifest dir otherwise
    let source_path = match resolve_source(&item.source, ctx) {
        Ok(path) => path,
        Err(e) => {
            entry.error = Some(e.to_string());
            return RestoreOutcome { entry, warnings };
        }
    };
    entry.resolved_source_path = Some(source_path.to_string());

    let target_path = match paths::expand(&item.target, None) {
        Ok(path) => path,
        Err(e) => {
            entry.error = Some(e.to_string());
            return RestoreOutcome { entry, warnings };
        }
    };
    entry.target_path = Some(target_path.to_string());
    entry.target_existed_before = target_path.exists();

    if let Some(segment) = sensitive::sensitive_segment(&target_path) {
        warnings.push(format!(
            "target {target_path} contains sensitive path segment '{segment}'"
        ));
    }

    if item.requires_admin && !ctx.elevated {
        entry.error = Some(format!(
            "'{target_path}' requires administrator privileges"
        ));
        return RestoreOutcome { entry, warnings };
    }

    if !source_path.exists() {
        entry.action = JournalAction::SkippedMissingSource;
        entry.error = Some(format!("source not found: {source_path}"));
        return RestoreOutcome { entry, warnings };
    }

    let result = match item.kind {
        outfitter_schema::RestoreType::Copy => {
            apply_copy(item, &source_path, &target_path, ctx, &mut entry)
        }
        outfitter_schema::RestoreType::Merge => match item.format {
            MergeFormat::Json => {
                apply_merge_json(item, &source_path, &target_path, ctx, &mut entry)
            }
            MergeFormat::Ini => {
                apply_merge_ini(item, &source_path, &target_path, ctx, &mut entry)
            }
        },
        outfitter_schema::RestoreType::Append => {
            apply_append(item, &source_path, &target_path, ctx, &mut entry)
        }
    };

    if let Err(e) = result {
        entry.action = JournalAction::Failed;
        entry.error = Some(e.to_string());
    }
    RestoreOutcome { entry, warnings }
}

fn resolve_source(
    source: &str,
    ctx: &RestoreContext<'_>,
) -> OutfitterResult<Utf8PathBuf> {
    if let Some(payload) = ctx.payload_root {
        let candidate = paths::expand(source, Some(payload))?;
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    paths::expand(source, Some(ctx.manifest_dir))
}

/// Copy the current target into the backup tree, when the item wants one
fn take_backup(
    item: &RestoreItem,
    target_path: &Utf8Path,
    ctx: &RestoreContext<'_>,
    entry: &mut JournalEntry,
) -> OutfitterResult<()> {
    if !item.wants_backup() || !target_path.exists() {
        return Ok(());
    }
    let backup_path = ctx.state.backup_path_for(ctx.run_id, target_path);
    copy_any(target_path, &backup_path)?;
    entry.backup_created = true;
    entry.backup_path = Some(backup_path.to_string());
    debug!("backed up {target_path} -> {backup_path}");
    Ok(())
}

fn apply_copy(
    item: &RestoreItem,
    source_path: &Utf8Path,
    target_path: &Utf8Path,
    ctx: &RestoreContext<'_>,
    entry: &mut JournalEntry,
) -> OutfitterResult<()> {
    if target_path.exists() && is_up_to_date(source_path, target_path)? {
        entry.action = JournalAction::SkippedUpToDate;
        return Ok(());
    }
    if ctx.dry_run {
        entry.action = JournalAction::Restored;
        return Ok(());
    }
    take_backup(item, target_path, ctx, entry)?;
    copy_any(source_path, target_path)?;
    entry.action = JournalAction::Restored;
    info!("restored {target_path} from {source_path}");
    Ok(())
}

fn apply_merge_json(
    item: &RestoreItem,
    source_path: &Utf8Path,
    target_path: &Utf8Path,
    ctx: &RestoreContext<'_>,
    entry: &mut JournalEntry,
) -> OutfitterResult<()> {
    let source_text = LocalAsset::load_string(source_path)?;
    let source_value = jsonc::parse_str(&source_text, source_path)?;

    // a missing target counts as an empty object
    let target_value = if target_path.exists() {
        let target_text = LocalAsset::load_string(target_path)?;
        jsonc::parse_str(&target_text, target_path)?
    } else {
        serde_json::Value::Object(serde_json::Map::new())
    };

    let merged = merge::deep_merge_json(&target_value, &source_value, item.array_strategy);
    if merged == target_value {
        entry.action = JournalAction::SkippedUpToDate;
        return Ok(());
    }
    if ctx.dry_run {
        entry.action = JournalAction::Restored;
        return Ok(());
    }
    take_backup(item, target_path, ctx, entry)?;
    let contents = serde_json::to_string_pretty(&merged)?;
    LocalAsset::write_new_all(&contents, target_path)?;
    entry.action = JournalAction::Restored;
    info!("merged {source_path} into {target_path} (json)");
    Ok(())
}

fn apply_merge_ini(
    item: &RestoreItem,
    source_path: &Utf8Path,
    target_path: &Utf8Path,
    ctx: &RestoreContext<'_>,
    entry: &mut JournalEntry,
) -> OutfitterResult<()> {
    let source_text = LocalAsset::load_string(source_path)?;
    let target_text = if target_path.exists() {
        LocalAsset::load_string(target_path)?
    } else {
        String::new()
    };

    let merged = merge::merge_ini_text(&target_text, &source_text);
    if merged == target_text {
        entry.action = JournalAction::SkippedUpToDate;
        return Ok(());
    }
    if ctx.dry_run {
        entry.action = JournalAction::Restored;
        return Ok(());
    }
    take_backup(item, target_path, ctx, entry)?;
    LocalAsset::write_new_all(&merged, target_path)?;
    entry.action = JournalAction::Restored;
    info!("merged {source_path} into {target_path} (ini)");
    Ok(())
}

fn apply_append(
    item: &RestoreItem,
    source_path: &Utf8Path,
    target_path: &Utf8Path,
    ctx: &RestoreContext<'_>,
    entry: &mut JournalEntry,
) -> OutfitterResult<()> {
    let source_text = LocalAsset::load_string(source_path)?;
    let target_text = if target_path.exists() {
        Some(LocalAsset::load_string(target_path)?)
    } else {
        None
    };

    let Some(new_content) =
        append::append_lines(target_text.as_deref(), &source_text, item.dedupe, item.newline)
    else {
        entry.action = JournalAction::SkippedUpToDate;
        return Ok(());
    };
    if ctx.dry_run {
        entry.action = JournalAction::Restored;
        return Ok(());
    }
    take_backup(item, target_path, ctx, entry)?;
    LocalAsset::write_new_all(&new_content, target_path)?;
    entry.action = JournalAction::Restored;
    info!("appended {source_path} to {target_path}");
    Ok(())
}

/// The idempotence comparator.
///
/// Files: same size and mtime within 2 s. Directories: same recursive file
/// count and newest mtime within 2 s.
pub fn is_up_to_date(source: &Utf8Path, target: &Utf8Path) -> OutfitterResult<bool> {
    if source.is_dir() != target.is_dir() {
        return Ok(false);
    }
    if source.is_dir() {
        let (src_count, src_newest) = dir_profile(source)?;
        let (tgt_count, tgt_newest) = dir_profile(target)?;
        return Ok(src_count == tgt_count && times_close(src_newest, tgt_newest));
    }
    let src_meta = std::fs::metadata(source)?;
    let tgt_meta = std::fs::metadata(target)?;
    if src_meta.len() != tgt_meta.len() {
        return Ok(false);
    }
    let (Ok(src_mtime), Ok(tgt_mtime)) = (src_meta.modified(), tgt_meta.modified()) else {
        return Ok(false);
    };
    Ok(times_close(Some(src_mtime), Some(tgt_mtime)))
}

fn times_close(a: Option<std::time::SystemTime>, b: Option<std::time::SystemTime>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let delta = a.duration_since(b).unwrap_or_else(|e| e.duration());
            delta.as_secs() <= MTIME_TOLERANCE_SECS
        }
        (None, None) => true,
        _ => false,
    }
}

/// Recursive file count and newest file mtime of a directory
fn dir_profile(dir: &Utf8Path) -> OutfitterResult<(usize, Option<std::time::SystemTime>)> {
    let mut count = 0;
    let mut newest: Option<std::time::SystemTime> = None;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        count += 1;
        if let Ok(meta) = entry.metadata() {
            if let Ok(mtime) = meta.modified() {
                newest = Some(match newest {
                    Some(current) if current >= mtime => current,
                    _ => mtime,
                });
            }
        }
    }
    Ok((count, newest))
}

/// Copy a file or a directory tree, replacing whatever is at `dest`
pub fn copy_any(source: &Utf8Path, dest: &Utf8Path) -> OutfitterResult<()> {
    if source.is_dir() {
        if dest.exists() && !dest.is_dir() {
            LocalAsset::remove_file(dest)?;
        }
        LocalAsset::create_dir_all(dest)?;
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let path = Utf8PathBuf::try_from(entry.path().to_path_buf())?;
            let rel = path
                .strip_prefix(source)
                .expect("walkdir yields children of its root");
            if rel.as_str().is_empty() {
                continue;
            }
            let out = dest.join(rel);
            if entry.file_type().is_dir() {
                LocalAsset::create_dir_all(&out)?;
            } else {
                if let Some(parent) = out.parent() {
                    LocalAsset::create_dir_all(parent)?;
                }
                LocalAsset::copy_file_to_file(&path, &out)?;
            }
        }
    } else {
        if dest.exists() && dest.is_dir() {
            LocalAsset::remove_dir_all(dest)?;
        }
        if let Some(parent) = dest.parent() {
            LocalAsset::create_dir_all(parent)?;
        }
        LocalAsset::copy_file_to_file(source, dest)?;
    }
    Ok(())
}

/// Delete a file or directory tree (revert uses this for targets a restore
/// created)
pub fn remove_any(path: &Utf8Path) -> OutfitterResult<()> {
    if path.is_dir() {
        LocalAsset::remove_dir_all(path)?;
    } else if path.exists() {
        LocalAsset::remove_file(path)?;
    }
    Ok(())
}
