//! The state layer: run records, plans, restore journals, and the backup
//! tree, all rooted at one state root.
//!
//! Layout:
//!
//! ```text
//! <state-root>/state/<runId>.json               run records
//! <state-root>/state/backups/<runId>/...        backup tree
//! <state-root>/logs/restore-journal-<runId>.json
//! <state-root>/plans/<runId>.json
//! ```
//!
//! Run records and journals are write-once; run ids encode the clock and the
//! machine name, which is all the cross-process coordination this tool does.

use axoasset::{LocalAsset, SourceFile};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use outfitter_schema::{Plan, RestoreJournal, RunRecord};
use sha2::{Digest, Sha256};

use crate::errors::{OutfitterError, OutfitterResult};
use crate::paths;

/// Environment variable overriding the state root
pub const STATE_DIR_ENV: &str = "OUTFITTER_STATE_DIR";

/// First 16 hex chars of SHA-256 over CRLF-normalized text.
///
/// This is the raw manifest hash: normalizing newlines first keeps the hash
/// stable across checkouts with different line-ending settings.
pub fn hash16(text: &str) -> String {
    let normalized = newline_converter::dos2unix(text);
    let digest = Sha256::digest(normalized.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_owned()
}

/// First 16 hex chars of SHA-256 over already-canonical bytes (no newline
/// normalization; canonical JSON contains none)
pub fn hash16_raw(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex = format!("{digest:x}");
    hex[..16].to_owned()
}

/// The current time as ISO-8601 UTC with millisecond precision
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// This machine's name, normalized to a filename-safe slug
pub fn machine_name() -> String {
    let raw = std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "local".to_owned());
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "local".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Reader/writer for everything under the state root
#[derive(Debug, Clone)]
pub struct StateStore {
    root: Utf8PathBuf,
}

impl StateStore {
    /// A store rooted at an explicit directory
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        StateStore { root: root.into() }
    }

    /// The default state root: `$OUTFITTER_STATE_DIR`, else `~/.outfitter`
    pub fn default_root() -> OutfitterResult<Utf8PathBuf> {
        if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
            return Ok(Utf8PathBuf::from(dir));
        }
        Ok(paths::home()?.join(".outfitter"))
    }

    /// The state root itself
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding run records
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.root.join("state")
    }

    /// Directory holding backup trees
    pub fn backups_dir(&self) -> Utf8PathBuf {
        self.state_dir().join("backups")
    }

    /// Directory holding journals and human logs
    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.root.join("logs")
    }

    /// Directory holding persisted plans
    pub fn plans_dir(&self) -> Utf8PathBuf {
        self.root.join("plans")
    }

    /// Create the layout if it doesn't exist yet
    pub fn ensure_layout(&self) -> OutfitterResult<()> {
        for dir in [
            self.state_dir(),
            self.backups_dir(),
            self.logs_dir(),
            self.plans_dir(),
        ] {
            LocalAsset::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Mint a new run id: sortable UTC timestamp + normalized machine name
    pub fn new_run_id(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S-%3f");
        format!("{stamp}-{}", machine_name())
    }

    // --- run records ---

    /// Path of a run record
    pub fn run_record_path(&self, run_id: &str) -> Utf8PathBuf {
        self.state_dir().join(format!("{run_id}.json"))
    }

    /// Persist a run record (write-once; later writes would be a bug upstream)
    pub fn save_run_record(&self, record: &RunRecord) -> OutfitterResult<Utf8PathBuf> {
        let path = self.run_record_path(&record.run_id);
        let contents = serde_json::to_string_pretty(record)?;
        LocalAsset::write_new_all(&contents, &path)?;
        Ok(path)
    }

    /// Load one run record by id
    pub fn load_run_record(&self, run_id: &str) -> OutfitterResult<RunRecord> {
        let path = self.run_record_path(run_id);
        if !path.exists() {
            return Err(OutfitterError::RunNotFound {
                run_id: run_id.to_owned(),
            });
        }
        let src = SourceFile::load_local(&path)?;
        Ok(src.deserialize_json()?)
    }

    /// Every run id on disk, newest first (the id encodes the timestamp, so
    /// filename order is time order)
    pub fn list_run_ids(&self) -> OutfitterResult<Vec<String>> {
        let dir = self.state_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut ids = vec![];
        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().strip_suffix(".json") {
                ids.push(id.to_owned());
            }
        }
        ids.sort();
        ids.reverse();
        Ok(ids)
    }

    /// The newest run record, if any command has ever run
    pub fn load_latest_run_record(&self) -> OutfitterResult<Option<RunRecord>> {
        match self.list_run_ids()?.first() {
            Some(id) => Ok(Some(self.load_run_record(id)?)),
            None => Ok(None),
        }
    }

    /// The `n` newest run records
    pub fn load_last_run_records(&self, n: usize) -> OutfitterResult<Vec<RunRecord>> {
        self.list_run_ids()?
            .iter()
            .take(n)
            .map(|id| self.load_run_record(id))
            .collect()
    }

    // --- restore journals ---

    /// Path of a restore journal
    pub fn journal_path(&self, run_id: &str) -> Utf8PathBuf {
        self.logs_dir().join(format!("restore-journal-{run_id}.json"))
    }

    /// Persist a restore journal
    pub fn save_journal(&self, journal: &RestoreJournal) -> OutfitterResult<Utf8PathBuf> {
        let path = self.journal_path(&journal.run_id);
        let contents = serde_json::to_string_pretty(journal)?;
        LocalAsset::write_new_all(&contents, &path)?;
        Ok(path)
    }

    /// Load the journal for a specific run
    pub fn load_journal(&self, run_id: &str) -> OutfitterResult<RestoreJournal> {
        let path = self.journal_path(run_id);
        if !path.exists() {
            return Err(OutfitterError::JournalNotFound {
                run_id: Some(run_id.to_owned()),
            });
        }
        let src = SourceFile::load_local(&path)?;
        Ok(src.deserialize_json()?)
    }

    /// Load the most recent journal on disk
    pub fn load_latest_journal(&self) -> OutfitterResult<RestoreJournal> {
        let dir = self.logs_dir();
        let mut run_ids = vec![];
        if dir.exists() {
            for entry in dir.read_dir_utf8()? {
                let entry = entry?;
                let name = entry.file_name();
                if let Some(rest) = name
                    .strip_prefix("restore-journal-")
                    .and_then(|n| n.strip_suffix(".json"))
                {
                    run_ids.push(rest.to_owned());
                }
            }
        }
        run_ids.sort();
        match run_ids.last() {
            Some(id) => self.load_journal(id),
            None => Err(OutfitterError::JournalNotFound { run_id: None }),
        }
    }

    // --- plans ---

    /// Path of a persisted plan
    pub fn plan_path(&self, run_id: &str) -> Utf8PathBuf {
        self.plans_dir().join(format!("{run_id}.json"))
    }

    /// Persist a plan
    pub fn save_plan(&self, plan: &Plan) -> OutfitterResult<Utf8PathBuf> {
        let path = self.plan_path(&plan.run_id);
        let contents = serde_json::to_string_pretty(plan)?;
        LocalAsset::write_new_all(&contents, &path)?;
        Ok(path)
    }

    /// Load a plan from an explicit path (the `apply --plan` entry door)
    pub fn load_plan_file(path: &Utf8Path) -> OutfitterResult<Plan> {
        if !path.exists() {
            return Err(OutfitterError::PlanNotFound {
                path: path.to_owned(),
            });
        }
        let src = SourceFile::load_local(path)?;
        src.deserialize_json().map_err(|e| OutfitterError::PlanParse {
            path: path.to_owned(),
            details: e.to_string(),
        })
    }

    // --- backup tree ---

    /// Where the original of `target` is preserved for run `run_id`
    pub fn backup_path_for(&self, run_id: &str, target: &Utf8Path) -> Utf8PathBuf {
        self.backups_dir()
            .join(run_id)
            .join(paths::to_backup_path(target))
    }
}
