#![deny(missing_docs)]

//! # outfitter-schema
//!
//! This crate exists to serialize and deserialize the JSON documents that
//! outfitter persists and emits: the command envelope, run records, plans,
//! restore journals, bundle metadata, and the JSONL event stream. Ideally it
//! should be reasonably forward and backward compatible with different
//! versions of these formats, so everything here leans on `#[serde(default)]`
//! and `skip_serializing_if`.
//!
//! The root types are [`Envelope`][], [`RunRecord`][], [`Plan`][], and
//! [`RestoreJournal`][].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The version of the envelope / record schema this crate speaks
pub const SCHEMA_VERSION: &str = "1.0";

/// A local system path on the machine outfitter was run.
///
/// This is a String because when deserializing this may be a path format from
/// a different OS!
pub type LocalPath = String;

/// A path expression as authored in a manifest (may contain `${tokens}`,
/// `%VARS%`, or `~`), not yet resolved against any filesystem.
pub type PathExpr = String;

/// The closed set of wire error codes.
///
/// These names are a stable contract for external UIs; new codes may be
/// added, existing ones are never renamed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    /// The profile/manifest file does not exist
    #[serde(rename = "MANIFEST_NOT_FOUND")]
    ManifestNotFound,
    /// The manifest exists but is not parseable
    #[serde(rename = "MANIFEST_PARSE_ERROR")]
    ManifestParseError,
    /// The manifest parsed but violates the profile contract
    #[serde(rename = "MANIFEST_VALIDATION_ERROR")]
    ManifestValidationError,
    /// A command-line argument or argument combination is invalid
    #[serde(rename = "INVALID_ARGUMENT")]
    InvalidArgument,
    /// A persisted document declares a schema version we can't consume
    #[serde(rename = "SCHEMA_INCOMPATIBLE")]
    SchemaIncompatible,
    /// The requested plan file does not exist
    #[serde(rename = "PLAN_NOT_FOUND")]
    PlanNotFound,
    /// The plan file exists but is not parseable
    #[serde(rename = "PLAN_PARSE_ERROR")]
    PlanParseError,
    /// The requested run record does not exist
    #[serde(rename = "RUN_NOT_FOUND")]
    RunNotFound,
    /// The winget driver is not available on this host
    #[serde(rename = "WINGET_NOT_AVAILABLE")]
    WingetNotAvailable,
    /// The driver reported no installed packages during capture
    #[serde(rename = "WINGET_CAPTURE_EMPTY")]
    WingetCaptureEmpty,
    /// A package install failed
    #[serde(rename = "INSTALL_FAILED")]
    InstallFailed,
    /// A restore operation failed
    #[serde(rename = "RESTORE_FAILED")]
    RestoreFailed,
    /// A verify check failed
    #[serde(rename = "VERIFY_FAILED")]
    VerifyFailed,
    /// An operation required privileges the process doesn't have
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
    /// Anything that indicates a bug in outfitter rather than in the input
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// The process exit code class this error belongs to
    /// (1 = validation/input, 2 = operational, 3 = internal)
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorCode::ManifestNotFound
            | ErrorCode::ManifestParseError
            | ErrorCode::ManifestValidationError
            | ErrorCode::InvalidArgument
            | ErrorCode::SchemaIncompatible
            | ErrorCode::PlanNotFound
            | ErrorCode::PlanParseError
            | ErrorCode::RunNotFound => 1,
            ErrorCode::WingetNotAvailable
            | ErrorCode::WingetCaptureEmpty
            | ErrorCode::InstallFailed
            | ErrorCode::RestoreFailed
            | ErrorCode::VerifyFailed
            | ErrorCode::PermissionDenied => 2,
            ErrorCode::InternalError => 3,
        }
    }
}

/// A structured error inside an envelope
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeError {
    /// Wire error code
    pub code: ErrorCode,
    /// Short human message
    pub message: String,
    /// Structured detail, shape depends on the code
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// One-sentence suggestion for fixing the problem
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Key into the documentation for this failure class
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_key: Option<String>,
}

/// The typed envelope every command returns
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Version of this envelope schema
    pub schema_version: String,
    /// Version of the CLI that produced this
    pub cli_version: String,
    /// The command that ran (e.g. `apply`)
    pub command: String,
    /// The run id assigned to this command execution
    pub run_id: String,
    /// When the command ran (ISO-8601 UTC)
    pub timestamp_utc: String,
    /// Whether the command succeeded as a whole
    pub success: bool,
    /// Command-specific payload
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Present exactly when `success` is false because of a stage error
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    /// Make a successful envelope around a payload
    pub fn success(
        cli_version: &str,
        command: &str,
        run_id: &str,
        timestamp_utc: &str,
        data: serde_json::Value,
    ) -> Self {
        Envelope {
            schema_version: SCHEMA_VERSION.to_owned(),
            cli_version: cli_version.to_owned(),
            command: command.to_owned(),
            run_id: run_id.to_owned(),
            timestamp_utc: timestamp_utc.to_owned(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Make a failed envelope around a structured error
    pub fn failure(
        cli_version: &str,
        command: &str,
        run_id: &str,
        timestamp_utc: &str,
        error: EnvelopeError,
    ) -> Self {
        Envelope {
            schema_version: SCHEMA_VERSION.to_owned(),
            cli_version: cli_version.to_owned(),
            command: command.to_owned(),
            run_id: run_id.to_owned(),
            timestamp_utc: timestamp_utc.to_owned(),
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The typed kind of a restore operation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestoreType {
    /// Copy the source over the target (the default)
    #[default]
    Copy,
    /// Structurally merge the source into the target
    Merge,
    /// Append the source's lines to the target
    Append,
}

impl std::fmt::Display for RestoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            RestoreType::Copy => "copy",
            RestoreType::Merge => "merge",
            RestoreType::Append => "append",
        };
        string.fmt(f)
    }
}

/// The structural format of a `merge` restore
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeFormat {
    /// Deep-merge JSON documents
    #[default]
    Json,
    /// Merge section-keyed INI documents
    Ini,
}

/// How arrays combine during a JSON merge
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArrayStrategy {
    /// The source array replaces the target array (the default)
    #[default]
    Replace,
    /// The source array is appended after the target array
    Concat,
}

/// The newline flavour of an `append` restore
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewlineFlavor {
    /// Follow the majority flavour of the target file
    #[default]
    Auto,
    /// Unix newlines
    Lf,
    /// Windows newlines
    Crlf,
}

/// The kind of a verify check
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyType {
    /// A file must exist at a path
    FileExists,
    /// A command must be resolvable on PATH
    CommandExists,
    /// A command must run and exit 0
    CommandSucceeds,
}

impl std::fmt::Display for VerifyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            VerifyType::FileExists => "file-exists",
            VerifyType::CommandExists => "command-exists",
            VerifyType::CommandSucceeds => "command-succeeds",
        };
        string.fmt(f)
    }
}

/// The lifecycle state of an action
///
/// Actions start in the state named after their type (`install`/`skip` for
/// apps, `restore`/`verify` for the others) and transition to a terminal
/// state during apply. Terminal states are sinks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    /// App action: will be installed
    Install,
    /// App action: already installed, nothing to do
    Skip,
    /// Restore action: will be applied
    Restore,
    /// Verify action: will be checked
    Verify,
    /// Queued but not yet started
    Pending,
    /// Currently executing
    Running,
    /// Terminal: completed successfully
    Success,
    /// Terminal: intentionally not executed (not a failure)
    Skipped,
    /// Terminal: executed and failed
    Failed,
    /// Terminal: dry run, nothing was executed
    DryRun,
}

impl ActionStatus {
    /// Whether this status is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Success
                | ActionStatus::Skipped
                | ActionStatus::Failed
                | ActionStatus::DryRun
        )
    }
}

/// One planned app operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppAction {
    /// The app's id from the manifest
    pub id: String,
    /// The package-manager-specific identifier being installed
    #[serde(rename = "ref")]
    pub package_ref: String,
    /// The driver that owns this ref
    pub driver: String,
    /// Current lifecycle state
    pub status: ActionStatus,
    /// Why the planner chose this status (e.g. "already installed")
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure details, populated when `status` is `failed`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One planned restore operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreAction {
    /// Stable id of this action within its plan (e.g. `restore-2`)
    pub id: String,
    /// The typed file operation
    pub restore_type: RestoreType,
    /// Source path expression
    pub source: PathExpr,
    /// Target path expression
    pub target: PathExpr,
    /// Whether the target should be backed up before modification
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
    /// Refuse to run without elevation
    #[serde(default)]
    #[serde(skip_serializing_if = "is_false")]
    pub requires_admin: bool,
    /// Structural format for a `merge`
    #[serde(default)]
    pub format: MergeFormat,
    /// Array handling for a `json` merge
    #[serde(default)]
    pub array_strategy: ArrayStrategy,
    /// Skip source lines already present in the target (`append`)
    #[serde(default)]
    #[serde(skip_serializing_if = "is_false")]
    pub dedupe: bool,
    /// Newline flavour for an `append`
    #[serde(default)]
    pub newline: NewlineFlavor,
    /// Current lifecycle state
    pub status: ActionStatus,
    /// Why the applier chose this status
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure details, populated when `status` is `failed`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal warnings (sensitive target path etc.)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// One planned verify check
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAction {
    /// Stable id of this action within its plan (e.g. `verify-0`)
    pub id: String,
    /// The kind of check
    pub verify_type: VerifyType,
    /// Path checked (file-exists)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathExpr>,
    /// Command checked (command-exists / command-succeeds)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Current lifecycle state
    pub status: ActionStatus,
    /// Human explanation from the verifier
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure details, populated when `status` is `failed`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single planned operation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Install (or skip) an application
    App(AppAction),
    /// Apply a typed file operation
    Restore(RestoreAction),
    /// Check an invariant
    Verify(VerifyAction),
}

impl Action {
    /// The action's id (unique within its plan)
    pub fn id(&self) -> &str {
        match self {
            Action::App(a) => &a.id,
            Action::Restore(a) => &a.id,
            Action::Verify(a) => &a.id,
        }
    }

    /// The action's current lifecycle state
    pub fn status(&self) -> ActionStatus {
        match self {
            Action::App(a) => a.status,
            Action::Restore(a) => a.status,
            Action::Verify(a) => a.status,
        }
    }

    /// Overwrite the action's lifecycle state
    pub fn set_status(&mut self, status: ActionStatus) {
        match self {
            Action::App(a) => a.status = status,
            Action::Restore(a) => a.status = status,
            Action::Verify(a) => a.status = status,
        }
    }
}

/// Identity of the manifest a run operated on
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInfo {
    /// Path of the root manifest file
    pub path: LocalPath,
    /// The manifest's `name` field
    pub name: String,
    /// First 16 hex chars of SHA-256 over the raw file bytes (CRLF→LF)
    pub hash: String,
    /// First 16 hex chars of SHA-256 over the normalized expanded document
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_hash: Option<String>,
}

/// Success/skip/fail counters for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    /// Actions that completed successfully
    pub success: usize,
    /// Actions intentionally not executed
    pub skipped: usize,
    /// Actions that failed
    pub failed: usize,
}

impl RunSummary {
    /// Count an action's terminal status into this summary
    pub fn record(&mut self, status: ActionStatus) {
        match status {
            ActionStatus::Success | ActionStatus::DryRun => self.success += 1,
            ActionStatus::Skipped => self.skipped += 1,
            ActionStatus::Failed => self.failed += 1,
            // non-terminal states never reach a persisted summary
            _ => {}
        }
    }
}

/// Install/skip/restore/verify counters for a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlanSummary {
    /// Apps that will be installed
    pub install: usize,
    /// Apps that are already installed
    pub skip: usize,
    /// Restore operations planned
    pub restore: usize,
    /// Verify checks planned
    pub verify: usize,
}

/// The ordered action list the planner produced, persisted under
/// `plans/<runId>.json` so `apply --plan` can re-execute it without
/// re-querying the driver.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Run id of the `plan` command that produced this
    pub run_id: String,
    /// When the plan was created (ISO-8601 UTC)
    pub created_utc: String,
    /// The driver whose observed installed set the plan was diffed against
    pub driver: String,
    /// The platform tag the plan was computed for (e.g. `windows`)
    pub platform: String,
    /// Identity of the manifest this plan realizes
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ManifestInfo>,
    /// The ordered action list: apps, then restores, then verifies
    pub actions: Vec<Action>,
    /// Counters over `actions`
    pub summary: PlanSummary,
    /// Non-fatal planning warnings (e.g. app with no ref for this platform)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The persisted result of one command execution
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Sortable timestamped id, suffixed with the normalized machine name
    pub run_id: String,
    /// When the command ran (ISO-8601 UTC)
    pub timestamp: String,
    /// The command that ran
    pub command: String,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Identity of the manifest, when the command had one
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ManifestInfo>,
    /// Terminal counters
    pub summary: RunSummary,
    /// The full action result list, in plan order
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    /// Non-fatal warnings surfaced during the run
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// For revert runs: the restore run whose journal was consumed
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted_restore_run_id: Option<String>,
}

impl RunRecord {
    /// Whether every non-skipped action succeeded
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Terminal disposition of one journal entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    /// The target was written (and possibly backed up first)
    Restored,
    /// The target already matched the source; nothing written, no backup
    SkippedUpToDate,
    /// The source did not exist; nothing written
    SkippedMissingSource,
    /// The operation was attempted and failed
    Failed,
}

/// One entry of a restore journal, the single source of truth for revert
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// The typed operation that ran
    pub kind: RestoreType,
    /// Source path expression as authored
    pub source: PathExpr,
    /// Target path expression as authored
    pub target: PathExpr,
    /// Absolute source path after payload/manifest resolution
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_source_path: Option<LocalPath>,
    /// Absolute target path after expansion
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<LocalPath>,
    /// Whether the item asked for a backup
    pub backup_requested: bool,
    /// Whether the target existed before the operation
    pub target_existed_before: bool,
    /// Whether a backup file was actually created
    pub backup_created: bool,
    /// Where the backup was written, when one was
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<LocalPath>,
    /// Terminal disposition
    pub action: JournalAction,
    /// Failure details when `action` is `failed`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JournalEntry {
    /// Whether a revert can act on this entry (restore a backup or delete a
    /// file the restore created)
    pub fn is_reverse_applicable(&self) -> bool {
        self.action == JournalAction::Restored
            && (self.backup_created || !self.target_existed_before)
    }
}

/// The journal written for every non-dry-run restore, under
/// `logs/restore-journal-<runId>.json`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreJournal {
    /// Run id of the restore that wrote this journal
    pub run_id: String,
    /// Path of the manifest the restore ran from
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<LocalPath>,
    /// Entries in execution order (revert processes them in reverse)
    pub entries: Vec<JournalEntry>,
}

/// `metadata.json` inside a bundle zip
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Version of the bundle layout
    pub schema_version: String,
    /// When the bundle was captured (ISO-8601 UTC)
    pub captured_at: String,
    /// Machine the capture ran on
    pub machine_name: String,
    /// Version of the CLI that captured this
    pub cli_version: String,
    /// Config modules whose files made it into the bundle
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_modules_included: Vec<String>,
    /// Config modules that matched but contributed nothing
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_modules_skipped: Vec<String>,
    /// Warnings raised during capture
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capture_warnings: Vec<String>,
}

/// One line of the `--events jsonl` stream
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventLine {
    /// When the event was emitted (ISO-8601 UTC)
    pub ts: String,
    /// The run this event belongs to
    pub run_id: String,
    /// Pipeline phase (`plan`, `apps`, `restore`, `verify`, `summary`, ...)
    pub phase: String,
    /// Kind-specific fields
    #[serde(flatten)]
    pub body: EventBody,
}

/// The kind-specific half of an event line
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EventBody {
    /// A worker picked up an app install
    AppStarted {
        /// The app's id
        id: String,
    },
    /// A worker finished an app install
    AppCompleted {
        /// The app's id
        id: String,
        /// Terminal status of the install
        status: ActionStatus,
    },
    /// A line of driver output attributed to an app install
    AppOutput {
        /// The app's id
        id: String,
        /// One line of subprocess output
        line: String,
    },
    /// The pipeline entered a new phase
    Phase {},
    /// An item-level progress update (restore/verify results)
    Item {
        /// The action result at this point in time
        item: serde_json::Value,
    },
    /// An artifact was produced (plan file, bundle, journal)
    Artifact {
        /// Path of the artifact
        path: LocalPath,
    },
    /// The run finished
    Summary {
        /// Terminal counters
        summary: RunSummary,
    },
}

/// One `doctor` health check
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorCheck {
    /// Stable name of the check
    pub name: String,
    /// Whether the check passed
    pub ok: bool,
    /// Human explanation
    pub message: String,
}

/// The `doctor` command's payload
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    /// Whether every check passed
    pub ok: bool,
    /// The individual checks, in execution order
    pub checks: Vec<DoctorCheck>,
}

/// The `capabilities` command's payload: the schema/command/feature matrix
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Version of the envelope/record schema
    pub schema_version: String,
    /// Version of the CLI
    pub cli_version: String,
    /// Commands this build exposes
    pub commands: Vec<String>,
    /// Package drivers compiled in
    pub drivers: Vec<String>,
    /// Verifier kinds compiled in
    pub verifiers: Vec<String>,
    /// Restore operation types compiled in
    pub restore_types: Vec<String>,
    /// Feature toggles this build supports
    pub features: Vec<String>,
}

impl Envelope {
    /// Get the JSON Schema for an Envelope
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Envelope)
    }
}

impl RunRecord {
    /// Get the JSON Schema for a RunRecord
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RunRecord)
    }
}

impl Plan {
    /// Get the JSON Schema for a Plan
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Plan)
    }
}

impl RestoreJournal {
    /// Get the JSON Schema for a RestoreJournal
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RestoreJournal)
    }
}
