//! All the clap stuff for parsing/documenting the cli

use camino::Utf8PathBuf;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    Args, Parser, Subcommand, ValueEnum,
};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
#[clap(bin_name = "outfitter")]
/// Declarative workstation provisioning: capture a machine's end-state,
/// then converge other machines to it.
///
/// See 'capture', 'plan' and 'apply' for the 3 most important subcommands.
pub struct Cli {
    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,

    /// How verbose logging should be (log level)
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(value_parser = PossibleValuesParser::new(["off", "error", "warn", "info", "debug", "trace"]).map(|s| s.parse::<LevelFilter>().expect("possible values are valid")))]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: LevelFilter,

    /// The format of the output
    #[clap(long, short, value_enum)]
    #[clap(default_value_t = OutputFormat::Human)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub output_format: OutputFormat,

    /// Shorthand for `--output-format=json`
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub json: bool,

    /// Stream machine-readable progress events (one JSON object per line)
    #[clap(long, value_enum)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub events: Option<EventsFormat>,

    /// Root of the persisted state layout (defaults to ~/.outfitter,
    /// overridable via OUTFITTER_STATE_DIR)
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub state_root: Option<Utf8PathBuf>,

    /// Directory holding config modules
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub modules_dir: Option<Utf8PathBuf>,

    /// Directory holding user-authored profiles
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub profiles_dir: Option<Utf8PathBuf>,

    /// Package driver to use (defaults to the platform's)
    #[clap(long)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub driver: Option<String>,
}

impl Cli {
    /// Whether machine-readable output was requested either way
    pub fn wants_json(&self) -> bool {
        self.json || self.output_format == OutputFormat::Json
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Observe this machine and write a profile for it
    #[clap(disable_version_flag = true)]
    Capture(CaptureArgs),

    /// Diff a profile against this machine into a persisted action plan
    #[clap(disable_version_flag = true)]
    Plan(PlanArgs),

    /// Converge this machine to a profile (or re-execute a saved plan)
    #[clap(disable_version_flag = true)]
    Apply(ApplyArgs),

    /// Execute only a profile's restore items
    #[clap(disable_version_flag = true)]
    Restore(RestoreArgs),

    /// Undo a prior restore using its journal
    #[clap(disable_version_flag = true)]
    Revert(RevertArgs),

    /// Check a profile's verify items against this machine
    #[clap(disable_version_flag = true)]
    Verify(VerifyArgs),

    /// Render previous run records
    #[clap(disable_version_flag = true)]
    Report(ReportArgs),

    /// Compare two profiles
    #[clap(disable_version_flag = true)]
    Diff(DiffArgs),

    /// Health-check the environment this tool depends on
    #[clap(disable_version_flag = true)]
    Doctor(DoctorArgs),

    /// Validate a profile (and optionally the bundle wrapping it)
    #[clap(disable_version_flag = true)]
    ValidateBundle(ValidateBundleArgs),

    /// Print the schema/command/feature matrix
    #[clap(disable_version_flag = true)]
    Capabilities(CapabilitiesArgs),
}

/// Selects a profile either by name (resolved under the profiles dir:
/// `<name>.zip` → `<name>/manifest.jsonc` → `<name>.jsonc`) or by
/// explicit manifest path.
#[derive(Args, Clone, Debug)]
pub struct ProfileSelector {
    /// Profile name to resolve under the profiles directory
    #[clap(long, conflicts_with = "manifest")]
    pub profile: Option<String>,

    /// Explicit path to a manifest file
    #[clap(long)]
    pub manifest: Option<Utf8PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct CaptureArgs {
    /// Profile name (the manifest lands under the profiles dir)
    #[clap(long)]
    pub profile: Option<String>,

    /// Explicit output path for the captured manifest
    #[clap(long)]
    pub out_manifest: Option<Utf8PathBuf>,

    /// Keep runtime/framework packages in the capture
    #[clap(long)]
    pub include_runtimes: bool,

    /// Keep store-distributed apps in the capture
    #[clap(long)]
    pub include_store_apps: bool,

    /// Emit the smallest useful manifest
    #[clap(long)]
    pub minimize: bool,

    /// Include an example restore item in the captured manifest
    #[clap(long)]
    pub include_restore_template: bool,

    /// Include an example verify item in the captured manifest
    #[clap(long)]
    pub include_verify_template: bool,

    /// Match installed apps against the module catalog and record hits
    #[clap(long)]
    pub discover: bool,

    /// Write an include template listing apps no module matched
    #[clap(long)]
    pub discover_write_manual_include: bool,

    /// Merge into an existing manifest instead of overwriting it
    #[clap(long)]
    pub update: bool,

    /// With --update: drop apps whose refs are no longer installed
    #[clap(long)]
    pub prune_missing_apps: bool,

    /// Package matched config files into a bundle zip next to the manifest
    #[clap(long)]
    pub with_config: bool,

    /// Explicit module selection for the config payload
    #[clap(long, value_delimiter(','))]
    pub config_modules: Vec<String>,

    /// Also stage the config payload into this directory
    #[clap(long)]
    pub payload_out: Option<Utf8PathBuf>,
}

impl CaptureArgs {
    /// Convert the application version of these args to the library version
    pub fn to_lib(&self) -> outfitter::CaptureArgs {
        outfitter::CaptureArgs {
            profile: self.profile.clone(),
            out_manifest: self.out_manifest.clone(),
            include_runtimes: self.include_runtimes,
            include_store_apps: self.include_store_apps,
            minimize: self.minimize,
            include_restore_template: self.include_restore_template,
            include_verify_template: self.include_verify_template,
            discover: self.discover,
            discover_write_manual_include: self.discover_write_manual_include,
            update: self.update,
            prune_missing_apps: self.prune_missing_apps,
            with_config: self.with_config,
            config_modules: self.config_modules.clone(),
            payload_out: self.payload_out.clone(),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub selector: ProfileSelector,
}

#[derive(Args, Clone, Debug)]
pub struct ApplyArgs {
    #[clap(flatten)]
    pub selector: ProfileSelector,

    /// Re-execute a previously persisted plan instead of planning now
    #[clap(long, conflicts_with_all = ["profile", "manifest"])]
    pub plan: Option<Utf8PathBuf>,

    /// Report what would happen without doing it
    #[clap(long)]
    pub dry_run: bool,

    /// Execute restore actions (they plan as skipped otherwise)
    #[clap(long)]
    pub enable_restore: bool,

    /// Worker pool size for app installs
    #[clap(long, default_value_t = 1)]
    pub parallel: usize,
}

#[derive(Args, Clone, Debug)]
pub struct RestoreArgs {
    #[clap(flatten)]
    pub selector: ProfileSelector,

    /// Confirm file modifications (required)
    #[clap(long)]
    pub enable_restore: bool,

    /// Report what would happen without doing it
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RevertArgs {
    /// The restore run to revert (defaults to the most recent journal)
    #[clap(long)]
    pub run_id: Option<String>,

    /// Report what would happen without doing it
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Args, Clone, Debug)]
pub struct VerifyArgs {
    #[clap(flatten)]
    pub selector: ProfileSelector,
}

#[derive(Args, Clone, Debug)]
pub struct ReportArgs {
    /// Render one specific run
    #[clap(long, conflicts_with_all = ["latest", "last"])]
    pub run_id: Option<String>,

    /// Render the newest run (the default)
    #[clap(long)]
    pub latest: bool,

    /// Render the N newest runs
    #[clap(long)]
    pub last: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct DiffArgs {
    /// The "before" manifest
    #[clap(long)]
    pub file_a: Utf8PathBuf,

    /// The "after" manifest
    #[clap(long)]
    pub file_b: Utf8PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct DoctorArgs {}

#[derive(Args, Clone, Debug)]
pub struct ValidateBundleArgs {
    /// Manifest to validate
    #[clap(long)]
    pub manifest: Option<Utf8PathBuf>,

    /// Bundle zip to validate
    #[clap(long)]
    pub bundle: Option<Utf8PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct CapabilitiesArgs {}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Supported event stream encodings
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EventsFormat {
    /// One JSON object per line on stderr
    Jsonl,
}

impl EventsFormat {
    /// Convert the application version of this enum to the library version
    pub fn to_lib(self) -> outfitter::events::EventsMode {
        match self {
            EventsFormat::Jsonl => outfitter::events::EventsMode::Jsonl,
        }
    }
}
