//! Errors!
//!
//! One diagnostic enum for the whole pipeline. Every variant maps onto the
//! closed wire taxonomy via [`OutfitterError::code`][]; per-action failures
//! are recorded in action results rather than raised through here, so a value
//! of this type always means a whole stage refused to proceed.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use outfitter_schema::ErrorCode;
use thiserror::Error;

/// An alias for the common Result type for this crate
pub type OutfitterResult<T> = std::result::Result<T, OutfitterError>;

/// Errors outfitter can have
#[derive(Debug, Error, Diagnostic)]
pub enum OutfitterError {
    /// random i/o error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// random axoasset error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Asset(#[from] axoasset::AxoassetError),

    /// random axoprocess error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cmd(#[from] axoprocess::AxoprocessError),

    /// random serde_json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// random camino conversion error
    #[error(transparent)]
    FromPathBufError(#[from] camino::FromPathBufError),

    /// The profile/manifest the user pointed us at doesn't exist
    #[error("manifest not found at {path}")]
    #[diagnostic(help("check the path, or pass a profile name that resolves under your profiles directory"))]
    ManifestNotFound {
        /// where we looked
        path: Utf8PathBuf,
    },

    /// A manifest file exists but won't parse
    #[error("couldn't parse manifest\n{path}\n{details}")]
    ManifestParse {
        /// path to the offending file
        path: Utf8PathBuf,
        /// structural message (line/column preserved from the parser)
        details: String,
    },

    /// A manifest parsed but breaks the profile contract
    #[error("invalid manifest: {message}")]
    ManifestValidation {
        /// what was wrong
        message: String,
    },

    /// The include graph has a cycle
    #[error("manifest include cycle: {}", chain.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(" -> "))]
    #[diagnostic(help("remove one of the includes to break the cycle"))]
    IncludeCycle {
        /// the absolute include paths, in traversal order, ending at the repeat
        chain: Vec<Utf8PathBuf>,
    },

    /// A configModules entry names a module the catalog doesn't know
    #[error("unknown config module '{id}'")]
    #[diagnostic(help("known modules: {}", known.join(", ")))]
    UnknownModule {
        /// the id that failed to resolve
        id: String,
        /// every id the catalog does know, sorted
        known: Vec<String>,
    },

    /// A manifest references bundles/recipes but no repository root was found
    #[error("couldn't locate a repository root (a directory containing both bundles/ and recipes/) above\n{manifest_path}")]
    #[diagnostic(help("set OUTFITTER_ROOT to the repository root, or move the manifest under it"))]
    RepoRootNotFound {
        /// the manifest that referenced bundles or recipes
        manifest_path: Utf8PathBuf,
    },

    /// A manifest declares a version we don't speak
    #[error("manifest version {found} is not supported (expected 1)")]
    UnsupportedManifestVersion {
        /// the version field we found
        found: i64,
    },

    /// A persisted document declares an incompatible schema version
    #[error("schema version {found} is not compatible with this build (expected {expected})")]
    #[diagnostic(help("re-capture the bundle with a matching CLI version"))]
    SchemaIncompatible {
        /// version found in the document
        found: String,
        /// version this build speaks
        expected: String,
    },

    /// Bad command-line argument or argument combination
    #[error("{message}")]
    InvalidArgument {
        /// what was wrong
        message: String,
        /// how to fix it
        #[help]
        help: Option<String>,
    },

    /// The requested plan file doesn't exist
    #[error("plan not found at {path}")]
    #[diagnostic(help("run 'outfitter plan' first, or check the path"))]
    PlanNotFound {
        /// where we looked
        path: Utf8PathBuf,
    },

    /// A plan file exists but won't parse
    #[error("couldn't parse plan\n{path}\n{details}")]
    PlanParse {
        /// path to the offending file
        path: Utf8PathBuf,
        /// parser message
        details: String,
    },

    /// The requested run record doesn't exist
    #[error("no run record found for '{run_id}'")]
    #[diagnostic(help("'outfitter report --last 10' lists recent runs"))]
    RunNotFound {
        /// the id that failed to resolve
        run_id: String,
    },

    /// No journal exists to revert
    #[error("no restore journal found{}", run_id.as_ref().map(|r| format!(" for run '{r}'")).unwrap_or_default())]
    #[diagnostic(help("revert needs a prior non-dry-run restore"))]
    JournalNotFound {
        /// the specific run requested, if any
        run_id: Option<String>,
    },

    /// The active package driver isn't usable on this host
    #[error("the '{driver}' package driver is not available on this system")]
    #[diagnostic(help("install the package manager, or re-run with --driver to pick another"))]
    DriverNotAvailable {
        /// the driver we tried
        driver: String,
    },

    /// The driver reported nothing installed during a capture
    #[error("the '{driver}' driver reported no installed packages; refusing to capture an empty profile")]
    CaptureEmpty {
        /// the driver we asked
        driver: String,
    },

    /// An operation needed elevation the process doesn't have
    #[error("'{target}' requires administrator privileges")]
    #[diagnostic(help("re-run from an elevated shell"))]
    PermissionDenied {
        /// the target that needed elevation
        target: String,
    },

    /// A bundle zip is missing its manifest
    #[error("bundle at {path} contains no manifest.jsonc")]
    InvalidBundle {
        /// the zip we opened
        path: Utf8PathBuf,
    },

    /// A home directory couldn't be determined
    #[error("couldn't determine the home directory")]
    #[diagnostic(help("set HOME (or USERPROFILE on windows)"))]
    NoHomeDir,

    /// A path expression used a token we don't define
    #[error("unknown path token '${{{token}}}' in '{path}'")]
    UnknownPathToken {
        /// the token that failed to resolve
        token: String,
        /// the full path expression
        path: String,
    },
}

impl OutfitterError {
    /// The wire error code this failure surfaces as
    pub fn code(&self) -> ErrorCode {
        match self {
            OutfitterError::ManifestNotFound { .. } => ErrorCode::ManifestNotFound,
            OutfitterError::ManifestParse { .. } => ErrorCode::ManifestParseError,
            OutfitterError::ManifestValidation { .. }
            | OutfitterError::IncludeCycle { .. }
            | OutfitterError::UnknownModule { .. }
            | OutfitterError::RepoRootNotFound { .. }
            | OutfitterError::UnsupportedManifestVersion { .. } => {
                ErrorCode::ManifestValidationError
            }
            OutfitterError::SchemaIncompatible { .. } => ErrorCode::SchemaIncompatible,
            OutfitterError::InvalidArgument { .. }
            | OutfitterError::UnknownPathToken { .. } => ErrorCode::InvalidArgument,
            OutfitterError::PlanNotFound { .. } => ErrorCode::PlanNotFound,
            OutfitterError::PlanParse { .. } => ErrorCode::PlanParseError,
            OutfitterError::RunNotFound { .. } | OutfitterError::JournalNotFound { .. } => {
                ErrorCode::RunNotFound
            }
            OutfitterError::DriverNotAvailable { .. } => ErrorCode::WingetNotAvailable,
            OutfitterError::CaptureEmpty { .. } => ErrorCode::WingetCaptureEmpty,
            OutfitterError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            OutfitterError::InvalidBundle { .. } => ErrorCode::ManifestValidationError,
            OutfitterError::Io(_)
            | OutfitterError::Asset(_)
            | OutfitterError::Cmd(_)
            | OutfitterError::Json(_)
            | OutfitterError::FromPathBufError(_)
            | OutfitterError::NoHomeDir => ErrorCode::InternalError,
        }
    }

    /// One-sentence remediation for the envelope, when we have one
    pub fn remediation(&self) -> Option<String> {
        self.help().map(|h| h.to_string())
    }

    /// Convert into the envelope's structured error shape
    pub fn to_envelope_error(&self) -> outfitter_schema::EnvelopeError {
        outfitter_schema::EnvelopeError {
            code: self.code(),
            message: self.to_string(),
            detail: None,
            remediation: self.remediation(),
            docs_key: None,
        }
    }
}
