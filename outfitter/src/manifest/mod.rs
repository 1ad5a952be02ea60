//! The profile (manifest) data model.
//!
//! A manifest is built once per command by the loader and immutable
//! thereafter. The types here are the *expanded* shape: includes, bundles,
//! recipes, and config modules have already been folded in by
//! [`loader::load`][], and provenance is carried in `_fromModule` tags.

use std::collections::BTreeMap;

use outfitter_schema::{ArrayStrategy, MergeFormat, NewlineFlavor, RestoreType, VerifyType};
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::{load, validate_profile, LoadOptions, LoadedManifest, ProfileValidation};

/// The manifest version this build reads and writes
pub const MANIFEST_VERSION: i64 = 1;

/// A declarative end-state document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Format version (currently 1)
    #[serde(default = "default_version")]
    pub version: i64,
    /// Slug naming this profile
    #[serde(default)]
    pub name: String,
    /// When this profile was captured (ISO-8601 UTC), if it was
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
    /// Applications that must be installed
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<AppEntry>,
    /// Typed file operations to perform
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub restore: Vec<RestoreItem>,
    /// Invariants that must hold after apply
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verify: Vec<VerifyItem>,
    /// Other manifest files folded into this one (resolved by the loader)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    /// Catalog-relative bundle ids contributing restore items
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<String>,
    /// Catalog-relative recipe ids contributing restore items
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipes: Vec<String>,
    /// Config module ids to expand from the catalog
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_modules: Vec<String>,
    /// Module ids to suppress even if listed
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_configs: Vec<String>,
}

fn default_version() -> i64 {
    MANIFEST_VERSION
}

/// One application the profile wants installed
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppEntry {
    /// Slug, unique within the expanded manifest
    #[serde(default)]
    pub id: String,
    /// platform tag -> package-manager-specific identifier
    ///
    /// A BTreeMap so the expanded hash is independent of authoring order.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, String>,
}

impl AppEntry {
    /// The ref for a platform tag, if the profile has one
    pub fn ref_for(&self, platform: &str) -> Option<&str> {
        self.refs.get(platform).map(|s| s.as_str())
    }
}

/// One typed file operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreItem {
    /// The operation type (`copy` when unspecified)
    #[serde(rename = "type", default)]
    pub kind: RestoreType,
    /// Source path expression (relative to payload root or manifest dir)
    pub source: String,
    /// Target path expression in the target host's namespace
    pub target: String,
    /// Back up the target before modification (anything but `false` means yes)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
    /// Refuse to run without elevation
    #[serde(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_admin: bool,
    /// Structural format for `merge`
    #[serde(default)]
    pub format: MergeFormat,
    /// Array handling for a `json` merge
    #[serde(default)]
    pub array_strategy: ArrayStrategy,
    /// Skip source lines already present in the target (`append`)
    #[serde(default)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dedupe: bool,
    /// Newline flavour for `append`
    #[serde(default)]
    pub newline: NewlineFlavor,
    /// Which config module contributed this item, for provenance
    #[serde(rename = "_fromModule")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_module: Option<String>,
}

impl RestoreItem {
    /// Whether the target should be backed up before modification
    pub fn wants_backup(&self) -> bool {
        self.backup != Some(false)
    }
}

/// One invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyItem {
    /// The typed check
    #[serde(flatten)]
    pub check: VerifyCheck,
    /// Which config module contributed this item, for provenance
    #[serde(rename = "_fromModule")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_module: Option<String>,
}

/// The typed half of a verify item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VerifyCheck {
    /// A file must exist at a path expression
    FileExists {
        /// the path to check
        path: String,
    },
    /// A command must resolve on PATH
    CommandExists {
        /// the command name to probe
        command: String,
    },
    /// A command must run and exit 0
    CommandSucceeds {
        /// the command line to run
        command: String,
    },
}

impl VerifyCheck {
    /// The wire kind of this check
    pub fn verify_type(&self) -> VerifyType {
        match self {
            VerifyCheck::FileExists { .. } => VerifyType::FileExists,
            VerifyCheck::CommandExists { .. } => VerifyType::CommandExists,
            VerifyCheck::CommandSucceeds { .. } => VerifyType::CommandSucceeds,
        }
    }
}

/// Produce the canonical JSON the expanded-manifest hash is computed over:
/// keys sorted, arrays in insertion order, `_`-prefixed internals excluded.
pub fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = BTreeMap::new();
            for (k, v) in map {
                if k.starts_with('_') {
                    continue;
                }
                sorted.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

impl Manifest {
    /// Serialize to the canonical form the expanded hash is computed over
    pub fn canonical_json(&self) -> String {
        let value = serde_json::to_value(self).expect("manifest serialization is infallible");
        serde_json::to_string(&canonicalize(&value)).expect("canonical value serializes")
    }

    /// Every app id, in manifest order
    pub fn app_ids(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|a| a.id.as_str())
    }
}
