//! Loading, expanding, and hashing manifests.
//!
//! `load` is a pure folding step over the include/catalog graph: parse the
//! root file, fold includes in (cycle-checked), prepend bundle and recipe
//! fragments, expand config modules from the catalog, and hash the result.
//! The returned manifest is immutable for the rest of the command.
//!
//! Expansion order of the final `restore` array:
//! bundle-recipes → manifest-recipes → root-inline → included-file items →
//! config-module items.

use axoasset::{LocalAsset, SourceFile};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::catalog::Catalog;
use crate::errors::{OutfitterError, OutfitterResult};
use crate::manifest::{Manifest, MANIFEST_VERSION};
use crate::{jsonc, state};

/// Knobs for `load`
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Leave `configModules` unexpanded (capture paths use this to keep the
    /// authored module list intact)
    pub skip_module_expansion: bool,
}

/// A fully expanded manifest plus its identity
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// The expanded, normalized manifest
    pub manifest: Manifest,
    /// Absolute path of the root manifest file
    pub path: Utf8PathBuf,
    /// Directory containing the root manifest
    pub dir: Utf8PathBuf,
    /// Truncated SHA-256 over the root file's raw bytes (CRLF→LF)
    pub raw_hash: String,
    /// Truncated SHA-256 over the canonical expanded document
    pub expanded_hash: String,
    /// Non-fatal findings from loading
    pub warnings: Vec<String>,
}

impl LoadedManifest {
    /// The identity block run records carry
    pub fn info(&self) -> outfitter_schema::ManifestInfo {
        outfitter_schema::ManifestInfo {
            path: self.path.to_string(),
            name: self.manifest.name.clone(),
            hash: self.raw_hash.clone(),
            expanded_hash: Some(self.expanded_hash.clone()),
        }
    }
}

/// Load and expand the manifest at `path`
pub fn load(
    path: &Utf8Path,
    catalog: &mut Catalog,
    opts: &LoadOptions,
) -> OutfitterResult<LoadedManifest> {
    let abs = absolutize(path)?;
    let dir = abs
        .parent()
        .map(|p| p.to_owned())
        .unwrap_or_else(|| Utf8PathBuf::from("."));

    let raw = LocalAsset::load_string(&abs)?;
    let raw_hash = state::hash16(&raw);

    let mut stack = vec![];
    let mut warnings = vec![];
    let mut manifest = load_recursive(&abs, &mut stack, &mut warnings)?;

    resolve_bundles_and_recipes(&mut manifest, &abs, &dir, &mut warnings)?;

    if !opts.skip_module_expansion {
        expand_config_modules(&mut manifest, catalog)?;
    }

    dedupe_apps(&mut manifest, &mut warnings);

    let expanded_hash = state::hash16_raw(manifest.canonical_json().as_bytes());
    debug!("loaded manifest '{}' ({} apps, {} restores, {} verifies)",
        manifest.name, manifest.apps.len(), manifest.restore.len(), manifest.verify.len());

    Ok(LoadedManifest {
        manifest,
        path: abs,
        dir,
        raw_hash,
        expanded_hash,
        warnings,
    })
}

/// Result of the lightweight profile contract check
#[derive(Debug, Clone, Default)]
pub struct ProfileValidation {
    /// Contract violations; non-empty means the profile is rejected
    pub errors: Vec<String>,
    /// Soft findings (app entries lacking an id, etc.)
    pub warnings: Vec<String>,
}

impl ProfileValidation {
    /// Whether the profile passes
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The profile contract check external consumers call before trusting a file
pub fn validate_profile(path: &Utf8Path) -> OutfitterResult<ProfileValidation> {
    let mut result = ProfileValidation::default();

    if !path.exists() {
        result.errors.push(format!("manifest not found at {path}"));
        return Ok(result);
    }
    let text = LocalAsset::load_string(path)?;
    let value = match parse_document(path, &text) {
        Ok(v) => v,
        Err(e) => {
            result.errors.push(e.to_string());
            return Ok(result);
        }
    };

    let Some(map) = value.as_object() else {
        result.errors.push("manifest root must be an object".to_owned());
        return Ok(result);
    };

    match map.get("version") {
        None => {}
        Some(v) => match v.as_i64() {
            Some(MANIFEST_VERSION) => {}
            Some(other) => result
                .errors
                .push(format!("version {other} is not supported (expected 1)")),
            None => result.errors.push("version must be an integer".to_owned()),
        },
    }

    match map.get("apps") {
        None => {}
        Some(serde_json::Value::Array(apps)) => {
            for (idx, app) in apps.iter().enumerate() {
                let has_id = app
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| !s.trim().is_empty())
                    .unwrap_or(false);
                if !has_id {
                    result.warnings.push(format!("apps[{idx}] has no id"));
                }
            }
        }
        Some(_) => result.errors.push("apps must be an array".to_owned()),
    }

    Ok(result)
}

fn absolutize(path: &Utf8Path) -> OutfitterResult<Utf8PathBuf> {
    if !path.exists() {
        return Err(OutfitterError::ManifestNotFound {
            path: path.to_owned(),
        });
    }
    let canon = path
        .canonicalize()
        .map_err(OutfitterError::Io)?;
    Ok(Utf8PathBuf::try_from(canon)?)
}

fn load_recursive(
    abs: &Utf8Path,
    stack: &mut Vec<Utf8PathBuf>,
    warnings: &mut Vec<String>,
) -> OutfitterResult<Manifest> {
    if stack.iter().any(|p| p == abs) {
        let mut chain = stack.clone();
        chain.push(abs.to_owned());
        return Err(OutfitterError::IncludeCycle { chain });
    }
    stack.push(abs.to_owned());

    let text = LocalAsset::load_string(abs)?;
    let value = parse_document(abs, &text)?;
    let mut manifest = manifest_from_value(abs, value)?;

    let dir = abs
        .parent()
        .map(|p| p.to_owned())
        .unwrap_or_else(|| Utf8PathBuf::from("."));

    let includes = std::mem::take(&mut manifest.includes);
    for include in &includes {
        let include_path = crate::paths::expand(include, Some(&dir))?;
        let include_abs = absolutize(&include_path)?;
        let included = load_recursive(&include_abs, stack, warnings)?;
        merge_included(&mut manifest, included);
    }
    manifest.includes = includes;

    stack.pop();
    Ok(manifest)
}

/// Parse one manifest file by extension into a JSON tree
fn parse_document(path: &Utf8Path, text: &str) -> OutfitterResult<serde_json::Value> {
    match path.extension().unwrap_or("jsonc") {
        "yaml" | "yml" => {
            let src = SourceFile::new(path.as_str(), text.to_owned());
            src.deserialize_yaml().map_err(|e| OutfitterError::ManifestParse {
                path: path.to_owned(),
                details: e.to_string(),
            })
        }
        // .jsonc, .json, .json5, and anything else take the JSONC path
        _ => jsonc::parse_str(text, path),
    }
}

fn manifest_from_value(
    path: &Utf8Path,
    value: serde_json::Value,
) -> OutfitterResult<Manifest> {
    let value = normalize_value(value);

    if let Some(version) = value.get("version") {
        match version.as_i64() {
            Some(MANIFEST_VERSION) => {}
            Some(other) => {
                return Err(OutfitterError::UnsupportedManifestVersion { found: other })
            }
            None => {
                return Err(OutfitterError::ManifestValidation {
                    message: format!("{path}: version must be an integer"),
                })
            }
        }
    }

    serde_json::from_value(value).map_err(|e| OutfitterError::ManifestValidation {
        message: format!("{path}: {e}"),
    })
}

/// Fields that must be arrays in a normalized manifest
const ARRAY_FIELDS: &[&str] = &[
    "apps",
    "restore",
    "verify",
    "includes",
    "bundles",
    "recipes",
    "configModules",
    "excludeConfigs",
];

/// Ensure defaults and wrap single objects where arrays are expected
fn normalize_value(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(map) = value.as_object_mut() {
        for field in ARRAY_FIELDS {
            match map.get(*field) {
                None | Some(serde_json::Value::Null) => {
                    map.insert((*field).to_owned(), serde_json::Value::Array(vec![]));
                }
                Some(serde_json::Value::Array(_)) => {}
                Some(single) => {
                    let wrapped = serde_json::Value::Array(vec![single.clone()]);
                    map.insert((*field).to_owned(), wrapped);
                }
            }
        }
    }
    value
}

/// Merge rule for includes: array fields of the included document are
/// appended after those of the includer; scalar fields are taken from the
/// includer when set, otherwise filled from the include.
fn merge_included(base: &mut Manifest, included: Manifest) {
    base.apps.extend(included.apps);
    base.restore.extend(included.restore);
    base.verify.extend(included.verify);
    base.bundles.extend(included.bundles);
    base.recipes.extend(included.recipes);
    base.config_modules.extend(included.config_modules);
    base.exclude_configs.extend(included.exclude_configs);

    if base.name.is_empty() {
        base.name = included.name;
    }
    if base.captured.is_none() {
        base.captured = included.captured;
    }
}

/// Walk up from the manifest until a directory containing both `bundles/`
/// and `recipes/` is found; `OUTFITTER_ROOT` is the fallback
fn find_repo_root(manifest_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = Some(manifest_dir);
    while let Some(dir) = current {
        if dir.join("bundles").is_dir() && dir.join("recipes").is_dir() {
            return Some(dir.to_owned());
        }
        current = dir.parent();
    }
    if let Ok(root) = std::env::var("OUTFITTER_ROOT") {
        let root = Utf8PathBuf::from(root);
        if root.join("bundles").is_dir() && root.join("recipes").is_dir() {
            return Some(root);
        }
    }
    None
}

fn resolve_bundles_and_recipes(
    manifest: &mut Manifest,
    manifest_path: &Utf8Path,
    manifest_dir: &Utf8Path,
    warnings: &mut Vec<String>,
) -> OutfitterResult<()> {
    if manifest.bundles.is_empty() && manifest.recipes.is_empty() {
        return Ok(());
    }
    let root = find_repo_root(manifest_dir).ok_or_else(|| OutfitterError::RepoRootNotFound {
        manifest_path: manifest_path.to_owned(),
    })?;

    let mut prefix = vec![];
    for (kind, ids) in [("bundles", &manifest.bundles), ("recipes", &manifest.recipes)] {
        for id in ids {
            let fragment_path = root.join(kind).join(format!("{id}.jsonc"));
            if !fragment_path.exists() {
                return Err(OutfitterError::ManifestValidation {
                    message: format!("{kind} entry '{id}' not found at {fragment_path}"),
                });
            }
            let text = LocalAsset::load_string(&fragment_path)?;
            let value = parse_document(&fragment_path, &text)?;
            let fragment = manifest_from_value(&fragment_path, value)?;
            if fragment.restore.is_empty() {
                warnings.push(format!("{kind} entry '{id}' contributes no restore items"));
            }
            // fragment sources are relative to the fragment's directory
            let fragment_dir = fragment_path.parent().unwrap_or(&root).to_owned();
            for mut item in fragment.restore {
                if !crate::paths::is_absolute(&item.source) {
                    item.source = fragment_dir.join(&item.source).to_string();
                }
                prefix.push(item);
            }
        }
    }

    // bundle-recipes → manifest-recipes → inline restore
    let inline = std::mem::take(&mut manifest.restore);
    prefix.extend(inline);
    manifest.restore = prefix;
    Ok(())
}

/// Expand `configModules` through the catalog: at most once per id, skipping
/// `excludeConfigs`, tagging contributed items with their provenance
fn expand_config_modules(
    manifest: &mut Manifest,
    catalog: &mut Catalog,
) -> OutfitterResult<()> {
    let mut seen = std::collections::BTreeSet::new();
    for id in manifest.config_modules.clone() {
        if manifest.exclude_configs.contains(&id) || !seen.insert(id.clone()) {
            continue;
        }
        let Some(module) = catalog.get(&id)?.cloned() else {
            return Err(OutfitterError::UnknownModule {
                id,
                known: catalog.known_ids()?,
            });
        };
        for mut item in module.restore {
            item.from_module = Some(id.clone());
            // module sources resolve against the module's own directory
            if !crate::paths::is_absolute(&item.source) {
                item.source = module.module_dir.join(&item.source).to_string();
            }
            manifest.restore.push(item);
        }
        for mut item in module.verify {
            item.from_module = Some(id.clone());
            manifest.verify.push(item);
        }
    }
    Ok(())
}

/// App ids must be unique in the expanded manifest; later duplicates are
/// dropped with a warning
fn dedupe_apps(manifest: &mut Manifest, warnings: &mut Vec<String>) {
    let mut seen = std::collections::BTreeSet::new();
    let mut kept = Vec::with_capacity(manifest.apps.len());
    for (idx, app) in std::mem::take(&mut manifest.apps).into_iter().enumerate() {
        if app.id.trim().is_empty() {
            warnings.push(format!("apps[{idx}] has no id"));
            kept.push(app);
        } else if seen.insert(app.id.clone()) {
            kept.push(app);
        } else {
            warnings.push(format!("duplicate app id '{}' dropped", app.id));
        }
    }
    manifest.apps = kept;
}
