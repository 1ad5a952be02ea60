//! The bundle packager: stage a profile and its config payload into a zip,
//! and extract one back out into a working directory.
//!
//! Bundles are written staged-then-renamed so a crash never leaves a
//! half-written zip where a profile resolver might find it.

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use outfitter_schema::BundleMetadata;
use temp_dir::TempDir;
use tracing::{debug, info};

use crate::catalog::{Catalog, CaptureReport, Discoveries};
use crate::errors::{OutfitterError, OutfitterResult};
use crate::manifest::{LoadOptions, LoadedManifest};
use crate::{manifest, paths, state};

/// Name of the manifest inside every bundle
pub const BUNDLE_MANIFEST_NAME: &str = "manifest.jsonc";
/// Directory holding config payloads inside a bundle
pub const BUNDLE_CONFIGS_DIR: &str = "configs";
/// Name of the metadata document inside every bundle
pub const BUNDLE_METADATA_NAME: &str = "metadata.json";

/// What `create_bundle` produced
#[derive(Debug)]
pub struct BundleReport {
    /// The finished zip
    pub zip_path: Utf8PathBuf,
    /// The metadata that was written into it
    pub metadata: BundleMetadata,
    /// What the capture copied and skipped
    pub capture: CaptureReport,
}

/// Stage the manifest plus its matched config payloads and zip them.
///
/// The staged manifest is self-contained: config modules are expanded, their
/// restore sources rewritten to `configs/<moduleDir>/...`, and the
/// `configModules` field cleared so the target machine needs no catalog.
pub fn create_bundle(
    loaded: &LoadedManifest,
    zip_path: &Utf8Path,
    installed_refs: &[String],
    catalog: &mut Catalog,
    cli_version: &str,
    capture_warnings: Vec<String>,
) -> OutfitterResult<BundleReport> {
    let staging = TempDir::new()?;
    let staging_root = Utf8PathBuf::try_from(staging.path().to_path_buf())?;

    // which modules contribute payloads: everything the manifest asked for
    // plus everything that matches the installed set
    let mut selection = loaded.manifest.config_modules.clone();
    for matched in catalog.matches_for_apps(installed_refs, &Discoveries::default())? {
        if !selection.contains(&matched.module_id) {
            selection.push(matched.module_id);
        }
    }
    selection.retain(|id| !loaded.manifest.exclude_configs.contains(id));

    let configs_root = staging_root.join(BUNDLE_CONFIGS_DIR);
    let capture = catalog.capture_files(&selection, &configs_root)?;

    // rewrite the expanded manifest for life inside the bundle
    let mut staged = loaded.manifest.clone();
    for item in &mut staged.restore {
        if let Some(module_id) = &item.from_module {
            let Some(module) = catalog.get(module_id)?.cloned() else {
                continue;
            };
            let source_path = Utf8PathBuf::from(&item.source);
            if let Ok(rel) = source_path.strip_prefix(&module.module_dir) {
                item.source = format!("{BUNDLE_CONFIGS_DIR}/{}/{rel}", module.dir_name());
            }
        } else if !paths::is_absolute(&item.source) {
            // inline items with relative sources travel in the bundle too,
            // at the same relative location
            let origin = loaded.dir.join(&item.source);
            if origin.exists() {
                let staged_path = staging_root.join(&item.source);
                crate::restore::copy_any(&origin, &staged_path)?;
            }
        }
    }
    staged.config_modules.clear();
    staged.exclude_configs.clear();
    staged.includes.clear();
    staged.bundles.clear();
    staged.recipes.clear();

    let manifest_json = serde_json::to_string_pretty(&serde_json::to_value(&staged)?)?;
    LocalAsset::write_new_all(&manifest_json, staging_root.join(BUNDLE_MANIFEST_NAME))?;

    let metadata = BundleMetadata {
        schema_version: outfitter_schema::SCHEMA_VERSION.to_owned(),
        captured_at: state::now_utc(),
        machine_name: state::machine_name(),
        cli_version: cli_version.to_owned(),
        config_modules_included: capture.modules_captured.clone(),
        config_modules_skipped: selection
            .iter()
            .filter(|id| !capture.modules_captured.contains(id))
            .cloned()
            .collect(),
        capture_warnings,
    };
    let metadata_json = serde_json::to_string_pretty(&metadata)?;
    LocalAsset::write_new_all(&metadata_json, staging_root.join(BUNDLE_METADATA_NAME))?;

    // stage the zip next to its destination, then rename into place
    if let Some(parent) = zip_path.parent() {
        LocalAsset::create_dir_all(parent)?;
    }
    let tmp_path = Utf8PathBuf::from(format!("{zip_path}.tmp"));
    LocalAsset::zip_dir(&staging_root, &tmp_path, None::<&Utf8Path>)?;
    std::fs::rename(&tmp_path, zip_path)?;
    info!("bundle written to {zip_path}");

    Ok(BundleReport {
        zip_path: zip_path.to_owned(),
        metadata,
        capture,
    })
}

/// An extracted bundle; dropping it cleans the working directory up
#[derive(Debug)]
pub struct ExpandedBundle {
    /// The extraction directory guard (explicit cleanup handle)
    dir: TempDir,
    /// Root of the extracted tree
    pub root: Utf8PathBuf,
    /// The bundle's manifest
    pub manifest_path: Utf8PathBuf,
    /// Whether the bundle carries a config payload
    pub has_configs: bool,
    /// The bundle's metadata, when it has one
    pub metadata: Option<BundleMetadata>,
}

impl ExpandedBundle {
    /// Delete the working directory now instead of at drop
    pub fn cleanup(self) -> OutfitterResult<()> {
        Ok(self.dir.cleanup()?)
    }
}

/// Extract a bundle zip into a fresh working directory
pub fn expand_bundle(zip_path: &Utf8Path) -> OutfitterResult<ExpandedBundle> {
    if !zip_path.exists() {
        return Err(OutfitterError::ManifestNotFound {
            path: zip_path.to_owned(),
        });
    }
    let dir = TempDir::new()?;
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf())?;
    LocalAsset::unzip_all(zip_path, &root)?;
    debug!("bundle {zip_path} expanded to {root}");

    let manifest_path = root.join(BUNDLE_MANIFEST_NAME);
    if !manifest_path.exists() {
        return Err(OutfitterError::InvalidBundle {
            path: zip_path.to_owned(),
        });
    }

    let metadata_path = root.join(BUNDLE_METADATA_NAME);
    let metadata = if metadata_path.exists() {
        let text = LocalAsset::load_string(&metadata_path)?;
        let metadata: BundleMetadata = serde_json::from_str(&text)?;
        check_schema_compatible(&metadata.schema_version)?;
        Some(metadata)
    } else {
        None
    };

    let has_configs = root.join(BUNDLE_CONFIGS_DIR).is_dir();
    Ok(ExpandedBundle {
        dir,
        root,
        manifest_path,
        has_configs,
        metadata,
    })
}

/// Major-version compatibility gate for bundle metadata
fn check_schema_compatible(found: &str) -> OutfitterResult<()> {
    let ours_major = outfitter_schema::SCHEMA_VERSION
        .split('.')
        .next()
        .unwrap_or("1");
    let theirs_major = found.split('.').next().unwrap_or("");
    if ours_major != theirs_major {
        return Err(OutfitterError::SchemaIncompatible {
            found: found.to_owned(),
            expected: outfitter_schema::SCHEMA_VERSION.to_owned(),
        });
    }
    Ok(())
}

/// How a profile selector resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// A bundle zip that needs expanding
    Zip(Utf8PathBuf),
    /// A bare manifest file
    Manifest(Utf8PathBuf),
}

/// Probe a profile name under the profiles directory:
/// `<name>.zip` → `<name>/manifest.jsonc` → `<name>.jsonc`; first hit wins.
pub fn resolve_profile(name: &str, profiles_dir: &Utf8Path) -> Option<ProfileSource> {
    let zip = profiles_dir.join(format!("{name}.zip"));
    if zip.is_file() {
        return Some(ProfileSource::Zip(zip));
    }
    let nested = profiles_dir.join(name).join(BUNDLE_MANIFEST_NAME);
    if nested.is_file() {
        return Some(ProfileSource::Manifest(nested));
    }
    let flat = profiles_dir.join(format!("{name}.jsonc"));
    if flat.is_file() {
        return Some(ProfileSource::Manifest(flat));
    }
    None
}

/// Load the manifest inside an expanded bundle (modules are already folded
/// in by `create_bundle`, so expansion is skipped)
pub fn load_bundle_manifest(
    bundle: &ExpandedBundle,
    catalog: &mut Catalog,
) -> OutfitterResult<LoadedManifest> {
    manifest::load(
        &bundle.manifest_path,
        catalog,
        &LoadOptions {
            skip_module_expansion: true,
        },
    )
}
