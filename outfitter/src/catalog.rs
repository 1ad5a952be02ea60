//! The config module catalog: an in-memory, lazily populated index of the
//! `module.jsonc` files under a modules directory.
//!
//! The catalog is an explicit store owned by the command being executed and
//! passed to the loader; nothing here is process-global. Scanning happens at
//! most once per store unless [`Catalog::clear`][] is called.

use std::collections::BTreeMap;

use axoasset::LocalAsset;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::OutfitterResult;
use crate::manifest::{RestoreItem, VerifyItem};
use crate::{jsonc, paths, sensitive};

/// How sensitive a module's captured state is
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sensitivity {
    /// Freely shareable
    Low,
    /// Contains preferences worth reviewing before sharing
    Medium,
    /// Contains identifying configuration
    High,
    /// Contains secrets; never captured by default
    Sensitive,
    /// Only meaningful on the machine it was captured on
    MachineBound,
}

/// Patterns deciding whether a module applies to an observed system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRules {
    /// Winget package ids (glob via `*` or exact)
    #[serde(default)]
    pub winget: Vec<String>,
    /// Discovered executable names
    #[serde(default)]
    pub exe: Vec<String>,
    /// Discovered uninstall-entry display names
    #[serde(default)]
    pub uninstall_display_name: Vec<String>,
}

impl MatchRules {
    fn is_empty(&self) -> bool {
        self.winget.is_empty() && self.exe.is_empty() && self.uninstall_display_name.is_empty()
    }
}

/// One file a module captures from the live system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFile {
    /// Path expression on the live system
    pub source: String,
    /// Relative destination inside the module's payload directory
    pub dest: String,
    /// Missing-and-optional is a skip, missing-and-required is a warning
    #[serde(default)]
    pub optional: bool,
}

/// A module's capture recipe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSpec {
    /// Files to copy into the payload
    #[serde(default)]
    pub files: Vec<CaptureFile>,
    /// Globs never to capture even when nested under a captured directory
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// Extra deny patterns for a module's own secrets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitiveSpec {
    /// Path patterns never to capture
    #[serde(default)]
    pub files: Vec<String>,
}

/// A reusable bundle of restore/verify/capture recipes for one piece of
/// software
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigModule {
    /// Dotted id (`apps.git`)
    pub id: String,
    /// Human name
    pub display_name: String,
    /// How this module matches an observed system
    #[serde(default)]
    pub matches: MatchRules,
    /// Restore items contributed on expansion
    #[serde(default)]
    pub restore: Vec<RestoreItem>,
    /// Verify items contributed on expansion
    #[serde(default)]
    pub verify: Vec<VerifyItem>,
    /// Capture recipe
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureSpec>,
    /// How sensitive this module's state is
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Sensitivity>,
    /// Module-specific deny patterns
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<SensitiveSpec>,
    /// Where the module.jsonc lives (not serialized; set after parse)
    #[serde(skip)]
    pub file_path: Utf8PathBuf,
    /// The module's directory (not serialized; set after parse)
    #[serde(skip)]
    pub module_dir: Utf8PathBuf,
}

impl ConfigModule {
    /// The directory name this module's payload nests under in a bundle
    pub fn dir_name(&self) -> &str {
        self.module_dir.file_name().unwrap_or(self.id.as_str())
    }
}

/// Why a module matched an observed system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReason {
    /// Which `matches` field produced the hit (`winget`, `exe`,
    /// `uninstallDisplayName`)
    pub field: String,
    /// The pattern that matched
    pub pattern: String,
    /// The observed value it matched against
    pub value: String,
}

/// One matched module and every reason it matched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMatch {
    /// The module's id
    pub module_id: String,
    /// All match reasons, in field order
    pub reasons: Vec<MatchReason>,
}

/// Discovered system facts the matcher compares patterns against
#[derive(Debug, Clone, Default)]
pub struct Discoveries {
    /// Executable names found on the system
    pub exe_names: Vec<String>,
    /// Uninstall-entry display names found on the system
    pub uninstall_display_names: Vec<String>,
}

/// Result of copying module capture files into a payload directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    /// Files copied, payload-relative
    pub copied: Vec<String>,
    /// Files deliberately not copied (optional-missing, excluded, sensitive)
    pub skipped: Vec<String>,
    /// Required files that weren't there
    pub missing: Vec<String>,
    /// Modules that contributed at least one copied file
    pub modules_captured: Vec<String>,
    /// Human-facing warnings
    pub warnings: Vec<String>,
}

/// The lazily populated module index
#[derive(Debug)]
pub struct Catalog {
    modules_dir: Utf8PathBuf,
    loaded: Option<BTreeMap<String, ConfigModule>>,
    warnings: Vec<String>,
}

impl Catalog {
    /// A catalog over a modules directory (scanned on first access)
    pub fn new(modules_dir: impl Into<Utf8PathBuf>) -> Self {
        Catalog {
            modules_dir: modules_dir.into(),
            loaded: None,
            warnings: vec![],
        }
    }

    /// Drop the cached index; the next access rescans the disk
    pub fn clear(&mut self) {
        self.loaded = None;
        self.warnings.clear();
    }

    /// Warnings raised during the scan (invalid modules, duplicate ids)
    pub fn warnings(&mut self) -> OutfitterResult<&[String]> {
        self.ensure_loaded()?;
        Ok(&self.warnings)
    }

    /// Every known module id, sorted
    pub fn known_ids(&mut self) -> OutfitterResult<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.loaded.as_ref().unwrap().keys().cloned().collect())
    }

    /// Look up one module by id
    pub fn get(&mut self, id: &str) -> OutfitterResult<Option<&ConfigModule>> {
        self.ensure_loaded()?;
        Ok(self.loaded.as_ref().unwrap().get(id))
    }

    /// Number of modules in the index
    pub fn len(&mut self) -> OutfitterResult<usize> {
        self.ensure_loaded()?;
        Ok(self.loaded.as_ref().unwrap().len())
    }

    /// Whether the index is empty
    pub fn is_empty(&mut self) -> OutfitterResult<bool> {
        Ok(self.len()? == 0)
    }

    fn ensure_loaded(&mut self) -> OutfitterResult<()> {
        if self.loaded.is_some() {
            return Ok(());
        }
        let mut modules = BTreeMap::new();
        if self.modules_dir.exists() {
            for entry in WalkDir::new(&self.modules_dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && entry.file_name() == "module.jsonc" {
                    let Ok(path) = Utf8PathBuf::try_from(entry.path().to_path_buf()) else {
                        continue;
                    };
                    match load_module(&path) {
                        Ok(module) => {
                            if modules.contains_key(&module.id) {
                                self.warnings.push(format!(
                                    "duplicate module id '{}' at {path}; keeping the first",
                                    module.id
                                ));
                                warn!("duplicate module id '{}' at {path}", module.id);
                            } else {
                                debug!("catalog: loaded module '{}'", module.id);
                                modules.insert(module.id.clone(), module);
                            }
                        }
                        Err(reason) => {
                            self.warnings.push(format!("skipping {path}: {reason}"));
                            warn!("catalog: skipping {path}: {reason}");
                        }
                    }
                }
            }
        }
        self.loaded = Some(modules);
        Ok(())
    }

    /// For every module with at least one hit, the reasons it matched the
    /// observed system. Output sorted by module id.
    pub fn matches_for_apps(
        &mut self,
        winget_ids: &[String],
        discoveries: &Discoveries,
    ) -> OutfitterResult<Vec<ModuleMatch>> {
        self.ensure_loaded()?;
        let mut out = vec![];
        for (id, module) in self.loaded.as_ref().unwrap() {
            let mut reasons = vec![];
            collect_reasons(&mut reasons, "winget", &module.matches.winget, winget_ids);
            collect_reasons(&mut reasons, "exe", &module.matches.exe, &discoveries.exe_names);
            collect_reasons(
                &mut reasons,
                "uninstallDisplayName",
                &module.matches.uninstall_display_name,
                &discoveries.uninstall_display_names,
            );
            if !reasons.is_empty() {
                out.push(ModuleMatch {
                    module_id: id.clone(),
                    reasons,
                });
            }
        }
        Ok(out)
    }

    /// Copy the capture files of the selected modules into `payload_root`,
    /// honouring exclude globs and both deny lists
    pub fn capture_files(
        &mut self,
        selection: &[String],
        payload_root: &Utf8Path,
    ) -> OutfitterResult<CaptureReport> {
        self.ensure_loaded()?;
        let mut report = CaptureReport::default();

        for id in selection {
            let Some(module) = self.loaded.as_ref().unwrap().get(id).cloned() else {
                report.warnings.push(format!("unknown module '{id}' in capture selection"));
                continue;
            };
            let Some(capture) = &module.capture else {
                continue;
            };
            let exclude = build_matchers(&capture.exclude_globs);
            let deny = module
                .sensitive
                .as_ref()
                .map(|s| build_matchers(&s.files))
                .unwrap_or_default();
            let module_out = payload_root.join(module.dir_name());
            let mut copied_any = false;

            for file in &capture.files {
                let source = match paths::expand(&file.source, Some(&module.module_dir)) {
                    Ok(p) => p,
                    Err(e) => {
                        report
                            .warnings
                            .push(format!("{id}: couldn't expand '{}': {e}", file.source));
                        continue;
                    }
                };
                if !source.exists() {
                    if file.optional {
                        report.skipped.push(format!("{id}/{}", file.dest));
                    } else {
                        report.missing.push(format!("{id}/{}", file.dest));
                        report
                            .warnings
                            .push(format!("{id}: missing capture source {source}"));
                    }
                    continue;
                }
                if matches_any(&exclude, &source) || matches_any(&deny, &source) {
                    report.skipped.push(format!("{id}/{}", file.dest));
                    continue;
                }
                if sensitive::is_sensitive(&source) {
                    report.skipped.push(format!("{id}/{}", file.dest));
                    report
                        .warnings
                        .push(format!("{id}: {source} is on the sensitive deny list"));
                    continue;
                }

                let dest = module_out.join(&file.dest);
                if let Some(parent) = dest.parent() {
                    LocalAsset::create_dir_all(parent)?;
                }
                if source.is_dir() {
                    copy_dir_filtered(&source, &dest, &exclude, &deny)?;
                } else {
                    LocalAsset::copy_file_to_file(&source, &dest)?;
                }
                report.copied.push(format!("{}/{}", module.dir_name(), file.dest));
                copied_any = true;
            }

            if copied_any {
                report.modules_captured.push(id.clone());
            }
        }
        Ok(report)
    }
}

fn load_module(path: &Utf8Path) -> Result<ConfigModule, String> {
    let text = LocalAsset::load_string(path).map_err(|e| e.to_string())?;
    let value = jsonc::parse_str(&text, path).map_err(|e| e.to_string())?;
    let mut module: ConfigModule =
        serde_json::from_value(value).map_err(|e| e.to_string())?;

    if module.id.trim().is_empty() {
        return Err("module has an empty id".to_owned());
    }
    if module.display_name.trim().is_empty() {
        return Err("module has an empty displayName".to_owned());
    }
    if module.matches.is_empty() {
        return Err("module declares no matches".to_owned());
    }

    module.file_path = path.to_owned();
    module.module_dir = path
        .parent()
        .map(|p| p.to_owned())
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    Ok(module)
}

/// Compare a glob-or-exact pattern list against observed values,
/// case-insensitively, recording every hit
fn collect_reasons(
    out: &mut Vec<MatchReason>,
    field: &str,
    patterns: &[String],
    values: &[String],
) {
    for pattern in patterns {
        for value in values {
            if glob_or_exact_match(pattern, value) {
                out.push(MatchReason {
                    field: field.to_owned(),
                    pattern: pattern.clone(),
                    value: value.clone(),
                });
            }
        }
    }
}

fn glob_or_exact_match(pattern: &str, value: &str) -> bool {
    if pattern.contains('*') {
        match Glob::new(&pattern.to_ascii_lowercase()) {
            Ok(glob) => glob.compile_matcher().is_match(value.to_ascii_lowercase()),
            Err(_) => false,
        }
    } else {
        pattern.eq_ignore_ascii_case(value)
    }
}

fn build_matchers(patterns: &[String]) -> Vec<GlobMatcher> {
    patterns
        .iter()
        .filter_map(|p| Glob::new(p).ok().map(|g| g.compile_matcher()))
        .collect()
}

fn matches_any(matchers: &[GlobMatcher], path: &Utf8Path) -> bool {
    matchers.iter().any(|m| {
        m.is_match(path.as_std_path())
            || path.file_name().map(|f| m.is_match(f)).unwrap_or(false)
    })
}

fn copy_dir_filtered(
    source: &Utf8Path,
    dest: &Utf8Path,
    exclude: &[GlobMatcher],
    deny: &[GlobMatcher],
) -> OutfitterResult<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let path = Utf8PathBuf::try_from(entry.path().to_path_buf())?;
        let rel = path
            .strip_prefix(source)
            .expect("walkdir yields children of its root");
        if rel.as_str().is_empty() {
            LocalAsset::create_dir_all(dest)?;
            continue;
        }
        if matches_any(exclude, &path) || matches_any(deny, &path) || sensitive::is_sensitive(&path)
        {
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
    Ok(())
}
