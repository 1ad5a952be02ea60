//! The package-manager driver abstraction.
//!
//! A driver answers three questions: is it usable on this host, what's
//! installed, and can it install one more thing. Implementations own their
//! subprocess management; the core calls `list_installed` exactly once per
//! run and treats the result as stable.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axoprocess::Cmd;
use camino::Utf8Path;
use tracing::{debug, warn};

use crate::errors::{OutfitterError, OutfitterResult};

/// Warning attached to a capture when `export` failed and `list` stood in
pub const EXPORT_FALLBACK_WARNING: &str = "WINGET_EXPORT_FAILED_FALLBACK_USED";

/// How long a version probe may take before the driver counts as unavailable
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The result of one install attempt
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Whether the package manager reported success
    pub success: bool,
    /// Failure details, when it didn't
    pub error: Option<String>,
    /// Captured subprocess output, when any was produced
    pub output: Option<String>,
}

impl InstallOutcome {
    /// A successful outcome
    pub fn ok(output: Option<String>) -> Self {
        InstallOutcome {
            success: true,
            error: None,
            output,
        }
    }

    /// A failed outcome
    pub fn failed(error: impl Into<String>, output: Option<String>) -> Self {
        InstallOutcome {
            success: false,
            error: Some(error.into()),
            output,
        }
    }
}

/// What a capture gets back from the driver
#[derive(Debug, Clone, Default)]
pub struct DriverExport {
    /// Every installed ref the driver reported
    pub refs: Vec<String>,
    /// Warnings raised while exporting (fallbacks etc.)
    pub warnings: Vec<String>,
}

/// A pluggable package-manager adapter
pub trait PackageDriver: Send + Sync {
    /// The name commands select this driver by (e.g. `winget`)
    fn name(&self) -> &'static str;

    /// Whether the driver can run on this host
    fn available(&self) -> bool;

    /// The set of installed refs; must be stable between calls within a run
    fn list_installed(&self) -> OutfitterResult<BTreeSet<String>>;

    /// Install one ref; at most one external process per call
    fn install(&self, package_ref: &str) -> InstallOutcome;

    /// Structured capture of the installed set, written to `path`
    fn export(&self, path: &Utf8Path) -> OutfitterResult<DriverExport>;
}

/// The drivers compiled into this build, dispatched by name
pub struct DriverRegistry {
    drivers: Vec<Box<dyn PackageDriver>>,
}

impl DriverRegistry {
    /// The default registry: winget plus the fake driver for staging
    pub fn new() -> Self {
        DriverRegistry {
            drivers: vec![Box::new(WingetDriver::new()), Box::<FakeDriver>::default()],
        }
    }

    /// A registry over an explicit driver set (embedders and tests)
    pub fn with_drivers(drivers: Vec<Box<dyn PackageDriver>>) -> Self {
        DriverRegistry { drivers }
    }

    /// Names of every registered driver
    pub fn names(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Look a driver up by name
    pub fn get(&self, name: &str) -> Option<&dyn PackageDriver> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .map(|d| d.as_ref())
    }

    /// The driver a command uses: the explicit override when given, else the
    /// platform default. Errors when the chosen driver isn't usable here.
    pub fn select(&self, requested: Option<&str>) -> OutfitterResult<&dyn PackageDriver> {
        let name = requested.unwrap_or(DEFAULT_DRIVER);
        let driver = self
            .get(name)
            .ok_or_else(|| OutfitterError::DriverNotAvailable {
                driver: name.to_owned(),
            })?;
        if !driver.available() {
            return Err(OutfitterError::DriverNotAvailable {
                driver: name.to_owned(),
            });
        }
        Ok(driver)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The platform default driver
pub const DEFAULT_DRIVER: &str = "winget";

/// Run `<cmd> --version` with a bounded wait, returning whether it exited
/// successfully. A driver that can't answer a version probe inside
/// [`PROBE_TIMEOUT`][] counts as unavailable.
///
/// This is the one place the crate spawns a process without `axoprocess`:
/// the bounded wait needs `try_wait` polling on the raw child.
pub fn probe_version(command: &str) -> bool {
    let spawned = std::process::Command::new(command)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .stdin(std::process::Stdio::null())
        .spawn();
    let Ok(mut child) = spawned else {
        return false;
    };
    let deadline = Instant::now() + PROBE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("version probe for '{command}' timed out");
                    return false;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => return false,
        }
    }
}

/// The winget adapter: thin subprocess plumbing around `winget.exe`
pub struct WingetDriver {
    available: std::sync::OnceLock<bool>,
}

impl WingetDriver {
    /// A winget adapter (availability probed lazily, once)
    pub fn new() -> Self {
        WingetDriver {
            available: std::sync::OnceLock::new(),
        }
    }

    fn run_export(&self, path: &Utf8Path) -> OutfitterResult<Vec<String>> {
        let mut cmd = Cmd::new("winget", "export installed packages");
        cmd.arg("export")
            .arg("-o")
            .arg(path.as_str())
            .arg("--accept-source-agreements")
            .check(false);
        let status = cmd.status()?;
        if !status.success() {
            return Err(OutfitterError::DriverNotAvailable {
                driver: "winget".to_owned(),
            });
        }
        let text = axoasset::LocalAsset::load_string(path)?;
        let doc: serde_json::Value = serde_json::from_str(&text)?;
        let mut refs = vec![];
        if let Some(sources) = doc.get("Sources").and_then(|v| v.as_array()) {
            for source in sources {
                if let Some(packages) = source.get("Packages").and_then(|v| v.as_array()) {
                    for package in packages {
                        if let Some(id) =
                            package.get("PackageIdentifier").and_then(|v| v.as_str())
                        {
                            refs.push(id.to_owned());
                        }
                    }
                }
            }
        }
        Ok(refs)
    }

    fn run_list(&self) -> OutfitterResult<Vec<String>> {
        let mut cmd = Cmd::new("winget", "list installed packages");
        cmd.arg("list")
            .arg("--accept-source-agreements")
            .check(false);
        let output = cmd.output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        // columnar output: Name  Id  Version  [...]; the header row ends at
        // the dashed separator line
        let mut refs = vec![];
        let mut past_header = false;
        for line in stdout.lines() {
            if !past_header {
                past_header = line.trim_start().starts_with('-');
                continue;
            }
            let mut columns = line.split_whitespace();
            let (Some(_name), Some(id)) = (columns.next(), columns.next()) else {
                continue;
            };
            refs.push(id.to_owned());
        }
        Ok(refs)
    }
}

impl Default for WingetDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageDriver for WingetDriver {
    fn name(&self) -> &'static str {
        "winget"
    }

    fn available(&self) -> bool {
        *self.available.get_or_init(|| probe_version("winget"))
    }

    fn list_installed(&self) -> OutfitterResult<BTreeSet<String>> {
        let dir = temp_dir::TempDir::new()?;
        let path = Utf8Path::from_path(dir.path())
            .expect("temp dirs are utf-8")
            .join("winget-export.json");
        let refs = match self.run_export(&path) {
            Ok(refs) => refs,
            Err(e) => {
                debug!("winget export failed ({e}); falling back to list");
                self.run_list()?
            }
        };
        Ok(refs.into_iter().collect())
    }

    fn install(&self, package_ref: &str) -> InstallOutcome {
        let mut cmd = Cmd::new("winget", format!("install {package_ref}"));
        cmd.arg("install")
            .arg("--id")
            .arg(package_ref)
            .arg("--exact")
            .arg("--silent")
            .arg("--accept-package-agreements")
            .arg("--accept-source-agreements")
            .check(false);
        match cmd.output() {
            Ok(output) => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                let text = if text.is_empty() { None } else { Some(text) };
                if output.status.success() {
                    InstallOutcome::ok(text)
                } else {
                    InstallOutcome::failed(
                        format!("winget exited with {}", output.status),
                        text,
                    )
                }
            }
            Err(e) => InstallOutcome::failed(e.to_string(), None),
        }
    }

    fn export(&self, path: &Utf8Path) -> OutfitterResult<DriverExport> {
        match self.run_export(path) {
            Ok(refs) => Ok(DriverExport {
                refs,
                warnings: vec![],
            }),
            Err(e) => {
                warn!("winget export failed ({e}); using list output");
                let refs = self.run_list()?;
                Ok(DriverExport {
                    refs,
                    warnings: vec![EXPORT_FALLBACK_WARNING.to_owned()],
                })
            }
        }
    }
}

/// A deterministic in-memory driver for staging, demos, and tests.
///
/// Installs mutate only this process's memory; `fail_refs` lets tests script
/// failures.
#[derive(Default)]
pub struct FakeDriver {
    installed: Mutex<BTreeSet<String>>,
    /// Refs whose install should fail
    pub fail_refs: BTreeSet<String>,
    install_log: Mutex<Vec<String>>,
}

impl FakeDriver {
    /// A fake driver pre-seeded with an installed set
    pub fn with_installed(refs: impl IntoIterator<Item = String>) -> Self {
        FakeDriver {
            installed: Mutex::new(refs.into_iter().collect()),
            fail_refs: BTreeSet::new(),
            install_log: Mutex::new(vec![]),
        }
    }

    /// Every ref `install` was called with, in call order
    pub fn install_log(&self) -> Vec<String> {
        self.install_log.lock().unwrap().clone()
    }
}

impl PackageDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn available(&self) -> bool {
        true
    }

    fn list_installed(&self) -> OutfitterResult<BTreeSet<String>> {
        Ok(self.installed.lock().unwrap().clone())
    }

    fn install(&self, package_ref: &str) -> InstallOutcome {
        self.install_log.lock().unwrap().push(package_ref.to_owned());
        if self.fail_refs.contains(package_ref) {
            return InstallOutcome::failed("scripted failure", None);
        }
        self.installed.lock().unwrap().insert(package_ref.to_owned());
        InstallOutcome::ok(None)
    }

    fn export(&self, _path: &Utf8Path) -> OutfitterResult<DriverExport> {
        Ok(DriverExport {
            refs: self.installed.lock().unwrap().iter().cloned().collect(),
            warnings: vec![],
        })
    }
}
