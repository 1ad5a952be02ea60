//! Unit tests, one module per pipeline component.

mod bundle;
mod catalog;
mod jsonc;
mod loader;
mod planner;
mod revert;

use camino::{Utf8Path, Utf8PathBuf};

/// A temp workspace that lives for the duration of one test
pub struct Workspace {
    _dir: temp_dir::TempDir,
    /// Root of the workspace
    pub root: Utf8PathBuf,
}

impl Workspace {
    /// A fresh empty workspace
    pub fn new() -> Self {
        let dir = temp_dir::TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        Workspace { _dir: dir, root }
    }

    /// Write a file under the workspace, creating parents
    pub fn write(&self, rel: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(rel);
        axoasset::LocalAsset::write_new_all(contents, &path).unwrap();
        path
    }

    /// A path under the workspace (not created)
    pub fn path(&self, rel: &str) -> Utf8PathBuf {
        self.root.join(rel)
    }
}

/// Read a file to a string
pub fn read(path: &Utf8Path) -> String {
    axoasset::LocalAsset::load_string(path).unwrap()
}
