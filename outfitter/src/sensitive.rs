//! The built-in sensitive-path deny list.
//!
//! Consulted in two places: restore targets produce warnings when any path
//! segment matches, and capture refuses to copy matching files into a bundle
//! payload. Matching is by path segment, case-insensitive.

use camino::Utf8Path;

/// Path segments that indicate key material, credentials, or browser
/// profile state
pub const SENSITIVE_SEGMENTS: &[&str] = &[
    ".ssh",
    ".aws",
    ".gnupg",
    ".azure",
    ".kube",
    ".docker",
    ".netrc",
    ".npmrc",
    ".pypirc",
    "credentials",
    "id_rsa",
    "id_ecdsa",
    "id_ed25519",
    "cookies",
    "login data",
    "local state",
    "web data",
];

/// The first deny-list segment found in `path`, if any
pub fn sensitive_segment(path: &Utf8Path) -> Option<&'static str> {
    for component in path.components() {
        let segment = component.as_str().to_ascii_lowercase();
        for deny in SENSITIVE_SEGMENTS {
            if segment == *deny {
                return Some(deny);
            }
        }
    }
    None
}

/// Whether any segment of `path` is on the deny list
pub fn is_sensitive(path: &Utf8Path) -> bool {
    sensitive_segment(path).is_some()
}
