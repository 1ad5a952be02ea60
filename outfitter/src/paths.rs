//! Path expression resolution.
//!
//! Ten call sites across the pipeline (restore source/target expansion,
//! backup-tree layout, revert reconstruction, capture staging, catalog
//! relative paths, profile probing...) depend on identical expansion
//! semantics; this module is the one place they live.
//!
//! Expansion order, per path:
//! 1. logical tokens (`${home}`, `${appdata}`, ...) with per-platform mappings
//! 2. percent-delimited host environment variables (`%APPDATA%`)
//! 3. a leading `~` becomes the home directory
//! 4. a remaining relative path is joined against `base_dir` (when given) and
//!    lexically canonicalized

use camino::{Utf8Path, Utf8PathBuf};

use crate::errors::{OutfitterError, OutfitterResult};

/// The logical tokens `expand` recognizes inside `${...}`
pub const LOGICAL_TOKENS: &[&str] = &[
    "home",
    "appdata",
    "localappdata",
    "config",
    "cache",
    "temp",
    "programfiles",
    "programdata",
];

/// The current user's home directory
pub fn home() -> OutfitterResult<Utf8PathBuf> {
    let home = dirs::home_dir().ok_or(OutfitterError::NoHomeDir)?;
    Ok(Utf8PathBuf::try_from(home)?)
}

/// Whether a path expression is already absolute (host-native or windows
/// drive-lettered, so that profiles authored on one OS still classify
/// sensibly on another)
pub fn is_absolute(path: &str) -> bool {
    if Utf8Path::new(path).is_absolute() {
        return true;
    }
    // windows drive letter (`C:\...` or `C:/...`)
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Expand a path expression to an absolute, lexically-normalized path.
///
/// `base_dir` anchors relative results; without one, a still-relative path is
/// resolved against the current directory.
pub fn expand(path: &str, base_dir: Option<&Utf8Path>) -> OutfitterResult<Utf8PathBuf> {
    let mut expanded = expand_logical_tokens(path)?;
    expanded = expand_env_vars(&expanded);

    if let Some(rest) = expanded.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
            let home = home()?;
            expanded = format!("{home}{rest}");
        }
    }

    let expanded = normalize_separators(&expanded);

    let joined = if is_absolute(&expanded) {
        Utf8PathBuf::from(expanded)
    } else if let Some(base) = base_dir {
        base.join(expanded)
    } else {
        let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)?;
        cwd.join(expanded)
    };

    Ok(lexical_normalize(&joined))
}

/// Derive the backup-tree-relative path for an absolute target path.
///
/// The result contains no drive colon, no leading separators, and no other
/// colons, so it nests safely under `state/backups/<runId>/` while keeping
/// the original path structurally recoverable (the drive letter survives as
/// a leading component).
pub fn to_backup_path(abs: &Utf8Path) -> Utf8PathBuf {
    let s = abs.as_str().replace('\\', "/");
    let bytes = s.as_bytes();
    let s = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        // `C:/Users/x` -> `C/Users/x`
        format!("{}{}", &s[..1], &s[2..])
    } else {
        s
    };
    let trimmed = s.trim_start_matches('/');
    // any residual colon (alternate data streams etc.) would break the tree
    Utf8PathBuf::from(trimmed.replace(':', "_"))
}

/// Resolve `.` and `..` segments without touching the filesystem
pub fn lexical_normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            camino::Utf8Component::CurDir => {}
            camino::Utf8Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_str()),
        }
    }
    out
}

fn normalize_separators(path: &str) -> String {
    if cfg!(windows) {
        path.to_owned()
    } else {
        path.replace('\\', "/")
    }
}

fn expand_logical_tokens(path: &str) -> OutfitterResult<String> {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated token; treat the remainder as literal
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let token = &after[..end];
        out.push_str(resolve_token(&token.to_ascii_lowercase(), path)?.as_str());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve_token(token: &str, full_path: &str) -> OutfitterResult<Utf8PathBuf> {
    let dir = match token {
        "home" => dirs::home_dir(),
        "appdata" => env_path("APPDATA").or_else(dirs::config_dir),
        "localappdata" => env_path("LOCALAPPDATA").or_else(dirs::data_local_dir),
        "config" => dirs::config_dir(),
        "cache" => dirs::cache_dir(),
        "temp" => Some(std::env::temp_dir()),
        "programfiles" => env_path("ProgramFiles").or_else(|| fallback_system_dir("/usr/local")),
        "programdata" => env_path("ProgramData").or_else(|| fallback_system_dir("/etc")),
        _ => {
            return Err(OutfitterError::UnknownPathToken {
                token: token.to_owned(),
                path: full_path.to_owned(),
            })
        }
    };
    let dir = dir.ok_or(OutfitterError::NoHomeDir)?;
    Ok(Utf8PathBuf::try_from(dir)?)
}

fn env_path(var: &str) -> Option<std::path::PathBuf> {
    std::env::var_os(var).map(std::path::PathBuf::from)
}

fn fallback_system_dir(posix: &str) -> Option<std::path::PathBuf> {
    if cfg!(windows) {
        None
    } else {
        Some(std::path::PathBuf::from(posix))
    }
}

/// Expand `%VAR%` pairs from the host environment; undefined variables stay
/// literal, matching cmd.exe semantics
fn expand_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
