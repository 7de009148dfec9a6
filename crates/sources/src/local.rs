//! Local filesystem sources: path detection, `~`/relative expansion and
//! `file://` URL rendering.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Whether `raw` names a local path rather than a remote location.
pub fn is_local_path(raw: &str) -> bool {
    raw.starts_with("file://")
        || raw.starts_with('.')
        || raw.starts_with('/')
        || raw == "~"
        || raw.starts_with("~/")
        || is_windows_drive_path(raw)
}

fn is_windows_drive_path(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Expand a local source path to an absolute path.
///
/// Does not touch the filesystem; callers check existence themselves.
pub fn expand_local_path(raw: &str, cwd: &Path, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(rest) = raw.strip_prefix("file://") {
        let url = url::Url::parse(raw)
            .map_err(|e| Error::invalid_source(raw, format!("invalid file URL: {e}")))?;
        return url
            .to_file_path()
            .or_else(|()| Ok(PathBuf::from(rest)))
            .map(|p| absolutize(&p, cwd));
    }

    if raw == "~" || raw.starts_with("~/") {
        let home = home_dir
            .ok_or_else(|| Error::invalid_source(raw, "home directory is not known"))?;
        let rest = raw.trim_start_matches('~').trim_start_matches('/');
        return Ok(normalize(&home.join(rest)));
    }

    Ok(absolutize(Path::new(raw), cwd))
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    }
}

/// Lexically collapse `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render an absolute path as a `file://` URL.
pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_else(|()| format!("file://{}", path.display()))
}

/// Whether `path` is the root of a git work tree.
pub fn is_git_work_tree(path: &Path) -> bool {
    path.join(".git").exists()
}
