//! Narrow filesystem capability.
//!
//! The installer, lockfile generator and discovery only touch the disk through
//! [`FileSystem`], so tests can swap in a wrapper that, for example, refuses to
//! create symlinks the way an unprivileged Windows account does.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::warn;

/// What occupies a path, without following a final symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

pub trait FileSystem: Send + Sync {
    /// Kind of the entry at `path`, `None` when nothing is there.
    fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>>;
    /// Whether `path` resolves (following symlinks) to a directory.
    fn is_dir(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Create a symlink at `link` pointing to the directory `target`.
    fn symlink_dir(&self, target: &Path, link: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Immediate children of a directory, sorted by file name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn exists(&self, path: &Path) -> bool {
        matches!(self.entry_kind(path), Ok(Some(_)))
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn entry_kind(&self, path: &Path) -> io::Result<Option<EntryKind>> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                let ft = meta.file_type();
                Ok(Some(if ft.is_symlink() {
                    EntryKind::Symlink
                } else if ft.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                }))
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    #[cfg(unix)]
    fn symlink_dir(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink_dir(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_dir(target, link)
    }

    #[cfg(not(any(unix, windows)))]
    fn symlink_dir(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        ))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            // Directory symlinks on Windows are removed as directories.
            Err(e) if cfg!(windows) => std::fs::remove_dir(path).map_err(|_| e),
            other => other,
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }
}

/// Remove whatever occupies `path`: symlinks and files are unlinked,
/// directories are removed recursively. Missing paths are not an error.
pub fn remove_entry(fs: &dyn FileSystem, path: &Path) -> io::Result<()> {
    match fs.entry_kind(path)? {
        None => Ok(()),
        Some(EntryKind::Dir) => fs.remove_dir_all(path),
        Some(EntryKind::File | EntryKind::Symlink) => fs.remove_file(path),
    }
}

/// Recursively copy the directory `from` into a new directory `to`.
///
/// Symlinked files are copied by content; symlinked directories are skipped
/// so a hostile tree cannot make the copy loop or escape its root. `.git`
/// directories are never copied.
pub fn copy_dir_recursive(fs: &dyn FileSystem, from: &Path, to: &Path) -> io::Result<()> {
    fs.create_dir_all(to)?;
    for child in fs.read_dir(from)? {
        let Some(name) = child.file_name() else {
            continue;
        };
        if name == ".git" {
            continue;
        }
        let dest = to.join(name);
        match fs.entry_kind(&child)? {
            Some(EntryKind::Dir) => copy_dir_recursive(fs, &child, &dest)?,
            Some(EntryKind::File) => fs.write(&dest, &fs.read(&child)?)?,
            Some(EntryKind::Symlink) => {
                if fs.is_dir(&child) {
                    warn!(path = %child.display(), "skipping symlinked directory during copy");
                } else {
                    fs.write(&dest, &fs.read(&child)?)?;
                }
            },
            None => {},
        }
    }
    Ok(())
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(fs: &dyn FileSystem, path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs.create_dir_all(parent)?;
    }
    let tmp = sibling_temp_path(path);
    fs.write(&tmp, contents)?;
    if let Err(e) = fs.rename(&tmp, path) {
        let _ = fs.remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// A unique path next to `path`, used as the staging location for
/// temp-then-rename replacements.
pub fn sibling_temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    path.with_file_name(format!(".{name}.tmp-{}", &suffix[..12]))
}
