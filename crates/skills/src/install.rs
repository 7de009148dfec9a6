//! Installing a resolved skill: copy it into the content-addressed storage
//! root, then symlink (or copy) it into an agent skills directory.

use std::{
    io,
    path::{Path, PathBuf},
};

use {
    sha2::{Digest, Sha256},
    skillet_common::{
        EntryKind, FileSystem,
        fs::{copy_dir_recursive, remove_entry, sibling_temp_path},
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    provenance::SIDECAR_FILE,
    types::InstallMethod,
};

#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// `type:url:ref:digest` of the resolved source.
    pub source_id: String,
    pub source_skill_path: PathBuf,
    pub storage_root: PathBuf,
    pub target_skills_dir: PathBuf,
    pub prefer_copy: bool,
    /// Installed directory name; defaults to the source directory's name.
    pub skill_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub skill_name: String,
    pub storage_path: PathBuf,
    pub installed_path: PathBuf,
    pub method: InstallMethod,
    /// Whether anything on disk changed.
    pub changed: bool,
    pub message: String,
}

/// First 16 hex chars of `sha256(source_id)`.
pub fn storage_key(source_id: &str) -> String {
    let hex = format!("{:x}", Sha256::digest(source_id.as_bytes()));
    hex[..16].to_string()
}

/// `<storage_root>/<storage_key>/<skill_name>`
pub fn storage_path(storage_root: &Path, source_id: &str, skill_name: &str) -> PathBuf {
    storage_root.join(storage_key(source_id)).join(skill_name)
}

/// Install one skill into one agent directory.
///
/// Storage and target are both replaced through a sibling temp path and a
/// rename. A symlink is preferred; any failure to place one falls back to a
/// copy. An unrelated file at the target path is never overwritten.
pub fn install(fs: &dyn FileSystem, request: &InstallRequest) -> Result<InstallOutcome> {
    let source = &request.source_skill_path;
    if !fs.is_dir(source) {
        return Err(Error::conflict(source, "source skill is not a directory"));
    }
    let skill_name = match request.skill_name {
        Some(ref name) => name.clone(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::conflict(source, "source skill path has no directory name"))?,
    };

    let target_dir = &request.target_skills_dir;
    match fs.entry_kind(target_dir)? {
        None => fs.create_dir_all(target_dir)?,
        Some(_) if fs.is_dir(target_dir) => {},
        Some(_) => {
            return Err(Error::conflict(
                target_dir,
                "agent skills path exists and is not a directory",
            ));
        },
    }

    let installed_path = target_dir.join(&skill_name);
    let previous = fs.entry_kind(&installed_path)?;
    if previous == Some(EntryKind::File) {
        return Err(Error::conflict(
            &installed_path,
            "a file that was not installed by skillet is in the way",
        ));
    }

    let storage_path = storage_path(&request.storage_root, &request.source_id, &skill_name);
    let source_fingerprint = fingerprint(fs, source)?;
    let storage_changed =
        fingerprint_if_dir(fs, &storage_path)?.as_ref() != Some(&source_fingerprint);
    if storage_changed {
        replace_dir_with_copy(fs, source, &storage_path)?;
        debug!(path = %storage_path.display(), "storage updated");
    }

    let (method, target_changed) = if request.prefer_copy {
        let changed = place_copy(fs, &storage_path, &installed_path, &source_fingerprint)?;
        (InstallMethod::Copy, changed)
    } else {
        match place_symlink(fs, &storage_path, &installed_path) {
            Ok(changed) => (InstallMethod::Symlink, changed),
            Err(e) => {
                warn!(
                    path = %installed_path.display(),
                    error = %e,
                    "symlink failed, falling back to copy"
                );
                let changed =
                    place_copy(fs, &storage_path, &installed_path, &source_fingerprint)?;
                (InstallMethod::Copy, changed)
            },
        }
    };

    let changed = storage_changed || target_changed;
    let message = match (previous, changed) {
        (None, _) => format!("installed {skill_name} ({method})"),
        (Some(_), true) => format!("updated {skill_name} ({method})"),
        (Some(_), false) => format!("{skill_name} is up to date ({method})"),
    };
    info!(
        skill = %skill_name,
        path = %installed_path.display(),
        %method,
        changed,
        "skill placed"
    );

    Ok(InstallOutcome {
        skill_name,
        storage_path,
        installed_path,
        method,
        changed,
        message,
    })
}

/// Point `link` at `target` via a temp link renamed into place. Returns
/// `false` when `link` already pointed there.
fn place_symlink(fs: &dyn FileSystem, target: &Path, link: &Path) -> io::Result<bool> {
    if fs.entry_kind(link)? == Some(EntryKind::Symlink) && fs.read_link(link)? == target {
        return Ok(false);
    }

    let tmp = sibling_temp_path(link);
    fs.symlink_dir(target, &tmp)?;
    let swapped = remove_entry(fs, link).and_then(|()| fs.rename(&tmp, link));
    if let Err(e) = swapped {
        let _ = fs.remove_file(&tmp);
        return Err(e);
    }
    Ok(true)
}

/// Copy `storage` to `dest` unless `dest` already holds identical content.
fn place_copy(
    fs: &dyn FileSystem,
    storage: &Path,
    dest: &Path,
    expected: &str,
) -> Result<bool> {
    if fs.entry_kind(dest)? == Some(EntryKind::Dir)
        && fingerprint(fs, dest)? == expected
    {
        return Ok(false);
    }
    replace_dir_with_copy(fs, storage, dest)?;
    Ok(true)
}

/// Copy `from` to a sibling of `to`, remove the old `to`, rename into place.
fn replace_dir_with_copy(fs: &dyn FileSystem, from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs.create_dir_all(parent)?;
    }
    let tmp = sibling_temp_path(to);
    let staged = copy_dir_recursive(fs, from, &tmp)
        .and_then(|()| {
            // A copied sidecar describes the old placement.
            match fs.entry_kind(&tmp.join(SIDECAR_FILE))? {
                Some(_) => fs.remove_file(&tmp.join(SIDECAR_FILE)),
                None => Ok(()),
            }
        })
        .and_then(|()| remove_entry(fs, to))
        .and_then(|()| fs.rename(&tmp, to));
    if let Err(e) = staged {
        let _ = remove_entry(fs, &tmp);
        return Err(e);
    }
    Ok(())
}

fn fingerprint_if_dir(fs: &dyn FileSystem, dir: &Path) -> Result<Option<String>> {
    if fs.entry_kind(dir)? == Some(EntryKind::Dir) {
        Ok(Some(fingerprint(fs, dir)?))
    } else {
        Ok(None)
    }
}

/// Hash of every file's relative path and contents, ignoring the sidecar.
fn fingerprint(fs: &dyn FileSystem, dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_tree(fs, dir, dir, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_tree(fs: &dyn FileSystem, root: &Path, dir: &Path, hasher: &mut Sha256) -> io::Result<()> {
    for child in fs.read_dir(dir)? {
        let relative = child.strip_prefix(root).unwrap_or(&child);
        if relative.as_os_str() == SIDECAR_FILE || child.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        match fs.entry_kind(&child)? {
            Some(EntryKind::Dir) => {
                hasher.update(b"d\0");
                hasher.update(relative.to_string_lossy().as_bytes());
                hasher.update(b"\0");
                hash_tree(fs, root, &child, hasher)?;
            },
            Some(EntryKind::File) => {
                hasher.update(b"f\0");
                hasher.update(relative.to_string_lossy().as_bytes());
                hasher.update(b"\0");
                hasher.update(fs.read(&child)?);
            },
            Some(EntryKind::Symlink) if !fs.is_dir(&child) => {
                hasher.update(b"f\0");
                hasher.update(relative.to_string_lossy().as_bytes());
                hasher.update(b"\0");
                hasher.update(fs.read(&child)?);
            },
            Some(EntryKind::Symlink) | None => {},
        }
    }
    Ok(())
}
