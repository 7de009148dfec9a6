//! Archive handling shared by the HTTP and OCI resolvers: format detection,
//! entry-path validation, bounded extraction and content-root selection.

use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    types::ArchiveLimits,
};

/// Entries produced by archive tools that never hold skill content.
const CRUFT_ENTRIES: &[&str] = &[".DS_Store", "__MACOSX"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
    /// Uncompressed tar; only produced by OCI layers.
    Tar,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
            Self::Tar => "tar",
        }
    }
}

/// Format from the URL path suffix.
pub fn format_from_url(url: &str) -> Option<ArchiveFormat> {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if path.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

fn format_from_content_type(content_type: &str) -> Option<ArchiveFormat> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/zip" | "application/x-zip-compressed" => Some(ArchiveFormat::Zip),
        "application/gzip" | "application/x-gzip" | "application/x-tar+gzip"
        | "application/x-compressed-tar" => Some(ArchiveFormat::TarGz),
        _ => None,
    }
}

fn format_from_magic(head: &[u8]) -> Option<ArchiveFormat> {
    if head.starts_with(&[0x1f, 0x8b]) {
        Some(ArchiveFormat::TarGz)
    } else if head.starts_with(b"PK\x03\x04") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Detect the archive format from, in order, the URL suffix, the declared
/// content type and the leading bytes of the file.
pub fn detect_format(url: &str, content_type: Option<&str>, head: &[u8]) -> Result<ArchiveFormat> {
    format_from_url(url)
        .or_else(|| content_type.and_then(format_from_content_type))
        .or_else(|| format_from_magic(head))
        .ok_or_else(|| {
            Error::archive(format!(
                "cannot determine archive format of {url} (content-type: {})",
                content_type.unwrap_or("none")
            ))
        })
}

/// Read up to `n` leading bytes of a file.
pub fn read_head(path: &Path, n: usize) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(n);
    File::open(path)?.take(n as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Validate an archive entry name and return its normalized relative path.
///
/// Rejects absolute names (POSIX root or a Windows drive letter) and names
/// whose lexically normalized form is or starts with `..`. Returns `None` for
/// names that normalize to the archive root itself.
pub fn validate_entry_path(name: &str) -> Result<Option<PathBuf>> {
    let unified = name.replace('\\', "/");
    let bytes = unified.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if unified.starts_with('/') || has_drive {
        return Err(Error::archive(format!(
            "archive entry '{name}' has an absolute path"
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::archive(format!(
                        "archive entry '{name}' escapes the extraction root"
                    )));
                }
            },
            other => parts.push(other),
        }
    }

    Ok((!parts.is_empty()).then(|| parts.iter().collect()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    Link,
    Other,
}

/// Validate and unpack `archive` into `dest`.
///
/// Every entry name is checked and the entry count compared against the
/// limit before anything is written. The extracted size is bounded while
/// writing and verified again by walking the result.
pub async fn extract(
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
    limits: ArchiveLimits,
) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, format, &dest, limits))
        .await
        .map_err(|e| Error::archive(format!("extraction task failed: {e}")))?
}

fn extract_blocking(
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
    limits: ArchiveLimits,
) -> Result<()> {
    let entries = list_entries(archive, format)?;
    if entries.len() > limits.max_entries {
        return Err(Error::archive(format!(
            "archive has {} entries, more than the limit of {}",
            entries.len(),
            limits.max_entries
        )));
    }
    for name in &entries {
        validate_entry_path(name)?;
    }

    std::fs::create_dir_all(dest)?;
    let mut budget = ExtractBudget {
        written: 0,
        limit: limits.max_extracted_bytes,
    };
    match format {
        ArchiveFormat::Zip => unpack_zip(archive, dest, &mut budget)?,
        ArchiveFormat::TarGz | ArchiveFormat::Tar => {
            unpack_tar(archive, format, dest, &mut budget)?
        },
    }

    let total = extracted_size(dest)?;
    if total > limits.max_extracted_bytes {
        return Err(Error::archive(format!(
            "extracted content is {total} bytes, more than the limit of {}",
            limits.max_extracted_bytes
        )));
    }
    debug!(
        archive = %archive.display(),
        entries = entries.len(),
        bytes = total,
        "archive extracted"
    );
    Ok(())
}

fn open_tar(archive: &Path, format: ArchiveFormat) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(archive)?;
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

fn tar_entry_kind(ty: tar::EntryType) -> Option<EntryKind> {
    use tar::EntryType;

    match ty {
        // Metadata records, already folded into the following entry by `tar`.
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName
        | EntryType::GNULongLink => None,
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => Some(EntryKind::File),
        EntryType::Directory => Some(EntryKind::Dir),
        EntryType::Symlink | EntryType::Link => Some(EntryKind::Link),
        _ => Some(EntryKind::Other),
    }
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::archive(format!("invalid zip archive: {e}"))
}

/// Names of the content-bearing entries, in archive order.
fn list_entries(archive: &Path, format: ArchiveFormat) -> Result<Vec<String>> {
    let mut out = Vec::new();
    match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(zip_error)?;
            for i in 0..zip.len() {
                out.push(zip.by_index(i).map_err(zip_error)?.name().to_string());
            }
        },
        ArchiveFormat::TarGz | ArchiveFormat::Tar => {
            let mut tar = open_tar(archive, format)?;
            for entry in tar.entries().map_err(tar_error)? {
                let entry = entry.map_err(tar_error)?;
                if tar_entry_kind(entry.header().entry_type()).is_none() {
                    continue;
                }
                out.push(entry.path().map_err(tar_error)?.to_string_lossy().into_owned());
            }
        },
    }
    Ok(out)
}

fn tar_error(e: io::Error) -> Error {
    Error::archive(format!("invalid tar archive: {e}"))
}

fn zip_entry_kind(is_dir: bool, unix_mode: Option<u32>) -> EntryKind {
    const S_IFMT: u32 = 0o170_000;
    const S_IFLNK: u32 = 0o120_000;
    if is_dir {
        EntryKind::Dir
    } else if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
        EntryKind::Link
    } else {
        EntryKind::File
    }
}

struct ExtractBudget {
    written: u64,
    limit: u64,
}

impl ExtractBudget {
    fn copy(&mut self, reader: &mut dyn Read, dest: &Path) -> Result<()> {
        let remaining = self.limit.saturating_sub(self.written);
        let mut out = File::create(dest)?;
        // One byte past the remaining budget is enough to detect the overrun.
        let copied = io::copy(&mut reader.take(remaining.saturating_add(1)), &mut out)?;
        out.flush()?;
        self.written += copied;
        if self.written > self.limit {
            return Err(Error::archive(format!(
                "extracted content exceeds the limit of {} bytes",
                self.limit
            )));
        }
        Ok(())
    }
}

/// Destination for a validated entry, refusing parents that resolve outside
/// `root` or destinations that are symlinks.
fn prepare_destination(root: &Path, relative: &Path) -> Result<PathBuf> {
    let dest = root.join(relative);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
        let canonical_root = std::fs::canonicalize(root)?;
        if !std::fs::canonicalize(parent)?.starts_with(&canonical_root) {
            return Err(Error::archive(format!(
                "archive entry '{}' escaped the extraction root",
                relative.display()
            )));
        }
    }
    if std::fs::symlink_metadata(&dest).is_ok_and(|m| m.file_type().is_symlink()) {
        return Err(Error::archive(format!(
            "archive entry '{}' resolves to a symlink",
            relative.display()
        )));
    }
    Ok(dest)
}

fn unpack_tar(
    archive: &Path,
    format: ArchiveFormat,
    root: &Path,
    budget: &mut ExtractBudget,
) -> Result<()> {
    let mut tar = open_tar(archive, format)?;
    for entry in tar.entries().map_err(tar_error)? {
        let mut entry = entry.map_err(tar_error)?;
        let Some(kind) = tar_entry_kind(entry.header().entry_type()) else {
            continue;
        };
        let name = entry.path().map_err(tar_error)?.to_string_lossy().into_owned();
        let Some(relative) = validate_entry_path(&name)? else {
            continue;
        };
        match kind {
            EntryKind::Dir => std::fs::create_dir_all(root.join(&relative))?,
            EntryKind::File => {
                let dest = prepare_destination(root, &relative)?;
                budget.copy(&mut entry, &dest)?;
            },
            EntryKind::Link => {
                warn!(entry = %name, "skipping symlink/hardlink archive entry");
            },
            EntryKind::Other => {
                debug!(entry = %name, "skipping special archive entry");
            },
        }
    }
    Ok(())
}

fn unpack_zip(archive: &Path, root: &Path, budget: &mut ExtractBudget) -> Result<()> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(zip_error)?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(zip_error)?;
        let name = file.name().to_string();
        let Some(relative) = validate_entry_path(&name)? else {
            continue;
        };
        match zip_entry_kind(file.is_dir(), file.unix_mode()) {
            EntryKind::Dir => std::fs::create_dir_all(root.join(&relative))?,
            EntryKind::Link => {
                warn!(entry = %name, "skipping symlink archive entry");
            },
            EntryKind::File | EntryKind::Other => {
                let dest = prepare_destination(root, &relative)?;
                budget.copy(&mut file, &dest)?;
            },
        }
    }
    Ok(())
}

/// Total size of the regular files under `dir`.
pub fn extracted_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry =
            entry.map_err(|e| Error::archive(format!("cannot walk {}: {e}", dir.display())))?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .map_err(|e| Error::archive(e.to_string()))?
                .len();
        }
    }
    Ok(total)
}

/// The single top-level directory of an extraction, or the root itself.
pub fn content_root(extract_dir: &Path) -> Result<PathBuf> {
    let mut top = Vec::new();
    for entry in std::fs::read_dir(extract_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if CRUFT_ENTRIES.iter().any(|c| name == *c) {
            continue;
        }
        top.push(entry);
    }

    if let [only] = top.as_slice()
        && only.file_type()?.is_dir()
    {
        return Ok(only.path());
    }
    Ok(extract_dir.to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a tar stream from `(name, contents)` pairs. Names are written raw
    /// so hostile paths survive.
    pub(crate) fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            let raw = name.as_bytes();
            header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub(crate) fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes(entries)).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn entry_paths_are_normalized_or_rejected() {
        assert_eq!(
            validate_entry_path("repo/skills/./alpha/SKILL.md").unwrap(),
            Some(PathBuf::from("repo/skills/alpha/SKILL.md"))
        );
        assert_eq!(
            validate_entry_path("a/../b").unwrap(),
            Some(PathBuf::from("b"))
        );
        assert_eq!(validate_entry_path("./").unwrap(), None);
        for bad in ["../x", "a/../../x", "/etc/passwd", "C:\\Windows\\x", "c:/x", "..\\x"] {
            assert!(validate_entry_path(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn format_detection_order() {
        assert_eq!(
            detect_format("https://h/a.tgz?x=1", Some("application/zip"), b"PK\x03\x04").unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            detect_format(
                "https://h/download",
                Some("application/zip; charset=binary"),
                &[0x1f, 0x8b]
            )
            .unwrap(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            detect_format("https://h/download", Some("application/octet-stream"), &[0x1f, 0x8b, 8])
                .unwrap(),
            ArchiveFormat::TarGz
        );
        assert!(detect_format("https://h/download", None, b"hello").is_err());
    }

    #[tokio::test]
    async fn tar_gz_extracts_and_unwraps_single_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(
            tmp.path(),
            "a.tar.gz",
            &tar_gz(&[
                ("repo-main/skills/alpha/SKILL.md", b"alpha"),
                ("repo-main/README.md", b"readme"),
            ]),
        );
        let dest = tmp.path().join("out");
        extract(&archive, ArchiveFormat::TarGz, &dest, ArchiveLimits::default())
            .await
            .unwrap();

        std::fs::create_dir_all(dest.join("__MACOSX")).unwrap();
        let root = content_root(&dest).unwrap();
        assert_eq!(root, dest.join("repo-main"));
        assert_eq!(
            std::fs::read_to_string(root.join("skills/alpha/SKILL.md")).unwrap(),
            "alpha"
        );
    }

    #[tokio::test]
    async fn traversal_entry_fails_before_anything_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(
            tmp.path(),
            "evil.tar.gz",
            &tar_gz(&[("ok/SKILL.md", b"fine"), ("../evil.txt", b"pwned")]),
        );
        let dest = tmp.path().join("nested/out");
        let err = extract(&archive, ArchiveFormat::TarGz, &dest, ArchiveLimits::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Archive { .. }), "{err}");
        assert!(!dest.exists());
        assert!(!tmp.path().join("nested/evil.txt").exists());
    }

    #[tokio::test]
    async fn absolute_zip_entry_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(
            tmp.path(),
            "evil.zip",
            &zip_bytes(&[("/tmp/skillet-evil.txt", b"pwned")]),
        );
        let dest = tmp.path().join("out");
        assert!(
            extract(&archive, ArchiveFormat::Zip, &dest, ArchiveLimits::default())
                .await
                .is_err()
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn zip_extracts_into_root_when_multiple_top_level_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(
            tmp.path(),
            "a.zip",
            &zip_bytes(&[("alpha/SKILL.md", b"a"), ("beta/SKILL.md", b"b")]),
        );
        let dest = tmp.path().join("out");
        extract(&archive, ArchiveFormat::Zip, &dest, ArchiveLimits::default())
            .await
            .unwrap();
        assert_eq!(content_root(&dest).unwrap(), dest);
        assert!(dest.join("beta/SKILL.md").is_file());
    }

    #[tokio::test]
    async fn entry_and_size_ceilings_are_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = write_archive(
            tmp.path(),
            "a.tar.gz",
            &tar_gz(&[("a/one", b"1111"), ("a/two", b"2222"), ("a/three", b"3333")]),
        );

        let few_entries = ArchiveLimits {
            max_entries: 2,
            ..ArchiveLimits::default()
        };
        let err = extract(&archive, ArchiveFormat::TarGz, &tmp.path().join("x"), few_entries)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("entries"), "{err}");

        let small = ArchiveLimits {
            max_extracted_bytes: 10,
            ..ArchiveLimits::default()
        };
        let err = extract(&archive, ArchiveFormat::TarGz, &tmp.path().join("y"), small)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit of 10"), "{err}");
    }

    #[test]
    fn extracted_size_sums_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::write(tmp.path().join("a/one"), b"12345").unwrap();
        std::fs::write(tmp.path().join("a/b/two"), b"123").unwrap();
        assert_eq!(extracted_size(tmp.path()).unwrap(), 8);
    }
}
