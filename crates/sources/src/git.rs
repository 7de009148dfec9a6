//! Git sources: source-string parsing, shallow checkout and `ls-remote`
//! queries, all through the injected [`CommandRunner`].

use std::path::{Path, PathBuf};

use {
    skillet_common::{CommandOutput, CommandRunner, CommandSpec},
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    local::{expand_local_path, file_url, is_local_path},
    types::make_scratch_dir,
};

/// A parsed git source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    /// Clone URL. For local sources this is the path as written.
    pub clone_url: String,
    pub git_ref: Option<String>,
    /// Relative path inside the repository, `/`-separated.
    pub subdirectory: Option<String>,
    /// Set when the source is a local path that still needs expansion.
    pub local_path: Option<String>,
}

impl GitSource {
    fn remote(clone_url: String) -> Self {
        Self {
            clone_url,
            git_ref: None,
            subdirectory: None,
            local_path: None,
        }
    }
}

/// Parse a git source string.
///
/// Accepted forms, in precedence order: a trailing `#ref[:subdir]` fragment
/// (overrides anything embedded earlier), `https://host/owner/repo/tree/<ref>/<path>`,
/// local paths (`.`, `/`, `~/`, `file://`), `git@host:path`, `http(s)://`,
/// `ssh://` and `git://` URLs, and `owner/repo` GitHub shorthand.
pub fn parse_source(raw: &str) -> Result<GitSource> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid_source(raw, "empty source"));
    }

    let (base, fragment) = match raw.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (raw, None),
    };

    let mut parsed = parse_base(base).map_err(|message| Error::invalid_source(raw, message))?;

    if let Some(fragment) = fragment {
        let (git_ref, subdir) = match fragment.split_once(':') {
            Some((git_ref, subdir)) => (git_ref, Some(subdir)),
            None => (fragment, None),
        };
        if !git_ref.is_empty() {
            parsed.git_ref = Some(git_ref.to_string());
        }
        if let Some(subdir) = subdir {
            parsed.subdirectory = normalize_subdirectory(subdir)
                .map_err(|message| Error::invalid_source(raw, message))?;
        }
    }

    Ok(parsed)
}

fn parse_base(base: &str) -> std::result::Result<GitSource, String> {
    if base.is_empty() {
        return Err("missing repository".into());
    }

    if is_local_path(base) {
        return Ok(GitSource {
            clone_url: base.to_string(),
            git_ref: None,
            subdirectory: None,
            local_path: Some(base.to_string()),
        });
    }

    if let Some(tree) = parse_tree_url(base)? {
        return Ok(tree);
    }

    if base.starts_with("git@") || is_scp_like(base) {
        let url = base.trim_end_matches('/');
        return Ok(GitSource::remote(with_git_suffix(url)));
    }

    for scheme in ["https://", "http://", "ssh://", "git://"] {
        if let Some(rest) = base.strip_prefix(scheme) {
            let rest = rest.trim_end_matches('/');
            if rest.is_empty() || !rest.contains('/') {
                return Err("URL has no repository path".into());
            }
            return Ok(GitSource::remote(with_git_suffix(&format!("{scheme}{rest}"))));
        }
    }

    if let Some((owner, repo)) = base.split_once('/')
        && is_shorthand_segment(owner)
        && is_shorthand_segment(repo.trim_end_matches(".git"))
    {
        let repo = repo.trim_end_matches(".git");
        return Ok(GitSource::remote(format!(
            "https://github.com/{owner}/{repo}.git"
        )));
    }

    Err("expected owner/repo, a git URL, a tree URL or a local path".into())
}

/// `user@host:path` without a scheme.
fn is_scp_like(base: &str) -> bool {
    if base.contains("://") {
        return false;
    }
    match (base.find('@'), base.find(':')) {
        (Some(at), Some(colon)) => at < colon && colon + 1 < base.len(),
        _ => false,
    }
}

fn is_shorthand_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn with_git_suffix(url: &str) -> String {
    if url.ends_with(".git") {
        url.to_string()
    } else {
        format!("{url}.git")
    }
}

/// `https://host/<owner>/<repo>/tree/<ref>/<path...>`.
fn parse_tree_url(base: &str) -> std::result::Result<Option<GitSource>, String> {
    let Some(rest) = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
    else {
        return Ok(None);
    };
    let scheme = &base[..base.len() - rest.len()];

    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    if segments.len() < 5 || segments[3] != "tree" {
        return Ok(None);
    }
    let (host, owner, repo, git_ref) = (segments[0], segments[1], segments[2], segments[4]);
    if owner.is_empty() || repo.is_empty() || git_ref.is_empty() {
        return Err("tree URL is missing owner, repository or ref".into());
    }

    let repo = repo.trim_end_matches(".git");
    let subdirectory = normalize_subdirectory(&segments[5..].join("/"))?;
    Ok(Some(GitSource {
        clone_url: format!("{scheme}{host}/{owner}/{repo}.git"),
        git_ref: Some(git_ref.to_string()),
        subdirectory,
        local_path: None,
    }))
}

/// Drop empty and `.` components; reject `..` anywhere.
fn normalize_subdirectory(raw: &str) -> std::result::Result<Option<String>, String> {
    let mut parts = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => {},
            ".." => return Err(format!("subdirectory '{raw}' must not contain '..'")),
            other => parts.push(other),
        }
    }
    Ok((!parts.is_empty()).then(|| parts.join("/")))
}

/// Options for [`resolve`].
#[derive(Debug, Clone, Copy)]
pub struct GitResolveOptions<'a> {
    pub temp_root: &'a Path,
    pub cwd: &'a Path,
    pub home_dir: Option<&'a Path>,
}

/// A checked-out git source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitResolution {
    pub parsed: GitSource,
    /// URL actually cloned (local paths become `file://` URLs).
    pub clone_url: String,
    pub scratch_dir: PathBuf,
    pub checkout_path: PathBuf,
    pub content_path: PathBuf,
    pub commit_sha: String,
}

/// Shallow-clone `raw` into a fresh scratch directory under `temp_root`.
pub async fn resolve(
    runner: &dyn CommandRunner,
    raw: &str,
    options: GitResolveOptions<'_>,
) -> Result<GitResolution> {
    let parsed = parse_source(raw)?;

    let clone_url = match parsed.local_path {
        Some(ref local) => {
            let path = expand_local_path(local, options.cwd, options.home_dir)?;
            if !path.exists() {
                return Err(Error::git(format!(
                    "local source {} does not exist",
                    path.display()
                )));
            }
            file_url(&path)
        },
        None => parsed.clone_url.clone(),
    };

    let scratch_dir = make_scratch_dir(options.temp_root, "git")?;
    let checkout_path = scratch_dir.join("checkout");
    let checkout_display = checkout_path.to_string_lossy().into_owned();
    let checkout = checkout_display.as_str();

    info!(url = %clone_url, git_ref = ?parsed.git_ref, "cloning git source");
    run_git(
        runner,
        git()
            .args(["clone", "--depth", "1", "--quiet", "--"])
            .args([clone_url.as_str(), checkout]),
    )
    .await?;

    if let Some(ref git_ref) = parsed.git_ref {
        run_git(
            runner,
            git()
                .args(["-C", checkout, "fetch", "--depth", "1", "--quiet", "origin"])
                .arg(git_ref),
        )
        .await?;
        run_git(
            runner,
            git().args(["-C", checkout, "checkout", "--quiet", "FETCH_HEAD"]),
        )
        .await?;
    }

    let head = run_git(runner, git().args(["-C", checkout, "rev-parse", "HEAD"])).await?;
    let commit_sha = head.stdout.trim().to_string();
    if commit_sha.is_empty() {
        return Err(Error::git("rev-parse HEAD returned no commit"));
    }

    let content_path = resolve_content_path(&checkout_path, parsed.subdirectory.as_deref())?;
    debug!(commit = %commit_sha, content = %content_path.display(), "git source resolved");

    Ok(GitResolution {
        parsed,
        clone_url,
        scratch_dir,
        checkout_path,
        content_path,
        commit_sha,
    })
}

/// Join `subdirectory` onto the checkout, refusing anything that escapes it
/// or is not an existing directory.
fn resolve_content_path(checkout: &Path, subdirectory: Option<&str>) -> Result<PathBuf> {
    let root = std::fs::canonicalize(checkout)
        .map_err(|e| Error::git(format!("checkout {} is missing: {e}", checkout.display())))?;
    let Some(subdirectory) = subdirectory else {
        return Ok(root);
    };

    let joined = root.join(subdirectory);
    let resolved = std::fs::canonicalize(&joined).map_err(|_| {
        Error::git(format!(
            "subdirectory '{subdirectory}' does not exist in the repository"
        ))
    })?;
    if !resolved.starts_with(&root) {
        return Err(Error::git(format!(
            "subdirectory '{subdirectory}' escapes the repository root"
        )));
    }
    if !resolved.is_dir() {
        return Err(Error::git(format!(
            "subdirectory '{subdirectory}' is not a directory"
        )));
    }
    Ok(resolved)
}

/// Query the commit the remote currently has for `git_ref` (or `HEAD`).
pub async fn ls_remote(
    runner: &dyn CommandRunner,
    url: &str,
    git_ref: Option<&str>,
) -> Result<String> {
    let target = git_ref.unwrap_or("HEAD");
    let output = run_git(runner, git().args(["ls-remote", "--", url, target])).await?;
    pick_ls_remote_sha(&output.stdout, git_ref).ok_or_else(|| {
        Error::git(format!("ref '{target}' not found on {url}"))
    })
}

/// Choose the commit for `git_ref` from `ls-remote` output, preferring a
/// branch, then a peeled tag, then a plain tag, then the first line.
pub fn pick_ls_remote_sha(stdout: &str, git_ref: Option<&str>) -> Option<String> {
    let refs: Vec<(&str, &str)> = stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?, parts.next()?))
        })
        .collect();

    if let Some(git_ref) = git_ref {
        let preferred = [
            format!("refs/heads/{git_ref}"),
            format!("refs/tags/{git_ref}^{{}}"),
            format!("refs/tags/{git_ref}"),
        ];
        for wanted in &preferred {
            if let Some((sha, _)) = refs.iter().find(|(_, name)| name == wanted) {
                return Some((*sha).to_string());
            }
        }
    }

    refs.first().map(|(sha, _)| (*sha).to_string())
}

/// Whether `value` looks like a full 40-character commit SHA.
pub fn is_commit_sha(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn git() -> CommandSpec {
    CommandSpec::new("git")
        .args(["-c", "advice.detachedHead=false"])
        .env("GIT_TERMINAL_PROMPT", "0")
}

async fn run_git(runner: &dyn CommandRunner, spec: CommandSpec) -> Result<CommandOutput> {
    let output = runner.run(&spec).await?;
    if !output.success() {
        return Err(Error::GitCommand {
            command: spec.display(),
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
