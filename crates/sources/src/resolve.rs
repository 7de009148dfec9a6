//! Source-string dispatch: pick the resolver for a source and normalize its
//! result into a [`ResolvedSource`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    skillet_common::{CommandRunner, SystemCommandRunner},
    tracing::debug,
};

use crate::{
    archive,
    error::{Error, Result},
    git::{self, GitResolveOptions},
    http,
    local::{expand_local_path, file_url, is_git_work_tree, is_local_path},
    oci,
    types::{ResolveOptions, ResolvedSource, SourceType},
};

/// A classified source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Git(String),
    Http(String),
    Oci(String),
    /// A plain local directory, already expanded to an absolute path.
    Local(PathBuf),
}

impl SourceSpec {
    /// Classify `raw`. Local directories that are git work trees, or that
    /// carry a `#ref` fragment, go through git so they get a commit digest.
    pub fn parse(raw: &str, cwd: &Path, home_dir: Option<&Path>) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_source(raw, "empty source"));
        }
        if raw.starts_with("oci://") {
            return Ok(Self::Oci(raw.to_string()));
        }
        if (raw.starts_with("https://") || raw.starts_with("http://"))
            && archive::format_from_url(raw).is_some()
        {
            return Ok(Self::Http(raw.to_string()));
        }
        if is_local_path(raw) && !raw.contains('#') {
            let path = expand_local_path(raw, cwd, home_dir)?;
            if path.is_dir() && !is_git_work_tree(&path) {
                return Ok(Self::Local(path));
            }
        }
        Ok(Self::Git(raw.to_string()))
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Git(_) => SourceType::Git,
            Self::Http(_) => SourceType::Http,
            Self::Oci(_) => SourceType::Oci,
            Self::Local(_) => SourceType::Local,
        }
    }
}

/// The external capabilities resolvers need.
#[derive(Clone)]
pub struct Resolvers {
    pub runner: Arc<dyn CommandRunner>,
    pub http: reqwest::Client,
}

impl Resolvers {
    pub fn new(runner: Arc<dyn CommandRunner>, http: reqwest::Client) -> Self {
        Self { runner, http }
    }

    /// Real subprocesses and a default HTTP client.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemCommandRunner), reqwest::Client::new())
    }

    /// Commit the remote currently has for `git_ref` (or `HEAD`).
    pub async fn latest_git_commit(&self, url: &str, git_ref: Option<&str>) -> Result<String> {
        git::ls_remote(self.runner.as_ref(), url, git_ref).await
    }

    /// Manifest digest the registry currently serves for `reference`.
    pub async fn latest_oci_digest(
        &self,
        reference: &str,
        options: &ResolveOptions,
    ) -> Result<String> {
        let parsed = oci::OciReference::parse(reference)?;
        let insecure = options.oci_insecure(&parsed.registry);
        oci::fetch_manifest_digest(&self.http, reference, insecure).await
    }
}

impl std::fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}

/// Resolve `raw` into local content. Scratch data lands under
/// `options.temp_root` and is left for the caller to remove.
pub async fn resolve_source(
    resolvers: &Resolvers,
    raw: &str,
    options: &ResolveOptions,
) -> Result<ResolvedSource> {
    let spec = SourceSpec::parse(raw, &options.cwd, options.home_dir.as_deref())?;
    debug!(source = raw, kind = %spec.source_type(), "resolving source");

    match spec {
        SourceSpec::Git(raw) => {
            let resolution = git::resolve(
                resolvers.runner.as_ref(),
                &raw,
                GitResolveOptions {
                    temp_root: &options.temp_root,
                    cwd: &options.cwd,
                    home_dir: options.home_dir.as_deref(),
                },
            )
            .await?;
            Ok(ResolvedSource {
                source_type: SourceType::Git,
                url: resolution.clone_url,
                git_ref: resolution.parsed.git_ref,
                subpath: resolution.parsed.subdirectory,
                digest: Some(resolution.commit_sha),
                content_path: resolution.content_path,
                scratch_dir: Some(resolution.scratch_dir),
            })
        },
        SourceSpec::Http(url) => {
            let resolution =
                http::resolve(&resolvers.http, &url, &options.temp_root, options.limits).await?;
            Ok(ResolvedSource {
                source_type: SourceType::Http,
                url,
                git_ref: None,
                subpath: None,
                digest: Some(resolution.digest),
                content_path: resolution.content_path,
                scratch_dir: Some(resolution.scratch_dir),
            })
        },
        SourceSpec::Oci(reference) => {
            let parsed = oci::OciReference::parse(&reference)?;
            let resolution = oci::resolve(
                &resolvers.http,
                &reference,
                &options.temp_root,
                options.oci_insecure(&parsed.registry),
                options.limits,
            )
            .await?;
            Ok(ResolvedSource {
                source_type: SourceType::Oci,
                url: resolution.parsed.to_string(),
                git_ref: None,
                subpath: None,
                digest: Some(resolution.resolved_digest),
                content_path: resolution.content_path,
                scratch_dir: Some(resolution.scratch_dir),
            })
        },
        SourceSpec::Local(path) => {
            let content_path = std::fs::canonicalize(&path)?;
            Ok(ResolvedSource {
                source_type: SourceType::Local,
                url: file_url(&content_path),
                git_ref: None,
                subpath: None,
                digest: None,
                content_path,
                scratch_dir: None,
            })
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_strings() {
        let tmp = tempfile::tempdir().unwrap();
        let cwd = tmp.path();
        std::fs::create_dir_all(cwd.join("plain")).unwrap();
        std::fs::create_dir_all(cwd.join("repo/.git")).unwrap();

        let parse = |raw: &str| SourceSpec::parse(raw, cwd, None).unwrap();

        assert_eq!(
            parse("oci://ghcr.io/acme/alpha:v1"),
            SourceSpec::Oci("oci://ghcr.io/acme/alpha:v1".into())
        );
        assert_eq!(
            parse("https://example.com/skills.tar.gz"),
            SourceSpec::Http("https://example.com/skills.tar.gz".into())
        );
        assert_eq!(
            parse("https://github.com/acme/skills"),
            SourceSpec::Git("https://github.com/acme/skills".into())
        );
        assert_eq!(parse("acme/skills").source_type(), SourceType::Git);
        assert_eq!(parse("./plain"), SourceSpec::Local(cwd.join("plain")));
        assert_eq!(parse("./repo"), SourceSpec::Git("./repo".into()));
        assert_eq!(parse("./plain#main"), SourceSpec::Git("./plain#main".into()));
        assert_eq!(parse("./missing"), SourceSpec::Git("./missing".into()));
    }

    #[tokio::test]
    async fn local_directory_resolves_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join("skills-dir");
        std::fs::create_dir_all(skills.join("alpha")).unwrap();

        let options = ResolveOptions::new(tmp.path().join("scratch"), tmp.path());
        let resolved = resolve_source(&Resolvers::system(), "./skills-dir", &options)
            .await
            .unwrap();

        assert_eq!(resolved.source_type, SourceType::Local);
        assert_eq!(resolved.content_path, std::fs::canonicalize(&skills).unwrap());
        assert!(resolved.url.starts_with("file://"));
        assert_eq!(resolved.digest, None);
        assert_eq!(resolved.scratch_dir, None);
    }
}
