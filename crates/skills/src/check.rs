//! Compare lockfile sources against upstream and reinstall the stale ones.

use std::fmt;

use {
    serde::Serialize,
    skillet_sources::{ResolveOptions, Resolvers, SourceType, git::is_commit_sha},
    tracing::{info, warn},
};

use crate::{
    add::{self, AddOptions},
    error::{Context, Result},
    host::Host,
    lockfile::{self, Lockfile, LockfileSource},
    types::Scope,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    UpToDate,
    Outdated,
    Unsupported,
    Error,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpToDate => "up-to-date",
            Self::Outdated => "outdated",
            Self::Unsupported => "unsupported",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub source: LockfileSource,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// `<status>  <url>[#ref]  <skills>[  latest <digest>]`
    pub fn line(&self) -> String {
        let mut line = format!(
            "{}  {}  {}",
            self.status,
            self.source.source_string(),
            self.source.skills.join(",")
        );
        if let Some(ref digest) = self.latest_digest {
            line.push_str(&format!("  latest {digest}"));
        }
        if let Some(ref message) = self.message {
            line.push_str(&format!("  ({message})"));
        }
        line
    }
}

/// Check every source in order. Failures become `error` results.
pub async fn check_lockfile(
    resolvers: &Resolvers,
    lockfile: &Lockfile,
    options: &ResolveOptions,
) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(lockfile.sources.len());
    for source in &lockfile.sources {
        results.push(check_source(resolvers, source, options).await);
    }
    results
}

/// Compare one lock source against upstream.
pub async fn check_source(
    resolvers: &Resolvers,
    source: &LockfileSource,
    options: &ResolveOptions,
) -> CheckResult {
    let latest = match source.source_type.as_str() {
        t if t == SourceType::Git.as_str() => match source.git_ref {
            Some(ref pinned) if is_commit_sha(pinned) => Ok(pinned.to_ascii_lowercase()),
            _ => {
                resolvers
                    .latest_git_commit(&source.url, source.git_ref.as_deref())
                    .await
            },
        },
        t if t == SourceType::Oci.as_str() => match pinned_oci_digest(&source.url) {
            Some(digest) => Ok(digest.to_string()),
            None => resolvers.latest_oci_digest(&source.url, options).await,
        },
        _ => {
            return CheckResult {
                source: source.clone(),
                status: CheckStatus::Unsupported,
                latest_digest: None,
                message: None,
            };
        },
    };

    match latest {
        Ok(latest) => {
            let status = match source.digest {
                Some(ref recorded) if !recorded.eq_ignore_ascii_case(&latest) => {
                    CheckStatus::Outdated
                },
                // No baseline for digest-pinned OCI references means the
                // digest was never recorded; reinstalling records it.
                None if pinned_oci_digest(&source.url).is_some() => CheckStatus::Outdated,
                _ => CheckStatus::UpToDate,
            };
            CheckResult {
                source: source.clone(),
                status,
                latest_digest: Some(latest),
                message: None,
            }
        },
        Err(e) => {
            warn!(url = %source.url, error = %e, "source check failed");
            CheckResult {
                source: source.clone(),
                status: CheckStatus::Error,
                latest_digest: None,
                message: Some(e.to_string()),
            }
        },
    }
}

fn pinned_oci_digest(url: &str) -> Option<&str> {
    url.strip_prefix("oci://")
        .and_then(|rest| rest.split_once('@'))
        .map(|(_, digest)| digest)
}

#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    pub scope: Scope,
    pub json: bool,
}

/// Read (or derive) the scope's lockfile and check every source.
pub async fn check(host: &Host, options: &CheckOptions) -> Result<Vec<CheckResult>> {
    let results = run_check(host, options.scope).await?;
    if options.json {
        let json = serde_json::to_string_pretty(&results)
            .context("cannot encode check results")?;
        host.sink.emit(&json);
    } else if results.is_empty() {
        host.sink.emit("no sources in lockfile");
    } else {
        for result in &results {
            if result.status == CheckStatus::Error {
                host.sink.emit_error(&result.line());
            } else {
                host.sink.emit(&result.line());
            }
        }
    }
    Ok(results)
}

async fn run_check(host: &Host, scope: Scope) -> Result<Vec<CheckResult>> {
    let paths = host.scope_paths(scope)?;
    let lock = match lockfile::read_lockfile(host.fs.as_ref(), &paths.lockfile)? {
        Some(lock) => lock,
        None => lockfile::generate(host.fs.as_ref(), &paths)?.lockfile,
    };
    let options = host.resolve_options(&host.temp_root);
    Ok(check_lockfile(&host.resolvers, &lock, &options).await)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub updated: Vec<String>,
    /// `(skill, reason)`
    pub failed: Vec<(String, String)>,
    /// Sources whose check itself failed.
    pub check_errors: usize,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.check_errors == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    pub scope: Scope,
    pub verbose: bool,
}

/// Reinstall every outdated source with its recorded ref, agents, skills
/// and install method.
pub async fn update(host: &Host, options: &UpdateOptions) -> Result<UpdateReport> {
    let results = run_check(host, options.scope).await?;
    let mut report = UpdateReport::default();

    for result in results.iter().filter(|r| r.status == CheckStatus::Error) {
        report.check_errors += 1;
        host.sink.emit_error(&result.line());
    }

    // Each lock entry is already one source tuple, so one entry is one
    // re-resolve.
    let outdated: Vec<_> = results
        .iter()
        .filter(|r| r.status == CheckStatus::Outdated)
        .collect();
    if outdated.is_empty() {
        if report.check_errors == 0 {
            host.sink.emit("all skills are up to date");
        }
        return Ok(report);
    }

    for result in outdated {
        let source = &result.source;
        info!(source = %source.source_string(), "updating source");
        let add_options = AddOptions {
            source: source.source_string(),
            agents: source.agents.clone(),
            skills: source.skills.clone(),
            scope: options.scope,
            yes: true,
            method: Some(source.install_method),
            verbose: options.verbose,
        };
        match add::run(host, &add_options).await {
            Ok(added) => {
                for skill in &source.skills {
                    match added.failures.iter().find(|f| &f.skill == skill) {
                        Some(failure) => {
                            host.sink
                                .emit_error(&format!("failed {skill}: {}", failure.message));
                            report.failed.push((skill.clone(), failure.message.clone()));
                        },
                        None => {
                            host.sink.emit(&format!("updated {skill}"));
                            report.updated.push(skill.clone());
                        },
                    }
                }
            },
            Err(e) => {
                for skill in &source.skills {
                    host.sink.emit_error(&format!("failed {skill}: {e}"));
                    report.failed.push((skill.clone(), e.to_string()));
                }
            },
        }
    }
    Ok(report)
}
