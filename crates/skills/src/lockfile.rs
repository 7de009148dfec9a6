//! `skillet.lock.yaml`: derived from the provenance sidecars of every
//! installed skill, grouped by source identity and sorted.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    skillet_common::{EntryKind, FileSystem, fs::write_atomic},
    skillet_sources::local::file_url,
    tracing::{debug, info},
};

use crate::{
    agents::Agent,
    error::{Context, Error, Result},
    parse::parse_skill_dir,
    provenance::{UNKNOWN_SOURCE_TYPE, read_provenance},
    types::{InstallMethod, Scope},
};

pub const LOCKFILE_NAME: &str = "skillet.lock.yaml";
pub const LOCKFILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    #[serde(default)]
    pub sources: Vec<LockfileSource>,
}

/// One source identity and everything installed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockfileSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub install_method: InstallMethod,
    /// Repository subdirectory, when the skills came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    pub skills: Vec<String>,
    pub agents: Vec<String>,
}

impl LockfileSource {
    /// `url` plus a `#ref[:subpath]` fragment, as accepted by `add`.
    pub fn source_string(&self) -> String {
        match (self.git_ref.as_deref(), self.subpath.as_deref()) {
            (Some(git_ref), Some(subpath)) => format!("{}#{git_ref}:{subpath}", self.url),
            (None, Some(subpath)) => format!("{}#:{subpath}", self.url),
            (Some(git_ref), None) => format!("{}#{git_ref}", self.url),
            (None, None) => self.url.clone(),
        }
    }
}

/// Where a scope's agent directories live and where its lockfile goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePaths {
    pub root: PathBuf,
    pub lockfile: PathBuf,
}

impl ScopePaths {
    pub fn new(scope: Scope, cwd: &Path, home_dir: Option<&Path>) -> Result<Self> {
        match scope {
            Scope::Project => Ok(Self {
                root: cwd.to_path_buf(),
                lockfile: cwd.join(LOCKFILE_NAME),
            }),
            Scope::Global => {
                let home = home_dir.context("home directory is not known")?;
                Ok(Self {
                    root: home.to_path_buf(),
                    lockfile: home.join(".skillet").join(LOCKFILE_NAME),
                })
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedLockfile {
    pub output_path: PathBuf,
    pub yaml: String,
    pub lockfile: Lockfile,
}

/// `(type, url, ref, digest, installMethod, subpath)`
type GroupKey = (
    String,
    String,
    Option<String>,
    Option<String>,
    &'static str,
    Option<String>,
);

#[derive(Default)]
struct Group {
    skills: BTreeSet<String>,
    agents: BTreeSet<String>,
}

/// Build the lock document from disk without writing it.
pub fn generate(fs: &dyn FileSystem, paths: &ScopePaths) -> Result<GeneratedLockfile> {
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();

    for agent in Agent::ALL {
        let skills_dir = agent.skills_dir(&paths.root);
        if !fs.is_dir(&skills_dir) {
            continue;
        }
        for entry in fs.read_dir(&skills_dir)? {
            if !fs.is_dir(&entry) {
                continue;
            }
            let descriptor = match parse_skill_dir(fs, &entry, false) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        path = %entry.display(),
                        error = %e,
                        "not a valid skill, leaving out of lockfile"
                    );
                    continue;
                },
            };

            let is_link = fs.entry_kind(&entry)? == Some(EntryKind::Symlink);
            let key: GroupKey = match read_provenance(fs, &entry) {
                Some(p) => (
                    p.source_type,
                    p.url,
                    p.git_ref,
                    p.digest,
                    p.install_method.as_str(),
                    p.subpath,
                ),
                None => {
                    let method = if is_link {
                        InstallMethod::Symlink
                    } else {
                        InstallMethod::Copy
                    };
                    (
                        UNKNOWN_SOURCE_TYPE.to_string(),
                        file_url(&entry),
                        None,
                        None,
                        method.as_str(),
                        None,
                    )
                },
            };

            let group = groups.entry(key).or_default();
            group.skills.insert(descriptor.name);
            group.agents.insert(agent.id().to_string());
        }
    }

    let sources = groups
        .into_iter()
        .map(|((source_type, url, git_ref, digest, method, subpath), group)| LockfileSource {
            source_type,
            url,
            git_ref,
            digest,
            install_method: if method == InstallMethod::Copy.as_str() {
                InstallMethod::Copy
            } else {
                InstallMethod::Symlink
            },
            subpath,
            skills: group.skills.into_iter().collect(),
            agents: group.agents.into_iter().collect(),
        })
        .collect();

    let lockfile = Lockfile {
        version: LOCKFILE_VERSION,
        sources,
    };
    let yaml = serde_yaml::to_string(&lockfile)
        .context("cannot encode lockfile")?;

    Ok(GeneratedLockfile {
        output_path: paths.lockfile.clone(),
        yaml,
        lockfile,
    })
}

/// Generate and atomically write the lockfile.
pub fn regenerate(fs: &dyn FileSystem, paths: &ScopePaths) -> Result<GeneratedLockfile> {
    let generated = generate(fs, paths)?;
    write_atomic(fs, &generated.output_path, generated.yaml.as_bytes())?;
    info!(
        path = %generated.output_path.display(),
        sources = generated.lockfile.sources.len(),
        "lockfile written"
    );
    Ok(generated)
}

/// Read a lockfile; `None` when it does not exist.
pub fn read_lockfile(fs: &dyn FileSystem, path: &Path) -> Result<Option<Lockfile>> {
    if !fs.exists(path) {
        return Ok(None);
    }
    let text = fs.read_to_string(path)?;
    let lockfile: Lockfile = serde_yaml::from_str(&text).map_err(|e| Error::Lockfile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if lockfile.version != LOCKFILE_VERSION {
        return Err(Error::Lockfile {
            path: path.to_path_buf(),
            message: format!("unsupported version {}", lockfile.version),
        });
    }
    Ok(Some(lockfile))
}
