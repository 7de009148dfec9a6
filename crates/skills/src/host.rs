//! Everything a command flow needs from the outside world.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    skillet_common::{FileSystem, LineSink, OsFileSystem, StdioSink},
    skillet_config::SkilletConfig,
    skillet_sources::{ArchiveLimits, ResolveOptions, Resolvers},
};

use crate::{
    agents::Agent,
    error::{Error, Result},
    lockfile::ScopePaths,
    types::{DiscoveredSkill, InstallMethod, Scope},
};

/// Interactive choices made during `add` and `remove`.
pub trait Prompter: Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool>;
    /// Names of the chosen skills.
    fn select_skills(&self, skills: &[DiscoveredSkill]) -> Result<Vec<String>>;
    fn select_agents(&self, candidates: &[Agent]) -> Result<Vec<Agent>>;
    fn select_method(&self) -> Result<InstallMethod>;
}

/// Refuses every prompt; used when stdin is not a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl NonInteractive {
    fn refuse<T>() -> Result<T> {
        Err(Error::message("interactive input required; pass --yes"))
    }
}

impl Prompter for NonInteractive {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Self::refuse()
    }

    fn select_skills(&self, _skills: &[DiscoveredSkill]) -> Result<Vec<String>> {
        Self::refuse()
    }

    fn select_agents(&self, _candidates: &[Agent]) -> Result<Vec<Agent>> {
        Self::refuse()
    }

    fn select_method(&self) -> Result<InstallMethod> {
        Self::refuse()
    }
}

#[derive(Clone)]
pub struct Host {
    pub fs: Arc<dyn FileSystem>,
    pub resolvers: Resolvers,
    pub sink: Arc<dyn LineSink>,
    pub prompter: Arc<dyn Prompter>,
    pub config: SkilletConfig,
    pub cwd: PathBuf,
    pub home_dir: Option<PathBuf>,
    /// Parent of per-command scratch directories.
    pub temp_root: PathBuf,
}

impl Host {
    /// Real filesystem, subprocesses and stdio.
    pub fn system(
        config: SkilletConfig,
        cwd: PathBuf,
        home_dir: Option<PathBuf>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            fs: Arc::new(OsFileSystem),
            resolvers: Resolvers::system(),
            sink: Arc::new(StdioSink),
            prompter,
            config,
            cwd,
            home_dir,
            temp_root: std::env::temp_dir(),
        }
    }

    pub fn scope_paths(&self, scope: Scope) -> Result<ScopePaths> {
        ScopePaths::new(scope, &self.cwd, self.home_dir.as_deref())
    }

    /// `storage.root` when configured, else `<scope root>/.skillet/store`.
    pub fn storage_root(&self, scope: Scope) -> Result<PathBuf> {
        if let Some(ref root) = self.config.storage.root {
            return Ok(if root.is_absolute() {
                root.clone()
            } else {
                self.cwd.join(root)
            });
        }
        Ok(self.scope_paths(scope)?.root.join(".skillet").join("store"))
    }

    pub fn resolve_options(&self, temp_root: &Path) -> ResolveOptions {
        let archive = &self.config.archive;
        ResolveOptions {
            temp_root: temp_root.to_path_buf(),
            cwd: self.cwd.clone(),
            home_dir: self.home_dir.clone(),
            limits: ArchiveLimits {
                max_download_bytes: archive.max_download_bytes,
                max_entries: archive.max_entries,
                max_extracted_bytes: archive.max_extracted_bytes,
            },
            force_http: self.config.oci.force_http,
            insecure_registries: self.config.oci.insecure_registries.clone(),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("cwd", &self.cwd)
            .field("home_dir", &self.home_dir)
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}
