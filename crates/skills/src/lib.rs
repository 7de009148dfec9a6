//! Skill management: parsing `SKILL.md`, discovery, installation into agent
//! directories, provenance, the lockfile and the command flows built on them.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions, following the Agent Skills open standard.

pub mod add;
pub mod agents;
pub mod check;
pub mod discover;
pub mod error;
pub mod host;
pub mod install;
pub mod lockfile;
pub mod parse;
pub mod provenance;
pub mod remove;
pub mod types;

pub use {
    add::{AddOptions, AddReport, add},
    agents::Agent,
    check::{CheckOptions, CheckResult, CheckStatus, UpdateOptions, UpdateReport, check, update},
    error::{Error, ParseError, Result},
    host::{Host, NonInteractive, Prompter},
    lockfile::{Lockfile, LockfileSource, ScopePaths},
    remove::{ListOptions, RemoveOptions, list, remove},
    types::{DiscoveredSkill, InstallMethod, Scope, SkillDescriptor},
};
