//! `remove` and `list` over installed agent directories.

use std::path::PathBuf;

use {
    skillet_common::{EntryKind, fs::remove_entry},
    tracing::info,
};

use crate::{
    agents::{Agent, parse_agents},
    discover::{DiscoveryResult, discover_in_dirs},
    error::{Error, Result},
    host::Host,
    lockfile,
    parse::validate_name,
    types::Scope,
};

#[derive(Debug, Clone)]
pub struct RemoveOptions {
    pub names: Vec<String>,
    /// Agent ids; empty means every agent.
    pub agents: Vec<String>,
    pub scope: Scope,
    pub yes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
    pub removed: Vec<(String, Agent)>,
    pub lockfile_path: PathBuf,
}

/// Delete installed skills from agent directories. Storage is left alone.
pub fn remove(host: &Host, options: &RemoveOptions) -> Result<RemoveReport> {
    if options.names.is_empty() {
        return Err(Error::message("no skill names given"));
    }
    if let Some(bad) = options.names.iter().find(|n| !validate_name(n)) {
        return Err(Error::message(format!("invalid skill name '{bad}'")));
    }
    let agents = if options.agents.is_empty() {
        Agent::ALL.to_vec()
    } else {
        parse_agents(&options.agents)?
    };
    let paths = host.scope_paths(options.scope)?;

    let mut targets = Vec::new();
    let mut missing = Vec::new();
    for name in &options.names {
        let before = targets.len();
        for &agent in &agents {
            let path = agent.skills_dir(&paths.root).join(name);
            if matches!(
                host.fs.entry_kind(&path)?,
                Some(EntryKind::Dir | EntryKind::Symlink)
            ) {
                targets.push((name.clone(), agent, path));
            }
        }
        if targets.len() == before {
            missing.push(name.clone());
        }
    }

    if !targets.is_empty() && !options.yes {
        let question = format!("Remove {} installed skill(s)?", targets.len());
        if !host.prompter.confirm(&question)? {
            return Err(Error::message("aborted"));
        }
    }

    let mut removed = Vec::new();
    for (name, agent, path) in targets {
        remove_entry(host.fs.as_ref(), &path)?;
        info!(skill = %name, %agent, path = %path.display(), "skill removed");
        host.sink.emit(&format!("{agent}: removed {name}"));
        removed.push((name, agent));
    }
    for name in &missing {
        host.sink.emit_error(&format!("{name} is not installed"));
    }

    let generated = lockfile::regenerate(host.fs.as_ref(), &paths)?;
    if !missing.is_empty() {
        return Err(Error::message(format!(
            "not installed: {}",
            missing.join(", ")
        )));
    }
    Ok(RemoveReport {
        removed,
        lockfile_path: generated.output_path,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub scope: Scope,
    pub verbose: bool,
}

/// Discover installed skills and print `name  description  path`.
pub fn list(host: &Host, options: &ListOptions) -> Result<DiscoveryResult> {
    let mut roots = Vec::new();
    match options.scope {
        Scope::Project => {
            roots.push(host.cwd.clone());
            roots.extend(host.home_dir.clone());
        },
        Scope::Global => roots.push(host.scope_paths(Scope::Global)?.root),
    }
    let dirs: Vec<_> = roots
        .iter()
        .flat_map(|root| Agent::ALL.map(|agent| agent.skills_dir(root)))
        .collect();

    let result = discover_in_dirs(host.fs.as_ref(), &dirs, options.verbose);
    for warning in &result.warnings {
        host.sink.emit_error(&format!(
            "warning: {}: {}",
            warning.path.display(),
            warning.message
        ));
    }
    if result.skills.is_empty() {
        host.sink.emit("no skills installed");
    }
    for skill in &result.skills {
        host.sink.emit(&format!(
            "{}  {}  {}",
            skill.name(),
            skill.descriptor.description,
            skill.path.display()
        ));
    }
    Ok(result)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        super::*,
        crate::{
            add::tests::{ScriptedPrompter, test_host, write_skill},
            host::NonInteractive,
        },
    };

    fn options(names: &[&str]) -> RemoveOptions {
        RemoveOptions {
            names: names.iter().map(|n| n.to_string()).collect(),
            agents: Vec::new(),
            scope: Scope::Project,
            yes: true,
        }
    }

    #[test]
    fn removes_from_every_agent_and_refreshes_lockfile() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, sink) = test_host(tmp.path(), Arc::new(NonInteractive));
        write_skill(&host.cwd.join(".codex/skills/alpha"), "alpha", "");
        write_skill(&host.cwd.join(".claude/skills/alpha"), "alpha", "");
        write_skill(&host.cwd.join(".claude/skills/beta"), "beta", "");

        let report = remove(&host, &options(&["alpha"])).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(!host.cwd.join(".codex/skills/alpha").exists());
        assert!(host.cwd.join(".claude/skills/beta").exists());
        assert_eq!(sink.lines(), vec!["claude: removed alpha", "codex: removed alpha"]);

        let lock = std::fs::read_to_string(&report.lockfile_path).unwrap();
        assert!(lock.contains("beta"));
        assert!(!lock.contains("alpha"));
    }

    #[cfg(unix)]
    #[test]
    fn removing_a_symlink_keeps_its_target() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, _) = test_host(tmp.path(), Arc::new(NonInteractive));
        let stored = tmp.path().join("store/alpha");
        write_skill(&stored, "alpha", "");
        let skills = host.cwd.join(".codex/skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::os::unix::fs::symlink(&stored, skills.join("alpha")).unwrap();

        remove(&host, &options(&["alpha"])).unwrap();
        assert!(std::fs::symlink_metadata(skills.join("alpha")).is_err());
        assert!(stored.join("SKILL.md").is_file());
    }

    #[test]
    fn missing_skill_is_reported_and_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, sink) = test_host(tmp.path(), Arc::new(NonInteractive));
        let err = remove(&host, &options(&["ghost"])).unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert_eq!(sink.error_lines(), vec!["ghost is not installed"]);
    }

    #[test]
    fn traversal_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, _) = test_host(tmp.path(), Arc::new(NonInteractive));
        assert!(remove(&host, &options(&["../project"])).is_err());
        assert!(host.cwd.exists());
    }

    #[test]
    fn declined_confirmation_keeps_skills() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, _) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));
        write_skill(&host.cwd.join(".codex/skills/alpha"), "alpha", "");

        let mut opts = options(&["alpha"]);
        opts.yes = false;
        assert!(remove(&host, &opts).is_err());
        assert!(host.cwd.join(".codex/skills/alpha").exists());
    }

    #[test]
    fn list_covers_project_and_home() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, sink) = test_host(tmp.path(), Arc::new(NonInteractive));
        write_skill(&host.cwd.join(".codex/skills/alpha"), "alpha", "");
        write_skill(
            &host.home_dir.clone().unwrap().join(".gemini/skills/beta"),
            "beta",
            "",
        );

        let project = list(&host, &ListOptions {
            scope: Scope::Project,
            verbose: false,
        })
        .unwrap();
        assert_eq!(project.skills.len(), 2);
        assert!(sink.lines()[0].starts_with("alpha  the alpha skill  "));

        let global = list(&host, &ListOptions {
            scope: Scope::Global,
            verbose: false,
        })
        .unwrap();
        assert_eq!(global.skills.len(), 1);
        assert_eq!(global.skills[0].name(), "beta");
    }
}
