//! The `add` flow: resolve a source, pick skills, agents and a method,
//! install every combination and refresh the lockfile.

use std::path::{Path, PathBuf};

use {
    skillet_sources::{ResolvedSource, resolve_source},
    tracing::{debug, info},
};

use crate::{
    agents::{self, Agent, parse_agents},
    discover::{DiscoverOptions, DiscoveryWarning, discover},
    error::{Error, Result},
    host::Host,
    install::{InstallOutcome, InstallRequest, install},
    lockfile,
    provenance::{Provenance, write_provenance},
    types::{DiscoveredSkill, InstallMethod, Scope},
};

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub source: String,
    /// Agent ids; empty means config defaults, detection or a prompt.
    pub agents: Vec<String>,
    /// Skill names; empty means all (with `yes`) or a prompt.
    pub skills: Vec<String>,
    pub scope: Scope,
    pub yes: bool,
    pub method: Option<InstallMethod>,
    pub verbose: bool,
}

impl AddOptions {
    pub fn new(source: impl Into<String>, scope: Scope) -> Self {
        Self {
            source: source.into(),
            agents: Vec::new(),
            skills: Vec::new(),
            scope,
            yes: false,
            method: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementFailure {
    pub skill: String,
    pub agent: Agent,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AddReport {
    pub source: ResolvedSource,
    pub placed: Vec<(Agent, InstallOutcome)>,
    pub failures: Vec<PlacementFailure>,
    pub lockfile_path: PathBuf,
}

/// Run the flow; fails after the lockfile refresh if any placement failed.
pub async fn add(host: &Host, options: &AddOptions) -> Result<AddReport> {
    let report = run(host, options).await?;
    if !report.failures.is_empty() {
        return Err(Error::message(format!(
            "{} of {} placement(s) failed",
            report.failures.len(),
            report.failures.len() + report.placed.len()
        )));
    }
    Ok(report)
}

/// Like [`add`], but placement failures are returned in the report.
pub(crate) async fn run(host: &Host, options: &AddOptions) -> Result<AddReport> {
    let paths = host.scope_paths(options.scope)?;
    let storage_root = host.storage_root(options.scope)?;

    host.fs.create_dir_all(&host.temp_root)?;
    let scratch = tempfile::Builder::new()
        .prefix("skillet-")
        .tempdir_in(&host.temp_root)?;
    let resolved = resolve_source(
        &host.resolvers,
        &options.source,
        &host.resolve_options(scratch.path()),
    )
    .await?;
    info!(
        source = %options.source,
        kind = %resolved.source_type,
        digest = resolved.digest.as_deref().unwrap_or(""),
        "source resolved"
    );

    let discovery = discover(host.fs.as_ref(), &DiscoverOptions {
        cwd: resolved.content_path.clone(),
        home_dir: None,
        verbose: options.verbose,
    });
    for warning in &discovery.warnings {
        host.sink.emit_error(&format_warning(warning));
    }
    if discovery.skills.is_empty() {
        return Err(Error::message(format!("no skills found in {}", options.source)));
    }

    let skills = choose_skills(host, options, &discovery.skills)?;
    let agents = choose_agents(host, options, &paths.root)?;
    let method = choose_method(host, options)?;

    if !options.yes {
        let agent_ids: Vec<_> = agents.iter().map(|a| a.id()).collect();
        let question = format!(
            "Install {} skill(s) for {} using {method}?",
            skills.len(),
            agent_ids.join(", ")
        );
        if !host.prompter.confirm(&question)? {
            return Err(Error::message("aborted"));
        }
    }

    let source_id = resolved.source_id();
    let mut placed = Vec::new();
    let mut failures = Vec::new();
    for skill in &skills {
        for &agent in &agents {
            let request = InstallRequest {
                source_id: source_id.clone(),
                source_skill_path: skill.path.clone(),
                storage_root: storage_root.clone(),
                target_skills_dir: agent.skills_dir(&paths.root),
                prefer_copy: method == InstallMethod::Copy,
                skill_name: Some(skill.name().to_string()),
            };
            match place(host, &request, &resolved) {
                Ok(outcome) => {
                    host.sink.emit(&format!("{agent}: {}", outcome.message));
                    placed.push((agent, outcome));
                },
                Err(e) => {
                    host.sink
                        .emit_error(&format!("{agent}: failed {}: {e}", skill.name()));
                    failures.push(PlacementFailure {
                        skill: skill.name().to_string(),
                        agent,
                        message: e.to_string(),
                    });
                },
            }
        }
    }

    let generated = lockfile::regenerate(host.fs.as_ref(), &paths)?;
    debug!(path = %generated.output_path.display(), "lockfile refreshed after add");

    Ok(AddReport {
        source: resolved,
        placed,
        failures,
        lockfile_path: generated.output_path,
    })
}

fn place(
    host: &Host,
    request: &InstallRequest,
    resolved: &ResolvedSource,
) -> Result<InstallOutcome> {
    let outcome = install(host.fs.as_ref(), request)?;
    write_provenance(
        host.fs.as_ref(),
        &outcome.installed_path,
        &Provenance::from_resolved(resolved, outcome.method),
    )?;
    Ok(outcome)
}

fn format_warning(warning: &DiscoveryWarning) -> String {
    match warning.field {
        Some(ref field) => format!(
            "warning: {}: {} ({field})",
            warning.path.display(),
            warning.message
        ),
        None => format!("warning: {}: {}", warning.path.display(), warning.message),
    }
}

fn choose_skills(
    host: &Host,
    options: &AddOptions,
    available: &[DiscoveredSkill],
) -> Result<Vec<DiscoveredSkill>> {
    let names = if !options.skills.is_empty() {
        options.skills.clone()
    } else if options.yes {
        return Ok(available.to_vec());
    } else {
        host.prompter.select_skills(available)?
    };

    let mut chosen: Vec<DiscoveredSkill> = Vec::new();
    for name in &names {
        let skill = available.iter().find(|s| s.name() == name.as_str()).ok_or_else(|| {
            let known: Vec<_> = available.iter().map(DiscoveredSkill::name).collect();
            Error::message(format!(
                "skill '{name}' not found in {} (available: {})",
                options.source,
                known.join(", ")
            ))
        })?;
        if !chosen.iter().any(|s| s.name() == skill.name()) {
            chosen.push(skill.clone());
        }
    }
    if chosen.is_empty() {
        return Err(Error::message("no skills selected"));
    }
    Ok(chosen)
}

fn choose_agents(host: &Host, options: &AddOptions, root: &Path) -> Result<Vec<Agent>> {
    if !options.agents.is_empty() {
        return parse_agents(&options.agents);
    }
    if !host.config.install.agents.is_empty() {
        return parse_agents(&host.config.install.agents);
    }

    let detected = agents::detect(root);
    let chosen = if options.yes {
        detected
    } else {
        let candidates = if detected.is_empty() {
            Agent::ALL.to_vec()
        } else {
            detected
        };
        host.prompter.select_agents(&candidates)?
    };
    if chosen.is_empty() {
        return Err(Error::AgentDetection(format!(
            "no agents detected under {}; pass --agent (one of: {})",
            root.display(),
            Agent::ids().join(", ")
        )));
    }
    Ok(chosen)
}

fn choose_method(host: &Host, options: &AddOptions) -> Result<InstallMethod> {
    if let Some(method) = options.method {
        return Ok(method);
    }
    if let Some(pref) = host.config.install.method {
        return Ok(pref.into());
    }
    if options.yes {
        return Ok(InstallMethod::Symlink);
    }
    host.prompter.select_method()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use {
        super::*,
        crate::{host::Prompter, lockfile::read_lockfile, provenance::read_provenance},
        skillet_common::{BufferSink, OsFileSystem},
        skillet_config::{InstallMethodPreference, SkilletConfig},
        skillet_sources::Resolvers,
    };

    /// Answers prompts from fixed values and records what was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedPrompter {
        pub confirm: bool,
        pub skills: Vec<String>,
        pub agents: Vec<Agent>,
        pub method: Option<InstallMethod>,
        pub asked: Mutex<Vec<String>>,
    }

    impl Prompter for ScriptedPrompter {
        fn confirm(&self, message: &str) -> Result<bool> {
            self.asked.lock().unwrap().push(format!("confirm: {message}"));
            Ok(self.confirm)
        }

        fn select_skills(&self, _skills: &[DiscoveredSkill]) -> Result<Vec<String>> {
            self.asked.lock().unwrap().push("skills".into());
            Ok(self.skills.clone())
        }

        fn select_agents(&self, _candidates: &[Agent]) -> Result<Vec<Agent>> {
            self.asked.lock().unwrap().push("agents".into());
            Ok(self.agents.clone())
        }

        fn select_method(&self) -> Result<InstallMethod> {
            self.asked.lock().unwrap().push("method".into());
            self.method.ok_or_else(|| Error::message("no method"))
        }
    }

    pub(crate) fn test_host(
        root: &Path,
        prompter: Arc<dyn Prompter>,
    ) -> (Host, Arc<BufferSink>) {
        let sink = Arc::new(BufferSink::new());
        let cwd = root.join("project");
        std::fs::create_dir_all(&cwd).unwrap();
        let host = Host {
            fs: Arc::new(OsFileSystem),
            resolvers: Resolvers::system(),
            sink: sink.clone(),
            prompter,
            config: SkilletConfig::default(),
            cwd,
            home_dir: Some(root.join("home")),
            temp_root: root.join("tmp"),
        };
        (host, sink)
    }

    pub(crate) fn write_skill(dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: the {name} skill\n---\n{body}\n"),
        )
        .unwrap();
    }

    fn source_dir(root: &Path) -> PathBuf {
        let src = root.join("source");
        write_skill(&src.join("skills/alpha"), "alpha", "a");
        write_skill(&src.join("skills/beta"), "beta", "b");
        src
    }

    fn yes_options(source: &Path, agents: &[&str]) -> AddOptions {
        let mut options = AddOptions::new(source.display().to_string(), Scope::Project);
        options.agents = agents.iter().map(|a| a.to_string()).collect();
        options.yes = true;
        options
    }

    #[tokio::test]
    async fn installs_everything_with_yes_and_writes_lockfile() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let (host, sink) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));

        let report = add(&host, &yes_options(&src, &["codex", "claude"])).await.unwrap();
        assert_eq!(report.placed.len(), 4);
        assert!(report.failures.is_empty());

        let installed = host.cwd.join(".codex/skills/alpha");
        assert!(installed.join("SKILL.md").is_file());
        let provenance = read_provenance(&OsFileSystem, &installed).unwrap();
        assert_eq!(provenance.source_type, "local");
        assert_eq!(provenance.install_method, InstallMethod::Symlink);

        let lock = read_lockfile(&OsFileSystem, &report.lockfile_path).unwrap().unwrap();
        assert_eq!(lock.sources.len(), 1);
        assert_eq!(lock.sources[0].skills, vec!["alpha", "beta"]);
        assert_eq!(lock.sources[0].agents, vec!["claude", "codex"]);
        assert!(
            sink.lines()
                .iter()
                .any(|l| l == "codex: installed alpha (symlink)")
        );
        assert!(host.cwd.join(".skillet/store").is_dir());
    }

    #[tokio::test]
    async fn unknown_skill_name_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let (host, _) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));

        let mut options = yes_options(&src, &["codex"]);
        options.skills = vec!["gamma".into()];
        let err = add(&host, &options).await.unwrap_err();
        assert!(err.to_string().contains("available: alpha, beta"), "{err}");
        assert!(!host.cwd.join(".codex/skills").exists());
    }

    #[tokio::test]
    async fn conflict_fails_one_placement_but_not_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let (host, sink) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));
        let codex = host.cwd.join(".codex/skills");
        std::fs::create_dir_all(&codex).unwrap();
        std::fs::write(codex.join("alpha"), "mine").unwrap();

        let mut options = yes_options(&src, &["codex"]);
        options.skills = vec!["alpha".into(), "beta".into()];
        let err = add(&host, &options).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"), "{err}");
        assert_eq!(std::fs::read_to_string(codex.join("alpha")).unwrap(), "mine");
        assert!(codex.join("beta/SKILL.md").is_file());
        assert!(sink.error_lines()[0].contains("failed alpha"));
        assert!(host.cwd.join("skillet.lock.yaml").is_file());
    }

    #[tokio::test]
    async fn prompts_drive_selection_when_not_yes() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let prompter = Arc::new(ScriptedPrompter {
            confirm: true,
            skills: vec!["beta".into()],
            agents: vec![Agent::Cursor],
            method: Some(InstallMethod::Copy),
            ..Default::default()
        });
        let (host, _) = test_host(tmp.path(), prompter.clone());

        let options = AddOptions::new(src.display().to_string(), Scope::Project);
        let report = add(&host, &options).await.unwrap();
        assert_eq!(report.placed.len(), 1);
        let installed = host.cwd.join(".cursor/skills/beta");
        assert!(std::fs::symlink_metadata(&installed).unwrap().file_type().is_dir());
        let asked = prompter.asked.lock().unwrap().clone();
        assert_eq!(asked[..3], ["skills", "agents", "method"]);
        assert!(asked[3].starts_with("confirm: Install 1 skill(s) for cursor using copy"));
    }

    #[tokio::test]
    async fn declined_confirmation_installs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let prompter = Arc::new(ScriptedPrompter {
            confirm: false,
            ..Default::default()
        });
        let (host, _) = test_host(tmp.path(), prompter);

        let mut options = AddOptions::new(src.display().to_string(), Scope::Project);
        options.agents = vec!["codex".into()];
        options.skills = vec!["alpha".into()];
        options.method = Some(InstallMethod::Symlink);
        let err = add(&host, &options).await.unwrap_err();
        assert_eq!(err.to_string(), "aborted");
        assert!(!host.cwd.join(".codex").exists());
    }

    #[tokio::test]
    async fn yes_without_detected_agents_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let (host, _) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));

        let err = add(&host, &yes_options(&src, &[])).await.unwrap_err();
        assert!(matches!(err, Error::AgentDetection(_)), "{err}");
    }

    #[tokio::test]
    async fn detected_agents_and_config_method_are_used() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_dir(tmp.path());
        let (mut host, _) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));
        std::fs::create_dir_all(host.cwd.join(".gemini")).unwrap();
        host.config.install.method = Some(InstallMethodPreference::Copy);

        let report = add(&host, &yes_options(&src, &[])).await.unwrap();
        assert!(report.placed.iter().all(|(agent, _)| *agent == Agent::Gemini));
        assert!(
            report
                .placed
                .iter()
                .all(|(_, o)| o.method == InstallMethod::Copy)
        );
    }

    #[tokio::test]
    async fn empty_source_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("empty");
        std::fs::create_dir_all(&src).unwrap();
        let (host, _) = test_host(tmp.path(), Arc::new(ScriptedPrompter::default()));

        let err = add(&host, &yes_options(&src, &["codex"])).await.unwrap_err();
        assert!(err.to_string().starts_with("no skills found"), "{err}");
    }
}
