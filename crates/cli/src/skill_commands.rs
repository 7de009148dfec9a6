//! `add`, `list`, `remove` and `lock`.

use std::process::ExitCode;

use {
    clap::Args,
    skillet_skills::{
        AddOptions, Host, InstallMethod, ListOptions, RemoveOptions, add, list, lockfile, remove,
    },
};

use crate::scope;

#[derive(Args)]
pub struct AddArgs {
    /// owner/repo, git URL, tree URL, archive URL, oci:// reference or local path.
    pub source: String,
    /// Agent to install for (repeatable).
    #[arg(short = 'a', long = "agent")]
    pub agents: Vec<String>,
    /// Skill to install (repeatable); all skills with --yes otherwise.
    #[arg(short = 's', long = "skill")]
    pub skills: Vec<String>,
    /// Install into the home directory instead of the project.
    #[arg(short = 'g', long)]
    pub global: bool,
    /// Skip prompts and confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
    /// Copy skill directories instead of symlinking them.
    #[arg(long)]
    pub copy: bool,
    /// Report skills that fail to parse.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(short = 'g', long)]
    pub global: bool,
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Installed skill names.
    #[arg(required = true)]
    pub names: Vec<String>,
    /// Only remove from these agents (repeatable).
    #[arg(short = 'a', long = "agent")]
    pub agents: Vec<String>,
    #[arg(short = 'g', long)]
    pub global: bool,
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct ScopeArgs {
    #[arg(short = 'g', long)]
    pub global: bool,
}

pub async fn handle_add(host: &Host, args: AddArgs) -> anyhow::Result<ExitCode> {
    let options = AddOptions {
        source: args.source,
        agents: args.agents,
        skills: args.skills,
        scope: scope(args.global),
        yes: args.yes,
        method: args.copy.then_some(InstallMethod::Copy),
        verbose: args.verbose,
    };
    let report = add(host, &options).await?;
    host.sink.emit(&format!(
        "lockfile: {}",
        report.lockfile_path.display()
    ));
    Ok(ExitCode::SUCCESS)
}

pub fn handle_list(host: &Host, args: ListArgs) -> anyhow::Result<ExitCode> {
    list(host, &ListOptions {
        scope: scope(args.global),
        verbose: args.verbose,
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn handle_remove(host: &Host, args: RemoveArgs) -> anyhow::Result<ExitCode> {
    remove(host, &RemoveOptions {
        names: args.names,
        agents: args.agents,
        scope: scope(args.global),
        yes: args.yes,
    })?;
    Ok(ExitCode::SUCCESS)
}

pub fn handle_lock(host: &Host, args: ScopeArgs) -> anyhow::Result<ExitCode> {
    let paths = host.scope_paths(scope(args.global))?;
    let generated = lockfile::regenerate(host.fs.as_ref(), &paths)?;
    host.sink.emit(&format!(
        "wrote {} ({} source(s))",
        generated.output_path.display(),
        generated.lockfile.sources.len()
    ));
    Ok(ExitCode::SUCCESS)
}
