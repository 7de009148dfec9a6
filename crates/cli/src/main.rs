mod lock_commands;
mod prompt;
mod skill_commands;

use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    skillet_config::{Severity, SkilletConfig},
    skillet_skills::{Agent, Host, NonInteractive, Prompter, Scope},
    tracing::{debug, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skillet", version, about = "Install and track agent skills")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of skillet.{toml,yaml,yml,json}).
    #[arg(long, global = true, env = "SKILLET_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install skills from a git repository, archive URL, OCI artifact or directory.
    Add(skill_commands::AddArgs),
    /// List installed skills.
    List(skill_commands::ListArgs),
    /// Remove installed skills from agent directories.
    Remove(skill_commands::RemoveArgs),
    /// Regenerate skillet.lock.yaml from installed skills.
    Lock(skill_commands::ScopeArgs),
    /// Compare locked sources with upstream.
    Check(lock_commands::CheckArgs),
    /// Reinstall skills whose upstream has moved.
    Update(lock_commands::UpdateArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Explicit `--config` must load; discovered config falls back to defaults.
fn load_config(explicit: Option<&PathBuf>, cwd: &Path) -> anyhow::Result<SkilletConfig> {
    let config = match explicit {
        Some(path) => skillet_config::load_config(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => skillet_config::discover_and_load(cwd),
    };

    let diagnostics = skillet_config::validate(&config, &Agent::ids());
    let mut errors = Vec::new();
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Error => errors.push(diagnostic.to_string()),
            Severity::Warning => warn!(path = %diagnostic.path, "{}", diagnostic.message),
        }
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }
    Ok(config)
}

fn build_host(cli: &Cli) -> anyhow::Result<Host> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let home_dir = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
    let config = load_config(cli.config.as_ref(), &cwd)?;

    let prompter: Arc<dyn Prompter> = if std::io::stdin().is_terminal() {
        Arc::new(prompt::TerminalPrompter)
    } else {
        Arc::new(NonInteractive)
    };
    debug!(cwd = %cwd.display(), "host ready");
    Ok(Host::system(config, cwd, home_dir, prompter))
}

pub(crate) fn scope(global: bool) -> Scope {
    if global {
        Scope::Global
    } else {
        Scope::Project
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let host = build_host(&cli)?;
    match cli.command {
        Commands::Add(args) => skill_commands::handle_add(&host, args).await,
        Commands::List(args) => skill_commands::handle_list(&host, args),
        Commands::Remove(args) => skill_commands::handle_remove(&host, args),
        Commands::Lock(args) => skill_commands::handle_lock(&host, args),
        Commands::Check(args) => lock_commands::handle_check(&host, args).await,
        Commands::Update(args) => lock_commands::handle_update(&host, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_telemetry(&cli);
    debug!(version = env!("CARGO_PKG_VERSION"), "skillet starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        },
    }
}
