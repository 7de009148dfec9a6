//! `check` and `update` against the lockfile.

use std::process::ExitCode;

use {
    clap::Args,
    skillet_skills::{CheckOptions, CheckStatus, Host, UpdateOptions, check, update},
};

use crate::scope;

#[derive(Args)]
pub struct CheckArgs {
    #[arg(short = 'g', long)]
    pub global: bool,
    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[arg(short = 'g', long)]
    pub global: bool,
    /// Updates never prompt; `-y` is accepted and ignored.
    #[arg(short = 'y', long, hide = true)]
    #[allow(dead_code)]
    pub yes: bool,
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

pub async fn handle_check(host: &Host, args: CheckArgs) -> anyhow::Result<ExitCode> {
    let results = check(host, &CheckOptions {
        scope: scope(args.global),
        json: args.json,
    })
    .await?;
    Ok(if results.iter().any(|r| r.status == CheckStatus::Error) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub async fn handle_update(host: &Host, args: UpdateArgs) -> anyhow::Result<ExitCode> {
    let report = update(host, &UpdateOptions {
        scope: scope(args.global),
        verbose: args.verbose,
    })
    .await?;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
