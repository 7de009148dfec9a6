//! Line-based prompts on stderr/stdin.

use std::io::{self, BufRead, Write};

use skillet_skills::{Agent, DiscoveredSkill, Error, InstallMethod, Prompter, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

fn ask(question: &str) -> Result<String> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{question}")?;
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(Error::message("no input; pass --yes to skip prompts"));
    }
    Ok(line.trim().to_string())
}

/// Parse a comma/space separated list of 1-based indices. Empty input
/// selects everything.
pub fn parse_selection(input: &str, len: usize) -> std::result::Result<Vec<usize>, String> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("all") {
        return Ok((0..len).collect());
    }
    let mut picked = Vec::new();
    for part in input.split(|c: char| c == ',' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        let n: usize = part
            .parse()
            .map_err(|_| format!("'{part}' is not a number"))?;
        if n == 0 || n > len {
            return Err(format!("{n} is out of range 1-{len}"));
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    Ok(picked)
}

fn select(header: &str, items: &[String]) -> Result<Vec<usize>> {
    eprintln!("{header}");
    for (i, item) in items.iter().enumerate() {
        eprintln!("  {}) {item}", i + 1);
    }
    loop {
        let answer = ask("Select (numbers, empty for all): ")?;
        match parse_selection(&answer, items.len()) {
            Ok(picked) => return Ok(picked),
            Err(e) => eprintln!("{e}"),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = ask(&format!("{message} [y/N] "))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn select_skills(&self, skills: &[DiscoveredSkill]) -> Result<Vec<String>> {
        let items: Vec<_> = skills
            .iter()
            .map(|s| format!("{} - {}", s.name(), s.descriptor.description))
            .collect();
        let picked = select("Skills:", &items)?;
        Ok(picked
            .into_iter()
            .map(|i| skills[i].name().to_string())
            .collect())
    }

    fn select_agents(&self, candidates: &[Agent]) -> Result<Vec<Agent>> {
        let items: Vec<_> = candidates.iter().map(ToString::to_string).collect();
        let picked = select("Agents:", &items)?;
        Ok(picked.into_iter().map(|i| candidates[i]).collect())
    }

    fn select_method(&self) -> Result<InstallMethod> {
        loop {
            let answer = ask("Install method [symlink/copy] (symlink): ")?;
            if answer.is_empty() {
                return Ok(InstallMethod::Symlink);
            }
            match answer.to_ascii_lowercase().parse() {
                Ok(method) => return Ok(method),
                Err(e) => eprintln!("{e}"),
            }
        }
    }
}
