//! Supported agents and their skills directories.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Agent {
    Claude,
    Codex,
    Cursor,
    Gemini,
    Opencode,
}

impl Agent {
    pub const ALL: [Self; 5] = [
        Self::Claude,
        Self::Codex,
        Self::Cursor,
        Self::Gemini,
        Self::Opencode,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Cursor => "cursor",
            Self::Gemini => "gemini",
            Self::Opencode => "opencode",
        }
    }

    pub fn ids() -> Vec<&'static str> {
        Self::ALL.iter().map(|a| a.id()).collect()
    }

    /// `<root>/.<agent>`
    pub fn home(self, root: &Path) -> PathBuf {
        root.join(format!(".{}", self.id()))
    }

    /// `<root>/.<agent>/skills`
    pub fn skills_dir(self, root: &Path) -> PathBuf {
        self.home(root).join("skills")
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Agent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.id() == wanted)
            .ok_or_else(|| {
                Error::AgentDetection(format!(
                    "unknown agent '{s}' (expected one of: {})",
                    Self::ids().join(", ")
                ))
            })
    }
}

/// Parse a list of agent ids, keeping order and dropping duplicates.
pub fn parse_agents<S: AsRef<str>>(ids: &[S]) -> Result<Vec<Agent>, Error> {
    let mut out = Vec::new();
    for id in ids {
        let agent: Agent = id.as_ref().parse()?;
        if !out.contains(&agent) {
            out.push(agent);
        }
    }
    Ok(out)
}

/// Agents whose `<root>/.<agent>` directory exists.
pub fn detect(root: &Path) -> Vec<Agent> {
    Agent::ALL
        .into_iter()
        .filter(|agent| agent.home(root).is_dir())
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_and_unknown_is_rejected() {
        for agent in Agent::ALL {
            assert_eq!(agent.id().parse::<Agent>().unwrap(), agent);
        }
        assert_eq!(" Codex ".parse::<Agent>().unwrap(), Agent::Codex);
        let err = "vim".parse::<Agent>().unwrap_err();
        assert!(matches!(err, Error::AgentDetection(_)));
    }

    #[test]
    fn parse_agents_dedups() {
        let agents = parse_agents(&["codex", "claude", "codex"]).unwrap();
        assert_eq!(agents, vec![Agent::Codex, Agent::Claude]);
    }

    #[test]
    fn detects_by_agent_home_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".cursor")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".gemini/skills")).unwrap();
        std::fs::write(tmp.path().join(".codex"), "not a dir").unwrap();
        assert_eq!(detect(tmp.path()), vec![Agent::Cursor, Agent::Gemini]);
        assert_eq!(
            Agent::Claude.skills_dir(Path::new("/p")),
            PathBuf::from("/p/.claude/skills")
        );
    }
}
