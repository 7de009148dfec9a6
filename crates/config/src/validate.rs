//! Semantic checks on a loaded [`SkilletConfig`].

use std::fmt;

use crate::schema::SkilletConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "archive.max_entries"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.path, self.message)
    }
}

/// Validate `config`; `known_agents` lists the agent ids the caller supports.
pub fn validate(config: &SkilletConfig, known_agents: &[&str]) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut error = |path: &str, message: String| {
        out.push(Diagnostic {
            severity: Severity::Error,
            path: path.to_string(),
            message,
        });
    };

    if config.archive.max_download_bytes == 0 {
        error("archive.max_download_bytes", "must be greater than 0".into());
    }
    if config.archive.max_entries == 0 {
        error("archive.max_entries", "must be greater than 0".into());
    }
    if config.archive.max_extracted_bytes == 0 {
        error("archive.max_extracted_bytes", "must be greater than 0".into());
    }
    for agent in &config.install.agents {
        if !known_agents.contains(&agent.as_str()) {
            error(
                "install.agents",
                format!(
                    "unknown agent '{agent}' (expected one of: {})",
                    known_agents.join(", ")
                ),
            );
        }
    }

    if config.oci.force_http {
        out.push(Diagnostic {
            severity: Severity::Warning,
            path: "oci.force_http".into(),
            message: "all registries will be contacted over plain HTTP".into(),
        });
    }

    out
}
