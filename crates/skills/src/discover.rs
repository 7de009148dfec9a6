//! Skill discovery over standard project locations, agent skills
//! directories and, as a last resort, a recursive scan.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use {
    skillet_common::{EntryKind, FileSystem},
    tracing::{debug, warn},
};

use crate::{
    agents::Agent,
    parse::parse_skill_dir,
    types::{DiscoveredSkill, SKILL_FILE},
};

/// Project-relative locations scanned first, in precedence order.
pub const STANDARD_LOCATIONS: &[&str] = &[
    ".",
    "skills",
    "skills/.curated",
    "skills/.experimental",
    "skills/.system",
];

/// Directories the recursive fallback never enters.
const NOISE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    ".worktrees",
    "vendor",
    ".venv",
    "__pycache__",
];

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    pub cwd: PathBuf,
    /// Home agent directories are scanned when set.
    pub home_dir: Option<PathBuf>,
    /// Record parse failures as warnings.
    pub verbose: bool,
}

/// A skill directory that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryWarning {
    pub path: PathBuf,
    pub message: String,
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Sorted by `(name, path)`.
    pub skills: Vec<DiscoveredSkill>,
    pub warnings: Vec<DiscoveryWarning>,
    /// The recursive fallback scan ran.
    pub used_fallback: bool,
}

/// A directory holding a `SKILL.md`, with whether its name must match the
/// declared skill name.
#[derive(Debug, Clone)]
struct Candidate {
    dir: PathBuf,
    enforce_name: bool,
}

/// Discover skills under `options.cwd` (and the home agent directories).
pub fn discover(fs: &dyn FileSystem, options: &DiscoverOptions) -> DiscoveryResult {
    let mut candidates = Vec::new();

    for location in STANDARD_LOCATIONS {
        let base = if *location == "." {
            options.cwd.clone()
        } else {
            options.cwd.join(location)
        };
        if has_skill_file(fs, &base) {
            candidates.push(Candidate {
                dir: base.clone(),
                enforce_name: *location != ".",
            });
        }
        collect_children(fs, &base, &mut candidates);
    }

    let mut roots = vec![options.cwd.as_path()];
    if let Some(ref home) = options.home_dir {
        roots.push(home.as_path());
    }
    for root in roots {
        for agent in Agent::ALL {
            collect_children(fs, &agent.skills_dir(root), &mut candidates);
        }
    }

    let used_fallback = candidates.is_empty();
    if used_fallback {
        debug!(
            cwd = %options.cwd.display(),
            "no skills in standard locations, scanning recursively"
        );
        collect_recursive(fs, &options.cwd, true, &mut candidates);
    }

    let mut result = build_result(fs, candidates, options.verbose);
    result.used_fallback = used_fallback;
    result
}

/// Scan the immediate children of each directory in `dirs`.
pub fn discover_in_dirs(fs: &dyn FileSystem, dirs: &[PathBuf], verbose: bool) -> DiscoveryResult {
    let mut candidates = Vec::new();
    for dir in dirs {
        collect_children(fs, dir, &mut candidates);
    }
    build_result(fs, candidates, verbose)
}

fn has_skill_file(fs: &dyn FileSystem, dir: &Path) -> bool {
    matches!(
        fs.entry_kind(&dir.join(SKILL_FILE)),
        Ok(Some(EntryKind::File | EntryKind::Symlink))
    )
}

fn collect_children(fs: &dyn FileSystem, base: &Path, out: &mut Vec<Candidate>) {
    if !fs.is_dir(base) {
        return;
    }
    let children = match fs.read_dir(base) {
        Ok(children) => children,
        Err(e) => {
            warn!(path = %base.display(), error = %e, "cannot read skills directory");
            return;
        },
    };
    for child in children {
        if fs.is_dir(&child) && has_skill_file(fs, &child) {
            out.push(Candidate {
                dir: child,
                enforce_name: true,
            });
        }
    }
}

fn collect_recursive(fs: &dyn FileSystem, dir: &Path, is_root: bool, out: &mut Vec<Candidate>) {
    if has_skill_file(fs, dir) {
        out.push(Candidate {
            dir: dir.to_path_buf(),
            enforce_name: !is_root,
        });
    }
    let Ok(children) = fs.read_dir(dir) else {
        return;
    };
    for child in children {
        let skip = child
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| NOISE_DIRS.contains(&n));
        // Real directories only; symlinks could loop.
        if !skip && matches!(fs.entry_kind(&child), Ok(Some(EntryKind::Dir))) {
            collect_recursive(fs, &child, false, out);
        }
    }
}

fn build_result(fs: &dyn FileSystem, candidates: Vec<Candidate>, verbose: bool) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();
    let mut seen_paths = HashSet::new();
    let mut seen_names = HashSet::new();

    for candidate in candidates {
        let canonical = fs
            .canonicalize(&candidate.dir)
            .unwrap_or_else(|_| candidate.dir.clone());
        if seen_paths.contains(&canonical) {
            continue;
        }

        match parse_skill_dir(fs, &candidate.dir, candidate.enforce_name) {
            Ok(descriptor) => {
                seen_paths.insert(canonical);
                if !seen_names.insert(descriptor.name.clone()) {
                    debug!(
                        name = %descriptor.name,
                        path = %candidate.dir.display(),
                        "duplicate skill name, keeping the first"
                    );
                    continue;
                }
                result.skills.push(DiscoveredSkill {
                    descriptor,
                    path: candidate.dir,
                });
            },
            Err(e) => {
                seen_paths.insert(canonical);
                debug!(path = %candidate.dir.display(), error = %e, "skipping invalid skill");
                if verbose {
                    result.warnings.push(DiscoveryWarning {
                        path: candidate.dir,
                        message: e.message,
                        field: e.field,
                    });
                }
            },
        }
    }

    result
        .skills
        .sort_by(|a, b| (a.name(), &a.path).cmp(&(b.name(), &b.path)));
    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, skillet_common::OsFileSystem};

    fn write_skill(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(SKILL_FILE),
            format!("---\nname: {name}\ndescription: the {name} skill\n---\nbody\n"),
        )
        .unwrap();
    }

    fn options(cwd: &Path) -> DiscoverOptions {
        DiscoverOptions {
            cwd: cwd.to_path_buf(),
            home_dir: None,
            verbose: true,
        }
    }

    fn names(result: &DiscoveryResult) -> Vec<&str> {
        result.skills.iter().map(DiscoveredSkill::name).collect()
    }

    #[test]
    fn standard_locations_are_scanned_and_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("skills/zeta"), "zeta");
        write_skill(&tmp.path().join("skills/.curated/alpha"), "alpha");
        write_skill(&tmp.path().join("skills/.system/mid"), "mid");
        write_skill(&tmp.path().join("deep/nested/ignored"), "ignored");

        let result = discover(&OsFileSystem, &options(tmp.path()));
        assert_eq!(names(&result), vec!["alpha", "mid", "zeta"]);
        assert!(!result.used_fallback);
    }

    #[test]
    fn root_skill_skips_directory_name_check() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("checkout-1234");
        write_skill(&root, "alpha");

        let result = discover(&OsFileSystem, &options(&root));
        assert_eq!(names(&result), vec!["alpha"]);
        assert_eq!(result.skills[0].path, root);
    }

    #[test]
    fn agent_directories_under_cwd_and_home() {
        let tmp = tempfile::tempdir().unwrap();
        let cwd = tmp.path().join("project");
        let home = tmp.path().join("home");
        write_skill(&cwd.join(".codex/skills/local"), "local");
        write_skill(&home.join(".claude/skills/global"), "global");

        let mut opts = options(&cwd);
        opts.home_dir = Some(home);
        let result = discover(&OsFileSystem, &opts);
        assert_eq!(names(&result), vec!["global", "local"]);
    }

    #[test]
    fn fallback_runs_only_without_candidates_and_skips_noise() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("packages/tools/alpha"), "alpha");
        write_skill(&tmp.path().join("node_modules/pkg/beta"), "beta");
        write_skill(&tmp.path().join(".git/hooks/gamma"), "gamma");

        let result = discover(&OsFileSystem, &options(tmp.path()));
        assert!(result.used_fallback);
        assert_eq!(names(&result), vec!["alpha"]);
    }

    #[test]
    fn invalid_candidate_still_blocks_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("skills/broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(SKILL_FILE), "no frontmatter").unwrap();
        write_skill(&tmp.path().join("elsewhere/alpha"), "alpha");

        let result = discover(&OsFileSystem, &options(tmp.path()));
        assert!(!result.used_fallback);
        assert!(result.skills.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, broken);
    }

    #[test]
    fn warnings_only_when_verbose_and_carry_field() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("skills/alpha"), "beta");

        let mut opts = options(tmp.path());
        let verbose = discover(&OsFileSystem, &opts);
        assert_eq!(verbose.warnings.len(), 1);
        assert_eq!(verbose.warnings[0].field.as_deref(), Some("name"));

        opts.verbose = false;
        let quiet = discover(&OsFileSystem, &opts);
        assert!(quiet.warnings.is_empty());
        assert!(quiet.skills.is_empty());
    }

    #[test]
    fn duplicate_names_keep_first_in_precedence_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(&tmp.path().join("skills/alpha"), "alpha");
        write_skill(&tmp.path().join(".claude/skills/alpha"), "alpha");

        let result = discover(&OsFileSystem, &options(tmp.path()));
        assert_eq!(result.skills.len(), 1);
        assert_eq!(result.skills[0].path, tmp.path().join("skills/alpha"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_duplicate_collapses() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("skills/alpha");
        write_skill(&real, "alpha");
        std::fs::create_dir_all(tmp.path().join(".codex/skills")).unwrap();
        std::os::unix::fs::symlink(&real, tmp.path().join(".codex/skills/alpha")).unwrap();

        let result = discover(&OsFileSystem, &options(tmp.path()));
        assert_eq!(result.skills.len(), 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn discover_in_dirs_scans_children() {
        let tmp = tempfile::tempdir().unwrap();
        let codex = tmp.path().join(".codex/skills");
        write_skill(&codex.join("alpha"), "alpha");
        write_skill(&codex.join("beta"), "beta");

        let result = discover_in_dirs(
            &OsFileSystem,
            &[codex, tmp.path().join("missing")],
            false,
        );
        assert_eq!(names(&result), vec!["alpha", "beta"]);
    }
}
