//! `SKILL.md` parsing, validation and rendering.

use std::{collections::BTreeMap, path::Path};

use {
    serde_yaml::{Mapping, Value},
    skillet_common::FileSystem,
};

use crate::{
    error::{self, Context},
    types::{INTERNAL_METADATA_KEY, SKILL_FILE, SkillDescriptor},
};

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1024;
const MAX_COMPATIBILITY_LEN: usize = 500;

/// A malformed skill descriptor, optionally scoped to one frontmatter field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub field: Option<String>,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Whether `name` matches `^[a-z0-9]+(-[a-z0-9]+)*$` within 1-64 chars.
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.split('-').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// Parse `SKILL.md` text. When `expected_name` is given (the containing
/// directory's name) the declared name must match it.
pub fn parse_skill(text: &str, expected_name: Option<&str>) -> Result<SkillDescriptor, ParseError> {
    let (frontmatter, body) = split_frontmatter(text)?;

    let value: Value = serde_yaml::from_str(frontmatter)
        .map_err(|e| ParseError::new(format!("invalid frontmatter YAML: {e}")))?;
    let map = match value {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        _ => return Err(ParseError::new("frontmatter must be a mapping")),
    };

    let name = required_string(&map, "name")?;
    if !validate_name(&name) {
        return Err(ParseError::field(
            "name",
            format!(
                "invalid skill name '{name}': must be 1-{MAX_NAME_LEN} lowercase letters, \
                 digits and single hyphens"
            ),
        ));
    }
    if let Some(expected) = expected_name
        && expected != name
    {
        return Err(ParseError::field(
            "name",
            format!("skill name '{name}' does not match its directory '{expected}'"),
        ));
    }

    let description = required_string(&map, "description")?;
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ParseError::field(
            "description",
            format!("description must be at most {MAX_DESCRIPTION_LEN} characters"),
        ));
    }

    let license = optional_string(&map, "license")?;
    let compatibility = optional_string(&map, "compatibility")?;
    if compatibility
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COMPATIBILITY_LEN)
    {
        return Err(ParseError::field(
            "compatibility",
            format!("compatibility must be at most {MAX_COMPATIBILITY_LEN} characters"),
        ));
    }

    let allowed_tools = match (
        optional_string(&map, "allowed-tools")?,
        optional_string(&map, "allowedTools")?,
    ) {
        (Some(a), Some(b)) if a != b => {
            return Err(ParseError::field(
                "allowed-tools",
                "allowed-tools and allowedTools disagree",
            ));
        },
        (a, b) => a.or(b),
    };

    let (metadata, internal) = parse_metadata(map.get("metadata"))?;

    Ok(SkillDescriptor {
        name,
        description,
        license,
        compatibility,
        allowed_tools,
        metadata,
        internal,
        body: body.to_string(),
    })
}

/// Read and parse `<dir>/SKILL.md`.
pub fn parse_skill_dir(
    fs: &dyn FileSystem,
    dir: &Path,
    enforce_dir_name: bool,
) -> Result<SkillDescriptor, ParseError> {
    let text = fs
        .read_to_string(&dir.join(SKILL_FILE))
        .map_err(|e| ParseError::new(format!("cannot read {SKILL_FILE}: {e}")))?;
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    parse_skill(&text, dir_name.as_deref().filter(|_| enforce_dir_name))
}

/// Render a descriptor back to `SKILL.md` text.
pub fn render(skill: &SkillDescriptor) -> error::Result<String> {
    let mut map = Mapping::new();
    map.insert("name".into(), skill.name.clone().into());
    map.insert("description".into(), skill.description.clone().into());
    if let Some(ref license) = skill.license {
        map.insert("license".into(), license.clone().into());
    }
    if let Some(ref compatibility) = skill.compatibility {
        map.insert("compatibility".into(), compatibility.clone().into());
    }
    if let Some(ref tools) = skill.allowed_tools {
        map.insert("allowed-tools".into(), tools.clone().into());
    }
    if !skill.metadata.is_empty() || skill.internal.is_some() {
        let mut meta = Mapping::new();
        for (key, value) in &skill.metadata {
            meta.insert(key.clone().into(), value.clone().into());
        }
        if let Some(internal) = skill.internal {
            meta.insert(INTERNAL_METADATA_KEY.into(), internal.into());
        }
        map.insert("metadata".into(), Value::Mapping(meta));
    }

    let yaml = serde_yaml::to_string(&Value::Mapping(map))
        .with_context(|| format!("cannot encode frontmatter of {}", skill.name))?;
    Ok(format!("---\n{yaml}---\n\n{}", skill.body))
}

/// Split at the `---` delimiter lines: the first non-empty line must open
/// the block and a later line must close it.
fn split_frontmatter(text: &str) -> Result<(&str, &str), ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut offset = 0;
    let mut lines = text.split_inclusive('\n');
    let open = loop {
        let Some(line) = lines.next() else {
            return Err(ParseError::new("missing opening --- frontmatter delimiter"));
        };
        offset += line.len();
        if !line.trim().is_empty() {
            break line;
        }
    };
    if open.trim_end() != "---" {
        return Err(ParseError::new("missing opening --- frontmatter delimiter"));
    }

    let start = offset;
    for line in lines {
        if line.trim_end() == "---" {
            let frontmatter = &text[start..offset];
            let body = &text[offset + line.len()..];
            return Ok((frontmatter, body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    Err(ParseError::new("missing closing --- frontmatter delimiter"))
}

fn required_string(map: &Mapping, key: &str) -> Result<String, ParseError> {
    match optional_string(map, key)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ParseError::field(key, format!("missing required field '{key}'"))),
    }
}

fn optional_string(map: &Mapping, key: &str) -> Result<Option<String>, ParseError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseError::field(key, format!("'{key}' must be a string"))),
    }
}

fn parse_metadata(
    value: Option<&Value>,
) -> Result<(BTreeMap<String, String>, Option<bool>), ParseError> {
    let map = match value {
        None | Some(Value::Null) => return Ok((BTreeMap::new(), None)),
        Some(Value::Mapping(map)) => map,
        Some(_) => return Err(ParseError::field("metadata", "metadata must be a mapping")),
    };

    let mut out = BTreeMap::new();
    let mut internal = None;
    for (key, value) in map {
        let Value::String(key) = key else {
            return Err(ParseError::field("metadata", "metadata keys must be strings"));
        };
        let field = format!("metadata.{key}");
        if key == INTERNAL_METADATA_KEY {
            match value {
                Value::Bool(flag) => internal = Some(*flag),
                _ => return Err(ParseError::field(field, "metadata.internal must be a boolean")),
            }
            continue;
        }
        match value {
            Value::String(s) => {
                out.insert(key.clone(), s.clone());
            },
            _ => {
                return Err(ParseError::field(
                    field,
                    format!("metadata value '{key}' must be a string"),
                ));
            },
        }
    }
    Ok((out, internal))
}
