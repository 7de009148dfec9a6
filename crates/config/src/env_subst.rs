//! `${VAR}` and `${VAR:-fallback}` substitution for raw config text.

/// Expand placeholders from the process environment.
///
/// Unset variables without a fallback are left verbatim so that a typo shows
/// up in the parsed value instead of silently becoming an empty string.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder as-is.
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &after[..end];
        let (name, fallback) = match inner.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (inner, None),
        };

        match (lookup(name), fallback) {
            (Some(value), _) if !name.is_empty() => out.push_str(&value),
            (None, Some(fallback)) if !name.is_empty() => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(inner);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
