/// State lookup by absolute or relative identifier
///
/// Relative identifiers start with `.` or `^`:
///
/// - `.child` → `base.child`
/// - `^` → parent of base, `^.^` → grandparent
/// - `^.sibling` → `parent.sibling`
///
/// When no state has the exact name, a registered future state
/// (`prefix.**`) covering the name is returned instead.
use std::collections::BTreeMap;

use super::hierarchy::NameHierarchy;
use super::object::State;
use crate::error::RouterError;
use crate::glob::Glob;

pub fn is_relative(identifier: &str) -> bool {
    identifier.starts_with('.') || identifier.starts_with('^')
}

/// Turns a relative identifier into an absolute name
pub fn resolve_path(identifier: &str, base: Option<&State>) -> Result<String, RouterError> {
    let base = base.ok_or_else(|| RouterError::MissingBase(identifier.to_string()))?;
    let segments: Vec<&str> = identifier.split('.').collect();

    let mut current = base.clone();
    let mut consumed = 0;
    for (index, segment) in segments.iter().enumerate() {
        match *segment {
            "" if index == 0 => current = base.clone(),
            "^" => {
                current = current
                    .parent()
                    .cloned()
                    .ok_or_else(|| RouterError::InvalidRelativePath {
                        path: identifier.to_string(),
                        base: base.name().to_string(),
                    })?;
            }
            _ => break,
        }
        consumed = index + 1;
    }

    let relative = segments[consumed..].join(".");
    Ok(match (current.name(), relative.as_str()) {
        (name, "") => name.to_string(),
        ("", relative) => relative.to_string(),
        (name, relative) => format!("{name}.{relative}"),
    })
}

/// Finds a registered state
///
/// `Ok(None)` for unknown absolute names; relative identifiers without a
/// base (or climbing above the root) are errors.
pub fn find(
    states: &BTreeMap<String, State>,
    identifier: &str,
    base: Option<&State>,
) -> Result<Option<State>, RouterError> {
    let name = if is_relative(identifier) {
        resolve_path(identifier, base)?
    } else {
        identifier.to_string()
    };

    if let Some(state) = states.get(&name) {
        return Ok(Some(state.clone()));
    }

    Ok(NameHierarchy::new(&name)
        .filter(|prefix| !prefix.is_empty())
        .find_map(|prefix| states.get(&format!("{prefix}.**")))
        .filter(|future| Glob::new(future.name()).matches(&name))
        .cloned())
}
