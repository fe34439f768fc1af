/// Compiled URL patterns: matching and formatting
///
/// A [`UrlMatcher`] is compiled from a state's URL fragment and its param
/// declarations. Child fragments are appended to the parent matcher so each
/// state ends up with the full URL of its branch.
use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use super::normalize::normalize_path;
use super::pattern::{calculate_priority, parse_pattern, ParsedPattern, PatternSegmentType};
use crate::config::UrlConfig;
use crate::error::RouterError;
use crate::params::{Param, ParamDeclaration, ParamLocation, ParamTypes, RawParams, SquashPolicy};

/// Query string values keyed by name
pub type SearchParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlSegment {
    Static(String),
    Param(String),
    CatchAll(String),
}

/// A compiled URL pattern
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use rhtmx_state_router::{ParamTypes, UrlConfig, UrlMatcher};
/// use serde_json::json;
///
/// let types = ParamTypes::default();
/// let config = UrlConfig::default();
/// let matcher = UrlMatcher::compile("/users/{id:int}?tab", &BTreeMap::new(), &types, &config).unwrap();
///
/// let params = matcher.exec("/users/42", &BTreeMap::new()).unwrap();
/// assert_eq!(params["id"], json!(42));
///
/// let mut values = BTreeMap::new();
/// values.insert("id".to_string(), json!(7));
/// values.insert("tab".to_string(), json!("notes"));
/// assert_eq!(matcher.format(&values).as_deref(), Some("/users/7?tab=notes"));
/// ```
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: ParsedPattern,
    segments: Vec<UrlSegment>,
    search: Vec<String>,
    params: Vec<Param>,
    config: UrlConfig,
}

impl UrlMatcher {
    /// Compiles a fragment; `declarations` configure params named in it
    pub fn compile(
        fragment: &str,
        declarations: &BTreeMap<String, ParamDeclaration>,
        types: &ParamTypes,
        config: &UrlConfig,
    ) -> Result<Self, RouterError> {
        let pattern = parse_pattern(fragment)?;
        let duplicate = |id: &str| RouterError::InvalidUrl {
            pattern: fragment.to_string(),
            reason: format!("duplicate parameter '{id}'"),
        };

        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(pattern.segments.len());
        let mut params = Vec::new();

        for segment in &pattern.segments {
            let (id, inline_type) = match segment {
                PatternSegmentType::Static(text) => {
                    segments.push(UrlSegment::Static(text.clone()));
                    continue;
                }
                PatternSegmentType::Param(id, inline) => {
                    segments.push(UrlSegment::Param(id.clone()));
                    (id, inline.as_deref())
                }
                PatternSegmentType::CatchAll(id) => {
                    segments.push(UrlSegment::CatchAll(id.clone()));
                    (id, Some("path"))
                }
            };
            if !seen.insert(id.clone()) {
                return Err(duplicate(id));
            }
            let inline_type = inline_type.map(|name| types.require(name)).transpose()?;
            let declaration = declarations.get(id).cloned().unwrap_or_default();
            params.push(Param::new(id.clone(), ParamLocation::Path, &declaration, inline_type, types)?);
        }

        let mut search = Vec::with_capacity(pattern.search.len());
        for (id, inline) in &pattern.search {
            if !seen.insert(id.clone()) {
                return Err(duplicate(id));
            }
            let inline_type = inline.as_deref().map(|name| types.require(name)).transpose()?;
            let declaration = declarations.get(id).cloned().unwrap_or_default();
            params.push(Param::new(id.clone(), ParamLocation::Search, &declaration, inline_type, types)?);
            search.push(id.clone());
        }

        Ok(Self {
            pattern,
            segments,
            search,
            params,
            config: config.clone(),
        })
    }

    /// Concatenates a child matcher onto this one
    pub fn append(&self, child: &UrlMatcher) -> Result<UrlMatcher, RouterError> {
        let ids: HashSet<&str> = self.params.iter().map(Param::id).collect();
        if let Some(clash) = child.params.iter().find(|p| ids.contains(p.id())) {
            return Err(RouterError::InvalidUrl {
                pattern: child.pattern(),
                reason: format!("parameter '{}' is already declared by the parent url", clash.id()),
            });
        }

        let mut pattern = self.pattern.clone();
        pattern.segments.extend(child.pattern.segments.iter().cloned());
        pattern.search.extend(child.pattern.search.iter().cloned());
        pattern.trailing_slash = if child.pattern.segments.is_empty() {
            self.pattern.trailing_slash || child.pattern.trailing_slash
        } else {
            child.pattern.trailing_slash
        };
        if self.has_catch_all() && !child.pattern.segments.is_empty() {
            return Err(RouterError::InvalidUrl {
                pattern: pattern.render(),
                reason: "catch-all must be the last path segment".to_string(),
            });
        }

        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        let mut search = self.search.clone();
        search.extend(child.search.iter().cloned());
        let mut params = self.params.clone();
        params.extend(child.params.iter().cloned());

        Ok(UrlMatcher {
            pattern,
            segments,
            search,
            params,
            config: self.config.clone(),
        })
    }

    /// Canonical text of the full pattern
    pub fn pattern(&self) -> String {
        self.pattern.render()
    }

    /// Params declared by this URL (path params first, then search params)
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, id: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.id() == id)
    }

    pub fn has_catch_all(&self) -> bool {
        self.pattern.has_catch_all()
    }

    /// Lower values are tried first by the URL router
    pub fn priority(&self) -> usize {
        calculate_priority(
            self.pattern.has_catch_all(),
            self.pattern.dynamic_count(),
            self.segments.len(),
        )
    }

    /// Matches a location path and query against this pattern
    ///
    /// Returns the decoded param values (search params only when present),
    /// or `None` when the path does not match or a value fails its type.
    pub fn exec(&self, path: &str, search: &SearchParams) -> Option<RawParams> {
        if self.config.strict_mode {
            let has_trailing = path.len() > 1 && path.ends_with('/');
            if has_trailing != self.pattern.trailing_slash {
                return None;
            }
        }

        let normalized = normalize_path(path);
        let path_segments: Vec<String> = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_component)
            .collect();

        let captures = self.match_segments(&path_segments, 0, 0, BTreeMap::new())?;

        let mut values = RawParams::new();
        for param in self.params.iter().filter(|p| p.location() == ParamLocation::Path) {
            match captures.get(param.id()) {
                Some(Capture::Text(text)) => {
                    if !param.param_type().matches_encoded(text) {
                        return None;
                    }
                    let value = param.param_type().decode(text)?;
                    values.insert(param.id().to_string(), value);
                }
                Some(Capture::Default) | None => {
                    if let Some(default) = param.value(None) {
                        values.insert(param.id().to_string(), default);
                    }
                }
            }
        }

        for id in &self.search {
            let (Some(text), Some(param)) = (search.get(id), self.param(id)) else {
                continue;
            };
            let value = param
                .param_type()
                .decode(text)
                .unwrap_or_else(|| Value::String(text.clone()));
            values.insert(id.clone(), value);
        }

        Some(values)
    }

    /// Walks pattern and path segments together; squashable params may be
    /// skipped when the rest of the path still matches
    fn match_segments(
        &self,
        path_segments: &[String],
        pattern_idx: usize,
        path_idx: usize,
        captures: BTreeMap<String, Capture>,
    ) -> Option<BTreeMap<String, Capture>> {
        if pattern_idx >= self.segments.len() {
            return (path_idx == path_segments.len()).then_some(captures);
        }

        match &self.segments[pattern_idx] {
            UrlSegment::CatchAll(id) => {
                let mut captures = captures;
                captures.insert(id.clone(), Capture::Text(path_segments[path_idx..].join("/")));
                Some(captures)
            }
            UrlSegment::Param(id) => {
                let param = self.param(id)?;
                let squash = if param.default_value().is_some() {
                    param.squash()
                } else {
                    &SquashPolicy::Disabled
                };

                if let (SquashPolicy::Value(marker), Some(text)) = (squash, path_segments.get(path_idx)) {
                    if text == marker {
                        let mut captures = captures;
                        captures.insert(id.clone(), Capture::Default);
                        return self.match_segments(path_segments, pattern_idx + 1, path_idx + 1, captures);
                    }
                }

                if let Some(text) = path_segments.get(path_idx) {
                    let mut consumed = captures.clone();
                    consumed.insert(id.clone(), Capture::Text(text.clone()));
                    if let Some(found) =
                        self.match_segments(path_segments, pattern_idx + 1, path_idx + 1, consumed)
                    {
                        return Some(found);
                    }
                }

                if *squash == SquashPolicy::Slash {
                    let mut captures = captures;
                    captures.insert(id.clone(), Capture::Default);
                    return self.match_segments(path_segments, pattern_idx + 1, path_idx, captures);
                }
                None
            }
            UrlSegment::Static(text) => {
                let candidate = path_segments.get(path_idx)?;
                let matches = if self.config.case_insensitive {
                    text.eq_ignore_ascii_case(candidate)
                } else {
                    text == candidate
                };
                if !matches {
                    return None;
                }
                self.match_segments(path_segments, pattern_idx + 1, path_idx + 1, captures)
            }
        }
    }

    /// Builds `path[?query]` from param values
    ///
    /// Returns `None` when a required path param is missing or invalid.
    /// Default-valued path params follow their squash policy; search params
    /// are omitted when absent or equal to their default.
    pub fn format(&self, values: &RawParams) -> Option<String> {
        let mut path = String::new();

        for segment in &self.segments {
            match segment {
                UrlSegment::Static(text) => {
                    path.push('/');
                    path.push_str(text);
                }
                UrlSegment::Param(id) | UrlSegment::CatchAll(id) => {
                    let param = self.param(id)?;
                    let raw = values.get(id);
                    if !param.validates(raw) {
                        return None;
                    }
                    let value = param.value(raw);
                    let is_default = param.default_value().is_some() && param.is_default_value(value.as_ref());

                    match (is_default, param.squash()) {
                        (true, SquashPolicy::Slash) => continue,
                        (true, SquashPolicy::Value(marker)) => {
                            path.push('/');
                            path.push_str(marker);
                        }
                        _ => {
                            let value = value?;
                            path.push('/');
                            path.push_str(&encode_component(&param.encode(&value), param.param_type().is_raw()));
                        }
                    }
                }
            }
        }

        if path.is_empty() || self.pattern.trailing_slash {
            path.push('/');
        }

        let query: Vec<String> = self
            .search
            .iter()
            .filter_map(|id| {
                let param = self.param(id)?;
                let value = values.get(id).filter(|v| !v.is_null())?;
                if param.is_default_value(Some(value)) {
                    return None;
                }
                Some(format!(
                    "{}={}",
                    urlencoding::encode(id),
                    urlencoding::encode(&param.encode(value))
                ))
            })
            .collect();

        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        Some(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Capture {
    Text(String),
    Default,
}

fn decode_component(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn encode_component(text: &str, raw: bool) -> String {
    if raw {
        text.split('/')
            .map(|part| urlencoding::encode(part).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    } else {
        urlencoding::encode(text).into_owned()
    }
}
