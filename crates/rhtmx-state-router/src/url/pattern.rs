/// Pattern parsing for state URL fragments
///
/// Parses fragments like `/users/{id:int}/files/*path?sort&page` into typed
/// segments. All functions are **pure**: same input → same output.

use crate::error::RouterError;

/// One path segment of a URL fragment
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::url::pattern::{classify_segment, PatternSegmentType};
///
/// assert!(matches!(classify_segment("users"), PatternSegmentType::Static(_)));
/// assert!(matches!(classify_segment(":id"), PatternSegmentType::Param(_, None)));
/// assert!(matches!(classify_segment("{id:int}"), PatternSegmentType::Param(_, Some(_))));
/// assert!(matches!(classify_segment("*path"), PatternSegmentType::CatchAll(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegmentType {
    /// Catch-all segment: `*path` (always typed `path`)
    CatchAll(String),
    /// Parameter: `:id`, `{id}` or `{id:type}`
    Param(String, Option<String>),
    /// Static text segment
    Static(String),
}

/// Classifies a segment into a pattern type
///
/// # Parsing Rules (evaluated in order)
///
/// 1. **Catch-all**: `*name`
/// 2. **Braced param**: `{name}` or `{name:type}`
/// 3. **Colon param**: `:name`
/// 4. **Static**: any other text
pub fn classify_segment(segment: &str) -> PatternSegmentType {
    if let Some(name) = segment.strip_prefix('*') {
        return PatternSegmentType::CatchAll(name.to_string());
    }

    match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => {
            let (name, type_name) = parse_param_with_type(inner);
            PatternSegmentType::Param(name, type_name)
        }
        None => match segment.strip_prefix(':') {
            Some(name) => PatternSegmentType::Param(name.to_string(), None),
            None => PatternSegmentType::Static(segment.to_string()),
        },
    }
}

/// Splits `name:type` into `(name, Some(type))`
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::url::pattern::parse_param_with_type;
///
/// assert_eq!(parse_param_with_type("id"), ("id".to_string(), None));
/// assert_eq!(parse_param_with_type("id:int"), ("id".to_string(), Some("int".to_string())));
/// ```
pub fn parse_param_with_type(param: &str) -> (String, Option<String>) {
    param
        .split_once(':')
        .map(|(name, type_name)| (name.trim().to_string(), Some(type_name.trim().to_string())))
        .unwrap_or_else(|| (param.trim().to_string(), None))
}

/// A parsed fragment: path segments, search param names and trailing slash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPattern {
    pub segments: Vec<PatternSegmentType>,
    pub search: Vec<(String, Option<String>)>,
    pub trailing_slash: bool,
}

impl ParsedPattern {
    pub fn dynamic_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, PatternSegmentType::Static(_)))
            .count()
    }

    pub fn has_catch_all(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, PatternSegmentType::CatchAll(_)))
    }

    /// Renders the pattern back into its canonical text form
    pub fn render(&self) -> String {
        let mut text: String = self
            .segments
            .iter()
            .map(|segment| match segment {
                PatternSegmentType::Static(s) => format!("/{s}"),
                PatternSegmentType::Param(name, None) => format!("/:{name}"),
                PatternSegmentType::Param(name, Some(t)) => format!("/{{{name}:{t}}}"),
                PatternSegmentType::CatchAll(name) => format!("/*{name}"),
            })
            .collect();

        if text.is_empty() || self.trailing_slash {
            text.push('/');
        }
        if !self.search.is_empty() {
            let names: Vec<&str> = self.search.iter().map(|(n, _)| n.as_str()).collect();
            text.push('?');
            text.push_str(&names.join("&"));
        }
        text
    }
}

/// Fold accumulator for [`parse_pattern`]
#[derive(Default)]
struct ParseState {
    parsed: ParsedPattern,
    error: Option<String>,
}

impl ParseState {
    fn with_segment(mut self, segment: PatternSegmentType) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.parsed.has_catch_all() {
            self.error = Some("catch-all must be the last path segment".to_string());
            return self;
        }
        let empty_name = match &segment {
            PatternSegmentType::Param(name, _) | PatternSegmentType::CatchAll(name) => name.is_empty(),
            PatternSegmentType::Static(_) => false,
        };
        if empty_name {
            self.error = Some("parameter without a name".to_string());
            return self;
        }
        self.parsed.segments.push(segment);
        self
    }

    fn finalize(self) -> Result<ParsedPattern, String> {
        match self.error {
            Some(reason) => Err(reason),
            None => Ok(self.parsed),
        }
    }
}

/// Parses a state URL fragment
///
/// A leading `^` (absolute marker) must be stripped by the caller.
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::url::pattern::parse_pattern;
///
/// let parsed = parse_pattern("/users/:id?tab&page").unwrap();
/// assert_eq!(parsed.segments.len(), 2);
/// assert_eq!(parsed.search.len(), 2);
/// assert_eq!(parsed.render(), "/users/:id?tab&page");
/// ```
pub fn parse_pattern(fragment: &str) -> Result<ParsedPattern, RouterError> {
    let (path, query) = fragment.split_once('?').unwrap_or((fragment, ""));
    let invalid = |reason: String| RouterError::InvalidUrl {
        pattern: fragment.to_string(),
        reason,
    };

    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut parsed = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(classify_segment)
        .fold(ParseState::default(), ParseState::with_segment)
        .finalize()
        .map_err(invalid)?;
    parsed.trailing_slash = trailing_slash;

    for name in query.split('&').filter(|s| !s.is_empty()) {
        let inner = name
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(name);
        parsed.search.push(parse_param_with_type(inner));
    }

    Ok(parsed)
}

/// Calculates URL rule priority (lower = matched first)
///
/// # Priority Order
///
/// 1. **Static** → 0
/// 2. **Dynamic** → dynamic count + depth + 1
/// 3. **Catch-all** → 1000 + depth
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::url::pattern::calculate_priority;
///
/// assert_eq!(calculate_priority(false, 0, 2), 0);
/// assert_eq!(calculate_priority(false, 1, 2), 4);
/// assert_eq!(calculate_priority(true, 1, 2), 1002);
/// ```
pub fn calculate_priority(has_catch_all: bool, dynamic_count: usize, depth: usize) -> usize {
    if has_catch_all {
        1000 + depth
    } else if dynamic_count > 0 {
        dynamic_count + depth + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_static() {
        assert_eq!(classify_segment("about"), PatternSegmentType::Static("about".to_string()));
    }

    #[test]
    fn test_classify_colon_param() {
        assert_eq!(
            classify_segment(":id"),
            PatternSegmentType::Param("id".to_string(), None)
        );
    }

    #[test]
    fn test_classify_braced_param_with_type() {
        assert_eq!(
            classify_segment("{id:int}"),
            PatternSegmentType::Param("id".to_string(), Some("int".to_string()))
        );
    }

    #[test]
    fn test_classify_catch_all() {
        assert_eq!(
            classify_segment("*path"),
            PatternSegmentType::CatchAll("path".to_string())
        );
    }

    #[test]
    fn test_parse_pattern_with_search() {
        let parsed = parse_pattern("/search?q&{page:int}").unwrap();
        assert_eq!(parsed.segments, vec![PatternSegmentType::Static("search".to_string())]);
        assert_eq!(
            parsed.search,
            vec![
                ("q".to_string(), None),
                ("page".to_string(), Some("int".to_string()))
            ]
        );
    }

    #[test]
    fn test_parse_pattern_empty_and_root() {
        assert_eq!(parse_pattern("").unwrap().render(), "/");
        assert_eq!(parse_pattern("/").unwrap().render(), "/");
    }

    #[test]
    fn test_parse_pattern_trailing_slash() {
        let parsed = parse_pattern("/docs/").unwrap();
        assert!(parsed.trailing_slash);
        assert_eq!(parsed.render(), "/docs/");
    }

    #[test]
    fn test_catch_all_must_be_last() {
        let err = parse_pattern("/files/*path/edit").unwrap_err();
        assert!(matches!(err, RouterError::InvalidUrl { .. }));
    }

    #[test]
    fn test_unnamed_param_is_rejected() {
        assert!(parse_pattern("/users/:").is_err());
    }

    #[test]
    fn test_counts() {
        let parsed = parse_pattern("/users/:id/files/*path").unwrap();
        assert_eq!(parsed.dynamic_count(), 2);
        assert!(parsed.has_catch_all());
    }

    #[test]
    fn test_calculate_priority_ordering() {
        let fixed = calculate_priority(false, 0, 3);
        let dynamic = calculate_priority(false, 1, 1);
        let catch_all = calculate_priority(true, 1, 1);
        assert!(fixed < dynamic);
        assert!(dynamic < catch_all);
    }
}
