/// Wildcard matching for dotted state names
///
/// **Pure**: a compiled [`Glob`] never changes and matching has no side effects.
///
/// # Pattern Segments
///
/// - literal: `contacts`
/// - `*`: exactly one segment
/// - `**`: zero or more segments (leading and/or trailing)
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::Glob;
///
/// assert!(Glob::new("contacts.*").matches("contacts.list"));
/// assert!(!Glob::new("contacts.*").matches("contacts.list.item"));
/// assert!(Glob::new("**.item").matches("a.b.item"));
/// assert!(Glob::new("contacts.**").matches("contacts"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    text: String,
    segments: Vec<String>,
}

const ONE: &str = "*";
const MANY: &str = "**";

impl Glob {
    /// Compiles a glob from its dotted text form
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = text.split('.').map(str::to_string).collect();
        Self { text, segments }
    }

    /// Returns true if the string contains a wildcard and should be treated as a glob
    pub fn is_glob(text: &str) -> bool {
        text.contains('*')
    }

    /// Original pattern text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Matches a dotted state name against this glob
    ///
    /// # Algorithm
    ///
    /// 1. Replace candidate segments with `*` where the glob has `*`
    /// 2. Leading `**`: drop candidate segments before the first literal after it
    /// 3. Trailing `**`: drop candidate segments after the last literal before it
    /// 4. Segment counts must agree, then compare segment by segment
    pub fn matches(&self, name: &str) -> bool {
        let glob = &self.segments;
        if glob.len() == 1 && glob[0] == MANY {
            return true;
        }

        let mut segments: Vec<&str> = name.split('.').collect();

        for (idx, seg) in glob.iter().enumerate() {
            if seg == ONE && idx < segments.len() {
                segments[idx] = ONE;
            }
        }

        if glob[0] == MANY {
            let anchor = glob[1].as_str();
            match segments.iter().position(|s| *s == anchor) {
                Some(pos) => {
                    segments.drain(..pos);
                }
                None => return false,
            }
            segments.insert(0, MANY);
        }

        let last = glob.len() - 1;
        if glob[last] == MANY {
            let anchor = glob[last - 1].as_str();
            match segments.iter().position(|s| *s == anchor) {
                Some(pos) => segments.truncate(pos + 1),
                None => return false,
            }
            segments.push(MANY);
        }

        segments.len() == glob.len() && segments.iter().zip(glob).all(|(a, b)| *a == b)
    }
}

impl std::fmt::Display for Glob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
