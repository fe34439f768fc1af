/// Lazy iterator over the ancestors of a dotted state name
///
/// For `a.b.c` yields: `a.b.c` → `a.b` → `a` → `` (the root)
///
/// Only borrows from the input; stops as soon as a caller's `find` succeeds.
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::state::NameHierarchy;
///
/// let names: Vec<&str> = NameHierarchy::new("a.b.c").collect();
/// assert_eq!(names, vec!["a.b.c", "a.b", "a", ""]);
/// ```
#[derive(Debug, Clone)]
pub struct NameHierarchy<'a> {
    current: Option<&'a str>,
}

impl<'a> NameHierarchy<'a> {
    pub fn new(name: &'a str) -> Self {
        Self { current: Some(name) }
    }
}

impl<'a> Iterator for NameHierarchy<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;

        self.current = if current.is_empty() {
            None
        } else {
            match current.rfind('.') {
                Some(dot) => Some(&current[..dot]),
                None => Some(""),
            }
        };

        Some(current)
    }
}

/// Name of the implied parent: everything before the last dot (root for
/// top-level names)
pub fn implied_parent(name: &str) -> Option<&str> {
    if name.is_empty() {
        return None;
    }
    NameHierarchy::new(name).nth(1)
}
