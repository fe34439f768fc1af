/// Location port: reading, writing and watching the current URL
///
/// The router never touches browser history itself. It reads and writes the
/// URL through [`LocationService`]; [`MemoryLocation`] keeps an in-memory
/// history for servers, tests and headless clients.
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::url::SearchParams;

/// Called with the new URL after an external location change
pub type LocationListener = Arc<dyn Fn(&str) + Send + Sync>;

/// A URL split into its parts; search keys/values and hash are decoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub path: String,
    pub search: SearchParams,
    pub hash: String,
}

/// Splits `path?search#hash`
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::location::parse_url;
///
/// let url = parse_url("/search?q=hello%20world&page=2#results");
/// assert_eq!(url.path, "/search");
/// assert_eq!(url.search["q"], "hello world");
/// assert_eq!(url.hash, "results");
/// ```
pub fn parse_url(url: &str) -> ParsedUrl {
    let (rest, hash) = match url.split_once('#') {
        Some((rest, hash)) => (rest, decode(hash)),
        None => (url, String::new()),
    };
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    let search = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect();

    ParsedUrl {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        search,
        hash,
    }
}

fn decode(text: &str) -> String {
    let text = text.replace('+', " ");
    urlencoding::decode(&text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(text)
}

/// Read/write access to the current URL
pub trait LocationService: Send + Sync {
    /// The full URL (`path?search#hash`)
    fn url(&self) -> String;

    /// Writes the URL without notifying change listeners
    fn set_url(&self, url: &str, replace: bool);

    /// Subscribes to external location changes; returns a subscription id
    fn on_change(&self, listener: LocationListener) -> u64;

    fn off_change(&self, id: u64) -> bool;

    fn path(&self) -> String {
        parse_url(&self.url()).path
    }

    fn search(&self) -> SearchParams {
        parse_url(&self.url()).search
    }

    fn hash(&self) -> String {
        parse_url(&self.url()).hash
    }
}

struct MemoryLocationInner {
    history: Vec<String>,
    index: usize,
    listeners: Vec<(u64, LocationListener)>,
    next_id: u64,
}

/// In-memory history stack
///
/// [`navigate`](MemoryLocation::navigate) and [`back`](MemoryLocation::back)
/// simulate user-driven changes and notify listeners; the router's own
/// [`set_url`](LocationService::set_url) writes do not.
#[derive(Clone)]
pub struct MemoryLocation {
    inner: Arc<Mutex<MemoryLocationInner>>,
}

impl fmt::Debug for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryLocation")
            .field("history", &inner.history)
            .field("index", &inner.index)
            .finish()
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryLocationInner {
                history: vec![url.into()],
                index: 0,
                listeners: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Entries up to and including the current one
    pub fn history(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.history[..=inner.index].to_vec()
    }

    /// Pushes `url` as if the user followed a link, then notifies listeners
    pub fn navigate(&self, url: impl Into<String>) {
        let url = url.into();
        self.push(url.clone());
        self.notify(&url);
    }

    /// Steps back one entry; false at the start of history
    pub fn back(&self) -> bool {
        let url = {
            let mut inner = self.inner.lock();
            if inner.index == 0 {
                return false;
            }
            inner.index -= 1;
            inner.history[inner.index].clone()
        };
        self.notify(&url);
        true
    }

    fn push(&self, url: String) {
        let mut inner = self.inner.lock();
        let keep = inner.index + 1;
        inner.history.truncate(keep);
        inner.history.push(url);
        inner.index = keep;
    }

    fn notify(&self, url: &str) {
        let listeners: Vec<LocationListener> = self.inner.lock().listeners.iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(url);
        }
    }
}

impl LocationService for MemoryLocation {
    fn url(&self) -> String {
        let inner = self.inner.lock();
        inner.history[inner.index].clone()
    }

    fn set_url(&self, url: &str, replace: bool) {
        if replace {
            let mut inner = self.inner.lock();
            let index = inner.index;
            inner.history[index] = url.to_string();
        } else {
            self.push(url.to_string());
        }
    }

    fn on_change(&self, listener: LocationListener) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, listener));
        id
    }

    fn off_change(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }
}
