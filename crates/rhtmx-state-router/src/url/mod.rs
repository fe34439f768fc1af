//! State URLs
//!
//! - [`pattern`]: fragment parsing (`/users/{id:int}/*path?sort`) and priority
//! - [`UrlMatcher`]: compiled, appendable pattern with `exec` / `format`
//! - [`UrlRouter`]: priority-ordered rules with an `otherwise` fallback
//! - [`normalize_path`]: canonical form for user-written paths

pub mod matcher;
pub mod normalize;
pub mod pattern;
pub mod router;

pub use matcher::{SearchParams, UrlMatcher};
pub use normalize::{is_canonical_path, normalize_path};
pub use router::{UrlMatch, UrlRouter, UrlRule};
