//! Typed state parameters
//!
//! - [`ParamType`] / [`ParamTypes`]: encode, decode, equality and URL pattern
//! - [`Param`]: one compiled definition (type, location, default, squash)
//! - [`ParamSet`]: a state's params chained to its parent's

use std::collections::BTreeMap;

use serde_json::Value;

pub mod param;
pub mod set;
pub mod types;

pub use param::{Param, ParamDeclaration, ParamLocation, SquashPolicy};
pub use set::ParamSet;
pub use types::{ParamType, ParamTypes};

/// An untyped bag of param values keyed by param id
pub type RawParams = BTreeMap<String, Value>;
