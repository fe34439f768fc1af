/// A single typed parameter definition
///
/// Params are declared on states (through the URL pattern or the `params`
/// block) and carry their type, location, default value and squash policy.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ParamType, ParamTypes};
use crate::error::RouterError;

/// Where the param value lives in a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// A path segment (`/users/:id`)
    Path,
    /// A query parameter (`?page`)
    Search,
    /// The URL fragment
    Hash,
    /// Declared only in the state's `params` block; never written to the URL
    Config,
}

impl ParamLocation {
    fn default_type(self) -> &'static str {
        match self {
            ParamLocation::Path | ParamLocation::Search => "string",
            ParamLocation::Hash => "hash",
            ParamLocation::Config => "any",
        }
    }
}

/// What to write into the URL when a path param equals its default value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquashPolicy {
    /// Always encode the value
    #[default]
    Disabled,
    /// Drop the segment together with its leading slash
    Slash,
    /// Replace the segment with a fixed marker string
    Value(String),
}

/// Raw param configuration as written in a state declaration
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::ParamDeclaration;
/// use serde_json::json;
///
/// let page = ParamDeclaration::new()
///     .with_type("int")
///     .with_default(json!(1))
///     .dynamic();
/// assert_eq!(page.type_name.as_deref(), Some("int"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamDeclaration {
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    #[serde(rename = "value", default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub dynamic: Option<bool>,
    #[serde(default)]
    pub squash: Option<SquashPolicy>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub inherit: Option<bool>,
}

impl ParamDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = Some(true);
        self
    }

    pub fn with_squash(mut self, squash: SquashPolicy) -> Self {
        self.squash = Some(squash);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Excludes the param from ancestor-param inheritance in `go()`
    pub fn no_inherit(mut self) -> Self {
        self.inherit = Some(false);
        self
    }
}

/// A compiled parameter
#[derive(Debug, Clone)]
pub struct Param {
    id: String,
    param_type: ParamType,
    location: ParamLocation,
    default: Option<Value>,
    optional: bool,
    dynamic: bool,
    squash: SquashPolicy,
    inherit: bool,
}

impl Param {
    /// Compiles a param from its declaration
    ///
    /// The type comes from the declaration, then the inline URL type
    /// (`{id:int}`), then the location default (`string` for URL params,
    /// `hash` for the fragment, `any` for config-only params).
    pub fn new(
        id: impl Into<String>,
        location: ParamLocation,
        declaration: &ParamDeclaration,
        url_type: Option<&ParamType>,
        types: &ParamTypes,
    ) -> Result<Self, RouterError> {
        let param_type = match (&declaration.type_name, url_type) {
            (Some(name), _) => types.require(name)?.clone(),
            (None, Some(inline)) => inline.clone(),
            (None, None) => types.require(location.default_type())?.clone(),
        };

        let default = declaration
            .default
            .as_ref()
            .map(|value| normalize(&param_type, value));
        let optional = declaration.optional
            || default.is_some()
            || matches!(location, ParamLocation::Search | ParamLocation::Hash);
        let dynamic = declaration.dynamic.unwrap_or_else(|| param_type.is_dynamic());

        Ok(Self {
            id: id.into(),
            param_type,
            location,
            default,
            optional,
            dynamic,
            squash: declaration.squash.clone().unwrap_or_default(),
            inherit: declaration.inherit.unwrap_or(true),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn param_type(&self) -> &ParamType {
        &self.param_type
    }

    pub fn location(&self) -> ParamLocation {
        self.location
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn squash(&self) -> &SquashPolicy {
        &self.squash
    }

    pub fn inherit(&self) -> bool {
        self.inherit
    }

    /// Returns the effective value: the normalized raw value, or the default
    /// when the raw value is absent
    pub fn value(&self, raw: Option<&Value>) -> Option<Value> {
        match raw {
            Some(value) => Some(normalize(&self.param_type, value)),
            None => self.default.clone(),
        }
    }

    /// True when the value equals this param's default
    pub fn is_default_value(&self, value: Option<&Value>) -> bool {
        match (&self.default, value) {
            (Some(default), Some(value)) => self.equals(Some(default), Some(value)),
            (None, None) => true,
            (None, Some(Value::Null)) => true,
            _ => false,
        }
    }

    /// Validates a raw value against this param
    ///
    /// Absent (or null) values are valid only for optional params. Present
    /// values must belong to the type and encode to a string matching the
    /// type pattern.
    pub fn validates(&self, raw: Option<&Value>) -> bool {
        let value = match self.value(raw) {
            None | Some(Value::Null) => return self.optional,
            Some(value) => value,
        };

        if !self.param_type.is(&value) {
            return false;
        }
        self.param_type
            .matches_encoded(&self.param_type.encode(&value))
    }

    /// Compares two values with the type's equality; absent and null are equal
    pub fn equals(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        let a = a.filter(|v| !v.is_null());
        let b = b.filter(|v| !v.is_null());
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                let a = normalize(&self.param_type, a);
                let b = normalize(&self.param_type, b);
                self.param_type.equals(&a, &b)
            }
            _ => false,
        }
    }

    /// Encodes a value for the URL (unescaped)
    pub fn encode(&self, value: &Value) -> String {
        self.param_type.encode(&normalize(&self.param_type, value))
    }
}

fn normalize(param_type: &ParamType, value: &Value) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        param_type.normalize(value)
    }
}
