/// Parameter types: encode/decode/equality for typed param values
///
/// A [`ParamType`] converts between a [`serde_json::Value`] and its URL string
/// form, checks membership (`is`) and compares values (`equals`). The encoded
/// form must match the type's anchored regex.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::error::RouterError;

type EncodeFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;
type DecodeFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;
type IsFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type EqualsFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A named parameter type
#[derive(Clone)]
pub struct ParamType {
    name: String,
    pattern: Regex,
    encode: EncodeFn,
    decode: DecodeFn,
    is: IsFn,
    equals: EqualsFn,
    dynamic: bool,
    raw: bool,
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

impl ParamType {
    /// Creates a string-like type whose encoded form must match `pattern`
    ///
    /// The pattern is anchored automatically. Use the `with_*` builders to
    /// customize conversion.
    ///
    /// # Examples
    ///
    /// ```
    /// use rhtmx_state_router::ParamType;
    /// use serde_json::json;
    ///
    /// let slug = ParamType::new("slug", "[a-z0-9-]+").unwrap();
    /// assert!(slug.matches_encoded("hello-world"));
    /// assert!(!slug.matches_encoded("Hello World"));
    /// assert_eq!(slug.encode(&json!("a-b")), "a-b");
    /// ```
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, RouterError> {
        let pattern = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| RouterError::InvalidUrl {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: name.into(),
            pattern,
            encode: Arc::new(encode_plain),
            decode: Arc::new(|s| Some(Value::String(s.to_string()))),
            is: Arc::new(Value::is_string),
            equals: Arc::new(|a, b| a == b),
            dynamic: false,
            raw: false,
        })
    }

    pub fn with_encode(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.encode = Arc::new(f);
        self
    }

    pub fn with_decode(mut self, f: impl Fn(&str) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.decode = Arc::new(f);
        self
    }

    pub fn with_is(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.is = Arc::new(f);
        self
    }

    pub fn with_equals(mut self, f: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.equals = Arc::new(f);
        self
    }

    /// Params of this type are dynamic unless declared otherwise
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Encoded values are written to URLs without escaping `/`
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn encode(&self, value: &Value) -> String {
        (self.encode)(value)
    }

    pub fn decode(&self, text: &str) -> Option<Value> {
        (self.decode)(text)
    }

    pub fn is(&self, value: &Value) -> bool {
        (self.is)(value)
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        (self.equals)(a, b)
    }

    /// Checks an encoded string against the anchored type pattern
    pub fn matches_encoded(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Returns the value unchanged when it already belongs to this type,
    /// otherwise tries to decode it from its string form
    pub fn normalize(&self, value: &Value) -> Value {
        if self.is(value) {
            return value.clone();
        }
        match value {
            Value::String(s) => self.decode(s).unwrap_or_else(|| value.clone()),
            other => self
                .decode(&encode_plain(other))
                .filter(|decoded| self.is(decoded))
                .unwrap_or_else(|| other.clone()),
        }
    }
}

fn encode_plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

/// Table of registered parameter types, pre-populated with the built-ins
///
/// Built-ins: `string`, `path`, `int`, `bool`, `date`, `json`, `any`, `hash`.
#[derive(Debug, Clone)]
pub struct ParamTypes {
    types: HashMap<String, ParamType>,
}

impl ParamTypes {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for param_type in builtin_types() {
            types.insert(param_type.name().to_string(), param_type);
        }
        Self { types }
    }

    /// Registers (or replaces) a type by name
    pub fn register(&mut self, param_type: ParamType) {
        self.types.insert(param_type.name().to_string(), param_type);
    }

    pub fn get(&self, name: &str) -> Option<&ParamType> {
        self.types.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ParamType, RouterError> {
        self.get(name)
            .ok_or_else(|| RouterError::UnknownParamType(name.to_string()))
    }
}

impl Default for ParamTypes {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin(name: &str, pattern: &str) -> ParamType {
    match ParamType::new(name, pattern) {
        Ok(param_type) => param_type,
        Err(err) => unreachable!("builtin param type '{name}' has a bad pattern: {err}"),
    }
}

fn builtin_types() -> Vec<ParamType> {
    vec![
        builtin("string", "[^/]*"),
        builtin("path", ".*").raw(),
        builtin("int", "-?[0-9]+")
            .with_decode(|s| s.parse::<i64>().ok().map(Value::from))
            .with_is(|v| v.is_i64() || v.is_u64())
            .with_equals(|a, b| a.as_i64() == b.as_i64()),
        builtin("bool", "0|1|true|false")
            .with_encode(|v| if v.as_bool() == Some(true) { "1" } else { "0" }.to_string())
            .with_decode(|s| match s {
                "1" | "true" => Some(Value::Bool(true)),
                "0" | "false" => Some(Value::Bool(false)),
                _ => None,
            })
            .with_is(Value::is_boolean),
        builtin("date", "[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])")
            .with_decode(|s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .ok()
                    .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
            })
            .with_is(|v| parse_date(v).is_some())
            .with_equals(|a, b| parse_date(a).is_some() && parse_date(a) == parse_date(b)),
        builtin("json", "[^/]*")
            .with_encode(|v| v.to_string())
            .with_decode(|s| serde_json::from_str(s).ok())
            .with_is(|v| v.is_object() || v.is_array()),
        builtin("any", ".*").with_is(|_| true),
        builtin("hash", ".*").with_is(|_| true).dynamic(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_type_round_trip_and_pattern() {
        let types = ParamTypes::default();
        let int = types.get("int").unwrap();

        assert_eq!(int.encode(&json!(42)), "42");
        assert_eq!(int.decode("-7"), Some(json!(-7)));
        assert_eq!(int.decode("seven"), None);
        assert!(int.matches_encoded("123"));
        assert!(!int.matches_encoded("12a"));
        assert_eq!(int.normalize(&json!("5")), json!(5));
    }

    #[test]
    fn test_bool_type_encodes_as_digit() {
        let types = ParamTypes::default();
        let flag = types.get("bool").unwrap();

        assert_eq!(flag.encode(&json!(true)), "1");
        assert_eq!(flag.encode(&json!(false)), "0");
        assert_eq!(flag.decode("true"), Some(json!(true)));
    }

    #[test]
    fn test_date_type_compares_calendar_days() {
        let types = ParamTypes::default();
        let date = types.get("date").unwrap();

        assert!(date.is(&json!("2024-02-29")));
        assert!(!date.is(&json!("2023-02-29")));
        assert!(date.equals(&json!("2024-01-05"), &json!("2024-01-05")));
        assert!(!date.matches_encoded("2024-13-01"));
    }

    #[test]
    fn test_json_type() {
        let types = ParamTypes::default();
        let json_type = types.get("json").unwrap();

        let value = json!({"a": [1, 2]});
        let encoded = json_type.encode(&value);
        assert_eq!(json_type.decode(&encoded), Some(value));
        assert!(!json_type.is(&json!("plain")));
    }

    #[test]
    fn test_hash_type_is_dynamic() {
        let types = ParamTypes::default();
        assert!(types.get("hash").unwrap().is_dynamic());
        assert!(!types.get("string").unwrap().is_dynamic());
    }

    #[test]
    fn test_unknown_type() {
        let types = ParamTypes::default();
        assert_eq!(
            types.require("uuid").unwrap_err(),
            RouterError::UnknownParamType("uuid".to_string())
        );
    }
}
