use std::collections::BTreeMap;
use std::fmt;
use std::mem;

/// Deepest nesting of arrays and objects a script may build. Matches the
/// recursion limit `serde_json` applies to decoded payloads.
pub const MAX_VALUE_DEPTH: usize = 128;

/// Longest string a script may build, in bytes
pub const MAX_STRING_LEN: usize = 1 << 24;

/// Longest array a script may build
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// Functions provided by the runtime rather than declared by the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `log(message, level)`
    Log,
    /// `notify(message, level)`
    Notify,
    /// `JSON.stringify(value, _, indent)`
    JsonStringify,
    /// `JSON.parse(text)`
    JsonParse,
    /// `Object.keys(value)`
    ObjectKeys,
    /// `String(value)`
    ToString,
    /// `Number(value)`
    ToNumber,
    /// `Error(message)` / `new Error(message)`
    Error,
}

impl Builtin {
    /// Global name the builtin is reachable under
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Log => "log",
            Builtin::Notify => "notify",
            Builtin::JsonStringify => "JSON.stringify",
            Builtin::JsonParse => "JSON.parse",
            Builtin::ObjectKeys => "Object.keys",
            Builtin::ToString => "String",
            Builtin::ToNumber => "Number",
            Builtin::Error => "Error",
        }
    }
}

/// Nesting depth and approximate heap size of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Levels of array/object nesting; scalars are 0
    pub depth: usize,
    /// Bytes held, counting one slot per value plus string and key bytes
    pub bytes: usize,
}

/// A script value. Values are copied on assignment; there are no shared
/// references between variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// IEEE-754 double
    Number(f64),
    /// UTF-8 text
    String(String),
    /// Ordered list
    Array(Vec<Value>),
    /// String-keyed map
    Object(BTreeMap<String, Value>),
    /// Reference to a declared function, by name
    Function(String),
    /// Runtime-provided function
    Builtin(Builtin),
}

impl Value {
    /// Convert decoded JSON into a script value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(*flag),
            serde_json::Value::Number(num) => Value::Number(num.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Value::String(text.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON the way `JSON.stringify` does: `undefined` and
    /// functions are dropped from objects and become `null` elsewhere;
    /// non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Builtin(_) => {
                serde_json::Value::Null
            }
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Number(num) => number_to_json(*num),
            Value::String(text) => serde_json::Value::String(text.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, value)| !value.is_unserializable())
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Measure nesting and size in one pass
    pub fn footprint(&self) -> Footprint {
        let slot = mem::size_of::<Value>();
        match self {
            Value::String(text) | Value::Function(text) => Footprint {
                depth: 0,
                bytes: slot.saturating_add(text.len()),
            },
            Value::Array(items) => items.iter().fold(
                Footprint { depth: 1, bytes: slot },
                |acc, item| {
                    let child = item.footprint();
                    Footprint {
                        depth: acc.depth.max(child.depth + 1),
                        bytes: acc.bytes.saturating_add(child.bytes),
                    }
                },
            ),
            Value::Object(map) => map.iter().fold(
                Footprint { depth: 1, bytes: slot },
                |acc, (key, item)| {
                    let child = item.footprint();
                    Footprint {
                        depth: acc.depth.max(child.depth + 1),
                        bytes: acc.bytes.saturating_add(key.len()).saturating_add(child.bytes),
                    }
                },
            ),
            _ => Footprint {
                depth: 0,
                bytes: slot,
            },
        }
    }

    /// Whether `JSON.stringify` skips this value inside objects
    pub fn is_unserializable(&self) -> bool {
        matches!(self, Value::Undefined | Value::Function(_) | Value::Builtin(_))
    }

    /// `typeof value`
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Builtin(_) => "function",
        }
    }

    /// `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Truthiness as used by conditions and `!`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(num) => *num != 0.0 && !num.is_nan(),
            Value::String(text) => !text.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Builtin(_) => true,
        }
    }

    /// Numeric conversion as used by arithmetic and `Number()`
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(flag) => f64::from(u8::from(*flag)),
            Value::Number(num) => *num,
            Value::String(text) => parse_number(text),
            Value::Array(_) => parse_number(&self.to_js_string()),
            Value::Object(_) | Value::Function(_) | Value::Builtin(_) => f64::NAN,
        }
    }

    /// String conversion as used by `+`, templates and `String()`
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(num) => format_number(*num),
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(name) => format!("function {name}() {{ [code] }}"),
            Value::Builtin(builtin) => format!("function {}() {{ [native code] }}", builtin.name()),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::String(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

/// Render a number the way scripts expect: integers without a fraction.
pub fn format_number(num: f64) -> String {
    if num.is_nan() {
        "NaN".to_string()
    } else if num.is_infinite() {
        let text = if num > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if num == 0.0 {
        "0".to_string()
    } else if num.fract() == 0.0 && num.abs() < 1e21 {
        format!("{num:.0}")
    } else {
        num.to_string()
    }
}

fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    match text {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    if !text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return f64::NAN;
    }
    text.parse().unwrap_or(f64::NAN)
}

fn number_to_json(num: f64) -> serde_json::Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if num.fract() == 0.0 && num.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(num as i64)
    } else {
        serde_json::Number::from_f64(num)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
