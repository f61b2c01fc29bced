//! String and array methods.

use super::ScriptError;
use super::value::{MAX_ARRAY_LEN, MAX_STRING_LEN, Value};

const STRING_METHODS: &[&str] = &[
    "includes",
    "indexOf",
    "startsWith",
    "endsWith",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "slice",
    "split",
];

const ARRAY_METHODS: &[&str] = &["includes", "indexOf", "join", "slice"];

/// Whether `receiver.name(...)` is a built-in method call
pub(super) fn is_method(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::String(_) => STRING_METHODS.contains(&name),
        Value::Array(_) => ARRAY_METHODS.contains(&name),
        _ => false,
    }
}

/// Invoke a method previously accepted by [`is_method`]
pub(super) fn call_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match receiver {
        Value::String(text) => string_method(text, name, args),
        Value::Array(items) => array_method(items, name, args),
        other => Err(ScriptError::Type(format!(
            "{}.{name} is not a function",
            other.type_of()
        ))),
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Undefined)
}

fn string_method(text: &str, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let search = || arg(args, 0).to_js_string();
    let value = match name {
        "includes" => Value::Bool(text.contains(&search())),
        "indexOf" => Value::Number(match text.find(&search()) {
            Some(byte_index) => text[..byte_index].chars().count() as f64,
            None => -1.0,
        }),
        "startsWith" => Value::Bool(text.starts_with(&search())),
        "endsWith" => Value::Bool(text.ends_with(&search())),
        "toUpperCase" => Value::String(text.to_uppercase()),
        "toLowerCase" => Value::String(text.to_lowercase()),
        "trim" => Value::String(text.trim().to_string()),
        "slice" => {
            let chars: Vec<char> = text.chars().collect();
            let (start, end) = slice_bounds(args, chars.len());
            Value::String(chars[start..end].iter().collect())
        }
        "split" => match arg(args, 0) {
            Value::Undefined => Value::Array(vec![Value::String(text.to_string())]),
            separator => {
                let separator = separator.to_js_string();
                let parts = if separator.is_empty() {
                    text.chars().count()
                } else {
                    text.matches(separator.as_str()).count() + 1
                };
                if parts > MAX_ARRAY_LEN {
                    return Err(ScriptError::Range(format!(
                        "split would produce {parts} parts (limit {MAX_ARRAY_LEN})"
                    )));
                }
                if separator.is_empty() {
                    Value::Array(text.chars().map(|c| Value::String(c.to_string())).collect())
                } else {
                    Value::Array(
                        text.split(separator.as_str())
                            .map(|part| Value::String(part.to_string()))
                            .collect(),
                    )
                }
            }
        },
        _ => return Err(ScriptError::Type(format!("string.{name} is not a function"))),
    };
    Ok(value)
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let value = match name {
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|item| same_value_zero(item, needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|item| item.strict_equals(needle))
                    .map_or(-1.0, |index| index as f64),
            )
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect();
            let len = parts.iter().map(String::len).sum::<usize>().saturating_add(
                separator
                    .len()
                    .saturating_mul(parts.len().saturating_sub(1)),
            );
            if len > MAX_STRING_LEN {
                return Err(ScriptError::Range(format!(
                    "strings cannot exceed {MAX_STRING_LEN} bytes"
                )));
            }
            Value::String(parts.join(&separator))
        }
        "slice" => {
            let (start, end) = slice_bounds(args, items.len());
            Value::Array(items[start..end].to_vec())
        }
        _ => return Err(ScriptError::Type(format!("array.{name} is not a function"))),
    };
    Ok(value)
}

/// `includes` treats NaN as equal to itself.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

/// Resolve `slice(start, end)` arguments against a length; negative values
/// count from the end.
fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let start = relative_index(arg(args, 0), len, 0);
    let end = relative_index(arg(args, 1), len, len);
    (start, end.max(start))
}

fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    fn n(num: f64) -> Value {
        Value::Number(num)
    }

    #[test]
    fn string_search_methods() {
        let text = "héllo world";
        assert_eq!(string_method(text, "indexOf", &[s("world")]).unwrap(), n(6.0));
        assert_eq!(string_method(text, "indexOf", &[s("zzz")]).unwrap(), n(-1.0));
        assert_eq!(string_method(text, "includes", &[s("llo")]).unwrap(), Value::Bool(true));
        assert_eq!(string_method(text, "startsWith", &[s("hé")]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn slice_accepts_negative_bounds() {
        assert_eq!(string_method("abcdef", "slice", &[n(-3.0)]).unwrap(), s("def"));
        assert_eq!(string_method("abcdef", "slice", &[n(1.0), n(-1.0)]).unwrap(), s("bcde"));
        assert_eq!(string_method("abc", "slice", &[n(2.0), n(1.0)]).unwrap(), s(""));
        let items = vec![n(1.0), n(2.0), n(3.0)];
        assert_eq!(array_method(&items, "slice", &[n(1.0)]).unwrap(), Value::Array(vec![n(2.0), n(3.0)]));
    }

    #[test]
    fn join_skips_nullish_elements() {
        let items = vec![s("a"), Value::Null, n(3.0)];
        assert_eq!(array_method(&items, "join", &[]).unwrap(), s("a,,3"));
        assert_eq!(array_method(&items, "join", &[s(" - ")]).unwrap(), s("a -  - 3"));
    }

    #[test]
    fn includes_finds_nan_but_index_of_does_not() {
        let items = vec![n(f64::NAN)];
        assert_eq!(array_method(&items, "includes", &[n(f64::NAN)]).unwrap(), Value::Bool(true));
        assert_eq!(array_method(&items, "indexOf", &[n(f64::NAN)]).unwrap(), n(-1.0));
    }

    #[test]
    fn join_refuses_oversized_results() {
        let items = vec![s("a"); 64];
        let separator = s(&"-".repeat(MAX_STRING_LEN / 32));
        assert!(matches!(
            array_method(&items, "join", &[separator]),
            Err(ScriptError::Range(_))
        ));
    }

    #[test]
    fn split_variants() {
        assert_eq!(
            string_method("a,b", "split", &[s(",")]).unwrap(),
            Value::Array(vec![s("a"), s("b")])
        );
        assert_eq!(
            string_method("ab", "split", &[s("")]).unwrap(),
            Value::Array(vec![s("a"), s("b")])
        );
    }
}
