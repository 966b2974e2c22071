//! Aggregate reductions over value lists.
//!
//! Aggregates are pure functions of the (possibly DISTINCT-deduplicated)
//! list of values an argument evaluated to across a group. NULL elements
//! are skipped; an empty or all-null input yields NULL, except COUNT which
//! yields 0.

use crate::error::FlatqError;
use crate::value::{self, Value};

/// Apply a built-in aggregate. `separator` is only read by LISTAGG.
pub fn apply(
    name: &str,
    values: Vec<Value>,
    separator: &str,
    ignore_case: bool,
) -> Result<Value, FlatqError> {
    match name {
        "COUNT" => {
            let n = values.iter().filter(|v| !v.is_null()).count();
            Ok(Value::Integer(n as i64))
        }
        "MIN" => Ok(fold_extreme(values, ignore_case, std::cmp::Ordering::Less)),
        "MAX" => Ok(fold_extreme(values, ignore_case, std::cmp::Ordering::Greater)),
        "SUM" => Ok(match float_values(&values) {
            Some(fs) => Value::Float(fs.iter().sum()),
            None => Value::Null,
        }),
        "AVG" => Ok(match float_values(&values) {
            Some(fs) => Value::Float(fs.iter().sum::<f64>() / fs.len() as f64),
            None => Value::Null,
        }),
        "MEDIAN" => Ok(match float_values(&values) {
            Some(mut fs) => {
                fs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = fs.len() / 2;
                if fs.len() % 2 == 1 {
                    Value::Float(fs[mid])
                } else {
                    Value::Float((fs[mid - 1] + fs[mid]) / 2.0)
                }
            }
            None => Value::Null,
        }),
        "VAR" => Ok(variance(&values, true).map(Value::Float).unwrap_or(Value::Null)),
        "VARP" => Ok(variance(&values, false).map(Value::Float).unwrap_or(Value::Null)),
        "STDEV" => Ok(variance(&values, true)
            .map(|v| Value::Float(v.sqrt()))
            .unwrap_or(Value::Null)),
        "STDEVP" => Ok(variance(&values, false)
            .map(|v| Value::Float(v.sqrt()))
            .unwrap_or(Value::Null)),
        "LISTAGG" => {
            let parts: Vec<String> = values.iter().filter_map(|v| v.to_field()).collect();
            if parts.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::String(parts.join(separator)))
            }
        }
        "JSON_AGG" => {
            let items: Vec<serde_json::Value> = values.iter().map(to_json).collect();
            Ok(Value::String(
                serde_json::to_string(&items)
                    .map_err(|e| FlatqError::InternalError(e.to_string()))?,
            ))
        }
        _ => Err(FlatqError::FunctionNotExist(name.to_string())),
    }
}

/// Null-skipping MIN/MAX fold using the engine's ternary comparison.
fn fold_extreme(values: Vec<Value>, ignore_case: bool, keep: std::cmp::Ordering) -> Value {
    let mut best: Option<Value> = None;
    for v in values {
        if v.is_null() {
            continue;
        }
        match &best {
            None => best = Some(v),
            Some(b) => {
                if value::compare(&v, b, ignore_case) == Some(keep) {
                    best = Some(v);
                }
            }
        }
    }
    best.unwrap_or(Value::Null)
}

/// Values castable to float, nulls and uncastables skipped. None when
/// nothing remains.
fn float_values(values: &[Value]) -> Option<Vec<f64>> {
    let fs: Vec<f64> = values
        .iter()
        .filter_map(|v| match v.to_float() {
            Value::Float(f) => Some(f),
            _ => None,
        })
        .collect();
    if fs.is_empty() { None } else { Some(fs) }
}

fn variance(values: &[Value], sample: bool) -> Option<f64> {
    let fs = float_values(values)?;
    let n = fs.len();
    if sample && n < 2 {
        return None;
    }
    let mean = fs.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = fs.iter().map(|f| (f - mean) * (f - mean)).sum();
    let divisor = if sample { n - 1 } else { n };
    Some(sum_sq / divisor as f64)
}

fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Value::from(*f),
        other => match other.to_field() {
            Some(s) => serde_json::Value::String(s),
            None => serde_json::Value::Null,
        },
    }
}
