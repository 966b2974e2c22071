//! Built-in scalar functions.
//!
//! All functions are total over values: an argument that cannot be cast to
//! what the function needs yields NULL instead of an error. Arity is
//! checked and wrong arity is a type error.

use crate::error::FlatqError;
use crate::eval::{Scope, evaluate, evaluate_predicate};
use crate::sql::ast::Expr;
use crate::value::{Ternary, Value};

fn arity_error(name: &str, expect: &str, actual: usize) -> FlatqError {
    FlatqError::FunctionArgumentLength {
        name: name.to_string(),
        expect: expect.to_string(),
        actual,
    }
}

fn check_arity(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), FlatqError> {
    if args.len() < min || max < args.len() {
        let expect = if min == max {
            format!("{min} argument{}", if min == 1 { "" } else { "s" })
        } else {
            format!("{min} to {max} arguments")
        };
        return Err(arity_error(name, &expect, args.len()));
    }
    Ok(())
}

fn float_arg(v: &Value) -> Option<f64> {
    match v.to_float() {
        Value::Float(f) => Some(f),
        _ => None,
    }
}

fn int_arg(v: &Value) -> Option<i64> {
    match v.to_integer() {
        Value::Integer(n) => Some(n),
        _ => None,
    }
}

fn string_arg(v: &Value) -> Option<String> {
    v.to_field()
}

/// Dispatch one built-in scalar call. `name` is already uppercased.
pub fn call_builtin(
    name: &str,
    args: &[Expr],
    scope: &Scope<'_>,
    element: Option<usize>,
) -> Result<Value, FlatqError> {
    // COALESCE and IF control evaluation order themselves.
    match name {
        "COALESCE" => {
            if args.is_empty() {
                return Err(arity_error(name, "at least 1 argument", 0));
            }
            for arg in args {
                let v = evaluate(arg, scope, element)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            return Ok(Value::Null);
        }
        "IF" => {
            check_arity(name, args, 3, 3)?;
            let cond = evaluate_predicate(&args[0], scope, element)?;
            return if cond == Ternary::True {
                evaluate(&args[1], scope, element)
            } else {
                evaluate(&args[2], scope, element)
            };
        }
        _ => {}
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, scope, element)?);
    }

    let ignore_case = scope.session.flags().ignore_case;
    match name {
        "IFNULL" => {
            check_arity(name, args, 2, 2)?;
            Ok(if values[0].is_null() {
                values[1].clone()
            } else {
                values[0].clone()
            })
        }
        "NULLIF" => {
            check_arity(name, args, 2, 2)?;
            if crate::value::equal(&values[0], &values[1], ignore_case).is_true() {
                Ok(Value::Null)
            } else {
                Ok(values[0].clone())
            }
        }
        "ABS" => {
            check_arity(name, args, 1, 1)?;
            Ok(match &values[0].to_integer() {
                Value::Integer(n) => n
                    .checked_abs()
                    .map(Value::Integer)
                    .unwrap_or(Value::Null),
                _ => float_arg(&values[0]).map(|f| Value::Float(f.abs())).unwrap_or(Value::Null),
            })
        }
        "CEIL" => {
            check_arity(name, args, 1, 1)?;
            Ok(float_arg(&values[0])
                .map(|f| Value::Integer(f.ceil() as i64))
                .unwrap_or(Value::Null))
        }
        "FLOOR" => {
            check_arity(name, args, 1, 1)?;
            Ok(float_arg(&values[0])
                .map(|f| Value::Integer(f.floor() as i64))
                .unwrap_or(Value::Null))
        }
        "ROUND" => {
            check_arity(name, args, 1, 2)?;
            let digits = if values.len() == 2 {
                match int_arg(&values[1]) {
                    Some(d) => d,
                    None => return Ok(Value::Null),
                }
            } else {
                0
            };
            Ok(float_arg(&values[0])
                .map(|f| {
                    let scale = 10f64.powi(digits as i32);
                    let r = (f * scale).round() / scale;
                    if digits <= 0 {
                        Value::Integer(r as i64)
                    } else {
                        Value::Float(r)
                    }
                })
                .unwrap_or(Value::Null))
        }
        "SQRT" => {
            check_arity(name, args, 1, 1)?;
            Ok(float_arg(&values[0])
                .filter(|f| *f >= 0.0)
                .map(|f| Value::Float(f.sqrt()))
                .unwrap_or(Value::Null))
        }
        "POW" | "POWER" => {
            check_arity(name, args, 2, 2)?;
            match (float_arg(&values[0]), float_arg(&values[1])) {
                (Some(a), Some(b)) => {
                    let r = a.powf(b);
                    Ok(if r.is_finite() {
                        Value::Float(r)
                    } else {
                        Value::Null
                    })
                }
                _ => Ok(Value::Null),
            }
        }
        "LEN" | "LENGTH" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::Integer(s.chars().count() as i64))
                .unwrap_or(Value::Null))
        }
        "UPPER" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::String(s.to_uppercase()))
                .unwrap_or(Value::Null))
        }
        "LOWER" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::String(s.to_lowercase()))
                .unwrap_or(Value::Null))
        }
        "LTRIM" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::String(s.trim_start().to_string()))
                .unwrap_or(Value::Null))
        }
        "RTRIM" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::String(s.trim_end().to_string()))
                .unwrap_or(Value::Null))
        }
        "TRIM" => {
            check_arity(name, args, 1, 1)?;
            Ok(string_arg(&values[0])
                .map(|s| Value::String(s.trim().to_string()))
                .unwrap_or(Value::Null))
        }
        "SUBSTRING" | "SUBSTR" => {
            check_arity(name, args, 2, 3)?;
            let s = match string_arg(&values[0]) {
                Some(s) => s,
                None => return Ok(Value::Null),
            };
            let start = match int_arg(&values[1]) {
                Some(n) => n,
                None => return Ok(Value::Null),
            };
            let chars: Vec<char> = s.chars().collect();
            // 1-based; a negative start counts from the end.
            let begin = if start > 0 {
                (start - 1) as usize
            } else if start < 0 {
                chars.len().saturating_sub((-start) as usize)
            } else {
                0
            };
            if begin >= chars.len() {
                return Ok(Value::String(String::new()));
            }
            let end = if values.len() == 3 {
                match int_arg(&values[2]) {
                    Some(len) if len >= 0 => (begin + len as usize).min(chars.len()),
                    _ => return Ok(Value::Null),
                }
            } else {
                chars.len()
            };
            Ok(Value::String(chars[begin..end].iter().collect()))
        }
        "INSTR" => {
            check_arity(name, args, 2, 2)?;
            match (string_arg(&values[0]), string_arg(&values[1])) {
                (Some(s), Some(sub)) => Ok(s
                    .find(&sub)
                    .map(|byte_pos| {
                        Value::Integer(s[..byte_pos].chars().count() as i64 + 1)
                    })
                    .unwrap_or(Value::Integer(0))),
                _ => Ok(Value::Null),
            }
        }
        "REPLACE" => {
            check_arity(name, args, 3, 3)?;
            match (
                string_arg(&values[0]),
                string_arg(&values[1]),
                string_arg(&values[2]),
            ) {
                (Some(s), Some(old), Some(new)) if !old.is_empty() => {
                    Ok(Value::String(s.replace(&old, &new)))
                }
                _ => Ok(Value::Null),
            }
        }
        "LPAD" | "RPAD" => {
            check_arity(name, args, 3, 3)?;
            match (
                string_arg(&values[0]),
                int_arg(&values[1]),
                string_arg(&values[2]),
            ) {
                (Some(s), Some(width), Some(pad)) if width >= 0 && !pad.is_empty() => {
                    let width = width as usize;
                    let len = s.chars().count();
                    if len >= width {
                        return Ok(Value::String(s.chars().take(width).collect()));
                    }
                    let padding: String =
                        pad.chars().cycle().take(width - len).collect();
                    Ok(Value::String(if name == "LPAD" {
                        format!("{padding}{s}")
                    } else {
                        format!("{s}{padding}")
                    }))
                }
                _ => Ok(Value::Null),
            }
        }
        "CONCAT" => {
            let mut out = String::new();
            for v in &values {
                match v.to_field() {
                    Some(s) => out.push_str(&s),
                    None => return Ok(Value::Null),
                }
            }
            Ok(Value::String(out))
        }
        "NOW" => {
            check_arity(name, args, 0, 0)?;
            Ok(Value::now())
        }
        "DATETIME_FORMAT" => {
            check_arity(name, args, 2, 2)?;
            let formats = scope.session.flags().datetime_format;
            match (values[0].to_datetime(&formats), string_arg(&values[1])) {
                (Value::Datetime(d), Some(fmt)) => {
                    Ok(Value::String(d.format(&fmt).to_string()))
                }
                _ => Ok(Value::Null),
            }
        }
        "YEAR" | "MONTH" | "DAY" | "HOUR" | "MINUTE" | "SECOND" => {
            check_arity(name, args, 1, 1)?;
            let formats = scope.session.flags().datetime_format;
            match values[0].to_datetime(&formats) {
                Value::Datetime(d) => {
                    use chrono::{Datelike, Timelike};
                    let n = match name {
                        "YEAR" => d.year() as i64,
                        "MONTH" => d.month() as i64,
                        "DAY" => d.day() as i64,
                        "HOUR" => d.hour() as i64,
                        "MINUTE" => d.minute() as i64,
                        _ => d.second() as i64,
                    };
                    Ok(Value::Integer(n))
                }
                _ => Ok(Value::Null),
            }
        }
        "INTEGER" => {
            check_arity(name, args, 1, 1)?;
            Ok(values[0].to_integer())
        }
        "FLOAT" => {
            check_arity(name, args, 1, 1)?;
            Ok(values[0].to_float())
        }
        "STRING" => {
            check_arity(name, args, 1, 1)?;
            Ok(values[0]
                .to_field()
                .map(Value::String)
                .unwrap_or(Value::Null))
        }
        "BOOLEAN" => {
            check_arity(name, args, 1, 1)?;
            Ok(values[0].to_boolean())
        }
        "TERNARY" => {
            check_arity(name, args, 1, 1)?;
            Ok(values[0].to_ternary())
        }
        "DATETIME" => {
            check_arity(name, args, 1, 1)?;
            let formats = scope.session.flags().datetime_format;
            Ok(values[0].to_datetime(&formats))
        }
        _ => Err(FlatqError::FunctionNotExist(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::session::Session;

    fn call(name: &str, args: Vec<Expr>) -> Result<Value, FlatqError> {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        call_builtin(name, &args, &scope, None)
    }

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    #[test]
    fn string_functions() {
        assert_eq!(
            call("UPPER", vec![lit(Value::String("ab".into()))]).unwrap(),
            Value::String("AB".into())
        );
        assert_eq!(
            call(
                "SUBSTRING",
                vec![
                    lit(Value::String("hello".into())),
                    lit(Value::Integer(2)),
                    lit(Value::Integer(3)),
                ],
            )
            .unwrap(),
            Value::String("ell".into())
        );
        assert_eq!(
            call(
                "SUBSTRING",
                vec![lit(Value::String("hello".into())), lit(Value::Integer(-2))],
            )
            .unwrap(),
            Value::String("lo".into())
        );
        assert_eq!(
            call(
                "INSTR",
                vec![
                    lit(Value::String("hello".into())),
                    lit(Value::String("ll".into())),
                ],
            )
            .unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            call(
                "LPAD",
                vec![
                    lit(Value::String("7".into())),
                    lit(Value::Integer(3)),
                    lit(Value::String("0".into())),
                ],
            )
            .unwrap(),
            Value::String("007".into())
        );
        assert_eq!(
            call("LEN", vec![lit(Value::Null)]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(
            call("CEIL", vec![lit(Value::Float(1.2))]).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            call(
                "ROUND",
                vec![lit(Value::Float(1.256)), lit(Value::Integer(2))],
            )
            .unwrap(),
            Value::Float(1.26)
        );
        assert_eq!(
            call("ABS", vec![lit(Value::Integer(-3))]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(call("SQRT", vec![lit(Value::Integer(-1))]).unwrap(), Value::Null);
    }

    #[test]
    fn conditionals() {
        assert_eq!(
            call(
                "COALESCE",
                vec![lit(Value::Null), lit(Value::Integer(2)), lit(Value::Integer(3))],
            )
            .unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            call(
                "IF",
                vec![
                    lit(Value::Boolean(false)),
                    lit(Value::Integer(1)),
                    lit(Value::Integer(2)),
                ],
            )
            .unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            call(
                "NULLIF",
                vec![lit(Value::Integer(1)), lit(Value::Integer(1))],
            )
            .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn datetime_functions() {
        assert_eq!(
            call("YEAR", vec![lit(Value::String("2023-04-05".into()))]).unwrap(),
            Value::Integer(2023)
        );
        assert_eq!(
            call(
                "DATETIME_FORMAT",
                vec![
                    lit(Value::String("2023-04-05".into())),
                    lit(Value::String("%m/%d".into())),
                ],
            )
            .unwrap(),
            Value::String("04/05".into())
        );
    }

    #[test]
    fn arity_and_unknown_names() {
        assert!(matches!(
            call("UPPER", vec![]),
            Err(FlatqError::FunctionArgumentLength { .. })
        ));
        assert!(matches!(
            call("NO_SUCH_FN", vec![]),
            Err(FlatqError::FunctionNotExist(_))
        ));
    }
}
