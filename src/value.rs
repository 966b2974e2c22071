//! Typed scalar values and three-valued logic.
//!
//! Every cell in a view holds a [`Value`]. Comparisons and boolean
//! connectives are three-valued: the result of a predicate is a [`Ternary`],
//! and NULL operands propagate to `Unknown` following Kleene logic.
//!
//! Conversions never fail: `to_integer`, `to_float`, `to_datetime` and
//! friends return [`Value::Null`] when the source value cannot represent
//! the target type.
//!
//! Row identity and grouping use deterministic comparison keys hashed with
//! xxh64: equivalent values under the engine's equality serialize to
//! identical byte strings, so one 64-bit hash per key tuple is enough for
//! GROUP BY buckets, DISTINCT sets, and set-operation membership.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use xxhash_rust::xxh64;

/// Fixed seed for comparison-key hashing. Determinism matters: the same
/// tuple must bucket identically across passes and processes.
const HASH_SEED: u64 = 0x517cc1b727220a95;

/// Record separator between tuple elements in a composite key.
const KEY_SEPARATOR: char = '\x1E';

/// Serialized form of NULL inside a comparison key.
const KEY_NULL: &str = "\x00NULL\x00";

/// Datetime layouts tried after the session-configured ones.
const DEFAULT_DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// Three-valued logic result: TRUE, FALSE, or UNKNOWN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    True,
    False,
    Unknown,
}

impl Ternary {
    pub fn from_bool(b: bool) -> Ternary {
        if b { Ternary::True } else { Ternary::False }
    }

    /// `None` maps to Unknown.
    pub fn from_option(b: Option<bool>) -> Ternary {
        match b {
            Some(b) => Ternary::from_bool(b),
            None => Ternary::Unknown,
        }
    }

    /// Kleene conjunction.
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Unknown,
        }
    }

    /// Kleene disjunction.
    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Unknown,
        }
    }

    /// Kleene negation. NOT UNKNOWN is UNKNOWN.
    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }

    /// Strict truth: only TRUE counts.
    pub fn is_true(self) -> bool {
        self == Ternary::True
    }

    pub fn parse(s: &str) -> Option<Ternary> {
        match s.to_uppercase().as_str() {
            "TRUE" => Some(Ternary::True),
            "FALSE" => Some(Ternary::False),
            "UNKNOWN" => Some(Ternary::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ternary::True => "TRUE",
            Ternary::False => "FALSE",
            Ternary::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A typed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Ternary(Ternary),
    Integer(i64),
    Float(f64),
    String(String),
    Datetime(DateTime<FixedOffset>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Current local time as a datetime value.
    pub fn now() -> Value {
        Value::Datetime(Local::now().fixed_offset())
    }

    // ── Conversions, Null on failure ────────────────────────

    pub fn to_integer(&self) -> Value {
        match self {
            Value::Integer(n) => Value::Integer(*n),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Value::Integer(*f as i64),
            Value::String(s) => {
                let t = s.trim();
                if let Ok(n) = t.parse::<i64>() {
                    Value::Integer(n)
                } else if let Ok(f) = t.parse::<f64>() {
                    if f.fract() == 0.0 && f.is_finite() {
                        Value::Integer(f as i64)
                    } else {
                        Value::Null
                    }
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        }
    }

    pub fn to_float(&self) -> Value {
        match self {
            Value::Integer(n) => Value::Float(*n as f64),
            Value::Float(f) => Value::Float(*f),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Value::Float(f),
                _ => Value::Null,
            },
            _ => Value::Null,
        }
    }

    pub fn to_boolean(&self) -> Value {
        match self {
            Value::Boolean(b) => Value::Boolean(*b),
            Value::Ternary(Ternary::True) => Value::Boolean(true),
            Value::Ternary(Ternary::False) => Value::Boolean(false),
            Value::Integer(0) => Value::Boolean(false),
            Value::Integer(1) => Value::Boolean(true),
            Value::String(s) => match s.trim().to_uppercase().as_str() {
                "TRUE" | "1" => Value::Boolean(true),
                "FALSE" | "0" => Value::Boolean(false),
                _ => Value::Null,
            },
            _ => Value::Null,
        }
    }

    pub fn to_ternary(&self) -> Value {
        match self {
            Value::Ternary(t) => Value::Ternary(*t),
            Value::Null => Value::Ternary(Ternary::Unknown),
            Value::Boolean(b) => Value::Ternary(Ternary::from_bool(*b)),
            Value::Integer(0) => Value::Ternary(Ternary::False),
            Value::Integer(1) => Value::Ternary(Ternary::True),
            Value::String(s) => match Ternary::parse(s.trim()) {
                Some(t) => Value::Ternary(t),
                None => Value::Null,
            },
            _ => Value::Null,
        }
    }

    /// Parse into a datetime, trying `formats` first, then RFC 3339 and the
    /// built-in layouts.
    pub fn to_datetime(&self, formats: &[String]) -> Value {
        match self {
            Value::Datetime(d) => Value::Datetime(*d),
            Value::String(s) => {
                let t = s.trim();
                for layout in formats.iter().map(String::as_str).chain(
                    std::iter::once("__rfc3339__").chain(DEFAULT_DATETIME_LAYOUTS.iter().copied()),
                ) {
                    if layout == "__rfc3339__" {
                        if let Ok(d) = DateTime::parse_from_rfc3339(t) {
                            return Value::Datetime(d);
                        }
                        continue;
                    }
                    if let Ok(d) = DateTime::parse_from_str(t, layout) {
                        return Value::Datetime(d);
                    }
                    if let Ok(n) = NaiveDateTime::parse_from_str(t, layout) {
                        return Value::Datetime(naive_to_fixed(n));
                    }
                    if let Ok(d) = NaiveDate::parse_from_str(t, layout) {
                        if let Some(n) = d.and_hms_opt(0, 0, 0) {
                            return Value::Datetime(naive_to_fixed(n));
                        }
                    }
                }
                Value::Null
            }
            _ => Value::Null,
        }
    }

    /// Render for humans: PRINT output and log lines.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Ternary(t) => t.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::Datetime(d) => d.to_rfc3339(),
        }
    }

    /// Render for file encoding: `None` encodes as an empty (null) field.
    /// NULL and UNKNOWN both have no textual representation.
    pub fn to_field(&self) -> Option<String> {
        match self {
            Value::Null | Value::Ternary(Ternary::Unknown) => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Ternary(Ternary::True) => Some("true".to_string()),
            Value::Ternary(Ternary::False) => Some("false".to_string()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::String(s) => Some(s.clone()),
            Value::Datetime(d) => Some(d.to_rfc3339()),
        }
    }
}

fn naive_to_fixed(n: NaiveDateTime) -> DateTime<FixedOffset> {
    match Utc.from_local_datetime(&n).single() {
        Some(d) => d.fixed_offset(),
        None => Utc.from_utc_datetime(&n).fixed_offset(),
    }
}

/// Shortest float rendering that still round-trips integral values with a
/// visible fraction part stripped.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

// ── Arithmetic ──────────────────────────────────────────────────────────

/// Binary arithmetic following the widening rule: integer op integer stays
/// integral (checked, overflow yields Null), everything else runs in float.
/// Division is always float. Non-numeric or NULL operands yield Null.
pub fn arithmetic(op: char, a: &Value, b: &Value) -> Value {
    if op != '/' {
        if let (Value::Integer(x), Value::Integer(y)) = (a.to_integer(), b.to_integer()) {
            let r = match op {
                '+' => x.checked_add(y),
                '-' => x.checked_sub(y),
                '*' => x.checked_mul(y),
                '%' => {
                    if y == 0 {
                        None
                    } else {
                        x.checked_rem(y)
                    }
                }
                _ => None,
            };
            return match r {
                Some(n) => Value::Integer(n),
                None => Value::Null,
            };
        }
    }
    match (a.to_float(), b.to_float()) {
        (Value::Float(x), Value::Float(y)) => {
            let r = match op {
                '+' => x + y,
                '-' => x - y,
                '*' => x * y,
                '/' => x / y,
                '%' => x % y,
                _ => f64::NAN,
            };
            if r.is_finite() {
                Value::Float(r)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

/// Unary minus.
pub fn negate(v: &Value) -> Value {
    match v {
        Value::Integer(n) => n.checked_neg().map(Value::Integer).unwrap_or(Value::Null),
        Value::Float(f) => Value::Float(-f),
        _ => match v.to_float() {
            Value::Float(f) => Value::Float(-f),
            _ => Value::Null,
        },
    }
}

// ── Comparison ──────────────────────────────────────────────────────────

/// Order two values if they are comparable: numerics first, then datetimes,
/// then strings (case per `ignore_case`). NULL and logical values have no
/// order.
pub fn compare(a: &Value, b: &Value, ignore_case: bool) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Value::Float(x), Value::Float(y)) = (a.to_float(), b.to_float()) {
        return x.partial_cmp(&y);
    }
    match (datetime_of(a), datetime_of(b)) {
        (Some(x), Some(y)) => return Some(x.cmp(&y)),
        _ => {}
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            if ignore_case {
                Some(x.to_lowercase().cmp(&y.to_lowercase()))
            } else {
                Some(x.cmp(y))
            }
        }
        _ => None,
    }
}

fn datetime_of(v: &Value) -> Option<DateTime<FixedOffset>> {
    match v {
        Value::Datetime(d) => Some(*d),
        Value::String(_) => match v.to_datetime(&[]) {
            Value::Datetime(d) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

/// Three-valued equality. Logical values compare as ternaries; everything
/// else goes through [`compare`].
pub fn equal(a: &Value, b: &Value, ignore_case: bool) -> Ternary {
    if a.is_null() || b.is_null() {
        return Ternary::Unknown;
    }
    if matches!(a, Value::Boolean(_) | Value::Ternary(_))
        || matches!(b, Value::Boolean(_) | Value::Ternary(_))
    {
        return match (a.to_ternary(), b.to_ternary()) {
            (Value::Ternary(x), Value::Ternary(y)) => Ternary::from_bool(x == y),
            _ => Ternary::Unknown,
        };
    }
    Ternary::from_option(compare(a, b, ignore_case).map(|o| o == Ordering::Equal))
}

/// Relational comparison for the SQL operators `= <> < <= > >=`.
pub fn relational(op: &str, a: &Value, b: &Value, ignore_case: bool) -> Ternary {
    match op {
        "=" => equal(a, b, ignore_case),
        "<>" | "!=" => equal(a, b, ignore_case).not(),
        _ => {
            let ord = match compare(a, b, ignore_case) {
                Some(o) => o,
                None => return Ternary::Unknown,
            };
            let ok = match op {
                "<" => ord == Ordering::Less,
                "<=" => ord != Ordering::Greater,
                ">" => ord == Ordering::Greater,
                ">=" => ord != Ordering::Less,
                _ => return Ternary::Unknown,
            };
            Ternary::from_bool(ok)
        }
    }
}

/// Strict identity (`==`): type and value must both match. Two NULLs are
/// identical.
pub fn identical(a: &Value, b: &Value) -> Ternary {
    let same = match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Ternary(x), Value::Ternary(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Datetime(x), Value::Datetime(y)) => x == y,
        _ => false,
    };
    Ternary::from_bool(same)
}

// ── Comparison keys ─────────────────────────────────────────────────────

/// Serialize one value into its comparison-key form. Numeric strings
/// canonicalize to numbers, strings fold case, UNKNOWN folds to NULL.
pub fn comparison_key(v: &Value) -> String {
    match v {
        Value::Null | Value::Ternary(Ternary::Unknown) => KEY_NULL.to_string(),
        Value::Boolean(b) => format!("[B]{b}"),
        Value::Ternary(t) => format!("[B]{}", t.is_true()),
        Value::Integer(n) => format!("[I]{n}"),
        Value::Float(f) => float_key(*f),
        Value::Datetime(d) => format!(
            "[D]{}",
            d.timestamp_nanos_opt().unwrap_or_else(|| d.timestamp())
        ),
        Value::String(s) => {
            let t = s.trim();
            if let Ok(n) = t.parse::<i64>() {
                format!("[I]{n}")
            } else if let Ok(f) = t.parse::<f64>() {
                if f.is_finite() {
                    float_key(f)
                } else {
                    format!("[S]{}", t.to_lowercase())
                }
            } else {
                format!("[S]{}", t.to_lowercase())
            }
        }
    }
}

fn float_key(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("[I]{}", f as i64)
    } else {
        format!("[F]{f}")
    }
}

/// Serialize a tuple of values into one composite key string.
pub fn composite_key(values: &[Value]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if 0 < i {
            out.push(KEY_SEPARATOR);
        }
        out.push_str(&comparison_key(v));
    }
    out
}

/// 64-bit hash of a tuple's composite key. Deterministic across processes.
pub fn hash_key(values: &[Value]) -> u64 {
    xxh64::xxh64(composite_key(values).as_bytes(), HASH_SEED)
}
