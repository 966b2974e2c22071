//! Sort keys for ORDER BY and analytic partitions.
//!
//! A [`SortKey`] is the comparable form of one value: numerics (including
//! numeric strings) order together, then datetimes, strings, and logicals.
//! NULL ordering is decided per ORDER item by its null position, which the
//! parser defaults to FIRST for ascending and LAST for descending items.

use std::cmp::Ordering;

use crate::value::{Ternary, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Null,
    Number(f64),
    Datetime(i64),
    String(String),
    Bool(bool),
}

impl SortKey {
    pub fn of(v: &Value, ignore_case: bool) -> SortKey {
        match v {
            Value::Null | Value::Ternary(Ternary::Unknown) => SortKey::Null,
            Value::Boolean(b) => SortKey::Bool(*b),
            Value::Ternary(t) => SortKey::Bool(t.is_true()),
            Value::Integer(n) => SortKey::Number(*n as f64),
            Value::Float(f) => SortKey::Number(*f),
            Value::Datetime(d) => {
                SortKey::Datetime(d.timestamp_nanos_opt().unwrap_or_else(|| d.timestamp()))
            }
            Value::String(s) => {
                let t = s.trim();
                if let Ok(f) = t.parse::<f64>() {
                    if f.is_finite() {
                        return SortKey::Number(f);
                    }
                }
                if ignore_case {
                    SortKey::String(t.to_lowercase())
                } else {
                    SortKey::String(t.to_string())
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SortKey::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Null => 0,
            SortKey::Number(_) => 1,
            SortKey::Datetime(_) => 2,
            SortKey::String(_) => 3,
            SortKey::Bool(_) => 4,
        }
    }

    /// Total order among non-null keys; mixed types order by type rank.
    pub fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortKey::Datetime(a), SortKey::Datetime(b)) => a.cmp(b),
            (SortKey::String(a), SortKey::String(b)) => a.cmp(b),
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Numeric reading, for RANGE frames with offsets.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SortKey::Number(f) => Some(*f),
            _ => None,
        }
    }
}

/// Per-item sort direction and null placement.
#[derive(Debug, Clone, Copy)]
pub struct SortDirection {
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortDirection {
    /// Resolve the parser's optional null position against the default:
    /// NULLS FIRST for ascending, NULLS LAST for descending.
    pub fn new(ascending: bool, nulls_first: Option<bool>) -> SortDirection {
        SortDirection {
            ascending,
            nulls_first: nulls_first.unwrap_or(ascending),
        }
    }
}

/// Compare two key vectors under per-item directions. Null placement is
/// independent of direction.
pub fn compare_key_vectors(
    a: &[SortKey],
    b: &[SortKey],
    directions: &[SortDirection],
) -> Ordering {
    for (i, dir) in directions.iter().enumerate() {
        let (ka, kb) = (&a[i], &b[i]);
        let ord = match (ka.is_null(), kb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                if dir.nulls_first {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, true) => {
                if dir.nulls_first {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, false) => {
                let ord = ka.compare(kb);
                if dir.ascending { ord } else { ord.reverse() }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Tie equality for LIMIT WITH TIES and rank peers.
pub fn keys_equal(a: &[SortKey], b: &[SortKey]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x.is_null() && y.is_null()) || x.compare(y) == Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_sort_as_numbers() {
        let a = SortKey::of(&Value::String("10".into()), false);
        let b = SortKey::of(&Value::Integer(9), false);
        assert_eq!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn null_placement_is_direction_independent() {
        let dirs = [SortDirection::new(true, None)];
        // ASC defaults to NULLS FIRST.
        assert_eq!(
            compare_key_vectors(&[SortKey::Null], &[SortKey::Number(1.0)], &dirs),
            Ordering::Less
        );
        let dirs = [SortDirection::new(false, None)];
        // DESC defaults to NULLS LAST.
        assert_eq!(
            compare_key_vectors(&[SortKey::Null], &[SortKey::Number(1.0)], &dirs),
            Ordering::Greater
        );
        let dirs = [SortDirection::new(false, Some(true))];
        assert_eq!(
            compare_key_vectors(&[SortKey::Null], &[SortKey::Number(1.0)], &dirs),
            Ordering::Less
        );
    }

    #[test]
    fn descending_reverses_values_only() {
        let dirs = [SortDirection::new(false, None)];
        assert_eq!(
            compare_key_vectors(&[SortKey::Number(1.0)], &[SortKey::Number(2.0)], &dirs),
            Ordering::Greater
        );
    }

    #[test]
    fn tie_equality() {
        assert!(keys_equal(
            &[SortKey::Number(1.0), SortKey::Null],
            &[SortKey::Number(1.0), SortKey::Null]
        ));
        assert!(!keys_equal(&[SortKey::Number(1.0)], &[SortKey::Number(2.0)]));
    }

    #[test]
    fn case_folding_in_keys() {
        let a = SortKey::of(&Value::String("Abc".into()), true);
        let b = SortKey::of(&Value::String("abc".into()), true);
        assert_eq!(a.compare(&b), Ordering::Equal);
    }
}
