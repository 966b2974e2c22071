//! Join operators: CROSS, INNER, and OUTER, with USING and NATURAL column
//! collapsing.
//!
//! All joins are nested loops probing in left-major order, so the result
//! order is deterministic: matches appear in the order of the left rows,
//! and unmatched right rows of RIGHT/FULL joins are appended afterwards.
//! USING and NATURAL compute join columns that are collapsed into a single
//! output column placed first and flagged `is_join_column`.

use crate::error::FlatqError;
use crate::eval::{Scope, evaluate_predicate, requires_sequential};
use crate::parallel::map_indexed;
use crate::record::{Cell, Header, HeaderField, Record, ident_eq};
use crate::sql::ast::{Expr, JoinCondition, JoinType};
use crate::value::{self, Value};
use crate::view::View;

/// Cartesian product, left-major.
pub fn cross_join(left: View, right: View) -> View {
    let header = Header::merge(&left.header, &right.header);
    let mut records = Vec::with_capacity(left.records.len() * right.records.len().max(1));
    for l in &left.records {
        for r in &right.records {
            let mut cells = l.cells().to_vec();
            cells.extend(r.cells().iter().cloned());
            records.push(Record::new(cells));
        }
    }
    View {
        header,
        records,
        ..View::default()
    }
}

/// Join two views under a join type and condition.
pub fn join(
    scope: &Scope<'_>,
    left: View,
    right: View,
    join_type: JoinType,
    condition: Option<&JoinCondition>,
) -> Result<View, FlatqError> {
    if join_type == JoinType::Cross {
        return Ok(cross_join(left, right));
    }

    // Collapsed column pairs for USING and NATURAL.
    let pairs: Vec<(usize, usize)> = match condition {
        Some(JoinCondition::Using(columns)) => {
            let mut pairs = Vec::with_capacity(columns.len());
            for col in columns {
                let l = left.header.contains(None, col)?;
                let r = right.header.contains(None, col)?;
                pairs.push((l, r));
            }
            pairs
        }
        Some(JoinCondition::Natural) => {
            let mut pairs = Vec::new();
            for (l, lf) in left.header.fields().iter().enumerate() {
                if ident_eq(&lf.column, crate::record::INTERNAL_ID_COLUMN) {
                    continue;
                }
                if let Ok(r) = right.header.contains(None, &lf.column) {
                    pairs.push((l, r));
                }
            }
            pairs
        }
        _ => Vec::new(),
    };
    let on_condition = match condition {
        Some(JoinCondition::On(expr)) => Some(expr),
        _ => None,
    };

    let merged_header = Header::merge(&left.header, &right.header);
    let left_width = left.header.len();
    let right_width = right.header.len();
    let ignore_case = scope.session.flags().ignore_case;

    // Probe left-major; each worker reports its matched rows and which
    // right rows it matched.
    struct Probe {
        rows: Vec<Record>,
        right_matched: Vec<bool>,
    }
    let probes = {
        let pool = scope.session.pool();
        let left_ref = &left;
        let right_ref = &right;
        let header_ref = &merged_header;
        let pairs_ref = &pairs;
        let sequential = on_condition
            .map(|c| requires_sequential(c, scope.session))
            .unwrap_or(false);
        map_indexed(
            &pool,
            &scope.session.cancel,
            left_ref.records.len(),
            sequential,
            |li| {
                let lrec = &left_ref.records[li];
                let mut rows = Vec::new();
                let mut right_matched = vec![false; right_ref.records.len()];
                let mut any = false;
                for (ri, rrec) in right_ref.records.iter().enumerate() {
                    let hit = if let Some(expr) = on_condition {
                        let mut cells = lrec.cells().to_vec();
                        cells.extend(rrec.cells().iter().cloned());
                        let probe_view = View {
                            header: header_ref.clone(),
                            records: vec![Record::new(cells)],
                            ..View::default()
                        };
                        let probe_scope = scope.with_record(&probe_view, 0);
                        evaluate_predicate(expr, &probe_scope, None)?.is_true()
                    } else if pairs_ref.is_empty() {
                        true
                    } else {
                        pairs_ref.iter().all(|(l, r)| {
                            value::equal(lrec.value(*l), rrec.value(*r), ignore_case).is_true()
                        })
                    };
                    if hit {
                        any = true;
                        right_matched[ri] = true;
                        let mut cells = lrec.cells().to_vec();
                        cells.extend(rrec.cells().iter().cloned());
                        rows.push(Record::new(cells));
                    }
                }
                if !any && matches!(join_type, JoinType::LeftOuter | JoinType::FullOuter) {
                    let mut cells = lrec.cells().to_vec();
                    cells.extend(std::iter::repeat_n(Cell::single(Value::Null), right_width));
                    rows.push(Record::new(cells));
                }
                Ok(Probe {
                    rows,
                    right_matched,
                })
            },
        )?
    };

    let mut records = Vec::new();
    let mut right_matched = vec![false; right.records.len()];
    for probe in probes {
        records.extend(probe.rows);
        for (i, m) in probe.right_matched.into_iter().enumerate() {
            right_matched[i] |= m;
        }
    }
    if matches!(join_type, JoinType::RightOuter | JoinType::FullOuter) {
        for (ri, rrec) in right.records.iter().enumerate() {
            if !right_matched[ri] {
                let mut cells: Vec<Cell> = std::iter::repeat_n(Cell::single(Value::Null), left_width).collect();
                cells.extend(rrec.cells().iter().cloned());
                records.push(Record::new(cells));
            }
        }
    }

    let mut view = View {
        header: merged_header,
        records,
        ..View::default()
    };
    if !pairs.is_empty() {
        collapse_join_columns(&mut view, &pairs, left_width);
    }
    Ok(view)
}

/// Rebuild a USING/NATURAL result: one column per join pair placed first,
/// remaining left then right columns after it.
fn collapse_join_columns(view: &mut View, pairs: &[(usize, usize)], left_width: usize) {
    let left_cols: Vec<usize> = pairs.iter().map(|(l, _)| *l).collect();
    let right_cols: Vec<usize> = pairs.iter().map(|(_, r)| left_width + r).collect();

    let mut fields: Vec<HeaderField> = Vec::with_capacity(view.header.len() - pairs.len());
    for &l in &left_cols {
        let mut f = HeaderField::new(None, &view.header.field(l).column);
        f.is_from_table = true;
        f.is_join_column = true;
        fields.push(f);
    }
    let mut keep: Vec<usize> = Vec::new();
    for i in 0..view.header.len() {
        if !left_cols.contains(&i) && !right_cols.contains(&i) {
            keep.push(i);
            fields.push(view.header.field(i).clone());
        }
    }
    for (i, f) in fields.iter_mut().enumerate() {
        f.number = i + 1;
    }

    for record in &mut view.records {
        let mut cells: Vec<Cell> = Vec::with_capacity(fields.len());
        for (&l, &r) in left_cols.iter().zip(right_cols.iter()) {
            // The left value carries the collapsed column; unmatched right
            // rows padded the left side with NULL, so fall back.
            if record.value(l).is_null() {
                cells.push(record.cell(r).clone());
            } else {
                cells.push(record.cell(l).clone());
            }
        }
        for &i in &keep {
            cells.push(record.cell(i).clone());
        }
        *record = Record::new(cells);
    }
    view.header = Header::from_fields(fields);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::format::DecodedTable;
    use crate::session::Session;

    fn make(name: &str, columns: &[&str], rows: &[&[i64]]) -> View {
        let decoded = DecodedTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|n| Value::Integer(*n)).collect())
                .collect(),
        };
        View::from_decoded(decoded, Some(name), None).unwrap()
    }

    fn on_eq(l: &str, r: &str) -> JoinCondition {
        let split = |s: &str| {
            let (v, c) = s.split_once('.').unwrap();
            Expr::FieldRef {
                view: Some(v.to_string()),
                column: c.to_string(),
            }
        };
        JoinCondition::On(Expr::Comparison {
            op: "=".into(),
            left: Box::new(split(l)),
            right: Box::new(split(r)),
        })
    }

    #[test]
    fn cross_is_cartesian_left_major() {
        let l = make("l", &["a"], &[&[1], &[2]]);
        let r = make("r", &["b"], &[&[10], &[20]]);
        let v = cross_join(l, r);
        assert_eq!(v.records.len(), 4);
        assert_eq!(v.header.len(), 2);
        assert_eq!(v.records[0].value(0), &Value::Integer(1));
        assert_eq!(v.records[0].value(1), &Value::Integer(10));
        assert_eq!(v.records[1].value(1), &Value::Integer(20));
        assert_eq!(v.records[2].value(0), &Value::Integer(2));
    }

    #[test]
    fn inner_join_filters_by_condition() {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        let l = make("l", &["id", "a"], &[&[1, 10], &[2, 20], &[3, 30]]);
        let r = make("r", &["id", "b"], &[&[2, 200], &[3, 300], &[3, 301]]);
        let v = join(&scope, l, r, JoinType::Inner, Some(&on_eq("l.id", "r.id"))).unwrap();
        assert_eq!(v.records.len(), 3);
        assert_eq!(v.records[0].value(0), &Value::Integer(2));
        assert_eq!(v.records[1].value(3), &Value::Integer(300));
        assert_eq!(v.records[2].value(3), &Value::Integer(301));
    }

    #[test]
    fn left_join_pads_unmatched() {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        let l = make("l", &["id"], &[&[1], &[2]]);
        let r = make("r", &["id", "b"], &[&[2, 200]]);
        let v = join(
            &scope,
            l,
            r,
            JoinType::LeftOuter,
            Some(&on_eq("l.id", "r.id")),
        )
        .unwrap();
        assert_eq!(v.records.len(), 2);
        assert_eq!(v.records[0].value(0), &Value::Integer(1));
        assert_eq!(v.records[0].value(1), &Value::Null);
        assert_eq!(v.records[0].value(2), &Value::Null);
        assert_eq!(v.records[1].value(2), &Value::Integer(200));
    }

    #[test]
    fn full_join_preserves_both_sides() {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        let l = make("l", &["id"], &[&[1], &[2]]);
        let r = make("r", &["id"], &[&[2], &[3]]);
        let v = join(
            &scope,
            l,
            r,
            JoinType::FullOuter,
            Some(&on_eq("l.id", "r.id")),
        )
        .unwrap();
        assert_eq!(v.records.len(), 3);
        // Unmatched right row is appended last with a padded left side.
        assert_eq!(v.records[2].value(0), &Value::Null);
        assert_eq!(v.records[2].value(1), &Value::Integer(3));
    }

    #[test]
    fn using_collapses_the_join_column() {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        let l = make("l", &["id", "a"], &[&[1, 10], &[2, 20]]);
        let r = make("r", &["id", "b"], &[&[2, 200]]);
        let v = join(
            &scope,
            l,
            r,
            JoinType::Inner,
            Some(&JoinCondition::Using(vec!["id".to_string()])),
        )
        .unwrap();
        assert_eq!(v.header.len(), 3);
        assert_eq!(v.header.field(0).column, "id");
        assert!(v.header.field(0).is_join_column);
        assert_eq!(v.header.field(1).column, "a");
        assert_eq!(v.header.field(2).column, "b");
        assert_eq!(v.records.len(), 1);
        assert_eq!(v.records[0].value(0), &Value::Integer(2));
    }

    #[test]
    fn natural_full_join_coalesces_keys() {
        let session = Session::new(SessionFlags::default()).unwrap();
        let scope = Scope::root(&session);
        let l = make("l", &["id", "a"], &[&[1, 10]]);
        let r = make("r", &["id", "b"], &[&[2, 200]]);
        let v = join(
            &scope,
            l,
            r,
            JoinType::FullOuter,
            Some(&JoinCondition::Natural),
        )
        .unwrap();
        assert_eq!(v.records.len(), 2);
        assert_eq!(v.records[0].value(0), &Value::Integer(1));
        assert_eq!(v.records[1].value(0), &Value::Integer(2));
        assert_eq!(v.records[1].value(1), &Value::Null);
        assert_eq!(v.records[1].value(2), &Value::Integer(200));
    }
}
