//! Analytic (window) functions.
//!
//! A call partitions the view's records by the PARTITION BY key tuple,
//! optionally orders rows inside each partition, optionally restricts each
//! row's visible slice with a ROWS or RANGE frame, and computes one value
//! per record. Results land in appended scratch cells; record order of the
//! view itself is never changed here.

use indexmap::IndexMap;

use crate::error::FlatqError;
use crate::eval::{AGGREGATE_NAMES, Scope, aggregate, evaluate};
use crate::sql::ast::{Expr, FrameBound, FrameUnit, OrderItem, WindowFrame};
use crate::value::{self, Value};
use crate::view::View;
use crate::view::sort::{SortDirection, SortKey, compare_key_vectors, keys_equal};

/// Ranking functions that take no argument.
const RANKING: &[&str] = &[
    "ROW_NUMBER",
    "RANK",
    "DENSE_RANK",
    "CUME_DIST",
    "PERCENT_RANK",
];

/// Compute one analytic call over every record of `view`. The result vector
/// is indexed like `view.records`.
#[allow(clippy::too_many_arguments)]
pub fn compute(
    view: &View,
    scope: &Scope<'_>,
    name: &str,
    args: &[Expr],
    distinct: bool,
    partition: &[Expr],
    order: &[OrderItem],
    frame: Option<&WindowFrame>,
) -> Result<Vec<Value>, FlatqError> {
    let upper = name.to_uppercase();
    let n = view.records.len();
    let ignore_case = scope.session.flags().ignore_case;

    // Partition buckets in first-seen order.
    let mut partitions: IndexMap<u64, Vec<usize>, ahash::RandomState> = IndexMap::default();
    for i in 0..n {
        scope.session.cancel.check()?;
        let key = if partition.is_empty() {
            0
        } else {
            let rec_scope = scope.with_record(view, i);
            let mut keys = Vec::with_capacity(partition.len());
            for expr in partition {
                keys.push(evaluate(expr, &rec_scope, None)?);
            }
            value::hash_key(&keys)
        };
        partitions.entry(key).or_default().push(i);
    }

    // Per-record order keys, shared by ordering, peers, and RANGE frames.
    let directions: Vec<SortDirection> = order
        .iter()
        .map(|item| SortDirection::new(item.ascending, item.nulls_first))
        .collect();
    let mut order_keys: Vec<Vec<SortKey>> = Vec::new();
    if !order.is_empty() {
        order_keys.reserve(n);
        for i in 0..n {
            let rec_scope = scope.with_record(view, i);
            let mut keys = Vec::with_capacity(order.len());
            for item in order {
                let v = evaluate(&item.expr, &rec_scope, None)?;
                keys.push(SortKey::of(&v, ignore_case));
            }
            order_keys.push(keys);
        }
    }

    // Argument values per record, for value-carrying functions.
    let needs_arg = !RANKING.contains(&upper.as_str()) && upper != "NTILE";
    let arg_is_star = matches!(args.first(), Some(Expr::Star { .. }));
    let mut arg_values: Vec<Value> = Vec::new();
    if needs_arg && !arg_is_star {
        let arg = args.first().ok_or_else(|| FlatqError::FunctionArgumentLength {
            name: upper.clone(),
            expect: "at least 1 argument".to_string(),
            actual: 0,
        })?;
        arg_values.reserve(n);
        for i in 0..n {
            let rec_scope = scope.with_record(view, i);
            arg_values.push(evaluate(arg, &rec_scope, None)?);
        }
    }

    // Scalar extras (offsets, defaults, separators) evaluated once.
    let extras = eval_extras(&upper, args, view, scope)?;

    let mut out = vec![Value::Null; n];
    for indices in partitions.values() {
        let mut ordered = indices.clone();
        if !order.is_empty() {
            ordered.sort_by(|a, b| {
                compare_key_vectors(&order_keys[*a], &order_keys[*b], &directions)
            });
        }
        compute_partition(
            &upper,
            &ordered,
            &order_keys,
            order,
            frame,
            &arg_values,
            arg_is_star,
            distinct,
            ignore_case,
            &extras,
            scope,
            &mut out,
        )?;
    }
    Ok(out)
}

/// Pre-evaluated scalar arguments beyond the first.
struct Extras {
    offset: i64,
    default: Value,
    nth: i64,
    separator: String,
}

fn eval_extras(
    name: &str,
    args: &[Expr],
    view: &View,
    scope: &Scope<'_>,
) -> Result<Extras, FlatqError> {
    let mut extras = Extras {
        offset: 1,
        default: Value::Null,
        nth: 1,
        separator: String::new(),
    };
    let eval_const = |expr: &Expr| -> Result<Value, FlatqError> {
        if view.records.is_empty() {
            return Ok(Value::Null);
        }
        let rec_scope = scope.with_record(view, 0);
        evaluate(expr, &rec_scope, None)
    };
    match name {
        "LAG" | "LEAD" => {
            if let Some(expr) = args.get(1) {
                extras.offset = match eval_const(expr)?.to_integer() {
                    Value::Integer(o) => o,
                    _ => {
                        return Err(FlatqError::InvalidValue(
                            "the offset of LAG/LEAD must be an integer".into(),
                        ));
                    }
                };
            }
            if let Some(expr) = args.get(2) {
                extras.default = eval_const(expr)?;
            }
        }
        "NTH_VALUE" => {
            let expr = args.get(1).ok_or_else(|| FlatqError::FunctionArgumentLength {
                name: name.to_string(),
                expect: "2 arguments".to_string(),
                actual: args.len(),
            })?;
            extras.nth = match eval_const(expr)?.to_integer() {
                Value::Integer(o) if o > 0 => o,
                _ => {
                    return Err(FlatqError::InvalidValue(
                        "the position of NTH_VALUE must be a positive integer".into(),
                    ));
                }
            };
        }
        "NTILE" => {
            let expr = args.first().ok_or_else(|| FlatqError::FunctionArgumentLength {
                name: name.to_string(),
                expect: "1 argument".to_string(),
                actual: 0,
            })?;
            extras.nth = match eval_const(expr)?.to_integer() {
                Value::Integer(o) if o > 0 => o,
                _ => {
                    return Err(FlatqError::InvalidValue(
                        "the argument of NTILE must be a positive integer".into(),
                    ));
                }
            };
        }
        "LISTAGG" => {
            if let Some(expr) = args.get(1) {
                extras.separator = match eval_const(expr)? {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_display_string(),
                };
            }
        }
        _ => {}
    }
    Ok(extras)
}

#[allow(clippy::too_many_arguments)]
fn compute_partition(
    name: &str,
    ordered: &[usize],
    order_keys: &[Vec<SortKey>],
    order: &[OrderItem],
    frame: Option<&WindowFrame>,
    arg_values: &[Value],
    arg_is_star: bool,
    distinct: bool,
    ignore_case: bool,
    extras: &Extras,
    scope: &Scope<'_>,
    out: &mut [Value],
) -> Result<(), FlatqError> {
    let len = ordered.len();
    let has_order = !order.is_empty();

    let peers_equal = |a: usize, b: usize| -> bool {
        !has_order || keys_equal(&order_keys[ordered[a]], &order_keys[ordered[b]])
    };

    match name {
        "ROW_NUMBER" => {
            for (pos, &rec) in ordered.iter().enumerate() {
                out[rec] = Value::Integer(pos as i64 + 1);
            }
            return Ok(());
        }
        "RANK" | "DENSE_RANK" | "CUME_DIST" | "PERCENT_RANK" => {
            let mut run_start = 0;
            let mut dense = 0;
            for pos in 0..len {
                if pos > 0 && !peers_equal(pos, run_start) {
                    run_start = pos;
                }
                if pos == run_start {
                    dense += 1;
                }
                // End of the current peer run, for CUME_DIST.
                let mut run_end = pos;
                while run_end + 1 < len && peers_equal(run_end + 1, run_start) {
                    run_end += 1;
                }
                let rec = ordered[pos];
                out[rec] = match name {
                    "RANK" => Value::Integer(run_start as i64 + 1),
                    "DENSE_RANK" => Value::Integer(dense),
                    "CUME_DIST" => Value::Float((run_end + 1) as f64 / len as f64),
                    _ => {
                        if len < 2 {
                            Value::Float(0.0)
                        } else {
                            Value::Float(run_start as f64 / (len - 1) as f64)
                        }
                    }
                };
            }
            return Ok(());
        }
        "NTILE" => {
            let k = extras.nth as usize;
            let base = len / k;
            let rem = len % k;
            let mut pos = 0;
            for bucket in 0..k {
                let size = base + usize::from(bucket < rem);
                for _ in 0..size {
                    if pos >= len {
                        break;
                    }
                    out[ordered[pos]] = Value::Integer(bucket as i64 + 1);
                    pos += 1;
                }
            }
            return Ok(());
        }
        "LAG" | "LEAD" => {
            for (pos, &rec) in ordered.iter().enumerate() {
                let target = if name == "LAG" {
                    pos as i64 - extras.offset
                } else {
                    pos as i64 + extras.offset
                };
                out[rec] = if 0 <= target && (target as usize) < len {
                    arg_values[ordered[target as usize]].clone()
                } else {
                    extras.default.clone()
                };
            }
            return Ok(());
        }
        _ => {}
    }

    // Frame-based functions.
    for pos in 0..len {
        let (start, end) = frame_bounds(pos, len, frame, has_order, &peers_equal, |p| {
            order_keys
                .get(ordered[p])
                .and_then(|k| k.first())
                .and_then(SortKey::as_number)
        })?;
        let rec = ordered[pos];
        let slice: Vec<usize> = ordered[start..=end].to_vec();
        out[rec] = match name {
            "FIRST_VALUE" => slice
                .first()
                .map(|&r| arg_values[r].clone())
                .unwrap_or(Value::Null),
            "LAST_VALUE" => slice
                .last()
                .map(|&r| arg_values[r].clone())
                .unwrap_or(Value::Null),
            "NTH_VALUE" => slice
                .get(extras.nth as usize - 1)
                .map(|&r| arg_values[r].clone())
                .unwrap_or(Value::Null),
            _ => {
                // An aggregate applied analytically over the framed slice.
                let mut values: Vec<Value> = if arg_is_star {
                    slice.iter().map(|_| Value::Integer(1)).collect()
                } else {
                    slice.iter().map(|&r| arg_values[r].clone()).collect()
                };
                if distinct {
                    let mut seen = indexmap::IndexSet::new();
                    values.retain(|v| seen.insert(value::comparison_key(v)));
                }
                if AGGREGATE_NAMES.contains(&name) {
                    if name == "COUNT" && arg_is_star {
                        Value::Integer(values.len() as i64)
                    } else {
                        aggregate::apply(name, values, &extras.separator, ignore_case)?
                    }
                } else {
                    let decl = scope
                        .session
                        .functions
                        .lock()
                        .expect("functions lock")
                        .lookup(name);
                    match decl {
                        Some(decl) if decl.cursor_param.is_some() => {
                            crate::driver::call_user_aggregate(
                                scope.session,
                                &decl,
                                values,
                                Vec::new(),
                            )?
                        }
                        _ => return Err(FlatqError::FunctionNotExist(name.to_string())),
                    }
                }
            }
        };
    }
    Ok(())
}

/// Inclusive frame bounds within a partition of `len` ordered rows.
fn frame_bounds(
    pos: usize,
    len: usize,
    frame: Option<&WindowFrame>,
    has_order: bool,
    peers_equal: &dyn Fn(usize, usize) -> bool,
    numeric_key: impl Fn(usize) -> Option<f64>,
) -> Result<(usize, usize), FlatqError> {
    let last_peer = |p: usize| {
        let mut e = p;
        while e + 1 < len && peers_equal(e + 1, p) {
            e += 1;
        }
        e
    };
    let first_peer = |p: usize| {
        let mut s = p;
        while s > 0 && peers_equal(s - 1, p) {
            s -= 1;
        }
        s
    };

    let Some(frame) = frame else {
        // Default: whole partition without ORDER BY, run up to the last
        // peer of the current row with it.
        return Ok(if has_order {
            (0, last_peer(pos))
        } else {
            (0, len.saturating_sub(1))
        });
    };

    let resolve = |bound: &FrameBound, is_start: bool| -> Result<i64, FlatqError> {
        Ok(match (frame.unit, bound) {
            (_, FrameBound::UnboundedPreceding) => 0,
            (_, FrameBound::UnboundedFollowing) => len as i64 - 1,
            (FrameUnit::Rows, FrameBound::CurrentRow) => pos as i64,
            (FrameUnit::Rows, FrameBound::Preceding(k)) => pos as i64 - k,
            (FrameUnit::Rows, FrameBound::Following(k)) => pos as i64 + k,
            (FrameUnit::Range, FrameBound::CurrentRow) => {
                if is_start {
                    first_peer(pos) as i64
                } else {
                    last_peer(pos) as i64
                }
            }
            (FrameUnit::Range, FrameBound::Preceding(k)) | (FrameUnit::Range, FrameBound::Following(k)) => {
                let current = numeric_key(pos).ok_or_else(|| {
                    FlatqError::InvalidValue(
                        "RANGE with an offset requires a single numeric sort key".into(),
                    )
                })?;
                let preceding = matches!(bound, FrameBound::Preceding(_));
                let low = if preceding { current - *k as f64 } else { current + *k as f64 };
                // Scan from the appropriate side for the first row inside
                // the range.
                if is_start {
                    let mut s = pos as i64;
                    while s > 0 {
                        match numeric_key(s as usize - 1) {
                            Some(key) if key >= low.min(current) => s -= 1,
                            _ => break,
                        }
                    }
                    if !preceding {
                        // start FOLLOWING k: first row at or past current+k.
                        let mut s = pos;
                        while s < len {
                            match numeric_key(s) {
                                Some(key) if key < low => s += 1,
                                _ => break,
                            }
                        }
                        return Ok(s as i64);
                    }
                    s
                } else {
                    let mut e = pos as i64;
                    if preceding {
                        // end PRECEDING k: last row at or before current-k.
                        let mut e = pos as i64;
                        while e >= 0 {
                            match numeric_key(e as usize) {
                                Some(key) if key > low => e -= 1,
                                _ => break,
                            }
                        }
                        return Ok(e);
                    }
                    while (e as usize) + 1 < len {
                        match numeric_key(e as usize + 1) {
                            Some(key) if key <= low.max(current) => e += 1,
                            _ => break,
                        }
                    }
                    e
                }
            }
        })
    };

    let start = resolve(&frame.start, true)?.clamp(0, len as i64 - 1);
    let end = resolve(&frame.end, false)?.clamp(-1, len as i64 - 1);
    if end < start {
        // Empty frame: collapse to the current row for value functions;
        // aggregates over it see a single row, matching an empty-safe
        // reading without negative slices.
        return Ok((pos, pos));
    }
    Ok((start as usize, end as usize))
}
