//! The View: the in-memory table every operator runs against.
//!
//! A view is a header, a list of records, and an optional backing
//! [`FileInfo`]. Relational operators run in written order over the same
//! structure: WHERE filters records, GROUP BY folds them into grouped
//! cells, SELECT appends computed scratch columns and fixes the projection
//! plan, ORDER BY sorts with per-record key vectors, OFFSET/LIMIT slice,
//! and `fix` finalizes the projection and clears all scratch state.
//!
//! SELECT and HAVING intercept the evaluator's `NotGrouping` signal: the
//! clause is undone, all rows are folded into a single group, and the
//! clause retries once.

pub mod dml;
pub mod join;
pub mod load;
pub mod sort;

use indexmap::{IndexMap, IndexSet};

use crate::error::FlatqError;
use crate::eval::{Scope, analytic, evaluate, evaluate_predicate, requires_sequential};
use crate::file::FileInfo;
use crate::format::DecodedTable;
use crate::parallel::map_indexed;
use crate::record::{Cell, Header, HeaderField, Record};
use crate::sql::ast::{
    Expr, LimitClause, OrderItem, SelectBody, SelectEntity, SelectField, SelectQuery, SetOperator,
};
use crate::value::{self, Value};
use self::sort::{SortDirection, SortKey, compare_key_vectors, keys_equal};

#[derive(Debug, Clone, Default)]
pub struct View {
    pub header: Header,
    pub records: Vec<Record>,
    pub file_info: Option<FileInfo>,
    /// Projection plan built by the select clause, applied by `fix`.
    pub select_fields: Vec<usize>,
    pub select_labels: Vec<String>,
    pub is_grouped: bool,
    /// Sort keys per record, valid between ORDER BY and fix or LIMIT WITH
    /// TIES.
    pub sort_values: Option<Vec<Vec<SortKey>>>,
}

impl View {
    pub fn empty() -> View {
        View::default()
    }

    /// The synthetic single-row view used when FROM is absent.
    pub fn dual() -> View {
        View {
            records: vec![Record::new(Vec::new())],
            ..View::default()
        }
    }

    /// Build a view from a decoded table.
    pub fn from_decoded(
        decoded: DecodedTable,
        view_name: Option<&str>,
        file_info: Option<FileInfo>,
    ) -> Result<View, FlatqError> {
        let header = Header::from_columns(view_name, &decoded.columns)?;
        let records = decoded.rows.into_iter().map(Record::from_values).collect();
        Ok(View {
            header,
            records,
            file_info,
            ..View::default()
        })
    }

    /// Single-column view over a list of values; backs pseudo-cursors.
    pub fn from_values_column(column: &str, values: Vec<Value>) -> View {
        let header = Header::from_columns(None, &[column.to_string()])
            .expect("a single column cannot be ambiguous");
        View {
            header,
            records: values
                .into_iter()
                .map(|v| Record::from_values(vec![v]))
                .collect(),
            ..View::default()
        }
    }

    /// Prepend the internal-id column, numbering rows 0..n.
    pub fn attach_internal_id(&mut self) {
        let view_name = self
            .header
            .fields()
            .first()
            .and_then(|f| f.view.clone());
        let mut fields = vec![{
            let mut f = HeaderField::new(view_name.as_deref(), crate::record::INTERNAL_ID_COLUMN);
            f.is_from_table = true;
            f
        }];
        fields.extend(self.header.fields().iter().cloned());
        for (i, f) in fields.iter_mut().enumerate() {
            f.number = i + 1;
        }
        self.header = Header::from_fields(fields);
        for (i, record) in self.records.iter_mut().enumerate() {
            let mut cells = vec![Cell::single(Value::Integer(i as i64))];
            cells.extend(record.cells().iter().cloned());
            *record = Record::new(cells);
        }
    }

    /// Remove the internal-id column again.
    pub fn detach_internal_id(&mut self) {
        let Some(pos) = self
            .header
            .fields()
            .iter()
            .position(|f| crate::record::ident_eq(&f.column, crate::record::INTERNAL_ID_COLUMN))
        else {
            return;
        };
        let mut fields = self.header.fields().to_vec();
        fields.remove(pos);
        for (i, f) in fields.iter_mut().enumerate() {
            f.number = i + 1;
        }
        self.header = Header::from_fields(fields);
        for record in &mut self.records {
            let mut cells = record.cells().to_vec();
            cells.remove(pos);
            *record = Record::new(cells);
        }
    }

    // ── WHERE ───────────────────────────────────────────────────────────

    /// Keep rows whose predicate is TRUE; FALSE and UNKNOWN both drop.
    pub fn filter_where(&mut self, scope: &Scope<'_>, condition: &Expr) -> Result<(), FlatqError> {
        let keep = {
            let view: &View = self;
            let pool = scope.session.pool();
            let sequential = requires_sequential(condition, scope.session);
            map_indexed(
                &pool,
                &scope.session.cancel,
                view.records.len(),
                sequential,
                |i| {
                    let rec_scope = scope.with_record(view, i);
                    Ok(evaluate_predicate(condition, &rec_scope, None)?.is_true())
                },
            )?
        };
        let old = std::mem::take(&mut self.records);
        self.records = old
            .into_iter()
            .zip(keep)
            .filter_map(|(r, k)| if k { Some(r) } else { None })
            .collect();
        Ok(())
    }

    // ── GROUP BY ────────────────────────────────────────────────────────

    /// Hash-group rows by the key tuple, first-seen order. Key expressions
    /// that are plain column references mark their fields as group keys.
    pub fn group_by(&mut self, scope: &Scope<'_>, keys: &[Expr]) -> Result<(), FlatqError> {
        for key in keys {
            if let Expr::FieldRef { view, column } = key {
                if let Ok(idx) = self.header.contains(view.as_deref(), column) {
                    self.header.field_mut(idx).is_group_key = true;
                }
            }
        }
        let hashes = {
            let view: &View = self;
            let pool = scope.session.pool();
            let sequential = keys.iter().any(|k| requires_sequential(k, scope.session));
            map_indexed(
                &pool,
                &scope.session.cancel,
                view.records.len(),
                sequential,
                |i| {
                    let rec_scope = scope.with_record(view, i);
                    let mut values = Vec::with_capacity(keys.len());
                    for key in keys {
                        values.push(evaluate(key, &rec_scope, None)?);
                    }
                    Ok(value::hash_key(&values))
                },
            )?
        };
        let mut buckets: IndexMap<u64, Vec<usize>, ahash::RandomState> = IndexMap::default();
        for (i, h) in hashes.into_iter().enumerate() {
            buckets.entry(h).or_default().push(i);
        }
        let old = std::mem::take(&mut self.records);
        let width = self.header.len();
        self.records = buckets
            .values()
            .map(|members| {
                Record::new(
                    (0..width)
                        .map(|j| {
                            Cell::group(members.iter().map(|&i| old[i].value(j).clone()).collect())
                        })
                        .collect(),
                )
            })
            .collect();
        self.is_grouped = true;
        Ok(())
    }

    /// Fold every row into one group. Zero rows still produce one record of
    /// empty groups so aggregates see an empty input.
    pub fn group_all(&mut self) {
        let old = std::mem::take(&mut self.records);
        let width = self.header.len();
        let cells = (0..width)
            .map(|j| Cell::group(old.iter().map(|r| r.value(j).clone()).collect()))
            .collect();
        self.records = vec![Record::new(cells)];
        self.is_grouped = true;
    }

    // ── HAVING ──────────────────────────────────────────────────────────

    pub fn having(&mut self, scope: &Scope<'_>, condition: &Expr) -> Result<(), FlatqError> {
        match self.filter_where(scope, condition) {
            Err(e) if e.is_not_grouping() => {
                self.group_all();
                self.filter_where(scope, condition)
            }
            other => other,
        }
    }

    // ── SELECT ──────────────────────────────────────────────────────────

    /// Evaluate the select list: expand stars, memoize computed columns
    /// into scratch cells, dispatch analytic calls, record the projection
    /// plan, and deduplicate under DISTINCT.
    pub fn select_clause(
        &mut self,
        scope: &Scope<'_>,
        fields: &[SelectField],
        distinct: bool,
    ) -> Result<(), FlatqError> {
        let snapshot = self.clone();
        match self.select_attempt(scope, fields) {
            Err(e) if e.is_not_grouping() => {
                *self = snapshot;
                self.group_all();
                self.select_attempt(scope, fields)?;
            }
            Err(e) => return Err(e),
            Ok(()) => {}
        }
        if distinct {
            self.distinct_records();
        }
        Ok(())
    }

    fn select_attempt(
        &mut self,
        scope: &Scope<'_>,
        fields: &[SelectField],
    ) -> Result<(), FlatqError> {
        self.select_fields.clear();
        self.select_labels.clear();
        for field in fields {
            if let Expr::Star { view } = &field.expr {
                for idx in self.header.visible_indices(view.as_deref()) {
                    if self.is_grouped && !self.header.field(idx).is_group_key {
                        return Err(FlatqError::FieldNotGroupKey(
                            self.header.field(idx).column.clone(),
                        ));
                    }
                    self.select_fields.push(idx);
                    self.select_labels.push(self.header.field(idx).label().to_string());
                }
                continue;
            }
            // A plain reference to an existing column projects it directly.
            let direct = match &field.expr {
                Expr::FieldRef { view, column } => {
                    self.header.contains(view.as_deref(), column).ok()
                }
                Expr::ColumnNumber { view, number } => {
                    self.header.contains_number(view, *number).ok()
                }
                _ => None,
            };
            if let Some(idx) = direct {
                if self.is_grouped && !self.header.field(idx).is_group_key {
                    return Err(FlatqError::FieldNotGroupKey(
                        self.header.field(idx).column.clone(),
                    ));
                }
                if let Some(alias) = &field.alias {
                    self.header.field_mut(idx).aliases.push(alias.clone());
                }
                let label = match &field.alias {
                    Some(a) => a.clone(),
                    None => self.header.field(idx).column.clone(),
                };
                self.select_fields.push(idx);
                self.select_labels.push(label);
                continue;
            }
            // Computed column: rewrite analytic calls into scratch columns
            // first, then evaluate the remaining expression per record.
            let rewritten = self.materialize_analytics(scope, &field.expr)?;
            let values = {
                let view: &View = self;
                let pool = scope.session.pool();
                let sequential = requires_sequential(&rewritten, scope.session);
                map_indexed(
                    &pool,
                    &scope.session.cancel,
                    view.records.len(),
                    sequential,
                    |i| {
                        let rec_scope = scope.with_record(view, i);
                        evaluate(&rewritten, &rec_scope, None)
                    },
                )?
            };
            let column = field.expr.to_string();
            let label = field.alias.clone().unwrap_or_else(|| column.clone());
            let idx = self.append_computed_column(&column, values, field.alias.clone());
            self.select_fields.push(idx);
            self.select_labels.push(label);
        }
        Ok(())
    }

    /// Append a scratch column holding one value per record. Grouped views
    /// mark it as a group key: the value is already per-group scalar.
    fn append_computed_column(
        &mut self,
        column: &str,
        values: Vec<Value>,
        alias: Option<String>,
    ) -> usize {
        let mut field = HeaderField::new(None, column);
        field.is_group_key = self.is_grouped;
        if let Some(alias) = alias {
            field.aliases.push(alias);
        }
        let idx = self.header.append(field);
        for (record, v) in self.records.iter_mut().zip(values) {
            record.push(Cell::single(v));
        }
        idx
    }

    /// Replace every analytic call in `expr` with a reference to a freshly
    /// computed scratch column.
    fn materialize_analytics(
        &mut self,
        scope: &Scope<'_>,
        expr: &Expr,
    ) -> Result<Expr, FlatqError> {
        let rewrite = |view: &mut View, e: &Expr| view.materialize_analytics(scope, e);
        Ok(match expr {
            Expr::Analytic {
                name,
                args,
                distinct,
                partition,
                order,
                frame,
            } => {
                let values = analytic::compute(
                    self,
                    scope,
                    name,
                    args,
                    *distinct,
                    partition,
                    order,
                    frame.as_ref(),
                )?;
                let column = format!("@__analytic_{}", self.header.len() + 1);
                self.append_computed_column(&column, values, None);
                Expr::FieldRef { view: None, column }
            }
            Expr::Minus(e) => Expr::Minus(Box::new(rewrite(self, e)?)),
            Expr::Arithmetic { op, left, right } => Expr::Arithmetic {
                op: *op,
                left: Box::new(rewrite(self, left)?),
                right: Box::new(rewrite(self, right)?),
            },
            Expr::Concat(l, r) => Expr::Concat(
                Box::new(rewrite(self, l)?),
                Box::new(rewrite(self, r)?),
            ),
            Expr::Comparison { op, left, right } => Expr::Comparison {
                op: op.clone(),
                left: Box::new(rewrite(self, left)?),
                right: Box::new(rewrite(self, right)?),
            },
            Expr::Identical { left, right } => Expr::Identical {
                left: Box::new(rewrite(self, left)?),
                right: Box::new(rewrite(self, right)?),
            },
            Expr::And(l, r) => Expr::And(
                Box::new(rewrite(self, l)?),
                Box::new(rewrite(self, r)?),
            ),
            Expr::Or(l, r) => Expr::Or(
                Box::new(rewrite(self, l)?),
                Box::new(rewrite(self, r)?),
            ),
            Expr::Not(e) => Expr::Not(Box::new(rewrite(self, e)?)),
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                let mut rewritten = Vec::with_capacity(args.len());
                for a in args {
                    rewritten.push(rewrite(self, a)?);
                }
                Expr::Function {
                    name: name.clone(),
                    args: rewritten,
                    distinct: *distinct,
                }
            }
            Expr::Case {
                operand,
                branches,
                else_expr,
            } => {
                let operand = match operand {
                    Some(op) => Some(Box::new(rewrite(self, op)?)),
                    None => None,
                };
                let mut new_branches = Vec::with_capacity(branches.len());
                for (c, r) in branches {
                    new_branches.push((rewrite(self, c)?, rewrite(self, r)?));
                }
                let else_expr = match else_expr {
                    Some(e) => Some(Box::new(rewrite(self, e)?)),
                    None => None,
                };
                Expr::Case {
                    operand,
                    branches: new_branches,
                    else_expr,
                }
            }
            other => other.clone(),
        })
    }

    /// Stable first-occurrence deduplication over the projected cells.
    fn distinct_records(&mut self) {
        let mut seen: IndexSet<u64> = IndexSet::new();
        let fields = self.select_fields.clone();
        let old = std::mem::take(&mut self.records);
        self.records = old
            .into_iter()
            .filter(|record| {
                let key: Vec<Value> = fields.iter().map(|&i| record.value(i).clone()).collect();
                seen.insert(value::hash_key(&key))
            })
            .collect();
    }

    // ── ORDER BY ────────────────────────────────────────────────────────

    pub fn order_by(&mut self, scope: &Scope<'_>, items: &[OrderItem]) -> Result<(), FlatqError> {
        let directions: Vec<SortDirection> = items
            .iter()
            .map(|item| SortDirection::new(item.ascending, item.nulls_first))
            .collect();
        let ignore_case = scope.session.flags().ignore_case;
        let keys = {
            let view: &View = self;
            let pool = scope.session.pool();
            let sequential = items
                .iter()
                .any(|item| requires_sequential(&item.expr, scope.session));
            map_indexed(
                &pool,
                &scope.session.cancel,
                view.records.len(),
                sequential,
                |i| {
                    let rec_scope = scope.with_record(view, i);
                    let mut key = Vec::with_capacity(items.len());
                    for item in items {
                        let v = evaluate(&item.expr, &rec_scope, None)?;
                        key.push(SortKey::of(&v, ignore_case));
                    }
                    Ok(key)
                },
            )?
        };
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.sort_by(|a, b| compare_key_vectors(&keys[*a], &keys[*b], &directions));

        let mut old: Vec<Option<Record>> =
            std::mem::take(&mut self.records).into_iter().map(Some).collect();
        self.records = order
            .iter()
            .map(|&i| old[i].take().expect("each index moves once"))
            .collect();
        self.sort_values = Some(order.iter().map(|&i| keys[i].clone()).collect());
        Ok(())
    }

    // ── OFFSET / LIMIT ──────────────────────────────────────────────────

    /// Drop the first `n` records. Returns the count actually skipped.
    pub fn offset_clause(&mut self, n: i64) -> usize {
        let n = n.max(0) as usize;
        let skipped = n.min(self.records.len());
        self.records.drain(..skipped);
        if let Some(sv) = &mut self.sort_values {
            sv.drain(..skipped);
        }
        skipped
    }

    /// Cap the record count. `offset` is the count already skipped, which
    /// participates in the PERCENT computation.
    pub fn limit_clause(
        &mut self,
        scope: &Scope<'_>,
        limit: &LimitClause,
        offset: usize,
    ) -> Result<(), FlatqError> {
        let v = evaluate(&limit.value, scope, None)?;
        let mut keep = if limit.percent {
            let p = match v.to_float() {
                Value::Float(f) => f.clamp(0.0, 100.0),
                _ => {
                    return Err(FlatqError::InvalidValue(
                        "the limit percentage must be a number".into(),
                    ));
                }
            };
            (((self.records.len() + offset) as f64) * p / 100.0).ceil() as usize
        } else {
            match v.to_integer() {
                Value::Integer(n) if n >= 0 => n as usize,
                _ => {
                    return Err(FlatqError::InvalidValue(
                        "the limit value must be a non-negative integer".into(),
                    ));
                }
            }
        };
        if limit.with_ties {
            let Some(sort_values) = &self.sort_values else {
                return Err(FlatqError::ContextViolation(
                    "LIMIT WITH TIES requires ORDER BY".into(),
                ));
            };
            if 0 < keep && keep < self.records.len() {
                let last = sort_values[keep - 1].clone();
                while keep < self.records.len() && keys_equal(&sort_values[keep], &last) {
                    keep += 1;
                }
            }
        }
        if keep < self.records.len() {
            self.records.truncate(keep);
            if let Some(sv) = &mut self.sort_values {
                sv.truncate(keep);
            }
        }
        Ok(())
    }

    // ── Fix ─────────────────────────────────────────────────────────────

    /// Finalize the projection: trim records to the select fields, rebuild
    /// the header with labels as column names numbered from 1, and clear
    /// all scratch state. Idempotent.
    pub fn fix(&mut self) {
        let indices: Vec<usize> = if self.select_fields.is_empty() {
            (0..self.header.len()).collect()
        } else {
            self.select_fields.clone()
        };
        let labels: Vec<String> = if self.select_labels.len() == indices.len() {
            self.select_labels.clone()
        } else {
            indices
                .iter()
                .map(|&i| self.header.field(i).label().to_string())
                .collect()
        };
        let fields = labels
            .iter()
            .enumerate()
            .map(|(k, label)| {
                let mut f = HeaderField::new(None, label);
                f.number = k + 1;
                f.is_from_table = true;
                f
            })
            .collect();
        self.header = Header::from_fields(fields);
        for record in &mut self.records {
            let cells: Vec<Cell> = indices
                .iter()
                .map(|&i| Cell::single(record.cell(i).value().clone()))
                .collect();
            *record = Record::new(cells);
        }
        self.select_fields.clear();
        self.select_labels.clear();
        self.is_grouped = false;
        self.sort_values = None;
    }

    // ── Set operations ──────────────────────────────────────────────────

    /// Combine two fixed views. The result is not backed by any file.
    pub fn combine(
        left: View,
        right: View,
        op: SetOperator,
        all: bool,
    ) -> Result<View, FlatqError> {
        if left.header.len() != right.header.len() {
            return Err(FlatqError::CombinedFieldLength);
        }
        let record_key =
            |r: &Record| value::hash_key(&r.cells().iter().map(|c| c.value().clone()).collect::<Vec<_>>());
        let mut result = View {
            header: left.header.clone(),
            file_info: None,
            ..View::default()
        };
        match op {
            SetOperator::Union => {
                let mut records = left.records;
                records.extend(right.records);
                result.records = records;
                if !all {
                    result.records = dedup_stable(result.records, record_key);
                }
            }
            SetOperator::Except => {
                let right_keys: IndexSet<u64> =
                    right.records.iter().map(|r| record_key(r)).collect();
                result.records = left
                    .records
                    .into_iter()
                    .filter(|r| !right_keys.contains(&record_key(r)))
                    .collect();
                if !all {
                    result.records = dedup_stable(result.records, record_key);
                }
            }
            SetOperator::Intersect => {
                let right_keys: IndexSet<u64> =
                    right.records.iter().map(|r| record_key(r)).collect();
                result.records = left
                    .records
                    .into_iter()
                    .filter(|r| right_keys.contains(&record_key(r)))
                    .collect();
                if !all {
                    result.records = dedup_stable(result.records, record_key);
                }
            }
        }
        Ok(result)
    }
}

fn dedup_stable(records: Vec<Record>, key: impl Fn(&Record) -> u64) -> Vec<Record> {
    let mut seen = IndexSet::new();
    records.into_iter().filter(|r| seen.insert(key(r))).collect()
}

// ── Query orchestration ─────────────────────────────────────────────────

/// Execute a query and return the fixed result view.
pub fn execute_query(scope: &Scope<'_>, query: &SelectQuery) -> Result<View, FlatqError> {
    scope.session.cancel.check()?;
    let mut tables = IndexMap::new();
    for ct in &query.with {
        let ct_scope = scope.with_common_tables(tables.clone());
        // A definition that reads its own name is recursive even without
        // the RECURSIVE keyword.
        if ct.recursive || query_references_table(&ct.query, &ct.name) {
            tables.insert(
                ct.name.to_uppercase(),
                crate::eval::CommonTableEntry::Recursive(ct.clone()),
            );
        } else {
            let mut v = execute_query(&ct_scope, &ct.query)?;
            load::apply_common_table_shape(&mut v, &ct.name, &ct.columns)?;
            tables.insert(
                ct.name.to_uppercase(),
                crate::eval::CommonTableEntry::Materialized(v),
            );
        }
    }
    let ct_scope = scope.with_common_tables(tables);

    match &query.body {
        SelectBody::Entity(entity) => execute_entity(
            &ct_scope,
            entity,
            &query.order_by,
            query.offset.as_ref(),
            query.limit.as_ref(),
        ),
        SelectBody::SetOperation { .. } => {
            let mut view = execute_set_body(&ct_scope, &query.body)?;
            if !query.order_by.is_empty() {
                view.order_by(&ct_scope, &query.order_by)?;
            }
            let offset = match query.offset.as_ref() {
                Some(expr) => apply_offset(&mut view, &ct_scope, expr)?,
                None => 0,
            };
            if let Some(limit) = query.limit.as_ref() {
                view.limit_clause(&ct_scope, limit, offset)?;
            }
            view.fix();
            Ok(view)
        }
    }
}

/// Execute a set-operation tree; each operand is fixed before combination.
pub fn execute_set_body(scope: &Scope<'_>, body: &SelectBody) -> Result<View, FlatqError> {
    match body {
        SelectBody::Entity(entity) => execute_entity(scope, entity, &[], None, None),
        SelectBody::SetOperation {
            op,
            all,
            left,
            right,
        } => {
            let l = execute_set_body(scope, left)?;
            let r = execute_set_body(scope, right)?;
            View::combine(l, r, *op, *all)
        }
    }
}

/// Run one select entity through the clause pipeline, then fix.
pub fn execute_entity(
    scope: &Scope<'_>,
    entity: &SelectEntity,
    order: &[OrderItem],
    offset: Option<&Expr>,
    limit: Option<&LimitClause>,
) -> Result<View, FlatqError> {
    let mut view = load::load_from(scope, &entity.from)?;
    if let Some(condition) = &entity.filter {
        view.filter_where(scope, condition)?;
    }
    if !entity.group_by.is_empty() {
        view.group_by(scope, &entity.group_by)?;
    }
    // An aggregate in SELECT or HAVING without GROUP BY folds all rows into
    // one group. This must happen statically: over zero records no
    // evaluation runs, so the NotGrouping retry alone would miss it.
    if !view.is_grouped {
        let in_having = entity
            .having
            .as_ref()
            .map(|h| contains_aggregate(h, scope))
            .unwrap_or(false);
        let in_select = entity
            .fields
            .iter()
            .any(|f| contains_aggregate(&f.expr, scope));
        if in_having || in_select {
            view.group_all();
        }
    }
    if let Some(condition) = &entity.having {
        view.having(scope, condition)?;
    }
    view.select_clause(scope, &entity.fields, entity.distinct)?;
    if !order.is_empty() {
        view.order_by(scope, order)?;
    }
    let offset_count = match offset {
        Some(expr) => apply_offset(&mut view, scope, expr)?,
        None => 0,
    };
    if let Some(limit) = limit {
        view.limit_clause(scope, limit, offset_count)?;
    }
    view.fix();
    Ok(view)
}

/// Whether a query's FROM clauses reference the given table name.
fn query_references_table(query: &SelectQuery, name: &str) -> bool {
    fn body_references(body: &SelectBody, name: &str) -> bool {
        match body {
            SelectBody::Entity(e) => e.from.iter().any(|t| table_references(t, name)),
            SelectBody::SetOperation { left, right, .. } => {
                body_references(left, name) || body_references(right, name)
            }
        }
    }
    fn table_references(expr: &crate::sql::ast::TableExpr, name: &str) -> bool {
        use crate::sql::ast::{TableExpr, TableSource};
        match expr {
            TableExpr::Join { left, right, .. } => {
                table_references(left, name) || table_references(right, name)
            }
            TableExpr::Table { source, .. } => match source {
                TableSource::Path(p) => p.eq_ignore_ascii_case(name),
                TableSource::Subquery(q) => query_references_table(q, name),
                _ => false,
            },
        }
    }
    body_references(&query.body, name)
}

/// Whether an expression contains an aggregate call over the current
/// query's records. Subqueries have their own grouping and are not
/// descended into; analytic calls are not aggregates.
fn contains_aggregate(expr: &Expr, scope: &Scope<'_>) -> bool {
    let check = |e: &Expr| contains_aggregate(e, scope);
    match expr {
        Expr::Function { name, args, .. } => {
            let upper = name.to_uppercase();
            if crate::eval::AGGREGATE_NAMES.contains(&upper.as_str()) {
                return true;
            }
            let is_user_aggregate = scope
                .session
                .functions
                .lock()
                .expect("functions lock")
                .lookup(&upper)
                .map(|d| d.cursor_param.is_some())
                .unwrap_or(false);
            is_user_aggregate || args.iter().any(check)
        }
        Expr::Minus(e) | Expr::Not(e) => check(e),
        Expr::Arithmetic { left, right, .. }
        | Expr::Comparison { left, right, .. }
        | Expr::Identical { left, right } => check(left) || check(right),
        Expr::Concat(l, r) | Expr::And(l, r) | Expr::Or(l, r) => check(l) || check(r),
        Expr::Is { expr, target, .. } => check(expr) || check(target),
        Expr::Between {
            expr, low, high, ..
        } => check(expr) || check(low) || check(high),
        Expr::InList { expr, list, .. } => check(expr) || list.iter().any(check),
        Expr::InSubquery { expr, .. } => check(expr),
        Expr::Like { expr, pattern, .. } => check(expr) || check(pattern),
        Expr::Case {
            operand,
            branches,
            else_expr,
        } => {
            operand.as_deref().map(check).unwrap_or(false)
                || branches.iter().any(|(c, r)| check(c) || check(r))
                || else_expr.as_deref().map(check).unwrap_or(false)
        }
        Expr::VarAssign { expr, .. } => check(expr),
        _ => false,
    }
}

fn apply_offset(view: &mut View, scope: &Scope<'_>, expr: &Expr) -> Result<usize, FlatqError> {
    match evaluate(expr, scope, None)?.to_integer() {
        Value::Integer(n) if n >= 0 => Ok(view.offset_clause(n)),
        _ => Err(FlatqError::InvalidValue(
            "the offset value must be a non-negative integer".into(),
        )),
    }
}
