//! DML and DDL against cached views.
//!
//! Nothing here touches disk: targets are loaded for update through the
//! cache (taking the exclusive file lock), mutated as local images, and
//! written back into the cache only after the whole statement succeeded.
//! Commit later decides which cached views actually changed.
//!
//! UPDATE and DELETE identify physical rows through the internal-id column
//! attached to each target inside the working joined view: the id is the
//! row ordinal of the clean target image. A row written twice by one
//! UPDATE statement aborts it.

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

use crate::error::FlatqError;
use crate::eval::{Scope, evaluate};
use crate::file::{FileHandler, FileInfo, path_key, resolve_new_table_path};
use crate::format::Format;
use crate::record::{Cell, HeaderField, Record, ident_eq};
use crate::sql::ast::{
    ColumnDefault, ColumnPosition, DeleteStatement, InsertSource, ReplaceStatement, TableExpr,
    TableSource, UpdateStatement,
};
use crate::value::{self, Value};
use crate::view::load::{LoadContext, TargetHandle, TargetKey, load_from_with};
use crate::view::{View, execute_query};

/// Per-table mutation count reported by a DML statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DmlCount {
    pub table: String,
    pub count: usize,
}

/// Locate a DML target: a temporary view shadows a file of the same name.
fn load_target(scope: &Scope<'_>, name: &str) -> Result<(View, TargetKey), FlatqError> {
    let temp = {
        let temps = scope.session.temp_views.lock().expect("temp views lock");
        temps.get(name)
    };
    if let Some(view) = temp {
        return Ok((view, TargetKey::Temp(name.to_string())));
    }
    let (view, key) = super::load::load_file(scope, name, true)?;
    Ok((view, TargetKey::Cached(key)))
}

fn store_target(scope: &Scope<'_>, key: &TargetKey, view: View) -> Result<(), FlatqError> {
    let ok = match key {
        TargetKey::Cached(k) => scope.session.cache.replace(k, view),
        TargetKey::Temp(n) => scope
            .session
            .temp_views
            .lock()
            .expect("temp views lock")
            .replace(n, view),
    };
    if ok {
        Ok(())
    } else {
        Err(FlatqError::InternalError(
            "a mutated view vanished from its store".into(),
        ))
    }
}

/// Resolve the declared field list to column indices; an empty list means
/// every visible column in order.
fn field_indices(view: &View, fields: &[String]) -> Result<Vec<usize>, FlatqError> {
    if fields.is_empty() {
        Ok(view.header.visible_indices(None))
    } else {
        fields
            .iter()
            .map(|f| view.header.contains(None, f))
            .collect()
    }
}

fn null_record(width: usize) -> Record {
    Record::new((0..width).map(|_| Cell::single(Value::Null)).collect())
}

/// INSERT VALUES / INSERT from a query.
pub fn execute_insert(
    scope: &Scope<'_>,
    table: &str,
    fields: &[String],
    source: &InsertSource,
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, table)?;
    let indices = field_indices(&view, fields)?;
    let width = view.header.len();
    let mut inserted = 0;
    match source {
        InsertSource::Values(rows) => {
            for row in rows {
                if row.len() != indices.len() {
                    return Err(FlatqError::RowValueLength {
                        expect: indices.len(),
                        actual: row.len(),
                    });
                }
                let mut record = null_record(width);
                for (idx, expr) in indices.iter().zip(row.iter()) {
                    record.cell_mut(*idx).set(evaluate(expr, scope, None)?);
                }
                view.records.push(record);
                inserted += 1;
            }
        }
        InsertSource::Query(query) => {
            let source_view = execute_query(scope, query)?;
            if source_view.header.len() != indices.len() {
                return Err(FlatqError::RowValueLength {
                    expect: indices.len(),
                    actual: source_view.header.len(),
                });
            }
            for src in &source_view.records {
                let mut record = null_record(width);
                for (k, idx) in indices.iter().enumerate() {
                    record.cell_mut(*idx).set(src.value(k).clone());
                }
                view.records.push(record);
                inserted += 1;
            }
        }
    }
    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: table.to_string(),
        count: inserted,
    })
}

/// REPLACE: update rows whose key columns match, insert the rest.
pub fn execute_replace(
    scope: &Scope<'_>,
    stmt: &ReplaceStatement,
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, &stmt.table)?;
    let indices = field_indices(&view, &stmt.fields)?;
    let key_indices: Vec<usize> = stmt
        .keys
        .iter()
        .map(|k| view.header.contains(None, k))
        .collect::<Result<_, _>>()?;
    for k in &key_indices {
        if !indices.contains(k) {
            return Err(FlatqError::InvalidValue(format!(
                "key column {} is not in the field list",
                view.header.field(*k).column
            )));
        }
    }
    let width = view.header.len();
    let rows: Vec<Vec<Value>> = match &stmt.source {
        InsertSource::Values(rows) => {
            let mut evaluated = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != indices.len() {
                    return Err(FlatqError::RowValueLength {
                        expect: indices.len(),
                        actual: row.len(),
                    });
                }
                let mut values = Vec::with_capacity(row.len());
                for expr in row {
                    values.push(evaluate(expr, scope, None)?);
                }
                evaluated.push(values);
            }
            evaluated
        }
        InsertSource::Query(query) => {
            let source_view = execute_query(scope, query)?;
            if source_view.header.len() != indices.len() {
                return Err(FlatqError::RowValueLength {
                    expect: indices.len(),
                    actual: source_view.header.len(),
                });
            }
            source_view
                .records
                .iter()
                .map(|r| (0..indices.len()).map(|k| r.value(k).clone()).collect())
                .collect()
        }
    };

    let mut count = 0;
    for values in rows {
        let row_key: Vec<Value> = key_indices
            .iter()
            .map(|ki| values[indices.iter().position(|i| i == ki).expect("checked")].clone())
            .collect();
        let existing = view.records.iter().position(|record| {
            let record_key: Vec<Value> = key_indices
                .iter()
                .map(|&ki| record.value(ki).clone())
                .collect();
            value::hash_key(&record_key) == value::hash_key(&row_key)
        });
        match existing {
            Some(pos) => {
                for (idx, v) in indices.iter().zip(values.iter()) {
                    view.records[pos].cell_mut(*idx).set(v.clone());
                }
            }
            None => {
                let mut record = null_record(width);
                for (idx, v) in indices.iter().zip(values.iter()) {
                    record.cell_mut(*idx).set(v.clone());
                }
                view.records.push(record);
            }
        }
        count += 1;
    }
    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: stmt.table.clone(),
        count,
    })
}

/// Build the working FROM for UPDATE/DELETE: the explicit FROM clause, or
/// the target list itself.
fn working_from(from: &[TableExpr], targets: &[String]) -> Vec<TableExpr> {
    if !from.is_empty() {
        return from.to_vec();
    }
    targets
        .iter()
        .map(|t| TableExpr::Table {
            source: TableSource::Path(t.clone()),
            alias: None,
        })
        .collect()
}

/// Find the handle an assignment or delete target refers to.
fn resolve_handle(
    handles: &[TargetHandle],
    qualifier: Option<&str>,
    column: Option<&str>,
) -> Result<usize, FlatqError> {
    if let Some(q) = qualifier {
        return handles
            .iter()
            .position(|h| h.alias.eq_ignore_ascii_case(q) || h.display.eq_ignore_ascii_case(q))
            .ok_or_else(|| FlatqError::UndeclaredTable(q.to_string()));
    }
    if handles.len() == 1 {
        return Ok(0);
    }
    let column = column.ok_or_else(|| {
        FlatqError::InternalError("an unqualified target needs a column".into())
    })?;
    let matching: Vec<usize> = handles
        .iter()
        .enumerate()
        .filter(|(_, h)| h.view.header.contains(None, column).is_ok())
        .map(|(i, _)| i)
        .collect();
    match matching.as_slice() {
        [one] => Ok(*one),
        [] => Err(FlatqError::FieldNotExist(column.to_string())),
        _ => Err(FlatqError::FieldAmbiguous(column.to_string())),
    }
}

/// UPDATE: walk the filtered working view; each assignment locates its
/// target row through the internal id and writes at most once per row.
pub fn execute_update(
    scope: &Scope<'_>,
    stmt: &UpdateStatement,
) -> Result<Vec<DmlCount>, FlatqError> {
    let from = working_from(&stmt.from, &stmt.targets);
    let mut ctx = LoadContext::for_update(&stmt.targets);
    let mut working = load_from_with(scope, &from, &mut ctx)?;
    for target in &stmt.targets {
        if !ctx
            .handles
            .iter()
            .any(|h| h.alias.eq_ignore_ascii_case(target) || h.display.eq_ignore_ascii_case(target))
        {
            return Err(FlatqError::UndeclaredTable(target.clone()));
        }
    }
    if let Some(condition) = &stmt.filter {
        working.filter_where(scope, condition)?;
    }

    let mut handles = ctx.handles;
    // Written row ids per handle; a second hit from a different record is
    // the ambiguity error.
    let mut written: HashMap<usize, HashSet<i64>> = HashMap::new();

    for i in 0..working.records.len() {
        scope.session.cancel.check()?;
        let mut touched_this_record: HashMap<usize, i64> = HashMap::new();
        // Evaluate all assignment values against the working record before
        // applying any of them.
        let mut staged: Vec<(usize, usize, i64, Value)> = Vec::new();
        for assignment in &stmt.assignments {
            let h = resolve_handle(
                &handles,
                assignment.view.as_deref(),
                Some(&assignment.column),
            )?;
            let id_idx = working.header.internal_id_index(&handles[h].alias)?;
            let id = match working.records[i].value(id_idx).to_integer() {
                Value::Integer(n) => n,
                _ => {
                    return Err(FlatqError::InternalError(
                        "internal id is not an integer".into(),
                    ));
                }
            };
            let col = handles[h].view.header.contains(None, &assignment.column)?;
            let rec_scope = scope.with_record(&working, i);
            let v = evaluate(&assignment.value, &rec_scope, None)?;
            staged.push((h, col, id, v));
            touched_this_record.insert(h, id);
        }
        for (h, id) in &touched_this_record {
            let ids = written.entry(*h).or_default();
            if !ids.insert(*id) {
                return Err(FlatqError::UpdateRecordAmbiguous);
            }
        }
        for (h, col, id, v) in staged {
            let record = handles[h]
                .view
                .records
                .get_mut(id as usize)
                .ok_or_else(|| {
                    FlatqError::InternalError("internal id out of range".into())
                })?;
            record.cell_mut(col).set(v);
        }
    }

    let mut counts = Vec::with_capacity(handles.len());
    for (h, handle) in handles.drain(..).enumerate() {
        let count = written.get(&h).map(|ids| ids.len()).unwrap_or(0);
        store_target(scope, &handle.key, handle.view)?;
        counts.push(DmlCount {
            table: handle.display,
            count,
        });
    }
    Ok(counts)
}

/// DELETE: collect internal ids per target from the filtered working view,
/// then rewrite each target keeping the rows not collected.
pub fn execute_delete(
    scope: &Scope<'_>,
    stmt: &DeleteStatement,
) -> Result<Vec<DmlCount>, FlatqError> {
    let targets: Vec<String> = if stmt.targets.is_empty() {
        match stmt.from.as_slice() {
            [TableExpr::Table {
                source: TableSource::Path(name),
                alias,
            }] => vec![alias.clone().unwrap_or_else(|| name.clone())],
            _ => {
                return Err(FlatqError::SyntaxError(
                    "DELETE with a joined FROM requires explicit target tables".into(),
                ));
            }
        }
    } else {
        stmt.targets.clone()
    };

    let mut ctx = LoadContext::for_update(&targets);
    let mut working = load_from_with(scope, &stmt.from, &mut ctx)?;
    for target in &targets {
        if !ctx
            .handles
            .iter()
            .any(|h| h.alias.eq_ignore_ascii_case(target) || h.display.eq_ignore_ascii_case(target))
        {
            return Err(FlatqError::UndeclaredTable(target.clone()));
        }
    }
    if let Some(condition) = &stmt.filter {
        working.filter_where(scope, condition)?;
    }

    let mut doomed: Vec<HashSet<i64>> = vec![HashSet::new(); ctx.handles.len()];
    for record in &working.records {
        for (h, handle) in ctx.handles.iter().enumerate() {
            let id_idx = working.header.internal_id_index(&handle.alias)?;
            if let Value::Integer(id) = record.value(id_idx).to_integer() {
                doomed[h].insert(id);
            }
        }
    }

    let mut counts = Vec::with_capacity(ctx.handles.len());
    for (h, handle) in ctx.handles.drain(..).enumerate() {
        let mut view = handle.view;
        let keep: Vec<Record> = view
            .records
            .drain(..)
            .enumerate()
            .filter(|(i, _)| !doomed[h].contains(&(*i as i64)))
            .map(|(_, r)| r)
            .collect();
        view.records = keep;
        store_target(scope, &handle.key, view)?;
        counts.push(DmlCount {
            table: handle.display,
            count: doomed[h].len(),
        });
    }
    Ok(counts)
}

// ── DDL ─────────────────────────────────────────────────────────────────

/// CREATE TABLE: an empty table from a column list, or the result of a
/// query. The view enters the cache as a new file flushed on commit.
pub fn execute_create(
    scope: &Scope<'_>,
    path: &str,
    fields: &[String],
    query: Option<&crate::sql::ast::SelectQuery>,
) -> Result<(String, usize), FlatqError> {
    let flags = scope.session.flags();
    let new_path = resolve_new_table_path(path, &flags)?;
    let key = path_key(&new_path);
    if scope.session.cache.exists(&key) {
        return Err(FlatqError::IoError {
            path: new_path.display().to_string(),
            detail: "table already exists in this transaction".to_string(),
        });
    }
    let stem = new_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut view = match query {
        Some(q) => {
            let mut v = execute_query(scope, q)?;
            if !fields.is_empty() {
                if fields.len() != v.header.len() {
                    return Err(FlatqError::CombinedFieldLength);
                }
                for (i, f) in fields.iter().enumerate() {
                    v.header.rename(i, f);
                }
            }
            v.header.update_view_name(&stem);
            v
        }
        None => {
            let header = crate::record::Header::from_columns(Some(stem.as_str()), fields)?;
            View {
                header,
                ..View::default()
            }
        }
    };
    let format = Format::from_path(&new_path);
    let mut info = FileInfo::new(new_path.clone(), format, &flags);
    info.new_file = true;
    view.file_info = Some(info);

    let handler = FileHandler::acquire_exclusive(&new_path, &flags, &scope.session.cancel)?;
    let fields_len = view.header.len();
    scope
        .session
        .cache
        .set(key, view, true, Some(handler));
    Ok((new_path.display().to_string(), fields_len))
}

/// ALTER TABLE ADD: insert columns with per-record default expressions.
pub fn execute_add_columns(
    scope: &Scope<'_>,
    table: &str,
    columns: &[ColumnDefault],
    position: &ColumnPosition,
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, table)?;
    for col in columns {
        if view.header.contains(None, &col.column).is_ok() {
            return Err(FlatqError::FieldAmbiguous(col.column.clone()));
        }
    }
    let insert_at = match position {
        ColumnPosition::First => 0,
        ColumnPosition::Last => view.header.len(),
        ColumnPosition::Before(c) => view.header.contains(None, c)?,
        ColumnPosition::After(c) => view.header.contains(None, c)? + 1,
    };

    // Evaluate defaults per record against the current row.
    let mut default_values: Vec<Vec<Value>> = Vec::with_capacity(view.records.len());
    for i in 0..view.records.len() {
        let rec_scope = scope.with_record(&view, i);
        let mut row = Vec::with_capacity(columns.len());
        for col in columns {
            row.push(match &col.default {
                Some(expr) => evaluate(expr, &rec_scope, None)?,
                None => Value::Null,
            });
        }
        default_values.push(row);
    }

    let view_name = view.header.fields().first().and_then(|f| f.view.clone());
    let mut fields = view.header.fields().to_vec();
    for (k, col) in columns.iter().enumerate() {
        let mut f = HeaderField::new(view_name.as_deref(), &col.column);
        f.is_from_table = true;
        fields.insert(insert_at + k, f);
    }
    for (i, f) in fields.iter_mut().enumerate() {
        f.number = i + 1;
    }
    view.header = crate::record::Header::from_fields(fields);
    for (record, row) in view.records.iter_mut().zip(default_values) {
        let mut cells = record.cells().to_vec();
        for (k, v) in row.into_iter().enumerate() {
            cells.insert(insert_at + k, Cell::single(v));
        }
        *record = Record::new(cells);
    }

    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: table.to_string(),
        count: columns.len(),
    })
}

/// ALTER TABLE DROP.
pub fn execute_drop_columns(
    scope: &Scope<'_>,
    table: &str,
    columns: &[String],
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, table)?;
    let mut indices: Vec<usize> = columns
        .iter()
        .map(|c| view.header.contains(None, c))
        .collect::<Result<_, _>>()?;
    indices.sort_unstable();
    indices.dedup();

    let mut fields = view.header.fields().to_vec();
    for &i in indices.iter().rev() {
        fields.remove(i);
    }
    for (i, f) in fields.iter_mut().enumerate() {
        f.number = i + 1;
    }
    view.header = crate::record::Header::from_fields(fields);
    for record in &mut view.records {
        let mut cells = record.cells().to_vec();
        for &i in indices.iter().rev() {
            cells.remove(i);
        }
        *record = Record::new(cells);
    }
    let dropped = indices.len();
    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: table.to_string(),
        count: dropped,
    })
}

/// ALTER TABLE RENAME.
pub fn execute_rename_column(
    scope: &Scope<'_>,
    table: &str,
    old: &str,
    new: &str,
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, table)?;
    let idx = view.header.contains(None, old)?;
    if !ident_eq(old, new) && view.header.contains(None, new).is_ok() {
        return Err(FlatqError::FieldAmbiguous(new.to_string()));
    }
    view.header.rename(idx, new);
    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: table.to_string(),
        count: 1,
    })
}

/// ALTER TABLE SET attribute: change the descriptor used to re-encode the
/// file. Dropping the snapshot forces the rewrite on commit.
pub fn execute_set_attribute(
    scope: &Scope<'_>,
    table: &str,
    attribute: &str,
    value: &Value,
) -> Result<DmlCount, FlatqError> {
    let (mut view, key) = load_target(scope, table)?;
    let Some(info) = view.file_info.as_mut() else {
        return Err(FlatqError::ContextViolation(format!(
            "table {table} has no file attributes"
        )));
    };
    let text = value.to_field();
    let invalid = || FlatqError::InvalidFlagValue {
        flag: attribute.to_string(),
        value: value.to_display_string(),
    };
    match attribute.to_uppercase().as_str() {
        "DELIMITER" => {
            let s = text.ok_or_else(invalid)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => info.delimiter = c,
                _ => return Err(invalid()),
            }
        }
        "FORMAT" => {
            let s = text.ok_or_else(invalid)?;
            info.format = Format::parse(&s).ok_or_else(invalid)?;
            if info.format == Format::Tsv {
                info.delimiter = '\t';
            }
        }
        "ENCODING" => {
            let s = text.ok_or_else(invalid)?;
            info.encoding = crate::config::Encoding::parse(&s).ok_or_else(invalid)?;
        }
        "LINE_BREAK" => {
            let s = text.ok_or_else(invalid)?;
            info.line_break = crate::config::LineBreak::parse(&s).ok_or_else(invalid)?;
        }
        "JSON_ESCAPE" => {
            let s = text.ok_or_else(invalid)?;
            info.json_escape = crate::config::JsonEscape::parse(&s).ok_or_else(invalid)?;
        }
        "ENCLOSE_ALL" => {
            info.enclose_all = match value.to_boolean() {
                Value::Boolean(b) => b,
                _ => return Err(invalid()),
            };
        }
        "HEADER" => {
            info.no_header = match value.to_boolean() {
                Value::Boolean(b) => !b,
                _ => return Err(invalid()),
            };
        }
        _ => {
            return Err(FlatqError::InvalidValue(format!(
                "{attribute} is not a table attribute"
            )));
        }
    }
    info.snapshot = None;
    store_target(scope, &key, view)?;
    Ok(DmlCount {
        table: table.to_string(),
        count: 1,
    })
}
