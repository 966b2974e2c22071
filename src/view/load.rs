//! FROM-clause loading.
//!
//! Table expressions resolve in this order: temporary views (stdin,
//! DECLARE TABLE), WITH tables visible in the scope (recursive definitions
//! execute here), then files through the view cache. The first file
//! reference in a transaction reads the file; later references serve the
//! cached image. A read-only cache entry is discarded and reloaded when a
//! statement needs the table for update; the exclusive handler is acquired
//! before the cache entry is inserted.

use std::fs;
use std::path::Path;

use indexmap::IndexSet;

use crate::error::{FlatqError, io_error};
use crate::eval::{CommonTableEntry, Scope};
use crate::file::{FileHandler, FileInfo, Snapshot, path_key, resolve_table_path};
use crate::format::text::{decode_bytes, detect_line_break, normalize_line_breaks};
use crate::format::{Format, codec};
use crate::sql::ast::{CommonTable, Expr, SelectBody, SetOperator, TableExpr, TableSource};
use crate::value::{self, Value};
use crate::view::{View, execute_query, execute_set_body, join};

/// Where a DML target lives, for writing the mutated view back.
#[derive(Debug, Clone)]
pub enum TargetKey {
    Cached(String),
    Temp(String),
}

/// A table loaded for update: its qualifier in the working view, its
/// write-back key, and the clean (internal-id-free) image rows are written
/// into.
#[derive(Debug)]
pub struct TargetHandle {
    pub alias: String,
    pub display: String,
    pub key: TargetKey,
    pub view: View,
}

#[derive(Default)]
pub struct LoadContext<'t> {
    /// Table names or aliases that must be loaded for update with an
    /// internal-id column.
    pub update_targets: &'t [String],
    pub handles: Vec<TargetHandle>,
    seen_names: IndexSet<String>,
}

impl<'t> LoadContext<'t> {
    pub fn for_update(targets: &'t [String]) -> LoadContext<'t> {
        LoadContext {
            update_targets: targets,
            handles: Vec::new(),
            seen_names: IndexSet::new(),
        }
    }
}

/// Load a FROM clause into a single view, cross-joining the list
/// left-to-right. A missing FROM yields the stdin view when piped input is
/// available, else the single-row dual view.
pub fn load_from(scope: &Scope<'_>, from: &[TableExpr]) -> Result<View, FlatqError> {
    let mut ctx = LoadContext::default();
    load_from_with(scope, from, &mut ctx)
}

pub fn load_from_with(
    scope: &Scope<'_>,
    from: &[TableExpr],
    ctx: &mut LoadContext<'_>,
) -> Result<View, FlatqError> {
    if from.is_empty() {
        let has_stdin = scope
            .session
            .stdin_text
            .lock()
            .expect("stdin lock")
            .is_some();
        return if has_stdin {
            load_stdin(scope, None)
        } else {
            Ok(View::dual())
        };
    }
    let mut result: Option<View> = None;
    for expr in from {
        let v = load_table_expr(scope, expr, ctx)?;
        result = Some(match result {
            None => v,
            Some(acc) => join::cross_join(acc, v),
        });
    }
    Ok(result.expect("from list is non-empty"))
}

fn load_table_expr(
    scope: &Scope<'_>,
    expr: &TableExpr,
    ctx: &mut LoadContext<'_>,
) -> Result<View, FlatqError> {
    match expr {
        TableExpr::Join {
            join_type,
            left,
            right,
            condition,
        } => {
            let l = load_table_expr(scope, left, ctx)?;
            let r = load_table_expr(scope, right, ctx)?;
            join::join(scope, l, r, *join_type, condition.as_ref())
        }
        TableExpr::Table { source, alias } => load_source(scope, source, alias.as_deref(), ctx),
    }
}

fn register_name(ctx: &mut LoadContext<'_>, name: &str) -> Result<(), FlatqError> {
    if !ctx.seen_names.insert(name.to_uppercase()) {
        return Err(FlatqError::DuplicateTableName(name.to_string()));
    }
    Ok(())
}

fn is_update_target(ctx: &LoadContext<'_>, candidates: &[&str]) -> bool {
    ctx.update_targets.iter().any(|t| {
        candidates
            .iter()
            .any(|c| c.eq_ignore_ascii_case(t))
    })
}

fn load_source(
    scope: &Scope<'_>,
    source: &TableSource,
    alias: Option<&str>,
    ctx: &mut LoadContext<'_>,
) -> Result<View, FlatqError> {
    match source {
        TableSource::Dual => Ok(View::dual()),

        TableSource::Stdin => {
            let qualifier = alias.unwrap_or("STDIN").to_string();
            register_name(ctx, &qualifier)?;
            let mut v = load_stdin(scope, alias)?;
            if is_update_target(ctx, &[&qualifier, "STDIN"]) {
                ctx.handles.push(TargetHandle {
                    alias: qualifier.clone(),
                    display: "STDIN".to_string(),
                    key: TargetKey::Temp("STDIN".to_string()),
                    view: v.clone(),
                });
                v.attach_internal_id();
            }
            Ok(v)
        }

        TableSource::Subquery(query) => {
            let mut v = execute_query(scope, query)?;
            if let Some(alias) = alias {
                register_name(ctx, alias)?;
                v.header.update_view_name(alias);
            }
            v.file_info = None;
            Ok(v)
        }

        TableSource::TableObject {
            format,
            source,
            args,
        } => load_table_object(scope, format, source, args, alias, ctx),

        TableSource::Path(name) => {
            // Temporary views shadow everything.
            let temp = {
                let temps = scope.session.temp_views.lock().expect("temp views lock");
                temps.get(name)
            };
            if let Some(mut v) = temp {
                let qualifier = alias.unwrap_or(name).to_string();
                register_name(ctx, &qualifier)?;
                v.header.update_view_name(&qualifier);
                if is_update_target(ctx, &[&qualifier, name]) {
                    ctx.handles.push(TargetHandle {
                        alias: qualifier,
                        display: name.clone(),
                        key: TargetKey::Temp(name.clone()),
                        view: {
                            let temps =
                                scope.session.temp_views.lock().expect("temp views lock");
                            temps.get(name).expect("temp view exists")
                        },
                    });
                    v.attach_internal_id();
                }
                return Ok(v);
            }
            // WITH tables visible from the scope.
            if let Some(entry) = scope.find_common_table(name) {
                let mut v = match entry {
                    CommonTableEntry::Materialized(v) => v,
                    CommonTableEntry::Recursive(ct) => execute_recursive(scope, &ct)?,
                };
                let qualifier = alias.unwrap_or(name).to_string();
                register_name(ctx, &qualifier)?;
                v.header.update_view_name(&qualifier);
                return Ok(v);
            }
            // A file through the cache.
            let for_update = is_update_target(ctx, &[alias.unwrap_or(name), name]);
            let (clean, key) = load_file(scope, name, for_update)?;
            let stem = clean
                .file_info
                .as_ref()
                .and_then(|fi| fi.path.file_stem())
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());
            let qualifier = alias.unwrap_or(&stem).to_string();
            register_name(ctx, &qualifier)?;
            let mut v = clean.clone();
            v.header.update_view_name(&qualifier);
            if for_update {
                ctx.handles.push(TargetHandle {
                    alias: qualifier,
                    display: name.clone(),
                    key: TargetKey::Cached(key),
                    view: clean,
                });
                v.attach_internal_id();
            }
            Ok(v)
        }
    }
}

/// Load a file through the cache. Returns the clean cached image and its
/// cache key.
pub fn load_file(
    scope: &Scope<'_>,
    name: &str,
    for_update: bool,
) -> Result<(View, String), FlatqError> {
    let flags = scope.session.flags();
    let path = match resolve_table_path(name, &flags) {
        Ok(path) => path,
        Err(e) => {
            // A table created in this transaction exists only in the cache.
            if let Ok(candidate) = crate::file::resolve_new_table_path(name, &flags) {
                let key = path_key(&candidate);
                if let Some(view) = scope.session.cache.get(&key) {
                    return Ok((view, key));
                }
            }
            return Err(e);
        }
    };
    let key = path_key(&path);

    if let Some(view) = scope.session.cache.get(&key) {
        let was_update = scope
            .session
            .cache
            .loaded_for_update(&key)
            .unwrap_or(false);
        if for_update && !was_update {
            // Re-open for update: the read-only image is discarded.
            log::debug!("reloading {key} for update");
            scope.session.cache.dispose(&key);
        } else {
            return Ok((view, key));
        }
    }

    let handler = if for_update {
        FileHandler::acquire_exclusive(&path, &flags, &scope.session.cancel)?
    } else {
        FileHandler::check_shared(&path)?
    };
    let format = Format::from_path(&path);
    let mut info = FileInfo::new(path.clone(), format, &flags);
    let view = read_source(scope, &path, &mut info)?;
    log::debug!(
        "loaded {} ({} records, for_update={for_update})",
        path.display(),
        view.records.len()
    );
    scope.session.cache.set(
        key.clone(),
        view.clone(),
        for_update,
        if for_update { Some(handler) } else { None },
    );
    Ok((view, key))
}

/// Read and decode one file into a view, filling the descriptor's detected
/// encoding, line break, and load-time snapshot.
fn read_source(scope: &Scope<'_>, path: &Path, info: &mut FileInfo) -> Result<View, FlatqError> {
    scope.session.cancel.check()?;
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let (text, encoding) = decode_bytes(&bytes, info.encoding).map_err(|detail| {
        FlatqError::DataDecode {
            path: path.display().to_string(),
            detail,
        }
    })?;
    scope.session.cancel.check()?;
    info.encoding = encoding;
    info.line_break = detect_line_break(&text);
    let normalized = normalize_line_breaks(&text);
    let decoded = codec(info.format).decode(&normalized, info)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut view = View::from_decoded(decoded, Some(stem.as_str()), None)?;
    info.snapshot = Some(Snapshot {
        header: view.header.clone(),
        records: view.records.clone(),
    });
    view.file_info = Some(info.clone());
    Ok(view)
}

/// Materialize piped input once per transaction under the reserved STDIN
/// name.
fn load_stdin(scope: &Scope<'_>, alias: Option<&str>) -> Result<View, FlatqError> {
    let existing = {
        let temps = scope.session.temp_views.lock().expect("temp views lock");
        temps.get("STDIN")
    };
    let view = match existing {
        Some(v) => v,
        None => {
            let text = scope
                .session
                .stdin_text
                .lock()
                .expect("stdin lock")
                .clone()
                .ok_or_else(|| FlatqError::IoError {
                    path: "STDIN".to_string(),
                    detail: "stdin is empty".to_string(),
                })?;
            let flags = scope.session.flags();
            let mut info = FileInfo::temporary("STDIN");
            info.delimiter = flags.delimiter;
            info.no_header = flags.no_header;
            info.without_null = flags.without_null;
            let normalized = normalize_line_breaks(&text);
            let decoded = codec(Format::Csv).decode(&normalized, &info)?;
            let view = View::from_decoded(decoded, Some("STDIN"), Some(info))?;
            scope
                .session
                .temp_views
                .lock()
                .expect("temp views lock")
                .declare("STDIN", view.clone())?;
            view
        }
    };
    let mut v = view;
    if let Some(alias) = alias {
        v.header.update_view_name(alias);
    }
    Ok(v)
}

/// Load a source with an explicitly forced format, e.g.
/// `CSV(';', data.txt)` or `JSON('items', doc.json)`.
fn load_table_object(
    scope: &Scope<'_>,
    format_name: &str,
    source: &TableSource,
    args: &[Expr],
    alias: Option<&str>,
    ctx: &mut LoadContext<'_>,
) -> Result<View, FlatqError> {
    let format = Format::parse(format_name)
        .ok_or_else(|| FlatqError::InvalidValue(format!("{format_name} is not a table format")))?;
    let flags = scope.session.flags();
    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        evaluated.push(crate::eval::evaluate(arg, scope, None)?);
    }

    let mut info = FileInfo::temporary("TABLE_OBJECT");
    info.format = format;
    info.delimiter = if format == Format::Tsv { '\t' } else { flags.delimiter };
    info.encoding = flags.encoding;
    info.no_header = flags.no_header;
    info.without_null = flags.without_null;

    // The leading format argument: delimiter, positions, or path query.
    let mut rest = &evaluated[..];
    match format {
        Format::Csv => {
            let arg = first_string(&mut rest, "a delimiter")?;
            let mut chars = arg.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => info.delimiter = c,
                _ => {
                    return Err(FlatqError::InvalidValue(format!(
                        "{arg} is not a delimiter"
                    )));
                }
            }
        }
        Format::Fixed => {
            let arg = first_string(&mut rest, "delimiter positions")?;
            info.fixed = Some(crate::format::fixed::parse_spec(&arg)?);
        }
        Format::Json => {
            let arg = first_string(&mut rest, "a path query")?;
            info.json_query = arg;
        }
        Format::Tsv | Format::Ltsv => {}
    }
    // Optional trailing arguments: encoding, no-header, without-null.
    if let Some(v) = rest.first() {
        if let Some(s) = v.to_field() {
            info.encoding = crate::config::Encoding::parse(&s)
                .ok_or_else(|| FlatqError::InvalidValue(format!("{s} is not an encoding")))?;
        }
        rest = &rest[1..];
    }
    if let Some(v) = rest.first() {
        info.no_header = matches!(v.to_boolean(), Value::Boolean(true));
        rest = &rest[1..];
    }
    if let Some(v) = rest.first() {
        info.without_null = matches!(v.to_boolean(), Value::Boolean(true));
    }

    let (text, default_name) = match source {
        TableSource::Stdin => {
            let text = scope
                .session
                .stdin_text
                .lock()
                .expect("stdin lock")
                .clone()
                .ok_or_else(|| FlatqError::IoError {
                    path: "STDIN".to_string(),
                    detail: "stdin is empty".to_string(),
                })?;
            (text, "STDIN".to_string())
        }
        TableSource::Path(name) => {
            let path = resolve_table_path(name, &flags)?;
            let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
            let (text, encoding) =
                decode_bytes(&bytes, info.encoding).map_err(|detail| FlatqError::DataDecode {
                    path: path.display().to_string(),
                    detail,
                })?;
            info.encoding = encoding;
            info.path = path.clone();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());
            (text, stem)
        }
        _ => {
            return Err(FlatqError::InvalidValue(
                "a table object requires a file or STDIN source".into(),
            ));
        }
    };
    info.line_break = detect_line_break(&text);
    let normalized = normalize_line_breaks(&text);
    let decoded = codec(format).decode(&normalized, &info)?;
    let qualifier = alias.unwrap_or(&default_name).to_string();
    register_name(ctx, &qualifier)?;
    let mut view = View::from_decoded(decoded, Some(qualifier.as_str()), Some(info))?;
    view.header.update_view_name(&qualifier);
    Ok(view)
}

fn first_string(rest: &mut &[Value], what: &str) -> Result<String, FlatqError> {
    let v = rest
        .first()
        .ok_or_else(|| FlatqError::InvalidValue(format!("expected {what}")))?;
    *rest = &rest[1..];
    v.to_field()
        .ok_or_else(|| FlatqError::InvalidValue(format!("expected {what}")))
}

/// Execute a recursive WITH definition: run the base branch, then iterate
/// the step branch against the previous iteration's rows until it returns
/// nothing or the recursion limit trips.
pub fn execute_recursive(scope: &Scope<'_>, ct: &CommonTable) -> Result<View, FlatqError> {
    let SelectBody::SetOperation {
        op: SetOperator::Union,
        all,
        left,
        right,
    } = &ct.query.body
    else {
        return Err(FlatqError::SyntaxError(format!(
            "recursive table {} must be a UNION of a base and a recursive branch",
            ct.name
        )));
    };

    let mut result = execute_set_body(scope, left)?;
    apply_common_table_shape(&mut result, &ct.name, &ct.columns)?;

    let mut seen: IndexSet<u64> = IndexSet::new();
    let record_key = |r: &crate::record::Record| {
        value::hash_key(&r.cells().iter().map(|c| c.value().clone()).collect::<Vec<_>>())
    };
    if !all {
        let old = std::mem::take(&mut result.records);
        result.records = old
            .into_iter()
            .filter(|r| seen.insert(record_key(r)))
            .collect();
    }

    let limit = scope.session.flags().limit_recursion;
    let mut work = result.clone();
    let mut iterations: i64 = 0;
    while !work.records.is_empty() {
        scope.session.cancel.check()?;
        iterations += 1;
        if 0 < limit && limit < iterations {
            return Err(FlatqError::RecursionExceeded(limit));
        }
        let step_scope = scope.with_inline_table(&ct.name, work.clone());
        let mut next = execute_set_body(&step_scope, right)?;
        apply_common_table_shape(&mut next, &ct.name, &ct.columns)?;
        if next.header.len() != result.header.len() {
            return Err(FlatqError::CombinedFieldLength);
        }
        if !all {
            let old = std::mem::take(&mut next.records);
            next.records = old
                .into_iter()
                .filter(|r| seen.insert(record_key(r)))
                .collect();
        }
        if next.records.is_empty() {
            break;
        }
        result.records.extend(next.records.iter().cloned());
        work = next;
    }
    Ok(result)
}

/// Rename a WITH table's columns to its declared list and qualify every
/// field with the table name.
pub fn apply_common_table_shape(
    view: &mut View,
    name: &str,
    columns: &[String],
) -> Result<(), FlatqError> {
    if !columns.is_empty() {
        if columns.len() != view.header.len() {
            return Err(FlatqError::CombinedFieldLength);
        }
        for (i, col) in columns.iter().enumerate() {
            view.header.rename(i, col);
        }
    }
    view.header.update_view_name(name);
    Ok(())
}
