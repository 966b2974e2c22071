//! Statement driver: executes a program of statements.
//!
//! Each statement is dispatched on its AST kind and appends an
//! [`ExecResult`] to the session result set. Flow signals thread through
//! the control statements: BREAK and CONTINUE unwind to the enclosing
//! loop, EXIT terminates the program with a code, RETURN carries a value
//! out of a function body. An error aborts the program: the accumulated
//! results are retained for inspection but nothing is committed, and the
//! entry point rolls back.
//!
//! A program that ends normally (or via EXIT) commits implicitly;
//! uncaught errors roll back.

use crate::cursor::FetchMotion;
use crate::error::FlatqError;
use crate::eval::{Scope, evaluate, evaluate_predicate};
use crate::session::Session;
use crate::sql::ast::{FetchPosition, Statement, UserFunctionDecl};
use crate::sql::parser::parse_program;
use crate::transaction;
use crate::value::Value;
use crate::view::{self, View, dml};

/// Flow signal of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Exit(i32),
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    AlterTable,
    Print,
    Commit,
    Rollback,
    Notice,
}

/// One statement's outcome, accumulated into the session result set.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub kind: ResultKind,
    pub view: Option<View>,
    pub count: usize,
    pub log: String,
}

fn push_result(session: &Session, result: ExecResult) {
    session.results.lock().expect("results lock").push(result);
}

/// Drain the accumulated results, e.g. for rendering.
pub fn take_results(session: &Session) -> Vec<ExecResult> {
    std::mem::take(&mut *session.results.lock().expect("results lock"))
}

/// Parse and run a program. Commits on normal termination, rolls back on
/// error, and returns the process exit code.
pub fn run_program(session: &Session, text: &str) -> Result<i32, FlatqError> {
    let ansi_quotes = session.flags().ansi_quotes;
    let statements = parse_program(text, ansi_quotes)?;
    match execute_program(session, &statements) {
        Ok(Flow::Exit(code)) => {
            commit_results(session)?;
            Ok(code)
        }
        Ok(Flow::Break) | Ok(Flow::Continue) => {
            transaction::rollback(session);
            Err(FlatqError::ContextViolation(
                "BREAK or CONTINUE outside of a loop".into(),
            ))
        }
        Ok(_) => {
            commit_results(session)?;
            Ok(0)
        }
        Err(e) => {
            transaction::rollback(session);
            Err(e)
        }
    }
}

fn commit_results(session: &Session) -> Result<(), FlatqError> {
    for line in transaction::commit(session)? {
        push_result(
            session,
            ExecResult {
                kind: ResultKind::Commit,
                view: None,
                count: 0,
                log: line,
            },
        );
    }
    Ok(())
}

/// Execute a statement list, threading flow signals.
pub fn execute_program(session: &Session, statements: &[Statement]) -> Result<Flow, FlatqError> {
    for stmt in statements {
        match execute_statement(session, stmt)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn execute_statement(session: &Session, stmt: &Statement) -> Result<Flow, FlatqError> {
    session.cancel.check()?;
    let scope = Scope::root(session);
    match stmt {
        Statement::Select(query) => {
            let result = view::execute_query(&scope, query)?;
            if !query.into_vars.is_empty() {
                if query.into_vars.len() != result.header.len() {
                    return Err(FlatqError::RowValueLength {
                        expect: query.into_vars.len(),
                        actual: result.header.len(),
                    });
                }
                if result.records.len() > 1 {
                    return Err(FlatqError::SubqueryTooManyResults);
                }
                for (i, var) in query.into_vars.iter().enumerate() {
                    let v = result
                        .records
                        .first()
                        .map(|r| r.value(i).clone())
                        .unwrap_or(Value::Null);
                    session.var_set(var, v)?;
                }
                return Ok(Flow::Normal);
            }
            let n = result.records.len();
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Select,
                    view: Some(result),
                    count: n,
                    log: format!("{n} record(s) selected"),
                },
            );
        }

        Statement::Insert(stmt) => {
            let count = dml::execute_insert(&scope, &stmt.table, &stmt.fields, &stmt.source)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Insert,
                    view: None,
                    count: count.count,
                    log: format!("{} record(s) inserted on {}", count.count, count.table),
                },
            );
        }

        Statement::Replace(stmt) => {
            let count = dml::execute_replace(&scope, stmt)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Replace,
                    view: None,
                    count: count.count,
                    log: format!("{} record(s) replaced on {}", count.count, count.table),
                },
            );
        }

        Statement::Update(stmt) => {
            for count in dml::execute_update(&scope, stmt)? {
                push_result(
                    session,
                    ExecResult {
                        kind: ResultKind::Update,
                        view: None,
                        count: count.count,
                        log: format!("{} record(s) updated on {}", count.count, count.table),
                    },
                );
            }
        }

        Statement::Delete(stmt) => {
            for count in dml::execute_delete(&scope, stmt)? {
                push_result(
                    session,
                    ExecResult {
                        kind: ResultKind::Delete,
                        view: None,
                        count: count.count,
                        log: format!("{} record(s) deleted on {}", count.count, count.table),
                    },
                );
            }
        }

        Statement::CreateTable {
            path,
            fields,
            query,
        } => {
            let (display, field_count) =
                dml::execute_create(&scope, path, fields, query.as_ref())?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Create,
                    view: None,
                    count: field_count,
                    log: format!("file {display} is created"),
                },
            );
        }

        Statement::AddColumns {
            table,
            columns,
            position,
        } => {
            let count = dml::execute_add_columns(&scope, table, columns, position)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::AlterTable,
                    view: None,
                    count: count.count,
                    log: format!("{} field(s) added on {}", count.count, count.table),
                },
            );
        }

        Statement::DropColumns { table, columns } => {
            let count = dml::execute_drop_columns(&scope, table, columns)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::AlterTable,
                    view: None,
                    count: count.count,
                    log: format!("{} field(s) dropped on {}", count.count, count.table),
                },
            );
        }

        Statement::RenameColumn { table, old, new } => {
            let count = dml::execute_rename_column(&scope, table, old, new)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::AlterTable,
                    view: None,
                    count: count.count,
                    log: format!("field {old} renamed to {new} on {}", count.table),
                },
            );
        }

        Statement::SetTableAttribute {
            table,
            attribute,
            value,
        } => {
            let v = evaluate(value, &scope, None)?;
            let count = dml::execute_set_attribute(&scope, table, attribute, &v)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::AlterTable,
                    view: None,
                    count: count.count,
                    log: format!(
                        "attribute {attribute} set to {} on {}",
                        v.to_display_string(),
                        count.table
                    ),
                },
            );
        }

        Statement::DeclareVariables(decls) => {
            for (name, init) in decls {
                let v = match init {
                    Some(expr) => evaluate(expr, &scope, None)?,
                    None => Value::Null,
                };
                session.var_declare(name, v)?;
            }
        }

        Statement::SetVariable { name, expr } => {
            let v = evaluate(expr, &scope, None)?;
            session.var_set(name, v)?;
        }

        Statement::SetFlag { name, value } => {
            let v = evaluate(value, &scope, None)?;
            session
                .flags
                .write()
                .expect("flags lock")
                .set(name, &v)?;
            if name.eq_ignore_ascii_case("CPU") {
                let cpu = session.flags().cpu;
                session.rebuild_pool(cpu)?;
            }
        }

        Statement::AddFlagElement { name, value } => {
            let v = evaluate(value, &scope, None)?;
            session
                .flags
                .write()
                .expect("flags lock")
                .add_element(name, &v)?;
        }

        Statement::RemoveFlagElement { name, value } => {
            let v = evaluate(value, &scope, None)?;
            session
                .flags
                .write()
                .expect("flags lock")
                .remove_element(name, &v)?;
        }

        Statement::DeclareTable {
            name,
            fields,
            query,
        } => {
            let mut v = match query {
                Some(q) => {
                    let mut v = view::execute_query(&scope, q)?;
                    if !fields.is_empty() {
                        if fields.len() != v.header.len() {
                            return Err(FlatqError::CombinedFieldLength);
                        }
                        for (i, f) in fields.iter().enumerate() {
                            v.header.rename(i, f);
                        }
                    }
                    v
                }
                None => View {
                    header: crate::record::Header::from_columns(Some(name.as_str()), fields)?,
                    ..View::default()
                },
            };
            v.header.update_view_name(name);
            v.file_info = Some(crate::file::FileInfo::temporary(name));
            session
                .temp_views
                .lock()
                .expect("temp views lock")
                .declare(name, v)?;
        }

        Statement::DeclareCursor { name, query } => {
            session
                .cursors
                .lock()
                .expect("cursors lock")
                .declare(name, query.clone())?;
        }

        Statement::OpenCursor(name) => {
            let query = session
                .cursors
                .lock()
                .expect("cursors lock")
                .query_for_open(name)?;
            let result = view::execute_query(&scope, &query)?;
            session
                .cursors
                .lock()
                .expect("cursors lock")
                .open(name, result)?;
        }

        Statement::CloseCursor(name) => {
            session
                .cursors
                .lock()
                .expect("cursors lock")
                .close(name)?;
        }

        Statement::DisposeCursor(name) => {
            session
                .cursors
                .lock()
                .expect("cursors lock")
                .dispose(name)?;
        }

        Statement::Fetch {
            cursor,
            position,
            into_vars,
        } => {
            let motion = lower_fetch_position(session, position)?;
            let row = session
                .cursors
                .lock()
                .expect("cursors lock")
                .fetch(cursor, &motion)?;
            if let Some(values) = row {
                if values.len() != into_vars.len() {
                    return Err(FlatqError::RowValueLength {
                        expect: into_vars.len(),
                        actual: values.len(),
                    });
                }
                for (var, v) in into_vars.iter().zip(values) {
                    session.var_set(var, v)?;
                }
            }
        }

        Statement::DeclareFunction(decl) => {
            session
                .functions
                .lock()
                .expect("functions lock")
                .declare(decl.clone())?;
        }

        Statement::Return(_) => {
            return Err(FlatqError::ContextViolation(
                "RETURN is only allowed in a function body".into(),
            ));
        }

        Statement::If {
            branches,
            else_block,
        } => {
            for (condition, block) in branches {
                if evaluate_predicate(condition, &scope, None)?.is_true() {
                    return execute_block(session, block);
                }
            }
            return execute_block(session, else_block);
        }

        Statement::While { condition, body } => {
            loop {
                session.cancel.check()?;
                if !evaluate_predicate(condition, &scope, None)?.is_true() {
                    break;
                }
                match execute_block(session, body)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    other => return Ok(other),
                }
            }
        }

        Statement::WhileInCursor {
            variables,
            cursor,
            body,
        } => {
            loop {
                session.cancel.check()?;
                let row = session
                    .cursors
                    .lock()
                    .expect("cursors lock")
                    .fetch(cursor, &FetchMotion::Next)?;
                let Some(values) = row else {
                    break;
                };
                if values.len() != variables.len() {
                    return Err(FlatqError::RowValueLength {
                        expect: variables.len(),
                        actual: values.len(),
                    });
                }
                for (var, v) in variables.iter().zip(values) {
                    session.var_set(var, v)?;
                }
                match execute_block(session, body)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    other => return Ok(other),
                }
            }
        }

        Statement::Break => return Ok(Flow::Break),
        Statement::Continue => return Ok(Flow::Continue),

        Statement::Exit(code) => {
            let code = match code {
                Some(expr) => match evaluate(expr, &scope, None)?.to_integer() {
                    Value::Integer(n) => n as i32,
                    _ => 0,
                },
                None => 0,
            };
            return Ok(Flow::Exit(code));
        }

        Statement::Commit => {
            commit_results(session)?;
        }

        Statement::Rollback => {
            transaction::rollback(session);
            let mut results = session.results.lock().expect("results lock");
            results.clear();
            results.push(ExecResult {
                kind: ResultKind::Rollback,
                view: None,
                count: 0,
                log: "Rollback: uncommitted changes are discarded".to_string(),
            });
        }

        Statement::Print(expr) => {
            let v = evaluate(expr, &scope, None)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Print,
                    view: None,
                    count: 0,
                    log: v.to_display_string(),
                },
            );
        }

        Statement::Printf { format, args } => {
            let fmt = match evaluate(format, &scope, None)?.to_field() {
                Some(s) => s,
                None => {
                    return Err(FlatqError::InvalidValue(
                        "the format of PRINTF must be a string".into(),
                    ));
                }
            };
            let mut rendered_args = Vec::with_capacity(args.len());
            for arg in args {
                rendered_args.push(evaluate(arg, &scope, None)?);
            }
            let text = format_placeholders(&fmt, &rendered_args)?;
            push_result(
                session,
                ExecResult {
                    kind: ResultKind::Print,
                    view: None,
                    count: 0,
                    log: text,
                },
            );
        }

        Statement::Source(expr) => {
            let path = match evaluate(expr, &scope, None)?.to_field() {
                Some(s) => s,
                None => {
                    return Err(FlatqError::InvalidValue(
                        "the argument of SOURCE must be a file path".into(),
                    ));
                }
            };
            let text = std::fs::read_to_string(&path).map_err(|e| FlatqError::IoError {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            let ansi_quotes = session.flags().ansi_quotes;
            let statements = parse_program(&text, ansi_quotes)?;
            return execute_program(session, &statements);
        }

        Statement::Execute { text, args } => {
            let fmt = match evaluate(text, &scope, None)?.to_field() {
                Some(s) => s,
                None => {
                    return Err(FlatqError::InvalidValue(
                        "the argument of EXECUTE must be a string".into(),
                    ));
                }
            };
            let mut rendered_args = Vec::with_capacity(args.len());
            for arg in args {
                rendered_args.push(evaluate(arg, &scope, None)?);
            }
            let sql = format_placeholders(&fmt, &rendered_args)?;
            let ansi_quotes = session.flags().ansi_quotes;
            let statements = parse_program(&sql, ansi_quotes)?;
            return execute_program(session, &statements);
        }
    }
    Ok(Flow::Normal)
}

fn execute_block(session: &Session, block: &[Statement]) -> Result<Flow, FlatqError> {
    execute_program(session, block)
}

fn lower_fetch_position(
    session: &Session,
    position: &FetchPosition,
) -> Result<FetchMotion, FlatqError> {
    let scope = Scope::root(session);
    let n = match position {
        FetchPosition::Absolute(expr) | FetchPosition::Relative(expr) => {
            match evaluate(expr, &scope, None)?.to_integer() {
                Value::Integer(n) => Some(n),
                _ => None,
            }
        }
        _ => None,
    };
    FetchMotion::from_position(position, n)
}

/// `%s` substitution for PRINTF and EXECUTE; `%%` is a literal percent.
fn format_placeholders(fmt: &str, args: &[Value]) -> Result<String, FlatqError> {
    let mut out = String::with_capacity(fmt.len());
    let mut iter = fmt.chars().peekable();
    let mut next_arg = 0;
    while let Some(c) = iter.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match iter.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let arg = args.get(next_arg).ok_or_else(|| {
                    FlatqError::InvalidValue(format!(
                        "format placeholder {} has no argument",
                        next_arg + 1
                    ))
                })?;
                out.push_str(&arg.to_field().unwrap_or_default());
                next_arg += 1;
            }
            _ => {
                return Err(FlatqError::InvalidValue(
                    "invalid format placeholder".into(),
                ));
            }
        }
    }
    Ok(out)
}

// ── User functions ──────────────────────────────────────────────────────

fn bind_params(
    session: &Session,
    decl: &UserFunctionDecl,
    args: &[Value],
) -> Result<Vec<(String, Value)>, FlatqError> {
    let required = decl.params.iter().filter(|(_, d)| d.is_none()).count();
    if args.len() < required || decl.params.len() < args.len() {
        return Err(FlatqError::FunctionArgumentLength {
            name: decl.name.clone(),
            expect: if required == decl.params.len() {
                format!("{required} argument(s)")
            } else {
                format!("{required} to {} arguments", decl.params.len())
            },
            actual: args.len(),
        });
    }
    let scope = Scope::root(session);
    let mut bound = Vec::with_capacity(decl.params.len());
    for (i, (name, default)) in decl.params.iter().enumerate() {
        let v = match args.get(i) {
            Some(v) => v.clone(),
            None => match default {
                Some(expr) => evaluate(expr, &scope, None)?,
                None => Value::Null,
            },
        };
        bound.push((name.clone(), v));
    }
    Ok(bound)
}

fn with_function_scopes<T>(
    session: &Session,
    f: impl FnOnce() -> Result<T, FlatqError>,
) -> Result<T, FlatqError> {
    session.vars.lock().expect("vars lock").push_scope();
    session.cursors.lock().expect("cursors lock").push_scope();
    session
        .functions
        .lock()
        .expect("functions lock")
        .push_scope();
    session
        .temp_views
        .lock()
        .expect("temp views lock")
        .push_scope();
    let result = f();
    session.vars.lock().expect("vars lock").pop_scope();
    session.cursors.lock().expect("cursors lock").pop_scope();
    session
        .functions
        .lock()
        .expect("functions lock")
        .pop_scope();
    session
        .temp_views
        .lock()
        .expect("temp views lock")
        .pop_scope();
    result
}

/// Call a user-declared scalar function.
pub fn call_user_function(
    session: &Session,
    decl: &UserFunctionDecl,
    args: Vec<Value>,
) -> Result<Value, FlatqError> {
    let bound = bind_params(session, decl, &args)?;
    with_function_scopes(session, || {
        {
            let mut vars = session.vars.lock().expect("vars lock");
            for (name, v) in &bound {
                vars.declare(name, v.clone())?;
            }
        }
        match run_function_body(session, &decl.body)? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Null),
        }
    })
}

/// Call a user-declared aggregate: the group's values become an implicitly
/// open pseudo-cursor named by the declaration's first parameter.
pub fn call_user_aggregate(
    session: &Session,
    decl: &UserFunctionDecl,
    values: Vec<Value>,
    args: Vec<Value>,
) -> Result<Value, FlatqError> {
    let cursor_name = decl
        .cursor_param
        .clone()
        .ok_or_else(|| FlatqError::InternalError("not an aggregate declaration".into()))?;
    let bound = bind_params(session, decl, &args)?;
    with_function_scopes(session, || {
        {
            let mut vars = session.vars.lock().expect("vars lock");
            for (name, v) in &bound {
                vars.declare(name, v.clone())?;
            }
        }
        session
            .cursors
            .lock()
            .expect("cursors lock")
            .declare_open_values(&cursor_name, values.clone())?;
        match run_function_body(session, &decl.body)? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Null),
        }
    })
}

/// Execute a function body: RETURN is legal here and terminates it.
fn run_function_body(session: &Session, body: &[Statement]) -> Result<Flow, FlatqError> {
    for stmt in body {
        let flow = match stmt {
            Statement::Return(expr) => {
                let scope = Scope::root(session);
                let v = match expr {
                    Some(e) => evaluate(e, &scope, None)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(v));
            }
            Statement::If {
                branches,
                else_block,
            } => {
                let scope = Scope::root(session);
                let mut flow = Flow::Normal;
                let mut matched = false;
                for (condition, block) in branches {
                    if evaluate_predicate(condition, &scope, None)?.is_true() {
                        flow = run_function_body(session, block)?;
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    flow = run_function_body(session, else_block)?;
                }
                flow
            }
            Statement::While { condition, body } => {
                let mut flow = Flow::Normal;
                loop {
                    session.cancel.check()?;
                    let scope = Scope::root(session);
                    if !evaluate_predicate(condition, &scope, None)?.is_true() {
                        break;
                    }
                    match run_function_body(session, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        other => {
                            flow = other;
                            break;
                        }
                    }
                }
                flow
            }
            Statement::WhileInCursor {
                variables,
                cursor,
                body,
            } => {
                let mut flow = Flow::Normal;
                loop {
                    session.cancel.check()?;
                    let row = session
                        .cursors
                        .lock()
                        .expect("cursors lock")
                        .fetch(cursor, &FetchMotion::Next)?;
                    let Some(values) = row else {
                        break;
                    };
                    if values.len() != variables.len() {
                        return Err(FlatqError::RowValueLength {
                            expect: variables.len(),
                            actual: values.len(),
                        });
                    }
                    for (var, v) in variables.iter().zip(values) {
                        session.var_set(var, v)?;
                    }
                    match run_function_body(session, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        other => {
                            flow = other;
                            break;
                        }
                    }
                }
                flow
            }
            other => execute_statement(session, other)?,
        };
        match flow {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;

    fn session() -> Session {
        Session::new(SessionFlags::default()).unwrap()
    }

    fn run(session: &Session, text: &str) -> Result<i32, FlatqError> {
        run_program(session, text)
    }

    fn select_rows(session: &Session) -> Vec<Vec<Value>> {
        take_results(session)
            .into_iter()
            .filter(|r| r.kind == ResultKind::Select)
            .flat_map(|r| {
                let view = r.view.unwrap();
                let width = view.header.len();
                view.records
                    .iter()
                    .map(|rec| (0..width).map(|i| rec.value(i).clone()).collect())
                    .collect::<Vec<Vec<Value>>>()
            })
            .collect()
    }

    #[test]
    fn scalar_select_without_from() {
        let session = session();
        run(&session, "SELECT 1 + 2;").unwrap();
        assert_eq!(select_rows(&session), vec![vec![Value::Integer(3)]]);
    }

    #[test]
    fn variables_and_while_loop() {
        let session = session();
        run(
            &session,
            "DECLARE @i := 0, @total := 0; \
             WHILE @i < 5 DO \
               SET @i = @i + 1; \
               IF @i = 3 THEN CONTINUE; END IF; \
               SET @total = @total + @i; \
             END WHILE; \
             SELECT @total;",
        )
        .unwrap();
        assert_eq!(select_rows(&session), vec![vec![Value::Integer(12)]]);
    }

    #[test]
    fn exit_carries_its_code() {
        let session = session();
        let code = run(&session, "EXIT 3;").unwrap();
        assert_eq!(code, 3);
        let code = run(&session, "SELECT 1; EXIT;").unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let session = session();
        assert!(matches!(
            run(&session, "BREAK;"),
            Err(FlatqError::ContextViolation(_))
        ));
    }

    #[test]
    fn user_function_with_default_and_return() {
        let session = session();
        run(
            &session,
            "DECLARE add2 FUNCTION (@x, @y DEFAULT 10) AS BEGIN \
               RETURN @x + @y; \
             END; \
             SELECT add2(1), add2(1, 2);",
        )
        .unwrap();
        assert_eq!(
            select_rows(&session),
            vec![vec![Value::Integer(11), Value::Integer(3)]]
        );
    }

    #[test]
    fn user_aggregate_over_pseudo_cursor() {
        let session = session();
        run(
            &session,
            "DECLARE second FUNCTION (@unused) AS BEGIN RETURN 0; END; \
             DECLARE total AGGREGATE (list) AS BEGIN \
               DECLARE @sum := 0, @v; \
               WHILE @v IN list DO SET @sum = @sum + @v; END WHILE; \
               RETURN @sum; \
             END; \
             DECLARE src TABLE (n); \
             INSERT INTO src VALUES (1), (2), (3); \
             SELECT total(n) FROM src;",
        )
        .unwrap();
        assert_eq!(select_rows(&session), vec![vec![Value::Integer(6)]]);
    }

    #[test]
    fn declared_table_dml_and_select_into() {
        let session = session();
        run(
            &session,
            "DECLARE t TABLE (a, b); \
             DECLARE @result; \
             INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y'); \
             UPDATE t SET b = 'z' WHERE a = 2; \
             DELETE FROM t WHERE a = 1; \
             SELECT b INTO @result FROM t; \
             SELECT @result;",
        )
        .unwrap();
        assert_eq!(
            select_rows(&session),
            vec![vec![Value::String("z".into())]]
        );
    }

    #[test]
    fn cursor_loop_accumulates() {
        let session = session();
        run(
            &session,
            "DECLARE t TABLE (n); \
             INSERT INTO t VALUES (1), (2), (3); \
             DECLARE cur CURSOR FOR SELECT n FROM t; \
             OPEN cur; \
             DECLARE @n, @sum := 0; \
             WHILE @n IN cur DO SET @sum = @sum + @n; END WHILE; \
             CLOSE cur; DISPOSE CURSOR cur; \
             SELECT @sum;",
        )
        .unwrap();
        assert_eq!(select_rows(&session), vec![vec![Value::Integer(6)]]);
    }

    #[test]
    fn printf_formats_placeholders() {
        let session = session();
        run(&session, "PRINTF '%s-%s%%' USING 1, 'a';").unwrap();
        let results = take_results(&session);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].log, "1-a%");
    }

    #[test]
    fn execute_runs_dynamic_sql() {
        let session = session();
        run(&session, "EXECUTE 'SELECT %s + 1;' USING 41;").unwrap();
        assert_eq!(select_rows(&session), vec![vec![Value::Integer(42)]]);
    }

    #[test]
    fn recursive_query_end_to_end() {
        let session = session();
        run(
            &session,
            "WITH RECURSIVE r (n) AS (\
               SELECT 1 \
               UNION ALL \
               SELECT n + 1 FROM r WHERE n < (SELECT 3)\
             ) SELECT n FROM r;",
        )
        .unwrap();
        assert_eq!(
            select_rows(&session),
            vec![
                vec![Value::Integer(1)],
                vec![Value::Integer(2)],
                vec![Value::Integer(3)],
            ]
        );
    }
}
