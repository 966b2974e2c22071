//! Expression evaluation against a stack of scope frames.
//!
//! A [`Scope`] is one frame of the name-resolution stack with a link to its
//! parent: session-wide state (variables, flags, environment) sits at the
//! root, WITH tables and recursive work tables are frame-local, and the
//! innermost frames pin `(view, record)` pairs. Subquery evaluation pushes
//! a child scope; parent frames are never mutated.
//!
//! `element` carries the group element index while an aggregate argument is
//! being evaluated over a grouped record: column reads inside the argument
//! read position `i` of their cell instead of the scalar. A scalar read of
//! a grouped non-key column is an error; an aggregate over an ungrouped
//! view raises the `NotGrouping` signal that SELECT and HAVING intercept.

pub mod aggregate;
pub mod analytic;
pub mod function;

use indexmap::IndexMap;

use crate::error::FlatqError;
use crate::session::Session;
use crate::sql::ast::{CommonTable, Expr};
use crate::value::{self, Ternary, Value};
use crate::view::{self, View};

/// Names of the built-in aggregate functions.
pub const AGGREGATE_NAMES: &[&str] = &[
    "COUNT", "MIN", "MAX", "SUM", "AVG", "MEDIAN", "STDEV", "STDEVP", "VAR", "VARP", "LISTAGG",
    "JSON_AGG",
];

/// A record pinned for evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RecordPin<'a> {
    pub view: &'a View,
    pub index: usize,
}

/// A WITH-clause table visible to a query.
#[derive(Debug, Clone)]
pub enum CommonTableEntry {
    /// Already executed.
    Materialized(View),
    /// Recursive definition, executed on first FROM reference.
    Recursive(CommonTable),
}

/// One frame of the resolution stack.
#[derive(Debug)]
pub struct Scope<'a> {
    pub session: &'a Session,
    parent: Option<&'a Scope<'a>>,
    record: Option<RecordPin<'a>>,
    common_tables: IndexMap<String, CommonTableEntry>,
    inline_tables: IndexMap<String, View>,
}

impl<'a> Scope<'a> {
    pub fn root(session: &'a Session) -> Scope<'a> {
        Scope {
            session,
            parent: None,
            record: None,
            common_tables: IndexMap::new(),
            inline_tables: IndexMap::new(),
        }
    }

    /// Child frame carrying a query's WITH tables.
    pub fn with_common_tables<'b>(
        &'b self,
        tables: IndexMap<String, CommonTableEntry>,
    ) -> Scope<'b> {
        Scope {
            session: self.session,
            parent: Some(self),
            record: None,
            common_tables: tables,
            inline_tables: IndexMap::new(),
        }
    }

    /// Child frame binding a recursive work table.
    pub fn with_inline_table<'b>(&'b self, name: &str, view: View) -> Scope<'b> {
        let mut tables = IndexMap::new();
        tables.insert(name.to_uppercase(), view);
        Scope {
            session: self.session,
            parent: Some(self),
            record: None,
            common_tables: IndexMap::new(),
            inline_tables: tables,
        }
    }

    /// Child frame pinning a record of `view`.
    pub fn with_record<'b>(&'b self, view: &'b View, index: usize) -> Scope<'b> {
        Scope {
            session: self.session,
            parent: Some(self),
            record: Some(RecordPin { view, index }),
            common_tables: IndexMap::new(),
            inline_tables: IndexMap::new(),
        }
    }

    /// Innermost pinned record.
    pub fn nearest_record(&self) -> Option<RecordPin<'_>> {
        let mut scope: &Scope<'_> = self;
        loop {
            if let Some(pin) = scope.record {
                return Some(pin);
            }
            scope = scope.parent?;
        }
    }

    /// Resolve a column reference, innermost frame first. Ambiguity inside
    /// one frame is an error; absence moves outward.
    fn resolve_field(
        &self,
        view_name: Option<&str>,
        column: &str,
    ) -> Result<(RecordPin<'_>, usize), FlatqError> {
        let mut scope: &Scope<'_> = self;
        loop {
            if let Some(pin) = scope.record {
                match pin.view.header.contains(view_name, column) {
                    Ok(idx) => return Ok((pin, idx)),
                    Err(e @ FlatqError::FieldAmbiguous(_)) => return Err(e),
                    Err(_) => {}
                }
            }
            match scope.parent {
                Some(parent) => scope = parent,
                None => {
                    let name = match view_name {
                        Some(v) => format!("{v}.{column}"),
                        None => column.to_string(),
                    };
                    return Err(FlatqError::FieldNotExist(name));
                }
            }
        }
    }

    fn resolve_column_number(
        &self,
        view_name: &str,
        number: usize,
    ) -> Result<(RecordPin<'_>, usize), FlatqError> {
        let mut scope: &Scope<'_> = self;
        loop {
            if let Some(pin) = scope.record {
                if let Ok(idx) = pin.view.header.contains_number(view_name, number) {
                    return Ok((pin, idx));
                }
            }
            match scope.parent {
                Some(parent) => scope = parent,
                None => {
                    return Err(FlatqError::FieldNotExist(format!("{view_name}.{number}")));
                }
            }
        }
    }

    /// Look up a WITH table visible from this scope.
    pub fn find_common_table(&self, name: &str) -> Option<CommonTableEntry> {
        let key = name.to_uppercase();
        let mut scope: &Scope<'_> = self;
        loop {
            if let Some(entry) = scope.common_tables.get(&key) {
                return Some(entry.clone());
            }
            if let Some(v) = scope.inline_tables.get(&key) {
                return Some(CommonTableEntry::Materialized(v.clone()));
            }
            scope = scope.parent?;
        }
    }
}

/// Whether evaluating `expr` can touch session-scoped mutable state:
/// variable assignment, user function bodies (which push scopes), or a
/// subquery (which may contain either). Such expressions must be evaluated
/// in record order on one thread; everything else is safe to fan out.
pub fn requires_sequential(expr: &Expr, session: &Session) -> bool {
    let check = |e: &Expr| requires_sequential(e, session);
    match expr {
        Expr::VarAssign { .. }
        | Expr::ScalarSubquery(_)
        | Expr::InSubquery { .. }
        | Expr::Exists(_) => true,
        Expr::Function { name, args, .. } => {
            let is_user = session
                .functions
                .lock()
                .expect("functions lock")
                .lookup(name)
                .is_some();
            is_user || args.iter().any(check)
        }
        Expr::Analytic {
            args,
            partition,
            order,
            ..
        } => {
            args.iter().any(check)
                || partition.iter().any(check)
                || order.iter().any(|o| check(&o.expr))
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
        _ => false,
    }
}

/// Truth of a value in a predicate position: anything that does not convert
/// to a known ternary is UNKNOWN.
pub fn ternary_of(v: &Value) -> Ternary {
    match v.to_ternary() {
        Value::Ternary(t) => t,
        _ => Ternary::Unknown,
    }
}

/// Evaluate to a predicate result.
pub fn evaluate_predicate(
    expr: &Expr,
    scope: &Scope<'_>,
    element: Option<usize>,
) -> Result<Ternary, FlatqError> {
    Ok(ternary_of(&evaluate(expr, scope, element)?))
}

/// Evaluate an expression.
pub fn evaluate(expr: &Expr, scope: &Scope<'_>, element: Option<usize>) -> Result<Value, FlatqError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::FieldRef { view, column } => {
            let (pin, idx) = scope.resolve_field(view.as_deref(), column)?;
            read_cell(pin, idx, element)
        }

        Expr::ColumnNumber { view, number } => {
            let (pin, idx) = scope.resolve_column_number(view, *number)?;
            read_cell(pin, idx, element)
        }

        Expr::Star { .. } => Err(FlatqError::ContextViolation(
            "* is only allowed in a select list or COUNT".into(),
        )),

        Expr::Var(name) => scope.session.var_get(name),

        Expr::VarAssign { name, expr } => {
            let v = evaluate(expr, scope, element)?;
            scope.session.var_set(name, v.clone())?;
            Ok(v)
        }

        Expr::Flag(name) => {
            let flags = scope.session.flags.read().expect("flags lock");
            flags.get(name)
        }

        Expr::EnvVar(name) => Ok(Value::String(std::env::var(name).unwrap_or_default())),

        Expr::Minus(inner) => {
            let v = evaluate(inner, scope, element)?;
            Ok(value::negate(&v))
        }

        Expr::Arithmetic { op, left, right } => {
            let l = evaluate(left, scope, element)?;
            let r = evaluate(right, scope, element)?;
            Ok(value::arithmetic(*op, &l, &r))
        }

        Expr::Concat(left, right) => {
            let l = evaluate(left, scope, element)?;
            let r = evaluate(right, scope, element)?;
            match (l.to_field(), r.to_field()) {
                (Some(a), Some(b)) => Ok(Value::String(format!("{a}{b}"))),
                _ => Ok(Value::Null),
            }
        }

        Expr::Comparison { op, left, right } => {
            let l = evaluate(left, scope, element)?;
            let r = evaluate(right, scope, element)?;
            let ignore_case = scope.session.flags().ignore_case;
            Ok(Value::Ternary(value::relational(op, &l, &r, ignore_case)))
        }

        Expr::Identical { left, right } => {
            let l = evaluate(left, scope, element)?;
            let r = evaluate(right, scope, element)?;
            Ok(Value::Ternary(value::identical(&l, &r)))
        }

        Expr::Is {
            negated,
            expr,
            target,
        } => {
            let v = evaluate(expr, scope, element)?;
            let t = evaluate(target, scope, element)?;
            let result = if t.is_null() {
                Ternary::from_bool(v.is_null())
            } else {
                Ternary::from_bool(ternary_of(&v) == ternary_of(&t))
            };
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }

        Expr::Between {
            negated,
            expr,
            low,
            high,
        } => {
            let v = evaluate(expr, scope, element)?;
            let lo = evaluate(low, scope, element)?;
            let hi = evaluate(high, scope, element)?;
            let ignore_case = scope.session.flags().ignore_case;
            let result = value::relational(">=", &v, &lo, ignore_case)
                .and(value::relational("<=", &v, &hi, ignore_case));
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }

        Expr::InList {
            negated,
            expr,
            list,
        } => {
            let v = evaluate(expr, scope, element)?;
            let mut values = Vec::with_capacity(list.len());
            for item in list {
                values.push(evaluate(item, scope, element)?);
            }
            in_values(&v, &values, *negated, scope)
        }

        Expr::InSubquery {
            negated,
            expr,
            query,
        } => {
            let v = evaluate(expr, scope, element)?;
            let result = view::execute_query(scope, query)?;
            if result.header.len() != 1 {
                return Err(FlatqError::SubqueryTooManyResults);
            }
            let values: Vec<Value> = result.records.iter().map(|r| r.value(0).clone()).collect();
            in_values(&v, &values, *negated, scope)
        }

        Expr::Like {
            negated,
            expr,
            pattern,
        } => {
            let v = evaluate(expr, scope, element)?;
            let p = evaluate(pattern, scope, element)?;
            let ignore_case = scope.session.flags().ignore_case;
            let result = match (v.to_field(), p.to_field()) {
                (Some(text), Some(pat)) => {
                    Ternary::from_bool(like_match(&text, &pat, ignore_case))
                }
                _ => Ternary::Unknown,
            };
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }

        Expr::Exists(query) => {
            let result = view::execute_query(scope, query)?;
            Ok(Value::Ternary(Ternary::from_bool(!result.records.is_empty())))
        }

        Expr::And(left, right) => {
            let l = evaluate_predicate(left, scope, element)?;
            if l == Ternary::False {
                return Ok(Value::Ternary(Ternary::False));
            }
            let r = evaluate_predicate(right, scope, element)?;
            Ok(Value::Ternary(l.and(r)))
        }

        Expr::Or(left, right) => {
            let l = evaluate_predicate(left, scope, element)?;
            if l == Ternary::True {
                return Ok(Value::Ternary(Ternary::True));
            }
            let r = evaluate_predicate(right, scope, element)?;
            Ok(Value::Ternary(l.or(r)))
        }

        Expr::Not(inner) => {
            let t = evaluate_predicate(inner, scope, element)?;
            Ok(Value::Ternary(t.not()))
        }

        Expr::Function {
            name,
            args,
            distinct,
        } => call_function(name, args, *distinct, scope, element),

        Expr::Analytic { name, .. } => {
            Err(FlatqError::AnalyticFunctionNotAllowed(name.clone()))
        }

        Expr::ScalarSubquery(query) => {
            let result = view::execute_query(scope, query)?;
            if result.header.len() != 1 || result.records.len() > 1 {
                return Err(FlatqError::SubqueryTooManyResults);
            }
            match result.records.first() {
                Some(record) => Ok(record.value(0).clone()),
                None => Ok(Value::Null),
            }
        }

        Expr::Case {
            operand,
            branches,
            else_expr,
        } => {
            let operand_value = match operand {
                Some(op) => Some(evaluate(op, scope, element)?),
                None => None,
            };
            let ignore_case = scope.session.flags().ignore_case;
            for (condition, result) in branches {
                let hit = match &operand_value {
                    Some(op) => {
                        let c = evaluate(condition, scope, element)?;
                        value::equal(op, &c, ignore_case).is_true()
                    }
                    None => evaluate_predicate(condition, scope, element)?.is_true(),
                };
                if hit {
                    return evaluate(result, scope, element);
                }
            }
            match else_expr {
                Some(e) => evaluate(e, scope, element),
                None => Ok(Value::Null),
            }
        }
    }
}

/// Read a pinned cell under the grouping rules.
fn read_cell(pin: RecordPin<'_>, idx: usize, element: Option<usize>) -> Result<Value, FlatqError> {
    let cell = pin.view.records[pin.index].cell(idx);
    if pin.view.is_grouped {
        match element {
            Some(i) => Ok(cell.at(i).clone()),
            None => {
                let field = pin.view.header.field(idx);
                if field.is_group_key {
                    Ok(cell.value().clone())
                } else {
                    Err(FlatqError::FieldNotGroupKey(field.column.clone()))
                }
            }
        }
    } else {
        Ok(cell.value().clone())
    }
}

/// Membership with Kleene semantics: an unmatched NULL element makes the
/// result UNKNOWN rather than FALSE, so `NOT IN` over a list with NULL is
/// UNKNOWN when nothing matches.
fn in_values(
    v: &Value,
    values: &[Value],
    negated: bool,
    scope: &Scope<'_>,
) -> Result<Value, FlatqError> {
    let ignore_case = scope.session.flags().ignore_case;
    let mut result = Ternary::False;
    for item in values {
        result = result.or(value::equal(v, item, ignore_case));
        if result == Ternary::True {
            break;
        }
    }
    Ok(Value::Ternary(if negated { result.not() } else { result }))
}

/// SQL LIKE with `%`, `_`, and backslash escapes.
fn like_match(text: &str, pattern: &str, ignore_case: bool) -> bool {
    #[derive(PartialEq)]
    enum Tok {
        AnySeq,
        AnyOne,
        Ch(char),
    }
    let (text, pattern) = if ignore_case {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    let mut toks = Vec::new();
    let mut iter = pattern.chars();
    while let Some(c) = iter.next() {
        match c {
            '%' => {
                if toks.last() != Some(&Tok::AnySeq) {
                    toks.push(Tok::AnySeq);
                }
            }
            '_' => toks.push(Tok::AnyOne),
            '\\' => toks.push(Tok::Ch(iter.next().unwrap_or('\\'))),
            c => toks.push(Tok::Ch(c)),
        }
    }
    let chars: Vec<char> = text.chars().collect();

    fn matches(t: &[char], p: &[Tok]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(Tok::AnySeq) => (0..=t.len()).any(|k| matches(&t[k..], &p[1..])),
            Some(Tok::AnyOne) => !t.is_empty() && matches(&t[1..], &p[1..]),
            Some(Tok::Ch(c)) => t.first() == Some(c) && matches(&t[1..], &p[1..]),
        }
    }
    matches(&chars, &toks)
}

/// Dispatch a function call: built-in aggregates, then user declarations,
/// then built-in scalars.
fn call_function(
    name: &str,
    args: &[Expr],
    distinct: bool,
    scope: &Scope<'_>,
    element: Option<usize>,
) -> Result<Value, FlatqError> {
    let upper = name.to_uppercase();
    if AGGREGATE_NAMES.contains(&upper.as_str()) {
        return eval_builtin_aggregate(&upper, args, distinct, scope);
    }
    let user = scope
        .session
        .functions
        .lock()
        .expect("functions lock")
        .lookup(&upper);
    if let Some(decl) = user {
        if decl.cursor_param.is_some() {
            let values = aggregate_argument_values(&upper, args, distinct, scope, 1)?;
            let mut extra = Vec::with_capacity(args.len().saturating_sub(1));
            for arg in args.iter().skip(1) {
                extra.push(evaluate(arg, scope, element)?);
            }
            return crate::driver::call_user_aggregate(scope.session, &decl, values, extra);
        }
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(evaluate(arg, scope, element)?);
        }
        return crate::driver::call_user_function(scope.session, &decl, evaluated);
    }
    function::call_builtin(&upper, args, scope, element)
}

/// Evaluate an aggregate's first argument across the current group.
fn aggregate_argument_values(
    name: &str,
    args: &[Expr],
    distinct: bool,
    scope: &Scope<'_>,
    expected_min: usize,
) -> Result<Vec<Value>, FlatqError> {
    if args.len() < expected_min {
        return Err(FlatqError::FunctionArgumentLength {
            name: name.to_string(),
            expect: format!("at least {expected_min} argument"),
            actual: args.len(),
        });
    }
    let pin = scope.nearest_record().ok_or(FlatqError::NotGrouping)?;
    if !pin.view.is_grouped {
        return Err(FlatqError::NotGrouping);
    }
    let n = pin.view.records[pin.index].group_len();
    let mut values = Vec::with_capacity(n);
    for i in 0..n {
        values.push(evaluate(&args[0], scope, Some(i))?);
    }
    if distinct {
        values = dedup_by_key(values);
    }
    Ok(values)
}

fn dedup_by_key(values: Vec<Value>) -> Vec<Value> {
    let mut seen = indexmap::IndexSet::new();
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        if seen.insert(value::comparison_key(&v)) {
            out.push(v);
        }
    }
    out
}

fn eval_builtin_aggregate(
    name: &str,
    args: &[Expr],
    distinct: bool,
    scope: &Scope<'_>,
) -> Result<Value, FlatqError> {
    // COUNT(*) counts rows, no argument evaluation.
    if name == "COUNT" && args.len() == 1 && matches!(args[0], Expr::Star { .. }) {
        let pin = scope.nearest_record().ok_or(FlatqError::NotGrouping)?;
        if !pin.view.is_grouped {
            return Err(FlatqError::NotGrouping);
        }
        let n = pin.view.records[pin.index].group_len();
        return Ok(Value::Integer(n as i64));
    }
    let expected = match name {
        "LISTAGG" => 1..=2,
        _ => 1..=1,
    };
    if !expected.contains(&args.len()) {
        return Err(FlatqError::FunctionArgumentLength {
            name: name.to_string(),
            expect: if name == "LISTAGG" {
                "1 or 2 arguments".to_string()
            } else {
                "1 argument".to_string()
            },
            actual: args.len(),
        });
    }
    let values = aggregate_argument_values(name, args, distinct, scope, 1)?;
    let separator = if name == "LISTAGG" && args.len() == 2 {
        match evaluate(&args[1], scope, None)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_display_string(),
        }
    } else {
        String::new()
    };
    let ignore_case = scope.session.flags().ignore_case;
    aggregate::apply(name, values, &separator, ignore_case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::record::{Cell, Header, Record};

    fn session() -> Session {
        Session::new(SessionFlags::default()).unwrap()
    }

    fn sample_view() -> View {
        let mut v = View::empty();
        v.header = Header::from_columns(Some("t"), &["a".to_string(), "b".to_string()]).unwrap();
        v.records = vec![
            Record::from_values(vec![Value::Integer(1), Value::String("x".into())]),
            Record::from_values(vec![Value::Integer(2), Value::Null]),
        ];
        v
    }

    #[test]
    fn field_resolution_walks_scopes() {
        let session = session();
        let root = Scope::root(&session);
        let outer = sample_view();
        let outer_scope = root.with_record(&outer, 0);
        let mut inner_view = sample_view();
        inner_view.header.update_view_name("u");
        let inner_scope = outer_scope.with_record(&inner_view, 1);

        // Bare column resolves innermost first.
        let v = evaluate(
            &Expr::FieldRef {
                view: None,
                column: "a".into(),
            },
            &inner_scope,
            None,
        )
        .unwrap();
        assert_eq!(v, Value::Integer(2));
        // Qualified reference reaches the enclosing frame.
        let v = evaluate(
            &Expr::FieldRef {
                view: Some("t".into()),
                column: "a".into(),
            },
            &inner_scope,
            None,
        )
        .unwrap();
        assert_eq!(v, Value::Integer(1));
    }

    #[test]
    fn not_in_with_null_is_unknown() {
        let session = session();
        let scope = Scope::root(&session);
        let expr = Expr::InList {
            negated: true,
            expr: Box::new(Expr::Literal(Value::Integer(3))),
            list: vec![
                Expr::Literal(Value::Integer(1)),
                Expr::Literal(Value::Null),
                Expr::Literal(Value::Integer(2)),
            ],
        };
        let v = evaluate(&expr, &scope, None).unwrap();
        assert_eq!(v, Value::Ternary(Ternary::Unknown));

        // A match still wins over the NULL.
        let expr = Expr::InList {
            negated: false,
            expr: Box::new(Expr::Literal(Value::Integer(1))),
            list: vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Null)],
        };
        let v = evaluate(&expr, &scope, None).unwrap();
        assert_eq!(v, Value::Ternary(Ternary::True));
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("hello", "h%o", false));
        assert!(like_match("hello", "_ello", false));
        assert!(!like_match("hello", "h_o", false));
        assert!(like_match("50%", "50\\%", false));
        assert!(like_match("HELLO", "hel%", true));
        assert!(!like_match("HELLO", "hel%", false));
    }

    #[test]
    fn aggregates_require_grouping() {
        let session = session();
        let root = Scope::root(&session);
        let view = sample_view();
        let scope = root.with_record(&view, 0);
        let expr = Expr::Function {
            name: "COUNT".into(),
            args: vec![Expr::Star { view: None }],
            distinct: false,
        };
        assert!(matches!(
            evaluate(&expr, &scope, None),
            Err(FlatqError::NotGrouping)
        ));
    }

    #[test]
    fn grouped_reads_enforce_group_keys() {
        let session = session();
        let root = Scope::root(&session);
        let mut view = sample_view();
        view.is_grouped = true;
        view.records = vec![Record::new(vec![
            Cell::group(vec![Value::Integer(1), Value::Integer(1)]),
            Cell::group(vec![Value::String("x".into()), Value::Null]),
        ])];
        view.header.field_mut(0).is_group_key = true;
        let scope = root.with_record(&view, 0);

        let a = Expr::FieldRef {
            view: None,
            column: "a".into(),
        };
        assert_eq!(evaluate(&a, &scope, None).unwrap(), Value::Integer(1));

        let b = Expr::FieldRef {
            view: None,
            column: "b".into(),
        };
        assert!(matches!(
            evaluate(&b, &scope, None),
            Err(FlatqError::FieldNotGroupKey(_))
        ));

        // COUNT skips the null element.
        let count = Expr::Function {
            name: "count".into(),
            args: vec![b.clone()],
            distinct: false,
        };
        assert_eq!(evaluate(&count, &scope, None).unwrap(), Value::Integer(1));
    }

    #[test]
    fn case_and_connectives() {
        let session = session();
        let scope = Scope::root(&session);
        let expr = Expr::Case {
            operand: None,
            branches: vec![(
                Expr::Comparison {
                    op: "<".into(),
                    left: Box::new(Expr::Literal(Value::Integer(1))),
                    right: Box::new(Expr::Literal(Value::Integer(2))),
                },
                Expr::Literal(Value::String("yes".into())),
            )],
            else_expr: Some(Box::new(Expr::Literal(Value::String("no".into())))),
        };
        assert_eq!(
            evaluate(&expr, &scope, None).unwrap(),
            Value::String("yes".into())
        );

        // UNKNOWN AND FALSE short-circuits to FALSE.
        let expr = Expr::And(
            Box::new(Expr::Literal(Value::Boolean(false))),
            Box::new(Expr::Literal(Value::Null)),
        );
        assert_eq!(
            evaluate(&expr, &scope, None).unwrap(),
            Value::Ternary(Ternary::False)
        );
    }
}
