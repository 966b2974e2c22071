//! Abstract syntax tree for the supported SQL surface.
//!
//! Every statement and expression form is an enumerated variant; the
//! evaluator and driver dispatch on the tag. The tree is produced by
//! [`crate::sql::parser`] and is the only input contract of the execution
//! core: tests may construct nodes directly.

use std::fmt;

use crate::value::Value;

/// A scalar expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// `t.col` or `col`.
    FieldRef {
        view: Option<String>,
        column: String,
    },
    /// `t.3`: the third column of t.
    ColumnNumber { view: String, number: usize },
    /// `*` or `t.*`, allowed in select lists and COUNT.
    Star { view: Option<String> },
    /// `@name`.
    Var(String),
    /// `@name := expr`, evaluates to the assigned value.
    VarAssign { name: String, expr: Box<Expr> },
    /// `@@FLAG`.
    Flag(String),
    /// `@%NAME`: environment variable.
    EnvVar(String),
    /// `- expr`.
    Minus(Box<Expr>),
    /// `left op right` for `+ - * / %`.
    Arithmetic {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left || right`.
    Concat(Box<Expr>, Box<Expr>),
    /// `left op right` for `= <> < <= > >=`.
    Comparison {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left == right`: strict type-and-value identity.
    Identical { left: Box<Expr>, right: Box<Expr> },
    /// `expr IS [NOT] NULL` / `expr IS [NOT] TRUE|FALSE|UNKNOWN`.
    Is {
        negated: bool,
        expr: Box<Expr>,
        target: Box<Expr>,
    },
    Between {
        negated: bool,
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    InList {
        negated: bool,
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    InSubquery {
        negated: bool,
        expr: Box<Expr>,
        query: Box<SelectQuery>,
    },
    Like {
        negated: bool,
        expr: Box<Expr>,
        pattern: Box<Expr>,
    },
    Exists(Box<SelectQuery>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Scalar or aggregate call; which one is resolved at evaluation time.
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// `func(args) OVER (PARTITION BY ... ORDER BY ... frame)`.
    Analytic {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
        partition: Vec<Expr>,
        order: Vec<OrderItem>,
        frame: Option<WindowFrame>,
    },
    /// `(SELECT ...)` used as a scalar.
    ScalarSubquery(Box<SelectQuery>),
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
}

/// One ORDER BY item.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: Expr,
    pub ascending: bool,
    /// Explicit NULLS FIRST/LAST; None applies the default for the
    /// direction (FIRST for ASC, LAST for DESC).
    pub nulls_first: Option<bool>,
}

/// Window frame for an analytic call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameUnit {
    Rows,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(i64),
    CurrentRow,
    Following(i64),
    UnboundedFollowing,
}

#[derive(Debug, Clone)]
pub struct WindowFrame {
    pub unit: FrameUnit,
    pub start: FrameBound,
    pub end: FrameBound,
}

/// One projection in a select list.
#[derive(Debug, Clone)]
pub struct SelectField {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// WITH entry.
#[derive(Debug, Clone)]
pub struct CommonTable {
    pub recursive: bool,
    pub name: String,
    pub columns: Vec<String>,
    pub query: SelectQuery,
}

/// Source of a table expression in FROM.
#[derive(Debug, Clone)]
pub enum TableSource {
    /// A file path or a common/temporary table name.
    Path(String),
    Stdin,
    Subquery(Box<SelectQuery>),
    /// `TABLE_OBJECT(format, src [, args...])`: force a format on a
    /// file-or-stdin source. `JSON_TABLE(query, src)` lowers to this.
    TableObject {
        format: String,
        source: Box<TableSource>,
        args: Vec<Expr>,
    },
    /// The synthetic single-row view used when FROM is absent.
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Cross,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<String>),
    Natural,
}

/// A FROM-clause table expression: a source or a join tree.
#[derive(Debug, Clone)]
pub enum TableExpr {
    Table {
        source: TableSource,
        alias: Option<String>,
    },
    Join {
        join_type: JoinType,
        left: Box<TableExpr>,
        right: Box<TableExpr>,
        condition: Option<JoinCondition>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetOperator {
    Union,
    Except,
    Intersect,
}

/// Body of a query: a single select entity or a set-operation tree.
#[derive(Debug, Clone)]
pub enum SelectBody {
    Entity(SelectEntity),
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<SelectBody>,
        right: Box<SelectBody>,
    },
}

/// The clause bundle of one SELECT.
#[derive(Debug, Clone)]
pub struct SelectEntity {
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    pub from: Vec<TableExpr>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct LimitClause {
    pub value: Expr,
    pub percent: bool,
    pub with_ties: bool,
}

/// A complete query: WITH list, body, and the trailing clauses that apply
/// to the combined result.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub with: Vec<CommonTable>,
    pub body: SelectBody,
    pub order_by: Vec<OrderItem>,
    pub offset: Option<Expr>,
    pub limit: Option<LimitClause>,
    /// `SELECT ... INTO @a, @b`.
    pub into_vars: Vec<String>,
}

/// Placement for ALTER TABLE ADD.
#[derive(Debug, Clone)]
pub enum ColumnPosition {
    First,
    Last,
    Before(String),
    After(String),
}

/// New column with optional default expression.
#[derive(Debug, Clone)]
pub struct ColumnDefault {
    pub column: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(SelectQuery),
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: String,
    pub fields: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone)]
pub struct ReplaceStatement {
    pub table: String,
    pub fields: Vec<String>,
    pub keys: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub view: Option<String>,
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub targets: Vec<String>,
    pub assignments: Vec<UpdateAssignment>,
    pub from: Vec<TableExpr>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    /// Explicit target names; empty means the single FROM table.
    pub targets: Vec<String>,
    pub from: Vec<TableExpr>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum FetchPosition {
    Next,
    Prior,
    First,
    Last,
    Absolute(Expr),
    Relative(Expr),
}

#[derive(Debug, Clone)]
pub struct UserFunctionDecl {
    pub name: String,
    /// For an AGGREGATE declaration, the pseudo-cursor parameter that the
    /// body iterates over; None for scalar functions.
    pub cursor_param: Option<String>,
    /// Parameter names with optional defaults.
    pub params: Vec<(String, Option<Expr>)>,
    pub body: Vec<Statement>,
}

/// A program statement.
#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertStatement),
    Replace(ReplaceStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable {
        path: String,
        fields: Vec<String>,
        query: Option<SelectQuery>,
    },
    AddColumns {
        table: String,
        columns: Vec<ColumnDefault>,
        position: ColumnPosition,
    },
    DropColumns {
        table: String,
        columns: Vec<String>,
    },
    RenameColumn {
        table: String,
        old: String,
        new: String,
    },
    SetTableAttribute {
        table: String,
        attribute: String,
        value: Expr,
    },
    DeclareVariables(Vec<(String, Option<Expr>)>),
    SetVariable {
        name: String,
        expr: Expr,
    },
    SetFlag {
        name: String,
        value: Expr,
    },
    AddFlagElement {
        name: String,
        value: Expr,
    },
    RemoveFlagElement {
        name: String,
        value: Expr,
    },
    DeclareTable {
        name: String,
        fields: Vec<String>,
        query: Option<SelectQuery>,
    },
    DeclareCursor {
        name: String,
        query: SelectQuery,
    },
    OpenCursor(String),
    CloseCursor(String),
    DisposeCursor(String),
    Fetch {
        cursor: String,
        position: FetchPosition,
        into_vars: Vec<String>,
    },
    DeclareFunction(UserFunctionDecl),
    Return(Option<Expr>),
    If {
        branches: Vec<(Expr, Vec<Statement>)>,
        else_block: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    WhileInCursor {
        variables: Vec<String>,
        cursor: String,
        body: Vec<Statement>,
    },
    Break,
    Continue,
    Exit(Option<Expr>),
    Commit,
    Rollback,
    Print(Expr),
    Printf {
        format: Expr,
        args: Vec<Expr>,
    },
    Source(Expr),
    Execute {
        text: Expr,
        args: Vec<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v.to_display_string()),
            Expr::FieldRef { view, column } => match view {
                Some(v) => write!(f, "{v}.{column}"),
                None => write!(f, "{column}"),
            },
            Expr::ColumnNumber { view, number } => write!(f, "{view}.{number}"),
            Expr::Star { view } => match view {
                Some(v) => write!(f, "{v}.*"),
                None => write!(f, "*"),
            },
            Expr::Var(name) => write!(f, "@{name}"),
            Expr::VarAssign { name, expr } => write!(f, "@{name} := {expr}"),
            Expr::Flag(name) => write!(f, "@@{name}"),
            Expr::EnvVar(name) => write!(f, "@%{name}"),
            Expr::Minus(e) => write!(f, "-{e}"),
            Expr::Arithmetic { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Concat(l, r) => write!(f, "{l} || {r}"),
            Expr::Comparison { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Identical { left, right } => write!(f, "{left} == {right}"),
            Expr::Is {
                negated,
                expr,
                target,
            } => {
                if *negated {
                    write!(f, "{expr} IS NOT {target}")
                } else {
                    write!(f, "{expr} IS {target}")
                }
            }
            Expr::Between {
                negated,
                expr,
                low,
                high,
            } => {
                if *negated {
                    write!(f, "{expr} NOT BETWEEN {low} AND {high}")
                } else {
                    write!(f, "{expr} BETWEEN {low} AND {high}")
                }
            }
            Expr::InList {
                negated,
                expr,
                list,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                if *negated {
                    write!(f, "{expr} NOT IN ({})", items.join(", "))
                } else {
                    write!(f, "{expr} IN ({})", items.join(", "))
                }
            }
            Expr::InSubquery { negated, expr, .. } => {
                if *negated {
                    write!(f, "{expr} NOT IN (subquery)")
                } else {
                    write!(f, "{expr} IN (subquery)")
                }
            }
            Expr::Like {
                negated,
                expr,
                pattern,
            } => {
                if *negated {
                    write!(f, "{expr} NOT LIKE {pattern}")
                } else {
                    write!(f, "{expr} LIKE {pattern}")
                }
            }
            Expr::Exists(_) => write!(f, "EXISTS (subquery)"),
            Expr::And(l, r) => write!(f, "{l} AND {r}"),
            Expr::Or(l, r) => write!(f, "{l} OR {r}"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                if *distinct {
                    write!(f, "{name}(DISTINCT {})", rendered.join(", "))
                } else {
                    write!(f, "{name}({})", rendered.join(", "))
                }
            }
            Expr::Analytic { name, args, .. } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({}) OVER (...)", rendered.join(", "))
            }
            Expr::ScalarSubquery(_) => write!(f, "(subquery)"),
            Expr::Case { .. } => write!(f, "CASE"),
        }
    }
}
