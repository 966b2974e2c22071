//! Recursive-descent parser for the supported SQL surface.
//!
//! Statements are parsed by leading keyword; expressions use precedence
//! climbing (OR < AND < NOT < predicates < concatenation < additive <
//! multiplicative < unary < primary). Keywords are contextual: any
//! unquoted identifier can still name a column or table.

use crate::error::FlatqError;
use crate::sql::ast::*;
use crate::sql::lexer::{Lexer, PosToken, Token};
use crate::value::{Ternary, Value};

/// Identifiers that end an alias-free expression slot. Used to decide
/// whether a bare identifier is an implicit alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "FETCH", "UNION", "EXCEPT",
    "INTERSECT", "INTO", "ON", "USING", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS",
    "NATURAL", "AS", "WITH", "SET", "VALUES", "DO", "THEN", "END", "WHEN", "ELSE", "ELSEIF",
    "AND", "OR", "NOT",
];

/// Table functions that force a format on a source.
const TABLE_FORMATS: &[&str] = &["CSV", "FIXED", "LTSV", "JSON", "JSON_TABLE", "TABLE_OBJECT"];

/// Parse a complete program.
pub fn parse_program(text: &str, ansi_quotes: bool) -> Result<Vec<Statement>, FlatqError> {
    let tokens = Lexer::new(text, ansi_quotes).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    while parser.peek().is_some() {
        if parser.accept_op(";") {
            continue;
        }
        statements.push(parser.parse_statement()?);
    }
    Ok(statements)
}

struct Parser {
    tokens: Vec<PosToken>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error_here(&self, msg: impl std::fmt::Display) -> FlatqError {
        match self.tokens.get(self.pos.min(self.tokens.len().saturating_sub(1))) {
            Some(t) => FlatqError::SyntaxError(format!(
                "{msg} at line {}, column {}",
                t.line, t.column
            )),
            None => FlatqError::SyntaxError(format!("{msg} at end of input")),
        }
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.peek().map(|t| t.is_keyword(kw)).unwrap_or(false)
    }

    fn at_any_kw(&self, kws: &[&str]) -> bool {
        kws.iter().any(|k| self.at_kw(k))
    }

    fn accept_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), FlatqError> {
        if self.accept_kw(kw) {
            Ok(())
        } else {
            Err(self.error_here(format_args!("expected {kw}")))
        }
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().map(|t| t.is_op(op)).unwrap_or(false)
    }

    fn accept_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), FlatqError> {
        if self.accept_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format_args!("expected '{op}'")))
        }
    }

    /// Consume an identifier (quoted or not).
    fn ident(&mut self) -> Result<String, FlatqError> {
        match self.peek() {
            Some(Token::Ident(s)) | Some(Token::QuotedIdent(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error_here("expected an identifier")),
        }
    }

    /// Consume a variable token and return its bare name.
    fn variable(&mut self) -> Result<String, FlatqError> {
        match self.peek() {
            Some(Token::Var(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error_here("expected a variable")),
        }
    }

    fn variable_list(&mut self) -> Result<Vec<String>, FlatqError> {
        let mut vars = vec![self.variable()?];
        while self.accept_op(",") {
            vars.push(self.variable()?);
        }
        Ok(vars)
    }

    fn end_of_statement(&mut self) -> Result<(), FlatqError> {
        if self.accept_op(";") || self.peek().is_none() {
            Ok(())
        } else {
            Err(self.error_here("expected ';'"))
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, FlatqError> {
        let stmt = if self.at_kw("SELECT") || self.at_kw("WITH") {
            Statement::Select(self.parse_select_query()?)
        } else if self.accept_kw("INSERT") {
            self.parse_insert()?
        } else if self.accept_kw("REPLACE") {
            self.parse_replace()?
        } else if self.accept_kw("UPDATE") {
            self.parse_update()?
        } else if self.accept_kw("DELETE") {
            self.parse_delete()?
        } else if self.accept_kw("CREATE") {
            self.parse_create()?
        } else if self.accept_kw("ALTER") {
            self.parse_alter()?
        } else if self.accept_kw("DECLARE") || self.accept_kw("VAR") {
            self.parse_declare()?
        } else if self.accept_kw("SET") {
            self.parse_set()?
        } else if self.accept_kw("ADD") {
            let value = self.parse_expr()?;
            self.expect_kw("TO")?;
            let name = self.flag_name()?;
            Statement::AddFlagElement { name, value }
        } else if self.accept_kw("REMOVE") {
            let value = self.parse_expr()?;
            self.expect_kw("FROM")?;
            let name = self.flag_name()?;
            Statement::RemoveFlagElement { name, value }
        } else if self.accept_kw("OPEN") {
            Statement::OpenCursor(self.ident()?)
        } else if self.accept_kw("CLOSE") {
            Statement::CloseCursor(self.ident()?)
        } else if self.accept_kw("DISPOSE") {
            self.expect_kw("CURSOR")?;
            Statement::DisposeCursor(self.ident()?)
        } else if self.accept_kw("FETCH") {
            self.parse_fetch()?
        } else if self.accept_kw("IF") {
            return self.parse_if();
        } else if self.accept_kw("WHILE") {
            return self.parse_while();
        } else if self.accept_kw("BREAK") {
            Statement::Break
        } else if self.accept_kw("CONTINUE") {
            Statement::Continue
        } else if self.accept_kw("EXIT") {
            let code = if self.at_op(";") || self.peek().is_none() {
                None
            } else {
                Some(self.parse_expr()?)
            };
            Statement::Exit(code)
        } else if self.accept_kw("RETURN") {
            let value = if self.at_op(";") || self.peek().is_none() {
                None
            } else {
                Some(self.parse_expr()?)
            };
            Statement::Return(value)
        } else if self.accept_kw("COMMIT") {
            Statement::Commit
        } else if self.accept_kw("ROLLBACK") {
            Statement::Rollback
        } else if self.accept_kw("PRINT") {
            Statement::Print(self.parse_expr()?)
        } else if self.accept_kw("PRINTF") {
            let format = self.parse_expr()?;
            let args = if self.accept_kw("USING") {
                self.parse_expr_list()?
            } else {
                Vec::new()
            };
            Statement::Printf { format, args }
        } else if self.accept_kw("SOURCE") {
            Statement::Source(self.parse_expr()?)
        } else if self.accept_kw("EXECUTE") {
            let text = self.parse_expr()?;
            let args = if self.accept_kw("USING") {
                self.parse_expr_list()?
            } else {
                Vec::new()
            };
            Statement::Execute { text, args }
        } else {
            return Err(self.error_here("unexpected token"));
        };
        self.end_of_statement()?;
        Ok(stmt)
    }

    fn flag_name(&mut self) -> Result<String, FlatqError> {
        match self.peek() {
            Some(Token::Flag(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error_here("expected a flag")),
        }
    }

    fn parse_insert(&mut self) -> Result<Statement, FlatqError> {
        self.expect_kw("INTO")?;
        let table = self.ident()?;
        let fields = self.optional_ident_tuple()?;
        let source = self.parse_insert_source()?;
        Ok(Statement::Insert(InsertStatement {
            table,
            fields,
            source,
        }))
    }

    fn parse_replace(&mut self) -> Result<Statement, FlatqError> {
        self.expect_kw("INTO")?;
        let table = self.ident()?;
        let fields = self.optional_ident_tuple()?;
        self.expect_kw("USING")?;
        self.expect_op("(")?;
        let mut keys = vec![self.ident()?];
        while self.accept_op(",") {
            keys.push(self.ident()?);
        }
        self.expect_op(")")?;
        let source = self.parse_insert_source()?;
        Ok(Statement::Replace(ReplaceStatement {
            table,
            fields,
            keys,
            source,
        }))
    }

    fn parse_insert_source(&mut self) -> Result<InsertSource, FlatqError> {
        if self.accept_kw("VALUES") {
            let mut rows = Vec::new();
            loop {
                self.expect_op("(")?;
                rows.push(self.parse_expr_list()?);
                self.expect_op(")")?;
                if !self.accept_op(",") {
                    break;
                }
            }
            Ok(InsertSource::Values(rows))
        } else if self.at_kw("SELECT") || self.at_kw("WITH") {
            Ok(InsertSource::Query(self.parse_select_query()?))
        } else {
            Err(self.error_here("expected VALUES or a select query"))
        }
    }

    fn optional_ident_tuple(&mut self) -> Result<Vec<String>, FlatqError> {
        if !self.accept_op("(") {
            return Ok(Vec::new());
        }
        let mut idents = vec![self.ident()?];
        while self.accept_op(",") {
            idents.push(self.ident()?);
        }
        self.expect_op(")")?;
        Ok(idents)
    }

    fn parse_update(&mut self) -> Result<Statement, FlatqError> {
        let mut targets = vec![self.ident()?];
        while self.accept_op(",") {
            targets.push(self.ident()?);
        }
        self.expect_kw("SET")?;
        let mut assignments = Vec::new();
        loop {
            let first = self.ident()?;
            let (view, column) = if self.accept_op(".") {
                (Some(first), self.ident()?)
            } else {
                (None, first)
            };
            self.expect_op("=")?;
            let value = self.parse_expr()?;
            assignments.push(UpdateAssignment {
                view,
                column,
                value,
            });
            if !self.accept_op(",") {
                break;
            }
        }
        let from = if self.accept_kw("FROM") {
            self.parse_table_expr_list()?
        } else {
            Vec::new()
        };
        let filter = if self.accept_kw("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update(UpdateStatement {
            targets,
            assignments,
            from,
            filter,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement, FlatqError> {
        let mut targets = Vec::new();
        if !self.at_kw("FROM") {
            targets.push(self.ident()?);
            while self.accept_op(",") {
                targets.push(self.ident()?);
            }
        }
        self.expect_kw("FROM")?;
        let from = self.parse_table_expr_list()?;
        let filter = if self.accept_kw("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(DeleteStatement {
            targets,
            from,
            filter,
        }))
    }

    fn parse_create(&mut self) -> Result<Statement, FlatqError> {
        self.expect_kw("TABLE")?;
        let path = self.ident()?;
        let fields = self.optional_ident_tuple()?;
        let query = if self.accept_kw("AS") {
            Some(self.parse_select_query()?)
        } else if self.at_kw("SELECT") || self.at_kw("WITH") {
            Some(self.parse_select_query()?)
        } else {
            None
        };
        if fields.is_empty() && query.is_none() {
            return Err(self.error_here("CREATE TABLE requires columns or a query"));
        }
        Ok(Statement::CreateTable {
            path,
            fields,
            query,
        })
    }

    fn parse_alter(&mut self) -> Result<Statement, FlatqError> {
        self.expect_kw("TABLE")?;
        let table = self.ident()?;
        if self.accept_kw("ADD") {
            let columns = if self.accept_op("(") {
                let mut cols = vec![self.parse_column_default()?];
                while self.accept_op(",") {
                    cols.push(self.parse_column_default()?);
                }
                self.expect_op(")")?;
                cols
            } else {
                vec![self.parse_column_default()?]
            };
            let position = if self.accept_kw("FIRST") {
                ColumnPosition::First
            } else if self.accept_kw("LAST") {
                ColumnPosition::Last
            } else if self.accept_kw("BEFORE") {
                ColumnPosition::Before(self.ident()?)
            } else if self.accept_kw("AFTER") {
                ColumnPosition::After(self.ident()?)
            } else {
                ColumnPosition::Last
            };
            Ok(Statement::AddColumns {
                table,
                columns,
                position,
            })
        } else if self.accept_kw("DROP") {
            let columns = if self.accept_op("(") {
                let mut cols = vec![self.ident()?];
                while self.accept_op(",") {
                    cols.push(self.ident()?);
                }
                self.expect_op(")")?;
                cols
            } else {
                vec![self.ident()?]
            };
            Ok(Statement::DropColumns { table, columns })
        } else if self.accept_kw("RENAME") {
            let old = self.ident()?;
            self.expect_kw("TO")?;
            let new = self.ident()?;
            Ok(Statement::RenameColumn { table, old, new })
        } else if self.accept_kw("SET") {
            let attribute = self.ident()?;
            self.expect_kw("TO")?;
            let value = self.parse_expr()?;
            Ok(Statement::SetTableAttribute {
                table,
                attribute,
                value,
            })
        } else {
            Err(self.error_here("expected ADD, DROP, RENAME, or SET"))
        }
    }

    fn parse_column_default(&mut self) -> Result<ColumnDefault, FlatqError> {
        let column = self.ident()?;
        let default = if self.accept_kw("DEFAULT") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(ColumnDefault { column, default })
    }

    fn parse_declare(&mut self) -> Result<Statement, FlatqError> {
        if matches!(self.peek(), Some(Token::Var(_))) {
            let mut decls = Vec::new();
            loop {
                let name = self.variable()?;
                let init = if self.accept_op(":=") {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                decls.push((name, init));
                if !self.accept_op(",") {
                    break;
                }
            }
            return Ok(Statement::DeclareVariables(decls));
        }
        let name = self.ident()?;
        if self.accept_kw("TABLE") || self.accept_kw("VIEW") {
            let fields = self.optional_ident_tuple()?;
            let query = if self.accept_kw("AS") {
                Some(self.parse_select_query()?)
            } else {
                None
            };
            if fields.is_empty() && query.is_none() {
                return Err(self.error_here("DECLARE TABLE requires columns or a query"));
            }
            Ok(Statement::DeclareTable {
                name,
                fields,
                query,
            })
        } else if self.accept_kw("CURSOR") {
            self.expect_kw("FOR")?;
            let query = self.parse_select_query()?;
            Ok(Statement::DeclareCursor { name, query })
        } else if self.accept_kw("FUNCTION") {
            self.expect_op("(")?;
            let params = self.parse_function_params()?;
            self.expect_op(")")?;
            self.expect_kw("AS")?;
            let body = self.parse_begin_block()?;
            Ok(Statement::DeclareFunction(UserFunctionDecl {
                name,
                cursor_param: None,
                params,
                body,
            }))
        } else if self.accept_kw("AGGREGATE") {
            self.expect_op("(")?;
            let cursor_param = self.ident()?;
            let params = if self.accept_op(",") {
                self.parse_function_params()?
            } else {
                Vec::new()
            };
            self.expect_op(")")?;
            self.expect_kw("AS")?;
            let body = self.parse_begin_block()?;
            Ok(Statement::DeclareFunction(UserFunctionDecl {
                name,
                cursor_param: Some(cursor_param),
                params,
                body,
            }))
        } else {
            Err(self.error_here("expected TABLE, CURSOR, FUNCTION, or AGGREGATE"))
        }
    }

    fn parse_function_params(&mut self) -> Result<Vec<(String, Option<Expr>)>, FlatqError> {
        let mut params = Vec::new();
        if matches!(self.peek(), Some(Token::Var(_))) {
            loop {
                let name = self.variable()?;
                let default = if self.accept_kw("DEFAULT") {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push((name, default));
                if !self.accept_op(",") {
                    break;
                }
            }
        }
        Ok(params)
    }

    fn parse_begin_block(&mut self) -> Result<Vec<Statement>, FlatqError> {
        self.expect_kw("BEGIN")?;
        let mut body = Vec::new();
        while !self.at_kw("END") {
            if self.accept_op(";") {
                continue;
            }
            if self.peek().is_none() {
                return Err(self.error_here("expected END"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect_kw("END")?;
        Ok(body)
    }

    fn parse_set(&mut self) -> Result<Statement, FlatqError> {
        match self.peek().cloned() {
            Some(Token::Var(name)) => {
                self.pos += 1;
                if !self.accept_op("=") {
                    self.expect_op(":=")?;
                }
                let expr = self.parse_expr()?;
                Ok(Statement::SetVariable { name, expr })
            }
            Some(Token::Flag(name)) => {
                self.pos += 1;
                if !self.accept_op("=") && !self.accept_kw("TO") {
                    return Err(self.error_here("expected '=' or TO"));
                }
                let value = self.parse_expr()?;
                Ok(Statement::SetFlag { name, value })
            }
            _ => Err(self.error_here("expected a variable or flag")),
        }
    }

    fn parse_fetch(&mut self) -> Result<Statement, FlatqError> {
        let position = if self.accept_kw("NEXT") {
            FetchPosition::Next
        } else if self.accept_kw("PRIOR") {
            FetchPosition::Prior
        } else if self.accept_kw("FIRST") {
            FetchPosition::First
        } else if self.accept_kw("LAST") {
            FetchPosition::Last
        } else if self.accept_kw("ABSOLUTE") {
            FetchPosition::Absolute(self.parse_expr()?)
        } else if self.accept_kw("RELATIVE") {
            FetchPosition::Relative(self.parse_expr()?)
        } else {
            FetchPosition::Next
        };
        let cursor = self.ident()?;
        self.expect_kw("INTO")?;
        let into_vars = self.variable_list()?;
        Ok(Statement::Fetch {
            cursor,
            position,
            into_vars,
        })
    }

    fn parse_if(&mut self) -> Result<Statement, FlatqError> {
        let mut branches = Vec::new();
        let condition = self.parse_expr()?;
        self.expect_kw("THEN")?;
        let block = self.parse_block(&["ELSEIF", "ELSE", "END"])?;
        branches.push((condition, block));
        let mut else_block = Vec::new();
        loop {
            if self.accept_kw("ELSEIF") {
                let condition = self.parse_expr()?;
                self.expect_kw("THEN")?;
                let block = self.parse_block(&["ELSEIF", "ELSE", "END"])?;
                branches.push((condition, block));
            } else if self.accept_kw("ELSE") {
                else_block = self.parse_block(&["END"])?;
            } else {
                break;
            }
        }
        self.expect_kw("END")?;
        self.expect_kw("IF")?;
        self.end_of_statement()?;
        Ok(Statement::If {
            branches,
            else_block,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, FlatqError> {
        if matches!(self.peek(), Some(Token::Var(_))) {
            // Could be `WHILE @v IN cur DO` or `WHILE @v < n DO`; decide by
            // scanning for IN followed by a bare cursor name and DO.
            let save = self.pos;
            let variables = self.variable_list().unwrap_or_default();
            if !variables.is_empty() && self.accept_kw("IN") {
                if let Ok(cursor) = self.ident() {
                    if self.accept_kw("DO") {
                        let body = self.parse_block(&["END"])?;
                        self.expect_kw("END")?;
                        self.expect_kw("WHILE")?;
                        self.end_of_statement()?;
                        return Ok(Statement::WhileInCursor {
                            variables,
                            cursor,
                            body,
                        });
                    }
                }
            }
            self.pos = save;
        }
        let condition = self.parse_expr()?;
        self.expect_kw("DO")?;
        let body = self.parse_block(&["END"])?;
        self.expect_kw("END")?;
        self.expect_kw("WHILE")?;
        self.end_of_statement()?;
        Ok(Statement::While { condition, body })
    }

    fn parse_block(&mut self, terminators: &[&str]) -> Result<Vec<Statement>, FlatqError> {
        let mut block = Vec::new();
        loop {
            if self.accept_op(";") {
                continue;
            }
            if self.at_any_kw(terminators) {
                return Ok(block);
            }
            if self.peek().is_none() {
                return Err(self.error_here("unterminated block"));
            }
            block.push(self.parse_statement()?);
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub(crate) fn parse_select_query(&mut self) -> Result<SelectQuery, FlatqError> {
        let mut with = Vec::new();
        if self.accept_kw("WITH") {
            loop {
                let recursive = self.accept_kw("RECURSIVE");
                let name = self.ident()?;
                let columns = self.optional_ident_tuple()?;
                self.expect_kw("AS")?;
                self.expect_op("(")?;
                let query = self.parse_select_query()?;
                self.expect_op(")")?;
                with.push(CommonTable {
                    recursive,
                    name,
                    columns,
                    query,
                });
                if !self.accept_op(",") {
                    break;
                }
            }
        }

        let (body, into_vars) = self.parse_select_body()?;

        let mut order_by = Vec::new();
        if self.accept_kw("ORDER") {
            self.expect_kw("BY")?;
            loop {
                order_by.push(self.parse_order_item()?);
                if !self.accept_op(",") {
                    break;
                }
            }
        }

        let mut offset = None;
        let mut limit = None;
        loop {
            if self.accept_kw("OFFSET") {
                offset = Some(self.parse_expr()?);
                if !self.accept_kw("ROWS") {
                    self.accept_kw("ROW");
                }
            } else if self.accept_kw("LIMIT") {
                let value = self.parse_expr()?;
                let percent = self.accept_kw("PERCENT");
                let with_ties = if self.accept_kw("WITH") {
                    self.expect_kw("TIES")?;
                    true
                } else {
                    false
                };
                limit = Some(LimitClause {
                    value,
                    percent,
                    with_ties,
                });
            } else if self.accept_kw("FETCH") {
                if !self.accept_kw("FIRST") {
                    self.expect_kw("NEXT")?;
                }
                let value = self.parse_expr()?;
                let percent = self.accept_kw("PERCENT");
                if !self.accept_kw("ROWS") {
                    self.accept_kw("ROW");
                }
                let with_ties = if self.accept_kw("WITH") {
                    self.expect_kw("TIES")?;
                    true
                } else {
                    self.expect_kw("ONLY")?;
                    false
                };
                limit = Some(LimitClause {
                    value,
                    percent,
                    with_ties,
                });
            } else {
                break;
            }
        }

        Ok(SelectQuery {
            with,
            body,
            order_by,
            offset,
            limit,
            into_vars,
        })
    }

    fn parse_select_body(&mut self) -> Result<(SelectBody, Vec<String>), FlatqError> {
        let (mut left, into_vars) = self.parse_set_operand()?;
        loop {
            let op = if self.accept_kw("UNION") {
                SetOperator::Union
            } else if self.accept_kw("EXCEPT") {
                SetOperator::Except
            } else if self.accept_kw("INTERSECT") {
                SetOperator::Intersect
            } else {
                break;
            };
            let all = self.accept_kw("ALL");
            let (right, right_into) = self.parse_set_operand()?;
            if !right_into.is_empty() {
                return Err(self.error_here("INTO is not allowed in a set operation operand"));
            }
            left = SelectBody::SetOperation {
                op,
                all,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok((left, into_vars))
    }

    fn parse_set_operand(&mut self) -> Result<(SelectBody, Vec<String>), FlatqError> {
        if self.at_op("(") {
            self.expect_op("(")?;
            let (body, into_vars) = self.parse_select_body()?;
            self.expect_op(")")?;
            return Ok((body, into_vars));
        }
        let (entity, into_vars) = self.parse_select_entity()?;
        Ok((SelectBody::Entity(entity), into_vars))
    }

    fn parse_select_entity(&mut self) -> Result<(SelectEntity, Vec<String>), FlatqError> {
        self.expect_kw("SELECT")?;
        let distinct = self.accept_kw("DISTINCT");
        if !distinct {
            self.accept_kw("ALL");
        }

        let mut fields = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let alias = self.parse_alias()?;
            fields.push(SelectField { expr, alias });
            if !self.accept_op(",") {
                break;
            }
        }

        let into_vars = if self.accept_kw("INTO") {
            self.variable_list()?
        } else {
            Vec::new()
        };

        let from = if self.accept_kw("FROM") {
            self.parse_table_expr_list()?
        } else {
            Vec::new()
        };

        let filter = if self.accept_kw("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.accept_kw("GROUP") {
            self.expect_kw("BY")?;
            loop {
                group_by.push(self.parse_expr()?);
                if !self.accept_op(",") {
                    break;
                }
            }
        }

        let having = if self.accept_kw("HAVING") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok((
            SelectEntity {
                distinct,
                fields,
                from,
                filter,
                group_by,
                having,
            },
            into_vars,
        ))
    }

    fn parse_alias(&mut self) -> Result<Option<String>, FlatqError> {
        if self.accept_kw("AS") {
            return Ok(Some(self.ident()?));
        }
        match self.peek() {
            Some(Token::QuotedIdent(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Some(s))
            }
            Some(Token::Ident(s)) => {
                if CLAUSE_KEYWORDS.iter().any(|k| s.eq_ignore_ascii_case(k)) {
                    Ok(None)
                } else {
                    let s = s.clone();
                    self.pos += 1;
                    Ok(Some(s))
                }
            }
            _ => Ok(None),
        }
    }

    fn parse_order_item(&mut self) -> Result<OrderItem, FlatqError> {
        let expr = self.parse_expr()?;
        let ascending = if self.accept_kw("DESC") {
            false
        } else {
            self.accept_kw("ASC");
            true
        };
        let nulls_first = if self.accept_kw("NULLS") {
            if self.accept_kw("FIRST") {
                Some(true)
            } else {
                self.expect_kw("LAST")?;
                Some(false)
            }
        } else {
            None
        };
        Ok(OrderItem {
            expr,
            ascending,
            nulls_first,
        })
    }

    // ── FROM ─────────────────────────────────────────────────────────────

    fn parse_table_expr_list(&mut self) -> Result<Vec<TableExpr>, FlatqError> {
        let mut tables = vec![self.parse_table_expr()?];
        while self.accept_op(",") {
            tables.push(self.parse_table_expr()?);
        }
        Ok(tables)
    }

    fn parse_table_expr(&mut self) -> Result<TableExpr, FlatqError> {
        let mut left = self.parse_table_primary()?;
        loop {
            if self.accept_kw("CROSS") {
                self.expect_kw("JOIN")?;
                let right = self.parse_table_primary()?;
                left = TableExpr::Join {
                    join_type: JoinType::Cross,
                    left: Box::new(left),
                    right: Box::new(right),
                    condition: None,
                };
                continue;
            }
            let natural = self.accept_kw("NATURAL");
            let join_type = if self.accept_kw("INNER") {
                Some(JoinType::Inner)
            } else if self.accept_kw("LEFT") {
                self.accept_kw("OUTER");
                Some(JoinType::LeftOuter)
            } else if self.accept_kw("RIGHT") {
                self.accept_kw("OUTER");
                Some(JoinType::RightOuter)
            } else if self.accept_kw("FULL") {
                self.accept_kw("OUTER");
                Some(JoinType::FullOuter)
            } else if self.at_kw("JOIN") {
                Some(JoinType::Inner)
            } else {
                if natural {
                    return Err(self.error_here("expected JOIN"));
                }
                break;
            };
            self.expect_kw("JOIN")?;
            let right = self.parse_table_primary()?;
            let condition = if natural {
                Some(JoinCondition::Natural)
            } else if self.accept_kw("ON") {
                Some(JoinCondition::On(self.parse_expr()?))
            } else if self.accept_kw("USING") {
                self.expect_op("(")?;
                let mut cols = vec![self.ident()?];
                while self.accept_op(",") {
                    cols.push(self.ident()?);
                }
                self.expect_op(")")?;
                Some(JoinCondition::Using(cols))
            } else {
                return Err(self.error_here("expected ON, USING, or NATURAL"));
            };
            left = TableExpr::Join {
                join_type: join_type.unwrap_or(JoinType::Inner),
                left: Box::new(left),
                right: Box::new(right),
                condition,
            };
        }
        Ok(left)
    }

    fn parse_table_primary(&mut self) -> Result<TableExpr, FlatqError> {
        if self.accept_op("(") {
            let query = self.parse_select_query()?;
            self.expect_op(")")?;
            let alias = self.parse_table_alias()?;
            return Ok(TableExpr::Table {
                source: TableSource::Subquery(Box::new(query)),
                alias,
            });
        }
        if self.accept_kw("STDIN") {
            let alias = self.parse_table_alias()?;
            return Ok(TableExpr::Table {
                source: TableSource::Stdin,
                alias,
            });
        }
        // Table function forcing a format.
        if let Some(Token::Ident(name)) = self.peek() {
            let upper = name.to_uppercase();
            if TABLE_FORMATS.contains(&upper.as_str())
                && self.peek_at(1).map(|t| t.is_op("(")).unwrap_or(false)
            {
                self.pos += 1;
                self.expect_op("(")?;
                let format = if upper == "TABLE_OBJECT" {
                    let f = self.ident()?.to_uppercase();
                    self.expect_op(",")?;
                    f
                } else if upper == "JSON_TABLE" {
                    "JSON".to_string()
                } else {
                    upper.clone()
                };
                let mut args = Vec::new();
                if format != "LTSV" && format != "TSV" {
                    args.push(self.parse_expr()?);
                    self.expect_op(",")?;
                }
                let source = if self.accept_kw("STDIN") {
                    TableSource::Stdin
                } else {
                    TableSource::Path(self.ident_or_string()?)
                };
                while self.accept_op(",") {
                    args.push(self.parse_expr()?);
                }
                self.expect_op(")")?;
                let alias = self.parse_table_alias()?;
                return Ok(TableExpr::Table {
                    source: TableSource::TableObject {
                        format,
                        source: Box::new(source),
                        args,
                    },
                    alias,
                });
            }
        }
        let name = self.ident_or_string()?;
        let alias = self.parse_table_alias()?;
        Ok(TableExpr::Table {
            source: TableSource::Path(name),
            alias,
        })
    }

    fn ident_or_string(&mut self) -> Result<String, FlatqError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => self.ident(),
        }
    }

    fn parse_table_alias(&mut self) -> Result<Option<String>, FlatqError> {
        if self.accept_kw("AS") {
            return Ok(Some(self.ident()?));
        }
        match self.peek() {
            Some(Token::QuotedIdent(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Some(s))
            }
            Some(Token::Ident(s)) => {
                if CLAUSE_KEYWORDS.iter().any(|k| s.eq_ignore_ascii_case(k)) {
                    Ok(None)
                } else {
                    let s = s.clone();
                    self.pos += 1;
                    Ok(Some(s))
                }
            }
            _ => Ok(None),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, FlatqError> {
        let mut list = vec![self.parse_expr()?];
        while self.accept_op(",") {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr, FlatqError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, FlatqError> {
        let mut left = self.parse_and()?;
        while self.accept_kw("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FlatqError> {
        let mut left = self.parse_not()?;
        while self.accept_kw("AND") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, FlatqError> {
        if self.accept_kw("NOT") {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, FlatqError> {
        let mut expr = self.parse_concat()?;
        loop {
            if self.at_op("=")
                || self.at_op("==")
                || self.at_op("<>")
                || self.at_op("<")
                || self.at_op("<=")
                || self.at_op(">")
                || self.at_op(">=")
            {
                let op = match self.advance() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(self.error_here("expected a comparison operator")),
                };
                let right = self.parse_concat()?;
                expr = if op == "==" {
                    Expr::Identical {
                        left: Box::new(expr),
                        right: Box::new(right),
                    }
                } else {
                    Expr::Comparison {
                        op,
                        left: Box::new(expr),
                        right: Box::new(right),
                    }
                };
                continue;
            }
            if self.accept_kw("IS") {
                let negated = self.accept_kw("NOT");
                let target = self.parse_concat()?;
                expr = Expr::Is {
                    negated,
                    expr: Box::new(expr),
                    target: Box::new(target),
                };
                continue;
            }
            let negated = if self.at_kw("NOT")
                && self
                    .peek_at(1)
                    .map(|t| {
                        t.is_keyword("BETWEEN") || t.is_keyword("IN") || t.is_keyword("LIKE")
                    })
                    .unwrap_or(false)
            {
                self.accept_kw("NOT");
                true
            } else {
                false
            };
            if self.accept_kw("BETWEEN") {
                let low = self.parse_concat()?;
                self.expect_kw("AND")?;
                let high = self.parse_concat()?;
                expr = Expr::Between {
                    negated,
                    expr: Box::new(expr),
                    low: Box::new(low),
                    high: Box::new(high),
                };
                continue;
            }
            if self.accept_kw("IN") {
                self.expect_op("(")?;
                if self.at_kw("SELECT") || self.at_kw("WITH") {
                    let query = self.parse_select_query()?;
                    self.expect_op(")")?;
                    expr = Expr::InSubquery {
                        negated,
                        expr: Box::new(expr),
                        query: Box::new(query),
                    };
                } else {
                    let list = self.parse_expr_list()?;
                    self.expect_op(")")?;
                    expr = Expr::InList {
                        negated,
                        expr: Box::new(expr),
                        list,
                    };
                }
                continue;
            }
            if self.accept_kw("LIKE") {
                let pattern = self.parse_concat()?;
                expr = Expr::Like {
                    negated,
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                };
                continue;
            }
            if negated {
                return Err(self.error_here("expected BETWEEN, IN, or LIKE"));
            }
            return Ok(expr);
        }
    }

    fn parse_concat(&mut self) -> Result<Expr, FlatqError> {
        let mut left = self.parse_additive()?;
        while self.accept_op("||") {
            let right = self.parse_additive()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, FlatqError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.accept_op("+") {
                '+'
            } else if self.accept_op("-") {
                '-'
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FlatqError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.accept_op("*") {
                '*'
            } else if self.accept_op("/") {
                '/'
            } else if self.accept_op("%") {
                '%'
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Arithmetic {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FlatqError> {
        if self.accept_op("-") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Minus(Box::new(inner)));
        }
        if self.accept_op("+") {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FlatqError> {
        match self.peek().cloned() {
            Some(Token::Number(text)) => {
                self.pos += 1;
                if let Ok(n) = text.parse::<i64>() {
                    Ok(Expr::Literal(Value::Integer(n)))
                } else if let Ok(f) = text.parse::<f64>() {
                    Ok(Expr::Literal(Value::Float(f)))
                } else {
                    Err(self.error_here(format_args!("invalid number {text}")))
                }
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Some(Token::Var(name)) => {
                self.pos += 1;
                if self.accept_op(":=") {
                    let expr = self.parse_expr()?;
                    Ok(Expr::VarAssign {
                        name,
                        expr: Box::new(expr),
                    })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::Flag(name)) => {
                self.pos += 1;
                Ok(Expr::Flag(name))
            }
            Some(Token::Env(name)) => {
                self.pos += 1;
                Ok(Expr::EnvVar(name))
            }
            Some(Token::Op(op)) if op == "*" => {
                self.pos += 1;
                Ok(Expr::Star { view: None })
            }
            Some(Token::Op(op)) if op == "(" => {
                self.pos += 1;
                if self.at_kw("SELECT") || self.at_kw("WITH") {
                    let query = self.parse_select_query()?;
                    self.expect_op(")")?;
                    Ok(Expr::ScalarSubquery(Box::new(query)))
                } else {
                    let expr = self.parse_expr()?;
                    self.expect_op(")")?;
                    Ok(expr)
                }
            }
            Some(Token::QuotedIdent(name)) => {
                self.pos += 1;
                self.parse_reference(name)
            }
            Some(Token::Ident(name)) => {
                let upper = name.to_uppercase();
                if CLAUSE_KEYWORDS.contains(&upper.as_str()) {
                    return Err(self.error_here(format_args!("unexpected keyword {upper}")));
                }
                self.pos += 1;
                match upper.as_str() {
                    "NULL" => return Ok(Expr::Literal(Value::Null)),
                    "TRUE" => return Ok(Expr::Literal(Value::Boolean(true))),
                    "FALSE" => return Ok(Expr::Literal(Value::Boolean(false))),
                    "UNKNOWN" => return Ok(Expr::Literal(Value::Ternary(Ternary::Unknown))),
                    "CASE" => return self.parse_case(),
                    "EXISTS" => {
                        if self.accept_op("(") {
                            let query = self.parse_select_query()?;
                            self.expect_op(")")?;
                            return Ok(Expr::Exists(Box::new(query)));
                        }
                        return Err(self.error_here("expected a subquery after EXISTS"));
                    }
                    _ => {}
                }
                if self.at_op("(") {
                    return self.parse_function_call(name);
                }
                self.parse_reference(name)
            }
            _ => Err(self.error_here("unexpected token in expression")),
        }
    }

    /// A bare or qualified column reference starting from `first`.
    fn parse_reference(&mut self, first: String) -> Result<Expr, FlatqError> {
        if self.accept_op(".") {
            match self.peek().cloned() {
                Some(Token::Ident(col)) | Some(Token::QuotedIdent(col)) => {
                    self.pos += 1;
                    Ok(Expr::FieldRef {
                        view: Some(first),
                        column: col,
                    })
                }
                Some(Token::Number(n)) => {
                    self.pos += 1;
                    let number = n
                        .parse::<usize>()
                        .map_err(|_| self.error_here("invalid column number"))?;
                    Ok(Expr::ColumnNumber {
                        view: first,
                        number,
                    })
                }
                Some(Token::Op(op)) if op == "*" => {
                    self.pos += 1;
                    Ok(Expr::Star { view: Some(first) })
                }
                _ => Err(self.error_here("expected a column name")),
            }
        } else {
            Ok(Expr::FieldRef {
                view: None,
                column: first,
            })
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr, FlatqError> {
        self.expect_op("(")?;
        let distinct = self.accept_kw("DISTINCT");
        let mut args = Vec::new();
        if !self.accept_op(")") {
            loop {
                args.push(self.parse_expr()?);
                if !self.accept_op(",") {
                    break;
                }
            }
            self.expect_op(")")?;
        }
        if self.accept_kw("OVER") {
            self.expect_op("(")?;
            let mut partition = Vec::new();
            if self.accept_kw("PARTITION") {
                self.expect_kw("BY")?;
                loop {
                    partition.push(self.parse_expr()?);
                    if !self.accept_op(",") {
                        break;
                    }
                }
            }
            let mut order = Vec::new();
            if self.accept_kw("ORDER") {
                self.expect_kw("BY")?;
                loop {
                    order.push(self.parse_order_item()?);
                    if !self.accept_op(",") {
                        break;
                    }
                }
            }
            let frame = self.parse_window_frame()?;
            self.expect_op(")")?;
            return Ok(Expr::Analytic {
                name,
                args,
                distinct,
                partition,
                order,
                frame,
            });
        }
        Ok(Expr::Function {
            name,
            args,
            distinct,
        })
    }

    fn parse_window_frame(&mut self) -> Result<Option<WindowFrame>, FlatqError> {
        let unit = if self.accept_kw("ROWS") {
            FrameUnit::Rows
        } else if self.accept_kw("RANGE") {
            FrameUnit::Range
        } else {
            return Ok(None);
        };
        if self.accept_kw("BETWEEN") {
            let start = self.parse_frame_bound()?;
            self.expect_kw("AND")?;
            let end = self.parse_frame_bound()?;
            Ok(Some(WindowFrame { unit, start, end }))
        } else {
            let start = self.parse_frame_bound()?;
            Ok(Some(WindowFrame {
                unit,
                start,
                end: FrameBound::CurrentRow,
            }))
        }
    }

    fn parse_frame_bound(&mut self) -> Result<FrameBound, FlatqError> {
        if self.accept_kw("UNBOUNDED") {
            if self.accept_kw("PRECEDING") {
                return Ok(FrameBound::UnboundedPreceding);
            }
            self.expect_kw("FOLLOWING")?;
            return Ok(FrameBound::UnboundedFollowing);
        }
        if self.accept_kw("CURRENT") {
            self.expect_kw("ROW")?;
            return Ok(FrameBound::CurrentRow);
        }
        let n = match self.peek().cloned() {
            Some(Token::Number(text)) => {
                self.pos += 1;
                text.parse::<i64>()
                    .map_err(|_| self.error_here("invalid frame bound"))?
            }
            _ => return Err(self.error_here("expected a frame bound")),
        };
        if self.accept_kw("PRECEDING") {
            Ok(FrameBound::Preceding(n))
        } else {
            self.expect_kw("FOLLOWING")?;
            Ok(FrameBound::Following(n))
        }
    }

    fn parse_case(&mut self) -> Result<Expr, FlatqError> {
        let operand = if self.at_kw("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut branches = Vec::new();
        while self.accept_kw("WHEN") {
            let condition = self.parse_expr()?;
            self.expect_kw("THEN")?;
            let result = self.parse_expr()?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            return Err(self.error_here("CASE requires at least one WHEN"));
        }
        let else_expr = if self.accept_kw("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_kw("END")?;
        Ok(Expr::Case {
            operand,
            branches,
            else_expr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> Statement {
        let mut stmts = parse_program(text, false).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement");
        stmts.remove(0)
    }

    #[test]
    fn parses_basic_select() {
        let stmt = parse_one("SELECT b, a FROM t;");
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        let SelectBody::Entity(e) = &q.body else {
            panic!("expected entity");
        };
        assert_eq!(e.fields.len(), 2);
        assert_eq!(e.from.len(), 1);
    }

    #[test]
    fn parses_joins_and_clauses() {
        let stmt = parse_one(
            "SELECT t.a, COUNT(*) c FROM t LEFT JOIN u ON t.id = u.id \
             WHERE t.a > 1 GROUP BY t.a HAVING COUNT(*) > 1 \
             ORDER BY c DESC NULLS LAST OFFSET 1 LIMIT 2 WITH TIES;",
        );
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        assert_eq!(q.order_by.len(), 1);
        assert!(!q.order_by[0].ascending);
        assert_eq!(q.order_by[0].nulls_first, Some(false));
        assert!(q.offset.is_some());
        assert!(q.limit.as_ref().unwrap().with_ties);
        let SelectBody::Entity(e) = &q.body else {
            panic!("expected entity");
        };
        assert!(matches!(e.from[0], TableExpr::Join { .. }));
        assert!(e.having.is_some());
        assert_eq!(e.group_by.len(), 1);
    }

    #[test]
    fn parses_recursive_cte() {
        let stmt = parse_one(
            "WITH RECURSIVE r (n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < 3) \
             SELECT n FROM r;",
        );
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        assert_eq!(q.with.len(), 1);
        assert!(q.with[0].recursive);
        assert_eq!(q.with[0].columns, vec!["n".to_string()]);
        assert!(matches!(
            q.with[0].query.body,
            SelectBody::SetOperation { .. }
        ));
    }

    #[test]
    fn parses_not_in_and_identical() {
        let stmt = parse_one("SELECT 3 NOT IN (1, NULL, 2), 1 == 1;");
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        let SelectBody::Entity(e) = &q.body else {
            panic!("expected entity");
        };
        assert!(matches!(
            e.fields[0].expr,
            Expr::InList { negated: true, .. }
        ));
        assert!(matches!(e.fields[1].expr, Expr::Identical { .. }));
    }

    #[test]
    fn parses_dml() {
        let stmt = parse_one("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y');");
        let Statement::Insert(ins) = stmt else {
            panic!("expected insert");
        };
        assert_eq!(ins.fields.len(), 2);
        let InsertSource::Values(rows) = ins.source else {
            panic!("expected values");
        };
        assert_eq!(rows.len(), 2);

        let stmt = parse_one("UPDATE a SET v = 'Z' FROM a JOIN b ON a.id = b.id;");
        let Statement::Update(up) = stmt else {
            panic!("expected update");
        };
        assert_eq!(up.targets, vec!["a".to_string()]);
        assert_eq!(up.assignments.len(), 1);
        assert_eq!(up.from.len(), 1);

        let stmt = parse_one("DELETE FROM t WHERE a = 1;");
        let Statement::Delete(del) = stmt else {
            panic!("expected delete");
        };
        assert!(del.targets.is_empty());
        assert!(del.filter.is_some());
    }

    #[test]
    fn parses_control_flow() {
        let stmts = parse_program(
            "DECLARE @i := 0; \
             WHILE @i < 3 DO SET @i = @i + 1; END WHILE; \
             IF @i = 3 THEN PRINT 'done'; ELSE PRINT 'nope'; END IF;",
            false,
        )
        .unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[1], Statement::While { .. }));
        assert!(matches!(stmts[2], Statement::If { .. }));
    }

    #[test]
    fn parses_cursor_statements() {
        let stmts = parse_program(
            "DECLARE cur CURSOR FOR SELECT a FROM t; \
             OPEN cur; FETCH cur INTO @a; \
             WHILE @a IN cur DO PRINT @a; END WHILE; \
             CLOSE cur; DISPOSE CURSOR cur;",
            false,
        )
        .unwrap();
        assert_eq!(stmts.len(), 6);
        assert!(matches!(stmts[3], Statement::WhileInCursor { .. }));
    }

    #[test]
    fn parses_function_declarations() {
        let stmt = parse_one(
            "DECLARE add2 FUNCTION (@x, @y DEFAULT 1) AS BEGIN RETURN @x + @y; END;",
        );
        let Statement::DeclareFunction(f) = stmt else {
            panic!("expected function");
        };
        assert_eq!(f.name, "add2");
        assert!(f.cursor_param.is_none());
        assert_eq!(f.params.len(), 2);
        assert!(f.params[1].1.is_some());

        let stmt = parse_one(
            "DECLARE total AGGREGATE (list, @init DEFAULT 0) AS BEGIN RETURN @init; END;",
        );
        let Statement::DeclareFunction(f) = stmt else {
            panic!("expected aggregate");
        };
        assert_eq!(f.cursor_param.as_deref(), Some("list"));
    }

    #[test]
    fn parses_analytic_over() {
        let stmt = parse_one(
            "SELECT RANK() OVER (PARTITION BY g ORDER BY v DESC), \
             SUM(v) OVER (ORDER BY v ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) FROM t;",
        );
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        let SelectBody::Entity(e) = &q.body else {
            panic!("expected entity");
        };
        assert!(matches!(e.fields[0].expr, Expr::Analytic { .. }));
        let Expr::Analytic { frame, .. } = &e.fields[1].expr else {
            panic!("expected analytic");
        };
        let frame = frame.as_ref().unwrap();
        assert_eq!(frame.unit, FrameUnit::Rows);
        assert_eq!(frame.start, FrameBound::Preceding(1));
    }

    #[test]
    fn parses_table_objects() {
        let stmt = parse_one("SELECT * FROM CSV(';', `data.txt`, 'UTF8') AS d;");
        let Statement::Select(q) = stmt else {
            panic!("expected select");
        };
        let SelectBody::Entity(e) = &q.body else {
            panic!("expected entity");
        };
        let TableExpr::Table { source, alias } = &e.from[0] else {
            panic!("expected table");
        };
        assert_eq!(alias.as_deref(), Some("d"));
        let TableSource::TableObject { format, args, .. } = source else {
            panic!("expected table object");
        };
        assert_eq!(format, "CSV");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(parse_program("SELECT FROM;", false).is_err());
        assert!(parse_program("UPDATE t SET;", false).is_err());
        assert!(parse_program("WHILE 1 DO PRINT 1;", false).is_err());
    }
}
