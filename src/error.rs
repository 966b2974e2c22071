//! Error types for flatq.
//!
//! All errors that can occur inside the engine are represented by [`FlatqError`].
//! Errors are propagated via `Result<T, FlatqError>` throughout the codebase and
//! converted to an exit code at the CLI boundary.
//!
//! # Error Classification
//!
//! Errors are classified into seven categories that determine reporting and
//! the process exit code:
//! - **Parse**: syntactic errors in SQL text. Usage-level failures.
//! - **Resolve**: unknown or ambiguous columns, tables, variables, flags,
//!   functions, cursors.
//! - **Type**: wrong arity, un-castable value where a cast is required.
//! - **Semantic**: aggregate outside grouping, non-group-key scalar reads,
//!   recursion limits, ambiguous update targets, row length mismatches.
//! - **Io**: file not found, lock timeout, read/write/encoding failures.
//! - **Context**: cooperative cancellation.
//! - **System**: unexpected invariant violations. Bugs.

use std::fmt;

/// Primary error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum FlatqError {
    // ── Parse errors ─────────────────────────────────────────────────────
    /// The SQL text could not be tokenized or parsed.
    #[error("syntax error: {0}")]
    SyntaxError(String),

    // ── Resolve errors ───────────────────────────────────────────────────
    /// A column reference did not match any header field.
    #[error("field {0} does not exist")]
    FieldNotExist(String),

    /// A bare column name matched more than one header field.
    #[error("field {0} is ambiguous")]
    FieldAmbiguous(String),

    /// A table could not be located in any scope or on disk.
    #[error("file {0} does not exist")]
    FileNotFound(String),

    /// A referenced variable has not been declared.
    #[error("variable {0} is undeclared")]
    UndeclaredVariable(String),

    /// A variable was declared twice in the same scope.
    #[error("variable {0} is redeclared")]
    RedeclaredVariable(String),

    /// An unknown flag name was referenced.
    #[error("{0} is an unknown flag")]
    UnknownFlag(String),

    /// A function name did not resolve to a built-in or declared function.
    #[error("function {0} does not exist")]
    FunctionNotExist(String),

    /// A cursor name did not resolve.
    #[error("cursor {0} is undeclared")]
    UndeclaredCursor(String),

    /// A temporary table name did not resolve.
    #[error("table {0} is undeclared")]
    UndeclaredTable(String),

    /// A table alias was used twice in one FROM clause.
    #[error("table name {0} is a duplicate")]
    DuplicateTableName(String),

    // ── Type errors ──────────────────────────────────────────────────────
    /// A function was called with the wrong number of arguments.
    #[error("function {name} takes {expect}, but {actual} provided")]
    FunctionArgumentLength {
        name: String,
        expect: String,
        actual: usize,
    },

    /// A value could not be cast where a specific type is required.
    #[error("{0}")]
    InvalidValue(String),

    /// A flag was assigned a value of the wrong type.
    #[error("{value} for {flag} is invalid")]
    InvalidFlagValue { flag: String, value: String },

    // ── Semantic errors ──────────────────────────────────────────────────
    /// An aggregate or grouped read was attempted on ungrouped records.
    /// SELECT and HAVING intercept this and retry after grouping all rows.
    #[error("records are not grouped")]
    NotGrouping,

    /// A scalar read of a grouped, non-key column.
    #[error("field {0} is not a group key")]
    FieldNotGroupKey(String),

    /// A recursive query exceeded the configured recursion limit.
    #[error("iteration of recursive query exceeded the limit {0}")]
    RecursionExceeded(i64),

    /// The same physical row was targeted twice by one UPDATE statement.
    #[error("record to update is ambiguous")]
    UpdateRecordAmbiguous,

    /// An INSERT row length did not match the declared field list.
    #[error("row value length {actual} does not match field length {expect}")]
    RowValueLength { expect: usize, actual: usize },

    /// Set operation operands with different field counts.
    #[error("result set field length does not match")]
    CombinedFieldLength,

    /// A scalar subquery returned more than one record or field.
    #[error("subquery returns too many records or fields")]
    SubqueryTooManyResults,

    /// An analytic function appeared outside SELECT or ORDER BY.
    #[error("analytic function {0} is only available in select or order by clause")]
    AnalyticFunctionNotAllowed(String),

    /// A statement is not permitted in the current context
    /// (e.g. RETURN outside a function body).
    #[error("{0}")]
    ContextViolation(String),

    // ── I/O errors ───────────────────────────────────────────────────────
    /// A file could not be read, written, or decoded.
    #[error("file {path}: {detail}")]
    IoError { path: String, detail: String },

    /// A file lock could not be acquired within the wait timeout.
    #[error("file {0} is locked by another process")]
    FileLockTimeout(String),

    /// Writing back a view during commit failed.
    #[error("commit failed for {path}: {detail}")]
    CommitFailed { path: String, detail: String },

    /// Data in a file does not conform to its declared format.
    #[error("file {path} could not be decoded: {detail}")]
    DataDecode { path: String, detail: String },

    // ── Context errors ───────────────────────────────────────────────────
    /// The statement was cancelled through the cancellation token.
    #[error("query execution was cancelled")]
    ContextIsDone,

    // ── System errors, should not happen ─────────────────────────────────
    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl FlatqError {
    /// Process exit code for this error: 2 for usage-level (syntax) errors,
    /// 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            FlatqError::SyntaxError(_) => 2,
            _ => 1,
        }
    }

    /// Whether the error was caused by the statement text or data rather
    /// than by the environment. Used to decide log verbosity.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            FlatqError::IoError { .. }
                | FlatqError::FileLockTimeout(_)
                | FlatqError::CommitFailed { .. }
                | FlatqError::ContextIsDone
                | FlatqError::InternalError(_)
        )
    }

    /// Whether this error is the grouping signal that SELECT and HAVING
    /// intercept for the group-all retry.
    pub fn is_not_grouping(&self) -> bool {
        matches!(self, FlatqError::NotGrouping)
    }
}

/// Helper to build an [`FlatqError::IoError`] from a path and any
/// displayable cause.
pub fn io_error(path: &std::path::Path, err: impl fmt::Display) -> FlatqError {
    FlatqError::IoError {
        path: path.display().to_string(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_use_usage_exit_code() {
        let err = FlatqError::SyntaxError("unexpected token".into());
        assert_eq!(err.exit_code(), 2);
        let err = FlatqError::UpdateRecordAmbiguous;
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn classification_predicates() {
        assert!(FlatqError::NotGrouping.is_not_grouping());
        assert!(!FlatqError::FieldAmbiguous("a".into()).is_not_grouping());
        assert!(FlatqError::FieldNotExist("x".into()).is_user_error());
        assert!(!FlatqError::ContextIsDone.is_user_error());
        assert!(
            !FlatqError::CommitFailed {
                path: "t.csv".into(),
                detail: "disk full".into()
            }
            .is_user_error()
        );
    }

    #[test]
    fn display_messages() {
        let err = FlatqError::UpdateRecordAmbiguous;
        assert_eq!(err.to_string(), "record to update is ambiguous");
        let err = FlatqError::RowValueLength {
            expect: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "row value length 2 does not match field length 3"
        );
    }
}
