//! Session state shared by every statement of a program.
//!
//! A [`Session`] owns the flag set, the variable/cursor/function scope
//! stacks, the view cache and temporary views, the worker pool, and the
//! cancellation token. Everything is behind its own lock so the evaluator
//! can run data-parallel passes against a shared `&Session`.

use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexMap;

use crate::cache::{TempViewScopes, ViewCache};
use crate::config::SessionFlags;
use crate::cursor::CursorScopes;
use crate::driver::ExecResult;
use crate::error::FlatqError;
use crate::parallel::{CancellationToken, build_pool};
use crate::sql::ast::UserFunctionDecl;
use crate::value::Value;

/// Scope stack of session variables (`@name`).
#[derive(Debug, Default)]
pub struct VariableScopes(Vec<IndexMap<String, Value>>);

impl VariableScopes {
    pub fn new() -> VariableScopes {
        VariableScopes(vec![IndexMap::new()])
    }

    fn key(name: &str) -> String {
        name.to_uppercase()
    }

    pub fn push_scope(&mut self) {
        self.0.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.0.len() > 1 {
            self.0.pop();
        }
    }

    pub fn clear(&mut self) {
        self.0 = vec![IndexMap::new()];
    }

    pub fn declare(&mut self, name: &str, value: Value) -> Result<(), FlatqError> {
        let key = Self::key(name);
        let scope = self.0.last_mut().expect("at least one scope");
        if scope.contains_key(&key) {
            return Err(FlatqError::RedeclaredVariable(format!("@{name}")));
        }
        scope.insert(key, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, FlatqError> {
        let key = Self::key(name);
        self.0
            .iter()
            .rev()
            .find_map(|scope| scope.get(&key).cloned())
            .ok_or_else(|| FlatqError::UndeclaredVariable(format!("@{name}")))
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), FlatqError> {
        let key = Self::key(name);
        for scope in self.0.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(&key) {
                *slot = value;
                return Ok(());
            }
        }
        Err(FlatqError::UndeclaredVariable(format!("@{name}")))
    }
}

/// Scope stack of user-declared functions.
#[derive(Debug, Default)]
pub struct FunctionScopes(Vec<IndexMap<String, UserFunctionDecl>>);

impl FunctionScopes {
    pub fn new() -> FunctionScopes {
        FunctionScopes(vec![IndexMap::new()])
    }

    pub fn push_scope(&mut self) {
        self.0.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.0.len() > 1 {
            self.0.pop();
        }
    }

    pub fn clear(&mut self) {
        self.0 = vec![IndexMap::new()];
    }

    pub fn declare(&mut self, decl: UserFunctionDecl) -> Result<(), FlatqError> {
        let key = decl.name.to_uppercase();
        let scope = self.0.last_mut().expect("at least one scope");
        if scope.contains_key(&key) {
            return Err(FlatqError::RedeclaredVariable(format!(
                "function {}",
                decl.name
            )));
        }
        scope.insert(key, decl);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<UserFunctionDecl> {
        let key = name.to_uppercase();
        self.0.iter().rev().find_map(|scope| scope.get(&key).cloned())
    }
}

/// Shared state of one engine session.
pub struct Session {
    pub flags: RwLock<SessionFlags>,
    pub vars: Mutex<VariableScopes>,
    pub cache: ViewCache,
    pub temp_views: Mutex<TempViewScopes>,
    pub cursors: Mutex<CursorScopes>,
    pub functions: Mutex<FunctionScopes>,
    pub cancel: CancellationToken,
    pool: Mutex<Arc<rayon::ThreadPool>>,
    /// Piped input, injected by the CLI (or tests) before execution.
    pub stdin_text: Mutex<Option<String>>,
    /// Accumulated statement results of the running program.
    pub results: Mutex<Vec<ExecResult>>,
}

impl Session {
    pub fn new(flags: SessionFlags) -> Result<Session, FlatqError> {
        let pool = build_pool(flags.cpu)?;
        Ok(Session {
            flags: RwLock::new(flags),
            vars: Mutex::new(VariableScopes::new()),
            cache: ViewCache::new(),
            temp_views: Mutex::new(TempViewScopes::new()),
            cursors: Mutex::new(CursorScopes::new()),
            functions: Mutex::new(FunctionScopes::new()),
            cancel: CancellationToken::new(),
            pool: Mutex::new(Arc::new(pool)),
            stdin_text: Mutex::new(None),
            results: Mutex::new(Vec::new()),
        })
    }

    /// Copy of the current flags.
    pub fn flags(&self) -> SessionFlags {
        self.flags.read().expect("flags lock").clone()
    }

    pub fn pool(&self) -> Arc<rayon::ThreadPool> {
        self.pool.lock().expect("pool lock").clone()
    }

    /// Resize the worker pool after `SET @@CPU`.
    pub fn rebuild_pool(&self, cpu: usize) -> Result<(), FlatqError> {
        let pool = build_pool(cpu)?;
        *self.pool.lock().expect("pool lock") = Arc::new(pool);
        Ok(())
    }

    pub fn set_stdin(&self, text: String) {
        *self.stdin_text.lock().expect("stdin lock") = Some(text);
    }

    pub fn var_get(&self, name: &str) -> Result<Value, FlatqError> {
        self.vars.lock().expect("vars lock").get(name)
    }

    pub fn var_set(&self, name: &str, value: Value) -> Result<(), FlatqError> {
        self.vars.lock().expect("vars lock").set(name, value)
    }

    pub fn var_declare(&self, name: &str, value: Value) -> Result<(), FlatqError> {
        self.vars.lock().expect("vars lock").declare(name, value)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_scopes_shadow_and_propagate() {
        let mut vars = VariableScopes::new();
        vars.declare("a", Value::Integer(1)).unwrap();
        vars.push_scope();
        vars.declare("a", Value::Integer(2)).unwrap();
        assert_eq!(vars.get("A").unwrap(), Value::Integer(2));
        // Assignment to an outer variable reaches through inner scopes.
        vars.pop_scope();
        vars.push_scope();
        vars.set("a", Value::Integer(9)).unwrap();
        vars.pop_scope();
        assert_eq!(vars.get("a").unwrap(), Value::Integer(9));
        assert!(matches!(
            vars.get("missing"),
            Err(FlatqError::UndeclaredVariable(_))
        ));
        assert!(vars.declare("a", Value::Null).is_err());
    }

    #[test]
    fn session_construction_and_vars() {
        let session = Session::new(SessionFlags::default()).unwrap();
        session.var_declare("x", Value::Integer(5)).unwrap();
        assert_eq!(session.var_get("x").unwrap(), Value::Integer(5));
        session.var_set("x", Value::Integer(6)).unwrap();
        assert_eq!(session.var_get("X").unwrap(), Value::Integer(6));
    }
}
