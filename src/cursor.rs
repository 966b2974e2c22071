//! Cursors: named iterators over prepared SELECT results.
//!
//! A declared cursor binds a name to an unexecuted query. OPEN runs the
//! query and positions the cursor before the first row; FETCH moves it and
//! returns the row, or no row when the motion leaves the result set, which
//! is not an error. Cursor names live in a scope stack so function bodies
//! get their own declarations; user aggregate functions receive their value
//! list as an implicitly open pseudo-cursor.

use indexmap::IndexMap;

use crate::error::FlatqError;
use crate::sql::ast::{FetchPosition, SelectQuery};
use crate::value::Value;
use crate::view::View;

#[derive(Debug, Clone)]
pub enum CursorState {
    Closed,
    Open {
        view: View,
        /// -1 before the first row; `len` after the last.
        position: i64,
    },
}

#[derive(Debug, Clone)]
pub struct Cursor {
    /// None for pseudo-cursors, which are born open.
    pub query: Option<SelectQuery>,
    pub state: CursorState,
}

/// Scope stack of cursor declarations.
#[derive(Debug, Default)]
pub struct CursorScopes(Vec<IndexMap<String, Cursor>>);

impl CursorScopes {
    pub fn new() -> CursorScopes {
        CursorScopes(vec![IndexMap::new()])
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

    fn key(name: &str) -> String {
        name.to_uppercase()
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Cursor, FlatqError> {
        let key = Self::key(name);
        for scope in self.0.iter_mut().rev() {
            if let Some(cur) = scope.get_mut(&key) {
                return Ok(cur);
            }
        }
        Err(FlatqError::UndeclaredCursor(name.to_string()))
    }

    pub fn declare(&mut self, name: &str, query: SelectQuery) -> Result<(), FlatqError> {
        let key = Self::key(name);
        let scope = self.0.last_mut().expect("at least one scope");
        if scope.contains_key(&key) {
            return Err(FlatqError::RedeclaredVariable(format!("cursor {name}")));
        }
        scope.insert(
            key,
            Cursor {
                query: Some(query),
                state: CursorState::Closed,
            },
        );
        Ok(())
    }

    /// Declare a pseudo-cursor over a list of values, already open. Used
    /// for user aggregate function bodies.
    pub fn declare_open_values(&mut self, name: &str, values: Vec<Value>) -> Result<(), FlatqError> {
        let view = View::from_values_column("value", values);
        let key = Self::key(name);
        let scope = self.0.last_mut().expect("at least one scope");
        scope.insert(
            key,
            Cursor {
                query: None,
                state: CursorState::Open { view, position: -1 },
            },
        );
        Ok(())
    }

    pub fn dispose(&mut self, name: &str) -> Result<(), FlatqError> {
        let key = Self::key(name);
        for scope in self.0.iter_mut().rev() {
            if scope.shift_remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(FlatqError::UndeclaredCursor(name.to_string()))
    }

    /// The query of a declared cursor, for OPEN to execute. Opening an
    /// already open cursor is an error.
    pub fn query_for_open(&mut self, name: &str) -> Result<SelectQuery, FlatqError> {
        let cur = self.find_mut(name)?;
        if matches!(cur.state, CursorState::Open { .. }) {
            return Err(FlatqError::ContextViolation(format!(
                "cursor {name} is already open"
            )));
        }
        cur.query
            .clone()
            .ok_or_else(|| FlatqError::UndeclaredCursor(name.to_string()))
    }

    pub fn open(&mut self, name: &str, view: View) -> Result<(), FlatqError> {
        let cur = self.find_mut(name)?;
        cur.state = CursorState::Open { view, position: -1 };
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> Result<(), FlatqError> {
        let cur = self.find_mut(name)?;
        cur.state = CursorState::Closed;
        Ok(())
    }

    pub fn is_open(&self, name: &str) -> bool {
        let key = Self::key(name);
        self.0
            .iter()
            .rev()
            .find_map(|s| s.get(&key))
            .map(|c| matches!(c.state, CursorState::Open { .. }))
            .unwrap_or(false)
    }

    /// Move the cursor and return the row at the new position, or None when
    /// the motion leaves the result set.
    pub fn fetch(
        &mut self,
        name: &str,
        motion: &FetchMotion,
    ) -> Result<Option<Vec<Value>>, FlatqError> {
        let cur = self.find_mut(name)?;
        let CursorState::Open { view, position } = &mut cur.state else {
            return Err(FlatqError::ContextViolation(format!(
                "cursor {name} is closed"
            )));
        };
        let len = view.records.len() as i64;
        let target = match motion {
            FetchMotion::Next => *position + 1,
            FetchMotion::Prior => *position - 1,
            FetchMotion::First => 0,
            FetchMotion::Last => len - 1,
            FetchMotion::Absolute(n) => n - 1,
            FetchMotion::Relative(n) => *position + n,
        };
        // Clamp so that NEXT past the end stays exhausted and PRIOR from
        // there lands back on the last row.
        *position = target.clamp(-1, len);
        if target < 0 || len <= target {
            return Ok(None);
        }
        let record = &view.records[target as usize];
        Ok(Some(
            (0..view.header.len())
                .map(|i| record.value(i).clone())
                .collect(),
        ))
    }
}

/// Fetch motion with its positions already evaluated.
#[derive(Debug, Clone)]
pub enum FetchMotion {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

impl FetchMotion {
    /// Lower an AST position whose expressions were evaluated to `n`.
    pub fn from_position(position: &FetchPosition, n: Option<i64>) -> Result<FetchMotion, FlatqError> {
        match position {
            FetchPosition::Next => Ok(FetchMotion::Next),
            FetchPosition::Prior => Ok(FetchMotion::Prior),
            FetchPosition::First => Ok(FetchMotion::First),
            FetchPosition::Last => Ok(FetchMotion::Last),
            FetchPosition::Absolute(_) => n
                .map(FetchMotion::Absolute)
                .ok_or_else(|| FlatqError::InvalidValue("fetch position must be an integer".into())),
            FetchPosition::Relative(_) => n
                .map(FetchMotion::Relative)
                .ok_or_else(|| FlatqError::InvalidValue("fetch position must be an integer".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cursor(values: Vec<i64>) -> CursorScopes {
        let mut cursors = CursorScopes::new();
        cursors
            .declare_open_values("cur", values.into_iter().map(Value::Integer).collect())
            .unwrap();
        cursors
    }

    #[test]
    fn walks_forward_and_back() {
        let mut cursors = open_cursor(vec![10, 20, 30]);
        let row = cursors.fetch("cur", &FetchMotion::Next).unwrap().unwrap();
        assert_eq!(row, vec![Value::Integer(10)]);
        cursors.fetch("cur", &FetchMotion::Next).unwrap();
        let row = cursors.fetch("cur", &FetchMotion::Prior).unwrap().unwrap();
        assert_eq!(row, vec![Value::Integer(10)]);
        let row = cursors.fetch("cur", &FetchMotion::Last).unwrap().unwrap();
        assert_eq!(row, vec![Value::Integer(30)]);
    }

    #[test]
    fn out_of_range_returns_no_row() {
        let mut cursors = open_cursor(vec![1]);
        assert!(cursors.fetch("cur", &FetchMotion::Prior).unwrap().is_none());
        cursors.fetch("cur", &FetchMotion::Next).unwrap();
        assert!(cursors.fetch("cur", &FetchMotion::Next).unwrap().is_none());
        assert!(cursors.fetch("cur", &FetchMotion::Next).unwrap().is_none());
        // Exhausted, then PRIOR lands on the last row again.
        let row = cursors.fetch("cur", &FetchMotion::Prior).unwrap().unwrap();
        assert_eq!(row, vec![Value::Integer(1)]);
        assert!(
            cursors
                .fetch("cur", &FetchMotion::Absolute(99))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn closed_cursor_is_an_error() {
        let mut cursors = CursorScopes::new();
        assert!(matches!(
            cursors.fetch("nope", &FetchMotion::Next),
            Err(FlatqError::UndeclaredCursor(_))
        ));
    }
}
