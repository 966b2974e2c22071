//! Cached views and temporary-view scopes.
//!
//! Two tiers back table lookup:
//! - [`ViewCache`]: one entry per loaded file, keyed by uppercased absolute
//!   path. The first reference in a transaction loads the file; later
//!   references reuse the entry. An entry loaded read-only is discarded and
//!   reloaded when a statement needs it for update.
//! - [`TempViewScopes`]: a stack of name-keyed scopes for stdin, declared
//!   tables, and recursive work tables. The innermost scope shadows outer
//!   ones.
//!
//! Lookups take the shared lock; set/replace/dispose take the exclusive
//! lock. File handlers are acquired before the entry is inserted, never
//! while holding the map lock.

use std::sync::RwLock;

use indexmap::IndexMap;

use crate::error::FlatqError;
use crate::file::FileHandler;
use crate::view::View;

/// One cached file-backed view.
#[derive(Debug)]
pub struct CachedEntry {
    pub view: View,
    pub for_update: bool,
    /// Exclusive lock handler, held until commit or rollback for entries
    /// loaded for update.
    pub handler: Option<FileHandler>,
}

/// Process-wide store of loaded tables.
#[derive(Debug, Default)]
pub struct ViewCache {
    map: RwLock<IndexMap<String, CachedEntry>>,
}

impl ViewCache {
    pub fn new() -> ViewCache {
        ViewCache::default()
    }

    /// Copy of the cached view, if present.
    pub fn get(&self, key: &str) -> Option<View> {
        let map = self.map.read().expect("cache lock");
        map.get(key).map(|e| e.view.clone())
    }

    /// Whether the entry exists, and whether it was loaded for update.
    pub fn loaded_for_update(&self, key: &str) -> Option<bool> {
        let map = self.map.read().expect("cache lock");
        map.get(key).map(|e| e.for_update)
    }

    pub fn exists(&self, key: &str) -> bool {
        let map = self.map.read().expect("cache lock");
        map.contains_key(key)
    }

    /// Insert or overwrite an entry. The handler must already be acquired.
    pub fn set(&self, key: String, view: View, for_update: bool, handler: Option<FileHandler>) {
        let mut map = self.map.write().expect("cache lock");
        map.insert(
            key,
            CachedEntry {
                view,
                for_update,
                handler,
            },
        );
    }

    /// Replace the in-memory view of an existing entry, keeping its lock
    /// state. Returns false when the entry does not exist.
    pub fn replace(&self, key: &str, view: View) -> bool {
        let mut map = self.map.write().expect("cache lock");
        match map.get_mut(key) {
            Some(entry) => {
                entry.view = view;
                true
            }
            None => false,
        }
    }

    /// Drop an entry, releasing its handler.
    pub fn dispose(&self, key: &str) -> bool {
        let mut map = self.map.write().expect("cache lock");
        map.shift_remove(key).is_some()
    }

    /// Drop everything. Handlers release their locks on drop.
    pub fn clear(&self) {
        let mut map = self.map.write().expect("cache lock");
        map.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let map = self.map.read().expect("cache lock");
        map.keys().cloned().collect()
    }

    /// Copies of all entries in insertion order, for the commit walk.
    pub fn snapshot(&self) -> Vec<(String, View)> {
        let map = self.map.read().expect("cache lock");
        map.iter().map(|(k, e)| (k.clone(), e.view.clone())).collect()
    }
}

/// Scope stack of temporary views.
#[derive(Debug, Default)]
pub struct TempViewScopes(Vec<IndexMap<String, View>>);

impl TempViewScopes {
    pub fn new() -> TempViewScopes {
        TempViewScopes(vec![IndexMap::new()])
    }

    pub fn push_scope(&mut self) {
        self.0.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.0.len() > 1 {
            self.0.pop();
        }
    }

    fn key(name: &str) -> String {
        name.to_uppercase()
    }

    /// Innermost-out lookup.
    pub fn get(&self, name: &str) -> Option<View> {
        let key = Self::key(name);
        self.0.iter().rev().find_map(|scope| scope.get(&key).cloned())
    }

    pub fn exists(&self, name: &str) -> bool {
        let key = Self::key(name);
        self.0.iter().any(|scope| scope.contains_key(&key))
    }

    /// Declare in the innermost scope. Redeclaration there is an error.
    pub fn declare(&mut self, name: &str, view: View) -> Result<(), FlatqError> {
        let key = Self::key(name);
        let scope = self.0.last_mut().expect("at least one scope");
        if scope.contains_key(&key) {
            return Err(FlatqError::DuplicateTableName(name.to_string()));
        }
        scope.insert(key, view);
        Ok(())
    }

    /// Replace wherever the name is visible, innermost first.
    pub fn replace(&mut self, name: &str, view: View) -> bool {
        let key = Self::key(name);
        for scope in self.0.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(&key) {
                *slot = view;
                return true;
            }
        }
        false
    }

    pub fn dispose(&mut self, name: &str) -> bool {
        let key = Self::key(name);
        for scope in self.0.iter_mut().rev() {
            if scope.shift_remove(&key).is_some() {
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.0 = vec![IndexMap::new()];
    }

    /// Names visible from the current scope.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for scope in self.0.iter().rev() {
            for name in scope.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Header;

    fn dummy_view(marker: i64) -> View {
        let mut v = View::empty();
        v.header = Header::from_columns(Some("t"), &[format!("col{marker}")]).unwrap();
        v
    }

    #[test]
    fn cache_set_get_replace_dispose() {
        let cache = ViewCache::new();
        assert!(cache.get("K").is_none());
        cache.set("K".into(), dummy_view(1), false, None);
        assert!(cache.exists("K"));
        assert_eq!(cache.loaded_for_update("K"), Some(false));
        assert!(cache.replace("K", dummy_view(2)));
        assert_eq!(cache.get("K").unwrap().header.field(0).column, "col2");
        assert!(cache.dispose("K"));
        assert!(!cache.dispose("K"));
    }

    #[test]
    fn temp_scopes_shadow_and_unwind() {
        let mut temps = TempViewScopes::new();
        temps.declare("t", dummy_view(1)).unwrap();
        temps.push_scope();
        temps.declare("t", dummy_view(2)).unwrap();
        assert_eq!(temps.get("T").unwrap().header.field(0).column, "col2");
        temps.pop_scope();
        assert_eq!(temps.get("t").unwrap().header.field(0).column, "col1");
        assert!(temps.declare("T", dummy_view(3)).is_err());
    }

    #[test]
    fn temp_replace_reaches_outer_scopes() {
        let mut temps = TempViewScopes::new();
        temps.declare("t", dummy_view(1)).unwrap();
        temps.push_scope();
        assert!(temps.replace("t", dummy_view(9)));
        assert_eq!(temps.get("t").unwrap().header.field(0).column, "col9");
        assert!(!temps.replace("u", dummy_view(1)));
    }
}
