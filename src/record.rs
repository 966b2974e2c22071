//! Header metadata, cells, and records.
//!
//! A [`Record`] is an ordered sequence of [`Cell`]s whose length is at least
//! the header length; slots past the header length hold per-query scratch
//! values (memoized expressions, analytic outputs). A cell holds a single
//! value, or a group of values after GROUP BY; a singleton cell reads as a
//! group of length one.
//!
//! Name resolution is case-insensitive for identifiers. A qualified
//! reference must match qualifier and column exactly; a bare column matches
//! at most one field, otherwise the reference is ambiguous.

use crate::error::FlatqError;
use crate::value::Value;

/// Reserved column prepended to a view loaded for update. Holds the stable
/// 0-based row ordinal used by UPDATE and DELETE.
pub const INTERNAL_ID_COLUMN: &str = "@__internal_id";

static NULL_VALUE: Value = Value::Null;

/// Case-insensitive identifier equality.
pub fn ident_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// One cell: a single value or a group of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell(Vec<Value>);

impl Cell {
    pub fn single(v: Value) -> Cell {
        Cell(vec![v])
    }

    pub fn group(vs: Vec<Value>) -> Cell {
        Cell(vs)
    }

    /// The scalar reading of this cell: its first value.
    pub fn value(&self) -> &Value {
        self.0.first().unwrap_or(&NULL_VALUE)
    }

    /// Positional read. Out of range reads as NULL.
    pub fn at(&self, i: usize) -> &Value {
        self.0.get(i).unwrap_or(&NULL_VALUE)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn set(&mut self, v: Value) {
        self.0 = vec![v];
    }
}

/// An ordered row of cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<Cell>);

impl Record {
    pub fn new(cells: Vec<Cell>) -> Record {
        Record(cells)
    }

    pub fn from_values(values: Vec<Value>) -> Record {
        Record(values.into_iter().map(Cell::single).collect())
    }

    pub fn cell(&self, i: usize) -> &Cell {
        &self.0[i]
    }

    pub fn cell_mut(&mut self, i: usize) -> &mut Cell {
        &mut self.0[i]
    }

    pub fn value(&self, i: usize) -> &Value {
        self.0[i].value()
    }

    pub fn push(&mut self, cell: Cell) {
        self.0.push(cell);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    /// The group length of this record: the length of its first cell.
    /// Every cell of a grouped record has the same length.
    pub fn group_len(&self) -> usize {
        self.0.first().map(Cell::len).unwrap_or(0)
    }
}

/// Metadata for one header column.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    /// Qualifier: the view name or FROM alias this column belongs to.
    pub view: Option<String>,
    /// Column name.
    pub column: String,
    /// Additional names this column answers to (select aliases).
    pub aliases: Vec<String>,
    /// 1-based ordinal, renumbered by Fix.
    pub number: usize,
    /// Column originates from a loaded table rather than an expression.
    pub is_from_table: bool,
    /// Collapsed join column from USING or NATURAL JOIN.
    pub is_join_column: bool,
    /// Column is a GROUP BY key and may be read as a scalar when grouped.
    pub is_group_key: bool,
}

impl HeaderField {
    pub fn new(view: Option<&str>, column: &str) -> HeaderField {
        HeaderField {
            view: view.map(|s| s.to_string()),
            column: column.to_string(),
            aliases: Vec::new(),
            number: 0,
            is_from_table: false,
            is_join_column: false,
            is_group_key: false,
        }
    }

    fn matches_column(&self, name: &str) -> bool {
        ident_eq(&self.column, name) || self.aliases.iter().any(|a| ident_eq(a, name))
    }

    /// The label shown for this column in results: first alias if present,
    /// else the column name.
    pub fn label(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or(&self.column)
    }
}

/// Column metadata for a view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header(Vec<HeaderField>);

impl Header {
    /// Build a header for a freshly loaded table. Duplicate column names are
    /// a declaration error.
    pub fn from_columns(view: Option<&str>, columns: &[String]) -> Result<Header, FlatqError> {
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].iter().any(|p| ident_eq(p, c)) {
                return Err(FlatqError::FieldAmbiguous(c.clone()));
            }
        }
        let fields = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut f = HeaderField::new(view, c);
                f.number = i + 1;
                f.is_from_table = true;
                f
            })
            .collect();
        Ok(Header(fields))
    }

    /// Header with the reserved internal-id column prepended.
    pub fn with_internal_id(view: Option<&str>, columns: &[String]) -> Result<Header, FlatqError> {
        let mut header = Header::from_columns(view, columns)?;
        let mut id = HeaderField::new(view, INTERNAL_ID_COLUMN);
        id.is_from_table = true;
        header.0.insert(0, id);
        for (i, f) in header.0.iter_mut().enumerate() {
            f.number = i + 1;
        }
        Ok(header)
    }

    pub fn from_fields(fields: Vec<HeaderField>) -> Header {
        Header(fields)
    }

    pub fn fields(&self) -> &[HeaderField] {
        &self.0
    }

    pub fn field(&self, i: usize) -> &HeaderField {
        &self.0[i]
    }

    pub fn field_mut(&mut self, i: usize) -> &mut HeaderField {
        &mut self.0[i]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve a column reference. Qualified references match qualifier and
    /// column; bare references match column or alias with a uniqueness
    /// check.
    pub fn contains(&self, view: Option<&str>, column: &str) -> Result<usize, FlatqError> {
        match view {
            Some(v) => {
                let mut found = None;
                for (i, f) in self.0.iter().enumerate() {
                    let view_match = f.view.as_deref().map(|fv| ident_eq(fv, v)).unwrap_or(false);
                    if view_match && f.matches_column(column) {
                        if found.is_some() {
                            return Err(FlatqError::FieldAmbiguous(format!("{v}.{column}")));
                        }
                        found = Some(i);
                    }
                }
                found.ok_or_else(|| FlatqError::FieldNotExist(format!("{v}.{column}")))
            }
            None => {
                let mut found = None;
                for (i, f) in self.0.iter().enumerate() {
                    if f.matches_column(column) {
                        if found.is_some() {
                            return Err(FlatqError::FieldAmbiguous(column.to_string()));
                        }
                        found = Some(i);
                    }
                }
                found.ok_or_else(|| FlatqError::FieldNotExist(column.to_string()))
            }
        }
    }

    /// Resolve a reference by column ordinal, e.g. `t.2`.
    pub fn contains_number(&self, view: &str, number: usize) -> Result<usize, FlatqError> {
        let mut nth = 0;
        for (i, f) in self.0.iter().enumerate() {
            let view_match = f.view.as_deref().map(|fv| ident_eq(fv, view)).unwrap_or(false);
            if view_match && !ident_eq(&f.column, INTERNAL_ID_COLUMN) {
                nth += 1;
                if nth == number {
                    return Ok(i);
                }
            }
        }
        Err(FlatqError::FieldNotExist(format!("{view}.{number}")))
    }

    /// Index of the internal-id column for the given qualifier.
    pub fn internal_id_index(&self, view: &str) -> Result<usize, FlatqError> {
        for (i, f) in self.0.iter().enumerate() {
            let view_match = f.view.as_deref().map(|fv| ident_eq(fv, view)).unwrap_or(false);
            if view_match && ident_eq(&f.column, INTERNAL_ID_COLUMN) {
                return Ok(i);
            }
        }
        Err(FlatqError::InternalError(format!(
            "view {view} is not loaded for update"
        )))
    }

    pub fn append(&mut self, mut field: HeaderField) -> usize {
        field.number = self.0.len() + 1;
        self.0.push(field);
        self.0.len() - 1
    }

    /// Rename the column at `i`.
    pub fn rename(&mut self, i: usize, new_name: &str) {
        self.0[i].column = new_name.to_string();
        self.0[i].aliases.clear();
    }

    /// Set the qualifier of every field, e.g. when a subquery or load gets
    /// a FROM alias.
    pub fn update_view_name(&mut self, name: &str) {
        for f in &mut self.0 {
            f.view = Some(name.to_string());
        }
    }

    /// Merge two headers for a join result.
    pub fn merge(left: &Header, right: &Header) -> Header {
        let mut fields = left.0.clone();
        fields.extend(right.0.iter().cloned());
        for (i, f) in fields.iter_mut().enumerate() {
            f.number = i + 1;
        }
        Header(fields)
    }

    /// Indices of all non-internal columns, in order. Star expansion.
    pub fn visible_indices(&self, view: Option<&str>) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, f)| !ident_eq(&f.column, INTERNAL_ID_COLUMN))
            .filter(|(_, f)| match view {
                Some(v) => f.view.as_deref().map(|fv| ident_eq(fv, v)).unwrap_or(false),
                None => true,
            })
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::from_columns(Some("t"), &["a".to_string(), "b".to_string()]).unwrap()
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err =
            Header::from_columns(Some("t"), &["a".to_string(), "A".to_string()]).unwrap_err();
        assert!(matches!(err, FlatqError::FieldAmbiguous(_)));
    }

    #[test]
    fn qualified_and_bare_resolution() {
        let h = header();
        assert_eq!(h.contains(Some("t"), "a").unwrap(), 0);
        assert_eq!(h.contains(Some("T"), "B").unwrap(), 1);
        assert_eq!(h.contains(None, "b").unwrap(), 1);
        assert!(matches!(
            h.contains(Some("u"), "a").unwrap_err(),
            FlatqError::FieldNotExist(_)
        ));
    }

    #[test]
    fn bare_ambiguity_across_views() {
        let left = header();
        let mut right = header();
        right.update_view_name("u");
        let merged = Header::merge(&left, &right);
        assert!(matches!(
            merged.contains(None, "a").unwrap_err(),
            FlatqError::FieldAmbiguous(_)
        ));
        assert_eq!(merged.contains(Some("u"), "a").unwrap(), 2);
    }

    #[test]
    fn aliases_resolve_like_columns() {
        let mut h = header();
        h.field_mut(0).aliases.push("x".to_string());
        assert_eq!(h.contains(None, "X").unwrap(), 0);
        assert_eq!(h.field(0).label(), "x");
    }

    #[test]
    fn internal_id_is_prepended_and_hidden() {
        let h = Header::with_internal_id(Some("t"), &["a".to_string()]).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.internal_id_index("t").unwrap(), 0);
        assert_eq!(h.visible_indices(None), vec![1]);
        assert_eq!(h.contains_number("t", 1).unwrap(), 1);
    }

    #[test]
    fn cells_read_positionally() {
        let c = Cell::single(Value::Integer(1));
        assert_eq!(c.len(), 1);
        assert_eq!(c.at(0), &Value::Integer(1));
        assert_eq!(c.at(5), &Value::Null);
        let g = Cell::group(vec![]);
        assert_eq!(g.value(), &Value::Null);
        assert_eq!(g.len(), 0);
    }
}
