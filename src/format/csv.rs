//! CSV and TSV codec.
//!
//! RFC-4180-style quoting: fields containing the delimiter, a quote, or a
//! line break are enclosed in double quotes; embedded quotes double. An
//! unquoted empty field reads as NULL, a quoted empty field as an empty
//! string; the WITHOUT_NULL flag turns the former into empty strings too.

use crate::error::FlatqError;
use crate::file::FileInfo;
use crate::format::{DecodedTable, EncodeSource, FileCodec, decode_error};
use crate::value::Value;

pub struct CsvCodec;

/// One raw field: text plus whether it was quoted.
struct RawField {
    text: String,
    quoted: bool,
}

impl RawField {
    fn into_value(self, without_null: bool) -> Value {
        if self.text.is_empty() && !self.quoted && !without_null {
            Value::Null
        } else {
            Value::String(self.text)
        }
    }
}

/// Split normalized text into rows of raw fields.
fn parse_rows(text: &str, delimiter: char, info: &FileInfo) -> Result<Vec<Vec<RawField>>, FlatqError> {
    let mut rows: Vec<Vec<RawField>> = Vec::new();
    let mut fields: Vec<RawField> = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut iter = text.chars().peekable();

    // Whether the row has any content yet; a bare line break on an empty
    // row is skipped instead of producing a one-field null row.
    let mut row_started = false;

    while let Some(c) = iter.next() {
        if c == '"' && current.is_empty() && !quoted {
            // Opening quote: consume until the closing quote.
            let mut inner = String::new();
            loop {
                match iter.next() {
                    None => return Err(decode_error(info, "quoted field is not terminated")),
                    Some('"') => {
                        if iter.peek() == Some(&'"') {
                            iter.next();
                            inner.push('"');
                        } else {
                            break;
                        }
                    }
                    Some(c) => inner.push(c),
                }
            }
            current = inner;
            quoted = true;
            row_started = true;
            continue;
        }
        if c == delimiter {
            fields.push(RawField {
                text: std::mem::take(&mut current),
                quoted,
            });
            quoted = false;
            row_started = true;
            continue;
        }
        if c == '\n' {
            if row_started || !current.is_empty() {
                fields.push(RawField {
                    text: std::mem::take(&mut current),
                    quoted,
                });
                rows.push(std::mem::take(&mut fields));
            }
            quoted = false;
            row_started = false;
            continue;
        }
        if quoted {
            return Err(decode_error(info, "unexpected character after a quoted field"));
        }
        current.push(c);
    }
    if row_started || !current.is_empty() {
        fields.push(RawField {
            text: current,
            quoted,
        });
        rows.push(fields);
    }
    Ok(rows)
}

impl FileCodec for CsvCodec {
    fn decode(&self, text: &str, info: &FileInfo) -> Result<DecodedTable, FlatqError> {
        let mut rows = parse_rows(text, info.delimiter, info)?;
        if rows.is_empty() {
            return Err(decode_error(info, "file is empty"));
        }
        let columns: Vec<String> = if info.no_header {
            (1..=rows[0].len()).map(|i| format!("c{i}")).collect()
        } else {
            rows.remove(0)
                .into_iter()
                .map(|f| f.text)
                .collect()
        };
        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(decode_error(
                    info,
                    format_args!(
                        "row {} has {} fields, expected {}",
                        i + 1,
                        row.len(),
                        columns.len()
                    ),
                ));
            }
            out.push(
                row.into_iter()
                    .map(|f| f.into_value(info.without_null))
                    .collect(),
            );
        }
        Ok(DecodedTable {
            columns,
            rows: out,
        })
    }

    fn encode(&self, source: &EncodeSource, info: &FileInfo) -> Result<String, FlatqError> {
        let lb = info.line_break.as_bytes();
        let mut lines = Vec::with_capacity(source.rows.len() + 1);
        if !info.no_header {
            let header: Vec<String> = source
                .labels
                .iter()
                .map(|l| quote_field(l, info.delimiter, info.enclose_all))
                .collect();
            lines.push(header.join(&info.delimiter.to_string()));
        }
        for row in &source.rows {
            let fields: Vec<String> = row
                .iter()
                .map(|v| match v.to_field() {
                    None => String::new(),
                    Some(s) if s.is_empty() => "\"\"".to_string(),
                    Some(s) => quote_field(&s, info.delimiter, info.enclose_all),
                })
                .collect();
            lines.push(fields.join(&info.delimiter.to_string()));
        }
        let mut out = lines.join(lb);
        out.push_str(lb);
        Ok(out)
    }
}

/// Quote-minimal field encoding, or unconditional quoting under ENCLOSE_ALL.
fn quote_field(s: &str, delimiter: char, enclose_all: bool) -> String {
    let needs_quotes =
        enclose_all || s.contains(delimiter) || s.contains('"') || s.contains('\n') || s.contains('\r');
    if needs_quotes {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::format::Format;
    use std::path::PathBuf;

    fn info() -> FileInfo {
        FileInfo::new(PathBuf::from("t.csv"), Format::Csv, &SessionFlags::default())
    }

    #[test]
    fn decodes_quotes_and_nulls() {
        let table = CsvCodec
            .decode("a,b,c\n1,\"x,y\",\n\"\",\"he said \"\"hi\"\"\",2\n", &info())
            .unwrap();
        assert_eq!(table.columns, vec!["a", "b", "c"]);
        assert_eq!(table.rows[0][1], Value::String("x,y".into()));
        assert_eq!(table.rows[0][2], Value::Null);
        assert_eq!(table.rows[1][0], Value::String(String::new()));
        assert_eq!(table.rows[1][1], Value::String("he said \"hi\"".into()));
    }

    #[test]
    fn without_null_reads_empty_strings() {
        let mut info = info();
        info.without_null = true;
        let table = CsvCodec.decode("a,b\n1,\n", &info).unwrap();
        assert_eq!(table.rows[0][1], Value::String(String::new()));
    }

    #[test]
    fn no_header_synthesizes_column_names() {
        let mut info = info();
        info.no_header = true;
        let table = CsvCodec.decode("1,2\n3,4\n", &info).unwrap();
        assert_eq!(table.columns, vec!["c1", "c2"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = CsvCodec.decode("a,b\n1\n", &info()).unwrap_err();
        assert!(matches!(err, FlatqError::DataDecode { .. }));
    }

    #[test]
    fn embedded_line_breaks_survive() {
        let table = CsvCodec.decode("a\n\"x\ny\"\n", &info()).unwrap();
        assert_eq!(table.rows[0][0], Value::String("x\ny".into()));
    }

    #[test]
    fn encode_round_trips() {
        let source = EncodeSource {
            labels: vec!["a".into(), "b".into()],
            rows: vec![
                vec![Value::Integer(1), Value::String("x,y".into())],
                vec![Value::Null, Value::String(String::new())],
            ],
        };
        let text = CsvCodec.encode(&source, &info()).unwrap();
        assert_eq!(text, "a,b\n1,\"x,y\"\n,\"\"\n");
        let table = CsvCodec.decode(&text, &info()).unwrap();
        assert_eq!(table.rows[1][0], Value::Null);
        assert_eq!(table.rows[1][1], Value::String(String::new()));
    }

    #[test]
    fn enclose_all_quotes_everything() {
        let mut info = info();
        info.enclose_all = true;
        let source = EncodeSource {
            labels: vec!["a".into()],
            rows: vec![vec![Value::String("x".into())]],
        };
        assert_eq!(CsvCodec.encode(&source, &info).unwrap(), "\"a\"\n\"x\"\n");
    }
}
