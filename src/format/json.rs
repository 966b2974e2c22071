//! JSON codec.
//!
//! A JSON source is a document plus a path query selecting an array of
//! objects: `""` selects the root, `a.b` walks object members, `a[0]`
//! indexes arrays. Columns are the union of member names in encounter
//! order. Nested structures read as their JSON text.
//!
//! Output is an array of objects; the JSON_ESCAPE flag picks backslash,
//! hex, or hex-all string escaping.

use serde_json::Value as Json;

use crate::config::JsonEscape;
use crate::error::FlatqError;
use crate::file::FileInfo;
use crate::format::{DecodedTable, EncodeSource, FileCodec, decode_error};
use crate::value::Value;
use indexmap::IndexSet;

pub struct JsonCodec;

/// Walk a dot/bracket path query from the document root.
fn apply_query<'a>(root: &'a Json, query: &str) -> Result<&'a Json, String> {
    let mut node = root;
    let query = query.trim();
    if query.is_empty() {
        return Ok(node);
    }
    for segment in query.split('.') {
        let (name, indexes) = parse_segment(segment)?;
        if !name.is_empty() {
            node = node
                .as_object()
                .and_then(|o| o.get(&name))
                .ok_or_else(|| format!("member {name} does not exist"))?;
        }
        for idx in indexes {
            node = node
                .as_array()
                .and_then(|a| a.get(idx))
                .ok_or_else(|| format!("index {idx} does not exist"))?;
        }
    }
    Ok(node)
}

/// Split `name[0][1]` into the member name and its indexes.
fn parse_segment(segment: &str) -> Result<(String, Vec<usize>), String> {
    let mut name = String::new();
    let mut indexes = Vec::new();
    let mut rest = segment;
    if let Some(open) = rest.find('[') {
        name = rest[..open].to_string();
        rest = &rest[open..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped
                .find(']')
                .ok_or_else(|| format!("{segment} is not a valid path segment"))?;
            let idx: usize = stripped[..close]
                .trim()
                .parse()
                .map_err(|_| format!("{segment} is not a valid path segment"))?;
            indexes.push(idx);
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return Err(format!("{segment} is not a valid path segment"));
        }
    } else {
        name = rest.to_string();
    }
    Ok((name, indexes))
}

fn json_to_value(j: &Json) -> Value {
    match j {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

impl FileCodec for JsonCodec {
    fn decode(&self, text: &str, info: &FileInfo) -> Result<DecodedTable, FlatqError> {
        let root: Json =
            serde_json::from_str(text).map_err(|e| decode_error(info, e))?;
        let selected =
            apply_query(&root, &info.json_query).map_err(|e| decode_error(info, e))?;
        let array = selected
            .as_array()
            .ok_or_else(|| decode_error(info, "the query must select an array of objects"))?;

        let mut columns: IndexSet<String> = IndexSet::new();
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| decode_error(info, "the query must select an array of objects"))?;
            for key in obj.keys() {
                columns.insert(key.clone());
            }
        }
        let columns: Vec<String> = columns.into_iter().collect();
        let rows = array
            .iter()
            .map(|item| {
                let obj = item.as_object().expect("checked above");
                columns
                    .iter()
                    .map(|col| obj.get(col).map(json_to_value).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(DecodedTable { columns, rows })
    }

    fn encode(&self, source: &EncodeSource, info: &FileInfo) -> Result<String, FlatqError> {
        let mut out = String::from("[");
        for (i, row) in source.rows.iter().enumerate() {
            if 0 < i {
                out.push(',');
            }
            out.push('{');
            for (j, (label, v)) in source.labels.iter().zip(row.iter()).enumerate() {
                if 0 < j {
                    out.push(',');
                }
                write_json_string(&mut out, label, info.json_escape);
                out.push(':');
                write_json_scalar(&mut out, v, info.json_escape);
            }
            out.push('}');
        }
        out.push(']');
        out.push_str(info.line_break.as_bytes());
        Ok(out)
    }
}

fn write_json_scalar(out: &mut String, v: &Value, escape: JsonEscape) {
    match v {
        Value::Null => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(n) => out.push_str(&n.to_string()),
        Value::Float(f) => {
            if f.is_finite() {
                out.push_str(&f.to_string())
            } else {
                out.push_str("null")
            }
        }
        other => match other.to_field() {
            Some(s) => write_json_string(out, &s, escape),
            None => out.push_str("null"),
        },
    }
}

/// Write a JSON string literal under the configured escape policy.
fn write_json_string(out: &mut String, s: &str, escape: JsonEscape) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => match escape {
                JsonEscape::Backslash => out.push(c),
                JsonEscape::Hex if c.is_ascii() => out.push(c),
                _ => {
                    let mut buf = [0u16; 2];
                    for unit in c.encode_utf16(&mut buf) {
                        out.push_str(&format!("\\u{unit:04x}"));
                    }
                }
            },
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::format::Format;
    use std::path::PathBuf;

    fn info_with_query(query: &str) -> FileInfo {
        let mut info = FileInfo::new(
            PathBuf::from("t.json"),
            Format::Json,
            &SessionFlags::default(),
        );
        info.json_query = query.to_string();
        info
    }

    #[test]
    fn decodes_root_array() {
        let table = JsonCodec
            .decode(
                r#"[{"a": 1, "b": "x"}, {"b": null, "c": 2.5}]"#,
                &info_with_query(""),
            )
            .unwrap();
        assert_eq!(table.columns, vec!["a", "b", "c"]);
        assert_eq!(table.rows[0][0], Value::Integer(1));
        assert_eq!(table.rows[1][1], Value::Null);
        assert_eq!(table.rows[1][2], Value::Float(2.5));
        assert_eq!(table.rows[0][2], Value::Null);
    }

    #[test]
    fn path_query_selects_nested_array() {
        let doc = r#"{"data": {"items": [[{"a": 1}], [{"a": 2}]]}}"#;
        let table = JsonCodec
            .decode(doc, &info_with_query("data.items[1]"))
            .unwrap();
        assert_eq!(table.rows[0][0], Value::Integer(2));
        assert!(JsonCodec.decode(doc, &info_with_query("data.nope")).is_err());
        assert!(JsonCodec.decode(doc, &info_with_query("data")).is_err());
    }

    #[test]
    fn round_trip() {
        let source = EncodeSource {
            labels: vec!["a".into(), "b".into()],
            rows: vec![
                vec![Value::Integer(1), Value::String("x\"y".into())],
                vec![Value::Null, Value::Boolean(true)],
            ],
        };
        let info = info_with_query("");
        let text = JsonCodec.encode(&source, &info).unwrap();
        let table = JsonCodec.decode(&text, &info).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0][1], Value::String("x\"y".into()));
        assert_eq!(table.rows[1][0], Value::Null);
        assert_eq!(table.rows[1][1], Value::Boolean(true));
    }

    #[test]
    fn hex_escape_policy() {
        let mut out = String::new();
        write_json_string(&mut out, "aé", JsonEscape::Hex);
        assert_eq!(out, "\"a\\u00e9\"");
        let mut out = String::new();
        write_json_string(&mut out, "a", JsonEscape::HexAll);
        assert_eq!(out, "\"\\u0061\"");
    }
}
