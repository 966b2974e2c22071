//! LTSV codec: `label:value` pairs separated by tabs, one record per line.
//!
//! The header is the union of labels in encounter order; records missing a
//! label read NULL for it.

use indexmap::IndexSet;

use crate::error::FlatqError;
use crate::file::FileInfo;
use crate::format::{DecodedTable, EncodeSource, FileCodec, decode_error};
use crate::record::ident_eq;
use crate::value::Value;

pub struct LtsvCodec;

impl FileCodec for LtsvCodec {
    fn decode(&self, text: &str, info: &FileInfo) -> Result<DecodedTable, FlatqError> {
        let mut labels: IndexSet<String> = IndexSet::new();
        let mut raw_rows: Vec<Vec<(String, String)>> = Vec::new();
        for (lineno, line) in text.split('\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let mut pairs = Vec::new();
            for part in line.split('\t') {
                let (label, value) = part.split_once(':').ok_or_else(|| {
                    decode_error(
                        info,
                        format_args!("line {}: field {part:?} has no label", lineno + 1),
                    )
                })?;
                labels.insert(label.to_string());
                pairs.push((label.to_string(), value.to_string()));
            }
            raw_rows.push(pairs);
        }
        if raw_rows.is_empty() {
            return Err(decode_error(info, "file is empty"));
        }
        let columns: Vec<String> = labels.into_iter().collect();
        let rows = raw_rows
            .into_iter()
            .map(|pairs| {
                columns
                    .iter()
                    .map(|col| {
                        match pairs.iter().find(|(l, _)| ident_eq(l, col)) {
                            Some((_, v)) if !v.is_empty() || info.without_null => {
                                Value::String(v.clone())
                            }
                            _ => Value::Null,
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(DecodedTable { columns, rows })
    }

    fn encode(&self, source: &EncodeSource, info: &FileInfo) -> Result<String, FlatqError> {
        let lb = info.line_break.as_bytes();
        let mut lines = Vec::with_capacity(source.rows.len());
        for row in &source.rows {
            let fields: Vec<String> = source
                .labels
                .iter()
                .zip(row.iter())
                .map(|(label, v)| format!("{label}:{}", v.to_field().unwrap_or_default()))
                .collect();
            lines.push(fields.join("\t"));
        }
        let mut out = lines.join(lb);
        out.push_str(lb);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::format::Format;
    use std::path::PathBuf;

    fn info() -> FileInfo {
        FileInfo::new(
            PathBuf::from("t.ltsv"),
            Format::Ltsv,
            &SessionFlags::default(),
        )
    }

    #[test]
    fn merges_labels_across_records() {
        let table = LtsvCodec
            .decode("a:1\tb:x\nb:y\tc:2\n", &info())
            .unwrap();
        assert_eq!(table.columns, vec!["a", "b", "c"]);
        assert_eq!(table.rows[0][2], Value::Null);
        assert_eq!(table.rows[1][0], Value::Null);
        assert_eq!(table.rows[1][1], Value::String("y".into()));
    }

    #[test]
    fn unlabeled_field_is_an_error() {
        assert!(LtsvCodec.decode("a:1\tnolabel\n", &info()).is_err());
    }

    #[test]
    fn round_trip() {
        let source = EncodeSource {
            labels: vec!["a".into(), "b".into()],
            rows: vec![vec![Value::Integer(1), Value::Null]],
        };
        let text = LtsvCodec.encode(&source, &info()).unwrap();
        assert_eq!(text, "a:1\tb:\n");
        let table = LtsvCodec.decode(&text, &info()).unwrap();
        assert_eq!(table.rows[0][1], Value::Null);
    }
}
