//! Fixed-width codec.
//!
//! Field layout comes from explicit byte cut points, from `SPACES`
//! auto-detection against the header line, or from a cyclic single-line
//! spec (`S[...]`). Decoded fields are trimmed; an all-space field reads
//! as NULL unless WITHOUT_NULL is set.

use crate::error::FlatqError;
use crate::file::{FileInfo, FixedSpec};
use crate::format::{DecodedTable, EncodeSource, FileCodec, decode_error};
use crate::value::Value;

pub struct FixedCodec;

/// Parse a positions argument: a JSON array of ascending byte cut points,
/// `SPACES`, or `S[...]` for the single-line layout.
pub fn parse_spec(arg: &str) -> Result<FixedSpec, FlatqError> {
    let trimmed = arg.trim();
    if trimmed.eq_ignore_ascii_case("SPACES") {
        return Ok(FixedSpec::Spaces);
    }
    let (single, body) = match trimmed.strip_prefix('S').or_else(|| trimmed.strip_prefix('s')) {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let positions: Vec<usize> = serde_json::from_str(body)
        .map_err(|_| FlatqError::InvalidValue(format!("{arg} is not a valid delimiter position spec")))?;
    if positions.is_empty() || positions.windows(2).any(|w| w[0] >= w[1]) || positions[0] == 0 {
        return Err(FlatqError::InvalidValue(format!(
            "{arg} is not a valid delimiter position spec"
        )));
    }
    Ok(if single {
        FixedSpec::SingleLine(positions)
    } else {
        FixedSpec::Positions(positions)
    })
}

/// Slice a line at byte cut points, backing off to char boundaries.
fn cut(line: &str, positions: &[usize]) -> Vec<String> {
    let bytes = line.as_bytes();
    let mut fields = Vec::with_capacity(positions.len());
    let mut prev = 0;
    for &pos in positions {
        let end = pos.min(bytes.len());
        let start = prev.min(end);
        fields.push(String::from_utf8_lossy(&bytes[start..end]).trim().to_string());
        prev = pos;
    }
    fields
}

/// Derive cut points from the header line: each field starts where a
/// non-space follows spaces.
fn detect_positions(header: &str) -> Result<Vec<usize>, FlatqError> {
    let bytes = header.as_bytes();
    let mut positions = Vec::new();
    let mut in_space = false;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b' ' {
            in_space = true;
        } else {
            if in_space && i > 0 {
                positions.push(i);
            }
            in_space = false;
        }
    }
    positions.push(bytes.len());
    Ok(positions)
}

fn field_value(text: String, without_null: bool) -> Value {
    if text.is_empty() && !without_null {
        Value::Null
    } else {
        Value::String(text)
    }
}

impl FileCodec for FixedCodec {
    fn decode(&self, text: &str, info: &FileInfo) -> Result<DecodedTable, FlatqError> {
        let spec = info.fixed.clone().unwrap_or(FixedSpec::Spaces);

        if let FixedSpec::SingleLine(positions) = &spec {
            let record_len = *positions.last().unwrap_or(&0);
            if record_len == 0 {
                return Err(decode_error(info, "empty single-line position spec"));
            }
            let body = text.trim_end_matches('\n');
            let columns: Vec<String> = (1..=positions.len()).map(|i| format!("c{i}")).collect();
            let mut rows = Vec::new();
            let bytes = body.as_bytes();
            let mut offset = 0;
            while offset < bytes.len() {
                let end = (offset + record_len).min(bytes.len());
                let chunk = String::from_utf8_lossy(&bytes[offset..end]).to_string();
                rows.push(
                    cut(&chunk, positions)
                        .into_iter()
                        .map(|f| field_value(f, info.without_null))
                        .collect(),
                );
                offset += record_len;
            }
            return Ok(DecodedTable { columns, rows });
        }

        let mut lines: Vec<&str> = text.split('\n').collect();
        while lines.last() == Some(&"") {
            lines.pop();
        }
        if lines.is_empty() {
            return Err(decode_error(info, "file is empty"));
        }
        let positions = match &spec {
            FixedSpec::Positions(p) => p.clone(),
            FixedSpec::Spaces => detect_positions(lines[0])?,
            FixedSpec::SingleLine(_) => unreachable!("handled above"),
        };
        let mut columns: Vec<String> = Vec::new();
        let data_start = if info.no_header {
            columns = (1..=positions.len()).map(|i| format!("c{i}")).collect();
            0
        } else {
            columns.extend(cut(lines[0], &positions));
            1
        };
        let rows = lines[data_start..]
            .iter()
            .map(|line| {
                cut(line, &positions)
                    .into_iter()
                    .map(|f| field_value(f, info.without_null))
                    .collect()
            })
            .collect();
        Ok(DecodedTable { columns, rows })
    }

    fn encode(&self, source: &EncodeSource, info: &FileInfo) -> Result<String, FlatqError> {
        let positions = match &info.fixed {
            Some(FixedSpec::Positions(p)) | Some(FixedSpec::SingleLine(p)) => p.clone(),
            _ => {
                // Without an explicit spec, size each column to its widest
                // content plus one space of padding.
                let mut widths: Vec<usize> =
                    source.labels.iter().map(|l| l.len() + 1).collect();
                for row in &source.rows {
                    for (i, v) in row.iter().enumerate() {
                        if let Some(s) = v.to_field() {
                            if i < widths.len() {
                                widths[i] = widths[i].max(s.len() + 1);
                            }
                        }
                    }
                }
                let mut positions = Vec::with_capacity(widths.len());
                let mut acc = 0;
                for w in widths {
                    acc += w;
                    positions.push(acc);
                }
                positions
            }
        };
        let lb = info.line_break.as_bytes();
        let mut lines = Vec::with_capacity(source.rows.len() + 1);
        if !info.no_header {
            lines.push(pad_line(&source.labels, &positions, info)?);
        }
        for row in &source.rows {
            let fields: Vec<String> = row
                .iter()
                .map(|v| v.to_field().unwrap_or_default())
                .collect();
            lines.push(pad_line(&fields, &positions, info)?);
        }
        let mut out = lines.join(lb);
        out.push_str(lb);
        Ok(out)
    }
}

fn pad_line(fields: &[String], positions: &[usize], info: &FileInfo) -> Result<String, FlatqError> {
    let mut line = String::new();
    let mut prev = 0;
    for (i, &pos) in positions.iter().enumerate() {
        let width = pos - prev;
        let field = fields.get(i).map(String::as_str).unwrap_or("");
        if field.len() > width {
            return Err(FlatqError::InvalidValue(format!(
                "value {field} is longer than the fixed field width {width}"
            )));
        }
        line.push_str(field);
        for _ in field.len()..width {
            line.push(' ');
        }
        prev = pos;
    }
    Ok(line.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionFlags;
    use crate::format::Format;
    use std::path::PathBuf;

    fn info_with(spec: Option<FixedSpec>) -> FileInfo {
        let mut info = FileInfo::new(
            PathBuf::from("t.txt"),
            Format::Fixed,
            &SessionFlags::default(),
        );
        info.fixed = spec;
        info
    }

    #[test]
    fn parses_position_specs() {
        assert_eq!(
            parse_spec("[3, 7]").unwrap(),
            FixedSpec::Positions(vec![3, 7])
        );
        assert_eq!(
            parse_spec("S[2,4]").unwrap(),
            FixedSpec::SingleLine(vec![2, 4])
        );
        assert_eq!(parse_spec("spaces").unwrap(), FixedSpec::Spaces);
        assert!(parse_spec("[7, 3]").is_err());
        assert!(parse_spec("[0]").is_err());
        assert!(parse_spec("nope").is_err());
    }

    #[test]
    fn decodes_explicit_positions() {
        let info = info_with(Some(FixedSpec::Positions(vec![3, 8])));
        let table = FixedCodec.decode("ab id \n1  x  \n2     \n", &info).unwrap();
        assert_eq!(table.columns, vec!["ab", "id"]);
        assert_eq!(table.rows[0][0], Value::String("1".into()));
        assert_eq!(table.rows[0][1], Value::String("x".into()));
        assert_eq!(table.rows[1][1], Value::Null);
    }

    #[test]
    fn spaces_auto_detection() {
        let info = info_with(Some(FixedSpec::Spaces));
        let table = FixedCodec
            .decode("name  age\nann   12 \nbo    7  \n", &info)
            .unwrap();
        assert_eq!(table.columns, vec!["name", "age"]);
        assert_eq!(table.rows[1][0], Value::String("bo".into()));
        assert_eq!(table.rows[1][1], Value::String("7".into()));
    }

    #[test]
    fn single_line_layout() {
        let info = info_with(Some(FixedSpec::SingleLine(vec![1, 3])));
        let table = FixedCodec.decode("a12b34", &info).unwrap();
        assert_eq!(table.columns, vec!["c1", "c2"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], Value::String("a".into()));
        assert_eq!(table.rows[1][1], Value::String("34".into()));
    }

    #[test]
    fn encode_round_trips_with_positions() {
        let info = info_with(Some(FixedSpec::Positions(vec![4, 8])));
        let source = EncodeSource {
            labels: vec!["a".into(), "b".into()],
            rows: vec![vec![Value::Integer(10), Value::String("x".into())]],
        };
        let text = FixedCodec.encode(&source, &info).unwrap();
        let table = FixedCodec.decode(&text, &info).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0][0], Value::String("10".into()));
    }

    #[test]
    fn overlong_value_is_rejected_on_encode() {
        let info = info_with(Some(FixedSpec::Positions(vec![2])));
        let source = EncodeSource {
            labels: vec!["a".into()],
            rows: vec![vec![Value::String("toolong".into())]],
        };
        assert!(FixedCodec.encode(&source, &info).is_err());
    }
}
