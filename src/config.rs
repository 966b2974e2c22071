//! Session flags.
//!
//! Flags control decoding, encoding, and execution behavior. They are read
//! at process start (from CLI options), and every flag is mutable at runtime
//! with `SET @@FLAG = value`. List-valued flags additionally support
//! `ADD value TO @@FLAG` and `REMOVE value FROM @@FLAG`.
//!
//! Flag names are matched case-insensitively.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::FlatqError;
use crate::value::Value;

/// Text encoding of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    /// Detect from BOM, fall back to UTF-8.
    Auto,
    Utf8,
    /// UTF-8 with a byte order mark.
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl Encoding {
    pub fn parse(s: &str) -> Option<Encoding> {
        match s.to_uppercase().as_str() {
            "AUTO" => Some(Encoding::Auto),
            "UTF8" => Some(Encoding::Utf8),
            "UTF8M" => Some(Encoding::Utf8Bom),
            "UTF16LE" => Some(Encoding::Utf16Le),
            "UTF16BE" => Some(Encoding::Utf16Be),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Auto => "AUTO",
            Encoding::Utf8 => "UTF8",
            Encoding::Utf8Bom => "UTF8M",
            Encoding::Utf16Le => "UTF16LE",
            Encoding::Utf16Be => "UTF16BE",
        }
    }
}

/// Line-break style, detected on load and preserved on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineBreak {
    Lf,
    CrLf,
    Cr,
}

impl LineBreak {
    pub fn parse(s: &str) -> Option<LineBreak> {
        match s.to_uppercase().as_str() {
            "LF" => Some(LineBreak::Lf),
            "CRLF" => Some(LineBreak::CrLf),
            "CR" => Some(LineBreak::Cr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineBreak::Lf => "LF",
            LineBreak::CrLf => "CRLF",
            LineBreak::Cr => "CR",
        }
    }

    pub fn as_bytes(&self) -> &'static str {
        match self {
            LineBreak::Lf => "\n",
            LineBreak::CrLf => "\r\n",
            LineBreak::Cr => "\r",
        }
    }
}

/// String escape policy for JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JsonEscape {
    /// Escape control characters and quotes with backslashes.
    Backslash,
    /// Additionally escape non-ASCII characters as \uXXXX.
    Hex,
    /// Escape every character as \uXXXX.
    HexAll,
}

impl JsonEscape {
    pub fn parse(s: &str) -> Option<JsonEscape> {
        match s.to_uppercase().as_str() {
            "BACKSLASH" => Some(JsonEscape::Backslash),
            "HEX" => Some(JsonEscape::Hex),
            "HEXALL" => Some(JsonEscape::HexAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonEscape::Backslash => "BACKSLASH",
            JsonEscape::Hex => "HEX",
            JsonEscape::HexAll => "HEXALL",
        }
    }
}

/// The full set of session flags with their defaults.
#[derive(Debug, Clone, Serialize)]
pub struct SessionFlags {
    /// Field delimiter for CSV sources.
    pub delimiter: char,

    /// Text encoding for reading. AUTO detects from the BOM.
    pub encoding: Encoding,

    /// Line-break style used when a written file has no recorded style.
    pub line_break: LineBreak,

    /// Directory that relative table paths are resolved against.
    pub repository: PathBuf,

    /// Datetime layouts tried in order when parsing datetime strings,
    /// before the built-in layouts. chrono strftime syntax.
    pub datetime_format: Vec<String>,

    /// Treat double-quoted tokens as identifiers instead of strings.
    pub ansi_quotes: bool,

    /// The first line of a source file is data, not a header.
    pub no_header: bool,

    /// Read empty unquoted fields as empty strings instead of NULL.
    pub without_null: bool,

    /// Enclose every encoded CSV field, not just the ones that need it.
    pub enclose_all: bool,

    /// Count East Asian wide characters as two columns in fixed-width files.
    pub east_asian_encoding: bool,

    /// Count combining diacritical marks as one column instead of zero.
    pub count_diacritical_sign: bool,

    /// Count Unicode format codes as one column instead of zero.
    pub count_format_code: bool,

    /// Default path query applied when loading JSON sources.
    pub json_query: String,

    /// String escape policy for JSON output.
    pub json_escape: JsonEscape,

    /// Compare strings case-insensitively in predicates, LIKE, and
    /// comparison keys.
    pub ignore_case: bool,

    /// Maximum number of iterations for a recursive query.
    pub limit_recursion: i64,

    /// Worker pool size for data-parallel record passes.
    pub cpu: usize,

    /// Seconds to wait for a file lock before giving up.
    pub wait_timeout: f64,

    /// Milliseconds between file lock retries.
    pub retry_delay: u64,
}

impl Default for SessionFlags {
    fn default() -> Self {
        SessionFlags {
            delimiter: ',',
            encoding: Encoding::Auto,
            line_break: LineBreak::Lf,
            repository: PathBuf::from("."),
            datetime_format: Vec::new(),
            ansi_quotes: false,
            no_header: false,
            without_null: false,
            enclose_all: false,
            east_asian_encoding: false,
            count_diacritical_sign: false,
            count_format_code: false,
            json_query: String::new(),
            json_escape: JsonEscape::Backslash,
            ignore_case: true,
            limit_recursion: 1000,
            cpu: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            wait_timeout: 10.0,
            retry_delay: 10,
        }
    }
}

fn invalid(flag: &str, value: &Value) -> FlatqError {
    FlatqError::InvalidFlagValue {
        flag: format!("@@{flag}"),
        value: value.to_display_string(),
    }
}

impl SessionFlags {
    /// Read a flag by name. Names are case-insensitive and given without
    /// the `@@` prefix.
    pub fn get(&self, name: &str) -> Result<Value, FlatqError> {
        let v = match name.to_uppercase().as_str() {
            "DELIMITER" => Value::String(self.delimiter.to_string()),
            "ENCODING" => Value::String(self.encoding.as_str().to_string()),
            "LINE_BREAK" => Value::String(self.line_break.as_str().to_string()),
            "REPOSITORY" => Value::String(self.repository.display().to_string()),
            "DATETIME_FORMAT" => Value::String(self.datetime_format.join(", ")),
            "ANSI_QUOTES" => Value::Boolean(self.ansi_quotes),
            "NO_HEADER" => Value::Boolean(self.no_header),
            "WITHOUT_NULL" => Value::Boolean(self.without_null),
            "ENCLOSE_ALL" => Value::Boolean(self.enclose_all),
            "EAST_ASIAN_ENCODING" => Value::Boolean(self.east_asian_encoding),
            "COUNT_DIACRITICAL_SIGN" => Value::Boolean(self.count_diacritical_sign),
            "COUNT_FORMAT_CODE" => Value::Boolean(self.count_format_code),
            "JSON_QUERY" => Value::String(self.json_query.clone()),
            "JSON_ESCAPE" => Value::String(self.json_escape.as_str().to_string()),
            "IGNORE_CASE" => Value::Boolean(self.ignore_case),
            "LIMIT_RECURSION" => Value::Integer(self.limit_recursion),
            "CPU" => Value::Integer(self.cpu as i64),
            "WAIT_TIMEOUT" => Value::Float(self.wait_timeout),
            "RETRY_DELAY" => Value::Integer(self.retry_delay as i64),
            _ => return Err(FlatqError::UnknownFlag(format!("@@{name}"))),
        };
        Ok(v)
    }

    /// Assign a flag by name from an evaluated value.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), FlatqError> {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "DELIMITER" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => self.delimiter = c,
                    _ => return Err(invalid(&upper, value)),
                }
            }
            "ENCODING" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.encoding = Encoding::parse(&s).ok_or_else(|| invalid(&upper, value))?;
            }
            "LINE_BREAK" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.line_break = LineBreak::parse(&s).ok_or_else(|| invalid(&upper, value))?;
            }
            "REPOSITORY" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.repository = PathBuf::from(s);
            }
            "JSON_QUERY" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.json_query = s;
            }
            "JSON_ESCAPE" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.json_escape = JsonEscape::parse(&s).ok_or_else(|| invalid(&upper, value))?;
            }
            "ANSI_QUOTES" => self.ansi_quotes = as_bool(value).ok_or_else(|| invalid(&upper, value))?,
            "NO_HEADER" => self.no_header = as_bool(value).ok_or_else(|| invalid(&upper, value))?,
            "WITHOUT_NULL" => {
                self.without_null = as_bool(value).ok_or_else(|| invalid(&upper, value))?
            }
            "ENCLOSE_ALL" => {
                self.enclose_all = as_bool(value).ok_or_else(|| invalid(&upper, value))?
            }
            "EAST_ASIAN_ENCODING" => {
                self.east_asian_encoding = as_bool(value).ok_or_else(|| invalid(&upper, value))?
            }
            "COUNT_DIACRITICAL_SIGN" => {
                self.count_diacritical_sign = as_bool(value).ok_or_else(|| invalid(&upper, value))?
            }
            "COUNT_FORMAT_CODE" => {
                self.count_format_code = as_bool(value).ok_or_else(|| invalid(&upper, value))?
            }
            "IGNORE_CASE" => self.ignore_case = as_bool(value).ok_or_else(|| invalid(&upper, value))?,
            "LIMIT_RECURSION" => {
                self.limit_recursion = as_integer(value).ok_or_else(|| invalid(&upper, value))?
            }
            "CPU" => {
                let n = as_integer(value).ok_or_else(|| invalid(&upper, value))?;
                if n < 1 {
                    return Err(invalid(&upper, value));
                }
                self.cpu = n as usize;
            }
            "WAIT_TIMEOUT" => {
                let f = match value.to_float() {
                    Value::Float(f) if f >= 0.0 => f,
                    _ => return Err(invalid(&upper, value)),
                };
                self.wait_timeout = f;
            }
            "RETRY_DELAY" => {
                let n = as_integer(value).ok_or_else(|| invalid(&upper, value))?;
                if n < 0 {
                    return Err(invalid(&upper, value));
                }
                self.retry_delay = n as u64;
            }
            "DATETIME_FORMAT" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.datetime_format = vec![s];
            }
            _ => return Err(FlatqError::UnknownFlag(format!("@@{name}"))),
        }
        Ok(())
    }

    /// `ADD value TO @@FLAG` for list-valued flags.
    pub fn add_element(&mut self, name: &str, value: &Value) -> Result<(), FlatqError> {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "DATETIME_FORMAT" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                if !self.datetime_format.contains(&s) {
                    self.datetime_format.push(s);
                }
                Ok(())
            }
            "DELIMITER" | "ENCODING" | "LINE_BREAK" | "REPOSITORY" | "JSON_QUERY"
            | "JSON_ESCAPE" | "ANSI_QUOTES" | "NO_HEADER" | "WITHOUT_NULL" | "ENCLOSE_ALL"
            | "EAST_ASIAN_ENCODING" | "COUNT_DIACRITICAL_SIGN" | "COUNT_FORMAT_CODE"
            | "IGNORE_CASE" | "LIMIT_RECURSION" | "CPU" | "WAIT_TIMEOUT" | "RETRY_DELAY" => {
                Err(FlatqError::InvalidValue(format!(
                    "@@{upper} is not a list flag"
                )))
            }
            _ => Err(FlatqError::UnknownFlag(format!("@@{name}"))),
        }
    }

    /// `REMOVE value FROM @@FLAG` for list-valued flags.
    pub fn remove_element(&mut self, name: &str, value: &Value) -> Result<(), FlatqError> {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "DATETIME_FORMAT" => {
                let s = as_string(value).ok_or_else(|| invalid(&upper, value))?;
                self.datetime_format.retain(|f| *f != s);
                Ok(())
            }
            "DELIMITER" | "ENCODING" | "LINE_BREAK" | "REPOSITORY" | "JSON_QUERY"
            | "JSON_ESCAPE" | "ANSI_QUOTES" | "NO_HEADER" | "WITHOUT_NULL" | "ENCLOSE_ALL"
            | "EAST_ASIAN_ENCODING" | "COUNT_DIACRITICAL_SIGN" | "COUNT_FORMAT_CODE"
            | "IGNORE_CASE" | "LIMIT_RECURSION" | "CPU" | "WAIT_TIMEOUT" | "RETRY_DELAY" => {
                Err(FlatqError::InvalidValue(format!(
                    "@@{upper} is not a list flag"
                )))
            }
            _ => Err(FlatqError::UnknownFlag(format!("@@{name}"))),
        }
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v.to_boolean() {
        Value::Boolean(b) => Some(b),
        _ => None,
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    match v.to_integer() {
        Value::Integer(n) => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let mut flags = SessionFlags::default();
        flags
            .set("delimiter", &Value::String("\t".into()))
            .unwrap();
        assert_eq!(flags.delimiter, '\t');
        flags.set("cpu", &Value::Integer(2)).unwrap();
        assert_eq!(flags.get("CPU").unwrap(), Value::Integer(2));
        flags
            .set("encoding", &Value::String("utf16le".into()))
            .unwrap();
        assert_eq!(flags.encoding, Encoding::Utf16Le);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        let mut flags = SessionFlags::default();
        let err = flags.set("nope", &Value::Integer(1)).unwrap_err();
        assert!(matches!(err, FlatqError::UnknownFlag(_)));
        assert!(matches!(
            flags.get("nope").unwrap_err(),
            FlatqError::UnknownFlag(_)
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut flags = SessionFlags::default();
        assert!(flags.set("delimiter", &Value::String(",,".into())).is_err());
        assert!(flags.set("cpu", &Value::Integer(0)).is_err());
        assert!(
            flags
                .set("line_break", &Value::String("VT".into()))
                .is_err()
        );
    }

    #[test]
    fn datetime_format_list_ops() {
        let mut flags = SessionFlags::default();
        flags
            .add_element("datetime_format", &Value::String("%Y/%m/%d".into()))
            .unwrap();
        flags
            .add_element("datetime_format", &Value::String("%d.%m.%Y".into()))
            .unwrap();
        assert_eq!(flags.datetime_format.len(), 2);
        flags
            .remove_element("datetime_format", &Value::String("%Y/%m/%d".into()))
            .unwrap();
        assert_eq!(flags.datetime_format, vec!["%d.%m.%Y".to_string()]);
        assert!(flags.add_element("cpu", &Value::Integer(1)).is_err());
    }
}
