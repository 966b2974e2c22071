//! File format codecs.
//!
//! Each format implements [`FileCodec`]: decode text into columns and typed
//! rows, and encode a finished view back to text. The engine treats codecs
//! as black boxes; everything format-specific (quoting, positions, labels,
//! path queries) lives behind this interface.

pub mod csv;
pub mod fixed;
pub mod json;
pub mod ltsv;
pub mod text;

use std::path::Path;

use crate::error::FlatqError;
use crate::file::FileInfo;
use crate::value::Value;

/// Source format, autodetected from the file extension and overridable per
/// table expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Fixed,
    Ltsv,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Format {
        match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("tsv") => Format::Tsv,
            Some("json") => Format::Json,
            Some("ltsv") => Format::Ltsv,
            _ => Format::Csv,
        }
    }

    pub fn parse(s: &str) -> Option<Format> {
        match s.to_uppercase().as_str() {
            "CSV" => Some(Format::Csv),
            "TSV" => Some(Format::Tsv),
            "FIXED" => Some(Format::Fixed),
            "LTSV" => Some(Format::Ltsv),
            "JSON" => Some(Format::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Csv => "CSV",
            Format::Tsv => "TSV",
            Format::Fixed => "FIXED",
            Format::Ltsv => "LTSV",
            Format::Json => "JSON",
        }
    }
}

/// Decoded table: column names plus typed rows of uniform width.
#[derive(Debug, Clone)]
pub struct DecodedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// What an encoder consumes: result labels and scalar rows.
#[derive(Debug, Clone)]
pub struct EncodeSource {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Decoder/encoder pair for one format.
pub trait FileCodec: Sync {
    /// Decode text (line breaks already normalized to LF) into a table.
    fn decode(&self, text: &str, info: &FileInfo) -> Result<DecodedTable, FlatqError>;

    /// Encode a result back to text using the descriptor's line break and
    /// quoting attributes.
    fn encode(&self, source: &EncodeSource, info: &FileInfo) -> Result<String, FlatqError>;
}

/// Codec for the given format.
pub fn codec(format: Format) -> &'static dyn FileCodec {
    match format {
        Format::Csv | Format::Tsv => &csv::CsvCodec,
        Format::Fixed => &fixed::FixedCodec,
        Format::Ltsv => &ltsv::LtsvCodec,
        Format::Json => &json::JsonCodec,
    }
}

pub(crate) fn decode_error(info: &FileInfo, detail: impl std::fmt::Display) -> FlatqError {
    FlatqError::DataDecode {
        path: info.path.display().to_string(),
        detail: detail.to_string(),
    }
}
