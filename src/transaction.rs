//! Transactional commit and rollback.
//!
//! During a transaction, DML and DDL only mutate cached views; the cache
//! plus each view's load-time snapshot is the transaction log. COMMIT walks
//! the cache in insertion order, re-encodes every non-temporary view whose
//! header or records differ from its snapshot, and writes each file
//! atomically (temp file, then rename). A failing file aborts the commit
//! naming that file; files already flushed stay flushed. ROLLBACK drops the
//! cache and the temporary views.

use crate::error::FlatqError;
use crate::format::text::encode_bytes;
use crate::format::{EncodeSource, codec};
use crate::file::write_atomic;
use crate::session::Session;
use crate::value::Value;

/// Flush modified views and end the transaction. Returns one log line per
/// written file.
pub fn commit(session: &Session) -> Result<Vec<String>, FlatqError> {
    let mut logs = Vec::new();
    for (_key, view) in session.cache.snapshot() {
        let Some(info) = &view.file_info else {
            continue;
        };
        if info.is_temporary {
            continue;
        }
        if !info.new_file && !info.is_modified(&view.header, &view.records) {
            continue;
        }
        let source = EncodeSource {
            labels: view
                .header
                .fields()
                .iter()
                .map(|f| f.column.clone())
                .collect(),
            rows: view
                .records
                .iter()
                .map(|r| {
                    (0..view.header.len())
                        .map(|i| r.value(i).clone())
                        .collect::<Vec<Value>>()
                })
                .collect(),
        };
        let text = codec(info.format)
            .encode(&source, info)
            .map_err(|e| FlatqError::CommitFailed {
                path: info.path.display().to_string(),
                detail: e.to_string(),
            })?;
        let bytes = encode_bytes(&text, info.encoding);
        write_atomic(&info.path, &bytes).map_err(|e| FlatqError::CommitFailed {
            path: info.path.display().to_string(),
            detail: e.to_string(),
        })?;
        let line = if info.new_file {
            format!("Commit: file {} is created", info.path.display())
        } else {
            format!("Commit: file {} is updated", info.path.display())
        };
        log::info!("{line}");
        logs.push(line);
    }
    // End of transaction: handlers drop with their entries, releasing the
    // file locks; temp scopes unwind.
    session.cache.clear();
    session
        .temp_views
        .lock()
        .expect("temp views lock")
        .clear();
    Ok(logs)
}

/// Discard every uncommitted change. The accumulated result set is left
/// alone: the implicit rollback after an error keeps it for inspection,
/// and the explicit ROLLBACK statement clears it itself.
pub fn rollback(session: &Session) {
    log::debug!("rolling back {} cached views", session.cache.keys().len());
    session.cache.clear();
    session
        .temp_views
        .lock()
        .expect("temp views lock")
        .clear();
}
