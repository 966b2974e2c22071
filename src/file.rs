//! Source files: descriptors, path resolution, and locking.
//!
//! A [`FileInfo`] describes where a view came from and how to re-encode it:
//! format, delimiter or positions, encoding, line-break, and the load-time
//! snapshot used to detect actual modification on commit.
//!
//! Locking is advisory via lock files beside the data file. An exclusive
//! lock is held from load-for-update until commit or rollback; shared access
//! only checks that no exclusive lock exists at read time. Lock acquisition
//! order is always cache first, then per-file handler, and the handler is
//! acquired before the cache entry is inserted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{Encoding, JsonEscape, LineBreak, SessionFlags};
use crate::error::{FlatqError, io_error};
use crate::format::Format;
use crate::parallel::CancellationToken;
use crate::record::{Header, Record};

/// Field layout of a fixed-width source.
#[derive(Debug, Clone, PartialEq)]
pub enum FixedSpec {
    /// Explicit byte cut points, ascending.
    Positions(Vec<usize>),
    /// Cut points applied cyclically over one long line.
    SingleLine(Vec<usize>),
    /// Detect cut points from runs of spaces in the header line.
    Spaces,
}

/// Load-time image of a view, used to decide whether commit must rewrite
/// the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub header: Header,
    pub records: Vec<Record>,
}

/// Descriptor of a view's backing source.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub format: Format,
    pub delimiter: char,
    pub fixed: Option<FixedSpec>,
    pub encoding: Encoding,
    pub line_break: LineBreak,
    pub no_header: bool,
    pub without_null: bool,
    pub enclose_all: bool,
    pub json_query: String,
    pub json_escape: JsonEscape,
    /// Temporary views (stdin, declared tables, subquery results) are never
    /// written back.
    pub is_temporary: bool,
    /// The file does not exist yet; commit creates it.
    pub new_file: bool,
    pub snapshot: Option<Snapshot>,
}

impl FileInfo {
    pub fn new(path: PathBuf, format: Format, flags: &SessionFlags) -> FileInfo {
        FileInfo {
            path,
            delimiter: match format {
                Format::Tsv => '\t',
                _ => flags.delimiter,
            },
            format,
            fixed: None,
            encoding: flags.encoding,
            line_break: flags.line_break,
            no_header: flags.no_header,
            without_null: flags.without_null,
            enclose_all: flags.enclose_all,
            json_query: flags.json_query.clone(),
            json_escape: flags.json_escape,
            is_temporary: false,
            new_file: false,
            snapshot: None,
        }
    }

    /// Descriptor for an in-memory temporary view.
    pub fn temporary(name: &str) -> FileInfo {
        FileInfo {
            path: PathBuf::from(name),
            format: Format::Csv,
            delimiter: ',',
            fixed: None,
            encoding: Encoding::Utf8,
            line_break: LineBreak::Lf,
            no_header: false,
            without_null: false,
            enclose_all: false,
            json_query: String::new(),
            json_escape: JsonEscape::Backslash,
            is_temporary: true,
            new_file: false,
            snapshot: None,
        }
    }

    /// Cache key: uppercased absolute path.
    pub fn key(&self) -> String {
        path_key(&self.path)
    }

    /// Whether `header` + `records` differ from the load-time snapshot.
    pub fn is_modified(&self, header: &Header, records: &[Record]) -> bool {
        match &self.snapshot {
            Some(snap) => snap.header != *header || snap.records != records,
            None => true,
        }
    }
}

/// Uppercased textual form of a path, used as the case-insensitive cache
/// key.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_uppercase()
}

/// Extensions tried when a table name has none.
const DEFAULT_EXTENSIONS: &[&str] = &[".csv", ".tsv", ".json", ".ltsv"];

/// Locate the entry in `dir` whose name matches `name` case-insensitively.
fn find_in_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                return Some(entry.path());
            }
        }
    }
    None
}

fn locate(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return candidate.canonicalize().ok();
    }
    let dir = candidate.parent()?;
    let name = candidate.file_name()?.to_string_lossy().to_string();
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let found = find_in_dir(dir, &name)?;
    found.canonicalize().ok()
}

/// Resolve a table name to an existing file. Relative names resolve against
/// the repository flag; names without an extension try the default
/// extensions in order. Matching is case-insensitive.
pub fn resolve_table_path(name: &str, flags: &SessionFlags) -> Result<PathBuf, FlatqError> {
    let raw = Path::new(name);
    let base = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        flags.repository.join(raw)
    };
    if base.extension().is_some() {
        if let Some(found) = locate(&base) {
            return Ok(found);
        }
    } else {
        for ext in DEFAULT_EXTENSIONS {
            let mut s = base.as_os_str().to_os_string();
            s.push(ext);
            if let Some(found) = locate(Path::new(&s)) {
                return Ok(found);
            }
        }
        if let Some(found) = locate(&base) {
            return Ok(found);
        }
    }
    Err(FlatqError::FileNotFound(name.to_string()))
}

/// Resolve the path for a table being created. The file must not already
/// exist; a missing extension defaults to `.csv`.
pub fn resolve_new_table_path(name: &str, flags: &SessionFlags) -> Result<PathBuf, FlatqError> {
    let raw = Path::new(name);
    let mut base = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        flags.repository.join(raw)
    };
    if base.extension().is_none() {
        let mut s = base.into_os_string();
        s.push(".csv");
        base = PathBuf::from(s);
    }
    if locate(&base).is_some() {
        return Err(FlatqError::IoError {
            path: base.display().to_string(),
            detail: "file already exists".to_string(),
        });
    }
    // Canonicalize through the parent; the file itself does not exist yet.
    let parent = base.parent().unwrap_or(Path::new("."));
    let parent = if parent.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        parent.to_path_buf()
    };
    let parent = parent.canonicalize().map_err(|e| io_error(&base, e))?;
    let file_name = base
        .file_name()
        .ok_or_else(|| FlatqError::FileNotFound(name.to_string()))?;
    Ok(parent.join(file_name))
}

fn lock_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

/// Advisory handle on a source file. An exclusive handler owns a lock file
/// that is removed on drop; shared access holds nothing once the read
/// completed.
#[derive(Debug)]
pub struct FileHandler {
    pub path: PathBuf,
    lock_path: Option<PathBuf>,
}

impl FileHandler {
    /// Acquire the exclusive lock, retrying every `retry_delay` until
    /// `wait_timeout` elapses.
    pub fn acquire_exclusive(
        path: &Path,
        flags: &SessionFlags,
        token: &CancellationToken,
    ) -> Result<FileHandler, FlatqError> {
        let lock_path = lock_path_for(path);
        let deadline = Instant::now() + Duration::from_secs_f64(flags.wait_timeout.max(0.0));
        loop {
            token.check()?;
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => {
                    return Ok(FileHandler {
                        path: path.to_path_buf(),
                        lock_path: Some(lock_path),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(FlatqError::FileLockTimeout(path.display().to_string()));
                    }
                    std::thread::sleep(Duration::from_millis(flags.retry_delay.max(1)));
                }
                Err(e) => return Err(io_error(&lock_path, e)),
            }
        }
    }

    /// Shared access: verify no exclusive lock exists. Nothing is held
    /// afterwards; readers release as soon as the bytes are in memory.
    pub fn check_shared(path: &Path) -> Result<FileHandler, FlatqError> {
        let lock_path = lock_path_for(path);
        if lock_path.exists() {
            return Err(FlatqError::FileLockTimeout(path.display().to_string()));
        }
        Ok(FileHandler {
            path: path.to_path_buf(),
            lock_path: None,
        })
    }
}

impl Drop for FileHandler {
    fn drop(&mut self) {
        if let Some(lock) = &self.lock_path {
            let _ = fs::remove_file(lock);
        }
    }
}

/// Write `bytes` to `path` atomically: write a temp file in the same
/// directory, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FlatqError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, e))?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(io_error(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags_in(dir: &Path) -> SessionFlags {
        SessionFlags {
            repository: dir.to_path_buf(),
            ..SessionFlags::default()
        }
    }

    #[test]
    fn resolves_names_with_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "a\n1\n").unwrap();
        let flags = flags_in(dir.path());
        let p = resolve_table_path("t", &flags).unwrap();
        assert!(p.ends_with("t.csv"));
        let p = resolve_table_path("T.CSV", &flags).unwrap();
        assert!(p.file_name().unwrap().to_string_lossy().eq_ignore_ascii_case("t.csv"));
        assert!(matches!(
            resolve_table_path("missing", &flags),
            Err(FlatqError::FileNotFound(_))
        ));
    }

    #[test]
    fn new_table_path_rejects_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "a\n").unwrap();
        let flags = flags_in(dir.path());
        assert!(resolve_new_table_path("t", &flags).is_err());
        let p = resolve_new_table_path("u", &flags).unwrap();
        assert!(p.ends_with("u.csv"));
    }

    #[test]
    fn exclusive_lock_blocks_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t.csv");
        fs::write(&file, "a\n1\n").unwrap();
        let mut flags = flags_in(dir.path());
        flags.wait_timeout = 0.05;
        flags.retry_delay = 5;
        let token = CancellationToken::new();

        let h1 = FileHandler::acquire_exclusive(&file, &flags, &token).unwrap();
        assert!(matches!(
            FileHandler::acquire_exclusive(&file, &flags, &token),
            Err(FlatqError::FileLockTimeout(_))
        ));
        assert!(FileHandler::check_shared(&file).is_err());
        drop(h1);
        assert!(FileHandler::check_shared(&file).is_ok());
        FileHandler::acquire_exclusive(&file, &flags, &token).unwrap();
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t.csv");
        fs::write(&file, "old").unwrap();
        write_atomic(&file, b"new").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
