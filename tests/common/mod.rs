#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use flatq::FlatqError;
use flatq::config::SessionFlags;
use flatq::driver::{ResultKind, run_program, take_results};
use flatq::session::Session;
use flatq::value::Value;

/// Write fixture files into a fresh directory and open a session with its
/// repository pointed there.
pub fn setup(files: &[(&str, &str)]) -> (TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let flags = SessionFlags {
        repository: dir.path().to_path_buf(),
        cpu: 2,
        ..SessionFlags::default()
    };
    (dir, Session::new(flags).unwrap())
}

pub fn run(session: &Session, sql: &str) -> Result<i32, FlatqError> {
    run_program(session, sql)
}

/// Header labels and rows of the last SELECT result.
pub fn last_select(session: &Session) -> (Vec<String>, Vec<Vec<Value>>) {
    let result = take_results(session)
        .into_iter()
        .rev()
        .find(|r| r.kind == ResultKind::Select)
        .expect("a select result");
    let view = result.view.expect("select results carry a view");
    let labels = view
        .header
        .fields()
        .iter()
        .map(|f| f.column.clone())
        .collect();
    let rows = view
        .records
        .iter()
        .map(|r| {
            (0..view.header.len())
                .map(|i| r.value(i).clone())
                .collect()
        })
        .collect();
    (labels, rows)
}

pub fn file_content(dir: &TempDir, name: &str) -> String {
    std::fs::read_to_string(dir.path().join(name)).unwrap()
}

pub fn path_of(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

pub fn i(n: i64) -> Value {
    Value::Integer(n)
}

pub fn f(x: f64) -> Value {
    Value::Float(x)
}
