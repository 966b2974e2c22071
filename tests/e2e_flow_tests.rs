//! End-to-end procedural flow: cursors over files, SOURCE, and exit codes.

mod common;

use common::*;
use flatq::driver::{ResultKind, take_results};

#[test]
fn cursor_walks_a_file() {
    let (_dir, session) = setup(&[("t.csv", "n\n5\n6\n7\n")]);
    run(
        &session,
        "DECLARE cur CURSOR FOR SELECT n FROM t ORDER BY n DESC; \
         OPEN cur; \
         DECLARE @n, @first; \
         FETCH cur INTO @first; \
         DECLARE @sum := 0; \
         WHILE @n IN cur DO SET @sum = @sum + @n; END WHILE; \
         SELECT @first, @sum;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    // FETCH consumed 7; the loop summed the remaining 6 and 5.
    assert_eq!(rows, vec![vec![s("7"), i(11)]]);
}

#[test]
fn source_executes_a_script_file() {
    let (dir, session) = setup(&[("t.csv", "a\n1\n")]);
    let script = dir.path().join("patch.sql");
    std::fs::write(&script, "UPDATE t SET a = 9 WHERE a = 1;\n").unwrap();
    run(
        &session,
        &format!("SOURCE '{}'; SELECT a FROM t;", script.display()),
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![i(9)]]);
    assert_eq!(file_content(&dir, "t.csv"), "a\n9\n");
}

#[test]
fn exit_inside_loop_commits_and_stops() {
    let (dir, session) = setup(&[("t.csv", "a\n1\n")]);
    let code = run(
        &session,
        "DECLARE @i := 0; \
         WHILE @i < 10 DO \
           SET @i = @i + 1; \
           IF @i = 2 THEN \
             UPDATE t SET a = @i; \
             EXIT 7; \
           END IF; \
         END WHILE; \
         PRINT 'unreachable';",
    )
    .unwrap();
    assert_eq!(code, 7);
    assert_eq!(file_content(&dir, "t.csv"), "a\n2\n");
    // The trailing PRINT never ran.
    assert!(
        take_results(&session)
            .iter()
            .all(|r| r.kind != ResultKind::Print)
    );
}

#[test]
fn print_results_accumulate_in_order() {
    let (_dir, session) = setup(&[]);
    run(
        &session,
        "PRINT 'one'; SELECT 2; PRINT 'three';",
    )
    .unwrap();
    let logs: Vec<(ResultKind, String)> = take_results(&session)
        .into_iter()
        .map(|r| (r.kind, r.log))
        .collect();
    assert_eq!(logs[0], (ResultKind::Print, "one".to_string()));
    assert_eq!(logs[1].0, ResultKind::Select);
    assert_eq!(logs[2], (ResultKind::Print, "three".to_string()));
}

#[test]
fn error_keeps_accumulated_results_but_commits_nothing() {
    let (dir, session) = setup(&[("t.csv", "a\n1\n")]);
    run(
        &session,
        "UPDATE t SET a = 2; SELECT a FROM missing;",
    )
    .unwrap_err();
    assert_eq!(file_content(&dir, "t.csv"), "a\n1\n");
    // The update's result line survived the implicit rollback.
    let results = take_results(&session);
    assert_eq!(results.last().unwrap().kind, ResultKind::Update);
    assert_eq!(results.last().unwrap().count, 1);
}

#[test]
fn stdin_used_when_from_is_absent() {
    let (_dir, session) = setup(&[]);
    session.set_stdin("a,b\n10,20\n".to_string());
    run(&session, "SELECT b, a;").unwrap();
    let (labels, rows) = last_select(&session);
    assert_eq!(labels, vec!["b", "a"]);
    assert_eq!(rows, vec![vec![s("20"), s("10")]]);
}

#[test]
fn flags_are_readable_and_settable_in_programs() {
    let (_dir, session) = setup(&[]);
    run(
        &session,
        "SET @@LIMIT_RECURSION = 5; SELECT @@LIMIT_RECURSION;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![i(5)]]);

    let err = run(&session, "SELECT @@NO_SUCH_FLAG;").unwrap_err();
    assert!(matches!(err, flatq::FlatqError::UnknownFlag(_)));
}

#[test]
fn recursion_limit_trips() {
    let (_dir, session) = setup(&[]);
    let err = run(
        &session,
        "SET @@LIMIT_RECURSION = 10; \
         WITH RECURSIVE r (n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r) \
         SELECT COUNT(*) FROM r;",
    )
    .unwrap_err();
    assert!(matches!(err, flatq::FlatqError::RecursionExceeded(10)));
}
