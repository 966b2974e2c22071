//! End-to-end SELECT behavior over real files.

mod common;

use common::*;
use flatq::value::{Ternary, Value};

#[test]
fn basic_projection_reorders_columns() {
    let (_dir, session) = setup(&[("t.csv", "a,b\n1,2\n3,4\n")]);
    run(&session, "SELECT b, a FROM t;").unwrap();
    let (labels, rows) = last_select(&session);
    assert_eq!(labels, vec!["b", "a"]);
    assert_eq!(rows, vec![vec![s("2"), s("1")], vec![s("4"), s("3")]]);
}

#[test]
fn group_by_with_nulls() {
    let (_dir, session) = setup(&[("v.csv", "x,y\n1,\n1,5\n2,\n")]);
    run(&session, "SELECT x, COUNT(y), SUM(y) FROM v GROUP BY x;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(
        rows,
        vec![
            vec![s("1"), i(1), f(5.0)],
            vec![s("2"), i(0), Value::Null],
        ]
    );
}

#[test]
fn not_in_with_null_renders_empty() {
    let (_dir, session) = setup(&[]);
    run(&session, "SELECT 3 NOT IN (1, NULL, 2);").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![Value::Ternary(Ternary::Unknown)]]);
    assert_eq!(rows[0][0].to_field(), None);
}

#[test]
fn recursive_cte_with_scalar_subquery() {
    let (_dir, session) = setup(&[]);
    run(
        &session,
        "WITH r (n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < (SELECT 3)) \
         SELECT n FROM r;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![i(1)], vec![i(2)], vec![i(3)]]);
}

#[test]
fn distinct_is_stable() {
    let (_dir, session) = setup(&[("d.csv", "c\nB\nA\nB\nA\n")]);
    run(&session, "SELECT DISTINCT c FROM d;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("B")], vec![s("A")]]);
}

#[test]
fn where_keeps_true_only_and_composes() {
    let fixture: &[(&str, &str)] = &[("t.csv", "a\n1\n2\n3\n\n4\n")];
    let (_dir, session) = setup(fixture);
    run(&session, "SELECT a FROM t WHERE a > 1 AND a < 4;").unwrap();
    let (_, conjoined) = last_select(&session);

    let (_dir2, session2) = setup(fixture);
    run(
        &session2,
        "SELECT a FROM (SELECT a FROM t WHERE a > 1) sub WHERE a < 4;",
    )
    .unwrap();
    let (_, sequential) = last_select(&session2);
    assert_eq!(conjoined, sequential);
    assert_eq!(conjoined, vec![vec![s("2")], vec![s("3")]]);
}

#[test]
fn count_partition_invariant() {
    // COUNT(p) + COUNT(NOT p) + COUNT(p IS UNKNOWN) = COUNT(*).
    let (_dir, session) = setup(&[("t.csv", "x,a\n1,1\n2,2\n3,\n4,3\n5,\n")]);
    run(
        &session,
        "SELECT COUNT(*), \
                COUNT(IF(a > 1, 1, NULL)), \
                COUNT(IF(NOT a > 1, 1, NULL)), \
                COUNT(IF(a > 1 IS UNKNOWN, 1, NULL)) \
         FROM t;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    let total = rows[0][0].clone();
    let sum = match (&rows[0][1], &rows[0][2], &rows[0][3]) {
        (Value::Integer(a), Value::Integer(b), Value::Integer(c)) => a + b + c,
        _ => panic!("counts must be integers"),
    };
    assert_eq!(total, i(sum));
    assert_eq!(rows[0], vec![i(5), i(2), i(1), i(2)]);
}

#[test]
fn joins_inner_outer_natural() {
    let files: &[(&str, &str)] = &[
        ("emp.csv", "id,dept,name\n1,10,ann\n2,20,bo\n3,30,cy\n"),
        ("dept.csv", "dept,label\n10,eng\n20,ops\n"),
    ];
    let (_dir, session) = setup(files);

    run(
        &session,
        "SELECT e.name, d.label FROM emp e JOIN dept d ON e.dept = d.dept ORDER BY e.id;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("ann"), s("eng")], vec![s("bo"), s("ops")]]);

    run(
        &session,
        "SELECT e.name, d.label FROM emp e LEFT JOIN dept d ON e.dept = d.dept ORDER BY e.id;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], vec![s("cy"), Value::Null]);

    run(
        &session,
        "SELECT dept, label, name FROM emp NATURAL JOIN dept ORDER BY dept;",
    )
    .unwrap();
    let (labels, rows) = last_select(&session);
    assert_eq!(labels, vec!["dept", "label", "name"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec![s("10"), s("eng"), s("ann")]);
}

#[test]
fn union_all_concatenates_union_dedups() {
    let files: &[(&str, &str)] = &[
        ("l.csv", "a\n1\n2\n2\n"),
        ("r.csv", "a\n2\n3\n"),
    ];
    let (_dir, session) = setup(files);

    run(&session, "SELECT a FROM l UNION ALL SELECT a FROM r;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows.len(), 5);

    run(&session, "SELECT a FROM l UNION SELECT a FROM r;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("1")], vec![s("2")], vec![s("3")]]);

    run(&session, "SELECT a FROM l EXCEPT SELECT a FROM r;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("1")]]);

    run(&session, "SELECT a FROM l INTERSECT SELECT a FROM r;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("2")]]);
}

#[test]
fn order_by_null_position_and_ties() {
    let (_dir, session) = setup(&[("t.csv", "a,b\n2,x\n,y\n1,z\n2,w\n")]);
    run(&session, "SELECT a, b FROM t ORDER BY a;").unwrap();
    let (_, rows) = last_select(&session);
    // ASC defaults to NULLS FIRST; ties keep input order.
    assert_eq!(rows[0][0], Value::Null);
    assert_eq!(rows[1][0], s("1"));
    assert_eq!(rows[2][1], s("x"));
    assert_eq!(rows[3][1], s("w"));

    run(&session, "SELECT a, b FROM t ORDER BY a DESC;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows[3][0], Value::Null);

    run(&session, "SELECT a, b FROM t ORDER BY a LIMIT 1 WITH TIES;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows.len(), 1);

    run(&session, "SELECT a, b FROM t ORDER BY a OFFSET 2 LIMIT 1 WITH TIES;").unwrap();
    let (_, rows) = last_select(&session);
    // The a=2 pair is tied, so the cut extends.
    assert_eq!(rows.len(), 2);
}

#[test]
fn percent_limit_and_fetch() {
    let (_dir, session) = setup(&[("t.csv", "a\n1\n2\n3\n4\n")]);
    run(&session, "SELECT a FROM t ORDER BY a LIMIT 50 PERCENT;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows.len(), 2);

    run(
        &session,
        "SELECT a FROM t ORDER BY a OFFSET 1 ROW FETCH FIRST 2 ROWS ONLY;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("2")], vec![s("3")]]);
}

#[test]
fn correlated_subquery_and_exists() {
    let files: &[(&str, &str)] = &[
        ("o.csv", "id,cust\n1,a\n2,b\n3,a\n"),
        ("c.csv", "cust\na\nc\n"),
    ];
    let (_dir, session) = setup(files);
    run(
        &session,
        "SELECT cust FROM c WHERE EXISTS (SELECT 1 FROM o WHERE o.cust = c.cust);",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("a")]]);

    run(
        &session,
        "SELECT cust, (SELECT COUNT(*) FROM o WHERE o.cust = c.cust) n FROM c;",
    )
    .unwrap();
    let (labels, rows) = last_select(&session);
    assert_eq!(labels[1], "n");
    assert_eq!(rows, vec![vec![s("a"), i(2)], vec![s("c"), i(0)]]);
}

#[test]
fn analytic_rank_over_partitions() {
    let (_dir, session) = setup(&[(
        "t.csv",
        "g,v\na,1\na,3\nb,2\na,2\nb,1\n",
    )]);
    run(
        &session,
        "SELECT g, v, RANK() OVER (PARTITION BY g ORDER BY v DESC) r FROM t ORDER BY g, v;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(
        rows,
        vec![
            vec![s("a"), s("1"), i(3)],
            vec![s("a"), s("2"), i(2)],
            vec![s("a"), s("3"), i(1)],
            vec![s("b"), s("1"), i(2)],
            vec![s("b"), s("2"), i(1)],
        ]
    );
}

#[test]
fn running_total_with_frame() {
    let (_dir, session) = setup(&[("t.csv", "v\n1\n2\n3\n4\n")]);
    run(
        &session,
        "SELECT v, SUM(v) OVER (ORDER BY v ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) m \
         FROM t ORDER BY v;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows[0][1], f(1.0));
    assert_eq!(rows[1][1], f(3.0));
    assert_eq!(rows[3][1], f(7.0));
}

#[test]
fn having_filters_groups() {
    let (_dir, session) = setup(&[("t.csv", "g,v\na,1\na,2\nb,9\n")]);
    run(
        &session,
        "SELECT g, COUNT(*) c FROM t GROUP BY g HAVING COUNT(*) > 1;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("a"), i(2)]]);
}

#[test]
fn case_insensitive_matching_honors_flag() {
    let fixture: &[(&str, &str)] = &[("t.csv", "c\nAbc\nxyz\n")];
    let (_dir, session) = setup(fixture);
    run(&session, "SELECT c FROM t WHERE c = 'abc';").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows.len(), 1);

    let (_dir2, session2) = setup(fixture);
    run(
        &session2,
        "SET @@IGNORE_CASE = FALSE; SELECT c FROM t WHERE c = 'abc';",
    )
    .unwrap();
    let (_, rows) = last_select(&session2);
    assert_eq!(rows.len(), 0);
}

#[test]
fn like_and_between_and_case() {
    let (_dir, session) = setup(&[("t.csv", "name,n\nalpha,1\nbeta,5\ngamma,9\n")]);
    run(
        &session,
        "SELECT name, \
                CASE WHEN n BETWEEN 2 AND 6 THEN 'mid' ELSE 'edge' END kind \
         FROM t WHERE name LIKE '%a' ORDER BY n;",
    )
    .unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(
        rows,
        vec![
            vec![s("alpha"), s("edge")],
            vec![s("beta"), s("mid")],
            vec![s("gamma"), s("edge")],
        ]
    );
}

#[test]
fn missing_table_and_unknown_column_errors() {
    let (_dir, session) = setup(&[("t.csv", "a\n1\n")]);
    assert!(matches!(
        run(&session, "SELECT a FROM nope;"),
        Err(flatq::FlatqError::FileNotFound(_))
    ));
    let (_dir2, session2) = setup(&[("t.csv", "a\n1\n")]);
    assert!(matches!(
        run(&session2, "SELECT missing FROM t;"),
        Err(flatq::FlatqError::FieldNotExist(_))
    ));
}

#[test]
fn select_from_stdin() {
    let (_dir, session) = setup(&[]);
    session.set_stdin("a,b\n1,2\n".to_string());
    run(&session, "SELECT b FROM STDIN;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("2")]]);
}

#[test]
fn table_object_forces_format() {
    let (_dir, session) = setup(&[("data.txt", "a;b\n1;2\n")]);
    run(&session, "SELECT b FROM CSV(';', `data.txt`);").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![s("2")]]);
}

#[test]
fn json_source_with_query() {
    let (_dir, session) = setup(&[(
        "doc.json",
        r#"{"wrap": [{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]}"#,
    )]);
    run(&session, "SELECT a, b FROM JSON('wrap', `doc.json`) ORDER BY a DESC;").unwrap();
    let (_, rows) = last_select(&session);
    assert_eq!(rows, vec![vec![i(2), s("y")], vec![i(1), s("x")]]);
}
