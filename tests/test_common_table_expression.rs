mod common;

use arcsql::query::{col, count, lit, CommonTableExpression};
use arcsql::{Dialect, Error, Query, QueryCompiler, Value, ValueBinder};

use common::{count_rows, sqlite_articles};

fn compile(dialect: Dialect, query: &Query) -> arcsql::Result<String> {
    QueryCompiler::new(dialect, false).compile(query, &mut ValueBinder::new())
}

/// `WITH RECURSIVE counter(n)` counting from 1 to `upto`
fn counter(upto: i64) -> CommonTableExpression {
    let seed = Query::select(Vec::<&str>::new()).select_expr(lit("1"), None);
    let step = Query::select(Vec::<&str>::new())
        .select_expr(lit("n + 1"), None)
        .from("counter")
        .where_(col("n").lt(upto));
    CommonTableExpression::new("counter", seed.union_all(step))
        .fields(["n"])
        .recursive()
}

fn published_articles() -> Query {
    Query::select(["id", "author_id"])
        .from("articles")
        .where_(col("published").eq(1))
}

#[test]
fn test_simple_cte() {
    let query = Query::select(["author_id"])
        .select_expr(count("*"), Some("total"))
        .from("published")
        .group_by(["author_id"])
        .cte("published", published_articles())
        .unwrap();

    assert_eq!(
        compile(Dialect::Postgres, &query).unwrap(),
        "WITH published AS (SELECT id, author_id FROM articles WHERE published = :c0) \
         SELECT author_id, COUNT(*) AS total FROM published GROUP BY author_id"
    );
}

#[test]
fn test_several_ctes_keep_order() {
    let query = Query::select(["*"])
        .from("b")
        .cte("a", Query::select(["id"]).from("articles"))
        .unwrap()
        .cte("b", Query::select(["id"]).from("a"))
        .unwrap();

    assert_eq!(
        compile(Dialect::Sqlite, &query).unwrap(),
        "WITH a AS (SELECT id FROM articles), b AS (SELECT id FROM a) SELECT * FROM b"
    );
    let names: Vec<&str> = query.ctes().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_recursive_keyword_per_dialect() {
    let query = Query::select(["n"]).from("counter").with(counter(3), false).unwrap();

    let body = "counter(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM counter WHERE n < :c0) \
                SELECT n FROM counter";
    for dialect in [Dialect::Sqlite, Dialect::Mysql, Dialect::MariaDb, Dialect::Postgres] {
        assert_eq!(
            compile(dialect, &query).unwrap(),
            format!("WITH RECURSIVE {}", body),
            "{}",
            dialect
        );
    }
    assert_eq!(
        compile(Dialect::SqlServer, &query).unwrap(),
        format!("WITH {}", body)
    );
}

#[test]
fn test_duplicate_name_is_rejected() {
    let query = Query::select(["*"])
        .from("a")
        .cte("a", Query::select(["id"]).from("articles"))
        .unwrap();

    let err = query
        .clone()
        .cte("a", Query::select(["id"]).from("comments"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("`a`")));

    // Overwriting replaces the whole WITH clause
    let replaced = query
        .with(
            CommonTableExpression::new("a", Query::select(["id"]).from("comments")),
            true,
        )
        .unwrap();
    assert_eq!(
        compile(Dialect::Sqlite, &replaced).unwrap(),
        "WITH a AS (SELECT id FROM comments) SELECT * FROM a"
    );

    let cleared = replaced.with(None::<CommonTableExpression>, true).unwrap();
    assert_eq!(compile(Dialect::Sqlite, &cleared).unwrap(), "SELECT * FROM a");
    assert!(cleared.with(None::<CommonTableExpression>, false).is_err());
}

#[test]
fn test_cte_without_query_fails_to_compile() {
    let query = Query::select(["*"])
        .from("pending")
        .with(CommonTableExpression::named("pending"), false)
        .unwrap();
    assert!(matches!(
        compile(Dialect::Postgres, &query),
        Err(Error::InvalidArgument(ref m)) if m.contains("pending")
    ));
}

#[test]
fn test_cte_in_update_and_delete() {
    let update = Query::update("articles")
        .set("published", 0)
        .where_(col("id").in_query(Query::select(["id"]).from("stale")))
        .cte("stale", Query::select(["id"]).from("articles").where_(col("author_id").eq(9)))
        .unwrap();
    assert_eq!(
        compile(Dialect::Mysql, &update).unwrap(),
        "WITH stale AS (SELECT id FROM articles WHERE author_id = :c0) \
         UPDATE articles SET published = :c1 WHERE id IN (SELECT id FROM stale)"
    );

    let delete = Query::delete("articles")
        .where_(col("id").in_query(Query::select(["id"]).from("stale")))
        .cte("stale", Query::select(["id"]).from("articles"))
        .unwrap();
    assert_eq!(
        compile(Dialect::SqlServer, &delete).unwrap(),
        "WITH stale AS (SELECT id FROM articles) \
         DELETE FROM articles WHERE id IN (SELECT id FROM stale)"
    );

    for query in [&update, &delete] {
        match compile(Dialect::MariaDb, query) {
            Err(Error::Unsupported { dialect, .. }) => assert_eq!(dialect, "mariadb"),
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }
}

#[test]
fn test_cte_placement_in_insert() {
    let insert = Query::insert_into("archive", ["id", "author_id"])
        .values_query(Query::select(["id", "author_id"]).from("published"))
        .cte("published", published_articles())
        .unwrap();

    assert_eq!(
        compile(Dialect::Mysql, &insert).unwrap(),
        "INSERT INTO archive (id, author_id) \
         WITH published AS (SELECT id, author_id FROM articles WHERE published = :c0) \
         SELECT id, author_id FROM published"
    );
    assert_eq!(
        compile(Dialect::Postgres, &insert).unwrap(),
        "WITH published AS (SELECT id, author_id FROM articles WHERE published = :c0) \
         INSERT INTO archive (id, author_id) SELECT id, author_id FROM published RETURNING *"
    );

    let values = Query::insert_into("archive", ["id"])
        .values([Value::Int(1)])
        .unwrap()
        .cte("published", published_articles())
        .unwrap();
    assert!(matches!(
        compile(Dialect::MariaDb, &values),
        Err(Error::Unsupported { .. })
    ));
    assert!(compile(Dialect::Sqlite, &values).is_ok());
}

#[test]
fn test_recursive_cte_runs_on_sqlite() {
    let mut conn = sqlite_articles();
    let query = Query::select(["n"])
        .from("counter")
        .order_asc("n")
        .with(counter(5), false)
        .unwrap();

    let numbers: Vec<i64> = conn
        .run(&query)
        .unwrap()
        .fetch_all()
        .into_iter()
        .filter_map(|row| row[0].as_i64())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_cte_delete_runs_on_sqlite() {
    let mut conn = sqlite_articles();
    for (author, published) in [(1, 1), (1, 0), (2, 0)] {
        conn.insert(
            "articles",
            [
                ("author_id", Value::from(author)),
                ("title", Value::from("draft")),
                ("published", Value::from(published)),
            ],
        )
        .unwrap();
    }

    let delete = Query::delete("articles")
        .where_(col("id").in_query(Query::select(["id"]).from("drafts")))
        .cte(
            "drafts",
            Query::select(["id"]).from("articles").where_(col("published").eq(0)),
        )
        .unwrap();
    assert_eq!(conn.run(&delete).unwrap().row_count(), 2);
    assert_eq!(count_rows(&mut conn, "articles"), 1);
}
