mod common;

use arcsql::query::{
    avg, col, count, func, lit, rank, sum, Direction, FrameBound, JoinType, WindowExpression,
};
use arcsql::{Dialect, Query, QueryCompiler, Value, ValueBinder};

use common::sqlite_articles;

fn compile(dialect: Dialect, quote: bool, query: &Query) -> (String, ValueBinder) {
    let mut binder = query.fresh_binder();
    let sql = QueryCompiler::new(dialect, quote)
        .compile(query, &mut binder)
        .unwrap();
    (sql, binder)
}

fn seed(conn: &mut arcsql::Connection) {
    let rows = [
        (1, "Rust in practice", 1),
        (1, "Lifetimes", 0),
        (2, "Borrowing", 1),
        (3, "Traits", 1),
    ];
    for (author, title, published) in rows {
        conn.insert(
            "articles",
            [
                ("author_id", Value::from(author)),
                ("title", Value::from(title)),
                ("published", Value::from(published)),
            ],
        )
        .unwrap();
    }
}

#[test]
fn test_identifier_quoting_per_dialect() {
    let query = Query::select(["a.id", "a.title AS headline"])
        .from_as("articles", "a")
        .join(
            JoinType::Left,
            "authors",
            Some("au"),
            col("au.id").eq(col("a.author_id")),
        )
        .order_asc("a.id");

    let expected = [
        (
            Dialect::Sqlite,
            r#"SELECT "a"."id", "a"."title" AS "headline" FROM "articles" "a" LEFT JOIN "authors" "au" ON "au"."id" = "a"."author_id" ORDER BY "a"."id" ASC"#,
        ),
        (
            Dialect::Mysql,
            "SELECT `a`.`id`, `a`.`title` AS `headline` FROM `articles` `a` LEFT JOIN `authors` `au` ON `au`.`id` = `a`.`author_id` ORDER BY `a`.`id` ASC",
        ),
        (
            Dialect::SqlServer,
            "SELECT [a].[id], [a].[title] AS [headline] FROM [articles] [a] LEFT JOIN [authors] [au] ON [au].[id] = [a].[author_id] ORDER BY [a].[id] ASC",
        ),
    ];
    for (dialect, sql) in expected {
        assert_eq!(compile(dialect, true, &query).0, sql, "{}", dialect);
    }
}

#[test]
fn test_unquoted_by_default() {
    let query = Query::select(["id"]).from("articles");
    assert_eq!(
        compile(Dialect::Postgres, false, &query).0,
        "SELECT id FROM articles"
    );
}

#[test]
fn test_typed_bindings_follow_type_map() {
    let query = Query::select(["*"])
        .from("articles")
        .types([("published", "boolean"), ("created", "datetime")])
        .where_(col("published").eq(1))
        .where_(col("created").gt("2024-01-01"))
        .where_(col("title").like("%rust%"));

    let (sql, binder) = compile(Dialect::Sqlite, false, &query);
    assert_eq!(
        sql,
        "SELECT * FROM articles WHERE (published = :c0 AND created > :c1 AND title LIKE :c2)"
    );
    let types: Vec<Option<&str>> = binder
        .bindings()
        .values()
        .map(|b| b.ty.as_deref())
        .collect();
    assert_eq!(types, vec![Some("boolean"), Some("datetime"), Some("string")]);
}

#[test]
fn test_explicit_bindings_and_placeholders() {
    let query = Query::select(["*"])
        .from("articles")
        .where_(lit("author_id = :author"))
        .where_(col("id").gt(10))
        .bind("author", 7, Some("integer"));

    let (sql, binder) = compile(Dialect::Mysql, false, &query);
    assert_eq!(sql, "SELECT * FROM articles WHERE (author_id = :author AND id > :c0)");
    assert_eq!(binder.len(), 2);
    assert_eq!(binder.get(":author").unwrap().value, Value::Int(7));

    // Compiling twice numbers placeholders from zero again
    let (again, _) = compile(Dialect::Mysql, false, &query);
    assert_eq!(again, sql);
}

#[test]
fn test_in_lists() {
    let query = Query::select(["id"])
        .from("articles")
        .where_(col("author_id").in_list(vec![1, 2, 3]))
        .where_(col("id").not_in(Vec::<i64>::new()));
    assert_eq!(
        compile(Dialect::Postgres, false, &query).0,
        "SELECT id FROM articles WHERE (author_id IN (:c0, :c1, :c2) AND 1=1)"
    );

    let nothing = Query::select(["id"])
        .from("articles")
        .where_(col("id").in_list(Vec::<i64>::new()));
    assert_eq!(
        compile(Dialect::Postgres, false, &nothing).0,
        "SELECT id FROM articles WHERE 1=0"
    );
}

#[test]
fn test_group_having_and_aggregates() {
    let query = Query::select(["author_id"])
        .select_expr(count("*"), Some("total"))
        .select_expr(sum("published"), Some("published"))
        .from("articles")
        .group_by(["author_id"])
        .having(count("*").gt(1))
        .order_by(count("*"), Some(Direction::Desc));

    assert_eq!(
        compile(Dialect::Mysql, false, &query).0,
        "SELECT author_id, COUNT(*) AS total, SUM(published) AS published FROM articles \
         GROUP BY author_id HAVING COUNT(*) > :c0 ORDER BY COUNT(*) DESC"
    );
}

#[test]
fn test_distinct_top_and_modifiers() {
    let query = Query::select(["author_id"])
        .distinct()
        .modifier("SQL_NO_CACHE")
        .from("articles")
        .limit(3);
    assert_eq!(
        compile(Dialect::SqlServer, false, &query).0,
        "SELECT DISTINCT TOP 3 SQL_NO_CACHE author_id FROM articles"
    );
    assert_eq!(
        compile(Dialect::Mysql, false, &query).0,
        "SELECT DISTINCT SQL_NO_CACHE author_id FROM articles LIMIT 3"
    );
}

#[test]
fn test_page_computes_offset() {
    let query = Query::select(["id"]).from("articles").order_asc("id").page(3, 20);
    assert_eq!(
        compile(Dialect::Postgres, false, &query).0,
        "SELECT id FROM articles ORDER BY id ASC LIMIT 20 OFFSET 40"
    );
}

#[test]
fn test_page_bounds() {
    let first = Query::select(["id"]).from("articles").page(0, 10);
    assert_eq!(
        compile(Dialect::Sqlite, false, &first).0,
        "SELECT id FROM articles LIMIT 10 OFFSET 0"
    );

    let last = Query::select(["id"]).from("articles").page(u64::MAX, 2);
    assert_eq!(
        compile(Dialect::Postgres, false, &last).0,
        format!("SELECT id FROM articles LIMIT 2 OFFSET {}", u64::MAX)
    );
}

#[test]
fn test_union_shares_placeholders() {
    let drafts = Query::select(["id"]).from("drafts").where_(col("author_id").eq(2));
    let query = Query::select(["id"])
        .from("articles")
        .where_(col("author_id").eq(1))
        .union_all(drafts);
    let (sql, binder) = compile(Dialect::Sqlite, false, &query);
    assert_eq!(
        sql,
        "SELECT id FROM articles WHERE author_id = :c0 UNION ALL SELECT id FROM drafts WHERE author_id = :c1"
    );
    assert_eq!(binder.len(), 2);
}

#[test]
fn test_window_frames() {
    let running = WindowExpression::new()
        .partition("author_id")
        .order("id", Direction::Asc)
        .range(FrameBound::Preceding(2), FrameBound::Following(1));
    let query = Query::select(["id"])
        .select_expr(avg("published").over(running), Some("moving"))
        .select_expr(rank().over(WindowExpression::named("by_author")), Some("r"))
        .from("articles")
        .window(
            "by_author",
            WindowExpression::new().partition("author_id").order("id", Direction::Desc),
        );

    assert_eq!(
        compile(Dialect::Postgres, false, &query).0,
        "SELECT id, AVG(published) OVER (PARTITION BY author_id ORDER BY id ASC \
         RANGE BETWEEN 2 PRECEDING AND 1 FOLLOWING) AS moving, \
         RANK() OVER by_author AS r FROM articles \
         WINDOW by_author AS (PARTITION BY author_id ORDER BY id DESC)"
    );
}

#[test]
fn test_window_extends_named_window() {
    let query = Query::select(["id"])
        .select_expr(
            sum("published").over(
                WindowExpression::named("w").order("id", Direction::Asc),
            ),
            Some("running"),
        )
        .from("articles")
        .window("w", WindowExpression::new().partition("author_id"));
    assert_eq!(
        compile(Dialect::Sqlite, false, &query).0,
        "SELECT id, SUM(published) OVER (w ORDER BY id ASC) AS running FROM articles \
         WINDOW w AS (PARTITION BY author_id)"
    );
}

#[test]
fn test_functions_bind_arguments() {
    let query = Query::select(["id"])
        .select_expr(func("COALESCE", vec![col("title"), Value::from("untitled").into()]), Some("t"))
        .from("articles");
    let (sql, binder) = compile(Dialect::Sqlite, false, &query);
    assert_eq!(sql, "SELECT id, COALESCE(title, :c0) AS t FROM articles");
    assert_eq!(binder.get(":c0").unwrap().value, Value::from("untitled"));
}

#[test]
fn test_run_on_sqlite_with_select_types() {
    let mut conn = sqlite_articles();
    seed(&mut conn);

    let query = Query::select(["id", "title", "published"])
        .from("articles")
        .where_(col("author_id").eq(1))
        .order_asc("id")
        .select_types([("published", "boolean"), ("id", "string")]);
    let rows = conn.run(&query).unwrap().fetch_all_assoc();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["published"], Value::Bool(true));
    assert_eq!(rows[1]["published"], Value::Bool(false));
    assert_eq!(rows[0]["id"], Value::from("1"));
    assert_eq!(rows[0]["title"], Value::from("Rust in practice"));
}

#[test]
fn test_run_window_function_on_sqlite() {
    let mut conn = sqlite_articles();
    seed(&mut conn);

    let query = Query::select(["title"])
        .select_expr(
            rank().over(
                WindowExpression::new()
                    .partition("author_id")
                    .order("id", Direction::Desc),
            ),
            Some("position"),
        )
        .from("articles")
        .where_(col("author_id").eq(1))
        .order_asc("id");
    let rows = conn.run(&query).unwrap().fetch_all();

    assert_eq!(
        rows,
        vec![
            vec![Value::from("Rust in practice"), Value::Int(2)],
            vec![Value::from("Lifetimes"), Value::Int(1)],
        ]
    );
}

#[test]
fn test_run_update_and_aggregate_on_sqlite() {
    let mut conn = sqlite_articles();
    seed(&mut conn);

    let update = Query::update("articles")
        .types([("published", "boolean")])
        .set("published", true)
        .where_(col("published").eq(false));
    assert_eq!(conn.run(&update).unwrap().row_count(), 1);

    let total = conn
        .run(
            &Query::select(Vec::<String>::new())
                .select_expr(sum("published"), Some("n"))
                .from("articles"),
        )
        .unwrap()
        .fetch_column(0);
    assert_eq!(total, Some(Value::Int(4)));
}

#[test]
fn test_subquery_keeps_its_explicit_bindings() {
    let mut conn = sqlite_articles();
    seed(&mut conn);

    let by_author = Query::select(["id"])
        .from("articles")
        .where_(lit("author_id = :author"))
        .bind(":author", 2, Some("integer"));
    assert_eq!(conn.run(&by_author).unwrap().fetch_all().len(), 1);

    let titles = Query::select(["title"])
        .from("articles")
        .where_(col("id").in_query(by_author.clone()));
    let (sql, binder) = conn.compile(&titles).unwrap();
    assert_eq!(
        sql,
        "SELECT title FROM articles WHERE id IN (SELECT id FROM articles WHERE author_id = :author)"
    );
    assert_eq!(binder.get(":author").unwrap().value, Value::Int(2));
    assert_eq!(
        conn.run(&titles).unwrap().fetch_all(),
        vec![vec![Value::from("Borrowing")]]
    );

    // CTE bodies and union members carry their bindings too
    let combined = Query::select(["id"])
        .from("picked")
        .cte("picked", by_author.clone())
        .unwrap()
        .union(
            Query::select(["id"])
                .from("articles")
                .where_(lit("author_id = :other"))
                .bind(":other", 3, None),
        );
    let mut ids: Vec<i64> = conn
        .run(&combined)
        .unwrap()
        .fetch_all()
        .into_iter()
        .filter_map(|row| row[0].as_i64())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn test_missing_binding_is_reported_by_sqlite() {
    let mut conn = sqlite_articles();
    let query = Query::select(["id"])
        .from("articles")
        .where_(lit("author_id = :nobody"));
    assert!(matches!(conn.run(&query), Err(arcsql::Error::Native(_))));
}

#[test]
fn test_insert_from_select_on_sqlite() {
    let mut conn = sqlite_articles();
    seed(&mut conn);
    conn.execute_sql("CREATE TABLE archive (title TEXT)").unwrap();

    let source = Query::select(["title"])
        .from("articles")
        .where_(col("published").eq(0));
    let insert = Query::insert_into("archive", ["title"]).values_query(source);
    assert_eq!(conn.run(&insert).unwrap().row_count(), 1);
}
