#[cfg(test)]
mod tests {
    use crate::{fakes::MemoryDb, host_db, LOCAL_BASE_URL, TABLE_PREFIX};
    use engine_processing::{host::HostLayout, rewrite::table::TableRewriter, scan::SchemaScanner};
    use model::{core::value::Value, migration::Strategy, rewrite::RewriteJob};
    use std::sync::Arc;
    use tracing_test::traced_test;

    const OLD: &str = "http://old/img.jpg";
    const NEW: &str = "https://cdn.example.com/img.jpg";

    fn links_table(db: &MemoryDb) {
        db.create_table(
            "custom_links",
            &[("id", "int"), ("url", "varchar(255)"), ("note", "TEXT")],
            Some("id"),
        );
        db.insert(
            "custom_links",
            &[
                ("id", Value::Int(1)),
                ("url", Value::from("http://old/a.png")),
                ("note", Value::from("also http://old/a.png")),
            ],
        );
        db.insert(
            "custom_links",
            &[
                ("id", Value::Int(2)),
                ("url", Value::from("https://elsewhere/b.png")),
                ("note", Value::from("nothing here")),
            ],
        );
        db.insert(
            "custom_links",
            &[
                ("id", Value::Int(3)),
                ("url", Value::Null),
                ("note", Value::from("see http://old/c.png")),
            ],
        );
    }

    // Scenario: core tables, numeric-only tables, tables without matches and
    // tables that cannot be introspected all stay out of the scan result.
    // Expected Outcome: only `custom_links` is reported, each matching row counted once.
    #[traced_test]
    #[tokio::test]
    async fn scan_reports_only_matching_non_core_tables() {
        let db = host_db();
        db.create_table("wp_options", &[("option_id", "bigint"), ("option_value", "longtext")], Some("option_id"));
        db.insert(
            "wp_options",
            &[("option_id", Value::Int(1)), ("option_value", Value::from("http://old/logo.png"))],
        );
        links_table(&db);
        db.create_table("counters", &[("id", "int"), ("hits", "bigint")], Some("id"));
        db.insert("counters", &[("id", Value::Int(1)), ("hits", Value::Int(5))]);
        db.create_table("quiet", &[("id", "int"), ("body", "mediumtext")], Some("id"));
        db.insert("quiet", &[("id", Value::Int(1)), ("body", Value::from("plain"))]);
        db.create_table("legacy", &[("body", "text")], None);
        db.insert("legacy", &[("body", Value::from("http://old/x.png"))]);
        db.break_table("legacy");

        let scanner = SchemaScanner::new(Arc::new(db));
        let core = HostLayout::new(TABLE_PREFIX).core_tables();
        let patterns = vec![LOCAL_BASE_URL.to_string(), "/a.png".to_string()];
        let result = scanner.scan(&core, &patterns).await.unwrap();

        assert_eq!(result.table_names(), vec!["custom_links".to_string()]);
        assert_eq!(result.count("custom_links"), Some(2));
        assert!(logs_contain("Skipping table"));
    }

    #[tokio::test]
    async fn scan_without_patterns_is_empty() {
        let db = host_db();
        links_table(&db);
        let scanner = SchemaScanner::new(Arc::new(db));

        let result = scanner.scan(&Default::default(), &[]).await.unwrap();
        assert!(result.is_empty());
    }

    // Scenario: one serialized meta value references the old URL with an exact byte length.
    // Expected Outcome: the value is re-encoded with the new length and other rows are never written.
    #[tokio::test]
    async fn advanced_rewrite_updates_only_matching_rows() {
        let db = Arc::new(host_db());
        db.insert(
            "wp_postmeta",
            &[
                ("meta_id", Value::Int(10)),
                ("post_id", Value::Int(1)),
                ("meta_key", Value::from("gallery")),
                ("meta_value", Value::from(r#"a:1:{s:3:"url";s:18:"http://old/img.jpg";}"#)),
            ],
        );
        db.insert(
            "wp_postmeta",
            &[
                ("meta_id", Value::Int(11)),
                ("post_id", Value::Int(1)),
                ("meta_key", Value::from("other")),
                ("meta_value", Value::from("untouched")),
            ],
        );

        let rewriter = TableRewriter::new(db.clone());
        let stats = rewriter
            .rewrite_table("wp_postmeta", &RewriteJob::new(OLD, NEW), Strategy::Advanced)
            .await
            .unwrap();

        assert_eq!(stats.rows_updated, 1);
        assert_eq!(stats.rows_failed, 0);
        assert_eq!(db.updated_keys("wp_postmeta"), vec![Value::Int(10)]);
        assert_eq!(
            db.cell("wp_postmeta", "meta_id", &Value::Int(10), "meta_value"),
            Value::from(r#"a:1:{s:3:"url";s:31:"https://cdn.example.com/img.jpg";}"#)
        );
        assert_eq!(
            db.cell("wp_postmeta", "meta_id", &Value::Int(11), "meta_value"),
            Value::from("untouched")
        );
    }

    // Scenario: a stored value declares the wrong length for its string.
    // Expected Outcome: the value is still decoded and written back with the correct length.
    #[tokio::test]
    async fn advanced_rewrite_repairs_declared_lengths() {
        let db = Arc::new(host_db());
        db.insert(
            "wp_postmeta",
            &[
                ("meta_id", Value::Int(1)),
                ("post_id", Value::Int(1)),
                ("meta_key", Value::from("broken")),
                ("meta_value", Value::from(r#"a:1:{s:3:"url";s:20:"http://old/img.jpg";}"#)),
            ],
        );

        let rewriter = TableRewriter::new(db.clone());
        rewriter
            .rewrite_table("wp_postmeta", &RewriteJob::new(OLD, NEW), Strategy::Advanced)
            .await
            .unwrap();

        assert_eq!(
            db.cell("wp_postmeta", "meta_id", &Value::Int(1), "meta_value"),
            Value::from(r#"a:1:{s:3:"url";s:31:"https://cdn.example.com/img.jpg";}"#)
        );
    }

    #[tokio::test]
    async fn advanced_rewrite_keeps_json_key_order() {
        let db = Arc::new(host_db());
        db.insert(
            "wp_postmeta",
            &[
                ("meta_id", Value::Int(1)),
                ("post_id", Value::Int(1)),
                ("meta_key", Value::from("blocks")),
                ("meta_value", Value::from(r#"{"src":"http://old/img.jpg","alt":"x","w":640}"#)),
            ],
        );

        TableRewriter::new(db.clone())
            .rewrite_table("wp_postmeta", &RewriteJob::new(OLD, NEW), Strategy::Advanced)
            .await
            .unwrap();

        assert_eq!(
            db.cell("wp_postmeta", "meta_id", &Value::Int(1), "meta_value"),
            Value::from(r#"{"src":"https://cdn.example.com/img.jpg","alt":"x","w":640}"#)
        );
    }

    #[tokio::test]
    async fn rewriting_twice_changes_nothing_more() {
        let db = Arc::new(host_db());
        db.insert(
            "wp_posts",
            &[
                ("ID", Value::Int(1)),
                ("post_content", Value::from(r#"<img src="http://old/img.jpg">"#)),
                ("guid", Value::from("http://site/?p=1")),
                ("post_type", Value::from("post")),
            ],
        );
        let rewriter = TableRewriter::new(db.clone());
        let job = RewriteJob::new(OLD, NEW);

        let first = rewriter.rewrite_table("wp_posts", &job, Strategy::Advanced).await.unwrap();
        let after_first = db.cell("wp_posts", "ID", &Value::Int(1), "post_content");
        let second = rewriter.rewrite_table("wp_posts", &job, Strategy::Advanced).await.unwrap();

        assert_eq!(first.rows_updated, 1);
        assert_eq!(second.rows_updated, 0);
        assert_eq!(db.cell("wp_posts", "ID", &Value::Int(1), "post_content"), after_first);
        assert_eq!(after_first, Value::from(r#"<img src="https://cdn.example.com/img.jpg">"#));
    }

    // Scenario: the table has no primary key.
    // Expected Outcome: a warning is logged and the bulk column replace is used instead.
    #[traced_test]
    #[tokio::test]
    async fn table_without_key_falls_back_to_naive() {
        let db = Arc::new(MemoryDb::new());
        db.create_table("plugin_log", &[("line", "text")], None);
        db.insert("plugin_log", &[("line", Value::from("GET http://old/img.jpg"))]);

        let stats = TableRewriter::new(db.clone())
            .rewrite_table("plugin_log", &RewriteJob::new(OLD, NEW), Strategy::Advanced)
            .await
            .unwrap();

        assert_eq!(stats.rows_updated, 1);
        assert!(db.updated_keys("plugin_log").is_empty());
        assert!(logs_contain("Falling back to naive rewrite"));
    }

    #[tokio::test]
    async fn naive_rewrite_replaces_every_column() {
        let db = Arc::new(host_db());
        db.insert(
            "wp_posts",
            &[
                ("ID", Value::Int(1)),
                ("post_content", Value::from("http://old/img.jpg")),
                ("guid", Value::from("http://old/img.jpg")),
                ("post_type", Value::from("attachment")),
            ],
        );

        let stats = TableRewriter::new(db.clone())
            .rewrite_table("wp_posts", &RewriteJob::new(OLD, NEW), Strategy::Naive)
            .await
            .unwrap();

        assert_eq!(stats.rows_updated, 2);
        assert_eq!(db.cell("wp_posts", "ID", &Value::Int(1), "guid"), Value::from(NEW));
    }

    #[tokio::test]
    async fn missing_tables_are_counted_as_table_failures() {
        let db = Arc::new(host_db());
        let rewriter = TableRewriter::new(db);
        let tables = vec!["wp_posts".to_string(), "gone".to_string()];

        let stats = rewriter
            .rewrite_tables(&tables, &RewriteJob::new(OLD, NEW), Strategy::Advanced)
            .await;
        assert_eq!(stats.rows_updated, 0);
        assert_eq!(stats.rows_failed, 0);
        assert_eq!(stats.tables_failed, 1);
    }
}
