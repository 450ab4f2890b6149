use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use curator::bucket::BucketVariant;
use curator::config::{ConnectionSettings, Engine};
use curator::curator::{Curator, DefaultCurator, TotalRowsPlanner};
use curator::data_access::{DataAccessError, SqlArg, SqliteDataSource};
use curator::execution::{ExecutionContext, ExecutionResult, RowStoreExecutor, Statement};
use curator::logging::{RequestLogHelper, TracingLogWriter};
use curator::model::{ReportingRequest, Value};
use curator::planner::{DefaultQueryPlanner, QueryAttributes, QueryPipeline, QueryPlanner};
use curator::registry::{Cube, Dimension, Fact, Registry, RegistryCatalog};

fn source() -> SqliteDataSource {
    let source = SqliteDataSource::in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE args (
                i INTEGER, l INTEGER, d REAL, b INTEGER, f REAL,
                y INTEGER, s INTEGER, ts TEXT, dt TEXT, t TEXT, n TEXT
            );",
        )
        .unwrap();
    source
}

fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 30, 5)
        .unwrap()
}

#[test]
fn test_every_argument_kind_binds() {
    let source = source();
    let args = vec![
        SqlArg::Int(7),
        SqlArg::Long(9_000_000_000),
        SqlArg::Double(2.5),
        SqlArg::Boolean(true),
        SqlArg::Float(1.5),
        SqlArg::Byte(-3),
        SqlArg::Short(300),
        SqlArg::Timestamp(timestamp()),
        SqlArg::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        SqlArg::Text("acme".to_string()),
        SqlArg::Null,
    ];

    let inserted = source
        .execute_update("INSERT INTO args VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", &args)
        .unwrap();
    assert_eq!(inserted, 1);

    let row = source
        .query_for_object("SELECT * FROM args", &[], |row| {
            Ok((
                row.get::<_, i32>("i")?,
                row.get::<_, i64>("l")?,
                row.get::<_, f64>("d")?,
                row.get::<_, bool>("b")?,
                row.get::<_, f64>("f")?,
                row.get::<_, i8>("y")?,
                row.get::<_, i16>("s")?,
                row.get::<_, NaiveDateTime>("ts")?,
                row.get::<_, NaiveDate>("dt")?,
                row.get::<_, String>("t")?,
                row.get::<_, Option<String>>("n")?,
            ))
        })
        .unwrap()
        .unwrap();

    assert_eq!(row.0, 7);
    assert_eq!(row.1, 9_000_000_000);
    assert_eq!(row.2, 2.5);
    assert!(row.3);
    assert_eq!(row.4, 1.5);
    assert_eq!(row.5, -3);
    assert_eq!(row.6, 300);
    assert_eq!(row.7, timestamp());
    assert_eq!(row.8, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(row.9, "acme");
    assert_eq!(row.10, None);
}

#[test]
fn test_null_arguments_match_is_null() {
    let source = source();
    source
        .execute_update("INSERT INTO args (i, t) VALUES (?, ?)", &[SqlArg::Int(1), SqlArg::from(None::<&str>)])
        .unwrap();

    let count = source
        .query_for_object("SELECT COUNT(*) FROM args WHERE t IS ?", &[SqlArg::Null], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();
    assert_eq!(count, Some(1));
}

#[test]
fn test_execute_reports_result_sets() {
    let source = source();

    assert!(!source
        .execute("INSERT INTO args (i) VALUES (?)", &[SqlArg::Int(1)])
        .unwrap());
    assert!(source.execute("SELECT i FROM args", &[]).unwrap());
    assert!(source.execute("SELECT i FROM args WHERE i = ?", &[SqlArg::Int(42)]).unwrap());
}

#[test]
fn test_query_for_list_and_missing_object() {
    let source = source();
    for i in 1..=3 {
        source
            .execute_update("INSERT INTO args (i, t) VALUES (?, ?)", &[SqlArg::Int(i), SqlArg::coerce(i * 10)])
            .unwrap();
    }

    let texts = source
        .query_for_list("SELECT t FROM args WHERE i >= ? ORDER BY i", &[SqlArg::Int(2)], |row| {
            row.get::<_, String>(0)
        })
        .unwrap();
    assert_eq!(texts, vec!["20".to_string(), "30".to_string()]);

    let missing = source
        .query_for_object("SELECT t FROM args WHERE i = ?", &[SqlArg::Int(99)], |row| {
            row.get::<_, String>(0)
        })
        .unwrap();
    assert_eq!(missing, None);
}

#[test]
fn test_query_rows_keeps_column_order() {
    let source = source();
    source
        .execute_update("INSERT INTO args (i, d, t) VALUES (?, ?, ?)", &[SqlArg::Int(1), SqlArg::Double(0.5), SqlArg::Null])
        .unwrap();

    let rows = source.query_rows("SELECT t, i, d FROM args", &[]).unwrap();

    assert_eq!(rows.columns, vec!["t", "i", "d"]);
    assert_eq!(rows.rows[0].get("i"), Some(&Value::Int(1)));
    assert_eq!(rows.rows[0].get("d"), Some(&Value::Float(0.5)));
    assert_eq!(rows.rows[0].get("t"), Some(&Value::Null));
}

#[test]
fn test_errors_surface_and_source_stays_usable() {
    let source = source();

    let err = source.query_rows("SELECT nope FROM args", &[]).unwrap_err();
    assert!(matches!(err, DataAccessError::Sqlite(_)));
    assert!(source.execute("SELECT i FROM args", &[]).unwrap());
}

#[test]
fn test_from_settings_in_memory() {
    let settings: ConnectionSettings = toml::from_str(
        r#"
driver = "sqlite"
connection_string = ":memory:"
"#,
    )
    .unwrap();
    let source = SqliteDataSource::from_settings(&settings).unwrap();
    source.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
    assert!(source.execute("SELECT id FROM t", &[]).unwrap());

    let bad: ConnectionSettings = toml::from_str(
        r#"
driver = "jdbc"
connection_string = ":memory:"
"#,
    )
    .unwrap();
    assert!(matches!(
        SqliteDataSource::from_settings(&bad),
        Err(DataAccessError::Config(_))
    ));
}

/// One row per region, each carrying that region's advertiser count.
fn render(pipeline: &QueryPipeline, _: &QueryAttributes) -> ExecutionResult<Statement> {
    let pagination = pipeline.request_model.request().pagination;
    Ok(Statement::new(
        "SELECT MIN(name) AS \"Advertiser Name\", COUNT(*) AS TOTALROWS
         FROM advertiser GROUP BY region ORDER BY region LIMIT ? OFFSET ?",
    )
    .bind(pagination.rows_per_page as i64)
    .bind(pagination.start_index as i64))
}

#[test]
fn test_row_store_curator_sums_inline_row_counts() {
    let source = Arc::new(SqliteDataSource::in_memory().unwrap());
    source
        .execute_batch(
            "CREATE TABLE advertiser (id INTEGER, name TEXT, region TEXT);
             INSERT INTO advertiser VALUES
                (1, 'a', 'apac'), (2, 'b', 'apac'), (3, 'c', 'emea'),
                (4, 'd', 'emea'), (5, 'e', 'emea'), (6, 'f', 'us');",
        )
        .unwrap();

    let registry = Registry::new("reporting")
        .with_dimension(
            Dimension::new("advertiser", "Advertiser ID", ["Advertiser Name"]).with_engines([Engine::Oracle]),
        )
        .with_cube(
            Cube::new("performance")
                .with_dimensions(["advertiser"])
                .with_fact(Fact::new("ad_stats", Engine::Oracle, ["Advertiser ID", "Impressions"])),
        );
    let catalog = RegistryCatalog::new();
    catalog.register(registry).unwrap();

    let planner: Arc<dyn QueryPlanner> = Arc::new(DefaultQueryPlanner::new());
    let executor = RowStoreExecutor::new(Engine::Oracle, source, Arc::new(render));
    let curator = DefaultCurator::new(
        Arc::new(catalog),
        planner.clone(),
        Arc::new(ExecutionContext::new().with_executor(Arc::new(executor))),
        TotalRowsPlanner::new(planner, Engine::Oracle),
    );

    let request = ReportingRequest::new("performance", ["Advertiser Name"])
        .with_pagination(0, 10)
        .with_row_count();
    let result = curator.execute(
        "reporting",
        &BucketVariant::default(),
        Arc::new(request),
        &RequestLogHelper::new(Arc::new(TracingLogWriter)),
    );

    let (_, result) = result.into_parts();
    let result = result.unwrap();
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows.rows[1].get("Advertiser Name"), Some(&Value::Text("c".to_string())));
    // apac (2) + emea (3) + us (1)
    assert_eq!(result.total_rows, Some(6));
}
