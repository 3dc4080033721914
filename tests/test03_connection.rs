use std::sync::Arc;

use pg_pool_middleware::connection::STATEMENT_TARGET;
use pg_pool_middleware::prelude::*;
use pg_pool_middleware::test_utils::mock::{MockBackend, MockSession};

fn connect(backend: &MockBackend) -> Connection<MockSession> {
    Connection::new(backend.open_session())
}

#[tokio::test(flavor = "current_thread")]
async fn query_returns_rows_in_column_order() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    backend.push_result(QueryOutput {
        columns: vec![
            ColumnDesc::new("name", "text"),
            ColumnDesc::new("id", "int8").with_oid(20),
        ],
        rows: vec![
            vec![RowValues::Text("alice".into()), RowValues::Int(1)],
            vec![RowValues::Null, RowValues::Int(2)],
        ],
    });
    let mut conn = connect(&backend);

    let detail = conn
        .query_detail("select name, id from users where id > $1", &[RowValues::Int(0)])
        .await?;
    assert_eq!(detail.columns[1].type_oid, Some(20));
    assert_eq!(
        detail.rows.get_column_names(),
        Some(&Arc::new(vec!["name".to_string(), "id".to_string()]))
    );
    assert_eq!(detail.rows.len(), 2);
    assert_eq!(detail.rows.results[0].get("name").and_then(RowValues::as_text), Some("alice"));
    assert!(detail.rows.results[1].get("name").is_some_and(RowValues::is_null));
    assert_eq!(detail.rows.results[1].get("id").and_then(RowValues::as_int), Some(&2));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn warnings_are_recorded_not_returned() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    backend.fail_next(NativeError::with_sqlstate("01000", "something to note"));
    conn.execute("vacuum", &[]).await?;
    assert!(!conn.is_invalid());
    assert_eq!(conn.warnings().len(), 1);
    assert_eq!(conn.warnings()[0].kind(), ErrorKind::Warning);
    assert_eq!(conn.warnings()[0].code(), Some("01000"));

    backend.fail_next(NativeError::new(NativeErrorClass::Warning, "truncated"));
    let rows = conn.query("select 1", &[]).await?;
    assert!(rows.is_empty());

    let taken = conn.take_warnings();
    assert_eq!(taken.len(), 2);
    assert!(conn.warnings().is_empty());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn operational_error_without_code_invalidates() {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    backend.fail_next(NativeError::new(
        NativeErrorClass::Operational,
        "server closed the connection unexpectedly",
    ));
    let err = conn.execute("select 1", &[]).await.unwrap_err();
    assert!(err.connection_error());
    assert!(conn.is_invalid());
}

#[tokio::test(flavor = "current_thread")]
async fn programming_error_keeps_connection_valid() {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    backend.fail_next(NativeError::with_sqlstate("42P01", "relation does not exist"));
    let err = conn.query("select * from missing", &[]).await.unwrap_err();
    assert_eq!(
        err.taxonomy().map(TaxonomyError::kind),
        Some(ErrorKind::Programming)
    );
    assert!(!err.connection_error());
    assert!(!err.unique_error());
    assert!(!conn.is_invalid());
}

#[tokio::test(flavor = "current_thread")]
async fn nested_begin_is_rejected() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    assert!(!conn.in_transaction());
    conn.begin().await?;
    assert!(conn.in_transaction());
    let err = conn.begin().await.unwrap_err();
    assert!(matches!(err, SqlPoolError::NestedTransaction));
    assert!(conn.in_transaction());

    conn.execute("insert into t values (1)", &[]).await?;
    conn.commit().await?;
    assert!(!conn.in_transaction());
    assert_eq!(backend.statements(), vec!["insert into t values (1)", "COMMIT"]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn rollback_restores_autocommit() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    conn.begin().await?;
    conn.execute("delete from t", &[]).await?;
    conn.rollback().await?;
    assert!(!conn.in_transaction());
    assert!(conn.session().autocommit());
    assert_eq!(backend.statements(), vec!["delete from t", "ROLLBACK"]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn closure_transaction_commits_or_rolls_back() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    let inserted = conn
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("insert into t values ($1)", &[RowValues::Int(1)]).await?;
                Ok(1)
            })
        })
        .await?;
    assert_eq!(inserted, 1);

    let err = conn
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("insert into t values ($1)", &[RowValues::Int(2)]).await?;
                Err::<(), _>(SqlPoolError::ParameterError("bail out".into()))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::ParameterError(_)));
    assert!(!conn.in_transaction());

    assert_eq!(
        backend.statements(),
        vec![
            "insert into t values ($1)",
            "COMMIT",
            "insert into t values ($1)",
            "ROLLBACK",
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn scope_commit_and_nested_scope() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    let mut scope = conn.begin_scope().await?;
    scope.execute("insert into t values (1)", &[]).await?;
    assert!(matches!(
        scope.begin().await,
        Err(SqlPoolError::NestedTransaction)
    ));
    scope.commit().await?;

    assert!(!conn.in_transaction());
    assert_eq!(backend.statements(), vec!["insert into t values (1)", "COMMIT"]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn abandoned_scope_rolls_back_before_next_call() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    {
        let mut scope = conn.begin_scope().await?;
        scope.execute("insert into t values (1)", &[]).await?;
    }
    assert!(conn.in_transaction());

    conn.execute("select 1", &[]).await?;
    assert!(!conn.in_transaction());
    assert_eq!(
        backend.statements(),
        vec!["insert into t values (1)", "ROLLBACK", "select 1"]
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn closed_connection_rejects_calls() {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);
    let session = conn.session().id();

    conn.close();
    conn.close();
    assert!(conn.is_closed());
    assert!(backend.is_closed(session));

    let err = conn.execute("select 1", &[]).await.unwrap_err();
    assert!(matches!(err, SqlPoolError::ConnectionClosed));
    assert!(err.connection_error());
    assert!(backend.statements().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn named_parameters_become_positional() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    conn.execute_named(
        "update t set name = :name where id = :id or parent = :id",
        &[("id", RowValues::Int(3)), ("name", RowValues::Text("x".into()))],
    )
    .await?;
    assert_eq!(
        backend.statements(),
        vec!["update t set name = $1 where id = $2 or parent = $2"]
    );

    let err = conn
        .query_named("select :missing", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::ParameterError(_)));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn parameter_mismatch_is_caught_before_sending() {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    let err = conn
        .execute("select $2", &[RowValues::Int(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPoolError::ParameterError(_)));
    assert!(backend.statements().is_empty());
    assert!(!conn.is_invalid());
}

#[tokio::test(flavor = "current_thread")]
async fn execute_many_runs_each_set() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    conn.execute_many(
        "insert into t values ($1)",
        &[vec![RowValues::Int(1)], vec![RowValues::Int(2)]],
    )
    .await?;
    assert_eq!(backend.statements().len(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn escape_string_placeholder_text_is_not_a_parameter() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let mut conn = connect(&backend);

    conn.execute(r"select E'it\'s $1 dollars'", &[]).await?;
    assert_eq!(backend.statements(), vec![r"select E'it\'s $1 dollars'"]);
    Ok(())
}

#[derive(Clone, Default)]
struct LogCapture(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    fn statement_records(&self) -> usize {
        self.text().matches(STATEMENT_TARGET).count()
    }
}

async fn run_two_statements(debug: bool) -> Result<LogCapture, SqlPoolError> {
    let capture = LogCapture::default();
    let _guard = capture.install();
    let backend = MockBackend::new();
    let pool = LockedPool::new(backend.manager(), PoolConfig::new().debug(debug))?;

    let mut conn = pool.acquire().await?;
    conn.execute("delete from t where id = $1", &[RowValues::Int(7)]).await?;
    conn.query("select $1::text", &[RowValues::Text("o'neil".into())]).await?;
    pool.release(conn);
    pool.destroy().await;
    Ok(capture)
}

#[tokio::test(flavor = "current_thread")]
async fn debug_logs_one_rendered_record_per_statement() -> Result<(), SqlPoolError> {
    let capture = run_two_statements(true).await?;
    let text = capture.text();

    assert_eq!(capture.statement_records(), 2, "captured:\n{text}");
    assert!(text.contains("delete from t where id = 7"));
    assert!(text.contains("select 'o''neil'::text"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn statements_are_not_logged_without_debug() -> Result<(), SqlPoolError> {
    let capture = run_two_statements(false).await?;
    assert_eq!(capture.statement_records(), 0);
    Ok(())
}
