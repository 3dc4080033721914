use pg_pool_middleware::prelude::*;
use pg_pool_middleware::test_utils::mock::{MockBackend, MockManager};

fn pool(backend: &MockBackend, max_conn: usize) -> LockedPool<MockManager> {
    LockedPool::new(backend.manager(), PoolConfig::new().max_conn(max_conn)).unwrap()
}

#[tokio::test(flavor = "current_thread")]
async fn acquire_release_reuses_physical_connection() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 2);

    let mut conn = pool.acquire().await?;
    let first_id = conn.id();
    conn.execute("insert into t values ($1)", &[RowValues::Int(1)]).await?;
    pool.release(conn);
    assert_eq!(pool.idle_len(), 1);

    let conn = pool.acquire().await?;
    assert_eq!(conn.id(), first_id);
    assert_eq!(backend.connects(), 1);
    pool.release(conn);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn fails_fast_at_capacity() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 2);

    let a = pool.acquire().await?;
    let b = pool.acquire().await?;
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, SqlPoolError::MaxConnectionsReached { max: 2 }));

    pool.release(a);
    let c = pool.acquire().await?;
    assert_eq!(backend.connects(), 2);

    let status = pool.status();
    assert_eq!(status.in_use, 2);
    assert_eq!(status.idle, 0);
    pool.release(b);
    pool.release(c);
    assert_eq!(pool.status().idle, 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn idle_connections_are_handed_out_lifo() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 2);

    let a = pool.acquire().await?;
    let b = pool.acquire().await?;
    let (a_id, b_id) = (a.id(), b.id());
    pool.release(a);
    pool.release(b);

    assert_eq!(pool.acquire().await?.id(), b_id);
    assert_eq!(pool.acquire().await?.id(), a_id);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn connection_error_discards_connection() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 1);

    let mut conn = pool.acquire().await?;
    let old_session = conn.session().id();
    backend.fail_next(NativeError::with_sqlstate("08006", "connection failure"));
    let err = conn.execute("select 1", &[]).await.unwrap_err();
    assert!(err.connection_error());
    assert!(conn.is_invalid());
    pool.release(conn);

    assert_eq!(pool.idle_len(), 0);
    assert!(backend.is_closed(old_session));

    let conn = pool.acquire().await?;
    assert_ne!(conn.session().id(), old_session);
    assert_eq!(backend.connects(), 2);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn ordinary_error_keeps_connection() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 1);

    let mut conn = pool.acquire().await?;
    let id = conn.id();
    backend.fail_next(NativeError::with_sqlstate("23505", "duplicate key"));
    let err = conn.execute("insert into t values (1)", &[]).await.unwrap_err();
    assert!(err.unique_error());
    assert!(!err.connection_error());
    pool.release(conn);

    assert_eq!(pool.acquire().await?.id(), id);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn release_inside_transaction_closes() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 1);

    let mut conn = pool.acquire().await?;
    conn.begin().await?;
    conn.execute("insert into t values (1)", &[]).await?;
    let session = conn.session().id();
    pool.release(conn);

    assert_eq!(pool.idle_len(), 0);
    assert!(backend.is_closed(session));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn failed_connect_frees_the_slot() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 1);

    backend.fail_connect(NativeError::new(
        NativeErrorClass::Operational,
        "could not connect to server",
    ));
    let err = pool.acquire().await.unwrap_err();
    assert_eq!(
        err.taxonomy().map(TaxonomyError::kind),
        Some(ErrorKind::Operational)
    );
    assert_eq!(pool.status().creating, 0);

    let conn = pool.acquire().await?;
    pool.release(conn);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn destroy_is_idempotent_and_closes_idle() -> Result<(), SqlPoolError> {
    let backend = MockBackend::new();
    let pool = pool(&backend, 2);

    let a = pool.acquire().await?;
    let b = pool.acquire().await?;
    pool.release(a);

    pool.destroy().await;
    pool.destroy().await;
    assert!(pool.status().closed);
    assert_eq!(backend.open_sessions(), 1);
    assert!(matches!(pool.acquire().await, Err(SqlPoolError::PoolClosed)));

    // Released after destroy: closed, not recycled.
    pool.release(b);
    assert_eq!(backend.open_sessions(), 0);
    assert_eq!(pool.idle_len(), 0);
    Ok(())
}

#[test]
fn rejects_zero_capacity() {
    let backend = MockBackend::new();
    let err = LockedPool::new(backend.manager(), PoolConfig::new().max_conn(0)).unwrap_err();
    assert!(matches!(err, SqlPoolError::ConfigError(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn release_racing_destroy_leaves_nothing_open() -> Result<(), SqlPoolError> {
    for _ in 0..50 {
        let backend = MockBackend::new();
        let pool = LockedPool::new(backend.manager(), PoolConfig::new().max_conn(4))?;
        let mut conns = Vec::new();
        for _ in 0..4 {
            conns.push(pool.acquire().await?);
        }

        let mut releasers = tokio::task::JoinSet::new();
        for conn in conns {
            let pool = pool.clone();
            releasers.spawn(async move { pool.release(conn) });
        }
        pool.destroy().await;
        while let Some(joined) = releasers.join_next().await {
            joined.expect("release task panicked");
        }

        assert_eq!(pool.status().idle, 0);
        assert_eq!(backend.open_sessions(), 0);
    }
    Ok(())
}
