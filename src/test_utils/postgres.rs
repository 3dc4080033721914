use postgresql_embedded::PostgreSQL;
use tracing::info;

use crate::connection::Connection;
use crate::postgres::{PgConnectParams, PgManager};
use crate::session::ManageSession;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Parameters that reach the instance with working credentials
    pub params: PgConnectParams,
}

impl EmbeddedPostgres {
    /// A manager connected to the embedded instance.
    ///
    /// # Errors
    /// Returns an error if the parameters are incomplete.
    pub fn manager(&self) -> Result<PgManager, crate::error::SqlPoolError> {
        PgManager::from_params(&self.params)
    }
}

/// Set up an embedded `PostgreSQL` instance and create `dbname` in it.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, or if the
/// database cannot be created or reached afterwards.
pub async fn setup_postgres_embedded(
    dbname: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(dbname).await?;

    let settings = postgresql.settings();
    let port = settings.port;
    let params = PgConnectParams {
        host: Some(settings.host.clone()),
        port: Some(port),
        user: Some(settings.username.clone()),
        password: Some(settings.password.clone()),
        dbname: Some(dbname.to_string()),
    };
    let database_url = format!(
        "postgres://{}:{}@{}:{port}/{dbname}",
        settings.username, settings.password, settings.host
    );

    // Quick connection test
    let session = PgManager::from_params(&params)?.connect().await?;
    let mut conn = Connection::new(session);
    conn.execute("SELECT 1", &[]).await?;
    conn.close();
    info!(port, "embedded postgres started");

    Ok(EmbeddedPostgres {
        postgresql,
        port,
        database_url,
        params,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    let _ = postgresql.stop().await;
}
