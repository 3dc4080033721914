use async_trait::async_trait;
use serde::Deserialize;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::error::native_error;
use super::session::PgSession;
use crate::error::SqlPoolError;
use crate::session::{DriverError, ManageSession};

/// Connection parameters, as read from a config file or environment.
///
/// Every field is required; [`PgConnectParams::to_config`] reports the first one
/// missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PgConnectParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
}

impl PgConnectParams {
    /// Build the driver config.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` naming the first missing field.
    pub fn to_config(&self) -> Result<tokio_postgres::Config, SqlPoolError> {
        let dbname = required(self.dbname.as_ref(), "dbname")?;
        let host = required(self.host.as_ref(), "host")?;
        let port = required(self.port.as_ref(), "port")?;
        let user = required(self.user.as_ref(), "user")?;
        let password = required(self.password.as_ref(), "password")?;

        let mut config = tokio_postgres::Config::new();
        config
            .dbname(dbname)
            .host(host)
            .port(*port)
            .user(user)
            .password(password);
        Ok(config)
    }
}

fn required<'a, T>(value: Option<&'a T>, name: &str) -> Result<&'a T, SqlPoolError> {
    value.ok_or_else(|| SqlPoolError::ConfigError(format!("{name} is required")))
}

/// Opens Postgres sessions for the pools.
#[derive(Debug, Clone)]
pub struct PgManager {
    pub(crate) config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if a parameter is missing.
    pub fn from_params(params: &PgConnectParams) -> Result<Self, SqlPoolError> {
        Ok(Self::new(params.to_config()?))
    }
}

#[async_trait]
impl ManageSession for PgManager {
    type Session = PgSession;

    async fn connect(&self) -> Result<PgSession, DriverError> {
        debug!(
            hosts = ?self.config.get_hosts(),
            db = ?self.config.get_dbname(),
            user = ?self.config.get_user(),
            "postgres connect start"
        );
        let (client, connection) = self.config.connect(NoTls).await.map_err(native_error)?;
        debug!("postgres connect established");
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("postgres connection task ended: {e}");
            }
        });
        Ok(PgSession::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_is_reported() {
        let params = PgConnectParams {
            host: Some("localhost".into()),
            port: Some(5432),
            user: Some("app".into()),
            password: None,
            dbname: Some("app".into()),
        };
        let err = params.to_config().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: password is required");
    }

    #[test]
    fn params_deserialize_from_json() {
        let params: PgConnectParams = serde_json::from_str(
            r#"{"host":"db","port":5433,"user":"u","password":"p","dbname":"d"}"#,
        )
        .unwrap();
        let config = params.to_config().unwrap();
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_dbname(), Some("d"));
        assert_eq!(config.get_user(), Some("u"));
    }
}
