//! Single-use MySQL connections to the Aurora proxy, authenticated with a
//! short lived IAM token.
//!
//! Every statement gets its own connection which is closed right after the
//! statement runs. There is no pool and no transaction spanning statements.

use std::fmt;
use std::future::Future;

use aws_config::{Region, SdkConfig};
use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config as TokenConfig};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Params, SslOpts};
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::error::{DbError, Retryable};
use crate::retry::RetryPolicy;

pub struct ConnectionManager {
    config: DbConfig,
    sdk_config: SdkConfig,
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(config: DbConfig, sdk_config: SdkConfig) -> Self {
        Self {
            config,
            sdk_config,
            policy: RetryPolicy::database(),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    async fn auth_token(&self) -> Result<String, DbError> {
        let token_error = |reason: String| DbError::Token {
            endpoint: self.config.endpoint.clone(),
            reason,
        };
        let mut builder = TokenConfig::builder()
            .hostname(self.config.endpoint.clone())
            .port(u64::from(self.config.port))
            .username(self.config.user.clone());
        if let Some(region) = &self.config.region {
            builder = builder.region(Region::new(region.clone()));
        }
        let token_config = builder.build().map_err(|e| token_error(e.to_string()))?;
        let token = AuthTokenGenerator::new(token_config)
            .auth_token(&self.sdk_config)
            .await
            .map_err(|e| token_error(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    fn opts(&self, token: String, database: Option<&str>) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.config.endpoint.clone())
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(Some(token))
            .db_name(database.map(str::to_string))
            // IAM tokens are sent as a cleartext password, only ever over TLS.
            .enable_cleartext_plugin(true)
            .ssl_opts(SslOpts::default())
    }

    /// Open a connection to the configured database.
    pub async fn acquire(&self) -> Result<Conn, DbError> {
        self.acquire_for(Some(self.config.database.as_str())).await
    }

    /// Open a connection, optionally without selecting a database.
    pub async fn acquire_for(&self, database: Option<&str>) -> Result<Conn, DbError> {
        self.policy
            .run("acquire connection", || async move {
                info!("Connecting to aurora endpoint {}...", self.config.endpoint);
                let token = self.auth_token().await?;
                debug!("Obtained auth token");
                let conn = Conn::new(self.opts(token, database)).await?;
                info!("Connected to aurora endpoint");
                Ok::<_, DbError>(conn)
            })
            .await
    }

    /// Run `statement` on a fresh connection per attempt. Only statement
    /// failures are retried here; a failed acquire is returned as is.
    async fn with_conn<T, F, Fut>(
        &self,
        operation: &str,
        database: Option<&str>,
        statement: F,
    ) -> Result<T, DbError>
    where
        F: Fn(Conn) -> Fut,
        Fut: Future<Output = (Conn, Result<T, mysql_async::Error>)>,
    {
        let statement = &statement;
        self.policy
            .run(operation, || async move {
                let conn = self.acquire_for(database).await.map_err(Attempt::Acquire)?;
                let (conn, result) = statement(conn).await;
                close(conn).await;
                result.map_err(|e| Attempt::Statement(e.into()))
            })
            .await
            .map_err(DbError::from)
    }

    /// Run one statement and return the number of affected rows.
    pub async fn exec_drop(&self, sql: &str, params: Params) -> Result<u64, DbError> {
        debug!("execute >> {}", sql);
        self.with_conn("execute", Some(self.config.database.as_str()), |mut conn| {
            let params = params.clone();
            async move {
                let result = conn.exec_drop(sql, params).await;
                let result = result.map(|()| conn.affected_rows());
                (conn, result)
            }
        })
        .await
    }

    /// Run one text-protocol statement and return the number of affected rows.
    pub async fn query_drop(&self, sql: &str) -> Result<u64, DbError> {
        debug!("query >> {} bytes", sql.len());
        self.with_conn("query", Some(self.config.database.as_str()), |mut conn| async move {
            let result = conn.query_drop(sql).await;
            let result = result.map(|()| conn.affected_rows());
            (conn, result)
        })
        .await
    }

    pub async fn exec_rows<T>(&self, sql: &str, params: Params) -> Result<Vec<T>, DbError>
    where
        T: FromRow + Send + 'static,
    {
        debug!("query >> {}", sql);
        self.with_conn("query", Some(self.config.database.as_str()), |mut conn| {
            let params = params.clone();
            async move {
                let result = conn.exec::<T, _, _>(sql, params).await;
                (conn, result)
            }
        })
        .await
    }

    pub async fn exec_first<T>(&self, sql: &str, params: Params) -> Result<Option<T>, DbError>
    where
        T: FromRow + Send + 'static,
    {
        debug!("query first >> {}", sql);
        self.with_conn("query", Some(self.config.database.as_str()), |mut conn| {
            let params = params.clone();
            async move {
                let result = conn.exec_first::<T, _, _>(sql, params).await;
                (conn, result)
            }
        })
        .await
    }

    /// Run a text-protocol script, which may hold several statements.
    pub async fn run_script(&self, database: Option<&str>, script: &str) -> Result<(), DbError> {
        debug!("script >> {}", script);
        self.with_conn("run script", database, |mut conn| async move {
            let result = conn.query_drop(script).await;
            (conn, result)
        })
        .await
    }
}

/// Outcome of one statement attempt.
enum Attempt {
    /// The connection could not be opened even after its own retries.
    Acquire(DbError),
    Statement(DbError),
}

impl Retryable for Attempt {
    fn is_retryable(&self) -> bool {
        match self {
            Attempt::Acquire(_) => false,
            Attempt::Statement(e) => e.is_retryable(),
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Acquire(e) => write!(f, "connection failed: {}", e),
            Attempt::Statement(e) => write!(f, "{}", e),
        }
    }
}

impl From<Attempt> for DbError {
    fn from(attempt: Attempt) -> Self {
        match attempt {
            Attempt::Acquire(e) | Attempt::Statement(e) => e,
        }
    }
}

async fn close(conn: Conn) {
    if let Err(e) = conn.disconnect().await {
        warn!("failed to close connection cleanly: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::SharedCredentialsProvider;
    use aws_credential_types::Credentials;
    use std::time::Duration;
    use tokio::time::Instant;

    // Nothing listens on port 1, so every connect is refused at once.
    fn unreachable() -> ConnectionManager {
        let config = DbConfig {
            endpoint: "127.0.0.1".to_string(),
            user: "reporter".to_string(),
            port: 1,
            database: "connect".to_string(),
            region: Some("us-east-1".to_string()),
        };
        let sdk_config = SdkConfig::builder()
            .region(Region::new("us-east-1"))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                "AKIDEXAMPLE",
                "secret",
                None,
                None,
                "test",
            )))
            .build();
        ConnectionManager::new(config, sdk_config)
    }

    fn is_io(err: &DbError) -> bool {
        matches!(err, DbError::Mysql(mysql_async::Error::Io(_)))
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_gives_up_after_capped_backoff() {
        let db = unreachable();
        let started = Instant::now();

        let err = db.acquire().await.unwrap_err();

        assert!(is_io(&err), "unexpected error: {}", err);
        // 5s * 2^1 + 5s * 2^2 + 5s * 2^3
        assert_eq!(started.elapsed(), Duration::from_secs(70));
    }

    #[tokio::test(start_paused = true)]
    async fn statement_does_not_retry_a_failed_acquire() {
        let db = unreachable();

        let started = Instant::now();
        let err = db.exec_drop("SELECT 1", Params::Empty).await.unwrap_err();
        assert!(is_io(&err), "unexpected error: {}", err);
        assert_eq!(started.elapsed(), Duration::from_secs(70));

        let started = Instant::now();
        let err = db.query_drop("SELECT 1").await.unwrap_err();
        assert!(is_io(&err), "unexpected error: {}", err);
        assert_eq!(started.elapsed(), Duration::from_secs(70));

        let started = Instant::now();
        let err = db.run_script(None, "SELECT 1").await.unwrap_err();
        assert!(is_io(&err), "unexpected error: {}", err);
        assert_eq!(started.elapsed(), Duration::from_secs(70));
    }

    #[test]
    fn only_statement_failures_are_retried() {
        let transient = || {
            DbError::Mysql(mysql_async::Error::Server(mysql_async::ServerError {
                code: 1213,
                message: "Deadlock found".to_string(),
                state: "40001".to_string(),
            }))
        };
        assert!(Attempt::Statement(transient()).is_retryable());
        assert!(!Attempt::Acquire(transient()).is_retryable());
        assert!(matches!(DbError::from(Attempt::Acquire(transient())), DbError::Mysql(_)));
    }
}
