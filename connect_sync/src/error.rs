use std::fmt::Debug;

use aws_sdk_connect::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Errors that may clear up on their own and are safe to try again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to generate auth token for {endpoint}: {reason}")]
    Token { endpoint: String, reason: String },

    #[error("mysql error: {0}")]
    Mysql(#[from] mysql_async::Error),

    #[error("{0}")]
    Other(String),
}

// too many connections, lock wait timeout, deadlock
const TRANSIENT_SERVER_CODES: [u16; 3] = [1040, 1205, 1213];

impl Retryable for DbError {
    fn is_retryable(&self) -> bool {
        match self {
            DbError::Mysql(mysql_async::Error::Io(_)) => true,
            DbError::Mysql(mysql_async::Error::Server(e)) => TRANSIENT_SERVER_CODES.contains(&e.code),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        retryable: bool,
        message: String,
    },

    #[error("{operation} returned an unusable response: {reason}")]
    InvalidResponse { operation: &'static str, reason: String },
}

impl SourceError {
    /// Classify an SDK failure. Transport problems and throttling are transient,
    /// everything the service rejected outright is not.
    pub fn from_sdk<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: Debug,
    {
        let retryable = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
            SdkError::ServiceError(_) => matches!(
                err.code(),
                Some("ThrottlingException" | "TooManyRequestsException" | "InternalServiceException")
            ),
            _ => false,
        };
        SourceError::Remote {
            operation,
            retryable,
            message: DisplayErrorContext(&err).to_string(),
        }
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Remote { retryable: true, .. })
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("record does not match table {table}: {reason}")]
    Shape { table: &'static str, reason: String },
}
