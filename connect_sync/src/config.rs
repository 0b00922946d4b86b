use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

const AURORA_PROXY_ENDPOINT: &str = "AURORA_PROXY_ENDPOINT";
const AURORA_USER_NAME: &str = "AURORA_USER_NAME";
const AURORA_MYSQL_PORT: &str = "AURORA_MYSQL_PORT";
const AURORA_DB_NAME: &str = "AURORA_DB_NAME";
const REGION: &str = "REGION";
const CONNECT_INSTANCE_ID: &str = "CONNECT_INSTANCE_ID";
const REPORTING_INTERVAL_IN_MINUTES: &str = "REPORTING_INTERVAL_IN_MINUTES";

const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_REPORTING_INTERVAL_MINUTES: u64 = 30;

/// Where the Aurora proxy lives and who to sign in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub endpoint: String,
    pub user: String,
    pub port: u16,
    pub database: String,
    /// Region the auth token is signed for. `None` uses the SDK region chain.
    pub region: Option<String>,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: required(AURORA_PROXY_ENDPOINT)?,
            user: required(AURORA_USER_NAME)?,
            port: parsed_or(AURORA_MYSQL_PORT, DEFAULT_MYSQL_PORT)?,
            database: required(AURORA_DB_NAME)?,
            region: env::var(REGION).ok(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub instance_id: String,
    pub reporting_interval_minutes: u64,
}

impl SourceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            instance_id: required(CONNECT_INSTANCE_ID)?,
            reporting_interval_minutes: parsed_or(
                REPORTING_INTERVAL_IN_MINUTES,
                DEFAULT_REPORTING_INTERVAL_MINUTES,
            )?,
        })
    }
}

pub fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
