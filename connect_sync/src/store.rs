use std::collections::HashSet;

use async_trait::async_trait;
use mysql_async::Params;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::ConnectionManager;
use crate::error::DbError;

/// A column value, independent of the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Value> for mysql_async::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => mysql_async::Value::NULL,
            Value::Int(n) => mysql_async::Value::from(n),
            Value::Float(n) => mysql_async::Value::from(n),
            Value::Text(s) => mysql_async::Value::from(s),
        }
    }
}

/// One row, in the column order of its table. The first column is the key.
pub type Row = Vec<Value>;

/// The destination tables as the pipeline sees them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Snapshot of the keys currently in `table`.
    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>, DbError>;

    /// Insert all rows with a single statement.
    async fn insert_rows(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64, DbError>;

    /// Update the row whose first column matches `row[0]`.
    async fn update_row(&self, table: &str, columns: &[&str], row: Row) -> Result<u64, DbError>;

    /// Display name of a metadata entry.
    async fn lookup_name(&self, table: &str, arn: &str, arn_type: &str) -> Result<Option<String>, DbError>;

    async fn row_count(&self, table: &str) -> Result<u64, DbError>;

    async fn last_updated(&self, table: &str) -> Result<Option<String>, DbError>;
}

/// Multi-row insert with the values rendered as escaped literals. Sent over
/// the text protocol, so the size is bounded by `max_allowed_packet` and not
/// by the 65,535 placeholders of a prepared statement.
pub fn insert_sql(table: &str, columns: &[&str], rows: &[Row]) -> String {
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(literal).collect();
            format!("({})", values.join(","))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(","),
        tuples.join(",")
    )
}

fn literal(value: &Value) -> String {
    mysql_async::Value::from(value.clone()).as_sql(false)
}

pub fn update_sql(table: &str, columns: &[&str]) -> Option<String> {
    let (key, rest) = columns.split_first()?;
    let assignments: Vec<String> = rest.iter().map(|c| format!("{} = ?", c)).collect();
    Some(format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        key
    ))
}

/// Moves the key to the end to match the `WHERE` placeholder of [`update_sql`].
pub fn update_params(mut row: Row) -> Row {
    if !row.is_empty() {
        row.rotate_left(1);
    }
    row
}

fn positional(values: Row) -> Params {
    if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

/// [`Store`] backed by Aurora MySQL.
pub struct MySqlStore {
    db: ConnectionManager,
}

impl MySqlStore {
    pub fn new(db: ConnectionManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>, DbError> {
        info!("Get list of {} from {}...", key_column, table);
        let sql = format!("SELECT {} FROM {}", key_column, table);
        let keys: Vec<Option<String>> = self.db.exec_rows(&sql, Params::Empty).await?;
        let keys: HashSet<String> = keys.into_iter().flatten().collect();
        debug!("{} keys in {}", keys.len(), table);
        Ok(keys)
    }

    async fn insert_rows(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }
        info!("Batch insert of {} rows into {}", rows.len(), table);
        self.db.query_drop(&insert_sql(table, columns, &rows)).await
    }

    async fn update_row(&self, table: &str, columns: &[&str], row: Row) -> Result<u64, DbError> {
        let sql = update_sql(table, columns)
            .ok_or_else(|| DbError::Other(format!("no columns given for {}", table)))?;
        self.db.exec_drop(&sql, positional(update_params(row))).await
    }

    async fn lookup_name(&self, table: &str, arn: &str, arn_type: &str) -> Result<Option<String>, DbError> {
        let sql = format!("SELECT name FROM {} WHERE arn = ? AND arn_type = ?", table);
        let name: Option<Option<String>> = self
            .db
            .exec_first(&sql, positional(vec![arn.into(), arn_type.into()]))
            .await?;
        Ok(name.flatten())
    }

    async fn row_count(&self, table: &str) -> Result<u64, DbError> {
        let sql = format!("SELECT COUNT(*) AS row_count FROM {}", table);
        let count: Option<u64> = self.db.exec_first(&sql, Params::Empty).await?;
        Ok(count.unwrap_or(0))
    }

    async fn last_updated(&self, table: &str) -> Result<Option<String>, DbError> {
        let sql = format!(
            "SELECT CAST(MAX(last_updated_at) AS CHAR) AS last_updated FROM {}",
            table
        );
        let last: Option<Option<String>> = self.db.exec_first(&sql, Params::Empty).await?;
        Ok(last.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: [&str; 3] = ["arn", "name", "arn_type"];

    #[test]
    fn insert_is_one_statement_for_all_rows() {
        let rows = vec![
            vec!["arn:q1".into(), "O'Brien".into(), "queue".into()],
            vec!["arn:q2".into(), Value::Null, Value::Int(7)],
        ];
        assert_eq!(
            insert_sql("connect_metadata", &COLUMNS, &rows),
            "INSERT INTO connect_metadata (arn,name,arn_type) VALUES \
             ('arn:q1','O\\'Brien','queue'),('arn:q2',NULL,7)"
        );
    }

    #[test]
    fn insert_has_no_placeholder_limit() {
        // one row past what a prepared statement could bind
        let count = 65_535 / COLUMNS.len() + 1;
        let rows: Vec<Row> = (0..count)
            .map(|i| vec![format!("arn:{}", i).into(), "name?".into(), "user".into()])
            .collect();

        let sql = insert_sql("connect_metadata", &COLUMNS, &rows);

        assert_eq!(count * COLUMNS.len(), 65_538);
        assert_eq!(sql.matches("'user')").count(), count);
        assert_eq!(sql.matches(",?").count() + sql.matches("(?").count(), 0);
        assert!(sql.ends_with(&format!("('arn:{}','name?','user')", count - 1)));
    }

    #[test]
    fn update_is_keyed_by_first_column() {
        assert_eq!(
            update_sql("connect_metadata", &COLUMNS).unwrap(),
            "UPDATE connect_metadata SET name = ?, arn_type = ? WHERE arn = ?"
        );
        assert_eq!(update_sql("connect_metadata", &[]), None);

        let params = update_params(vec!["arn:q1".into(), "Support".into(), "queue".into()]);
        assert_eq!(
            params,
            vec![Value::from("Support"), Value::from("queue"), Value::from("arn:q1")]
        );
    }

    #[test]
    fn optional_values_become_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
        assert_eq!(mysql_async::Value::from(Value::Null), mysql_async::Value::NULL);
    }
}
