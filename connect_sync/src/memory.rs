//! In-memory [`Store`] and [`PageSource`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{DbError, SourceError};
use crate::fetch::{Page, PageSource};
use crate::store::{Row, Store, Value};

/// A store call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ExistingKeys(String),
    Insert { table: String, rows: usize },
    Update { table: String, key: String },
    Lookup { arn: String, arn_type: String },
    RowCount(String),
    LastUpdated(String),
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
    unique: bool,
    last_updated: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    names: HashMap<(String, String), String>,
    calls: Vec<Call>,
    fail_update_on: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

/// The error MySQL answers a primary key violation with.
fn duplicate_entry(key: &str) -> DbError {
    DbError::Mysql(mysql_async::Error::Server(mysql_async::ServerError {
        code: 1062,
        message: format!("Duplicate entry '{}' for key 'PRIMARY'", key),
        state: String::from("23000"),
    }))
}

fn key_of(row: &Row) -> String {
    match row.first() {
        Some(Value::Text(s)) => s.clone(),
        Some(other) => format!("{:?}", other),
        None => String::new(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Declare a table whose first column is a primary key.
    pub fn with_keyed_table(self, table: &str, columns: &[&str]) -> Self {
        self.define(table, columns, true);
        self
    }

    /// Declare a table without a primary key.
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.define(table, columns, false);
        self
    }

    fn define(&self, table: &str, columns: &[&str], unique: bool) {
        let mut state = self.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        entry.columns = columns.iter().map(|c| c.to_string()).collect();
        entry.unique = unique;
    }

    pub fn with_row(self, table: &str, row: Row) -> Self {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(row);
        self
    }

    pub fn with_name(self, arn: &str, arn_type: &str, name: &str) -> Self {
        self.lock()
            .names
            .insert((arn.to_string(), arn_type.to_string()), name.to_string());
        self
    }

    pub fn with_last_updated(self, table: &str, at: &str) -> Self {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .last_updated = Some(at.to_string());
        self
    }

    /// Make the update of `key` fail with a terminal error.
    pub fn failing_update_on(self, key: &str) -> Self {
        self.lock().fail_update_on = Some(key.to_string());
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, key: &str) -> Option<Row> {
        self.rows(table).into_iter().find(|r| key_of(r) == key)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn existing_keys(&self, table: &str, key_column: &str) -> Result<HashSet<String>, DbError> {
        let mut state = self.lock();
        state.calls.push(Call::ExistingKeys(table.to_string()));
        let Some(t) = state.tables.get(table) else {
            return Ok(HashSet::new());
        };
        let index = t.columns.iter().position(|c| c == key_column).unwrap_or(0);
        Ok(t.rows
            .iter()
            .filter_map(|r| match r.get(index) {
                Some(Value::Text(s)) => Some(s.clone()),
                _ => None,
            })
            .collect())
    }

    async fn insert_rows(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64, DbError> {
        let mut state = self.lock();
        state.calls.push(Call::Insert {
            table: table.to_string(),
            rows: rows.len(),
        });
        let t = state.tables.entry(table.to_string()).or_default();
        if t.columns.is_empty() {
            t.columns = columns.iter().map(|c| c.to_string()).collect();
        }
        if t.unique {
            let mut seen: HashSet<String> = t.rows.iter().map(key_of).collect();
            for row in &rows {
                if !seen.insert(key_of(row)) {
                    return Err(duplicate_entry(&key_of(row)));
                }
            }
        }
        let n = rows.len() as u64;
        t.rows.extend(rows);
        Ok(n)
    }

    async fn update_row(&self, table: &str, _columns: &[&str], row: Row) -> Result<u64, DbError> {
        let key = key_of(&row);
        let mut state = self.lock();
        state.calls.push(Call::Update {
            table: table.to_string(),
            key: key.clone(),
        });
        if state.fail_update_on.as_deref() == Some(key.as_str()) {
            return Err(DbError::Other(format!("update of {} rejected", key)));
        }
        let Some(t) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        let mut affected = 0;
        for existing in t.rows.iter_mut().filter(|r| key_of(r) == key) {
            *existing = row.clone();
            affected += 1;
        }
        Ok(affected)
    }

    async fn lookup_name(&self, _table: &str, arn: &str, arn_type: &str) -> Result<Option<String>, DbError> {
        let mut state = self.lock();
        state.calls.push(Call::Lookup {
            arn: arn.to_string(),
            arn_type: arn_type.to_string(),
        });
        Ok(state
            .names
            .get(&(arn.to_string(), arn_type.to_string()))
            .cloned())
    }

    async fn row_count(&self, table: &str) -> Result<u64, DbError> {
        let mut state = self.lock();
        state.calls.push(Call::RowCount(table.to_string()));
        Ok(state.tables.get(table).map(|t| t.rows.len() as u64).unwrap_or(0))
    }

    async fn last_updated(&self, table: &str) -> Result<Option<String>, DbError> {
        let mut state = self.lock();
        state.calls.push(Call::LastUpdated(table.to_string()));
        Ok(state.tables.get(table).and_then(|t| t.last_updated.clone()))
    }
}

/// Serves fixed items, `page_size` at a time. A non-empty filter keeps only
/// the items whose key is in it.
pub struct StaticSource<T> {
    operation: &'static str,
    items: Vec<T>,
    key: fn(&T) -> &str,
    page_size: usize,
    requests: Mutex<Vec<Vec<String>>>,
}

impl<T> StaticSource<T> {
    pub fn new(operation: &'static str, items: Vec<T>, key: fn(&T) -> &str) -> Self {
        Self {
            operation,
            items,
            key,
            page_size: 2,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The filter of every page request made so far.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PageSource for StaticSource<T> {
    type Item = T;

    fn operation(&self) -> &'static str {
        self.operation
    }

    async fn fetch_page(&self, filter: &[String], next_token: Option<String>) -> Result<Page<T>, SourceError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(filter.to_vec());
        let start = match next_token {
            Some(token) => token.parse::<usize>().map_err(|_| SourceError::InvalidResponse {
                operation: self.operation,
                reason: format!("bad token {}", token),
            })?,
            None => 0,
        };
        let matching: Vec<&T> = self
            .items
            .iter()
            .filter(|item| filter.is_empty() || filter.iter().any(|k| k == (self.key)(item)))
            .collect();
        let end = (start + self.page_size).min(matching.len());
        let items = matching[start.min(end)..end].iter().map(|item| (*item).clone()).collect();
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(Page { items, next_token })
    }
}
