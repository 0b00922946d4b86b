//! Fetched records in, insert/update statements out.
//!
//! A run reads the destination's key set once, splits the records against it,
//! applies the updates one statement at a time and then inserts all new rows
//! in a single statement. Nothing spans statements: if update N fails, updates
//! before it stay committed and the error is returned.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::SyncError;
use crate::reconcile::{reconcile, Partition, SyncRecord};
use crate::store::{Row, Store, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert new keys, update known ones.
    Upsert,
    /// Insert every record. No key read, no updates.
    Append,
}

/// A destination table. `columns[0]` is the key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub mode: WriteMode,
}

impl TableSpec {
    pub fn key_column(&self) -> Option<&'static str> {
        self.columns.first().copied()
    }
}

/// Turns a record into a row in its table's column order.
#[async_trait]
pub trait RowBuilder<R>: Send + Sync {
    async fn build_row(&self, record: &R) -> Result<Row, SyncError>;
}

/// A [`RowBuilder`] that only reads the record's own fields.
pub struct FieldMapper<R>(pub fn(&R) -> Row);

#[async_trait]
impl<R: Sync> RowBuilder<R> for FieldMapper<R> {
    async fn build_row(&self, record: &R) -> Result<Row, SyncError> {
        Ok((self.0)(record))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub table: &'static str,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
}

pub struct SyncPipeline<'a, S: ?Sized, B> {
    store: &'a S,
    spec: TableSpec,
    rows: B,
}

impl<'a, S, B> SyncPipeline<'a, S, B>
where
    S: Store + ?Sized,
{
    pub fn new(store: &'a S, spec: TableSpec, rows: B) -> Self {
        Self { store, spec, rows }
    }

    pub async fn run<R>(&self, records: Vec<R>) -> Result<SyncReport, SyncError>
    where
        R: SyncRecord,
        B: RowBuilder<R>,
    {
        let table = self.spec.table;
        let mut report = SyncReport {
            table,
            fetched: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            info!("No records for {}, nothing to write", table);
            return Ok(report);
        }
        let key_column = self.spec.key_column().ok_or_else(|| SyncError::Shape {
            table,
            reason: String::from("no columns"),
        })?;

        let partition = match self.spec.mode {
            WriteMode::Append => Partition {
                to_insert: records,
                to_update: Vec::new(),
            },
            WriteMode::Upsert => {
                let existing = self.store.existing_keys(table, key_column).await?;
                reconcile(records, &existing)
            }
        };
        info!(
            "{}: {} to insert, {} to update",
            table,
            partition.to_insert.len(),
            partition.to_update.len()
        );

        for record in &partition.to_update {
            let row = self.build(record).await?;
            self.store.update_row(table, self.spec.columns, row).await?;
            report.updated += 1;
        }

        if !partition.to_insert.is_empty() {
            let mut rows = Vec::with_capacity(partition.to_insert.len());
            for record in &partition.to_insert {
                rows.push(self.build(record).await?);
            }
            self.store.insert_rows(table, self.spec.columns, rows).await?;
            report.inserted = partition.to_insert.len();
        }

        info!("{:?}", report);
        Ok(report)
    }

    async fn build<R>(&self, record: &R) -> Result<Row, SyncError>
    where
        R: SyncRecord,
        B: RowBuilder<R>,
    {
        let row = self.rows.build_row(record).await?;
        if row.len() != self.spec.columns.len() {
            return Err(SyncError::Shape {
                table: self.spec.table,
                reason: format!("{} values for {} columns", row.len(), self.spec.columns.len()),
            });
        }
        if self.spec.mode == WriteMode::Upsert && row.first() != Some(&Value::from(record.key())) {
            return Err(SyncError::Shape {
                table: self.spec.table,
                reason: format!("first column does not hold key {}", record.key()),
            });
        }
        Ok(row)
    }
}
