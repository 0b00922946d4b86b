use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DbError;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub row_count: u64,
    pub last_updated: Option<String>,
}

pub async fn latest_info<S>(store: &S, table: &str) -> Result<TableInfo, DbError>
where
    S: Store + ?Sized,
{
    let row_count = store.row_count(table).await?;
    let last_updated = store.last_updated(table).await?;
    debug!("{} >> rowCount {} lastUpdated {:?}", table, row_count, last_updated);
    Ok(TableInfo {
        row_count,
        last_updated,
    })
}

/// `{table: {rowCount, lastUpdated}}` for every table.
pub async fn dataload_report<S>(store: &S, tables: &[&str]) -> Result<Map<String, Value>, DbError>
where
    S: Store + ?Sized,
{
    let mut report = Map::new();
    for table in tables {
        let info = latest_info(store, table).await?;
        let info = serde_json::to_value(info).map_err(|e| DbError::Other(e.to_string()))?;
        report.insert(table.to_string(), info);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::tables::{DATALOAD_TABLES, METADATA_TABLE};
    use serde_json::json;

    #[tokio::test]
    async fn reports_every_table() {
        let store = MemoryStore::new()
            .with_row(METADATA_TABLE, vec!["arn:1".into()])
            .with_row(METADATA_TABLE, vec!["arn:2".into()])
            .with_last_updated(METADATA_TABLE, "2024-03-01 10:05:00");

        let report = dataload_report(&store, &DATALOAD_TABLES).await.unwrap();

        assert_eq!(report.len(), 4);
        assert_eq!(
            report["connect_metadata"],
            json!({"rowCount": 2, "lastUpdated": "2024-03-01 10:05:00"})
        );
        assert_eq!(
            report["historical_metric_data"],
            json!({"rowCount": 0, "lastUpdated": null})
        );
    }
}
