use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_connect as connect;
use aws_sdk_connect::types::{Channel, CurrentMetric, CurrentMetricName, CurrentMetricResult, Filters, Grouping, Unit};
use connect_sync::tables::CURRENT_METRICS_TABLE;
use connect_sync::{
    ConnectMetadata, FieldMapper, Fetcher, Page, PageSource, Row, SourceError, Store, SyncError, SyncPipeline,
    SyncRecord, SyncReport, TableSpec, Value, WriteMode, MAX_FILTER_KEYS,
};
use tracing::info;

/// Requested metric, its unit and the column it lands in.
pub const METRICS: [(&str, &str, &str); 13] = [
    ("AGENTS_ONLINE", "COUNT", "agents_online"),
    ("AGENTS_AVAILABLE", "COUNT", "agents_available"),
    ("AGENTS_ON_CALL", "COUNT", "agents_on_call"),
    ("AGENTS_STAFFED", "COUNT", "agents_staffed"),
    ("AGENTS_AFTER_CONTACT_WORK", "COUNT", "agents_acw"),
    ("AGENTS_NON_PRODUCTIVE", "COUNT", "agents_npt"),
    ("AGENTS_ERROR", "COUNT", "agents_error"),
    ("AGENTS_ON_CONTACT", "COUNT", "agents_on_contact"),
    ("CONTACTS_IN_QUEUE", "COUNT", "in_queue"),
    // reported in milliseconds regardless of the unit
    ("OLDEST_CONTACT_AGE", "SECONDS", "oldest_contact"),
    ("CONTACTS_SCHEDULED", "COUNT", "scheduled"),
    ("SLOTS_ACTIVE", "COUNT", "slots_active"),
    ("SLOTS_AVAILABLE", "COUNT", "slots_available"),
];

pub const CURRENT_METRICS: TableSpec = TableSpec {
    table: CURRENT_METRICS_TABLE,
    columns: &[
        "queue_arn",
        "queue_name",
        "agents_online",
        "agents_available",
        "agents_on_call",
        "agents_staffed",
        "agents_acw",
        "agents_npt",
        "agents_error",
        "agents_on_contact",
        "in_queue",
        "oldest_contact",
        "scheduled",
        "slots_active",
        "slots_available",
    ],
    mode: WriteMode::Upsert,
};

/// Real-time metrics of one queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueMetrics {
    pub queue_arn: String,
    pub queue_name: String,
    /// Metric name to value. Metrics Connect left out are absent.
    pub values: HashMap<String, f64>,
}

impl SyncRecord for QueueMetrics {
    fn key(&self) -> &str {
        &self.queue_arn
    }
}

pub fn current_metrics_row(m: &QueueMetrics) -> Row {
    let mut row: Row = vec![m.queue_arn.as_str().into(), m.queue_name.as_str().into()];
    row.extend(METRICS.iter().map(|(name, _, _)| Value::from(m.values.get(*name).copied())));
    row
}

fn queue_metrics(result: &CurrentMetricResult) -> Result<QueueMetrics, SourceError> {
    let queue_arn = result
        .dimensions()
        .and_then(|d| d.queue())
        .and_then(|q| q.arn())
        .ok_or_else(|| SourceError::InvalidResponse {
            operation: "GetCurrentMetricData",
            reason: String::from("metric result without a queue arn"),
        })?;
    let values = result
        .collections()
        .iter()
        .filter_map(|data| {
            let name = data.metric()?.name()?;
            Some((name.as_str().to_string(), data.value()?))
        })
        .collect();
    Ok(QueueMetrics {
        queue_arn: queue_arn.to_string(),
        queue_name: String::new(),
        values,
    })
}

/// `GetCurrentMetricData` for the voice channel, grouped by queue. The filter
/// holds queue ARNs.
pub struct CurrentMetricsSource {
    client: connect::Client,
    instance_id: String,
}

impl CurrentMetricsSource {
    pub fn new(client: connect::Client, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }
}

#[async_trait]
impl PageSource for CurrentMetricsSource {
    type Item = QueueMetrics;

    fn operation(&self) -> &'static str {
        "GetCurrentMetricData"
    }

    async fn fetch_page(&self, filter: &[String], next_token: Option<String>) -> Result<Page<QueueMetrics>, SourceError> {
        let filters = Filters::builder()
            .set_queues(Some(filter.to_vec()))
            .channels(Channel::Voice)
            .build();
        let metrics = METRICS
            .iter()
            .map(|(name, unit, _)| {
                CurrentMetric::builder()
                    .name(CurrentMetricName::from(*name))
                    .unit(Unit::from(*unit))
                    .build()
            })
            .collect();
        let out = self
            .client
            .get_current_metric_data()
            .instance_id(&self.instance_id)
            .filters(filters)
            .groupings(Grouping::Queue)
            .set_current_metrics(Some(metrics))
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| SourceError::from_sdk(self.operation(), e))?;
        if out.metric_results().is_empty() {
            info!("No metric data available");
        }
        let items = out
            .metric_results()
            .iter()
            .map(queue_metrics)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }
}

/// List the queues, pull their metrics 100 queues at a time and upsert one
/// row per queue into `current_metric_data`.
pub async fn pull_current_metrics<Q, M, S>(
    fetcher: &Fetcher,
    queues: &Q,
    metrics: &M,
    store: &S,
) -> Result<SyncReport, SyncError>
where
    Q: PageSource<Item = ConnectMetadata>,
    M: PageSource<Item = QueueMetrics>,
    S: Store + ?Sized,
{
    let queues = fetcher.fetch_all(queues, &[]).await?;
    info!("Number of queues: {}", queues.len());
    let names: HashMap<&str, &str> = queues.iter().map(|q| (q.arn.as_str(), q.name.as_str())).collect();
    let arns: Vec<String> = queues.iter().map(|q| q.arn.clone()).collect();

    let mut records = fetcher.fetch_chunked(metrics, &arns, MAX_FILTER_KEYS).await?;
    for record in &mut records {
        if let Some(name) = names.get(record.queue_arn.as_str()) {
            record.queue_name = name.to_string();
        }
    }

    SyncPipeline::new(store, CURRENT_METRICS, FieldMapper(current_metrics_row))
        .run(records)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_metric_has_a_column() {
        let metric_columns: Vec<&str> = METRICS.iter().map(|(_, _, column)| *column).collect();
        assert_eq!(&CURRENT_METRICS.columns[2..], metric_columns.as_slice());
    }

    #[test]
    fn missing_metrics_are_null() {
        let record = QueueMetrics {
            queue_arn: String::from("arn:q1"),
            queue_name: String::from("Support"),
            values: HashMap::from([(String::from("AGENTS_ONLINE"), 4.0), (String::from("SLOTS_AVAILABLE"), 2.0)]),
        };
        let row = current_metrics_row(&record);
        assert_eq!(row.len(), CURRENT_METRICS.columns.len());
        assert_eq!(row[0], Value::from("arn:q1"));
        assert_eq!(row[2], Value::Float(4.0));
        assert_eq!(row[3], Value::Null);
        assert_eq!(row[14], Value::Float(2.0));
    }
}
