use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_connect as connect;
use aws_sdk_connect::primitives::DateTime;
use aws_sdk_connect::types::{
    Channel, Filters, Grouping, HistoricalMetric, HistoricalMetricName, HistoricalMetricResult, Statistic, Unit,
};
use connect_sync::tables::HISTORICAL_METRICS_TABLE;
use connect_sync::{
    ConnectMetadata, FieldMapper, Fetcher, Page, PageSource, Row, SourceError, Store, SyncError, SyncPipeline,
    SyncRecord, SyncReport, TableSpec, Value, WriteMode, MAX_FILTER_KEYS,
};
use tracing::info;

/// Requested metric, unit, statistic and the column it lands in.
pub const METRICS: [(&str, &str, &str, &str); 24] = [
    ("ABANDON_TIME", "SECONDS", "AVG", "abandon_time"),
    ("AFTER_CONTACT_WORK_TIME", "SECONDS", "AVG", "after_contact_work_time"),
    ("API_CONTACTS_HANDLED", "COUNT", "SUM", "api_contacts_handled"),
    ("CALLBACK_CONTACTS_HANDLED", "COUNT", "SUM", "callback_contacts_handled"),
    ("CONTACTS_ABANDONED", "COUNT", "SUM", "contacts_abandoned"),
    ("CONTACTS_AGENT_HUNG_UP_FIRST", "COUNT", "SUM", "contacts_agent_hung_up_first"),
    ("CONTACTS_CONSULTED", "COUNT", "SUM", "contacts_consulted"),
    ("CONTACTS_HANDLED", "COUNT", "SUM", "contacts_handled"),
    ("CONTACTS_HANDLED_INCOMING", "COUNT", "SUM", "contacts_handled_incoming"),
    ("CONTACTS_HANDLED_OUTBOUND", "COUNT", "SUM", "contacts_handled_outbound"),
    ("CONTACTS_HOLD_ABANDONS", "COUNT", "SUM", "contacts_hold_abandons"),
    ("CONTACTS_MISSED", "COUNT", "SUM", "contacts_missed"),
    ("CONTACTS_QUEUED", "COUNT", "SUM", "contacts_queued"),
    ("CONTACTS_TRANSFERRED_IN", "COUNT", "SUM", "contacts_transferred_in"),
    ("CONTACTS_TRANSFERRED_IN_FROM_QUEUE", "COUNT", "SUM", "contacts_transferred_in_from_queue"),
    ("CONTACTS_TRANSFERRED_OUT", "COUNT", "SUM", "contacts_transferred_out"),
    ("CONTACTS_TRANSFERRED_OUT_FROM_QUEUE", "COUNT", "SUM", "contacts_transferred_out_from_queue"),
    ("HANDLE_TIME", "SECONDS", "AVG", "handle_time"),
    ("HOLD_TIME", "SECONDS", "AVG", "hold_time"),
    ("INTERACTION_AND_HOLD_TIME", "SECONDS", "AVG", "interaction_and_hold_time"),
    ("INTERACTION_TIME", "SECONDS", "AVG", "interaction_time"),
    ("OCCUPANCY", "PERCENT", "AVG", "occupancy"),
    ("QUEUE_ANSWER_TIME", "SECONDS", "AVG", "queue_answer_time"),
    ("QUEUED_TIME", "SECONDS", "MAX", "queued_time"),
];

pub const HISTORICAL_METRICS: TableSpec = TableSpec {
    table: HISTORICAL_METRICS_TABLE,
    columns: &[
        "queue_arn",
        "queue_name",
        "start_time",
        "end_time",
        "abandon_time",
        "after_contact_work_time",
        "api_contacts_handled",
        "callback_contacts_handled",
        "contacts_abandoned",
        "contacts_agent_hung_up_first",
        "contacts_consulted",
        "contacts_handled",
        "contacts_handled_incoming",
        "contacts_handled_outbound",
        "contacts_hold_abandons",
        "contacts_missed",
        "contacts_queued",
        "contacts_transferred_in",
        "contacts_transferred_in_from_queue",
        "contacts_transferred_out",
        "contacts_transferred_out_from_queue",
        "handle_time",
        "hold_time",
        "interaction_and_hold_time",
        "interaction_time",
        "occupancy",
        "queue_answer_time",
        "queued_time",
    ],
    mode: WriteMode::Append,
};

const FIVE_MINUTES_MILLIS: i64 = 5 * 60 * 1000;

/// Reporting interval in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// Ends at the last five minute boundary at or before `now_millis` and
    /// reaches `interval_minutes` back from there.
    pub fn ending_at(now_millis: i64, interval_minutes: u64) -> Self {
        let end = now_millis - now_millis.rem_euclid(FIVE_MINUTES_MILLIS);
        let interval = i64::try_from(interval_minutes)
            .unwrap_or(i64::MAX)
            .saturating_mul(60_000);
        Window {
            start: end.saturating_sub(interval),
            end,
        }
    }

    pub fn now(interval_minutes: u64) -> Self {
        Self::ending_at(chrono::Utc::now().timestamp_millis(), interval_minutes)
    }
}

/// Interval metrics of one queue.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalMetrics {
    pub queue_arn: String,
    pub queue_name: String,
    pub window: Window,
    pub values: HashMap<String, f64>,
}

impl SyncRecord for IntervalMetrics {
    fn key(&self) -> &str {
        &self.queue_arn
    }
}

pub fn historical_metrics_row(m: &IntervalMetrics) -> Row {
    let mut row: Row = vec![
        m.queue_arn.as_str().into(),
        m.queue_name.as_str().into(),
        m.window.start.into(),
        m.window.end.into(),
    ];
    row.extend(METRICS.iter().map(|(name, ..)| Value::from(m.values.get(*name).copied())));
    row
}

fn interval_metrics(result: &HistoricalMetricResult, window: Window) -> Result<IntervalMetrics, SourceError> {
    let queue_arn = result
        .dimensions()
        .and_then(|d| d.queue())
        .and_then(|q| q.arn())
        .ok_or_else(|| SourceError::InvalidResponse {
            operation: "GetMetricData",
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
    Ok(IntervalMetrics {
        queue_arn: queue_arn.to_string(),
        queue_name: String::new(),
        window,
        values,
    })
}

/// `GetMetricData` over one window for the voice channel, grouped by queue.
pub struct HistoricalMetricsSource {
    client: connect::Client,
    instance_id: String,
    window: Window,
}

impl HistoricalMetricsSource {
    pub fn new(client: connect::Client, instance_id: impl Into<String>, window: Window) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
            window,
        }
    }
}

#[async_trait]
impl PageSource for HistoricalMetricsSource {
    type Item = IntervalMetrics;

    fn operation(&self) -> &'static str {
        "GetMetricData"
    }

    async fn fetch_page(
        &self,
        filter: &[String],
        next_token: Option<String>,
    ) -> Result<Page<IntervalMetrics>, SourceError> {
        let filters = Filters::builder()
            .set_queues(Some(filter.to_vec()))
            .channels(Channel::Voice)
            .build();
        let metrics = METRICS
            .iter()
            .map(|(name, unit, statistic, _)| {
                HistoricalMetric::builder()
                    .name(HistoricalMetricName::from(*name))
                    .unit(Unit::from(*unit))
                    .statistic(Statistic::from(*statistic))
                    .build()
            })
            .collect();
        let out = self
            .client
            .get_metric_data()
            .instance_id(&self.instance_id)
            .start_time(DateTime::from_millis(self.window.start))
            .end_time(DateTime::from_millis(self.window.end))
            .filters(filters)
            .groupings(Grouping::Queue)
            .set_historical_metrics(Some(metrics))
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
            .map(|result| interval_metrics(result, self.window))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }
}

/// List the queues, pull one window of their metrics and append a row per
/// queue to `historical_metric_data`.
pub async fn pull_historical_metrics<Q, M, S>(
    fetcher: &Fetcher,
    queues: &Q,
    metrics: &M,
    store: &S,
) -> Result<SyncReport, SyncError>
where
    Q: PageSource<Item = ConnectMetadata>,
    M: PageSource<Item = IntervalMetrics>,
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

    SyncPipeline::new(store, HISTORICAL_METRICS, FieldMapper(historical_metrics_row))
        .run(records)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01T10:17:42.512Z
    const NOW: i64 = 1_709_288_262_512;
    // 2024-03-01T10:15:00Z
    const BOUNDARY: i64 = 1_709_288_100_000;

    #[test]
    fn window_ends_on_five_minute_boundary() {
        let window = Window::ending_at(NOW, 30);
        assert_eq!(window.end, BOUNDARY);
        assert_eq!(window.start, BOUNDARY - 30 * 60 * 1000);
    }

    #[test]
    fn window_on_a_boundary_keeps_it() {
        let window = Window::ending_at(BOUNDARY, 15);
        assert_eq!(window.end, BOUNDARY);
        assert_eq!(window.end - window.start, 15 * 60 * 1000);
    }

    #[test]
    fn every_metric_has_a_column() {
        let metric_columns: Vec<&str> = METRICS.iter().map(|(.., column)| *column).collect();
        assert_eq!(&HISTORICAL_METRICS.columns[4..], metric_columns.as_slice());
    }

    #[test]
    fn row_carries_window_as_millis() {
        let record = IntervalMetrics {
            queue_arn: String::from("arn:q1"),
            queue_name: String::from("Support"),
            window: Window::ending_at(NOW, 30),
            values: HashMap::from([(String::from("QUEUED_TIME"), 12.5)]),
        };
        let row = historical_metrics_row(&record);
        assert_eq!(row.len(), HISTORICAL_METRICS.columns.len());
        assert_eq!(row[2], Value::Int(BOUNDARY - 1_800_000));
        assert_eq!(row[3], Value::Int(BOUNDARY));
        assert_eq!(row[4], Value::Null);
        assert_eq!(row[27], Value::Float(12.5));
    }
}
