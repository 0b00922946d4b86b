use std::collections::HashMap;

use connect_sync::memory::{Call, MemoryStore, StaticSource};
use connect_sync::tables::CURRENT_METRICS_TABLE;
use connect_sync::{ConnectMetadata, Fetcher, ResourceKind, SyncRecord, Value};
use pull_current_metrics::{pull_current_metrics, QueueMetrics, CURRENT_METRICS};

fn queue_arn(n: usize) -> String {
    format!("arn:aws:connect:us-east-1:111122223333:instance/i-1/queue/q-{}", n)
}

fn queues(count: usize) -> StaticSource<ConnectMetadata> {
    let entries = (0..count)
        .map(|n| {
            ResourceKind::Queue
                .metadata(Some(queue_arn(n).as_str()), Some(format!("Queue {}", n).as_str()))
                .unwrap()
        })
        .collect();
    StaticSource::new("ListQueues", entries, <ConnectMetadata as SyncRecord>::key).with_page_size(50)
}

fn metrics(count: usize) -> StaticSource<QueueMetrics> {
    let records = (0..count)
        .map(|n| QueueMetrics {
            queue_arn: queue_arn(n),
            queue_name: String::new(),
            values: HashMap::from([
                (String::from("AGENTS_ONLINE"), n as f64),
                (String::from("CONTACTS_IN_QUEUE"), 1.0),
            ]),
        })
        .collect();
    StaticSource::new("GetCurrentMetricData", records, <QueueMetrics as SyncRecord>::key).with_page_size(100)
}

#[tokio::test]
async fn metrics_are_requested_a_hundred_queues_at_a_time() {
    let queues = queues(250);
    let metrics = metrics(250);
    let store = MemoryStore::new().with_keyed_table(CURRENT_METRICS_TABLE, CURRENT_METRICS.columns);

    let report = pull_current_metrics(&Fetcher::default(), &queues, &metrics, &store)
        .await
        .unwrap();

    let chunk_sizes: Vec<usize> = metrics.requests().iter().map(|filter| filter.len()).collect();
    assert_eq!(chunk_sizes, vec![100, 100, 50]);
    assert_eq!(queues.requests().len(), 5);
    assert_eq!((report.fetched, report.inserted, report.updated), (250, 250, 0));
    assert_eq!(
        store.calls(),
        vec![
            Call::ExistingKeys(CURRENT_METRICS_TABLE.to_string()),
            Call::Insert {
                table: CURRENT_METRICS_TABLE.to_string(),
                rows: 250
            },
        ]
    );
    let row = store.row(CURRENT_METRICS_TABLE, &queue_arn(7)).unwrap();
    assert_eq!(row[1], Value::from("Queue 7"));
    assert_eq!(row[2], Value::Float(7.0));
}

#[tokio::test]
async fn second_run_updates_every_queue() {
    let queues = queues(3);
    let metrics = metrics(3);
    let store = MemoryStore::new().with_keyed_table(CURRENT_METRICS_TABLE, CURRENT_METRICS.columns);
    let fetcher = Fetcher::default();

    pull_current_metrics(&fetcher, &queues, &metrics, &store).await.unwrap();
    let report = pull_current_metrics(&fetcher, &queues, &metrics, &store).await.unwrap();

    assert_eq!((report.inserted, report.updated), (0, 3));
    assert_eq!(store.rows(CURRENT_METRICS_TABLE).len(), 3);
}

#[tokio::test]
async fn no_queues_means_no_metric_requests() {
    let queues = queues(0);
    let metrics = metrics(0);
    let store = MemoryStore::new();

    let report = pull_current_metrics(&Fetcher::default(), &queues, &metrics, &store)
        .await
        .unwrap();

    assert!(metrics.requests().is_empty());
    assert_eq!(report.fetched, 0);
    assert!(store.calls().is_empty());
}
