use connect_sync::memory::{Call, MemoryStore, StaticSource};
use connect_sync::tables::USER_DATA_TABLE;
use connect_sync::{ConnectMetadata, Fetcher, ResourceKind, SyncRecord, Value};
use pull_user_data::{pull_user_data, AgentState, USER_DATA};

const INSTANCE: &str = "arn:aws:connect:us-east-1:111122223333:instance/i-1";

fn user_arn(n: usize) -> String {
    format!("{}/agent/a-{}", INSTANCE, n)
}

fn users(count: usize) -> StaticSource<ConnectMetadata> {
    let entries = (0..count)
        .map(|n| {
            ResourceKind::User
                .metadata(Some(user_arn(n).as_str()), Some(format!("agent{}", n).as_str()))
                .unwrap()
        })
        .collect();
    StaticSource::new("ListUsers", entries, <ConnectMetadata as SyncRecord>::key).with_page_size(100)
}

fn agent_id(state: &AgentState) -> &str {
    state.user_arn.rsplit('/').next().unwrap_or_default()
}

fn user_data(count: usize) -> StaticSource<AgentState> {
    let states = (0..count)
        .map(|n| AgentState {
            user_arn: user_arn(n),
            routing_profile_arn: Some(format!("{}/routing-profile/rp-1", INSTANCE)),
            status_arn: Some(format!("{}/agent-state/available", INSTANCE)),
            status_start_time: Some(String::from("2024-03-01 10:17:42")),
        })
        .collect();
    // filtered by agent id, not by arn
    StaticSource::new("GetCurrentUserData", states, agent_id).with_page_size(100)
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_keyed_table(USER_DATA_TABLE, USER_DATA.columns)
        .with_name(&user_arn(0), "users", "agent0")
        .with_name(&format!("{}/routing-profile/rp-1", INSTANCE), "routing profile", "Basic Routing Profile")
}

#[tokio::test]
async fn every_agent_is_pulled_in_chunks_of_a_hundred() {
    let users = users(230);
    let user_data = user_data(230);
    let store = store();

    let report = pull_user_data(&Fetcher::default(), &users, &user_data, &store).await.unwrap();

    let chunk_sizes: Vec<usize> = user_data.requests().iter().map(|f| f.len()).collect();
    assert_eq!(chunk_sizes, vec![100, 100, 30]);
    assert_eq!(user_data.requests()[0][0], "a-0");
    assert_eq!((report.inserted, report.updated), (230, 0));
}

#[tokio::test]
async fn names_come_from_metadata_or_default_to_na() {
    let users = users(1);
    let user_data = user_data(1);
    let store = store();

    pull_user_data(&Fetcher::default(), &users, &user_data, &store).await.unwrap();

    assert_eq!(
        store.row(USER_DATA_TABLE, &user_arn(0)),
        Some(vec![
            Value::from(user_arn(0)),
            Value::from("agent0"),
            Value::from(format!("{}/routing-profile/rp-1", INSTANCE)),
            Value::from("Basic Routing Profile"),
            Value::from("NA"),
            Value::from("2024-03-01 10:17:42"),
        ])
    );
}

#[tokio::test]
async fn updates_resolve_names_per_record() {
    let users = users(2);
    let user_data = user_data(2);
    let store = store().with_row(
        USER_DATA_TABLE,
        vec![
            Value::from(user_arn(1)),
            Value::from("stale"),
            Value::Null,
            Value::from("NA"),
            Value::from("NA"),
            Value::Null,
        ],
    );

    let report = pull_user_data(&Fetcher::default(), &users, &user_data, &store).await.unwrap();

    assert_eq!((report.inserted, report.updated), (1, 1));
    let calls = store.calls();
    let lookups = calls.iter().filter(|c| matches!(c, Call::Lookup { .. })).count();
    assert_eq!(lookups, 6);
    // the update, with its lookups, runs before the insert
    assert_eq!(
        calls[4],
        Call::Update {
            table: USER_DATA_TABLE.to_string(),
            key: user_arn(1),
        }
    );
    assert_eq!(store.row(USER_DATA_TABLE, &user_arn(1)).unwrap()[1], Value::from("NA"));
}

#[tokio::test]
async fn agent_without_routing_profile_skips_that_lookup() {
    let users = users(1);
    let states = vec![AgentState {
        user_arn: user_arn(0),
        ..Default::default()
    }];
    let user_data = StaticSource::new("GetCurrentUserData", states, agent_id);
    let store = store();

    pull_user_data(&Fetcher::default(), &users, &user_data, &store).await.unwrap();

    let row = store.row(USER_DATA_TABLE, &user_arn(0)).unwrap();
    assert_eq!(row[2], Value::Null);
    assert_eq!(row[3], Value::from("NA"));
    assert_eq!(row[5], Value::Null);
    assert_eq!(
        store.calls().iter().filter(|c| matches!(c, Call::Lookup { .. })).count(),
        1
    );
}
