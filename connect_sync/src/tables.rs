//! Destination table names.

pub const METADATA_TABLE: &str = "connect_metadata";
pub const CURRENT_METRICS_TABLE: &str = "current_metric_data";
pub const USER_DATA_TABLE: &str = "current_user_data";
pub const HISTORICAL_METRICS_TABLE: &str = "historical_metric_data";

/// Tables reported by the dataload check, in report order.
pub const DATALOAD_TABLES: [&str; 4] = [
    METADATA_TABLE,
    CURRENT_METRICS_TABLE,
    USER_DATA_TABLE,
    HISTORICAL_METRICS_TABLE,
];
