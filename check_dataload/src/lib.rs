use connect_sync::health::dataload_report;
use connect_sync::tables::DATALOAD_TABLES;
use connect_sync::Store;
use lambda_http::{Body, Error, Response};
use serde_json::json;
use tracing::{debug, error};

/// Row count and last update of every destination table as a JSON response.
/// A failed query answers 500 with the error message.
pub async fn dataload_response<S>(store: &S) -> Result<Response<Body>, Error>
where
    S: Store + ?Sized,
{
    let (status, body) = match dataload_report(store, &DATALOAD_TABLES).await {
        Ok(report) => (200, serde_json::Value::Object(report)),
        Err(e) => {
            error!("dataload check failed: {}", e);
            (500, json!({ "error": e.to_string() }))
        }
    };
    let body = serde_json::to_string(&body)?;
    debug!("response >> {}", body);
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body))?)
}
