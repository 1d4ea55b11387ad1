use axum::http::{HeaderMap, Method, Uri};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Echo endpoint registered under `/__debug` when debug mode is on. Logs
/// the whole inbound request and answers with a fixed pong.
pub async fn debug_handler(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let request_id = Uuid::new_v4();
    debug!(%request_id, method = %method, uri = %uri, "debug request");
    debug!(%request_id, query = uri.query().unwrap_or(""), "debug query");
    debug!(%request_id, ?headers, "debug headers");
    debug!(%request_id, body = %String::from_utf8_lossy(&body), "debug body");
    Json(json!({ "message": "pong" }))
}
