//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// Liveness probe for load balancers and service managers. Only asserts the
/// process is up and responding; storage health is checked at startup.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
