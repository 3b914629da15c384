use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::redemption::CodeReport;

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default, alias = "activation_code")]
    pub code: String,
    /// Only return records for this machine
    #[serde(default)]
    pub machine_id: Option<String>,
}

/// POST /query - Code details, activation history and a live summary
pub async fn query_activations(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<ApiResponse<CodeReport>>> {
    let report = state.engine.query(&body.code, body.machine_id.as_deref())?;
    Ok(ApiResponse::ok("Query successful", report))
}
