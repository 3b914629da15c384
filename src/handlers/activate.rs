use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::redemption::{RedeemRequest, Redemption};
use crate::util::extract_request_info;

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct ActivateBody {
    /// Missing fields deserialize as empty and are reported as `missing_field`
    #[serde(default, alias = "activation_code")]
    pub code: String,
    #[serde(default)]
    pub machine_id: String,
    #[serde(default, alias = "user_info")]
    pub metadata: Option<serde_json::Value>,
}

/// POST /activate - Redeem a code for this machine
pub async fn activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ActivateBody>,
) -> Result<Json<ApiResponse<Redemption>>> {
    let request = RedeemRequest {
        code: body.code,
        machine_id: body.machine_id,
        metadata: body.metadata,
        client: extract_request_info(&headers),
    };

    let redemption = state.engine.redeem(&request)?;

    Ok(ApiResponse::ok("Activation successful", redemption))
}
