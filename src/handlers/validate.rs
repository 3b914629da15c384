use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::registry::{StatusReport, Validation};

use super::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct CodeBody {
    #[serde(default, alias = "activation_code")]
    pub code: String,
}

/// POST /validate - Side-effect free eligibility check
///
/// Unknown codes are a normal `valid: false` answer, not an error.
pub async fn validate_code(
    State(state): State<AppState>,
    Json(body): Json<CodeBody>,
) -> Result<Json<ApiResponse<Validation>>> {
    let validation = state.engine.validate(&body.code)?;
    let message = if validation.valid {
        "Activation code is valid"
    } else {
        "Activation code is not valid"
    };
    Ok(ApiResponse::ok(message, validation))
}

/// POST /status - Live status, days remaining and remaining activations
pub async fn code_status(
    State(state): State<AppState>,
    Json(body): Json<CodeBody>,
) -> Result<Json<ApiResponse<StatusReport>>> {
    let report = state.engine.status(&body.code)?;
    Ok(ApiResponse::ok("Status query successful", report))
}
