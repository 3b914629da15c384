//! Shared utility functions.

use axum::http::HeaderMap;
use chrono::Utc;

use crate::error::{AppError, Result};

pub const SECONDS_PER_DAY: i64 = 86400;

/// Characters allowed in an activation code (no 0/1/I/O to avoid confusion).
pub const CODE_ALPHABET: &str = "23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Length of a well-formed activation code.
pub const CODE_LENGTH: usize = 15;

/// Current unix timestamp in seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Whether `code` has the shape of an issued activation code.
///
/// Used to short-circuit read-only lookups of obvious garbage; redemption
/// relies on the registry lookup instead.
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.chars().all(|c| CODE_ALPHABET.contains(c))
}

/// Trim a required request field, rejecting empty or whitespace-only values.
pub fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::MissingField(field));
    }
    Ok(trimmed)
}

/// Whole days left until `expire_date`, never negative.
pub fn days_remaining(expire_date: i64, now: i64) -> i64 {
    (expire_date - now).max(0) / SECONDS_PER_DAY
}

/// Caller network details stored on each activation record.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
/// Only the first hop of `x-forwarded-for` is kept.
pub fn extract_request_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    ClientInfo {
        ip_address,
        user_agent,
    }
}
