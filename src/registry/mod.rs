//! Activation code registry.
//!
//! The registry is the only writer of code-level state. Transitions are
//! idempotent, and `record_activation` is a single conditional update so that
//! racing redemptions cannot both take the last slot.

mod fixture;

pub use fixture::{DEMO_CODES, FixtureRegistry};

use rusqlite::Connection;
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;

use crate::db::queries;
use crate::error::{AppError, ErrorKind, Result};
use crate::models::{ActivationCode, CodeStatus};
use crate::util::{days_remaining, is_well_formed_code, required};

/// Why a code cannot be redeemed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Ineligible {
    #[error("code already used")]
    AlreadyUsed,
    #[error("code expired")]
    Expired,
    #[error("activation quota exhausted")]
    QuotaExhausted,
}

impl Ineligible {
    /// The status a code should carry once this reason has been observed.
    pub fn implied_status(self) -> CodeStatus {
        match self {
            Ineligible::AlreadyUsed | Ineligible::QuotaExhausted => CodeStatus::Used,
            Ineligible::Expired => CodeStatus::Expired,
        }
    }
}

/// Decide whether `code` can take another activation at `now`.
///
/// The order of checks is part of the contract: callers see `AlreadyUsed`
/// before `Expired`, and a stored `expired` before a live expiry-date check.
pub fn check_eligibility(code: &ActivationCode, now: i64) -> std::result::Result<(), Ineligible> {
    if code.status == CodeStatus::Used {
        return Err(Ineligible::AlreadyUsed);
    }
    if code.status == CodeStatus::Expired || code.expire_date < now {
        return Err(Ineligible::Expired);
    }
    if code.current_activations >= code.max_activations {
        return Err(Ineligible::QuotaExhausted);
    }
    Ok(())
}

/// Status as seen by callers, derived from the eligibility rules rather than
/// the stored column.
pub fn effective_status(code: &ActivationCode, now: i64) -> CodeStatus {
    match check_eligibility(code, now) {
        Ok(()) => CodeStatus::Unused,
        Err(reason) => reason.implied_status(),
    }
}

/// Storage of activation codes and their transitions.
pub trait CodeRegistry {
    /// Fetch a code, failing with `CodeNotFound` if it does not exist.
    fn lookup(&self, code: &str) -> Result<ActivationCode>;

    /// Idempotently move the code to `expired`.
    fn mark_expired(&self, code: &str) -> Result<()>;

    /// Idempotently move the code to `used`.
    fn mark_exhausted(&self, code: &str) -> Result<()>;

    /// Take one activation slot and return the new count. The status flips to
    /// `used` in the same write when the last slot is taken.
    fn record_activation(&self, code: &str) -> Result<i64>;
}

/// The SQLite registry. Works on a pooled connection or, through deref, on an
/// open transaction.
impl CodeRegistry for Connection {
    fn lookup(&self, code: &str) -> Result<ActivationCode> {
        queries::get_activation_code(self, code)?.ok_or(AppError::CodeNotFound)
    }

    fn mark_expired(&self, code: &str) -> Result<()> {
        if !queries::set_activation_code_status(self, code, CodeStatus::Expired)? {
            return Err(AppError::CodeNotFound);
        }
        Ok(())
    }

    fn mark_exhausted(&self, code: &str) -> Result<()> {
        if !queries::set_activation_code_status(self, code, CodeStatus::Used)? {
            return Err(AppError::CodeNotFound);
        }
        Ok(())
    }

    fn record_activation(&self, code: &str) -> Result<i64> {
        if let Some(count) = queries::increment_activations(self, code)? {
            return Ok(count);
        }

        // Nothing matched: tell a missing or full code apart from a broken row
        let current = self.lookup(code)?;
        if current.current_activations >= current.max_activations {
            return Err(AppError::QuotaExhausted);
        }
        Err(AppError::StorageInconsistency(format!(
            "increment of code {} matched no row with {}/{} activations",
            current.id, current.current_activations, current.max_activations
        )))
    }
}

/// Transition every unused code past its expiry to `expired`.
pub fn expire_stale(conn: &Connection, now: i64) -> Result<usize> {
    queries::expire_stale_codes(conn, now)
}

// ============ Read-only services ============

/// Result of a side-effect free eligibility check.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_info: Option<ActivationCode>,
}

/// Check whether `code` could be redeemed at `now`, without writing anything.
///
/// Unknown and malformed codes are reported as invalid rather than as errors.
pub fn validate_code<R: CodeRegistry + ?Sized>(registry: &R, code: &str, now: i64) -> Result<Validation> {
    let code = required(code, "code")?;

    let not_found = || Validation {
        valid: false,
        reason: Some(ErrorKind::CodeNotFound),
        code_info: None,
    };

    if !is_well_formed_code(code) {
        return Ok(not_found());
    }

    let activation_code = match registry.lookup(code) {
        Ok(c) => c,
        Err(AppError::CodeNotFound) => return Ok(not_found()),
        Err(e) => return Err(e),
    };

    let reason = check_eligibility(&activation_code, now)
        .err()
        .map(|r| AppError::from(r).kind());

    Ok(Validation {
        valid: reason.is_none(),
        reason,
        code_info: Some(activation_code),
    })
}

/// Live status summary for one code.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub code: String,
    pub status: CodeStatus,
    pub expire_date: i64,
    pub days_remaining: i64,
    pub current_activations: i64,
    pub remaining_activations: i64,
    /// Most recent redemption; filled in by callers that can see records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activated_at: Option<i64>,
    pub version: String,
}

pub fn code_status<R: CodeRegistry + ?Sized>(registry: &R, code: &str, now: i64) -> Result<StatusReport> {
    let code = required(code, "code")?;
    if !is_well_formed_code(code) {
        return Err(AppError::CodeNotFound);
    }

    let activation_code = registry.lookup(code)?;
    let status = effective_status(&activation_code, now);
    let remaining_activations = match status {
        CodeStatus::Unused => activation_code.remaining_activations(),
        CodeStatus::Used | CodeStatus::Expired => 0,
    };

    Ok(StatusReport {
        days_remaining: days_remaining(activation_code.expire_date, now),
        current_activations: activation_code.current_activations,
        remaining_activations,
        last_activated_at: None,
        expire_date: activation_code.expire_date,
        version: activation_code.version,
        code: activation_code.code,
        status,
    })
}
