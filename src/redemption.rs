//! Redeeming activation codes for machines.
//!
//! A redemption runs inside one `BEGIN IMMEDIATE` transaction: the write lock
//! is taken before the code is read, so the eligibility check, the machine
//! binding check and the slot increment all see the same state. The partial
//! unique index on active `(code, machine_id)` and the conditional increment
//! keep the invariants even if that serialization were lost.

use rusqlite::{Transaction, TransactionBehavior};
use serde::Serialize;

use crate::db::{DbPool, queries};
use crate::error::{AppError, Result};
use crate::models::{ActivationCode, ActivationRecord, CodeStatus};
use crate::registry::{
    self, CodeRegistry, Ineligible, StatusReport, Validation, check_eligibility,
};
use crate::util::{ClientInfo, now, required};

/// Everything needed to redeem one code on one machine.
#[derive(Debug, Clone, Default)]
pub struct RedeemRequest {
    pub code: String,
    pub machine_id: String,
    /// Opaque caller payload stored on the record
    pub metadata: Option<serde_json::Value>,
    pub client: ClientInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    pub record_id: String,
    pub activated_at: i64,
    pub expire_date: i64,
    pub version: String,
    pub machine_id: String,
    pub remaining_activations: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationSummary {
    pub total_activations: usize,
    pub active_activations: usize,
    pub can_activate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeReport {
    pub code_info: ActivationCode,
    pub activation_records: Vec<ActivationRecord>,
    pub summary: ActivationSummary,
}

#[derive(Clone)]
pub struct RedemptionEngine {
    db: DbPool,
}

impl RedemptionEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn redeem(&self, request: &RedeemRequest) -> Result<Redemption> {
        self.redeem_at(request, now())
    }

    /// Redeem `request.code` for `request.machine_id` as of `now`.
    ///
    /// Either a record is created and the code's counter incremented, or
    /// nothing changes (apart from a best-effort status repair when the code
    /// turns out to be expired or exhausted).
    pub fn redeem_at(&self, request: &RedeemRequest, now: i64) -> Result<Redemption> {
        let code = required(&request.code, "code")?;
        let machine_id = required(&request.machine_id, "machine_id")?;

        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let activation_code = tx.lookup(code)?;

        if let Err(reason) = check_eligibility(&activation_code, now) {
            tracing::debug!(
                code_id = %activation_code.id,
                reason = reason.as_ref(),
                "Activation code not redeemable"
            );
            repair_status(tx, &activation_code, reason);
            return Err(reason.into());
        }

        if queries::find_active_record(&tx, code, machine_id)?.is_some() {
            return Err(AppError::AlreadyActivatedOnDevice);
        }

        let empty = serde_json::Value::Object(Default::default());
        let record = queries::create_activation_record(
            &tx,
            &activation_code,
            machine_id,
            &request.client,
            request.metadata.as_ref().unwrap_or(&empty),
            now,
        )?;
        let current_activations = tx.record_activation(code)?;

        // Dropping the transaction on any error above rolls back the record
        tx.commit()?;

        let remaining_activations = activation_code.max_activations - current_activations;
        tracing::info!(
            code_id = %activation_code.id,
            record_id = %record.id,
            machine_id = %machine_id,
            remaining = remaining_activations,
            "Activation code redeemed"
        );

        Ok(Redemption {
            record_id: record.id,
            activated_at: record.activated_at,
            expire_date: activation_code.expire_date,
            version: activation_code.version,
            machine_id: record.machine_id,
            remaining_activations,
        })
    }

    pub fn query(&self, code: &str, machine_id: Option<&str>) -> Result<CodeReport> {
        self.query_at(code, machine_id, now())
    }

    /// Code details, its records (newest first) and a live summary. Read-only.
    pub fn query_at(&self, code: &str, machine_id: Option<&str>, now: i64) -> Result<CodeReport> {
        let code = required(code, "code")?;
        let machine_id = machine_id.map(str::trim).filter(|m| !m.is_empty());

        let conn = self.db.get()?;
        let activation_code = conn.lookup(code)?;
        let records = queries::list_records_for_code(&conn, code, machine_id)?;

        let summary = ActivationSummary {
            total_activations: records.len(),
            active_activations: records.iter().filter(|r| r.is_active()).count(),
            can_activate: check_eligibility(&activation_code, now).is_ok(),
        };

        Ok(CodeReport {
            code_info: activation_code,
            activation_records: records,
            summary,
        })
    }

    pub fn validate(&self, code: &str) -> Result<Validation> {
        let conn = self.db.get()?;
        registry::validate_code(&*conn, code, now())
    }

    pub fn status(&self, code: &str) -> Result<StatusReport> {
        let conn = self.db.get()?;
        let mut report = registry::code_status(&*conn, code, now())?;
        report.last_activated_at = queries::latest_activation_at(&conn, &report.code)?;
        Ok(report)
    }
}

/// Persist the status implied by `reason` and commit just that write.
///
/// Best-effort: a failure is logged and the caller still gets the
/// eligibility error computed from the row it read.
fn repair_status(tx: Transaction<'_>, code: &ActivationCode, reason: Ineligible) {
    let target = reason.implied_status();
    if code.status == target {
        return;
    }

    let written = match target {
        CodeStatus::Expired => tx.mark_expired(&code.code),
        CodeStatus::Used => tx.mark_exhausted(&code.code),
        CodeStatus::Unused => return,
    };

    match written.and_then(|()| tx.commit().map_err(AppError::from)) {
        Ok(()) => tracing::info!(
            code_id = %code.id,
            status = target.as_ref(),
            "Repaired stale activation code status"
        ),
        Err(e) => tracing::warn!(
            code_id = %code.id,
            error = %e,
            "Failed to persist activation code status repair"
        ),
    }
}
