use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;
use crate::util::{ClientInfo, is_well_formed_code, now};

use super::from_row::{ACTIVATION_CODE_COLS, ACTIVATION_RECORD_COLS, query_all, query_one};

/// Only a unique index can reject a second binding; foreign key, primary key
/// and CHECK failures stay storage errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ============ Activation Codes ============

/// Import a code issued out-of-band.
///
/// Only well-formed codes are stored, so the read paths can reject anything
/// else without a lookup.
pub fn create_activation_code(conn: &Connection, input: &NewActivationCode) -> Result<ActivationCode> {
    if !is_well_formed_code(&input.code) {
        return Err(AppError::BadRequest(format!(
            "malformed activation code: {}",
            input.code
        )));
    }
    if input.max_activations < 1 {
        return Err(AppError::BadRequest(
            "max_activations must be at least 1".to_string(),
        ));
    }

    let id = EntityType::ActivationCode.gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO activation_codes (id, code, status, max_activations, current_activations, expire_date, version, notes, created_at)
         VALUES (?1, ?2, 'unused', ?3, 0, ?4, ?5, ?6, ?7)",
        params![
            &id,
            &input.code,
            input.max_activations,
            input.expire_date,
            &input.version,
            &input.notes,
            created_at
        ],
    )?;

    Ok(ActivationCode {
        id,
        code: input.code.clone(),
        status: CodeStatus::Unused,
        max_activations: input.max_activations,
        current_activations: 0,
        expire_date: input.expire_date,
        version: input.version.clone(),
        notes: input.notes.clone(),
        created_at,
    })
}

pub fn get_activation_code(conn: &Connection, code: &str) -> Result<Option<ActivationCode>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activation_codes WHERE code = ?1",
            ACTIVATION_CODE_COLS
        ),
        &[&code],
    )
}

/// Set the status column. Returns false if the code does not exist.
pub fn set_activation_code_status(conn: &Connection, code: &str, status: CodeStatus) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE activation_codes SET status = ?1 WHERE code = ?2",
        params![status.as_ref(), code],
    )?;
    Ok(affected > 0)
}

/// Atomically take one activation slot.
///
/// The UPDATE only matches while a slot is free, and flips the status to
/// `used` in the same statement when the last slot goes. Returns the new count,
/// or None if no slot was available (or the code does not exist).
pub fn increment_activations(conn: &Connection, code: &str) -> Result<Option<i64>> {
    conn.query_row(
        "UPDATE activation_codes
         SET current_activations = current_activations + 1,
             status = CASE WHEN current_activations + 1 >= max_activations THEN 'used' ELSE status END
         WHERE code = ?1 AND current_activations < max_activations
         RETURNING current_activations",
        params![code],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Move every unused code whose expiry has passed to `expired`.
pub fn expire_stale_codes(conn: &Connection, now: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE activation_codes SET status = 'expired' WHERE status = 'unused' AND expire_date < ?1",
        params![now],
    )?;
    Ok(affected)
}

// ============ Activation Records ============

pub fn find_active_record(
    conn: &Connection,
    code: &str,
    machine_id: &str,
) -> Result<Option<ActivationRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activation_records WHERE code = ?1 AND machine_id = ?2 AND status = 'active'",
            ACTIVATION_RECORD_COLS
        ),
        &[&code, &machine_id],
    )
}

/// Insert an active record for `machine_id`.
///
/// A concurrent binding of the same machine trips the partial unique index and
/// surfaces as `AlreadyActivatedOnDevice`.
pub fn create_activation_record(
    conn: &Connection,
    activation_code: &ActivationCode,
    machine_id: &str,
    client: &ClientInfo,
    activation_data: &serde_json::Value,
    activated_at: i64,
) -> Result<ActivationRecord> {
    let id = EntityType::ActivationRecord.gen_id();
    let data = serde_json::to_string(activation_data)?;

    let inserted = conn
        .execute(
            "INSERT INTO activation_records (id, activation_code_id, code, machine_id, activated_at, status, ip_address, user_agent, activation_data)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, ?8)",
            params![
                &id,
                &activation_code.id,
                &activation_code.code,
                machine_id,
                activated_at,
                &client.ip_address,
                &client.user_agent,
                &data
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyActivatedOnDevice
            } else {
                e.into()
            }
        })?;

    if inserted != 1 {
        return Err(AppError::StorageInconsistency(format!(
            "record insert affected {} rows",
            inserted
        )));
    }

    Ok(ActivationRecord {
        id,
        activation_code_id: activation_code.id.clone(),
        code: activation_code.code.clone(),
        machine_id: machine_id.to_string(),
        activated_at,
        status: RecordStatus::Active,
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        activation_data: activation_data.clone(),
    })
}

/// Timestamp of the newest record for a code, if any.
pub fn latest_activation_at(conn: &Connection, code: &str) -> Result<Option<i64>> {
    let latest = conn.query_row(
        "SELECT MAX(activated_at) FROM activation_records WHERE code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(latest)
}

/// List records for a code, newest first, optionally for one machine.
pub fn list_records_for_code(
    conn: &Connection,
    code: &str,
    machine_id: Option<&str>,
) -> Result<Vec<ActivationRecord>> {
    match machine_id {
        Some(machine_id) => query_all(
            conn,
            &format!(
                "SELECT {} FROM activation_records WHERE code = ?1 AND machine_id = ?2
                 ORDER BY activated_at DESC, rowid DESC",
                ACTIVATION_RECORD_COLS
            ),
            &[&code, &machine_id],
        ),
        None => query_all(
            conn,
            &format!(
                "SELECT {} FROM activation_records WHERE code = ?1
                 ORDER BY activated_at DESC, rowid DESC",
                ACTIVATION_RECORD_COLS
            ),
            &[&code],
        ),
    }
}
