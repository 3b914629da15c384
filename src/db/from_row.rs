//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ACTIVATION_CODE_COLS: &str = "id, code, status, max_activations, current_activations, expire_date, version, notes, created_at";

pub const ACTIVATION_RECORD_COLS: &str = "id, activation_code_id, code, machine_id, activated_at, status, ip_address, user_agent, activation_data";

// ============ FromRow Implementations ============

impl FromRow for ActivationCode {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ActivationCode {
            id: row.get(0)?,
            code: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            max_activations: row.get(3)?,
            current_activations: row.get(4)?,
            expire_date: row.get(5)?,
            version: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for ActivationRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let data: String = row.get(8)?;
        let activation_data = serde_json::from_str(&data).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(ActivationRecord {
            id: row.get(0)?,
            activation_code_id: row.get(1)?,
            code: row.get(2)?,
            machine_id: row.get(3)?,
            activated_at: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            ip_address: row.get(6)?,
            user_agent: row.get(7)?,
            activation_data,
        })
    }
}
