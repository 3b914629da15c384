//! In-memory registry preloaded with fixed codes, for tests and local demos.
//!
//! It backs the registry-generic services (`validate_code`, `code_status`).
//! `RedemptionEngine` always redeems against SQLite, since the record insert
//! and the slot increment have to share one transaction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{AppError, Result};
use crate::models::{ActivationCode, CodeStatus};
use crate::util::SECONDS_PER_DAY;

use super::CodeRegistry;

/// Demo codes handed out with early client builds.
pub const DEMO_CODES: &[&str] = &[
    "23456789ABCDEFG",
    "A23456789BCDEFG",
    "B23456789CDEFGH",
    "C23456789DEFGHJ",
    "35X3M278XQNFLEQ",
];

#[derive(Debug, Default)]
pub struct FixtureRegistry {
    codes: Mutex<HashMap<String, ActivationCode>>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every demo code: one activation each, valid for a year
    /// from `now`, version "3.0".
    pub fn demo(now: i64) -> Self {
        let registry = Self::new();
        for (i, code) in DEMO_CODES.iter().enumerate() {
            registry.insert(ActivationCode {
                id: format!("act_code_demo{}", i),
                code: code.to_string(),
                status: CodeStatus::Unused,
                max_activations: 1,
                current_activations: 0,
                expire_date: now + 365 * SECONDS_PER_DAY,
                version: "3.0".to_string(),
                notes: Some("demo".to_string()),
                created_at: now,
            });
        }
        registry
    }

    pub fn insert(&self, code: ActivationCode) {
        self.codes().insert(code.code.clone(), code);
    }

    fn codes(&self) -> MutexGuard<'_, HashMap<String, ActivationCode>> {
        // Entries are only ever replaced whole, so a poisoned map is still usable
        self.codes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, code: &str, status: CodeStatus) -> Result<()> {
        let mut codes = self.codes();
        let entry = codes.get_mut(code).ok_or(AppError::CodeNotFound)?;
        entry.status = status;
        Ok(())
    }
}

impl CodeRegistry for FixtureRegistry {
    fn lookup(&self, code: &str) -> Result<ActivationCode> {
        self.codes().get(code).cloned().ok_or(AppError::CodeNotFound)
    }

    fn mark_expired(&self, code: &str) -> Result<()> {
        self.set_status(code, CodeStatus::Expired)
    }

    fn mark_exhausted(&self, code: &str) -> Result<()> {
        self.set_status(code, CodeStatus::Used)
    }

    fn record_activation(&self, code: &str) -> Result<i64> {
        let mut codes = self.codes();
        let entry = codes.get_mut(code).ok_or(AppError::CodeNotFound)?;
        if entry.current_activations >= entry.max_activations {
            return Err(AppError::QuotaExhausted);
        }
        entry.current_activations += 1;
        if entry.current_activations >= entry.max_activations {
            entry.status = CodeStatus::Used;
        }
        Ok(entry.current_activations)
    }
}
