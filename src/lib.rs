//! Activator - Machine-bound activation codes
//!
//! This library provides the core of the activation service: the code registry,
//! the redemption engine that binds codes to machines under per-code quotas, and
//! the HTTP handlers that expose them.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod redemption;
pub mod registry;
pub mod util;
