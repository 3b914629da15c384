mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::DbSettings;
use crate::redemption::RedemptionEngine;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: RedemptionEngine,
}

impl AppState {
    pub fn new(db: DbPool) -> Self {
        Self {
            engine: RedemptionEngine::new(db),
        }
    }
}

/// Create a pool whose connections wait out contending writers instead of
/// failing immediately with SQLITE_BUSY.
pub fn create_pool(database_path: &str, settings: DbSettings) -> Result<DbPool, r2d2::Error> {
    let busy_timeout = settings.busy_timeout;
    let manager = SqliteConnectionManager::file(database_path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(settings.pool_size).build(manager)
}
