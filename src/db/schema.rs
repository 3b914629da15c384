use rusqlite::Connection;

/// Initialize the database schema.
///
/// WAL lets readers proceed while a redemption holds the write lock; it is a
/// no-op for in-memory databases.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        -- Activation codes (issued out-of-band, never deleted here)
        CREATE TABLE IF NOT EXISTS activation_codes (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'unused' CHECK (status IN ('unused', 'used', 'expired')),
            max_activations INTEGER NOT NULL CHECK (max_activations > 0),
            current_activations INTEGER NOT NULL DEFAULT 0
                CHECK (current_activations >= 0 AND current_activations <= max_activations),
            expire_date INTEGER NOT NULL,
            version TEXT NOT NULL DEFAULT '',
            notes TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activation_codes_sweep ON activation_codes(status, expire_date);

        -- Activation records (one per successful redemption)
        CREATE TABLE IF NOT EXISTS activation_records (
            id TEXT PRIMARY KEY,
            activation_code_id TEXT NOT NULL REFERENCES activation_codes(id),
            code TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            activated_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'revoked')),
            ip_address TEXT,
            user_agent TEXT,
            activation_data TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_activation_records_lookup
            ON activation_records(code, machine_id, status);
        CREATE INDEX IF NOT EXISTS idx_activation_records_code_time
            ON activation_records(code, activated_at DESC);
        -- At most one active binding per (code, machine)
        CREATE UNIQUE INDEX IF NOT EXISTS idx_activation_records_active_machine
            ON activation_records(code, machine_id) WHERE status = 'active';
        "#,
    )?;
    Ok(())
}
