//! Relational schema for the experiment store
//!
//! Five related tables plus the derived results table, joined by foreign
//! keys: uniqueness on test start time, composite uniqueness on
//! (test, sequence index) for observations and (observation, thermocouple)
//! for temperatures. Applied idempotently when a connection is opened; safe
//! to re-apply against an existing database.

use rusqlite::Connection;

use crate::Result;

const DDL: &str = r"
CREATE TABLE IF NOT EXISTS pools (
    pool_id        INTEGER PRIMARY KEY,
    inner_diameter REAL    NOT NULL,
    outer_diameter REAL    NOT NULL,
    height         REAL    NOT NULL,
    material       TEXT    NOT NULL,
    mass           REAL    NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    setting_id  INTEGER PRIMARY KEY,
    duty        REAL    NOT NULL,
    pressure    INTEGER NOT NULL,
    temperature REAL    NOT NULL,
    time_step   REAL    NOT NULL
);

CREATE TABLE IF NOT EXISTS tests (
    test_id     INTEGER PRIMARY KEY,
    author      TEXT    NOT NULL,
    started_at  TEXT    NOT NULL UNIQUE,
    description TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'running',
    pool_id     INTEGER NOT NULL REFERENCES pools (pool_id),
    setting_id  INTEGER NOT NULL REFERENCES settings (setting_id)
);

CREATE TABLE IF NOT EXISTS observations (
    observation_id INTEGER PRIMARY KEY,
    test_id        INTEGER NOT NULL REFERENCES tests (test_id),
    idx            INTEGER NOT NULL CHECK (idx >= 0),
    mass           REAL    NOT NULL,
    dew_point      REAL    NOT NULL,
    pressure       REAL    NOT NULL,
    manometer_ok   INTEGER NOT NULL,
    hygrometer_ok  INTEGER NOT NULL,
    pow_out        REAL,
    pow_ref        REAL,
    UNIQUE (test_id, idx)
);

CREATE TABLE IF NOT EXISTS temperatures (
    observation_id INTEGER NOT NULL REFERENCES observations (observation_id),
    thermocouple   INTEGER NOT NULL,
    temperature    REAL    NOT NULL,
    PRIMARY KEY (observation_id, thermocouple)
);

CREATE TABLE IF NOT EXISTS results (
    test_id INTEGER PRIMARY KEY REFERENCES tests (test_id),
    a       REAL    NOT NULL,
    sig_a   REAL    NOT NULL,
    b       REAL    NOT NULL,
    sig_b   REAL    NOT NULL,
    chi2    REAL    NOT NULL,
    q       REAL    NOT NULL,
    nu      INTEGER NOT NULL,
    mddp    REAL    NOT NULL,
    bm1     REAL    NOT NULL,
    mtc     REAL    NOT NULL,
    mtc_u   REAL    NOT NULL,
    h_fg    REAL    NOT NULL,
    h_fg_u  REAL    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_series
    ON observations (test_id, idx);
";

/// Apply the schema (idempotent) and enable foreign-key enforcement on this
/// connection.
///
/// # Errors
///
/// Propagates SQL execution failures as [`crate::Error::Storage`].
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(DDL)?;
    Ok(())
}
