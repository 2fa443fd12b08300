//! Experiment data access
//!
//! ## Schema Overview
//!
//! ```text
//! Pool (1) ──< Test (N) >── (1) Settings
//!                │
//!                ├──< Observation (N) [append-only, ordered by idx]
//!                │        └──< Temperature (N) [atomic with parent]
//!                └── Result (0..1) [derived, created once]
//! ```
//!
//! [`ChamberAccess`] is the explicit context object threaded through the
//! registry, the scheduler, and the aggregator — one SQLite connection per
//! chamber instance, no ambient global state. The registry operations live in
//! [`registry`], the observation/result persistence contract in [`store`].

mod models;
mod registry;
mod schema;
mod store;

pub use models::{
    Observation, ObservationSpec, Pool, PoolSpec, Settings, SettingsSpec, Temperature, Test,
    TestResult, TestSpec, TestStatus,
};
pub use store::SeriesIter;

use std::path::Path;

use rusqlite::Connection;

use crate::Result;

/// Data-access context for one chamber: a single SQLite connection with the
/// experiment schema applied and foreign keys enforced.
///
/// Registry and store operations are `impl` blocks in their component
/// modules; everything flows through this one handle.
pub struct ChamberAccess {
    conn: Connection,
}

impl ChamberAccess {
    /// Open (or create) a chamber database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the database cannot be opened or
    /// the schema cannot be applied.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        schema::apply(&conn)?;
        tracing::debug!(path = %path.as_ref().display(), "chamber database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory chamber database. Used by tests and dry runs; the
    /// data does not survive the connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) const fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
