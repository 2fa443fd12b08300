//! Observation Store: atomic sample persistence and ordered series reads
//!
//! `append_observation` wraps the observation row and all of its temperature
//! rows in one SQLite transaction: either everything is durably recorded or
//! nothing is. The aggregator therefore never needs locking to avoid
//! partially-written samples — a reader can only ever see committed
//! observations.

use rusqlite::{params, OptionalExtension};

use super::models::{Observation, ObservationSpec, Temperature, TestResult, TestStatus};
use super::ChamberAccess;
use crate::{Error, Result};

impl ChamberAccess {
    /// Atomically append one observation and its temperatures to a running
    /// test.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Integrity`] for a duplicate sequence index, a
    /// duplicate thermocouple channel within the observation, a negative
    /// index, a reference to a test that does not exist, or a test that is
    /// no longer running. On any failure nothing is persisted.
    pub fn append_observation(&mut self, test_id: i64, spec: &ObservationSpec) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM tests WHERE test_id = ?1",
                params![test_id],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => {
                return Err(Error::Integrity(format!(
                    "observation references nonexistent test {test_id}"
                )))
            }
            Some(s) if s != TestStatus::Running.as_str() => {
                return Err(Error::Integrity(format!(
                    "test {test_id} is {s}; no further observations accepted"
                )))
            }
            Some(_) => {}
        }

        tx.execute(
            "INSERT INTO observations
                 (test_id, idx, mass, dew_point, pressure,
                  manometer_ok, hygrometer_ok, pow_out, pow_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                test_id,
                spec.idx,
                spec.mass,
                spec.dew_point,
                spec.pressure,
                spec.manometer_ok,
                spec.hygrometer_ok,
                spec.pow_out,
                spec.pow_ref
            ],
        )
        .map_err(|e| Error::from_sqlite(e, "append observation"))?;
        let observation_id = tx.last_insert_rowid();

        for reading in &spec.temperatures {
            tx.execute(
                "INSERT INTO temperatures (observation_id, thermocouple, temperature)
                 VALUES (?1, ?2, ?3)",
                params![observation_id, reading.thermocouple, reading.temperature],
            )
            .map_err(|e| Error::from_sqlite(e, "append temperature"))?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Read a test's observation series: a lazy, ordered, finite,
    /// restartable iterator in ascending sequence index, temperatures
    /// nested. Repeated reads of a completed test return the identical
    /// sequence; restart by calling `read_series` again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the test does not exist.
    pub fn read_series(&self, test_id: i64) -> Result<SeriesIter<'_>> {
        self.get_test(test_id)?;
        Ok(SeriesIter {
            access: self,
            test_id,
            last_idx: -1,
            failed: false,
        })
    }

    /// Number of observations recorded for a test.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on a query failure.
    pub fn count_observations(&self, test_id: i64) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM observations WHERE test_id = ?1",
            params![test_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Persist a derived result. One result per test, created once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the test does not exist and
    /// [`Error::Integrity`] if a result was already recorded.
    pub fn insert_result(&mut self, result: &TestResult) -> Result<()> {
        self.get_test(result.test_id)?;
        self.conn()
            .execute(
                "INSERT INTO results
                     (test_id, a, sig_a, b, sig_b, chi2, q, nu,
                      mddp, bm1, mtc, mtc_u, h_fg, h_fg_u)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    result.test_id,
                    result.a,
                    result.sig_a,
                    result.b,
                    result.sig_b,
                    result.chi2,
                    result.q,
                    result.nu,
                    result.mddp,
                    result.bm1,
                    result.mtc,
                    result.mtc_u,
                    result.h_fg,
                    result.h_fg_u
                ],
            )
            .map_err(|e| Error::from_sqlite(e, "insert result"))?;
        tracing::info!(test_id = result.test_id, "result recorded");
        Ok(())
    }

    /// Fetch the derived result for a test, if one has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on a query failure.
    pub fn get_result(&self, test_id: i64) -> Result<Option<TestResult>> {
        let result = self
            .conn()
            .query_row(
                "SELECT a, sig_a, b, sig_b, chi2, q, nu,
                        mddp, bm1, mtc, mtc_u, h_fg, h_fg_u
                 FROM results WHERE test_id = ?1",
                params![test_id],
                |row| {
                    Ok(TestResult {
                        test_id,
                        a: row.get(0)?,
                        sig_a: row.get(1)?,
                        b: row.get(2)?,
                        sig_b: row.get(3)?,
                        chi2: row.get(4)?,
                        q: row.get(5)?,
                        nu: row.get(6)?,
                        mddp: row.get(7)?,
                        bm1: row.get(8)?,
                        mtc: row.get(9)?,
                        mtc_u: row.get(10)?,
                        h_fg: row.get(11)?,
                        h_fg_u: row.get(12)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }
}

/// Lazy iterator over a test's observation series, ascending by sequence
/// index. Each step is one keyset-paginated query, so the series is never
/// materialized whole; a fresh call to
/// [`ChamberAccess::read_series`] restarts from the beginning.
pub struct SeriesIter<'a> {
    access: &'a ChamberAccess,
    test_id: i64,
    last_idx: i64,
    failed: bool,
}

impl SeriesIter<'_> {
    fn fetch_next(&self) -> Result<Option<Observation>> {
        let mut stmt = self.access.conn().prepare_cached(
            "SELECT observation_id, idx, mass, dew_point, pressure,
                    manometer_ok, hygrometer_ok, pow_out, pow_ref
             FROM observations
             WHERE test_id = ?1 AND idx > ?2
             ORDER BY idx
             LIMIT 1",
        )?;
        let head = stmt
            .query_row(params![self.test_id, self.last_idx], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    ObservationSpec {
                        idx: row.get(1)?,
                        mass: row.get(2)?,
                        dew_point: row.get(3)?,
                        pressure: row.get(4)?,
                        manometer_ok: row.get(5)?,
                        hygrometer_ok: row.get(6)?,
                        pow_out: row.get(7)?,
                        pow_ref: row.get(8)?,
                        temperatures: Vec::new(),
                    },
                ))
            })
            .optional()?;
        let Some((observation_id, mut spec)) = head else {
            return Ok(None);
        };

        let mut stmt = self.access.conn().prepare_cached(
            "SELECT thermocouple, temperature
             FROM temperatures
             WHERE observation_id = ?1
             ORDER BY thermocouple",
        )?;
        let readings = stmt.query_map(params![observation_id], |row| {
            Ok(Temperature {
                thermocouple: row.get(0)?,
                temperature: row.get(1)?,
            })
        })?;
        for reading in readings {
            spec.temperatures.push(reading?);
        }

        Ok(Some(Observation {
            test_id: self.test_id,
            spec,
        }))
    }
}

impl Iterator for SeriesIter<'_> {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.fetch_next() {
            Ok(Some(observation)) => {
                self.last_idx = observation.spec.idx;
                Some(Ok(observation))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
