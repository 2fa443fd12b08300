//! Experiment Registry: Pool / Settings / Test creation and lookup
//!
//! Creation validates entity constraints before insert and is append-only:
//! no update or delete operations exist, so experimental provenance can
//! never be silently altered. Re-creating an identical pool or settings row
//! returns the existing key instead of duplicating it; tests are strictly
//! unique on their start time.

use rusqlite::{params, OptionalExtension};

use super::models::{Pool, PoolSpec, Settings, SettingsSpec, Test, TestSpec, TestStatus};
use super::ChamberAccess;
use crate::{Error, Result};

impl ChamberAccess {
    /// Register a pool, returning its key. Idempotent: an identical pool
    /// yields the existing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Integrity`] if a dimension or the mass is not
    /// positive, the material is empty, or `outer_diameter <=
    /// inner_diameter`.
    pub fn create_pool(&mut self, spec: &PoolSpec) -> Result<i64> {
        validate_pool(spec)?;
        let existing = self
            .conn()
            .query_row(
                "SELECT pool_id FROM pools
                 WHERE inner_diameter = ?1 AND outer_diameter = ?2 AND height = ?3
                   AND material = ?4 AND mass = ?5",
                params![
                    spec.inner_diameter,
                    spec.outer_diameter,
                    spec.height,
                    spec.material,
                    spec.mass
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(pool_id) = existing {
            return Ok(pool_id);
        }
        self.conn().execute(
            "INSERT INTO pools (inner_diameter, outer_diameter, height, material, mass)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.inner_diameter,
                spec.outer_diameter,
                spec.height,
                spec.material,
                spec.mass
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Register a condition set, returning its key. Idempotent like
    /// [`Self::create_pool`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Integrity`] if duty is outside [0, 100] or the
    /// pressure, temperature, or time step is not positive.
    pub fn create_settings(&mut self, spec: &SettingsSpec) -> Result<i64> {
        validate_settings(spec)?;
        let existing = self
            .conn()
            .query_row(
                "SELECT setting_id FROM settings
                 WHERE duty = ?1 AND pressure = ?2 AND temperature = ?3 AND time_step = ?4",
                params![spec.duty, spec.pressure, spec.temperature, spec.time_step],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(setting_id) = existing {
            return Ok(setting_id);
        }
        self.conn().execute(
            "INSERT INTO settings (duty, pressure, temperature, time_step)
             VALUES (?1, ?2, ?3, ?4)",
            params![spec.duty, spec.pressure, spec.temperature, spec.time_step],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Register a test in status `Running`, returning its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the referenced pool or settings does
    /// not exist, and [`Error::Integrity`] on a duplicate start time.
    pub fn create_test(&mut self, spec: &TestSpec) -> Result<i64> {
        self.get_pool(spec.pool_id)?;
        self.get_settings(spec.setting_id)?;
        self.conn()
            .execute(
                "INSERT INTO tests (author, started_at, description, status, pool_id, setting_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    spec.author,
                    spec.started_at,
                    spec.description,
                    TestStatus::Running.as_str(),
                    spec.pool_id,
                    spec.setting_id
                ],
            )
            .map_err(|e| Error::from_sqlite(e, "create test"))?;
        let test_id = self.conn().last_insert_rowid();
        tracing::info!(test_id, author = %spec.author, "test registered");
        Ok(test_id)
    }

    /// Look up a pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such pool exists.
    pub fn get_pool(&self, pool_id: i64) -> Result<Pool> {
        self.conn()
            .query_row(
                "SELECT inner_diameter, outer_diameter, height, material, mass
                 FROM pools WHERE pool_id = ?1",
                params![pool_id],
                |row| {
                    Ok(Pool {
                        pool_id,
                        spec: PoolSpec {
                            inner_diameter: row.get(0)?,
                            outer_diameter: row.get(1)?,
                            height: row.get(2)?,
                            material: row.get(3)?,
                            mass: row.get(4)?,
                        },
                    })
                },
            )
            .optional()?
            .ok_or(Error::NotFound {
                entity: "pool",
                id: pool_id,
            })
    }

    /// Look up a condition set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such settings row exists.
    pub fn get_settings(&self, setting_id: i64) -> Result<Settings> {
        self.conn()
            .query_row(
                "SELECT duty, pressure, temperature, time_step
                 FROM settings WHERE setting_id = ?1",
                params![setting_id],
                |row| {
                    Ok(Settings {
                        setting_id,
                        spec: SettingsSpec {
                            duty: row.get(0)?,
                            pressure: row.get(1)?,
                            temperature: row.get(2)?,
                            time_step: row.get(3)?,
                        },
                    })
                },
            )
            .optional()?
            .ok_or(Error::NotFound {
                entity: "settings",
                id: setting_id,
            })
    }

    /// Look up a test.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such test exists, or
    /// [`Error::Integrity`] if its status column holds an unknown encoding.
    pub fn get_test(&self, test_id: i64) -> Result<Test> {
        let row = self
            .conn()
            .query_row(
                "SELECT author, started_at, description, status, pool_id, setting_id
                 FROM tests WHERE test_id = ?1",
                params![test_id],
                |row| {
                    Ok((
                        TestSpec {
                            author: row.get(0)?,
                            started_at: row.get(1)?,
                            description: row.get(2)?,
                            pool_id: row.get(4)?,
                            setting_id: row.get(5)?,
                        },
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let (spec, status) = row.ok_or(Error::NotFound {
            entity: "test",
            id: test_id,
        })?;
        let status = TestStatus::parse(&status)
            .ok_or_else(|| Error::Integrity(format!("unknown test status '{status}'")))?;
        Ok(Test {
            test_id,
            status,
            spec,
        })
    }

    /// Record the terminal status transition. Internal: only the scheduler's
    /// exit paths call this, exactly once per test.
    pub(crate) fn set_test_status(&mut self, test_id: i64, status: TestStatus) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE tests SET status = ?1 WHERE test_id = ?2 AND status = 'running'",
            params![status.as_str(), test_id],
        )?;
        if updated == 0 {
            let current = self.get_test(test_id)?.status;
            return Err(Error::Integrity(format!(
                "test {test_id} already finalized as {}",
                current.as_str()
            )));
        }
        tracing::info!(test_id, status = status.as_str(), "test finalized");
        Ok(())
    }
}

fn validate_pool(spec: &PoolSpec) -> Result<()> {
    for (name, value) in [
        ("inner_diameter", spec.inner_diameter),
        ("outer_diameter", spec.outer_diameter),
        ("height", spec.height),
        ("mass", spec.mass),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::Integrity(format!(
                "pool {name} must be positive, got {value}"
            )));
        }
    }
    if spec.outer_diameter <= spec.inner_diameter {
        return Err(Error::Integrity(format!(
            "pool outer diameter ({}) must exceed inner diameter ({})",
            spec.outer_diameter, spec.inner_diameter
        )));
    }
    if spec.material.trim().is_empty() {
        return Err(Error::Integrity("pool material must be non-empty".to_string()));
    }
    Ok(())
}

fn validate_settings(spec: &SettingsSpec) -> Result<()> {
    if !(0.0..=100.0).contains(&spec.duty) {
        return Err(Error::Integrity(format!(
            "duty must be within [0, 100] percent, got {}",
            spec.duty
        )));
    }
    if spec.pressure == 0 {
        return Err(Error::Integrity("pressure must be positive".to_string()));
    }
    if !spec.temperature.is_finite() || spec.temperature <= 0.0 {
        return Err(Error::Integrity(format!(
            "temperature must be positive, got {}",
            spec.temperature
        )));
    }
    if !spec.time_step.is_finite() || spec.time_step <= 0.0 {
        return Err(Error::Integrity(format!(
            "time step must be positive, got {}",
            spec.time_step
        )));
    }
    Ok(())
}
