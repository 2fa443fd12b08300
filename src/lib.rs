//! # chamber-core: Environmental Test Chamber Acquisition & Reduction
//!
//! The core of an evaporation-chamber experiment rig: a timed
//! acquisition/control loop that polls the chamber instruments, persists
//! every sample into a normalized relational store, and later reduces the
//! stored time-series into derived thermophysical quantities with propagated
//! measurement uncertainty.
//!
//! ## Components
//!
//! - [`props`] — pure property correlations over a film state
//! - [`propagate`] — first-order uncertainty propagation
//! - [`access`] — experiment registry and atomic observation store (SQLite)
//! - [`acquisition`] — instrument interface and the timed control loop
//! - [`analysis`] — regression and the results aggregator
//!
//! ## Example
//!
//! ```rust,no_run
//! use chamber_core::access::{ChamberAccess, PoolSpec, SettingsSpec, TestSpec};
//! use chamber_core::acquisition::{Scheduler, SchedulerConfig, SimulatedInstruments};
//! use chamber_core::analysis::summarize;
//! use chrono::Utc;
//!
//! # async fn example() -> chamber_core::Result<()> {
//! let mut access = ChamberAccess::open("chamber.db")?;
//! let pool_id = access.create_pool(&PoolSpec {
//!     inner_diameter: 0.03,
//!     outer_diameter: 0.04,
//!     height: 0.06,
//!     material: "Delrin".to_string(),
//!     mass: 0.05678,
//! })?;
//! let setting_id = access.create_settings(&SettingsSpec {
//!     duty: 0.0,
//!     pressure: 101_325,
//!     temperature: 290.0,
//!     time_step: 1.0,
//! })?;
//! let test_id = access.create_test(&TestSpec {
//!     author: "RHI".to_string(),
//!     started_at: Utc::now(),
//!     description: "settling run".to_string(),
//!     pool_id,
//!     setting_id,
//! })?;
//!
//! let config = SchedulerConfig {
//!     max_samples: Some(100),
//!     ..SchedulerConfig::default()
//! };
//! let (mut scheduler, _handle) = Scheduler::new(SimulatedInstruments::ambient(), config);
//! scheduler.run(&mut access, test_id).await?;
//!
//! let result = summarize(&mut access, test_id)?;
//! println!("mtc = {} +/- {}", result.mtc, result.mtc_u);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod access;
pub mod acquisition;
pub mod analysis;
pub mod error;
pub mod propagate;
pub mod props;

pub use error::{Error, Result};
