//! Record types for the experiment schema
//!
//! Specs are the caller-supplied shapes handed to the registry and store;
//! the full records carry the surrogate keys assigned on insert. All entities
//! are immutable once written, except the test status flag, which is set
//! exactly once at the terminal state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sample-holder geometry specification.
///
/// Invariant (enforced by the registry): `outer_diameter > inner_diameter`,
/// all lengths and the mass positive, material non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Inner diameter in m.
    pub inner_diameter: f64,
    /// Outer diameter in m.
    pub outer_diameter: f64,
    /// Height in m.
    pub height: f64,
    /// Pool material, e.g. "Delrin".
    pub material: String,
    /// Dry mass in kg.
    pub mass: f64,
}

/// A registered pool with its surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Surrogate primary key.
    pub pool_id: i64,
    /// Geometry and material.
    pub spec: PoolSpec,
}

/// Experimental condition set specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSpec {
    /// Heater duty cycle in percent, 0-100.
    pub duty: f64,
    /// Chamber pressure set-point in Pa.
    pub pressure: u32,
    /// Chamber temperature set-point in K.
    pub temperature: f64,
    /// Acquisition time step in s.
    pub time_step: f64,
}

/// A registered condition set with its surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Surrogate primary key.
    pub setting_id: i64,
    /// Condition values.
    pub spec: SettingsSpec,
}

/// Lifecycle status of a test.
///
/// Written `Running` at creation and updated exactly once, to `Completed` or
/// `Aborted`, when the acquisition loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    /// Acquisition loop is (or may still be) producing observations.
    Running,
    /// Stopped cleanly; the observation sequence is final and summarizable.
    Completed,
    /// Stopped on command or after persistence-retry exhaustion; incomplete.
    Aborted,
}

impl TestStatus {
    /// Stable column encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Decode the column encoding, if valid.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// One experiment run specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Operator initials or name.
    pub author: String,
    /// Start instant; unique across all tests.
    pub started_at: DateTime<Utc>,
    /// Free-text description of the run.
    pub description: String,
    /// Referenced pool; must already exist.
    pub pool_id: i64,
    /// Referenced settings; must already exist.
    pub setting_id: i64,
}

/// A registered test with its surrogate key and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    /// Surrogate primary key.
    pub test_id: i64,
    /// Lifecycle status.
    pub status: TestStatus,
    /// Run attributes and references.
    pub spec: TestSpec,
}

/// One thermocouple reading tied to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    /// Thermocouple channel, 0..N-1, unique within the observation.
    pub thermocouple: u32,
    /// Reading in K.
    pub temperature: f64,
}

/// One acquisition cycle's sample, submitted and persisted atomically with
/// its thermocouple readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSpec {
    /// Sequence index within the test, starting at 0, strictly increasing.
    pub idx: i64,
    /// Scale reading in kg.
    pub mass: f64,
    /// Hygrometer dew-point reading in K.
    pub dew_point: f64,
    /// Manometer reading in Pa.
    pub pressure: f64,
    /// Manometer reading trustworthy this cycle.
    pub manometer_ok: bool,
    /// Hygrometer reading trustworthy this cycle.
    pub hygrometer_ok: bool,
    /// Heater power output reading in W; present only when the heater is
    /// active.
    pub pow_out: Option<f64>,
    /// Heater power reference reading in W; present only when the heater is
    /// active.
    pub pow_ref: Option<f64>,
    /// Thermocouple readings for this cycle.
    pub temperatures: Vec<Temperature>,
}

/// A persisted observation read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Owning test.
    pub test_id: i64,
    /// Sample values.
    pub spec: ObservationSpec,
}

/// Derived summary for a completed test: the mass-series fit and the
/// reduced thermophysical quantities, each with propagated standard
/// uncertainty. One per test, created once, read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Source test.
    pub test_id: i64,
    /// Fit intercept in kg.
    pub a: f64,
    /// Standard error of the intercept.
    pub sig_a: f64,
    /// Fit slope (mass rate) in kg/s.
    pub b: f64,
    /// Standard error of the slope.
    pub sig_b: f64,
    /// Chi-squared statistic of the fit.
    pub chi2: f64,
    /// Goodness-of-fit probability (chi-squared survival function).
    pub q: f64,
    /// Degrees of freedom of the fit.
    pub nu: i64,
    /// Evaporative mass flux in kg/(m^2 s).
    pub mddp: f64,
    /// Spalding mass-transfer driving force.
    pub bm1: f64,
    /// Evaporation mass-transfer coefficient in kg/(m^2 s).
    pub mtc: f64,
    /// Propagated standard uncertainty of `mtc`.
    pub mtc_u: f64,
    /// Interface latent heat of vaporization in J/kg.
    pub h_fg: f64,
    /// Propagated standard uncertainty of `h_fg`.
    pub h_fg_u: f64,
}
