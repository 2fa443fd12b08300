//! Results Aggregator: reduce a completed test's series to a Result
//!
//! Reads the observation series, fits the mass-vs-time trend, derives the
//! Spalding mass-transfer quantities from the film state, and routes every
//! derived quantity through the uncertainty propagator. Observations with a
//! false health flag are excluded from the reduction; if that leaves fewer
//! than two usable samples the aggregation refuses rather than silently
//! degrading accuracy.

use std::f64::consts::FRAC_PI_4;

use super::fit::chi2_fit;
use super::sigma;
use crate::access::{ChamberAccess, TestResult, TestStatus};
use crate::propagate::{propagate, Measurement};
use crate::props::{self, FilmState};
use crate::{Error, Result};

/// Aggregation options.
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    /// Summarize an aborted test's partial series. Never implied; an
    /// operator must ask for it explicitly.
    pub allow_aborted: bool,
    /// Standard uncertainty of one scale reading in kg.
    pub mass_sigma: f64,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            allow_aborted: false,
            mass_sigma: sigma::MASS,
        }
    }
}

/// Summarize a completed test with default options.
///
/// The Result is computed lazily, exactly once: if the test already has a
/// stored Result it is returned unchanged.
///
/// # Errors
///
/// See [`summarize_with`].
pub fn summarize(access: &mut ChamberAccess, test_id: i64) -> Result<TestResult> {
    summarize_with(access, test_id, &SummarizeOptions::default())
}

/// Summarize a test, producing (and persisting) its Result.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] if the test is still running, is
/// aborted without `allow_aborted`, or has fewer than two usable
/// (health-flag-true) observations; [`Error::NotFound`] for a missing test;
/// [`Error::Domain`] if the series' mean film state is physically invalid.
pub fn summarize_with(
    access: &mut ChamberAccess,
    test_id: i64,
    options: &SummarizeOptions,
) -> Result<TestResult> {
    if let Some(existing) = access.get_result(test_id)? {
        tracing::debug!(test_id, "returning stored result");
        return Ok(existing);
    }

    let test = access.get_test(test_id)?;
    match test.status {
        TestStatus::Completed => {}
        TestStatus::Aborted if options.allow_aborted => {
            tracing::warn!(test_id, "summarizing aborted test on explicit override");
        }
        status => {
            return Err(Error::InsufficientData(format!(
                "test {test_id} is {}; only completed tests are summarized",
                status.as_str()
            )))
        }
    }
    let settings = access.get_settings(test.spec.setting_id)?.spec;
    let pool = access.get_pool(test.spec.pool_id)?.spec;

    // Collect usable samples and their mean chamber state.
    let mut times = Vec::new();
    let mut masses = Vec::new();
    let (mut p_sum, mut dp_sum, mut t_sum) = (0.0, 0.0, 0.0);
    let mut t_count = 0_usize;
    let mut excluded = 0_u64;
    for observation in access.read_series(test_id)? {
        let observation = observation?;
        let sample = &observation.spec;
        if !(sample.manometer_ok && sample.hygrometer_ok) {
            excluded += 1;
            continue;
        }
        times.push(sample.idx as f64 * settings.time_step);
        masses.push(sample.mass);
        p_sum += sample.pressure;
        dp_sum += sample.dew_point;
        for reading in &sample.temperatures {
            t_sum += reading.temperature;
            t_count += 1;
        }
    }
    if excluded > 0 {
        tracing::info!(test_id, excluded, "unhealthy observations excluded");
    }
    if times.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "test {test_id} has {} usable observations; need at least 2",
            times.len()
        )));
    }

    let fit = chi2_fit(&times, &masses, options.mass_sigma)?;

    let n = times.len() as f64;
    let p_mean = p_sum / n;
    let dp_mean = dp_sum / n;
    // No thermocouples recorded: fall back to the chamber set-point.
    let t_mean = if t_count == 0 {
        settings.temperature
    } else {
        t_sum / t_count as f64
    };
    let area = FRAC_PI_4 * pool.inner_diameter * pool.inner_diameter;

    // Nominal film-state quantities.
    let bulk = FilmState::from_dew_point(p_mean, t_mean, dp_mean)?;
    let surface = FilmState::saturated(p_mean, t_mean)?;
    let bm1 = spalding_driving_force(&bulk, &surface)?;
    let mddp = fit.b.abs() / area;

    // Mass-transfer coefficient with uncertainty: finite-difference Jacobian
    // over the fit slope and the instrument sigmas.
    let inputs = [
        Measurement::new(fit.b.abs(), fit.sig_b)?,
        Measurement::new(p_mean, p_mean * sigma::PRESSURE_REL)?,
        Measurement::new(t_mean, sigma::THERMOCOUPLE)?,
        Measurement::new(dp_mean, sigma::DEW_POINT)?,
    ];
    let mtc = propagate(
        |v| {
            let (rate, p, t, dp) = (v[0], v[1], v[2], v[3]);
            let bulk = FilmState::from_dew_point(p, t, dp)?;
            let surface = FilmState::saturated(p, t)?;
            Ok(rate / area / spalding_driving_force(&bulk, &surface)?)
        },
        &inputs,
    )?;

    // Interface latent heat with uncertainty from the film temperature.
    let t_input = [Measurement::new(t_mean, sigma::THERMOCOUPLE)?];
    let h_fg = propagate(
        |v| Ok(props::latent_heat(&FilmState::new(p_mean, v[0], 0.0)?)),
        &t_input,
    )?;

    let result = TestResult {
        test_id,
        a: fit.a,
        sig_a: fit.sig_a,
        b: fit.b,
        sig_b: fit.sig_b,
        chi2: fit.chi2,
        q: fit.q,
        nu: fit.nu as i64,
        mddp,
        bm1,
        mtc: mtc.value(),
        mtc_u: mtc.std_uncertainty(),
        h_fg: h_fg.value(),
        h_fg_u: h_fg.std_uncertainty(),
    };
    access.insert_result(&result)?;
    tracing::info!(
        test_id,
        mtc = result.mtc,
        mtc_u = result.mtc_u,
        "test summarized"
    );
    Ok(result)
}

/// Spalding mass-transfer driving force `B_m1 = (m1s - m1e) / (1 - m1s)`
/// between the saturated surface and the bulk film state.
fn spalding_driving_force(bulk: &FilmState, surface: &FilmState) -> Result<f64> {
    let m1s = props::vapor_mass_fraction(surface);
    let m1e = props::vapor_mass_fraction(bulk);
    let bm1 = (m1s - m1e) / (1.0 - m1s);
    if bm1 <= 0.0 {
        return Err(Error::Domain(format!(
            "no evaporative driving force: surface m1 = {m1s}, bulk m1 = {m1e}"
        )));
    }
    Ok(bm1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{ObservationSpec, PoolSpec, SettingsSpec, Temperature, TestSpec};
    use chrono::{TimeZone, Utc};

    fn seeded_test(access: &mut ChamberAccess) -> i64 {
        let pool_id = access
            .create_pool(&PoolSpec {
                inner_diameter: 0.03,
                outer_diameter: 0.04,
                height: 0.06,
                material: "Delrin".to_string(),
                mass: 0.056_78,
            })
            .unwrap();
        let setting_id = access
            .create_settings(&SettingsSpec {
                duty: 0.0,
                pressure: 101_325,
                temperature: 290.0,
                time_step: 1.0,
            })
            .unwrap();
        access
            .create_test(&TestSpec {
                author: "RHI".to_string(),
                started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
                description: "aggregation test".to_string(),
                pool_id,
                setting_id,
            })
            .unwrap()
    }

    fn observation(idx: i64, mass: f64, healthy: bool) -> ObservationSpec {
        ObservationSpec {
            idx,
            mass,
            dew_point: 284.0,
            pressure: 101_325.0,
            manometer_ok: healthy,
            hygrometer_ok: true,
            pow_out: None,
            pow_ref: None,
            temperatures: vec![
                Temperature {
                    thermocouple: 0,
                    temperature: 290.0,
                },
                Temperature {
                    thermocouple: 1,
                    temperature: 290.2,
                },
            ],
        }
    }

    fn seed_linear_series(access: &mut ChamberAccess, test_id: i64, count: i64) {
        for idx in 0..count {
            let mass = 2.0e-7_f64.mul_add(-(idx as f64), 0.999);
            access
                .append_observation(test_id, &observation(idx, mass, true))
                .unwrap();
        }
    }

    #[test]
    fn test_summarize_linear_series() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        seed_linear_series(&mut access, test_id, 10);
        access
            .set_test_status(test_id, TestStatus::Completed)
            .unwrap();

        let result = summarize(&mut access, test_id).unwrap();
        assert!((result.b + 2.0e-7).abs() < 1e-12);
        assert!(result.mddp > 0.0);
        assert!(result.bm1 > 0.0);
        assert!(result.mtc > 0.0);
        assert!(result.mtc_u > 0.0);
        // Latent heat near the 290 K film temperature.
        assert!((result.h_fg - 2.46e6).abs() / 2.46e6 < 0.01);
        assert!(result.h_fg_u > 0.0);
    }

    #[test]
    fn test_summarize_is_lazy_and_computed_once() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        seed_linear_series(&mut access, test_id, 5);
        access
            .set_test_status(test_id, TestStatus::Completed)
            .unwrap();

        let first = summarize(&mut access, test_id).unwrap();
        let second = summarize(&mut access, test_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(access.get_result(test_id).unwrap(), Some(first));
    }

    #[test]
    fn test_unhealthy_observations_excluded() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        seed_linear_series(&mut access, test_id, 6);
        // Two wildly wrong but flagged-unhealthy samples must not bend the
        // fit.
        for (idx, mass) in [(6_i64, 5.0), (7, 9.0)] {
            access
                .append_observation(test_id, &observation(idx, mass, false))
                .unwrap();
        }
        access
            .set_test_status(test_id, TestStatus::Completed)
            .unwrap();

        let result = summarize(&mut access, test_id).unwrap();
        assert!((result.b + 2.0e-7).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_usable_samples_rejected() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        access
            .append_observation(test_id, &observation(0, 0.999, true))
            .unwrap();
        access
            .append_observation(test_id, &observation(1, 0.998, false))
            .unwrap();
        access
            .append_observation(test_id, &observation(2, 0.997, false))
            .unwrap();
        access
            .set_test_status(test_id, TestStatus::Completed)
            .unwrap();

        assert!(matches!(
            summarize(&mut access, test_id),
            Err(Error::InsufficientData(_))
        ));
        // The test is left as-is: no result was recorded.
        assert_eq!(access.get_result(test_id).unwrap(), None);
    }

    #[test]
    fn test_running_test_refused() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        seed_linear_series(&mut access, test_id, 5);
        assert!(matches!(
            summarize(&mut access, test_id),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_aborted_test_requires_override() {
        let mut access = ChamberAccess::open_in_memory().unwrap();
        let test_id = seeded_test(&mut access);
        seed_linear_series(&mut access, test_id, 5);
        access
            .set_test_status(test_id, TestStatus::Aborted)
            .unwrap();

        assert!(matches!(
            summarize(&mut access, test_id),
            Err(Error::InsufficientData(_))
        ));
        let options = SummarizeOptions {
            allow_aborted: true,
            ..SummarizeOptions::default()
        };
        let result = summarize_with(&mut access, test_id, &options).unwrap();
        assert!((result.b + 2.0e-7).abs() < 1e-12);
    }
}
