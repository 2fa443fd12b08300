//! Acquisition Scheduler integration tests
//!
//! Simulated instruments under paused tokio time keep the fault and timing
//! scenarios deterministic.

use chamber_core::access::{
    ChamberAccess, ObservationSpec, PoolSpec, SettingsSpec, Temperature, TestSpec, TestStatus,
};
use chamber_core::acquisition::{
    Scheduler, SchedulerConfig, SchedulerState, SimulatedInstruments,
};
use chamber_core::{Error, Result};
use chrono::{TimeZone, Utc};
use tokio::time::Duration;

fn seeded_test(access: &mut ChamberAccess, duty: f64, time_step: f64) -> i64 {
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
            duty,
            pressure: 101_325,
            temperature: 290.0,
            time_step,
        })
        .unwrap();
    access
        .create_test(&TestSpec {
            author: "RHI".to_string(),
            started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
            description: "scheduler test".to_string(),
            pool_id,
            setting_id,
        })
        .unwrap()
}

fn config(max_samples: u64) -> SchedulerConfig {
    SchedulerConfig {
        thermocouple_channels: 2,
        max_samples: Some(max_samples),
        ..SchedulerConfig::default()
    }
}

// =============================================================================
// Clean runs
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_to_sample_cap_completes() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 1.0);
    let (mut scheduler, _handle) =
        Scheduler::new(SimulatedInstruments::ambient(), config(3));

    let summary = scheduler.run(&mut access, test_id).await.unwrap();
    assert_eq!(summary.state, SchedulerState::Completed);
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.drift_events, 0);
    assert_eq!(scheduler.state(), SchedulerState::Completed);
    assert_eq!(access.get_test(test_id).unwrap().status, TestStatus::Completed);

    let series: Vec<_> = access
        .read_series(test_id)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    let indices: Vec<i64> = series.iter().map(|o| o.spec.idx).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    // Heater idle: no power readings recorded.
    assert!(series.iter().all(|o| o.spec.pow_out.is_none()));
    // Two thermocouple channels per cycle.
    assert!(series.iter().all(|o| o.spec.temperatures.len() == 2));
}

#[tokio::test(start_paused = true)]
async fn test_heater_active_records_power_and_parks_at_zero() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 50.0, 1.0);
    let (mut scheduler, _handle) =
        Scheduler::new(SimulatedInstruments::ambient(), config(2));

    scheduler.run(&mut access, test_id).await.unwrap();
    let series: Vec<_> = access
        .read_series(test_id)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert!(series.iter().all(|o| o.spec.pow_out.is_some()));
    assert!(series.iter().all(|o| o.spec.pow_ref.is_some()));
}

// =============================================================================
// Fault scenario: instrument failure degrades, never aborts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_manometer_failure_flags_cycle_and_continues() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 1.0);
    let instruments = SimulatedInstruments::ambient().with_manometer_fault(1);
    let (mut scheduler, _handle) = Scheduler::new(instruments, config(3));

    let summary = scheduler.run(&mut access, test_id).await.unwrap();
    assert_eq!(summary.state, SchedulerState::Completed);
    assert_eq!(summary.samples, 3);

    let series: Vec<_> = access
        .read_series(test_id)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert!(series[0].spec.manometer_ok);
    assert!(!series[1].spec.manometer_ok);
    assert!(series[2].spec.manometer_ok);
    // The failed cycle substituted the prior cycle's last-known pressure.
    assert!((series[1].spec.pressure - series[0].spec.pressure).abs() < f64::EPSILON);
    // Hygrometer was healthy throughout.
    assert!(series.iter().all(|o| o.spec.hygrometer_ok));
}

// =============================================================================
// Timing scenario: overruns drift, never skip
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_overrunning_cycles_drift_without_skipping() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 0.1);
    // Every scale poll takes two full periods.
    let instruments =
        SimulatedInstruments::ambient().with_poll_delay(Duration::from_millis(200));
    let (mut scheduler, _handle) = Scheduler::new(instruments, config(3));

    let summary = scheduler.run(&mut access, test_id).await.unwrap();
    assert_eq!(summary.state, SchedulerState::Completed);
    assert_eq!(summary.samples, 3);
    // The final cycle ends the run before its budget check.
    assert_eq!(summary.drift_events, 2);

    let indices: Vec<i64> = access
        .read_series(test_id)
        .unwrap()
        .map(|o| o.unwrap().spec.idx)
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

// =============================================================================
// Operator commands
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_command_completes_mid_run() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 0.1);
    let (mut scheduler, handle) =
        Scheduler::new(SimulatedInstruments::ambient(), config(1_000));

    let run = tokio::spawn(async move {
        let outcome = scheduler.run(&mut access, test_id).await;
        (access, outcome)
    });
    tokio::time::sleep(Duration::from_millis(350)).await;
    handle.stop();
    let (access, outcome) = run.await.unwrap();

    let summary = outcome.unwrap();
    assert_eq!(summary.state, SchedulerState::Completed);
    assert!(summary.samples >= 1);
    assert_eq!(access.get_test(test_id).unwrap().status, TestStatus::Completed);
    assert_eq!(
        access.count_observations(test_id).unwrap(),
        summary.samples
    );
}

#[tokio::test(start_paused = true)]
async fn test_abort_command_wins_over_stop() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 1.0);
    let (mut scheduler, handle) =
        Scheduler::new(SimulatedInstruments::ambient(), config(1_000));

    // Both queued before the first cycle: abort takes precedence.
    handle.stop();
    handle.abort();
    let summary = scheduler.run(&mut access, test_id).await.unwrap();
    assert_eq!(summary.state, SchedulerState::Aborted);
    assert_eq!(summary.samples, 0);
    assert_eq!(access.get_test(test_id).unwrap().status, TestStatus::Aborted);
}

// =============================================================================
// Persistence failure aborts after the atomic append fails
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_integrity_violation_aborts_run() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access, 0.0, 1.0);

    // Pre-seed the index the third cycle will try to claim.
    access
        .append_observation(
            test_id,
            &ObservationSpec {
                idx: 2,
                mass: 0.5,
                dew_point: 284.0,
                pressure: 101_325.0,
                manometer_ok: true,
                hygrometer_ok: true,
                pow_out: None,
                pow_ref: None,
                temperatures: vec![Temperature {
                    thermocouple: 0,
                    temperature: 290.0,
                }],
            },
        )
        .unwrap();

    let (mut scheduler, _handle) =
        Scheduler::new(SimulatedInstruments::ambient(), config(10));
    let outcome = scheduler.run(&mut access, test_id).await;
    assert!(matches!(outcome, Err(Error::Aborted(_))));
    assert_eq!(scheduler.state(), SchedulerState::Aborted);
    assert_eq!(access.get_test(test_id).unwrap().status, TestStatus::Aborted);
    // Cycles 0 and 1 plus the pre-seeded row; the colliding append left
    // nothing behind.
    assert_eq!(access.count_observations(test_id).unwrap(), 3);
}
