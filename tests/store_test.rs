//! Registry and Observation Store integration tests
//!
//! Covers the end-to-end persistence scenario: pool, settings, and test
//! registration, atomic observation appends, and ordered series reads.

use chamber_core::access::{
    ChamberAccess, ObservationSpec, PoolSpec, SettingsSpec, Temperature, TestSpec,
};
use chamber_core::{Error, Result};
use chrono::{TimeZone, Utc};

fn pool_spec() -> PoolSpec {
    PoolSpec {
        inner_diameter: 0.03,
        outer_diameter: 0.04,
        height: 0.06,
        material: "Delrin".to_string(),
        mass: 0.056_78,
    }
}

fn settings_spec() -> SettingsSpec {
    SettingsSpec {
        duty: 0.0,
        pressure: 101_325,
        temperature: 300.0,
        time_step: 1.0,
    }
}

fn observation(idx: i64, mass: f64, temps: &[(u32, f64)]) -> ObservationSpec {
    ObservationSpec {
        idx,
        mass,
        dew_point: 284.0,
        pressure: 101_325.0,
        manometer_ok: true,
        hygrometer_ok: true,
        pow_out: None,
        pow_ref: None,
        temperatures: temps
            .iter()
            .map(|&(thermocouple, temperature)| Temperature {
                thermocouple,
                temperature,
            })
            .collect(),
    }
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[test]
fn test_end_to_end_persistence_scenario() {
    let mut access = ChamberAccess::open_in_memory().unwrap();

    let pool_id = access.create_pool(&pool_spec()).unwrap();
    let setting_id = access.create_settings(&settings_spec()).unwrap();
    let test_id = access
        .create_test(&TestSpec {
            author: "RHI".to_string(),
            started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
            description: "end-to-end scenario".to_string(),
            pool_id,
            setting_id,
        })
        .unwrap();

    let samples = [
        (0_i64, 0.999, [(0_u32, 290.0), (1, 290.2)]),
        (1, 0.998, [(0, 291.0), (1, 291.2)]),
        (2, 0.997, [(0, 292.0), (1, 292.2)]),
    ];
    for (idx, mass, temps) in &samples {
        access
            .append_observation(test_id, &observation(*idx, *mass, temps))
            .unwrap();
    }

    let series: Vec<_> = access
        .read_series(test_id)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(series.len(), 3);
    for (read, (idx, mass, temps)) in series.iter().zip(&samples) {
        assert_eq!(read.test_id, test_id);
        assert_eq!(read.spec.idx, *idx);
        assert!((read.spec.mass - mass).abs() < f64::EPSILON);
        assert_eq!(read.spec.temperatures.len(), 2);
        for (reading, (channel, temperature)) in read.spec.temperatures.iter().zip(temps) {
            assert_eq!(reading.thermocouple, *channel);
            assert!((reading.temperature - temperature).abs() < f64::EPSILON);
        }
    }
}

// =============================================================================
// Registry constraints
// =============================================================================

#[test]
fn test_registered_entities_read_back() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let pool_id = access.create_pool(&pool_spec()).unwrap();
    let setting_id = access.create_settings(&settings_spec()).unwrap();

    assert_eq!(access.get_pool(pool_id).unwrap().spec, pool_spec());
    assert_eq!(access.get_settings(setting_id).unwrap().spec, settings_spec());
    assert!(matches!(
        access.get_pool(pool_id + 1),
        Err(Error::NotFound { entity: "pool", .. })
    ));
}

#[test]
fn test_duplicate_start_time_is_integrity_error() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let pool_id = access.create_pool(&pool_spec()).unwrap();
    let setting_id = access.create_settings(&settings_spec()).unwrap();
    let spec = TestSpec {
        author: "RHI".to_string(),
        started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
        description: "first run".to_string(),
        pool_id,
        setting_id,
    };
    access.create_test(&spec).unwrap();
    assert!(matches!(access.create_test(&spec), Err(Error::Integrity(_))));
}

#[test]
fn test_dangling_references_are_not_found() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let pool_id = access.create_pool(&pool_spec()).unwrap();
    let spec = TestSpec {
        author: "RHI".to_string(),
        started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
        description: "missing settings".to_string(),
        pool_id,
        setting_id: 42,
    };
    assert!(matches!(
        access.create_test(&spec),
        Err(Error::NotFound {
            entity: "settings",
            ..
        })
    ));
}

// =============================================================================
// Store invariants
// =============================================================================

fn seeded_test(access: &mut ChamberAccess) -> i64 {
    let pool_id = access.create_pool(&pool_spec()).unwrap();
    let setting_id = access.create_settings(&settings_spec()).unwrap();
    access
        .create_test(&TestSpec {
            author: "RHI".to_string(),
            started_at: Utc.with_ymd_and_hms(2019, 9, 24, 7, 45, 0).unwrap(),
            description: "store invariants".to_string(),
            pool_id,
            setting_id,
        })
        .unwrap()
}

#[test]
fn test_sequence_indices_strictly_increasing_no_duplicates() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access);
    let mut successful = 0_u64;
    for idx in [3_i64, 0, 7, 1, 0, 3] {
        match access.append_observation(test_id, &observation(idx, 1.0, &[(0, 290.0)])) {
            Ok(()) => successful += 1,
            Err(Error::Integrity(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(successful, 4);

    let indices: Vec<i64> = access
        .read_series(test_id)
        .unwrap()
        .map(|o| o.unwrap().spec.idx)
        .collect();
    assert_eq!(indices, vec![0, 1, 3, 7]);
    assert_eq!(access.count_observations(test_id).unwrap(), successful);
}

#[test]
fn test_append_is_atomic_under_mid_write_failure() {
    let mut access = ChamberAccess::open_in_memory().unwrap();
    let test_id = seeded_test(&mut access);

    // The duplicate channel fails after the observation row and the first
    // temperature row were written inside the transaction; nothing may
    // remain visible.
    let result = access.append_observation(
        test_id,
        &observation(0, 0.999, &[(0, 290.0), (1, 290.5), (1, 291.0)]),
    );
    assert!(matches!(result, Err(Error::Integrity(_))));
    assert_eq!(access.count_observations(test_id).unwrap(), 0);
    assert_eq!(access.read_series(test_id).unwrap().count(), 0);
}
