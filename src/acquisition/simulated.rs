//! Simulated instrument set
//!
//! Deterministic stand-in for the hardware drivers: steady chamber
//! conditions, a linearly draining pool mass, and scripted fault/delay
//! injection. Used by the test suite and for dry runs without a chamber
//! attached.

use std::collections::HashSet;

use tokio::time::{sleep, Duration};

use super::instruments::{Instruments, Reading};

/// Scripted instrument set with steady readings and optional fault
/// injection.
#[derive(Debug, Clone)]
pub struct SimulatedInstruments {
    mass: f64,
    mass_step: f64,
    dew_point: f64,
    pressure: f64,
    temperature: f64,
    heater_duty: f64,
    mass_reads: u64,
    pressure_reads: u64,
    dew_point_reads: u64,
    manometer_faults: HashSet<u64>,
    hygrometer_faults: HashSet<u64>,
    poll_delay: Duration,
}

impl SimulatedInstruments {
    /// Steady chamber at the given conditions, with the scale draining by
    /// `mass_step` kg per read.
    #[must_use]
    pub fn new(mass: f64, mass_step: f64, dew_point: f64, pressure: f64, temperature: f64) -> Self {
        Self {
            mass,
            mass_step,
            dew_point,
            pressure,
            temperature,
            heater_duty: 0.0,
            mass_reads: 0,
            pressure_reads: 0,
            dew_point_reads: 0,
            manometer_faults: HashSet::new(),
            hygrometer_faults: HashSet::new(),
            poll_delay: Duration::ZERO,
        }
    }

    /// Ambient conditions: 1 g of water at 101 325 Pa, 290 K, dew point
    /// 284 K, draining 1 ug per cycle.
    #[must_use]
    pub fn ambient() -> Self {
        Self::new(1.0e-3, 1.0e-9, 284.0, 101_325.0, 290.0)
    }

    /// Fail the manometer on the given read (0-based).
    #[must_use]
    pub fn with_manometer_fault(mut self, read: u64) -> Self {
        self.manometer_faults.insert(read);
        self
    }

    /// Fail the hygrometer on the given read (0-based).
    #[must_use]
    pub fn with_hygrometer_fault(mut self, read: u64) -> Self {
        self.hygrometer_faults.insert(read);
        self
    }

    /// Delay every scale poll, to exercise cycle overrun.
    #[must_use]
    pub const fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Last commanded heater duty in percent.
    #[must_use]
    pub const fn heater_duty(&self) -> f64 {
        self.heater_duty
    }
}

impl Instruments for SimulatedInstruments {
    async fn read_mass(&mut self) -> Reading {
        if !self.poll_delay.is_zero() {
            sleep(self.poll_delay).await;
        }
        let value = self.mass_step.mul_add(-(self.mass_reads as f64), self.mass);
        self.mass_reads += 1;
        Reading::valid(value)
    }

    async fn read_dew_point(&mut self) -> Reading {
        let read = self.dew_point_reads;
        self.dew_point_reads += 1;
        if self.hygrometer_faults.contains(&read) {
            Reading::failed()
        } else {
            Reading::valid(self.dew_point)
        }
    }

    async fn read_pressure(&mut self) -> Reading {
        let read = self.pressure_reads;
        self.pressure_reads += 1;
        if self.manometer_faults.contains(&read) {
            Reading::failed()
        } else {
            Reading::valid(self.pressure)
        }
    }

    async fn read_thermocouple(&mut self, channel: u32) -> f64 {
        // Small fixed spread across channels, matching a real rake.
        self.temperature + 0.2 * f64::from(channel)
    }

    async fn read_power_output(&mut self) -> Reading {
        Reading::valid(self.heater_duty * 0.2)
    }

    async fn read_power_reference(&mut self) -> Reading {
        Reading::valid(self.heater_duty * 0.2)
    }

    async fn set_heater_duty(&mut self, percent: f64) {
        self.heater_duty = percent;
    }
}
