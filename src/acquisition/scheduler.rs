//! Acquisition Scheduler: the timed control loop
//!
//! One sequential loop per test: each cycle issues the heater duty command,
//! polls every instrument, tags sample health, and submits the observation
//! atomically. Instrument trouble degrades the sample (health flag false,
//! last-known value substituted) but never stops the run; only an operator
//! command, the sample cap, or exhausted persistence retries end it.
//!
//! Timing policy: the cycle budget is the configured time step. An
//! overrunning cycle runs to completion, the overrun is counted as a drift
//! event, and the next cycle starts immediately — the schedule shifts
//! rather than bursting to catch up, so sequence order is preserved but
//! inter-sample spacing is not uniform under sustained overrun.

use std::ops::RangeInclusive;

use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Duration, Instant};

use super::instruments::{Instruments, INVALID_READING};
use crate::access::{ChamberAccess, ObservationSpec, Temperature, TestStatus};
use crate::{Error, Result};

const MASS_RANGE: RangeInclusive<f64> = 1.0e-6..=10.0;
const DEW_POINT_RANGE: RangeInclusive<f64> = 230.0..=330.0;
const PRESSURE_RANGE: RangeInclusive<f64> = 1_000.0..=200_000.0;
const THERMOCOUPLE_RANGE: RangeInclusive<f64> = 200.0..=500.0;
const POWER_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Operator command delivered to a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Finish the in-flight cycle, then transition to `Completed`.
    Stop,
    /// Finish the in-flight cycle, then transition to `Aborted`.
    Abort,
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet started.
    Idle,
    /// Control loop producing observations.
    Running,
    /// Final: stopped cleanly, series complete.
    Completed,
    /// Final: aborted by command or persistence failure, series incomplete.
    Aborted,
}

/// Acquisition loop configuration beyond what Settings carries.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Thermocouple channels polled each cycle, 0..N-1.
    pub thermocouple_channels: u32,
    /// Stop cleanly after this many samples, if set.
    pub max_samples: Option<u64>,
    /// Bounded retries for a failed atomic append.
    pub max_persist_retries: u32,
    /// Base backoff between persistence retries; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thermocouple_channels: 4,
            max_samples: None,
            max_persist_retries: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Command handle to a scheduler; clone freely across tasks.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Request a clean stop after the in-flight cycle.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// Request an abort after the in-flight cycle.
    pub fn abort(&self) {
        let _ = self.commands.send(Command::Abort);
    }
}

/// What a finished run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// The test this run produced observations for.
    pub test_id: i64,
    /// Terminal state, `Completed` or `Aborted`.
    pub state: SchedulerState,
    /// Observations appended.
    pub samples: u64,
    /// Cycles that overran the time-step budget.
    pub drift_events: u64,
}

/// Last-known good values carried across cycles for substitution.
struct LastKnown {
    mass: f64,
    dew_point: f64,
    pressure: f64,
    power_out: f64,
    power_ref: f64,
    thermocouples: Vec<f64>,
}

impl LastKnown {
    fn new(channels: u32) -> Self {
        Self {
            mass: INVALID_READING,
            dew_point: INVALID_READING,
            pressure: INVALID_READING,
            power_out: INVALID_READING,
            power_ref: INVALID_READING,
            thermocouples: vec![INVALID_READING; channels as usize],
        }
    }
}

/// The acquisition control loop for one test.
pub struct Scheduler<I> {
    instruments: I,
    config: SchedulerConfig,
    state: SchedulerState,
    commands: mpsc::UnboundedReceiver<Command>,
    drift_events: u64,
}

impl<I: Instruments> Scheduler<I> {
    /// Create an idle scheduler and its command handle.
    #[must_use]
    pub fn new(instruments: I, config: SchedulerConfig) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                instruments,
                config,
                state: SchedulerState::Idle,
                commands: rx,
                drift_events: 0,
            },
            SchedulerHandle { commands: tx },
        )
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run the acquisition loop for `test_id` until a stop command, the
    /// sample cap, or a fatal persistence failure; the test's status is
    /// finalized on every exit path and the heater is left at zero duty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Integrity`] if the scheduler is not idle or the test
    /// is not in `Running` status, [`Error::NotFound`] for a missing test,
    /// and [`Error::Aborted`] when persistence retries are exhausted or an
    /// integrity violation surfaces mid-run (the test is marked aborted
    /// first).
    pub async fn run(&mut self, access: &mut ChamberAccess, test_id: i64) -> Result<RunSummary> {
        if self.state != SchedulerState::Idle {
            return Err(Error::Integrity(format!(
                "scheduler is {:?}, expected Idle",
                self.state
            )));
        }
        let test = access.get_test(test_id)?;
        if test.status != TestStatus::Running {
            return Err(Error::Integrity(format!(
                "test {test_id} is {}; cannot start acquisition",
                test.status.as_str()
            )));
        }
        let settings = access.get_settings(test.spec.setting_id)?.spec;
        let period = Duration::from_secs_f64(settings.time_step);
        let heater_active = settings.duty > 0.0;
        self.state = SchedulerState::Running;
        tracing::info!(
            test_id,
            duty = settings.duty,
            time_step = settings.time_step,
            "acquisition started"
        );

        let mut last = LastKnown::new(self.config.thermocouple_channels);
        let mut idx: i64 = 0;
        let mut fatal: Option<Error> = None;
        let mut next_deadline = Instant::now() + period;

        let terminal = loop {
            if let Some(command) = self.drain_commands() {
                break match command {
                    Command::Stop => SchedulerState::Completed,
                    Command::Abort => SchedulerState::Aborted,
                };
            }

            self.instruments.set_heater_duty(settings.duty).await;

            let observation = self.poll_cycle(idx, heater_active, &mut last).await;
            if let Err(e) = self.persist_with_retry(access, test_id, &observation).await {
                tracing::error!(test_id, idx, error = %e, "sample lost; aborting");
                fatal = Some(e);
                break SchedulerState::Aborted;
            }
            idx += 1;

            #[allow(clippy::cast_sign_loss)]
            let samples = idx as u64;
            if self.config.max_samples.is_some_and(|cap| samples >= cap) {
                break SchedulerState::Completed;
            }

            let now = Instant::now();
            if now >= next_deadline {
                // Overrun: run long, start the next cycle immediately.
                self.drift_events += 1;
                tracing::warn!(test_id, idx, "cycle overran the time-step budget");
                next_deadline = now + period;
            } else {
                sleep_until(next_deadline).await;
                next_deadline += period;
            }
        };

        // Leave the heater safe on every exit path.
        self.instruments.set_heater_duty(0.0).await;
        let db_status = match terminal {
            SchedulerState::Completed => TestStatus::Completed,
            _ => TestStatus::Aborted,
        };
        if let Err(e) = access.set_test_status(test_id, db_status) {
            // Don't let a finalize failure mask the abort that caused it.
            if fatal.is_none() {
                return Err(e);
            }
            tracing::error!(test_id, error = %e, "failed to finalize test status");
        }
        self.state = terminal;

        #[allow(clippy::cast_sign_loss)]
        let summary = RunSummary {
            test_id,
            state: terminal,
            samples: idx as u64,
            drift_events: self.drift_events,
        };
        tracing::info!(
            test_id,
            samples = summary.samples,
            drift_events = summary.drift_events,
            state = ?terminal,
            "acquisition finished"
        );
        match fatal {
            Some(e) => Err(Error::Aborted(format!(
                "persistence failed at sequence index {idx}: {e}"
            ))),
            None => Ok(summary),
        }
    }

    fn drain_commands(&mut self) -> Option<Command> {
        let mut last = None;
        while let Ok(command) = self.commands.try_recv() {
            // Abort wins over a queued stop.
            if command == Command::Abort {
                return Some(command);
            }
            last = Some(command);
        }
        last
    }

    async fn poll_cycle(
        &mut self,
        idx: i64,
        heater_active: bool,
        last: &mut LastKnown,
    ) -> ObservationSpec {
        let reading = self.instruments.read_mass().await;
        let (mass, scale_ok) = accept(reading.value, reading.ok, &MASS_RANGE, &mut last.mass);
        if !scale_ok {
            tracing::warn!(idx, "scale read failed; substituting last-known mass");
        }

        let reading = self.instruments.read_dew_point().await;
        let (dew_point, hygrometer_ok) = accept(
            reading.value,
            reading.ok,
            &DEW_POINT_RANGE,
            &mut last.dew_point,
        );

        let reading = self.instruments.read_pressure().await;
        let (pressure, manometer_ok) = accept(
            reading.value,
            reading.ok,
            &PRESSURE_RANGE,
            &mut last.pressure,
        );
        if !manometer_ok || !hygrometer_ok {
            tracing::warn!(idx, manometer_ok, hygrometer_ok, "unhealthy cycle recorded");
        }

        let mut temperatures = Vec::with_capacity(last.thermocouples.len());
        for channel in 0..self.config.thermocouple_channels {
            let value = self.instruments.read_thermocouple(channel).await;
            let (temperature, _) = accept(
                value,
                true,
                &THERMOCOUPLE_RANGE,
                &mut last.thermocouples[channel as usize],
            );
            temperatures.push(Temperature {
                thermocouple: channel,
                temperature,
            });
        }

        let (pow_out, pow_ref) = if heater_active {
            let reading = self.instruments.read_power_output().await;
            let (out, _) = accept(reading.value, reading.ok, &POWER_RANGE, &mut last.power_out);
            let reading = self.instruments.read_power_reference().await;
            let (reference, _) =
                accept(reading.value, reading.ok, &POWER_RANGE, &mut last.power_ref);
            (Some(out), Some(reference))
        } else {
            (None, None)
        };

        ObservationSpec {
            idx,
            mass,
            dew_point,
            pressure,
            manometer_ok,
            hygrometer_ok,
            pow_out,
            pow_ref,
            temperatures,
        }
    }

    async fn persist_with_retry(
        &mut self,
        access: &mut ChamberAccess,
        test_id: i64,
        observation: &ObservationSpec,
    ) -> Result<()> {
        let mut backoff = self.config.retry_backoff;
        for attempt in 0..=self.config.max_persist_retries {
            match access.append_observation(test_id, observation) {
                Ok(()) => return Ok(()),
                // Constraint violations are bugs, not transient faults.
                Err(e @ (Error::Integrity(_) | Error::NotFound { .. })) => return Err(e),
                Err(e) if attempt < self.config.max_persist_retries => {
                    tracing::warn!(
                        test_id,
                        idx = observation.idx,
                        attempt,
                        error = %e,
                        "append failed; backing off"
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop returns on every path")
    }
}

/// Accept a reading if the driver reported it ok and it is physically
/// plausible; otherwise substitute the last-known good value (or the invalid
/// sentinel when none exists). Returns the stored value and the health flag.
fn accept(value: f64, ok: bool, range: &RangeInclusive<f64>, last: &mut f64) -> (f64, bool) {
    if ok && value.is_finite() && range.contains(&value) {
        *last = value;
        (value, true)
    } else {
        (*last, false)
    }
}
