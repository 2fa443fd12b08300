//! Acquisition: instrument interface and the timed control loop
//!
//! The [`Scheduler`] drives one test through the state machine
//! `Idle -> Running -> (Completed | Aborted)`, polling the instruments each
//! time step, applying the heater duty command, tagging sample health, and
//! handing each sample to the observation store atomically. Instrument
//! failures never abort a run; persistence failures do, after bounded
//! retries.

mod instruments;
mod scheduler;
mod simulated;

pub use instruments::{Instruments, Reading, INVALID_READING};
pub use scheduler::{
    Command, RunSummary, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerState,
};
pub use simulated::SimulatedInstruments;
