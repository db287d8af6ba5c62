//! Threaded motion controller for a chain of powerSTEP01 drivers.
//!
//! [`StepperController`] owns the transport and the per-motor bookkeeping:
//! limit-switch bindings, homing state, busy-event channels. Homing runs on a
//! spawned thread per request; everything else executes on the caller.

mod controller;
mod homing;

pub use controller::{StepperController, SwitchBinding, MAX_LIMIT_SWITCHES};

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::registers::fields::{Status, ThermalStatus};

/// Cooperative cancellation flag for a homing run.
///
/// The flag sits behind its own lock so a stop request and the homing task
/// reading it serialize against each other, independent of the homing lock.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: Mutex<bool>,
}

impl CancelToken {
    /// Creates a token with no cancellation requested.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation.
    pub fn request(&self) {
        *lock(&self.flag) = true;
    }

    /// Clears the token at the start of a run.
    pub(crate) fn clear(&self) {
        *lock(&self.flag) = false;
    }

    /// Whether cancellation was requested.
    pub fn is_requested(&self) -> bool {
        *lock(&self.flag)
    }
}

/// Fault condition decoded from a FLAG-pin status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlagEvent {
    /// The device rejected a command.
    CmdError,
    /// Supply undervoltage lockout.
    Uvlo,
    /// ADC supply undervoltage.
    UvloAdc,
    /// Thermal warning threshold crossed.
    ThermalWarning,
    /// Bridges or device shut down thermally.
    ThermalShutdown,
    /// Overcurrent detected.
    Ocd,
    /// Stall detected on bridge A.
    StallA,
    /// Stall detected on bridge B.
    StallB,
}

impl FlagEvent {
    /// Decodes the asserted fault conditions out of a status word.
    pub fn decode(status: Status) -> heapless::Vec<FlagEvent, 8> {
        let mut events = heapless::Vec::new();
        let mut push = |e| {
            let _ = events.push(e);
        };
        if status.cmd_error {
            push(FlagEvent::CmdError);
        }
        if !status.uvlo {
            push(FlagEvent::Uvlo);
        }
        if !status.uvlo_adc {
            push(FlagEvent::UvloAdc);
        }
        match status.thermal {
            ThermalStatus::Warning => push(FlagEvent::ThermalWarning),
            ThermalStatus::BridgesShutdown | ThermalStatus::DeviceShutdown => {
                push(FlagEvent::ThermalShutdown)
            }
            ThermalStatus::Normal => {}
        }
        if !status.ocd {
            push(FlagEvent::Ocd);
        }
        if !status.stall_a {
            push(FlagEvent::StallA);
        }
        if !status.stall_b {
            push(FlagEvent::StallB);
        }
        events
    }
}

/// Locks a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
