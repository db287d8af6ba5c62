//! Hardware seam for everything the motion controller needs besides SPI.
//!
//! The powerSTEP01 exposes more than its serial port: a BUSY output, a SW
//! input the controller pulses to signal switch events, and whatever digital
//! inputs the limit switches are wired to. [`MotorIo`] abstracts those lines
//! so the controller runs the same against real GPIO or a test double.

use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A general-purpose digital input, as numbered by the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigitalInput(pub u8);

/// Electrical polarity of a limit switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchLogic {
    /// Switch reads high when pressed.
    ActiveHigh,
    /// Switch reads low when pressed.
    ActiveLow,
}

impl SwitchLogic {
    /// Input level when the switch is pressed.
    pub const fn active_level(self) -> bool {
        matches!(self, SwitchLogic::ActiveHigh)
    }

    /// Edge that signals the switch being pressed.
    pub const fn press_edge(self) -> InterruptEdge {
        match self {
            SwitchLogic::ActiveHigh => InterruptEdge::Rising,
            SwitchLogic::ActiveLow => InterruptEdge::Falling,
        }
    }

    /// Edge that signals the switch being released.
    pub const fn release_edge(self) -> InterruptEdge {
        match self {
            SwitchLogic::ActiveHigh => InterruptEdge::Falling,
            SwitchLogic::ActiveLow => InterruptEdge::Rising,
        }
    }
}

/// Digital input edge selection for interrupt binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptEdge {
    /// Low-to-high transition.
    Rising,
    /// High-to-low transition.
    Falling,
}

/// Producer side of a motor's busy-event channel.
///
/// Hand this to the BUSY-pin rising-edge interrupt. The channel holds one
/// pending event; notifying while one is queued drops the new one, which is
/// fine because consumers re-check the pin level anyway.
#[derive(Debug, Clone)]
pub struct BusyEvents {
    tx: SyncSender<()>,
}

impl BusyEvents {
    pub(crate) fn new(tx: SyncSender<()>) -> BusyEvents {
        BusyEvents { tx }
    }

    /// Signals a busy-pin rising edge. Never blocks.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Callable handle a [`MotorIo`] invokes when a bound limit-switch edge
/// fires. Cloneable so the IO layer can keep it across re-attachments.
#[derive(Clone)]
pub struct SwitchTrigger {
    f: Arc<dyn Fn() + Send + Sync>,
}

impl SwitchTrigger {
    pub(crate) fn new(f: impl Fn() + Send + Sync + 'static) -> SwitchTrigger {
        SwitchTrigger { f: Arc::new(f) }
    }

    /// Forwards the switch event to the controller.
    pub fn trigger(&self) {
        (self.f)()
    }
}

impl core::fmt::Debug for SwitchTrigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SwitchTrigger")
    }
}

/// Non-SPI hardware lines used by the motion controller.
pub trait MotorIo: Send + Sync + 'static {
    /// Level of a digital input.
    fn digital_read(&self, input: DigitalInput) -> bool;

    /// Binds `trigger` to an edge on a digital input, replacing any earlier
    /// binding for the same input.
    fn attach_interrupt(&self, input: DigitalInput, edge: InterruptEdge, trigger: SwitchTrigger);

    /// Removes the interrupt binding for an input.
    fn detach_interrupt(&self, input: DigitalInput);

    /// Level of a motor's BUSY pin. High means no command is executing.
    fn busy_level(&self, motor: usize) -> bool;

    /// Drives the SW input line of a motor's driver chip.
    fn set_switch_level(&self, motor: usize, high: bool);

    /// Raw 12-bit ADC sample of the supply-voltage divider.
    fn supply_adc(&self) -> u16;

    /// Blocks the calling thread for `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

/// Supply voltage in volts from the raw divider sample (R1 = 510 Ω,
/// R2 = 4.3 kΩ against a 3.3 V, 12-bit ADC).
pub fn supply_voltage_from_adc(adc: u16) -> f32 {
    let pin = adc as f32 * 3.3 / 4095.0;
    pin * (510.0 + 4300.0) / 510.0
}
