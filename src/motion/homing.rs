//! The homing sequence, run on its own thread per request.
//!
//! Two phases: GO_UNTIL in reverse seeks the switch and zeroes the position
//! on contact, then RELEASE_SW in forward backs off until the switch opens.
//! Between the phases the switch interrupt polarity is inverted so the
//! release edge also stops the motor. A stop issued while the first phase
//! holds the homing lock cancels the release phase.

use std::sync::mpsc::Receiver;
use std::time::Duration;

use embedded_hal::spi::SpiDevice;
use log::{error, warn};

use super::controller::{StepperController, SwitchBinding};
use super::lock;
use crate::error::Result;
use crate::hal::MotorIo;
use crate::registers::{Direction, SwitchAction};

/// Poll interval while waiting for the BUSY pin during homing.
const BUSY_POLL: Duration = Duration::from_millis(10);

pub(super) fn run<SPI, IO>(ctl: StepperController<SPI, IO>, motor: usize, steps_per_s: f32)
where
    SPI: SpiDevice + Send + 'static,
    IO: MotorIo,
{
    let state = &ctl.inner.motors[motor];
    let _guard = lock(&state.homing);

    let binding = lock(&state.switches).first().copied();
    let Some(binding) = binding else {
        error!("motor {}: attach a limit switch before homing", motor);
        return;
    };

    state.cancel.clear();

    if let Err(e) = seek_and_release(&ctl, motor, binding, steps_per_s) {
        error!("motor {}: homing failed: {}", motor, e);
    }

    // Restore the normal press-edge binding whatever happened above.
    ctl.inner
        .io
        .attach_interrupt(binding.input, binding.logic.press_edge(), ctl.switch_trigger(motor));
}

fn seek_and_release<SPI, IO>(
    ctl: &StepperController<SPI, IO>,
    motor: usize,
    binding: SwitchBinding,
    steps_per_s: f32,
) -> Result<()>
where
    SPI: SpiDevice + Send + 'static,
    IO: MotorIo,
{
    let io = &ctl.inner.io;
    let state = &ctl.inner.motors[motor];
    let active = binding.logic.active_level();

    // Phase 1: seek the switch, unless the motor already sits on it.
    if io.digital_read(binding.input) != active {
        ctl.with_device(motor, |dev| {
            dev.go_until(SwitchAction::ResetAbsPos, Direction::Reverse, steps_per_s)
        })?;
        let rx = lock(&state.busy_rx);
        drain(&rx);
        while !io.busy_level(motor) && io.digital_read(binding.input) != active {
            let _ = rx.recv_timeout(BUSY_POLL);
        }
        // Switch reached but the event did not stop the motor: force it.
        if !io.busy_level(motor) {
            pulse_switch(io, motor);
        }
    }

    // Invert the interrupt so leaving the switch also raises the event.
    io.attach_interrupt(
        binding.input,
        binding.logic.release_edge(),
        ctl.switch_trigger(motor),
    );

    if state.cancel.is_requested() {
        warn!("motor {}: homing aborted", motor);
        return Ok(());
    }

    // Phase 2: back off until the switch opens.
    ctl.with_device(motor, |dev| {
        dev.release_switch(SwitchAction::ResetAbsPos, Direction::Forward)
    })?;
    if io.digital_read(binding.input) != active {
        // Already clear of the switch; give the device its stop event or it
        // would run forever.
        pulse_switch(io, motor);
    } else {
        let rx = lock(&state.busy_rx);
        drain(&rx);
        while !io.busy_level(motor) && io.digital_read(binding.input) == active {
            let _ = rx.recv_timeout(BUSY_POLL);
        }
        if !io.busy_level(motor) {
            pulse_switch(io, motor);
        }
    }
    Ok(())
}

fn drain(rx: &Receiver<()>) {
    while rx.try_recv().is_ok() {}
}

fn pulse_switch<IO: MotorIo>(io: &IO, motor: usize) {
    io.set_switch_level(motor, true);
    io.delay_ms(1);
    io.set_switch_level(motor, false);
}
