//! The owning controller for a daisy chain of stepper drivers.

use core::fmt::Write as _;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc, Mutex, TryLockError};
use std::thread;
use std::time::Duration;

use embedded_hal::spi::SpiDevice;
use log::error;

use super::{homing, lock, CancelToken, FlagEvent};
use crate::device::Device;
use crate::error::{MotionError, Result, TransportError};
use crate::hal::{
    supply_voltage_from_adc, BusyEvents, DigitalInput, MotorIo, SwitchLogic, SwitchTrigger,
};
use crate::registers::fields::{ControlMode, Status, StepResolution};
use crate::registers::{Direction, Register, StopMode};
use crate::transport::Chain;

/// Limit switches that can be bound to one motor.
pub const MAX_LIMIT_SWITCHES: usize = 4;

/// Supply voltage above which the internal VCC regulator is switched to its
/// high output.
const VCC_THRESHOLD_V: f32 = 15.0;

/// Torque references are clamped to this at startup in current mode.
const TVAL_STARTUP_CLAMP_MV: f32 = 300.0;

/// A limit switch bound to a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBinding {
    /// Digital input the switch is wired to.
    pub input: DigitalInput,
    /// Switch polarity.
    pub logic: SwitchLogic,
}

pub(super) struct MotorState {
    pub(super) homing: Mutex<()>,
    pub(super) cancel: CancelToken,
    pub(super) busy_tx: SyncSender<()>,
    pub(super) busy_rx: Mutex<Receiver<()>>,
    pub(super) switches: Mutex<heapless::Vec<SwitchBinding, MAX_LIMIT_SWITCHES>>,
}

impl MotorState {
    fn new() -> MotorState {
        // One slot: a pending busy edge is a level, not a count.
        let (busy_tx, busy_rx) = mpsc::sync_channel(1);
        MotorState {
            homing: Mutex::new(()),
            cancel: CancelToken::new(),
            busy_tx,
            busy_rx: Mutex::new(busy_rx),
            switches: Mutex::new(heapless::Vec::new()),
        }
    }
}

type FlagHandler = Box<dyn Fn(usize, FlagEvent) + Send + Sync>;

pub(super) struct ControllerInner<SPI, IO> {
    pub(super) chain: Mutex<Chain<SPI>>,
    pub(super) io: IO,
    pub(super) motors: Vec<MotorState>,
    flag_handler: Mutex<Option<FlagHandler>>,
}

/// Motion controller for every motor on one chain.
///
/// Cloning is cheap and every clone drives the same chain; homing tasks and
/// interrupt handles hold clones internally.
pub struct StepperController<SPI, IO> {
    pub(super) inner: Arc<ControllerInner<SPI, IO>>,
}

impl<SPI, IO> Clone for StepperController<SPI, IO> {
    fn clone(&self) -> Self {
        StepperController {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<SPI, IO> StepperController<SPI, IO>
where
    SPI: SpiDevice + Send + 'static,
    IO: MotorIo,
{
    /// Wraps a transport and its IO lines into a controller.
    pub fn new(chain: Chain<SPI>, io: IO) -> StepperController<SPI, IO> {
        let motors = (0..chain.device_count()).map(|_| MotorState::new()).collect();
        StepperController {
            inner: Arc::new(ControllerInner {
                chain: Mutex::new(chain),
                io,
                motors,
                flag_handler: Mutex::new(None),
            }),
        }
    }

    /// Motors on the chain.
    pub fn motor_count(&self) -> usize {
        self.inner.motors.len()
    }

    fn motor_state(&self, motor: usize) -> Result<&MotorState> {
        self.inner.motors.get(motor).ok_or_else(|| {
            TransportError::DeviceOutOfRange {
                index: motor,
                count: self.inner.motors.len(),
            }
            .into()
        })
    }

    /// Runs `f` against one device with the chain locked.
    pub fn with_device<R>(
        &self,
        motor: usize,
        f: impl FnOnce(&mut Device<'_, SPI>) -> Result<R>,
    ) -> Result<R> {
        let mut chain = lock(&self.inner.chain);
        f(&mut Device::new(&mut chain, motor))
    }

    /// Producer handle for a motor's BUSY-pin interrupt.
    pub fn busy_events(&self, motor: usize) -> Result<BusyEvents> {
        Ok(BusyEvents::new(self.motor_state(motor)?.busy_tx.clone()))
    }

    // --- limit switches ---

    /// Binds a limit switch to a motor, replacing any earlier binding on the
    /// same input.
    pub fn attach_limit_switch(
        &self,
        motor: usize,
        input: DigitalInput,
        logic: SwitchLogic,
    ) -> Result<()> {
        let state = self.motor_state(motor)?;
        {
            let mut switches = lock(&state.switches);
            switches.retain(|b| b.input != input);
            switches
                .push(SwitchBinding { input, logic })
                .map_err(|_| MotionError::TooManySwitches)?;
        }
        self.inner
            .io
            .attach_interrupt(input, logic.press_edge(), self.switch_trigger(motor));
        Ok(())
    }

    /// Removes a limit-switch binding.
    pub fn detach_limit_switch(&self, motor: usize, input: DigitalInput) -> Result<()> {
        let state = self.motor_state(motor)?;
        lock(&state.switches).retain(|b| b.input != input);
        self.inner.io.detach_interrupt(input);
        Ok(())
    }

    /// Limit switches currently bound to a motor.
    pub fn limit_switches(
        &self,
        motor: usize,
    ) -> Result<heapless::Vec<SwitchBinding, MAX_LIMIT_SWITCHES>> {
        Ok(lock(&self.motor_state(motor)?.switches).clone())
    }

    pub(super) fn switch_trigger(&self, motor: usize) -> SwitchTrigger {
        let ctl = self.clone();
        SwitchTrigger::new(move || ctl.pulse_switch(motor))
    }

    fn pulse_switch(&self, motor: usize) {
        self.inner.io.set_switch_level(motor, true);
        self.inner.io.delay_ms(1);
        self.inner.io.set_switch_level(motor, false);
    }

    /// Pulses the driver's SW input as if the limit switch had fired.
    pub fn trigger_limit_switch(&self, motor: usize) -> Result<()> {
        self.motor_state(motor)?;
        self.pulse_switch(motor);
        Ok(())
    }

    // --- motion ---

    /// Moves to an absolute position. With `microstep` false the target is in
    /// full steps and is scaled by the live resolution. A zero target becomes
    /// GO_HOME, which the device optimizes over GO_TO.
    pub fn move_absolute(&self, motor: usize, position: i32, microstep: bool) -> Result<()> {
        self.with_device(motor, |dev| {
            let mut target = position;
            if !microstep {
                let scale = dev.step_mode()?.step_sel.microsteps_per_step() as i32;
                target = position
                    .checked_mul(scale)
                    .ok_or(MotionError::PositionOutOfRange(position))?;
            }
            if target == 0 {
                dev.go_home()
            } else {
                dev.go_to(target)
            }
        })
    }

    /// Moves by a relative number of steps; the sign selects the direction.
    /// With `microstep` false the distance is in full steps.
    pub fn move_relative(&self, motor: usize, steps: i32, microstep: bool) -> Result<()> {
        self.with_device(motor, |dev| {
            let mut distance = steps;
            if !microstep {
                let scale = dev.step_mode()?.step_sel.microsteps_per_step() as i32;
                distance = steps
                    .checked_mul(scale)
                    .ok_or(MotionError::PositionOutOfRange(steps))?;
            }
            let direction = if distance >= 0 {
                Direction::Forward
            } else {
                Direction::Reverse
            };
            dev.move_steps(direction, distance.unsigned_abs())
        })
    }

    /// Spins at a constant speed until stopped.
    pub fn run(&self, motor: usize, direction: Direction, steps_per_s: f32) -> Result<()> {
        self.with_device(motor, |dev| dev.run(direction, steps_per_s))
    }

    /// Stops the motor. A homing run already holding its lock is told to
    /// cancel; one that has not reached its lock yet will proceed, which
    /// matches the hardware behavior of a stop racing the GO_UNTIL command.
    pub fn stop(&self, motor: usize, mode: StopMode) -> Result<()> {
        self.with_device(motor, |dev| dev.stop(mode))?;
        let state = self.motor_state(motor)?;
        match state.homing.try_lock() {
            Ok(guard) => drop(guard),
            Err(TryLockError::WouldBlock) => state.cancel.request(),
            Err(TryLockError::Poisoned(guard)) => drop(guard),
        }
        Ok(())
    }

    /// Blocks until the motor finishes its current command. Waits out a
    /// running homing task first, then watches the BUSY level, woken by the
    /// busy-event channel or every 500 ms, whichever comes first.
    pub fn wait(&self, motor: usize) -> Result<()> {
        let state = self.motor_state(motor)?;
        // Let the device pull BUSY low for the command just issued.
        self.inner.io.delay_ms(1);
        drop(lock(&state.homing));
        let rx = lock(&state.busy_rx);
        while rx.try_recv().is_ok() {}
        while !self.inner.io.busy_level(motor) {
            let _ = rx.recv_timeout(Duration::from_millis(500));
        }
        Ok(())
    }

    /// Starts homing toward the bound limit switch on a background thread.
    ///
    /// Fails fast when no switch is bound; no bus command is issued in that
    /// case. Progress is observed with [`wait`](Self::wait).
    pub fn homing(&self, motor: usize, steps_per_s: f32) -> Result<()> {
        let state = self.motor_state(motor)?;
        if lock(&state.switches).is_empty() {
            return Err(MotionError::NoLimitSwitch { motor }.into());
        }
        let ctl = self.clone();
        let mut name = heapless::String::<16>::new();
        let _ = write!(name, "homing-m{}", motor);
        thread::Builder::new()
            .name(name.as_str().into())
            .spawn(move || homing::run(ctl, motor, steps_per_s))
            .map_err(|e| {
                error!("could not spawn homing task for motor {}: {}", motor, e);
                let mut msg = heapless::String::new();
                let _ = write!(msg, "{}", e);
                MotionError::SpawnFailed(msg)
            })?;
        Ok(())
    }

    // --- positions and profile ---

    /// Absolute position in microsteps.
    pub fn get_position(&self, motor: usize) -> Result<i32> {
        self.with_device(motor, |dev| dev.abs_position())
    }

    /// Overwrites the absolute position register.
    pub fn set_position(&self, motor: usize, position: i32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_abs_position(position))
    }

    /// Mark position in microsteps.
    pub fn get_mark(&self, motor: usize) -> Result<i32> {
        self.with_device(motor, |dev| dev.mark())
    }

    /// Sets the mark position.
    pub fn set_mark(&self, motor: usize, position: i32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_mark(position))
    }

    /// Makes the current position the new home by re-anchoring ABS_POS.
    pub fn reset_home_position(&self, motor: usize) -> Result<()> {
        self.with_device(motor, |dev| {
            let position = dev.abs_position()?;
            dev.set_abs_position(position)
        })
    }

    /// Current speed in step/s.
    pub fn get_speed(&self, motor: usize) -> Result<f32> {
        self.with_device(motor, |dev| dev.speed())
    }

    /// Sets the speed ceiling of the motion profile, in step/s.
    pub fn set_max_speed(&self, motor: usize, steps_per_s: f32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_analog_value(Register::MaxSpeed, steps_per_s))
    }

    /// Speed ceiling of the motion profile, in step/s.
    pub fn get_max_speed(&self, motor: usize) -> Result<f32> {
        self.with_device(motor, |dev| dev.analog_value(Register::MaxSpeed))
    }

    /// Sets the profile minimum speed, in step/s.
    pub fn set_min_speed(&self, motor: usize, steps_per_s: f32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_analog_value(Register::MinSpeed, steps_per_s))
    }

    /// Profile minimum speed, in step/s.
    pub fn get_min_speed(&self, motor: usize) -> Result<f32> {
        self.with_device(motor, |dev| dev.analog_value(Register::MinSpeed))
    }

    /// Sets the acceleration rate, in step/s².
    pub fn set_acceleration(&self, motor: usize, steps_per_s2: f32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_analog_value(Register::Acc, steps_per_s2))
    }

    /// Acceleration rate, in step/s².
    pub fn get_acceleration(&self, motor: usize) -> Result<f32> {
        self.with_device(motor, |dev| dev.analog_value(Register::Acc))
    }

    /// Sets the deceleration rate, in step/s².
    pub fn set_deceleration(&self, motor: usize, steps_per_s2: f32) -> Result<()> {
        self.with_device(motor, |dev| dev.set_analog_value(Register::Dec, steps_per_s2))
    }

    /// Deceleration rate, in step/s².
    pub fn get_deceleration(&self, motor: usize) -> Result<f32> {
        self.with_device(motor, |dev| dev.analog_value(Register::Dec))
    }

    /// Changes the microstepping resolution. The motor is released and its
    /// position reset as part of the change.
    pub fn set_step_resolution(&self, motor: usize, resolution: StepResolution) -> Result<()> {
        self.with_device(motor, |dev| dev.set_step_resolution(resolution))
    }

    /// Live microstepping resolution.
    pub fn get_step_resolution(&self, motor: usize) -> Result<StepResolution> {
        self.with_device(motor, |dev| Ok(dev.step_mode()?.step_sel))
    }

    // --- status and supply ---

    /// Status word without clearing the latched flags.
    pub fn get_status(&self, motor: usize) -> Result<Status> {
        self.with_device(motor, |dev| dev.status())
    }

    /// Clears the latched status flags.
    pub fn clear_status(&self, motor: usize) -> Result<()> {
        self.with_device(motor, |dev| dev.clear_status())
    }

    /// Supply voltage in volts, measured through the board divider.
    pub fn get_supply_voltage(&self) -> f32 {
        supply_voltage_from_adc(self.inner.io.supply_adc())
    }

    /// Adjusts per-device protections to the measured supply: VCC regulator
    /// output from the supply level, and in current mode a startup clamp of
    /// the torque references.
    pub fn apply_supply_protections(&self) -> Result<()> {
        let volts = self.get_supply_voltage();
        for motor in 0..self.motor_count() {
            self.with_device(motor, |dev| {
                let mut cfg = dev.config()?;
                cfg.vccval = volts > VCC_THRESHOLD_V;
                dev.set_config(cfg)?;
                if dev.control_mode()? == ControlMode::Current {
                    for register in [
                        Register::TVAL_HOLD,
                        Register::TVAL_RUN,
                        Register::TVAL_ACC,
                        Register::TVAL_DEC,
                    ] {
                        if dev.analog_value(register)? > TVAL_STARTUP_CLAMP_MV {
                            dev.set_analog_value(register, TVAL_STARTUP_CLAMP_MV)?;
                        }
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    // --- FLAG pin ---

    /// Installs the fault callback invoked from
    /// [`handle_flag_interrupt`](Self::handle_flag_interrupt).
    pub fn on_flag(&self, handler: impl Fn(usize, FlagEvent) + Send + Sync + 'static) {
        *lock(&self.inner.flag_handler) = Some(Box::new(handler));
    }

    /// Removes the fault callback.
    pub fn clear_flag_handler(&self) {
        *lock(&self.inner.flag_handler) = None;
    }

    /// Services a FLAG-pin interrupt: reads and clears the status under the
    /// transport's ISR guard, then reports each asserted fault.
    pub fn handle_flag_interrupt(&self, motor: usize) -> Result<()> {
        let status = {
            let mut chain = lock(&self.inner.chain);
            chain.preemption().isr_enter();
            let result = Device::new(&mut chain, motor).fetch_and_clear_status();
            chain.preemption().isr_exit();
            result?
        };
        if let Some(handler) = lock(&self.inner.flag_handler).as_ref() {
            for event in FlagEvent::decode(status) {
                handler(motor, event);
            }
        }
        Ok(())
    }
}

impl<SPI, IO> core::fmt::Debug for StepperController<SPI, IO> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StepperController")
            .field("motors", &self.inner.motors.len())
            .finish()
    }
}
