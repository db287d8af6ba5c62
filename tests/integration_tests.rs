//! Integration tests for powerstep-motion.
//!
//! A register-file simulator stands in for the daisy chain and an in-memory
//! IO double for the BUSY/SW/limit-switch lines, so the full controller and
//! parameter-store paths run end to end.

mod common;

use std::sync::{Arc, Mutex};

use common::{MockIo, SimChain, SimCommand};
use embedded_hal_mock::eh1::delay::NoopDelay;
use powerstep_motion::error::{Error, MotionError, ParamError, RegisterError};
use powerstep_motion::hal::{DigitalInput, InterruptEdge, SwitchLogic};
use powerstep_motion::motion::{FlagEvent, StepperController};
use powerstep_motion::params::{AdvancedParam, MemoryStorage, ModeScope, ParamStore, ParamValue};
use powerstep_motion::registers::fields::{ControlMode, StepResolution};
use powerstep_motion::{Chain, Device, Direction, StopMode};

// =============================================================================
// Helpers
// =============================================================================

fn controller(count: usize) -> (StepperController<SimChain, MockIo>, SimChain, MockIo) {
    let sim = SimChain::new(count);
    let io = MockIo::new();
    let ctl = StepperController::new(Chain::new(sim.clone(), count), io.clone());
    (ctl, sim, io)
}

fn index_of(commands: &[SimCommand], wanted: SimCommand) -> usize {
    commands
        .iter()
        .position(|&c| c == wanted)
        .unwrap_or_else(|| panic!("{:?} not in {:?}", wanted, commands))
}

const LIMIT: DigitalInput = DigitalInput(3);

// =============================================================================
// T00x: basic motion commands
// =============================================================================

#[test]
fn t001_move_absolute_zero_issues_go_home() {
    let (ctl, sim, _io) = controller(1);
    ctl.move_absolute(0, 0, true).expect("move should succeed");

    let commands = sim.commands(0);
    assert!(commands.contains(&SimCommand::Op(0x70)), "{:?}", commands);
    assert!(!commands
        .iter()
        .any(|c| matches!(c, SimCommand::OpValue(0x60, _))));
}

#[test]
fn t002_move_absolute_scales_full_steps() {
    let (ctl, sim, _io) = controller(1);
    // Power-up resolution is 1/128.
    ctl.move_absolute(0, 5, false).expect("move should succeed");

    assert!(sim.commands(0).contains(&SimCommand::OpValue(0x60, 640)));
    assert_eq!(ctl.get_position(0).expect("position"), 640);
}

#[test]
fn t003_move_relative_reverse_direction() {
    let (ctl, sim, _io) = controller(1);
    ctl.move_relative(0, -3, true).expect("move should succeed");

    // MOVE with the direction bit clear and the distance made unsigned.
    assert!(sim.commands(0).contains(&SimCommand::OpValue(0x40, 3)));
}

#[test]
fn t004_step_resolution_change_releases_and_resets() {
    let (ctl, sim, _io) = controller(1);
    ctl.set_step_resolution(0, StepResolution::Sixteenth)
        .expect("resolution change");

    let commands = sim.commands(0);
    let hiz = index_of(&commands, SimCommand::Op(0xA8));
    let write = index_of(&commands, SimCommand::SetParam(0x16, 0x04));
    let reset = index_of(&commands, SimCommand::Op(0xD8));
    assert!(hiz < write && write < reset, "{:?}", commands);
    assert_eq!(
        ctl.get_step_resolution(0).expect("resolution"),
        StepResolution::Sixteenth
    );
}

#[test]
fn t005_max_speed_round_trips_through_quantization() {
    let (ctl, _sim, _io) = controller(1);
    ctl.set_max_speed(0, 1000.0).expect("set max speed");

    let back = ctl.get_max_speed(0).expect("get max speed");
    // One register step is ~15.26 step/s.
    assert!((back - 1000.0).abs() < 16.0, "got {}", back);
}

#[test]
fn t006_second_device_is_addressable() {
    let (ctl, sim, _io) = controller(3);
    ctl.run(1, Direction::Forward, 200.0).expect("run");

    assert!(sim.commands(0).is_empty());
    assert!(sim
        .commands(1)
        .iter()
        .any(|c| matches!(c, SimCommand::OpValue(0x51, _))));
    assert!(sim.commands(2).is_empty());
}

#[test]
fn t007_full_step_scaling_overflow_is_rejected() {
    let (ctl, sim, _io) = controller(1);

    let err = ctl
        .move_absolute(0, 20_000_000, false)
        .expect_err("target beyond the register range");
    assert!(
        matches!(err, Error::Motion(MotionError::PositionOutOfRange(_))),
        "got {}",
        err
    );

    let err = ctl
        .move_relative(0, i32::MIN / 2, false)
        .expect_err("distance beyond the register range");
    assert!(matches!(
        err,
        Error::Motion(MotionError::PositionOutOfRange(_))
    ));

    // Rejected before any motion command went out.
    assert!(!sim.commands(0).iter().any(|c| matches!(
        c,
        SimCommand::Op(0x70) | SimCommand::OpValue(0x60, _) | SimCommand::OpValue(0x40, _)
    )));
}

// =============================================================================
// T01x: limit switches and homing
// =============================================================================

#[test]
fn t010_homing_seeks_then_releases() {
    let (ctl, sim, io) = controller(1);
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveHigh)
        .expect("attach");
    // BUSY reads idle throughout, so both phases fall through to the
    // forced-pulse paths instead of blocking.
    io.set_busy(0, true);

    ctl.homing(0, 400.0).expect("homing spawn");
    sim.wait_for_commands(0, |commands| commands.contains(&SimCommand::Op(0x93)));

    let commands = sim.commands(0);
    let seek = commands
        .iter()
        .position(|c| matches!(c, SimCommand::OpValue(0x82, _)))
        .expect("GO_UNTIL issued");
    let release = index_of(&commands, SimCommand::Op(0x93));
    assert!(seek < release, "{:?}", commands);
    // The press-edge binding is restored when the task ends.
    ctl.wait(0).expect("wait");
    assert_eq!(io.attached_edge(LIMIT), Some(InterruptEdge::Rising));
    // Off the switch after release: the stop event had to be forced.
    assert!(io.switch_pulses().contains(&0));
}

#[test]
fn t011_homing_without_switch_touches_no_bus() {
    let (ctl, sim, _io) = controller(1);
    let err = ctl.homing(0, 400.0).expect_err("homing must fail");

    assert!(matches!(err, Error::Motion(_)), "got {}", err);
    assert!(sim.commands(0).is_empty());
}

#[test]
fn t012_stop_during_homing_skips_release_phase() {
    let (ctl, sim, io) = controller(1);
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveHigh)
        .expect("attach");
    // Motor reads busy, switch not reached: phase 1 blocks polling.
    io.set_busy(0, false);

    ctl.homing(0, 400.0).expect("homing spawn");
    sim.wait_for_commands(0, |commands| {
        commands
            .iter()
            .any(|c| matches!(c, SimCommand::OpValue(0x82, _)))
    });

    ctl.stop(0, StopMode::SoftStop).expect("stop");
    io.set_busy(0, true);
    ctl.wait(0).expect("wait");

    let commands = sim.commands(0);
    assert!(commands.contains(&SimCommand::Op(0xB0)), "{:?}", commands);
    assert!(
        !commands.contains(&SimCommand::Op(0x93)),
        "release phase ran despite the stop: {:?}",
        commands
    );
    assert_eq!(io.attached_edge(LIMIT), Some(InterruptEdge::Rising));
}

#[test]
fn t013_reattaching_an_input_replaces_its_binding() {
    let (ctl, _sim, _io) = controller(1);
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveHigh)
        .expect("attach");
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveLow)
        .expect("re-attach");

    let switches = ctl.limit_switches(0).expect("switches");
    assert_eq!(switches.len(), 1);
    assert_eq!(switches[0].logic, SwitchLogic::ActiveLow);

    ctl.attach_limit_switch(0, DigitalInput(5), SwitchLogic::ActiveHigh)
        .expect("second input");
    assert_eq!(ctl.limit_switches(0).expect("switches").len(), 2);
}

#[test]
fn t014_limit_switch_interrupt_pulses_sw_line() {
    let (ctl, _sim, io) = controller(1);
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveHigh)
        .expect("attach");

    io.fire(LIMIT);
    assert_eq!(io.switch_pulses(), vec![0]);
}

#[test]
fn t015_homing_skips_seek_when_already_on_switch() {
    let (ctl, sim, io) = controller(1);
    ctl.attach_limit_switch(0, LIMIT, SwitchLogic::ActiveHigh)
        .expect("attach");
    // The motor already sits on the switch and BUSY reads idle.
    io.set_input(LIMIT, true);
    io.set_busy(0, true);

    ctl.homing(0, 400.0).expect("homing spawn");
    sim.wait_for_commands(0, |commands| commands.contains(&SimCommand::Op(0x93)));
    ctl.wait(0).expect("wait");

    let commands = sim.commands(0);
    assert!(
        !commands
            .iter()
            .any(|c| matches!(c, SimCommand::OpValue(0x82, _))),
        "seek phase ran with the switch already pressed: {:?}",
        commands
    );
    assert!(commands.contains(&SimCommand::Op(0x93)), "{:?}", commands);
    assert_eq!(io.attached_edge(LIMIT), Some(InterruptEdge::Rising));
}

// =============================================================================
// T03x: status, FLAG and supply
// =============================================================================

#[test]
fn t030_flag_interrupt_decodes_and_clears_faults() {
    let (ctl, sim, _io) = controller(1);
    let seen: Arc<Mutex<Vec<(usize, FlagEvent)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ctl.on_flag(move |motor, event| sink.lock().unwrap().push((motor, event)));

    // UVLO asserted (active low) and a command error latched.
    sim.set_register(0, 0x1B, (common::STATUS_IDLE & !0x0200) | 0x0080);
    ctl.handle_flag_interrupt(0).expect("flag service");

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&(0, FlagEvent::Uvlo)));
    assert!(seen.contains(&(0, FlagEvent::CmdError)));
    // GET_STATUS cleared the latch.
    assert!(!ctl.get_status(0).expect("status").cmd_error);
}

#[test]
fn t031_status_read_does_not_clear() {
    let (ctl, sim, _io) = controller(1);
    sim.set_register(0, 0x1B, common::STATUS_IDLE | 0x0080);

    assert!(ctl.get_status(0).expect("status").cmd_error);
    assert!(ctl.get_status(0).expect("status").cmd_error);

    ctl.clear_status(0).expect("clear");
    assert!(sim.commands(0).contains(&SimCommand::GetStatus));
    assert!(!ctl.get_status(0).expect("status").cmd_error);
}

#[test]
fn t032_supply_protection_raises_vccval_above_threshold() {
    let (ctl, _sim, io) = controller(1);
    // ~24 V at the divider.
    io.set_adc(3158);
    assert!((ctl.get_supply_voltage() - 24.0).abs() < 0.1);

    ctl.apply_supply_protections().expect("protections");
    let vccval = ctl
        .with_device(0, |dev| Ok(dev.config()?.vccval))
        .expect("config read");
    assert!(vccval);
}

// =============================================================================
// T05x: parameter store
// =============================================================================

#[test]
fn t050_param_store_persists_across_reinit() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim.clone(), 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");
    store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::F32(500.0))
        .expect("set");

    // A second init must come back with the persisted profile, not defaults.
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("re-init");
    let cached = store.cached(0).expect("cached set");
    assert!((cached.max_speed - 500.0).abs() < 1e-3);
}

#[test]
fn t051_verify_failure_never_persists() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim.clone(), 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");
    store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::F32(500.0))
        .expect("set");

    sim.break_register(0, 0x07);
    let err = store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::F32(800.0))
        .expect_err("corrupted write must fail");
    assert!(
        matches!(err, Error::Register(RegisterError::VerifyFailed { .. })),
        "got {}",
        err
    );

    sim.fix_register(0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("re-init");
    let cached = store.cached(0).expect("cached set");
    assert!(
        (cached.max_speed - 500.0).abs() < 1e-3,
        "{}",
        cached.max_speed
    );
}

#[test]
fn t052_get_reads_live_hardware() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim, 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");

    let value = store
        .get(&mut dev, AdvancedParam::MaxSpeed)
        .expect("get")
        .as_f32()
        .expect("f32");
    assert!((value - 991.821).abs() < 0.5, "got {}", value);
}

#[test]
fn t053_mode_scoped_params_are_gated() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim, 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");

    let err = store
        .set(&mut dev, AdvancedParam::CmTvalHold, ParamValue::F32(200.0))
        .expect_err("current-mode parameter in voltage mode");
    assert!(matches!(err, Error::Param(ParamError::ModeMismatch(_))));

    let err = store
        .get(&mut dev, AdvancedParam::AdcOut)
        .expect_err("ADC_OUT is not readable by name");
    assert!(matches!(err, Error::Param(ParamError::NotReadable(_))));
}

#[test]
fn t054_wrong_value_kind_is_rejected() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim, 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");

    let err = store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::Bool(true))
        .expect_err("bool into a speed");
    assert!(matches!(err, Error::Param(ParamError::WrongValueKind(_))));
}

#[test]
fn t055_reset_all_restores_factory_defaults() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim.clone(), 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");
    store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::F32(500.0))
        .expect("set");

    store
        .reset_all(&mut dev, &mut NoopDelay::new(), ControlMode::Voltage)
        .expect("reset");
    assert!(sim.commands(0).contains(&SimCommand::Op(0xC0)));
    let cached = store.cached(0).expect("cached set");
    assert!((cached.max_speed - 991.821).abs() < 1e-3);

    // The restored defaults were persisted too.
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("re-init");
    assert!((store.cached(0).expect("cached").max_speed - 991.821).abs() < 1e-3);
}

#[test]
fn t056_zero_profile_is_never_persisted() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim, 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");
    store
        .set(&mut dev, AdvancedParam::Acceleration, ParamValue::F32(0.0))
        .expect("acc");
    store
        .set(&mut dev, AdvancedParam::Deceleration, ParamValue::F32(0.0))
        .expect("dec");

    // Min speed defaults to zero; zeroing max speed completes a dead profile.
    let err = store
        .set(&mut dev, AdvancedParam::MaxSpeed, ParamValue::F32(0.0))
        .expect_err("dead profile must not persist");
    assert!(matches!(err, Error::Param(ParamError::InvalidProfile)));
}

#[test]
fn t057_readable_params_survive_a_set_get_cycle() {
    let sim = SimChain::new(1);
    let mut chain = Chain::new(sim, 1);
    let mut store = ParamStore::new(MemoryStorage::new());

    let mut dev = Device::new(&mut chain, 0);
    store
        .init_device(&mut dev, ControlMode::Voltage)
        .expect("init");

    // Writing a parameter's live value back must read out unchanged, so the
    // physical-unit codecs invert each other on every readable register.
    for &param in AdvancedParam::ALL {
        let spec = param.spec();
        if !spec.readable || !spec.writable || spec.scope == ModeScope::Current {
            continue;
        }
        let value = store
            .get(&mut dev, param)
            .unwrap_or_else(|e| panic!("get {}: {}", param, e));
        store
            .set(&mut dev, param, value)
            .unwrap_or_else(|e| panic!("set {}: {}", param, e));
        let back = store
            .get(&mut dev, param)
            .unwrap_or_else(|e| panic!("re-get {}: {}", param, e));
        assert_eq!(back, value, "{} drifted through a set/get cycle", param);
    }
}
