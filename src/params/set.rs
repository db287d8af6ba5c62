//! The per-device parameter set: every tunable, persisted as one blob.

use embedded_hal::spi::SpiDevice;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::Result;
use crate::registers::codec;
use crate::registers::fields::{
    AlarmEnables, Config, ControlMode, FsSpd, GateConfig1, GateConfig2, MinSpeed, ModeConfig,
    StepMode, StepResolution,
};
use crate::registers::Register;

/// Voltage-mode tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageParams {
    /// Supply voltage compensation enable.
    pub en_vscomp: bool,
    /// PWM frequency division factor.
    pub f_pwm_dec: u8,
    /// PWM frequency multiplication factor.
    pub f_pwm_int: u8,
    /// Holding voltage amplitude, percent.
    pub kval_hold: f32,
    /// Constant-speed voltage amplitude, percent.
    pub kval_run: f32,
    /// Acceleration voltage amplitude, percent.
    pub kval_acc: f32,
    /// Deceleration voltage amplitude, percent.
    pub kval_dec: f32,
    /// BEMF curve intersect speed, step/s.
    pub int_speed: f32,
    /// BEMF start slope, percent per step/s.
    pub st_slp: f32,
    /// BEMF final acceleration slope, percent per step/s.
    pub fn_slp_acc: f32,
    /// BEMF final deceleration slope, percent per step/s.
    pub fn_slp_dec: f32,
    /// Thermal compensation factor.
    pub k_therm: f32,
    /// Stall detection threshold, millivolts.
    pub stall_th: f32,
}

/// Current-mode tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentParams {
    /// External torque regulation enable.
    pub en_tqreg: bool,
    /// Target switching period field.
    pub tsw: u8,
    /// Predictive current control enable.
    pub pred_en: bool,
    /// Holding torque reference, millivolts.
    pub tval_hold: f32,
    /// Constant-speed torque reference, millivolts.
    pub tval_run: f32,
    /// Acceleration torque reference, millivolts.
    pub tval_acc: f32,
    /// Deceleration torque reference, millivolts.
    pub tval_dec: f32,
    /// Maximum fall-step time, microseconds.
    pub fast_step: f32,
    /// Fast-decay time, microseconds.
    pub toff_fast: f32,
    /// Minimum on time, microseconds.
    pub ton_min: f32,
    /// Minimum off time, microseconds.
    pub toff_min: f32,
}

/// Mode-specific half of a parameter set. The active variant decides the
/// CM_VM bit pushed to STEP_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModeParams {
    /// Voltage-mode block.
    Voltage(VoltageParams),
    /// Current-mode block.
    Current(CurrentParams),
}

impl ModeParams {
    /// The control mode this block selects.
    pub const fn control_mode(&self) -> ControlMode {
        match self {
            ModeParams::Voltage(_) => ControlMode::Voltage,
            ModeParams::Current(_) => ControlMode::Current,
        }
    }
}

/// Everything tunable on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Absolute position, microsteps.
    pub abs_pos: i32,
    /// Mark position, microsteps.
    pub mark: i32,
    /// Acceleration, step/s².
    pub acc: f32,
    /// Deceleration, step/s².
    pub dec: f32,
    /// Maximum speed, step/s.
    pub max_speed: f32,
    /// Minimum speed, step/s.
    pub min_speed: f32,
    /// Low-speed optimization enable.
    pub min_speed_lspd_opt: bool,
    /// Overcurrent threshold, millivolts.
    pub ocd_th: f32,
    /// Full-step threshold speed, step/s.
    pub fs_spd: f32,
    /// Boost mode enable.
    pub fs_spd_boost_mode: bool,
    /// Microstepping resolution.
    pub step_sel: StepResolution,
    /// SYNC output frequency select.
    pub sync_sel: u8,
    /// SYNC output enable.
    pub sync_en: bool,
    /// FLAG pin alarm mask.
    pub alarms: AlarmEnables,
    /// Gate driver configuration 1.
    pub gate_cfg1: GateConfig1,
    /// Gate driver configuration 2.
    pub gate_cfg2: GateConfig2,
    /// Clock source select.
    pub osc_sel: u8,
    /// External clock enable.
    pub ext_clk: bool,
    /// Switch input hard-stop bypass.
    pub sw_mode: bool,
    /// Bridge shutdown on overcurrent.
    pub oc_sd: bool,
    /// UVLO threshold select.
    pub uvloval: bool,
    /// Internal VCC regulator output select.
    pub vccval: bool,
    /// Mode-specific block.
    pub mode: ModeParams,
}

impl ParameterSet {
    /// Factory defaults for a voltage-mode device.
    pub fn voltage_defaults() -> ParameterSet {
        ParameterSet {
            mode: ModeParams::Voltage(VoltageParams {
                en_vscomp: false,
                f_pwm_dec: 7,
                f_pwm_int: 0,
                kval_hold: 16.02,
                kval_run: 16.02,
                kval_acc: 16.02,
                kval_dec: 16.02,
                int_speed: 61.512,
                st_slp: 0.03815,
                fn_slp_acc: 0.06256,
                fn_slp_dec: 0.06256,
                k_therm: 1.0,
                stall_th: 468.75,
            }),
            ..ParameterSet::common_defaults()
        }
    }

    /// Factory defaults for a current-mode device.
    pub fn current_defaults() -> ParameterSet {
        ParameterSet {
            mode: ModeParams::Current(CurrentParams {
                en_tqreg: false,
                tsw: 12,
                pred_en: false,
                tval_hold: 328.12,
                tval_run: 328.12,
                tval_acc: 328.12,
                tval_dec: 328.12,
                fast_step: 8.0,
                toff_fast: 12.0,
                ton_min: 3.0,
                toff_min: 21.0,
            }),
            ..ParameterSet::common_defaults()
        }
    }

    /// Factory defaults for the given mode.
    pub fn defaults_for(mode: ControlMode) -> ParameterSet {
        match mode {
            ControlMode::Voltage => ParameterSet::voltage_defaults(),
            ControlMode::Current => ParameterSet::current_defaults(),
        }
    }

    fn common_defaults() -> ParameterSet {
        ParameterSet {
            abs_pos: 0,
            mark: 0,
            acc: 2008.16,
            dec: 2008.16,
            max_speed: 991.821,
            min_speed: 0.0,
            min_speed_lspd_opt: false,
            ocd_th: 156.25,
            fs_spd: 991.821,
            fs_spd_boost_mode: false,
            step_sel: StepResolution::Sixteenth,
            sync_sel: 0,
            sync_en: false,
            alarms: AlarmEnables {
                switch_turn_on: false,
                ..AlarmEnables::all()
            },
            gate_cfg1: GateConfig1 {
                tcc: 3,
                igate: 6,
                tboost: 0,
                wd_en: false,
            },
            gate_cfg2: GateConfig2 { tdt: 0, tblank: 2 },
            osc_sel: 0,
            ext_clk: false,
            sw_mode: false,
            oc_sd: true,
            uvloval: false,
            vccval: true,
            mode: ModeParams::Voltage(VoltageParams {
                en_vscomp: false,
                f_pwm_dec: 7,
                f_pwm_int: 0,
                kval_hold: 16.02,
                kval_run: 16.02,
                kval_acc: 16.02,
                kval_dec: 16.02,
                int_speed: 61.512,
                st_slp: 0.03815,
                fn_slp_acc: 0.06256,
                fn_slp_dec: 0.06256,
                k_therm: 1.0,
                stall_th: 468.75,
            }),
        }
    }

    /// The STEP_MODE register this set describes.
    pub fn step_mode(&self) -> StepMode {
        StepMode {
            step_sel: self.step_sel,
            mode: self.mode.control_mode(),
            sync_sel: self.sync_sel,
            sync_en: self.sync_en,
        }
    }

    /// The CONFIG register this set describes.
    pub fn config(&self) -> Config {
        let mode = match self.mode {
            ModeParams::Voltage(vm) => ModeConfig::Voltage {
                en_vscomp: vm.en_vscomp,
                f_pwm_dec: vm.f_pwm_dec,
                f_pwm_int: vm.f_pwm_int,
            },
            ModeParams::Current(cm) => ModeConfig::Current {
                en_tqreg: cm.en_tqreg,
                tsw: cm.tsw,
                pred_en: cm.pred_en,
            },
        };
        Config {
            osc_sel: self.osc_sel,
            ext_clk: self.ext_clk,
            sw_mode: self.sw_mode,
            oc_sd: self.oc_sd,
            uvloval: self.uvloval,
            vccval: self.vccval,
            mode,
        }
    }

    /// Pushes the whole set to a device.
    ///
    /// STEP_MODE goes first so the shared-address codecs see the right
    /// control mode; CONFIG goes last, as the original bring-up order does.
    pub fn apply_all<SPI: SpiDevice>(&self, dev: &mut Device<'_, SPI>) -> Result<()> {
        dev.set_step_mode(self.step_mode())?;
        dev.set_abs_position(self.abs_pos)?;
        dev.set_mark(self.mark)?;
        dev.set_analog_value(Register::Acc, self.acc)?;
        dev.set_analog_value(Register::Dec, self.dec)?;
        dev.set_analog_value(Register::MaxSpeed, self.max_speed)?;
        dev.set_min_speed_fields(MinSpeed {
            min_speed: codec::min_speed_to_reg(self.min_speed),
            lspd_opt: self.min_speed_lspd_opt,
        })?;
        dev.set_analog_value(Register::OcdTh, self.ocd_th)?;
        dev.set_fs_spd_fields(FsSpd {
            fs_spd: codec::fs_spd_to_reg(self.fs_spd),
            boost_mode: self.fs_spd_boost_mode,
        })?;
        dev.set_alarm_enables(self.alarms)?;
        dev.set_gate_config1(self.gate_cfg1)?;
        dev.set_gate_config2(self.gate_cfg2)?;
        match self.mode {
            ModeParams::Voltage(vm) => {
                dev.set_analog_value(Register::KvalHold, vm.kval_hold)?;
                dev.set_analog_value(Register::KvalRun, vm.kval_run)?;
                dev.set_analog_value(Register::KvalAcc, vm.kval_acc)?;
                dev.set_analog_value(Register::KvalDec, vm.kval_dec)?;
                dev.set_analog_value(Register::IntSpeed, vm.int_speed)?;
                dev.set_analog_value(Register::StSlp, vm.st_slp)?;
                dev.set_analog_value(Register::FnSlpAcc, vm.fn_slp_acc)?;
                dev.set_analog_value(Register::FnSlpDec, vm.fn_slp_dec)?;
                dev.set_analog_value(Register::KTherm, vm.k_therm)?;
                dev.set_analog_value(Register::StallTh, vm.stall_th)?;
            }
            ModeParams::Current(cm) => {
                dev.set_analog_value(Register::TVAL_HOLD, cm.tval_hold)?;
                dev.set_analog_value(Register::TVAL_RUN, cm.tval_run)?;
                dev.set_analog_value(Register::TVAL_ACC, cm.tval_acc)?;
                dev.set_analog_value(Register::TVAL_DEC, cm.tval_dec)?;
                let t_fast = ((codec::t_fast_to_reg(cm.toff_fast) as u32) << 4)
                    | (codec::t_fast_to_reg(cm.fast_step) as u32 & 0x0F);
                dev.write_register(Register::T_FAST, t_fast)?;
                dev.set_analog_value(Register::TON_MIN, cm.ton_min)?;
                dev.set_analog_value(Register::TOFF_MIN, cm.toff_min)?;
            }
        }
        dev.set_config(self.config())
    }
}
