//! Declarative descriptors for the named parameters and the dispatch that
//! turns a name plus value into register traffic.

use embedded_hal::spi::SpiDevice;

use crate::device::Device;
use crate::error::{ParamError, Result};
use crate::registers::codec;
use crate::registers::fields::{ControlMode, StepResolution};
use crate::registers::Register;

use super::{param_name, AdvancedParam, ModeParams, ParamValue, ParameterSet};

/// The wire-level kind a parameter's value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Signed position or count.
    I32,
    /// Physical quantity.
    F32,
    /// Small bit field.
    U8,
    /// Flag.
    Bool,
}

/// Which control mode a parameter exists in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeScope {
    /// Present in both modes.
    Any,
    /// Voltage mode only.
    Voltage,
    /// Current mode only.
    Current,
}

impl ModeScope {
    fn allows(self, mode: ControlMode) -> bool {
        match self {
            ModeScope::Any => true,
            ModeScope::Voltage => mode == ControlMode::Voltage,
            ModeScope::Current => mode == ControlMode::Current,
        }
    }
}

/// Static description of one named parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Backing register.
    pub register: Register,
    /// Required value kind.
    pub kind: ValueKind,
    /// Control-mode applicability.
    pub scope: ModeScope,
    /// Whether a live read is supported.
    pub readable: bool,
    /// Whether writes are supported.
    pub writable: bool,
}

const fn spec(
    register: Register,
    kind: ValueKind,
    scope: ModeScope,
    readable: bool,
    writable: bool,
) -> ParamSpec {
    ParamSpec {
        register,
        kind,
        scope,
        readable,
        writable,
    }
}

impl AdvancedParam {
    /// The parameter's descriptor.
    pub const fn spec(self) -> ParamSpec {
        use AdvancedParam::*;
        use ModeScope::{Any, Current, Voltage};
        use ValueKind::{Bool, F32, I32, U8};
        match self {
            AbsPos => spec(Register::AbsPos, I32, Any, true, true),
            ElPosMicrostep | ElPosStep => spec(Register::ElPos, U8, Any, false, false),
            Mark => spec(Register::Mark, I32, Any, true, true),
            Speed => spec(Register::Speed, F32, Any, true, false),
            Acceleration => spec(Register::Acc, F32, Any, true, true),
            Deceleration => spec(Register::Dec, F32, Any, true, true),
            MaxSpeed => spec(Register::MaxSpeed, F32, Any, true, true),
            MinSpeed => spec(Register::MinSpeed, F32, Any, true, true),
            MinSpeedLspdOpt => spec(Register::MinSpeed, Bool, Any, true, true),
            AdcOut => spec(Register::AdcOut, U8, Any, false, false),
            OcdTh => spec(Register::OcdTh, F32, Any, true, true),
            FsSpd => spec(Register::FsSpd, F32, Any, true, true),
            FsSpdBoostMode => spec(Register::FsSpd, Bool, Any, true, true),
            StepModeStepSel => spec(Register::StepMode, U8, Any, true, true),
            StepModeCmVm => spec(Register::StepMode, Bool, Any, true, true),
            StepModeSyncSel => spec(Register::StepMode, U8, Any, true, true),
            StepModeSyncEn => spec(Register::StepMode, Bool, Any, true, true),
            AlarmEnOvercurrent | AlarmEnThermalShutdown | AlarmEnThermalWarning | AlarmEnUvlo
            | AlarmEnAdcUvlo | AlarmEnStallDetection | AlarmEnSwTurnOn | AlarmEnCommandError => {
                spec(Register::AlarmEn, Bool, Any, true, true)
            }
            GateCfg1Tcc | GateCfg1Igate | GateCfg1Tboost => {
                spec(Register::GateCfg1, U8, Any, true, true)
            }
            GateCfg1WdEn => spec(Register::GateCfg1, Bool, Any, true, true),
            GateCfg2Tdt | GateCfg2Tblank => spec(Register::GateCfg2, U8, Any, true, true),
            ConfigOscSel => spec(Register::Config, U8, Any, true, true),
            ConfigExtClk | ConfigSwMode | ConfigOcSd | ConfigUvloval | ConfigVccval => {
                spec(Register::Config, Bool, Any, true, true)
            }
            VmConfigEnVscomp => spec(Register::Config, Bool, Voltage, true, true),
            VmConfigFPwmDec | VmConfigFPwmInt => spec(Register::Config, U8, Voltage, true, true),
            VmKvalHold => spec(Register::KvalHold, F32, Voltage, true, true),
            VmKvalRun => spec(Register::KvalRun, F32, Voltage, true, true),
            VmKvalAcc => spec(Register::KvalAcc, F32, Voltage, true, true),
            VmKvalDec => spec(Register::KvalDec, F32, Voltage, true, true),
            VmIntSpeed => spec(Register::IntSpeed, F32, Voltage, true, true),
            VmStSlp => spec(Register::StSlp, F32, Voltage, true, true),
            VmFnSlpAcc => spec(Register::FnSlpAcc, F32, Voltage, true, true),
            VmFnSlpDec => spec(Register::FnSlpDec, F32, Voltage, true, true),
            VmKTherm => spec(Register::KTherm, F32, Voltage, true, true),
            VmStallTh => spec(Register::StallTh, F32, Voltage, true, true),
            // CONFIG cannot be decoded field-by-field while the bridges run
            // in current mode, so these stay write-only.
            CmConfigEnTqreg | CmConfigPredEn => spec(Register::Config, Bool, Current, false, true),
            CmConfigTsw => spec(Register::Config, U8, Current, false, true),
            CmTvalHold => spec(Register::TVAL_HOLD, F32, Current, true, true),
            CmTvalRun => spec(Register::TVAL_RUN, F32, Current, true, true),
            CmTvalAcc => spec(Register::TVAL_ACC, F32, Current, true, true),
            CmTvalDec => spec(Register::TVAL_DEC, F32, Current, true, true),
            CmTfastFastStep | CmTfastToffFast => spec(Register::T_FAST, F32, Current, true, true),
            CmTonMin => spec(Register::TON_MIN, F32, Current, true, true),
            CmToffMin => spec(Register::TOFF_MIN, F32, Current, true, true),
        }
    }
}

/// Applies one named write to the device, mirrored into the cached set.
///
/// The set is only considered consistent with the hardware when this
/// returns `Ok`; the caller decides whether to persist it.
pub(super) fn write_param<SPI: SpiDevice>(
    dev: &mut Device<'_, SPI>,
    set: &mut ParameterSet,
    param: AdvancedParam,
    value: ParamValue,
) -> Result<()> {
    let spec = param.spec();
    if !spec.writable {
        return Err(ParamError::NotWritable(param_name(param)).into());
    }
    if value.kind() != spec.kind {
        return Err(ParamError::WrongValueKind(param_name(param)).into());
    }
    if !spec.scope.allows(set.mode.control_mode()) {
        return Err(ParamError::ModeMismatch(param_name(param)).into());
    }

    use AdvancedParam::*;
    match param {
        AbsPos => {
            let v = value.as_i32().unwrap_or(0);
            dev.set_abs_position(v)?;
            set.abs_pos = v;
        }
        Mark => {
            let v = value.as_i32().unwrap_or(0);
            dev.set_mark(v)?;
            set.mark = v;
        }
        Acceleration => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::Acc, v)?;
            set.acc = v;
        }
        Deceleration => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::Dec, v)?;
            set.dec = v;
        }
        MaxSpeed => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::MaxSpeed, v)?;
            set.max_speed = v;
        }
        MinSpeed => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::MinSpeed, v)?;
            set.min_speed = v;
        }
        MinSpeedLspdOpt => {
            let v = value.as_bool().unwrap_or(false);
            let mut fields = dev.min_speed_fields()?;
            fields.lspd_opt = v;
            dev.set_min_speed_fields(fields)?;
            set.min_speed_lspd_opt = v;
        }
        OcdTh => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::OcdTh, v)?;
            set.ocd_th = v;
        }
        FsSpd => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(Register::FsSpd, v)?;
            set.fs_spd = v;
        }
        FsSpdBoostMode => {
            let v = value.as_bool().unwrap_or(false);
            let mut fields = dev.fs_spd_fields()?;
            fields.boost_mode = v;
            dev.set_fs_spd_fields(fields)?;
            set.fs_spd_boost_mode = v;
        }
        StepModeStepSel => {
            let res = StepResolution::from_bits(value.as_u8().unwrap_or(0));
            dev.set_step_resolution(res)?;
            set.step_sel = res;
        }
        StepModeCmVm => {
            let want = if value.as_bool().unwrap_or(false) {
                ControlMode::Current
            } else {
                ControlMode::Voltage
            };
            if want != set.mode.control_mode() {
                // The shared registers change meaning across the switch, so
                // the whole set is re-applied with the new mode's defaults.
                set.mode = ParameterSet::defaults_for(want).mode;
                set.apply_all(dev)?;
            }
        }
        StepModeSyncSel => {
            let v = value.as_u8().unwrap_or(0);
            let mut mode = dev.step_mode()?;
            mode.sync_sel = v;
            dev.set_step_mode(mode)?;
            set.sync_sel = v;
        }
        StepModeSyncEn => {
            let v = value.as_bool().unwrap_or(false);
            let mut mode = dev.step_mode()?;
            mode.sync_en = v;
            dev.set_step_mode(mode)?;
            set.sync_en = v;
        }
        AlarmEnOvercurrent | AlarmEnThermalShutdown | AlarmEnThermalWarning | AlarmEnUvlo
        | AlarmEnAdcUvlo | AlarmEnStallDetection | AlarmEnSwTurnOn | AlarmEnCommandError => {
            let v = value.as_bool().unwrap_or(false);
            let mut alarms = set.alarms;
            match param {
                AlarmEnOvercurrent => alarms.overcurrent = v,
                AlarmEnThermalShutdown => alarms.thermal_shutdown = v,
                AlarmEnThermalWarning => alarms.thermal_warning = v,
                AlarmEnUvlo => alarms.uvlo = v,
                AlarmEnAdcUvlo => alarms.adc_uvlo = v,
                AlarmEnStallDetection => alarms.stall_detection = v,
                AlarmEnSwTurnOn => alarms.switch_turn_on = v,
                _ => alarms.command_error = v,
            }
            dev.set_alarm_enables(alarms)?;
            set.alarms = alarms;
        }
        GateCfg1Tcc | GateCfg1Igate | GateCfg1Tboost | GateCfg1WdEn => {
            let mut cfg = set.gate_cfg1;
            match param {
                GateCfg1Tcc => cfg.tcc = value.as_u8().unwrap_or(0),
                GateCfg1Igate => cfg.igate = value.as_u8().unwrap_or(0),
                GateCfg1Tboost => cfg.tboost = value.as_u8().unwrap_or(0),
                _ => cfg.wd_en = value.as_bool().unwrap_or(false),
            }
            dev.set_gate_config1(cfg)?;
            set.gate_cfg1 = cfg;
        }
        GateCfg2Tdt | GateCfg2Tblank => {
            let v = value.as_u8().unwrap_or(0);
            let mut cfg = set.gate_cfg2;
            match param {
                GateCfg2Tdt => cfg.tdt = v,
                _ => cfg.tblank = v,
            }
            dev.set_gate_config2(cfg)?;
            set.gate_cfg2 = cfg;
        }
        ConfigOscSel | ConfigExtClk | ConfigSwMode | ConfigOcSd | ConfigUvloval | ConfigVccval => {
            let mut next = set.clone();
            match param {
                ConfigOscSel => next.osc_sel = value.as_u8().unwrap_or(0),
                ConfigExtClk => next.ext_clk = value.as_bool().unwrap_or(false),
                ConfigSwMode => next.sw_mode = value.as_bool().unwrap_or(false),
                ConfigOcSd => next.oc_sd = value.as_bool().unwrap_or(false),
                ConfigUvloval => next.uvloval = value.as_bool().unwrap_or(false),
                _ => next.vccval = value.as_bool().unwrap_or(false),
            }
            dev.set_config(next.config())?;
            *set = next;
        }
        VmConfigEnVscomp | VmConfigFPwmDec | VmConfigFPwmInt => {
            let mut next = set.clone();
            if let ModeParams::Voltage(ref mut vm) = next.mode {
                match param {
                    VmConfigEnVscomp => vm.en_vscomp = value.as_bool().unwrap_or(false),
                    VmConfigFPwmDec => vm.f_pwm_dec = value.as_u8().unwrap_or(0),
                    _ => vm.f_pwm_int = value.as_u8().unwrap_or(0),
                }
            }
            dev.set_config(next.config())?;
            *set = next;
        }
        VmKvalHold | VmKvalRun | VmKvalAcc | VmKvalDec | VmIntSpeed | VmStSlp | VmFnSlpAcc
        | VmFnSlpDec | VmKTherm | VmStallTh => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(param.spec().register, v)?;
            if let ModeParams::Voltage(ref mut vm) = set.mode {
                match param {
                    VmKvalHold => vm.kval_hold = v,
                    VmKvalRun => vm.kval_run = v,
                    VmKvalAcc => vm.kval_acc = v,
                    VmKvalDec => vm.kval_dec = v,
                    VmIntSpeed => vm.int_speed = v,
                    VmStSlp => vm.st_slp = v,
                    VmFnSlpAcc => vm.fn_slp_acc = v,
                    VmFnSlpDec => vm.fn_slp_dec = v,
                    VmKTherm => vm.k_therm = v,
                    _ => vm.stall_th = v,
                }
            }
        }
        CmConfigEnTqreg | CmConfigTsw | CmConfigPredEn => {
            let mut next = set.clone();
            if let ModeParams::Current(ref mut cm) = next.mode {
                match param {
                    CmConfigEnTqreg => cm.en_tqreg = value.as_bool().unwrap_or(false),
                    CmConfigTsw => cm.tsw = value.as_u8().unwrap_or(0),
                    _ => cm.pred_en = value.as_bool().unwrap_or(false),
                }
            }
            dev.set_config(next.config())?;
            *set = next;
        }
        CmTvalHold | CmTvalRun | CmTvalAcc | CmTvalDec | CmTonMin | CmToffMin => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_analog_value(param.spec().register, v)?;
            if let ModeParams::Current(ref mut cm) = set.mode {
                match param {
                    CmTvalHold => cm.tval_hold = v,
                    CmTvalRun => cm.tval_run = v,
                    CmTvalAcc => cm.tval_acc = v,
                    CmTvalDec => cm.tval_dec = v,
                    CmTonMin => cm.ton_min = v,
                    _ => cm.toff_min = v,
                }
            }
        }
        CmTfastFastStep => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_fast_step(v)?;
            if let ModeParams::Current(ref mut cm) = set.mode {
                cm.fast_step = v;
            }
        }
        CmTfastToffFast => {
            let v = value.as_f32().unwrap_or(0.0);
            dev.set_toff_fast(v)?;
            if let ModeParams::Current(ref mut cm) = set.mode {
                cm.toff_fast = v;
            }
        }
        ElPosMicrostep | ElPosStep | Speed | AdcOut => {
            return Err(ParamError::NotWritable(param_name(param)).into());
        }
    }
    Ok(())
}

/// Reads one named parameter live from the device.
pub(super) fn read_param<SPI: SpiDevice>(
    dev: &mut Device<'_, SPI>,
    param: AdvancedParam,
) -> Result<ParamValue> {
    let spec = param.spec();
    if !spec.readable {
        return Err(ParamError::NotReadable(param_name(param)).into());
    }
    if !spec.scope.allows(dev.control_mode()?) {
        return Err(ParamError::ModeMismatch(param_name(param)).into());
    }

    use AdvancedParam::*;
    let value = match param {
        AbsPos => ParamValue::I32(dev.abs_position()?),
        Mark => ParamValue::I32(dev.mark()?),
        Speed => ParamValue::F32(dev.speed()?),
        Acceleration => ParamValue::F32(dev.analog_value(Register::Acc)?),
        Deceleration => ParamValue::F32(dev.analog_value(Register::Dec)?),
        MaxSpeed => ParamValue::F32(dev.analog_value(Register::MaxSpeed)?),
        MinSpeed => ParamValue::F32(codec::min_speed_from_reg(
            dev.min_speed_fields()?.min_speed as u32,
        )),
        MinSpeedLspdOpt => ParamValue::Bool(dev.min_speed_fields()?.lspd_opt),
        OcdTh => ParamValue::F32(dev.analog_value(Register::OcdTh)?),
        FsSpd => ParamValue::F32(codec::fs_spd_from_reg(dev.fs_spd_fields()?.fs_spd as u32)),
        FsSpdBoostMode => ParamValue::Bool(dev.fs_spd_fields()?.boost_mode),
        StepModeStepSel => ParamValue::U8(dev.step_mode()?.step_sel as u8),
        StepModeCmVm => ParamValue::Bool(dev.step_mode()?.mode == ControlMode::Current),
        StepModeSyncSel => ParamValue::U8(dev.step_mode()?.sync_sel),
        StepModeSyncEn => ParamValue::Bool(dev.step_mode()?.sync_en),
        AlarmEnOvercurrent | AlarmEnThermalShutdown | AlarmEnThermalWarning | AlarmEnUvlo
        | AlarmEnAdcUvlo | AlarmEnStallDetection | AlarmEnSwTurnOn | AlarmEnCommandError => {
            let alarms = dev.alarm_enables()?;
            ParamValue::Bool(match param {
                AlarmEnOvercurrent => alarms.overcurrent,
                AlarmEnThermalShutdown => alarms.thermal_shutdown,
                AlarmEnThermalWarning => alarms.thermal_warning,
                AlarmEnUvlo => alarms.uvlo,
                AlarmEnAdcUvlo => alarms.adc_uvlo,
                AlarmEnStallDetection => alarms.stall_detection,
                AlarmEnSwTurnOn => alarms.switch_turn_on,
                _ => alarms.command_error,
            })
        }
        GateCfg1Tcc => ParamValue::U8(dev.gate_config1()?.tcc),
        GateCfg1Igate => ParamValue::U8(dev.gate_config1()?.igate),
        GateCfg1Tboost => ParamValue::U8(dev.gate_config1()?.tboost),
        GateCfg1WdEn => ParamValue::Bool(dev.gate_config1()?.wd_en),
        GateCfg2Tdt => ParamValue::U8(dev.gate_config2()?.tdt),
        GateCfg2Tblank => ParamValue::U8(dev.gate_config2()?.tblank),
        ConfigOscSel => ParamValue::U8(dev.config()?.osc_sel),
        ConfigExtClk => ParamValue::Bool(dev.config()?.ext_clk),
        ConfigSwMode => ParamValue::Bool(dev.config()?.sw_mode),
        ConfigOcSd => ParamValue::Bool(dev.config()?.oc_sd),
        ConfigUvloval => ParamValue::Bool(dev.config()?.uvloval),
        ConfigVccval => ParamValue::Bool(dev.config()?.vccval),
        VmConfigEnVscomp | VmConfigFPwmDec | VmConfigFPwmInt => {
            use crate::registers::fields::ModeConfig;
            match dev.config()?.mode {
                ModeConfig::Voltage {
                    en_vscomp,
                    f_pwm_dec,
                    f_pwm_int,
                } => match param {
                    VmConfigEnVscomp => ParamValue::Bool(en_vscomp),
                    VmConfigFPwmDec => ParamValue::U8(f_pwm_dec),
                    _ => ParamValue::U8(f_pwm_int),
                },
                ModeConfig::Current { .. } => {
                    return Err(ParamError::ModeMismatch(param_name(param)).into())
                }
            }
        }
        VmKvalHold | VmKvalRun | VmKvalAcc | VmKvalDec | VmIntSpeed | VmStSlp | VmFnSlpAcc
        | VmFnSlpDec | VmKTherm | VmStallTh | CmTvalHold | CmTvalRun | CmTvalAcc | CmTvalDec
        | CmTonMin | CmToffMin => ParamValue::F32(dev.analog_value(spec.register)?),
        CmTfastFastStep => ParamValue::F32(dev.t_fast()?.0),
        CmTfastToffFast => ParamValue::F32(dev.t_fast()?.1),
        ElPosMicrostep | ElPosStep | AdcOut | CmConfigEnTqreg | CmConfigTsw | CmConfigPredEn => {
            return Err(ParamError::NotReadable(param_name(param)).into());
        }
    };
    Ok(value)
}
