//! The named-parameter space and its persisted backing store.
//!
//! Every tunable of a device is addressable by an [`AdvancedParam`] name.
//! A declarative descriptor maps each name to its register, value kind and
//! control-mode applicability; the store keeps a per-device [`ParameterSet`]
//! persisted as a blob and pushes it to hardware at startup.

mod set;
mod store;
mod table;

pub use set::{CurrentParams, ModeParams, ParameterSet, VoltageParams};
pub use store::{MemoryStorage, ParamStore, Storage, STORE_NAMESPACE};
pub use table::{ModeScope, ParamSpec, ValueKind};

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// A value passed to or read from a named parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// Signed position or count.
    I32(i32),
    /// Physical quantity in the parameter's unit.
    F32(f32),
    /// Small bit-field value.
    U8(u8),
    /// Flag.
    Bool(bool),
}

impl ParamValue {
    /// The value as an i32, if it is one.
    pub fn as_i32(self) -> Option<i32> {
        match self {
            ParamValue::I32(v) => Some(v),
            _ => None,
        }
    }

    /// The value as an f32, if it is one.
    pub fn as_f32(self) -> Option<f32> {
        match self {
            ParamValue::F32(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a u8, if it is one.
    pub fn as_u8(self) -> Option<u8> {
        match self {
            ParamValue::U8(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a bool, if it is one.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The kind of this value.
    pub fn kind(self) -> ValueKind {
        match self {
            ParamValue::I32(_) => ValueKind::I32,
            ParamValue::F32(_) => ValueKind::F32,
            ParamValue::U8(_) => ValueKind::U8,
            ParamValue::Bool(_) => ValueKind::Bool,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::I32(v) => write!(f, "{}", v),
            ParamValue::F32(v) => write!(f, "{}", v),
            ParamValue::U8(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! advanced_params {
    ($(($variant:ident, $name:literal)),+ $(,)?) => {
        /// Every named parameter of a device.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum AdvancedParam {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl AdvancedParam {
            /// All parameters, in declaration order.
            pub const ALL: &'static [AdvancedParam] = &[$(AdvancedParam::$variant),+];

            /// The parameter's external name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(AdvancedParam::$variant => $name,)+
                }
            }
        }

        impl FromStr for AdvancedParam {
            type Err = ParamError;

            fn from_str(s: &str) -> core::result::Result<AdvancedParam, ParamError> {
                match s {
                    $($name => Ok(AdvancedParam::$variant),)+
                    _ => {
                        let mut name = heapless::String::new();
                        for c in s.chars().take(32) {
                            let _ = name.push(c);
                        }
                        Err(ParamError::UnknownName(name))
                    }
                }
            }
        }
    };
}

advanced_params! {
    (AbsPos, "abs-pos"),
    (ElPosMicrostep, "el-pos-microstep"),
    (ElPosStep, "el-pos-step"),
    (Mark, "mark"),
    (Speed, "speed"),
    (Acceleration, "acceleration"),
    (Deceleration, "deceleration"),
    (MaxSpeed, "max-speed"),
    (MinSpeed, "min-speed"),
    (MinSpeedLspdOpt, "min-speed-lspd-opt"),
    (AdcOut, "adc-out"),
    (OcdTh, "ocd-th"),
    (FsSpd, "fs-spd"),
    (FsSpdBoostMode, "fs-spd-boost-mode"),
    (StepModeStepSel, "step-mode-step-sel"),
    (StepModeCmVm, "step-mode-cm-vm"),
    (StepModeSyncSel, "step-mode-sync-sel"),
    (StepModeSyncEn, "step-mode-sync-en"),
    (AlarmEnOvercurrent, "alarm-en-overcurrent"),
    (AlarmEnThermalShutdown, "alarm-en-thermal-shutdown"),
    (AlarmEnThermalWarning, "alarm-en-thermal-warning"),
    (AlarmEnUvlo, "alarm-en-uvlo"),
    (AlarmEnAdcUvlo, "alarm-en-adc-uvlo"),
    (AlarmEnStallDetection, "alarm-en-stall-detection"),
    (AlarmEnSwTurnOn, "alarm-en-sw-turn-on"),
    (AlarmEnCommandError, "alarm-en-command-error"),
    (GateCfg1Tcc, "gate-cfg1-tcc"),
    (GateCfg1Igate, "gate-cfg1-igate"),
    (GateCfg1Tboost, "gate-cfg1-tboost"),
    (GateCfg1WdEn, "gate-cfg1-wd-en"),
    (GateCfg2Tdt, "gate-cfg2-tdt"),
    (GateCfg2Tblank, "gate-cfg2-tblank"),
    (ConfigOscSel, "config-osc-sel"),
    (ConfigExtClk, "config-ext-clk"),
    (ConfigSwMode, "config-sw-mode"),
    (ConfigOcSd, "config-oc-sd"),
    (ConfigUvloval, "config-uvloval"),
    (ConfigVccval, "config-vccval"),
    (VmConfigEnVscomp, "vm-config-en-vscomp"),
    (VmConfigFPwmDec, "vm-config-f-pwm-dec"),
    (VmConfigFPwmInt, "vm-config-f-pwm-int"),
    (VmKvalHold, "vm-kval-hold"),
    (VmKvalRun, "vm-kval-run"),
    (VmKvalAcc, "vm-kval-acc"),
    (VmKvalDec, "vm-kval-dec"),
    (VmIntSpeed, "vm-int-speed"),
    (VmStSlp, "vm-st-slp"),
    (VmFnSlpAcc, "vm-fn-slp-acc"),
    (VmFnSlpDec, "vm-fn-slp-dec"),
    (VmKTherm, "vm-k-therm"),
    (VmStallTh, "vm-stall-th"),
    (CmConfigEnTqreg, "cm-config-en-tqreg"),
    (CmConfigTsw, "cm-config-tsw"),
    (CmConfigPredEn, "cm-config-pred-en"),
    (CmTvalHold, "cm-tval-hold"),
    (CmTvalRun, "cm-tval-run"),
    (CmTvalAcc, "cm-tval-acc"),
    (CmTvalDec, "cm-tval-dec"),
    (CmTfastFastStep, "cm-tfast-fast-step"),
    (CmTfastToffFast, "cm-tfast-toff-fast"),
    (CmTonMin, "cm-ton-min"),
    (CmToffMin, "cm-toff-min"),
}

impl fmt::Display for AdvancedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn param_name(param: AdvancedParam) -> heapless::String<32> {
    let mut name = heapless::String::new();
    let _ = name.push_str(param.name());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for &param in AdvancedParam::ALL {
            assert_eq!(param.name().parse::<AdvancedParam>().unwrap(), param);
        }
    }

    #[test]
    fn unknown_name_is_reported() {
        assert!(matches!(
            "kval-everything".parse::<AdvancedParam>(),
            Err(ParamError::UnknownName(_))
        ));
    }

    #[test]
    fn value_kind_accessors() {
        assert_eq!(ParamValue::F32(1.5).as_f32(), Some(1.5));
        assert_eq!(ParamValue::F32(1.5).as_i32(), None);
        assert_eq!(ParamValue::Bool(true).kind(), ValueKind::Bool);
    }
}
