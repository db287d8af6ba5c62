//! Structured views of the multi-field powerSTEP01 registers.
//!
//! Each type packs to and unpacks from the raw register value. CONFIG has two
//! layouts selected by the STEP_MODE CM_VM bit, which the register itself does
//! not carry; its mode-specific half is therefore a tagged enum and unpacking
//! takes the active mode from the caller.

use serde::{Deserialize, Serialize};

use super::Direction;

/// Voltage-mode versus advanced current-mode control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// Voltage-amplitude (KVAL) control.
    Voltage,
    /// Predictive current (TVAL) control.
    Current,
}

/// Microstepping resolution (STEP_MODE.STEP_SEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StepResolution {
    /// Full step
    Full = 0,
    /// Half step
    Half = 1,
    /// 1/4 microstep
    Quarter = 2,
    /// 1/8 microstep
    Eighth = 3,
    /// 1/16 microstep
    Sixteenth = 4,
    /// 1/32 microstep
    ThirtySecond = 5,
    /// 1/64 microstep
    SixtyFourth = 6,
    /// 1/128 microstep
    OneTwentyEighth = 7,
}

impl StepResolution {
    /// Decodes the 3-bit STEP_SEL field.
    pub const fn from_bits(bits: u8) -> StepResolution {
        match bits & 0x07 {
            0 => StepResolution::Full,
            1 => StepResolution::Half,
            2 => StepResolution::Quarter,
            3 => StepResolution::Eighth,
            4 => StepResolution::Sixteenth,
            5 => StepResolution::ThirtySecond,
            6 => StepResolution::SixtyFourth,
            _ => StepResolution::OneTwentyEighth,
        }
    }

    /// Microsteps per full motor step at this resolution.
    pub const fn microsteps_per_step(self) -> u32 {
        1 << (self as u8)
    }
}

/// STEP_MODE register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMode {
    /// Microstepping resolution.
    pub step_sel: StepResolution,
    /// Control mode select (CM_VM bit).
    pub mode: ControlMode,
    /// SYNC output frequency select.
    pub sync_sel: u8,
    /// SYNC output enable (BUSY pin becomes SYNC).
    pub sync_en: bool,
}

impl StepMode {
    /// Packs into the raw register byte. The reserved bit stays zero.
    pub fn pack(self) -> u8 {
        (self.step_sel as u8)
            | (matches!(self.mode, ControlMode::Current) as u8) << 3
            | (self.sync_sel & 0x07) << 4
            | (self.sync_en as u8) << 7
    }

    /// Unpacks from the raw register byte.
    pub fn unpack(raw: u8) -> StepMode {
        StepMode {
            step_sel: StepResolution::from_bits(raw),
            mode: if raw & 0x08 != 0 {
                ControlMode::Current
            } else {
                ControlMode::Voltage
            },
            sync_sel: (raw >> 4) & 0x07,
            sync_en: raw & 0x80 != 0,
        }
    }
}

/// ALARM_EN register: which conditions pull the FLAG pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEnables {
    /// Overcurrent detection
    pub overcurrent: bool,
    /// Thermal shutdown
    pub thermal_shutdown: bool,
    /// Thermal warning
    pub thermal_warning: bool,
    /// Supply undervoltage lockout
    pub uvlo: bool,
    /// ADC supply undervoltage
    pub adc_uvlo: bool,
    /// Stall detection
    pub stall_detection: bool,
    /// Switch input turn-on event
    pub switch_turn_on: bool,
    /// Wrong or unperformable command
    pub command_error: bool,
}

impl AlarmEnables {
    /// Packs into the raw register byte.
    pub fn pack(self) -> u8 {
        (self.overcurrent as u8)
            | (self.thermal_shutdown as u8) << 1
            | (self.thermal_warning as u8) << 2
            | (self.uvlo as u8) << 3
            | (self.adc_uvlo as u8) << 4
            | (self.stall_detection as u8) << 5
            | (self.switch_turn_on as u8) << 6
            | (self.command_error as u8) << 7
    }

    /// Unpacks from the raw register byte.
    pub fn unpack(raw: u8) -> AlarmEnables {
        AlarmEnables {
            overcurrent: raw & 0x01 != 0,
            thermal_shutdown: raw & 0x02 != 0,
            thermal_warning: raw & 0x04 != 0,
            uvlo: raw & 0x08 != 0,
            adc_uvlo: raw & 0x10 != 0,
            stall_detection: raw & 0x20 != 0,
            switch_turn_on: raw & 0x40 != 0,
            command_error: raw & 0x80 != 0,
        }
    }

    /// Power-up default: everything enabled.
    pub const fn all() -> AlarmEnables {
        AlarmEnables {
            overcurrent: true,
            thermal_shutdown: true,
            thermal_warning: true,
            uvlo: true,
            adc_uvlo: true,
            stall_detection: true,
            switch_turn_on: true,
            command_error: true,
        }
    }
}

/// MIN_SPEED register: 12-bit speed plus the low-speed optimization flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinSpeed {
    /// Minimum speed, raw 12-bit value.
    pub min_speed: u16,
    /// Low-speed optimization enable.
    pub lspd_opt: bool,
}

impl MinSpeed {
    /// Packs into the raw register value.
    pub fn pack(self) -> u16 {
        (self.min_speed & 0x0FFF) | (self.lspd_opt as u16) << 12
    }

    /// Unpacks from the raw register value.
    pub fn unpack(raw: u16) -> MinSpeed {
        MinSpeed {
            min_speed: raw & 0x0FFF,
            lspd_opt: raw & 0x1000 != 0,
        }
    }
}

/// FS_SPD register: 10-bit full-step threshold plus the boost-mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSpd {
    /// Full-step threshold speed, raw 10-bit value.
    pub fs_spd: u16,
    /// Boost mode enable.
    pub boost_mode: bool,
}

impl FsSpd {
    /// Packs into the raw register value.
    pub fn pack(self) -> u16 {
        (self.fs_spd & 0x03FF) | (self.boost_mode as u16) << 10
    }

    /// Unpacks from the raw register value.
    pub fn unpack(raw: u16) -> FsSpd {
        FsSpd {
            fs_spd: raw & 0x03FF,
            boost_mode: raw & 0x0400 != 0,
        }
    }
}

/// GATECFG1 register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig1 {
    /// Constant-current time, 5 bits.
    pub tcc: u8,
    /// Gate current, 3 bits.
    pub igate: u8,
    /// Turn-off boost time, 3 bits.
    pub tboost: u8,
    /// Clock-source watchdog enable.
    pub wd_en: bool,
}

impl GateConfig1 {
    /// Packs into the raw register value.
    pub fn pack(self) -> u16 {
        (self.tcc as u16 & 0x1F)
            | (self.igate as u16 & 0x07) << 5
            | (self.tboost as u16 & 0x07) << 8
            | (self.wd_en as u16) << 11
    }

    /// Unpacks from the raw register value.
    pub fn unpack(raw: u16) -> GateConfig1 {
        GateConfig1 {
            tcc: (raw & 0x1F) as u8,
            igate: ((raw >> 5) & 0x07) as u8,
            tboost: ((raw >> 8) & 0x07) as u8,
            wd_en: raw & 0x0800 != 0,
        }
    }
}

/// GATECFG2 register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig2 {
    /// Bridge dead time, 5 bits.
    pub tdt: u8,
    /// Current-sense blanking time, 3 bits.
    pub tblank: u8,
}

impl GateConfig2 {
    /// Packs into the raw register byte.
    pub fn pack(self) -> u8 {
        (self.tdt & 0x1F) | (self.tblank & 0x07) << 5
    }

    /// Unpacks from the raw register byte.
    pub fn unpack(raw: u8) -> GateConfig2 {
        GateConfig2 {
            tdt: raw & 0x1F,
            tblank: (raw >> 5) & 0x07,
        }
    }
}

/// CONFIG fields whose layout depends on the active control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeConfig {
    /// Voltage-mode upper half.
    Voltage {
        /// Supply voltage compensation enable.
        en_vscomp: bool,
        /// PWM frequency division factor, 3 bits.
        f_pwm_dec: u8,
        /// PWM frequency multiplication factor, 3 bits.
        f_pwm_int: u8,
    },
    /// Current-mode upper half.
    Current {
        /// External torque regulation enable.
        en_tqreg: bool,
        /// Target switching period, 5 bits.
        tsw: u8,
        /// Predictive current control enable.
        pred_en: bool,
    },
}

/// CONFIG register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// System clock source select, 3 bits.
    pub osc_sel: u8,
    /// External clock enable.
    pub ext_clk: bool,
    /// Switch input hard-stop bypass (true disables the hard stop).
    pub sw_mode: bool,
    /// Bridge shutdown on overcurrent.
    pub oc_sd: bool,
    /// UVLO threshold select.
    pub uvloval: bool,
    /// Internal VCC regulator output select.
    pub vccval: bool,
    /// Mode-dependent upper fields.
    pub mode: ModeConfig,
}

impl Config {
    /// Packs into the raw register value. Reserved bit 6 stays zero.
    pub fn pack(self) -> u16 {
        let common = (self.osc_sel as u16 & 0x07)
            | (self.ext_clk as u16) << 3
            | (self.sw_mode as u16) << 4
            | (self.oc_sd as u16) << 7
            | (self.uvloval as u16) << 8
            | (self.vccval as u16) << 9;
        match self.mode {
            ModeConfig::Voltage {
                en_vscomp,
                f_pwm_dec,
                f_pwm_int,
            } => {
                common
                    | (en_vscomp as u16) << 5
                    | (f_pwm_dec as u16 & 0x07) << 10
                    | (f_pwm_int as u16 & 0x07) << 13
            }
            ModeConfig::Current {
                en_tqreg,
                tsw,
                pred_en,
            } => common | (en_tqreg as u16) << 5 | (tsw as u16 & 0x1F) << 10 | (pred_en as u16) << 15,
        }
    }

    /// Unpacks from the raw register value, interpreting the upper half per
    /// the supplied control mode.
    pub fn unpack(raw: u16, mode: ControlMode) -> Config {
        let upper = match mode {
            ControlMode::Voltage => ModeConfig::Voltage {
                en_vscomp: raw & 0x20 != 0,
                f_pwm_dec: ((raw >> 10) & 0x07) as u8,
                f_pwm_int: ((raw >> 13) & 0x07) as u8,
            },
            ControlMode::Current => ModeConfig::Current {
                en_tqreg: raw & 0x20 != 0,
                tsw: ((raw >> 10) & 0x1F) as u8,
                pred_en: raw & 0x8000 != 0,
            },
        };
        Config {
            osc_sel: (raw & 0x07) as u8,
            ext_clk: raw & 0x08 != 0,
            sw_mode: raw & 0x10 != 0,
            oc_sd: raw & 0x80 != 0,
            uvloval: raw & 0x0100 != 0,
            vccval: raw & 0x0200 != 0,
            mode: upper,
        }
    }
}

/// Motor movement state reported in STATUS.MOT_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorActivity {
    /// Stopped.
    Stopped,
    /// Accelerating.
    Acceleration,
    /// Decelerating.
    Deceleration,
    /// At constant speed.
    ConstantSpeed,
}

/// Thermal state reported in STATUS.TH_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThermalStatus {
    /// Normal operation.
    Normal,
    /// Warning threshold crossed.
    Warning,
    /// Power bridges shut down.
    BridgesShutdown,
    /// Whole device shut down.
    DeviceShutdown,
}

/// Decoded STATUS word.
///
/// Fault flags keep the raw active-low encoding of the wire word: `uvlo`,
/// `uvlo_adc`, `ocd` and the stall flags read `false` when the corresponding
/// condition is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// Bridges are in high impedance.
    pub hiz: bool,
    /// A command is executing (BUSY pin low).
    pub busy: bool,
    /// Switch input level.
    pub sw_f: bool,
    /// Switch turn-on event latched.
    pub sw_evn: bool,
    /// Current direction.
    pub direction: Direction,
    /// Movement state.
    pub motor: MotorActivity,
    /// Last command was rejected.
    pub cmd_error: bool,
    /// Step-clock mode active.
    pub step_clock_mode: bool,
    /// Supply undervoltage flag (active low).
    pub uvlo: bool,
    /// ADC undervoltage flag (active low).
    pub uvlo_adc: bool,
    /// Thermal state.
    pub thermal: ThermalStatus,
    /// Overcurrent flag (active low).
    pub ocd: bool,
    /// Bridge A stall flag (active low).
    pub stall_a: bool,
    /// Bridge B stall flag (active low).
    pub stall_b: bool,
}

impl Status {
    /// Decodes the 16-bit STATUS word.
    pub fn from_bits(raw: u16) -> Status {
        Status {
            hiz: raw & 0x0001 != 0,
            busy: raw & 0x0002 == 0,
            sw_f: raw & 0x0004 != 0,
            sw_evn: raw & 0x0008 != 0,
            direction: if raw & 0x0010 != 0 {
                Direction::Forward
            } else {
                Direction::Reverse
            },
            motor: match (raw >> 5) & 0x03 {
                0 => MotorActivity::Stopped,
                1 => MotorActivity::Acceleration,
                2 => MotorActivity::Deceleration,
                _ => MotorActivity::ConstantSpeed,
            },
            cmd_error: raw & 0x0080 != 0,
            step_clock_mode: raw & 0x0100 != 0,
            uvlo: raw & 0x0200 != 0,
            uvlo_adc: raw & 0x0400 != 0,
            thermal: match (raw >> 11) & 0x03 {
                0 => ThermalStatus::Normal,
                1 => ThermalStatus::Warning,
                2 => ThermalStatus::BridgesShutdown,
                _ => ThermalStatus::DeviceShutdown,
            },
            ocd: raw & 0x2000 != 0,
            stall_a: raw & 0x4000 != 0,
            stall_b: raw & 0x8000 != 0,
        }
    }
}
