//! powerSTEP01 register map and application-command opcodes.
//!
//! Addresses, per-register argument widths and opcode values follow the
//! ST powerSTEP01 datasheet. Registers shared between voltage mode and
//! current mode (KVAL/TVAL, BEMF slopes vs switching times) are exposed
//! under their voltage-mode names with current-mode aliases as associated
//! constants.

pub mod codec;
pub mod fields;

use serde::{Deserialize, Serialize};

/// powerSTEP01 register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Current absolute position (22-bit two's complement)
    AbsPos = 0x01,
    /// Electrical position
    ElPos = 0x02,
    /// Mark position (22-bit two's complement)
    Mark = 0x03,
    /// Current speed (read-only)
    Speed = 0x04,
    /// Acceleration rate
    Acc = 0x05,
    /// Deceleration rate
    Dec = 0x06,
    /// Maximum speed
    MaxSpeed = 0x07,
    /// Minimum speed and low-speed optimization flag
    MinSpeed = 0x08,
    /// Holding voltage amplitude (TVAL_HOLD in current mode)
    KvalHold = 0x09,
    /// Constant-speed voltage amplitude (TVAL_RUN in current mode)
    KvalRun = 0x0A,
    /// Acceleration voltage amplitude (TVAL_ACC in current mode)
    KvalAcc = 0x0B,
    /// Deceleration voltage amplitude (TVAL_DEC in current mode)
    KvalDec = 0x0C,
    /// BEMF compensation curve intersect speed (voltage mode only)
    IntSpeed = 0x0D,
    /// BEMF start slope (T_FAST in current mode)
    StSlp = 0x0E,
    /// BEMF final acceleration slope (TON_MIN in current mode)
    FnSlpAcc = 0x0F,
    /// BEMF final deceleration slope (TOFF_MIN in current mode)
    FnSlpDec = 0x10,
    /// Thermal compensation factor (voltage mode only)
    KTherm = 0x11,
    /// ADC output (read-only)
    AdcOut = 0x12,
    /// Overcurrent detection threshold
    OcdTh = 0x13,
    /// Stall detection threshold (voltage mode only)
    StallTh = 0x14,
    /// Full-step speed and boost-mode flag
    FsSpd = 0x15,
    /// Step mode, sync output and current/voltage mode select
    StepMode = 0x16,
    /// Alarm enable mask
    AlarmEn = 0x17,
    /// Gate driver configuration 1
    GateCfg1 = 0x18,
    /// Gate driver configuration 2
    GateCfg2 = 0x19,
    /// System configuration (layout depends on the active mode)
    Config = 0x1A,
    /// Status word (read-only)
    Status = 0x1B,
}

impl Register {
    /// Holding torque reference, current mode.
    pub const TVAL_HOLD: Register = Register::KvalHold;
    /// Constant-speed torque reference, current mode.
    pub const TVAL_RUN: Register = Register::KvalRun;
    /// Acceleration torque reference, current mode.
    pub const TVAL_ACC: Register = Register::KvalAcc;
    /// Deceleration torque reference, current mode.
    pub const TVAL_DEC: Register = Register::KvalDec;
    /// Fast-decay / fall-step times, current mode.
    pub const T_FAST: Register = Register::StSlp;
    /// Minimum on time, current mode.
    pub const TON_MIN: Register = Register::FnSlpAcc;
    /// Minimum off time, current mode.
    pub const TOFF_MIN: Register = Register::FnSlpDec;

    /// Register address as used in SET_PARAM/GET_PARAM opcodes.
    pub const fn addr(self) -> u8 {
        self as u8
    }

    /// Number of argument bytes carried by a GET_PARAM/SET_PARAM exchange.
    pub const fn arg_len(self) -> usize {
        match self {
            Register::AbsPos | Register::Mark | Register::Speed => 3,
            Register::ElPos
            | Register::Acc
            | Register::Dec
            | Register::MaxSpeed
            | Register::MinSpeed
            | Register::FsSpd
            | Register::IntSpeed
            | Register::Config
            | Register::GateCfg1
            | Register::Status => 2,
            _ => 1,
        }
    }

    /// Whether SET_PARAM may target this register.
    pub const fn writable(self) -> bool {
        !matches!(self, Register::Status | Register::Speed | Register::AdcOut)
    }
}

/// Application command opcodes.
///
/// SET_PARAM and GET_PARAM are OR'ed with the register address; RUN, MOVE,
/// GO_TO and GO_TO_DIR carry the direction in bit 0 where applicable.
pub mod opcode {
    /// No operation; fills unaddressed daisy-chain slots.
    pub const NOP: u8 = 0x00;
    /// Write a register (OR with the register address).
    pub const SET_PARAM: u8 = 0x00;
    /// Read a register (OR with the register address).
    pub const GET_PARAM: u8 = 0x20;
    /// Spin at a given speed.
    pub const RUN: u8 = 0x50;
    /// Switch to step-clock mode.
    pub const STEP_CLOCK: u8 = 0x58;
    /// Move a relative number of microsteps.
    pub const MOVE: u8 = 0x40;
    /// Go to an absolute position, shortest path.
    pub const GO_TO: u8 = 0x60;
    /// Go to an absolute position in a forced direction.
    pub const GO_TO_DIR: u8 = 0x68;
    /// Run until the switch input turns on.
    pub const GO_UNTIL: u8 = 0x82;
    /// Leave the switch input at minimum speed.
    pub const RELEASE_SW: u8 = 0x92;
    /// Go to the zero position.
    pub const GO_HOME: u8 = 0x70;
    /// Go to the mark position.
    pub const GO_MARK: u8 = 0x78;
    /// Zero the absolute position register.
    pub const RESET_POS: u8 = 0xD8;
    /// Reset the device to power-up state.
    pub const RESET_DEVICE: u8 = 0xC0;
    /// Decelerate then stop.
    pub const SOFT_STOP: u8 = 0xB0;
    /// Stop immediately.
    pub const HARD_STOP: u8 = 0xB8;
    /// Decelerate then release the bridges.
    pub const SOFT_HIZ: u8 = 0xA0;
    /// Release the bridges immediately.
    pub const HARD_HIZ: u8 = 0xA8;
    /// Read the status word, clearing latched flags.
    pub const GET_STATUS: u8 = 0xD0;
}

/// Rotation direction, as encoded in bit 0 of directional opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Positive position counting.
    Forward,
    /// Negative position counting.
    Reverse,
}

impl Direction {
    pub(crate) const fn bit(self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }

    /// Opposite direction.
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// What GO_UNTIL / RELEASE_SW do to ABS_POS when the switch event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    /// Reset ABS_POS to zero.
    ResetAbsPos,
    /// Copy ABS_POS into MARK.
    CopyAbsPos,
}

impl SwitchAction {
    pub(crate) const fn bits(self) -> u8 {
        match self {
            SwitchAction::ResetAbsPos => 0x00,
            SwitchAction::CopyAbsPos => 0x08,
        }
    }
}

/// How a stop request winds the motor down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopMode {
    /// Decelerate, then hold.
    SoftStop,
    /// Stop immediately, then hold.
    HardStop,
    /// Decelerate, then release the power bridges.
    SoftHiZ,
    /// Release the power bridges immediately.
    HardHiZ,
}

impl StopMode {
    pub(crate) const fn opcode(self) -> u8 {
        match self {
            StopMode::SoftStop => opcode::SOFT_STOP,
            StopMode::HardStop => opcode::HARD_STOP,
            StopMode::SoftHiZ => opcode::SOFT_HIZ,
            StopMode::HardHiZ => opcode::HARD_HIZ,
        }
    }
}

/// Mask selecting the 22 position bits of ABS_POS and MARK.
pub const POSITION_MASK: u32 = 0x003F_FFFF;
/// Sign bit of the 22-bit position registers.
pub const POSITION_SIGN_BIT: u32 = 0x0020_0000;
/// Largest representable absolute position.
pub const MAX_POSITION: i32 = 0x001F_FFFF;
/// Smallest representable absolute position.
pub const MIN_POSITION: i32 = -0x0020_0000;

/// Encodes a signed position into the 22-bit register representation.
pub const fn encode_position(position: i32) -> u32 {
    (position as u32) & POSITION_MASK
}

/// Sign-extends a raw 22-bit register value into a signed position.
pub const fn decode_position(raw: u32) -> i32 {
    let raw = raw & POSITION_MASK;
    if raw & POSITION_SIGN_BIT != 0 {
        (raw | !POSITION_MASK) as i32
    } else {
        raw as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_widths_match_datasheet() {
        assert_eq!(Register::AbsPos.arg_len(), 3);
        assert_eq!(Register::Speed.arg_len(), 3);
        assert_eq!(Register::Config.arg_len(), 2);
        assert_eq!(Register::Status.arg_len(), 2);
        assert_eq!(Register::KvalHold.arg_len(), 1);
        assert_eq!(Register::StepMode.arg_len(), 1);
    }

    #[test]
    fn read_only_registers_are_not_writable() {
        assert!(!Register::Status.writable());
        assert!(!Register::Speed.writable());
        assert!(!Register::AdcOut.writable());
        assert!(Register::AbsPos.writable());
    }

    #[test]
    fn current_mode_aliases_share_addresses() {
        assert_eq!(Register::TVAL_HOLD.addr(), Register::KvalHold.addr());
        assert_eq!(Register::T_FAST.addr(), Register::StSlp.addr());
        assert_eq!(Register::TOFF_MIN.addr(), Register::FnSlpDec.addr());
    }

    #[test]
    fn position_codec_sign_extends() {
        assert_eq!(decode_position(encode_position(0)), 0);
        assert_eq!(decode_position(encode_position(-1)), -1);
        assert_eq!(decode_position(encode_position(MAX_POSITION)), MAX_POSITION);
        assert_eq!(decode_position(encode_position(MIN_POSITION)), MIN_POSITION);
        assert_eq!(encode_position(-1), POSITION_MASK);
    }
}
