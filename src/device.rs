//! Typed register access for one device on the chain.
//!
//! [`Device`] borrows the transport and pins it to a device index. Every
//! setter writes the register and reads it back; a mismatch is reported as a
//! verification failure and logged. Analog accessors take physical units,
//! validate them against the register range, and branch on the live control
//! mode where an address is shared between the voltage-mode and current-mode
//! register sets.

use embedded_hal::spi::SpiDevice;
use log::warn;

use crate::error::{RegisterError, Result};
use crate::registers::codec;
use crate::registers::fields::{
    AlarmEnables, Config, ControlMode, FsSpd, GateConfig1, GateConfig2, MinSpeed, Status,
    StepMode, StepResolution,
};
use crate::registers::{
    decode_position, encode_position, opcode, Direction, Register, StopMode, SwitchAction,
    MAX_POSITION, MIN_POSITION,
};
use crate::transport::Chain;

/// One powerSTEP01 on the daisy chain.
pub struct Device<'c, SPI> {
    chain: &'c mut Chain<SPI>,
    index: usize,
}

impl<'c, SPI: SpiDevice> Device<'c, SPI> {
    /// Pins the transport to one device index.
    pub fn new(chain: &'c mut Chain<SPI>, index: usize) -> Device<'c, SPI> {
        Device { chain, index }
    }

    /// Device index on the chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reads a raw register value.
    pub fn read_register(&mut self, register: Register) -> Result<u32> {
        self.chain.get_param(self.index, register)
    }

    /// Writes a raw register value and verifies it by reading back.
    pub fn write_register(&mut self, register: Register, value: u32) -> Result<()> {
        let mask = u32::MAX >> (32 - 8 * register.arg_len());
        let written = value & mask;
        self.chain.set_param(self.index, register, written)?;
        let read = self.chain.get_param(self.index, register)?;
        if read != written {
            warn!(
                "device {}: verify failed on {:?} (wrote {:#x}, read {:#x})",
                self.index, register, written, read
            );
            return Err(RegisterError::VerifyFailed {
                register,
                written,
                read,
            }
            .into());
        }
        Ok(())
    }

    // --- positions ---

    /// Current absolute position in microsteps.
    pub fn abs_position(&mut self) -> Result<i32> {
        Ok(decode_position(self.read_register(Register::AbsPos)?))
    }

    /// Overwrites the absolute position register.
    pub fn set_abs_position(&mut self, position: i32) -> Result<()> {
        check_position(Register::AbsPos, position)?;
        self.write_register(Register::AbsPos, encode_position(position))
    }

    /// Mark position in microsteps.
    pub fn mark(&mut self) -> Result<i32> {
        Ok(decode_position(self.read_register(Register::Mark)?))
    }

    /// Sets the mark position.
    pub fn set_mark(&mut self, position: i32) -> Result<()> {
        check_position(Register::Mark, position)?;
        self.write_register(Register::Mark, encode_position(position))
    }

    /// Current speed in step/s.
    pub fn speed(&mut self) -> Result<f32> {
        Ok(codec::speed_from_reg(self.read_register(Register::Speed)?))
    }

    // --- step mode ---

    /// Decoded STEP_MODE register.
    pub fn step_mode(&mut self) -> Result<StepMode> {
        Ok(StepMode::unpack(self.read_register(Register::StepMode)? as u8))
    }

    /// Active control mode (CM_VM bit).
    pub fn control_mode(&mut self) -> Result<ControlMode> {
        Ok(self.step_mode()?.mode)
    }

    /// Rewrites STEP_MODE. The bridges are released first (the register must
    /// not change while the motor is powered) and the absolute position is
    /// reset afterwards, since its scale changed.
    pub fn set_step_mode(&mut self, mode: StepMode) -> Result<()> {
        self.stop(StopMode::HardHiZ)?;
        self.write_register(Register::StepMode, mode.pack() as u32)?;
        self.reset_position()
    }

    /// Changes only the microstepping resolution, preserving the other
    /// STEP_MODE fields.
    pub fn set_step_resolution(&mut self, resolution: StepResolution) -> Result<()> {
        let mut mode = self.step_mode()?;
        mode.step_sel = resolution;
        self.set_step_mode(mode)
    }

    // --- composite registers ---

    /// Decoded ALARM_EN register.
    pub fn alarm_enables(&mut self) -> Result<AlarmEnables> {
        Ok(AlarmEnables::unpack(self.read_register(Register::AlarmEn)? as u8))
    }

    /// Rewrites ALARM_EN.
    pub fn set_alarm_enables(&mut self, alarms: AlarmEnables) -> Result<()> {
        self.write_register(Register::AlarmEn, alarms.pack() as u32)
    }

    /// Decoded GATECFG1 register.
    pub fn gate_config1(&mut self) -> Result<GateConfig1> {
        Ok(GateConfig1::unpack(self.read_register(Register::GateCfg1)? as u16))
    }

    /// Rewrites GATECFG1.
    pub fn set_gate_config1(&mut self, cfg: GateConfig1) -> Result<()> {
        self.write_register(Register::GateCfg1, cfg.pack() as u32)
    }

    /// Decoded GATECFG2 register.
    pub fn gate_config2(&mut self) -> Result<GateConfig2> {
        Ok(GateConfig2::unpack(self.read_register(Register::GateCfg2)? as u8))
    }

    /// Rewrites GATECFG2.
    pub fn set_gate_config2(&mut self, cfg: GateConfig2) -> Result<()> {
        self.write_register(Register::GateCfg2, cfg.pack() as u32)
    }

    /// Decoded CONFIG register, interpreted per the live control mode.
    pub fn config(&mut self) -> Result<Config> {
        let mode = self.control_mode()?;
        Ok(Config::unpack(self.read_register(Register::Config)? as u16, mode))
    }

    /// Rewrites CONFIG.
    pub fn set_config(&mut self, cfg: Config) -> Result<()> {
        self.write_register(Register::Config, cfg.pack() as u32)
    }

    /// Decoded MIN_SPEED register.
    pub fn min_speed_fields(&mut self) -> Result<MinSpeed> {
        Ok(MinSpeed::unpack(self.read_register(Register::MinSpeed)? as u16))
    }

    /// Rewrites the whole MIN_SPEED register.
    pub fn set_min_speed_fields(&mut self, fields: MinSpeed) -> Result<()> {
        self.write_register(Register::MinSpeed, fields.pack() as u32)
    }

    /// Decoded FS_SPD register.
    pub fn fs_spd_fields(&mut self) -> Result<FsSpd> {
        Ok(FsSpd::unpack(self.read_register(Register::FsSpd)? as u16))
    }

    /// Rewrites the whole FS_SPD register.
    pub fn set_fs_spd_fields(&mut self, fields: FsSpd) -> Result<()> {
        self.write_register(Register::FsSpd, fields.pack() as u32)
    }

    // --- analog accessors ---

    /// Writes a register from a physical value.
    ///
    /// The value is range-checked against the register, encoded with the
    /// matching unit codec, and verified after the write. MIN_SPEED and
    /// FS_SPD preserve their flag bits; the KVAL/TVAL and BEMF-slope
    /// addresses encode per the live control mode. Registers without a unit
    /// codec take the value as a raw integer.
    pub fn set_analog_value(&mut self, register: Register, value: f32) -> Result<()> {
        let raw = match register {
            Register::Acc | Register::Dec => {
                check_range(register, value, 0.0, codec::MAX_ACC)?;
                codec::acc_dec_to_reg(value) as u32
            }
            Register::MaxSpeed => {
                check_range(register, value, 0.0, codec::MAX_MAX_SPEED)?;
                codec::max_speed_to_reg(value) as u32
            }
            Register::MinSpeed => {
                check_range(register, value, 0.0, codec::MAX_MIN_SPEED)?;
                let mut fields = self.min_speed_fields()?;
                fields.min_speed = codec::min_speed_to_reg(value);
                fields.pack() as u32
            }
            Register::FsSpd => {
                check_range(register, value, 0.0, codec::MAX_FS_SPD)?;
                let mut fields = self.fs_spd_fields()?;
                fields.fs_spd = codec::fs_spd_to_reg(value);
                fields.pack() as u32
            }
            Register::IntSpeed => {
                check_range(register, value, 0.0, codec::MAX_INT_SPEED)?;
                codec::int_speed_to_reg(value) as u32
            }
            Register::KTherm => {
                check_range(register, value, codec::MIN_K_THERM, codec::MAX_K_THERM)?;
                codec::k_therm_to_reg(value) as u32
            }
            Register::OcdTh | Register::StallTh => {
                check_range(register, value, 0.0, codec::MAX_STALL_OCD_TH)?;
                codec::stall_ocd_th_to_reg(value) as u32
            }
            Register::KvalHold | Register::KvalRun | Register::KvalAcc | Register::KvalDec => {
                match self.control_mode()? {
                    ControlMode::Voltage => {
                        check_range(register, value, 0.0, codec::MAX_KVAL)?;
                        codec::kval_to_reg(value) as u32
                    }
                    ControlMode::Current => {
                        check_range(register, value, 0.0, codec::MAX_TVAL)?;
                        codec::tval_to_reg(value) as u32
                    }
                }
            }
            Register::StSlp => match self.control_mode()? {
                ControlMode::Voltage => {
                    check_range(register, value, 0.0, codec::MAX_SLOPE)?;
                    codec::slope_to_reg(value) as u32
                }
                // T_FAST holds two 4-bit times; see set_fast_step/set_toff_fast.
                ControlMode::Current => return Err(RegisterError::WrongMode(register).into()),
            },
            Register::FnSlpAcc | Register::FnSlpDec => match self.control_mode()? {
                ControlMode::Voltage => {
                    check_range(register, value, 0.0, codec::MAX_SLOPE)?;
                    codec::slope_to_reg(value) as u32
                }
                ControlMode::Current => {
                    check_range(register, value, 0.0, codec::MAX_T_MIN)?;
                    codec::t_min_to_reg(value) as u32
                }
            },
            _ => value as u32,
        };
        self.write_register(register, raw)
    }

    /// Reads a register as a physical value, inverting the unit codec that
    /// [`set_analog_value`](Self::set_analog_value) applies.
    pub fn analog_value(&mut self, register: Register) -> Result<f32> {
        let raw = self.read_register(register)?;
        let value = match register {
            Register::Acc | Register::Dec => codec::acc_dec_from_reg(raw),
            Register::Speed => codec::speed_from_reg(raw),
            Register::MaxSpeed => codec::max_speed_from_reg(raw),
            Register::MinSpeed => {
                codec::min_speed_from_reg(MinSpeed::unpack(raw as u16).min_speed as u32)
            }
            Register::FsSpd => {
                codec::fs_spd_from_reg(FsSpd::unpack(raw as u16).fs_spd as u32)
            }
            Register::IntSpeed => codec::int_speed_from_reg(raw),
            Register::KTherm => codec::k_therm_from_reg(raw),
            Register::OcdTh | Register::StallTh => codec::stall_ocd_th_from_reg(raw),
            Register::KvalHold | Register::KvalRun | Register::KvalAcc | Register::KvalDec => {
                match self.control_mode()? {
                    ControlMode::Voltage => codec::kval_from_reg(raw),
                    ControlMode::Current => codec::tval_from_reg(raw),
                }
            }
            Register::StSlp => match self.control_mode()? {
                ControlMode::Voltage => codec::slope_from_reg(raw),
                ControlMode::Current => return Err(RegisterError::WrongMode(register).into()),
            },
            Register::FnSlpAcc | Register::FnSlpDec => match self.control_mode()? {
                ControlMode::Voltage => codec::slope_from_reg(raw),
                ControlMode::Current => codec::t_min_from_reg(raw),
            },
            _ => raw as f32,
        };
        Ok(value)
    }

    /// Fast-decay and fall-step times in microseconds (current mode).
    pub fn t_fast(&mut self) -> Result<(f32, f32)> {
        let raw = self.read_register(Register::T_FAST)?;
        Ok((
            codec::t_fast_from_reg(raw & 0x0F),
            codec::t_fast_from_reg((raw >> 4) & 0x0F),
        ))
    }

    /// Sets the fall-step time, preserving the fast-decay nibble.
    pub fn set_fast_step(&mut self, micros: f32) -> Result<()> {
        check_range(Register::T_FAST, micros, 0.0, codec::MAX_T_FAST)?;
        let raw = self.read_register(Register::T_FAST)?;
        let nibble = codec::t_fast_to_reg(micros) as u32 & 0x0F;
        self.write_register(Register::T_FAST, (raw & 0xF0) | nibble)
    }

    /// Sets the fast-decay time, preserving the fall-step nibble.
    pub fn set_toff_fast(&mut self, micros: f32) -> Result<()> {
        check_range(Register::T_FAST, micros, 0.0, codec::MAX_T_FAST)?;
        let raw = self.read_register(Register::T_FAST)?;
        let nibble = (codec::t_fast_to_reg(micros) as u32 & 0x0F) << 4;
        self.write_register(Register::T_FAST, (raw & 0x0F) | nibble)
    }

    // --- commands ---

    /// Spins at a speed in step/s until stopped.
    pub fn run(&mut self, direction: Direction, steps_per_s: f32) -> Result<()> {
        self.chain.send_command_with_value(
            self.index,
            opcode::RUN | direction.bit(),
            codec::speed_to_reg(steps_per_s),
        )
    }

    /// Moves a relative number of microsteps. The motor must be stopped.
    pub fn move_steps(&mut self, direction: Direction, microsteps: u32) -> Result<()> {
        self.chain.send_command_with_value(
            self.index,
            opcode::MOVE | direction.bit(),
            microsteps,
        )
    }

    /// Goes to an absolute position over the shortest path.
    pub fn go_to(&mut self, position: i32) -> Result<()> {
        check_position(Register::AbsPos, position)?;
        self.chain
            .send_command_with_value(self.index, opcode::GO_TO, encode_position(position))
    }

    /// Goes to an absolute position in a forced direction.
    pub fn go_to_dir(&mut self, direction: Direction, position: i32) -> Result<()> {
        check_position(Register::AbsPos, position)?;
        self.chain.send_command_with_value(
            self.index,
            opcode::GO_TO_DIR | direction.bit(),
            encode_position(position),
        )
    }

    /// Runs at a speed in step/s until the switch input turns on.
    pub fn go_until(
        &mut self,
        action: SwitchAction,
        direction: Direction,
        steps_per_s: f32,
    ) -> Result<()> {
        self.chain.send_command_with_value(
            self.index,
            opcode::GO_UNTIL | action.bits() | direction.bit(),
            codec::speed_to_reg(steps_per_s),
        )
    }

    /// Moves at minimum speed until the switch input releases.
    pub fn release_switch(&mut self, action: SwitchAction, direction: Direction) -> Result<()> {
        self.chain.send_command(
            self.index,
            opcode::RELEASE_SW | action.bits() | direction.bit(),
        )
    }

    /// Goes to the zero position.
    pub fn go_home(&mut self) -> Result<()> {
        self.chain.send_command(self.index, opcode::GO_HOME)
    }

    /// Goes to the mark position.
    pub fn go_mark(&mut self) -> Result<()> {
        self.chain.send_command(self.index, opcode::GO_MARK)
    }

    /// Switches to step-clock mode with the given direction.
    pub fn step_clock(&mut self, direction: Direction) -> Result<()> {
        self.chain
            .send_command(self.index, opcode::STEP_CLOCK | direction.bit())
    }

    /// Zeroes the absolute position register.
    pub fn reset_position(&mut self) -> Result<()> {
        self.chain.send_command(self.index, opcode::RESET_POS)
    }

    /// Resets the device to its power-up state.
    pub fn reset_device(&mut self) -> Result<()> {
        self.chain.send_command(self.index, opcode::RESET_DEVICE)
    }

    /// Stops the motor.
    pub fn stop(&mut self, mode: StopMode) -> Result<()> {
        self.chain.send_command(self.index, mode.opcode())
    }

    // --- status ---

    /// Reads STATUS without clearing the latched flags.
    pub fn status(&mut self) -> Result<Status> {
        Ok(Status::from_bits(
            self.read_register(Register::Status)? as u16
        ))
    }

    /// Reads STATUS via GET_STATUS, clearing the latched flags.
    pub fn fetch_and_clear_status(&mut self) -> Result<Status> {
        Ok(Status::from_bits(self.chain.get_status(self.index)?))
    }

    /// Clears the latched status flags, discarding the value.
    pub fn clear_status(&mut self) -> Result<()> {
        self.chain.get_status(self.index)?;
        Ok(())
    }
}

fn check_range(register: Register, value: f32, min: f32, max: f32) -> Result<()> {
    if value < min || value > max {
        return Err(RegisterError::ValueOutOfRange {
            register,
            value,
            min,
            max,
        }
        .into());
    }
    Ok(())
}

fn check_position(register: Register, position: i32) -> Result<()> {
    if !(MIN_POSITION..=MAX_POSITION).contains(&position) {
        return Err(RegisterError::ValueOutOfRange {
            register,
            value: position as f32,
            min: MIN_POSITION as f32,
            max: MAX_POSITION as f32,
        }
        .into());
    }
    Ok(())
}
