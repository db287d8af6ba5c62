//! Fixed-point unit conversions between physical quantities and register values.
//!
//! Scale factors come from the powerSTEP01 datasheet tick lengths (250 ns
//! control cycle). Range limits are the largest physical values the register
//! widths can hold; callers validate against them before encoding, the codecs
//! themselves never clamp.

use libm::roundf;

/// Maximum acceleration/deceleration, step/s².
pub const MAX_ACC: f32 = 59590.0;
/// Maximum programmable speed, step/s.
pub const MAX_MAX_SPEED: f32 = 15610.0;
/// Maximum minimum-speed setting, step/s.
pub const MAX_MIN_SPEED: f32 = 976.3;
/// Maximum full-step threshold speed, step/s.
pub const MAX_FS_SPD: f32 = 15625.0;
/// Maximum BEMF intersect speed, step/s.
pub const MAX_INT_SPEED: f32 = 976.5;
/// Thermal compensation factor range.
pub const MIN_K_THERM: f32 = 1.0;
/// Upper thermal compensation factor.
pub const MAX_K_THERM: f32 = 1.46875;
/// Maximum voltage amplitude, percent of supply.
pub const MAX_KVAL: f32 = 255.0 / 256.0 * 100.0;
/// Maximum torque reference, millivolts.
pub const MAX_TVAL: f32 = 1000.0;
/// Maximum stall/overcurrent threshold, millivolts.
pub const MAX_STALL_OCD_TH: f32 = 1000.0;
/// Maximum BEMF compensation slope, percent per step/s.
pub const MAX_SLOPE: f32 = 0.4;
/// Maximum minimum on/off time, microseconds.
pub const MAX_T_MIN: f32 = 64.0;
/// Maximum fast-decay / fall-step time, microseconds.
pub const MAX_T_FAST: f32 = 32.0;

/// Acceleration or deceleration in step/s² to the 12-bit ACC/DEC value.
pub fn acc_dec_to_reg(steps_s2: f32) -> u16 {
    roundf(steps_s2 * 0.068719476736) as u16
}

/// ACC/DEC register value to step/s².
pub fn acc_dec_from_reg(raw: u32) -> f32 {
    raw as f32 * 14.5519152283
}

/// Speed in step/s to the 20-bit RUN/GO_UNTIL/SPEED value.
pub fn speed_to_reg(steps_s: f32) -> u32 {
    roundf(steps_s * 67.108864) as u32
}

/// 20-bit SPEED value to step/s.
pub fn speed_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.014_901_161_19
}

/// Speed in step/s to the 10-bit MAX_SPEED value.
pub fn max_speed_to_reg(steps_s: f32) -> u16 {
    roundf(steps_s * 0.065536) as u16
}

/// MAX_SPEED register value to step/s.
pub fn max_speed_from_reg(raw: u32) -> f32 {
    raw as f32 * 15.258789
}

/// Speed in step/s to the 12-bit MIN_SPEED value.
pub fn min_speed_to_reg(steps_s: f32) -> u16 {
    roundf(steps_s * 4.194304) as u16
}

/// MIN_SPEED register value to step/s.
pub fn min_speed_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.238418579
}

/// Speed in step/s to the 10-bit FS_SPD value (truncating, per datasheet).
pub fn fs_spd_to_reg(steps_s: f32) -> u16 {
    (steps_s * 0.065536) as u16
}

/// FS_SPD register value to step/s.
pub fn fs_spd_from_reg(raw: u32) -> f32 {
    (raw as f32 + 0.999) * 15.258789
}

/// Speed in step/s to the 14-bit INT_SPEED value.
pub fn int_speed_to_reg(steps_s: f32) -> u16 {
    roundf(steps_s * 16.777216) as u16
}

/// INT_SPEED register value to step/s.
pub fn int_speed_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.0596045
}

/// Thermal compensation factor (1.0..=1.46875) to the 4-bit K_THERM value.
pub fn k_therm_to_reg(factor: f32) -> u8 {
    roundf((factor - 1.0) * 32.0) as u8
}

/// K_THERM register value to the compensation factor.
pub fn k_therm_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.03125 + 1.0
}

/// Voltage amplitude in percent of supply to the 8-bit KVAL value.
pub fn kval_to_reg(percent: f32) -> u8 {
    roundf(percent * 2.56) as u8
}

/// KVAL register value to percent of supply.
pub fn kval_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.390625
}

/// Torque reference in millivolts to the 7-bit TVAL value.
pub fn tval_to_reg(millivolts: f32) -> u8 {
    roundf((millivolts - 7.8125) * 0.128) as u8
}

/// TVAL register value to millivolts.
pub fn tval_from_reg(raw: u32) -> f32 {
    (raw as f32 + 1.0) * 7.8125
}

/// Stall or overcurrent threshold in millivolts to the 5-bit register value.
pub fn stall_ocd_th_to_reg(millivolts: f32) -> u8 {
    roundf((millivolts - 31.25) * 0.032) as u8
}

/// Stall/OCD threshold register value to millivolts.
pub fn stall_ocd_th_from_reg(raw: u32) -> f32 {
    (raw as f32 + 1.0) * 31.25
}

/// BEMF compensation slope in percent per step/s to the 8-bit slope value.
pub fn slope_to_reg(percent: f32) -> u8 {
    roundf(percent * 637.5) as u8
}

/// Slope register value to percent per step/s.
pub fn slope_from_reg(raw: u32) -> f32 {
    raw as f32 * 0.001_568_627_450_98
}

/// Minimum on/off time in microseconds to the 7-bit TON_MIN/TOFF_MIN value.
pub fn t_min_to_reg(micros: f32) -> u8 {
    roundf((micros - 0.5) * 2.0) as u8
}

/// TON_MIN/TOFF_MIN register value to microseconds.
pub fn t_min_from_reg(raw: u32) -> f32 {
    (raw as f32 + 1.0) * 0.5
}

/// Fast-decay or fall-step time in microseconds to a 4-bit T_FAST nibble.
pub fn t_fast_to_reg(micros: f32) -> u8 {
    (micros / 2.0 - 1.0) as u8
}

/// T_FAST nibble to microseconds.
pub fn t_fast_from_reg(raw: u32) -> f32 {
    (raw as f32 + 1.0) * 2.0
}
