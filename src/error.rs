//! Error types for powerstep-motion.
//!
//! Provides unified error handling across the chain transport, register
//! access, motion control and parameter persistence layers.

use core::fmt;

use crate::registers::Register;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all powerstep-motion operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Daisy-chain SPI transport error
    Transport(TransportError),
    /// Register access or verification error
    Register(RegisterError),
    /// Motion controller error
    Motion(MotionError),
    /// Named-parameter error
    Param(ParamError),
    /// Parameter persistence error
    Storage(StorageError),
}

/// Daisy-chain transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The SPI bus transaction failed
    Spi(embedded_hal::spi::ErrorKind),
    /// Device index outside the configured chain
    DeviceOutOfRange {
        /// Requested device index
        index: usize,
        /// Devices on the chain
        count: usize,
    },
}

/// Register access errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterError {
    /// Read-back after a write did not match the written value
    VerifyFailed {
        /// Target register
        register: Register,
        /// Value written
        written: u32,
        /// Value read back
        read: u32,
    },
    /// SET_PARAM targeted a read-only register
    NotWritable(Register),
    /// Register has no such interpretation in the active control mode
    WrongMode(Register),
    /// Physical value outside the register's representable range
    ValueOutOfRange {
        /// Target register
        register: Register,
        /// Requested value
        value: f32,
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
}

/// Motion controller errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Homing requested with no limit switch bound to the motor
    NoLimitSwitch {
        /// Device index on the chain
        motor: usize,
    },
    /// Limit-switch binding table is full
    TooManySwitches,
    /// Target position outside the 22-bit register range
    PositionOutOfRange(i32),
    /// Could not spawn the homing task
    SpawnFailed(heapless::String<64>),
}

/// Named-parameter errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    /// No parameter with this name
    UnknownName(heapless::String<32>),
    /// Parameter cannot be read back from the device
    NotReadable(heapless::String<32>),
    /// Parameter cannot be written to the device
    NotWritable(heapless::String<32>),
    /// Supplied value kind does not match the parameter
    WrongValueKind(heapless::String<32>),
    /// Parameter does not apply in the active control mode
    ModeMismatch(heapless::String<32>),
    /// Refusing to persist an all-zero motion profile
    InvalidProfile,
}

/// Parameter persistence errors.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No blob stored under this key
    NotFound(heapless::String<16>),
    /// Stored blob does not decode as a parameter set
    Corrupt(heapless::String<16>),
    /// Parameter set did not fit the serialization buffer
    Serialize,
    /// Backend-specific failure
    Backend(heapless::String<64>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Register(e) => write!(f, "Register error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
            Error::Param(e) => write!(f, "Parameter error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Spi(kind) => write!(f, "SPI transaction failed: {:?}", kind),
            TransportError::DeviceOutOfRange { index, count } => {
                write!(f, "Device {} outside chain of {} devices", index, count)
            }
        }
    }
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::VerifyFailed {
                register,
                written,
                read,
            } => write!(
                f,
                "Verify failed on {:?}: wrote {:#x}, read back {:#x}",
                register, written, read
            ),
            RegisterError::NotWritable(register) => {
                write!(f, "Register {:?} is read-only", register)
            }
            RegisterError::WrongMode(register) => {
                write!(f, "Register {:?} has no meaning in the active mode", register)
            }
            RegisterError::ValueOutOfRange {
                register,
                value,
                min,
                max,
            } => write!(
                f,
                "Value {} for {:?} outside [{}, {}]",
                value, register, min, max
            ),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::NoLimitSwitch { motor } => {
                write!(f, "No limit switch bound to motor {}", motor)
            }
            MotionError::TooManySwitches => write!(f, "Limit-switch binding table is full"),
            MotionError::PositionOutOfRange(pos) => {
                write!(f, "Position {} outside 22-bit range", pos)
            }
            MotionError::SpawnFailed(msg) => write!(f, "Homing task spawn failed: {}", msg),
        }
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::UnknownName(name) => write!(f, "Unknown parameter '{}'", name),
            ParamError::NotReadable(name) => write!(f, "Parameter '{}' is not readable", name),
            ParamError::NotWritable(name) => write!(f, "Parameter '{}' is not writable", name),
            ParamError::WrongValueKind(name) => {
                write!(f, "Wrong value kind for parameter '{}'", name)
            }
            ParamError::ModeMismatch(name) => {
                write!(f, "Parameter '{}' does not apply in the active mode", name)
            }
            ParamError::InvalidProfile => {
                write!(f, "Refusing to persist an all-zero motion profile")
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "No blob stored under '{}'", key),
            StorageError::Corrupt(key) => write!(f, "Stored blob '{}' does not decode", key),
            StorageError::Serialize => write!(f, "Parameter set serialization failed"),
            StorageError::Backend(msg) => write!(f, "Storage backend: {}", msg),
        }
    }
}

// Conversion impls
impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<RegisterError> for Error {
    fn from(e: RegisterError) -> Self {
        Error::Register(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl From<ParamError> for Error {
    fn from(e: ParamError) -> Self {
        Error::Param(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

#[cfg(feature = "std")]
impl std::error::Error for RegisterError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}

#[cfg(feature = "std")]
impl std::error::Error for ParamError {}

#[cfg(feature = "std")]
impl std::error::Error for StorageError {}
