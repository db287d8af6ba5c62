//! # powerstep-motion
//!
//! Motion control for daisy-chained powerSTEP01 stepper drivers over
//! embedded-hal 1.0 SPI.
//!
//! ## Features
//!
//! - **Daisy-chain SPI transport**: one [`transport::Chain`] frames commands
//!   for up to four drivers sharing a chip select, with interrupt-preemption
//!   retry for transfers raced by a FLAG handler
//! - **Typed register map**: every powerSTEP01 register with physical-unit
//!   codecs, bit-field views and current/voltage-mode aliases
//! - **Verified writes**: the [`device::Device`] facade reads every register
//!   back and reports silently-dropped writes
//! - **Threaded motion control** (`std`): [`motion::StepperController`] with
//!   limit-switch homing, busy-event waits and FLAG decoding
//! - **Persisted parameters**: named parameters behind a declarative table,
//!   with per-device sets stored as postcard blobs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use powerstep_motion::hal::{DigitalInput, SwitchLogic};
//! use powerstep_motion::motion::StepperController;
//! use powerstep_motion::transport::Chain;
//!
//! let chain = Chain::new(spi, 2);
//! let ctl = StepperController::new(chain, io);
//!
//! ctl.attach_limit_switch(0, DigitalInput(3), SwitchLogic::ActiveHigh)?;
//! ctl.homing(0, 200.0)?;
//! ctl.wait(0)?;
//! ctl.move_absolute(0, 3200, true)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): threaded controller, homing and host-side storage
//! - `alloc`: heap allocation for no_std with allocator
//! - `defmt`: defmt formatting for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod device;
pub mod error;
pub mod params;
pub mod registers;
pub mod transport;

// Host-side controller (std only)
#[cfg(feature = "std")]
pub mod hal;
#[cfg(feature = "std")]
pub mod motion;

// Re-exports for ergonomic API
pub use device::Device;
pub use error::{Error, Result};
pub use params::{AdvancedParam, ParamStore, ParamValue, ParameterSet};
pub use registers::{Direction, Register, StopMode, SwitchAction};
pub use transport::Chain;

#[cfg(feature = "std")]
pub use hal::{MotorIo, SwitchLogic};
#[cfg(feature = "std")]
pub use motion::{StepperController, SwitchBinding};
