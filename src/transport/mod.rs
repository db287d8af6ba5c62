//! Daisy-chain SPI transport for up to four powerSTEP01 devices.
//!
//! All devices on the chain share one chip select. A transaction is a frame
//! of byte rows: each row carries one byte per device and is clocked out in a
//! single CS assertion, most-distant device first. Devices not addressed by a
//! frame receive NOP in their column. Responses shift back through the chain
//! one row behind the request.

mod preempt;

pub use preempt::Preemption;

use embedded_hal::spi::{Error as SpiError, SpiDevice};

use crate::error::{Result, TransportError};
use crate::registers::{opcode, Register};

/// Largest supported chain length.
pub const MAX_DEVICES: usize = 4;

/// Rows in a full command frame: opcode plus up to three argument bytes.
const FRAME_ROWS: usize = 4;

/// Daisy-chained powerSTEP01 transport over an [`SpiDevice`].
#[derive(Debug)]
pub struct Chain<SPI> {
    spi: SPI,
    count: usize,
    preempt: Preemption,
}

impl<SPI: SpiDevice> Chain<SPI> {
    /// Creates a transport for `count` daisy-chained devices (1..=4).
    ///
    /// A `count` outside the supported range is clamped into it.
    pub fn new(spi: SPI, count: usize) -> Chain<SPI> {
        Chain {
            spi,
            count: count.clamp(1, MAX_DEVICES),
            preempt: Preemption::new(),
        }
    }

    /// Devices on the chain.
    pub fn device_count(&self) -> usize {
        self.count
    }

    /// ISR-context guard for this chain's bus.
    pub fn preemption(&self) -> &Preemption {
        &self.preempt
    }

    /// Releases the underlying SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    fn check_device(&self, device: usize) -> Result<()> {
        if device < self.count {
            Ok(())
        } else {
            Err(TransportError::DeviceOutOfRange {
                index: device,
                count: self.count,
            }
            .into())
        }
    }

    /// Composes a frame addressing one device, retrying if an ISR-context
    /// transaction lands mid-composition. `bytes` land in the device's column
    /// starting at row `FRAME_ROWS - rows`; the rest of the rows stay NOP
    /// (reads clock NOP rows to shift the response out).
    fn compose(&self, device: usize, bytes: &[u8], rows: usize) -> [[u8; MAX_DEVICES]; FRAME_ROWS] {
        loop {
            self.preempt.arm();
            let mut frame = [[opcode::NOP; MAX_DEVICES]; FRAME_ROWS];
            // Device 0 sits at the far end of the shift chain.
            let column = self.count - 1 - device;
            let first_row = FRAME_ROWS - rows;
            for (i, &b) in bytes.iter().enumerate() {
                frame[first_row + i][column] = b;
            }
            if !self.preempt.was_preempted() {
                return frame;
            }
        }
    }

    /// Clocks out the trailing `rows` rows of a frame, one CS assertion per
    /// row, and returns the full-frame receive buffer.
    fn transfer(
        &mut self,
        frame: &[[u8; MAX_DEVICES]; FRAME_ROWS],
        rows: usize,
    ) -> Result<[[u8; MAX_DEVICES]; FRAME_ROWS]> {
        self.preempt.note_transaction();
        let mut rx = [[0u8; MAX_DEVICES]; FRAME_ROWS];
        for row in FRAME_ROWS - rows..FRAME_ROWS {
            self.spi
                .transfer(&mut rx[row][..self.count], &frame[row][..self.count])
                .map_err(|e| TransportError::Spi(e.kind()))?;
        }
        Ok(rx)
    }

    fn column(&self, device: usize) -> usize {
        self.count - 1 - device
    }

    /// Sends an argument-free command byte to one device.
    pub fn send_command(&mut self, device: usize, op: u8) -> Result<()> {
        self.check_device(device)?;
        let frame = self.compose(device, &[op], 1);
        self.transfer(&frame, 1)?;
        Ok(())
    }

    /// Sends a command carrying a 22-bit big-endian argument.
    pub fn send_command_with_value(&mut self, device: usize, op: u8, value: u32) -> Result<()> {
        self.check_device(device)?;
        let bytes = [op, (value >> 16) as u8, (value >> 8) as u8, value as u8];
        let frame = self.compose(device, &bytes, FRAME_ROWS);
        self.transfer(&frame, FRAME_ROWS)?;
        Ok(())
    }

    /// Writes a register with SET_PARAM. The value is truncated to the
    /// register's argument width.
    pub fn set_param(&mut self, device: usize, register: Register, value: u32) -> Result<()> {
        self.check_device(device)?;
        if !register.writable() {
            return Err(crate::error::RegisterError::NotWritable(register).into());
        }
        let len = register.arg_len();
        let mut bytes = [0u8; FRAME_ROWS];
        bytes[0] = opcode::SET_PARAM | register.addr();
        for i in 0..len {
            bytes[1 + i] = (value >> (8 * (len - 1 - i))) as u8;
        }
        let frame = self.compose(device, &bytes[..1 + len], 1 + len);
        self.transfer(&frame, 1 + len)?;
        Ok(())
    }

    /// Reads a register with GET_PARAM. The response assembles from the rows
    /// clocked out after the opcode row.
    pub fn get_param(&mut self, device: usize, register: Register) -> Result<u32> {
        self.check_device(device)?;
        let len = register.arg_len();
        let rows = 1 + len;
        let frame = self.compose(device, &[opcode::GET_PARAM | register.addr()], rows);
        let rx = self.transfer(&frame, rows)?;
        let col = self.column(device);
        let value = (rx[1][col] as u32) << 16 | (rx[2][col] as u32) << 8 | rx[3][col] as u32;
        Ok(value & (u32::MAX >> (32 - 8 * len)))
    }

    /// Issues GET_STATUS, which clears the latched status flags, and returns
    /// the raw status word.
    pub fn get_status(&mut self, device: usize) -> Result<u16> {
        self.check_device(device)?;
        let frame = self.compose(device, &[opcode::GET_STATUS], 3);
        let rx = self.transfer(&frame, 3)?;
        let col = self.column(device);
        Ok((rx[2][col] as u16) << 8 | rx[3][col] as u16)
    }
}
