//! Shared test doubles: a register-file simulator for a powerSTEP01 daisy
//! chain and an in-memory [`MotorIo`] implementation.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};
use powerstep_motion::hal::{DigitalInput, InterruptEdge, MotorIo, SwitchTrigger};

/// Healthy idle status word: HiZ, not busy, all active-low faults deasserted.
pub const STATUS_IDLE: u32 = 0xE603;

/// One command a simulated device finished decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommand {
    /// SET_PARAM to a register address.
    SetParam(u8, u32),
    /// GET_PARAM from a register address.
    GetParam(u8),
    /// GET_STATUS exchange.
    GetStatus,
    /// Argument-free application command.
    Op(u8),
    /// Application command with a 22-bit argument.
    OpValue(u8, u32),
}

fn sim_arg_len(addr: u8) -> usize {
    match addr {
        0x01 | 0x03 | 0x04 => 3,
        0x02 | 0x05 | 0x06 | 0x07 | 0x08 | 0x0D | 0x15 | 0x18 | 0x1A | 0x1B => 2,
        _ => 1,
    }
}

fn takes_value(op: u8) -> bool {
    matches!(
        op,
        0x40 | 0x41 | 0x50 | 0x51 | 0x60 | 0x68 | 0x69 | 0x82 | 0x83 | 0x8A | 0x8B
    )
}

enum Pending {
    SetParam { addr: u8, remaining: usize, value: u32 },
    OpValue { op: u8, remaining: usize, value: u32 },
}

struct SimDevice {
    regs: [u32; 0x1C],
    out: VecDeque<u8>,
    pending: Option<Pending>,
    commands: Vec<SimCommand>,
    /// Register whose writes are silently corrupted, to exercise the
    /// read-back verification path.
    broken: Option<u8>,
}

impl SimDevice {
    fn new() -> SimDevice {
        let mut dev = SimDevice {
            regs: [0; 0x1C],
            out: VecDeque::new(),
            pending: None,
            commands: Vec::new(),
            broken: None,
        };
        dev.reset_regs();
        dev
    }

    fn reset_regs(&mut self) {
        self.regs = [0; 0x1C];
        self.regs[0x16] = 0x07; // STEP_MODE: 1/128, voltage mode
        self.regs[0x1A] = 0x2C88; // CONFIG power-up value
        self.regs[0x1B] = STATUS_IDLE;
    }

    fn shift(&mut self, input: u8) -> u8 {
        let out = self.out.pop_front().unwrap_or(0);
        self.accept(input);
        out
    }

    fn accept(&mut self, byte: u8) {
        match self.pending.take() {
            Some(Pending::SetParam {
                addr,
                remaining,
                value,
            }) => {
                let value = value << 8 | byte as u32;
                if remaining > 1 {
                    self.pending = Some(Pending::SetParam {
                        addr,
                        remaining: remaining - 1,
                        value,
                    });
                } else {
                    let stored = if self.broken == Some(addr) {
                        value ^ 1
                    } else {
                        value
                    };
                    self.regs[addr as usize] = stored;
                    self.commands.push(SimCommand::SetParam(addr, value));
                }
            }
            Some(Pending::OpValue {
                op,
                remaining,
                value,
            }) => {
                let value = value << 8 | byte as u32;
                if remaining > 1 {
                    self.pending = Some(Pending::OpValue {
                        op,
                        remaining: remaining - 1,
                        value,
                    });
                } else {
                    self.finish_op(op, value & 0x3F_FFFF);
                }
            }
            None => self.opcode(byte),
        }
    }

    fn opcode(&mut self, op: u8) {
        match op {
            0x00 => {}
            _ if op & 0xE0 == 0x00 => {
                let addr = op & 0x1F;
                self.pending = Some(Pending::SetParam {
                    addr,
                    remaining: sim_arg_len(addr),
                    value: 0,
                });
            }
            _ if op & 0xE0 == 0x20 => {
                let addr = op & 0x1F;
                let len = sim_arg_len(addr);
                let value = self.regs[addr as usize];
                for i in (0..len).rev() {
                    self.out.push_back((value >> (8 * i)) as u8);
                }
                self.commands.push(SimCommand::GetParam(addr));
            }
            0xD0 => {
                let status = self.regs[0x1B];
                self.out.push_back((status >> 8) as u8);
                self.out.push_back(status as u8);
                self.regs[0x1B] = STATUS_IDLE;
                self.commands.push(SimCommand::GetStatus);
            }
            _ if takes_value(op) => {
                self.pending = Some(Pending::OpValue {
                    op,
                    remaining: 3,
                    value: 0,
                });
            }
            0xC0 => {
                self.reset_regs();
                self.commands.push(SimCommand::Op(op));
            }
            0x70 | 0xD8 => {
                self.regs[0x01] = 0;
                self.commands.push(SimCommand::Op(op));
            }
            0x78 => {
                self.regs[0x01] = self.regs[0x03];
                self.commands.push(SimCommand::Op(op));
            }
            _ => self.commands.push(SimCommand::Op(op)),
        }
    }

    fn finish_op(&mut self, op: u8, value: u32) {
        if op & 0xF8 == 0x60 || op & 0xF8 == 0x68 {
            // GO_TO lands instantly in the simulator.
            self.regs[0x01] = value;
        }
        self.commands.push(SimCommand::OpValue(op, value));
    }
}

struct SimState {
    devices: Vec<SimDevice>,
}

/// A daisy chain of simulated powerSTEP01 devices behind an [`SpiDevice`].
///
/// Clones share the same state, so a test can keep a handle for assertions
/// while the transport owns the other.
#[derive(Clone)]
pub struct SimChain {
    state: Arc<Mutex<SimState>>,
}

impl SimChain {
    pub fn new(count: usize) -> SimChain {
        SimChain {
            state: Arc::new(Mutex::new(SimState {
                devices: (0..count).map(|_| SimDevice::new()).collect(),
            })),
        }
    }

    /// Commands device `device` has decoded so far.
    pub fn commands(&self, device: usize) -> Vec<SimCommand> {
        self.state.lock().unwrap().devices[device].commands.clone()
    }

    pub fn clear_commands(&self, device: usize) {
        self.state.lock().unwrap().devices[device].commands.clear();
    }

    /// Raw register value on a device.
    pub fn register(&self, device: usize, addr: u8) -> u32 {
        self.state.lock().unwrap().devices[device].regs[addr as usize]
    }

    pub fn set_register(&self, device: usize, addr: u8, value: u32) {
        self.state.lock().unwrap().devices[device].regs[addr as usize] = value;
    }

    /// Makes writes to one register come back corrupted.
    pub fn break_register(&self, device: usize, addr: u8) {
        self.state.lock().unwrap().devices[device].broken = Some(addr);
    }

    /// Undoes [`break_register`](Self::break_register).
    pub fn fix_register(&self, device: usize) {
        self.state.lock().unwrap().devices[device].broken = None;
    }

    /// Polls `predicate` against the device's command log until it holds.
    pub fn wait_for_commands(&self, device: usize, predicate: impl Fn(&[SimCommand]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if predicate(&self.commands(device)) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for commands");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl ErrorType for SimChain {
    type Error = core::convert::Infallible;
}

impl SpiDevice for SimChain {
    fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        for op in operations {
            if let Operation::Transfer(read, write) = op {
                let count = write.len();
                for col in 0..count {
                    // Device 0 sits at the far end of the shift chain.
                    let device = count - 1 - col;
                    read[col] = state.devices[device].shift(write[col]);
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockIoState {
    inputs: Mutex<HashMap<u8, bool>>,
    busy: Mutex<HashMap<usize, bool>>,
    attachments: Mutex<HashMap<u8, (InterruptEdge, SwitchTrigger)>>,
    switch_pulses: Mutex<Vec<usize>>,
    adc: Mutex<u16>,
}

/// In-memory [`MotorIo`]: levels are set by the test, interrupt bindings are
/// recorded and can be fired by hand.
#[derive(Clone, Default)]
pub struct MockIo {
    state: Arc<MockIoState>,
}

impl MockIo {
    pub fn new() -> MockIo {
        MockIo::default()
    }

    pub fn set_input(&self, input: DigitalInput, level: bool) {
        self.state.lock_inputs().insert(input.0, level);
    }

    /// Sets a motor's BUSY level; high means idle.
    pub fn set_busy(&self, motor: usize, idle: bool) {
        self.state.busy.lock().unwrap().insert(motor, idle);
    }

    pub fn set_adc(&self, raw: u16) {
        *self.state.adc.lock().unwrap() = raw;
    }

    /// Edge the given input is currently bound to, if any.
    pub fn attached_edge(&self, input: DigitalInput) -> Option<InterruptEdge> {
        self.state
            .attachments
            .lock()
            .unwrap()
            .get(&input.0)
            .map(|(edge, _)| *edge)
    }

    /// Invokes the trigger bound to an input, as the interrupt would.
    pub fn fire(&self, input: DigitalInput) {
        let trigger = self
            .state
            .attachments
            .lock()
            .unwrap()
            .get(&input.0)
            .map(|(_, t)| t.clone());
        if let Some(trigger) = trigger {
            trigger.trigger();
        }
    }

    /// Motors whose SW line was pulsed, in order.
    pub fn switch_pulses(&self) -> Vec<usize> {
        self.state.switch_pulses.lock().unwrap().clone()
    }
}

impl MockIoState {
    fn lock_inputs(&self) -> std::sync::MutexGuard<'_, HashMap<u8, bool>> {
        self.inputs.lock().unwrap()
    }
}

impl MotorIo for MockIo {
    fn digital_read(&self, input: DigitalInput) -> bool {
        *self.state.lock_inputs().get(&input.0).unwrap_or(&false)
    }

    fn attach_interrupt(&self, input: DigitalInput, edge: InterruptEdge, trigger: SwitchTrigger) {
        self.state
            .attachments
            .lock()
            .unwrap()
            .insert(input.0, (edge, trigger));
    }

    fn detach_interrupt(&self, input: DigitalInput) {
        self.state.attachments.lock().unwrap().remove(&input.0);
    }

    fn busy_level(&self, motor: usize) -> bool {
        *self.state.busy.lock().unwrap().get(&motor).unwrap_or(&true)
    }

    fn set_switch_level(&self, motor: usize, high: bool) {
        if high {
            self.state.switch_pulses.lock().unwrap().push(motor);
        }
    }

    fn supply_adc(&self) -> u16 {
        *self.state.adc.lock().unwrap()
    }

    fn delay_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}
