use std::io;

pub mod simulated;
pub mod sysfs;

pub use simulated::{PinWrite, SimulatedGpio};
pub use sysfs::SysfsGpio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Output,
    Input(Pull),
}

/// Digital pin access used by the stepper drivers.
///
/// `read` returns the logical level of an input: a pull-up input reports
/// `true` while it is pulled to ground.
pub trait Gpio: Send {
    fn setup_output(&mut self, pin: u8) -> io::Result<()>;
    fn setup_input(&mut self, pin: u8, pull: Pull) -> io::Result<()>;
    fn write(&mut self, pin: u8, level: bool) -> io::Result<()>;
    fn read(&mut self, pin: u8) -> io::Result<bool>;
}
