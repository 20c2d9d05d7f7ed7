use std::{collections::HashMap, io, thread, time::Duration};

use sysfs_gpio::{Direction, Pin};

use crate::{Gpio, PinMode, Pull};

const DIRECTION_RETRIES: u32 = 20;
const DIRECTION_RETRY_DELAY: Duration = Duration::from_millis(10);

fn to_io(error: sysfs_gpio::Error) -> io::Error {
    match error {
        sysfs_gpio::Error::Io(error) => error,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Linux sysfs GPIO backend.
///
/// sysfs cannot program pin bias, so pull-ups are expected from the board.
/// Pull-up inputs are switched to active low so a closed switch reads `true`.
#[derive(Default)]
pub struct SysfsGpio {
    pins: HashMap<u8, (Pin, PinMode)>,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports `pin` and programs its direction. Right after export udev may
    /// not have fixed the attribute permissions yet, so the first direction
    /// write is retried.
    fn configure(&mut self, pin: u8, direction: Direction, mode: PinMode) -> io::Result<Pin> {
        let handle = Pin::new(u64::from(pin));
        handle.export().map_err(to_io)?;

        let mut attempt = 0;
        loop {
            match handle.set_direction(direction) {
                Ok(()) => break,
                Err(_) if attempt < DIRECTION_RETRIES => {
                    attempt += 1;
                    thread::sleep(DIRECTION_RETRY_DELAY);
                }
                Err(e) => return Err(to_io(e)),
            }
        }

        self.pins.insert(pin, (handle, mode));
        Ok(handle)
    }

    fn pin(&self, pin: u8, expected: fn(&PinMode) -> bool) -> io::Result<Pin> {
        match self.pins.get(&pin) {
            Some((handle, mode)) if expected(mode) => Ok(*handle),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("gpio{} is not configured for this operation", pin),
            )),
        }
    }
}

impl Gpio for SysfsGpio {
    fn setup_output(&mut self, pin: u8) -> io::Result<()> {
        // Low sets the direction and drives the pin low in one write
        self.configure(pin, Direction::Low, PinMode::Output)?;
        Ok(())
    }

    fn setup_input(&mut self, pin: u8, pull: Pull) -> io::Result<()> {
        let handle = self.configure(pin, Direction::In, PinMode::Input(pull))?;
        handle.set_active_low(pull == Pull::Up).map_err(to_io)
    }

    fn write(&mut self, pin: u8, level: bool) -> io::Result<()> {
        let handle = self.pin(pin, |mode| *mode == PinMode::Output)?;
        handle.set_value(u8::from(level)).map_err(to_io)
    }

    fn read(&mut self, pin: u8) -> io::Result<bool> {
        let handle = self.pin(pin, |mode| matches!(mode, PinMode::Input(_)))?;
        match handle.get_value().map_err(to_io)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected value {} on gpio{}", other, pin),
            )),
        }
    }
}
