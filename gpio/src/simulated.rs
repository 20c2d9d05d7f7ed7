use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{Gpio, PinMode, Pull};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u8,
    pub level: bool,
}

#[derive(Debug, Default)]
struct Pins {
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, bool>,
    writes: Vec<PinWrite>,
}

/// In-memory pin table. Clones share the same table, so a test can keep a
/// handle while another clone is owned by the executor.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGpio {
    pins: Arc<Mutex<Pins>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    fn pins(&self) -> MutexGuard<'_, Pins> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drives the level an input pin will report.
    pub fn set_input(&self, pin: u8, level: bool) {
        self.pins().levels.insert(pin, level);
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.pins().modes.get(&pin).copied()
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        self.pins().levels.get(&pin).copied()
    }

    pub fn writes(&self) -> Vec<PinWrite> {
        self.pins().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.pins().writes.clear();
    }
}

impl Gpio for SimulatedGpio {
    fn setup_output(&mut self, pin: u8) -> io::Result<()> {
        let mut pins = self.pins();
        pins.modes.insert(pin, PinMode::Output);
        pins.levels.insert(pin, false);
        Ok(())
    }

    fn setup_input(&mut self, pin: u8, pull: Pull) -> io::Result<()> {
        let mut pins = self.pins();
        pins.modes.insert(pin, PinMode::Input(pull));
        pins.levels.entry(pin).or_insert(false);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> io::Result<()> {
        let mut pins = self.pins();
        if pins.modes.get(&pin) != Some(&PinMode::Output) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pin {} is not configured as an output", pin),
            ));
        }

        pins.levels.insert(pin, level);
        pins.writes.push(PinWrite { pin, level });
        Ok(())
    }

    fn read(&mut self, pin: u8) -> io::Result<bool> {
        let pins = self.pins();
        match pins.modes.get(&pin) {
            Some(PinMode::Input(_)) => Ok(pins.levels.get(&pin).copied().unwrap_or(false)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pin {} is not configured as an input", pin),
            )),
        }
    }
}
