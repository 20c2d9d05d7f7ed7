use std::io;

use ::gpio::{Gpio, Pull};
use commands::{CommandResponse, GpioCommand};
use utilities::command_executor::{CommandExecutor, DeviceHandler};

use crate::command_executor::gpio::command_sender::GpioCommandSender;

pub mod command_sender;
pub mod commands;

pub struct GpioHandler {
    backend: Box<dyn Gpio>,
}

impl DeviceHandler for GpioHandler {
    type Command = GpioCommand;
}

impl GpioHandler {
    pub fn new(backend: Box<dyn Gpio>) -> Self {
        Self { backend }
    }

    pub fn setup_output(&mut self, pin: u8) -> io::Result<CommandResponse> {
        self.backend.setup_output(pin)?;
        Ok(CommandResponse::Ok)
    }

    pub fn setup_input(&mut self, pin: u8, pull: Pull) -> io::Result<CommandResponse> {
        self.backend.setup_input(pin, pull)?;
        Ok(CommandResponse::Ok)
    }

    pub fn write_pattern(&mut self, pins: [u8; 4], levels: [bool; 4]) -> io::Result<CommandResponse> {
        for (pin, level) in pins.into_iter().zip(levels) {
            self.backend.write(pin, level)?;
        }
        Ok(CommandResponse::Ok)
    }

    pub fn read(&mut self, pin: u8) -> io::Result<CommandResponse> {
        let level = self.backend.read(pin)?;
        Ok(CommandResponse::Level(level))
    }
}

pub fn create_gpio(backend: Box<dyn Gpio>) -> (CommandExecutor<GpioHandler>, GpioCommandSender) {
    let executor = CommandExecutor::new(GpioHandler::new(backend));
    let sender = GpioCommandSender::new(executor.sender());

    (executor, sender)
}
