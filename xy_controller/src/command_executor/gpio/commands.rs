use std::io;

use ::gpio::Pull;
use utilities::command_executor::Command;

use crate::command_executor::gpio::GpioHandler;

#[derive(Debug, Clone)]
pub enum GpioCommand {
    SetupOutput { pin: u8 },
    SetupInput { pin: u8, pull: Pull },
    WritePattern { pins: [u8; 4], levels: [bool; 4] },
    Read { pin: u8 },
}

pub enum CommandResponse {
    Ok,
    Level(bool),
}

impl Command for GpioCommand {
    type Response = CommandResponse;
    type Handler = GpioHandler;

    fn execute(self, handler: &mut Self::Handler) -> io::Result<Self::Response> {
        match self {
            GpioCommand::SetupOutput { pin } => handler.setup_output(pin),
            GpioCommand::SetupInput { pin, pull } => handler.setup_input(pin, pull),
            GpioCommand::WritePattern { pins, levels } => handler.write_pattern(pins, levels),
            GpioCommand::Read { pin } => handler.read(pin),
        }
    }
}
