use std::io;

use ::gpio::Pull;
use utilities::command_executor::CommandSender;

use crate::{
    command_executor::gpio::commands::{CommandResponse, GpioCommand},
    controller::sequence::CoilPattern,
};

fn unexpected_response() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "Unexpected response type")
}

#[derive(Clone)]
pub struct GpioCommandSender {
    sender: CommandSender<GpioCommand>,
}

impl GpioCommandSender {
    pub fn new(sender: CommandSender<GpioCommand>) -> Self {
        Self { sender }
    }

    pub async fn setup_output(&self, pin: u8) -> io::Result<()> {
        match self.sender.send_command(GpioCommand::SetupOutput { pin }).await? {
            CommandResponse::Ok => Ok(()),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn setup_input(&self, pin: u8, pull: Pull) -> io::Result<()> {
        match self
            .sender
            .send_command(GpioCommand::SetupInput { pin, pull })
            .await?
        {
            CommandResponse::Ok => Ok(()),
            _ => Err(unexpected_response()),
        }
    }

    pub async fn read(&self, pin: u8) -> io::Result<bool> {
        match self.sender.send_command(GpioCommand::Read { pin }).await? {
            CommandResponse::Level(level) => Ok(level),
            _ => Err(unexpected_response()),
        }
    }

    /// Applies all four coil levels as one command. Blocks the calling thread.
    pub fn write_pattern_blocking(&self, pins: [u8; 4], pattern: CoilPattern) -> io::Result<()> {
        let command = GpioCommand::WritePattern {
            pins,
            levels: pattern.levels(),
        };

        match self.sender.send_command_blocking(command)? {
            CommandResponse::Ok => Ok(()),
            _ => Err(unexpected_response()),
        }
    }
}
