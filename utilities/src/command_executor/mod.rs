use std::{
    io,
    sync::mpsc::{Receiver, Sender},
};

use tokio::sync::oneshot;
use tracing::warn;

pub trait Command: Send {
    type Response: Send;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> io::Result<Self::Response>;
}

pub trait DeviceHandler {
    type Command: Command<Handler = Self>;
}

pub struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<io::Result<C::Response>>,
}

impl<C: Command> GenericCommand<C> {
    pub fn new(command: C, response_ch: oneshot::Sender<io::Result<C::Response>>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    pub fn execute(self, handler: &mut C::Handler) -> io::Result<()> {
        let result = self.command.execute(handler);

        self.response_ch
            .send(result)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to send response"))?;

        Ok(())
    }
}

/// Owns a device handler on a dedicated thread and runs commands one at a
/// time, so every sender sees the device through a single owner.
pub struct CommandExecutor<H: DeviceHandler + Send + 'static> {
    handler: H,
    commands_ch: Receiver<GenericCommand<H::Command>>,
    sender: Sender<GenericCommand<H::Command>>,
}

impl<H: DeviceHandler + Send> CommandExecutor<H> {
    pub fn new(handler: H) -> Self {
        let (sender, commands_ch) = std::sync::mpsc::channel();

        Self {
            handler,
            commands_ch,
            sender,
        }
    }

    pub fn sender(&self) -> CommandSender<H::Command> {
        CommandSender::new(self.sender.clone())
    }

    pub fn run(&mut self) -> io::Result<()> {
        while let Ok(command) = self.commands_ch.recv() {
            if let Err(e) = command.execute(&mut self.handler) {
                warn!("Command response was dropped: {}", e);
            }
        }

        Ok(())
    }

    pub fn spawn(mut self) -> std::thread::JoinHandle<io::Result<()>> {
        std::thread::spawn(move || self.run())
    }
}

pub struct CommandSender<T: Command> {
    commands_ch: Sender<GenericCommand<T>>,
}

impl<C: Command> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            commands_ch: self.commands_ch.clone(),
        }
    }
}

impl<C: Command> CommandSender<C> {
    pub fn new(commands_ch: Sender<GenericCommand<C>>) -> Self {
        Self { commands_ch }
    }

    fn enqueue(&self, command: C) -> io::Result<oneshot::Receiver<io::Result<C::Response>>> {
        let (response_ch, response_rx) = oneshot::channel();
        let command = GenericCommand::new(command, response_ch);

        self.commands_ch
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to send command"))?;

        Ok(response_rx)
    }

    pub async fn send_command(&self, command: C) -> io::Result<C::Response> {
        let response_rx = self.enqueue(command)?;

        response_rx
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to receive response"))?
    }

    /// Round trip for callers on plain threads. Panics if called from inside
    /// an async context, like every tokio `blocking_*` call.
    pub fn send_command_blocking(&self, command: C) -> io::Result<C::Response> {
        let response_rx = self.enqueue(command)?;

        response_rx
            .blocking_recv()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "Failed to receive response"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    enum CounterCommand {
        Add(u32),
        Fail,
    }

    impl DeviceHandler for Counter {
        type Command = CounterCommand;
    }

    impl Command for CounterCommand {
        type Response = u32;
        type Handler = Counter;

        fn execute(self, handler: &mut Self::Handler) -> io::Result<Self::Response> {
            match self {
                CounterCommand::Add(n) => {
                    handler.value += n;
                    Ok(handler.value)
                }
                CounterCommand::Fail => Err(io::Error::new(io::ErrorKind::Other, "device fault")),
            }
        }
    }

    #[test]
    fn blocking_round_trip_runs_commands_in_order() {
        let mut executor = CommandExecutor::new(Counter { value: 0 });
        let sender = executor.sender();
        std::thread::spawn(move || executor.run());

        assert_eq!(sender.send_command_blocking(CounterCommand::Add(2)).unwrap(), 2);
        assert_eq!(sender.send_command_blocking(CounterCommand::Add(3)).unwrap(), 5);
    }

    #[test]
    fn device_errors_reach_the_caller() {
        let mut executor = CommandExecutor::new(Counter { value: 0 });
        let sender = executor.sender();
        std::thread::spawn(move || executor.run());

        let err = sender.send_command_blocking(CounterCommand::Fail).unwrap_err();
        assert_eq!(err.to_string(), "device fault");
        assert_eq!(sender.send_command_blocking(CounterCommand::Add(1)).unwrap(), 1);
    }

    #[tokio::test]
    async fn async_round_trip() {
        let executor = CommandExecutor::new(Counter { value: 10 });
        let sender = executor.sender();
        let _handle = executor.spawn();

        assert_eq!(sender.send_command(CounterCommand::Add(1)).await.unwrap(), 11);
    }
}
