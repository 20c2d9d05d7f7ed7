use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    commands::{STATUS_ITEM, parse_command},
    controller::stage::XyStage,
    models::{AxisId, Command, DispatchOutcome},
    system::PowerControl,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchDelays {
    pub move_delay: Duration,
    pub restart_delay: Duration,
}

impl Default for DispatchDelays {
    fn default() -> Self {
        Self {
            move_delay: Duration::from_secs(1),
            restart_delay: Duration::from_secs(15),
        }
    }
}

/// Front door for API commands. Parses requests and queues the resulting
/// commands for [`run_dispatcher`], which starts each one in the background.
#[derive(Clone)]
pub struct CommandDispatcher {
    stage: Arc<XyStage>,
    delays: DispatchDelays,
    commands_tx: mpsc::UnboundedSender<Command>,
}

impl CommandDispatcher {
    pub fn spawn(
        stage: Arc<XyStage>,
        power: Arc<dyn PowerControl>,
        delays: DispatchDelays,
    ) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_dispatcher(commands_rx, stage.clone(), power, delays));

        let dispatcher = Self {
            stage,
            delays,
            commands_tx,
        };

        (dispatcher, handle)
    }

    pub fn dispatch(&self, item: &str, payload: &Value) -> DispatchOutcome {
        if item == STATUS_ITEM {
            return DispatchOutcome::Status(self.stage.api_status());
        }

        info!("{} : {}", item, payload);

        let command = match parse_command(item, payload, self.delays.restart_delay) {
            Ok(Some(command)) => command,
            Ok(None) => return DispatchOutcome::Ignored,
            Err(e) => {
                error!("Rejected {}: {}", item, e);
                return DispatchOutcome::Ignored;
            }
        };

        if self.commands_tx.send(command).is_err() {
            error!("Dispatcher is not running, dropping {}", item);
            return DispatchOutcome::Ignored;
        }

        DispatchOutcome::Accepted
    }
}

pub async fn run_dispatcher(
    mut commands_rx: mpsc::UnboundedReceiver<Command>,
    stage: Arc<XyStage>,
    power: Arc<dyn PowerControl>,
    delays: DispatchDelays,
) {
    while let Some(command) = commands_rx.recv().await {
        execute(command, &stage, &power, delays);
    }

    info!("Command queue closed");
}

fn execute(
    command: Command,
    stage: &Arc<XyStage>,
    power: &Arc<dyn PowerControl>,
    delays: DispatchDelays,
) {
    match command {
        Command::MoveRelative { axis, steps } => {
            let controller = stage.axis(axis).clone();
            schedule(delays.move_delay, axis, move || controller.move_relative(steps));
        }
        Command::MoveToAbsolute { axis, target } => {
            let controller = stage.axis(axis).clone();
            schedule(delays.move_delay, axis, move || {
                controller.move_to_absolute(target)
            });
        }
        Command::Stop { axis } => {
            let controller = stage.axis(axis).clone();
            schedule(Duration::ZERO, axis, move || controller.stop());
        }
        Command::RawOutput(pattern) => {
            let stage = stage.clone();
            tokio::task::spawn_blocking(move || {
                for axis in AxisId::ALL {
                    stage.axis(axis).raw_output(pattern);
                }
            });
        }
        Command::Restart { delay } => {
            warn!("Restart requested, system will restart in {:?}", delay);
            let power = power.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                warn!("System is restarting now");

                match tokio::task::spawn_blocking(move || power.reboot()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Reboot failed: {}", e),
                    Err(e) => error!("Reboot task failed: {}", e),
                }
            });
        }
    }
}

/// Runs a blocking axis operation after `delay`.
fn schedule<F>(delay: Duration, axis: AxisId, action: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Err(e) = tokio::task::spawn_blocking(action).await {
            error!(axis = %axis, "Axis task failed: {}", e);
        }
    });
}
