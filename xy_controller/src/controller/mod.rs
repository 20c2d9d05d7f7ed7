use std::{io, sync::Arc};

use ::gpio::Pull;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    command_executor::gpio::command_sender::GpioCommandSender,
    config::Settings,
    controller::{axis::AxisController, limit_switches::LimitSwitchMonitor, stage::XyStage},
    models::AxisId,
};

pub mod axis;
pub mod limit_switches;
pub mod sequence;
pub mod stage;

/// Durable home for axis positions.
pub trait PositionStore: Send + Sync {
    fn persist(&self, axis: AxisId, position: i32) -> anyhow::Result<()>;
}

/// Configures every pin, starts the limit switch monitors and builds the
/// stage. Returns the monitor tasks alongside it.
pub async fn create_stage(
    settings: &Settings,
    gpio: GpioCommandSender,
    store: Arc<dyn PositionStore>,
) -> io::Result<(XyStage, Vec<JoinHandle<()>>)> {
    let (x, x_monitor) = create_axis(AxisId::X, settings, &gpio, store.clone()).await?;
    let (y, y_monitor) = create_axis(AxisId::Y, settings, &gpio, store).await?;

    let stage = XyStage::new(x, y, x_monitor.state(), y_monitor.state());
    Ok((stage, vec![x_monitor.spawn(), y_monitor.spawn()]))
}

async fn create_axis(
    axis: AxisId,
    settings: &Settings,
    gpio: &GpioCommandSender,
    store: Arc<dyn PositionStore>,
) -> io::Result<(Arc<AxisController>, LimitSwitchMonitor)> {
    let axis_settings = settings.axis(axis);

    for pin in axis_settings.coil_pins() {
        gpio.setup_output(pin).await?;
    }
    gpio.setup_input(axis_settings.min_pin, Pull::Up).await?;
    gpio.setup_input(axis_settings.max_pin, Pull::Up).await?;

    let monitor = LimitSwitchMonitor::new(
        axis,
        axis_settings.min_pin,
        axis_settings.max_pin,
        gpio.clone(),
        settings.poll_timing(),
    );

    let controller = Arc::new(AxisController::new(
        axis,
        axis_settings,
        settings.motion_timing(),
        gpio.clone(),
        store,
    ));

    info!(
        "{} axis ready at position {} ({}..={})",
        axis, axis_settings.position, axis_settings.min, axis_settings.max
    );

    Ok((controller, monitor))
}
