use std::{path::PathBuf, sync::Arc};

use ::gpio::{Gpio, SimulatedGpio, SysfsGpio};
use tracing::{debug, error, info};
use xy_controller::{
    command_executor::gpio::create_gpio,
    communication::{self, ApiContext, run_communication_layer},
    config::{GpioBackend, SettingsStore, create_default_config, init_config},
    controller::create_stage,
    dispatcher::CommandDispatcher,
    logging,
    system::SystemPower,
};

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (config_manager, settings) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let _log_guard = logging::init(&settings.logging)?;
    info!("Starting {} {}", settings.app_name, env!("CARGO_PKG_VERSION"));
    debug!("Api-Key = {}", settings.api_key);

    let backend: Box<dyn Gpio> = match settings.gpio.backend {
        GpioBackend::Sysfs => Box::new(SysfsGpio::new()),
        GpioBackend::Simulation => {
            info!("Using simulated GPIO");
            Box::new(SimulatedGpio::new())
        }
    };

    let (gpio_executor, gpio) = create_gpio(backend);
    let _gpio_handle = gpio_executor.spawn();

    let store = Arc::new(SettingsStore::new(config_manager, settings.clone()));
    let (stage, _monitors) = create_stage(&settings, gpio, store).await?;
    let stage = Arc::new(stage);

    let (dispatcher, _dispatcher_handle) = CommandDispatcher::spawn(
        stage.clone(),
        Arc::new(SystemPower),
        settings.dispatch_delays(),
    );

    let ctx = Arc::new(ApiContext::new(stage.clone(), dispatcher, &settings));
    let listener = communication::bind(&settings.socket_path)?;
    let server = tokio::spawn(run_communication_layer(listener, ctx));

    info!("XY stage controller ready");

    tokio::select! {
        result = server => match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Communication layer failed: {:#}", e),
            Err(e) => error!("Communication task failed: {}", e),
        },
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    tokio::task::spawn_blocking(move || stage.shutdown()).await?;
    info!("XY stage controller stopped");

    Ok(())
}
