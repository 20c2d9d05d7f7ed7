use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    command_executor::gpio::command_sender::GpioCommandSender,
    models::{AxisId, LimitSwitches},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollTiming {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_millis(500),
        }
    }
}

/// Last sampled switch levels. Written by the monitor, read by status
/// requests.
#[derive(Debug, Default)]
pub struct LimitSwitchState {
    min_switch: AtomicBool,
    max_switch: AtomicBool,
}

impl LimitSwitchState {
    pub fn snapshot(&self) -> LimitSwitches {
        LimitSwitches {
            min_switch: self.min_switch.load(Ordering::SeqCst),
            max_switch: self.max_switch.load(Ordering::SeqCst),
        }
    }
}

pub struct LimitSwitchMonitor {
    axis: AxisId,
    min_pin: u8,
    max_pin: u8,
    gpio: GpioCommandSender,
    state: Arc<LimitSwitchState>,
    timing: PollTiming,
}

impl LimitSwitchMonitor {
    pub fn new(
        axis: AxisId,
        min_pin: u8,
        max_pin: u8,
        gpio: GpioCommandSender,
        timing: PollTiming,
    ) -> Self {
        Self {
            axis,
            min_pin,
            max_pin,
            gpio,
            state: Arc::new(LimitSwitchState::default()),
            timing,
        }
    }

    pub fn state(&self) -> Arc<LimitSwitchState> {
        self.state.clone()
    }

    /// Reads both switches once and records them.
    pub async fn poll(&self) -> io::Result<LimitSwitches> {
        let max_switch = self.gpio.read(self.max_pin).await?;
        self.record("max", &self.state.max_switch, max_switch);

        let min_switch = self.gpio.read(self.min_pin).await?;
        self.record("min", &self.state.min_switch, min_switch);

        Ok(LimitSwitches {
            min_switch,
            max_switch,
        })
    }

    fn record(&self, name: &str, switch: &AtomicBool, active: bool) {
        if switch.swap(active, Ordering::SeqCst) != active {
            info!(axis = %self.axis, "{} {} limit switch {}", self.axis, name,
                if active { "active" } else { "released" });
        }
    }

    pub async fn run(self) {
        tokio::time::sleep(self.timing.initial_delay).await;

        let mut interval = tokio::time::interval(self.timing.interval);
        loop {
            interval.tick().await;

            if let Err(e) = self.poll().await {
                warn!(axis = %self.axis, "Failed to read limit switches: {}", e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use ::gpio::{Gpio, Pull, SimulatedGpio};

    use super::*;
    use crate::command_executor::gpio::create_gpio;

    fn fast() -> PollTiming {
        PollTiming {
            initial_delay: Duration::from_millis(1),
            interval: Duration::from_millis(5),
        }
    }

    fn monitor_with(sim: &SimulatedGpio) -> LimitSwitchMonitor {
        let (executor, sender) = create_gpio(Box::new(sim.clone()));
        let _handle = executor.spawn();
        LimitSwitchMonitor::new(AxisId::X, 27, 17, sender, fast())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn poll_records_both_switches() {
        let mut sim = SimulatedGpio::new();
        sim.setup_input(27, Pull::Up).unwrap();
        sim.setup_input(17, Pull::Up).unwrap();
        sim.set_input(17, true);

        let monitor = monitor_with(&sim);
        let switches = monitor.poll().await.unwrap();

        assert_eq!(
            switches,
            LimitSwitches {
                min_switch: false,
                max_switch: true
            }
        );
        assert_eq!(monitor.state().snapshot(), switches);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn running_monitor_follows_the_inputs() {
        let mut sim = SimulatedGpio::new();
        sim.setup_input(27, Pull::Up).unwrap();
        sim.setup_input(17, Pull::Up).unwrap();

        let monitor = monitor_with(&sim);
        let state = monitor.state();
        let handle = monitor.spawn();

        sim.set_input(27, true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(state.snapshot().min_switch);

        sim.set_input(27, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.snapshot().min_switch);

        handle.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_errors_keep_the_monitor_alive() {
        let sim = SimulatedGpio::new();

        let monitor = monitor_with(&sim);
        assert!(monitor.poll().await.is_err());

        let state = monitor.state();
        let handle = monitor.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        assert_eq!(state.snapshot(), LimitSwitches::default());
        handle.abort();
    }
}
