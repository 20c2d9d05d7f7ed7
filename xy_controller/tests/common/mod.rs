#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use gpio::{Gpio, SimulatedGpio};
use tokio::task::JoinHandle;
use xy_controller::{
    command_executor::gpio::create_gpio,
    config::{AxisSettings, GpioBackend, Settings},
    controller::{
        PositionStore,
        axis::{AxisController, MotionTiming},
        create_stage,
        sequence::CoilPattern,
        stage::XyStage,
    },
    models::AxisId,
    system::PowerControl,
};

#[derive(Default)]
pub struct RecordingStore {
    saved: Mutex<Vec<(AxisId, i32)>>,
}

impl RecordingStore {
    pub fn saved(&self) -> Vec<(AxisId, i32)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn last(&self, axis: AxisId) -> Option<i32> {
        self.saved()
            .into_iter()
            .rev()
            .find(|(saved_axis, _)| *saved_axis == axis)
            .map(|(_, position)| position)
    }
}

impl PositionStore for RecordingStore {
    fn persist(&self, axis: AxisId, position: i32) -> anyhow::Result<()> {
        self.saved.lock().unwrap().push((axis, position));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPower {
    reboots: AtomicUsize,
}

impl RecordingPower {
    pub fn reboots(&self) -> usize {
        self.reboots.load(Ordering::SeqCst)
    }
}

impl PowerControl for RecordingPower {
    fn reboot(&self) -> io::Result<()> {
        self.reboots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn fast_timing() -> MotionTiming {
    MotionTiming {
        pulse_width: Duration::from_micros(200),
        crawl_delay: Duration::from_millis(1),
        slow_step_delay: Duration::from_millis(1),
    }
}

pub fn slow_timing() -> MotionTiming {
    MotionTiming {
        pulse_width: Duration::from_millis(1),
        crawl_delay: Duration::from_millis(2),
        slow_step_delay: Duration::from_millis(2),
    }
}

pub fn axis_settings(position: i32, min: i32, max: i32) -> AxisSettings {
    AxisSettings {
        min,
        max,
        position,
        ..AxisSettings::default_x()
    }
}

/// One X axis on simulated GPIO, with the executor on its own thread.
pub struct AxisRig {
    pub axis: Arc<AxisController>,
    pub gpio: SimulatedGpio,
    pub store: Arc<RecordingStore>,
    pub pins: [u8; 4],
}

impl AxisRig {
    pub fn new(settings: AxisSettings, timing: MotionTiming) -> Self {
        let mut sim = SimulatedGpio::new();
        for pin in settings.coil_pins() {
            sim.setup_output(pin).unwrap();
        }
        Self::with_gpio(sim, settings, timing)
    }

    pub fn with_gpio(sim: SimulatedGpio, settings: AxisSettings, timing: MotionTiming) -> Self {
        let (executor, sender) = create_gpio(Box::new(sim.clone()));
        let _handle = executor.spawn();

        let store = Arc::new(RecordingStore::default());
        let axis = Arc::new(AxisController::new(
            AxisId::X,
            &settings,
            timing,
            sender,
            store.clone(),
        ));

        Self {
            axis,
            gpio: sim,
            store,
            pins: settings.coil_pins(),
        }
    }

    pub fn coils(&self) -> CoilPattern {
        coils_on(&self.gpio, self.pins)
    }

    pub fn patterns(&self) -> Vec<CoilPattern> {
        patterns_on(&self.gpio, self.pins)
    }
}

pub fn coils_on(gpio: &SimulatedGpio, pins: [u8; 4]) -> CoilPattern {
    CoilPattern(pins.map(|pin| gpio.level(pin).unwrap_or(false)))
}

/// Every pattern written to `pins`, in order.
pub fn patterns_on(gpio: &SimulatedGpio, pins: [u8; 4]) -> Vec<CoilPattern> {
    let writes: Vec<_> = gpio
        .writes()
        .into_iter()
        .filter(|write| pins.contains(&write.pin))
        .collect();

    writes
        .chunks(4)
        .map(|chunk| {
            let mut levels = [false; 4];
            for write in chunk {
                if let Some(slot) = pins.iter().position(|pin| *pin == write.pin) {
                    levels[slot] = write.level;
                }
            }
            CoilPattern(levels)
        })
        .collect()
}

pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}

pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.api_key = "test-key".to_string();
    settings.gpio.backend = GpioBackend::Simulation;
    settings.motion.pulse_width_secs = 0.0002;
    settings.motion.crawl_delay_secs = 0.001;
    settings.dispatch.move_delay_secs = 0.01;
    settings.dispatch.restart_delay_secs = 0.01;
    settings.limit_switches.initial_delay_secs = 0.001;
    settings.limit_switches.poll_interval_secs = 0.005;
    settings.self_test.settle_secs = 0.001;
    settings.self_test.hold_secs = 0.001;
    settings.self_test.slow_step_secs = 0.001;
    settings
}

/// Full stage on simulated GPIO. Must be built inside a multi-threaded
/// runtime.
pub struct StageRig {
    pub stage: Arc<XyStage>,
    pub gpio: SimulatedGpio,
    pub store: Arc<RecordingStore>,
    pub settings: Settings,
    pub monitors: Vec<JoinHandle<()>>,
}

impl StageRig {
    pub async fn new(settings: Settings) -> Self {
        let sim = SimulatedGpio::new();
        let (executor, sender) = create_gpio(Box::new(sim.clone()));
        let _handle = executor.spawn();

        let store = Arc::new(RecordingStore::default());
        let (stage, monitors) = create_stage(&settings, sender, store.clone())
            .await
            .unwrap();

        Self {
            stage: Arc::new(stage),
            gpio: sim,
            store,
            settings,
            monitors,
        }
    }

    pub fn coils(&self, axis: AxisId) -> CoilPattern {
        coils_on(&self.gpio, self.settings.axis(axis).coil_pins())
    }

    pub fn patterns(&self, axis: AxisId) -> Vec<CoilPattern> {
        patterns_on(&self.gpio, self.settings.axis(axis).coil_pins())
    }
}
