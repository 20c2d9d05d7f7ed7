use anyhow::{Context as _, anyhow};
use rand::Rng as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing::info;

use crate::{
    controller::{
        PositionStore, axis::MotionTiming, limit_switches::PollTiming, self_test::SelfTestTiming,
    },
    dispatcher::DispatchDelays,
    models::AxisId,
};

pub const PLACEHOLDER_API_KEY: &str = "change-me";
const API_KEY_LENGTH: usize = 128;
const API_KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ-+~abcdefghijkmnopqrstuvwxyz123456789";
const LAST_SAVE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    Sysfs,
    Simulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("./logs"),
            file_name: "xycontrol.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioSettings {
    pub backend: GpioBackend,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            backend: GpioBackend::Sysfs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub pulse_width_secs: f64,
    pub crawl_delay_secs: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            pulse_width_secs: 0.02,
            crawl_delay_secs: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub move_delay_secs: f64,
    pub restart_delay_secs: f64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            move_delay_secs: 1.0,
            restart_delay_secs: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSwitchSettings {
    pub initial_delay_secs: f64,
    pub poll_interval_secs: f64,
}

impl Default for LimitSwitchSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1.0,
            poll_interval_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfTestSettings {
    pub settle_secs: f64,
    pub hold_secs: f64,
    pub slow_step_secs: f64,
}

impl Default for SelfTestSettings {
    fn default() -> Self {
        Self {
            settle_secs: 10.0,
            hold_secs: 5.0,
            slow_step_secs: 1.0,
        }
    }
}

/// Pin assignment, soft limits and last persisted position of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    pub a_pin: u8,
    pub aa_pin: u8,
    pub b_pin: u8,
    pub bb_pin: u8,
    pub max_pin: u8,
    pub min_pin: u8,
    pub min: i32,
    pub max: i32,
    pub position: i32,
}

impl AxisSettings {
    pub fn default_x() -> Self {
        Self {
            a_pin: 6,
            aa_pin: 12,
            b_pin: 13,
            bb_pin: 16,
            max_pin: 17,
            min_pin: 27,
            min: 10,
            max: 1000,
            position: 500,
        }
    }

    pub fn default_y() -> Self {
        Self {
            a_pin: 19,
            aa_pin: 20,
            b_pin: 26,
            bb_pin: 21,
            max_pin: 23,
            min_pin: 18,
            min: 10,
            max: 1000,
            position: 500,
        }
    }

    pub fn coil_pins(&self) -> [u8; 4] {
        [self.a_pin, self.aa_pin, self.b_pin, self.bb_pin]
    }

    fn pins(&self) -> [u8; 6] {
        [
            self.a_pin,
            self.aa_pin,
            self.b_pin,
            self.bb_pin,
            self.max_pin,
            self.min_pin,
        ]
    }

    fn validate(&self, axis: AxisId) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::ValidationError {
                message: format!("{}: min {} is above max {}", axis, self.min, self.max),
            });
        }

        if !(self.min..=self.max).contains(&self.position) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "{}: position {} is outside {}..={}",
                    axis, self.position, self.min, self.max
                ),
            });
        }

        Ok(())
    }
}

/// Keys present in an axis table. Absent keys keep the axis defaults.
#[derive(Debug, Default, Deserialize)]
struct AxisOverrides {
    a_pin: Option<u8>,
    aa_pin: Option<u8>,
    b_pin: Option<u8>,
    bb_pin: Option<u8>,
    max_pin: Option<u8>,
    min_pin: Option<u8>,
    min: Option<i32>,
    max: Option<i32>,
    position: Option<i32>,
}

impl AxisOverrides {
    fn apply(self, base: AxisSettings) -> AxisSettings {
        AxisSettings {
            a_pin: self.a_pin.unwrap_or(base.a_pin),
            aa_pin: self.aa_pin.unwrap_or(base.aa_pin),
            b_pin: self.b_pin.unwrap_or(base.b_pin),
            bb_pin: self.bb_pin.unwrap_or(base.bb_pin),
            max_pin: self.max_pin.unwrap_or(base.max_pin),
            min_pin: self.min_pin.unwrap_or(base.min_pin),
            min: self.min.unwrap_or(base.min),
            max: self.max.unwrap_or(base.max),
            position: self.position.unwrap_or(base.position),
        }
    }
}

fn x_axis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AxisSettings, D::Error> {
    AxisOverrides::deserialize(deserializer).map(|o| o.apply(AxisSettings::default_x()))
}

fn y_axis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AxisSettings, D::Error> {
    AxisOverrides::deserialize(deserializer).map(|o| o.apply(AxisSettings::default_y()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub last_save: String,
    pub app_name: String,
    pub api_key: String,
    pub cpu_temp_path: PathBuf,
    pub socket_path: PathBuf,

    pub logging: LoggingSettings,
    pub gpio: GpioSettings,
    pub motion: MotionSettings,
    pub dispatch: DispatchSettings,
    pub limit_switches: LimitSwitchSettings,
    pub self_test: SelfTestSettings,

    #[serde(deserialize_with = "x_axis")]
    pub x: AxisSettings,
    #[serde(deserialize_with = "y_axis")]
    pub y: AxisSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_save: "01/01/2000 00:00:01".to_string(),
            app_name: "Oxide X-Y Stage Controller".to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            cpu_temp_path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            socket_path: PathBuf::from("/tmp/xy_controller.sock"),

            logging: LoggingSettings::default(),
            gpio: GpioSettings::default(),
            motion: MotionSettings::default(),
            dispatch: DispatchSettings::default(),
            limit_switches: LimitSwitchSettings::default(),
            self_test: SelfTestSettings::default(),

            x: AxisSettings::default_x(),
            y: AxisSettings::default_y(),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl Settings {
    pub fn axis(&self, axis: AxisId) -> &AxisSettings {
        match axis {
            AxisId::X => &self.x,
            AxisId::Y => &self.y,
        }
    }

    pub fn axis_mut(&mut self, axis: AxisId) -> &mut AxisSettings {
        match axis {
            AxisId::X => &mut self.x,
            AxisId::Y => &mut self.y,
        }
    }

    pub fn motion_timing(&self) -> MotionTiming {
        MotionTiming {
            pulse_width: secs(self.motion.pulse_width_secs),
            crawl_delay: secs(self.motion.crawl_delay_secs),
            slow_step_delay: secs(self.self_test.slow_step_secs),
        }
    }

    pub fn poll_timing(&self) -> PollTiming {
        PollTiming {
            initial_delay: secs(self.limit_switches.initial_delay_secs),
            interval: secs(self.limit_switches.poll_interval_secs),
        }
    }

    pub fn dispatch_delays(&self) -> DispatchDelays {
        DispatchDelays {
            move_delay: secs(self.dispatch.move_delay_secs),
            restart_delay: secs(self.dispatch.restart_delay_secs),
        }
    }

    pub fn self_test_timing(&self) -> SelfTestTiming {
        SelfTestTiming {
            settle: secs(self.self_test.settle_secs),
            hold: secs(self.self_test.hold_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("motion.crawl_delay_secs", self.motion.crawl_delay_secs),
            ("dispatch.move_delay_secs", self.dispatch.move_delay_secs),
            ("dispatch.restart_delay_secs", self.dispatch.restart_delay_secs),
            (
                "limit_switches.initial_delay_secs",
                self.limit_switches.initial_delay_secs,
            ),
            ("self_test.settle_secs", self.self_test.settle_secs),
            ("self_test.hold_secs", self.self_test.hold_secs),
            ("self_test.slow_step_secs", self.self_test.slow_step_secs),
        ];

        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{} must be a non-negative number of seconds", name),
                });
            }
        }

        // tokio intervals panic on a zero period
        for (name, value) in [
            ("motion.pulse_width_secs", self.motion.pulse_width_secs),
            (
                "limit_switches.poll_interval_secs",
                self.limit_switches.poll_interval_secs,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{} must be positive", name),
                });
            }
        }

        self.x.validate(AxisId::X)?;
        self.y.validate(AxisId::Y)?;

        let mut seen = HashSet::new();
        for pin in self.x.pins().into_iter().chain(self.y.pins()) {
            if !seen.insert(pin) {
                return Err(ConfigError::ValidationError {
                    message: format!("GPIO pin {} is assigned more than once", pin),
                });
            }
        }

        Ok(())
    }

    /// Records the local time of a save.
    pub fn touch(&mut self) {
        self.last_save = chrono::Local::now().format(LAST_SAVE_FORMAT).to_string();
    }

    /// Replaces the placeholder API key with a random one. Returns whether
    /// the key changed.
    pub fn ensure_api_key(&mut self) -> bool {
        if self.api_key != PLACEHOLDER_API_KEY {
            return false;
        }

        self.api_key = generate_api_key(API_KEY_LENGTH);
        true
    }
}

pub fn generate_api_key(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| API_KEY_ALPHABET[rng.gen_range(0..API_KEY_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("settings.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    pub fn load(&self) -> anyhow::Result<Settings> {
        let config_path = &self.options.config_path;

        let mut settings = if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError { source: e })?;

            toml::from_str::<Settings>(&content)
                .map_err(|e| ConfigError::ParseError { source: e })?
        } else if self.options.create_if_missing {
            let mut default_config = Settings::default();
            default_config.touch();
            self.save(&default_config)
                .context("Failed to save default config")?;
            default_config
        } else {
            return Err(ConfigError::FileNotFound {
                path: config_path.clone(),
            }
            .into());
        };

        settings.validate()?;

        if settings.ensure_api_key() {
            info!("Generated a new API key");
            settings.touch();
            self.save(&settings)
                .context("Failed to save generated API key")?;
        }

        Ok(settings)
    }

    pub fn save(&self, config: &Settings) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, Settings)> {
    init_config_with_options(ConfigOptions::default())
}

pub fn init_config_with_options(
    options: ConfigOptions,
) -> anyhow::Result<(ConfigManager, Settings)> {
    let manager = ConfigManager::with_options(options);
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<()> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let options = ConfigOptions {
        config_path,
        create_if_missing: true,
    };

    let manager = ConfigManager::with_options(options);
    let mut default_config = Settings::default();
    default_config.ensure_api_key();
    default_config.touch();
    manager.save(&default_config)?;

    Ok(())
}

/// Settings file acting as the persistence target for axis positions.
pub struct SettingsStore {
    manager: ConfigManager,
    settings: Mutex<Settings>,
}

impl SettingsStore {
    pub fn new(manager: ConfigManager, settings: Settings) -> Self {
        Self {
            manager,
            settings: Mutex::new(settings),
        }
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.settings
            .lock()
            .map(|settings| settings.clone())
            .map_err(|_| anyhow!("settings lock poisoned"))
    }
}

impl PositionStore for SettingsStore {
    fn persist(&self, axis: AxisId, position: i32) -> anyhow::Result<()> {
        let mut settings = self
            .settings
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))?;

        if settings.axis(axis).position == position {
            return Ok(());
        }

        settings.axis_mut(axis).position = position;
        settings.touch();
        self.manager
            .save(&settings)
            .with_context(|| format!("Failed to persist {} position", axis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_in(dir: &tempfile::TempDir) -> ConfigManager {
        ConfigManager::with_options(ConfigOptions::with_path(dir.path().join("settings.toml")))
    }

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn missing_file_is_created_with_a_generated_key() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);

        let settings = manager.load().unwrap();
        assert_ne!(settings.api_key, PLACEHOLDER_API_KEY);
        assert_eq!(settings.api_key.len(), API_KEY_LENGTH);
        assert!(settings.api_key.bytes().all(|b| API_KEY_ALPHABET.contains(&b)));

        let reloaded = manager.load().unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn missing_file_without_create_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_options(ConfigOptions {
            config_path: dir.path().join("absent.toml"),
            create_if_missing: false,
        });

        let err = manager.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);
        fs::write(
            manager.path(),
            "api_key = \"secret\"\n\n[motion]\npulse_width_secs = 0.01\n",
        )
        .unwrap();

        let settings = manager.load().unwrap();
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.motion.pulse_width_secs, 0.01);
        assert_eq!(settings.motion.crawl_delay_secs, 0.3);
        assert_eq!(settings.x, AxisSettings::default_x());
        assert_eq!(settings.motion_timing().pulse_width, Duration::from_millis(10));
    }

    #[test]
    fn partial_axis_table_keeps_the_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);
        fs::write(manager.path(), "api_key = \"k\"\n\n[x]\nposition = 600\n").unwrap();

        let settings = manager.load().unwrap();
        assert_eq!(settings.x.position, 600);
        assert_eq!(settings.x.coil_pins(), AxisSettings::default_x().coil_pins());
        assert_eq!(settings.x.min_pin, AxisSettings::default_x().min_pin);
        assert_eq!(settings.x.max, 1000);
        assert_eq!(settings.y, AxisSettings::default_y());
    }

    #[test]
    fn partial_y_table_uses_the_y_pins() {
        let toml = "[y]\nmin = 0\nmax = 20\nposition = 5\n";

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.y.coil_pins(), [19, 20, 26, 21]);
        assert_eq!((settings.y.min, settings.y.max, settings.y.position), (0, 20, 5));
        settings.validate().unwrap();
    }

    #[test]
    fn position_outside_limits_is_rejected() {
        let mut settings = Settings::default();
        settings.y.position = 1001;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("y: position 1001"));
    }

    #[test]
    fn shared_pins_are_rejected() {
        let mut settings = Settings::default();
        settings.y.min_pin = settings.x.a_pin;

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn zero_pulse_width_is_rejected() {
        let mut settings = Settings::default();
        settings.motion.pulse_width_secs = 0.0;

        assert!(settings.validate().is_err());
    }

    #[test]
    fn store_persists_positions_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);
        let settings = manager.load().unwrap();
        let store = SettingsStore::new(manager_in(&dir), settings);

        store.persist(AxisId::Y, 742).unwrap();

        let reloaded = manager.load().unwrap();
        assert_eq!(reloaded.y.position, 742);
        assert_eq!(reloaded.x.position, 500);
        assert_eq!(store.settings().unwrap().y.position, 742);
    }

    #[test]
    fn persisting_a_position_stamps_the_save_time() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(&dir);
        fs::write(manager.path(), "api_key = \"k\"\n").unwrap();
        let settings = manager.load().unwrap();
        assert_eq!(settings.last_save, Settings::default().last_save);

        let store = SettingsStore::new(manager_in(&dir), settings);
        store.persist(AxisId::X, 321).unwrap();

        let reloaded = manager.load().unwrap();
        assert_ne!(reloaded.last_save, Settings::default().last_save);
        chrono::NaiveDateTime::parse_from_str(&reloaded.last_save, LAST_SAVE_FORMAT).unwrap();
        assert_eq!(reloaded.last_save, store.settings().unwrap().last_save);
    }

    #[test]
    fn create_default_config_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.toml");

        create_default_config(Some(&path)).unwrap();

        let (_manager, settings) =
            init_config_with_options(ConfigOptions::with_path(&path)).unwrap();
        assert_eq!(settings.socket_path, PathBuf::from("/tmp/xy_controller.sock"));
        assert_ne!(settings.api_key, PLACEHOLDER_API_KEY);
    }
}
