use std::{
    fs, io,
    ops::Not,
    path::{Path, PathBuf},
    time::SystemTime,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{AlarmBuilder, Meridiem, SoundSpec, Volume, Weekdays},
    library::{SoundLibrary, DEFAULT_MAX_SOUND_BYTES},
    sound::Pattern,
    store::AlarmStore,
};

const APP_NAME: &str = "roosty_scheduler";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("couldn't find a home directory to keep the config in")]
    NoHome,
    #[error("couldn't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported backup version {0:?}")]
    Version(String),
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Not for Theme {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_snooze_minutes() -> u16 {
    5
}

const fn default_max_sound_bytes() -> u64 {
    DEFAULT_MAX_SOUND_BYTES
}

fn default_color_scheme() -> String {
    "ocean".to_string()
}

fn default_time_format() -> String {
    "%I:%M %p".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default)]
    pub theme: Theme,
    /// only stored for the user interface
    #[serde(default = "default_color_scheme")]
    pub color_scheme: String,
    #[serde(default = "crate::alarm::always_true")]
    pub all_enabled: bool,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u16,
    #[serde(default = "default_max_sound_bytes")]
    pub max_sound_bytes: u64,
    #[serde(default)]
    pub alarms: AlarmStore,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
            theme: Theme::Dark,
            color_scheme: default_color_scheme(),
            all_enabled: true,
            tick_interval_ms: default_tick_interval_ms(),
            snooze_minutes: default_snooze_minutes(),
            max_sound_bytes: default_max_sound_bytes(),
            alarms: AlarmStore::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with a few alarms to try things out with.
    #[must_use]
    pub fn demo() -> Self {
        use chrono::Weekday::{Fri, Mon, Wed};

        let demo = [
            (7, 0, Meridiem::AM, Weekdays::WORKDAYS, Pattern::MorningChime, 5),
            (8, 30, Meridiem::AM, [Mon, Wed, Fri].into_iter().collect(), Pattern::GentleWake, 7),
            (9, 0, Meridiem::PM, Weekdays::NONE, Pattern::SleepBell, 3),
        ];
        let mut config = Self::default();
        for (hour, minute, meridiem, weekdays, pattern, volume) in demo {
            let builder = AlarmBuilder {
                name: pattern.display_name().to_string(),
                hour,
                minute,
                meridiem,
                weekdays,
                sound: SoundSpec::Builtin { pattern },
                volume: Volume::saturating(volume),
                interrupts_others: false,
            };
            if let Err(e) = config.alarms.add(builder) {
                log::error!("bad demo alarm: {e}");
            }
        }
        config
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&config)?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(path, config).map_err(write_error)?;
        debug!("saved config to {}", path.display());
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs, ConfigError> {
        directories::ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoHome)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.config_dir().to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    pub fn sounds_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.data_dir().to_path_buf();
        path.push("sounds");
        Ok(path)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    /// The sound library in `root`, sized by this config.
    #[must_use]
    pub fn library(&self, root: PathBuf) -> SoundLibrary {
        SoundLibrary::new(root, self.max_sound_bytes)
    }
}

/// Where the scheduler writes its state after every change.
pub trait Persistence {
    fn save(&mut self, config: &Config) -> Result<(), ConfigError>;

    /// A config someone else saved since the last `save` or `changes`, if any.
    fn changes(&mut self) -> Result<Option<Config>, ConfigError> {
        Ok(None)
    }
}

/// Modification time and length, enough to notice another writer.
type Stamp = (SystemTime, u64);

fn stamp(path: &Path) -> Option<Stamp> {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// The TOML config file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    seen: Option<Stamp>,
}

impl ConfigFile {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path, seen: None }
    }

    /// Loads the file, or starts from the defaults when there is none yet.
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        if self.path.exists() {
            Config::load(&self.path)
        } else {
            info!("no config at {}, using defaults", self.path.display());
            Ok(Config::default())
        }
    }
}

impl Persistence for ConfigFile {
    fn save(&mut self, config: &Config) -> Result<(), ConfigError> {
        config.save(&self.path)?;
        self.seen = stamp(&self.path);
        Ok(())
    }

    fn changes(&mut self) -> Result<Option<Config>, ConfigError> {
        let current = stamp(&self.path);
        if current.is_none() || current == self.seen {
            return Ok(None);
        }
        // a half written file fails to parse and is read again next time
        let config = Config::load(&self.path)?;
        self.seen = current;
        Ok(Some(config))
    }
}

/// Keeps nothing; counts saves so callers can check when state would have been written.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ephemeral {
    pub saves: usize,
}

impl Persistence for Ephemeral {
    fn save(&mut self, _config: &Config) -> Result<(), ConfigError> {
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::TimeOfDay;

    #[test]
    fn theme_toggles() {
        assert_eq!(!Theme::Dark, Theme::Light);
        assert_eq!(!!Theme::Dark, Theme::Dark);
    }

    #[test]
    fn demo_alarms() {
        let config = Config::demo();
        let alarms: Vec<_> = config.alarms.iter().collect();
        assert_eq!(alarms.len(), 3);
        assert_eq!(alarms[0].time, TimeOfDay::new(7, 0).unwrap());
        assert_eq!(alarms[0].weekdays, Weekdays::WORKDAYS);
        assert_eq!(alarms[1].time.to_string(), "08:30 AM");
        assert_eq!(alarms[1].weekdays.to_string(), "MON, WED, FRI");
        assert_eq!(alarms[1].volume.level(), 7);
        assert_eq!(alarms[2].time.to_string(), "09:00 PM");
        assert!(!alarms[2].is_active());
        assert_eq!(alarms[2].volume.level(), 3);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::demo();
        config.all_enabled = false;
        config.color_scheme = "forest".to_string();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[alarms]]
            id = 4
            name = "Tea"
            time = "16:00"
            weekdays = ["SAT", "SUN"]
            "#,
        )
        .unwrap();
        assert!(config.all_enabled);
        assert_eq!(config.snooze_minutes, 5);
        assert_eq!(config.max_sound_bytes, DEFAULT_MAX_SOUND_BYTES);
        let tea = config.alarms.iter().next().unwrap();
        assert!(tea.enabled);
        assert_eq!(tea.volume, Volume::default());
        assert_eq!(tea.sound, SoundSpec::default());
        assert!(!tea.played_today);
    }

    #[test]
    fn bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::Read { .. })));
        fs::write(&path, "alarms = 3").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_file_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ConfigFile::new(dir.path().join("config.toml"));
        assert_eq!(file.load_or_default().unwrap(), Config::default());
        file.save(&Config::demo()).unwrap();
        assert_eq!(file.load_or_default().unwrap().alarms.len(), 3);
    }

    #[test]
    fn only_outside_writes_are_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = ConfigFile::new(path.clone());
        assert!(file.changes().unwrap().is_none(), "no file yet");

        file.save(&Config::default()).unwrap();
        assert!(file.changes().unwrap().is_none(), "our own save");

        let mut edited = Config::demo();
        edited.all_enabled = false;
        edited.save(&path).unwrap();
        assert_eq!(file.changes().unwrap(), Some(edited));
        assert!(file.changes().unwrap().is_none(), "already seen");
    }
}
