//! Exporting and restoring alarms and settings as a single TOML document.

use std::{fs, path::Path};

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    alarm::Alarm,
    config::{Config, ConfigError},
    store::AlarmStore,
};

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub version: String,
    /// RFC 3339, only shown to the user before restoring
    #[serde(default)]
    pub export_date: Option<String>,
    #[serde(default)]
    pub all_enabled: Option<bool>,
    #[serde(default)]
    pub color_scheme: Option<String>,
    pub alarms: Vec<Alarm>,
}

impl Backup {
    #[must_use]
    pub fn of(config: &Config, export_date: String) -> Self {
        Self {
            version: BACKUP_VERSION.to_string(),
            export_date: Some(export_date),
            all_enabled: Some(config.all_enabled),
            color_scheme: Some(config.color_scheme.clone()),
            alarms: config.alarms.iter().cloned().collect(),
        }
    }

    /// e.g. `roosty-scheduler-backup-2024-01-01.toml`
    #[must_use]
    pub fn file_name(date: NaiveDate) -> String {
        format!("roosty-scheduler-backup-{}.toml", date.format("%Y-%m-%d"))
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let backup = toml::to_string(self)?;
        fs::write(path, backup).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("exported {} alarms to {}", self.alarms.len(), path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let backup = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let backup: Self = toml::from_str(&backup)?;
        if backup.version != BACKUP_VERSION {
            return Err(ConfigError::Version(backup.version));
        }
        Ok(backup)
    }

    /// Replaces the alarms in `config`. Settings missing from the backup are left alone.
    pub fn restore(self, config: &mut Config) {
        config.alarms = AlarmStore::from(self.alarms);
        if let Some(all_enabled) = self.all_enabled {
            config.all_enabled = all_enabled;
        }
        if let Some(color_scheme) = self.color_scheme {
            config.color_scheme = color_scheme;
        }
        info!("restored {} alarms", config.alarms.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_replaces_alarms_and_settings() {
        let mut source = Config::demo();
        source.all_enabled = false;
        source.color_scheme = "sunset".to_string();
        let backup = Backup::of(&source, "2024-01-01T07:00:00+00:00".to_string());

        let mut target = Config::default();
        target.alarms = Config::demo().alarms;
        target.alarms.remove(crate::alarm::AlarmId(1));
        backup.restore(&mut target);
        assert_eq!(target.alarms, source.alarms);
        assert!(!target.all_enabled);
        assert_eq!(target.color_scheme, "sunset");
    }

    #[test]
    fn missing_settings_are_kept() {
        let backup: Backup = toml::from_str(
            r#"
            version = "1.0"
            alarms = []
            "#,
        )
        .unwrap();
        let mut config = Config::demo();
        config.color_scheme = "violet".to_string();
        backup.restore(&mut config);
        assert!(config.alarms.is_empty());
        assert_eq!(config.color_scheme, "violet");
    }

    #[test]
    fn rejects_other_versions_and_missing_alarms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.toml");
        fs::write(&path, "version = \"2.0\"\nalarms = []\n").unwrap();
        assert!(matches!(Backup::read(&path), Err(ConfigError::Version(v)) if v == "2.0"));
        fs::write(&path, "version = \"1.0\"\n").unwrap();
        assert!(matches!(Backup::read(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn names_files_by_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            Backup::file_name(date),
            "roosty-scheduler-backup-2024-03-09.toml"
        );
    }
}
