//! Configuration de l'application, lue depuis l'environnement
//! (éventuellement complété par un fichier `.env`).

use std::path::PathBuf;

use log::LevelFilter;
use thiserror::Error;

use crate::authorization;
use crate::metrics::MAX_REPORT_MONTHS;

pub const DB_FILE: &str = "database.json"; // Base de données par défaut.
pub const LOG_FILE: &str = "./psilua.log"; // Journal par défaut.
pub const REPORT_MONTHS: u32 = 6; // Profondeur par défaut des rapports.

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Valeur invalide pour {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_file: PathBuf,
    pub log_file: PathBuf,
    pub log_level: LevelFilter,
    pub access_model: PathBuf,
    pub access_policy: PathBuf,
    pub report_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_file: DB_FILE.into(),
            log_file: LOG_FILE.into(),
            log_level: LevelFilter::Info,
            access_model: authorization::CONFIG.into(),
            access_policy: authorization::POLICY.into(),
            report_months: REPORT_MONTHS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construit la configuration à partir d'une source de variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("PSILUA_DB_FILE") {
            config.db_file = path.into();
        }
        if let Some(path) = lookup("PSILUA_LOG_FILE") {
            config.log_file = path.into();
        }
        if let Some(path) = lookup("PSILUA_ACCESS_MODEL") {
            config.access_model = path.into();
        }
        if let Some(path) = lookup("PSILUA_ACCESS_POLICY") {
            config.access_policy = path.into();
        }
        if let Some(level) = lookup("PSILUA_LOG_LEVEL") {
            config.log_level = level.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PSILUA_LOG_LEVEL",
                value: level.clone(),
            })?;
        }
        if let Some(months) = lookup("PSILUA_REPORT_MONTHS") {
            config.report_months = months
                .parse::<u32>()
                .ok()
                .filter(|months| (1..=MAX_REPORT_MONTHS).contains(months))
                .ok_or(ConfigError::InvalidValue {
                    key: "PSILUA_REPORT_MONTHS",
                    value: months.clone(),
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.report_months, 6);
        assert_eq!(config.db_file, PathBuf::from("database.json"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PSILUA_DB_FILE", "/tmp/psilua.json"),
            ("PSILUA_LOG_LEVEL", "debug"),
            ("PSILUA_REPORT_MONTHS", "12"),
        ]))
        .unwrap();

        assert_eq!(config.db_file, PathBuf::from("/tmp/psilua.json"));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.report_months, 12);

        let deepest = Config::from_lookup(lookup_from(&[("PSILUA_REPORT_MONTHS", "1200")])).unwrap();
        assert_eq!(deepest.report_months, MAX_REPORT_MONTHS);
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("PSILUA_LOG_LEVEL", "loud"),
            ("PSILUA_REPORT_MONTHS", "zero"),
            ("PSILUA_REPORT_MONTHS", "0"),
            ("PSILUA_REPORT_MONTHS", "1201"),
            ("PSILUA_REPORT_MONTHS", "3000000000"),
        ] {
            let error = Config::from_lookup(lookup_from(&[(key, value)])).unwrap_err();
            assert_eq!(error, ConfigError::InvalidValue { key, value: value.to_string() });
        }
    }
}
