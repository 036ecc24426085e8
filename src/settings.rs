use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    Error, Paths, SETTINGS_ERR_INVALID_JSON, SETTINGS_ERR_READ, SETTINGS_ERR_SERIALIZE,
    SETTINGS_WARN_TIMEOUT, Session, lock_store, write_atomic,
};

const SETTINGS_VERSION: u32 = 1;
const LOGIN_TIMEOUT_ENV_VAR: &str = "SSO_BROKER_LOGIN_TIMEOUT";
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Application state kept next to, not inside, the AWS config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "settings_version")]
    pub version: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_timeout_secs: Option<u64>,
}

fn settings_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            version: SETTINGS_VERSION,
            sessions: Vec::new(),
            default_profile: None,
            login_timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn login_timeout(&self) -> Duration {
        login_timeout_with(
            env::var(LOGIN_TIMEOUT_ENV_VAR).ok(),
            self.login_timeout_secs,
        )
    }

    #[cfg(test)]
    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.iter().find(|session| session.name == name)
    }

    /// Replaces the session with the same name, or appends it.
    pub fn upsert_session(&mut self, session: Session) {
        match self
            .sessions
            .iter_mut()
            .find(|existing| existing.name == session.name)
        {
            Some(existing) => *existing = session,
            None => self.sessions.push(session),
        }
    }
}

fn login_timeout_with(env_value: Option<String>, configured: Option<u64>) -> Duration {
    if let Some(raw) = env_value {
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => return Duration::from_secs(secs),
            _ => warn!("{}", crate::msg1(SETTINGS_WARN_TIMEOUT, raw)),
        }
    }
    configured
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LOGIN_TIMEOUT)
}

pub struct SettingsStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf, lock_path: PathBuf) -> SettingsStore {
        SettingsStore { path, lock_path }
    }

    pub fn from_paths(paths: &Paths) -> SettingsStore {
        SettingsStore::new(paths.settings.clone(), paths.lock.clone())
    }

    pub fn load(&self) -> Result<Settings, Error> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file yet");
                return Ok(Settings::default());
            }
            Err(err) => {
                return Err(Error::Config(crate::msg2(
                    SETTINGS_ERR_READ,
                    self.path.display(),
                    err,
                )));
            }
        };
        if contents.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_json::from_str(&contents).map_err(|err| {
            Error::Config(crate::msg2(
                SETTINGS_ERR_INVALID_JSON,
                self.path.display(),
                err,
            ))
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), Error> {
        let mut json = serde_json::to_string_pretty(settings)
            .map_err(|err| Error::Persist(crate::msg1(SETTINGS_ERR_SERIALIZE, err)))?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())
    }

    /// Load, modify and save under the settings lock.
    pub fn update<F>(&self, apply: F) -> Result<Settings, Error>
    where
        F: FnOnce(&mut Settings),
    {
        let _lock = lock_store(&self.lock_path)?;
        let mut settings = self.load()?;
        apply(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}
