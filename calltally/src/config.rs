//! Environment-driven configuration and credentials.
//!
//! Values come from a `.env` file when one exists, falling back to the
//! process environment. Every credential is required: a run that cannot
//! reach all of its collaborators must stop before touching the UI.

use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::dates::Month;
use crate::errors::ConfigError;
use crate::session::{HostCredentials, UiProfile};

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: HostCredentials,
    pub spreadsheet_id: String,
    pub sa_key_path: PathBuf,
    pub bot_token: String,
    pub bot_chat_id: String,
    pub base_dir: PathBuf,
}

/// Load `.env` if present. Absence is fine; the process environment rules.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(".env loaded from {}", path.display()),
        Err(_) => debug!(".env not found; using process environment only"),
    }
}

/// The deployed host version's addressing defaults, with the two values that
/// differ between sites overridable from the environment.
pub fn ui_profile_from_env() -> UiProfile {
    let mut profile = UiProfile::default();
    if let Ok(exe) = env::var("HOST_APP_EXE") {
        if !exe.is_empty() {
            profile.exec_path = exe;
        }
    }
    if let Ok(pattern) = env::var("HOST_APP_TITLE_PATTERN") {
        if !pattern.is_empty() {
            profile.window_title_pattern = pattern;
        }
    }
    profile
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(key)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = HostCredentials {
            user: require("HOST_APP_USER")?,
            password: require("HOST_APP_PASS")?,
        };
        let spreadsheet_id = require("SPREADSHEET_ID")?;

        let sa_key_path = PathBuf::from(require("GOOGLE_SA_JSON_PATH")?);
        if !sa_key_path.exists() {
            return Err(ConfigError::MissingKeyFile(sa_key_path));
        }

        let bot_token = require("BOT_TOKEN")?;
        let bot_chat_id = require("BOT_CHAT_ID")?;

        let base_dir = env::var("CALLTALLY_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("calltally")
            });

        Ok(Self {
            credentials,
            spreadsheet_id,
            sa_key_path,
            bot_token,
            bot_chat_id,
            base_dir,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.base_dir.join("csv")
    }

    pub fn screens_dir(&self, month: Month) -> PathBuf {
        self.log_dir()
            .join("screens")
            .join(month.to_string().replace('-', ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test mutates the shared process environment sequentially to stay
    // race-free under the parallel test runner.
    #[test]
    fn from_env_requires_every_collaborator() {
        let key_file = tempfile::NamedTempFile::new().unwrap();

        let vars = [
            ("HOST_APP_USER", "operator".to_string()),
            ("HOST_APP_PASS", "secret".to_string()),
            ("SPREADSHEET_ID", "sheet-id".to_string()),
            (
                "GOOGLE_SA_JSON_PATH",
                key_file.path().to_string_lossy().into_owned(),
            ),
            ("BOT_TOKEN", "123:abc".to_string()),
            ("BOT_CHAT_ID", "-100".to_string()),
            ("CALLTALLY_BASE_DIR", "/tmp/calltally-test".to_string()),
        ];
        for (k, v) in &vars {
            env::set_var(k, v);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.credentials.user, "operator");
        assert_eq!(config.spreadsheet_id, "sheet-id");
        assert_eq!(config.base_dir, PathBuf::from("/tmp/calltally-test"));
        assert_eq!(
            config.log_dir(),
            PathBuf::from("/tmp/calltally-test/logs")
        );
        assert!(config
            .screens_dir("2026-02".parse().unwrap())
            .ends_with("screens/202602"));

        env::remove_var("BOT_TOKEN");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("BOT_TOKEN")));
        env::set_var("BOT_TOKEN", "123:abc");

        env::set_var("GOOGLE_SA_JSON_PATH", "/nonexistent/sa.json");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKeyFile(_)));

        for (k, _) in &vars {
            env::remove_var(k);
        }
    }

    #[test]
    fn ui_profile_overrides_come_from_the_environment() {
        let defaults = ui_profile_from_env();
        assert_eq!(defaults.exec_path, UiProfile::default().exec_path);

        env::set_var("HOST_APP_EXE", r"D:\Host\start.exe");
        env::set_var("HOST_APP_TITLE_PATTERN", ".*Dispatch.*");
        let profile = ui_profile_from_env();
        assert_eq!(profile.exec_path, r"D:\Host\start.exe");
        assert_eq!(profile.window_title_pattern, ".*Dispatch.*");

        env::remove_var("HOST_APP_EXE");
        env::remove_var("HOST_APP_TITLE_PATTERN");
    }
}
