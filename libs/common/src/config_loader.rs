//! Configuration loading helper functions
//!
//! Panel credentials come from a JSON file and from the environment, with the
//! environment taking precedence:
//!
//! 1. `AMP_URL` / `AMP_USER` / `AMP_PASS` (non-empty values only)
//! 2. JSON config file (default `amp_config.json`, optional)
//! 3. Built-in defaults

use errors::SyncError;
use figment::{
    providers::{Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Default config file name, looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "amp_config.json";

/// Credential fields and the environment variables that override them
const CREDENTIAL_ENV: [(&str, &str); 3] = [
    ("url", "AMP_URL"),
    ("username", "AMP_USER"),
    ("password", "AMP_PASS"),
];

/// Accept any JSON scalar and keep its text form
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Per-game settings replication profile
///
/// Passed explicitly into the settings reconciler so that several profiles can
/// coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsProfile {
    /// Settings-spec group holding the application's menu settings
    pub group_key: String,
    /// Per-instance identity/location nodes never cloned from the master
    pub skip_nodes: BTreeSet<String>,
    /// Values forced onto every target that exposes the node
    pub forced_values: BTreeMap<String, String>,
}

impl Default for SettingsProfile {
    fn default() -> Self {
        Self {
            group_key: "arksa:stadiacontroller".to_string(),
            skip_nodes: [
                "Meta.GenericModule.SessionName",
                "Meta.GenericModule.Map",
                "Meta.GenericModule.CustomMap",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            forced_values: [("GenericModule.App.UseRandomAdminPassword", "false")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Panel connection settings plus the settings-sync profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Panel base URL (e.g. `https://amp.example.com`)
    #[serde(deserialize_with = "loose_string")]
    pub url: String,
    #[serde(deserialize_with = "loose_string")]
    pub username: String,
    #[serde(deserialize_with = "loose_string")]
    pub password: String,
    pub settings_profile: SettingsProfile,
}

impl PanelConfig {
    /// Trim credentials and require each to be present
    fn validated(mut self) -> Result<Self, SyncError> {
        self.url = self.url.trim().trim_end_matches('/').to_string();
        self.username = self.username.trim().to_string();
        self.password = self.password.trim().to_string();

        for (field, env_var) in CREDENTIAL_ENV {
            let value = match field {
                "url" => &self.url,
                "username" => &self.username,
                _ => &self.password,
            };
            if value.is_empty() {
                return Err(SyncError::missing_config(field, env_var));
            }
        }
        Ok(self)
    }
}

/// Load panel configuration using the process environment
pub fn load_panel_config(path: impl AsRef<Path>) -> Result<PanelConfig, SyncError> {
    load_panel_config_with(path, |name| std::env::var(name).ok())
}

/// Load panel configuration with an explicit environment lookup
pub fn load_panel_config_with<F>(path: impl AsRef<Path>, env: F) -> Result<PanelConfig, SyncError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    debug!("Loading panel config from {}", path.display());

    let mut figment = Figment::from(Serialized::defaults(PanelConfig::default()));
    if path.exists() {
        figment = figment.merge(Json::file(path));
    }

    for (field, env_var) in CREDENTIAL_ENV {
        if let Some(value) = env(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                debug!("Using {} from environment", env_var);
                figment = figment.merge(Serialized::default(field, value));
            }
        }
    }

    let config: PanelConfig = figment.extract().map_err(|e| {
        SyncError::invalid_config(format!(
            "{} must contain a JSON object: {}",
            path.display(),
            e
        ))
    })?;

    config.validated()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_values_are_loaded_and_trimmed() {
        let file = write_config(
            r#"{"url": " https://panel.local/ ", "username": "admin", "password": "secret"}"#,
        );
        let config = load_panel_config_with(file.path(), env_of(&[])).unwrap();
        assert_eq!(config.url, "https://panel.local");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.settings_profile, SettingsProfile::default());
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        let file = write_config(r#"{"url": "https://file", "username": "file", "password": "file"}"#);
        let config = load_panel_config_with(
            file.path(),
            env_of(&[("AMP_USER", "env-user"), ("AMP_PASS", "0123")]),
        )
        .unwrap();
        assert_eq!(config.url, "https://file");
        assert_eq!(config.username, "env-user");
        assert_eq!(config.password, "0123");
    }

    #[test]
    fn test_blank_env_falls_back_to_file() {
        let file = write_config(r#"{"url": "https://file", "username": "u", "password": "p"}"#);
        let config = load_panel_config_with(file.path(), env_of(&[("AMP_URL", "   ")])).unwrap();
        assert_eq!(config.url, "https://file");
    }

    #[test]
    fn test_missing_file_uses_env_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_panel_config_with(
            dir.path().join("absent.json"),
            env_of(&[("AMP_URL", "https://env"), ("AMP_USER", "u"), ("AMP_PASS", "p")]),
        )
        .unwrap();
        assert_eq!(config.url, "https://env");
    }

    #[test]
    fn test_missing_password_is_reported() {
        let file = write_config(r#"{"url": "https://file", "username": "u"}"#);
        let err = load_panel_config_with(file.path(), env_of(&[])).unwrap_err();
        assert!(matches!(
            err,
            SyncError::MissingConfig { ref field, ref env_var } if field == "password" && env_var == "AMP_PASS"
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_numeric_password_in_file_is_kept_as_text() {
        let file = write_config(r#"{"url": "https://file", "username": "u", "password": 1234}"#);
        let config = load_panel_config_with(file.path(), env_of(&[])).unwrap();
        assert_eq!(config.password, "1234");
    }

    #[test]
    fn test_non_object_file_is_invalid() {
        let file = write_config("[1, 2, 3]");
        let err = load_panel_config_with(file.path(), env_of(&[])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_settings_profile_override_from_file() {
        let file = write_config(
            r#"{
                "url": "https://file", "username": "u", "password": "p",
                "settings_profile": {
                    "group_key": "palworld:settings",
                    "skip_nodes": ["A.B"],
                    "forced_values": {"X.Y": "1"}
                }
            }"#,
        );
        let config = load_panel_config_with(file.path(), env_of(&[])).unwrap();
        assert_eq!(config.settings_profile.group_key, "palworld:settings");
        assert!(config.settings_profile.skip_nodes.contains("A.B"));
        assert_eq!(
            config.settings_profile.forced_values.get("X.Y").map(String::as_str),
            Some("1")
        );
    }
}
