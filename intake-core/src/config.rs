use crate::error::ConfigError;
use category_registry::{validate_responder_key, ResponderKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub database_path: String,
    pub call_number_prefix: String,
    pub dialing: DialingDefaults,
    pub notification: NotificationConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            database_path: "data/dispatch.db".to_string(),
            call_number_prefix: "EM".to_string(),
            dialing: DialingDefaults::default(),
            notification: NotificationConfig::default(),
        }
    }
}

/// How bare local numbers are completed before sending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialingDefaults {
    pub country_code: String,
    pub area_code: String,
    /// Length of a subscriber number dialed without area code.
    pub local_digits: usize,
}

impl Default for DialingDefaults {
    fn default() -> Self {
        Self {
            country_code: "54".to_string(),
            area_code: "351".to_string(),
            local_digits: 7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub gateway_url: String,
    pub gateway_token: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first failed send.
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub signature: String,
    /// Responder phones keyed by `MEDICA_DEMVA`, `MEDICA_CEC`, `BOMBEROS`,
    /// `DEFENSA_CIVIL` or `SEGURIDAD`.
    pub targets: BTreeMap<String, Vec<String>>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gateway_url: "http://localhost:3000".to_string(),
            gateway_token: String::new(),
            timeout_secs: 15,
            retries: 3,
            retry_backoff_ms: 1_000,
            signature: "Sistema de Emergencias Villa Allende".to_string(),
            targets: BTreeMap::new(),
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Configured phones for `key`, in config order.
    pub fn targets_for(&self, key: ResponderKey) -> Vec<String> {
        let code = key.code();
        self.targets
            .iter()
            .filter(|(k, _)| k.trim().eq_ignore_ascii_case(&code))
            .flat_map(|(_, phones)| phones.iter().cloned())
            .collect()
    }
}

impl IntakeConfig {
    /// Reads a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// File config when `path` exists, defaults otherwise, then environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_json_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("DISPATCH_DB_PATH") {
            self.database_path = path;
        }
        if let Some(url) = lookup("DISPATCH_GATEWAY_URL") {
            self.notification.gateway_url = url;
        }
        if let Some(token) = lookup("DISPATCH_GATEWAY_TOKEN") {
            self.notification.gateway_token = token;
        }
        if let Some(secs) = lookup("DISPATCH_NOTIFY_TIMEOUT_SECS") {
            self.notification.timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("DISPATCH_NOTIFY_TIMEOUT_SECS: '{secs}' is not a number"))
            })?;
        }
        if let Some(retries) = lookup("DISPATCH_NOTIFY_RETRIES") {
            self.notification.retries = retries.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("DISPATCH_NOTIFY_RETRIES: '{retries}' is not a number"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_number_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("call_number_prefix is empty".into()));
        }
        if self.notification.timeout_secs == 0 {
            return Err(ConfigError::Invalid("notification timeout must be positive".into()));
        }
        if self.dialing.country_code.is_empty()
            || !self.dialing.country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid("dialing country code must be digits".into()));
        }
        for key in self.notification.targets.keys() {
            validate_responder_key(key)
                .map_err(|err| ConfigError::Invalid(format!("responder key '{key}': {err}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use category_registry::{EmergencyCategory, MedicalReceiver};
    use std::collections::HashMap;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join("dispatch-desk-tests");
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join(format!("{name}-{nanos}.json"));
        std::fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn defaults_match_deployed_values() {
        let config = IntakeConfig::default();
        assert_eq!(config.call_number_prefix, "EM");
        assert_eq!(config.notification.timeout(), Duration::from_secs(15));
        assert_eq!(config.notification.retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = temp_file(
            "partial",
            r#"{"notification": {"targets": {"BOMBEROS": ["3514111111"], "MEDICA_CEC": ["3514222222"]}}}"#,
        );
        let config = IntakeConfig::from_json_file(&path).expect("load");
        assert_eq!(config.notification.timeout_secs, 15);
        assert_eq!(
            config
                .notification
                .targets_for(ResponderKey::Category(EmergencyCategory::Fire)),
            vec!["3514111111".to_string()]
        );
        assert!(config
            .notification
            .targets_for(ResponderKey::Medical(MedicalReceiver::Demva))
            .is_empty());
    }

    #[test]
    fn unknown_responder_key_is_rejected() {
        let path = temp_file("bad-key", r#"{"notification": {"targets": {"GENERAL": ["1"]}}}"#);
        let err = IntakeConfig::from_json_file(&path).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let path = temp_file("bad-json", "{not json");
        assert!(matches!(
            IntakeConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DISPATCH_DB_PATH", "/tmp/other.db"),
            ("DISPATCH_NOTIFY_RETRIES", "1"),
            ("DISPATCH_GATEWAY_TOKEN", "secret"),
        ]);
        let mut config = IntakeConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(config.database_path, "/tmp/other.db");
        assert_eq!(config.notification.retries, 1);
        assert_eq!(config.notification.gateway_token, "secret");

        let err = config
            .apply_overrides(|key| (key == "DISPATCH_NOTIFY_TIMEOUT_SECS").then(|| "soon".to_string()))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
