//! Reading, expanding and validating `audit.yaml`.

use crate::env::{apply_overrides, vars, EnvError, Environment};
use crate::types::{AuditConfig, ConfigFile, SinkKind};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the config directory.
pub const CONFIG_FILE_NAME: &str = "audit.yaml";

/// `${NAME}` or `${NAME:-fallback}`.
const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read audit config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("audit config is not valid YAML{}: {message}", at_line(line))]
    ParseError { line: Option<usize>, message: String },

    #[error("invalid audit config: {message}")]
    ValidationError { message: String },

    #[error("audit config references unset variable {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    fn yaml(e: serde_yaml::Error) -> Self {
        Self::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        }
    }
}

/// Loads `audit.yaml` from one directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// `$AUDITLINE_CONFIG_PATH` if set, else `<dir>/audit.yaml`.
    pub fn config_path(&self) -> PathBuf {
        Environment::get(vars::AUDITLINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config_dir.join(CONFIG_FILE_NAME))
    }

    /// Read the file (defaults when absent), apply `AUDIT_*` overrides and
    /// validate. Defaults alone do not pass validation while auditing is
    /// enabled, since no sink kind is chosen.
    pub fn load(&self) -> Result<AuditConfig, ConfigError> {
        let path = self.config_path();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => self.parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AuditConfig::default(),
            Err(e) => return Err(e.into()),
        };

        apply_overrides(&mut config)?;
        validate(&config)?;
        Ok(config)
    }

    /// Parse YAML text after expanding environment references. No
    /// validation is done here.
    pub fn parse(&self, contents: &str) -> Result<AuditConfig, ConfigError> {
        let expanded = expand_env_refs(contents, |name| std::env::var(name).ok())?;
        let file: ConfigFile = serde_yaml::from_str(&expanded).map_err(ConfigError::yaml)?;
        Ok(file.audit)
    }

    /// Write `config` to `<dir>/audit.yaml`, creating the directory.
    pub fn save(&self, config: &AuditConfig) -> Result<(), ConfigError> {
        let file = ConfigFile {
            audit: config.clone(),
        };
        let yaml = serde_yaml::to_string(&file).map_err(ConfigError::yaml)?;

        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::write(self.config_dir.join(CONFIG_FILE_NAME), yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Replace `${NAME}` and `${NAME:-fallback}` using `lookup`.
///
/// An empty value counts as unset for the fallback form. A bare reference
/// to an unset variable is an error naming the first such variable.
pub fn expand_env_refs<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(ENV_REFERENCE).map_err(|e| ConfigError::invalid(e.to_string()))?;
    let mut missing: Option<String> = None;

    let expanded = pattern.replace_all(content, |caps: &Captures<'_>| {
        let name = &caps[1];
        let value = lookup(name);
        match caps.get(2) {
            Some(fallback) => value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.as_str().to_string()),
            None => value.unwrap_or_else(|| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }),
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(expanded.into_owned()),
    }
}

/// Validate configuration values. Any error here must stop startup.
pub fn validate(config: &AuditConfig) -> Result<(), ConfigError> {
    if config.service_name.trim().is_empty() {
        return Err(ConfigError::invalid("audit.service-name must not be empty"));
    }

    if config.compliance_tag.trim().is_empty() {
        return Err(ConfigError::invalid("audit.compliance-tag must not be empty"));
    }

    if !config.enabled {
        return Ok(());
    }

    let sink = &config.sink;
    let kind = sink.kind.ok_or_else(|| {
        ConfigError::invalid(
            "audit.sink.kind must be set (direct, queued or none) when audit.enabled is true",
        )
    })?;

    match kind {
        SinkKind::None => return Ok(()),
        SinkKind::Direct => {
            if sink.index.trim().is_empty() {
                return Err(ConfigError::invalid("audit.sink.index is required for the direct sink"));
            }
            if sink.endpoint.is_none() {
                return Err(ConfigError::invalid("audit.sink.endpoint is required for the direct sink"));
            }
        }
        SinkKind::Queued => {
            if sink.topic.trim().is_empty() {
                return Err(ConfigError::invalid("audit.sink.topic is required for the queued sink"));
            }
            if sink.endpoint.is_none() && sink.queue_capacity == 0 {
                return Err(ConfigError::invalid(
                    "audit.sink.queue-capacity must be greater than 0",
                ));
            }
        }
    }

    if let Some(endpoint) = &sink.endpoint {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ConfigError::invalid(format!("audit.sink.endpoint is not a valid URL ({e}): {endpoint}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(format!(
                "audit.sink.endpoint must be http or https: {endpoint}"
            )));
        }
    }

    if sink.timeout_ms == 0 {
        return Err(ConfigError::invalid("audit.sink.timeout-ms must be greater than 0"));
    }

    if let Some(auth) = &sink.auth {
        let schemes = [
            auth.username.is_some() || auth.password.is_some(),
            auth.api_key.is_some(),
            auth.bearer_token.is_some(),
        ];
        if schemes.iter().filter(|set| **set).count() > 1 {
            return Err(ConfigError::invalid(
                "audit.sink.auth accepts only one of username/password, api-key or bearer-token",
            ));
        }
        if auth.username.is_some() != auth.password.is_some() {
            return Err(ConfigError::invalid(
                "audit.sink.auth.username and password must be set together",
            ));
        }
    }

    if let Some(retry) = &sink.retry {
        if retry.max_attempts == 0 {
            return Err(ConfigError::invalid("audit.sink.retry.max-attempts must be at least 1"));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "audit.sink.retry.initial-backoff-ms must not exceed max-backoff-ms",
            ));
        }
    }

    Ok(())
}
