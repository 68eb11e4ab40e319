//! `.env` loading and `AUDIT_*` overrides.

use crate::types::{AuditConfig, SinkKind};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("{var} has an invalid value: {message}")]
    InvalidValue { var: String, message: String },

    #[error("malformed .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Variable names read by this crate.
pub mod vars {
    pub const AUDIT_ENABLED: &str = "AUDIT_ENABLED";
    pub const AUDIT_SERVICE_NAME: &str = "AUDIT_SERVICE_NAME";
    pub const AUDIT_COMPLIANCE_TAG: &str = "AUDIT_COMPLIANCE_TAG";
    pub const AUDIT_SINK_KIND: &str = "AUDIT_SINK_KIND";
    pub const AUDIT_SINK_ENDPOINT: &str = "AUDIT_SINK_ENDPOINT";
    pub const AUDIT_SINK_INDEX: &str = "AUDIT_SINK_INDEX";
    pub const AUDIT_SINK_TOPIC: &str = "AUDIT_SINK_TOPIC";

    /// Full path to the config file, bypassing the config directory.
    pub const AUDITLINE_CONFIG_PATH: &str = "AUDITLINE_CONFIG_PATH";
    /// Selects an extra `.env.<name>` file.
    pub const AUDITLINE_ENV: &str = "AUDITLINE_ENV";
}

/// Process environment after `.env` files were applied.
#[derive(Debug, Default)]
pub struct Environment {
    loaded: Vec<PathBuf>,
}

impl Environment {
    /// Load `.env`, `.env.local` and `.env.$AUDITLINE_ENV` from the working
    /// directory. Variables already set in the process are never replaced.
    /// Missing files are skipped; a file that fails to parse is an error.
    pub fn init() -> Result<Self, EnvError> {
        let mut candidates = vec![".env".to_string(), ".env.local".to_string()];
        if let Some(name) = Self::get(vars::AUDITLINE_ENV) {
            candidates.push(format!(".env.{name}"));
        }

        let mut loaded = Vec::new();
        for candidate in candidates {
            match dotenvy::from_filename(&candidate) {
                Ok(path) => loaded.push(path),
                Err(e) if e.not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self { loaded })
    }

    /// Files that were found and applied, in load order.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded
    }

    /// Unset and empty both read as `None`.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, EnvError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(EnvError::InvalidValue {
            var: var.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

/// Apply `AUDIT_*` overrides from the process environment.
pub fn apply_overrides(config: &mut AuditConfig) -> Result<(), EnvError> {
    apply_overrides_from(config, |var| env::var(var).ok())
}

/// Apply `AUDIT_*` overrides using `lookup` as the variable source.
pub fn apply_overrides_from<F>(config: &mut AuditConfig, lookup: F) -> Result<(), EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(vars::AUDIT_ENABLED) {
        config.enabled = parse_bool(vars::AUDIT_ENABLED, &v)?;
    }
    if let Some(v) = lookup(vars::AUDIT_SERVICE_NAME) {
        config.service_name = v;
    }
    if let Some(v) = lookup(vars::AUDIT_COMPLIANCE_TAG) {
        config.compliance_tag = v;
    }
    if let Some(v) = lookup(vars::AUDIT_SINK_KIND) {
        let kind = v.trim().parse::<SinkKind>().map_err(|_| EnvError::InvalidValue {
            var: vars::AUDIT_SINK_KIND.to_string(),
            message: format!("expected direct, queued or none, got '{v}'"),
        })?;
        config.sink.kind = Some(kind);
    }
    if let Some(v) = lookup(vars::AUDIT_SINK_ENDPOINT) {
        config.sink.endpoint = Some(v);
    }
    if let Some(v) = lookup(vars::AUDIT_SINK_INDEX) {
        config.sink.index = v;
    }
    if let Some(v) = lookup(vars::AUDIT_SINK_TOPIC) {
        config.sink.topic = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test_case("true", true ; "word true")]
    #[test_case("1", true ; "digit one")]
    #[test_case("YES", true ; "upper yes")]
    #[test_case("false", false ; "word false")]
    #[test_case("0", false ; "digit zero")]
    #[test_case(" off ", false ; "padded off")]
    fn test_bool_parsing(raw: &str, expected: bool) {
        assert_eq!(parse_bool("X", raw).unwrap(), expected);
    }

    #[test]
    fn test_bool_rejects_garbage() {
        assert!(matches!(parse_bool("X", "maybe"), Err(EnvError::InvalidValue { .. })));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = AuditConfig::default();
        apply_overrides_from(
            &mut config,
            lookup(&[
                (vars::AUDIT_ENABLED, "true"),
                (vars::AUDIT_SERVICE_NAME, "ledger"),
                (vars::AUDIT_COMPLIANCE_TAG, "SOX"),
                (vars::AUDIT_SINK_KIND, "Queued"),
                (vars::AUDIT_SINK_ENDPOINT, "http://proxy:8082"),
                (vars::AUDIT_SINK_TOPIC, "ledger-audit"),
                (vars::AUDIT_SINK_INDEX, "ledger-idx"),
            ]),
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.service_name, "ledger");
        assert_eq!(config.compliance_tag, "SOX");
        assert_eq!(config.sink.kind, Some(SinkKind::Queued));
        assert_eq!(config.sink.endpoint.as_deref(), Some("http://proxy:8082"));
        assert_eq!(config.sink.topic, "ledger-audit");
        assert_eq!(config.sink.index, "ledger-idx");
    }

    #[test]
    fn test_no_overrides_leave_config_untouched() {
        let mut config = AuditConfig::default();
        apply_overrides_from(&mut config, lookup(&[])).unwrap();
        assert_eq!(config, AuditConfig::default());
    }

    #[test]
    fn test_invalid_sink_kind_override() {
        let mut config = AuditConfig::default();
        let err = apply_overrides_from(&mut config, lookup(&[(vars::AUDIT_SINK_KIND, "s3")]))
            .unwrap_err();
        assert!(matches!(err, EnvError::InvalidValue { var, .. } if var == vars::AUDIT_SINK_KIND));
    }

    #[test]
    fn test_missing_var_is_none() {
        assert!(Environment::get("AUDITLINE_SURELY_UNSET_VAR").is_none());
    }

    #[test]
    fn test_init_reports_only_existing_files() {
        let env = Environment::init().unwrap();
        assert!(env.loaded_files().iter().all(|p| p.exists()));
    }
}
