mod env_overrides;
pub mod log;

use config::{Config, File, FileFormat, FileSourceFile};
use envconfig::Envconfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, str::FromStr};

use crate::{
    env_overrides::{EnvVarOverrides, EnvVarOverridesError},
    log::LoggingConfig,
};

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScopeAuthConfig {
    /// The logger configuration.
    #[serde(default)]
    pub log: LoggingConfig,

    /// The combinator applied to a bare scope map, one that has plain scope keys
    /// and no explicit `$all` / `$any` wrapper.
    ///
    /// Can also be set via the `SCOPE_AUTH_DEFAULT_STRATEGY` environment variable.
    #[serde(default)]
    pub default_strategy: AuthStrategy,

    /// When enabled, an error raised by a scope predicate is turned into a regular
    /// authorization failure for that scope, so a passing sibling inside `$any`
    /// can still authorize the field. When disabled, the error is returned as-is.
    ///
    /// Can also be set via the `SCOPE_AUTH_TREAT_ERRORS_AS_UNAUTHORIZED` environment variable.
    #[serde(default)]
    pub treat_errors_as_unauthorized: bool,

    /// When enabled, the authorization steps of a subscription field run once,
    /// before the subscription is established, instead of for every emitted event.
    ///
    /// Can also be set via the `SCOPE_AUTH_AUTHORIZE_ON_SUBSCRIBE` environment variable.
    #[serde(default)]
    pub authorize_on_subscribe: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    /// Every scope of the map has to pass.
    #[default]
    All,
    /// At least one scope of the map has to pass.
    Any,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::All => "all",
            AuthStrategy::Any => "any",
        }
    }
}

impl FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(AuthStrategy::All),
            "any" => Ok(AuthStrategy::Any),
            _ => Err(format!("Invalid auth strategy: {}", s)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeAuthConfigError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to apply configuration overrides: {0}")]
    EnvVarOverridesError(#[from] EnvVarOverridesError),
    #[error("Failed to load the environment variables: {0}")]
    EnvVarLoadError(#[from] envconfig::Error),
    #[error("Failed to parse the configuration file path: {0}")]
    ConfigPathParseError(Infallible),
}

static DEFAULT_FILE_NAMES: &[&str] = &[
    "scope-auth.config.yaml",
    "scope-auth.config.yml",
    "scope-auth.config.json",
    "scope-auth.config.json5",
];

pub fn load_config(
    override_config_path: Option<String>,
) -> Result<ScopeAuthConfig, ScopeAuthConfigError> {
    let env_overrides = EnvVarOverrides::init_from_env()?;
    let mut config = Config::builder();

    if let Some(path_str) = override_config_path {
        let path_buf = path_str
            .parse::<std::path::PathBuf>()
            .map_err(ScopeAuthConfigError::ConfigPathParseError)?;
        let as_file: File<FileSourceFile, _> = path_buf.into();

        config = config.add_source(as_file.required(true));
    } else {
        for name in DEFAULT_FILE_NAMES {
            config = config.add_source(File::with_name(name).required(false));
        }
    }

    config = env_overrides.apply_overrides(config)?;

    Ok(config.build()?.try_deserialize::<ScopeAuthConfig>()?)
}

pub fn parse_yaml_config(config_raw: &str) -> Result<ScopeAuthConfig, ScopeAuthConfigError> {
    Config::builder()
        .add_source(File::from_str(config_raw, FileFormat::Yaml))
        .build()?
        .try_deserialize::<ScopeAuthConfig>()
        .map_err(ScopeAuthConfigError::ConfigLoadError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogFormat, LogLevel};

    #[test]
    fn bare_maps_require_every_scope_by_default() {
        let config = parse_yaml_config("{}").unwrap();
        assert_eq!(config.default_strategy, AuthStrategy::All);
        assert!(!config.treat_errors_as_unauthorized);
        assert!(!config.authorize_on_subscribe);
    }

    #[test]
    fn parses_every_option() {
        let config = parse_yaml_config(
            r#"
            default_strategy: any
            treat_errors_as_unauthorized: true
            authorize_on_subscribe: true
            log:
              level: warn
              format: json
              filter: scope_auth=trace
            "#,
        )
        .unwrap();

        assert_eq!(config.default_strategy, AuthStrategy::Any);
        assert!(config.treat_errors_as_unauthorized);
        assert!(config.authorize_on_subscribe);
        assert_eq!(config.log.level, LogLevel::Warn);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.env_filter_str(), "scope_auth=trace");
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = parse_yaml_config("default_strategie: all");
        assert!(matches!(
            result,
            Err(ScopeAuthConfigError::ConfigLoadError(_))
        ));
    }

    #[test]
    fn schema_lists_every_option() {
        let schema = schemars::schema_for!(ScopeAuthConfig);
        let mut properties = schema.as_value()["properties"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        properties.sort();
        insta::assert_snapshot!(
            properties.join(","),
            @"authorize_on_subscribe,default_strategy,log,treat_errors_as_unauthorized"
        );
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(parse_yaml_config("default_strategy: some").is_err());
        assert_eq!("ALL".parse::<AuthStrategy>(), Ok(AuthStrategy::All));
    }
}
