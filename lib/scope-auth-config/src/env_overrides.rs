use config::{builder::BuilderState, ConfigBuilder, ConfigError};
use envconfig::Envconfig;
use tracing::debug;

use crate::AuthStrategy;

#[derive(Envconfig)]
pub struct EnvVarOverrides {
    // Logger overrides, validated when the merged config is deserialized
    #[envconfig(from = "LOG_LEVEL")]
    pub log_level: Option<String>,
    #[envconfig(from = "LOG_FORMAT")]
    pub log_format: Option<String>,
    #[envconfig(from = "LOG_FILTER")]
    pub log_filter: Option<String>,

    // Evaluation overrides
    #[envconfig(from = "SCOPE_AUTH_DEFAULT_STRATEGY")]
    pub default_strategy: Option<AuthStrategy>,
    #[envconfig(from = "SCOPE_AUTH_TREAT_ERRORS_AS_UNAUTHORIZED")]
    pub treat_errors_as_unauthorized: Option<bool>,
    #[envconfig(from = "SCOPE_AUTH_AUTHORIZE_ON_SUBSCRIBE")]
    pub authorize_on_subscribe: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvVarOverridesError {
    #[error("Failed to override configuration: {0}")]
    FailedToOverrideConfig(#[from] ConfigError),
}

impl EnvVarOverrides {
    pub fn apply_overrides<T: BuilderState>(
        mut self,
        mut config: ConfigBuilder<T>,
    ) -> Result<ConfigBuilder<T>, EnvVarOverridesError> {
        if let Some(log_level) = self.log_level.take() {
            debug!("[config-override] 'log.level' = {:?}", log_level);
            config = config.set_override("log.level", log_level)?;
        }
        if let Some(log_format) = self.log_format.take() {
            debug!("[config-override] 'log.format' = {:?}", log_format);
            config = config.set_override("log.format", log_format)?;
        }
        if let Some(log_filter) = self.log_filter.take() {
            debug!("[config-override] 'log.filter' = {:?}", log_filter);
            config = config.set_override("log.filter", log_filter)?;
        }

        if let Some(strategy) = self.default_strategy.take() {
            debug!("[config-override] 'default_strategy' = {:?}", strategy);
            config = config.set_override("default_strategy", strategy.as_str())?;
        }
        if let Some(enabled) = self.treat_errors_as_unauthorized.take() {
            debug!(
                "[config-override] 'treat_errors_as_unauthorized' = {}",
                enabled
            );
            config = config.set_override("treat_errors_as_unauthorized", enabled)?;
        }
        if let Some(enabled) = self.authorize_on_subscribe.take() {
            debug!("[config-override] 'authorize_on_subscribe' = {}", enabled);
            config = config.set_override("authorize_on_subscribe", enabled)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use config::Config;

    use super::*;
    use crate::{log::LogLevel, ScopeAuthConfig};

    #[test]
    fn env_values_override_file_values() {
        let env = HashMap::from([
            (
                "SCOPE_AUTH_DEFAULT_STRATEGY".to_string(),
                "all".to_string(),
            ),
            (
                "SCOPE_AUTH_TREAT_ERRORS_AS_UNAUTHORIZED".to_string(),
                "true".to_string(),
            ),
            ("LOG_LEVEL".to_string(), "error".to_string()),
        ]);
        let overrides = EnvVarOverrides::init_from_hashmap(&env).unwrap();

        let builder = Config::builder().add_source(config::File::from_str(
            "default_strategy: any\nlog:\n  level: info",
            config::FileFormat::Yaml,
        ));
        let config = overrides
            .apply_overrides(builder)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<ScopeAuthConfig>()
            .unwrap();

        assert_eq!(config.default_strategy, AuthStrategy::All);
        assert!(config.treat_errors_as_unauthorized);
        assert!(!config.authorize_on_subscribe);
        assert_eq!(config.log.level, LogLevel::Error);
    }

    #[test]
    fn invalid_env_values_fail_the_load() {
        let env = HashMap::from([("LOG_FORMAT".to_string(), "xml".to_string())]);
        let overrides = EnvVarOverrides::init_from_hashmap(&env).unwrap();

        let result = overrides
            .apply_overrides(Config::builder())
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<ScopeAuthConfig>();
        assert!(result.is_err());
    }
}
