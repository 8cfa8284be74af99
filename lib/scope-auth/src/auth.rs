use std::{fmt, sync::Arc};

use scope_auth_config::{AuthStrategy, ScopeAuthConfig};
use tracing::debug;

use crate::{
    error::UnauthorizedError, failure::AuthFailure, loader::ScopeInitializer,
    pipeline::ResolveInfo, request::RequestScope,
};

pub(crate) type UnauthorizedErrorFn<Ctx> =
    dyn Fn(&Ctx, &ResolveInfo, &AuthFailure) -> UnauthorizedError + Send + Sync;

/// Settings shared by every request of one [`ScopeAuth`].
pub struct ScopeAuthSettings<Ctx> {
    pub default_strategy: AuthStrategy,
    pub treat_errors_as_unauthorized: bool,
    pub authorize_on_subscribe: bool,
    pub(crate) unauthorized_error: Option<Arc<UnauthorizedErrorFn<Ctx>>>,
}

impl<Ctx> Default for ScopeAuthSettings<Ctx> {
    fn default() -> Self {
        Self {
            default_strategy: AuthStrategy::default(),
            treat_errors_as_unauthorized: false,
            authorize_on_subscribe: false,
            unauthorized_error: None,
        }
    }
}

impl<Ctx> fmt::Debug for ScopeAuthSettings<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeAuthSettings")
            .field("default_strategy", &self.default_strategy)
            .field(
                "treat_errors_as_unauthorized",
                &self.treat_errors_as_unauthorized,
            )
            .field("authorize_on_subscribe", &self.authorize_on_subscribe)
            .field("unauthorized_error", &self.unauthorized_error.is_some())
            .finish()
    }
}

pub(crate) struct ScopeAuthInner<Ctx> {
    pub(crate) initializer: ScopeInitializer<Ctx>,
    pub(crate) settings: ScopeAuthSettings<Ctx>,
}

/// Entry point of the engine: holds the scope initializer and the settings,
/// and opens a [`RequestScope`] for each operation.
pub struct ScopeAuth<Ctx> {
    inner: Arc<ScopeAuthInner<Ctx>>,
}

impl<Ctx> Clone for ScopeAuth<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Ctx: Send + Sync + 'static> ScopeAuth<Ctx> {
    pub fn builder(initializer: ScopeInitializer<Ctx>) -> ScopeAuthBuilder<Ctx> {
        ScopeAuthBuilder {
            initializer,
            settings: ScopeAuthSettings::default(),
        }
    }

    pub fn settings(&self) -> &ScopeAuthSettings<Ctx> {
        &self.inner.settings
    }

    /// Starts the authorization state of one operation. Nothing is shared
    /// between two request scopes.
    pub fn request_scope(&self, context: impl Into<Arc<Ctx>>) -> RequestScope<Ctx> {
        RequestScope::new(self.inner.clone(), context.into())
    }
}

pub struct ScopeAuthBuilder<Ctx> {
    initializer: ScopeInitializer<Ctx>,
    settings: ScopeAuthSettings<Ctx>,
}

impl<Ctx: Send + Sync + 'static> ScopeAuthBuilder<Ctx> {
    /// Applies the file/env based part of the settings.
    pub fn config(mut self, config: &ScopeAuthConfig) -> Self {
        self.settings.default_strategy = config.default_strategy;
        self.settings.treat_errors_as_unauthorized = config.treat_errors_as_unauthorized;
        self.settings.authorize_on_subscribe = config.authorize_on_subscribe;
        self
    }

    pub fn default_strategy(mut self, strategy: AuthStrategy) -> Self {
        self.settings.default_strategy = strategy;
        self
    }

    pub fn treat_errors_as_unauthorized(mut self, enabled: bool) -> Self {
        self.settings.treat_errors_as_unauthorized = enabled;
        self
    }

    pub fn authorize_on_subscribe(mut self, enabled: bool) -> Self {
        self.settings.authorize_on_subscribe = enabled;
        self
    }

    /// Builds the error of every denied field that does not set its own.
    pub fn unauthorized_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Ctx, &ResolveInfo, &AuthFailure) -> UnauthorizedError + Send + Sync + 'static,
    {
        self.settings.unauthorized_error = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> ScopeAuth<Ctx> {
        debug!(settings = ?self.settings, "scope auth configured");
        ScopeAuth {
            inner: Arc::new(ScopeAuthInner {
                initializer: self.initializer,
                settings: self.settings,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use scope_auth_config::parse_yaml_config;

    use super::*;
    use crate::loader::ScopeLoaderSet;

    #[test]
    fn config_feeds_the_settings() {
        let config = parse_yaml_config(
            r#"
default_strategy: all
treat_errors_as_unauthorized: true
"#,
        )
        .unwrap();

        let auth = ScopeAuth::builder(ScopeInitializer::sync(|_: &()| Ok(ScopeLoaderSet::new())))
            .config(&config)
            .authorize_on_subscribe(true)
            .build();

        let settings = auth.settings();
        assert_eq!(settings.default_strategy, AuthStrategy::All);
        assert!(settings.treat_errors_as_unauthorized);
        assert!(settings.authorize_on_subscribe);
        assert!(settings.unauthorized_error.is_none());
    }

    #[test]
    fn defaults_to_all() {
        let auth =
            ScopeAuth::builder(ScopeInitializer::sync(|_: &()| Ok(ScopeLoaderSet::new()))).build();
        assert_eq!(auth.settings().default_strategy, AuthStrategy::All);
        assert!(!auth.settings().treat_errors_as_unauthorized);
    }
}
