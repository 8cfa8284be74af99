use std::sync::Arc;

use crate::{failure::AuthFailure, path::ResponsePath, response::GraphQLError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error raised while computing a scope, as opposed to a scope that
/// evaluated to `false`.
///
/// Cloneable so that a single in-flight evaluation can hand the same failure to
/// every caller that awaits it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScopeError {
    #[error("Scope \"{scope}\" failed: {source}")]
    Predicate {
        scope: Arc<str>,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    #[error("Failed to initialize the scope loaders: {0}")]
    Initializer(#[source] Arc<dyn std::error::Error + Send + Sync>),
    #[error("Scope function of \"{0}\" failed: {1}")]
    ScopeFunction(Arc<str>, #[source] Arc<dyn std::error::Error + Send + Sync>),
    #[error("Scope task did not complete: {0}")]
    TaskAborted(String),
}

impl ScopeError {
    pub(crate) fn predicate(scope: &Arc<str>, err: BoxError) -> Self {
        ScopeError::Predicate {
            scope: scope.clone(),
            source: Arc::from(err),
        }
    }

    pub(crate) fn initializer(err: BoxError) -> Self {
        ScopeError::Initializer(Arc::from(err))
    }

    pub fn scope_function(owner: &str, err: impl Into<BoxError>) -> Self {
        ScopeError::ScopeFunction(Arc::from(owner), Arc::from(err.into()))
    }
}

impl From<tokio::task::JoinError> for ScopeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScopeError::TaskAborted(err.to_string())
    }
}

/// A field or an ad hoc check was denied.
#[derive(Debug, Clone)]
pub struct ForbiddenError {
    pub message: String,
    pub failure: AuthFailure,
}

impl std::fmt::Display for ForbiddenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// The error returned by a guarded resolver or by `run_auth_scopes`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScopeAuthError {
    #[error("{0}")]
    Forbidden(ForbiddenError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("{0}")]
    Resolver(Arc<dyn std::error::Error + Send + Sync>),
}

impl ScopeAuthError {
    pub fn forbidden(message: impl Into<String>, failure: AuthFailure) -> Self {
        ScopeAuthError::Forbidden(ForbiddenError {
            message: message.into(),
            failure,
        })
    }

    pub fn resolver(err: impl Into<BoxError>) -> Self {
        ScopeAuthError::Resolver(Arc::from(err.into()))
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            ScopeAuthError::Forbidden(forbidden) => Some(&forbidden.failure),
            _ => None,
        }
    }

    pub fn graphql_error_code(&self) -> &'static str {
        match self {
            ScopeAuthError::Forbidden(_) => "FORBIDDEN",
            ScopeAuthError::Scope(_) | ScopeAuthError::Resolver(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Builds the entry that lands in the response's `errors` list for the
    /// field at `path`.
    pub fn to_graphql_error(&self, path: &ResponsePath) -> GraphQLError {
        let error = GraphQLError::from_message_and_code(self.to_string(), self.graphql_error_code())
            .with_path(path);

        match self.failure() {
            Some(failure) => error.with_extension("failure", failure),
            None => error,
        }
    }
}

/// What a custom `unauthorized_error` callback produces: either just the
/// message of the forbidden error, or a complete error of its own.
#[derive(Debug)]
pub enum UnauthorizedError {
    Message(String),
    Error(ScopeAuthError),
}

impl From<String> for UnauthorizedError {
    fn from(message: String) -> Self {
        UnauthorizedError::Message(message)
    }
}

impl From<&str> for UnauthorizedError {
    fn from(message: &str) -> Self {
        UnauthorizedError::Message(message.to_string())
    }
}

impl From<ScopeAuthError> for UnauthorizedError {
    fn from(err: ScopeAuthError) -> Self {
        UnauthorizedError::Error(err)
    }
}

impl UnauthorizedError {
    pub(crate) fn into_scope_auth_error(self, failure: AuthFailure) -> ScopeAuthError {
        match self {
            UnauthorizedError::Message(message) => ScopeAuthError::forbidden(message, failure),
            UnauthorizedError::Error(err) => err,
        }
    }
}
