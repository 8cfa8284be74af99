use std::fmt;

use serde::{Serialize, Serializer};
use strum::IntoStaticStr;

use crate::{error::ScopeError, expression::ScopeArg};

/// Why an authorization check did not pass.
///
/// Composite failures keep the failing children so that a custom
/// `unauthorized_error` can explain exactly which scopes were missing.
#[derive(Debug, Clone, Serialize, IntoStaticStr)]
#[serde(tag = "kind")]
pub enum AuthFailure {
    /// A named scope evaluated to `false`, or its predicate failed while
    /// errors are treated as unauthorized (then `error` holds the cause).
    AuthScope {
        scope: String,
        arg: ScopeArg,
        #[serde(
            skip_serializing_if = "Option::is_none",
            serialize_with = "serialize_error"
        )]
        error: Option<ScopeError>,
    },
    /// A `$granted` name was not granted at the current path.
    GrantedScope { scope: String },
    AllAuthScopes { failures: Vec<AuthFailure> },
    AnyAuthScopes { failures: Vec<AuthFailure> },
    /// The scope map references a name the loader set does not define.
    UnknownScope { scope: String },
    /// A field's scope function denied access outright.
    FieldAuthScopeFunction,
    /// A type's scope function denied access outright.
    TypeAuthScopeFunction { typename: String },
    /// The parent type (or one of its interfaces) denied access.
    TypeAuthScopes {
        typename: String,
        failure: Box<AuthFailure>,
    },
}

fn serialize_error<S: Serializer>(
    error: &Option<ScopeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_str(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

impl AuthFailure {
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Names of every scope that failed, depth first.
    pub fn failed_scopes(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_failed_scopes(&mut names);
        names
    }

    fn collect_failed_scopes<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            AuthFailure::AuthScope { scope, .. }
            | AuthFailure::GrantedScope { scope }
            | AuthFailure::UnknownScope { scope } => names.push(scope),
            AuthFailure::AllAuthScopes { failures } | AuthFailure::AnyAuthScopes { failures } => {
                for failure in failures {
                    failure.collect_failed_scopes(names);
                }
            }
            AuthFailure::TypeAuthScopes { failure, .. } => failure.collect_failed_scopes(names),
            AuthFailure::FieldAuthScopeFunction | AuthFailure::TypeAuthScopeFunction { .. } => {}
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, failures: &[AuthFailure]) -> fmt::Result {
    f.write_str("[")?;
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", failure)?;
    }
    f.write_str("]")
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::AuthScope { scope, arg, error } => {
                write!(f, "{}({})", scope, arg)?;
                if let Some(error) = error {
                    write!(f, " errored: {}", error)?;
                }
                Ok(())
            }
            AuthFailure::GrantedScope { scope } => write!(f, "$granted({})", scope),
            AuthFailure::AllAuthScopes { failures } => {
                f.write_str("$all")?;
                write_list(f, failures)
            }
            AuthFailure::AnyAuthScopes { failures } => {
                f.write_str("$any")?;
                write_list(f, failures)
            }
            AuthFailure::UnknownScope { scope } => write!(f, "unknown scope {}", scope),
            AuthFailure::FieldAuthScopeFunction => f.write_str("field scope function"),
            AuthFailure::TypeAuthScopeFunction { typename } => {
                write!(f, "scope function of {}", typename)
            }
            AuthFailure::TypeAuthScopes { typename, failure } => {
                write!(f, "{}: {}", typename, failure)
            }
        }
    }
}

/// Outcome of an authorization check that did not error.
#[derive(Debug, Clone)]
pub enum Decision {
    Authorized,
    Unauthorized(AuthFailure),
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized)
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Decision::Authorized => None,
            Decision::Unauthorized(failure) => Some(failure),
        }
    }
}

pub type ScopeResult = Result<Decision, ScopeError>;
