use std::{any::Any, sync::Arc};

use tracing::debug;

use crate::{
    check::Check,
    error::ScopeError,
    failure::{AuthFailure, Decision, ScopeResult},
    path::ResponsePath,
    pipeline::{
        config::{FieldGrants, FieldScopes, RuleResult, ScopeRule, TypeGrants, TypeScopes},
        FieldInvocation, ResolveInfo, TypeAuthConfig,
    },
    request::RequestScope,
};

/// One check of a pipeline. Steps hold configuration only, their results live
/// in the request scope.
pub enum ResolveStep<P, Ctx> {
    /// `auth_scopes` of the parent type, or of one of its interfaces.
    TypeAuth(Arc<TypeAuthConfig<P, Ctx>>),
    /// `grant_scopes` of the parent type.
    TypeGrants(Arc<TypeAuthConfig<P, Ctx>>),
    FieldAuth(FieldScopes<P, Ctx>),
    FieldGrants(FieldGrants<P, Ctx>),
}

pub(crate) enum StepTarget<'a, P> {
    Field(&'a FieldInvocation<P>),
    /// An object checked by `is_type_of`, with the info of the field that
    /// returned it.
    Object {
        parent: &'a Arc<P>,
        info: &'a ResolveInfo,
    },
}

impl<P> Clone for StepTarget<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for StepTarget<'_, P> {}

impl<'a, P> StepTarget<'a, P> {
    fn parent(self) -> &'a Arc<P> {
        match self {
            StepTarget::Field(invocation) => &invocation.parent,
            StepTarget::Object { parent, .. } => parent,
        }
    }

    pub(crate) fn info(self) -> &'a ResolveInfo {
        match self {
            StepTarget::Field(invocation) => &invocation.info,
            StepTarget::Object { info, .. } => info,
        }
    }

    /// Path of the object whose fields are being resolved.
    fn object_path(self) -> Option<&'a ResponsePath> {
        match self {
            StepTarget::Field(invocation) => invocation.info.path.parent(),
            StepTarget::Object { info, .. } => Some(&info.path),
        }
    }
}

pub(crate) fn type_error_message(typename: &str) -> String {
    format!("Not authorized to read fields for {}", typename)
}

impl<P, Ctx> ResolveStep<P, Ctx>
where
    P: Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
{
    pub fn error_message(&self, info: &ResolveInfo) -> String {
        match self {
            ResolveStep::TypeAuth(config) => type_error_message(&config.name),
            _ => format!(
                "Not authorized to resolve {}.{}",
                info.parent_type, info.field_name
            ),
        }
    }

    pub(crate) fn run(&self, scope: &RequestScope<Ctx>, target: StepTarget<'_, P>) -> Check<ScopeResult> {
        match (self, target) {
            (ResolveStep::TypeAuth(config), target) => {
                type_auth(config, scope, target.parent(), target.object_path())
            }
            (ResolveStep::TypeGrants(config), target) => {
                type_grants(config, scope, target.parent(), target.object_path())
            }
            (ResolveStep::FieldAuth(scopes), StepTarget::Field(invocation)) => {
                field_auth(scopes, scope, invocation)
            }
            (ResolveStep::FieldGrants(grants), StepTarget::Field(invocation)) => {
                field_grants(grants, scope, invocation)
            }
            // Field steps only exist in field pipelines.
            (ResolveStep::FieldAuth(_) | ResolveStep::FieldGrants(_), StepTarget::Object { .. }) => {
                Check::Ready(Ok(Decision::Authorized))
            }
        }
    }
}

/// Evaluates `rule` where `$granted` sees the grants of `path`.
fn apply_rule<Ctx: Send + Sync + 'static>(
    rule: Check<Result<ScopeRule, ScopeError>>,
    scope: &RequestScope<Ctx>,
    path: Option<&ResponsePath>,
    denied: AuthFailure,
) -> Check<ScopeResult> {
    let scope = scope.clone();
    let path = path.cloned();
    rule.and_then_ok(move |rule| match rule {
        ScopeRule::Allow => Check::Ready(Ok(Decision::Authorized)),
        ScopeRule::Deny => Check::Ready(Ok(Decision::Unauthorized(denied))),
        ScopeRule::Map(map) => scope.evaluate(&map, path.as_ref()),
    })
}

fn scope_function_error(owner: Arc<str>) -> impl FnOnce(RuleResult) -> Result<ScopeRule, ScopeError> {
    move |result| result.map_err(|err| ScopeError::scope_function(&owner, err))
}

fn type_auth<P, Ctx>(
    config: &TypeAuthConfig<P, Ctx>,
    scope: &RequestScope<Ctx>,
    parent: &Arc<P>,
    path: Option<&ResponsePath>,
) -> Check<ScopeResult>
where
    P: Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
{
    let Some(scopes) = &config.auth_scopes else {
        return Check::Ready(Ok(Decision::Authorized));
    };

    let typename = config.name.clone();
    let evaluate = || {
        let rule = match scopes {
            TypeScopes::Map(map) => Check::Ready(Ok(ScopeRule::Map(map.clone()))),
            TypeScopes::Function(f) => {
                f(parent, scope.context()).map(scope_function_error(typename.clone()))
            }
        };
        let denied = AuthFailure::TypeAuthScopeFunction {
            typename: typename.to_string(),
        };
        let typename = typename.clone();
        apply_rule(rule, scope, path, denied).map(move |result| {
            result.map(|decision| match decision {
                Decision::Unauthorized(failure @ AuthFailure::TypeAuthScopeFunction { .. }) => {
                    Decision::Unauthorized(failure)
                }
                Decision::Unauthorized(failure) => {
                    Decision::Unauthorized(AuthFailure::TypeAuthScopes {
                        typename: typename.to_string(),
                        failure: Box::new(failure),
                    })
                }
                Decision::Authorized => Decision::Authorized,
            })
        })
    };

    match scopes {
        // A `$granted` in the map makes the result depend on the path.
        TypeScopes::Map(map) if !map.is_cacheable() => evaluate(),
        _ => {
            let object: Arc<dyn Any + Send + Sync> = parent.clone();
            scope
                .cache()
                .evaluate_type_auth(&config.name, object, evaluate)
        }
    }
}

fn type_grants<P, Ctx>(
    config: &TypeAuthConfig<P, Ctx>,
    scope: &RequestScope<Ctx>,
    parent: &Arc<P>,
    path: Option<&ResponsePath>,
) -> Check<ScopeResult>
where
    Ctx: Send + Sync + 'static,
{
    let names = match &config.grant_scopes {
        None => return Check::Ready(Ok(Decision::Authorized)),
        Some(TypeGrants::Names(names)) => Check::Ready(names.clone()),
        Some(TypeGrants::Function(f)) => f(parent, scope.context()),
    };
    record_grants(names, scope, path)
}

fn field_auth<P, Ctx>(
    scopes: &FieldScopes<P, Ctx>,
    scope: &RequestScope<Ctx>,
    invocation: &FieldInvocation<P>,
) -> Check<ScopeResult>
where
    Ctx: Send + Sync + 'static,
{
    let info = &invocation.info;
    let rule = match scopes {
        FieldScopes::Map(map) => Check::Ready(Ok(ScopeRule::Map(map.clone()))),
        FieldScopes::Function(f) => {
            let owner: Arc<str> = Arc::from(format!("{}.{}", info.parent_type, info.field_name));
            f(&invocation.parent, &invocation.args, scope.context(), info)
                .map(scope_function_error(owner))
        }
    };
    apply_rule(
        rule,
        scope,
        info.path.parent(),
        AuthFailure::FieldAuthScopeFunction,
    )
}

fn field_grants<P, Ctx>(
    grants: &FieldGrants<P, Ctx>,
    scope: &RequestScope<Ctx>,
    invocation: &FieldInvocation<P>,
) -> Check<ScopeResult>
where
    Ctx: Send + Sync + 'static,
{
    let info = &invocation.info;
    let names = match grants {
        FieldGrants::Names(names) => Check::Ready(names.clone()),
        FieldGrants::Function(f) => f(&invocation.parent, &invocation.args, scope.context(), info),
    };
    record_grants(names, scope, Some(&info.path))
}

/// Grant steps never fail.
fn record_grants<Ctx: Send + Sync + 'static>(
    names: Check<Vec<String>>,
    scope: &RequestScope<Ctx>,
    path: Option<&ResponsePath>,
) -> Check<ScopeResult> {
    let scope = scope.clone();
    let path = path.cloned();
    names.map(move |names| {
        debug!(path = ?path.as_ref().map(ResponsePath::as_str), count = names.len(), "recording grants");
        scope.grants().grant(path.as_ref(), names);
        Ok(Decision::Authorized)
    })
}

/// Runs `steps` in order and stops at the first one that denies.
pub(crate) async fn authorize<'s, P, Ctx>(
    steps: &'s [ResolveStep<P, Ctx>],
    scope: &RequestScope<Ctx>,
    target: StepTarget<'_, P>,
) -> Result<Option<(&'s ResolveStep<P, Ctx>, AuthFailure)>, ScopeError>
where
    P: Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
{
    for step in steps {
        if let Decision::Unauthorized(failure) = step.run(scope, target).await? {
            debug!(failure = %failure, "authorization step denied");
            return Ok(Some((step, failure)));
        }
    }
    Ok(None)
}
