use std::{future::Future, sync::Arc};

use tracing::{debug_span, Instrument};

use crate::{
    error::ScopeAuthError,
    failure::AuthFailure,
    pipeline::{
        config::FieldAuthConfig,
        steps::{authorize, ResolveStep, StepTarget},
        FieldInvocation, TypeAuthConfig,
    },
    request::RequestScope,
};

/// The authorization steps wrapped around one field resolver.
///
/// Steps run in order: interface scopes, type scopes, type grants, field
/// scopes, field grants. The first denying step stops the pipeline and the
/// resolver is never called.
pub struct FieldPipeline<P, Ctx, T> {
    steps: Vec<ResolveStep<P, Ctx>>,
    config: FieldAuthConfig<P, Ctx, T>,
}

impl<P, Ctx, T> FieldPipeline<P, Ctx, T>
where
    P: Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
{
    /// `parent_type` is the object type the field belongs to, `None` for
    /// fields whose type carries no authorization.
    pub fn new(
        parent_type: Option<Arc<TypeAuthConfig<P, Ctx>>>,
        config: FieldAuthConfig<P, Ctx, T>,
    ) -> Self {
        let mut steps = Vec::new();

        if let Some(parent_type) = parent_type.filter(|t| !t.run_scopes_on_type) {
            if !config.skip_interface_scopes {
                steps.extend(
                    parent_type
                        .interfaces
                        .iter()
                        .filter(|interface| interface.auth_scopes.is_some())
                        .map(|interface| ResolveStep::TypeAuth(interface.clone())),
                );
            }
            if !config.skip_type_scopes && parent_type.auth_scopes.is_some() {
                steps.push(ResolveStep::TypeAuth(parent_type.clone()));
            }
            if parent_type.grant_scopes.is_some() {
                steps.push(ResolveStep::TypeGrants(parent_type));
            }
        }
        if let Some(scopes) = &config.auth_scopes {
            steps.push(ResolveStep::FieldAuth(scopes.clone()));
        }
        if let Some(grants) = &config.grant_scopes {
            steps.push(ResolveStep::FieldGrants(grants.clone()));
        }

        Self { steps, config }
    }

    pub fn steps(&self) -> &[ResolveStep<P, Ctx>] {
        &self.steps
    }

    /// Runs the steps, then `resolver` if every step passed.
    pub async fn resolve<F, Fut>(
        &self,
        scope: &RequestScope<Ctx>,
        invocation: &FieldInvocation<P>,
        resolver: F,
    ) -> Result<T, ScopeAuthError>
    where
        F: FnOnce(&FieldInvocation<P>) -> Fut,
        Fut: Future<Output = Result<T, ScopeAuthError>>,
    {
        let info = &invocation.info;
        let span = debug_span!(
            "scope_auth.field",
            r#type = %info.parent_type,
            field = %info.field_name,
            path = %info.path,
        );

        async move {
            match authorize(&self.steps, scope, StepTarget::Field(invocation)).await? {
                None => resolver(invocation).await,
                Some((step, failure)) => self.unauthorized(scope, invocation, step, failure),
            }
        }
        .instrument(span)
        .await
    }

    /// Opens a subscription. With `authorize_on_subscribe` the steps run here,
    /// once, and [`FieldPipeline::resolve_event`] skips them.
    pub async fn subscribe<F, Fut, S>(
        &self,
        scope: &RequestScope<Ctx>,
        invocation: &FieldInvocation<P>,
        subscribe: F,
    ) -> Result<S, ScopeAuthError>
    where
        F: FnOnce(&FieldInvocation<P>) -> Fut,
        Fut: Future<Output = Result<S, ScopeAuthError>>,
    {
        if scope.settings().authorize_on_subscribe {
            let info = &invocation.info;
            let span = debug_span!(
                "scope_auth.field",
                r#type = %info.parent_type,
                field = %info.field_name,
                subscribe = true,
            );
            let denied = authorize(&self.steps, scope, StepTarget::Field(invocation))
                .instrument(span)
                .await?;
            if let Some((step, failure)) = denied {
                return Err(self.forbidden(scope, invocation, step, failure));
            }
        }

        subscribe(invocation).await
    }

    /// Resolves one event of a subscription.
    pub async fn resolve_event<F, Fut>(
        &self,
        scope: &RequestScope<Ctx>,
        invocation: &FieldInvocation<P>,
        resolver: F,
    ) -> Result<T, ScopeAuthError>
    where
        F: FnOnce(&FieldInvocation<P>) -> Fut,
        Fut: Future<Output = Result<T, ScopeAuthError>>,
    {
        if scope.settings().authorize_on_subscribe {
            resolver(invocation).await
        } else {
            self.resolve(scope, invocation, resolver).await
        }
    }

    fn unauthorized(
        &self,
        scope: &RequestScope<Ctx>,
        invocation: &FieldInvocation<P>,
        step: &ResolveStep<P, Ctx>,
        failure: AuthFailure,
    ) -> Result<T, ScopeAuthError> {
        match &self.config.unauthorized_resolver {
            Some(fallback) => Ok(fallback(
                &invocation.parent,
                &invocation.args,
                scope.context(),
                &invocation.info,
                &failure,
            )),
            None => Err(self.forbidden(scope, invocation, step, failure)),
        }
    }

    fn forbidden(
        &self,
        scope: &RequestScope<Ctx>,
        invocation: &FieldInvocation<P>,
        step: &ResolveStep<P, Ctx>,
        failure: AuthFailure,
    ) -> ScopeAuthError {
        let info = &invocation.info;
        let custom = self
            .config
            .unauthorized_error
            .as_ref()
            .or(scope.settings().unauthorized_error.as_ref());

        match custom {
            Some(unauthorized_error) => {
                unauthorized_error(scope.context(), info, &failure).into_scope_auth_error(failure)
            }
            None => ScopeAuthError::forbidden(step.error_message(info), failure),
        }
    }
}
