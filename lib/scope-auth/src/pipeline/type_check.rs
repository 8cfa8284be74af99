use std::sync::Arc;

use tracing::{debug_span, Instrument};

use crate::{
    error::ScopeAuthError,
    pipeline::{
        steps::{authorize, ResolveStep, StepTarget},
        ResolveInfo, TypeAuthConfig,
    },
    request::RequestScope,
};

/// Authorization of an object type checked once per object, when the
/// executor asks whether an object is of this type.
///
/// Only types with `run_scopes_on_type` get steps. Their fields then skip the
/// type-level steps of their own pipelines.
pub struct TypeCheckPipeline<P, Ctx> {
    config: Arc<TypeAuthConfig<P, Ctx>>,
    steps: Vec<ResolveStep<P, Ctx>>,
}

impl<P, Ctx> TypeCheckPipeline<P, Ctx>
where
    P: Send + Sync + 'static,
    Ctx: Send + Sync + 'static,
{
    pub fn new(config: Arc<TypeAuthConfig<P, Ctx>>) -> Self {
        let mut steps = Vec::new();
        if config.run_scopes_on_type {
            steps.extend(
                config
                    .interfaces
                    .iter()
                    .filter(|interface| interface.auth_scopes.is_some())
                    .map(|interface| ResolveStep::TypeAuth(interface.clone())),
            );
            if config.auth_scopes.is_some() {
                steps.push(ResolveStep::TypeAuth(config.clone()));
            }
            if config.grant_scopes.is_some() {
                steps.push(ResolveStep::TypeGrants(config.clone()));
            }
        }
        Self { config, steps }
    }

    pub fn steps(&self) -> &[ResolveStep<P, Ctx>] {
        &self.steps
    }

    /// Runs the steps for `parent`, then `is_type_of`. `info` belongs to the
    /// field that returned the object, its path is the object's path.
    pub async fn is_type_of<F>(
        &self,
        scope: &RequestScope<Ctx>,
        parent: &Arc<P>,
        info: &ResolveInfo,
        is_type_of: F,
    ) -> Result<bool, ScopeAuthError>
    where
        F: FnOnce(&P) -> bool,
    {
        let span = debug_span!("scope_auth.type", r#type = %self.config.name, path = %info.path);
        let target = StepTarget::Object { parent, info };

        let denied = authorize(&self.steps, scope, target).instrument(span).await?;
        match denied {
            None => Ok(is_type_of(parent.as_ref())),
            Some((step, failure)) => Err(match &scope.settings().unauthorized_error {
                Some(unauthorized_error) => unauthorized_error(scope.context(), info, &failure)
                    .into_scope_auth_error(failure),
                None => ScopeAuthError::forbidden(step.error_message(info), failure),
            }),
        }
    }
}
