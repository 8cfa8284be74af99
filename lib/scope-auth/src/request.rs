use std::sync::Arc;

use scope_auth_config::AuthStrategy;

use crate::{
    auth::{ScopeAuthInner, ScopeAuthSettings},
    cache::{LoaderSetResult, RequestCache},
    check::Check,
    error::{ScopeAuthError, UnauthorizedError},
    evaluator::Evaluator,
    expression::ScopeMap,
    failure::{AuthFailure, Decision, ScopeResult},
    grants::GrantStore,
    loader::ScopeLoaderSet,
    path::ResponsePath,
};

const DEFAULT_UNAUTHORIZED_MESSAGE: &str = "Not authorized";

struct RequestScopeInner<Ctx> {
    context: Arc<Ctx>,
    auth: Arc<ScopeAuthInner<Ctx>>,
    cache: RequestCache,
    grants: GrantStore,
}

/// Authorization state of a single operation: its context, the loader set
/// built from it, every memoized result and every grant.
///
/// Create one per operation with [`ScopeAuth::request_scope`](crate::ScopeAuth::request_scope)
/// and hand clones of it to every resolver of that operation.
pub struct RequestScope<Ctx> {
    inner: Arc<RequestScopeInner<Ctx>>,
}

impl<Ctx> Clone for RequestScope<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Ctx: Send + Sync + 'static> RequestScope<Ctx> {
    pub(crate) fn new(auth: Arc<ScopeAuthInner<Ctx>>, context: Arc<Ctx>) -> Self {
        Self {
            inner: Arc::new(RequestScopeInner {
                context,
                auth,
                cache: RequestCache::default(),
                grants: GrantStore::new(),
            }),
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.inner.context
    }

    pub fn grants(&self) -> &GrantStore {
        &self.inner.grants
    }

    pub fn settings(&self) -> &ScopeAuthSettings<Ctx> {
        &self.inner.auth.settings
    }

    pub(crate) fn cache(&self) -> &RequestCache {
        &self.inner.cache
    }

    /// The loader set of this operation. The initializer runs on first use,
    /// later calls (and concurrent ones) share its result, failures included.
    pub fn loader_set(&self) -> Check<LoaderSetResult> {
        let auth = &self.inner.auth;
        let context = self.inner.context.clone();
        self.inner
            .cache
            .loader_set(|| auth.initializer.init(context))
    }

    /// Evaluates `map` with the configured default strategy. `path` is where
    /// `$granted` entries look for grants, `None` meaning the operation root.
    pub fn evaluate(&self, map: &Arc<ScopeMap>, path: Option<&ResponsePath>) -> Check<ScopeResult> {
        self.evaluate_with(map, self.settings().default_strategy, path)
    }

    pub fn evaluate_with(
        &self,
        map: &Arc<ScopeMap>,
        strategy: AuthStrategy,
        path: Option<&ResponsePath>,
    ) -> Check<ScopeResult> {
        let scope = self.clone();
        let map = map.clone();
        let path = path.cloned();

        self.loader_set().and_then_ok(move |loaders| {
            scope
                .evaluator(&loaders, path.as_ref())
                .evaluate(&map, strategy)
        })
    }

    pub(crate) fn evaluator<'a>(
        &'a self,
        loaders: &'a ScopeLoaderSet,
        path: Option<&'a ResponsePath>,
    ) -> Evaluator<'a> {
        Evaluator {
            cache: &self.inner.cache,
            grants: &self.inner.grants,
            loaders,
            treat_errors_as_unauthorized: self.settings().treat_errors_as_unauthorized,
            path,
        }
    }

    /// Checks `map` outside of a field pipeline, for example from inside a
    /// resolver. Fails with a forbidden error carrying the failure.
    pub fn run_auth_scopes(&self, map: &Arc<ScopeMap>) -> Check<Result<(), ScopeAuthError>> {
        self.run_auth_scopes_with(map, |_| UnauthorizedError::from(DEFAULT_UNAUTHORIZED_MESSAGE))
    }

    /// Like [`RequestScope::run_auth_scopes`], with the error built by
    /// `on_unauthorized`.
    pub fn run_auth_scopes_with<F>(
        &self,
        map: &Arc<ScopeMap>,
        on_unauthorized: F,
    ) -> Check<Result<(), ScopeAuthError>>
    where
        F: FnOnce(&AuthFailure) -> UnauthorizedError + Send + 'static,
    {
        self.evaluate(map, None).map(move |result| match result? {
            Decision::Authorized => Ok(()),
            Decision::Unauthorized(failure) => {
                Err(on_unauthorized(&failure).into_scope_auth_error(failure))
            }
        })
    }
}
