use std::{
    any::Any,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use dashmap::DashMap;
use scope_auth_config::AuthStrategy;
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    check::{Check, SharedCheck},
    error::ScopeError,
    expression::{ScopeArg, ScopeMap},
    failure::ScopeResult,
    grants::ABuildHasher,
    loader::{InitializerResult, PredicateFn, ScopeLoaderSet},
};

pub(crate) type LoaderSetResult = Result<Arc<ScopeLoaderSet>, ScopeError>;
pub(crate) type LeafResult = Result<bool, ScopeError>;

/// A write-once slot. The map lock is only held to fetch the slot, never while
/// it is being filled, so filling one slot may look up others.
type Slot<T> = Arc<OnceLock<SharedCheck<T>>>;

/// Hashes and compares an `Arc` by the address it points to, and keeps the
/// allocation alive so the address cannot be reused while it is a key.
pub(crate) struct ArcByAddr<T: ?Sized>(Arc<T>);

impl<T: ?Sized> ArcByAddr<T> {
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<T: ?Sized> PartialEq for ArcByAddr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for ArcByAddr<T> {}

impl<T: ?Sized> Hash for ArcByAddr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

#[derive(PartialEq, Eq, Hash)]
struct LeafKey {
    scope: Arc<str>,
    /// Canonical JSON text of the argument.
    arg: String,
}

#[derive(PartialEq, Eq, Hash)]
struct TypeKey {
    typename: Arc<str>,
    parent: ArcByAddr<dyn Any + Send + Sync>,
}

/// Memoized results of one operation. Every entry is written once and never
/// replaced, so concurrent first lookups of a key share a single evaluation.
#[derive(Default)]
pub(crate) struct RequestCache {
    loaders: OnceLock<SharedCheck<LoaderSetResult>>,
    leaves: DashMap<LeafKey, Slot<LeafResult>, ABuildHasher>,
    maps: DashMap<(ArcByAddr<ScopeMap>, AuthStrategy), Slot<ScopeResult>, ABuildHasher>,
    types: DashMap<TypeKey, Slot<ScopeResult>, ABuildHasher>,
}

impl RequestCache {
    pub(crate) fn loader_set<F>(&self, init: F) -> Check<LoaderSetResult>
    where
        F: FnOnce() -> Check<InitializerResult>,
    {
        self.loaders
            .get_or_init(|| {
                debug!("initializing scope loaders");
                let check = init().map(|result| {
                    result
                        .map(Arc::new)
                        .map_err(ScopeError::initializer)
                });
                launch(check).into()
            })
            .check()
    }

    /// Runs `predicate` for `(scope, arg)` unless an earlier call for an equal
    /// argument already started it, in which case that result is shared.
    pub(crate) fn evaluate_leaf(
        &self,
        scope: &Arc<str>,
        arg: &ScopeArg,
        predicate: &PredicateFn,
    ) -> Check<LeafResult> {
        let key = LeafKey {
            scope: scope.clone(),
            arg: arg.to_string(),
        };
        let slot = self.leaves.entry(key).or_default().clone();

        let mut invoked = false;
        let shared = slot.get_or_init(|| {
            invoked = true;
            let name = scope.clone();
            let check = predicate(arg)
                .map(move |result| result.map_err(|err| ScopeError::predicate(&name, err)));
            launch(check).into()
        });
        if !invoked {
            debug!(scope = %scope, %arg, "scope result reused");
        }

        shared.check()
    }

    /// Memoizes a whole map by identity. Maps whose result depends on the
    /// current path are evaluated every time.
    pub(crate) fn evaluate_map_cached<F>(
        &self,
        map: &Arc<ScopeMap>,
        mode: AuthStrategy,
        evaluate: F,
    ) -> Check<ScopeResult>
    where
        F: FnOnce() -> Check<ScopeResult>,
    {
        if !map.is_cacheable() {
            return evaluate();
        }

        let slot = self
            .maps
            .entry((ArcByAddr(map.clone()), mode))
            .or_default()
            .clone();
        slot.get_or_init(|| evaluate().into()).check()
    }

    /// Memoizes the authorization of one object as `typename`, so an object
    /// reached through several fields is checked once.
    pub(crate) fn evaluate_type_auth<F>(
        &self,
        typename: &Arc<str>,
        parent: Arc<dyn Any + Send + Sync>,
        evaluate: F,
    ) -> Check<ScopeResult>
    where
        F: FnOnce() -> Check<ScopeResult>,
    {
        let key = TypeKey {
            typename: typename.clone(),
            parent: ArcByAddr(parent),
        };
        let slot = self.types.entry(key).or_default().clone();

        let mut invoked = false;
        let shared = slot.get_or_init(|| {
            invoked = true;
            evaluate().into()
        });
        if !invoked {
            debug!(typename = %typename, "type authorization reused");
        }

        shared.check()
    }
}

/// Starts a pending check on the current tokio runtime, so it runs to
/// completion even when nobody awaits it anymore. Without a runtime the check
/// stays lazy and runs when first polled.
fn launch<T>(check: Check<Result<T, ScopeError>>) -> Check<Result<T, ScopeError>>
where
    T: Send + 'static,
{
    match check {
        Check::Pending(fut) => match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(fut);
                Check::pending(async move { task.await? })
            }
            Err(_) => Check::Pending(fut),
        },
        ready => ready,
    }
}
