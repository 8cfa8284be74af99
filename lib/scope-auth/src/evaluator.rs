use std::sync::Arc;

use futures::future::try_join_all;
use scope_auth_config::AuthStrategy;
use tracing::{debug, warn};

use crate::{
    cache::{LeafResult, RequestCache},
    check::Check,
    error::ScopeError,
    expression::{ScopeArg, ScopeEntry, ScopeMap},
    failure::{AuthFailure, Decision, ScopeResult},
    grants::GrantStore,
    loader::{PredicateFn, ScopeLoader, ScopeLoaderSet},
    path::ResponsePath,
};

/// Whether one entry of a map passed, and why not if it did not.
type Outcome = Result<(), AuthFailure>;

enum Deferred<'a> {
    Leaf {
        name: &'a Arc<str>,
        arg: &'a ScopeArg,
        predicate: &'a PredicateFn,
    },
    Map(&'a Arc<ScopeMap>, AuthStrategy),
}

/// Evaluates scope maps against the loaders of one request, at one position
/// of the response.
///
/// Everything that can be decided synchronously is decided before returning,
/// only predicates that answer with a future leave the returned [`Check`]
/// pending.
pub(crate) struct Evaluator<'a> {
    pub(crate) cache: &'a RequestCache,
    pub(crate) grants: &'a GrantStore,
    pub(crate) loaders: &'a ScopeLoaderSet,
    pub(crate) treat_errors_as_unauthorized: bool,
    /// Where `$granted` looks for grants.
    pub(crate) path: Option<&'a ResponsePath>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate(&self, map: &Arc<ScopeMap>, mode: AuthStrategy) -> Check<ScopeResult> {
        self.cache
            .evaluate_map_cached(map, mode, || self.evaluate_entries(map, mode))
    }

    fn evaluate_entries(&self, map: &ScopeMap, mode: AuthStrategy) -> Check<ScopeResult> {
        let mut failures = Vec::new();
        let mut deferred = Vec::new();

        // Constants, unknown scopes and grants decide without running anything.
        for entry in map.entries() {
            let outcome = match entry {
                ScopeEntry::Scope { name, arg } => match self.loaders.get(name) {
                    Some(ScopeLoader::Constant(true)) => Ok(()),
                    Some(ScopeLoader::Constant(false)) => Err(AuthFailure::AuthScope {
                        scope: name.to_string(),
                        arg: arg.clone(),
                        error: None,
                    }),
                    Some(ScopeLoader::Predicate(predicate)) => {
                        deferred.push(Deferred::Leaf {
                            name,
                            arg,
                            predicate: predicate.as_ref(),
                        });
                        continue;
                    }
                    None => {
                        warn!(scope = %name, "scope map references an unknown scope");
                        Err(AuthFailure::UnknownScope {
                            scope: name.to_string(),
                        })
                    }
                },
                ScopeEntry::Granted(names) => self.check_granted(names),
                ScopeEntry::All(nested) => {
                    deferred.push(Deferred::Map(nested, AuthStrategy::All));
                    continue;
                }
                ScopeEntry::Any(nested) => {
                    deferred.push(Deferred::Map(nested, AuthStrategy::Any));
                    continue;
                }
            };

            if let Some(decision) = decides(mode, outcome, &mut failures) {
                debug!(strategy = mode.as_str(), "scope map short-circuited");
                return Check::Ready(Ok(decision));
            }
        }

        let mut pending = Vec::new();
        for item in deferred {
            match self.evaluate_deferred(item) {
                Check::Ready(Err(err)) => return Check::Ready(Err(err)),
                Check::Ready(Ok(outcome)) => {
                    if let Some(decision) = decides(mode, outcome, &mut failures) {
                        debug!(strategy = mode.as_str(), "scope map short-circuited");
                        return Check::Ready(Ok(decision));
                    }
                }
                Check::Pending(fut) => pending.push(fut),
            }
        }

        if pending.is_empty() {
            return Check::Ready(Ok(combine(mode, false, failures)));
        }

        Check::pending(async move {
            let outcomes = try_join_all(pending).await?;
            let mut passed = false;
            for outcome in outcomes {
                match outcome {
                    Ok(()) => passed = true,
                    Err(failure) => failures.push(failure),
                }
            }
            Ok(combine(mode, passed, failures))
        })
    }

    fn evaluate_deferred(&self, item: Deferred<'_>) -> Check<Result<Outcome, ScopeError>> {
        match item {
            Deferred::Leaf {
                name,
                arg,
                predicate,
            } => {
                let scope = name.to_string();
                let arg_value = arg.clone();
                let treat_errors = self.treat_errors_as_unauthorized;
                self.cache
                    .evaluate_leaf(name, arg, predicate)
                    .map(move |result| leaf_outcome(scope, arg_value, result, treat_errors))
            }
            Deferred::Map(nested, mode) => self.evaluate(nested, mode).map(|result| {
                result.map(|decision| match decision {
                    Decision::Authorized => Ok(()),
                    Decision::Unauthorized(failure) => Err(failure),
                })
            }),
        }
    }

    fn check_granted(&self, names: &[String]) -> Outcome {
        match names
            .iter()
            .find(|name| !self.grants.is_granted(self.path, name))
        {
            Some(missing) => Err(AuthFailure::GrantedScope {
                scope: missing.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn leaf_outcome(
    scope: String,
    arg: ScopeArg,
    result: LeafResult,
    treat_errors_as_unauthorized: bool,
) -> Result<Outcome, ScopeError> {
    match result {
        Ok(true) => Ok(Ok(())),
        Ok(false) => Ok(Err(AuthFailure::AuthScope {
            scope,
            arg,
            error: None,
        })),
        Err(err) if treat_errors_as_unauthorized => {
            debug!(scope = %scope, error = %err, "scope error treated as unauthorized");
            Ok(Err(AuthFailure::AuthScope {
                scope,
                arg,
                error: Some(err),
            }))
        }
        Err(err) => Err(err),
    }
}

/// Returns the decision when `outcome` alone settles the map.
fn decides(
    mode: AuthStrategy,
    outcome: Outcome,
    failures: &mut Vec<AuthFailure>,
) -> Option<Decision> {
    match (mode, outcome) {
        (AuthStrategy::Any, Ok(())) => Some(Decision::Authorized),
        (AuthStrategy::All, Err(failure)) => {
            failures.push(failure);
            Some(Decision::Unauthorized(wrap(mode, std::mem::take(failures))))
        }
        (AuthStrategy::All, Ok(())) => None,
        (AuthStrategy::Any, Err(failure)) => {
            failures.push(failure);
            None
        }
    }
}

fn combine(mode: AuthStrategy, passed: bool, failures: Vec<AuthFailure>) -> Decision {
    let authorized = match mode {
        AuthStrategy::All => failures.is_empty(),
        AuthStrategy::Any => passed,
    };

    if authorized {
        Decision::Authorized
    } else {
        Decision::Unauthorized(wrap(mode, failures))
    }
}

fn wrap(mode: AuthStrategy, failures: Vec<AuthFailure>) -> AuthFailure {
    match mode {
        AuthStrategy::All => AuthFailure::AllAuthScopes { failures },
        AuthStrategy::Any => AuthFailure::AnyAuthScopes { failures },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    struct Fixture {
        cache: RequestCache,
        grants: GrantStore,
        loaders: ScopeLoaderSet,
        treat_errors_as_unauthorized: bool,
    }

    impl Fixture {
        fn new(loaders: ScopeLoaderSet) -> Self {
            Self {
                cache: RequestCache::default(),
                grants: GrantStore::new(),
                loaders,
                treat_errors_as_unauthorized: false,
            }
        }

        fn evaluator<'a>(&'a self, path: Option<&'a ResponsePath>) -> Evaluator<'a> {
            Evaluator {
                cache: &self.cache,
                grants: &self.grants,
                loaders: &self.loaders,
                treat_errors_as_unauthorized: self.treat_errors_as_unauthorized,
                path,
            }
        }

        async fn run(&self, map: &Arc<ScopeMap>, mode: AuthStrategy) -> ScopeResult {
            self.evaluator(None).evaluate(map, mode).await
        }
    }

    #[tokio::test]
    async fn empty_maps_use_the_identity_of_their_strategy() {
        let fixture = Fixture::new(ScopeLoaderSet::new());
        let empty = ScopeMap::builder().build();

        assert!(fixture.run(&empty, AuthStrategy::All).await.unwrap().is_authorized());
        let decision = fixture.run(&empty, AuthStrategy::Any).await.unwrap();
        assert!(matches!(
            decision.failure(),
            Some(AuthFailure::AnyAuthScopes { failures }) if failures.is_empty()
        ));
    }

    #[tokio::test]
    async fn constants_combine_by_strategy() {
        let fixture = Fixture::new(ScopeLoaderSet::new().with("a", true).with("b", false));
        let map = ScopeMap::builder().scope("a", true).scope("b", true).build();

        assert!(fixture.run(&map, AuthStrategy::Any).await.unwrap().is_authorized());
        let decision = fixture.run(&map, AuthStrategy::All).await.unwrap();
        insta::assert_snapshot!(decision.failure().unwrap().to_string(), @"$all[b(true)]");
    }

    #[tokio::test]
    async fn constants_are_checked_before_any_predicate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fixture = Fixture::new(
            ScopeLoaderSet::new().with("admin", false).with(
                "perm",
                ScopeLoader::sync(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }),
            ),
        );
        // The predicate comes first in the map and is still never run.
        let map = ScopeMap::builder().scope("perm", "a").scope("admin", true).build();

        let decision = fixture.run(&map, AuthStrategy::All).await.unwrap();
        assert!(!decision.is_authorized());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settled_predicates_short_circuit_pending_ones() {
        let fixture = Fixture::new(
            ScopeLoaderSet::new()
                .with("slow", ScopeLoader::future(|_| std::future::pending()))
                .with("fast", ScopeLoader::sync(|_| Ok(true))),
        );
        let map = ScopeMap::builder().scope("slow", 1).scope("fast", 2).build();

        let check = fixture.evaluator(None).evaluate(&map, AuthStrategy::Any);
        assert!(check.is_ready());
        assert!(check.await.unwrap().is_authorized());
    }

    #[tokio::test]
    async fn pending_results_are_combined_after_settling() {
        let fixture = Fixture::new(ScopeLoaderSet::new().with(
            "perm",
            ScopeLoader::future(|arg| {
                let arg = arg.clone();
                async move { Ok(arg == json!("a")) }
            }),
        ));
        let map = ScopeMap::builder()
            .scope("perm", "b")
            .any(ScopeMap::builder().scope("perm", "a").build())
            .build();

        let check = fixture.evaluator(None).evaluate(&map, AuthStrategy::Any);
        assert!(!check.is_ready());
        assert!(check.await.unwrap().is_authorized());

        let decision = fixture.run(&map, AuthStrategy::All).await.unwrap();
        insta::assert_snapshot!(decision.failure().unwrap().to_string(), @r#"$all[perm("b")]"#);
    }

    #[tokio::test]
    async fn unknown_scopes_fail_like_constants() {
        let fixture = Fixture::new(ScopeLoaderSet::new().with("a", true));
        let map = ScopeMap::builder().scope("missing", true).build();

        let decision = fixture.run(&map, AuthStrategy::All).await.unwrap();
        assert_eq!(decision.failure().unwrap().failed_scopes(), vec!["missing"]);
        assert!(matches!(
            decision.failure(),
            Some(AuthFailure::AllAuthScopes { failures })
                if matches!(failures[0], AuthFailure::UnknownScope { .. })
        ));
    }

    #[tokio::test]
    async fn granted_names_are_looked_up_at_the_current_path() {
        let fixture = Fixture::new(ScopeLoaderSet::new());
        let post = ResponsePath::root("post");
        fixture.grants.grant(Some(&post), ["readPost"]);
        let map = ScopeMap::builder().granted(["readPost"]).build();

        let below = post.child("title");
        let decision = fixture
            .evaluator(Some(&below))
            .evaluate(&map, AuthStrategy::All)
            .await
            .unwrap();
        assert!(decision.is_authorized());

        let elsewhere = ResponsePath::root("comments");
        let decision = fixture
            .evaluator(Some(&elsewhere))
            .evaluate(&map, AuthStrategy::All)
            .await
            .unwrap();
        insta::assert_snapshot!(decision.failure().unwrap().to_string(), @"$all[$granted(readPost)]");
    }

    #[tokio::test]
    async fn errors_propagate_unless_treated_as_unauthorized() {
        let loaders = ScopeLoaderSet::new()
            .with(
                "broken",
                ScopeLoader::future(|_| async { Err("lookup failed".into()) }),
            )
            .with("no", false);
        let map = ScopeMap::builder().scope("broken", true).scope("no", true).build();

        let fixture = Fixture::new(loaders.clone());
        let err = fixture.run(&map, AuthStrategy::Any).await.unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"Scope "broken" failed: lookup failed"#);

        let fixture = Fixture {
            treat_errors_as_unauthorized: true,
            ..Fixture::new(loaders)
        };
        let decision = fixture.run(&map, AuthStrategy::Any).await.unwrap();
        insta::assert_snapshot!(
            decision.failure().unwrap().to_string(),
            @r#"$any[no(true), broken(true) errored: Scope "broken" failed: lookup failed]"#
        );
    }
}
