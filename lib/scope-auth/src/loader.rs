use std::{fmt, future::Future, sync::Arc};

use ahash::HashMap;

use crate::{check::Check, error::BoxError, expression::ScopeArg};

pub type PredicateResult = Result<bool, BoxError>;

pub(crate) type PredicateFn = dyn Fn(&ScopeArg) -> Check<PredicateResult> + Send + Sync;

/// A single entry of the per-request scope table.
///
/// Whether an entry is a constant or a predicate is decided once, when the
/// loader set is built, so evaluation never has to inspect it again.
#[derive(Clone)]
pub enum ScopeLoader {
    Constant(bool),
    Predicate(Arc<PredicateFn>),
}

impl ScopeLoader {
    /// A predicate that answers synchronously.
    pub fn sync<F>(predicate: F) -> Self
    where
        F: Fn(&ScopeArg) -> PredicateResult + Send + Sync + 'static,
    {
        ScopeLoader::Predicate(Arc::new(move |arg| Check::Ready(predicate(arg))))
    }

    /// A predicate that answers with a future, for permission lookups and other IO.
    pub fn future<F, Fut>(predicate: F) -> Self
    where
        F: Fn(&ScopeArg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PredicateResult> + Send + 'static,
    {
        ScopeLoader::Predicate(Arc::new(move |arg| Check::pending(predicate(arg))))
    }

    /// A predicate that decides per call whether it can answer synchronously.
    pub fn check<F>(predicate: F) -> Self
    where
        F: Fn(&ScopeArg) -> Check<PredicateResult> + Send + Sync + 'static,
    {
        ScopeLoader::Predicate(Arc::new(predicate))
    }
}

impl From<bool> for ScopeLoader {
    fn from(value: bool) -> Self {
        ScopeLoader::Constant(value)
    }
}

impl fmt::Debug for ScopeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeLoader::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            ScopeLoader::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

/// The table mapping scope names to loaders, built once per request by the
/// [`ScopeInitializer`].
#[derive(Clone, Default, Debug)]
pub struct ScopeLoaderSet {
    loaders: HashMap<String, ScopeLoader>,
}

impl ScopeLoaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, loader: impl Into<ScopeLoader>) -> Self {
        self.insert(name, loader);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, loader: impl Into<ScopeLoader>) {
        self.loaders.insert(name.into(), loader.into());
    }

    pub fn get(&self, name: &str) -> Option<&ScopeLoader> {
        self.loaders.get(name)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ScopeLoader)> for ScopeLoaderSet {
    fn from_iter<I: IntoIterator<Item = (K, ScopeLoader)>>(iter: I) -> Self {
        Self {
            loaders: iter
                .into_iter()
                .map(|(name, loader)| (name.into(), loader))
                .collect(),
        }
    }
}

pub type InitializerResult = Result<ScopeLoaderSet, BoxError>;

type InitializerFn<Ctx> = dyn Fn(Arc<Ctx>) -> Check<InitializerResult> + Send + Sync;

/// Builds the [`ScopeLoaderSet`] of a request from its context. Runs at most
/// once per request.
pub struct ScopeInitializer<Ctx> {
    init: Arc<InitializerFn<Ctx>>,
}

impl<Ctx> Clone for ScopeInitializer<Ctx> {
    fn clone(&self) -> Self {
        Self {
            init: self.init.clone(),
        }
    }
}

impl<Ctx: Send + Sync + 'static> ScopeInitializer<Ctx> {
    pub fn sync<F>(init: F) -> Self
    where
        F: Fn(&Ctx) -> InitializerResult + Send + Sync + 'static,
    {
        Self {
            init: Arc::new(move |ctx: Arc<Ctx>| Check::Ready(init(&ctx))),
        }
    }

    pub fn future<F, Fut>(init: F) -> Self
    where
        F: Fn(Arc<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InitializerResult> + Send + 'static,
    {
        Self {
            init: Arc::new(move |ctx| Check::pending(init(ctx))),
        }
    }

    pub(crate) fn init(&self, ctx: Arc<Ctx>) -> Check<InitializerResult> {
        (self.init)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn loaders_keep_their_shape() {
        let set = ScopeLoaderSet::new()
            .with("admin", true)
            .with("banned", false)
            .with(
                "member",
                ScopeLoader::sync(|arg| Ok(arg == &json!("team-1"))),
            )
            .with(
                "remote",
                ScopeLoader::future(|arg| {
                    let arg = arg.clone();
                    async move { Ok(arg.as_bool().unwrap_or_default()) }
                }),
            );

        assert_eq!(set.len(), 4);
        assert!(matches!(set.get("admin"), Some(ScopeLoader::Constant(true))));
        assert!(matches!(set.get("banned"), Some(ScopeLoader::Constant(false))));
        assert!(set.get("missing").is_none());

        let Some(ScopeLoader::Predicate(member)) = set.get("member") else {
            panic!("expected a predicate");
        };
        let check = member(&json!("team-1"));
        assert!(check.is_ready());
        assert!(check.await.unwrap());

        let Some(ScopeLoader::Predicate(remote)) = set.get("remote") else {
            panic!("expected a predicate");
        };
        let check = remote(&json!(true));
        assert!(!check.is_ready());
        assert!(check.await.unwrap());
    }

    #[tokio::test]
    async fn initializer_receives_the_context() {
        struct Ctx {
            admin: bool,
        }

        let initializer =
            ScopeInitializer::sync(|ctx: &Ctx| Ok(ScopeLoaderSet::new().with("admin", ctx.admin)));
        let set = initializer
            .init(Arc::new(Ctx { admin: true }))
            .await
            .unwrap();

        assert!(matches!(set.get("admin"), Some(ScopeLoader::Constant(true))));
    }
}
