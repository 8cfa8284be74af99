use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::{
    auth::UnauthorizedErrorFn,
    check::Check,
    error::{BoxError, UnauthorizedError},
    expression::ScopeMap,
    failure::AuthFailure,
    pipeline::ResolveInfo,
};

/// What a scope function decides for one object or one field call.
#[derive(Debug, Clone)]
pub enum ScopeRule {
    Allow,
    Deny,
    Map(Arc<ScopeMap>),
}

impl From<bool> for ScopeRule {
    fn from(allow: bool) -> Self {
        if allow {
            ScopeRule::Allow
        } else {
            ScopeRule::Deny
        }
    }
}

impl From<Arc<ScopeMap>> for ScopeRule {
    fn from(map: Arc<ScopeMap>) -> Self {
        ScopeRule::Map(map)
    }
}

pub(crate) type RuleResult = Result<ScopeRule, BoxError>;

type FieldScopeFn<P, Ctx> =
    dyn Fn(&P, &Value, &Ctx, &ResolveInfo) -> Check<RuleResult> + Send + Sync;
type FieldGrantFn<P, Ctx> =
    dyn Fn(&P, &Value, &Ctx, &ResolveInfo) -> Check<Vec<String>> + Send + Sync;
type TypeScopeFn<P, Ctx> = dyn Fn(&P, &Ctx) -> Check<RuleResult> + Send + Sync;
type TypeGrantFn<P, Ctx> = dyn Fn(&P, &Ctx) -> Check<Vec<String>> + Send + Sync;
type UnauthorizedResolverFn<P, Ctx, T> =
    dyn Fn(&P, &Value, &Ctx, &ResolveInfo, &AuthFailure) -> T + Send + Sync;

/// The `auth_scopes` of a field: a fixed map, or a function of the call.
pub enum FieldScopes<P, Ctx> {
    Map(Arc<ScopeMap>),
    Function(Arc<FieldScopeFn<P, Ctx>>),
}

impl<P, Ctx> FieldScopes<P, Ctx> {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&P, &Value, &Ctx, &ResolveInfo) -> RuleResult + Send + Sync + 'static,
    {
        FieldScopes::Function(Arc::new(move |parent, args, ctx, info| {
            Check::Ready(f(parent, args, ctx, info))
        }))
    }

    pub fn check<F>(f: F) -> Self
    where
        F: Fn(&P, &Value, &Ctx, &ResolveInfo) -> Check<RuleResult> + Send + Sync + 'static,
    {
        FieldScopes::Function(Arc::new(f))
    }
}

impl<P, Ctx> Clone for FieldScopes<P, Ctx> {
    fn clone(&self) -> Self {
        match self {
            FieldScopes::Map(map) => FieldScopes::Map(map.clone()),
            FieldScopes::Function(f) => FieldScopes::Function(f.clone()),
        }
    }
}

impl<P, Ctx> From<Arc<ScopeMap>> for FieldScopes<P, Ctx> {
    fn from(map: Arc<ScopeMap>) -> Self {
        FieldScopes::Map(map)
    }
}

/// The `grant_scopes` of a field, granted to everything below it.
pub enum FieldGrants<P, Ctx> {
    Names(Vec<String>),
    Function(Arc<FieldGrantFn<P, Ctx>>),
}

impl<P, Ctx> FieldGrants<P, Ctx> {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldGrants::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&P, &Value, &Ctx, &ResolveInfo) -> Vec<String> + Send + Sync + 'static,
    {
        FieldGrants::Function(Arc::new(move |parent, args, ctx, info| {
            Check::Ready(f(parent, args, ctx, info))
        }))
    }

    pub fn check<F>(f: F) -> Self
    where
        F: Fn(&P, &Value, &Ctx, &ResolveInfo) -> Check<Vec<String>> + Send + Sync + 'static,
    {
        FieldGrants::Function(Arc::new(f))
    }
}

impl<P, Ctx> Clone for FieldGrants<P, Ctx> {
    fn clone(&self) -> Self {
        match self {
            FieldGrants::Names(names) => FieldGrants::Names(names.clone()),
            FieldGrants::Function(f) => FieldGrants::Function(f.clone()),
        }
    }
}

/// The `auth_scopes` of an object type or an interface.
pub enum TypeScopes<P, Ctx> {
    Map(Arc<ScopeMap>),
    Function(Arc<TypeScopeFn<P, Ctx>>),
}

impl<P, Ctx> TypeScopes<P, Ctx> {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&P, &Ctx) -> RuleResult + Send + Sync + 'static,
    {
        TypeScopes::Function(Arc::new(move |parent, ctx| Check::Ready(f(parent, ctx))))
    }

    pub fn check<F>(f: F) -> Self
    where
        F: Fn(&P, &Ctx) -> Check<RuleResult> + Send + Sync + 'static,
    {
        TypeScopes::Function(Arc::new(f))
    }
}

impl<P, Ctx> From<Arc<ScopeMap>> for TypeScopes<P, Ctx> {
    fn from(map: Arc<ScopeMap>) -> Self {
        TypeScopes::Map(map)
    }
}

/// The `grant_scopes` of an object type, granted to the fields of each object.
pub enum TypeGrants<P, Ctx> {
    Names(Vec<String>),
    Function(Arc<TypeGrantFn<P, Ctx>>),
}

impl<P, Ctx> TypeGrants<P, Ctx> {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeGrants::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&P, &Ctx) -> Vec<String> + Send + Sync + 'static,
    {
        TypeGrants::Function(Arc::new(move |parent, ctx| Check::Ready(f(parent, ctx))))
    }
}

pub struct TypeAuthConfig<P, Ctx> {
    pub name: Arc<str>,
    pub auth_scopes: Option<TypeScopes<P, Ctx>>,
    pub grant_scopes: Option<TypeGrants<P, Ctx>>,
    /// Interfaces whose `auth_scopes` run before the type's own.
    pub interfaces: Vec<Arc<TypeAuthConfig<P, Ctx>>>,
    /// Check the type once in `is_type_of` instead of before each of its fields.
    pub run_scopes_on_type: bool,
}

impl<P, Ctx> TypeAuthConfig<P, Ctx> {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            auth_scopes: None,
            grant_scopes: None,
            interfaces: Vec::new(),
            run_scopes_on_type: false,
        }
    }

    pub fn auth_scopes(mut self, scopes: impl Into<TypeScopes<P, Ctx>>) -> Self {
        self.auth_scopes = Some(scopes.into());
        self
    }

    pub fn grant_scopes(mut self, grants: TypeGrants<P, Ctx>) -> Self {
        self.grant_scopes = Some(grants);
        self
    }

    pub fn interface(mut self, interface: Arc<TypeAuthConfig<P, Ctx>>) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn run_scopes_on_type(mut self, enabled: bool) -> Self {
        self.run_scopes_on_type = enabled;
        self
    }
}

impl<P, Ctx> fmt::Debug for TypeAuthConfig<P, Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAuthConfig")
            .field("name", &self.name)
            .field("auth_scopes", &self.auth_scopes.is_some())
            .field("grant_scopes", &self.grant_scopes.is_some())
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| &i.name).collect::<Vec<_>>(),
            )
            .field("run_scopes_on_type", &self.run_scopes_on_type)
            .finish()
    }
}

pub struct FieldAuthConfig<P, Ctx, T> {
    pub auth_scopes: Option<FieldScopes<P, Ctx>>,
    pub grant_scopes: Option<FieldGrants<P, Ctx>>,
    pub skip_type_scopes: bool,
    pub skip_interface_scopes: bool,
    /// Resolves a denied field to a fallback value instead of an error.
    pub unauthorized_resolver: Option<Arc<UnauthorizedResolverFn<P, Ctx, T>>>,
    pub unauthorized_error: Option<Arc<UnauthorizedErrorFn<Ctx>>>,
}

impl<P, Ctx, T> Default for FieldAuthConfig<P, Ctx, T> {
    fn default() -> Self {
        Self {
            auth_scopes: None,
            grant_scopes: None,
            skip_type_scopes: false,
            skip_interface_scopes: false,
            unauthorized_resolver: None,
            unauthorized_error: None,
        }
    }
}

impl<P, Ctx, T> FieldAuthConfig<P, Ctx, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_scopes(mut self, scopes: impl Into<FieldScopes<P, Ctx>>) -> Self {
        self.auth_scopes = Some(scopes.into());
        self
    }

    pub fn grant_scopes(mut self, grants: FieldGrants<P, Ctx>) -> Self {
        self.grant_scopes = Some(grants);
        self
    }

    pub fn skip_type_scopes(mut self, skip: bool) -> Self {
        self.skip_type_scopes = skip;
        self
    }

    pub fn skip_interface_scopes(mut self, skip: bool) -> Self {
        self.skip_interface_scopes = skip;
        self
    }

    pub fn unauthorized_resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&P, &Value, &Ctx, &ResolveInfo, &AuthFailure) -> T + Send + Sync + 'static,
    {
        self.unauthorized_resolver = Some(Arc::new(f));
        self
    }

    pub fn unauthorized_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Ctx, &ResolveInfo, &AuthFailure) -> UnauthorizedError + Send + Sync + 'static,
    {
        self.unauthorized_error = Some(Arc::new(f));
        self
    }
}
