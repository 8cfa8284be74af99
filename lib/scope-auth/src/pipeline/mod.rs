mod config;
mod field;
mod steps;
mod type_check;

use std::sync::Arc;

use serde_json::Value;

use crate::path::ResponsePath;

pub use config::{
    FieldAuthConfig, FieldGrants, FieldScopes, ScopeRule, TypeAuthConfig, TypeGrants, TypeScopes,
};
pub use field::FieldPipeline;
pub use steps::ResolveStep;
pub use type_check::TypeCheckPipeline;

/// What the executor knows about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    pub parent_type: Arc<str>,
    pub field_name: Arc<str>,
    pub path: ResponsePath,
}

impl ResolveInfo {
    pub fn new(parent_type: &str, field_name: &str, path: ResponsePath) -> Self {
        Self {
            parent_type: Arc::from(parent_type),
            field_name: Arc::from(field_name),
            path,
        }
    }
}

/// A single call of a field resolver: the object it is resolved on, the
/// field arguments and where it sits in the response.
///
/// `parent` is shared so that the same object reached through several fields
/// is recognized as such by the type authorization cache.
#[derive(Debug)]
pub struct FieldInvocation<P> {
    pub parent: Arc<P>,
    pub args: Value,
    pub info: ResolveInfo,
}

impl<P> FieldInvocation<P> {
    pub fn new(parent: Arc<P>, args: Value, info: ResolveInfo) -> Self {
        Self { parent, args, info }
    }
}
