pub mod auth;
mod cache;
pub mod check;
pub mod error;
mod evaluator;
pub mod expression;
pub mod failure;
pub mod grants;
pub mod loader;
pub mod logging;
pub mod path;
pub mod pipeline;
pub mod request;
pub mod response;

pub use auth::{ScopeAuth, ScopeAuthBuilder, ScopeAuthSettings};
pub use check::Check;
pub use error::{BoxError, ScopeAuthError, ScopeError, UnauthorizedError};
pub use expression::{ScopeArg, ScopeEntry, ScopeMap};
pub use failure::{AuthFailure, Decision, ScopeResult};
pub use loader::{ScopeInitializer, ScopeLoader, ScopeLoaderSet};
pub use path::{PathKey, ResponsePath};
pub use request::RequestScope;
pub use response::{GraphQLError, ResponseCollector};
pub use scope_auth_config::{AuthStrategy, ScopeAuthConfig};
