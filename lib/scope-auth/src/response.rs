use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::ScopeAuthError,
    path::{PathKey, ResponsePath},
};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl From<String> for GraphQLError {
    fn from(message: String) -> Self {
        GraphQLError {
            message,
            path: None,
            extensions: None,
        }
    }
}

impl GraphQLError {
    pub fn from_message_and_code(message: impl Into<String>, code: &str) -> Self {
        GraphQLError::from(message.into()).with_extension("code", code)
    }

    pub fn with_path(mut self, path: &ResponsePath) -> Self {
        self.path = Some(path.keys());
        self
    }

    /// Adds an extension entry. A value that fails to serialize is left out.
    pub fn with_extension(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.extensions
                    .get_or_insert_with(Map::new)
                    .insert(key.to_string(), value);
            }
            Err(err) => debug!(key, error = %err, "skipped unserializable error extension"),
        }
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

/// Gathers the errors of fields resolved concurrently. A failing field becomes
/// `None` and one error entry, its siblings are unaffected.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    errors: Mutex<Vec<GraphQLError>>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn field<T, F>(&self, path: &ResponsePath, resolve: F) -> Option<T>
    where
        F: Future<Output = Result<T, ScopeAuthError>>,
    {
        match resolve.await {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %path, error = %err, "field resolved to null");
                self.errors.lock().await.push(err.to_graphql_error(path));
                None
            }
        }
    }

    pub fn into_errors(self) -> Vec<GraphQLError> {
        self.errors.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::failure::AuthFailure;

    #[test]
    fn forbidden_errors_carry_code_path_and_failure() {
        let path = ResponsePath::root("posts").child(0).child("author");
        let err = ScopeAuthError::forbidden(
            "Not authorized to resolve Post.author",
            AuthFailure::GrantedScope {
                scope: "readAuthor".to_string(),
            },
        );

        let error = err.to_graphql_error(&path);
        assert_eq!(error.code(), Some("FORBIDDEN"));
        insta::assert_snapshot!(serde_json::to_string_pretty(&error).unwrap(), @r#"
        {
          "message": "Not authorized to resolve Post.author",
          "path": [
            "posts",
            0,
            "author"
          ],
          "extensions": {
            "code": "FORBIDDEN",
            "failure": {
              "kind": "GrantedScope",
              "scope": "readAuthor"
            }
          }
        }
        "#);
    }

    #[test]
    fn deserializes_what_it_serializes() {
        let error: GraphQLError = serde_json::from_value(json!({
            "message": "boom",
            "path": ["viewer", 1],
            "extensions": { "code": "INTERNAL_SERVER_ERROR" }
        }))
        .unwrap();

        assert_eq!(error.path, Some(vec![PathKey::from("viewer"), PathKey::Index(1)]));
        assert_eq!(error.code(), Some("INTERNAL_SERVER_ERROR"));
    }

    #[tokio::test]
    async fn failing_fields_do_not_affect_siblings() {
        let collector = ResponseCollector::new();
        let ok = ResponsePath::root("ok");
        let denied = ResponsePath::root("denied");

        let (a, b) = futures::join!(
            collector.field(&ok, async { Ok::<_, ScopeAuthError>(1) }),
            collector.field(&denied, async {
                Err::<i32, _>(ScopeAuthError::forbidden("no", AuthFailure::FieldAuthScopeFunction))
            }),
        );

        assert_eq!(a, Some(1));
        assert_eq!(b, None);
        let errors = collector.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, Some(vec![PathKey::from("denied")]));
    }
}
