use std::{fmt, sync::Arc};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// One segment of a response path. Serializes the way GraphQL error paths do:
/// field names as strings, list indices as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Field(Arc<str>),
    Index(usize),
}

impl Serialize for PathKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathKey::Field(name) => serializer.serialize_str(name),
            PathKey::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl<'de> Deserialize<'de> for PathKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PathKeyVisitor;

        impl<'de> de::Visitor<'de> for PathKeyVisitor {
            type Value = PathKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a field name or a list index")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(PathKey::from(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(PathKey::Index)
                    .map_err(|_| E::custom(format!("list index {} is out of range", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value).map(PathKey::Index).map_err(|_| {
                    E::custom(format!(
                        "list index must be a non-negative integer, got {}",
                        value
                    ))
                })
            }
        }

        deserializer.deserialize_any(PathKeyVisitor)
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Field(Arc::from(name))
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Field(name) => f.write_str(name),
            PathKey::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug)]
struct PathNode {
    key: PathKey,
    parent: Option<ResponsePath>,
    /// Dot-separated keys from the root down to this node, e.g. `posts.0.author`.
    rendered: Box<str>,
}

/// The position of a field in the response: an immutable chain of keys from the
/// operation root, shared between a field and all of its descendants.
#[derive(Debug, Clone)]
pub struct ResponsePath(Arc<PathNode>);

impl ResponsePath {
    pub fn root(key: impl Into<PathKey>) -> Self {
        let key = key.into();
        let rendered = key.to_string().into_boxed_str();
        Self(Arc::new(PathNode {
            key,
            parent: None,
            rendered,
        }))
    }

    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let key = key.into();
        let rendered = format!("{}.{}", self.0.rendered, key).into_boxed_str();
        Self(Arc::new(PathNode {
            key,
            parent: Some(self.clone()),
            rendered,
        }))
    }

    /// Builds a path from its keys, root first. Returns `None` for no keys.
    pub fn from_keys<I, K>(keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<PathKey>,
    {
        let mut path: Option<ResponsePath> = None;
        for key in keys {
            path = Some(match path {
                None => ResponsePath::root(key),
                Some(parent) => parent.child(key),
            });
        }
        path
    }

    pub fn key(&self) -> &PathKey {
        &self.0.key
    }

    pub fn parent(&self) -> Option<&ResponsePath> {
        self.0.parent.as_ref()
    }

    pub fn as_str(&self) -> &str {
        &self.0.rendered
    }

    /// This path followed by each of its ancestors, up to the root field.
    pub fn ancestors(&self) -> impl Iterator<Item = &ResponsePath> {
        std::iter::successors(Some(self), |path| path.parent())
    }

    /// Keys from the root down to this path.
    pub fn keys(&self) -> Vec<PathKey> {
        let mut keys = self
            .ancestors()
            .map(|path| path.key().clone())
            .collect::<Vec<_>>();
        keys.reverse();
        keys
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_keys_and_indices() {
        let path = ResponsePath::root("posts").child(0).child("author");
        assert_eq!(path.as_str(), "posts.0.author");
        assert_eq!(
            path.keys(),
            vec![PathKey::from("posts"), PathKey::Index(0), PathKey::from("author")]
        );
    }

    #[test]
    fn walks_ancestors_from_the_leaf() {
        let path = ResponsePath::from_keys(["a", "b", "c"]).unwrap();
        let rendered = path.ancestors().map(|p| p.as_str()).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["a.b.c", "a.b", "a"]);
        assert!(ResponsePath::from_keys(Vec::<PathKey>::new()).is_none());
    }

    #[test]
    fn keys_deserialize_from_names_and_indices() {
        let keys: Vec<PathKey> = serde_json::from_str(r#"["posts", 2, "title"]"#).unwrap();
        assert_eq!(keys, ResponsePath::from_keys(keys.clone()).unwrap().keys());
        assert_eq!(keys[1], PathKey::Index(2));
        assert!(serde_json::from_str::<PathKey>("-1").is_err());
    }

    #[test]
    fn keys_serialize_as_names_and_indices() {
        let path = ResponsePath::root("posts").child(0).child("author");
        let json = serde_json::to_string(&path.keys()).unwrap();
        assert_eq!(json, r#"["posts",0,"author"]"#);
    }

    #[test]
    fn siblings_share_their_parent() {
        let parent = ResponsePath::root("viewer");
        let a = parent.child("name");
        let b = parent.child("email");
        assert!(Arc::ptr_eq(&a.parent().unwrap().0, &b.parent().unwrap().0));
    }
}
