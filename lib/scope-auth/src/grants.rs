use std::{collections::HashSet, hash::BuildHasherDefault, sync::Arc};

use ahash::AHasher;
use dashmap::DashMap;
use tracing::debug;

use crate::path::ResponsePath;

pub(crate) type ABuildHasher = BuildHasherDefault<AHasher>;

/// Key under which grants made outside of any field are stored.
const ROOT_KEY: &str = "";

/// Grants recorded while resolving one operation, indexed by the response path
/// of the field (or object) that granted them.
///
/// A grant made at `posts.0` is visible to `posts.0` and everything below it,
/// never to `posts.1` or to `viewer`.
#[derive(Debug, Default)]
pub struct GrantStore {
    grants: DashMap<Arc<str>, HashSet<String>, ABuildHasher>,
}

impl GrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `names` at `path`, `None` meaning the operation root. Repeated
    /// calls for one path add to the set rather than replacing it.
    pub fn grant<I, S>(&self, path: Option<&ResponsePath>, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key: Arc<str> = Arc::from(path.map_or(ROOT_KEY, ResponsePath::as_str));
        let mut entry = self.grants.entry(key).or_default();
        for name in names {
            let name = name.into();
            debug!(path = %entry.key(), grant = %name, "scope granted");
            entry.insert(name);
        }
    }

    /// Whether `name` was granted at `path`, at one of its ancestors or at the
    /// operation root.
    pub fn is_granted(&self, path: Option<&ResponsePath>, name: &str) -> bool {
        let granted_at = |key: &str| {
            self.grants
                .get(key)
                .is_some_and(|names| names.contains(name))
        };

        path.is_some_and(|path| path.ancestors().any(|p| granted_at(p.as_str())))
            || granted_at(ROOT_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_cascade_to_descendants_only() {
        let store = GrantStore::new();
        let parent = ResponsePath::root("parent");
        store.grant(Some(&parent), ["readPost"]);

        assert!(store.is_granted(Some(&parent), "readPost"));
        assert!(store.is_granted(Some(&parent.child("child")), "readPost"));
        assert!(store.is_granted(Some(&parent.child(3).child("title")), "readPost"));
        assert!(!store.is_granted(Some(&ResponsePath::root("other")), "readPost"));
        assert!(!store.is_granted(None, "readPost"));
        assert!(!store.is_granted(Some(&parent), "writePost"));
    }

    #[test]
    fn keys_are_compared_segment_by_segment() {
        let store = GrantStore::new();
        store.grant(Some(&ResponsePath::root("post")), ["read"]);

        assert!(!store.is_granted(Some(&ResponsePath::root("posts")), "read"));
    }

    #[test]
    fn root_grants_are_visible_everywhere() {
        let store = GrantStore::new();
        assert!(store.is_empty());
        store.grant(None, ["global"]);

        assert!(store.is_granted(None, "global"));
        assert!(store.is_granted(Some(&ResponsePath::root("a").child("b")), "global"));
    }

    #[test]
    fn repeated_grants_are_merged() {
        let store = GrantStore::new();
        let path = ResponsePath::root("viewer");
        store.grant(Some(&path), ["a"]);
        store.grant(Some(&path), ["b", "a"]);

        assert!(store.is_granted(Some(&path), "a"));
        assert!(store.is_granted(Some(&path), "b"));
    }
}
