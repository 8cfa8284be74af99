use std::sync::Arc;

use serde_json::{Map, Value};

/// The argument handed to a scope predicate. Two leaves share a cached result
/// when their scope names are equal and their arguments are equal as JSON.
pub type ScopeArg = Value;

pub const ALL_KEY: &str = "$all";
pub const ANY_KEY: &str = "$any";
pub const GRANTED_KEY: &str = "$granted";

#[derive(Debug, Clone)]
pub enum ScopeEntry {
    /// Run the named scope with an argument.
    Scope { name: Arc<str>, arg: ScopeArg },
    /// Every entry of the nested map has to pass.
    All(Arc<ScopeMap>),
    /// At least one entry of the nested map has to pass.
    Any(Arc<ScopeMap>),
    /// Every name has to be granted by an ancestor in the response tree.
    Granted(Vec<String>),
}

impl ScopeEntry {
    fn is_cacheable(&self) -> bool {
        match self {
            ScopeEntry::Scope { .. } => true,
            ScopeEntry::All(map) | ScopeEntry::Any(map) => map.is_cacheable(),
            ScopeEntry::Granted(_) => false,
        }
    }
}

/// An immutable scope expression: a list of entries combined by the strategy the
/// map is evaluated with (the configured default at the top level, or the
/// `$all` / `$any` wrapper it sits in).
///
/// Maps are shared as `Arc<ScopeMap>` and whole-map results are memoized per
/// `Arc` instance, so a map built once and reused by many resolvers is
/// evaluated once per request.
#[derive(Debug)]
pub struct ScopeMap {
    entries: Vec<ScopeEntry>,
    cacheable: bool,
}

impl ScopeMap {
    pub fn builder() -> ScopeMapBuilder {
        ScopeMapBuilder::default()
    }

    pub fn new(entries: Vec<ScopeEntry>) -> Arc<Self> {
        let cacheable = entries.iter().all(ScopeEntry::is_cacheable);
        Arc::new(Self { entries, cacheable })
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `false` when the map, or any map nested in it, uses `$granted`: its
    /// result then depends on where in the response it is evaluated.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Parses the JSON object shape of a scope map:
    ///
    /// ```json
    /// { "admin": true, "$any": { "member": "team-1" }, "$granted": ["readPost"] }
    /// ```
    ///
    /// `$granted` accepts a single name or a list of names.
    pub fn from_json(value: &Value) -> Result<Arc<Self>, ScopeMapParseError> {
        match value {
            Value::Object(object) => Self::from_json_object(object),
            other => Err(ScopeMapParseError::NotAnObject(other.to_string())),
        }
    }

    fn from_json_object(object: &Map<String, Value>) -> Result<Arc<Self>, ScopeMapParseError> {
        let mut builder = ScopeMap::builder();
        for (key, value) in object {
            builder = match key.as_str() {
                ALL_KEY => builder.all(Self::from_json(value)?),
                ANY_KEY => builder.any(Self::from_json(value)?),
                GRANTED_KEY => builder.granted(parse_granted(value)?),
                name => builder.scope(name, value.clone()),
            };
        }
        Ok(builder.build())
    }
}

fn parse_granted(value: &Value) -> Result<Vec<String>, ScopeMapParseError> {
    match value {
        Value::String(name) => Ok(vec![name.clone()]),
        Value::Array(names) => names
            .iter()
            .map(|name| match name {
                Value::String(name) => Ok(name.clone()),
                other => Err(ScopeMapParseError::InvalidGranted(other.to_string())),
            })
            .collect(),
        other => Err(ScopeMapParseError::InvalidGranted(other.to_string())),
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScopeMapParseError {
    #[error("Expected a scope map object, got: {0}")]
    NotAnObject(String),
    #[error("Expected $granted to be a string or a list of strings, got: {0}")]
    InvalidGranted(String),
}

#[derive(Debug, Default)]
pub struct ScopeMapBuilder {
    entries: Vec<ScopeEntry>,
}

impl ScopeMapBuilder {
    pub fn scope(mut self, name: &str, arg: impl Into<ScopeArg>) -> Self {
        self.entries.push(ScopeEntry::Scope {
            name: Arc::from(name),
            arg: arg.into(),
        });
        self
    }

    pub fn all(mut self, map: Arc<ScopeMap>) -> Self {
        self.entries.push(ScopeEntry::All(map));
        self
    }

    pub fn any(mut self, map: Arc<ScopeMap>) -> Self {
        self.entries.push(ScopeEntry::Any(map));
        self
    }

    pub fn granted<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(ScopeEntry::Granted(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn build(self) -> Arc<ScopeMap> {
        ScopeMap::new(self.entries)
    }
}
