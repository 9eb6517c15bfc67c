//! Core types for Courier

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// API Payloads
// ============================================================================

/// Paginated list envelope returned by list endpoints
///
/// `count` is the server-side total and is not compared against the
/// length of `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultList<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// A domain entity with a stable string identity
pub trait ModelInstance: Clone {
    fn id(&self) -> &str;

    /// Combine a list update with the entry already known for the same id
    ///
    /// Fields of `self` win. The default replaces the entry wholesale,
    /// which is the shallow merge for types without optional fields.
    fn merged_onto(&self, _existing: &Self) -> Self {
        self.clone()
    }
}

/// Schemaless entity: an id plus arbitrary JSON fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl ModelInstance for Record {
    fn id(&self) -> &str {
        &self.id
    }

    fn merged_onto(&self, existing: &Self) -> Self {
        let mut fields = existing.fields.clone();
        for (name, value) in &self.fields {
            fields.insert(name.clone(), value.clone());
        }
        Self {
            id: self.id.clone(),
            fields,
        }
    }
}

// ============================================================================
// Reducer State
// ============================================================================

/// Progress of a single API call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallState {
    pub requesting: bool,
    pub error: Option<String>,
}

impl ApiCallState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn requesting() -> Self {
        Self {
            requesting: true,
            error: None,
        }
    }

    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            requesting: false,
            error: Some(code.into()),
        }
    }
}

/// Per-id call progress for calls that differ only by target entity
///
/// Cloning is cheap and shares the underlying map; an unchanged state
/// handed back by a reducer is the same allocation (see [`Self::same_as`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelApiCallState(Arc<BTreeMap<String, ApiCallState>>);

impl ModelApiCallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ApiCallState> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ApiCallState)> {
        self.0.iter()
    }

    /// True when both values share the same allocation
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn to_map(&self) -> BTreeMap<String, ApiCallState> {
        (*self.0).clone()
    }
}

impl From<BTreeMap<String, ApiCallState>> for ModelApiCallState {
    fn from(map: BTreeMap<String, ApiCallState>) -> Self {
        Self(Arc::new(map))
    }
}

/// Id-indexed collection of the latest known entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelDataState<T>(Arc<BTreeMap<String, T>>);

impl<T> Default for ModelDataState<T> {
    fn default() -> Self {
        Self(Arc::new(BTreeMap::new()))
    }
}

impl<T: Clone> ModelDataState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.values()
    }

    /// True when both values share the same allocation
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn to_map(&self) -> BTreeMap<String, T> {
        (*self.0).clone()
    }
}

impl<T> From<BTreeMap<String, T>> for ModelDataState<T> {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self(Arc::new(map))
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Code and message carried by an error signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalError {
    pub code: String,
    pub message: String,
}

impl From<&crate::error::ApiError> for SignalError {
    fn from(error: &crate::error::ApiError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.message().to_string(),
        }
    }
}

/// A discrete event on the state-transition stream
///
/// Reducers are configured with values of `Kind` and compare them by
/// equality. The accessors expose the optional payload parts a reducer
/// needs; a signal without the part a reducer expects is ignored.
pub trait Signal {
    type Kind: PartialEq;

    fn kind(&self) -> &Self::Kind;

    fn instance_id(&self) -> Option<&str> {
        None
    }

    fn error(&self) -> Option<&SignalError> {
        None
    }
}

/// A signal that may carry entity data for a model-data reducer
pub trait ModelSignal<T: ModelInstance>: Signal {
    fn instance(&self) -> Option<&T> {
        None
    }

    fn result_list(&self) -> Option<&ResultList<T>> {
        None
    }

    /// Empty the collection before applying `result_list`
    fn clear(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum Payload<T> {
    Empty,
    Error(SignalError),
    Instance { data: T },
    List { data: ResultList<T>, clear: bool },
}

/// General purpose signal: a kind, an optional target id and a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<K, T = Record> {
    pub kind: K,
    pub id: Option<String>,
    #[serde(flatten)]
    pub payload: Payload<T>,
}

impl<K, T: ModelInstance> Action<K, T> {
    pub fn new(kind: K) -> Self {
        Self {
            kind,
            id: None,
            payload: Payload::Empty,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.payload = Payload::Error(SignalError {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn instance(kind: K, data: T) -> Self {
        Self {
            kind,
            id: Some(data.id().to_string()),
            payload: Payload::Instance { data },
        }
    }

    pub fn list(kind: K, data: ResultList<T>, clear: bool) -> Self {
        Self {
            kind,
            id: None,
            payload: Payload::List { data, clear },
        }
    }
}

impl<K: PartialEq, T> Signal for Action<K, T> {
    type Kind = K;

    fn kind(&self) -> &K {
        &self.kind
    }

    fn instance_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn error(&self) -> Option<&SignalError> {
        match &self.payload {
            Payload::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<K: PartialEq, T: ModelInstance> ModelSignal<T> for Action<K, T> {
    fn instance(&self) -> Option<&T> {
        match &self.payload {
            Payload::Instance { data } => Some(data),
            _ => None,
        }
    }

    fn result_list(&self) -> Option<&ResultList<T>> {
        match &self.payload {
            Payload::List { data, .. } => Some(data),
            _ => None,
        }
    }

    fn clear(&self) -> bool {
        matches!(self.payload, Payload::List { clear: true, .. })
    }
}
