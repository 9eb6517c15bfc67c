//! Reducers for API call progress and model data
//!
//! Each reducer is configured with the signal kinds it reacts to and is a
//! pure transition function: it never mutates the state it is given and
//! hands back the same shared state for signals it does not recognize.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::API_ERROR;
use crate::types::{
    ApiCallState, ModelApiCallState, ModelDataState, ModelInstance, ModelSignal, Signal,
};

/// A pure state transition driven by signals of type `S`
pub trait Reducer<S> {
    type State: Clone;

    fn initial_state(&self) -> Self::State;

    fn reduce(&self, state: &Self::State, signal: &S) -> Self::State;
}

/// Tracks a single API call that has no target entity
///
/// Begin moves to requesting, success back to idle, error to failed with
/// the signal's error code. Resetting is opt-in through
/// [`ApiCallReducer::with_reset`]; without it no signal resets the state.
#[derive(Debug, Clone)]
pub struct ApiCallReducer<K> {
    begin: K,
    success: K,
    error: K,
    reset: Option<K>,
}

impl<K: PartialEq> ApiCallReducer<K> {
    pub fn new(begin: K, success: K, error: K) -> Self {
        Self {
            begin,
            success,
            error,
            reset: None,
        }
    }

    pub fn with_reset(mut self, reset: K) -> Self {
        self.reset = Some(reset);
        self
    }

    /// True for the begin, success and error kinds (not reset)
    fn tracks(&self, kind: &K) -> bool {
        *kind == self.begin || *kind == self.success || *kind == self.error
    }

    fn transition<S: Signal<Kind = K>>(&self, signal: &S) -> Option<ApiCallState> {
        let kind = signal.kind();
        if *kind == self.begin {
            Some(ApiCallState::requesting())
        } else if *kind == self.success {
            Some(ApiCallState::idle())
        } else if *kind == self.error {
            let code = signal
                .error()
                .map(|e| e.code.clone())
                .unwrap_or_else(|| API_ERROR.to_string());
            Some(ApiCallState::failed(code))
        } else if self.reset.as_ref() == Some(kind) {
            Some(ApiCallState::idle())
        } else {
            None
        }
    }
}

impl<K: PartialEq, S: Signal<Kind = K>> Reducer<S> for ApiCallReducer<K> {
    type State = ApiCallState;

    fn initial_state(&self) -> ApiCallState {
        ApiCallState::idle()
    }

    fn reduce(&self, state: &ApiCallState, signal: &S) -> ApiCallState {
        self.transition(signal).unwrap_or_else(|| state.clone())
    }
}

/// Tracks concurrent API calls that differ only by target entity id
///
/// Entries are created on the first begin signal for an id and removed
/// entirely on success, so "not tracked" stays distinct from "idle".
/// Signals without an instance id are ignored.
#[derive(Debug, Clone)]
pub struct ModelApiCallReducer<K> {
    call: ApiCallReducer<K>,
}

impl<K: PartialEq> ModelApiCallReducer<K> {
    pub fn new(begin: K, success: K, error: K) -> Self {
        Self {
            call: ApiCallReducer::new(begin, success, error),
        }
    }
}

impl<K: PartialEq, S: Signal<Kind = K>> Reducer<S> for ModelApiCallReducer<K> {
    type State = ModelApiCallState;

    fn initial_state(&self) -> ModelApiCallState {
        ModelApiCallState::new()
    }

    fn reduce(&self, state: &ModelApiCallState, signal: &S) -> ModelApiCallState {
        let kind = signal.kind();
        let id = match signal.instance_id() {
            Some(id) if self.call.tracks(kind) => id,
            _ => return state.clone(),
        };

        let mut map = state.to_map();
        if *kind == self.call.success {
            map.remove(id);
        } else {
            let current = map.get(id).cloned().unwrap_or_default();
            map.insert(id.to_string(), self.call.reduce(&current, signal));
        }
        map.into()
    }
}

/// Keeps an id-indexed collection of entities up to date
///
/// * set-instance signals replace the entry for the instance's id
/// * set-list signals merge every result onto the known entry for its id,
///   after emptying the collection first when the signal asks to clear
/// * reset signals empty the collection
#[derive(Debug, Clone)]
pub struct ModelDataReducer<K, T> {
    set_list: Vec<K>,
    set_instance: Vec<K>,
    reset: Vec<K>,
    _model: PhantomData<fn() -> T>,
}

impl<K: PartialEq, T: ModelInstance> ModelDataReducer<K, T> {
    pub fn new(set_list: Vec<K>, set_instance: Vec<K>, reset: Vec<K>) -> Self {
        Self {
            set_list,
            set_instance,
            reset,
            _model: PhantomData,
        }
    }
}

impl<K, T, S> Reducer<S> for ModelDataReducer<K, T>
where
    K: PartialEq,
    T: ModelInstance,
    S: ModelSignal<T, Kind = K>,
{
    type State = ModelDataState<T>;

    fn initial_state(&self) -> ModelDataState<T> {
        ModelDataState::new()
    }

    fn reduce(&self, state: &ModelDataState<T>, signal: &S) -> ModelDataState<T> {
        let kind = signal.kind();

        if self.set_instance.contains(kind) {
            if let Some(data) = signal.instance() {
                let mut map = state.to_map();
                map.insert(data.id().to_string(), data.clone());
                return map.into();
            }
        } else if self.set_list.contains(kind) {
            if let Some(list) = signal.result_list() {
                let mut map = if signal.clear() {
                    BTreeMap::new()
                } else {
                    state.to_map()
                };
                // Merge onto the entry known before this signal, even when clearing
                for item in &list.results {
                    let merged = match state.get(item.id()) {
                        Some(existing) => item.merged_onto(existing),
                        None => item.clone(),
                    };
                    map.insert(item.id().to_string(), merged);
                }
                return map.into();
            }
        } else if self.reset.contains(kind) {
            return ModelDataState::new();
        }

        state.clone()
    }
}
