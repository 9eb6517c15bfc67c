//! In-process signal stream feeding the reducers
//!
//! [`SignalBus`] is an append-only fan-out channel: every subscriber
//! receives every signal emitted after it subscribed, in emission order,
//! however far behind it is. Emitting never blocks, and a signal emitted
//! while nobody listens is dropped.
//!
//! [`spawn_reducer`] folds one subscription through a [`Reducer`] on its
//! own task and publishes every new state on a `watch` channel.

use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::reducers::Reducer;

pub type SignalReceiver<S> = mpsc::UnboundedReceiver<S>;

/// Lossless fan-out channel for signals
///
/// Each subscriber gets its own unbounded queue, so a slow reducer delays
/// its state but never skips a signal. Subscriptions end once every clone
/// of the bus is dropped.
#[derive(Debug)]
pub struct SignalBus<S> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<S>>>>,
}

impl<S> Clone for SignalBus<S> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<S> Default for SignalBus<S> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<S: Clone + Send + 'static> SignalBus<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<S>>> {
        // A panic while holding the lock cannot leave the list half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> SignalReceiver<S> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders().push(sender);
        receiver
    }

    pub fn emit(&self, signal: S) {
        // Subscribers whose receiver is gone are pruned
        self.senders()
            .retain(|sender| sender.send(signal.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut senders = self.senders();
        senders.retain(|sender| !sender.is_closed());
        senders.len()
    }
}

/// Apply every signal of `signals` to `state`, in order
pub async fn fold_signals<R, S, St>(reducer: &R, state: R::State, signals: St) -> R::State
where
    R: Reducer<S>,
    St: Stream<Item = S>,
{
    futures::pin_mut!(signals);
    let mut state = state;
    while let Some(signal) = signals.next().await {
        state = reducer.reduce(&state, &signal);
    }
    state
}

/// Run `reducer` over `signals` until every bus handle is dropped
///
/// The returned `watch` receiver always holds the latest state; the task
/// finishes once the bus is closed and all pending signals are applied.
pub fn spawn_reducer<R, S>(
    reducer: R,
    signals: SignalReceiver<S>,
) -> (watch::Receiver<R::State>, JoinHandle<()>)
where
    R: Reducer<S> + Send + 'static,
    R::State: Send + Sync + 'static,
    S: Clone + Send + 'static,
{
    let initial = reducer.initial_state();
    spawn_reducer_from(reducer, initial, signals)
}

/// Like [`spawn_reducer`], starting from a restored `state`
pub fn spawn_reducer_from<R, S>(
    reducer: R,
    state: R::State,
    mut signals: SignalReceiver<S>,
) -> (watch::Receiver<R::State>, JoinHandle<()>)
where
    R: Reducer<S> + Send + 'static,
    R::State: Send + Sync + 'static,
    S: Clone + Send + 'static,
{
    let (sender, receiver) = watch::channel(state);

    let handle = tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            let next = {
                let current = sender.borrow();
                reducer.reduce(&current, &signal)
            };
            sender.send_replace(next);
        }
    });

    (receiver, handle)
}
