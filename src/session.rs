//! Single-owner session around a state store.
//!
//! A session is created once per IR instantiation and cloned freely: clones
//! share the same store behind one mutex, which is the only write path.
//! Actions the store cannot execute are forwarded to the host handler after
//! the lock has been released.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::action::{is_action_supported, Action};
use crate::document::IrDocument;
use crate::state::{ApplyOutcome, Snapshot, StateFlow, StateStore};

/// Callback renderers use to report user interaction.
pub type ActionSink = Arc<dyn Fn(Action) + Send + Sync>;

/// Receives navigation, toast, fetch and any other host-only action.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, action: Action);
}

impl<F> ActionHandler for F
where
    F: Fn(Action) + Send + Sync,
{
    fn handle(&self, action: Action) {
        self(action)
    }
}

#[derive(Clone, Default)]
pub struct Session {
    store: Arc<Mutex<StateStore>>,
    host: Option<Arc<dyn ActionHandler>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("has_host", &self.host.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(store: StateStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            host: None,
        }
    }

    pub fn from_document(doc: &IrDocument) -> Self {
        Self::new(StateStore::from_document(doc))
    }

    /// Installs the handler that receives host-only actions.
    pub fn with_host(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.host = Some(Arc::new(handler));
        self
    }

    fn lock(&self) -> MutexGuard<'_, StateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock().get(path)
    }

    pub fn declared_keys(&self) -> BTreeSet<String> {
        self.lock().declared_keys()
    }

    pub fn flow(&self, path: &str) -> StateFlow {
        self.lock().flow(path)
    }

    /// Applies store actions locally and forwards the rest to the host.
    ///
    /// A sequence mixing both is split: its store actions run as one atomic
    /// batch, then its host actions are forwarded in declaration order.
    pub fn apply(&self, action: Action) -> ApplyOutcome {
        if is_action_supported(&action) {
            return self.lock().apply(&action);
        }
        let (local, host) = action.partition();
        let outcome = if local.is_empty() {
            ApplyOutcome::Unchanged
        } else {
            self.lock().apply_all(&local)
        };
        for action in host {
            self.forward(action);
        }
        outcome
    }

    fn forward(&self, action: Action) {
        match &self.host {
            Some(host) => {
                debug!(action = action.kind(), "forwarding host action");
                host.handle(action);
            }
            None => warn!(action = action.kind(), "no host handler installed; action dropped"),
        }
    }

    /// A sink that applies every action it receives to this session.
    pub fn action_sink(&self) -> ActionSink {
        let session = self.clone();
        Arc::new(move |action| {
            session.apply(action);
        })
    }
}

/// Sessions for every live surface, keyed by surface id.
pub type SessionTable = DashMap<String, Session>;

pub fn new_session_table() -> SessionTable {
    DashMap::new()
}

/// Creates a session for `doc` under `surface_id`, replacing any previous one.
pub fn open_session(table: &SessionTable, surface_id: impl Into<String>, doc: &IrDocument) -> Session {
    let session = Session::from_document(doc);
    table.insert(surface_id.into(), session.clone());
    session
}

/// Applies `action` to the session of `surface_id`; `None` if there is none.
pub fn apply_to(table: &SessionTable, surface_id: &str, action: Action) -> Option<ApplyOutcome> {
    let session = table.get(surface_id)?.clone();
    Some(session.apply(action))
}

/// Drops the session (call when the surface is torn down).
pub fn close_session(table: &SessionTable, surface_id: &str) -> bool {
    table.remove(surface_id).is_some()
}
