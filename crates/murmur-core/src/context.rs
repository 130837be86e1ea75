//! Thread-safe front end of an [`Engine`].
//!
//! A [`Context`] puts one engine behind a single re-entrant lock. The audio
//! callback holds it for the length of one [`process`](Context::process) call;
//! topology edits from other threads take it for the length of the edit.
//!
//! Messages sent to external receivers during a block are handed to the
//! listener after the block finishes, with the lock still held. The listener
//! may call back into the same context on that thread, for instance to
//! schedule a reply or rewire the graph.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::diagnostic::DiagnosticSink;
use crate::driver::Engine;
use crate::error::GraphError;
use crate::graph::ConnectionKind;
use crate::message::{Message, Symbol};
use crate::scheduler::EventId;
use crate::settings::AudioSettings;
use crate::unit::{Unit, UnitId};

/// Host callback for messages sent to external receivers.
pub type ExternalListener = Box<dyn FnMut(&str, &Message) + Send>;

struct Shared {
    engine: RefCell<Engine>,
    listener: RefCell<Option<ExternalListener>>,
    deliveries: RefCell<Vec<(Symbol, Message)>>,
}

/// An engine guarded by one re-entrant lock.
pub struct Context {
    shared: ReentrantMutex<Shared>,
    settings: AudioSettings,
}

impl Context {
    /// Creates a context around a fresh engine.
    pub fn new(settings: AudioSettings) -> Self {
        Self::from_engine(Engine::new(settings))
    }

    /// Creates a context whose engine reports to `diagnostics`.
    pub fn with_diagnostics(settings: AudioSettings, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self::from_engine(Engine::with_diagnostics(settings, diagnostics))
    }

    /// Wraps an existing engine.
    pub fn from_engine(engine: Engine) -> Self {
        let settings = *engine.settings();
        Self {
            shared: ReentrantMutex::new(Shared {
                engine: RefCell::new(engine),
                listener: RefCell::new(None),
                deliveries: RefCell::new(Vec::with_capacity(16)),
            }),
            settings,
        }
    }

    /// Engine settings.
    pub fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Runs `f` with exclusive access to the engine.
    ///
    /// Several edits made inside one call are seen by the audio thread as a
    /// single change.
    ///
    /// # Panics
    ///
    /// Panics if called from inside another `with_engine` closure on the same
    /// context.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let shared = self.shared.lock();
        let mut engine = shared.engine.borrow_mut();
        f(&mut engine)
    }

    /// Adds a unit.
    pub fn add_unit(&self, unit: Box<dyn Unit>) -> UnitId {
        self.with_engine(|engine| engine.add_unit(unit))
    }

    /// Adds an empty subgraph.
    pub fn add_subgraph(&self) -> UnitId {
        self.with_engine(|engine| engine.add_subgraph())
    }

    /// Places a unit inside a subgraph.
    pub fn add_unit_to(&self, owner: UnitId, unit: Box<dyn Unit>) -> Result<UnitId, GraphError> {
        self.with_engine(|engine| engine.add_unit_to(owner, unit))
    }

    /// Places an empty subgraph inside another.
    pub fn add_subgraph_to(&self, owner: UnitId) -> Result<UnitId, GraphError> {
        self.with_engine(|engine| engine.add_subgraph_to(owner))
    }

    /// Removes a unit, its connections, and its scheduled events.
    pub fn remove_unit(&self, id: UnitId) -> Result<Box<dyn Unit>, GraphError> {
        self.with_engine(|engine| engine.remove_unit(id))
    }

    /// Connects `outlet` of `from` to `inlet` of `to`.
    pub fn connect(
        &self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<ConnectionKind, GraphError> {
        self.with_engine(|engine| engine.connect(from, outlet, to, inlet))
    }

    /// Removes a connection.
    pub fn disconnect(
        &self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<(), GraphError> {
        self.with_engine(|engine| engine.disconnect(from, outlet, to, inlet))
    }

    /// Schedules `message` to leave `outlet` of `target` at its timestamp.
    pub fn schedule(
        &self,
        target: UnitId,
        outlet: usize,
        message: Message,
    ) -> Result<EventId, GraphError> {
        self.with_engine(|engine| engine.schedule(target, outlet, message))
    }

    /// Cancels a scheduled event.
    pub fn cancel(&self, target: UnitId, outlet: usize, id: EventId) -> bool {
        self.with_engine(|engine| engine.cancel(target, outlet, id))
    }

    /// Schedules `message` on every receiver registered under `name`.
    pub fn send_to(&self, name: &str, message: &Message) -> usize {
        self.with_engine(|engine| engine.send_to(name, message))
    }

    /// Delivers messages sent to `name` to the listener.
    pub fn register_external(&self, name: &str) -> bool {
        self.with_engine(|engine| engine.register_external(name))
    }

    /// Stops delivering `name` to the listener.
    pub fn unregister_external(&self, name: &str) -> bool {
        self.with_engine(|engine| engine.unregister_external(name))
    }

    /// Installs the callback for external receivers, replacing any previous one.
    pub fn set_listener(&self, listener: impl FnMut(&str, &Message) + Send + 'static) {
        let shared = self.shared.lock();
        *shared.listener.borrow_mut() = Some(Box::new(listener));
    }

    /// Start time of the next block, in milliseconds.
    pub fn block_start(&self) -> f64 {
        self.with_engine(|engine| engine.block_start())
    }

    /// Processes one block. See [`Engine::process`].
    pub fn process(&self, input: &[f32], output: &mut [f32]) {
        let shared = self.shared.lock();
        let mut deliveries = {
            let mut engine = shared.engine.borrow_mut();
            engine.process(input, output);
            let mut deliveries = std::mem::take(&mut *shared.deliveries.borrow_mut());
            engine.take_external(&mut deliveries);
            deliveries
        };
        if deliveries.is_empty() {
            *shared.deliveries.borrow_mut() = deliveries;
            return;
        }

        let listener = shared.listener.borrow_mut().take();
        match listener {
            Some(mut listener) => {
                for (name, message) in &deliveries {
                    listener(name, message);
                }
                let mut slot = shared.listener.borrow_mut();
                if slot.is_none() {
                    *slot = Some(listener);
                }
            }
            None => {
                tracing::debug!("context: {} external messages without listener", deliveries.len());
            }
        }
        deliveries.clear();
        *shared.deliveries.borrow_mut() = deliveries;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
