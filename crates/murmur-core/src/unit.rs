//! The capability interface every graph unit implements.
//!
//! A [`Unit`] declares its ports once at construction and then only reacts:
//!
//! - [`receive`](Unit::receive) handles a message arriving at an inlet and may
//!   emit messages or schedule future ones through a [`MessageContext`];
//! - [`emit_scheduled`](Unit::emit_scheduled) sees each of those scheduled
//!   messages again when it falls due;
//! - [`process`](Unit::process) computes a sample range of the current block
//!   over buffers bound by the compiler, reached through [`StreamIo`];
//! - [`connectivity_changed`](Unit::connectivity_changed) is told between
//!   blocks when the set of stream connections at an inlet changes.
//!
//! The remaining methods describe how the compiler should treat the unit.

use std::fmt;
use std::ops::Range;

use crate::buffer::{BufferId, BufferPool};
use crate::diagnostic::{DiagnosticSink, Severity};
use crate::graph::ConnectionKind;
use crate::message::{Message, Symbol};
use crate::registry::Store;
use crate::scheduler::{EventId, EventQueue};
use crate::settings::AudioSettings;

/// Unique identifier for a unit in a graph.
///
/// Unit IDs are assigned sequentially and never reused within a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub(crate) u32);

impl UnitId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Declared inlet and outlet counts of a unit.
///
/// Inlets are shared between kinds: inlet `i` accepts streams when
/// `i < stream_inlets` and messages when `i < message_inlets`. Outlets are
/// not shared: the first `stream_outlets` carry streams and the following
/// `message_outlets` carry messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ports {
    /// Inlets that accept messages.
    pub message_inlets: usize,
    /// Inlets that accept streams.
    pub stream_inlets: usize,
    /// Outlets that emit messages.
    pub message_outlets: usize,
    /// Outlets that emit streams.
    pub stream_outlets: usize,
}

impl Ports {
    /// Creates a port layout.
    pub const fn new(
        message_inlets: usize,
        stream_inlets: usize,
        message_outlets: usize,
        stream_outlets: usize,
    ) -> Self {
        Self {
            message_inlets,
            stream_inlets,
            message_outlets,
            stream_outlets,
        }
    }

    /// Message-only layout.
    pub const fn messages(inlets: usize, outlets: usize) -> Self {
        Self::new(inlets, 0, outlets, 0)
    }

    /// Total number of inlets.
    pub fn inlets(&self) -> usize {
        self.message_inlets.max(self.stream_inlets)
    }

    /// Total number of outlets.
    pub fn outlets(&self) -> usize {
        self.stream_outlets + self.message_outlets
    }

    /// Kind of the given outlet, or `None` if it does not exist.
    pub fn outlet_kind(&self, outlet: usize) -> Option<ConnectionKind> {
        if outlet < self.stream_outlets {
            Some(ConnectionKind::Stream)
        } else if outlet < self.outlets() {
            Some(ConnectionKind::Message)
        } else {
            None
        }
    }

    /// Returns true if the given inlet accepts stream connections.
    pub fn accepts_stream(&self, inlet: usize) -> bool {
        inlet < self.stream_inlets
    }

    /// Returns true if the unit has any stream port.
    pub fn has_streams(&self) -> bool {
        self.stream_inlets + self.stream_outlets > 0
    }
}

/// Where a stream outlet's samples live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutletSource {
    /// The outlet owns a pool buffer the unit writes.
    Pooled,
    /// The outlet forwards the buffer bound to this inlet without copying.
    Forward(usize),
}

/// Namespace of a named stream link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkFamily {
    /// Many emitters summed into one collector (`throw~` / `catch~`).
    Throw,
    /// One emitter copied to many collectors (`send~` / `receive~`).
    Send,
}

/// Namespace of a named sample store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Random-access sample array (`table`, `tabwrite~`, `tabread~`).
    Table,
    /// Circular history written each block (`delwrite~`, `delread~`).
    DelayLine,
}

/// Which side of a subgraph boundary a unit stands for.
///
/// Added inside a subgraph, a boundary unit becomes one of the subgraph's
/// own inlets or outlets, in the order boundary units are added.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// Carries what arrives at the subgraph's inlet into the subgraph.
    Inlet,
    /// Carries what it receives out of the subgraph's outlet.
    Outlet,
}

/// Named, connectionless role a unit plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Writes into the named link's bus.
    Emitter {
        /// Link namespace.
        family: LinkFamily,
        /// Link name.
        name: Symbol,
    },
    /// Reads the named link's bus. Ordered after every emitter of the link.
    Collector {
        /// Link namespace.
        family: LinkFamily,
        /// Link name.
        name: Symbol,
    },
    /// Receives messages sent to the name.
    Receiver {
        /// Receiver name.
        name: Symbol,
    },
    /// Declares a named store of at least `len` samples.
    StoreOwner {
        /// Store namespace.
        kind: StoreKind,
        /// Store name.
        name: Symbol,
        /// Requested length in samples.
        len: usize,
    },
    /// Reads or writes a named store. Delay line accessors are ordered after
    /// the line's owners.
    StoreAccess {
        /// Store namespace.
        kind: StoreKind,
        /// Store name.
        name: Symbol,
    },
}

/// A node of the processing graph.
///
/// Implementations must be cheap to call from the audio thread: `receive` and
/// `process` must not block and should not allocate.
pub trait Unit: Send {
    /// Textual label the unit was created from, e.g. `"osc~"`.
    fn label(&self) -> &str;

    /// Inlet and outlet counts. Must not change after construction.
    fn ports(&self) -> Ports;

    /// Handles a message arriving at `inlet`.
    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        let _ = (inlet, message, ctx);
    }

    /// Called when an event this unit scheduled on `outlet` falls due.
    ///
    /// The default sends the message on. Units that re-arm themselves, like
    /// a metronome, override this to schedule the next event first.
    fn emit_scheduled(&mut self, outlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        ctx.send(outlet, message.clone());
    }

    /// Computes samples `range` of the current block.
    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let _ = (io, range);
    }

    /// Called between blocks when stream connections at `inlet` change.
    /// `stream_sources[i]` is the number of stream connections into inlet `i`.
    fn connectivity_changed(&mut self, inlet: usize, stream_sources: &[usize]) {
        let _ = (inlet, stream_sources);
    }

    /// Whether the unit computes samples. Units that return false are wired
    /// for buffer propagation but left out of the compiled order.
    fn performs_computation(&self) -> bool {
        self.ports().has_streams()
    }

    /// Where the samples of stream outlet `outlet` come from.
    fn outlet_source(&self, outlet: usize) -> OutletSource {
        let _ = outlet;
        OutletSource::Pooled
    }

    /// Named role, registered when the unit is added to a graph.
    fn registration(&self) -> Option<Registration> {
        None
    }

    /// Marks the unit as a root of compilation even if it has downstream
    /// connections.
    fn is_sink(&self) -> bool {
        false
    }

    /// Subgraph port this unit stands for when added inside a subgraph.
    fn boundary(&self) -> Option<Boundary> {
        None
    }
}

/// Where an emitted message goes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Route {
    /// Along the connections of one of the unit's outlets.
    Outlet(usize),
    /// To every receiver registered under the name.
    Named(Symbol),
}

/// A message emitted during `receive`, dispatched after it returns.
#[derive(Clone, Debug)]
pub(crate) struct Outgoing {
    pub source: UnitId,
    pub route: Route,
    pub message: Message,
}

/// Side-effect channel handed to [`Unit::receive`].
pub struct MessageContext<'a> {
    pub(crate) unit: UnitId,
    pub(crate) source: &'a str,
    pub(crate) settings: &'a AudioSettings,
    pub(crate) block_start: f64,
    pub(crate) queue: &'a mut EventQueue,
    pub(crate) outbox: &'a mut Vec<Outgoing>,
    pub(crate) diagnostics: &'a dyn DiagnosticSink,
}

impl MessageContext<'_> {
    /// Identifier of the receiving unit.
    pub fn unit_id(&self) -> UnitId {
        self.unit
    }

    /// Engine settings.
    pub fn settings(&self) -> &AudioSettings {
        self.settings
    }

    /// Start of the block currently being processed, in milliseconds.
    pub fn block_start(&self) -> f64 {
        self.block_start
    }

    /// Emits `message` from `outlet` once `receive` returns.
    pub fn send(&mut self, outlet: usize, message: Message) {
        self.outbox.push(Outgoing {
            source: self.unit,
            route: Route::Outlet(outlet),
            message,
        });
    }

    /// Sends `message` to every receiver registered under `name`.
    pub fn send_to(&mut self, name: &str, message: Message) {
        self.outbox.push(Outgoing {
            source: self.unit,
            route: Route::Named(crate::message::symbol(name)),
            message,
        });
    }

    /// Schedules `message` to leave `outlet` at its timestamp.
    pub fn schedule(&mut self, outlet: usize, message: Message) -> EventId {
        self.queue.insert(self.unit, outlet, message)
    }

    /// Cancels an event previously scheduled by this unit.
    /// Returns false if it was already delivered.
    pub fn cancel(&mut self, outlet: usize, id: EventId) -> bool {
        self.queue.remove(self.unit, outlet, id).is_some()
    }

    /// Reports a diagnostic attributed to this unit.
    pub fn report(&self, severity: Severity, message: fmt::Arguments<'_>) {
        self.diagnostics.report(severity, self.source, message);
    }
}

/// Read-only view of a unit's inputs during [`Unit::process`].
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    pool: &'a BufferPool,
    inlets: &'a [BufferId],
    host_input: &'a [f32],
    block_size: usize,
}

impl<'a> Inputs<'a> {
    /// Samples bound to stream inlet `inlet`. Unbound inlets read as zero.
    #[inline]
    pub fn inlet(&self, inlet: usize) -> &'a [f32] {
        let id = self.inlets.get(inlet).copied().unwrap_or(BufferId::ZERO);
        self.pool.get(id)
    }

    /// One channel of host input, or silence past the last channel.
    #[inline]
    pub fn host_input(&self, channel: usize) -> &'a [f32] {
        let start = channel * self.block_size;
        self.host_input
            .get(start..start + self.block_size)
            .unwrap_or_else(|| self.pool.get(BufferId::ZERO))
    }
}

/// Writable view of a unit's outputs during [`Unit::process`].
pub struct Outputs<'a> {
    outlets: &'a mut [Box<[f32]>],
    bus: Option<&'a mut [f32]>,
    store: Option<&'a mut Store>,
    host_output: &'a mut [f32],
    block_size: usize,
}

impl Outputs<'_> {
    /// Samples of stream outlet `outlet`.
    ///
    /// # Panics
    ///
    /// Panics if the outlet is not a pooled stream outlet of this unit.
    #[inline]
    pub fn outlet(&mut self, outlet: usize) -> &mut [f32] {
        &mut self.outlets[outlet]
    }

    /// The bus of the unit's named link, if it has one.
    #[inline]
    pub fn bus(&mut self) -> Option<&mut [f32]> {
        self.bus.as_deref_mut()
    }

    /// The link bus for reading together with an outlet for writing.
    pub fn bus_and_outlet(&mut self, outlet: usize) -> (Option<&[f32]>, &mut [f32]) {
        (self.bus.as_deref(), &mut self.outlets[outlet])
    }

    /// The unit's named store, if it owns or accesses one.
    #[inline]
    pub fn store(&mut self) -> Option<&mut Store> {
        self.store.as_deref_mut()
    }

    /// The named store together with an outlet for writing.
    pub fn store_and_outlet(&mut self, outlet: usize) -> (Option<&Store>, &mut [f32]) {
        (self.store.as_deref(), &mut self.outlets[outlet])
    }

    /// One channel of host output, or `None` past the last channel.
    #[inline]
    pub fn host_output(&mut self, channel: usize) -> Option<&mut [f32]> {
        let start = channel * self.block_size;
        self.host_output.get_mut(start..start + self.block_size)
    }
}

/// Buffers a unit reads and writes during [`Unit::process`].
pub struct StreamIo<'a> {
    inputs: Inputs<'a>,
    outputs: Outputs<'a>,
}

impl<'a> StreamIo<'a> {
    pub(crate) fn new(
        pool: &'a BufferPool,
        inlets: &'a [BufferId],
        outlets: &'a mut [Box<[f32]>],
        named: (Option<&'a mut [f32]>, Option<&'a mut Store>),
        host_input: &'a [f32],
        host_output: &'a mut [f32],
    ) -> Self {
        let (bus, store) = named;
        let block_size = pool.block_size();
        Self {
            inputs: Inputs {
                pool,
                inlets,
                host_input,
                block_size,
            },
            outputs: Outputs {
                outlets,
                bus,
                store,
                host_output,
                block_size,
            },
        }
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.inputs.block_size
    }

    /// Samples bound to stream inlet `inlet`.
    pub fn inlet(&self, inlet: usize) -> &[f32] {
        self.inputs.inlet(inlet)
    }

    /// Samples of stream outlet `outlet`.
    pub fn outlet(&mut self, outlet: usize) -> &mut [f32] {
        self.outputs.outlet(outlet)
    }

    /// Splits into independent input and output views.
    pub fn split(&mut self) -> (Inputs<'a>, &mut Outputs<'a>) {
        (self.inputs, &mut self.outputs)
    }
}
