//! Murmur Core - realtime block-based dataflow engine
//!
//! This crate runs a graph of units that exchange timestamped messages and
//! block-sized sample streams, one fixed-size block per host callback.
//!
//! # Core Abstractions
//!
//! ## Graph
//!
//! - [`Unit`] - Object-safe trait every node implements
//! - [`Graph`] - Units, connections, and the compiled process order
//! - [`Connection`] / [`ConnectionKind`] - Message or stream edges, fixed by the source outlet
//!
//! ## Compilation
//!
//! - [`CompiledOrder`] - Units and implicit sums in producer-before-consumer order
//! - [`BufferPool`] - Reference-counted block buffers with a shared zero buffer
//!
//! ## Scheduling
//!
//! - [`Message`] / [`Atom`] - Timestamped atom lists that never allocate when cloned
//! - [`EventQueue`] - Timestamp-ordered queue, stable for equal timestamps
//! - [`Engine`] - Block driver: drains due events, then runs the compiled order
//!   with sample-accurate splits around each event
//!
//! ## Hosting
//!
//! - [`Context`] - An engine behind one re-entrant lock, shareable across threads
//! - [`NameRegistry`] - Named stream links, message receivers, and external receivers
//! - [`DiagnosticSink`] - Where units report malformed arguments and `print` output
//!
//! # Example
//!
//! ```rust,ignore
//! use murmur_core::{AudioSettings, Context, Message};
//!
//! let context = Context::new(AudioSettings::default());
//! let osc = context.add_unit(registry.create("osc~", &Message::parse(0.0, "440"))?);
//! let dac = context.add_unit(registry.create("dac~", &Message::empty(0.0))?);
//! context.connect(osc, 0, dac, 0)?;
//! context.connect(osc, 0, dac, 1)?;
//!
//! let mut output = vec![0.0; 2 * 64];
//! context.process(&[], &mut output);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocation in `process` once the graph is compiled
//! - **Compile between blocks**: topology edits only invalidate; the next block recompiles
//! - **No unsafe**: a unit's output buffers are moved out of the pool while it runs

pub mod buffer;
pub mod context;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod graph;
pub mod message;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod unit;

// Re-export main types at crate root
pub use buffer::{BufferId, BufferPool, PoolStats};
pub use context::{Context, ExternalListener};
pub use diagnostic::{CollectingSink, Diagnostic, DiagnosticSink, Severity, TracingSink};
pub use driver::{DriverState, Engine, MAX_MESSAGE_DEPTH};
pub use error::GraphError;
pub use graph::{
    Behavior, CompiledOrder, Connection, ConnectionKind, Graph, OrderStep, PENDING_CAPACITY,
    SUBGRAPH_LABEL, Subgraph,
};
pub use message::{Atom, MAX_ATOMS, Message, SYMBOL_CAPACITY, Symbol, symbol};
pub use registry::{Handle, LinkId, NameRegistry, Store, StoreId};
pub use scheduler::{EventId, EventQueue, ScheduledEvent};
pub use settings::AudioSettings;
pub use unit::{
    Boundary, Inputs, LinkFamily, MessageContext, OutletSource, Outputs, Ports, Registration,
    StoreKind, StreamIo, Unit, UnitId,
};
