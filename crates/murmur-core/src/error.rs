//! Error types for topology edits.

use thiserror::Error;

use crate::graph::Connection;
use crate::unit::UnitId;

/// Errors returned by graph mutation operations.
///
/// Internal invariants such as buffer accounting are not reported here; a
/// breach of those panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The unit does not exist (never added, or already removed).
    #[error("{0} not found")]
    UnitNotFound(UnitId),

    /// The source outlet index is past the unit's declared outlets.
    #[error("{unit} has no outlet {outlet}")]
    NoSuchOutlet {
        /// Source unit.
        unit: UnitId,
        /// Requested outlet.
        outlet: usize,
    },

    /// The destination inlet index is past the unit's declared inlets.
    #[error("{unit} has no inlet {inlet}")]
    NoSuchInlet {
        /// Destination unit.
        unit: UnitId,
        /// Requested inlet.
        inlet: usize,
    },

    /// A stream outlet was connected to an inlet that only takes messages.
    #[error("{unit} inlet {inlet} does not accept streams")]
    NotStreamInlet {
        /// Destination unit.
        unit: UnitId,
        /// Requested inlet.
        inlet: usize,
    },

    /// The same connection already exists.
    #[error("connection {0} already exists")]
    DuplicateConnection(Connection),

    /// The connection to remove does not exist.
    #[error("connection {0} not found")]
    ConnectionNotFound(Connection),

    /// The stream connection would close a loop of stream edges.
    #[error("stream connection {0} would create a cycle")]
    CycleDetected(Connection),

    /// Connections only join units placed in the same subgraph.
    #[error("connection {0} crosses a subgraph boundary")]
    CrossGraph(Connection),

    /// Units can only be placed inside a subgraph.
    #[error("{0} is not a subgraph")]
    NotASubgraph(UnitId),

    /// Stream ports of a subgraph must be added before its message-only ports.
    #[error("{unit} already has message-only ports on that side")]
    BoundaryOrder {
        /// The subgraph.
        unit: UnitId,
    },

    /// A boundary unit is a port of its subgraph and leaves only with it.
    #[error("{0} is a subgraph port")]
    BoundaryRemoval(UnitId),
}
