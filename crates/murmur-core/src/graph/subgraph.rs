//! The container unit for nested graphs.

use crate::unit::{Ports, Unit};

/// Label subgraphs are created from.
pub const SUBGRAPH_LABEL: &str = "pd";

/// A nested graph.
///
/// The unit itself does nothing. The graph gives it one port per boundary
/// unit placed inside it, and the compiler runs its contents in place of it.
#[derive(Debug, Default)]
pub struct Subgraph;

impl Unit for Subgraph {
    fn label(&self) -> &str {
        SUBGRAPH_LABEL
    }

    fn ports(&self) -> Ports {
        Ports::default()
    }

    fn performs_computation(&self) -> bool {
        false
    }
}
