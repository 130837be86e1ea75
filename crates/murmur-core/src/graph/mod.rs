//! Unit graph: topology, named registration, and compilation.
//!
//! A [`Graph`] owns its units and the connections between them. Every edit
//! invalidates the cached [`CompiledOrder`]; the next call to
//! [`compile`](Graph::compile) (made lazily by the block driver) rebuilds it.
//!
//! # Stream and message edges
//!
//! A connection's kind comes from the source outlet. Stream edges must point
//! at inlets that accept streams and may not form cycles. Message edges may go
//! anywhere, including back upstream.
//!
//! # Connectivity hook
//!
//! Adding or removing a stream edge calls the destination unit's
//! [`connectivity_changed`](crate::Unit::connectivity_changed) straight away.
//! Edits are only possible between blocks, so a block never sees a unit switch
//! behavior halfway through.
//!
//! # Subgraphs
//!
//! A [`Subgraph`] is a unit whose ports are the boundary units placed inside
//! it (see [`Unit::boundary`]). All units live in one flat arena; each slot
//! records the subgraph that owns it, and connections never cross from one
//! subgraph to another. Named links and stores reach across subgraphs.

mod compile;
mod connection;
mod subgraph;

use std::collections::VecDeque;

use crate::buffer::{BufferId, BufferPool};
use crate::error::GraphError;
use crate::message::Message;
use crate::registry::{Handle, NameRegistry};
use crate::unit::{Boundary, OutletSource, Ports, Registration, Unit, UnitId};

pub(crate) use compile::Visit;
pub use compile::{CompiledOrder, OrderStep};
pub use connection::{Connection, ConnectionKind};
pub(crate) use connection::LetConnections;
pub use subgraph::{SUBGRAPH_LABEL, Subgraph};

/// Messages a computing unit can hold for one block before its queue grows.
pub const PENDING_CAPACITY: usize = 32;

/// Per-block processing behavior of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// No events this block; the whole block is processed in one call.
    EventFree,
    /// Events arrived this block; processing is split at each event.
    EventAware,
}

/// A message waiting for its sample offset inside a computing unit.
#[derive(Clone, Debug)]
pub(crate) struct Pending {
    pub inlet: usize,
    pub message: Message,
}

/// Units placed inside a subgraph, and which of them are its ports.
#[derive(Debug, Default)]
pub(crate) struct Canvas {
    pub children: Vec<UnitId>,
    pub inlets: Vec<UnitId>,
    pub outlets: Vec<UnitId>,
}

pub(crate) struct UnitSlot {
    pub label: String,
    pub unit: Box<dyn Unit>,
    pub ports: Ports,
    pub lets: LetConnections,
    pub inlet_buffers: Vec<BufferId>,
    pub outlet_buffers: Vec<BufferId>,
    pub outlet_sources: Vec<OutletSource>,
    pub registration: Option<Registration>,
    pub handle: Option<Handle>,
    pub owner: Option<UnitId>,
    pub canvas: Option<Canvas>,
    /// Side and index of the owner's port this unit stands for.
    pub boundary: Option<(Boundary, usize)>,
    pub visit: Visit,
    pub behavior: Behavior,
    pub pending: VecDeque<Pending>,
}

/// Units, their connections, and the compiled order derived from them.
pub struct Graph {
    pub(crate) slots: Vec<Option<UnitSlot>>,
    pub(crate) registry: NameRegistry,
    pub(crate) pool: BufferPool,
    pub(crate) order: Option<CompiledOrder>,
    unit_count: usize,
}

/// Port layout of a subgraph after adding a boundary unit with `inner` ports
/// on `side`. `None` if a stream port would follow a message-only one.
fn grow_ports(mut ports: Ports, side: Boundary, inner: Ports) -> Option<Ports> {
    match side {
        Boundary::Inlet if inner.stream_outlets > 0 => {
            if ports.message_inlets > ports.stream_inlets {
                return None;
            }
            ports.stream_inlets += 1;
            ports.message_inlets += 1;
        }
        Boundary::Inlet => ports.message_inlets += 1,
        Boundary::Outlet if inner.stream_inlets > 0 => {
            if ports.message_outlets > 0 {
                return None;
            }
            ports.stream_outlets += 1;
        }
        Boundary::Outlet => ports.message_outlets += 1,
    }
    Some(ports)
}

impl Graph {
    /// Creates an empty graph whose buffers hold `block_size` samples.
    pub fn new(block_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            registry: NameRegistry::new(block_size),
            pool: BufferPool::new(block_size),
            order: None,
            unit_count: 0,
        }
    }

    /// Samples per buffer.
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.unit_count
    }

    /// Returns true if the graph has no units.
    pub fn is_empty(&self) -> bool {
        self.unit_count == 0
    }

    // --- Mutation ---

    /// Adds a unit at the top level and registers its named role, if any.
    pub fn add_unit(&mut self, unit: Box<dyn Unit>) -> UnitId {
        self.insert(None, unit, false)
    }

    /// Adds an empty subgraph at the top level.
    pub fn add_subgraph(&mut self) -> UnitId {
        self.insert(None, Box::new(Subgraph), true)
    }

    /// Places a unit inside the subgraph `owner`.
    ///
    /// A unit with a [`boundary`](Unit::boundary) becomes the subgraph's next
    /// inlet or outlet. Stream ports must come before message-only ports on
    /// each side.
    pub fn add_unit_to(&mut self, owner: UnitId, unit: Box<dyn Unit>) -> Result<UnitId, GraphError> {
        self.insert_into(owner, unit, false)
    }

    /// Places an empty subgraph inside the subgraph `owner`.
    pub fn add_subgraph_to(&mut self, owner: UnitId) -> Result<UnitId, GraphError> {
        self.insert_into(owner, Box::new(Subgraph), true)
    }

    /// Removes a unit with all its connections and named registration.
    /// Removing a subgraph removes everything inside it.
    ///
    /// Units that lose a stream connection are notified through their
    /// connectivity hook.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<Box<dyn Unit>, GraphError> {
        let slot = self.slot(id)?;
        if slot.boundary.is_some() && slot.owner.is_some_and(|o| self.contains(o)) {
            return Err(GraphError::BoundaryRemoval(id));
        }
        self.remove_tree(id)
    }

    fn insert(&mut self, owner: Option<UnitId>, unit: Box<dyn Unit>, canvas: bool) -> UnitId {
        let id = UnitId(self.slots.len() as u32);
        let ports = unit.ports();
        let registration = unit.registration();
        let handle = registration.and_then(|r| self.registry.register(id, r));
        let pending = if unit.performs_computation() {
            VecDeque::with_capacity(PENDING_CAPACITY)
        } else {
            VecDeque::new()
        };
        let slot = UnitSlot {
            label: unit.label().to_owned(),
            ports,
            lets: LetConnections::new(ports),
            inlet_buffers: vec![BufferId::ZERO; ports.stream_inlets],
            outlet_buffers: vec![BufferId::ZERO; ports.stream_outlets],
            outlet_sources: vec![OutletSource::Pooled; ports.stream_outlets],
            registration,
            handle,
            owner,
            canvas: canvas.then(Canvas::default),
            boundary: None,
            visit: Visit::Unvisited,
            behavior: Behavior::EventFree,
            pending,
            unit,
        };
        tracing::debug!("graph_add: {id} '{}' {:?}", slot.label, ports);
        self.slots.push(Some(slot));
        self.unit_count += 1;
        self.invalidate();
        id
    }

    fn insert_into(
        &mut self,
        owner: UnitId,
        unit: Box<dyn Unit>,
        canvas: bool,
    ) -> Result<UnitId, GraphError> {
        let owner_slot = self.slot(owner)?;
        let Some(owner_canvas) = &owner_slot.canvas else {
            return Err(GraphError::NotASubgraph(owner));
        };
        let boundary = match unit.boundary() {
            Some(side) => {
                let ports = grow_ports(owner_slot.ports, side, unit.ports())
                    .ok_or(GraphError::BoundaryOrder { unit: owner })?;
                let index = match side {
                    Boundary::Inlet => owner_canvas.inlets.len(),
                    Boundary::Outlet => owner_canvas.outlets.len(),
                };
                Some((side, index, ports))
            }
            None => None,
        };

        let id = self.insert(Some(owner), unit, canvas);
        let owner_slot = self.slot_mut(owner)?;
        if let Some((_, _, ports)) = boundary {
            owner_slot.ports = ports;
            owner_slot.lets.grow(ports);
            owner_slot.inlet_buffers.resize(ports.stream_inlets, BufferId::ZERO);
            owner_slot.outlet_buffers.resize(ports.stream_outlets, BufferId::ZERO);
            owner_slot
                .outlet_sources
                .resize(ports.stream_outlets, OutletSource::Pooled);
        }
        if let Some(owner_canvas) = owner_slot.canvas.as_mut() {
            owner_canvas.children.push(id);
            match boundary {
                Some((Boundary::Inlet, ..)) => owner_canvas.inlets.push(id),
                Some((Boundary::Outlet, ..)) => owner_canvas.outlets.push(id),
                None => {}
            }
        }
        if let Some((side, index, _)) = boundary {
            self.slot_mut(id)?.boundary = Some((side, index));
            tracing::debug!("graph_boundary: {id} is {side:?} {index} of {owner}");
        }
        Ok(id)
    }

    fn remove_tree(&mut self, id: UnitId) -> Result<Box<dyn Unit>, GraphError> {
        let children = self
            .slot(id)?
            .canvas
            .as_ref()
            .map(|c| c.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_tree(child)?;
        }

        let slot = self.slot(id)?;
        let incoming: Vec<Connection> = slot.lets.all_incoming().map(|(_, c)| c).collect();
        let outgoing: Vec<Connection> = slot.lets.all_outgoing().collect();
        for conn in incoming.into_iter().chain(outgoing) {
            self.disconnect_internal(conn);
        }

        let slot = self.slots[id.0 as usize]
            .take()
            .ok_or(GraphError::UnitNotFound(id))?;
        if let Some(registration) = slot.registration {
            self.registry.unregister(id, registration);
        }
        if let Some(canvas) = slot
            .owner
            .and_then(|o| self.slots.get_mut(o.0 as usize))
            .and_then(Option::as_mut)
            .and_then(|o| o.canvas.as_mut())
        {
            canvas.children.retain(|&c| c != id);
        }
        self.unit_count -= 1;
        self.invalidate();
        tracing::debug!("graph_remove: {id} '{}'", slot.label);
        Ok(slot.unit)
    }

    /// Connects `outlet` of `from` to `inlet` of `to`.
    ///
    /// Returns the kind of the new connection.
    pub fn connect(
        &mut self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<ConnectionKind, GraphError> {
        let conn = Connection::new(from, outlet, to, inlet);
        let kind = self.validate(conn)?;

        if self.slot(from)?.lets.has_outgoing(&conn) {
            return Err(GraphError::DuplicateConnection(conn));
        }
        // A stream cycle exists if `to` already reaches `from` over stream edges.
        if kind == ConnectionKind::Stream && self.reaches_over_streams(to, from) {
            return Err(GraphError::CycleDetected(conn));
        }

        self.slot_mut(from)?.lets.add_outgoing(conn);
        let dest = self.slot_mut(to)?;
        dest.lets.add_incoming(kind, conn);
        if kind == ConnectionKind::Stream {
            dest.unit.connectivity_changed(inlet, dest.lets.stream_counts());
        }
        self.invalidate();
        tracing::debug!("graph_connect: {conn} ({kind})");
        Ok(kind)
    }

    /// Removes the connection from `outlet` of `from` to `inlet` of `to`.
    pub fn disconnect(
        &mut self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<(), GraphError> {
        let conn = Connection::new(from, outlet, to, inlet);
        self.slot(to)?;
        if !self.slot(from)?.lets.has_outgoing(&conn) {
            return Err(GraphError::ConnectionNotFound(conn));
        }
        self.disconnect_internal(conn);
        tracing::debug!("graph_disconnect: {conn}");
        Ok(())
    }

    /// Drops the cached order so the next compile rebuilds it.
    pub fn invalidate(&mut self) {
        self.order = None;
    }

    fn disconnect_internal(&mut self, conn: Connection) {
        let kind = match self.slots.get(conn.from.0 as usize) {
            Some(Some(src)) => src.ports.outlet_kind(conn.outlet),
            _ => None,
        }
        .unwrap_or(ConnectionKind::Message);

        if let Some(Some(src)) = self.slots.get_mut(conn.from.0 as usize) {
            src.lets.remove_outgoing(conn);
        }
        if let Some(Some(dest)) = self.slots.get_mut(conn.to.0 as usize)
            && dest.lets.remove_incoming(kind, conn)
            && kind == ConnectionKind::Stream
        {
            dest.unit.connectivity_changed(conn.inlet, dest.lets.stream_counts());
        }
        self.invalidate();
    }

    fn validate(&self, conn: Connection) -> Result<ConnectionKind, GraphError> {
        let src = self.slot(conn.from)?;
        let dest = self.slot(conn.to)?;
        if src.owner != dest.owner {
            return Err(GraphError::CrossGraph(conn));
        }
        let kind = src
            .ports
            .outlet_kind(conn.outlet)
            .ok_or(GraphError::NoSuchOutlet {
                unit: conn.from,
                outlet: conn.outlet,
            })?;
        if conn.inlet >= dest.ports.inlets() {
            return Err(GraphError::NoSuchInlet {
                unit: conn.to,
                inlet: conn.inlet,
            });
        }
        if kind == ConnectionKind::Stream && !dest.ports.accepts_stream(conn.inlet) {
            return Err(GraphError::NotStreamInlet {
                unit: conn.to,
                inlet: conn.inlet,
            });
        }
        Ok(kind)
    }

    /// Depth-first search over stream edges only.
    fn reaches_over_streams(&self, from: UnitId, to: UnitId) -> bool {
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            let idx = current.0 as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;

            if let Some(Some(slot)) = self.slots.get(idx) {
                for outlet in 0..slot.ports.stream_outlets {
                    stack.extend(slot.lets.outgoing(outlet).iter().map(|c| c.to));
                }
            }
        }
        false
    }

    // --- Queries ---

    pub(crate) fn slot(&self, id: UnitId) -> Result<&UnitSlot, GraphError> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(GraphError::UnitNotFound(id))
    }

    pub(crate) fn slot_mut(&mut self, id: UnitId) -> Result<&mut UnitSlot, GraphError> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnitNotFound(id))
    }

    /// Returns true if the unit exists.
    pub fn contains(&self, id: UnitId) -> bool {
        self.slot(id).is_ok()
    }

    /// Ids of all units in insertion order.
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| UnitId(i as u32))
    }

    /// The unit behind `id`.
    pub fn unit(&self, id: UnitId) -> Option<&dyn Unit> {
        self.slot(id).ok().map(|s| s.unit.as_ref())
    }

    /// The unit behind `id`, mutably.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut (dyn Unit + 'static)> {
        self.slot_mut(id).ok().map(|s| s.unit.as_mut())
    }

    /// The subgraph `id` was placed in, or `None` at the top level.
    pub fn owner(&self, id: UnitId) -> Option<UnitId> {
        self.slot(id).ok()?.owner
    }

    /// Returns true if `id` is a subgraph.
    pub fn is_subgraph(&self, id: UnitId) -> bool {
        self.slot(id).is_ok_and(|s| s.canvas.is_some())
    }

    /// Units placed directly inside the subgraph `id`, in insertion order.
    pub fn children(&self, id: UnitId) -> &[UnitId] {
        match self.slot(id) {
            Ok(UnitSlot {
                canvas: Some(canvas),
                ..
            }) => &canvas.children,
            _ => &[],
        }
    }

    /// `id` followed by every unit nested inside it.
    pub fn descendants(&self, id: UnitId) -> Vec<UnitId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Label of the unit behind `id`.
    pub fn label(&self, id: UnitId) -> Option<&str> {
        self.slot(id).ok().map(|s| s.label.as_str())
    }

    /// Declared ports of the unit behind `id`.
    pub fn ports(&self, id: UnitId) -> Option<Ports> {
        self.slot(id).ok().map(|s| s.ports)
    }

    /// Every connection with its kind, grouped by source unit and outlet.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionKind, Connection)> + '_ {
        self.slots.iter().flatten().flat_map(|slot| {
            slot.lets.all_outgoing().map(move |c| {
                let kind = slot
                    .ports
                    .outlet_kind(c.outlet)
                    .unwrap_or(ConnectionKind::Message);
                (kind, c)
            })
        })
    }

    /// Stream connections into `inlet` of `id`.
    pub fn stream_sources(&self, id: UnitId, inlet: usize) -> &[Connection] {
        match self.slot(id) {
            Ok(slot) if inlet < slot.ports.inlets() => slot.lets.stream_sources(inlet),
            _ => &[],
        }
    }

    /// Connections leaving `outlet` of `id`.
    pub fn outgoing(&self, id: UnitId, outlet: usize) -> &[Connection] {
        match self.slot(id) {
            Ok(slot) if outlet < slot.ports.outlets() => slot.lets.outgoing(outlet),
            _ => &[],
        }
    }

    /// Current behavior of the unit behind `id`.
    pub fn behavior(&self, id: UnitId) -> Option<Behavior> {
        self.slot(id).ok().map(|s| s.behavior)
    }

    /// Buffer bound to stream inlet `inlet` of `id` by the last compile.
    pub fn inlet_buffer(&self, id: UnitId, inlet: usize) -> Option<BufferId> {
        self.slot(id).ok()?.inlet_buffers.get(inlet).copied()
    }

    /// Buffer bound to stream outlet `outlet` of `id` by the last compile.
    pub fn outlet_buffer(&self, id: UnitId, outlet: usize) -> Option<BufferId> {
        self.slot(id).ok()?.outlet_buffers.get(outlet).copied()
    }

    /// The named-routing registry.
    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// The named-routing registry, mutably.
    pub fn registry_mut(&mut self) -> &mut NameRegistry {
        &mut self.registry
    }

    /// The buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// The cached order, if the graph has not changed since the last compile.
    pub fn order(&self) -> Option<&CompiledOrder> {
        self.order.as_ref()
    }

    /// Returns true if the cached order is current.
    pub fn is_compiled(&self) -> bool {
        self.order.is_some()
    }
}
