//! Process-order compiler.
//!
//! Compilation walks the graph backward from its terminal units and emits a
//! flat list of [`OrderStep`]s in which every stream producer runs before its
//! consumers. Buffers are bound along the way:
//!
//! - an inlet with no stream source reads the shared zero buffer;
//! - an inlet with one source reads that source's outlet buffer;
//! - an inlet with several sources reads the end of a chain of implicit
//!   binary sums, each written into a freshly acquired buffer.
//!
//! A unit's outlet buffers are acquired before its inlet buffers are released,
//! so a unit never reads and writes the same buffer. Units that do no sample
//! computation are bound but left out of the order.
//!
//! Some predecessors only constrain order and exchange no buffer: message
//! sources, the emitters of a collector's link, and the owners of a delay
//! line a reader taps. They are visited first unless they depend over
//! streams on a unit whose inputs are still being resolved, as in a message
//! feedback loop. Such a predecessor is placed right after the unit instead,
//! once its stream inputs are bound.
//!
//! A subgraph resolves its inlets, then places its contents with a local pass
//! of the same kind, then takes its outlet buffers from its outlet units.
//! Units inside a subgraph are reached through their owner.

use std::fmt;

use super::{Graph, UnitSlot};
use crate::buffer::BufferId;
use crate::registry::Handle;
use crate::unit::{Boundary, OutletSource, Registration, StoreKind, UnitId};

/// Progress of one unit through a compile pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Visit {
    Unvisited,
    /// Stream inputs are being resolved.
    InProgress,
    /// A subgraph with bound inlets whose contents are being placed.
    Local,
    Done,
}

/// One step of a compiled order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStep {
    /// Run a unit's per-block processing.
    Unit(UnitId),
    /// Implicit fan-in sum: `out = left + right`.
    Sum {
        /// First addend.
        left: BufferId,
        /// Second addend.
        right: BufferId,
        /// Destination, distinct from both addends.
        out: BufferId,
    },
}

impl fmt::Display for OrderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(id) => write!(f, "Process {id}"),
            Self::Sum { left, right, out } => write!(f, "Sum {left} + {right} -> {out}"),
        }
    }
}

/// Flat, dependency-ordered execution plan for one graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledOrder {
    steps: Vec<OrderStep>,
    buffers: usize,
}

impl CompiledOrder {
    /// All steps in execution order.
    pub fn steps(&self) -> &[OrderStep] {
        &self.steps
    }

    /// Units in execution order, without the implicit sums.
    pub fn units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.steps.iter().filter_map(|step| match step {
            OrderStep::Unit(id) => Some(*id),
            OrderStep::Sum { .. } => None,
        })
    }

    /// Position of `id` among [`units`](Self::units).
    pub fn position(&self, id: UnitId) -> Option<usize> {
        self.units().position(|u| u == id)
    }

    /// Number of implicit sums.
    pub fn sum_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, OrderStep::Sum { .. }))
            .count()
    }

    /// Pool buffers allocated when this order was built.
    pub fn buffer_count(&self) -> usize {
        self.buffers
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing needs to run.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Graph {
    /// Compiles the graph, reusing the cached order if nothing changed.
    pub fn compile(&mut self) -> &CompiledOrder {
        let order = match self.order.take() {
            Some(order) => order,
            None => self.build_order(),
        };
        self.order.insert(order)
    }

    fn build_order(&mut self) -> CompiledOrder {
        self.pool.reset();
        for slot in self.slots.iter_mut().flatten() {
            slot.visit = Visit::Unvisited;
            slot.inlet_buffers.fill(BufferId::ZERO);
            slot.outlet_buffers.fill(BufferId::ZERO);
        }

        let mut steps = Vec::with_capacity(self.len());
        let roots: Vec<UnitId> = self
            .unit_ids()
            .filter(|&id| self.slot(id).is_ok_and(|s| s.owner.is_none() && is_root(s)))
            .collect();
        for id in roots {
            self.visit(id, &mut steps);
        }
        // Anything left hangs off a message cycle or a named relation.
        let rest: Vec<UnitId> = self.unit_ids().collect();
        for id in rest {
            self.visit(id, &mut steps);
        }

        let order = CompiledOrder {
            steps,
            buffers: self.pool.len(),
        };
        tracing::debug!(
            "graph_compile: {} steps, {} implicit sums, {} buffers",
            order.len(),
            order.sum_count(),
            order.buffer_count()
        );
        for step in order.steps() {
            tracing::trace!("  {step}");
        }
        order
    }

    fn visit(&mut self, id: UnitId, steps: &mut Vec<OrderStep>) {
        let Some(slot) = self.slots.get(id.0 as usize).and_then(Option::as_ref) else {
            return;
        };
        if slot.visit != Visit::Unvisited {
            return;
        }
        if let Some(owner) = slot.owner
            && self.visit_state(owner) == Some(Visit::Unvisited)
        {
            self.visit(owner, steps);
            if self.visit_state(id) != Some(Visit::Unvisited) {
                return;
            }
        }
        self.set_visit(id, Visit::InProgress);

        let mut deferred = Vec::new();
        for parent in self.ordering_parents(id) {
            if self.waits_on_pending(parent) {
                deferred.push(parent);
            } else {
                self.visit(parent, steps);
            }
        }

        let stream_inlets = self.slot(id).map_or(0, |s| s.ports.stream_inlets);
        let inlet_buffers: Vec<BufferId> = (0..stream_inlets)
            .map(|inlet| self.resolve_inlet(id, inlet, steps))
            .collect();

        if self.is_subgraph(id) {
            self.place_contents(id, &inlet_buffers, steps);
        } else {
            self.bind_outlets(id, &inlet_buffers, steps);
        }
        self.set_visit(id, Visit::Done);

        for parent in deferred {
            if !self.waits_on_pending(parent) {
                self.visit(parent, steps);
            }
        }
    }

    /// Predecessors that constrain order without sharing a buffer.
    fn ordering_parents(&self, id: UnitId) -> Vec<UnitId> {
        let Ok(slot) = self.slot(id) else {
            return Vec::new();
        };
        let mut parents: Vec<UnitId> = (0..slot.ports.inlets())
            .flat_map(|inlet| slot.lets.message_sources(inlet).iter().map(|c| c.from))
            .collect();
        match (slot.registration, slot.handle) {
            (Some(Registration::Collector { .. }), Some(Handle::Link(link))) => {
                parents.extend_from_slice(self.registry.emitters(link));
            }
            (
                Some(Registration::StoreAccess {
                    kind: StoreKind::DelayLine,
                    ..
                }),
                Some(Handle::Store(store)),
            ) => parents.extend_from_slice(self.registry.store_owners(store)),
            _ => {}
        }
        parents
    }

    /// Returns true if placing `start` now would read the outputs of a unit
    /// whose inputs are still being resolved.
    fn waits_on_pending(&self, start: UnitId) -> bool {
        let mut seen = vec![false; self.slots.len()];
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let idx = id.0 as usize;
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            let Some(slot) = self.slots.get(idx).and_then(Option::as_ref) else {
                continue;
            };
            match slot.visit {
                Visit::Done => continue,
                Visit::InProgress | Visit::Local => return true,
                Visit::Unvisited => {}
            }

            for inlet in 0..slot.ports.stream_inlets {
                stack.extend(slot.lets.stream_sources(inlet).iter().map(|c| c.from));
            }
            if let Some(owner) = slot.owner {
                match self.visit_state(owner) {
                    Some(Visit::Unvisited) => stack.push(owner),
                    Some(Visit::InProgress)
                        if matches!(slot.boundary, Some((Boundary::Inlet, _))) =>
                    {
                        return true;
                    }
                    _ => {}
                }
            }
            if let Some(canvas) = &slot.canvas {
                stack.extend_from_slice(&canvas.children);
            }
        }
        false
    }

    /// Binds a plain unit's outlets and schedules it.
    fn bind_outlets(&mut self, id: UnitId, inlet_buffers: &[BufferId], steps: &mut Vec<OrderStep>) {
        let owner_fan_out = self.owner_fan_out(id);
        let Some(slot) = self.slots.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return;
        };
        let mut unread = Vec::new();
        for outlet in 0..slot.ports.stream_outlets {
            let mut fan_out = slot.lets.fan_out(outlet);
            if outlet == 0 {
                fan_out += owner_fan_out;
            }
            let source = slot.unit.outlet_source(outlet);
            let buffer = match source {
                // Unread outlets stay charged until every outlet is bound so
                // no two outlets of one unit share a buffer.
                OutletSource::Pooled if fan_out == 0 => {
                    let buffer = self.pool.acquire(1);
                    unread.push(buffer);
                    buffer
                }
                OutletSource::Pooled => self.pool.acquire(fan_out),
                OutletSource::Forward(inlet) => {
                    let forwarded = inlet_buffers.get(inlet).copied().unwrap_or(BufferId::ZERO);
                    self.pool.reserve(forwarded, fan_out);
                    forwarded
                }
            };
            slot.outlet_buffers[outlet] = buffer;
            slot.outlet_sources[outlet] = source;
        }

        for &buffer in unread.iter().chain(inlet_buffers) {
            self.pool.release(buffer);
        }
        slot.inlet_buffers.copy_from_slice(inlet_buffers);

        if slot.unit.performs_computation() {
            steps.push(OrderStep::Unit(id));
        }
    }

    /// Places a subgraph's contents between its bound inlets and its outlets.
    fn place_contents(&mut self, id: UnitId, inlet_buffers: &[BufferId], steps: &mut Vec<OrderStep>) {
        let Ok(slot) = self.slot_mut(id) else {
            return;
        };
        slot.inlet_buffers.copy_from_slice(inlet_buffers);
        slot.visit = Visit::Local;
        let (children, outlets) = match &slot.canvas {
            Some(canvas) => (canvas.children.clone(), canvas.outlets.clone()),
            None => return,
        };

        let roots: Vec<UnitId> = children
            .iter()
            .copied()
            .filter(|&child| self.slot(child).is_ok_and(is_root))
            .collect();
        for child in roots {
            self.visit(child, steps);
        }
        for &child in &children {
            if !self.waits_on_pending(child) {
                self.visit(child, steps);
            }
        }

        let outlet_buffers: Vec<BufferId> = outlets
            .iter()
            .map(|&child| match self.slot(child) {
                Ok(inner) if inner.visit == Visit::Done => {
                    inner.outlet_buffers.first().copied().unwrap_or(BufferId::ZERO)
                }
                _ => BufferId::ZERO,
            })
            .collect();
        if let Ok(slot) = self.slot_mut(id) {
            for (bound, buffer) in slot.outlet_buffers.iter_mut().zip(outlet_buffers) {
                *bound = buffer;
            }
        }
        for &buffer in inlet_buffers {
            self.pool.release(buffer);
        }
    }

    /// Readers outside the subgraph of the outlet `id` stands for.
    fn owner_fan_out(&self, id: UnitId) -> usize {
        let Ok(slot) = self.slot(id) else {
            return 0;
        };
        match (slot.owner, slot.boundary) {
            (Some(owner), Some((Boundary::Outlet, index))) => match self.slot(owner) {
                Ok(owner) if index < owner.ports.stream_outlets => owner.lets.fan_out(index),
                _ => 0,
            },
            _ => 0,
        }
    }

    /// The buffer arriving at the subgraph inlet `id` stands for, charged
    /// with one more reader.
    fn boundary_feed(&mut self, id: UnitId, inlet: usize) -> Option<BufferId> {
        let slot = self.slot(id).ok()?;
        let (owner, index) = match (slot.owner, slot.boundary) {
            (Some(owner), Some((Boundary::Inlet, index))) if inlet == 0 => (owner, index),
            _ => return None,
        };
        let buffer = self.slot(owner).ok()?.inlet_buffers.get(index).copied()?;
        self.pool.reserve(buffer, 1);
        Some(buffer)
    }

    /// Binds one stream inlet, compiling its sources first.
    fn resolve_inlet(&mut self, id: UnitId, inlet: usize, steps: &mut Vec<OrderStep>) -> BufferId {
        let sources = match self.slot(id) {
            Ok(slot) => slot.lets.stream_sources(inlet).to_vec(),
            Err(_) => return BufferId::ZERO,
        };
        for conn in &sources {
            self.visit(conn.from, steps);
        }

        let feed = self.boundary_feed(id, inlet);
        let mut buffers = feed.into_iter().chain(sources.iter().map(|conn| {
            self.slots[conn.from.0 as usize]
                .as_ref()
                .map_or(BufferId::ZERO, |src: &UnitSlot| src.outlet_buffers[conn.outlet])
        }));
        let Some(mut acc) = buffers.next() else {
            return BufferId::ZERO;
        };
        let rest: Vec<BufferId> = buffers.collect();
        for right in rest {
            let out = self.pool.acquire(1);
            steps.push(OrderStep::Sum {
                left: acc,
                right,
                out,
            });
            self.pool.release(acc);
            self.pool.release(right);
            acc = out;
        }
        acc
    }

    fn visit_state(&self, id: UnitId) -> Option<Visit> {
        self.slot(id).ok().map(|s| s.visit)
    }

    fn set_visit(&mut self, id: UnitId, visit: Visit) {
        if let Ok(slot) = self.slot_mut(id) {
            slot.visit = visit;
        }
    }
}

/// Terminal units and sinks start a pass.
fn is_root(slot: &UnitSlot) -> bool {
    slot.lets.is_terminal() || slot.unit.is_sink()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Probe, Relay};
    use super::*;
    use crate::graph::ConnectionKind;
    use crate::error::GraphError;
    use crate::message::symbol;
    use crate::unit::{LinkFamily, Ports, StreamIo, Unit};
    use std::ops::Range;

    struct Named {
        registration: Registration,
        ports: Ports,
    }

    impl Unit for Named {
        fn label(&self) -> &str {
            "named~"
        }
        fn ports(&self) -> Ports {
            self.ports
        }
        fn process(&mut self, _io: &mut StreamIo<'_>, _range: Range<usize>) {}
        fn registration(&self) -> Option<Registration> {
            Some(self.registration)
        }
    }

    struct Wire;

    impl Unit for Wire {
        fn label(&self) -> &str {
            "wire~"
        }
        fn ports(&self) -> Ports {
            Ports::new(1, 1, 0, 1)
        }
        fn performs_computation(&self) -> bool {
            false
        }
        fn outlet_source(&self, _outlet: usize) -> OutletSource {
            OutletSource::Forward(0)
        }
    }

    /// Stream in, message out, like an envelope follower.
    struct Follower;

    impl Unit for Follower {
        fn label(&self) -> &str {
            "follow~"
        }
        fn ports(&self) -> Ports {
            Ports::new(1, 1, 1, 0)
        }
        fn process(&mut self, _io: &mut StreamIo<'_>, _range: Range<usize>) {}
    }

    /// Subgraph port that forwards its inlet.
    struct Edge {
        side: Boundary,
        ports: Ports,
    }

    impl Edge {
        fn stream(side: Boundary) -> Self {
            Self {
                side,
                ports: Ports::new(1, 1, 0, 1),
            }
        }

        fn message(side: Boundary) -> Self {
            let outlets = if side == Boundary::Inlet { 1 } else { 0 };
            Self {
                side,
                ports: Ports::messages(1, outlets),
            }
        }
    }

    impl Unit for Edge {
        fn label(&self) -> &str {
            "edge"
        }
        fn ports(&self) -> Ports {
            self.ports
        }
        fn performs_computation(&self) -> bool {
            false
        }
        fn outlet_source(&self, _outlet: usize) -> OutletSource {
            OutletSource::Forward(0)
        }
        fn boundary(&self) -> Option<Boundary> {
            Some(self.side)
        }
    }

    fn assert_no_live_buffers(graph: &Graph) {
        let stats = graph.pool().stats();
        assert_eq!(stats.live, 0, "{stats:?}");
        assert_eq!(stats.acquired, stats.released);
    }

    #[test]
    fn test_chain_order_and_ping_pong() {
        let mut graph = Graph::new(16);
        let c = graph.add_unit(Box::new(Probe::new(1, 0)));
        let b = graph.add_unit(Box::new(Probe::new(1, 1)));
        let a = graph.add_unit(Box::new(Probe::new(0, 1)));
        graph.connect(a, 0, b, 0).unwrap();
        graph.connect(b, 0, c, 0).unwrap();

        let units: Vec<UnitId> = graph.compile().units().collect();
        assert_eq!(units, vec![a, b, c]);
        assert_eq!(graph.pool().len(), 2);
        assert_ne!(graph.outlet_buffer(a, 0), graph.outlet_buffer(b, 0));
        assert_eq!(graph.inlet_buffer(c, 0), graph.outlet_buffer(b, 0));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_unconnected_inlet_reads_zero() {
        let mut graph = Graph::new(16);
        let sink = graph.add_unit(Box::new(Probe::new(2, 0)));
        graph.compile();
        assert_eq!(graph.inlet_buffer(sink, 0), Some(BufferId::ZERO));
        assert_eq!(graph.inlet_buffer(sink, 1), Some(BufferId::ZERO));
        assert!(graph.pool().is_empty());
    }

    #[test]
    fn test_fan_in_inserts_sum_chain() {
        let mut graph = Graph::new(16);
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        let sources: Vec<UnitId> = (0..3)
            .map(|_| graph.add_unit(Box::new(Probe::new(0, 1))))
            .collect();
        for &s in &sources {
            graph.connect(s, 0, sink, 0).unwrap();
        }
        let order = graph.compile().clone();
        assert_eq!(order.sum_count(), 2);
        assert_eq!(order.units().last(), Some(sink));
        let last_sum = order
            .steps()
            .iter()
            .rev()
            .find_map(|s| match s {
                OrderStep::Sum { out, .. } => Some(*out),
                OrderStep::Unit(_) => None,
            })
            .unwrap();
        assert_eq!(graph.inlet_buffer(sink, 0), Some(last_sum));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_fan_out_keeps_buffer_until_last_reader() {
        let mut graph = Graph::new(16);
        let a = graph.add_unit(Box::new(Probe::new(0, 1)));
        let x = graph.add_unit(Box::new(Probe::new(1, 1)));
        let y = graph.add_unit(Box::new(Probe::new(1, 1)));
        let out = graph.add_unit(Box::new(Probe::new(2, 0)));
        graph.connect(a, 0, x, 0).unwrap();
        graph.connect(a, 0, y, 0).unwrap();
        graph.connect(x, 0, out, 0).unwrap();
        graph.connect(y, 0, out, 1).unwrap();
        graph.compile();

        let a_buf = graph.outlet_buffer(a, 0).unwrap();
        assert_ne!(graph.outlet_buffer(x, 0), Some(a_buf), "x must not overwrite a while y still reads it");
        assert_eq!(graph.inlet_buffer(y, 0), Some(a_buf));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_unread_outlets_get_distinct_buffers() {
        let mut graph = Graph::new(16);
        let src = graph.add_unit(Box::new(Probe::new(0, 3)));
        graph.compile();
        let buffers: Vec<_> = (0..3).map(|o| graph.outlet_buffer(src, o).unwrap()).collect();
        assert_ne!(buffers[0], buffers[1]);
        assert_ne!(buffers[1], buffers[2]);
        assert_ne!(buffers[0], buffers[2]);
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_transparent_unit_forwards_and_is_skipped() {
        let mut graph = Graph::new(16);
        let src = graph.add_unit(Box::new(Probe::new(0, 1)));
        let wire = graph.add_unit(Box::new(Wire));
        let a = graph.add_unit(Box::new(Probe::new(1, 0)));
        let b = graph.add_unit(Box::new(Probe::new(1, 0)));
        graph.connect(src, 0, wire, 0).unwrap();
        graph.connect(wire, 0, a, 0).unwrap();
        graph.connect(wire, 0, b, 0).unwrap();

        let order = graph.compile().clone();
        assert!(order.position(wire).is_none());
        let src_buf = graph.outlet_buffer(src, 0);
        assert_eq!(graph.outlet_buffer(wire, 0), src_buf);
        assert_eq!(graph.inlet_buffer(a, 0), src_buf);
        assert_eq!(graph.inlet_buffer(b, 0), src_buf);
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_message_parents_come_first() {
        let mut graph = Graph::new(16);
        let relay = graph.add_unit(Box::new(Relay));
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        let src = graph.add_unit(Box::new(Probe::new(0, 2)));
        graph.connect(relay, 0, sink, 0).unwrap();
        graph.connect(src, 0, sink, 0).unwrap();
        let units: Vec<UnitId> = graph.compile().units().collect();
        assert_eq!(units, vec![src, sink], "message-only units are visited but not scheduled");
    }

    #[test]
    fn test_collector_follows_emitters() {
        let mut graph = Graph::new(16);
        let collector = graph.add_unit(Box::new(Named {
            registration: Registration::Collector {
                family: LinkFamily::Throw,
                name: symbol("mix"),
            },
            ports: Ports::new(0, 0, 0, 1),
        }));
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        graph.connect(collector, 0, sink, 0).unwrap();
        let emitters: Vec<UnitId> = (0..2)
            .map(|_| {
                graph.add_unit(Box::new(Named {
                    registration: Registration::Emitter {
                        family: LinkFamily::Throw,
                        name: symbol("mix"),
                    },
                    ports: Ports::new(1, 1, 0, 0),
                }))
            })
            .collect();

        let order = graph.compile().clone();
        let collector_pos = order.position(collector).unwrap();
        for e in emitters {
            assert!(order.position(e).unwrap() < collector_pos);
        }
        assert!(order.position(sink).unwrap() > collector_pos);
    }

    #[test]
    fn test_message_feedback_does_not_break_stream_order() {
        let mut graph = Graph::new(16);
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        let osc = graph.add_unit(Box::new(Probe::new(1, 1)));
        let follower = graph.add_unit(Box::new(Follower));
        graph.connect(osc, 0, sink, 0).unwrap();
        graph.connect(osc, 0, follower, 0).unwrap();
        assert_eq!(graph.connect(follower, 0, osc, 0), Ok(ConnectionKind::Message));

        let order = graph.compile().clone();
        let osc_buf = graph.outlet_buffer(osc, 0).unwrap();
        assert!(!osc_buf.is_zero());
        assert_eq!(graph.inlet_buffer(follower, 0), Some(osc_buf));
        assert_eq!(graph.inlet_buffer(sink, 0), Some(osc_buf));
        assert!(order.position(osc).unwrap() < order.position(follower).unwrap());
        assert!(order.position(osc).unwrap() < order.position(sink).unwrap());
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_message_loop_through_relay() {
        let mut graph = Graph::new(16);
        let osc = graph.add_unit(Box::new(Probe::new(1, 1)));
        let follower = graph.add_unit(Box::new(Follower));
        let relay = graph.add_unit(Box::new(Relay));
        graph.connect(osc, 0, follower, 0).unwrap();
        graph.connect(follower, 0, relay, 0).unwrap();
        graph.connect(relay, 0, osc, 0).unwrap();

        let order = graph.compile().clone();
        assert_eq!(order.units().collect::<Vec<_>>(), vec![osc, follower]);
        assert_eq!(graph.inlet_buffer(follower, 0), graph.outlet_buffer(osc, 0));
        assert_no_live_buffers(&graph);
    }

    fn pass_through(graph: &mut Graph) -> (UnitId, UnitId) {
        let sub = graph.add_subgraph();
        let inlet = graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Inlet))).unwrap();
        let gain = graph.add_unit_to(sub, Box::new(Probe::new(1, 1))).unwrap();
        let outlet = graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Outlet))).unwrap();
        graph.connect(inlet, 0, gain, 0).unwrap();
        graph.connect(gain, 0, outlet, 0).unwrap();
        (sub, gain)
    }

    #[test]
    fn test_subgraph_contents_run_in_place() {
        let mut graph = Graph::new(16);
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        let (sub, gain) = pass_through(&mut graph);
        let src = graph.add_unit(Box::new(Probe::new(0, 1)));
        graph.connect(src, 0, sub, 0).unwrap();
        graph.connect(sub, 0, sink, 0).unwrap();

        let order = graph.compile().clone();
        assert_eq!(order.units().collect::<Vec<_>>(), vec![src, gain, sink]);
        assert_eq!(graph.inlet_buffer(gain, 0), graph.outlet_buffer(src, 0));
        assert_eq!(graph.outlet_buffer(sub, 0), graph.outlet_buffer(gain, 0));
        assert_eq!(graph.inlet_buffer(sink, 0), graph.outlet_buffer(gain, 0));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_subgraph_outlet_fans_out() {
        let mut graph = Graph::new(16);
        let (sub, gain) = pass_through(&mut graph);
        let a = graph.add_unit(Box::new(Probe::new(1, 1)));
        let b = graph.add_unit(Box::new(Probe::new(1, 0)));
        let c = graph.add_unit(Box::new(Probe::new(1, 0)));
        graph.connect(sub, 0, a, 0).unwrap();
        graph.connect(sub, 0, b, 0).unwrap();
        graph.connect(a, 0, c, 0).unwrap();
        graph.compile();

        let gain_buf = graph.outlet_buffer(gain, 0).unwrap();
        assert_ne!(graph.outlet_buffer(a, 0), Some(gain_buf));
        assert_eq!(graph.inlet_buffer(b, 0), Some(gain_buf));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_nested_subgraphs_sum_at_inlet() {
        let mut graph = Graph::new(16);
        let outer = graph.add_subgraph();
        let inlet = graph.add_unit_to(outer, Box::new(Edge::stream(Boundary::Inlet))).unwrap();
        let inner = graph.add_subgraph_to(outer).unwrap();
        let inner_in = graph.add_unit_to(inner, Box::new(Edge::stream(Boundary::Inlet))).unwrap();
        let local = graph.add_unit_to(inner, Box::new(Probe::new(0, 1))).unwrap();
        let sink = graph.add_unit_to(inner, Box::new(Probe::new(1, 0))).unwrap();
        graph.connect(inlet, 0, inner, 0).unwrap();
        graph.connect(local, 0, inner_in, 0).unwrap();
        graph.connect(inner_in, 0, sink, 0).unwrap();
        let src = graph.add_unit(Box::new(Probe::new(0, 1)));
        graph.connect(src, 0, outer, 0).unwrap();

        let order = graph.compile().clone();
        assert_eq!(order.sum_count(), 1, "outer feed plus the local source");
        let units: Vec<UnitId> = order.units().collect();
        assert_eq!(units.last(), Some(&sink));
        assert!(units.contains(&src) && units.contains(&local));
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_subgraph_ports_follow_boundary_units() {
        let mut graph = Graph::new(16);
        let sub = graph.add_subgraph();
        assert_eq!(graph.ports(sub), Some(Ports::default()));
        graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Inlet))).unwrap();
        graph.add_unit_to(sub, Box::new(Edge::message(Boundary::Inlet))).unwrap();
        graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Outlet))).unwrap();
        graph.add_unit_to(sub, Box::new(Edge::message(Boundary::Outlet))).unwrap();
        assert_eq!(graph.ports(sub), Some(Ports::new(2, 1, 1, 1)));

        assert_eq!(
            graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Inlet))),
            Err(GraphError::BoundaryOrder { unit: sub })
        );
        assert_eq!(
            graph.add_unit_to(sub, Box::new(Edge::stream(Boundary::Outlet))),
            Err(GraphError::BoundaryOrder { unit: sub })
        );
        assert_eq!(graph.children(sub).len(), 4);

        let port = graph.children(sub)[0];
        assert!(matches!(graph.remove_unit(port), Err(GraphError::BoundaryRemoval(id)) if id == port));
        graph.remove_unit(sub).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_collector_after_emitter_in_subgraph() {
        let mut graph = Graph::new(16);
        let collector = graph.add_unit(Box::new(Named {
            registration: Registration::Collector {
                family: LinkFamily::Throw,
                name: symbol("inner"),
            },
            ports: Ports::new(0, 0, 0, 1),
        }));
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        graph.connect(collector, 0, sink, 0).unwrap();
        let sub = graph.add_subgraph();
        let emitter = graph
            .add_unit_to(
                sub,
                Box::new(Named {
                    registration: Registration::Emitter {
                        family: LinkFamily::Throw,
                        name: symbol("inner"),
                    },
                    ports: Ports::new(1, 1, 0, 0),
                }),
            )
            .unwrap();

        let order = graph.compile().clone();
        assert!(order.position(emitter).unwrap() < order.position(collector).unwrap());
        assert_no_live_buffers(&graph);
    }

    #[test]
    fn test_delay_reader_follows_owner() {
        let mut graph = Graph::new(16);
        let reader = graph.add_unit(Box::new(Named {
            registration: Registration::StoreAccess {
                kind: StoreKind::DelayLine,
                name: symbol("echo"),
            },
            ports: Ports::new(1, 0, 0, 1),
        }));
        let sink = graph.add_unit(Box::new(Probe::new(1, 0)));
        graph.connect(reader, 0, sink, 0).unwrap();
        let writer = graph.add_unit(Box::new(Named {
            registration: Registration::StoreOwner {
                kind: StoreKind::DelayLine,
                name: symbol("echo"),
                len: 64,
            },
            ports: Ports::new(1, 1, 0, 0),
        }));

        let order = graph.compile().clone();
        assert!(order.position(writer).unwrap() < order.position(reader).unwrap());
    }

    #[test]
    fn test_recompile_is_stable() {
        let mut graph = Graph::new(16);
        let a = graph.add_unit(Box::new(Probe::new(0, 1)));
        let b = graph.add_unit(Box::new(Probe::new(0, 1)));
        let c = graph.add_unit(Box::new(Probe::new(2, 0)));
        graph.connect(a, 0, c, 0).unwrap();
        graph.connect(b, 0, c, 1).unwrap();
        let first = graph.compile().clone();
        graph.invalidate();
        let second = graph.compile().clone();
        assert_eq!(first, second);
    }
}
