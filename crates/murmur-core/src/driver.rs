//! Block driver.
//!
//! [`Engine::process`] runs one block through three phases:
//!
//! 1. **Draining**: pop every scheduled event due before the end of the block
//!    and hand it back to the unit that scheduled it, which normally sends it
//!    from its outlet. Events stamped before the block start are moved up to
//!    the block start. Message-only units handle what they receive on the
//!    spot, depth first. Computing units queue it.
//! 2. **Computing**: recompile if the topology changed, then run the compiled
//!    order. A unit with queued messages processes its block in segments split
//!    at each message's sample offset and handles each message in between.
//! 3. **Idle**: hand the output bus to the host and advance the block clock.
//!
//! Nothing here allocates once the graph is compiled and the outbox has grown
//! to the depth of the deepest message cascade.

use std::ops::Range;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::diagnostic::{DiagnosticSink, Severity, TracingSink};
use crate::error::GraphError;
use crate::graph::{Behavior, CompiledOrder, ConnectionKind, Graph, OrderStep, Pending, UnitSlot};
use crate::message::{Message, Symbol};
use crate::registry::NameRegistry;
use crate::scheduler::{EventId, EventQueue};
use crate::settings::AudioSettings;
use crate::unit::{
    Boundary, MessageContext, OutletSource, Outgoing, Route, StreamIo, Unit, UnitId,
};

/// Deepest chain of synchronous message deliveries before messages are dropped.
pub const MAX_MESSAGE_DEPTH: usize = 256;

/// Phase of the block driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Between blocks. Topology edits happen here.
    Idle,
    /// Delivering due events.
    Draining,
    /// Running the compiled order.
    Computing,
}

/// A graph together with its event queue, external I/O, and block clock.
pub struct Engine {
    settings: AudioSettings,
    graph: Graph,
    queue: EventQueue,
    block_start: f64,
    state: DriverState,
    host_input: Box<[f32]>,
    host_output: Box<[f32]>,
    outbox: Vec<Outgoing>,
    external: Vec<(Symbol, Message)>,
    scratch: Vec<Box<[f32]>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Engine {
    /// Creates an engine that reports diagnostics through `tracing`.
    pub fn new(settings: AudioSettings) -> Self {
        Self::with_diagnostics(settings, Arc::new(TracingSink))
    }

    /// Creates an engine with a custom diagnostic sink.
    pub fn with_diagnostics(settings: AudioSettings, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        tracing::debug!(
            "engine_new: {} Hz, block {}, {} in / {} out",
            settings.sample_rate,
            settings.block_size,
            settings.input_channels,
            settings.output_channels
        );
        Self {
            settings,
            graph: Graph::new(settings.block_size),
            queue: EventQueue::with_capacity(64),
            block_start: 0.0,
            state: DriverState::Idle,
            host_input: vec![0.0; settings.input_len()].into_boxed_slice(),
            host_output: vec![0.0; settings.output_len()].into_boxed_slice(),
            outbox: Vec::with_capacity(MAX_MESSAGE_DEPTH),
            external: Vec::with_capacity(16),
            scratch: Vec::new(),
            diagnostics,
        }
    }

    /// Engine settings.
    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// The unit graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The pending event queue.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Start time of the next block, in milliseconds.
    pub fn block_start(&self) -> f64 {
        self.block_start
    }

    /// Current driver phase.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The diagnostic sink.
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    // --- Topology ---

    /// Adds a unit. See [`Graph::add_unit`].
    pub fn add_unit(&mut self, unit: Box<dyn Unit>) -> UnitId {
        let id = self.graph.add_unit(unit);
        self.reserve_scratch();
        id
    }

    /// Adds an empty subgraph. See [`Graph::add_subgraph`].
    pub fn add_subgraph(&mut self) -> UnitId {
        self.graph.add_subgraph()
    }

    /// Places a unit inside a subgraph. See [`Graph::add_unit_to`].
    pub fn add_unit_to(&mut self, owner: UnitId, unit: Box<dyn Unit>) -> Result<UnitId, GraphError> {
        let id = self.graph.add_unit_to(owner, unit)?;
        self.reserve_scratch();
        Ok(id)
    }

    /// Places an empty subgraph inside another. See [`Graph::add_subgraph_to`].
    pub fn add_subgraph_to(&mut self, owner: UnitId) -> Result<UnitId, GraphError> {
        self.graph.add_subgraph_to(owner)
    }

    /// Removes a unit, and everything inside it if it is a subgraph, and
    /// cancels every event the removed units had scheduled.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<Box<dyn Unit>, GraphError> {
        let removed = self.graph.descendants(id);
        let unit = self.graph.remove_unit(id)?;
        let dropped: usize = removed.iter().map(|&u| self.queue.remove_unit(u)).sum();
        if dropped > 0 {
            tracing::debug!("engine_remove: dropped {dropped} events for {id}");
        }
        Ok(unit)
    }

    /// Connects two units. See [`Graph::connect`].
    pub fn connect(
        &mut self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<ConnectionKind, GraphError> {
        self.graph.connect(from, outlet, to, inlet)
    }

    /// Disconnects two units. See [`Graph::disconnect`].
    pub fn disconnect(
        &mut self,
        from: UnitId,
        outlet: usize,
        to: UnitId,
        inlet: usize,
    ) -> Result<(), GraphError> {
        self.graph.disconnect(from, outlet, to, inlet)
    }

    /// The unit behind `id`, mutably, for host-side inspection and setup.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut (dyn Unit + 'static)> {
        self.graph.unit_mut(id)
    }

    /// Compiles now instead of at the next block.
    pub fn compile(&mut self) -> &CompiledOrder {
        self.graph.compile()
    }

    // --- Events ---

    /// Schedules `message` to leave `outlet` of `target` at its timestamp.
    pub fn schedule(
        &mut self,
        target: UnitId,
        outlet: usize,
        message: Message,
    ) -> Result<EventId, GraphError> {
        let ports = self.graph.ports(target).ok_or(GraphError::UnitNotFound(target))?;
        if outlet >= ports.outlets() {
            return Err(GraphError::NoSuchOutlet {
                unit: target,
                outlet,
            });
        }
        Ok(self.queue.insert(target, outlet, message))
    }

    /// Cancels a scheduled event. Returns false if it was already delivered.
    pub fn cancel(&mut self, target: UnitId, outlet: usize, id: EventId) -> bool {
        self.queue.remove(target, outlet, id).is_some()
    }

    /// Schedules `message` to leave outlet 0 of every receiver currently
    /// registered under `name`. Returns how many receivers were found.
    pub fn send_to(&mut self, name: &str, message: &Message) -> usize {
        let receivers = self.graph.registry.receivers(name);
        for &id in receivers {
            self.queue.insert(id, 0, message.clone());
        }
        if receivers.is_empty() {
            self.diagnostics
                .report(Severity::Warning, "engine", format_args!("no receiver named '{name}'"));
        }
        receivers.len()
    }

    /// Delivers messages sent to `name` to the host.
    pub fn register_external(&mut self, name: &str) -> bool {
        self.graph.registry.register_external(name)
    }

    /// Stops delivering messages sent to `name` to the host.
    pub fn unregister_external(&mut self, name: &str) -> bool {
        self.graph.registry.unregister_external(name)
    }

    /// Moves host-bound messages collected so far into `into`.
    pub fn take_external(&mut self, into: &mut Vec<(Symbol, Message)>) {
        into.append(&mut self.external);
    }

    // --- Block processing ---

    /// Processes one block.
    ///
    /// `input` and `output` are planar: channel `c` occupies
    /// `c * block_size..(c + 1) * block_size`. Short buffers are padded with
    /// silence; channels nothing writes to come out silent.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len().min(self.host_input.len());
        self.host_input[..n].copy_from_slice(&input[..n]);
        self.host_input[n..].fill(0.0);
        self.host_output.fill(0.0);
        self.graph.registry.clear_buses();

        let block_end = self.block_start + self.settings.block_duration_ms();

        self.state = DriverState::Draining;
        while let Some(event) = self.queue.pop_before(block_end) {
            let mut message = event.message;
            if message.timestamp() < self.block_start {
                message.set_timestamp(self.block_start);
            }
            self.emit_scheduled(event.target, event.outlet, &message);
        }

        self.state = DriverState::Computing;
        self.graph.compile();
        if let Some(order) = self.graph.order.take() {
            for step in order.steps() {
                match *step {
                    OrderStep::Sum { left, right, out } => self.graph.pool.sum_into(left, right, out),
                    OrderStep::Unit(id) => self.run_unit(id),
                }
            }
            self.graph.order = Some(order);
        }

        let n = output.len().min(self.host_output.len());
        output[..n].copy_from_slice(&self.host_output[..n]);
        output[n..].fill(0.0);
        self.block_start = block_end;
        self.state = DriverState::Idle;
    }

    fn run_unit(&mut self, id: UnitId) {
        let block_size = self.settings.block_size;
        let Some(slot) = slot_mut(&mut self.graph.slots, id) else {
            return;
        };

        self.scratch.clear();
        for (outlet, &buffer) in slot.outlet_buffers.iter().enumerate() {
            if slot.outlet_sources[outlet] == OutletSource::Pooled && !buffer.is_zero() {
                self.scratch.push(self.graph.pool.take(buffer));
            } else {
                self.scratch.push(Box::default());
            }
        }

        if slot.pending.is_empty() {
            process_range(
                slot,
                &self.graph.pool,
                &mut self.graph.registry,
                &mut self.scratch,
                &self.host_input,
                &mut self.host_output,
                0..block_size,
            );
        } else {
            let mut last = 0;
            loop {
                let Some(slot) = slot_mut(&mut self.graph.slots, id) else {
                    return;
                };
                let Some(Pending { inlet, message }) = slot.pending.pop_front() else {
                    break;
                };
                let offset = self
                    .settings
                    .sample_offset(message.timestamp(), self.block_start)
                    .max(last);
                if offset > last {
                    process_range(
                        slot,
                        &self.graph.pool,
                        &mut self.graph.registry,
                        &mut self.scratch,
                        &self.host_input,
                        &mut self.host_output,
                        last..offset,
                    );
                    last = offset;
                }

                let mark = self.outbox.len();
                let mut ctx = MessageContext {
                    unit: id,
                    source: &slot.label,
                    settings: &self.settings,
                    block_start: self.block_start,
                    queue: &mut self.queue,
                    outbox: &mut self.outbox,
                    diagnostics: self.diagnostics.as_ref(),
                };
                slot.unit.receive(inlet, &message, &mut ctx);
                self.flush_outbox(mark, 0);
            }

            let Some(slot) = slot_mut(&mut self.graph.slots, id) else {
                return;
            };
            if last < block_size {
                process_range(
                    slot,
                    &self.graph.pool,
                    &mut self.graph.registry,
                    &mut self.scratch,
                    &self.host_input,
                    &mut self.host_output,
                    last..block_size,
                );
            }
            slot.behavior = Behavior::EventFree;
        }

        let Some(slot) = slot_mut(&mut self.graph.slots, id) else {
            return;
        };
        for (outlet, &buffer) in slot.outlet_buffers.iter().enumerate() {
            let samples = std::mem::take(&mut self.scratch[outlet]);
            if slot.outlet_sources[outlet] == OutletSource::Pooled && !buffer.is_zero() {
                self.graph.pool.restore(buffer, samples);
            }
        }
    }

    /// Hands a due event back to the unit that scheduled it.
    fn emit_scheduled(&mut self, target: UnitId, outlet: usize, message: &Message) {
        let Some(slot) = slot_mut(&mut self.graph.slots, target) else {
            return;
        };
        let mark = self.outbox.len();
        let mut ctx = MessageContext {
            unit: target,
            source: &slot.label,
            settings: &self.settings,
            block_start: self.block_start,
            queue: &mut self.queue,
            outbox: &mut self.outbox,
            diagnostics: self.diagnostics.as_ref(),
        };
        slot.unit.emit_scheduled(outlet, message, &mut ctx);
        self.flush_outbox(mark, 0);
    }

    /// Sends `message` along every connection leaving `outlet` of `source`.
    fn send_from(&mut self, source: UnitId, outlet: usize, message: &Message, depth: usize) {
        let count = match slot_ref(&self.graph.slots, source) {
            Some(slot) if outlet < slot.ports.outlets() => slot.lets.fan_out(outlet),
            _ => return,
        };
        for k in 0..count {
            let Some(slot) = slot_ref(&self.graph.slots, source) else {
                return;
            };
            let conn = slot.lets.outgoing(outlet)[k];
            self.deliver(conn.to, conn.inlet, message, depth);
        }
    }

    /// Sends `message` to every receiver of `name`, and to the host if the
    /// name is external.
    fn send_named(&mut self, name: &Symbol, message: &Message, depth: usize) {
        let external = self.graph.registry.is_external(name);
        if external {
            self.external.push((*name, message.clone()));
        }
        let count = self.graph.registry.receivers(name).len();
        if count == 0 && !external {
            self.diagnostics
                .report(Severity::Warning, "engine", format_args!("no receiver named '{name}'"));
        }
        for k in 0..count {
            let id = self.graph.registry.receivers(name)[k];
            self.deliver(id, 0, message, depth);
        }
    }

    fn deliver(&mut self, target: UnitId, inlet: usize, message: &Message, depth: usize) {
        if depth >= MAX_MESSAGE_DEPTH {
            self.diagnostics.report(
                Severity::Error,
                "engine",
                format_args!("message depth limit reached at {target}; dropping '{message}'"),
            );
            return;
        }
        let Some(slot) = slot_mut(&mut self.graph.slots, target) else {
            return;
        };

        // A subgraph hands messages to the unit behind the inlet; a message
        // outlet of a subgraph passes them to the subgraph's outlet.
        match (&slot.canvas, slot.owner, slot.boundary) {
            (Some(canvas), ..) => {
                if let Some(&port) = canvas.inlets.get(inlet) {
                    self.deliver(port, 0, message, depth + 1);
                }
                return;
            }
            (None, Some(owner), Some((Boundary::Outlet, index))) if !slot.ports.has_streams() => {
                self.send_from(owner, index, message, depth + 1);
                return;
            }
            _ => {}
        }

        if slot.unit.performs_computation() {
            let timestamp = message.timestamp();
            let pos = slot
                .pending
                .iter()
                .rposition(|p| p.message.timestamp() <= timestamp)
                .map_or(0, |i| i + 1);
            slot.pending.insert(
                pos,
                Pending {
                    inlet,
                    message: message.clone(),
                },
            );
            slot.behavior = Behavior::EventAware;
            return;
        }

        let mark = self.outbox.len();
        let mut ctx = MessageContext {
            unit: target,
            source: &slot.label,
            settings: &self.settings,
            block_start: self.block_start,
            queue: &mut self.queue,
            outbox: &mut self.outbox,
            diagnostics: self.diagnostics.as_ref(),
        };
        slot.unit.receive(inlet, message, &mut ctx);
        self.flush_outbox(mark, depth);
    }

    /// Dispatches everything emitted since `mark`, in emission order.
    fn flush_outbox(&mut self, mark: usize, depth: usize) {
        let end = self.outbox.len();
        for i in mark..end {
            let Outgoing {
                source,
                route,
                message,
            } = self.outbox[i].clone();
            match route {
                Route::Outlet(outlet) => self.send_from(source, outlet, &message, depth + 1),
                Route::Named(name) => self.send_named(&name, &message, depth + 1),
            }
        }
        self.outbox.truncate(mark);
    }

    fn reserve_scratch(&mut self) {
        let widest = self
            .graph
            .slots
            .iter()
            .flatten()
            .map(|s| s.ports.stream_outlets)
            .max()
            .unwrap_or(0);
        self.scratch.reserve(widest.saturating_sub(self.scratch.len()));
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("units", &self.graph.len())
            .field("pending_events", &self.queue.len())
            .field("block_start", &self.block_start)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn slot_ref(slots: &[Option<UnitSlot>], id: UnitId) -> Option<&UnitSlot> {
    slots.get(id.index() as usize).and_then(Option::as_ref)
}

fn slot_mut(slots: &mut [Option<UnitSlot>], id: UnitId) -> Option<&mut UnitSlot> {
    slots.get_mut(id.index() as usize).and_then(Option::as_mut)
}

fn process_range(
    slot: &mut UnitSlot,
    pool: &BufferPool,
    registry: &mut NameRegistry,
    outlets: &mut [Box<[f32]>],
    host_input: &[f32],
    host_output: &mut [f32],
    range: Range<usize>,
) {
    let named = registry.named_mut(slot.handle);
    let mut io = StreamIo::new(pool, &slot.inlet_buffers, outlets, named, host_input, host_output);
    slot.unit.process(&mut io, range);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostic::CollectingSink;
    use crate::graph::tests::Relay;
    use crate::message::symbol;
    use crate::unit::{Ports, Registration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes a constant to its outlet.
    pub(crate) struct Const(pub f32);

    impl Unit for Const {
        fn label(&self) -> &str {
            "const~"
        }
        fn ports(&self) -> Ports {
            Ports::new(0, 0, 0, 1)
        }
        fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
            io.outlet(0)[range].fill(self.0);
        }
    }

    /// Holds the last float received and writes it to its outlet.
    pub(crate) struct Step(pub f32);

    impl Unit for Step {
        fn label(&self) -> &str {
            "step~"
        }
        fn ports(&self) -> Ports {
            Ports::new(1, 0, 0, 1)
        }
        fn receive(&mut self, _inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
            if let Some(v) = message.float_at(0) {
                self.0 = v;
            }
        }
        fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
            io.outlet(0)[range].fill(self.0);
        }
    }

    /// Adds its inlet into host output channel 0.
    pub(crate) struct Out;

    impl Unit for Out {
        fn label(&self) -> &str {
            "out~"
        }
        fn ports(&self) -> Ports {
            Ports::new(0, 1, 0, 0)
        }
        fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
            let (ins, outs) = io.split();
            let input = ins.inlet(0);
            if let Some(out) = outs.host_output(0) {
                for i in range {
                    out[i] += input[i];
                }
            }
        }
        fn is_sink(&self) -> bool {
            true
        }
    }

    /// Forwards whatever it receives to a named receiver.
    pub(crate) struct Shout(pub &'static str);

    impl Unit for Shout {
        fn label(&self) -> &str {
            "shout"
        }
        fn ports(&self) -> Ports {
            Ports::messages(1, 0)
        }
        fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
            ctx.send_to(self.0, message.clone());
        }
    }

    /// Counts messages received under a name and passes them on.
    pub(crate) struct Count {
        pub name: &'static str,
        pub hits: Arc<AtomicUsize>,
    }

    impl Unit for Count {
        fn label(&self) -> &str {
            "count"
        }
        fn ports(&self) -> Ports {
            Ports::messages(1, 1)
        }
        fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            ctx.send(0, message.clone());
        }
        fn registration(&self) -> Option<Registration> {
            Some(Registration::Receiver {
                name: symbol(self.name),
            })
        }
    }

    /// Subgraph port for tests. Message inlets pass messages on.
    struct Port {
        side: Boundary,
        ports: Ports,
    }

    impl Unit for Port {
        fn label(&self) -> &str {
            "port"
        }
        fn ports(&self) -> Ports {
            self.ports
        }
        fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
            if self.ports.message_outlets > 0 {
                ctx.send(0, message.clone());
            }
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

    fn one_ms_settings() -> AudioSettings {
        AudioSettings::new(1000.0, 8, 0, 1)
    }

    #[test]
    fn test_source_reaches_host_output() {
        let mut engine = Engine::new(one_ms_settings());
        let src = engine.add_unit(Box::new(Const(0.25)));
        let out = engine.add_unit(Box::new(Out));
        engine.connect(src, 0, out, 0).unwrap();

        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [0.25; 8]);
        assert_eq!(engine.block_start(), 8.0);
        assert_eq!(engine.state(), DriverState::Idle);
    }

    #[test]
    fn test_unconnected_sink_reads_silence() {
        let mut engine = Engine::new(one_ms_settings());
        engine.add_unit(Box::new(Out));
        let mut output = [1.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [0.0; 8]);
    }

    #[test]
    fn test_message_splits_block_at_sample_offset() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let step = engine.add_unit(Box::new(Step(0.0)));
        let out = engine.add_unit(Box::new(Out));
        engine.connect(relay, 0, step, 0).unwrap();
        engine.connect(step, 0, out, 0).unwrap();

        engine.schedule(relay, 0, Message::float(3.0, 2.0)).unwrap();
        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(engine.graph().behavior(step), Some(Behavior::EventFree));
    }

    #[test]
    fn test_late_event_clamps_to_block_start() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let step = engine.add_unit(Box::new(Step(0.0)));
        let out = engine.add_unit(Box::new(Out));
        engine.connect(relay, 0, step, 0).unwrap();
        engine.connect(step, 0, out, 0).unwrap();

        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        engine.schedule(relay, 0, Message::float(1.0, 5.0)).unwrap();
        engine.process(&[], &mut output);
        assert_eq!(output, [5.0; 8]);
    }

    #[test]
    fn test_future_event_waits_for_its_block() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let step = engine.add_unit(Box::new(Step(0.0)));
        let out = engine.add_unit(Box::new(Out));
        engine.connect(relay, 0, step, 0).unwrap();
        engine.connect(step, 0, out, 0).unwrap();

        engine.schedule(relay, 0, Message::float(10.0, 1.0)).unwrap();
        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [0.0; 8]);
        assert_eq!(engine.queue().len(), 1);
        engine.process(&[], &mut output);
        assert_eq!(output, [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_schedule_rejects_bad_outlet() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        assert!(matches!(
            engine.schedule(relay, 3, Message::bang(0.0)),
            Err(GraphError::NoSuchOutlet { outlet: 3, .. })
        ));
    }

    #[test]
    fn test_cancel_and_remove_purge_events() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let id = engine.schedule(relay, 0, Message::bang(1.0)).unwrap();
        engine.schedule(relay, 0, Message::bang(2.0)).unwrap();
        assert!(engine.cancel(relay, 0, id));
        assert!(!engine.cancel(relay, 0, id));
        engine.remove_unit(relay).unwrap();
        assert!(engine.queue().is_empty());
    }

    #[test]
    fn test_message_loop_stops_at_depth_limit() {
        let sink = Arc::new(CollectingSink::new());
        let mut engine = Engine::with_diagnostics(one_ms_settings(), sink.clone());
        let relay = engine.add_unit(Box::new(Relay));
        engine.connect(relay, 0, relay, 0).unwrap();
        engine.schedule(relay, 0, Message::bang(0.0)).unwrap();

        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        let errors: Vec<_> = sink
            .drain()
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("depth limit"));
    }

    #[test]
    fn test_named_send_reaches_receivers_and_host() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let shout = engine.add_unit(Box::new(Shout("tempo")));
        engine.add_unit(Box::new(Count {
            name: "tempo",
            hits: hits.clone(),
        }));
        engine.connect(relay, 0, shout, 0).unwrap();
        engine.register_external("tempo");

        engine.schedule(relay, 0, Message::float(0.0, 120.0)).unwrap();
        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        let mut external = Vec::new();
        engine.take_external(&mut external);
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].0.as_str(), "tempo");
        assert_eq!(external[0].1.float_at(0), Some(120.0));
    }

    #[test]
    fn test_host_send_to_leaves_each_receiver() {
        let received = Arc::new(AtomicUsize::new(0));
        let tally = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new(one_ms_settings());
        let end = engine.add_unit(Box::new(Count {
            name: "tally",
            hits: tally.clone(),
        }));
        for _ in 0..2 {
            let id = engine.add_unit(Box::new(Count {
                name: "go",
                hits: received.clone(),
            }));
            engine.connect(id, 0, end, 0).unwrap();
        }

        assert_eq!(engine.send_to("go", &Message::bang(0.0)), 2);
        assert_eq!(engine.send_to("nobody", &Message::bang(0.0)), 0);
        assert_eq!(engine.queue().len(), 2);

        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(received.load(Ordering::Relaxed), 0);
        assert_eq!(tally.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_nan_timestamp_does_not_stall_queue() {
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let step = engine.add_unit(Box::new(Step(0.0)));
        let out = engine.add_unit(Box::new(Out));
        engine.connect(relay, 0, step, 0).unwrap();
        engine.connect(step, 0, out, 0).unwrap();

        engine.schedule(relay, 0, Message::float(2.0, 1.0)).unwrap();
        engine.schedule(relay, 0, Message::float(f64::NAN, 3.0)).unwrap();
        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [3.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        assert!(engine.queue().is_empty());
    }

    #[test]
    fn test_messages_cross_subgraph_ports() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut engine = Engine::new(one_ms_settings());
        let relay = engine.add_unit(Box::new(Relay));
        let sub = engine.add_subgraph();
        let inlet = engine
            .add_unit_to(
                sub,
                Box::new(Port {
                    side: Boundary::Inlet,
                    ports: Ports::messages(1, 1),
                }),
            )
            .unwrap();
        let stream_out = engine
            .add_unit_to(
                sub,
                Box::new(Port {
                    side: Boundary::Outlet,
                    ports: Ports::new(1, 1, 0, 1),
                }),
            )
            .unwrap();
        let message_out = engine
            .add_unit_to(
                sub,
                Box::new(Port {
                    side: Boundary::Outlet,
                    ports: Ports::messages(1, 0),
                }),
            )
            .unwrap();
        let step = engine.add_unit_to(sub, Box::new(Step(0.0))).unwrap();
        let inner = engine.add_unit_to(sub, Box::new(Relay)).unwrap();
        engine.connect(inlet, 0, step, 0).unwrap();
        engine.connect(step, 0, stream_out, 0).unwrap();
        engine.connect(inlet, 0, inner, 0).unwrap();
        engine.connect(inner, 0, message_out, 0).unwrap();

        let out = engine.add_unit(Box::new(Out));
        let count = engine.add_unit(Box::new(Count {
            name: "unused",
            hits: hits.clone(),
        }));
        engine.connect(relay, 0, sub, 0).unwrap();
        engine.connect(sub, 0, out, 0).unwrap();
        engine.connect(sub, 1, count, 0).unwrap();

        engine.schedule(relay, 0, Message::float(0.0, 0.5)).unwrap();
        let mut output = [0.0f32; 8];
        engine.process(&[], &mut output);
        assert_eq!(output, [0.5; 8]);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_removing_subgraph_drops_inner_events() {
        let mut engine = Engine::new(one_ms_settings());
        let sub = engine.add_subgraph();
        let inner = engine.add_unit_to(sub, Box::new(Relay)).unwrap();
        engine.schedule(inner, 0, Message::bang(5.0)).unwrap();
        engine.remove_unit(sub).unwrap();
        assert!(engine.queue().is_empty());
        assert!(engine.graph().is_empty());
    }
}
