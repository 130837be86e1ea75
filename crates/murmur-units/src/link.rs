//! Connectionless stream links and forwarding ports.
//!
//! `throw~`/`catch~` sum many writers into one reader; `send~`/`receive~`
//! copy one writer to many readers. Links are matched by family and name
//! when a unit joins the graph, and the compiler orders every writer of a
//! link before its readers. Buses are cleared at the start of each block.
//!
//! `inlet~` and `outlet~` compute nothing: their outlet forwards the buffer
//! bound to their inlet. Inside a subgraph they become its stream ports, and
//! `inlet`/`outlet` its message ports.

use std::ops::Range;

use murmur_core::{
    Boundary, LinkFamily, Message, MessageContext, OutletSource, Ports, Registration, StreamIo,
    Symbol, Unit,
};

use crate::args::BuildContext;

/// Writes the inlet into a link bus.
#[derive(Debug)]
pub struct LinkWriter {
    family: LinkFamily,
    name: Symbol,
}

impl LinkWriter {
    /// `throw~ name`: adds into the bus.
    pub fn throw(name: Symbol) -> Self {
        Self {
            family: LinkFamily::Throw,
            name,
        }
    }

    /// `send~ name`: overwrites the bus.
    pub fn send(name: Symbol) -> Self {
        Self {
            family: LinkFamily::Send,
            name,
        }
    }

    /// Builds `throw~` from `[name]`.
    pub fn build_throw(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::throw(ctx.name("throw~", args, 0))
    }

    /// Builds `send~` from `[name]`.
    pub fn build_send(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::send(ctx.name("send~", args, 0))
    }

    /// Link name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Unit for LinkWriter {
    fn label(&self) -> &str {
        match self.family {
            LinkFamily::Throw => "throw~",
            LinkFamily::Send => "send~",
        }
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 1, 0, 0)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let input = &ins.inlet(0)[range.clone()];
        let Some(bus) = outs.bus() else {
            return;
        };
        let bus = &mut bus[range];
        match self.family {
            LinkFamily::Throw => {
                for (b, &x) in bus.iter_mut().zip(input) {
                    *b += x;
                }
            }
            LinkFamily::Send => bus.copy_from_slice(input),
        }
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::Emitter {
            family: self.family,
            name: self.name,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

/// Copies a link bus to its outlet.
#[derive(Debug)]
pub struct LinkReader {
    family: LinkFamily,
    name: Symbol,
}

impl LinkReader {
    /// `catch~ name`: reads the sum of every `throw~ name`.
    pub fn catch(name: Symbol) -> Self {
        Self {
            family: LinkFamily::Throw,
            name,
        }
    }

    /// `receive~ name`: reads what `send~ name` wrote.
    pub fn receive(name: Symbol) -> Self {
        Self {
            family: LinkFamily::Send,
            name,
        }
    }

    /// Builds `catch~` from `[name]`.
    pub fn build_catch(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::catch(ctx.name("catch~", args, 0))
    }

    /// Builds `receive~` from `[name]`.
    pub fn build_receive(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::receive(ctx.name("receive~", args, 0))
    }

    /// Link name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Unit for LinkReader {
    fn label(&self) -> &str {
        match self.family {
            LinkFamily::Throw => "catch~",
            LinkFamily::Send => "receive~",
        }
    }

    fn ports(&self) -> Ports {
        Ports::new(0, 0, 0, 1)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (_, outs) = io.split();
        let (bus, out) = outs.bus_and_outlet(0);
        match bus {
            Some(bus) => out[range.clone()].copy_from_slice(&bus[range]),
            None => out[range].fill(0.0),
        }
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::Collector {
            family: self.family,
            name: self.name,
        })
    }
}

/// `inlet~` / `outlet~` pass their input buffer through untouched;
/// `inlet` / `outlet` pass messages.
#[derive(Debug)]
pub struct Port {
    side: Boundary,
    stream: bool,
}

impl Port {
    /// Subpatch stream input.
    pub fn inlet() -> Self {
        Self {
            side: Boundary::Inlet,
            stream: true,
        }
    }

    /// Subpatch stream output.
    pub fn outlet() -> Self {
        Self {
            side: Boundary::Outlet,
            stream: true,
        }
    }

    /// Subpatch message input.
    pub fn message_inlet() -> Self {
        Self {
            side: Boundary::Inlet,
            stream: false,
        }
    }

    /// Subpatch message output. The engine forwards whatever reaches its
    /// inlet out of the owning subgraph.
    pub fn message_outlet() -> Self {
        Self {
            side: Boundary::Outlet,
            stream: false,
        }
    }

    /// Whether this port carries a stream.
    pub fn is_stream(&self) -> bool {
        self.stream
    }
}

impl Unit for Port {
    fn label(&self) -> &str {
        match (self.side, self.stream) {
            (Boundary::Inlet, true) => "inlet~",
            (Boundary::Outlet, true) => "outlet~",
            (Boundary::Inlet, false) => "inlet",
            (Boundary::Outlet, false) => "outlet",
        }
    }

    fn ports(&self) -> Ports {
        match (self.side, self.stream) {
            (_, true) => Ports::new(1, 1, 0, 1),
            (Boundary::Inlet, false) => Ports::messages(1, 1),
            (Boundary::Outlet, false) => Ports::messages(1, 0),
        }
    }

    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        if !self.stream && self.side == Boundary::Inlet {
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
