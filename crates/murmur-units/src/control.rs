//! Message-only control units.
//!
//! | Label | Aliases | Inlets | Behavior |
//! |-------|---------|--------|----------|
//! | `float` | `f` | 2 | stores and outputs a number |
//! | `metro` | | 2 | bangs every interval |
//! | `delay` | `del` | 2 | bangs once after a delay |
//! | `print` | | 1 | reports every message |
//! | `send` | `s` | 1 | forwards to a named receiver |
//! | `receive` | `r` | 0 | outputs what is sent to its name |

use murmur_core::{
    EventId, Message, MessageContext, Ports, Registration, Severity, Symbol, Unit,
};

use crate::args::BuildContext;

/// `float`: a stored number.
///
/// A float on the left inlet is stored and sent; a bang sends the stored
/// value. A float on the right inlet is stored silently.
#[derive(Debug)]
pub struct Float {
    value: f32,
}

impl Float {
    /// Creates a box holding `value`.
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    /// Builds from `[value]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.float("float", args, 0, 0.0))
    }

    /// Stored value.
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Unit for Float {
    fn label(&self) -> &str {
        "float"
    }

    fn ports(&self) -> Ports {
        Ports::messages(2, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        match (inlet, message.float_at(0)) {
            (0, Some(value)) => {
                self.value = value;
                ctx.send(0, Message::float(message.timestamp(), value));
            }
            (0, None) if message.is_bang_at(0) => {
                ctx.send(0, Message::float(message.timestamp(), self.value));
            }
            (1, Some(value)) => self.value = value,
            _ => {}
        }
    }
}

/// Shortest metronome period; smaller intervals are raised to it.
pub const MIN_INTERVAL_MS: f64 = 1.0;

/// `metro`: a bang now and every `interval` milliseconds after.
///
/// A bang or nonzero float on the left inlet (re)starts the clock; `0` or
/// `stop` halts it. A float on the right inlet sets the interval, taking
/// effect from the next tick.
#[derive(Debug)]
pub struct Metro {
    interval: f64,
    pending: Option<EventId>,
}

impl Metro {
    /// Creates a stopped metronome.
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            pending: None,
        }
    }

    /// Builds from `[interval]`, default 1000 ms.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(f64::from(ctx.float("metro", args, 0, 1000.0)))
    }

    /// Tick interval in milliseconds.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Whether a tick is scheduled.
    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    fn stop(&mut self, ctx: &mut MessageContext<'_>) {
        if let Some(id) = self.pending.take() {
            ctx.cancel(0, id);
        }
    }

    fn tick(&mut self, timestamp: f64, ctx: &mut MessageContext<'_>) {
        let next = Message::bang(timestamp + self.interval.max(MIN_INTERVAL_MS));
        self.pending = Some(ctx.schedule(0, next));
        ctx.send(0, Message::bang(timestamp));
    }
}

impl Unit for Metro {
    fn label(&self) -> &str {
        "metro"
    }

    fn ports(&self) -> Ports {
        Ports::messages(2, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        match inlet {
            0 => {
                let start = match message.float_at(0) {
                    Some(value) => value != 0.0,
                    None if message.is_bang_at(0) => true,
                    None if message.has_selector("stop") => false,
                    None => return,
                };
                self.stop(ctx);
                if start {
                    self.tick(message.timestamp(), ctx);
                }
            }
            1 => {
                if let Some(interval) = message.float_at(0) {
                    self.interval = f64::from(interval);
                }
            }
            _ => {}
        }
    }

    fn emit_scheduled(&mut self, _outlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        self.tick(message.timestamp(), ctx);
    }
}

/// `delay`: one bang `delay` milliseconds after being triggered.
///
/// Any message on the left inlet reschedules the bang, except `stop`,
/// which cancels it. A float on the right inlet cancels and sets the delay.
#[derive(Debug)]
pub struct Delay {
    delay: f64,
    pending: Option<EventId>,
}

impl Delay {
    /// Creates an idle delay.
    pub fn new(delay: f64) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Builds from `[delay]`, default 0 ms.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(f64::from(ctx.float("delay", args, 0, 0.0)))
    }

    /// Delay in milliseconds.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    fn cancel(&mut self, ctx: &mut MessageContext<'_>) {
        if let Some(id) = self.pending.take() {
            ctx.cancel(0, id);
        }
    }
}

impl Unit for Delay {
    fn label(&self) -> &str {
        "delay"
    }

    fn ports(&self) -> Ports {
        Ports::messages(2, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        match inlet {
            0 => {
                self.cancel(ctx);
                if message.is_empty() || message.has_selector("stop") {
                    return;
                }
                let at = message.timestamp() + self.delay;
                self.pending = Some(ctx.schedule(0, Message::bang(at)));
            }
            1 => {
                if let Some(delay) = message.float_at(0) {
                    self.cancel(ctx);
                    self.delay = f64::from(delay);
                }
            }
            _ => {}
        }
    }

    fn emit_scheduled(&mut self, outlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        self.pending = None;
        ctx.send(outlet, message.clone());
    }
}

/// `print`: reports each message with its timestamp.
///
/// The first argument replaces the default `print` prefix; `-n` drops it.
#[derive(Debug)]
pub struct Print {
    prefix: Option<Symbol>,
}

impl Print {
    /// Creates a printer with an optional prefix.
    pub fn new(prefix: Option<Symbol>) -> Self {
        Self { prefix }
    }

    /// Builds from `[prefix]`.
    pub fn build(args: &Message, _ctx: &BuildContext<'_>) -> Self {
        match args.symbol_at(0) {
            Some("-n") => Self::new(None),
            Some(prefix) => Self::new(Some(murmur_core::symbol(prefix))),
            None => Self::new(Some(murmur_core::symbol("print"))),
        }
    }

    /// Prefix put before each message.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

impl Unit for Print {
    fn label(&self) -> &str {
        "print"
    }

    fn ports(&self) -> Ports {
        Ports::messages(1, 0)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        let at = message.timestamp();
        match &self.prefix {
            Some(prefix) => ctx.report(Severity::Info, format_args!("[@ {at:.3}ms] {prefix}: {message}")),
            None => ctx.report(Severity::Info, format_args!("[@ {at:.3}ms] {message}")),
        }
    }
}

/// `send name`: forwards every message to the receivers of `name`.
#[derive(Debug)]
pub struct SendMessage {
    name: Symbol,
}

impl SendMessage {
    /// Creates a sender to `name`.
    pub fn new(name: Symbol) -> Self {
        Self { name }
    }

    /// Builds from `[name]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.name("send", args, 0))
    }
}

impl Unit for SendMessage {
    fn label(&self) -> &str {
        "send"
    }

    fn ports(&self) -> Ports {
        Ports::messages(1, 0)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        ctx.send_to(&self.name, message.clone());
    }
}

/// `receive name`: outputs every message sent to `name`.
#[derive(Debug)]
pub struct ReceiveMessage {
    name: Symbol,
}

impl ReceiveMessage {
    /// Creates a receiver for `name`.
    pub fn new(name: Symbol) -> Self {
        Self { name }
    }

    /// Builds from `[name]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.name("receive", args, 0))
    }
}

impl Unit for ReceiveMessage {
    fn label(&self) -> &str {
        "receive"
    }

    fn ports(&self) -> Ports {
        Ports::messages(0, 1)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        ctx.send(0, message.clone());
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::Receiver { name: self.name })
    }
}
