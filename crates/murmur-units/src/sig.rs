//! Message-to-stream converters: `sig~` and `line~`.

use std::ops::Range;

use murmur_core::{Message, MessageContext, Ports, StreamIo, Unit};

use crate::args::BuildContext;

/// `sig~`: outputs the last float received as a constant stream.
#[derive(Debug)]
pub struct Sig {
    value: f32,
}

impl Sig {
    /// Creates a converter holding `value`.
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    /// Builds from arguments: `[value]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.float("sig~", args, 0, 0.0))
    }

    /// Current output value.
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Unit for Sig {
    fn label(&self) -> &str {
        "sig~"
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 0, 0, 1)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
        if let Some(value) = message.float_at(0) {
            self.value = value;
        }
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        io.outlet(0)[range].fill(self.value);
    }
}

/// `line~`: linear ramps.
///
/// - `target time` ramps from the current value to `target` over `time`
///   milliseconds (at least one millisecond);
/// - `target` jumps at once;
/// - `stop` holds the current value.
#[derive(Debug, Default)]
pub struct Line {
    current: f32,
    target: f32,
    slope: f32,
    remaining: f32,
}

impl Line {
    /// Creates a ramp resting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from arguments; `line~` takes none.
    pub fn build(_args: &Message, _ctx: &BuildContext<'_>) -> Self {
        Self::new()
    }

    /// Value of the next sample.
    pub fn current(&self) -> f32 {
        self.current
    }

    fn jump(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.slope = 0.0;
        self.remaining = 0.0;
    }
}

impl Unit for Line {
    fn label(&self) -> &str {
        "line~"
    }

    fn ports(&self) -> Ports {
        Ports::new(2, 0, 0, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        if inlet != 0 {
            return;
        }
        if message.has_selector("stop") {
            let current = self.current;
            self.jump(current);
            return;
        }
        match (message.float_at(0), message.float_at(1)) {
            (Some(target), Some(time)) => {
                let samples = ctx.settings().ms_to_samples(f64::from(time.max(1.0))) as f32;
                self.target = target;
                self.remaining = samples.max(1.0);
                self.slope = (target - self.current) / self.remaining;
            }
            (Some(target), None) => self.jump(target),
            _ => {}
        }
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let out = &mut io.outlet(0)[range];
        if self.remaining <= 0.0 {
            out.fill(self.target);
            self.current = self.target;
            return;
        }
        for sample in out.iter_mut() {
            if self.remaining > 0.0 {
                *sample = self.current;
                self.current += self.slope;
                self.remaining -= 1.0;
                if self.remaining <= 0.0 {
                    self.current = self.target;
                }
            } else {
                *sample = self.target;
            }
        }
    }
}

