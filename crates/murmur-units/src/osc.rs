//! Oscillators: `phasor~` and `osc~`.
//!
//! Both keep a phase in `[0, 1)` advanced by `frequency / sample_rate` per
//! sample. Frequency comes from the left inlet: a stream when one is
//! connected, otherwise the last float received there or the creation
//! argument. A float on the right inlet resets the phase.

use core::f32::consts::TAU;
use std::ops::Range;

use murmur_core::{Message, MessageContext, Ports, StreamIo, Unit};

use crate::arith::ArithMode;
use crate::args::BuildContext;

/// Phase accumulator shared by the oscillators.
#[derive(Debug, Clone, Copy)]
struct Phase {
    phase: f32,
    frequency: f32,
    sample_rate: f32,
    mode: ArithMode,
}

impl Phase {
    fn new(frequency: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            frequency,
            sample_rate,
            mode: ArithMode::Scalar,
        }
    }

    fn receive(&mut self, inlet: usize, message: &Message) {
        let Some(value) = message.float_at(0) else {
            return;
        };
        match inlet {
            0 => self.frequency = value,
            1 => self.phase = wrap(value),
            _ => {}
        }
    }

    fn connectivity_changed(&mut self, stream_sources: &[usize]) {
        self.mode = if stream_sources.first().copied().unwrap_or(0) > 0 {
            ArithMode::Signal
        } else {
            ArithMode::Scalar
        };
    }

    /// Writes one phase value per sample of `range` through `shape`.
    #[inline]
    fn run(&mut self, io: &mut StreamIo<'_>, range: Range<usize>, shape: impl Fn(f32) -> f32) {
        let (ins, outs) = io.split();
        let frequency = &ins.inlet(0)[range.clone()];
        let out = &mut outs.outlet(0)[range];
        let scale = 1.0 / self.sample_rate;
        match self.mode {
            ArithMode::Scalar => {
                let step = self.frequency * scale;
                for o in out.iter_mut() {
                    *o = shape(self.phase);
                    self.phase = wrap(self.phase + step);
                }
            }
            ArithMode::Signal => {
                for (o, &f) in out.iter_mut().zip(frequency) {
                    *o = shape(self.phase);
                    self.phase = wrap(self.phase + f * scale);
                }
            }
        }
    }
}

#[inline]
fn wrap(phase: f32) -> f32 {
    let wrapped = phase - libm::floorf(phase);
    // Tiny negative phases round up to exactly 1.0.
    if wrapped >= 1.0 { 0.0 } else { wrapped }
}

/// `phasor~`: a rising sawtooth from 0 to 1.
#[derive(Debug)]
pub struct Phasor(Phase);

impl Phasor {
    /// Creates a phasor at `frequency` Hz.
    pub fn new(frequency: f32, sample_rate: f32) -> Self {
        Self(Phase::new(frequency, sample_rate))
    }

    /// Builds from arguments: `[frequency]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.float("phasor~", args, 0, 0.0), ctx.settings.sample_rate)
    }
}

impl Unit for Phasor {
    fn label(&self) -> &str {
        "phasor~"
    }

    fn ports(&self) -> Ports {
        Ports::new(2, 1, 0, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
        self.0.receive(inlet, message);
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        self.0.run(io, range, |phase| phase);
    }

    fn connectivity_changed(&mut self, _inlet: usize, stream_sources: &[usize]) {
        self.0.connectivity_changed(stream_sources);
    }
}

/// `osc~`: a cosine, starting at its peak.
#[derive(Debug)]
pub struct Osc(Phase);

impl Osc {
    /// Creates an oscillator at `frequency` Hz.
    pub fn new(frequency: f32, sample_rate: f32) -> Self {
        Self(Phase::new(frequency, sample_rate))
    }

    /// Builds from arguments: `[frequency]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.float("osc~", args, 0, 0.0), ctx.settings.sample_rate)
    }
}

impl Unit for Osc {
    fn label(&self) -> &str {
        "osc~"
    }

    fn ports(&self) -> Ports {
        Ports::new(2, 1, 0, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
        self.0.receive(inlet, message);
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        self.0.run(io, range, |phase| libm::cosf(TAU * phase));
    }

    fn connectivity_changed(&mut self, _inlet: usize, stream_sources: &[usize]) {
        self.0.connectivity_changed(stream_sources);
    }
}
