//! Host audio input and output.

use std::ops::Range;

use murmur_core::{Message, Ports, StreamIo, Unit};

use crate::args::BuildContext;

/// `adc~`: one stream outlet per host input channel.
#[derive(Debug)]
pub struct Adc {
    channels: usize,
}

impl Adc {
    /// Creates an input with `channels` outlets.
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }

    /// Builds with one outlet per engine input channel.
    pub fn build(_args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.settings.input_channels)
    }
}

impl Unit for Adc {
    fn label(&self) -> &str {
        "adc~"
    }

    fn ports(&self) -> Ports {
        Ports::new(0, 0, 0, self.channels)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        for ch in 0..self.channels {
            let input = &ins.host_input(ch)[range.clone()];
            outs.outlet(ch)[range.clone()].copy_from_slice(input);
        }
    }
}

/// `dac~`: adds each stream inlet into the matching host output channel.
#[derive(Debug)]
pub struct Dac {
    channels: usize,
}

impl Dac {
    /// Creates an output with `channels` inlets.
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }

    /// Builds with one inlet per engine output channel.
    pub fn build(_args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.settings.output_channels)
    }
}

impl Unit for Dac {
    fn label(&self) -> &str {
        "dac~"
    }

    fn ports(&self) -> Ports {
        Ports::new(0, self.channels, 0, 0)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        for ch in 0..self.channels {
            let input = &ins.inlet(ch)[range.clone()];
            if let Some(out) = outs.host_output(ch) {
                for (o, &x) in out[range.clone()].iter_mut().zip(input) {
                    *o += x;
                }
            }
        }
    }

    fn is_sink(&self) -> bool {
        true
    }
}
