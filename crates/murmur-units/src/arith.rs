//! Binary arithmetic, on streams (`+~ -~ *~ /~`) and on messages (`+ *`).
//!
//! Every operator is a zero-sized [`BinaryOp`]; the stream and message units
//! are generic over it. A stream operator works in one of two modes:
//!
//! - [`ArithMode::Scalar`]: the right operand is a float, set by argument or
//!   by a message to the right inlet;
//! - [`ArithMode::Signal`]: both inlets carry streams and are combined sample
//!   by sample.
//!
//! The mode only changes between blocks, when the compiler reports new
//! stream connectivity.

use std::marker::PhantomData;
use std::ops::Range;

use murmur_core::{Message, MessageContext, Ports, Severity, StreamIo, Unit};

use crate::args::BuildContext;

/// How a stream operator gets its right operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithMode {
    /// Right operand is a stored float.
    Scalar,
    /// Right operand is the stream at the right inlet.
    Signal,
}

/// A binary operator on samples.
pub trait BinaryOp: Send + 'static {
    /// Label of the stream unit, e.g. `"+~"`.
    const STREAM_LABEL: &'static str;
    /// Label of the message unit, e.g. `"+"`.
    const MESSAGE_LABEL: &'static str;

    /// Computes `left op right`.
    fn apply(left: f32, right: f32) -> f32;

    /// Checks a new right operand, returning the value to store.
    fn accept_right(value: f32, report: impl FnOnce(std::fmt::Arguments<'_>)) -> f32 {
        let _ = report;
        value
    }
}

/// `left + right`
#[derive(Debug)]
pub struct Add;
/// `left - right`
#[derive(Debug)]
pub struct Subtract;
/// `left * right`
#[derive(Debug)]
pub struct Multiply;
/// `left / right`; a zero divisor set by message or argument becomes 1.
#[derive(Debug)]
pub struct Divide;

impl BinaryOp for Add {
    const STREAM_LABEL: &'static str = "+~";
    const MESSAGE_LABEL: &'static str = "+";
    #[inline]
    fn apply(left: f32, right: f32) -> f32 {
        left + right
    }
}

impl BinaryOp for Subtract {
    const STREAM_LABEL: &'static str = "-~";
    const MESSAGE_LABEL: &'static str = "-";
    #[inline]
    fn apply(left: f32, right: f32) -> f32 {
        left - right
    }
}

impl BinaryOp for Multiply {
    const STREAM_LABEL: &'static str = "*~";
    const MESSAGE_LABEL: &'static str = "*";
    #[inline]
    fn apply(left: f32, right: f32) -> f32 {
        left * right
    }
}

impl BinaryOp for Divide {
    const STREAM_LABEL: &'static str = "/~";
    const MESSAGE_LABEL: &'static str = "/";
    #[inline]
    fn apply(left: f32, right: f32) -> f32 {
        left / right
    }
    fn accept_right(value: f32, report: impl FnOnce(std::fmt::Arguments<'_>)) -> f32 {
        if value == 0.0 {
            report(format_args!("divisor set to zero; using 1"));
            1.0
        } else {
            value
        }
    }
}

/// Stream operator `left op right`.
pub struct StreamArith<Op> {
    right: f32,
    mode: ArithMode,
    op: PhantomData<fn() -> Op>,
}

impl<Op: BinaryOp> StreamArith<Op> {
    /// Creates the operator with a scalar right operand.
    pub fn new(right: f32) -> Self {
        Self {
            right,
            mode: ArithMode::Scalar,
            op: PhantomData,
        }
    }

    /// Builds from arguments: `[right]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        let right = ctx.float(Op::STREAM_LABEL, args, 0, 0.0);
        let right = Op::accept_right(right, |msg| {
            ctx.diagnostics.report(Severity::Warning, Op::STREAM_LABEL, msg);
        });
        Self::new(right)
    }

    /// Current mode.
    pub fn mode(&self) -> ArithMode {
        self.mode
    }

    /// Stored right operand used in scalar mode.
    pub fn right(&self) -> f32 {
        self.right
    }
}

impl<Op: BinaryOp> Unit for StreamArith<Op> {
    fn label(&self) -> &str {
        Op::STREAM_LABEL
    }

    fn ports(&self) -> Ports {
        Ports::new(2, 2, 0, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        if inlet != 1 {
            return;
        }
        if let Some(value) = message.float_at(0) {
            self.right = Op::accept_right(value, |msg| ctx.report(Severity::Warning, msg));
        }
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let left = &ins.inlet(0)[range.clone()];
        let out = &mut outs.outlet(0)[range.clone()];
        match self.mode {
            ArithMode::Scalar => {
                for (o, &l) in out.iter_mut().zip(left) {
                    *o = Op::apply(l, self.right);
                }
            }
            ArithMode::Signal => {
                let right = &ins.inlet(1)[range];
                for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
                    *o = Op::apply(l, r);
                }
            }
        }
    }

    fn connectivity_changed(&mut self, _inlet: usize, stream_sources: &[usize]) {
        let connected = |i: usize| stream_sources.get(i).copied().unwrap_or(0) > 0;
        self.mode = if connected(0) && connected(1) {
            ArithMode::Signal
        } else {
            ArithMode::Scalar
        };
    }
}

/// Message operator: a float on the left inlet outputs `left op right`.
///
/// A bang on the left inlet repeats the last result; a float on the right
/// inlet sets the right operand without output.
pub struct MessageArith<Op> {
    right: f32,
    last: f32,
    op: PhantomData<fn() -> Op>,
}

impl<Op: BinaryOp> MessageArith<Op> {
    /// Creates the operator with the given right operand.
    pub fn new(right: f32) -> Self {
        Self {
            right,
            last: 0.0,
            op: PhantomData,
        }
    }

    /// Builds from arguments: `[right]`, default 0.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        let right = ctx.float(Op::MESSAGE_LABEL, args, 0, 0.0);
        let right = Op::accept_right(right, |msg| {
            ctx.diagnostics.report(Severity::Warning, Op::MESSAGE_LABEL, msg);
        });
        Self::new(right)
    }
}

impl<Op: BinaryOp> Unit for MessageArith<Op> {
    fn label(&self) -> &str {
        Op::MESSAGE_LABEL
    }

    fn ports(&self) -> Ports {
        Ports::messages(2, 1)
    }

    fn receive(&mut self, inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        match inlet {
            0 => {
                if let Some(left) = message.float_at(0) {
                    self.last = Op::apply(left, self.right);
                } else if !message.is_bang_at(0) {
                    return;
                }
                ctx.send(0, Message::float(message.timestamp(), self.last));
            }
            1 => {
                if let Some(value) = message.float_at(0) {
                    self.right = Op::accept_right(value, |msg| ctx.report(Severity::Warning, msg));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_apply() {
        assert_eq!(Add::apply(2.0, 3.0), 5.0);
        assert_eq!(Subtract::apply(2.0, 3.0), -1.0);
        assert_eq!(Multiply::apply(2.0, 3.0), 6.0);
        assert_eq!(Divide::apply(3.0, 2.0), 1.5);
    }

    #[test]
    fn divide_rejects_zero_operand() {
        let mut reported = false;
        assert_eq!(Divide::accept_right(0.0, |_| reported = true), 1.0);
        assert!(reported);
        assert_eq!(Divide::accept_right(4.0, |_| unreachable!()), 4.0);
    }

    #[test]
    fn signal_mode_needs_both_inlets() {
        let mut unit = StreamArith::<Add>::new(0.0);
        unit.connectivity_changed(0, &[1, 0]);
        assert_eq!(unit.mode(), ArithMode::Scalar);
        unit.connectivity_changed(1, &[1, 2]);
        assert_eq!(unit.mode(), ArithMode::Signal);
        unit.connectivity_changed(0, &[0, 2]);
        assert_eq!(unit.mode(), ArithMode::Scalar);
    }
}
