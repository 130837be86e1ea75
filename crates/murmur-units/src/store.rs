//! Named sample stores: tables and delay lines.
//!
//! A `table` declares a fixed array that `tabwrite~` records into and
//! `tabread~` indexes. A `delwrite~` declares a circular delay line that any
//! number of `delread~` units tap; the compiler runs every reader after the
//! line's writer so a delay of zero reads the current block.

use std::ops::Range;

use murmur_core::{
    AudioSettings, Message, MessageContext, Ports, Registration, StoreKind, StreamIo, Symbol,
    Unit,
};

use crate::args::BuildContext;

/// Table length when `table` gets no size.
pub const DEFAULT_TABLE_SIZE: usize = 1024;

/// Delay line length in milliseconds when `delwrite~` gets none.
pub const DEFAULT_DELAY_MS: f32 = 1000.0;

/// `table name [size]`: owns a named array of samples.
#[derive(Debug)]
pub struct Table {
    name: Symbol,
    len: usize,
}

impl Table {
    /// Declares `name` with `len` samples.
    pub fn new(name: Symbol, len: usize) -> Self {
        Self { name, len }
    }

    /// Builds from `[name, size]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        let name = ctx.name("table", args, 0);
        let len = ctx.float("table", args, 1, DEFAULT_TABLE_SIZE as f32).max(1.0) as usize;
        Self::new(name, len)
    }

    /// Declared length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a table holds at least one sample.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Unit for Table {
    fn label(&self) -> &str {
        "table"
    }

    fn ports(&self) -> Ports {
        Ports::messages(0, 0)
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::StoreOwner {
            kind: StoreKind::Table,
            name: self.name,
            len: self.len,
        })
    }
}

/// `tabwrite~ name`: records its input into a table.
///
/// A bang starts recording from the first sample; `stop` ends it. Recording
/// also ends once the table is full.
#[derive(Debug)]
pub struct TableWriter {
    name: Symbol,
    position: Option<usize>,
}

impl TableWriter {
    /// Creates an idle writer for `name`.
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            position: None,
        }
    }

    /// Builds from `[name]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.name("tabwrite~", args, 0))
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.position.is_some()
    }
}

impl Unit for TableWriter {
    fn label(&self) -> &str {
        "tabwrite~"
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 1, 0, 0)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
        if message.is_bang_at(0) {
            self.position = Some(0);
        } else if message.has_selector("stop") {
            self.position = None;
        }
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let Some(start) = self.position else {
            return;
        };
        let (ins, outs) = io.split();
        let input = &ins.inlet(0)[range];
        let Some(store) = outs.store() else {
            self.position = None;
            return;
        };
        let samples = store.samples_mut();
        let count = input.len().min(samples.len().saturating_sub(start));
        samples[start..start + count].copy_from_slice(&input[..count]);
        let next = start + count;
        self.position = (next < samples.len()).then_some(next);
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::StoreAccess {
            kind: StoreKind::Table,
            name: self.name,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

/// `tabread~ name`: outputs the table sample at each input index.
///
/// Indices are truncated and clamped to the table; a missing or empty table
/// reads zero.
#[derive(Debug)]
pub struct TableReader {
    name: Symbol,
}

impl TableReader {
    /// Creates a reader for `name`.
    pub fn new(name: Symbol) -> Self {
        Self { name }
    }

    /// Builds from `[name]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        Self::new(ctx.name("tabread~", args, 0))
    }
}

impl Unit for TableReader {
    fn label(&self) -> &str {
        "tabread~"
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 1, 0, 1)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let index = &ins.inlet(0)[range.clone()];
        let (store, out) = outs.store_and_outlet(0);
        let out = &mut out[range];
        let samples = store.map(|s| s.samples()).unwrap_or_default();
        let Some(last) = samples.len().checked_sub(1) else {
            out.fill(0.0);
            return;
        };
        for (y, &x) in out.iter_mut().zip(index) {
            let i = if x <= 0.0 { 0 } else { (x as usize).min(last) };
            *y = samples[i];
        }
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::StoreAccess {
            kind: StoreKind::Table,
            name: self.name,
        })
    }
}

/// Delay line length for `ms`: rounded up to whole blocks, plus one block so
/// a reader can reach back the full time behind the block just written.
pub fn delay_line_len(settings: &AudioSettings, ms: f32) -> usize {
    let block = settings.block_size.max(1);
    let samples = settings.ms_to_samples(f64::from(ms.max(0.0)));
    samples.div_ceil(block) * block + block
}

/// `delwrite~ name [ms]`: writes its input into a circular delay line.
#[derive(Debug)]
pub struct DelayWriter {
    name: Symbol,
    len: usize,
}

impl DelayWriter {
    /// Declares a line of `len` samples.
    pub fn new(name: Symbol, len: usize) -> Self {
        Self { name, len }
    }

    /// Builds from `[name, ms]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        let name = ctx.name("delwrite~", args, 0);
        let ms = ctx.float("delwrite~", args, 1, DEFAULT_DELAY_MS);
        Self::new(name, delay_line_len(ctx.settings, ms))
    }

    /// Line length in samples.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a line holds at least one block.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Unit for DelayWriter {
    fn label(&self) -> &str {
        "delwrite~"
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 1, 0, 0)
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let input = &ins.inlet(0)[range];
        let Some(store) = outs.store() else {
            return;
        };
        if store.is_empty() {
            return;
        }
        let len = store.len();
        let mut head = store.head();
        let samples = store.samples_mut();
        for &x in input {
            samples[head] = x;
            head = (head + 1) % len;
        }
        store.set_head(head);
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::StoreOwner {
            kind: StoreKind::DelayLine,
            name: self.name,
            len: self.len,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

/// `delread~ name [ms]`: taps a delay line.
///
/// A float sets the delay. Delays are clamped to what the line holds behind
/// the current block.
#[derive(Debug)]
pub struct DelayReader {
    name: Symbol,
    delay: usize,
}

impl DelayReader {
    /// Creates a tap `delay` samples behind the writer.
    pub fn new(name: Symbol, delay: usize) -> Self {
        Self { name, delay }
    }

    /// Builds from `[name, ms]`.
    pub fn build(args: &Message, ctx: &BuildContext<'_>) -> Self {
        let name = ctx.name("delread~", args, 0);
        let ms = ctx.float("delread~", args, 1, 0.0);
        Self::new(name, ctx.settings.ms_to_samples(f64::from(ms.max(0.0))))
    }

    /// Requested delay in samples.
    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl Unit for DelayReader {
    fn label(&self) -> &str {
        "delread~"
    }

    fn ports(&self) -> Ports {
        Ports::new(1, 0, 0, 1)
    }

    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        if let Some(ms) = message.float_at(0) {
            self.delay = ctx.settings().ms_to_samples(f64::from(ms.max(0.0)));
        }
    }

    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let block = io.block_size();
        let (_, outs) = io.split();
        let (store, out) = outs.store_and_outlet(0);
        let out = &mut out[range.clone()];
        let Some(store) = store.filter(|s| s.len() >= block && !s.is_empty()) else {
            out.fill(0.0);
            return;
        };
        let len = store.len();
        let delay = self.delay.min(len - block);
        let samples = store.samples();
        // The writer already advanced the head past this block.
        let base = store.head() + 2 * len - block - delay;
        for (y, i) in out.iter_mut().zip(range) {
            *y = samples[(base + i) % len];
        }
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::StoreAccess {
            kind: StoreKind::DelayLine,
            name: self.name,
        })
    }
}
