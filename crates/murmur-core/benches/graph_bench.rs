//! Criterion benchmarks for the murmur-core engine.
//!
//! Measures engine overhead independently of DSP cost using a trivial `Gain`
//! unit. Three axes:
//!
//! - **Compile**: process-order compilation (visit, buffer binding, sums)
//! - **Execute**: `Engine::process()` throughput at a fixed block size
//! - **Events**: cost of sample-accurate splits as the event count grows
//!
//! Run with: `cargo bench -p murmur-core -- engine/`
#![allow(missing_docs)]

use std::ops::Range;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use murmur_core::{
    AudioSettings, Engine, Graph, Message, MessageContext, Ports, StreamIo, Unit,
};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZE: usize = 64;
const EVENT_COUNTS: &[usize] = &[0, 1, 4, 16];

// ---------------------------------------------------------------------------
// Trivial units that isolate engine overhead from DSP cost
// ---------------------------------------------------------------------------

/// Writes a constant; its value can be changed by message.
struct Source(f32);

impl Unit for Source {
    fn label(&self) -> &str {
        "source~"
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

/// Multiplies its inlet by a constant.
struct Gain(f32);

impl Unit for Gain {
    fn label(&self) -> &str {
        "gain~"
    }
    fn ports(&self) -> Ports {
        Ports::new(1, 1, 0, 1)
    }
    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let input = ins.inlet(0);
        let out = outs.outlet(0);
        for i in range {
            out[i] = input[i] * self.0;
        }
    }
}

/// Copies its inlet to host output channel 0.
struct Sink;

impl Unit for Sink {
    fn label(&self) -> &str {
        "sink~"
    }
    fn ports(&self) -> Ports {
        Ports::new(0, 1, 0, 0)
    }
    fn process(&mut self, io: &mut StreamIo<'_>, range: Range<usize>) {
        let (ins, outs) = io.split();
        let input = ins.inlet(0);
        if let Some(out) = outs.host_output(0) {
            out[range.clone()].copy_from_slice(&input[range]);
        }
    }
}

fn settings() -> AudioSettings {
    AudioSettings::new(SAMPLE_RATE, BLOCK_SIZE, 0, 1)
}

// ---------------------------------------------------------------------------
// Graph constructors
// ---------------------------------------------------------------------------

/// source -> n gains -> sink, compiled and ready to run.
fn make_linear(n: usize) -> Engine {
    let mut engine = Engine::new(settings());
    let mut prev = engine.add_unit(Box::new(Source(0.5)));
    for _ in 0..n {
        let gain = engine.add_unit(Box::new(Gain(0.9)));
        engine.connect(prev, 0, gain, 0).unwrap();
        prev = gain;
    }
    let sink = engine.add_unit(Box::new(Sink));
    engine.connect(prev, 0, sink, 0).unwrap();
    engine.compile();
    engine
}

/// source -> n gains -> sink, as a bare graph.
fn make_linear_graph(n: usize) -> Graph {
    let mut graph = Graph::new(BLOCK_SIZE);
    let mut prev = graph.add_unit(Box::new(Source(0.5)));
    for _ in 0..n {
        let gain = graph.add_unit(Box::new(Gain(0.9)));
        graph.connect(prev, 0, gain, 0).unwrap();
        prev = gain;
    }
    let sink = graph.add_unit(Box::new(Sink));
    graph.connect(prev, 0, sink, 0).unwrap();
    graph
}

/// n sources summed into one sink through implicit fan-in.
fn make_fan_in(n: usize) -> Graph {
    let mut graph = Graph::new(BLOCK_SIZE);
    let sink = graph.add_unit(Box::new(Sink));
    for _ in 0..n {
        let source = graph.add_unit(Box::new(Source(0.1)));
        graph.connect(source, 0, sink, 0).unwrap();
    }
    graph
}

// ---------------------------------------------------------------------------
// Compile benchmarks
// ---------------------------------------------------------------------------

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/compile");

    for n in [5usize, 20] {
        let mut graph = make_linear_graph(n);
        group.bench_function(format!("linear_{n}"), |b| {
            b.iter(|| {
                graph.invalidate();
                black_box(graph.compile().len());
            });
        });
    }

    // Fan-in of 16 sources: 15 implicit sums
    let mut graph = make_fan_in(16);
    group.bench_function("fan_in_16", |b| {
        b.iter(|| {
            graph.invalidate();
            black_box(graph.compile().sum_count());
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Execute benchmarks
// ---------------------------------------------------------------------------

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/execute");
    let mut output = vec![0.0f32; BLOCK_SIZE];

    for n in [5usize, 20] {
        let mut engine = make_linear(n);
        group.bench_function(format!("linear_{n}_block{BLOCK_SIZE}"), |b| {
            b.iter(|| {
                engine.process(&[], &mut output);
                black_box(&output);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Event sweep: sample-accurate splits per block
// ---------------------------------------------------------------------------

fn bench_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/events");
    let mut output = vec![0.0f32; BLOCK_SIZE];
    let step = settings().ms_per_sample();

    for &count in EVENT_COUNTS {
        let mut engine = Engine::new(settings());
        let feeder = engine.add_unit(Box::new(Feeder));
        let (source, sink) = (
            engine.add_unit(Box::new(Source(0.0))),
            engine.add_unit(Box::new(Sink)),
        );
        engine.connect(feeder, 0, source, 0).unwrap();
        engine.connect(source, 0, sink, 0).unwrap();

        group.bench_with_input(BenchmarkId::new("split", count), &count, |b, &count| {
            b.iter(|| {
                let start = engine.block_start();
                for k in 0..count {
                    let at = start + (k * BLOCK_SIZE / count.max(1)) as f64 * step;
                    engine.schedule(feeder, 0, Message::float(at, k as f32)).unwrap();
                }
                engine.process(&[], &mut output);
                black_box(&output);
            });
        });
    }

    group.finish();
}

/// Message-only forwarder that events are scheduled on.
struct Feeder;

impl Unit for Feeder {
    fn label(&self) -> &str {
        "feeder"
    }
    fn ports(&self) -> Ports {
        Ports::messages(1, 1)
    }
    fn receive(&mut self, _inlet: usize, message: &Message, ctx: &mut MessageContext<'_>) {
        ctx.send(0, message.clone());
    }
}

criterion_group!(benches, bench_compile, bench_execute, bench_events);
criterion_main!(benches);
