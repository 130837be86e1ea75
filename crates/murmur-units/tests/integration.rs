//! Integration tests for the murmur-units catalogue.
//!
//! Every patch here is built through the [`UnitRegistry`] exactly as a patch
//! file would be, then run on a 1 kHz engine so one sample is one
//! millisecond.

use std::sync::Arc;

use murmur_core::{
    AudioSettings, CollectingSink, Engine, Message, MessageContext, Ports, Severity, Unit, UnitId,
};
use murmur_units::{BuildContext, UnitRegistry};
use parking_lot::Mutex;

const BLOCK: usize = 8;

struct Patch {
    engine: Engine,
    registry: UnitRegistry,
    sink: Arc<CollectingSink>,
}

impl Patch {
    fn new() -> Self {
        let sink = Arc::new(CollectingSink::new());
        let settings = AudioSettings::new(1000.0, BLOCK, 0, 1);
        Self {
            engine: Engine::with_diagnostics(settings, sink.clone()),
            registry: UnitRegistry::new(),
            sink,
        }
    }

    fn build(&self, text: &str) -> Box<dyn Unit> {
        let (label, args) = text.split_once(' ').unwrap_or((text, ""));
        let settings = *self.engine.settings();
        let ctx = BuildContext::new(&settings, self.sink.as_ref());
        self.registry
            .create(label, &Message::parse(0.0, args), &ctx)
            .unwrap_or_else(|| panic!("unknown label {label}"))
    }

    /// Creates a unit from a box text such as `"osc~ 440"`.
    fn add(&mut self, text: &str) -> UnitId {
        let unit = self.build(text);
        self.engine.add_unit(unit)
    }

    /// Creates a unit inside the subgraph `owner`.
    fn add_to(&mut self, owner: UnitId, text: &str) -> UnitId {
        let unit = self.build(text);
        self.engine.add_unit_to(owner, unit).unwrap()
    }

    /// Sends `value` to `name` at the start of the next block.
    fn send(&mut self, name: &str, value: f32) {
        let at = self.engine.block_start();
        self.engine.send_to(name, &Message::float(at, value));
    }

    fn tap(&mut self) -> (UnitId, Arc<Mutex<Vec<Message>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = self.engine.add_unit(Box::new(Tap(log.clone())));
        (id, log)
    }

    fn connect(&mut self, from: UnitId, outlet: usize, to: UnitId, inlet: usize) {
        self.engine.connect(from, outlet, to, inlet).unwrap();
    }

    fn render(&mut self) -> Vec<f32> {
        let mut output = vec![0.0; BLOCK];
        self.engine.process(&[], &mut output);
        output
    }
}

/// Records every message it receives.
struct Tap(Arc<Mutex<Vec<Message>>>);

impl Unit for Tap {
    fn label(&self) -> &str {
        "tap"
    }
    fn ports(&self) -> Ports {
        Ports::messages(1, 0)
    }
    fn receive(&mut self, _inlet: usize, message: &Message, _ctx: &mut MessageContext<'_>) {
        self.0.lock().push(message.clone());
    }
}

fn timestamps(log: &Mutex<Vec<Message>>) -> Vec<f64> {
    log.lock().iter().map(Message::timestamp).collect()
}

fn floats(log: &Mutex<Vec<Message>>) -> Vec<f32> {
    log.lock().iter().filter_map(|m| m.float_at(0)).collect()
}

// ============================================================================
// Generators
// ============================================================================

#[test]
fn line_ramps_then_holds() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive ctl");
    let line = patch.add("line~");
    let dac = patch.add("dac~");
    patch.connect(ctl, 0, line, 0);
    patch.connect(line, 0, dac, 0);

    patch.engine.send_to("ctl", &Message::parse(0.0, "4 4"));
    assert_eq!(patch.render(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0]);
    assert_eq!(patch.render(), vec![4.0; BLOCK]);
}

#[test]
fn line_jumps_mid_block() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive ctl");
    let line = patch.add("line~");
    let dac = patch.add("dac~");
    patch.connect(ctl, 0, line, 0);
    patch.connect(line, 0, dac, 0);

    patch.engine.send_to("ctl", &Message::float(3.0, 2.0));
    assert_eq!(patch.render(), vec![0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 2.0, 2.0]);
}

#[test]
fn line_stop_holds_current_value() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive ctl");
    let line = patch.add("line~");
    let dac = patch.add("dac~");
    patch.connect(ctl, 0, line, 0);
    patch.connect(line, 0, dac, 0);

    patch.engine.send_to("ctl", &Message::parse(0.0, "8 8"));
    patch.engine.send_to("ctl", &Message::parse(4.0, "stop"));
    assert_eq!(patch.render(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0]);
}

#[test]
fn phasor_and_osc_at_quarter_rate() {
    let mut patch = Patch::new();
    let phasor = patch.add("phasor~ 250");
    let dac = patch.add("dac~");
    patch.connect(phasor, 0, dac, 0);
    assert_eq!(patch.render(), vec![0.0, 0.25, 0.5, 0.75, 0.0, 0.25, 0.5, 0.75]);

    let mut patch = Patch::new();
    let osc = patch.add("osc~ 250");
    let dac = patch.add("dac~");
    patch.connect(osc, 0, dac, 0);
    let out = patch.render();
    let expected = [1.0, 0.0, -1.0, 0.0];
    for (i, (&got, &want)) in out.iter().zip(expected.iter().cycle()).enumerate() {
        assert!((got - want).abs() < 1e-5, "sample {i}: {got} vs {want}");
    }
}

#[test]
fn phasor_follows_stream_frequency() {
    let mut patch = Patch::new();
    let freq = patch.add("sig~ 500");
    let phasor = patch.add("phasor~ 0");
    let dac = patch.add("dac~");
    patch.connect(freq, 0, phasor, 0);
    patch.connect(phasor, 0, dac, 0);
    assert_eq!(patch.render(), vec![0.0, 0.5, 0.0, 0.5, 0.0, 0.5, 0.0, 0.5]);
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn stream_arith_scalar_and_signal_modes() {
    let mut patch = Patch::new();
    let a = patch.add("sig~ 2");
    let mul = patch.add("*~ 3");
    let dac = patch.add("dac~");
    patch.connect(a, 0, mul, 0);
    patch.connect(mul, 0, dac, 0);
    assert_eq!(patch.render(), vec![6.0; BLOCK]);

    let b = patch.add("sig~ 5");
    patch.connect(b, 0, mul, 1);
    assert_eq!(patch.render(), vec![10.0; BLOCK]);

    patch.engine.disconnect(b, 0, mul, 1).unwrap();
    assert_eq!(patch.render(), vec![6.0; BLOCK]);
}

#[test]
fn right_inlet_float_sets_scalar_operand() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive k");
    let a = patch.add("sig~ 1");
    let sub = patch.add("-~ 0");
    let dac = patch.add("dac~");
    patch.connect(ctl, 0, sub, 1);
    patch.connect(a, 0, sub, 0);
    patch.connect(sub, 0, dac, 0);

    patch.engine.send_to("k", &Message::float(4.0, 3.0));
    assert_eq!(patch.render(), vec![1.0, 1.0, 1.0, 1.0, -2.0, -2.0, -2.0, -2.0]);
}

#[test]
fn divide_by_zero_argument_warns_and_uses_one() {
    let mut patch = Patch::new();
    let a = patch.add("sig~ 7");
    let div = patch.add("/~ 0");
    let dac = patch.add("dac~");
    patch.connect(a, 0, div, 0);
    patch.connect(div, 0, dac, 0);

    assert_eq!(patch.render(), vec![7.0; BLOCK]);
    let reports = patch.sink.drain();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Warning);
    assert_eq!(reports[0].source, "/~");
}

#[test]
fn message_arith_computes_and_repeats() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive x");
    let right = patch.add("receive y");
    let add = patch.add("+ 10");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, add, 0);
    patch.connect(right, 0, add, 1);
    patch.connect(add, 0, tap, 0);

    patch.engine.send_to("x", &Message::float(0.0, 5.0));
    patch.engine.send_to("y", &Message::float(1.0, 1.0));
    patch.engine.send_to("x", &Message::bang(2.0));
    patch.engine.send_to("x", &Message::float(3.0, 5.0));
    patch.render();
    assert_eq!(floats(&log), vec![15.0, 15.0, 6.0]);
}

// ============================================================================
// Control
// ============================================================================

#[test]
fn metro_ticks_across_blocks_until_stopped() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive go");
    let metro = patch.add("metro 2");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, metro, 0);
    patch.connect(metro, 0, tap, 0);

    patch.engine.send_to("go", &Message::bang(0.0));
    patch.render();
    assert_eq!(timestamps(&log), vec![0.0, 2.0, 4.0, 6.0]);
    patch.render();
    assert_eq!(log.lock().len(), 8);

    patch.engine.send_to("go", &Message::symbol(15.0, "stop"));
    patch.render();
    patch.render();
    assert_eq!(log.lock().len(), 8);
    assert!(patch.engine.queue().is_empty());
}

#[test]
fn metro_restart_and_interval_change() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive go");
    let rate = patch.add("receive rate");
    let metro = patch.add("metro 4");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, metro, 0);
    patch.connect(rate, 0, metro, 1);
    patch.connect(metro, 0, tap, 0);

    patch.engine.send_to("go", &Message::float(0.0, 1.0));
    patch.engine.send_to("rate", &Message::float(1.0, 3.0));
    patch.engine.send_to("go", &Message::float(5.0, 0.0));
    patch.render();
    // The 4 ms tick fires before the new interval applies; 0 stops it.
    assert_eq!(timestamps(&log), vec![0.0, 4.0]);
}

#[test]
fn delay_retriggers_and_stops() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive d");
    let delay = patch.add("del 3");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, delay, 0);
    patch.connect(delay, 0, tap, 0);

    patch.engine.send_to("d", &Message::bang(0.0));
    patch.engine.send_to("d", &Message::bang(2.0));
    patch.render();
    assert_eq!(timestamps(&log), vec![5.0]);

    patch.engine.send_to("d", &Message::bang(8.0));
    patch.engine.send_to("d", &Message::symbol(9.0, "stop"));
    patch.render();
    patch.render();
    assert_eq!(log.lock().len(), 1);
}

#[test]
fn float_box_stores_and_bangs() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive in");
    let right = patch.add("receive set");
    let float = patch.add("f 1");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, float, 0);
    patch.connect(right, 0, float, 1);
    patch.connect(float, 0, tap, 0);

    patch.engine.send_to("in", &Message::bang(0.0));
    patch.engine.send_to("set", &Message::float(1.0, 9.0));
    patch.engine.send_to("in", &Message::bang(2.0));
    patch.engine.send_to("in", &Message::float(3.0, 4.0));
    patch.render();
    assert_eq!(floats(&log), vec![1.0, 9.0, 4.0]);
}

#[test]
fn numeric_label_is_a_float_box() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive in");
    let number = patch.add("440");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, number, 0);
    patch.connect(number, 0, tap, 0);

    patch.engine.send_to("in", &Message::bang(0.0));
    patch.render();
    assert_eq!(floats(&log), vec![440.0]);
}

#[test]
fn message_send_reaches_receivers() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive in");
    let send = patch.add("s out");
    let first = patch.add("r out");
    let second = patch.add("r out");
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, send, 0);
    patch.connect(first, 0, tap, 0);
    patch.connect(second, 0, tap, 0);

    patch.engine.send_to("in", &Message::float(0.0, 3.0));
    patch.render();
    assert_eq!(floats(&log), vec![3.0, 3.0]);
}

#[test]
fn print_reports_info() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive in");
    let print = patch.add("print tempo");
    patch.connect(ctl, 0, print, 0);

    patch.engine.send_to("in", &Message::parse(2.0, "120 bpm"));
    patch.render();
    let reports = patch.sink.drain();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Info);
    assert_eq!(reports[0].source, "print");
    assert!(reports[0].message.ends_with("tempo: 120 bpm"), "{}", reports[0].message);
}

// ============================================================================
// Links
// ============================================================================

#[test]
fn throw_catch_sums_writers() {
    let mut patch = Patch::new();
    let catch = patch.add("catch~ mix");
    let dac = patch.add("dac~");
    patch.connect(catch, 0, dac, 0);
    for value in ["sig~ 1", "sig~ 2", "sig~ 4"] {
        let sig = patch.add(value);
        let throw = patch.add("throw~ mix");
        patch.connect(sig, 0, throw, 0);
    }
    assert_eq!(patch.render(), vec![7.0; BLOCK]);
    // Buses are cleared every block, not accumulated across blocks.
    assert_eq!(patch.render(), vec![7.0; BLOCK]);
}

#[test]
fn send_receive_copies_to_every_reader() {
    let mut patch = Patch::new();
    let sig = patch.add("sig~ 4");
    let send = patch.add("s~ a");
    patch.connect(sig, 0, send, 0);
    let dac = patch.add("dac~");
    for _ in 0..2 {
        let receive = patch.add("r~ a");
        patch.connect(receive, 0, dac, 0);
    }
    assert_eq!(patch.render(), vec![8.0; BLOCK]);
}

#[test]
fn ports_forward_buffers() {
    let mut patch = Patch::new();
    let sig = patch.add("sig~ 3");
    let inlet = patch.add("inlet~");
    let outlet = patch.add("outlet~");
    let gain = patch.add("*~ 2");
    let dac = patch.add("dac~");
    patch.connect(sig, 0, inlet, 0);
    patch.connect(inlet, 0, outlet, 0);
    patch.connect(outlet, 0, gain, 0);
    patch.connect(gain, 0, dac, 0);

    assert_eq!(patch.render(), vec![6.0; BLOCK]);
    let order = patch.engine.compile();
    assert_eq!(order.units().count(), 3);
}

#[test]
fn subgraph_stream_ports_carry_buffers() {
    let mut patch = Patch::new();
    let sig = patch.add("sig~ 3");
    let sub = patch.engine.add_subgraph();
    let inlet = patch.add_to(sub, "inlet~");
    let gain = patch.add_to(sub, "*~ 2");
    let outlet = patch.add_to(sub, "outlet~");
    patch.connect(inlet, 0, gain, 0);
    patch.connect(gain, 0, outlet, 0);
    let dac = patch.add("dac~");
    patch.connect(sig, 0, sub, 0);
    patch.connect(sub, 0, dac, 0);

    assert_eq!(patch.render(), vec![6.0; BLOCK]);
}

#[test]
fn subgraph_message_ports_forward() {
    let mut patch = Patch::new();
    let ctl = patch.add("receive x");
    let sub = patch.engine.add_subgraph();
    let inlet = patch.add_to(sub, "inlet");
    let add = patch.add_to(sub, "+ 1");
    let outlet = patch.add_to(sub, "outlet");
    patch.connect(inlet, 0, add, 0);
    patch.connect(add, 0, outlet, 0);
    let (tap, log) = patch.tap();
    patch.connect(ctl, 0, sub, 0);
    patch.connect(sub, 0, tap, 0);

    patch.send("x", 4.0);
    patch.render();
    assert_eq!(floats(&log), vec![5.0]);
}

// ============================================================================
// Storage
// ============================================================================

#[test]
fn table_records_then_reads_clamped() {
    let mut patch = Patch::new();
    patch.add("table t 4");
    let ctl = patch.add("receive ctl");
    let line = patch.add("line~");
    let rec = patch.add("receive rec");
    let write = patch.add("tabwrite~ t");
    patch.connect(ctl, 0, line, 0);
    patch.connect(line, 0, write, 0);
    patch.connect(rec, 0, write, 0);

    let idx = patch.add("receive idx");
    let sig = patch.add("sig~");
    let read = patch.add("tabread~ t");
    let dac = patch.add("dac~");
    patch.connect(idx, 0, sig, 0);
    patch.connect(sig, 0, read, 0);
    patch.connect(read, 0, dac, 0);

    patch.engine.send_to("ctl", &Message::parse(0.0, "4 4"));
    patch.engine.send_to("rec", &Message::bang(0.0));
    patch.render();

    patch.send("idx", 2.0);
    assert_eq!(patch.render(), vec![2.0; BLOCK]);
    patch.send("idx", -3.0);
    assert_eq!(patch.render(), vec![0.0; BLOCK]);
    patch.send("idx", 9.0);
    assert_eq!(patch.render(), vec![3.0; BLOCK]);
}

#[test]
fn tabread_of_missing_table_is_silent() {
    let mut patch = Patch::new();
    let sig = patch.add("sig~ 1");
    let read = patch.add("tabread~ nothing");
    let dac = patch.add("dac~");
    patch.connect(sig, 0, read, 0);
    patch.connect(read, 0, dac, 0);
    assert_eq!(patch.render(), vec![0.0; BLOCK]);
}

#[test]
fn delay_line_taps_behind_writer() {
    let mut patch = Patch::new();
    // Reader added first; the compiler still runs it after the writer.
    let del = patch.add("receive del");
    let read = patch.add("delread~ d 4");
    let dac = patch.add("dac~");
    patch.connect(del, 0, read, 0);
    patch.connect(read, 0, dac, 0);
    let ctl = patch.add("receive ctl");
    let sig = patch.add("sig~");
    let write = patch.add("delwrite~ d 16");
    patch.connect(ctl, 0, sig, 0);
    patch.connect(sig, 0, write, 0);

    patch.send("ctl", 1.0);
    assert_eq!(patch.render(), vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(patch.render(), vec![1.0; BLOCK]);

    patch.send("ctl", 2.0);
    patch.send("del", 0.0);
    assert_eq!(patch.render(), vec![2.0; BLOCK]);
}

#[test]
fn host_input_reaches_output() {
    let sink = Arc::new(CollectingSink::new());
    let settings = AudioSettings::new(1000.0, 4, 2, 2);
    let mut engine = Engine::with_diagnostics(settings, sink.clone());
    let registry = UnitRegistry::new();
    let ctx = BuildContext::new(&settings, sink.as_ref());
    let adc = engine.add_unit(registry.create("adc~", &Message::empty(0.0), &ctx).unwrap());
    let dac = engine.add_unit(registry.create("dac~", &Message::empty(0.0), &ctx).unwrap());
    engine.connect(adc, 0, dac, 1).unwrap();
    engine.connect(adc, 1, dac, 0).unwrap();

    let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let mut output = [0.0; 8];
    engine.process(&input, &mut output);
    assert_eq!(output, [5.0, 6.0, 7.0, 8.0, 1.0, 2.0, 3.0, 4.0]);
}
