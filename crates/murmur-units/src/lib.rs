//! Murmur Units - the built-in unit catalogue
//!
//! Every unit here implements [`murmur_core::Unit`] and is constructed from a
//! textual label plus an argument message through the [`UnitRegistry`].
//!
//! # Available Units
//!
//! | Category | Labels |
//! |----------|--------|
//! | I/O | `adc~`, `dac~` |
//! | Generator | `sig~`, `line~`, `osc~`, `phasor~` |
//! | Arithmetic | `+~ -~ *~ /~`, `+ - * /` |
//! | Link | `throw~`, `catch~`, `send~`, `receive~`, `inlet~`, `outlet~`, `inlet`, `outlet` |
//! | Control | `float`, `metro`, `delay`, `print`, `send`, `receive` |
//! | Storage | `table`, `tabwrite~`, `tabread~`, `delwrite~`, `delread~` |
//!
//! A label that parses as a number, such as `440`, creates a `float` box.
//!
//! # Example
//!
//! ```rust
//! use murmur_core::{AudioSettings, Context, Message};
//! use murmur_units::{BuildContext, UnitRegistry};
//!
//! let settings = AudioSettings::new(48000.0, 64, 0, 1);
//! let context = Context::new(settings);
//! let registry = UnitRegistry::new();
//! let diagnostics = murmur_core::TracingSink;
//! let build = BuildContext::new(&settings, &diagnostics);
//!
//! let osc = registry.create("osc~", &Message::parse(0.0, "440"), &build).unwrap();
//! let dac = registry.create("dac~", &Message::empty(0.0), &build).unwrap();
//! let osc = context.add_unit(osc);
//! let dac = context.add_unit(dac);
//! context.connect(osc, 0, dac, 0).unwrap();
//!
//! let mut output = vec![0.0; 64];
//! context.process(&[], &mut output);
//! assert_eq!(output[0], 1.0);
//! ```

pub mod arith;
pub mod args;
pub mod control;
pub mod io;
pub mod link;
pub mod osc;
pub mod registry;
pub mod sig;
pub mod store;

pub use arith::{Add, ArithMode, BinaryOp, Divide, MessageArith, Multiply, StreamArith, Subtract};
pub use args::BuildContext;
pub use control::{Delay, Float, MIN_INTERVAL_MS, Metro, Print, ReceiveMessage, SendMessage};
pub use io::{Adc, Dac};
pub use link::{LinkReader, LinkWriter, Port};
pub use osc::{Osc, Phasor};
pub use registry::{UnitCategory, UnitDescriptor, UnitRegistry};
pub use sig::{Line, Sig};
pub use store::{
    DEFAULT_DELAY_MS, DEFAULT_TABLE_SIZE, DelayReader, DelayWriter, Table, TableReader, TableWriter,
    delay_line_len,
};
