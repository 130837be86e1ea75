//! Label-to-constructor registry.
//!
//! Patches name units by their textual label, e.g. `osc~ 440`. The
//! [`UnitRegistry`] maps each label (and its aliases) to a factory, and
//! carries metadata for listing units.
//!
//! ```rust
//! use murmur_core::{AudioSettings, CollectingSink, Message};
//! use murmur_units::{BuildContext, UnitCategory, UnitRegistry};
//!
//! let registry = UnitRegistry::new();
//! let settings = AudioSettings::default();
//! let sink = CollectingSink::new();
//! let ctx = BuildContext::new(&settings, &sink);
//!
//! let osc = registry.create("osc~", &Message::parse(0.0, "440"), &ctx);
//! assert!(osc.is_some());
//!
//! for unit in registry.units_in_category(UnitCategory::Link) {
//!     println!("{}: {}", unit.label, unit.description);
//! }
//! ```

use murmur_core::{Message, Unit};

use crate::arith::{Add, Divide, MessageArith, Multiply, StreamArith, Subtract};
use crate::args::BuildContext;
use crate::control::{Delay, Float, Metro, Print, ReceiveMessage, SendMessage};
use crate::io::{Adc, Dac};
use crate::link::{LinkReader, LinkWriter, Port};
use crate::osc::{Osc, Phasor};
use crate::sig::{Line, Sig};
use crate::store::{DelayReader, DelayWriter, Table, TableReader, TableWriter};

/// Category of unit for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitCategory {
    /// Host audio input and output.
    Io,
    /// Stream generators and converters.
    Generator,
    /// Arithmetic on streams or messages.
    Arithmetic,
    /// Named stream links and forwarding ports.
    Link,
    /// Message-only control.
    Control,
    /// Tables and delay lines.
    Storage,
}

impl UnitCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            UnitCategory::Io => "I/O",
            UnitCategory::Generator => "Generator",
            UnitCategory::Arithmetic => "Arithmetic",
            UnitCategory::Link => "Link",
            UnitCategory::Control => "Control",
            UnitCategory::Storage => "Storage",
        }
    }
}

/// Describes a unit in the registry.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Canonical label.
    pub label: &'static str,
    /// Other labels that create the same unit.
    pub aliases: &'static [&'static str],
    /// Brief description.
    pub description: &'static str,
    /// Category for organization.
    pub category: UnitCategory,
}

impl UnitDescriptor {
    /// Whether `label` names this unit.
    pub fn matches(&self, label: &str) -> bool {
        self.label == label || self.aliases.contains(&label)
    }
}

/// Factory function type for creating units.
type UnitFactory = fn(&Message, &BuildContext<'_>) -> Box<dyn Unit>;

struct RegistryEntry {
    descriptor: UnitDescriptor,
    factory: UnitFactory,
}

/// Registry of every built-in unit.
pub struct UnitRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// Creates a registry with all built-in units registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(40),
        };
        registry.register_builtin_units();
        registry
    }

    fn register(
        &mut self,
        label: &'static str,
        aliases: &'static [&'static str],
        description: &'static str,
        category: UnitCategory,
        factory: UnitFactory,
    ) {
        self.entries.push(RegistryEntry {
            descriptor: UnitDescriptor {
                label,
                aliases,
                description,
                category,
            },
            factory,
        });
    }

    fn register_builtin_units(&mut self) {
        use UnitCategory::{Arithmetic, Control, Generator, Io, Link, Storage};

        // I/O
        self.register("adc~", &[], "Host audio input, one outlet per channel", Io, |a, c| {
            Box::new(Adc::build(a, c))
        });
        self.register("dac~", &[], "Host audio output, one inlet per channel", Io, |a, c| {
            Box::new(Dac::build(a, c))
        });

        // Generators
        self.register("sig~", &[], "Constant stream from a float", Generator, |a, c| {
            Box::new(Sig::build(a, c))
        });
        self.register("line~", &[], "Linear ramp to a target over a time", Generator, |a, c| {
            Box::new(Line::build(a, c))
        });
        self.register("osc~", &[], "Cosine oscillator", Generator, |a, c| Box::new(Osc::build(a, c)));
        self.register("phasor~", &[], "Rising sawtooth from 0 to 1", Generator, |a, c| {
            Box::new(Phasor::build(a, c))
        });

        // Stream arithmetic
        self.register("+~", &[], "Adds streams or a scalar", Arithmetic, |a, c| {
            Box::new(StreamArith::<Add>::build(a, c))
        });
        self.register("-~", &[], "Subtracts streams or a scalar", Arithmetic, |a, c| {
            Box::new(StreamArith::<Subtract>::build(a, c))
        });
        self.register("*~", &[], "Multiplies streams or a scalar", Arithmetic, |a, c| {
            Box::new(StreamArith::<Multiply>::build(a, c))
        });
        self.register("/~", &[], "Divides streams or by a scalar", Arithmetic, |a, c| {
            Box::new(StreamArith::<Divide>::build(a, c))
        });

        // Message arithmetic
        self.register("+", &[], "Adds to a number", Arithmetic, |a, c| {
            Box::new(MessageArith::<Add>::build(a, c))
        });
        self.register("-", &[], "Subtracts from a number", Arithmetic, |a, c| {
            Box::new(MessageArith::<Subtract>::build(a, c))
        });
        self.register("*", &[], "Multiplies a number", Arithmetic, |a, c| {
            Box::new(MessageArith::<Multiply>::build(a, c))
        });
        self.register("/", &[], "Divides a number", Arithmetic, |a, c| {
            Box::new(MessageArith::<Divide>::build(a, c))
        });

        // Links
        self.register("throw~", &[], "Adds into a named summing bus", Link, |a, c| {
            Box::new(LinkWriter::build_throw(a, c))
        });
        self.register("catch~", &[], "Reads a named summing bus", Link, |a, c| {
            Box::new(LinkReader::build_catch(a, c))
        });
        self.register("send~", &["s~"], "Writes a named stream", Link, |a, c| {
            Box::new(LinkWriter::build_send(a, c))
        });
        self.register("receive~", &["r~"], "Reads a named stream", Link, |a, c| {
            Box::new(LinkReader::build_receive(a, c))
        });
        self.register("inlet~", &[], "Forwards a stream into a subpatch", Link, |_, _| {
            Box::new(Port::inlet())
        });
        self.register("outlet~", &[], "Forwards a stream out of a subpatch", Link, |_, _| {
            Box::new(Port::outlet())
        });
        self.register("inlet", &[], "Forwards messages into a subpatch", Link, |_, _| {
            Box::new(Port::message_inlet())
        });
        self.register("outlet", &[], "Forwards messages out of a subpatch", Link, |_, _| {
            Box::new(Port::message_outlet())
        });

        // Storage
        self.register("table", &[], "Named array of samples", Storage, |a, c| {
            Box::new(Table::build(a, c))
        });
        self.register("tabwrite~", &[], "Records a stream into a table", Storage, |a, c| {
            Box::new(TableWriter::build(a, c))
        });
        self.register("tabread~", &[], "Reads a table at each input index", Storage, |a, c| {
            Box::new(TableReader::build(a, c))
        });
        self.register("delwrite~", &[], "Writes a named delay line", Storage, |a, c| {
            Box::new(DelayWriter::build(a, c))
        });
        self.register("delread~", &[], "Reads a named delay line", Storage, |a, c| {
            Box::new(DelayReader::build(a, c))
        });

        // Control
        self.register("float", &["f"], "Stores and outputs a number", Control, |a, c| {
            Box::new(Float::build(a, c))
        });
        self.register("metro", &[], "Bangs at a regular interval", Control, |a, c| {
            Box::new(Metro::build(a, c))
        });
        self.register("delay", &["del"], "Bangs once after a delay", Control, |a, c| {
            Box::new(Delay::build(a, c))
        });
        self.register("print", &[], "Reports every message", Control, |a, c| {
            Box::new(Print::build(a, c))
        });
        self.register("send", &["s"], "Sends messages to a name", Control, |a, c| {
            Box::new(SendMessage::build(a, c))
        });
        self.register("receive", &["r"], "Outputs messages sent to a name", Control, |a, c| {
            Box::new(ReceiveMessage::build(a, c))
        });
    }

    /// Returns all registered units.
    pub fn all_units(&self) -> Vec<&UnitDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Returns units in a specific category.
    pub fn units_in_category(&self, category: UnitCategory) -> Vec<&UnitDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Looks up a unit by label or alias.
    pub fn get(&self, label: &str) -> Option<&UnitDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.matches(label))
            .map(|e| &e.descriptor)
    }

    /// Creates a unit from its label and arguments.
    ///
    /// A label that parses as a number creates a `float` holding it, so a
    /// patch can write `440` for `float 440`. Returns `None` for unknown
    /// labels.
    pub fn create(&self, label: &str, args: &Message, ctx: &BuildContext<'_>) -> Option<Box<dyn Unit>> {
        if let Some(value) = label.parse::<f32>().ok().filter(|v| v.is_finite()) {
            tracing::debug!(label, "numeric label creates a float box");
            return Some(Box::new(Float::new(value)));
        }
        let entry = self.entries.iter().find(|e| e.descriptor.matches(label))?;
        tracing::debug!(label, canonical = entry.descriptor.label, args = %args, "creating unit");
        Some((entry.factory)(args, ctx))
    }

    /// Returns the number of registered units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no units are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.entries.len())
            .finish()
    }
}
