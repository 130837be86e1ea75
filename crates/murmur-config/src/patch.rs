//! Patch file format and instantiation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use murmur_core::{
    AudioSettings, Context, DiagnosticSink, Engine, Message, SUBGRAPH_LABEL, TracingSink, UnitId,
};
use murmur_units::{BuildContext, UnitRegistry};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A patch: named units, the connections between them, and timed messages.
///
/// # TOML Format
///
/// ```toml
/// name = "tremolo"
///
/// [[units]]
/// name = "carrier"
/// label = "osc~"
/// args = "440"
///
/// [[units]]
/// name = "out"
/// label = "dac~"
///
/// [[connections]]
/// from = "carrier"
/// to = "out"
///
/// [[events]]
/// time = 500.0
/// receiver = "pitch"
/// message = "880"
/// ```
///
/// Outlet and inlet indices default to 0. Event messages are delivered to
/// every `receive` unit with the given name.
///
/// A unit labelled `pd` is a subgraph. Units name it as their `parent` to be
/// placed inside it, and its `inlet~`/`outlet~`/`inlet`/`outlet` children
/// become its ports:
///
/// ```toml
/// [[units]]
/// name = "voice"
/// label = "pd"
///
/// [[units]]
/// name = "voice-in"
/// label = "inlet~"
/// parent = "voice"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatchConfig {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Units in creation order.
    #[serde(default)]
    pub units: Vec<UnitConfig>,

    /// Connections between units, made in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionConfig>,

    /// Messages scheduled before the first block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventConfig>,
}

/// One `[[units]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitConfig {
    /// Name other entries refer to the unit by.
    pub name: String,
    /// Registry label, e.g. `osc~`, or a number for a float box.
    pub label: String,
    /// Whitespace-separated creation arguments.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub args: String,
    /// Name of the subgraph holding this unit; top level when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl UnitConfig {
    /// Create a unit entry.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            args: String::new(),
            parent: None,
        }
    }

    /// Set the creation arguments.
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    /// Place the unit inside the subgraph named `parent`.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Whether this entry declares a subgraph.
    pub fn is_subgraph(&self) -> bool {
        self.label == SUBGRAPH_LABEL
    }
}

/// One `[[connections]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Source unit name.
    pub from: String,
    /// Source outlet.
    #[serde(default)]
    pub outlet: usize,
    /// Destination unit name.
    pub to: String,
    /// Destination inlet.
    #[serde(default)]
    pub inlet: usize,
}

impl ConnectionConfig {
    /// Connect `from:outlet` to `to:inlet`.
    pub fn new(from: impl Into<String>, outlet: usize, to: impl Into<String>, inlet: usize) -> Self {
        Self {
            from: from.into(),
            outlet,
            to: to.into(),
            inlet,
        }
    }
}

/// One `[[events]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    /// Delivery time in milliseconds from the start of the run.
    pub time: f64,
    /// Receiver name.
    pub receiver: String,
    /// Message text, e.g. `"880"` or `"stop"`.
    pub message: String,
}

impl EventConfig {
    /// Create an event entry.
    pub fn new(time: f64, receiver: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            time,
            receiver: receiver.into(),
            message: message.into(),
        }
    }
}

impl PatchConfig {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a unit.
    pub fn with_unit(mut self, unit: UnitConfig) -> Self {
        self.units.push(unit);
        self
    }

    /// Add a connection.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connections.push(connection);
        self
    }

    /// Add an event.
    pub fn with_event(mut self, event: EventConfig) -> Self {
        self.events.push(event);
        self
    }

    /// Load a patch from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a patch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the patch to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the patch with the built-in units, reporting through `tracing`.
    pub fn build_default(&self, settings: AudioSettings) -> Result<Patch, ConfigError> {
        self.build(settings, &UnitRegistry::new(), Arc::new(TracingSink))
    }

    /// Instantiate every unit, connection, and event into a fresh engine.
    ///
    /// Unknown labels, unknown unit names, misplaced units, rejected
    /// connections, and events that are not finite or that nothing receives
    /// are errors. Malformed unit arguments are
    /// not: they go to `diagnostics` and the unit's default is used.
    pub fn build(
        &self,
        settings: AudioSettings,
        registry: &UnitRegistry,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Patch, ConfigError> {
        let mut engine = Engine::with_diagnostics(settings, diagnostics.clone());
        let ctx = BuildContext::new(&settings, diagnostics.as_ref());
        let mut ids: HashMap<&str, UnitId> = HashMap::with_capacity(self.units.len());
        let mut names = Vec::with_capacity(self.units.len());

        for unit in &self.units {
            if ids.contains_key(unit.name.as_str()) {
                return Err(ConfigError::DuplicateUnit(unit.name.clone()));
            }
            let parent = match &unit.parent {
                Some(parent) => Some(
                    ids.get(parent.as_str())
                        .copied()
                        .ok_or_else(|| ConfigError::UnknownUnit(parent.clone()))?,
                ),
                None => None,
            };
            let placed = if unit.is_subgraph() {
                match parent {
                    Some(owner) => engine.add_subgraph_to(owner),
                    None => Ok(engine.add_subgraph()),
                }
            } else {
                let args = Message::parse(0.0, &unit.args);
                let built = registry.create(&unit.label, &args, &ctx).ok_or_else(|| {
                    ConfigError::UnknownLabel {
                        unit: unit.name.clone(),
                        label: unit.label.clone(),
                    }
                })?;
                match parent {
                    Some(owner) => engine.add_unit_to(owner, built),
                    None => Ok(engine.add_unit(built)),
                }
            };
            let id = placed.map_err(|source| ConfigError::Placement {
                unit: unit.name.clone(),
                parent: unit.parent.clone().unwrap_or_default(),
                source,
            })?;
            ids.insert(&unit.name, id);
            names.push((unit.name.clone(), id));
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownUnit(name.to_string()))
        };
        for conn in &self.connections {
            let from = lookup(&conn.from)?;
            let to = lookup(&conn.to)?;
            engine
                .connect(from, conn.outlet, to, conn.inlet)
                .map_err(|source| ConfigError::Connection {
                    from: conn.from.clone(),
                    outlet: conn.outlet,
                    to: conn.to.clone(),
                    inlet: conn.inlet,
                    source,
                })?;
        }

        for event in &self.events {
            if !event.time.is_finite() {
                return Err(ConfigError::InvalidSetting {
                    field: "events.time",
                    reason: format!("{} is not a finite time", event.time),
                });
            }
            if engine.graph().registry().receivers(&event.receiver).is_empty() {
                return Err(ConfigError::UnknownReceiver(event.receiver.clone()));
            }
            engine.send_to(&event.receiver, &Message::parse(event.time, &event.message));
        }

        tracing::debug!(
            name = self.name.as_deref().unwrap_or("untitled"),
            units = self.units.len(),
            connections = self.connections.len(),
            events = self.events.len(),
            "patch built"
        );
        Ok(Patch {
            context: Context::from_engine(engine),
            names,
        })
    }
}

/// A built patch: a running [`Context`] plus the unit names it was built from.
pub struct Patch {
    context: Context,
    names: Vec<(String, UnitId)>,
}

impl Patch {
    /// The engine context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Consume the patch, keeping only the context.
    pub fn into_context(self) -> Context {
        self.context
    }

    /// Id of the unit declared as `name`.
    pub fn unit(&self, name: &str) -> Option<UnitId> {
        self.names.iter().find(|(n, _)| n == name).map(|&(_, id)| id)
    }

    /// Name the unit `id` was declared with.
    pub fn name_of(&self, id: UnitId) -> Option<&str> {
        self.names
            .iter()
            .find(|&&(_, unit)| unit == id)
            .map(|(name, _)| name.as_str())
    }
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patch")
            .field("context", &self.context)
            .field("units", &self.names.len())
            .finish()
    }
}
