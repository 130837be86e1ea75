//! Creation arguments.
//!
//! Every unit is built from a label and an argument message, e.g. `osc~ 440`.
//! Malformed arguments never fail construction: they are reported to the
//! diagnostic sink and the documented default is used instead.

use murmur_core::{Atom, AudioSettings, DiagnosticSink, Message, Severity, Symbol, symbol};

/// What a factory sees besides the arguments.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    /// Settings of the engine the unit will join.
    pub settings: &'a AudioSettings,
    /// Where argument problems are reported.
    pub diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> BuildContext<'a> {
    /// Creates a build context.
    pub fn new(settings: &'a AudioSettings, diagnostics: &'a dyn DiagnosticSink) -> Self {
        Self {
            settings,
            diagnostics,
        }
    }

    /// Float argument `index`, or `default` if it is missing or not a number.
    pub fn float(&self, label: &str, args: &Message, index: usize, default: f32) -> f32 {
        match args.atom(index) {
            None => default,
            Some(Atom::Float(value)) => *value,
            Some(other) => {
                self.diagnostics.report(
                    Severity::Warning,
                    label,
                    format_args!("argument {index} '{other}' is not a number; using {default}"),
                );
                default
            }
        }
    }

    /// Symbol argument `index`, or an empty name if it is missing.
    ///
    /// Numbers are accepted and used by their text, so `send~ 1` names `"1"`.
    pub fn name(&self, label: &str, args: &Message, index: usize) -> Symbol {
        match args.atom(index) {
            Some(Atom::Symbol(name)) => *name,
            Some(Atom::Float(value)) => symbol(&value.to_string()),
            Some(Atom::Bang) | None => {
                self.diagnostics.report(
                    Severity::Warning,
                    label,
                    format_args!("missing name argument; using the empty name"),
                );
                Symbol::new()
            }
        }
    }
}

impl std::fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("settings", self.settings)
            .finish_non_exhaustive()
    }
}
