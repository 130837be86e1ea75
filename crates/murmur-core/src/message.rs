//! Timestamped discrete messages.
//!
//! A [`Message`] is a short list of [`Atom`]s stamped with an absolute time in
//! milliseconds. Both atoms and their container are fixed-capacity inline
//! values, so cloning a message on the audio thread never allocates.

use std::fmt;

use arrayvec::{ArrayString, ArrayVec};

/// Maximum number of atoms carried by one message.
pub const MAX_ATOMS: usize = 8;

/// Maximum length in bytes of a symbol atom.
pub const SYMBOL_CAPACITY: usize = 32;

/// Inline string used for symbol atoms and registry names.
pub type Symbol = ArrayString<SYMBOL_CAPACITY>;

/// Builds a [`Symbol`], truncating at a character boundary if `text` is too long.
pub fn symbol(text: &str) -> Symbol {
    let mut end = text.len().min(SYMBOL_CAPACITY);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut sym = Symbol::new();
    sym.push_str(&text[..end]);
    sym
}

/// One element of a message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Atom {
    /// An event with no value.
    Bang,
    /// A number.
    Float(f32),
    /// A short string.
    Symbol(Symbol),
}

impl Atom {
    /// Parses one whitespace-free token.
    pub fn parse(token: &str) -> Self {
        if token == "bang" {
            return Self::Bang;
        }
        match token.parse::<f32>() {
            Ok(value) if value.is_finite() => Self::Float(value),
            _ => Self::Symbol(symbol(token)),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bang => f.write_str("bang"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Symbol(sym) => f.write_str(sym),
        }
    }
}

/// A timestamped list of atoms.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    timestamp: f64,
    atoms: ArrayVec<Atom, MAX_ATOMS>,
}

impl Message {
    /// Creates a message with no atoms.
    pub fn empty(timestamp: f64) -> Self {
        Self {
            timestamp,
            atoms: ArrayVec::new(),
        }
    }

    /// Creates a single-bang message.
    pub fn bang(timestamp: f64) -> Self {
        Self::from_atoms(timestamp, &[Atom::Bang])
    }

    /// Creates a single-float message.
    pub fn float(timestamp: f64, value: f32) -> Self {
        Self::from_atoms(timestamp, &[Atom::Float(value)])
    }

    /// Creates a single-symbol message.
    pub fn symbol(timestamp: f64, text: &str) -> Self {
        Self::from_atoms(timestamp, &[Atom::Symbol(symbol(text))])
    }

    /// Creates a message from a slice of atoms. Atoms past [`MAX_ATOMS`] are dropped.
    pub fn from_atoms(timestamp: f64, atoms: &[Atom]) -> Self {
        let mut msg = Self::empty(timestamp);
        for &atom in atoms.iter().take(MAX_ATOMS) {
            msg.atoms.push(atom);
        }
        msg
    }

    /// Parses whitespace-separated text such as `"set 440 bang"`.
    pub fn parse(timestamp: f64, text: &str) -> Self {
        let mut msg = Self::empty(timestamp);
        for token in text.split_whitespace().take(MAX_ATOMS) {
            msg.atoms.push(Atom::parse(token));
        }
        msg
    }

    /// Absolute time in milliseconds.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Sets the absolute time in milliseconds.
    #[inline]
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = timestamp;
    }

    /// Returns a copy of this message stamped with a different time.
    pub fn at(&self, timestamp: f64) -> Self {
        Self {
            timestamp,
            atoms: self.atoms.clone(),
        }
    }

    /// Appends an atom. Returns false if the message is full.
    pub fn push(&mut self, atom: Atom) -> bool {
        self.atoms.try_push(atom).is_ok()
    }

    /// Returns the atoms.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Returns the number of atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Returns true if the message has no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Returns the atom at `index`.
    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    /// Returns the float at `index`, if that atom is a float.
    pub fn float_at(&self, index: usize) -> Option<f32> {
        match self.atoms.get(index) {
            Some(Atom::Float(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the symbol at `index`, if that atom is a symbol.
    pub fn symbol_at(&self, index: usize) -> Option<&str> {
        match self.atoms.get(index) {
            Some(Atom::Symbol(sym)) => Some(sym.as_str()),
            _ => None,
        }
    }

    /// Returns true if the atom at `index` is a bang.
    pub fn is_bang_at(&self, index: usize) -> bool {
        matches!(self.atoms.get(index), Some(Atom::Bang))
    }

    /// Returns true if the message starts with the symbol `selector`.
    pub fn has_selector(&self, selector: &str) -> bool {
        self.symbol_at(0) == Some(selector)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{atom}")?;
        }
        Ok(())
    }
}
