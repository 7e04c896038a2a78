//! Atoms and messages, the discrete values flowing between nodes.

use core::fmt;

use delegate::delegate;
use itertools::Itertools;

/// A single message token: a number or a text symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Float(f64),
    Symbol(String),
}

impl Atom {
    pub fn symbol(s: impl Into<String>) -> Self {
        Atom::Symbol(s.into())
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(v) => Some(*v),
            Atom::Symbol(_) => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Float(_) => None,
            Atom::Symbol(s) => Some(s),
        }
    }

    /// True if this is the symbol `s`
    #[inline]
    pub fn is_symbol(&self, s: &str) -> bool {
        self.as_symbol() == Some(s)
    }
}

/// Integral numbers print without a fractional part (`666`, not `666.0`).
pub(crate) fn format_float(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Float(v) => format_float(*v, f),
            Atom::Symbol(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Atom::Float(v)
    }
}

impl From<i32> for Atom {
    fn from(v: i32) -> Self {
        Atom::Float(v as f64)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Symbol(s.to_owned())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::Symbol(s)
    }
}

/// An ordered, immutable sequence of atoms delivered as one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    atoms: Vec<Atom>,
}

impl Message {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    /// The control trigger message, `[bang]`
    pub fn bang() -> Self {
        Self::new(vec![Atom::symbol("bang")])
    }

    /// A message made only of numbers
    pub fn floats(values: &[f64]) -> Self {
        values.iter().copied().map(Atom::Float).collect()
    }

    delegate! {
        to self.atoms {
            pub fn len(&self) -> usize;
            pub fn is_empty(&self) -> bool;
            pub fn get(&self, index: usize) -> Option<&Atom>;
            pub fn iter(&self) -> core::slice::Iter<'_, Atom>;
        }
    }

    #[inline]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn into_atoms(self) -> Vec<Atom> {
        self.atoms
    }

    pub fn is_bang(&self) -> bool {
        self.atoms.len() == 1 && self.atoms[0].is_symbol("bang")
    }

    /// A single numeric atom
    pub fn is_float(&self) -> bool {
        self.atoms.len() == 1 && self.atoms[0].as_float().is_some()
    }

    /// First atom is the symbol `selector`, e.g. `set ...`
    pub fn starts_with(&self, selector: &str) -> bool {
        self.atoms.first().map_or(false, |a| a.is_symbol(selector))
    }

    pub fn float_at(&self, index: usize) -> Option<f64> {
        self.atoms.get(index).and_then(Atom::as_float)
    }

    pub fn symbol_at(&self, index: usize) -> Option<&str> {
        self.atoms.get(index).and_then(Atom::as_symbol)
    }
}

impl FromIterator<Atom> for Message {
    fn from_iter<I: IntoIterator<Item = Atom>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<Vec<Atom>> for Message {
    fn from(atoms: Vec<Atom>) -> Self {
        Self::new(atoms)
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Atom;
    type IntoIter = core::slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.atoms.iter().join(" "))
    }
}

/// Build a [`Message`] from a list of numbers and string slices.
///
/// ```
/// use patchwerk::{msg, Atom};
///
/// let m = msg![123, "hello"];
/// assert_eq!(m.get(0), Some(&Atom::Float(123.0)));
/// ```
#[macro_export]
macro_rules! msg {
    ($($atom:expr),* $(,)?) => {
        $crate::Message::new(vec![$($crate::Atom::from($atom)),*])
    };
}

/// Build a `Vec<Atom>`, handy for declaration arguments.
#[macro_export]
macro_rules! atoms {
    ($($atom:expr),* $(,)?) => {
        vec![$($crate::Atom::from($atom)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_print_like_pd() {
        assert_eq!(Atom::Float(666.0).to_string(), "666");
        assert_eq!(Atom::Float(-3.0).to_string(), "-3");
        assert_eq!(Atom::Float(0.5).to_string(), "0.5");
        assert_eq!(Atom::symbol("earth").to_string(), "earth");
    }

    #[test]
    fn bang_detection() {
        assert!(Message::bang().is_bang());
        assert!(!msg!["bang", 1].is_bang());
        assert!(!msg![1].is_bang());
        assert!(msg![1].is_float());
        assert!(!msg![1, 2].is_float());
    }

    #[test]
    fn accessors() {
        let m = msg!["set", "array1"];
        assert!(m.starts_with("set"));
        assert_eq!(m.symbol_at(1), Some("array1"));
        assert_eq!(m.float_at(1), None);
        assert_eq!(m.len(), 2);
        assert_eq!(m.to_string(), "[set array1]");
        assert_eq!(Message::floats(&[44100.0]), msg![44100]);
    }
}
