//! Terms: immutable sequences of symbols under the shortlex order.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

use serde::{Serialize, Serializer};

use crate::symbol::Symbol;

/// A term, such as `τ_0_0.[P:A].[Q:B]`.
///
/// Terms hash and compare like their symbol slices, so maps keyed by `Term`
/// can be queried with a `&[Symbol]` suffix without allocating.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Term {
    symbols: Vec<Symbol>,
}

impl Term {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Term { symbols }
    }

    /// A term of a single symbol.
    pub fn single(symbol: Symbol) -> Self {
        Term {
            symbols: vec![symbol],
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// This term followed by `symbol`.
    pub fn with(&self, symbol: Symbol) -> Term {
        let mut symbols = Vec::with_capacity(self.symbols.len() + 1);
        symbols.extend_from_slice(&self.symbols);
        symbols.push(symbol);
        Term { symbols }
    }

    /// This term followed by `other`.
    pub fn append(&self, other: &[Symbol]) -> Term {
        let mut symbols = Vec::with_capacity(self.symbols.len() + other.len());
        symbols.extend_from_slice(&self.symbols);
        symbols.extend_from_slice(other);
        Term { symbols }
    }

    /// The first `len` symbols.
    pub fn prefix(&self, len: usize) -> Term {
        Term::new(self.symbols[..len].to_vec())
    }

    /// The protocol this term is rooted in, if its first symbol is a
    /// protocol or associated type symbol.
    pub fn root_protocol(&self) -> Option<&str> {
        match self.symbols.first()? {
            Symbol::Protocol(protocol) | Symbol::AssociatedType { protocol, .. } => Some(protocol),
            _ => None,
        }
    }

    /// Whether `pattern` occurs at position `pos`.
    pub fn matches_at(&self, pos: usize, pattern: &[Symbol]) -> bool {
        self.symbols
            .get(pos..pos + pattern.len())
            .is_some_and(|window| window == pattern)
    }

    /// Replace `len` symbols starting at `pos` with `replacement`.
    pub fn replace(&self, pos: usize, len: usize, replacement: &[Symbol]) -> Term {
        let mut symbols = Vec::with_capacity(self.symbols.len() - len + replacement.len());
        symbols.extend_from_slice(&self.symbols[..pos]);
        symbols.extend_from_slice(replacement);
        symbols.extend_from_slice(&self.symbols[pos + len..]);
        Term { symbols }
    }

    /// Replace the symbol at `pos`.
    pub fn with_symbol_at(&self, pos: usize, symbol: Symbol) -> Term {
        let mut symbols = self.symbols.clone();
        symbols[pos] = symbol;
        Term { symbols }
    }
}

impl Deref for Term {
    type Target = [Symbol];

    fn deref(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl Borrow<[Symbol]> for Term {
    fn borrow(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl From<Vec<Symbol>> for Term {
    fn from(symbols: Vec<Symbol>) -> Self {
        Term { symbols }
    }
}

/// Shortlex: shorter terms are smaller; terms of equal length compare
/// symbol by symbol.
impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.symbols
            .len()
            .cmp(&other.symbols.len())
            .then_with(|| self.symbols.cmp(&other.symbols))
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, symbol) in self.symbols.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", symbol)?;
        }
        Ok(())
    }
}

impl Serialize for Term {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
