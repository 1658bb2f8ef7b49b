//! Symbols, the letters of the rewrite alphabet.
//!
//! The variant order is the reduction order on symbols: when two terms of
//! the same length are compared, the first differing symbol decides, and
//! symbols of different kinds compare by their position in the enum.

use std::fmt;

use serde::{Serialize, Serializer};

use rqm_types::requirement::LayoutConstraint;
use rqm_types::ty::{GenericParam, Ty};

use crate::term::Term;

/// A single symbol of a term.
///
/// Concrete type, superclass and concrete conformance symbols carry a type
/// *schema* together with its substitutions: the `n`-th substitution term
/// stands for `τ_0_n` inside the schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// `[concrete: C : P]` -- the conformance of a concrete type to `P`.
    ConcreteConformance {
        ty: Ty,
        substitutions: Vec<Term>,
        protocol: String,
    },
    /// `[P]`
    Protocol(String),
    /// `[P:A]`
    AssociatedType { protocol: String, name: String },
    /// `τ_d_i`
    GenericParam(GenericParam),
    /// `[layout: AnyObject]`
    Layout(LayoutConstraint),
    /// `[superclass: C]`
    Superclass { ty: Ty, substitutions: Vec<Term> },
    /// `[concrete: C]`
    ConcreteType { ty: Ty, substitutions: Vec<Term> },
}

impl Symbol {
    pub fn protocol(name: &str) -> Symbol {
        Symbol::Protocol(name.to_string())
    }

    pub fn associated_type(protocol: &str, name: &str) -> Symbol {
        Symbol::AssociatedType {
            protocol: protocol.to_string(),
            name: name.to_string(),
        }
    }

    pub fn generic_param(depth: u32, index: u32) -> Symbol {
        Symbol::GenericParam(GenericParam::new(depth, index))
    }

    pub fn concrete_type(ty: Ty, substitutions: Vec<Term>) -> Symbol {
        Symbol::ConcreteType { ty, substitutions }
    }

    pub fn superclass(ty: Ty, substitutions: Vec<Term>) -> Symbol {
        Symbol::Superclass { ty, substitutions }
    }

    pub fn concrete_conformance(ty: Ty, substitutions: Vec<Term>, protocol: &str) -> Symbol {
        Symbol::ConcreteConformance {
            ty,
            substitutions,
            protocol: protocol.to_string(),
        }
    }

    /// Whether this symbol may appear at the end of the left-hand side of a
    /// property rule `T.[p] => T`.
    pub fn is_property(&self) -> bool {
        !matches!(self, Symbol::AssociatedType { .. } | Symbol::GenericParam(_))
    }

    /// Whether this symbol carries a type schema with substitutions.
    pub fn has_substitutions(&self) -> bool {
        matches!(
            self,
            Symbol::ConcreteConformance { .. } | Symbol::Superclass { .. } | Symbol::ConcreteType { .. }
        )
    }

    /// The type schema of a concrete type, superclass or concrete
    /// conformance symbol.
    pub fn concrete_ty(&self) -> Option<&Ty> {
        match self {
            Symbol::ConcreteConformance { ty, .. }
            | Symbol::Superclass { ty, .. }
            | Symbol::ConcreteType { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// The substitutions of a symbol carrying a schema; empty otherwise.
    pub fn substitutions(&self) -> &[Term] {
        match self {
            Symbol::ConcreteConformance { substitutions, .. }
            | Symbol::Superclass { substitutions, .. }
            | Symbol::ConcreteType { substitutions, .. } => substitutions,
            _ => &[],
        }
    }

    /// The protocol of a protocol, associated type or concrete conformance
    /// symbol.
    pub fn protocol_name(&self) -> Option<&str> {
        match self {
            Symbol::Protocol(protocol)
            | Symbol::AssociatedType { protocol, .. }
            | Symbol::ConcreteConformance { protocol, .. } => Some(protocol),
            _ => None,
        }
    }

    /// Replace the schema and substitutions of a symbol, keeping its kind.
    pub fn with_concrete(&self, ty: Ty, substitutions: Vec<Term>) -> Symbol {
        match self {
            Symbol::ConcreteConformance { protocol, .. } => Symbol::ConcreteConformance {
                ty,
                substitutions,
                protocol: protocol.clone(),
            },
            Symbol::Superclass { .. } => Symbol::Superclass { ty, substitutions },
            Symbol::ConcreteType { .. } => Symbol::ConcreteType { ty, substitutions },
            other => other.clone(),
        }
    }

    /// Map every substitution term.
    pub fn transform_substitutions(&self, mut f: impl FnMut(&Term) -> Term) -> Symbol {
        match self.concrete_ty() {
            Some(ty) => {
                let substitutions = self.substitutions().iter().map(&mut f).collect();
                self.with_concrete(ty.clone(), substitutions)
            }
            None => self.clone(),
        }
    }

    /// Prepend `prefix` to every substitution term.
    ///
    /// A property inherited by `X.T` from the bag of `T` describes `X.T`
    /// only after its substitutions are moved under `X`.
    pub fn prepend_prefix_to_concrete_substitutions(&self, prefix: &Term) -> Symbol {
        if prefix.is_empty() {
            return self.clone();
        }
        self.transform_substitutions(|term| prefix.append(term))
    }

    /// Remove `prefix` from every substitution term, if every term has it.
    pub fn strip_prefix_from_concrete_substitutions(&self, prefix: &Term) -> Option<Symbol> {
        if !self.substitutions().iter().all(|t| t.starts_with(prefix)) {
            return None;
        }
        Some(self.transform_substitutions(|term| Term::new(term[prefix.len()..].to_vec())))
    }

    /// The concrete type symbol with the schema and substitutions of this
    /// concrete conformance symbol.
    pub fn to_concrete_type(&self) -> Option<Symbol> {
        match self {
            Symbol::ConcreteConformance { ty, substitutions, .. } => Some(Symbol::ConcreteType {
                ty: ty.clone(),
                substitutions: substitutions.clone(),
            }),
            _ => None,
        }
    }
}

fn write_substitutions(f: &mut fmt::Formatter<'_>, substitutions: &[Term]) -> fmt::Result {
    if substitutions.is_empty() {
        return Ok(());
    }
    write!(f, " with <")?;
    for (i, term) in substitutions.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", term)?;
    }
    write!(f, ">")
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::ConcreteConformance {
                ty,
                substitutions,
                protocol,
            } => {
                write!(f, "[concrete: {} : {}", ty, protocol)?;
                write_substitutions(f, substitutions)?;
                write!(f, "]")
            }
            Symbol::Protocol(name) => write!(f, "[{}]", name),
            Symbol::AssociatedType { protocol, name } => write!(f, "[{}:{}]", protocol, name),
            Symbol::GenericParam(param) => write!(f, "{}", param),
            Symbol::Layout(layout) => write!(f, "[layout: {}]", layout),
            Symbol::Superclass { ty, substitutions } => {
                write!(f, "[superclass: {}", ty)?;
                write_substitutions(f, substitutions)?;
                write!(f, "]")
            }
            Symbol::ConcreteType { ty, substitutions } => {
                write!(f, "[concrete: {}", ty)?;
                write_substitutions(f, substitutions)?;
                write!(f, "]")
            }
        }
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
