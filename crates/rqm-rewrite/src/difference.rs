//! Type differences: the record of simplifying a concrete symbol's
//! substitutions.

use std::fmt;

use crate::rule::RelationId;
use crate::symbol::Symbol;
use crate::term::Term;

/// The difference between a concrete symbol and its simplified form.
///
/// `same_types` lists substitution slots whose term was reduced to a
/// different normal form; `concrete_types` lists slots whose normal form is
/// fixed to a concrete type, which was spliced into the schema.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDifference {
    /// The term the symbol is attached to.
    pub base_term: Term,
    pub lhs: Symbol,
    pub rhs: Symbol,
    pub same_types: Vec<(usize, Term)>,
    pub concrete_types: Vec<(usize, Symbol)>,
    /// The relation `[lhs] =>> [rhs]` justifying the replacement.
    pub relation: RelationId,
}

impl fmt::Display for TypeDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} => {}", self.base_term, self.lhs, self.rhs)?;
        for (index, term) in &self.same_types {
            write!(f, "\n  τ_0_{} := {}", index, term)?;
        }
        for (index, symbol) in &self.concrete_types {
            write!(f, "\n  τ_0_{} := {}", index, symbol)?;
        }
        Ok(())
    }
}
