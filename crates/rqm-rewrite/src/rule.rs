//! Rewrite rules, relations and their identifiers.

use std::fmt;

use serde::Serialize;

use crate::path::RewritePath;
use crate::symbol::Symbol;
use crate::term::Term;

/// Index of a rule in the rewrite system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RuleId(pub u32);

/// Index of a relation in the rewrite system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RelationId(pub u32);

/// Index of a type difference in the rewrite system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DifferenceId(pub u32);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel{}", self.0)
    }
}

/// A rewrite rule `lhs => rhs`, with `lhs > rhs` in the shortlex order.
#[derive(Clone, Debug)]
pub struct Rule {
    lhs: Term,
    rhs: Term,
    /// Derivation from `lhs` to `rhs`; `None` for axioms.
    path: Option<RewritePath>,
    permanent: bool,
    explicit: bool,
    conflicting: bool,
}

impl Rule {
    pub(crate) fn new(lhs: Term, rhs: Term, path: Option<RewritePath>) -> Self {
        debug_assert!(lhs > rhs, "rule {} => {} is not oriented", lhs, rhs);
        Rule {
            lhs,
            rhs,
            path,
            permanent: false,
            explicit: false,
            conflicting: false,
        }
    }

    pub fn lhs(&self) -> &Term {
        &self.lhs
    }

    pub fn rhs(&self) -> &Term {
        &self.rhs
    }

    pub fn path(&self) -> Option<&RewritePath> {
        self.path.as_ref()
    }

    /// Permanent rules come from protocol structure (`[P].[P] => [P]`).
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Explicit rules come from written requirements.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn is_conflicting(&self) -> bool {
        self.conflicting
    }

    pub(crate) fn mark_permanent(&mut self) {
        self.permanent = true;
    }

    pub(crate) fn mark_explicit(&mut self) {
        self.explicit = true;
    }

    pub(crate) fn mark_conflicting(&mut self) {
        self.conflicting = true;
    }

    /// If this is a property rule `T.[p] => T`, the property symbol `[p]`.
    pub fn is_property_rule(&self) -> Option<&Symbol> {
        let last = self.lhs.last()?;
        if self.lhs.len() == self.rhs.len() + 1 && self.lhs.starts_with(&self.rhs) && last.is_property()
        {
            Some(last)
        } else {
            None
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.lhs, self.rhs)?;
        if self.permanent {
            write!(f, " [permanent]")?;
        }
        if self.explicit {
            write!(f, " [explicit]")?;
        }
        if self.conflicting {
            write!(f, " [conflicting]")?;
        }
        Ok(())
    }
}

/// A recorded equivalence `lhs =>> rhs` between two terms that is justified
/// outside the rule set: by a conformance, a type witness or a type
/// difference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    pub lhs: Term,
    pub rhs: Term,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} =>> {}", self.lhs, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rqm_types::ty::Ty;

    #[test]
    fn property_rule_detection() {
        let t = Term::single(Symbol::generic_param(0, 0));
        let concrete = Symbol::concrete_type(Ty::int(), vec![]);
        let rule = Rule::new(t.with(concrete.clone()), t.clone(), None);
        assert_eq!(rule.is_property_rule(), Some(&concrete));

        let assoc = Rule::new(
            Term::new(vec![Symbol::protocol("P"), Symbol::associated_type("P", "A")]),
            Term::single(Symbol::associated_type("P", "A")),
            None,
        );
        assert_eq!(assoc.is_property_rule(), None);
    }

    #[test]
    fn display_flags() {
        let t = Term::single(Symbol::generic_param(0, 0));
        let mut rule = Rule::new(t.with(Symbol::protocol("P")), t, None);
        rule.mark_explicit();
        rule.mark_conflicting();
        assert_eq!(rule.to_string(), "τ_0_0.[P] => τ_0_0 [explicit] [conflicting]");
    }
}
