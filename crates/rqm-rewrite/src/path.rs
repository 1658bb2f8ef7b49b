//! Rewrite paths: derivation certificates for rules.
//!
//! A path is a sequence of steps, each rewriting one position of a term by
//! a rule, a relation, or a substitution prefixing. Paths are recorded as
//! data and only ever replayed by the evaluator.

use std::fmt;

use serde::Serialize;

use crate::rule::{RelationId, RuleId};

/// What a single step applies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepKind {
    /// Apply a rewrite rule.
    Rule { id: RuleId },
    /// Apply a recorded relation.
    Relation { id: RelationId },
    /// Prepend the first `length` symbols of the term to the substitutions
    /// of the concrete symbol at `end_offset` from the end.
    PrefixSubstitutions { length: usize },
}

/// One step of a rewrite path.
///
/// The step rewrites the subterm between `start_offset` symbols from the
/// start and `end_offset` symbols from the end. An inverse step rewrites
/// right-to-left.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RewriteStep {
    pub kind: StepKind,
    pub start_offset: usize,
    pub end_offset: usize,
    pub inverse: bool,
}

impl RewriteStep {
    pub fn for_rule(start_offset: usize, end_offset: usize, id: RuleId, inverse: bool) -> Self {
        RewriteStep {
            kind: StepKind::Rule { id },
            start_offset,
            end_offset,
            inverse,
        }
    }

    /// Relations always rewrite a suffix of the term.
    pub fn for_relation(start_offset: usize, id: RelationId, inverse: bool) -> Self {
        RewriteStep {
            kind: StepKind::Relation { id },
            start_offset,
            end_offset: 0,
            inverse,
        }
    }

    pub fn for_prefix_substitutions(length: usize, end_offset: usize, inverse: bool) -> Self {
        RewriteStep {
            kind: StepKind::PrefixSubstitutions { length },
            start_offset: 0,
            end_offset,
            inverse,
        }
    }

    pub fn invert(&mut self) {
        self.inverse = !self.inverse;
    }
}

impl fmt::Display for RewriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inv = if self.inverse { "⁻¹" } else { "" };
        match self.kind {
            StepKind::Rule { id } => {
                write!(f, "{}{} @{}..{}", id, inv, self.start_offset, self.end_offset)
            }
            StepKind::Relation { id } => write!(f, "{}{} @{}", id, inv, self.start_offset),
            StepKind::PrefixSubstitutions { length } => {
                write!(f, "prefix({}){} @..{}", length, inv, self.end_offset)
            }
        }
    }
}

/// An ordered sequence of rewrite steps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RewritePath {
    steps: Vec<RewriteStep>,
}

impl RewritePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: RewriteStep) {
        self.steps.push(step);
    }

    pub fn append(&mut self, other: &RewritePath) {
        self.steps.extend_from_slice(&other.steps);
    }

    /// Reverse the path: the steps run backwards, each one inverted.
    pub fn invert(&mut self) {
        self.steps.reverse();
        for step in &mut self.steps {
            step.invert();
        }
    }

    pub fn inverted(&self) -> RewritePath {
        let mut path = self.clone();
        path.invert();
        path
    }

    pub fn steps(&self) -> &[RewriteStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for RewritePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " ⊗ ")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}
