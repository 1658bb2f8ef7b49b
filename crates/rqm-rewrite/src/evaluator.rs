//! Replaying rewrite paths.
//!
//! The evaluator applies each step of a path to a term and checks that the
//! step actually applies there. A derived rule is verified by replaying its
//! path from the left-hand side and comparing the result with the
//! right-hand side.

use thiserror::Error;

use crate::path::{RewritePath, RewriteStep, StepKind};
use crate::rule::{RelationId, RuleId};
use crate::system::RewriteSystem;
use crate::term::Term;

/// A path that does not replay.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvaluatorError {
    #[error("unknown rule {0}")]
    UnknownRule(RuleId),
    #[error("unknown relation {0}")]
    UnknownRelation(RelationId),
    #[error("step {step} has offsets outside of `{term}`")]
    BadOffsets { step: usize, term: Term },
    #[error("step {step} does not apply to `{term}`")]
    StepDoesNotApply { step: usize, term: Term },
    #[error("step {step} expects a concrete symbol in `{term}`")]
    NotConcreteSymbol { step: usize, term: Term },
    #[error("path ends at `{found}`, expected `{expected}`")]
    WrongEndTerm { expected: Term, found: Term },
}

/// Replays paths against the rules and relations of a rewrite system.
pub struct RewritePathEvaluator<'a> {
    system: &'a RewriteSystem,
}

impl<'a> RewritePathEvaluator<'a> {
    pub fn new(system: &'a RewriteSystem) -> Self {
        RewritePathEvaluator { system }
    }

    /// Apply every step of `path` to `start`, returning the final term.
    pub fn evaluate(&self, start: &Term, path: &RewritePath) -> Result<Term, EvaluatorError> {
        let mut term = start.clone();
        for (index, step) in path.steps().iter().enumerate() {
            term = self.apply(index, step, &term)?;
        }
        Ok(term)
    }

    /// Check that the path of a rule leads from its left-hand side to its
    /// right-hand side. Axioms have nothing to check.
    pub fn verify_rule(&self, id: RuleId) -> Result<(), EvaluatorError> {
        let rule = self
            .system
            .rules()
            .get(id.0 as usize)
            .ok_or(EvaluatorError::UnknownRule(id))?;
        let Some(path) = rule.path() else {
            return Ok(());
        };
        let end = self.evaluate(rule.lhs(), path)?;
        if &end != rule.rhs() {
            return Err(EvaluatorError::WrongEndTerm {
                expected: rule.rhs().clone(),
                found: end,
            });
        }
        Ok(())
    }

    fn apply(&self, index: usize, step: &RewriteStep, term: &Term) -> Result<Term, EvaluatorError> {
        match step.kind {
            StepKind::Rule { id } => {
                let rule = self
                    .system
                    .rules()
                    .get(id.0 as usize)
                    .ok_or(EvaluatorError::UnknownRule(id))?;
                self.replace(index, step, term, rule.lhs(), rule.rhs())
            }
            StepKind::Relation { id } => {
                let relation = self
                    .system
                    .relations()
                    .get(id.0 as usize)
                    .ok_or(EvaluatorError::UnknownRelation(id))?;
                self.replace(index, step, term, &relation.lhs, &relation.rhs)
            }
            StepKind::PrefixSubstitutions { length } => {
                let bad_offsets = || EvaluatorError::BadOffsets {
                    step: index,
                    term: term.clone(),
                };
                if step.start_offset + length + step.end_offset + 1 > term.len() {
                    return Err(bad_offsets());
                }
                let pos = term.len() - step.end_offset - 1;
                let symbol = &term[pos];
                if !symbol.has_substitutions() {
                    return Err(EvaluatorError::NotConcreteSymbol {
                        step: index,
                        term: term.clone(),
                    });
                }
                let prefix = Term::new(term[step.start_offset..step.start_offset + length].to_vec());
                let rewritten = if step.inverse {
                    symbol
                        .strip_prefix_from_concrete_substitutions(&prefix)
                        .ok_or_else(|| EvaluatorError::StepDoesNotApply {
                            step: index,
                            term: term.clone(),
                        })?
                } else {
                    symbol.prepend_prefix_to_concrete_substitutions(&prefix)
                };
                Ok(term.with_symbol_at(pos, rewritten))
            }
        }
    }

    /// Rewrite `from` to `to` (or back, for an inverse step) at the step's
    /// position.
    fn replace(
        &self,
        index: usize,
        step: &RewriteStep,
        term: &Term,
        lhs: &Term,
        rhs: &Term,
    ) -> Result<Term, EvaluatorError> {
        let (from, to) = if step.inverse { (rhs, lhs) } else { (lhs, rhs) };
        if step.start_offset + from.len() + step.end_offset != term.len() {
            return Err(EvaluatorError::BadOffsets {
                step: index,
                term: term.clone(),
            });
        }
        if !term.matches_at(step.start_offset, from) {
            return Err(EvaluatorError::StepDoesNotApply {
                step: index,
                term: term.clone(),
            });
        }
        Ok(term.replace(step.start_offset, from.len(), to))
    }
}
