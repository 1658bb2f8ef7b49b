//! The requirement machine: a rewrite system, its property map and the
//! conformance lookup they are built against.
//!
//! Rules are added from generic signatures, then property map passes run
//! until nested type concretization stops producing new rules.

use thiserror::Error;

use rqm_types::error::RequirementError;
use rqm_types::registry::ConformanceLookup;
use rqm_types::requirement::GenericSignature;

use crate::options::RewriteOptions;
use crate::property_map::PropertyMap;
use crate::rule_builder::RuleBuilder;
use crate::system::RewriteSystem;
use crate::term::Term;

/// Why a machine gave up before reaching a fixpoint.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("rewrite system exceeded {limit} rules ({count} rules)")]
    MaxRuleCount { limit: usize, count: usize },
    #[error("no fixpoint after {passes} property map passes")]
    MaxPasses { passes: usize },
    #[error("concrete type of `{key}` nests {depth} levels deep (limit {limit})")]
    MaxConcreteNesting { key: Term, depth: usize, limit: usize },
}

pub struct RequirementMachine<'a> {
    lookup: &'a dyn ConformanceLookup,
    system: RewriteSystem,
    map: PropertyMap,
}

impl<'a> RequirementMachine<'a> {
    pub fn new(lookup: &'a dyn ConformanceLookup, options: RewriteOptions) -> Self {
        RequirementMachine {
            lookup,
            system: RewriteSystem::new(options),
            map: PropertyMap::new(),
        }
    }

    /// Add the rules of a generic signature and of every protocol it
    /// references. Returns the errors found while lowering; they are also
    /// kept in the rewrite system.
    pub fn add_generic_signature(&mut self, signature: &GenericSignature) -> Vec<RequirementError> {
        let mut builder = RuleBuilder::new(self.lookup).with_known_protocols(self.system.known_protocols());
        builder.add_requirements(&signature.requirements);
        builder.collect_rules_from_referenced_protocols();

        for (lhs, rhs) in builder.permanent_rules.drain(..) {
            self.system.add_permanent_rule(lhs, rhs);
        }
        for (lhs, rhs) in builder.requirement_rules.drain(..) {
            self.system.add_explicit_rule(lhs, rhs);
        }
        self.system.add_known_protocols(builder.protocols());

        let errors = std::mem::take(&mut builder.errors);
        self.system.record_errors(errors.iter().cloned());
        errors
    }

    /// Run property map passes until no pass adds a rule. Returns the
    /// number of passes.
    pub fn compute_completion(&mut self) -> Result<usize, MachineError> {
        let options = self.system.options().clone();
        for pass in 1..=options.max_passes {
            let before = self.system.rules().len();

            self.map.rebuild(&mut self.system);
            self.check_concrete_nesting(options.max_concrete_nesting)?;
            self.map
                .concretize_nested_types_from_concrete_parents(&mut self.system, self.lookup);

            let count = self.system.rules().len();
            if count > options.max_rule_count {
                return Err(MachineError::MaxRuleCount {
                    limit: options.max_rule_count,
                    count,
                });
            }
            if count == before {
                return Ok(pass);
            }
        }
        Err(MachineError::MaxPasses {
            passes: options.max_passes,
        })
    }

    fn check_concrete_nesting(&self, limit: usize) -> Result<(), MachineError> {
        for bag in self.map.bags() {
            for symbol in bag.concrete_type_symbol().into_iter().chain(bag.superclass_symbol()) {
                let depth = symbol.concrete_ty().map_or(0, |ty| ty.nesting_depth());
                if depth > limit {
                    return Err(MachineError::MaxConcreteNesting {
                        key: bag.key().clone(),
                        depth,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn system(&self) -> &RewriteSystem {
        &self.system
    }

    pub fn property_map(&self) -> &PropertyMap {
        &self.map
    }
}
