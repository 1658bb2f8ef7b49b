//! Nested type concretization.
//!
//! Suppose a bag has both a conformance to `P` and a concrete type `C`
//! (or a superclass `C`), and `C: P` has the type witness `W` for the
//! associated type `A`. Then the nested type `T.[P:A]` is `W`, and a rule
//! relating the two is added to the rewrite system.
//!
//! For example, given
//!
//! ```text
//! protocol Q { associatedtype V }
//! protocol P { associatedtype A; associatedtype B }
//! struct Foo<X, Y: Q>: P { typealias A = X; typealias B = Y.V }
//!
//! τ_0_0 => { conforms_to: [P] concrete_type: [concrete: Foo<Int, τ_0_0> with <τ_0_1>] }
//! ```
//!
//! the witness for `A` is the concrete type `Int`, which induces
//!
//! ```text
//! τ_0_0.[concrete: Foo<Int, τ_0_0> : P with <τ_0_1>].[P:A].[concrete: Int] => ...
//! ```
//!
//! and the witness for `B` is the abstract type `τ_0_0.V`, which through the
//! substitutions `<τ_0_1>` is the term `τ_0_1.[Q:V]`.
//!
//! Every induced rule carries a rewrite path built from relations, so the
//! derivation can be replayed by the evaluator.

use std::rc::Rc;

use rqm_types::desugar::desugar_requirement;
use rqm_types::registry::{ConcreteConformance, ConformanceLookup, ProtocolConformanceRef};
use rqm_types::requirement::{Requirement, RequirementKind};
use rqm_types::ty::Ty;

use crate::context::{relative_substitution_schema_from_type, relative_term_for_type, rule_for_requirement};
use crate::options::DebugFlag;
use crate::path::{RewritePath, RewriteStep};
use crate::property_map::{InducedRule, PropertyMap};
use crate::rule::RuleId;
use crate::rule_builder::RuleBuilder;
use crate::symbol::Symbol;
use crate::system::RewriteSystem;
use crate::term::Term;
use crate::trace::TraceEvent;

impl PropertyMap {
    /// Concretize the nested types of every bag that has conformances
    /// together with a concrete type or a superclass.
    pub fn concretize_nested_types_from_concrete_parents(
        &mut self,
        system: &mut RewriteSystem,
        lookup: &dyn ConformanceLookup,
    ) {
        for index in 0..self.entries.len() {
            let bag = &self.entries[index];
            if bag.conforms_to.is_empty() {
                continue;
            }
            let key = bag.key().clone();
            let conforms_to = bag.conforms_to.clone();
            let concrete_type = bag.concrete_type.clone();
            let superclass = bag.superclass.clone();

            if let Some((symbol, rule)) = concrete_type {
                system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::ConcretizeBag {
                    key: key.clone(),
                    via: RequirementKind::SameType,
                });
                let conformances = self.concretize_nested_types_from_concrete_parent(
                    system,
                    lookup,
                    &key,
                    RequirementKind::SameType,
                    &symbol,
                    rule,
                    &conforms_to,
                );
                self.entries[index].concrete_conformances = conformances;
            }

            if let Some((symbol, rule)) = superclass {
                system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::ConcretizeBag {
                    key: key.clone(),
                    via: RequirementKind::Superclass,
                });
                let conformances = self.concretize_nested_types_from_concrete_parent(
                    system,
                    lookup,
                    &key,
                    RequirementKind::Superclass,
                    &symbol,
                    rule,
                    &conforms_to,
                );
                self.entries[index].superclass_conformances = conformances;
            }
        }
    }

    /// Resolve each conformance of the bag `key` against its concrete type
    /// or superclass `concrete`, returning the conformances found.
    ///
    /// # Panics
    ///
    /// Panics if the lookup answers a concrete type with an abstract
    /// conformance.
    #[allow(clippy::too_many_arguments)]
    fn concretize_nested_types_from_concrete_parent(
        &mut self,
        system: &mut RewriteSystem,
        lookup: &dyn ConformanceLookup,
        key: &Term,
        kind: RequirementKind,
        concrete: &Symbol,
        concrete_rule: RuleId,
        conforms_to: &[(String, RuleId)],
    ) -> Vec<Rc<ConcreteConformance>> {
        let Some(concrete_ty) = concrete.concrete_ty() else {
            return Vec::new();
        };
        let substitutions = concrete.substitutions();
        let mut conformances = Vec::new();

        for (protocol, conformance_rule) in conforms_to {
            // Pairs inherited from the bag of a suffix were handled there.
            let pair = (concrete_rule, *conformance_rule);
            if let Some(conformance) = self.concrete_conformances.get(&pair) {
                conformances.push(Rc::clone(conformance));
                continue;
            }

            let conformance = match lookup.lookup_conformance(concrete_ty, protocol) {
                ProtocolConformanceRef::Concrete(conformance) => conformance,
                ProtocolConformanceRef::Invalid => {
                    // A class bound does not have to conform; a concrete
                    // type that does not is a conflict.
                    if kind == RequirementKind::SameType {
                        for rule in [concrete_rule, *conformance_rule] {
                            if system.rule(rule).rhs().len() == key.len() {
                                system.mark_conflicting(rule);
                            }
                        }
                    }
                    system.trace_event(DebugFlag::ConcretizeNestedTypes, || {
                        TraceEvent::MissingConformance {
                            ty: concrete_ty.to_string(),
                            protocol: protocol.clone(),
                        }
                    });
                    continue;
                }
                ProtocolConformanceRef::Abstract => {
                    panic!("abstract conformance of concrete type `{}` to `{}`", concrete_ty, protocol)
                }
            };

            let inserted = self
                .concrete_conformances
                .insert(pair, Rc::clone(&conformance))
                .is_none();
            assert!(inserted, "conformance for {:?} recorded twice", pair);
            conformances.push(Rc::clone(&conformance));

            let conformance_symbol =
                Symbol::concrete_conformance(concrete_ty.clone(), substitutions.to_vec(), protocol);
            self.record_concrete_conformance_rule(system, concrete_rule, *conformance_rule, &conformance_symbol);

            let assoc_names: Vec<String> = lookup
                .protocol(protocol)
                .map(|decl| decl.associated_types.iter().map(|a| a.name.clone()).collect())
                .unwrap_or_default();
            for assoc in &assoc_names {
                self.concretize_type_witness_in_conformance(
                    system,
                    key,
                    kind,
                    &conformance_symbol,
                    &conformance,
                    assoc,
                );
            }

            // Protocol requirement signatures do not get conditional
            // requirements.
            if key.root_protocol().is_none() {
                self.infer_conditional_requirements(system, lookup, &conformance, substitutions);
            }
        }

        conformances
    }

    /// Add the rule `T.[concrete: C : P].[P:A]` equals the type witness of
    /// `A`.
    fn concretize_type_witness_in_conformance(
        &mut self,
        system: &mut RewriteSystem,
        key: &Term,
        kind: RequirementKind,
        conformance_symbol: &Symbol,
        conformance: &ConcreteConformance,
        assoc: &str,
    ) {
        let Symbol::ConcreteConformance {
            ty: concrete_ty,
            substitutions,
            protocol,
        } = conformance_symbol
        else {
            unreachable!("{} is not a concrete conformance symbol", conformance_symbol);
        };

        let (witness, inferred) = match conformance.type_witness(assoc) {
            Some(witness) => (witness.clone(), true),
            None => (Ty::Error, false),
        };
        system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::TypeWitness {
            protocol: protocol.clone(),
            assoc: assoc.to_string(),
            ty: concrete_ty.to_string(),
            witness: witness.to_string(),
            inferred,
        });

        // T.[concrete: C : P].[P:A]
        let subject = key
            .with(conformance_symbol.clone())
            .with(Symbol::associated_type(protocol, assoc));

        let mut path = RewritePath::new();
        let constraint = self.compute_constraint_term_for_type_witness(
            system,
            key,
            kind,
            concrete_ty,
            &witness,
            &subject,
            substitutions,
            &mut path,
        );
        assert!(!path.is_empty(), "no path from {} to {}", constraint, subject);

        let inserted = system.add_rule(constraint.clone(), subject.clone(), Some(&path));
        system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::InducedRule {
            constraint: constraint.clone(),
            subject: subject.clone(),
            inserted,
        });
        self.induced_rules.push(InducedRule {
            constraint,
            subject,
            inserted,
        });
    }

    /// The term the subject `T.[concrete: C : P].[P:A]` is equal to, with
    /// the path from that term to the subject appended to `path`.
    ///
    /// - An abstract witness `τ_0_n.X` is the term `S[n].X`.
    /// - A fully concrete witness equal to the concrete type of a prefix `U`
    ///   of the key ties off recursion with `U.[concrete: W]`.
    /// - A witness equal to the parent's concrete type gives
    ///   `T.[concrete: C : P]`.
    /// - Otherwise the subject gets the concrete type of the witness.
    #[allow(clippy::too_many_arguments)]
    fn compute_constraint_term_for_type_witness(
        &self,
        system: &mut RewriteSystem,
        key: &Term,
        kind: RequirementKind,
        concrete_ty: &Ty,
        witness: &Ty,
        subject: &Term,
        substitutions: &[Term],
        path: &mut RewritePath,
    ) -> Term {
        if witness.is_type_parameter() {
            let result = relative_term_for_type(witness, substitutions);
            let relation = system.record_relation(result.clone(), subject.clone());
            path.add(RewriteStep::for_relation(0, relation, false));
            return result;
        }

        let mut witness_substitutions = Vec::new();
        let schema = relative_substitution_schema_from_type(witness, substitutions, &mut witness_substitutions);
        let mut witness_symbol = Symbol::concrete_type(schema, witness_substitutions);

        if !witness.has_type_parameter() {
            for end in (1..=key.len()).rev() {
                let Some(props) = self.lookup_properties(&key[..end]) else {
                    continue;
                };
                let same = props
                    .concrete_type_symbol()
                    .and_then(Symbol::concrete_ty)
                    .is_some_and(|ty| ty == witness);
                if !same {
                    continue;
                }
                let result = props.key().with(witness_symbol.clone());
                let relation = system.record_relation(result.clone(), subject.clone());
                path.add(RewriteStep::for_relation(0, relation, false));
                system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::ReusedPropertyBag {
                    term: result.clone(),
                });
                return result;
            }
        }

        let conformance_symbol = &subject[subject.len() - 2];
        let assoc_symbol = &subject[subject.len() - 1];

        // Recorded against the witness symbol before simplification.
        let witness_relation =
            system.record_concrete_type_witness_relation(conformance_symbol, assoc_symbol, &witness_symbol);

        let mut subst_path = RewritePath::new();
        if let Some(id) =
            system.simplify_substitutions(key, &witness_symbol, Some(self), subject.len(), &mut subst_path)
        {
            let difference = system.type_difference(id);
            debug_assert_eq!(difference.lhs, witness_symbol);
            witness_symbol = difference.rhs.clone();
            subst_path.invert();
        }

        if kind == RequirementKind::SameType
            && witness_symbol.concrete_ty() == Some(concrete_ty)
            && witness_symbol.substitutions() == substitutions
        {
            system.trace_event(DebugFlag::ConcretizeNestedTypes, || TraceEvent::SameTypeWitness {
                key: key.clone(),
                protocol: conformance_symbol.protocol_name().unwrap_or_default().to_string(),
                assoc: assoc_symbol.to_string(),
            });

            let result = key.with(conformance_symbol.clone());
            let same_relation = system.record_same_type_witness_relation(conformance_symbol, assoc_symbol);

            // T.([concrete: C : P] => [concrete: C : P].[P:A].[concrete: C])
            path.add(RewriteStep::for_relation(key.len(), same_relation, true));
            // T.[concrete: C : P].[P:A].([concrete: C] => [concrete: W])
            path.append(&subst_path);
            // T.([concrete: C : P].[P:A].[concrete: W] => [concrete: C : P].[P:A])
            path.add(RewriteStep::for_relation(key.len(), witness_relation, false));
            return result;
        }

        let result = subject.with(witness_symbol);
        path.append(&subst_path);
        path.add(RewriteStep::for_relation(key.len(), witness_relation, false));
        result
    }

    /// Add `T''.[concrete: C : P] => T''`, where `T''` is the longer of the
    /// right-hand sides of the concrete type rule `T'.[concrete: C] => T'`
    /// and the conformance rule `T.[P] => T`.
    fn record_concrete_conformance_rule(
        &self,
        system: &mut RewriteSystem,
        concrete_rule: RuleId,
        conformance_rule: RuleId,
        conformance_symbol: &Symbol,
    ) {
        let (concrete_rhs, mut concrete_symbol) = {
            let rule = system.rule(concrete_rule);
            let symbol = rule
                .is_property_rule()
                .unwrap_or_else(|| panic!("{} is not a property rule", concrete_rule))
                .clone();
            (rule.rhs().clone(), symbol)
        };
        let (conformance_rhs, protocol_symbol) = {
            let rule = system.rule(conformance_rule);
            let symbol = rule
                .is_property_rule()
                .unwrap_or_else(|| panic!("{} is not a property rule", conformance_rule))
                .clone();
            (rule.rhs().clone(), symbol)
        };

        // One right-hand side is a suffix of the other.
        let rhs = if concrete_rhs.len() > conformance_rhs.len() {
            concrete_rhs.clone()
        } else {
            conformance_rhs.clone()
        };

        let mut path = RewritePath::new();

        // T'' => T''.[P]
        path.add(RewriteStep::for_rule(
            rhs.len() - conformance_rhs.len(),
            0,
            conformance_rule,
            true,
        ));

        // T''.[P] => T''.[concrete: C].[P]
        let prefix_len = rhs.len() - concrete_rhs.len();
        path.add(RewriteStep::for_rule(prefix_len, 1, concrete_rule, true));

        // Move the substitutions of [concrete: C] under the prefix.
        if prefix_len > 0 && !conformance_symbol.substitutions().is_empty() {
            path.add(RewriteStep::for_prefix_substitutions(prefix_len, 1, false));
            concrete_symbol = concrete_symbol.prepend_prefix_to_concrete_substitutions(&rhs.prefix(prefix_len));
        }

        // T''.[concrete: C].[P] => T''.[concrete: C : P]
        let relation =
            system.record_concrete_conformance_relation(&concrete_symbol, &protocol_symbol, conformance_symbol);
        path.add(RewriteStep::for_relation(rhs.len(), relation, false));

        path.invert();
        let lhs = rhs.with(conformance_symbol.clone());
        system.add_rule(lhs, rhs, Some(&path));
    }

    /// Add rules for the conditional requirements of a conformance, read
    /// relative to `substitutions`.
    ///
    /// Protocols first mentioned here have their rules added to the system.
    fn infer_conditional_requirements(
        &self,
        system: &mut RewriteSystem,
        lookup: &dyn ConformanceLookup,
        conformance: &ConcreteConformance,
        substitutions: &[Term],
    ) {
        let conditional = &conformance.conditional_requirements;
        system.trace_event(DebugFlag::ConditionalRequirements, || {
            TraceEvent::ConditionalRequirements {
                ty: conformance.ty.to_string(),
                protocol: conformance.protocol.clone(),
                requirements: conditional.iter().map(Requirement::to_string).collect(),
            }
        });
        if conditional.is_empty() {
            return;
        }

        let mut desugared = Vec::new();
        let mut errors = Vec::new();
        for req in conditional {
            desugar_requirement(req, lookup, &mut desugared, &mut errors);
        }
        system.record_errors(errors);

        for req in &desugared {
            system.trace_event(DebugFlag::ConditionalRequirements, || {
                TraceEvent::DesugaredRequirement {
                    requirement: req.to_string(),
                }
            });

            if let Requirement::Conformance { protocol, .. } = req {
                if !system.is_known_protocol(protocol) {
                    system.trace_event(DebugFlag::ConditionalRequirements, || {
                        TraceEvent::UnknownProtocol {
                            protocol: protocol.clone(),
                        }
                    });
                    let mut builder = RuleBuilder::new(lookup).with_known_protocols(system.known_protocols());
                    builder.add_protocol(protocol);
                    builder.collect_rules_from_referenced_protocols();

                    for (lhs, rhs) in builder.permanent_rules.drain(..) {
                        system.add_permanent_rule(lhs, rhs);
                    }
                    for (lhs, rhs) in builder.requirement_rules.drain(..) {
                        system.add_explicit_rule(lhs, rhs);
                    }
                    system.record_errors(builder.errors.drain(..));
                    system.add_known_protocols(builder.protocols());
                }
            }

            let (lhs, rhs) = rule_for_requirement(&req.canonical(), None, Some(substitutions));
            system.trace_event(DebugFlag::ConditionalRequirements, || TraceEvent::ConditionalRule {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
            system.add_rule(lhs, rhs, None);
        }
    }
}
