//! Lowering requirement signatures to rules.
//!
//! A protocol `P` with associated type `A` contributes the permanent rules
//!
//! ```text
//! [P].[P] => [P]
//! [P].[P:A] => [P:A]
//! ```
//!
//! and one requirement rule per inherited protocol and per requirement of
//! its requirement signature. Every protocol mentioned by the lowered
//! requirements is lowered too, transitively.

use rustc_hash::FxHashSet;

use rqm_types::desugar::desugar_requirement;
use rqm_types::error::RequirementError;
use rqm_types::registry::ConformanceLookup;
use rqm_types::requirement::Requirement;
use rqm_types::ty::Ty;

use crate::context::rule_for_requirement;
use crate::symbol::Symbol;
use crate::term::Term;

/// Collects the rules of a generic signature and the protocols it
/// references.
pub struct RuleBuilder<'a> {
    lookup: &'a dyn ConformanceLookup,
    /// Protocols already lowered, or queued for lowering.
    seen: FxHashSet<String>,
    /// Protocols still to be lowered, in discovery order.
    worklist: Vec<String>,
    /// Protocols lowered by this builder, in order.
    protocols: Vec<String>,
    pub permanent_rules: Vec<(Term, Term)>,
    pub requirement_rules: Vec<(Term, Term)>,
    pub errors: Vec<RequirementError>,
}

impl<'a> RuleBuilder<'a> {
    pub fn new(lookup: &'a dyn ConformanceLookup) -> Self {
        RuleBuilder {
            lookup,
            seen: FxHashSet::default(),
            worklist: Vec::new(),
            protocols: Vec::new(),
            permanent_rules: Vec::new(),
            requirement_rules: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Skip protocols whose rules are already in the rewrite system.
    pub fn with_known_protocols<'b>(mut self, names: impl IntoIterator<Item = &'b str>) -> Self {
        self.seen.extend(names.into_iter().map(str::to_string));
        self
    }

    /// Lower the requirements of a top-level generic signature.
    pub fn add_requirements(&mut self, requirements: &[Requirement]) {
        for req in requirements {
            for desugared in self.desugar(req) {
                if let Requirement::Conformance { protocol, .. } = &desugared {
                    self.enqueue(protocol);
                }
                let rule = rule_for_requirement(&desugared.canonical(), None, None);
                self.requirement_rules.push(rule);
            }
        }
    }

    /// Lower the rules of `name` unless it has been seen already.
    pub fn add_protocol(&mut self, name: &str) {
        if !self.seen.contains(name) {
            self.enqueue(name);
        }
        self.lower_protocol(name);
    }

    /// Lower every protocol referenced so far, until no new ones appear.
    pub fn collect_rules_from_referenced_protocols(&mut self) {
        let mut next = 0;
        while next < self.worklist.len() {
            let name = self.worklist[next].clone();
            next += 1;
            self.lower_protocol(&name);
        }
        self.worklist.clear();
    }

    /// The protocols lowered by this builder, in order.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.protocols.iter().map(String::as_str)
    }

    fn enqueue(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.worklist.push(name.to_string());
        }
    }

    fn desugar(&mut self, req: &Requirement) -> Vec<Requirement> {
        let mut result = Vec::new();
        desugar_requirement(req, self.lookup, &mut result, &mut self.errors);
        result
    }

    fn lower_protocol(&mut self, name: &str) {
        if self.protocols.iter().any(|p| p == name) {
            return;
        }
        let lookup = self.lookup;
        let Some(decl) = lookup.protocol(name) else {
            self.errors.push(RequirementError::UnknownProtocol {
                protocol: name.to_string(),
                requirement: Requirement::conformance(Ty::param(0, 0), name),
            });
            return;
        };
        self.protocols.push(name.to_string());

        let proto = Term::single(Symbol::protocol(name));
        self.permanent_rules
            .push((proto.with(Symbol::protocol(name)), proto.clone()));
        for assoc in &decl.associated_types {
            let assoc = Term::single(Symbol::associated_type(name, &assoc.name));
            self.permanent_rules.push((proto.append(&assoc), assoc));
        }

        for inherited in &decl.inherited {
            self.requirement_rules
                .push((proto.with(Symbol::protocol(inherited)), proto.clone()));
        }

        for req in &decl.requirements {
            for desugared in self.desugar(req) {
                let rule = rule_for_requirement(&desugared.canonical(), Some(name), None);
                self.requirement_rules.push(rule);
            }
        }

        for referenced in decl.referenced_protocols() {
            self.enqueue(referenced);
        }
    }
}
