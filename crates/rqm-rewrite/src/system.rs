//! The rewrite system: rules, relations and type differences.
//!
//! Rules are kept oriented (`lhs > rhs` in the shortlex order) and are
//! inserted in simplified form: both sides are reduced first, and a rule
//! whose sides reduce to the same term is dropped. The system does not run
//! completion; callers add the rules they derive.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use rqm_types::error::RequirementError;
use rqm_types::ty::{GenericParam, Ty};

use crate::difference::TypeDifference;
use crate::evaluator::{EvaluatorError, RewritePathEvaluator};
use crate::options::{DebugFlag, RewriteOptions};
use crate::path::{RewritePath, RewriteStep};
use crate::property_map::PropertyMap;
use crate::rule::{DifferenceId, Relation, RelationId, Rule, RuleId};
use crate::symbol::Symbol;
use crate::term::Term;
use crate::trace::TraceEvent;

/// A string rewrite system over symbols.
#[derive(Debug, Default)]
pub struct RewriteSystem {
    options: RewriteOptions,
    rules: Vec<Rule>,
    /// Rules indexed by the first symbol of their left-hand side.
    rules_by_first_symbol: FxHashMap<Symbol, Vec<RuleId>>,
    relations: Vec<Relation>,
    relation_ids: FxHashMap<Relation, RelationId>,
    differences: Vec<TypeDifference>,
    /// Protocols whose structural and requirement rules have been added.
    known_protocols: FxHashSet<String>,
    /// Requirement errors found while lowering, kept for the caller.
    errors: Vec<RequirementError>,
    trace: Vec<TraceEvent>,
}

impl RewriteSystem {
    pub fn new(options: RewriteOptions) -> Self {
        RewriteSystem {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    // ── Tracing ─────────────────────────────────────────────────────────

    pub fn debug(&self, flag: DebugFlag) -> bool {
        self.options.debug.contains(flag)
    }

    /// Record the event built by `event` if `flag` is enabled.
    pub fn trace_event(&mut self, flag: DebugFlag, event: impl FnOnce() -> TraceEvent) {
        if self.debug(flag) {
            self.trace.push(event());
        }
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Render the trace as a JSON array.
    pub fn trace_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.trace)
    }

    // ── Simplification ──────────────────────────────────────────────────

    /// Reduce `term` to normal form, returning the path from `term` to it.
    ///
    /// At each step the leftmost position with a matching rule is
    /// rewritten, trying rules in insertion order.
    pub fn reduce(&self, term: &Term) -> (Term, RewritePath) {
        let mut current = term.clone();
        let mut path = RewritePath::new();

        'rewrite: loop {
            for pos in 0..current.len() {
                let Some(candidates) = self.rules_by_first_symbol.get(&current[pos]) else {
                    continue;
                };
                for &id in candidates {
                    let rule = &self.rules[id.0 as usize];
                    if current.matches_at(pos, rule.lhs()) {
                        let lhs_len = rule.lhs().len();
                        let end_offset = current.len() - pos - lhs_len;
                        current = current.replace(pos, lhs_len, rule.rhs());
                        path.add(RewriteStep::for_rule(pos, end_offset, id, false));
                        continue 'rewrite;
                    }
                }
            }
            break;
        }

        (current, path)
    }

    /// Like [`reduce`](Self::reduce), tracing terms that change.
    pub fn simplify(&mut self, term: &Term) -> (Term, RewritePath) {
        let (result, path) = self.reduce(term);
        if !path.is_empty() {
            self.trace_event(DebugFlag::Simplify, || TraceEvent::Simplify {
                term: term.clone(),
                result: result.clone(),
            });
        }
        (result, path)
    }

    // ── Rules ───────────────────────────────────────────────────────────

    /// Add the rule `lhs => rhs` justified by `path` (from `lhs` to `rhs`),
    /// or as an axiom when `path` is `None`.
    ///
    /// Returns `false` if both sides simplify to the same term.
    pub fn add_rule(&mut self, lhs: Term, rhs: Term, path: Option<&RewritePath>) -> bool {
        self.insert_rule(lhs, rhs, path).is_some()
    }

    /// Add a structural rule of a protocol, such as `[P].[P] => [P]`.
    pub fn add_permanent_rule(&mut self, lhs: Term, rhs: Term) -> bool {
        match self.insert_rule(lhs, rhs, None) {
            Some(id) => {
                self.rules[id.0 as usize].mark_permanent();
                true
            }
            None => false,
        }
    }

    /// Add a rule lowered from a written requirement.
    pub fn add_explicit_rule(&mut self, lhs: Term, rhs: Term) -> bool {
        match self.insert_rule(lhs, rhs, None) {
            Some(id) => {
                self.rules[id.0 as usize].mark_explicit();
                true
            }
            None => false,
        }
    }

    fn insert_rule(&mut self, lhs: Term, rhs: Term, path: Option<&RewritePath>) -> Option<RuleId> {
        let (lhs_nf, lhs_path) = self.simplify(&lhs);
        let (rhs_nf, rhs_path) = self.simplify(&rhs);

        if lhs_nf == rhs_nf {
            self.trace_event(DebugFlag::Add, || TraceEvent::AddRule {
                lhs,
                rhs,
                id: None,
                has_path: path.is_some(),
            });
            return None;
        }

        // lhs_nf -> lhs -> rhs -> rhs_nf
        let mut full_path = path.map(|path| {
            let mut full = lhs_path.inverted();
            full.append(path);
            full.append(&rhs_path);
            full
        });

        let (lhs, rhs) = if lhs_nf > rhs_nf {
            (lhs_nf, rhs_nf)
        } else {
            if let Some(full) = &mut full_path {
                full.invert();
            }
            (rhs_nf, lhs_nf)
        };

        let id = RuleId(self.rules.len() as u32);
        self.rules_by_first_symbol
            .entry(lhs[0].clone())
            .or_default()
            .push(id);
        self.trace_event(DebugFlag::Add, || TraceEvent::AddRule {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            id: Some(id),
            has_path: full_path.is_some(),
        });
        self.rules.push(Rule::new(lhs, rhs, full_path));
        Some(id)
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this system.
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0 as usize]
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> {
        (0..self.rules.len() as u32).map(RuleId)
    }

    /// Flag a rule whose requirement can never be satisfied together with
    /// another one.
    pub fn mark_conflicting(&mut self, id: RuleId) {
        self.rules[id.0 as usize].mark_conflicting();
    }

    pub fn conflicting_rules(&self) -> Vec<RuleId> {
        self.rule_ids()
            .filter(|id| self.rule(*id).is_conflicting())
            .collect()
    }

    /// Replay the path of every derived rule, returning the failures.
    pub fn verify_rules(&self) -> Vec<(RuleId, EvaluatorError)> {
        let evaluator = RewritePathEvaluator::new(self);
        self.rule_ids()
            .filter_map(|id| evaluator.verify_rule(id).err().map(|err| (id, err)))
            .collect()
    }

    // ── Relations ───────────────────────────────────────────────────────

    /// Record `lhs =>> rhs`. Recording the same pair again returns the
    /// same id.
    pub fn record_relation(&mut self, lhs: Term, rhs: Term) -> RelationId {
        let relation = Relation { lhs, rhs };
        if let Some(&id) = self.relation_ids.get(&relation) {
            return id;
        }
        let id = RelationId(self.relations.len() as u32);
        self.relations.push(relation.clone());
        self.relation_ids.insert(relation, id);
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this system.
    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0 as usize]
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// `[concrete: C].[P] =>> [concrete: C : P]`
    pub fn record_concrete_conformance_relation(
        &mut self,
        concrete: &Symbol,
        protocol: &Symbol,
        conformance: &Symbol,
    ) -> RelationId {
        self.record_relation(
            Term::new(vec![concrete.clone(), protocol.clone()]),
            Term::single(conformance.clone()),
        )
    }

    /// `[concrete: C : P].[P:A].[concrete: W] =>> [concrete: C : P].[P:A]`
    pub fn record_concrete_type_witness_relation(
        &mut self,
        conformance: &Symbol,
        assoc: &Symbol,
        witness: &Symbol,
    ) -> RelationId {
        let subject = Term::new(vec![conformance.clone(), assoc.clone()]);
        self.record_relation(subject.with(witness.clone()), subject)
    }

    /// `[concrete: C : P].[P:A].[concrete: C] =>> [concrete: C : P]`
    ///
    /// # Panics
    ///
    /// Panics if `conformance` is not a concrete conformance symbol.
    pub fn record_same_type_witness_relation(&mut self, conformance: &Symbol, assoc: &Symbol) -> RelationId {
        let concrete = conformance
            .to_concrete_type()
            .unwrap_or_else(|| panic!("{} is not a concrete conformance symbol", conformance));
        self.record_relation(
            Term::new(vec![conformance.clone(), assoc.clone(), concrete]),
            Term::single(conformance.clone()),
        )
    }

    // ── Type differences ────────────────────────────────────────────────

    /// Simplify the substitutions of a concrete symbol attached to `base`.
    ///
    /// Each substitution term is reduced to normal form. With a property
    /// map, a substitution whose normal form has a concrete type is replaced
    /// by that type, splicing its substitutions into the schema. Equal
    /// substitutions are merged into one slot.
    ///
    /// If the symbol changes, records a type difference and the relation
    /// `[old] =>> [new]`, appends a step applying it at `start_offset` to
    /// `path`, and returns the difference.
    pub fn simplify_substitutions(
        &mut self,
        base: &Term,
        symbol: &Symbol,
        map: Option<&PropertyMap>,
        start_offset: usize,
        path: &mut RewritePath,
    ) -> Option<DifferenceId> {
        let schema = symbol.concrete_ty()?;
        let substitutions = symbol.substitutions();
        if substitutions.is_empty() {
            return None;
        }

        let mut same_types = Vec::new();
        let mut normalized = Vec::with_capacity(substitutions.len());
        for (index, term) in substitutions.iter().enumerate() {
            let (nf, _) = self.simplify(term);
            if nf != *term {
                same_types.push((index, nf.clone()));
            }
            normalized.push(nf);
        }

        let mut concrete_types = Vec::new();
        if let Some(map) = map {
            for (index, term) in normalized.iter().enumerate() {
                let Some(props) = map.lookup_properties(term) else {
                    continue;
                };
                if let Some(concrete) = props.concrete_type_symbol() {
                    let prefix = term.prefix(term.len() - props.key().len());
                    concrete_types.push((index, concrete.prepend_prefix_to_concrete_substitutions(&prefix)));
                }
            }
        }

        let mut new_substitutions: Vec<Term> = Vec::new();
        let mut intern = |term: Term| -> Ty {
            let index = match new_substitutions.iter().position(|t| *t == term) {
                Some(index) => index,
                None => {
                    new_substitutions.push(term);
                    new_substitutions.len() - 1
                }
            };
            Ty::Param(GenericParam::slot(index))
        };

        let mut replacements = Vec::with_capacity(normalized.len());
        for (index, term) in normalized.iter().enumerate() {
            match concrete_types.iter().find(|(slot, _)| *slot == index) {
                Some((_, concrete)) => {
                    let inner = concrete.substitutions();
                    let ty = concrete.concrete_ty().cloned().unwrap_or(Ty::Error);
                    let spliced = ty.subst_params(&mut |param| {
                        let (nf, _) = self.reduce(&inner[param.index as usize]);
                        intern(nf)
                    });
                    replacements.push(spliced);
                }
                None => replacements.push(intern(term.clone())),
            }
        }

        let new_schema = schema.subst_params(&mut |param| replacements[param.index as usize].clone());
        let simplified = symbol.with_concrete(new_schema, new_substitutions);
        if simplified == *symbol {
            return None;
        }

        let relation = self.record_relation(Term::single(symbol.clone()), Term::single(simplified.clone()));
        path.add(RewriteStep::for_relation(start_offset, relation, false));

        let id = DifferenceId(self.differences.len() as u32);
        self.differences.push(TypeDifference {
            base_term: base.clone(),
            lhs: symbol.clone(),
            rhs: simplified,
            same_types,
            concrete_types,
            relation,
        });
        Some(id)
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this system.
    pub fn type_difference(&self, id: DifferenceId) -> &TypeDifference {
        &self.differences[id.0 as usize]
    }

    // ── Protocols and errors ────────────────────────────────────────────

    pub fn is_known_protocol(&self, name: &str) -> bool {
        self.known_protocols.contains(name)
    }

    pub fn known_protocols(&self) -> impl Iterator<Item = &str> {
        self.known_protocols.iter().map(String::as_str)
    }

    pub fn add_known_protocols<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.known_protocols
            .extend(names.into_iter().map(str::to_string));
    }

    pub fn record_errors(&mut self, errors: impl IntoIterator<Item = RequirementError>) {
        self.errors.extend(errors);
    }

    pub fn errors(&self) -> &[RequirementError] {
        &self.errors
    }
}

impl fmt::Display for RewriteSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            writeln!(f, "r{}: {}", i, rule)?;
        }
        Ok(())
    }
}
