//! Property bags and the property map.
//!
//! A property rule `T.[p] => T` says that every type equivalent to `T` has
//! property `[p]`. The property map collects the properties of each key
//! `T` into a bag. A key also inherits the bag of its longest proper suffix
//! that has one: `τ_0_0.[P:A]` has every property of `[P:A]`, with the
//! substitutions of inherited concrete symbols moved under `τ_0_0`.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use rqm_types::registry::ConcreteConformance;
use rqm_types::requirement::LayoutConstraint;

use crate::options::DebugFlag;
use crate::rule::RuleId;
use crate::symbol::Symbol;
use crate::system::RewriteSystem;
use crate::term::Term;
use crate::trace::TraceEvent;

/// The properties of one key.
#[derive(Clone, Debug)]
pub struct PropertyBag {
    key: Term,
    /// Protocols, in rule order, with the rule establishing each.
    pub(crate) conforms_to: Vec<(String, RuleId)>,
    pub(crate) layout: Option<(LayoutConstraint, RuleId)>,
    pub(crate) superclass: Option<(Symbol, RuleId)>,
    pub(crate) concrete_type: Option<(Symbol, RuleId)>,
    /// Conformances of the concrete type, one per resolved protocol.
    pub(crate) concrete_conformances: Vec<Rc<ConcreteConformance>>,
    /// Conformances of the superclass, one per resolved protocol.
    pub(crate) superclass_conformances: Vec<Rc<ConcreteConformance>>,
}

impl PropertyBag {
    fn new(key: Term) -> Self {
        PropertyBag {
            key,
            conforms_to: Vec::new(),
            layout: None,
            superclass: None,
            concrete_type: None,
            concrete_conformances: Vec::new(),
            superclass_conformances: Vec::new(),
        }
    }

    pub fn key(&self) -> &Term {
        &self.key
    }

    pub fn conforms_to(&self) -> impl Iterator<Item = &str> {
        self.conforms_to.iter().map(|(protocol, _)| protocol.as_str())
    }

    pub fn conforms_to_rules(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.conforms_to.iter().map(|(_, rule)| *rule)
    }

    pub fn layout(&self) -> Option<LayoutConstraint> {
        self.layout.map(|(layout, _)| layout)
    }

    pub fn is_concrete_type(&self) -> bool {
        self.concrete_type.is_some()
    }

    pub fn concrete_type_symbol(&self) -> Option<&Symbol> {
        self.concrete_type.as_ref().map(|(symbol, _)| symbol)
    }

    pub fn concrete_type_rule(&self) -> Option<RuleId> {
        self.concrete_type.as_ref().map(|(_, rule)| *rule)
    }

    pub fn has_superclass_bound(&self) -> bool {
        self.superclass.is_some()
    }

    pub fn superclass_symbol(&self) -> Option<&Symbol> {
        self.superclass.as_ref().map(|(symbol, _)| symbol)
    }

    pub fn concrete_conformances(&self) -> &[Rc<ConcreteConformance>] {
        &self.concrete_conformances
    }

    pub fn superclass_conformances(&self) -> &[Rc<ConcreteConformance>] {
        &self.superclass_conformances
    }

    /// The protocols of this bag that the superclass does not already
    /// conform to.
    pub fn conforms_to_excluding_superclass_conformances(&self) -> Vec<&str> {
        self.conforms_to()
            .filter(|protocol| {
                !self
                    .superclass_conformances
                    .iter()
                    .any(|conformance| conformance.protocol == *protocol)
            })
            .collect()
    }

    /// Inherit every property of the bag of a suffix of this key.
    fn copy_properties_from(&mut self, other: &PropertyBag, prefix: &Term) {
        self.conforms_to = other.conforms_to.clone();
        self.layout = other.layout;
        self.superclass = other
            .superclass
            .as_ref()
            .map(|(symbol, rule)| (symbol.prepend_prefix_to_concrete_substitutions(prefix), *rule));
        self.concrete_type = other
            .concrete_type
            .as_ref()
            .map(|(symbol, rule)| (symbol.prepend_prefix_to_concrete_substitutions(prefix), *rule));
    }

    /// Add the property of a rule. Of two different concrete types (or
    /// superclasses) the smaller symbol is kept, so the result does not
    /// depend on rule order. Returns the clash, if any.
    fn add_property(&mut self, symbol: &Symbol, rule: RuleId) -> Option<PropertyClash> {
        match symbol {
            Symbol::Protocol(protocol) => {
                if !self.conforms_to.iter().any(|(p, _)| p == protocol) {
                    self.conforms_to.push((protocol.clone(), rule));
                }
                None
            }
            Symbol::Layout(layout) => {
                self.layout.get_or_insert((*layout, rule));
                None
            }
            Symbol::Superclass { .. } => keep_smaller(&mut self.superclass, symbol, rule),
            Symbol::ConcreteType { .. } => keep_smaller(&mut self.concrete_type, symbol, rule),
            // Derived from the bag's own concrete type and conformances.
            Symbol::ConcreteConformance { .. } => None,
            Symbol::AssociatedType { .. } | Symbol::GenericParam(_) => {
                unreachable!("{} is not a property symbol", symbol)
            }
        }
    }
}

/// Two rules giving one key different concrete types or superclasses.
#[derive(Debug)]
struct PropertyClash {
    kept: RuleId,
    dropped: (Symbol, RuleId),
}

fn keep_smaller(slot: &mut Option<(Symbol, RuleId)>, symbol: &Symbol, rule: RuleId) -> Option<PropertyClash> {
    match slot {
        None => {
            *slot = Some((symbol.clone(), rule));
            None
        }
        Some((existing, _)) if *existing == *symbol => None,
        Some((existing, existing_rule)) => {
            if *symbol < *existing {
                let dropped = (std::mem::replace(existing, symbol.clone()), *existing_rule);
                *existing_rule = rule;
                Some(PropertyClash { kept: rule, dropped })
            } else {
                Some(PropertyClash {
                    kept: *existing_rule,
                    dropped: (symbol.clone(), rule),
                })
            }
        }
    }
}

impl fmt::Display for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {{", self.key)?;
        if !self.conforms_to.is_empty() {
            let protocols: Vec<&str> = self.conforms_to().collect();
            write!(f, " conforms_to: [{}]", protocols.join(", "))?;
        }
        if let Some(layout) = self.layout() {
            write!(f, " layout: {}", layout)?;
        }
        if let Some(superclass) = self.superclass_symbol() {
            write!(f, " superclass: {}", superclass)?;
        }
        if let Some(concrete) = self.concrete_type_symbol() {
            write!(f, " concrete_type: {}", concrete)?;
        }
        write!(f, " }}")
    }
}

/// A rule derived by nested type concretization, as first computed.
#[derive(Clone, Debug, PartialEq)]
pub struct InducedRule {
    pub constraint: Term,
    pub subject: Term,
    /// Whether the rule was new after simplification.
    pub inserted: bool,
}

/// The property bags of one pass, in ascending key order.
///
/// The concrete conformance cache and the induced rule log survive
/// rebuilding, so a pair of rules is only ever concretized once.
#[derive(Debug, Default)]
pub struct PropertyMap {
    pub(crate) entries: Vec<PropertyBag>,
    index: FxHashMap<Term, usize>,
    pub(crate) concrete_conformances: FxHashMap<(RuleId, RuleId), Rc<ConcreteConformance>>,
    pub(crate) induced_rules: Vec<InducedRule>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a property map from the current rules of `system`.
    pub fn build(system: &mut RewriteSystem) -> Self {
        let mut map = PropertyMap::new();
        map.rebuild(system);
        map
    }

    /// Discard the bags and collect them again from the current rules.
    pub fn rebuild(&mut self, system: &mut RewriteSystem) {
        self.entries.clear();
        self.index.clear();

        let mut properties: FxHashMap<Term, Vec<(Symbol, RuleId)>> = FxHashMap::default();
        for id in system.rule_ids() {
            let rule = system.rule(id);
            if let Some(symbol) = rule.is_property_rule() {
                properties
                    .entry(rule.rhs().clone())
                    .or_default()
                    .push((symbol.clone(), id));
            }
        }

        let mut keys: Vec<Term> = properties.keys().cloned().collect();
        keys.sort();

        let mut clashes = Vec::new();
        for key in keys {
            let mut bag = PropertyBag::new(key.clone());

            // Suffixes are shorter, so their bags already exist.
            if let Some((start, suffix_bag)) =
                (1..key.len()).find_map(|start| self.bag_for(&key[start..]).map(|bag| (start, bag)))
            {
                bag.copy_properties_from(suffix_bag, &key.prefix(start));
            }

            for (symbol, rule) in &properties[&key] {
                if let Some(clash) = bag.add_property(symbol, *rule) {
                    clashes.push((key.clone(), clash));
                }
            }

            self.index.insert(key, self.entries.len());
            self.entries.push(bag);
        }

        // Only rules stated on the key itself are at fault; an inherited
        // property is consistent on its own, shorter key.
        for (key, clash) in clashes {
            let (symbol, dropped) = clash.dropped;
            for rule in [clash.kept, dropped] {
                if system.rule(rule).rhs().len() == key.len() {
                    system.mark_conflicting(rule);
                }
            }
            system.trace_event(DebugFlag::PropertyMap, || TraceEvent::PropertyIgnored {
                key,
                property: symbol.to_string(),
                rule: dropped,
            });
        }
        if system.debug(DebugFlag::PropertyMap) {
            for bag in &self.entries {
                system.trace_event(DebugFlag::PropertyMap, || TraceEvent::PropertyBag {
                    bag: bag.to_string(),
                });
            }
        }
    }

    fn bag_for(&self, key: &[Symbol]) -> Option<&PropertyBag> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// The bag of the longest suffix of `term` that has one.
    pub fn lookup_properties(&self, term: &[Symbol]) -> Option<&PropertyBag> {
        (0..term.len()).find_map(|start| self.bag_for(&term[start..]))
    }

    /// The bag whose key is exactly `key`.
    pub fn bag(&self, key: &Term) -> Option<&PropertyBag> {
        self.bag_for(key)
    }

    pub fn bags(&self) -> &[PropertyBag] {
        &self.entries
    }

    /// The cached conformance for a pair of concrete type (or superclass)
    /// rule and conformance rule.
    pub fn cached_conformance(&self, concrete_rule: RuleId, conformance_rule: RuleId) -> Option<&Rc<ConcreteConformance>> {
        self.concrete_conformances.get(&(concrete_rule, conformance_rule))
    }

    pub fn cache_len(&self) -> usize {
        self.concrete_conformances.len()
    }

    /// Rules induced by nested type concretization over every pass, in
    /// order.
    pub fn induced_rules(&self) -> &[InducedRule] {
        &self.induced_rules
    }
}

impl fmt::Display for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bag in &self.entries {
            writeln!(f, "{}", bag)?;
        }
        Ok(())
    }
}
