//! Integration tests for nested type concretization through the machine.
//!
//! Tests cover:
//! - Concrete and abstract type witnesses of a generic conformance
//! - Recursion tied off through a prefix with the same concrete type
//! - Conflicts between a concrete type and a conformance it lacks, and
//!   between two concrete types of one key
//! - Superclass bounds, with and without a conformance
//! - Conditional requirements bringing in new protocols
//! - Replaying the path of every derived rule

use std::collections::BTreeSet;

use insta::assert_snapshot;
use proptest::prelude::*;

use rqm_rewrite::options::{DebugFlag, DebugFlags};
use rqm_rewrite::trace::TraceEvent;
use rqm_rewrite::{RequirementMachine, RewriteOptions};
use rqm_types::registry::{ConformanceDecl, ProtocolDecl};
use rqm_types::{GenericSignature, ProtocolRegistry, Requirement, Ty};

// ── Helpers ────────────────────────────────────────────────────────────

fn register(registry: &mut ProtocolRegistry, decl: ConformanceDecl) {
    let errors = registry.register_conformance(decl);
    assert!(errors.is_empty(), "{:?}", errors);
}

/// `protocol Q { associatedtype V }`,
/// `protocol P { associatedtype A; associatedtype B }` and
/// `Foo<X, Y>: P { A = X; B = Y.V }`.
fn foo_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("Q").assoc("V"));
    registry.register_protocol(ProtocolDecl::new("P").assoc("A").assoc("B"));
    register(
        &mut registry,
        ConformanceDecl::new(Ty::nominal("Foo", vec![Ty::param(0, 0), Ty::param(0, 1)]), "P")
            .witness("A", Ty::param(0, 0))
            .witness("B", Ty::param(0, 1).member("Q", "V")),
    );
    registry
}

/// `<τ_0_0, τ_0_1 where τ_0_0 == Foo<Int, τ_0_1>, τ_0_0: P, τ_0_1: Q>`
fn foo_requirements() -> Vec<Requirement> {
    vec![
        Requirement::same_type(Ty::param(0, 0), Ty::nominal("Foo", vec![Ty::int(), Ty::param(0, 1)])),
        Requirement::conformance(Ty::param(0, 0), "P"),
        Requirement::conformance(Ty::param(0, 1), "Q"),
    ]
}

fn signature(params: u32, requirements: Vec<Requirement>) -> GenericSignature {
    requirements
        .into_iter()
        .fold(GenericSignature::with_params(params), GenericSignature::requirement)
}

fn rules(machine: &RequirementMachine<'_>) -> BTreeSet<String> {
    machine.system().rules().iter().map(|rule| rule.to_string()).collect()
}

fn conflicting(machine: &RequirementMachine<'_>) -> BTreeSet<String> {
    machine
        .system()
        .conflicting_rules()
        .into_iter()
        .map(|id| machine.system().rule(id).to_string())
        .collect()
}

/// Rules added by concretization, neither permanent nor written.
fn derived(machine: &RequirementMachine<'_>) -> BTreeSet<String> {
    machine
        .system()
        .rules()
        .iter()
        .filter(|rule| !rule.is_permanent() && !rule.is_explicit())
        .map(|rule| rule.to_string())
        .collect()
}

fn strings(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn complete(machine: &mut RequirementMachine<'_>, sig: &GenericSignature) -> usize {
    let errors = machine.add_generic_signature(sig);
    assert!(errors.is_empty(), "{:?}", errors);
    let passes = machine.compute_completion().expect("fixpoint");
    assert!(machine.system().verify_rules().is_empty());
    passes
}

// ── Type witnesses ─────────────────────────────────────────────────────

#[test]
fn concrete_and_abstract_witnesses() {
    let registry = foo_registry();
    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    assert_eq!(complete(&mut machine, &signature(2, foo_requirements())), 2);

    assert_snapshot!(machine.system().to_string(), @r"
    r0: [P].[P] => [P] [permanent]
    r1: [P].[P:A] => [P:A] [permanent]
    r2: [P].[P:B] => [P:B] [permanent]
    r3: [Q].[Q] => [Q] [permanent]
    r4: [Q].[Q:V] => [Q:V] [permanent]
    r5: τ_0_0.[concrete: Foo<Int, τ_0_0> with <τ_0_1>] => τ_0_0 [explicit]
    r6: τ_0_0.[P] => τ_0_0 [explicit]
    r7: τ_0_1.[Q] => τ_0_1 [explicit]
    r8: τ_0_0.[concrete: Foo<Int, τ_0_0> : P with <τ_0_1>] => τ_0_0
    r9: τ_0_0.[P:A].[concrete: Int] => τ_0_0.[P:A]
    r10: τ_0_1.[Q:V] => τ_0_0.[P:B]
    ");

    assert_snapshot!(machine.property_map().to_string(), @r"
    [P] => { conforms_to: [P] }
    [Q] => { conforms_to: [Q] }
    τ_0_0 => { conforms_to: [P] concrete_type: [concrete: Foo<Int, τ_0_0> with <τ_0_1>] }
    τ_0_1 => { conforms_to: [Q] }
    τ_0_0.[P:A] => { concrete_type: [concrete: Int] }
    ");

    let induced: Vec<String> = machine
        .property_map()
        .induced_rules()
        .iter()
        .map(|rule| format!("{} => {} ({})", rule.constraint, rule.subject, rule.inserted))
        .collect();
    assert_eq!(
        induced,
        vec![
            "τ_0_0.[concrete: Foo<Int, τ_0_0> : P with <τ_0_1>].[P:A].[concrete: Int] => \
             τ_0_0.[concrete: Foo<Int, τ_0_0> : P with <τ_0_1>].[P:A] (true)",
            "τ_0_1.[Q:V] => τ_0_0.[concrete: Foo<Int, τ_0_0> : P with <τ_0_1>].[P:B] (true)",
        ]
    );
}

#[test]
fn concretization_is_traced() {
    let registry = foo_registry();
    let options = RewriteOptions::default()
        .with_debug(DebugFlags::none().with(DebugFlag::ConcretizeNestedTypes));
    let mut machine = RequirementMachine::new(&registry, options);
    complete(&mut machine, &signature(2, foo_requirements()));

    let events: Vec<String> = machine
        .system()
        .trace()
        .iter()
        .map(|event| serde_json::to_value(event).unwrap()["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        events,
        vec![
            "concretize_bag",
            "type_witness",
            "induced_rule",
            "type_witness",
            "induced_rule",
            "concretize_bag",
        ]
    );
    assert!(matches!(
        &machine.system().trace()[1],
        TraceEvent::TypeWitness { assoc, witness, inferred: true, .. } if assoc == "A" && witness == "Int"
    ));
}

#[test]
fn witness_equal_to_concrete_parent() {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("P").assoc("A"));
    let boxed = |t: Ty| Ty::nominal("Box", vec![t]);
    register(
        &mut registry,
        ConformanceDecl::new(boxed(Ty::param(0, 0)), "P").witness("A", boxed(Ty::param(0, 0))),
    );

    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    let sig = signature(
        2,
        vec![
            Requirement::same_type(Ty::param(0, 0), boxed(Ty::param(0, 1))),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 2);
    assert!(rules(&machine).contains("τ_0_0.[P:A] => τ_0_0"));
}

#[test]
fn recursion_tied_off_through_a_prefix() {
    // Foo.A is Bar and Bar.B is Foo again.
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("Q").assoc("B"));
    registry.register_protocol(
        ProtocolDecl::new("P")
            .assoc("A")
            .requirement(Requirement::conformance(Ty::param(0, 0).member("P", "A"), "Q")),
    );
    register(
        &mut registry,
        ConformanceDecl::new(Ty::nominal("Foo", vec![]), "P").witness("A", Ty::nominal("Bar", vec![])),
    );
    register(
        &mut registry,
        ConformanceDecl::new(Ty::nominal("Bar", vec![]), "Q").witness("B", Ty::nominal("Foo", vec![])),
    );

    let options = RewriteOptions::default()
        .with_debug(DebugFlags::none().with(DebugFlag::ConcretizeNestedTypes));
    let mut machine = RequirementMachine::new(&registry, options);
    let sig = signature(
        1,
        vec![
            Requirement::conformance(Ty::param(0, 0), "P"),
            Requirement::same_type(Ty::param(0, 0), Ty::nominal("Foo", vec![])),
            Requirement::same_type(Ty::param(0, 0).member("P", "A"), Ty::nominal("Bar", vec![])),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 2);

    let rules = rules(&machine);
    assert!(rules.contains("τ_0_0.[P:A].[concrete: Bar : Q] => τ_0_0.[P:A]"));
    assert!(rules.contains("τ_0_0.[P:A].[Q:B] => τ_0_0"));
    assert!(machine.system().trace().iter().any(|event| matches!(
        event,
        TraceEvent::ReusedPropertyBag { term } if term.to_string() == "τ_0_0.[concrete: Foo]"
    )));

    // The witness for A restates an existing rule.
    let inserted: Vec<bool> = machine
        .property_map()
        .induced_rules()
        .iter()
        .map(|rule| rule.inserted)
        .collect();
    assert_eq!(inserted, vec![false, true]);
}

// ── Conflicts ──────────────────────────────────────────────────────────

/// `protocol P { associatedtype A }` with no conformances.
fn int_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("P").assoc("A"));
    registry
}

/// Nothing about `P`'s associated type was derived.
fn assert_nothing_concretized(machine: &RequirementMachine<'_>) {
    assert_eq!(machine.property_map().cache_len(), 0);
    assert!(derived(machine).is_empty());
    let mentions: Vec<String> = rules(machine)
        .into_iter()
        .filter(|rule| rule.contains("[P:A]"))
        .collect();
    assert_eq!(mentions, vec!["[P].[P:A] => [P:A] [permanent]"]);
}

#[test]
fn missing_conformance_of_concrete_type_conflicts() {
    let registry = int_registry();
    let concrete = Requirement::same_type(Ty::param(0, 0), Ty::int());
    let conformance = Requirement::conformance(Ty::param(0, 0), "P");

    let mut forward = RequirementMachine::new(&registry, RewriteOptions::default());
    complete(&mut forward, &signature(1, vec![concrete.clone(), conformance.clone()]));
    let mut backward = RequirementMachine::new(&registry, RewriteOptions::default());
    complete(&mut backward, &signature(1, vec![conformance, concrete]));

    let expected = strings(&[
        "τ_0_0.[P] => τ_0_0 [explicit] [conflicting]",
        "τ_0_0.[concrete: Int] => τ_0_0 [explicit] [conflicting]",
    ]);
    assert_eq!(conflicting(&forward), expected);
    assert_eq!(conflicting(&backward), expected);
    assert_nothing_concretized(&forward);
    assert_nothing_concretized(&backward);
}

#[test]
fn only_rules_stated_on_the_key_conflict() {
    // protocol P { associatedtype A where A: R }
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("R"));
    registry.register_protocol(
        ProtocolDecl::new("P")
            .assoc("A")
            .requirement(Requirement::conformance(Ty::param(0, 0).member("P", "A"), "R")),
    );

    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    let sig = signature(
        1,
        vec![
            Requirement::conformance(Ty::param(0, 0), "P"),
            Requirement::same_type(Ty::param(0, 0).member("P", "A"), Ty::int()),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 1);

    // `[P:A]: R` comes from the shorter key `[P:A]` and stays valid there.
    assert_eq!(
        conflicting(&machine),
        strings(&["τ_0_0.[P:A].[concrete: Int] => τ_0_0.[P:A] [explicit] [conflicting]"])
    );
    assert!(rules(&machine).contains("[P:A].[R] => [P:A] [explicit]"));
    assert_eq!(machine.property_map().cache_len(), 0);
}

#[test]
fn unrelated_superclass_does_not_conflict() {
    let mut registry = int_registry();
    registry.register_class("C", None);

    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    let sig = signature(
        1,
        vec![
            Requirement::superclass(Ty::param(0, 0), Ty::nominal("C", vec![])),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 1);
    assert!(conflicting(&machine).is_empty());
    assert_nothing_concretized(&machine);

    let key = rqm_rewrite::Term::single(rqm_rewrite::Symbol::generic_param(0, 0));
    let bag = machine.property_map().bag(&key).expect("bag for τ_0_0");
    assert!(bag.has_superclass_bound());
    assert!(bag.superclass_conformances().is_empty());
}

#[test]
fn superclass_conformance_is_inherited() {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("P").assoc("A"));
    registry.register_class("C", None);
    registry.register_class("D", Some(Ty::nominal("C", vec![])));
    register(
        &mut registry,
        ConformanceDecl::new(Ty::nominal("C", vec![]), "P").witness("A", Ty::int()),
    );

    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    let sig = signature(
        1,
        vec![
            Requirement::superclass(Ty::param(0, 0), Ty::nominal("D", vec![])),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 2);

    let rules = rules(&machine);
    assert!(rules.contains("τ_0_0.[concrete: D : P] => τ_0_0"));
    assert!(rules.contains("τ_0_0.[P:A].[concrete: Int] => τ_0_0.[P:A]"));

    let key = rqm_rewrite::Term::single(rqm_rewrite::Symbol::generic_param(0, 0));
    let bag = machine.property_map().bag(&key).expect("bag for τ_0_0");
    assert_eq!(bag.superclass_conformances().len(), 1);
    assert!(bag.conforms_to_excluding_superclass_conformances().is_empty());
}

// ── Conditional requirements ───────────────────────────────────────────

#[test]
fn conditional_requirements_bring_in_new_protocols() {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("P"));
    registry.register_protocol(ProtocolDecl::new("R").inherits("S"));
    registry.register_protocol(ProtocolDecl::new("S"));
    // Triple<X, Y, Z>: P where X: R, Dictionary<Y, Z> == Dictionary<Int, Bool>
    register(
        &mut registry,
        ConformanceDecl::new(
            Ty::nominal("Triple", vec![Ty::param(0, 0), Ty::param(0, 1), Ty::param(0, 2)]),
            "P",
        )
        .conditional(Requirement::conformance(Ty::param(0, 0), "R"))
        .conditional(Requirement::same_type(
            Ty::dictionary(Ty::param(0, 1), Ty::param(0, 2)),
            Ty::dictionary(Ty::int(), Ty::bool()),
        )),
    );

    let options = RewriteOptions::default()
        .with_debug(DebugFlags::none().with(DebugFlag::ConditionalRequirements));
    let mut machine = RequirementMachine::new(&registry, options);
    let sig = signature(
        4,
        vec![
            Requirement::same_type(
                Ty::param(0, 0),
                Ty::nominal("Triple", vec![Ty::param(0, 1), Ty::param(0, 2), Ty::param(0, 3)]),
            ),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ],
    );
    assert_eq!(complete(&mut machine, &sig), 2);

    let system = machine.system();
    assert!(system.is_known_protocol("R"));
    assert!(system.is_known_protocol("S"));

    // One conformance rule, then one rule per desugared requirement.
    let derived = derived(&machine);
    assert_eq!(derived.len(), 4, "{:?}", derived);
    assert_eq!(
        derived.iter().filter(|rule| rule.starts_with("τ_0_0.[concrete: Triple<")).count(),
        1
    );
    for rule in ["τ_0_1.[R] => τ_0_1", "τ_0_2.[concrete: Int] => τ_0_2", "τ_0_3.[concrete: Bool] => τ_0_3"] {
        assert!(derived.contains(rule), "missing {}", rule);
    }

    // The rules of R and S exist before the rule that mentions R.
    let position = |text: &str| {
        system
            .rules()
            .iter()
            .position(|rule| rule.to_string() == text)
            .unwrap_or_else(|| panic!("no rule {}", text))
    };
    let conditional = position("τ_0_1.[R] => τ_0_1");
    for rule in ["[R].[R] => [R] [permanent]", "[S].[S] => [S] [permanent]", "[R].[S] => [R] [explicit]"] {
        assert!(position(rule) < conditional, "{} after the conditional rule", rule);
    }

    let events: Vec<String> = system
        .trace()
        .iter()
        .map(|event| serde_json::to_value(event).unwrap()["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        events,
        vec![
            "conditional_requirements",
            "desugared_requirement",
            "unknown_protocol",
            "conditional_rule",
            "desugared_requirement",
            "conditional_rule",
            "desugared_requirement",
            "conditional_rule",
        ]
    );
}

#[test]
fn unsatisfied_conditional_requirement_is_recorded() {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("P"));
    registry.register_protocol(ProtocolDecl::new("R"));
    register(
        &mut registry,
        ConformanceDecl::new(Ty::array(Ty::param(0, 0)), "P")
            .conditional(Requirement::conformance(Ty::param(0, 0), "R")),
    );

    // Array<Int>: P needs Int: R, which does not hold.
    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    let sig = signature(
        1,
        vec![
            Requirement::same_type(Ty::param(0, 0), Ty::array(Ty::int())),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ],
    );
    complete(&mut machine, &sig);
    assert_snapshot!(
        machine.system().errors().iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"),
        @"type `Int` does not conform to protocol `R`"
    );
}

// ── Order insensitivity ────────────────────────────────────────────────

/// `Int: P` with `A = String`. `Bool` does not conform.
fn int_conforms_registry() -> ProtocolRegistry {
    let mut registry = int_registry();
    register(&mut registry, ConformanceDecl::new(Ty::int(), "P").witness("A", Ty::string()));
    registry
}

fn outcome(requirements: Vec<Requirement>) -> (BTreeSet<String>, BTreeSet<String>) {
    let registry = foo_registry();
    let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
    complete(&mut machine, &signature(3, requirements));

    let bags = machine
        .property_map()
        .bags()
        .iter()
        .map(|bag| {
            let mut protocols: Vec<&str> = bag.conforms_to().collect();
            protocols.sort_unstable();
            let concrete = bag.concrete_type_symbol().map(|s| s.to_string()).unwrap_or_default();
            format!("{} {:?} {}", bag.key(), protocols, concrete)
        })
        .collect();
    (rules(&machine), bags)
}

proptest! {
    #[test]
    fn requirement_order_does_not_matter(
        requirements in Just({
            let mut reqs = foo_requirements();
            reqs.push(Requirement::conformance(Ty::param(0, 2), "Q"));
            reqs.push(Requirement::same_type(Ty::param(0, 2).member("Q", "V"), Ty::int()));
            reqs
        })
        .prop_shuffle()
    ) {
        let mut baseline = foo_requirements();
        baseline.push(Requirement::conformance(Ty::param(0, 2), "Q"));
        baseline.push(Requirement::same_type(Ty::param(0, 2).member("Q", "V"), Ty::int()));
        prop_assert_eq!(outcome(requirements), outcome(baseline));
    }
}

proptest! {
    #[test]
    fn clashing_concrete_types_conflict_in_any_order(
        requirements in Just(vec![
            Requirement::same_type(Ty::param(0, 0), Ty::int()),
            Requirement::same_type(Ty::param(0, 0), Ty::bool()),
            Requirement::conformance(Ty::param(0, 0), "P"),
        ])
        .prop_shuffle()
    ) {
        let registry = int_conforms_registry();
        let mut machine = RequirementMachine::new(&registry, RewriteOptions::default());
        complete(&mut machine, &signature(1, requirements));

        prop_assert_eq!(
            conflicting(&machine),
            strings(&[
                "τ_0_0.[P] => τ_0_0 [explicit] [conflicting]",
                "τ_0_0.[concrete: Bool] => τ_0_0 [explicit] [conflicting]",
                "τ_0_0.[concrete: Int] => τ_0_0 [explicit] [conflicting]",
            ])
        );
        prop_assert!(derived(&machine).is_empty());
        prop_assert_eq!(machine.property_map().cache_len(), 0);
    }
}
