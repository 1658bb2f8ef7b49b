//! Integration tests for conformance lookup and requirement desugaring.
//!
//! Tests cover:
//! - Witness specialization through generic conformances
//! - Projections resolved through a second conformance
//! - Conditional conformances feeding desugaring
//! - Error collection across a whole generic signature

use rqm_types::desugar::desugar_requirement;
use rqm_types::error::RequirementError;
use rqm_types::registry::{ConformanceDecl, ProtocolDecl};
use rqm_types::{ConformanceLookup, GenericSignature, ProtocolConformanceRef, ProtocolRegistry, Requirement, Ty};

// ── Helpers ────────────────────────────────────────────────────────────

fn self_member(protocol: &str, name: &str) -> Ty {
    Ty::param(0, 0).member(protocol, name)
}

/// A small standard library: sequences, iterators and hashable elements.
fn stdlib() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry.register_protocol(ProtocolDecl::new("IteratorProtocol").assoc("Element"));
    registry.register_protocol(
        ProtocolDecl::new("Sequence")
            .assoc("Element")
            .assoc("Iterator")
            .requirement(Requirement::conformance(
                self_member("Sequence", "Iterator"),
                "IteratorProtocol",
            ))
            .requirement(Requirement::same_type(
                self_member("Sequence", "Element"),
                self_member("Sequence", "Iterator").member("IteratorProtocol", "Element"),
            )),
    );
    registry.register_protocol(ProtocolDecl::new("Hashable"));

    let errors = registry.register_conformance(
        ConformanceDecl::new(Ty::nominal("ArrayIterator", vec![Ty::param(0, 0)]), "IteratorProtocol")
            .witness("Element", Ty::param(0, 0)),
    );
    assert!(errors.is_empty(), "{:?}", errors);
    let errors = registry.register_conformance(
        ConformanceDecl::new(Ty::array(Ty::param(0, 0)), "Sequence")
            .witness("Element", Ty::param(0, 0))
            .witness("Iterator", Ty::nominal("ArrayIterator", vec![Ty::param(0, 0)])),
    );
    assert!(errors.is_empty(), "{:?}", errors);
    let errors = registry.register_conformance(ConformanceDecl::new(Ty::int(), "Hashable"));
    assert!(errors.is_empty(), "{:?}", errors);
    let errors = registry.register_conformance(
        ConformanceDecl::new(Ty::array(Ty::param(0, 0)), "Hashable")
            .conditional(Requirement::conformance(Ty::param(0, 0), "Hashable")),
    );
    assert!(errors.is_empty(), "{:?}", errors);
    registry
}

fn render_witnesses(registry: &ProtocolRegistry, ty: &Ty, protocol: &str) -> String {
    let ProtocolConformanceRef::Concrete(conformance) = registry.lookup_conformance(ty, protocol) else {
        return format!("{}: {} (no conformance)", ty, protocol);
    };
    let decl = registry.protocol(protocol).expect("protocol is registered");
    let mut out = format!("{}: {}", conformance.ty, conformance.protocol);
    for assoc in &decl.associated_types {
        let witness = conformance
            .type_witness(&assoc.name)
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("\n  {} = {}", assoc.name, witness));
    }
    out
}

// ── Lookup ─────────────────────────────────────────────────────────────

#[test]
fn generic_conformance_specializes_every_witness() {
    let registry = stdlib();
    let rendered = render_witnesses(&registry, &Ty::array(Ty::param(0, 1)), "Sequence");
    insta::assert_snapshot!(rendered, @r"
    Array<τ_0_1>: Sequence
      Element = τ_0_1
      Iterator = ArrayIterator<τ_0_1>
    ");
}

#[test]
fn nested_array_binds_element_to_inner_array() {
    let registry = stdlib();
    let rendered = render_witnesses(&registry, &Ty::array(Ty::array(Ty::int())), "Sequence");
    insta::assert_snapshot!(rendered, @r"
    Array<Array<Int>>: Sequence
      Element = Array<Int>
      Iterator = ArrayIterator<Array<Int>>
    ");
}

#[test]
fn missing_conformance_is_invalid() {
    let registry = stdlib();
    assert!(registry
        .lookup_conformance(&Ty::string(), "Sequence")
        .is_invalid());
    assert!(registry
        .lookup_conformance(&Ty::array(Ty::int()), "Unknown")
        .is_invalid());
}

// ── Desugaring ─────────────────────────────────────────────────────────

#[test]
fn desugaring_a_signature_collects_all_errors() {
    let registry = stdlib();
    let sig = GenericSignature::with_params(2)
        .requirement(Requirement::conformance(Ty::param(0, 0), "Sequence"))
        .requirement(Requirement::conformance(Ty::array(Ty::param(0, 1)), "Hashable"))
        .requirement(Requirement::conformance(Ty::string(), "Hashable"))
        .requirement(Requirement::same_type(Ty::array(Ty::int()), Ty::array(Ty::bool())));

    let mut result = Vec::new();
    let mut errors = Vec::new();
    for req in &sig.requirements {
        desugar_requirement(req, &registry, &mut result, &mut errors);
    }

    let rendered: Vec<String> = result.iter().map(|r| r.to_string()).collect();
    assert_eq!(rendered, vec!["τ_0_0: Sequence", "τ_0_1: Hashable"]);

    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    insta::assert_snapshot!(messages.join("\n"), @r"
    type `String` does not conform to protocol `Hashable`
    same-type requirement `Int == Bool` can never be satisfied
    ");
    assert!(matches!(errors[0], RequirementError::InvalidConformance { .. }));
}
