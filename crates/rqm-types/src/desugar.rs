//! Requirement desugaring.
//!
//! Rewrites an arbitrary requirement into primitive requirements whose
//! subjects are type parameters. Requirements on concrete types are checked
//! against the registry and disappear when they hold; a same-type
//! requirement between two structural types is split into requirements
//! between their components.

use crate::error::RequirementError;
use crate::registry::{ConformanceLookup, ProtocolConformanceRef};
use crate::requirement::{LayoutConstraint, Requirement};
use crate::ty::Ty;

/// Desugar `req`, appending primitive requirements to `result` and
/// problems to `errors`.
///
/// Requirements mentioning an error type are dropped without a diagnostic.
pub fn desugar_requirement(
    req: &Requirement,
    lookup: &dyn ConformanceLookup,
    result: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
) {
    match req {
        Requirement::Conformance { subject, protocol } => {
            desugar_conformance(req, subject, protocol, lookup, result, errors)
        }
        Requirement::Superclass { subject, bound } => {
            if subject.has_error() || bound.has_error() {
                return;
            }
            if subject.is_type_parameter() {
                result.push(req.clone());
            } else if !lookup.is_subclass(subject, bound) {
                errors.push(RequirementError::InvalidSuperclass {
                    subject: subject.clone(),
                    bound: bound.clone(),
                });
            }
        }
        Requirement::Layout { subject, layout } => {
            if subject.has_error() {
                return;
            }
            if subject.is_type_parameter() {
                result.push(req.clone());
                return;
            }
            let satisfied = match layout {
                LayoutConstraint::Class => lookup.is_class(subject),
            };
            if !satisfied {
                errors.push(RequirementError::InvalidLayout {
                    ty: subject.clone(),
                    layout: *layout,
                });
            }
        }
        Requirement::SameType { first, second } => {
            match_same_type(first, second, result, errors);
        }
    }
}

fn desugar_conformance(
    req: &Requirement,
    subject: &Ty,
    protocol: &str,
    lookup: &dyn ConformanceLookup,
    result: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
) {
    if subject.has_error() {
        return;
    }
    if lookup.protocol(protocol).is_none() {
        errors.push(RequirementError::UnknownProtocol {
            protocol: protocol.to_string(),
            requirement: req.clone(),
        });
        return;
    }
    if subject.is_type_parameter() {
        result.push(req.clone());
        return;
    }

    match lookup.lookup_conformance(subject, protocol) {
        ProtocolConformanceRef::Concrete(conformance) => {
            // A conditional conformance only holds if its conditions do.
            for cond in &conformance.conditional_requirements {
                desugar_requirement(cond, lookup, result, errors);
            }
        }
        ProtocolConformanceRef::Invalid | ProtocolConformanceRef::Abstract => {
            errors.push(RequirementError::InvalidConformance {
                ty: subject.clone(),
                protocol: protocol.to_string(),
            });
        }
    }
}

/// Match two types structurally, emitting a same-type requirement wherever
/// a type parameter meets another type.
fn match_same_type(
    first: &Ty,
    second: &Ty,
    result: &mut Vec<Requirement>,
    errors: &mut Vec<RequirementError>,
) {
    if first == second || first.has_error() || second.has_error() {
        return;
    }
    if first.is_type_parameter() || second.is_type_parameter() {
        result.push(Requirement::same_type(first.clone(), second.clone()).canonical());
        return;
    }

    match (first, second) {
        (Ty::App(c1, a1), Ty::App(c2, a2)) if c1 == c2 && a1.len() == a2.len() => {
            for (x, y) in a1.iter().zip(a2) {
                match_same_type(x, y, result, errors);
            }
        }
        (Ty::Tuple(e1), Ty::Tuple(e2)) if e1.len() == e2.len() => {
            for (x, y) in e1.iter().zip(e2) {
                match_same_type(x, y, result, errors);
            }
        }
        (Ty::Fun(p1, r1), Ty::Fun(p2, r2)) if p1.len() == p2.len() => {
            for (x, y) in p1.iter().zip(p2) {
                match_same_type(x, y, result, errors);
            }
            match_same_type(r1, r2, result, errors);
        }
        _ => errors.push(RequirementError::ConflictingSameType {
            first: first.clone(),
            second: second.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConformanceDecl, ProtocolDecl, ProtocolRegistry};

    fn desugar(req: Requirement, registry: &ProtocolRegistry) -> (Vec<Requirement>, Vec<RequirementError>) {
        let mut result = Vec::new();
        let mut errors = Vec::new();
        desugar_requirement(&req, registry, &mut result, &mut errors);
        (result, errors)
    }

    fn registry() -> ProtocolRegistry {
        let mut registry = ProtocolRegistry::new();
        registry.register_protocol(ProtocolDecl::new("P"));
        registry.register_protocol(ProtocolDecl::new("R"));
        registry.register_conformance(ConformanceDecl::new(Ty::int(), "R"));
        registry.register_conformance(
            ConformanceDecl::new(Ty::array(Ty::param(0, 0)), "P")
                .conditional(Requirement::conformance(Ty::param(0, 0), "R")),
        );
        registry
    }

    #[test]
    fn type_parameter_conformance_is_kept() {
        let req = Requirement::conformance(Ty::param(0, 0), "P");
        let (result, errors) = desugar(req.clone(), &registry());
        assert_eq!(result, vec![req]);
        assert!(errors.is_empty());
    }

    #[test]
    fn concrete_conformance_yields_its_conditions() {
        let req = Requirement::conformance(Ty::array(Ty::param(0, 1)), "P");
        let (result, errors) = desugar(req, &registry());
        assert_eq!(result, vec![Requirement::conformance(Ty::param(0, 1), "R")]);
        assert!(errors.is_empty());

        // Int: R holds, so Array<Int>: P leaves nothing behind.
        let req = Requirement::conformance(Ty::array(Ty::int()), "P");
        let (result, errors) = desugar(req, &registry());
        assert!(result.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn failed_conformance_is_an_error() {
        let req = Requirement::conformance(Ty::string(), "P");
        let (result, errors) = desugar(req, &registry());
        assert!(result.is_empty());
        assert_eq!(
            errors,
            vec![RequirementError::InvalidConformance {
                ty: Ty::string(),
                protocol: "P".into()
            }]
        );
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        let req = Requirement::conformance(Ty::param(0, 0), "Missing");
        let (result, errors) = desugar(req, &registry());
        assert!(result.is_empty());
        assert!(matches!(&errors[0], RequirementError::UnknownProtocol { protocol, .. } if protocol == "Missing"));
    }

    #[test]
    fn same_type_is_decomposed_structurally() {
        let req = Requirement::same_type(
            Ty::dictionary(Ty::int(), Ty::param(0, 0)),
            Ty::dictionary(Ty::param(0, 1), Ty::array(Ty::param(0, 2))),
        );
        let (result, errors) = desugar(req, &registry());
        assert_eq!(
            result,
            vec![
                Requirement::same_type(Ty::param(0, 1), Ty::int()),
                Requirement::same_type(Ty::param(0, 0), Ty::array(Ty::param(0, 2))),
            ]
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn same_type_between_different_concrete_types_conflicts() {
        let req = Requirement::same_type(Ty::array(Ty::int()), Ty::array(Ty::string()));
        let (result, errors) = desugar(req, &registry());
        assert!(result.is_empty());
        assert_eq!(
            errors,
            vec![RequirementError::ConflictingSameType {
                first: Ty::int(),
                second: Ty::string()
            }]
        );
    }

    #[test]
    fn error_types_are_dropped_silently() {
        let req = Requirement::same_type(Ty::param(0, 0), Ty::Error);
        let (result, errors) = desugar(req, &registry());
        assert!(result.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn layout_and_superclass_on_concrete_types_are_checked() {
        let mut registry = registry();
        registry.register_class("Base", None);
        registry.register_class("Derived", Some(Ty::nominal("Base", vec![])));

        let (result, errors) = desugar(
            Requirement::superclass(Ty::nominal("Derived", vec![]), Ty::nominal("Base", vec![])),
            &registry,
        );
        assert!(result.is_empty() && errors.is_empty());

        let (_, errors) = desugar(
            Requirement::superclass(Ty::int(), Ty::nominal("Base", vec![])),
            &registry,
        );
        assert!(matches!(&errors[0], RequirementError::InvalidSuperclass { .. }));

        let (_, errors) = desugar(Requirement::layout(Ty::int(), LayoutConstraint::Class), &registry);
        assert!(matches!(&errors[0], RequirementError::InvalidLayout { .. }));
    }
}
