//! Lowering types and requirements to terms.
//!
//! A type parameter `τ_0_1.A.B` lowers to the term `τ_0_1.[P:A].[Q:B]`.
//! Inside a protocol requirement signature `Self` is the protocol itself,
//! so `Self` lowers to `[P]` and `Self.A.B` to `[P:A].[Q:B]`.
//!
//! Relative lowering interprets `τ_0_n` as the `n`-th substitution term of
//! an enclosing concrete symbol instead.

use rqm_types::requirement::Requirement;
use rqm_types::ty::{GenericParam, Ty};

use crate::symbol::Symbol;
use crate::term::Term;

fn member_symbols(ty: &Ty) -> Vec<Symbol> {
    ty.member_path()
        .into_iter()
        .map(|assoc| Symbol::associated_type(&assoc.protocol, &assoc.name))
        .collect()
}

/// The term for a type parameter.
///
/// # Panics
///
/// Panics if `ty` is not a type parameter.
pub fn term_for_type(ty: &Ty, protocol: Option<&str>) -> Term {
    let root = ty
        .root_param()
        .unwrap_or_else(|| panic!("`{}` is not a type parameter", ty));
    let members = member_symbols(ty);
    match protocol {
        Some(protocol) if members.is_empty() => Term::single(Symbol::protocol(protocol)),
        Some(_) => Term::new(members),
        None => Term::single(Symbol::GenericParam(root)).append(&members),
    }
}

/// The term for a type parameter of a schema: `τ_0_n.X.Y` lowers to
/// `substitutions[n].[..:X].[..:Y]`.
///
/// # Panics
///
/// Panics if `ty` is not a type parameter or its slot is out of range.
pub fn relative_term_for_type(ty: &Ty, substitutions: &[Term]) -> Term {
    let root = ty
        .root_param()
        .unwrap_or_else(|| panic!("`{}` is not a type parameter", ty));
    let base = substitutions
        .get(root.index as usize)
        .unwrap_or_else(|| panic!("substitution slot {} of {} is out of range", root.index, ty));
    base.append(&member_symbols(ty))
}

/// Replace each maximal type parameter of `ty` with a slot `τ_0_k`, where
/// `result[k]` is the term `lower` produces for it. Equal terms share a
/// slot.
fn schema_from_type(ty: &Ty, result: &mut Vec<Term>, mut lower: impl FnMut(&Ty) -> Term) -> Ty {
    ty.map_type_parameters(&mut |tp| {
        let term = lower(tp);
        let index = match result.iter().position(|t| *t == term) {
            Some(index) => index,
            None => {
                result.push(term);
                result.len() - 1
            }
        };
        Ty::Param(GenericParam::slot(index))
    })
}

/// The schema of a type written against a generic signature or a protocol.
pub fn substitution_schema_from_type(ty: &Ty, protocol: Option<&str>, result: &mut Vec<Term>) -> Ty {
    schema_from_type(ty, result, |tp| term_for_type(tp, protocol))
}

/// The schema of a type written against the slots of `substitutions`.
pub fn relative_substitution_schema_from_type(
    ty: &Ty,
    substitutions: &[Term],
    result: &mut Vec<Term>,
) -> Ty {
    schema_from_type(ty, result, |tp| relative_term_for_type(tp, substitutions))
}

/// Lower a primitive, canonical requirement to a rule `(lhs, rhs)`.
///
/// With `substitutions`, type parameters are read relative to them;
/// otherwise they are lowered against `protocol` (or the top-level
/// signature when `protocol` is `None`). The pair is not oriented; the
/// rewrite system orients it on insertion.
pub fn rule_for_requirement(
    req: &Requirement,
    protocol: Option<&str>,
    substitutions: Option<&[Term]>,
) -> (Term, Term) {
    let term = |ty: &Ty| match substitutions {
        Some(subs) => relative_term_for_type(ty, subs),
        None => term_for_type(ty, protocol),
    };
    let schema = |ty: &Ty| {
        let mut result = Vec::new();
        let schema = match substitutions {
            Some(subs) => relative_substitution_schema_from_type(ty, subs, &mut result),
            None => substitution_schema_from_type(ty, protocol, &mut result),
        };
        (schema, result)
    };

    match req {
        Requirement::Conformance {
            subject,
            protocol: proto,
        } => {
            let subject = term(subject);
            (subject.with(Symbol::protocol(proto)), subject)
        }
        Requirement::Superclass { subject, bound } => {
            let subject = term(subject);
            let (ty, subs) = schema(bound);
            (subject.with(Symbol::superclass(ty, subs)), subject)
        }
        Requirement::Layout { subject, layout } => {
            let subject = term(subject);
            (subject.with(Symbol::Layout(*layout)), subject)
        }
        Requirement::SameType { first, second } if second.is_type_parameter() => {
            (term(first), term(second))
        }
        Requirement::SameType { first, second } => {
            let subject = term(first);
            let (ty, subs) = schema(second);
            (subject.with(Symbol::concrete_type(ty, subs)), subject)
        }
    }
}
