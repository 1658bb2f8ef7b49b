//! Protocol registry, conformance lookup and class hierarchy.
//!
//! Manages protocol declarations (associated types, inherited protocols and
//! requirement signatures), class declarations with their superclasses, and
//! conformance declarations. Conformance lookup matches a query type against
//! every declaration of a protocol structurally, then specializes the type
//! witnesses and conditional requirements to the query.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::TypeError;
use crate::requirement::Requirement;
use crate::ty::{GenericParam, Ty};
use crate::unify::{freshen_type_params, MatchCtx};

/// An associated type declaration in a protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct AssocTypeDecl {
    pub name: String,
}

/// A protocol declaration.
///
/// Requirements are written against `Self`, which is the generic parameter
/// `τ_0_0`: `Self.Element: Hashable` is
/// `Requirement::conformance(Ty::param(0, 0).member("P", "Element"), "Hashable")`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolDecl {
    /// The protocol name.
    pub name: String,
    /// Associated types, in declaration order.
    pub associated_types: Vec<AssocTypeDecl>,
    /// Directly inherited protocols (`protocol P: Q`).
    pub inherited: Vec<String>,
    /// The requirement signature, excluding inherited protocols.
    pub requirements: Vec<Requirement>,
}

impl ProtocolDecl {
    pub fn new(name: &str) -> Self {
        ProtocolDecl {
            name: name.to_string(),
            associated_types: Vec::new(),
            inherited: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// Declare an associated type.
    pub fn assoc(mut self, name: &str) -> Self {
        self.associated_types.push(AssocTypeDecl {
            name: name.to_string(),
        });
        self
    }

    /// Inherit from another protocol.
    pub fn inherits(mut self, protocol: &str) -> Self {
        self.inherited.push(protocol.to_string());
        self
    }

    /// Add a requirement written against `Self` (`τ_0_0`).
    pub fn requirement(mut self, req: Requirement) -> Self {
        self.requirements.push(req);
        self
    }

    /// The protocols mentioned by this declaration: inherited protocols and
    /// the protocols of conformance requirements.
    pub fn referenced_protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inherited.iter().map(String::as_str).collect();
        for req in &self.requirements {
            if let Requirement::Conformance { protocol, .. } = req {
                names.push(protocol);
            }
        }
        names
    }
}

/// A class declaration. Generic parameters of the class are `τ_0_i`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    /// The superclass, written against the class's own generic parameters.
    pub superclass: Option<Ty>,
}

/// A conformance declaration: `extension Foo<X, Y>: P where ...`.
///
/// The generic parameters of the extension are `τ_0_i`. Type witnesses and
/// conditional requirements are written against those parameters.
#[derive(Clone, Debug)]
pub struct ConformanceDecl {
    /// The protocol being conformed to.
    pub protocol: String,
    /// The conforming type.
    pub conforming_ty: Ty,
    /// Associated type bindings (e.g., `typealias A = X`).
    pub type_witnesses: FxHashMap<String, Ty>,
    /// Requirements that must hold for the conformance to apply.
    pub conditional_requirements: Vec<Requirement>,
}

impl ConformanceDecl {
    pub fn new(conforming_ty: Ty, protocol: &str) -> Self {
        ConformanceDecl {
            protocol: protocol.to_string(),
            conforming_ty,
            type_witnesses: FxHashMap::default(),
            conditional_requirements: Vec::new(),
        }
    }

    /// Bind an associated type.
    pub fn witness(mut self, name: &str, ty: Ty) -> Self {
        self.type_witnesses.insert(name.to_string(), ty);
        self
    }

    /// Add a conditional requirement.
    pub fn conditional(mut self, req: Requirement) -> Self {
        self.conditional_requirements.push(req);
        self
    }
}

/// A conformance specialized to a query type.
///
/// Every type parameter in the witnesses and conditional requirements is a
/// type parameter of the query type.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcreteConformance {
    /// The query type.
    pub ty: Ty,
    /// The protocol.
    pub protocol: String,
    pub type_witnesses: FxHashMap<String, Ty>,
    pub conditional_requirements: Vec<Requirement>,
}

impl ConcreteConformance {
    /// The type witness for an associated type, if the conformance binds it.
    pub fn type_witness(&self, name: &str) -> Option<&Ty> {
        self.type_witnesses.get(name)
    }
}

/// The result of a conformance lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolConformanceRef {
    /// The type does not conform.
    Invalid,
    /// The type is a type parameter; the conformance is not known yet.
    Abstract,
    /// A conformance of a concrete type.
    Concrete(Rc<ConcreteConformance>),
}

impl ProtocolConformanceRef {
    pub fn is_invalid(&self) -> bool {
        matches!(self, ProtocolConformanceRef::Invalid)
    }
}

/// Conformance resolution as seen by requirement lowering and the rewrite
/// engine.
pub trait ConformanceLookup {
    /// Resolve `ty: protocol`.
    fn lookup_conformance(&self, ty: &Ty, protocol: &str) -> ProtocolConformanceRef;

    /// Look up a protocol declaration by name.
    fn protocol(&self, name: &str) -> Option<&ProtocolDecl>;

    /// Whether `ty` is `bound` or a subclass of it.
    fn is_subclass(&self, ty: &Ty, bound: &Ty) -> bool;

    /// Whether `ty` is a class type.
    fn is_class(&self, ty: &Ty) -> bool;
}

/// The protocol registry: stores protocol, class and conformance declarations.
///
/// Lookup uses structural type matching via temporary unification rather
/// than string keys, so `extension Array<E>: P` answers `Array<Int>: P`.
#[derive(Default, Debug)]
pub struct ProtocolRegistry {
    /// Protocol declarations keyed by name.
    protocols: FxHashMap<String, ProtocolDecl>,
    /// Class declarations keyed by name.
    classes: FxHashMap<String, ClassDecl>,
    /// Conformance declarations keyed by protocol name.
    conformances: FxHashMap<String, Vec<ConformanceDecl>>,
}

impl ProtocolRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol declaration.
    pub fn register_protocol(&mut self, decl: ProtocolDecl) {
        self.protocols.insert(decl.name.clone(), decl);
    }

    /// Register a class declaration.
    pub fn register_class(&mut self, name: &str, superclass: Option<Ty>) {
        self.classes.insert(
            name.to_string(),
            ClassDecl {
                name: name.to_string(),
                superclass,
            },
        );
    }

    /// Register a conformance declaration.
    ///
    /// Validates that every associated type of the protocol is bound and
    /// nothing else is. The declaration is stored even if it has errors;
    /// missing witnesses then surface as error types during lookup.
    pub fn register_conformance(&mut self, decl: ConformanceDecl) -> Vec<TypeError> {
        let mut errors = Vec::new();
        let conforming_name = decl.conforming_ty.to_string();

        match self.protocols.get(&decl.protocol) {
            None => errors.push(TypeError::UnknownProtocol {
                name: decl.protocol.clone(),
            }),
            Some(proto) => {
                for assoc in &proto.associated_types {
                    if !decl.type_witnesses.contains_key(&assoc.name) {
                        errors.push(TypeError::MissingAssocType {
                            protocol: decl.protocol.clone(),
                            assoc_name: assoc.name.clone(),
                            conforming_ty: conforming_name.clone(),
                        });
                    }
                }

                let mut bound: Vec<&String> = decl.type_witnesses.keys().collect();
                bound.sort();
                for name in bound {
                    if !proto.associated_types.iter().any(|a| &a.name == name) {
                        errors.push(TypeError::ExtraAssocType {
                            protocol: decl.protocol.clone(),
                            assoc_name: name.clone(),
                            conforming_ty: conforming_name.clone(),
                        });
                    }
                }
            }
        }

        // Two declarations overlap if their conforming types unify once
        // both sets of parameters are freshened.
        let existing = self.conformances.entry(decl.protocol.clone()).or_default();
        for other in existing.iter() {
            let mut ctx = MatchCtx::new();
            let freshened_other =
                freshen_type_params(&other.conforming_ty, &mut ctx, &mut FxHashMap::default());
            let freshened_new =
                freshen_type_params(&decl.conforming_ty, &mut ctx, &mut FxHashMap::default());
            if ctx.unify(freshened_other, freshened_new).is_ok() {
                errors.push(TypeError::DuplicateConformance {
                    protocol: decl.protocol.clone(),
                    conforming_ty: conforming_name.clone(),
                    first: format!("previously declared for `{}`", other.conforming_ty),
                });
                break; // Report only the first overlap
            }
        }

        existing.push(decl);
        errors
    }

    /// Look up a class declaration by name.
    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    /// The direct superclass of a class type, specialized to its arguments.
    pub fn superclass_of(&self, ty: &Ty) -> Option<Ty> {
        let decl = self.classes.get(ty.nominal_name()?)?;
        let superclass = decl.superclass.as_ref()?;
        let args = ty.generic_args();
        Some(superclass.subst_params(&mut |param| {
            args.get(param.index as usize).cloned().unwrap_or(Ty::Error)
        }))
    }

    /// Find the declaration for `ty: protocol` and specialize it to `ty`.
    ///
    /// Only declarations on `ty` itself are considered; inherited
    /// conformances are found by [`ConformanceLookup::lookup_conformance`].
    pub fn find_conformance(&self, ty: &Ty, protocol: &str) -> Option<ConcreteConformance> {
        let decls = self.conformances.get(protocol)?;
        for decl in decls {
            let mut ctx = MatchCtx::new();
            let mut bindings: FxHashMap<GenericParam, Ty> = FxHashMap::default();
            let freshened = freshen_type_params(&decl.conforming_ty, &mut ctx, &mut bindings);
            if ctx.unify(freshened, ty.clone()).is_err() {
                continue;
            }

            let mut specialize = |t: &Ty| {
                let fresh = freshen_type_params(t, &mut ctx, &mut bindings);
                let resolved = ctx.resolve(fresh);
                self.project_members(&erase_vars(&resolved))
            };

            let type_witnesses = decl
                .type_witnesses
                .iter()
                .map(|(name, witness)| (name.clone(), specialize(witness)))
                .collect();
            let conditional_requirements = decl
                .conditional_requirements
                .iter()
                .map(|req| req.map_types(&mut specialize))
                .collect();

            return Some(ConcreteConformance {
                ty: ty.clone(),
                protocol: protocol.to_string(),
                type_witnesses,
                conditional_requirements,
            });
        }
        None
    }

    /// Resolve projections whose base became concrete after specialization:
    /// `Int.V` is replaced by the witness for `V` in `Int: Q`.
    fn project_members(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Member(base, assoc) => {
                let base = self.project_members(base);
                if base.is_type_parameter() {
                    return Ty::Member(Box::new(base), assoc.clone());
                }
                match self.lookup_conformance(&base, &assoc.protocol) {
                    ProtocolConformanceRef::Concrete(conformance) => conformance
                        .type_witness(&assoc.name)
                        .cloned()
                        .unwrap_or(Ty::Error),
                    _ => Ty::Error,
                }
            }
            Ty::App(con, args) => Ty::App(
                Box::new(self.project_members(con)),
                args.iter().map(|a| self.project_members(a)).collect(),
            ),
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| self.project_members(e)).collect()),
            Ty::Fun(params, ret) => Ty::Fun(
                params.iter().map(|p| self.project_members(p)).collect(),
                Box::new(self.project_members(ret)),
            ),
            other => other.clone(),
        }
    }
}

/// Replace matching variables left unbound by a lookup with error types.
///
/// A variable stays unbound when a declaration parameter appears only in a
/// witness and never in the conforming type.
fn erase_vars(ty: &Ty) -> Ty {
    match ty {
        Ty::Var(_) => Ty::Error,
        Ty::Member(base, assoc) => Ty::Member(Box::new(erase_vars(base)), assoc.clone()),
        Ty::App(con, args) => Ty::App(
            Box::new(erase_vars(con)),
            args.iter().map(erase_vars).collect(),
        ),
        Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(erase_vars).collect()),
        Ty::Fun(params, ret) => {
            Ty::Fun(params.iter().map(erase_vars).collect(), Box::new(erase_vars(ret)))
        }
        other => other.clone(),
    }
}

impl ConformanceLookup for ProtocolRegistry {
    /// Conformances are inherited along the superclass chain.
    fn lookup_conformance(&self, ty: &Ty, protocol: &str) -> ProtocolConformanceRef {
        if ty.is_type_parameter() {
            return ProtocolConformanceRef::Abstract;
        }
        if ty.has_error() || !self.protocols.contains_key(protocol) {
            return ProtocolConformanceRef::Invalid;
        }

        let mut current = ty.clone();
        loop {
            if let Some(mut conformance) = self.find_conformance(&current, protocol) {
                conformance.ty = ty.clone();
                return ProtocolConformanceRef::Concrete(Rc::new(conformance));
            }
            match self.superclass_of(&current) {
                Some(superclass) => current = superclass,
                None => return ProtocolConformanceRef::Invalid,
            }
        }
    }

    fn protocol(&self, name: &str) -> Option<&ProtocolDecl> {
        self.protocols.get(name)
    }

    fn is_subclass(&self, ty: &Ty, bound: &Ty) -> bool {
        let mut current = ty.clone();
        loop {
            if &current == bound {
                return true;
            }
            match self.superclass_of(&current) {
                Some(superclass) => current = superclass,
                None => return false,
            }
        }
    }

    fn is_class(&self, ty: &Ty) -> bool {
        ty.nominal_name()
            .map(|name| self.classes.contains_key(name))
            .unwrap_or(false)
    }
}
