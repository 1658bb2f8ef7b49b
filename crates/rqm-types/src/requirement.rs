//! Generic requirements and generic signatures.
//!
//! A requirement constrains a subject type: it must conform to a protocol,
//! inherit from a class, satisfy a layout, or equal another type. A generic
//! signature is a list of generic parameters plus the requirements on them.

use std::fmt;

use serde::Serialize;

use crate::ty::{GenericParam, Ty};

/// The kind of a requirement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Conformance,
    Superclass,
    SameType,
    Layout,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementKind::Conformance => write!(f, "conformance"),
            RequirementKind::Superclass => write!(f, "superclass"),
            RequirementKind::SameType => write!(f, "same-type"),
            RequirementKind::Layout => write!(f, "layout"),
        }
    }
}

/// A layout constraint on a type parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LayoutConstraint {
    /// `T: AnyObject` -- the type must be a class.
    Class,
}

impl fmt::Display for LayoutConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutConstraint::Class => write!(f, "AnyObject"),
        }
    }
}

/// A single generic requirement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// `subject: protocol`
    Conformance { subject: Ty, protocol: String },
    /// `subject: bound` where `bound` is a class type.
    Superclass { subject: Ty, bound: Ty },
    /// `first == second`
    SameType { first: Ty, second: Ty },
    /// `subject: layout`
    Layout { subject: Ty, layout: LayoutConstraint },
}

impl Requirement {
    pub fn conformance(subject: Ty, protocol: &str) -> Self {
        Requirement::Conformance {
            subject,
            protocol: protocol.to_string(),
        }
    }

    pub fn superclass(subject: Ty, bound: Ty) -> Self {
        Requirement::Superclass { subject, bound }
    }

    pub fn same_type(first: Ty, second: Ty) -> Self {
        Requirement::SameType { first, second }
    }

    pub fn layout(subject: Ty, layout: LayoutConstraint) -> Self {
        Requirement::Layout { subject, layout }
    }

    pub fn kind(&self) -> RequirementKind {
        match self {
            Requirement::Conformance { .. } => RequirementKind::Conformance,
            Requirement::Superclass { .. } => RequirementKind::Superclass,
            Requirement::SameType { .. } => RequirementKind::SameType,
            Requirement::Layout { .. } => RequirementKind::Layout,
        }
    }

    /// The constrained type (the left-hand type of a same-type requirement).
    pub fn subject(&self) -> &Ty {
        match self {
            Requirement::Conformance { subject, .. }
            | Requirement::Superclass { subject, .. }
            | Requirement::Layout { subject, .. } => subject,
            Requirement::SameType { first, .. } => first,
        }
    }

    /// Apply `f` to every type mentioned by this requirement.
    pub fn map_types(&self, mut f: impl FnMut(&Ty) -> Ty) -> Requirement {
        match self {
            Requirement::Conformance { subject, protocol } => Requirement::Conformance {
                subject: f(subject),
                protocol: protocol.clone(),
            },
            Requirement::Superclass { subject, bound } => Requirement::Superclass {
                subject: f(subject),
                bound: f(bound),
            },
            Requirement::SameType { first, second } => Requirement::SameType {
                first: f(first),
                second: f(second),
            },
            Requirement::Layout { subject, layout } => Requirement::Layout {
                subject: f(subject),
                layout: *layout,
            },
        }
    }

    /// Put a same-type requirement in canonical form: a type parameter,
    /// if there is one, goes first, and two type parameters are ordered.
    pub fn canonical(&self) -> Requirement {
        match self {
            Requirement::SameType { first, second } => {
                let swap = match (first.is_type_parameter(), second.is_type_parameter()) {
                    (false, true) => true,
                    (true, true) => second < first,
                    _ => false,
                };
                if swap {
                    Requirement::same_type(second.clone(), first.clone())
                } else {
                    self.clone()
                }
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Conformance { subject, protocol } => write!(f, "{}: {}", subject, protocol),
            Requirement::Superclass { subject, bound } => write!(f, "{}: {}", subject, bound),
            Requirement::SameType { first, second } => write!(f, "{} == {}", first, second),
            Requirement::Layout { subject, layout } => write!(f, "{}: {}", subject, layout),
        }
    }
}

/// A top-level generic signature: `<τ_0_0, τ_0_1 where ...>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenericSignature {
    pub params: Vec<GenericParam>,
    pub requirements: Vec<Requirement>,
}

impl GenericSignature {
    /// A signature with `count` parameters at depth 0 and no requirements.
    pub fn with_params(count: u32) -> Self {
        GenericSignature {
            params: (0..count).map(|i| GenericParam::new(0, i)).collect(),
            requirements: Vec::new(),
        }
    }

    pub fn requirement(mut self, req: Requirement) -> Self {
        self.requirements.push(req);
        self
    }
}

impl fmt::Display for GenericSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        if !self.requirements.is_empty() {
            write!(f, " where ")?;
            for (i, r) in self.requirements.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", r)?;
            }
        }
        write!(f, ">")
    }
}
