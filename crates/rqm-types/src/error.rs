//! Error types for the conformance registry and requirement desugaring.
//!
//! Errors are collected rather than raised: registering a conformance or
//! desugaring a requirement keeps going after a problem and hands back every
//! issue it found, so a caller can report them all at once.

use thiserror::Error;

use crate::requirement::{LayoutConstraint, Requirement};
use crate::ty::Ty;

/// A problem found while matching types or registering declarations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TypeError {
    /// Two types that should be equal are not.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    Mismatch { expected: Ty, found: Ty },
    /// A matching variable appears in its own binding.
    #[error("infinite type: `{var}` occurs in `{ty}`")]
    InfiniteType { var: Ty, ty: Ty },
    /// Two applications of the same constructor have different arity.
    #[error("arity mismatch: expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    /// A conformance names a protocol that was never registered.
    #[error("unknown protocol `{name}`")]
    UnknownProtocol { name: String },
    /// A conformance does not bind an associated type of its protocol.
    #[error("conformance of `{conforming_ty}` to `{protocol}` is missing a witness for `{assoc_name}`")]
    MissingAssocType {
        protocol: String,
        assoc_name: String,
        conforming_ty: String,
    },
    /// A conformance binds a name that is not an associated type of its protocol.
    #[error("conformance of `{conforming_ty}` to `{protocol}` binds unknown associated type `{assoc_name}`")]
    ExtraAssocType {
        protocol: String,
        assoc_name: String,
        conforming_ty: String,
    },
    /// Two conformances of structurally overlapping types to the same protocol.
    #[error("redundant conformance of `{conforming_ty}` to `{protocol}` ({first})")]
    DuplicateConformance {
        protocol: String,
        conforming_ty: String,
        first: String,
    },
}

/// A problem found while desugaring a requirement.
///
/// These describe requirements that can never hold; the rest of the
/// signature is still lowered.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RequirementError {
    /// A concrete type does not conform to a protocol it is required to.
    #[error("type `{ty}` does not conform to protocol `{protocol}`")]
    InvalidConformance { ty: Ty, protocol: String },
    /// Two concrete types required to be equal are structurally different.
    #[error("same-type requirement `{first} == {second}` can never be satisfied")]
    ConflictingSameType { first: Ty, second: Ty },
    /// A concrete type is not a subclass of its required superclass.
    #[error("type `{subject}` is not a subclass of `{bound}`")]
    InvalidSuperclass { subject: Ty, bound: Ty },
    /// A concrete type does not satisfy a layout constraint.
    #[error("type `{ty}` does not satisfy layout `{layout}`")]
    InvalidLayout { ty: Ty, layout: LayoutConstraint },
    /// A requirement names a protocol that was never registered.
    #[error("unknown protocol `{protocol}` in requirement `{requirement}`")]
    UnknownProtocol {
        protocol: String,
        requirement: Requirement,
    },
}
