//! Type model and declaration registry for generic requirement signatures.
//!
//! This crate provides everything the rewrite engine needs to know about
//! types, without knowing anything about terms or rules:
//!
//! - **Types**: generic parameters, associated type projections and nominal
//!   types (`ty`)
//! - **Matching**: structural unification of conformance declarations
//!   against query types (`unify`)
//! - **Registry**: protocols, classes and conformances behind the
//!   `ConformanceLookup` trait (`registry`)
//! - **Requirements**: requirements, generic signatures and desugaring into
//!   primitive requirements (`requirement`, `desugar`)

pub mod desugar;
pub mod error;
pub mod registry;
pub mod requirement;
pub mod ty;
pub mod unify;

pub use registry::{ConformanceLookup, ProtocolConformanceRef, ProtocolRegistry};
pub use requirement::{GenericSignature, Requirement};
pub use ty::Ty;
