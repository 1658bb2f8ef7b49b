//! Trace events for rewrite system observability.
//!
//! Events capture the reasoning of the rewrite system step by step: which
//! rules were added, how property bags were built and what nested type
//! concretization derived. All tracing is opt-in per `DebugFlag`, and an
//! event is only constructed when its flag is enabled.

use serde::Serialize;

use rqm_types::requirement::RequirementKind;

use crate::rule::RuleId;
use crate::term::Term;

/// A single trace event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    // ── simplify ────────────────────────────────────────────────────────
    /// A term was reduced to a different normal form.
    Simplify { term: Term, result: Term },

    // ── add ─────────────────────────────────────────────────────────────
    /// A rule was added, or dropped because both sides were equal.
    AddRule {
        lhs: Term,
        rhs: Term,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<RuleId>,
        has_path: bool,
    },

    // ── property-map ────────────────────────────────────────────────────
    /// A property bag after construction, in its printed form.
    PropertyBag { bag: String },
    /// Two concrete types or superclasses clash on a key; the larger symbol
    /// is dropped and both rules stated on the key are conflicting.
    PropertyIgnored { key: Term, property: String, rule: RuleId },

    // ── concretize-nested-types ─────────────────────────────────────────
    /// Concretizing the nested types of a bag.
    ConcretizeBag { key: Term, via: RequirementKind },
    /// The concrete type does not conform to a protocol of the bag.
    MissingConformance { ty: String, protocol: String },
    /// A type witness was looked up.
    TypeWitness {
        protocol: String,
        assoc: String,
        ty: String,
        witness: String,
        inferred: bool,
    },
    /// A concrete witness equals the concrete type of a prefix of the key.
    ReusedPropertyBag { term: Term },
    /// A type witness equals the parent's own concrete type.
    SameTypeWitness { key: Term, protocol: String, assoc: String },
    /// A rule induced from a type witness.
    InducedRule {
        constraint: Term,
        subject: Term,
        inserted: bool,
    },

    // ── conditional-requirements ────────────────────────────────────────
    /// The conditional requirements of a conformance were enumerated.
    ConditionalRequirements {
        ty: String,
        protocol: String,
        requirements: Vec<String>,
    },
    /// A conditional requirement after desugaring.
    DesugaredRequirement { requirement: String },
    /// A protocol first seen in a conditional requirement.
    UnknownProtocol { protocol: String },
    /// A rule induced from a conditional requirement.
    ConditionalRule { lhs: Term, rhs: Term },
}
