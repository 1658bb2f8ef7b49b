//! Rewrite-system core of the requirement machine.
//!
//! Generic requirements become rewrite rules over terms. This crate holds:
//!
//! - **Terms and rules**: symbols, shortlex-ordered terms, oriented rules
//!   and relations (`symbol`, `term`, `rule`)
//! - **Rewrite paths**: the derivation of every derived rule, and an
//!   evaluator replaying them (`path`, `evaluator`)
//! - **Lowering**: types and requirements to terms, and protocols to rules
//!   (`context`, `rule_builder`)
//! - **Property map**: the properties of each term, and nested type
//!   concretization from concrete parents (`property_map`)
//! - **Machine**: passes until a fixpoint, with limits from
//!   `RewriteOptions` (`machine`, `options`)
//!
//! Tracing is opt-in per debug flag; see [`trace::TraceEvent`].

mod concrete_type_witness;
pub mod context;
pub mod difference;
pub mod evaluator;
pub mod machine;
pub mod options;
pub mod path;
pub mod property_map;
pub mod rule;
pub mod rule_builder;
pub mod symbol;
pub mod system;
pub mod term;
pub mod trace;

pub use machine::{MachineError, RequirementMachine};
pub use options::{DebugFlag, DebugFlags, RewriteOptions};
pub use property_map::{PropertyBag, PropertyMap};
pub use symbol::Symbol;
pub use system::RewriteSystem;
pub use term::Term;
