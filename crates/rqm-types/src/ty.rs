//! Type representation for generic requirement signatures.
//!
//! Defines the core `Ty` enum, type constructors (`TyCon`), generic
//! parameters (`GenericParam`), associated type references (`AssocTypeRef`)
//! and matching variables (`TyVar`).
//!
//! A type that appears inside a concrete-type symbol is a *schema*: every
//! `τ_0_n` in it refers to the n-th substitution term of that symbol rather
//! than to a generic parameter of the enclosing signature.

use std::fmt;

use serde::Serialize;

/// A matching variable, identified by a `u32` index into the unification table.
///
/// Matching variables only exist while a conformance declaration is being
/// matched against a query type. The `ena` crate handles the union-find
/// mechanics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TyVar(pub u32);

/// A generic parameter `τ_depth_index`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GenericParam {
    pub depth: u32,
    pub index: u32,
}

impl GenericParam {
    pub fn new(depth: u32, index: u32) -> Self {
        GenericParam { depth, index }
    }

    /// The parameter standing for substitution slot `index` in a schema.
    pub fn slot(index: usize) -> Self {
        GenericParam { depth: 0, index: index as u32 }
    }
}

impl fmt::Display for GenericParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "τ_{}_{}", self.depth, self.index)
    }
}

/// A reference to an associated type `name` declared in `protocol`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssocTypeRef {
    pub protocol: String,
    pub name: String,
}

impl AssocTypeRef {
    pub fn new(protocol: impl Into<String>, name: impl Into<String>) -> Self {
        AssocTypeRef {
            protocol: protocol.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AssocTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.name)
    }
}

/// A type constructor: a named nominal type like `Int`, `Array`, `Foo`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TyCon {
    pub name: String,
}

impl TyCon {
    pub fn new(name: impl Into<String>) -> Self {
        TyCon { name: name.into() }
    }
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A type appearing in a requirement, a conformance or a concrete symbol.
///
/// - `Var`: a matching variable (only during conformance lookup)
/// - `Param`: a generic parameter, or a substitution slot inside a schema
/// - `Member`: an associated type projection `base.Name`
/// - `Con`: a nullary nominal type (Int, String, ...)
/// - `App`: a nominal type applied to arguments (Array<Int>, Foo<A, B>)
/// - `Tuple`, `Fun`: structural types
/// - `Error`: placeholder for a type that could not be computed
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Ty {
    Var(TyVar),
    Param(GenericParam),
    Member(Box<Ty>, AssocTypeRef),
    Con(TyCon),
    App(Box<Ty>, Vec<Ty>),
    Tuple(Vec<Ty>),
    Fun(Vec<Ty>, Box<Ty>),
    Error,
}

impl Ty {
    /// Create an `Int` type.
    pub fn int() -> Ty {
        Ty::Con(TyCon::new("Int"))
    }

    /// Create a `String` type.
    pub fn string() -> Ty {
        Ty::Con(TyCon::new("String"))
    }

    /// Create a `Bool` type.
    pub fn bool() -> Ty {
        Ty::Con(TyCon::new("Bool"))
    }

    /// Create an `Array<T>` type.
    pub fn array(element: Ty) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new("Array"))), vec![element])
    }

    /// Create an `Optional<T>` type.
    pub fn optional(wrapped: Ty) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new("Optional"))), vec![wrapped])
    }

    /// Create a `Dictionary<K, V>` type.
    pub fn dictionary(key: Ty, value: Ty) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new("Dictionary"))), vec![key, value])
    }

    /// Create a nominal type with optional type arguments.
    /// Non-generic: `Ty::nominal("Point", vec![])` -> `Point`
    /// Generic: `Ty::nominal("Pair", vec![Ty::int(), Ty::string()])` -> `Pair<Int, String>`
    pub fn nominal(name: &str, args: Vec<Ty>) -> Ty {
        if args.is_empty() {
            Ty::Con(TyCon::new(name))
        } else {
            Ty::App(Box::new(Ty::Con(TyCon::new(name))), args)
        }
    }

    /// Create the generic parameter `τ_depth_index`.
    pub fn param(depth: u32, index: u32) -> Ty {
        Ty::Param(GenericParam::new(depth, index))
    }

    /// Create the projection `self.name` of an associated type of `protocol`.
    pub fn member(self, protocol: &str, name: &str) -> Ty {
        Ty::Member(Box::new(self), AssocTypeRef::new(protocol, name))
    }

    /// Create a function type.
    pub fn fun(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fun(params, Box::new(ret))
    }

    /// Whether this type *is* a type parameter: a generic parameter or a
    /// chain of associated type projections rooted at one.
    pub fn is_type_parameter(&self) -> bool {
        match self {
            Ty::Param(_) => true,
            Ty::Member(base, _) => base.is_type_parameter(),
            _ => false,
        }
    }

    /// Whether a type parameter occurs anywhere inside this type.
    pub fn has_type_parameter(&self) -> bool {
        match self {
            Ty::Param(_) => true,
            Ty::Member(base, _) => base.has_type_parameter(),
            Ty::App(con, args) => con.has_type_parameter() || args.iter().any(Ty::has_type_parameter),
            Ty::Tuple(elems) => elems.iter().any(Ty::has_type_parameter),
            Ty::Fun(params, ret) => {
                params.iter().any(Ty::has_type_parameter) || ret.has_type_parameter()
            }
            Ty::Var(_) | Ty::Con(_) | Ty::Error => false,
        }
    }

    /// Whether an error placeholder occurs anywhere inside this type.
    pub fn has_error(&self) -> bool {
        match self {
            Ty::Error => true,
            Ty::Member(base, _) => base.has_error(),
            Ty::App(con, args) => con.has_error() || args.iter().any(Ty::has_error),
            Ty::Tuple(elems) => elems.iter().any(Ty::has_error),
            Ty::Fun(params, ret) => params.iter().any(Ty::has_error) || ret.has_error(),
            Ty::Var(_) | Ty::Param(_) | Ty::Con(_) => false,
        }
    }

    /// The generic parameter at the root of a type parameter.
    pub fn root_param(&self) -> Option<GenericParam> {
        match self {
            Ty::Param(p) => Some(*p),
            Ty::Member(base, _) => base.root_param(),
            _ => None,
        }
    }

    /// The associated type projections of a type parameter, outermost last.
    ///
    /// For `τ_0_1.[P:A].[Q:B]` this is `[P:A, Q:B]`.
    pub fn member_path(&self) -> Vec<&AssocTypeRef> {
        let mut path = Vec::new();
        let mut current = self;
        while let Ty::Member(base, assoc) = current {
            path.push(assoc);
            current = base;
        }
        path.reverse();
        path
    }

    /// The name of the nominal head of this type, if it has one.
    pub fn nominal_name(&self) -> Option<&str> {
        match self {
            Ty::Con(con) => Some(&con.name),
            Ty::App(head, _) => head.nominal_name(),
            _ => None,
        }
    }

    /// The generic arguments of a nominal type (empty for `Con`).
    pub fn generic_args(&self) -> &[Ty] {
        match self {
            Ty::App(_, args) => args,
            _ => &[],
        }
    }

    /// How deeply structural types nest inside this type.
    ///
    /// `Int` has depth 1, `Array<Int>` depth 2, `Array<Array<Int>>` depth 3.
    pub fn nesting_depth(&self) -> usize {
        match self {
            Ty::App(_, args) => 1 + args.iter().map(Ty::nesting_depth).max().unwrap_or(0),
            Ty::Tuple(elems) => 1 + elems.iter().map(Ty::nesting_depth).max().unwrap_or(0),
            Ty::Fun(params, ret) => {
                1 + params
                    .iter()
                    .map(Ty::nesting_depth)
                    .chain(std::iter::once(ret.nesting_depth()))
                    .max()
                    .unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Replace every maximal type parameter subterm.
    ///
    /// The callback sees `τ_0_1.A.B` as a single unit, never `τ_0_1` alone.
    pub fn map_type_parameters(&self, f: &mut impl FnMut(&Ty) -> Ty) -> Ty {
        if self.is_type_parameter() {
            return f(self);
        }
        match self {
            Ty::Member(base, assoc) => {
                Ty::Member(Box::new(base.map_type_parameters(f)), assoc.clone())
            }
            Ty::App(con, args) => {
                let con = Box::new(con.map_type_parameters(f));
                let args = args.iter().map(|a| a.map_type_parameters(f)).collect();
                Ty::App(con, args)
            }
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| e.map_type_parameters(f)).collect()),
            Ty::Fun(params, ret) => {
                let params = params.iter().map(|p| p.map_type_parameters(f)).collect();
                Ty::Fun(params, Box::new(ret.map_type_parameters(f)))
            }
            other => other.clone(),
        }
    }

    /// Replace generic parameters (not whole projection chains) by the
    /// callback's result. Projections on top are rebuilt as `Member`s.
    pub fn subst_params(&self, f: &mut impl FnMut(GenericParam) -> Ty) -> Ty {
        match self {
            Ty::Param(p) => f(*p),
            Ty::Member(base, assoc) => Ty::Member(Box::new(base.subst_params(f)), assoc.clone()),
            Ty::App(con, args) => {
                let con = Box::new(con.subst_params(f));
                let args = args.iter().map(|a| a.subst_params(f)).collect();
                Ty::App(con, args)
            }
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| e.subst_params(f)).collect()),
            Ty::Fun(params, ret) => {
                let params = params.iter().map(|p| p.subst_params(f)).collect();
                Ty::Fun(params, Box::new(ret.subst_params(f)))
            }
            other => other.clone(),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Ty]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "?{}", v.0),
            Ty::Param(p) => write!(f, "{}", p),
            Ty::Member(base, assoc) => write!(f, "{}.{}", base, assoc.name),
            Ty::Con(c) => write!(f, "{}", c),
            Ty::App(con, args) => {
                write!(f, "{}", con)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    write_list(f, args)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                write_list(f, elems)?;
                write!(f, ")")
            }
            Ty::Fun(params, ret) => {
                write!(f, "(")?;
                write_list(f, params)?;
                write!(f, ") -> {}", ret)
            }
            Ty::Error => write!(f, "<<error type>>"),
        }
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Ty {}
