//! Structural matching of conformance declarations against query types.
//!
//! Implements first-order unification over `ena`'s union-find table. The
//! generic parameters of a conformance declaration are freshened into
//! matching variables; the generic parameters of the query type stay rigid,
//! so `Foo<?0, ?1>` matches `Foo<Int, τ_0_0>` with `?1 := τ_0_0`.

use ena::unify::InPlaceUnificationTable;
use rustc_hash::FxHashMap;

use crate::error::TypeError;
use crate::ty::{GenericParam, Ty, TyVar};

/// The matching context -- owns the unification table for one lookup.
pub struct MatchCtx {
    /// The union-find unification table (ena).
    table: InPlaceUnificationTable<TyVar>,
}

impl Default for MatchCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchCtx {
    /// Create a new, empty matching context.
    pub fn new() -> Self {
        MatchCtx {
            table: InPlaceUnificationTable::new(),
        }
    }

    /// Create a fresh matching variable.
    pub fn fresh_var(&mut self) -> Ty {
        Ty::Var(self.table.new_key(None))
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Resolve a type by following union-find indirection.
    ///
    /// Unbound variables are normalized to their root key so that unified
    /// variables resolve to the same representative.
    pub fn resolve(&mut self, ty: Ty) -> Ty {
        match ty {
            Ty::Var(v) => match self.table.probe_value(v) {
                Some(inner) => self.resolve(inner),
                None => Ty::Var(self.table.find(v)),
            },
            Ty::Member(base, assoc) => Ty::Member(Box::new(self.resolve(*base)), assoc),
            Ty::App(con, args) => {
                let con = Box::new(self.resolve(*con));
                let args = args.into_iter().map(|a| self.resolve(a)).collect();
                Ty::App(con, args)
            }
            Ty::Tuple(elems) => Ty::Tuple(elems.into_iter().map(|e| self.resolve(e)).collect()),
            Ty::Fun(params, ret) => {
                let params = params.into_iter().map(|p| self.resolve(p)).collect();
                Ty::Fun(params, Box::new(self.resolve(*ret)))
            }
            other => other,
        }
    }

    // ── Occurs Check ────────────────────────────────────────────────────

    /// Check if a matching variable occurs anywhere within a type.
    pub fn occurs_in(&mut self, var: TyVar, ty: &Ty) -> bool {
        match ty {
            Ty::Var(v) => {
                if self.table.find(*v) == self.table.find(var) {
                    return true;
                }
                match self.table.probe_value(*v) {
                    Some(inner) => self.occurs_in(var, &inner),
                    None => false,
                }
            }
            Ty::Member(base, _) => self.occurs_in(var, base),
            Ty::App(con, args) => {
                self.occurs_in(var, con) || args.iter().any(|a| self.occurs_in(var, a))
            }
            Ty::Tuple(elems) => elems.iter().any(|e| self.occurs_in(var, e)),
            Ty::Fun(params, ret) => {
                params.iter().any(|p| self.occurs_in(var, p)) || self.occurs_in(var, ret)
            }
            Ty::Param(_) | Ty::Con(_) | Ty::Error => false,
        }
    }

    // ── Unification ─────────────────────────────────────────────────────

    /// Unify two types, binding matching variables as needed.
    ///
    /// Generic parameters and projections are rigid: they only unify with
    /// themselves or with a variable.
    pub fn unify(&mut self, a: Ty, b: Ty) -> Result<(), TypeError> {
        let a = self.resolve(a);
        let b = self.resolve(b);

        match (a, b) {
            (Ty::Var(v1), Ty::Var(v2)) => {
                self.table
                    .unify_var_var(v1, v2)
                    .expect("unbound variables always unify");
                Ok(())
            }
            (Ty::Var(v), ty) | (ty, Ty::Var(v)) => {
                if self.occurs_in(v, &ty) {
                    return Err(TypeError::InfiniteType { var: Ty::Var(v), ty });
                }
                self.table
                    .unify_var_value(v, Some(ty))
                    .expect("an unbound variable accepts any value");
                Ok(())
            }
            (Ty::App(c1, a1), Ty::App(c2, a2)) => {
                if a1.len() != a2.len() {
                    return Err(TypeError::ArityMismatch {
                        expected: a1.len(),
                        found: a2.len(),
                    });
                }
                self.unify(*c1, *c2)?;
                for (x, y) in a1.into_iter().zip(a2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Ty::Tuple(e1), Ty::Tuple(e2)) if e1.len() == e2.len() => {
                for (x, y) in e1.into_iter().zip(e2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Ty::Fun(p1, r1), Ty::Fun(p2, r2)) if p1.len() == p2.len() => {
                for (x, y) in p1.into_iter().zip(p2) {
                    self.unify(x, y)?;
                }
                self.unify(*r1, *r2)
            }
            (a, b) if a == b => Ok(()),
            (expected, found) => Err(TypeError::Mismatch { expected, found }),
        }
    }
}

/// Replace the generic parameters of a declaration with fresh variables.
///
/// `bindings` maps each parameter to its variable, so that the same
/// parameter maps to the same variable across several types (the conforming
/// type, its type witnesses and conditional requirements).
pub fn freshen_type_params(
    ty: &Ty,
    ctx: &mut MatchCtx,
    bindings: &mut FxHashMap<GenericParam, Ty>,
) -> Ty {
    ty.subst_params(&mut |param| {
        bindings
            .entry(param)
            .or_insert_with(|| ctx.fresh_var())
            .clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_binds_to_rigid_param() {
        let mut ctx = MatchCtx::new();
        let mut bindings = FxHashMap::default();
        let decl = Ty::nominal("Foo", vec![Ty::param(0, 0), Ty::param(0, 1)]);
        let fresh = freshen_type_params(&decl, &mut ctx, &mut bindings);

        let query = Ty::nominal("Foo", vec![Ty::int(), Ty::param(0, 0)]);
        ctx.unify(fresh, query).unwrap();

        let a = ctx.resolve(bindings[&GenericParam::new(0, 0)].clone());
        let b = ctx.resolve(bindings[&GenericParam::new(0, 1)].clone());
        assert_eq!(a, Ty::int());
        assert_eq!(b, Ty::param(0, 0));
    }

    #[test]
    fn rigid_params_do_not_unify_with_concrete_types() {
        let mut ctx = MatchCtx::new();
        let result = ctx.unify(Ty::param(0, 0), Ty::int());
        assert!(matches!(result, Err(TypeError::Mismatch { .. })));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let mut ctx = MatchCtx::new();
        let result = ctx.unify(
            Ty::nominal("Foo", vec![Ty::int()]),
            Ty::nominal("Foo", vec![Ty::int(), Ty::int()]),
        );
        assert_eq!(
            result,
            Err(TypeError::ArityMismatch {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn occurs_check_prevents_infinite_types() {
        let mut ctx = MatchCtx::new();
        let v = ctx.fresh_var();
        let result = ctx.unify(v.clone(), Ty::array(v));
        assert!(matches!(result, Err(TypeError::InfiniteType { .. })));
    }

    #[test]
    fn shared_bindings_across_types() {
        let mut ctx = MatchCtx::new();
        let mut bindings = FxHashMap::default();
        let first = freshen_type_params(&Ty::array(Ty::param(0, 0)), &mut ctx, &mut bindings);
        let second = freshen_type_params(&Ty::param(0, 0).member("P", "A"), &mut ctx, &mut bindings);
        ctx.unify(first, Ty::array(Ty::string())).unwrap();
        assert_eq!(ctx.resolve(second), Ty::string().member("P", "A"));
    }
}
