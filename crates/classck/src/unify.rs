//! First-order unification and one-way matching over type terms.
//!
//! Unification uses `ena`'s union-find table. Callers first rename the two
//! sides apart (see [`VarSet::append`](crate::ty::VarSet::append)), build a
//! `Unifier` sized for the merged scope, and read results back through
//! [`Unifier::resolve`]. Matching (subsumption) is a separate, purely
//! functional check that only binds variables of the general side.

use std::fmt;

use ena::unify::InPlaceUnificationTable;

use crate::ty::{Ty, TySubst, TyVar};

/// Why two terms failed to unify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnifyError {
    /// Different constructors (name or arity) at the same position.
    Mismatch { left: Ty, right: Ty },
    /// Binding the variable would create an infinite term.
    Occurs { var: TyVar, ty: Ty },
    /// Term lists of different lengths.
    Length { left: usize, right: usize },
}

impl fmt::Display for UnifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnifyError::Mismatch { left, right } => {
                write!(f, "cannot unify `{}` with `{}`", left, right)
            }
            UnifyError::Occurs { var, ty } => {
                write!(f, "V_{} occurs in `{}`", var.0, ty)
            }
            UnifyError::Length { left, right } => {
                write!(f, "term lists have lengths {} and {}", left, right)
            }
        }
    }
}

/// A unification context over one variable scope.
pub struct Unifier {
    table: InPlaceUnificationTable<TyVar>,
}

impl Unifier {
    /// Create a context owning variables `0..num_vars`.
    pub fn new(num_vars: usize) -> Self {
        let mut table = InPlaceUnificationTable::new();
        for _ in 0..num_vars {
            table.new_key(None);
        }
        Unifier { table }
    }

    /// Make sure `var` has a slot in the table.
    fn ensure(&mut self, var: TyVar) {
        while self.table.len() <= var.0 as usize {
            self.table.new_key(None);
        }
    }

    /// Resolve a term by following bindings all the way down. Unbound
    /// variables are normalised to their representative.
    pub fn resolve(&mut self, ty: Ty) -> Ty {
        match ty {
            Ty::Var(v) => {
                self.ensure(v);
                match self.table.probe_value(v) {
                    Some(inner) => self.resolve(inner),
                    None => Ty::Var(self.table.find(v)),
                }
            }
            Ty::App(con, args) => {
                let args = args.into_iter().map(|a| self.resolve(a)).collect();
                Ty::App(con, args)
            }
        }
    }

    fn occurs_in(&mut self, var: TyVar, ty: &Ty) -> bool {
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
            Ty::App(_, args) => args.iter().any(|a| self.occurs_in(var, a)),
        }
    }

    /// Unify two terms, recording the bindings in the table.
    pub fn unify(&mut self, a: Ty, b: Ty) -> Result<(), UnifyError> {
        let a = self.resolve(a);
        let b = self.resolve(b);

        match (a, b) {
            (Ty::Var(v1), Ty::Var(v2)) if v1 == v2 => Ok(()),

            (Ty::Var(v1), Ty::Var(v2)) => self.table.unify_var_var(v1, v2).map_err(|_| {
                UnifyError::Mismatch { left: Ty::Var(v1), right: Ty::Var(v2) }
            }),

            (Ty::Var(v), ty) | (ty, Ty::Var(v)) => {
                if self.occurs_in(v, &ty) {
                    return Err(UnifyError::Occurs { var: v, ty });
                }
                self.table
                    .unify_var_value(v, Some(ty.clone()))
                    .map_err(|_| UnifyError::Mismatch { left: Ty::Var(v), right: ty })
            }

            (Ty::App(c1, a1), Ty::App(c2, a2)) => {
                if c1 != c2 || a1.len() != a2.len() {
                    return Err(UnifyError::Mismatch {
                        left: Ty::App(c1, a1),
                        right: Ty::App(c2, a2),
                    });
                }
                for (x, y) in a1.into_iter().zip(a2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
        }
    }

    /// Unify two term lists position by position.
    pub fn unify_lists(&mut self, a: &[Ty], b: &[Ty]) -> Result<(), UnifyError> {
        if a.len() != b.len() {
            return Err(UnifyError::Length { left: a.len(), right: b.len() });
        }
        for (x, y) in a.iter().zip(b) {
            self.unify(x.clone(), y.clone())?;
        }
        Ok(())
    }

    pub fn resolve_all(&mut self, tys: &[Ty]) -> Vec<Ty> {
        tys.iter().map(|t| self.resolve(t.clone())).collect()
    }
}

/// One-way matching: find a substitution for the variables of `general`
/// that makes it syntactically equal to `specific`.
///
/// Variables of `specific` are treated as constants, so the two lists must
/// already be renamed apart.
pub fn match_types(general: &[Ty], specific: &[Ty]) -> Option<TySubst> {
    if general.len() != specific.len() {
        return None;
    }
    let mut subst = TySubst::default();
    for (g, s) in general.iter().zip(specific) {
        if !match_into(g, s, &mut subst) {
            return None;
        }
    }
    Some(subst)
}

fn match_into(general: &Ty, specific: &Ty, subst: &mut TySubst) -> bool {
    match general {
        Ty::Var(v) => match subst.get(v) {
            Some(bound) => bound == specific,
            None => {
                subst.insert(*v, specific.clone());
                true
            }
        },
        Ty::App(c1, a1) => match specific {
            Ty::App(c2, a2) if c1 == c2 && a1.len() == a2.len() => {
                a1.iter().zip(a2).all(|(g, s)| match_into(g, s, subst))
            }
            _ => false,
        },
    }
}

/// Whether `general` subsumes `specific`: every instance of `specific` is
/// also an instance of `general`.
pub fn subsumes(general: &[Ty], specific: &[Ty]) -> bool {
    match_types(general, specific).is_some()
}

// ── Tests ──────────────────────────────────────────────────────────────
