//! Type term representation for instance checking.
//!
//! Defines type variables (`TyVar`), type constructors (`TyCon`), type terms
//! (`Ty`) and the per-declaration variable scope (`VarSet`). Also provides
//! the two renaming operations every checker relies on: renaming one scope
//! apart from another, and standardising a term list so that variables are
//! numbered in order of first appearance.

use std::fmt;

use rustc_hash::FxHashMap;

/// A type variable, identified by its index within a [`VarSet`].
///
/// Variables are only meaningful relative to the scope that allocated them.
/// Terms from two different scopes must be renamed apart before they are
/// compared or unified.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVar(pub u32);

/// A type constructor, identified by (qualified name, arity).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyCon {
    pub name: String,
    pub arity: usize,
}

impl TyCon {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        TyCon { name: name.into(), arity }
    }
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// A type term: either a variable or a constructor applied to arguments.
///
/// The arity of `App`'s constructor always equals the argument count.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ty {
    Var(TyVar),
    App(TyCon, Vec<Ty>),
}

/// A substitution from type variables to terms.
pub type TySubst = FxHashMap<TyVar, Ty>;

impl Ty {
    /// The variable with the given index.
    pub fn var(index: u32) -> Ty {
        Ty::Var(TyVar(index))
    }

    /// A nullary constructor such as `int`.
    pub fn con(name: impl Into<String>) -> Ty {
        Ty::App(TyCon::new(name, 0), Vec::new())
    }

    /// A constructor applied to arguments; the arity is taken from `args`.
    pub fn app(name: impl Into<String>, args: Vec<Ty>) -> Ty {
        Ty::App(TyCon::new(name, args.len()), args)
    }

    /// Append the variables of this term to `out`, skipping ones already
    /// present. Preserves first-appearance order.
    pub fn collect_vars(&self, out: &mut Vec<TyVar>) {
        match self {
            Ty::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Ty::App(_, args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }

    /// Apply a substitution. Unbound variables are left as they are; bound
    /// variables are replaced once (the substitution is not iterated).
    pub fn apply(&self, subst: &TySubst) -> Ty {
        match self {
            Ty::Var(v) => subst.get(v).cloned().unwrap_or_else(|| self.clone()),
            Ty::App(con, args) => {
                Ty::App(con.clone(), args.iter().map(|a| a.apply(subst)).collect())
            }
        }
    }

    /// Shift every variable index by `offset`. Used to rename a term apart
    /// after its scope has been appended to another (see [`VarSet::append`]).
    pub fn shift(&self, offset: u32) -> Ty {
        match self {
            Ty::Var(v) => Ty::Var(TyVar(v.0 + offset)),
            Ty::App(con, args) => {
                Ty::App(con.clone(), args.iter().map(|a| a.shift(offset)).collect())
            }
        }
    }

    /// Render this term using the variable names of `varset`.
    pub fn display<'a>(&'a self, varset: &'a VarSet) -> TyDisplay<'a> {
        TyDisplay { ty: self, varset }
    }
}

/// Variables of a list of terms, in first-appearance order, without repeats.
pub fn type_vars(tys: &[Ty]) -> Vec<TyVar> {
    let mut out = Vec::new();
    for ty in tys {
        ty.collect_vars(&mut out);
    }
    out
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "V_{}", v.0),
            Ty::App(con, args) => {
                write!(f, "{}", con.name)?;
                write_args(f, args, |f, a| write!(f, "{}", a))
            }
        }
    }
}

/// A term paired with the scope that names its variables.
pub struct TyDisplay<'a> {
    ty: &'a Ty,
    varset: &'a VarSet,
}

impl fmt::Display for TyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Ty::Var(v) => write!(f, "{}", self.varset.name(*v)),
            Ty::App(con, args) => {
                write!(f, "{}", con.name)?;
                write_args(f, args, |f, a| write!(f, "{}", a.display(self.varset)))
            }
        }
    }
}

fn write_args(
    f: &mut fmt::Formatter<'_>,
    args: &[Ty],
    mut each: impl FnMut(&mut fmt::Formatter<'_>, &Ty) -> fmt::Result,
) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        each(f, a)?;
    }
    write!(f, ")")
}

/// The scope of a declaration's type variables.
///
/// Variables are allocated sequentially, so a `VarSet` of length `n` owns
/// exactly the variables `0..n`. The term parser allocates in order of first
/// textual appearance; [`standardize`] relies on the same numbering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VarSet {
    names: Vec<Option<String>>,
}

impl VarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an anonymous variable.
    pub fn fresh(&mut self) -> TyVar {
        let var = TyVar(self.names.len() as u32);
        self.names.push(None);
        var
    }

    /// Allocate a named variable.
    pub fn fresh_named(&mut self, name: impl Into<String>) -> TyVar {
        let var = TyVar(self.names.len() as u32);
        self.names.push(Some(name.into()));
        var
    }

    /// Find a variable by its source name.
    pub fn lookup(&self, name: &str) -> Option<TyVar> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|i| TyVar(i as u32))
    }

    /// Return the named variable, allocating it on first use.
    pub fn lookup_or_fresh(&mut self, name: &str) -> TyVar {
        match self.lookup(name) {
            Some(v) => v,
            None => self.fresh_named(name),
        }
    }

    /// The display name of a variable: its source name if it has one.
    pub fn name(&self, var: TyVar) -> String {
        match self.names.get(var.0 as usize) {
            Some(Some(name)) => name.clone(),
            _ => format!("V_{}", var.0),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Append the variables of `other` to this scope.
    ///
    /// Returns the offset to pass to [`Ty::shift`] for terms of `other` so
    /// they refer to the appended copies. After this, terms of both scopes can
    /// be unified without accidental capture.
    pub fn append(&mut self, other: &VarSet) -> u32 {
        let offset = self.names.len() as u32;
        self.names.extend(other.names.iter().cloned());
        offset
    }
}

/// Renumbers variables in order of first appearance, starting from zero.
///
/// Feeding several term lists through one `Standardizer` numbers them as a
/// single sequence, so a type vector and its constraints stay consistent.
#[derive(Default)]
pub struct Standardizer {
    map: FxHashMap<TyVar, TyVar>,
}

impl Standardizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(&mut self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(v) => {
                let next = TyVar(self.map.len() as u32);
                Ty::Var(*self.map.entry(*v).or_insert(next))
            }
            Ty::App(con, args) => Ty::App(con.clone(), args.iter().map(|a| self.ty(a)).collect()),
        }
    }

    pub fn tys(&mut self, tys: &[Ty]) -> Vec<Ty> {
        tys.iter().map(|t| self.ty(t)).collect()
    }
}

/// Standardise a term list: the result is identical for any two lists that
/// differ only by a bijective renaming of their variables.
///
/// When the first-appearance invariant holds this returns the input
/// unchanged, so grouping by the result is the cheap syntactic comparison.
pub fn standardize(tys: &[Ty]) -> Vec<Ty> {
    Standardizer::new().tys(tys)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn list(t: Ty) -> Ty {
        Ty::app("list", vec![t])
    }

    #[test]
    fn vars_in_first_appearance_order() {
        let ty = Ty::app("map", vec![Ty::var(3), list(Ty::var(1)), Ty::var(3)]);
        assert_eq!(type_vars(&[ty]), vec![TyVar(3), TyVar(1)]);
    }

    #[test]
    fn standardize_ignores_spelling() {
        let a = vec![list(Ty::var(4)), Ty::var(2)];
        let b = vec![list(Ty::var(0)), Ty::var(1)];
        assert_eq!(standardize(&a), standardize(&b));
        assert_eq!(standardize(&b), b);
    }

    #[test]
    fn standardize_keeps_sharing_distinct() {
        let shared = vec![Ty::var(0), Ty::var(0)];
        let distinct = vec![Ty::var(0), Ty::var(1)];
        assert_ne!(standardize(&shared), standardize(&distinct));
    }

    #[test]
    fn append_renames_apart() {
        let mut a = VarSet::new();
        let t = a.fresh_named("T");
        let mut b = VarSet::new();
        let u = b.fresh_named("T");
        let offset = a.append(&b);
        let shifted = Ty::Var(u).shift(offset);
        assert_ne!(shifted, Ty::Var(t));
        assert_eq!(a.len(), 2);
        assert_eq!(a.name(TyVar(1)), "T");
    }

    #[test]
    fn apply_substitution() {
        let mut subst = TySubst::default();
        subst.insert(TyVar(0), Ty::con("int"));
        let ty = Ty::app("pair", vec![Ty::var(0), Ty::var(1)]);
        assert_eq!(ty.apply(&subst), Ty::app("pair", vec![Ty::con("int"), Ty::var(1)]));
    }

    #[test]
    fn display_with_names() {
        let mut vs = VarSet::new();
        let k = vs.fresh_named("K");
        let v = vs.fresh();
        let ty = Ty::app("map", vec![Ty::Var(k), Ty::Var(v)]);
        assert_eq!(ty.display(&vs).to_string(), "map(K, V_1)");
        assert_eq!(Ty::con("int").to_string(), "int");
    }
}
