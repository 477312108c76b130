//! Class and instance records and the tables that hold them.
//!
//! These are the shared data types every pass reads: constraints, functional
//! dependencies, class definitions (with their ancestor-constraint field) and
//! instance definitions, plus the `ClassTable` and `InstanceTable` that index
//! them. No checking logic lives here.

use std::fmt;

use classck_common::SourceLoc;
use rustc_hash::FxHashMap;

use crate::ty::{Ty, TySubst, TyVar, VarSet};

/// A class identifier: name plus arity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId {
    pub name: String,
    pub arity: usize,
}

impl ClassId {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        ClassId { name: name.into(), arity }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// A class constraint `K(T1, ..., Tn)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
    pub class: ClassId,
    pub args: Vec<Ty>,
}

impl Constraint {
    /// Build a constraint; the class arity is taken from `args`.
    pub fn new(class: impl Into<String>, args: Vec<Ty>) -> Self {
        let arity = args.len();
        Constraint { class: ClassId::new(class, arity), args }
    }

    pub fn apply(&self, subst: &TySubst) -> Constraint {
        Constraint {
            class: self.class.clone(),
            args: self.args.iter().map(|a| a.apply(subst)).collect(),
        }
    }

    pub fn shift(&self, offset: u32) -> Constraint {
        Constraint {
            class: self.class.clone(),
            args: self.args.iter().map(|a| a.shift(offset)).collect(),
        }
    }

    pub fn collect_vars(&self, out: &mut Vec<TyVar>) {
        for a in &self.args {
            a.collect_vars(out);
        }
    }

    pub fn display<'a>(&'a self, varset: &'a VarSet) -> ConstraintDisplay<'a> {
        ConstraintDisplay { constraint: self, varset }
    }
}

/// Variables of a constraint list in first-appearance order.
pub fn constraint_vars(constraints: &[Constraint]) -> Vec<TyVar> {
    let mut out = Vec::new();
    for c in constraints {
        c.collect_vars(&mut out);
    }
    out
}

pub struct ConstraintDisplay<'a> {
    constraint: &'a Constraint,
    varset: &'a VarSet,
}

impl fmt::Display for ConstraintDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.constraint.class.name)?;
        for (i, a) in self.constraint.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", a.display(self.varset))?;
        }
        write!(f, ")")
    }
}

/// A functional dependency between class parameter positions.
///
/// Positions are 0-based indices into the class parameter list. Both sides
/// are kept sorted and free of repeats.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunDep {
    pub domain: Vec<usize>,
    pub range: Vec<usize>,
}

impl FunDep {
    pub fn new(mut domain: Vec<usize>, mut range: Vec<usize>) -> Self {
        domain.sort_unstable();
        domain.dedup();
        range.sort_unstable();
        range.dedup();
        FunDep { domain, range }
    }

    /// The terms at this dependency's domain positions.
    pub fn domain_types(&self, args: &[Ty]) -> Vec<Ty> {
        self.domain.iter().filter_map(|&i| args.get(i).cloned()).collect()
    }

    /// The terms at this dependency's range positions.
    pub fn range_types(&self, args: &[Ty]) -> Vec<Ty> {
        self.range.iter().filter_map(|&i| args.get(i).cloned()).collect()
    }

    /// Render as `(A, B -> C)` using the class's parameter names.
    pub fn display<'a>(&'a self, class: &'a ClassDef) -> FunDepDisplay<'a> {
        FunDepDisplay { fundep: self, class }
    }
}

pub struct FunDepDisplay<'a> {
    fundep: &'a FunDep,
    class: &'a ClassDef,
}

impl fmt::Display for FunDepDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |positions: &[usize]| -> String {
            positions
                .iter()
                .map(|&i| match self.class.params.get(i) {
                    Some(v) => self.class.varset.name(*v),
                    None => format!("#{}", i + 1),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({} -> {})", side(&self.fundep.domain), side(&self.fundep.range))
    }
}

/// A type class definition.
#[derive(Clone, Debug)]
pub struct ClassDef {
    pub id: ClassId,
    /// Parameter variables, one per class argument position.
    pub params: Vec<TyVar>,
    pub varset: VarSet,
    /// Declared superclass constraints, over `params`.
    pub superclasses: Vec<Constraint>,
    pub fundeps: Vec<FunDep>,
    /// Constraints of this class and all its transitive superclasses that
    /// carry at least one functional dependency, expressed over `params`.
    /// Empty until `resolve_ancestors` has run.
    pub ancestors: Vec<Constraint>,
    pub loc: SourceLoc,
}

impl ClassDef {
    pub fn has_fundeps(&self) -> bool {
        !self.fundeps.is_empty()
    }

    /// The constraint `C(params)`.
    pub fn self_constraint(&self) -> Constraint {
        Constraint {
            class: self.id.clone(),
            args: self.params.iter().map(|v| Ty::Var(*v)).collect(),
        }
    }

    /// Substitution mapping this class's parameters onto `args`.
    pub fn param_subst(&self, args: &[Ty]) -> TySubst {
        self.params.iter().copied().zip(args.iter().cloned()).collect()
    }
}

/// One method implementation of a concrete instance. Opaque to the checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodImpl {
    pub name: String,
    pub arity: usize,
}

/// The body of an instance declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceBody {
    /// `:- instance c(t).` in an interface, without methods.
    Abstract,
    /// A full definition with its method implementations.
    Concrete(Vec<MethodImpl>),
}

/// Where an instance declaration comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Declared in the module being compiled.
    Local,
    /// Read from the interface of the named module.
    Imported(String),
}

/// An instance declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceDef {
    pub class: ClassId,
    /// The type vector as written, before type synonyms were expanded.
    pub original_types: Vec<Ty>,
    /// The type vector after expansion. All grouping and checking uses this.
    pub types: Vec<Ty>,
    pub constraints: Vec<Constraint>,
    pub varset: VarSet,
    pub body: InstanceBody,
    pub visibility: Visibility,
    pub loc: SourceLoc,
    /// Set by instance selection on a concrete winner whose abstract
    /// declaration was subsumed; points at that declaration.
    pub abstract_loc: Option<SourceLoc>,
}

impl InstanceDef {
    pub fn is_local(&self) -> bool {
        self.visibility == Visibility::Local
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self.body, InstanceBody::Concrete(_))
    }

    /// The module an imported instance came from.
    pub fn origin_module(&self) -> Option<&str> {
        match &self.visibility {
            Visibility::Local => None,
            Visibility::Imported(module) => Some(module),
        }
    }

    /// `c(list(T), T)`, using this instance's variable names.
    pub fn head(&self) -> String {
        Constraint { class: self.class.clone(), args: self.types.clone() }
            .display(&self.varset)
            .to_string()
    }
}

/// All class definitions, in declaration order.
///
/// Iteration order is the order classes were inserted; passes that must be
/// deterministic walk the table in this order.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    classes: Vec<ClassDef>,
    index: FxHashMap<ClassId, usize>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a class. Returns the definition back if the id is taken.
    pub fn insert(&mut self, def: ClassDef) -> Result<(), ClassDef> {
        if self.index.contains_key(&def.id) {
            return Err(def);
        }
        self.index.insert(def.id.clone(), self.classes.len());
        self.classes.push(def);
        Ok(())
    }

    pub fn get(&self, id: &ClassId) -> Option<&ClassDef> {
        self.index.get(id).map(|&i| &self.classes[i])
    }

    pub fn get_mut(&mut self, id: &ClassId) -> Option<&mut ClassDef> {
        self.index.get(id).map(|&i| &mut self.classes[i])
    }

    pub fn contains(&self, id: &ClassId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ClassId> {
        self.classes.iter().map(|c| &c.id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Instance declarations grouped by class.
///
/// Insertion order within a class is not significant; classes are iterated
/// in the order their first instance was added.
#[derive(Clone, Debug, Default)]
pub struct InstanceTable {
    order: Vec<ClassId>,
    by_class: FxHashMap<ClassId, Vec<InstanceDef>>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, inst: InstanceDef) {
        if !self.by_class.contains_key(&inst.class) {
            self.order.push(inst.class.clone());
        }
        self.by_class.entry(inst.class.clone()).or_default().push(inst);
    }

    /// Replace the instance list of a class.
    pub fn set(&mut self, class: ClassId, instances: Vec<InstanceDef>) {
        if !self.by_class.contains_key(&class) {
            self.order.push(class.clone());
        }
        self.by_class.insert(class, instances);
    }

    pub fn get(&self, class: &ClassId) -> &[InstanceDef] {
        self.by_class.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassId> {
        self.order.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClassId, &[InstanceDef])> {
        self.order.iter().map(move |c| (c, self.get(c)))
    }

    /// Total number of instances across all classes.
    pub fn len(&self) -> usize {
        self.by_class.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, params: &[&str]) -> ClassDef {
        let mut varset = VarSet::new();
        let params = params.iter().map(|p| varset.fresh_named(*p)).collect::<Vec<_>>();
        ClassDef {
            id: ClassId::new(name, params.len()),
            params,
            varset,
            superclasses: Vec::new(),
            fundeps: Vec::new(),
            ancestors: Vec::new(),
            loc: SourceLoc::new("test.m", 1),
        }
    }

    #[test]
    fn class_table_rejects_duplicate_ids() {
        let mut table = ClassTable::new();
        assert!(table.insert(class("c", &["A"])).is_ok());
        assert!(table.insert(class("c", &["B"])).is_err());
        assert!(table.insert(class("c", &["A", "B"])).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn fundep_display_uses_param_names() {
        let mut c = class("c", &["A", "B", "C"]);
        c.fundeps.push(FunDep::new(vec![1, 0], vec![2]));
        assert_eq!(c.fundeps[0].display(&c).to_string(), "(A, B -> C)");
    }

    #[test]
    fn fundep_positions_select_types() {
        let fd = FunDep::new(vec![0], vec![1]);
        let args = vec![Ty::con("int"), Ty::con("string")];
        assert_eq!(fd.domain_types(&args), vec![Ty::con("int")]);
        assert_eq!(fd.range_types(&args), vec![Ty::con("string")]);
    }

    #[test]
    fn instance_table_keeps_class_order() {
        let mut table = InstanceTable::new();
        let make = |class: &str| InstanceDef {
            class: ClassId::new(class, 1),
            original_types: vec![Ty::con("int")],
            types: vec![Ty::con("int")],
            constraints: Vec::new(),
            varset: VarSet::new(),
            body: InstanceBody::Abstract,
            visibility: Visibility::Local,
            loc: SourceLoc::new("test.m", 1),
            abstract_loc: None,
        };
        table.push(make("b"));
        table.push(make("a"));
        table.push(make("b"));
        let order: Vec<&str> = table.classes().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(table.get(&ClassId::new("b", 1)).len(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn instance_head_display() {
        let mut varset = VarSet::new();
        let t = varset.fresh_named("T");
        let inst = InstanceDef {
            class: ClassId::new("c", 2),
            original_types: Vec::new(),
            types: vec![Ty::app("list", vec![Ty::Var(t)]), Ty::Var(t)],
            constraints: Vec::new(),
            varset,
            body: InstanceBody::Concrete(Vec::new()),
            visibility: Visibility::Imported("lists".to_string()),
            loc: SourceLoc::new("lists.m", 3),
            abstract_loc: None,
        };
        assert_eq!(inst.head(), "c(list(T), T)");
        assert_eq!(inst.origin_module(), Some("lists"));
        assert!(inst.is_concrete());
    }
}
