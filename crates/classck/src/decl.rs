//! Predicate, function and constructor declarations that carry constraints.

use std::fmt;

use classck_common::SourceLoc;

use crate::class::Constraint;
use crate::ty::{Ty, TyVar, VarSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredKind {
    Predicate,
    Function,
}

impl fmt::Display for PredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredKind::Predicate => write!(f, "predicate"),
            PredKind::Function => write!(f, "function"),
        }
    }
}

/// Import/export status of a declaration, as tracked by the module system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclStatus {
    /// Defined here and private to this module.
    Local,
    /// Defined here and exported.
    Exported,
    /// Read from another module's interface.
    Imported,
}

/// A predicate or function declaration with its type signature.
#[derive(Clone, Debug)]
pub struct PredDecl {
    pub name: String,
    pub kind: PredKind,
    pub varset: VarSet,
    /// Argument types; for functions the return type is the last entry.
    pub arg_types: Vec<Ty>,
    /// Constraints on universally quantified variables (`<= c(T)`).
    pub univ_constraints: Vec<Constraint>,
    /// Constraints on existentially quantified variables (`=> c(T)`).
    pub exist_constraints: Vec<Constraint>,
    /// Variables bound by `some [...]`.
    pub exist_vars: Vec<TyVar>,
    pub status: DeclStatus,
    pub loc: SourceLoc,
}

impl PredDecl {
    pub fn arity(&self) -> usize {
        match self.kind {
            PredKind::Predicate => self.arg_types.len(),
            PredKind::Function => self.arg_types.len().saturating_sub(1),
        }
    }

    /// `predicate foo/2`.
    pub fn describe(&self) -> String {
        format!("{} `{}/{}`", self.kind, self.name, self.arity())
    }

    pub fn has_constraints(&self) -> bool {
        !self.univ_constraints.is_empty() || !self.exist_constraints.is_empty()
    }
}

/// An existentially quantified data constructor.
#[derive(Clone, Debug)]
pub struct CtorDecl {
    pub type_name: String,
    pub name: String,
    pub varset: VarSet,
    pub arg_types: Vec<Ty>,
    pub exist_vars: Vec<TyVar>,
    pub constraints: Vec<Constraint>,
    pub loc: SourceLoc,
}

impl CtorDecl {
    /// `constructor `box/1` of type `boxed``.
    pub fn describe(&self) -> String {
        format!(
            "constructor `{}/{}` of type `{}`",
            self.name,
            self.arg_types.len(),
            self.type_name
        )
    }
}

/// All declarations subject to the ambiguity check.
#[derive(Clone, Debug, Default)]
pub struct DeclTable {
    pub preds: Vec<PredDecl>,
    pub ctors: Vec<CtorDecl>,
}

impl DeclTable {
    pub fn new() -> Self {
        Self::default()
    }
}
