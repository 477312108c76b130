//! Ambiguity and quantifier checks for constrained declarations.
//!
//! A constrained type variable is ambiguous when neither the declaration's
//! argument types nor the functional dependencies of its constraints
//! determine it; no call site could ever fix it.

use std::collections::BTreeSet;

use tracing::{debug, instrument, trace};

use crate::class::{constraint_vars, ClassId, ClassTable, Constraint};
use crate::closure::{closure, induce_fundeps};
use crate::decl::{CtorDecl, DeclStatus, DeclTable, PredDecl};
use crate::error::{CheckError, QuantScope, RefSite};
use crate::ty::{type_vars, TyVar, VarSet};
use classck_common::SourceLoc;

/// Decides which declarations are subject to the ambiguity check.
pub trait NeedsAmbiguityCheck {
    fn check_pred(&self, decl: &PredDecl) -> bool;

    fn check_ctor(&self, _decl: &CtorDecl) -> bool {
        true
    }
}

/// Check every predicate and function that was not read from another
/// module's interface, and every constructor.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkipImported;

impl NeedsAmbiguityCheck for SkipImported {
    fn check_pred(&self, decl: &PredDecl) -> bool {
        decl.status != DeclStatus::Imported
    }
}

/// Constrained variables not determined from `roots`, in first-appearance
/// order. Unknown classes in `constraints` are returned as the error.
pub fn ambiguous_vars(
    classes: &ClassTable,
    constraints: &[Constraint],
    roots: impl IntoIterator<Item = TyVar>,
) -> Result<Vec<TyVar>, Vec<ClassId>> {
    let induced = induce_fundeps(classes, constraints)?;
    let determined = closure(&induced, roots);
    Ok(constraint_vars(constraints)
        .into_iter()
        .filter(|v| !determined.contains(v))
        .collect())
}

fn names(varset: &VarSet, vars: &[TyVar]) -> Vec<String> {
    vars.iter().map(|v| varset.name(*v)).collect()
}

struct Subject<'a> {
    describe: String,
    varset: &'a VarSet,
    loc: &'a SourceLoc,
}

impl Subject<'_> {
    fn ambiguity(
        &self,
        classes: &ClassTable,
        constraints: &[Constraint],
        roots: Vec<TyVar>,
        errors: &mut Vec<CheckError>,
    ) {
        match ambiguous_vars(classes, constraints, roots) {
            Ok(vars) if vars.is_empty() => {}
            Ok(vars) => errors.push(CheckError::AmbiguousConstrainedVariable {
                decl: self.describe.clone(),
                vars: names(self.varset, &vars),
                loc: self.loc.clone(),
            }),
            Err(missing) => {
                trace!(decl = %self.describe, "skipping ambiguity check after unknown class");
                errors.extend(missing.into_iter().map(|class| CheckError::UnknownClassReference {
                    class,
                    site: RefSite::Declaration,
                    loc: self.loc.clone(),
                }));
            }
        }
    }

    fn quantifier(&self, scope: QuantScope, vars: Vec<TyVar>, errors: &mut Vec<CheckError>) {
        if vars.is_empty() {
            return;
        }
        errors.push(CheckError::BadQuantifierScope {
            decl: self.describe.clone(),
            scope,
            vars: names(self.varset, &vars),
            loc: self.loc.clone(),
        });
    }
}

fn check_pred(classes: &ClassTable, decl: &PredDecl, errors: &mut Vec<CheckError>) {
    let subject = Subject { describe: decl.describe(), varset: &decl.varset, loc: &decl.loc };
    let exist: BTreeSet<TyVar> = decl.exist_vars.iter().copied().collect();

    let constraints: Vec<Constraint> = decl
        .univ_constraints
        .iter()
        .chain(&decl.exist_constraints)
        .cloned()
        .collect();
    subject.ambiguity(classes, &constraints, type_vars(&decl.arg_types), errors);

    let universal_in_exist = constraint_vars(&decl.exist_constraints)
        .into_iter()
        .filter(|v| !exist.contains(v))
        .collect();
    subject.quantifier(QuantScope::UniversalInExistential, universal_in_exist, errors);

    let exist_in_universal = constraint_vars(&decl.univ_constraints)
        .into_iter()
        .filter(|v| exist.contains(v))
        .collect();
    subject.quantifier(QuantScope::ExistentialInUniversal, exist_in_universal, errors);
}

fn check_ctor(classes: &ClassTable, decl: &CtorDecl, errors: &mut Vec<CheckError>) {
    let subject = Subject { describe: decl.describe(), varset: &decl.varset, loc: &decl.loc };
    let exist: BTreeSet<TyVar> = decl.exist_vars.iter().copied().collect();

    let mut roots = type_vars(&decl.arg_types);
    roots.extend(decl.exist_vars.iter().copied());
    subject.ambiguity(classes, &decl.constraints, roots, errors);

    let universal = constraint_vars(&decl.constraints)
        .into_iter()
        .filter(|v| !exist.contains(v))
        .collect();
    subject.quantifier(QuantScope::UniversalInExistential, universal, errors);
}

/// Check every constrained declaration selected by `filter`.
#[instrument(level = "debug", skip_all, fields(preds = decls.preds.len(), ctors = decls.ctors.len()))]
pub fn check_ambiguity(
    classes: &ClassTable,
    decls: &DeclTable,
    filter: &dyn NeedsAmbiguityCheck,
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    let mut checked = 0usize;
    for decl in &decls.preds {
        if decl.has_constraints() && filter.check_pred(decl) {
            checked += 1;
            check_pred(classes, decl, &mut errors);
        }
    }
    for decl in &decls.ctors {
        if !decl.constraints.is_empty() && filter.check_ctor(decl) {
            checked += 1;
            check_ctor(classes, decl, &mut errors);
        }
    }
    debug!(checked, errors = errors.len(), "ambiguity check finished");
    errors
}
