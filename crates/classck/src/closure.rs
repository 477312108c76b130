//! Functional-dependency closure over a set of constraints.
//!
//! A constraint list induces a flat list of variable-level dependencies, one
//! per functional dependency reachable through each constraint's ancestors.
//! The closure of a root variable set is the least fixpoint of those
//! dependencies.

use std::collections::BTreeSet;

use tracing::trace;

use crate::class::{ClassId, ClassTable, Constraint};
use crate::ty::{type_vars, TyVar};

/// A dependency between type variables induced by some constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InducedFunDep {
    pub domain: BTreeSet<TyVar>,
    pub range: BTreeSet<TyVar>,
}

/// Induce the variable-level dependency graph of `constraints`.
///
/// Every class the constraints mention must be in `classes` and have its
/// ancestors resolved. Classes that are missing are returned as the error,
/// deduplicated in order of first mention.
pub fn induce_fundeps(
    classes: &ClassTable,
    constraints: &[Constraint],
) -> Result<Vec<InducedFunDep>, Vec<ClassId>> {
    let mut missing: Vec<ClassId> = Vec::new();
    let mut induced = Vec::new();

    for constraint in constraints {
        let Some(class) = classes.get(&constraint.class) else {
            if !missing.contains(&constraint.class) {
                missing.push(constraint.class.clone());
            }
            continue;
        };
        let subst = class.param_subst(&constraint.args);
        for ancestor in &class.ancestors {
            let ancestor = ancestor.apply(&subst);
            let Some(anc_class) = classes.get(&ancestor.class) else {
                if !missing.contains(&ancestor.class) {
                    missing.push(ancestor.class.clone());
                }
                continue;
            };
            for fundep in &anc_class.fundeps {
                induced.push(InducedFunDep {
                    domain: type_vars(&fundep.domain_types(&ancestor.args)).into_iter().collect(),
                    range: type_vars(&fundep.range_types(&ancestor.args)).into_iter().collect(),
                });
            }
        }
    }

    if missing.is_empty() {
        Ok(induced)
    } else {
        Err(missing)
    }
}

/// The set of variables determined by `roots` under `induced`.
pub fn closure(induced: &[InducedFunDep], roots: impl IntoIterator<Item = TyVar>) -> BTreeSet<TyVar> {
    let mut known: BTreeSet<TyVar> = roots.into_iter().collect();
    let mut pending: Vec<InducedFunDep> = induced.to_vec();

    loop {
        let mut frontier = BTreeSet::new();
        let mut remaining = Vec::with_capacity(pending.len());

        for mut dep in pending {
            dep.domain.retain(|v| !known.contains(v));
            dep.range.retain(|v| !known.contains(v));
            if dep.domain.is_empty() {
                frontier.extend(dep.range);
            } else {
                remaining.push(dep);
            }
        }

        if frontier.is_empty() {
            return known;
        }
        trace!(frontier = frontier.len(), pending = remaining.len(), "closure step");
        known.extend(frontier);
        pending = remaining;
    }
}
