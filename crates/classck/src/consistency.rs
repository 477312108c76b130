//! Pairwise consistency of instances with respect to functional
//! dependencies, and the combined coverage/consistency entry point.

use tracing::{debug, instrument, trace};

use crate::class::{ClassDef, ClassTable, FunDep, InstanceDef, InstanceTable};
use crate::coverage::check_coverage;
use crate::error::CheckError;
use crate::ty::Ty;
use crate::unify::Unifier;

/// Which of the two instance checks to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunDepChecks {
    pub coverage: bool,
    pub consistency: bool,
}

impl Default for FunDepChecks {
    fn default() -> Self {
        FunDepChecks { coverage: true, consistency: true }
    }
}

/// Instances imported from the same module were checked together when that
/// module was compiled.
fn already_checked(a: &InstanceDef, b: &InstanceDef) -> bool {
    match (a.origin_module(), b.origin_module()) {
        (Some(ma), Some(mb)) => ma == mb,
        _ => false,
    }
}

/// Whether `a` and `b` agree on `fundep`: if their domains unify, the
/// ranges must be identical under the unifier.
fn consistent(a: &InstanceDef, b: &InstanceDef, fundep: &FunDep) -> bool {
    let mut merged = a.varset.clone();
    let offset = merged.append(&b.varset);
    let b_types: Vec<Ty> = b.types.iter().map(|t| t.shift(offset)).collect();

    let mut unifier = Unifier::new(merged.len());
    if unifier
        .unify_lists(&fundep.domain_types(&a.types), &fundep.domain_types(&b_types))
        .is_err()
    {
        return true;
    }
    let range_a = unifier.resolve_all(&fundep.range_types(&a.types));
    let range_b = unifier.resolve_all(&fundep.range_types(&b_types));
    range_a == range_b
}

fn check_class(class: &ClassDef, insts: &[InstanceDef], errors: &mut Vec<CheckError>) -> usize {
    let mut pairs = 0;
    for (i, a) in insts.iter().enumerate() {
        for b in &insts[i + 1..] {
            if already_checked(a, b) {
                continue;
            }
            pairs += 1;
            for fundep in &class.fundeps {
                if !consistent(a, b, fundep) {
                    trace!(first = %a.head(), second = %b.head(), "inconsistent pair");
                    errors.push(CheckError::InconsistentFunctionalDependency {
                        class: class.id.clone(),
                        fundep: fundep.display(class).to_string(),
                        first: a.head(),
                        second: b.head(),
                        first_loc: a.loc.clone(),
                        second_loc: b.loc.clone(),
                    });
                }
            }
        }
    }
    pairs
}

/// Check every pair of instances of each class for consistency.
#[instrument(level = "debug", skip_all, fields(instances = instances.len()))]
pub fn check_consistency(classes: &ClassTable, instances: &InstanceTable) -> Vec<CheckError> {
    let mut errors = Vec::new();
    let mut pairs = 0;
    for (class_id, insts) in instances.iter() {
        match classes.get(class_id) {
            Some(class) if class.has_fundeps() => pairs += check_class(class, insts, &mut errors),
            _ => {}
        }
    }
    debug!(pairs, errors = errors.len(), "consistency check finished");
    errors
}

/// Coverage of each instance, then consistency of each pair.
///
/// `instances` should be the canonical table produced by selection.
pub fn check_coverage_and_consistency(
    classes: &ClassTable,
    instances: &InstanceTable,
    checks: FunDepChecks,
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    if checks.coverage {
        errors.extend(check_coverage(classes, instances));
    }
    if checks.consistency {
        errors.extend(check_consistency(classes, instances));
    }
    errors
}
