//! Functional-dependency coverage of individual instances.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::class::{ClassTable, InstanceDef, InstanceTable};
use crate::closure::{closure, induce_fundeps};
use crate::error::{CheckError, RefSite};
use crate::ty::{type_vars, TyVar};

/// The range variables of `inst` that its domains do not determine, across
/// all dependencies of its class. Unknown classes in the instance
/// constraints are returned as the error.
fn uncovered_vars(
    classes: &ClassTable,
    inst: &InstanceDef,
) -> Result<BTreeSet<TyVar>, Vec<crate::class::ClassId>> {
    let mut uncovered = BTreeSet::new();
    let Some(class) = classes.get(&inst.class) else {
        return Ok(uncovered);
    };
    if !class.has_fundeps() {
        return Ok(uncovered);
    }
    let induced = induce_fundeps(classes, &inst.constraints)?;
    for fundep in &class.fundeps {
        let domain = type_vars(&fundep.domain_types(&inst.types));
        let determined = closure(&induced, domain);
        uncovered.extend(
            type_vars(&fundep.range_types(&inst.types))
                .into_iter()
                .filter(|v| !determined.contains(v)),
        );
    }
    Ok(uncovered)
}

/// Check that every instance satisfies the dependencies of its class.
///
/// Reports at most one diagnostic per instance, listing every uncovered
/// variable.
#[instrument(level = "debug", skip_all, fields(instances = instances.len()))]
pub fn check_coverage(classes: &ClassTable, instances: &InstanceTable) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for (_, insts) in instances.iter() {
        for inst in insts {
            match uncovered_vars(classes, inst) {
                Ok(vars) if vars.is_empty() => {}
                Ok(vars) => errors.push(CheckError::UncoveredFunctionalDependency {
                    class: inst.class.clone(),
                    head: inst.head(),
                    vars: vars.iter().map(|v| inst.varset.name(*v)).collect(),
                    loc: inst.loc.clone(),
                }),
                Err(missing) => {
                    errors.extend(missing.into_iter().map(|class| CheckError::UnknownClassReference {
                        class,
                        site: RefSite::InstanceConstraint,
                        loc: inst.loc.clone(),
                    }))
                }
            }
        }
    }
    debug!(errors = errors.len(), "coverage check finished");
    errors
}
