//! Instance shape check.
//!
//! Later passes assume every instance argument is a constructor applied to
//! distinct variables. A bare variable is allowed only at a position that
//! some functional dependency determines and none uses as input.

use rustc_hash::FxHashSet;
use tracing::{debug, instrument};

use crate::class::{ClassDef, ClassTable, InstanceDef, InstanceTable};
use crate::error::{CheckError, RefSite};
use crate::ty::{Ty, TyVar};

fn bare_var_allowed(class: &ClassDef, position: usize) -> bool {
    let in_range = class.fundeps.iter().any(|fd| fd.range.contains(&position));
    let in_domain = class.fundeps.iter().any(|fd| fd.domain.contains(&position));
    in_range && !in_domain
}

/// Why `arg` is not a valid instance argument at `position`, if it is not.
fn argument_problem(class: &ClassDef, inst: &InstanceDef, position: usize, arg: &Ty) -> Option<String> {
    match arg {
        Ty::Var(_) if bare_var_allowed(class, position) => None,
        Ty::Var(v) => Some(format!(
            "is the type variable `{}`, which is only allowed in the range of a functional dependency",
            inst.varset.name(*v)
        )),
        Ty::App(_, args) => {
            let mut seen: FxHashSet<TyVar> = FxHashSet::default();
            for a in args {
                match a {
                    Ty::Var(v) => {
                        if !seen.insert(*v) {
                            return Some(format!(
                                "repeats the type variable `{}`",
                                inst.varset.name(*v)
                            ));
                        }
                    }
                    Ty::App(..) => {
                        return Some(format!(
                            "`{}` is not a type constructor applied to type variables",
                            arg.display(&inst.varset)
                        ));
                    }
                }
            }
            None
        }
    }
}

fn check_instance(class: &ClassDef, inst: &InstanceDef, errors: &mut Vec<CheckError>) {
    if inst.original_types.len() != class.id.arity {
        errors.push(CheckError::BadInstanceShape {
            class: inst.class.clone(),
            head: inst.head(),
            position: 0,
            reason: format!(
                "list has {} argument(s), but the class has {} parameter(s)",
                inst.original_types.len(),
                class.id.arity
            ),
            loc: inst.loc.clone(),
        });
        return;
    }
    for (position, arg) in inst.original_types.iter().enumerate() {
        if let Some(reason) = argument_problem(class, inst, position, arg) {
            errors.push(CheckError::BadInstanceShape {
                class: inst.class.clone(),
                head: inst.head(),
                position,
                reason,
                loc: inst.loc.clone(),
            });
        }
    }
}

/// Check the shape of every instance's type vector as written.
#[instrument(level = "debug", skip_all, fields(instances = instances.len()))]
pub fn check_instance_shapes(classes: &ClassTable, instances: &InstanceTable) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for (class_id, insts) in instances.iter() {
        let Some(class) = classes.get(class_id) else {
            for inst in insts {
                errors.push(CheckError::UnknownClassReference {
                    class: class_id.clone(),
                    site: RefSite::InstanceHead,
                    loc: inst.loc.clone(),
                });
            }
            continue;
        };
        for inst in insts {
            check_instance(class, inst, &mut errors);
        }
    }
    debug!(errors = errors.len(), "shape check finished");
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassId, FunDep, InstanceBody, Visibility};
    use crate::syntax::parse_constraint;
    use crate::ty::VarSet;
    use classck_common::SourceLoc;

    fn classes() -> ClassTable {
        let mut table = ClassTable::new();
        let mut vs = VarSet::new();
        let params = vec![vs.fresh_named("A"), vs.fresh_named("B")];
        table
            .insert(ClassDef {
                id: ClassId::new("c", 2),
                params,
                varset: vs,
                superclasses: Vec::new(),
                fundeps: vec![FunDep::new(vec![0], vec![1])],
                ancestors: Vec::new(),
                loc: SourceLoc::new("t.m", 1),
            })
            .unwrap();
        table
    }

    fn instance(head: &str) -> InstanceDef {
        let mut varset = VarSet::new();
        let c = parse_constraint(head, &mut varset).unwrap();
        InstanceDef {
            class: c.class,
            original_types: c.args.clone(),
            types: c.args,
            constraints: Vec::new(),
            varset,
            body: InstanceBody::Concrete(Vec::new()),
            visibility: Visibility::Local,
            loc: SourceLoc::new("t.m", 10),
            abstract_loc: None,
        }
    }

    fn check(heads: &[&str]) -> Vec<CheckError> {
        let mut table = InstanceTable::new();
        for h in heads {
            table.push(instance(h));
        }
        check_instance_shapes(&classes(), &table)
    }

    fn positions(errors: &[CheckError]) -> Vec<usize> {
        errors
            .iter()
            .filter_map(|e| match e {
                CheckError::BadInstanceShape { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn constructors_over_distinct_vars_are_fine() {
        assert!(check(&["c(list(T), T)", "c(map(K, V), int)", "c(int, string)"]).is_empty());
    }

    #[test]
    fn bare_var_in_domain_rejected() {
        assert_eq!(positions(&check(&["c(T, int)"])), vec![0]);
    }

    #[test]
    fn repeated_variable_rejected() {
        let errors = check(&["c(pair(T, T), int)"]);
        assert_eq!(positions(&errors), vec![0]);
        assert!(errors[0].to_string().contains("repeats the type variable `T`"));
    }

    #[test]
    fn nested_constructor_rejected() {
        assert_eq!(positions(&check(&["c(list(list(T)), int)"])), vec![0]);
    }

    #[test]
    fn one_diagnostic_per_bad_argument() {
        assert_eq!(positions(&check(&["c(X, list(int))"])), vec![0, 1]);
    }

    #[test]
    fn original_vector_length_mismatch() {
        let mut inst = instance("c(int, int)");
        inst.original_types.pop();
        let mut table = InstanceTable::new();
        table.push(inst);
        let errors = check_instance_shapes(&classes(), &table);
        assert_eq!(positions(&errors), vec![0]);
        assert!(errors[0].to_string().contains("1 argument(s)"));
    }

    #[test]
    fn unknown_class() {
        let errors = check(&["nope(int)"]);
        assert!(matches!(
            &errors[..],
            [CheckError::UnknownClassReference { site: RefSite::InstanceHead, .. }]
        ));
    }
}
