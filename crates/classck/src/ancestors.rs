//! Superclass cycle detection and ancestor-constraint resolution.
//!
//! Walks the class/superclass graph depth-first, once per class, with a path
//! of the classes currently being expanded and a shared visited set. Each
//! class ends up with the constraints of every transitive superclass that
//! carries a functional dependency (itself included when it has one),
//! expressed over its own parameters.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument, trace};

use crate::class::{ClassId, ClassTable, Constraint};
use crate::error::{CheckError, RefSite};
use crate::ty::TyVar;

/// Ancestor sets computed for every class, plus the problems found.
#[derive(Debug, Default)]
pub struct AncestorResolution {
    pub ancestors: FxHashMap<ClassId, Vec<Constraint>>,
    pub errors: Vec<CheckError>,
}

struct Walker<'a> {
    classes: &'a ClassTable,
    visited: FxHashSet<ClassId>,
    ancestors: FxHashMap<ClassId, Vec<Constraint>>,
    /// Sets of classes already reported as a cycle.
    reported: FxHashSet<BTreeSet<ClassId>>,
    errors: Vec<CheckError>,
}

impl<'a> Walker<'a> {
    /// Visit `id`, returning its parameters and ancestor set.
    ///
    /// A class revisited while it is still on `path` closes a cycle; the
    /// ancestors returned for it are whatever has been stored so far, which
    /// is empty until its own visit completes.
    fn visit(&mut self, id: &ClassId, path: &mut Vec<ClassId>) -> Option<(Vec<TyVar>, Vec<Constraint>)> {
        let class = self.classes.get(id)?;

        if self.visited.contains(id) {
            if let Some(start) = path.iter().position(|c| c == id) {
                self.report_cycle(&path[start..], id);
            }
            let cached = self.ancestors.get(id).cloned().unwrap_or_default();
            return Some((class.params.clone(), cached));
        }

        self.visited.insert(id.clone());
        path.push(id.clone());

        let mut acc = Vec::new();
        if class.has_fundeps() {
            acc.push(class.self_constraint());
        }
        for sc in &class.superclasses {
            match self.visit(&sc.class, path) {
                Some((super_params, super_ancestors)) => {
                    let subst = super_params.into_iter().zip(sc.args.iter().cloned()).collect();
                    for anc in &super_ancestors {
                        let anc = anc.apply(&subst);
                        if !acc.contains(&anc) {
                            acc.push(anc);
                        }
                    }
                }
                None => self.errors.push(CheckError::UnknownClassReference {
                    class: sc.class.clone(),
                    site: RefSite::Superclass,
                    loc: class.loc.clone(),
                }),
            }
        }

        path.pop();
        trace!(class = %id, ancestors = acc.len(), "resolved ancestors");
        self.ancestors.insert(id.clone(), acc.clone());
        Some((class.params.clone(), acc))
    }

    fn report_cycle(&mut self, segment: &[ClassId], closing: &ClassId) {
        let members: BTreeSet<ClassId> = segment.iter().cloned().collect();
        if !self.reported.insert(members) {
            return;
        }
        let mut cycle = segment.to_vec();
        cycle.push(closing.clone());
        let loc = self
            .classes
            .get(&segment[0])
            .map(|c| c.loc.clone())
            .unwrap_or_else(classck_common::SourceLoc::builtin);
        self.errors.push(CheckError::Cycle { path: cycle, loc });
    }
}

/// Compute ancestor sets for every class without modifying the table.
///
/// Classes are visited in table order. Cycles do not stop the walk; each
/// distinct cycle (by its set of classes) is reported once.
#[instrument(level = "debug", skip_all, fields(classes = classes.len()))]
pub fn compute_ancestors(classes: &ClassTable) -> AncestorResolution {
    let mut walker = Walker {
        classes,
        visited: FxHashSet::default(),
        ancestors: FxHashMap::default(),
        reported: FxHashSet::default(),
        errors: Vec::new(),
    };
    for id in classes.ids() {
        let mut path = Vec::new();
        walker.visit(id, &mut path);
    }
    debug!(cycles = walker.errors.len(), "ancestor resolution finished");
    AncestorResolution { ancestors: walker.ancestors, errors: walker.errors }
}

/// Fill in the ancestor field of every class.
pub fn resolve_ancestors(mut classes: ClassTable) -> (ClassTable, Vec<CheckError>) {
    let AncestorResolution { mut ancestors, errors } = compute_ancestors(&classes);
    let ids: Vec<ClassId> = classes.ids().cloned().collect();
    for id in ids {
        if let (Some(class), Some(anc)) = (classes.get_mut(&id), ancestors.remove(&id)) {
            class.ancestors = anc;
        }
    }
    (classes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, FunDep};
    use crate::syntax::parse_constraint;
    use crate::ty::VarSet;
    use classck_common::SourceLoc;

    /// Declare `name(params) <= supers` with optional fundeps (param index lists).
    fn class(name: &str, params: &[&str], supers: &[&str], fundeps: &[(&[usize], &[usize])]) -> ClassDef {
        let mut varset = VarSet::new();
        let params: Vec<_> = params.iter().map(|p| varset.fresh_named(*p)).collect();
        let superclasses = supers
            .iter()
            .map(|s| parse_constraint(s, &mut varset).unwrap())
            .collect();
        ClassDef {
            id: ClassId::new(name, params.len()),
            params,
            varset,
            superclasses,
            fundeps: fundeps.iter().map(|(d, r)| FunDep::new(d.to_vec(), r.to_vec())).collect(),
            ancestors: Vec::new(),
            loc: SourceLoc::new("test.m", 1),
        }
    }

    fn table(defs: Vec<ClassDef>) -> ClassTable {
        let mut t = ClassTable::new();
        for d in defs {
            t.insert(d).unwrap();
        }
        t
    }

    fn cycle_sets(errors: &[CheckError]) -> Vec<BTreeSet<String>> {
        errors
            .iter()
            .filter_map(|e| match e {
                CheckError::Cycle { path, .. } => Some(path.iter().map(|c| c.name.clone()).collect()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn class_without_fundeps_has_no_ancestors() {
        let (t, errors) = resolve_ancestors(table(vec![class("show", &["T"], &[], &[])]));
        assert!(errors.is_empty());
        assert!(t.get(&ClassId::new("show", 1)).unwrap().ancestors.is_empty());
    }

    #[test]
    fn self_ancestor_when_class_has_fundep() {
        let (t, _) = resolve_ancestors(table(vec![class("c", &["A", "B"], &[], &[(&[0], &[1])])]));
        let c = t.get(&ClassId::new("c", 2)).unwrap();
        assert_eq!(c.ancestors, vec![c.self_constraint()]);
    }

    #[test]
    fn superclass_ancestors_substituted() {
        // sub(X, Y) <= c(Y, X), where c has a fundep.
        let t = table(vec![
            class("c", &["A", "B"], &[], &[(&[0], &[1])]),
            class("sub", &["X", "Y"], &["c(Y, X)"], &[]),
        ]);
        let (t, errors) = resolve_ancestors(t);
        assert!(errors.is_empty());
        let sub = t.get(&ClassId::new("sub", 2)).unwrap();
        let mut vs = sub.varset.clone();
        assert_eq!(sub.ancestors, vec![parse_constraint("c(Y, X)", &mut vs).unwrap()]);
    }

    #[test]
    fn diamond_is_union_deduplicated() {
        // d <= b, c; b <= a; c <= a; only a has a fundep.
        let t = table(vec![
            class("d", &["T", "U"], &["b(T, U)", "c(T, U)"], &[]),
            class("b", &["T", "U"], &["a(T, U)"], &[]),
            class("c", &["T", "U"], &["a(T, U)"], &[]),
            class("a", &["T", "U"], &[], &[(&[0], &[1])]),
        ]);
        let (t, errors) = resolve_ancestors(t);
        assert!(errors.is_empty(), "diamond is not a cycle: {:?}", errors);
        let d = t.get(&ClassId::new("d", 2)).unwrap();
        assert_eq!(d.ancestors.len(), 1);
        assert_eq!(d.ancestors[0].class, ClassId::new("a", 2));
    }

    #[test]
    fn diamond_with_different_instantiations_keeps_both() {
        let t = table(vec![
            class("d", &["T", "U"], &["b(T, U)", "c(T, U)"], &[]),
            class("b", &["T", "U"], &["a(T, U)"], &[]),
            class("c", &["T", "U"], &["a(U, T)"], &[]),
            class("a", &["T", "U"], &[], &[(&[0], &[1])]),
        ]);
        let (t, _) = resolve_ancestors(t);
        let d = t.get(&ClassId::new("d", 2)).unwrap();
        let mut vs = d.varset.clone();
        assert_eq!(
            d.ancestors,
            vec![
                parse_constraint("a(T, U)", &mut vs).unwrap(),
                parse_constraint("a(U, T)", &mut vs).unwrap(),
            ]
        );
    }

    #[test]
    fn cycle_reported_once_regardless_of_start() {
        for order in [["a", "b", "c"], ["b", "c", "a"], ["c", "a", "b"]] {
            let defs = order
                .iter()
                .map(|name| {
                    let sup = match *name {
                        "a" => "b(T)",
                        "b" => "c(T)",
                        _ => "a(T)",
                    };
                    class(name, &["T"], &[sup], &[])
                })
                .collect();
            let res = compute_ancestors(&table(defs));
            let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
            assert_eq!(cycle_sets(&res.errors), vec![expected]);
        }
    }

    #[test]
    fn cycle_path_is_closed() {
        let res = compute_ancestors(&table(vec![
            class("a", &["T"], &["b(T)"], &[]),
            class("b", &["T"], &["a(T)"], &[]),
        ]));
        match &res.errors[..] {
            [CheckError::Cycle { path, .. }] => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected one cycle, got {:?}", other),
        }
    }

    #[test]
    fn self_cycle() {
        let res = compute_ancestors(&table(vec![class("a", &["T"], &["a(T)"], &[])]));
        assert_eq!(cycle_sets(&res.errors).len(), 1);
    }

    #[test]
    fn non_cyclic_classes_still_resolved_next_to_cycle() {
        let t = table(vec![
            class("a", &["T"], &["b(T)"], &[]),
            class("b", &["T"], &["a(T)"], &[]),
            class("f", &["A", "B"], &[], &[(&[0], &[1])]),
            class("g", &["A", "B"], &["f(A, B)"], &[]),
        ]);
        let (t, errors) = resolve_ancestors(t);
        assert_eq!(errors.len(), 1);
        assert_eq!(t.get(&ClassId::new("g", 2)).unwrap().ancestors.len(), 1);
    }

    #[test]
    fn unknown_superclass_reported() {
        let res = compute_ancestors(&table(vec![class("a", &["T"], &["missing(T)"], &[])]));
        assert!(matches!(
            &res.errors[..],
            [CheckError::UnknownClassReference { site: RefSite::Superclass, .. }]
        ));
    }
}
