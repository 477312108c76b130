//! Canonical instance selection.
//!
//! Instances of a class are bucketed by their standardised type vector. Each
//! bucket is split by visibility and body kind, duplicates inside each part
//! are reported, abstract declarations are checked against their concrete
//! definitions, and one winner is kept:
//!
//! 1. a local concrete instance,
//! 2. else a nonlocal concrete instance,
//! 3. else a local abstract instance,
//! 4. else a nonlocal abstract instance.
//!
//! A bucket holding both local and nonlocal declarations is always a clash.
//! Finally the winners of different buckets are checked pairwise for
//! overlap, which would mean the bucketing itself is wrong. Vectors with a
//! bare range variable are left out; the consistency check judges those.

use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace};

use crate::class::{ClassId, Constraint, InstanceDef, InstanceTable};
use crate::error::CheckError;
use crate::ty::{standardize, Standardizer, Ty};
use crate::unify::subsumes;

/// Knobs for instance selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectOptions {
    /// Warn about repeated local abstract declarations.
    pub warn_duplicate_abstract: bool,
    /// Run the pairwise overlap cross-check on the winners.
    pub overlap_assertion: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        SelectOptions { warn_duplicate_abstract: true, overlap_assertion: true }
    }
}

/// The four parts of one bucket, each sorted by source location.
#[derive(Default)]
struct Parts<'a> {
    local_concrete: Vec<&'a InstanceDef>,
    local_abstract: Vec<&'a InstanceDef>,
    nonlocal_concrete: Vec<&'a InstanceDef>,
    nonlocal_abstract: Vec<&'a InstanceDef>,
}

impl<'a> Parts<'a> {
    fn new(bucket: &[&'a InstanceDef]) -> Self {
        let mut parts = Parts::default();
        for &inst in bucket {
            let part = match (inst.is_local(), inst.is_concrete()) {
                (true, true) => &mut parts.local_concrete,
                (true, false) => &mut parts.local_abstract,
                (false, true) => &mut parts.nonlocal_concrete,
                (false, false) => &mut parts.nonlocal_abstract,
            };
            part.push(inst);
        }
        for part in [
            &mut parts.local_concrete,
            &mut parts.local_abstract,
            &mut parts.nonlocal_concrete,
            &mut parts.nonlocal_abstract,
        ] {
            part.sort_by(|a, b| a.loc.cmp(&b.loc));
        }
        parts
    }
}

/// Constraints of an instance, renamed jointly with its type vector and
/// sorted, so two declarations of the same instance compare equal.
fn normalized_constraints(inst: &InstanceDef) -> Vec<Constraint> {
    let mut std = Standardizer::new();
    std.tys(&inst.types);
    let mut out: Vec<Constraint> = inst
        .constraints
        .iter()
        .map(|c| Constraint { class: c.class.clone(), args: std.tys(&c.args) })
        .collect();
    out.sort();
    out.dedup();
    out
}

fn same_constraints(a: &InstanceDef, b: &InstanceDef) -> bool {
    normalized_constraints(a) == normalized_constraints(b)
}

fn report_duplicates(
    part: &[&InstanceDef],
    concrete: bool,
    errors: &mut Vec<CheckError>,
) {
    let Some((first, rest)) = part.split_first() else {
        return;
    };
    for dup in rest {
        let class = dup.class.clone();
        let head = dup.head();
        let loc = dup.loc.clone();
        let first_loc = first.loc.clone();
        errors.push(if concrete {
            CheckError::DuplicateConcreteInstance { class, head, loc, first_loc }
        } else {
            CheckError::DuplicateAbstractInstance { class, head, loc, first_loc }
        });
    }
}

/// Check an abstract declaration against the concrete one of the same
/// visibility. Returns the abstract location when they agree.
fn cross_check(
    concrete: &[&InstanceDef],
    abstract_: &[&InstanceDef],
    errors: &mut Vec<CheckError>,
) -> Option<classck_common::SourceLoc> {
    let (&[c], Some(a)) = (concrete, abstract_.first()) else {
        return None;
    };
    if same_constraints(c, a) {
        Some(a.loc.clone())
    } else {
        errors.push(CheckError::AbstractConcreteMismatch {
            class: c.class.clone(),
            head: c.head(),
            concrete_loc: c.loc.clone(),
            abstract_loc: a.loc.clone(),
        });
        None
    }
}

fn select_bucket(
    bucket: &[&InstanceDef],
    opts: SelectOptions,
    errors: &mut Vec<CheckError>,
) -> Option<InstanceDef> {
    let parts = Parts::new(bucket);

    report_duplicates(&parts.local_concrete, true, errors);
    report_duplicates(&parts.nonlocal_concrete, true, errors);
    if opts.warn_duplicate_abstract {
        report_duplicates(&parts.local_abstract, false, errors);
    }

    let local_abstract_loc = cross_check(&parts.local_concrete, &parts.local_abstract, errors);
    let nonlocal_abstract_loc =
        cross_check(&parts.nonlocal_concrete, &parts.nonlocal_abstract, errors);

    let local = parts.local_concrete.first().or(parts.local_abstract.first()).copied();
    let nonlocal = parts.nonlocal_concrete.first().or(parts.nonlocal_abstract.first()).copied();

    if let Some(abs) = parts.local_abstract.first() {
        if parts.local_concrete.is_empty() && parts.nonlocal_concrete.is_empty() {
            errors.push(CheckError::MissingConcreteForAbstract {
                class: abs.class.clone(),
                head: abs.head(),
                loc: abs.loc.clone(),
            });
        }
    }

    if let (Some(l), Some(n)) = (local, nonlocal) {
        errors.push(CheckError::LocalNonlocalClash {
            class: l.class.clone(),
            head: l.head(),
            local_loc: l.loc.clone(),
            nonlocal_loc: n.loc.clone(),
            module: n.origin_module().unwrap_or_default().to_string(),
        });
    }

    let (winner, abstract_loc) = if let Some(&c) = parts.local_concrete.first() {
        (c, local_abstract_loc)
    } else if let Some(&c) = parts.nonlocal_concrete.first() {
        (c, nonlocal_abstract_loc)
    } else {
        (local.or(nonlocal)?, None)
    };

    let mut winner = winner.clone();
    if abstract_loc.is_some() {
        winner.abstract_loc = abstract_loc;
    }
    trace!(head = %winner.head(), loc = %winner.loc, candidates = bucket.len(), "bucket winner");
    Some(winner)
}

/// Whether some argument is a bare variable. Such vectors only pass the
/// shape check under a functional dependency, and their overlaps with other
/// instances are judged by the consistency check.
fn has_bare_var(types: &[Ty]) -> bool {
    types.iter().any(|t| matches!(t, Ty::Var(_)))
}

fn check_overlaps(winners: &[InstanceDef], errors: &mut Vec<CheckError>) {
    for (i, a) in winners.iter().enumerate() {
        for b in &winners[i + 1..] {
            if has_bare_var(&a.types) || has_bare_var(&b.types) {
                continue;
            }
            let mut merged = a.varset.clone();
            let offset = merged.append(&b.varset);
            let b_types: Vec<Ty> = b.types.iter().map(|t| t.shift(offset)).collect();
            if subsumes(&a.types, &b_types) || subsumes(&b_types, &a.types) {
                errors.push(CheckError::OverlapAssertionFailure {
                    class: a.class.clone(),
                    first: a.head(),
                    second: b.head(),
                    first_loc: a.loc.clone(),
                    second_loc: b.loc.clone(),
                });
            }
        }
    }
}

/// Select the canonical instances of one class.
///
/// Winners are returned in the order their buckets were first seen.
pub fn select_class(
    class: &ClassId,
    instances: &[InstanceDef],
    opts: SelectOptions,
) -> (Vec<InstanceDef>, Vec<CheckError>) {
    let mut errors = Vec::new();

    let mut bucket_index: FxHashMap<Vec<Ty>, usize> = FxHashMap::default();
    let mut buckets: Vec<Vec<&InstanceDef>> = Vec::new();
    for inst in instances {
        let key = standardize(&inst.types);
        let idx = *bucket_index.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[idx].push(inst);
    }

    let winners: Vec<InstanceDef> = buckets
        .iter()
        .filter_map(|bucket| select_bucket(bucket, opts, &mut errors))
        .collect();

    if opts.overlap_assertion {
        check_overlaps(&winners, &mut errors);
    }

    debug!(class = %class, instances = instances.len(), buckets = buckets.len(), "selected");
    (winners, errors)
}

/// Select canonical instances for every class in the table.
#[instrument(level = "debug", skip_all, fields(instances = instances.len()))]
pub fn select(instances: &InstanceTable, opts: SelectOptions) -> (InstanceTable, Vec<CheckError>) {
    let mut canonical = InstanceTable::new();
    let mut errors = Vec::new();
    for (class, insts) in instances.iter() {
        let (winners, errs) = select_class(class, insts, opts);
        canonical.set(class.clone(), winners);
        errors.extend(errs);
    }
    (canonical, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{InstanceBody, MethodImpl, Visibility};
    use crate::syntax::parse_constraint;
    use crate::ty::VarSet;
    use classck_common::SourceLoc;

    fn inst(head: &str, constraints: &[&str], concrete: bool, module: Option<&str>, line: u32) -> InstanceDef {
        let mut varset = VarSet::new();
        let c = parse_constraint(head, &mut varset).unwrap();
        let constraints = constraints
            .iter()
            .map(|s| parse_constraint(s, &mut varset).unwrap())
            .collect();
        InstanceDef {
            class: c.class,
            original_types: c.args.clone(),
            types: c.args,
            constraints,
            varset,
            body: if concrete {
                InstanceBody::Concrete(vec![MethodImpl { name: "m".into(), arity: 1 }])
            } else {
                InstanceBody::Abstract
            },
            visibility: match module {
                Some(m) => Visibility::Imported(m.to_string()),
                None => Visibility::Local,
            },
            loc: SourceLoc::new("t.m", line),
            abstract_loc: None,
        }
    }

    fn run(insts: Vec<InstanceDef>) -> (Vec<InstanceDef>, Vec<CheckError>) {
        let class = insts[0].class.clone();
        select_class(&class, &insts, SelectOptions::default())
    }

    fn codes(errors: &[CheckError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.code()).collect()
    }

    #[test]
    fn distinct_vectors_all_survive() {
        let (winners, errors) = run(vec![
            inst("c(int)", &[], true, None, 1),
            inst("c(list(T))", &[], true, None, 2),
            inst("c(string)", &[], true, Some("lib"), 3),
        ]);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(winners.len(), 3);
    }

    #[test]
    fn spelling_does_not_split_buckets() {
        let (winners, errors) = run(vec![
            inst("c(pair(A, B))", &[], true, None, 1),
            inst("c(pair(X, Y))", &[], true, None, 7),
        ]);
        assert_eq!(winners.len(), 1);
        assert_eq!(codes(&errors), vec!["E0103"]);
    }

    #[test]
    fn duplicate_concrete_reports_later_ones_against_earliest() {
        let (winners, errors) = run(vec![
            inst("c(int)", &[], true, None, 9),
            inst("c(int)", &[], true, None, 3),
            inst("c(int)", &[], true, None, 5),
        ]);
        assert_eq!(winners[0].loc.line, 3);
        assert_eq!(errors.len(), 2);
        for e in &errors {
            match e {
                CheckError::DuplicateConcreteInstance { first_loc, .. } => assert_eq!(first_loc.line, 3),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn duplicate_abstract_local_warns_imported_does_not() {
        let (_, errors) = run(vec![
            inst("c(int)", &[], false, None, 1),
            inst("c(int)", &[], false, None, 2),
            inst("c(int)", &[], true, None, 3),
        ]);
        assert_eq!(codes(&errors), vec!["W0101"]);

        let (_, errors) = run(vec![
            inst("c(int)", &[], false, Some("lib"), 1),
            inst("c(int)", &[], false, Some("lib"), 2),
        ]);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn duplicate_abstract_warning_can_be_disabled() {
        let insts = vec![
            inst("c(int)", &[], false, None, 1),
            inst("c(int)", &[], false, None, 2),
            inst("c(int)", &[], true, None, 3),
        ];
        let opts = SelectOptions { warn_duplicate_abstract: false, ..SelectOptions::default() };
        let (_, errors) = select_class(&insts[0].class.clone(), &insts, opts);
        assert!(errors.is_empty());
    }

    #[test]
    fn abstract_concrete_agreement_annotates_winner() {
        let (winners, errors) = run(vec![
            inst("c(list(T))", &["show(T)", "eq(T)"], false, None, 2),
            inst("c(list(U))", &["eq(U)", "show(U)"], true, None, 10),
        ]);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(winners.len(), 1);
        assert!(winners[0].is_concrete());
        assert_eq!(winners[0].abstract_loc, Some(SourceLoc::new("t.m", 2)));
    }

    #[test]
    fn abstract_concrete_mismatch() {
        let (_, errors) = run(vec![
            inst("c(list(T))", &["show(T)"], false, None, 2),
            inst("c(list(T))", &["eq(T)"], true, None, 10),
        ]);
        assert_eq!(codes(&errors), vec!["E0104"]);
    }

    #[test]
    fn imported_abstract_concrete_mismatch() {
        let (winners, errors) = run(vec![
            inst("c(list(T))", &["show(T)"], false, Some("lib"), 2),
            inst("c(list(T))", &["eq(T)"], true, Some("lib"), 10),
        ]);
        match &errors[..] {
            [CheckError::AbstractConcreteMismatch { concrete_loc, abstract_loc, .. }] => {
                assert_eq!(concrete_loc.line, 10);
                assert_eq!(abstract_loc.line, 2);
            }
            other => panic!("expected one mismatch, got {:?}", other),
        }
        assert_eq!(winners[0].abstract_loc, None);
    }

    #[test]
    fn imported_concrete_winner_records_abstract_location() {
        let (winners, errors) = run(vec![
            inst("c(list(T))", &["eq(T)"], true, Some("lib"), 30),
            inst("c(list(U))", &["eq(U)"], false, Some("lib"), 4),
        ]);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].origin_module(), Some("lib"));
        assert!(winners[0].is_concrete());
        assert_eq!(winners[0].abstract_loc, Some(SourceLoc::new("t.m", 4)));
    }

    #[test]
    fn mismatch_not_checked_when_concrete_duplicated() {
        let (_, errors) = run(vec![
            inst("c(list(T))", &["show(T)"], false, None, 2),
            inst("c(list(T))", &["eq(T)"], true, None, 10),
            inst("c(list(T))", &["eq(T)"], true, None, 12),
        ]);
        assert_eq!(codes(&errors), vec!["E0103"]);
    }

    #[test]
    fn local_abstract_without_concrete() {
        let (winners, errors) = run(vec![inst("c(int)", &[], false, None, 4)]);
        assert_eq!(codes(&errors), vec!["E0105"]);
        assert_eq!(winners.len(), 1);
    }

    #[test]
    fn nonlocal_abstract_without_concrete_is_fine() {
        let (winners, errors) = run(vec![inst("c(int)", &[], false, Some("lib"), 4)]);
        assert!(errors.is_empty());
        assert!(!winners[0].is_concrete());
    }

    #[test]
    fn nonlocal_concrete_beats_local_abstract() {
        let (winners, errors) = run(vec![
            inst("c(int)", &[], false, None, 1),
            inst("c(int)", &[], true, Some("lib"), 20),
        ]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].origin_module(), Some("lib"));
        assert_eq!(codes(&errors), vec!["E0106"]);
    }

    #[test]
    fn local_concrete_beats_everything_and_clashes() {
        let (winners, errors) = run(vec![
            inst("c(int)", &[], true, Some("lib"), 20),
            inst("c(int)", &[], false, None, 1),
            inst("c(int)", &[], true, None, 5),
        ]);
        assert_eq!(winners.len(), 1);
        assert!(winners[0].is_local() && winners[0].is_concrete());
        match &errors[..] {
            [CheckError::LocalNonlocalClash { module, nonlocal_loc, .. }] => {
                assert_eq!(module, "lib");
                assert_eq!(nonlocal_loc.line, 20);
            }
            other => panic!("expected a clash, got {:?}", other),
        }
    }

    #[test]
    fn selection_is_idempotent() {
        let insts = vec![
            inst("c(int)", &[], true, None, 1),
            inst("c(int)", &[], true, None, 2),
            inst("c(list(T))", &["eq(T)"], false, None, 3),
            inst("c(list(T))", &["eq(T)"], true, None, 4),
            inst("c(string)", &[], false, Some("lib"), 5),
            inst("c(string)", &[], false, Some("lib"), 6),
        ];
        let class = insts[0].class.clone();
        let (first, _) = select_class(&class, &insts, SelectOptions::default());
        let (second, errors) = select_class(&class, &first, SelectOptions::default());
        assert_eq!(first, second);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn overlap_between_buckets_is_asserted() {
        // Not reachable with well-shaped instances; fed directly here.
        let (_, errors) = run(vec![
            inst("c(list(T))", &[], true, None, 1),
            inst("c(list(int))", &[], true, None, 2),
        ]);
        assert_eq!(codes(&errors), vec!["E0199"]);
        assert!(errors[0].is_internal());
    }

    #[test]
    fn bare_range_variable_overlap_is_left_to_consistency() {
        let (winners, errors) = run(vec![
            inst("c(int, X)", &[], true, None, 1),
            inst("c(int, string)", &[], true, None, 2),
        ]);
        assert_eq!(winners.len(), 2);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn select_covers_every_class() {
        let mut table = InstanceTable::new();
        table.push(inst("c(int)", &[], true, None, 1));
        table.push(inst("d(int)", &[], true, None, 2));
        table.push(inst("d(int)", &[], true, None, 3));
        let (canonical, errors) = select(&table, SelectOptions::default());
        assert_eq!(canonical.len(), 2);
        assert_eq!(errors.len(), 1);
    }
}
