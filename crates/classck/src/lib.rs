//! classck: type-class instance checking with functional dependencies.
//!
//! Given a whole program's class and instance declarations, this crate
//! resolves superclass ancestry, selects one canonical instance per type
//! vector, checks that instances cover and agree with the functional
//! dependencies of their classes, and finds ambiguous constrained type
//! variables in predicate, function and constructor declarations.
//!
//! # Architecture
//!
//! - [`ty`]: Type terms, variable scopes, renaming apart, standardisation
//! - [`class`]: Constraints, functional dependencies, class/instance tables
//! - [`decl`]: Constrained predicate, function and constructor declarations
//! - [`unify`]: ena-backed unification and one-way matching
//! - [`ancestors`]: Superclass cycle detection and ancestor resolution
//! - [`closure`]: Functional-dependency closure
//! - [`shape`]: Instance argument shape check
//! - [`select`]: Canonical instance selection
//! - [`coverage`], [`consistency`]: Per-instance and pairwise dependency checks
//! - [`ambiguity`]: Ambiguity and quantifier checks for declarations
//! - [`error`], [`diagnostics`]: Diagnostic taxonomy and rendering
//! - [`syntax`], [`program`], [`config`]: Inputs: term syntax, snapshots, settings

pub mod ambiguity;
pub mod ancestors;
pub mod class;
pub mod closure;
pub mod config;
pub mod consistency;
pub mod coverage;
pub mod decl;
pub mod diagnostics;
pub mod error;
pub mod program;
pub mod select;
pub mod shape;
pub mod syntax;
pub mod ty;
pub mod unify;

use rustc_hash::FxHashSet;
use tracing::{info, instrument};

pub use crate::ambiguity::{check_ambiguity, NeedsAmbiguityCheck, SkipImported};
pub use crate::ancestors::resolve_ancestors;
pub use crate::class::{ClassId, ClassTable, InstanceTable};
pub use crate::config::CheckConfig;
pub use crate::consistency::check_coverage_and_consistency;
pub use crate::error::{CheckError, Phase, Severity};
pub use crate::program::{LoadError, Program, ProgramTables};
pub use crate::select::select;
pub use crate::shape::check_instance_shapes;

/// The result of checking a program.
#[derive(Debug)]
pub struct CheckOutput {
    /// Classes with their ancestor sets filled in.
    pub classes: ClassTable,
    /// Canonical instances. Classes whose instances failed the shape check
    /// keep their declarations unselected.
    pub instances: InstanceTable,
    /// Diagnostics in the order their stages ran.
    pub diagnostics: Vec<CheckError>,
    /// The stage after which checking stopped early, if it did.
    pub halted_after: Option<Phase>,
}

impl CheckOutput {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| !d.is_error()).count()
    }

    pub fn has_internal_error(&self) -> bool {
        self.diagnostics.iter().any(CheckError::is_internal)
    }
}

/// Run every check with the default ambiguity filter.
pub fn check_program(tables: ProgramTables, config: &CheckConfig) -> CheckOutput {
    check_program_with(tables, config, &SkipImported)
}

/// Run every check, choosing the declarations that get an ambiguity check
/// with `needs_check`.
#[instrument(level = "debug", skip_all)]
pub fn check_program_with(
    tables: ProgramTables,
    config: &CheckConfig,
    needs_check: &dyn NeedsAmbiguityCheck,
) -> CheckOutput {
    let ProgramTables { classes, instances, decls } = tables;
    let mut diagnostics = Vec::new();

    // Records a stage's diagnostics; returns the phase to halt at, if any.
    let stage = |errors: Vec<CheckError>, diagnostics: &mut Vec<CheckError>| {
        let failed = errors.iter().find(|e| e.is_error()).map(CheckError::phase);
        diagnostics.extend(errors);
        failed.filter(|_| config.halt_on_error)
    };

    let (classes, errors) = resolve_ancestors(classes);
    if let Some(phase) = stage(errors, &mut diagnostics) {
        return CheckOutput { classes, instances, diagnostics, halted_after: Some(phase) };
    }

    let shape_errors = check_instance_shapes(&classes, &instances);
    let gated: FxHashSet<ClassId> = shape_errors
        .iter()
        .filter_map(|e| match e {
            CheckError::BadInstanceShape { class, .. }
            | CheckError::UnknownClassReference { class, .. } => Some(class.clone()),
            _ => None,
        })
        .collect();
    if let Some(phase) = stage(shape_errors, &mut diagnostics) {
        return CheckOutput { classes, instances, diagnostics, halted_after: Some(phase) };
    }

    let mut checked = InstanceTable::new();
    for (class, insts) in instances.iter() {
        if !gated.contains(class) {
            checked.set(class.clone(), insts.to_vec());
        }
    }
    let (canonical, errors) = select(&checked, config.select_options());
    let halted = stage(errors, &mut diagnostics);

    // Gated classes pass through as declared.
    let mut output_instances = canonical.clone();
    for (class, insts) in instances.iter() {
        if gated.contains(class) {
            output_instances.set(class.clone(), insts.to_vec());
        }
    }
    if halted.is_some() {
        return CheckOutput { classes, instances: output_instances, diagnostics, halted_after: halted };
    }

    let errors = check_coverage_and_consistency(&classes, &canonical, config.fundep_checks());
    if let Some(phase) = stage(errors, &mut diagnostics) {
        return CheckOutput { classes, instances: output_instances, diagnostics, halted_after: Some(phase) };
    }

    if config.checks.ambiguity {
        diagnostics.extend(check_ambiguity(&classes, &decls, needs_check));
    }

    let output = CheckOutput { classes, instances: output_instances, diagnostics, halted_after: None };
    info!(
        errors = output.error_count(),
        warnings = output.warning_count(),
        "instance checking finished"
    );
    output
}
