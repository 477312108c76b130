//! Diagnostics produced by the instance checker.
//!
//! Every pass returns a `Vec<CheckError>` and keeps going after a problem, so
//! one run reports everything it can. Each variant knows its severity, the
//! phase that produced it and a stable error code; the driver uses the phase
//! to decide which later checks to skip.

use std::fmt;

use classck_common::SourceLoc;
use serde::Serialize;

use crate::class::ClassId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// The pass that produced a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Ancestors,
    Shape,
    Selection,
    Coverage,
    Consistency,
    Ambiguity,
}

/// Where a reference to an unknown class was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefSite {
    Superclass,
    InstanceHead,
    InstanceConstraint,
    Declaration,
}

impl fmt::Display for RefSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSite::Superclass => write!(f, "superclass constraint"),
            RefSite::InstanceHead => write!(f, "instance declaration"),
            RefSite::InstanceConstraint => write!(f, "instance constraint"),
            RefSite::Declaration => write!(f, "declaration constraint"),
        }
    }
}

/// Which way a quantifier scope was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantScope {
    /// A universally quantified variable occurs in an existential constraint.
    UniversalInExistential,
    /// An existentially quantified variable occurs in a universal constraint.
    ExistentialInUniversal,
}

/// A diagnostic produced by one of the checking passes.
#[derive(Clone, Debug, PartialEq)]
pub enum CheckError {
    /// The superclass hierarchy contains a cycle. `path` starts and ends at
    /// the same class.
    Cycle { path: Vec<ClassId>, loc: SourceLoc },
    /// An instance argument is not a constructor applied to distinct
    /// variables (or a permitted bare variable).
    BadInstanceShape {
        class: ClassId,
        head: String,
        position: usize,
        reason: String,
        loc: SourceLoc,
    },
    /// A second concrete instance for the same type vector.
    DuplicateConcreteInstance {
        class: ClassId,
        head: String,
        loc: SourceLoc,
        first_loc: SourceLoc,
    },
    /// A second local abstract instance for the same type vector.
    DuplicateAbstractInstance {
        class: ClassId,
        head: String,
        loc: SourceLoc,
        first_loc: SourceLoc,
    },
    /// The abstract and concrete declarations of one instance disagree on
    /// their constraints.
    AbstractConcreteMismatch {
        class: ClassId,
        head: String,
        concrete_loc: SourceLoc,
        abstract_loc: SourceLoc,
    },
    /// A local abstract instance with no concrete definition anywhere.
    MissingConcreteForAbstract { class: ClassId, head: String, loc: SourceLoc },
    /// A local instance re-declares one that is visible from another module.
    LocalNonlocalClash {
        class: ClassId,
        head: String,
        local_loc: SourceLoc,
        nonlocal_loc: SourceLoc,
        module: String,
    },
    /// Two canonical instances with different type vectors overlap. Signals
    /// a defect in instance grouping, not a user error.
    OverlapAssertionFailure {
        class: ClassId,
        first: String,
        second: String,
        first_loc: SourceLoc,
        second_loc: SourceLoc,
    },
    /// Range variables of an instance not determined by its domain.
    UncoveredFunctionalDependency {
        class: ClassId,
        head: String,
        vars: Vec<String>,
        loc: SourceLoc,
    },
    /// Two instances agree on a dependency's domain but not its range.
    InconsistentFunctionalDependency {
        class: ClassId,
        fundep: String,
        first: String,
        second: String,
        first_loc: SourceLoc,
        second_loc: SourceLoc,
    },
    /// A constraint names a class that does not exist.
    UnknownClassReference { class: ClassId, site: RefSite, loc: SourceLoc },
    /// Constrained variables not determined by the declaration's arguments.
    AmbiguousConstrainedVariable { decl: String, vars: Vec<String>, loc: SourceLoc },
    /// Variables constrained under the wrong quantifier.
    BadQuantifierScope {
        decl: String,
        scope: QuantScope,
        vars: Vec<String>,
        loc: SourceLoc,
    },
}

impl CheckError {
    pub fn severity(&self) -> Severity {
        match self {
            CheckError::DuplicateAbstractInstance { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            CheckError::Cycle { .. } => Phase::Ancestors,
            CheckError::BadInstanceShape { .. } => Phase::Shape,
            CheckError::DuplicateConcreteInstance { .. }
            | CheckError::DuplicateAbstractInstance { .. }
            | CheckError::AbstractConcreteMismatch { .. }
            | CheckError::MissingConcreteForAbstract { .. }
            | CheckError::LocalNonlocalClash { .. }
            | CheckError::OverlapAssertionFailure { .. } => Phase::Selection,
            CheckError::UncoveredFunctionalDependency { .. } => Phase::Coverage,
            CheckError::InconsistentFunctionalDependency { .. } => Phase::Consistency,
            CheckError::UnknownClassReference { site, .. } => match site {
                RefSite::Superclass => Phase::Ancestors,
                RefSite::InstanceHead => Phase::Shape,
                RefSite::InstanceConstraint => Phase::Coverage,
                RefSite::Declaration => Phase::Ambiguity,
            },
            CheckError::AmbiguousConstrainedVariable { .. }
            | CheckError::BadQuantifierScope { .. } => Phase::Ambiguity,
        }
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            CheckError::Cycle { .. } => "E0101",
            CheckError::BadInstanceShape { .. } => "E0102",
            CheckError::DuplicateConcreteInstance { .. } => "E0103",
            CheckError::DuplicateAbstractInstance { .. } => "W0101",
            CheckError::AbstractConcreteMismatch { .. } => "E0104",
            CheckError::MissingConcreteForAbstract { .. } => "E0105",
            CheckError::LocalNonlocalClash { .. } => "E0106",
            CheckError::OverlapAssertionFailure { .. } => "E0199",
            CheckError::UncoveredFunctionalDependency { .. } => "E0107",
            CheckError::InconsistentFunctionalDependency { .. } => "E0108",
            CheckError::UnknownClassReference { .. } => "E0109",
            CheckError::AmbiguousConstrainedVariable { .. } => "E0110",
            CheckError::BadQuantifierScope { .. } => "E0111",
        }
    }

    /// True for diagnostics that indicate a checker defect; the driver
    /// reports these as internal compiler errors.
    pub fn is_internal(&self) -> bool {
        matches!(self, CheckError::OverlapAssertionFailure { .. })
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// The location the diagnostic is reported at.
    pub fn loc(&self) -> &SourceLoc {
        match self {
            CheckError::Cycle { loc, .. }
            | CheckError::BadInstanceShape { loc, .. }
            | CheckError::DuplicateConcreteInstance { loc, .. }
            | CheckError::DuplicateAbstractInstance { loc, .. }
            | CheckError::MissingConcreteForAbstract { loc, .. }
            | CheckError::UncoveredFunctionalDependency { loc, .. }
            | CheckError::UnknownClassReference { loc, .. }
            | CheckError::AmbiguousConstrainedVariable { loc, .. }
            | CheckError::BadQuantifierScope { loc, .. } => loc,
            CheckError::AbstractConcreteMismatch { concrete_loc, .. } => concrete_loc,
            CheckError::LocalNonlocalClash { local_loc, .. } => local_loc,
            CheckError::OverlapAssertionFailure { second_loc, .. }
            | CheckError::InconsistentFunctionalDependency { second_loc, .. } => second_loc,
        }
    }

    /// Secondary locations with a short label each.
    pub fn related(&self) -> Vec<(&SourceLoc, &'static str)> {
        match self {
            CheckError::DuplicateConcreteInstance { first_loc, .. }
            | CheckError::DuplicateAbstractInstance { first_loc, .. } => {
                vec![(first_loc, "first declared here")]
            }
            CheckError::AbstractConcreteMismatch { abstract_loc, .. } => {
                vec![(abstract_loc, "abstract declaration here")]
            }
            CheckError::LocalNonlocalClash { nonlocal_loc, .. } => {
                vec![(nonlocal_loc, "visible instance declared here")]
            }
            CheckError::OverlapAssertionFailure { first_loc, .. }
            | CheckError::InconsistentFunctionalDependency { first_loc, .. } => {
                vec![(first_loc, "conflicting instance here")]
            }
            _ => Vec::new(),
        }
    }
}

fn join_vars(vars: &[String]) -> String {
    vars.iter().map(|v| format!("`{}`", v)).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::Cycle { path, .. } => {
                let names: Vec<String> = path.iter().map(|c| c.to_string()).collect();
                write!(f, "cyclic superclass relation: {}", names.join(" <= "))
            }
            CheckError::BadInstanceShape { head, position, reason, .. } => {
                write!(
                    f,
                    "instance `{}`: argument {} {}",
                    head,
                    position + 1,
                    reason
                )
            }
            CheckError::DuplicateConcreteInstance { head, first_loc, .. } => {
                write!(
                    f,
                    "duplicate instance declaration for `{}` (first declared at {})",
                    head, first_loc
                )
            }
            CheckError::DuplicateAbstractInstance { head, first_loc, .. } => {
                write!(
                    f,
                    "abstract instance `{}` is declared more than once (first at {})",
                    head, first_loc
                )
            }
            CheckError::AbstractConcreteMismatch { head, abstract_loc, .. } => {
                write!(
                    f,
                    "constraints on instance `{}` differ from its abstract declaration at {}",
                    head, abstract_loc
                )
            }
            CheckError::MissingConcreteForAbstract { head, .. } => {
                write!(f, "abstract instance `{}` has no corresponding definition", head)
            }
            CheckError::LocalNonlocalClash { head, nonlocal_loc, module, .. } => {
                write!(
                    f,
                    "instance `{}` is already visible from module `{}` ({})",
                    head, module, nonlocal_loc
                )
            }
            CheckError::OverlapAssertionFailure { first, second, .. } => {
                write!(
                    f,
                    "internal error: instances `{}` and `{}` overlap but were grouped apart",
                    first, second
                )
            }
            CheckError::UncoveredFunctionalDependency { head, vars, .. } => {
                write!(
                    f,
                    "instance `{}` does not satisfy its functional dependencies: {} not determined",
                    head,
                    join_vars(vars)
                )
            }
            CheckError::InconsistentFunctionalDependency {
                class,
                fundep,
                first,
                second,
                first_loc,
                ..
            } => {
                write!(
                    f,
                    "instances `{}` and `{}` ({}) are inconsistent with functional dependency {} of class `{}`",
                    second, first, first_loc, fundep, class
                )
            }
            CheckError::UnknownClassReference { class, site, .. } => {
                write!(f, "{} refers to unknown class `{}`", site, class)
            }
            CheckError::AmbiguousConstrainedVariable { decl, vars, .. } => {
                write!(
                    f,
                    "{} has ambiguous constrained type variable(s) {}",
                    decl,
                    join_vars(vars)
                )
            }
            CheckError::BadQuantifierScope { decl, scope, vars, .. } => match scope {
                QuantScope::UniversalInExistential => write!(
                    f,
                    "{}: universally quantified {} in existential constraint",
                    decl,
                    join_vars(vars)
                ),
                QuantScope::ExistentialInUniversal => write!(
                    f,
                    "{}: existentially quantified {} in universal constraint",
                    decl,
                    join_vars(vars)
                ),
            },
        }
    }
}
