//! Whole-program snapshots and their lowering into checker tables.
//!
//! A snapshot is a JSON document written by the front end after parsing and
//! type-synonym expansion. Types and constraints appear in the textual term
//! syntax of [`crate::syntax`]; lowering parses them so that each
//! declaration's variables are numbered in order of first appearance.

use std::path::{Path, PathBuf};

use classck_common::SourceLoc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::class::{
    ClassDef, ClassId, ClassTable, Constraint, FunDep, InstanceBody, InstanceDef, InstanceTable,
    MethodImpl, Visibility,
};
use crate::decl::{CtorDecl, DeclStatus, DeclTable, PredDecl, PredKind};
use crate::syntax::{parse_constraint, parse_type, SyntaxError};
use crate::ty::{Ty, TyVar, VarSet};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed program snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    Syntax {
        context: String,
        #[source]
        source: SyntaxError,
    },
    #[error("class `{class}` is defined more than once (again at {loc})")]
    DuplicateClass { class: ClassId, loc: SourceLoc },
    #[error("class `{class}` declares parameter `{name}` more than once")]
    DuplicateParameter { class: ClassId, name: String },
    #[error("functional dependency of class `{class}` names `{name}`, which is not a class parameter")]
    UnknownParameter { class: ClassId, name: String },
    #[error("superclass constraint `{constraint}` of class `{class}` uses a variable that is not a class parameter")]
    NonParameterVariable { class: ClassId, constraint: String },
    #[error("instance `{head}` was written as `{original}`, which names a different class")]
    HeadMismatch { head: String, original: String },
}

// ── Snapshot schema ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
    pub instances: Vec<InstanceDecl>,
    pub predicates: Vec<PredicateDecl>,
    pub constructors: Vec<ConstructorDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub params: Vec<String>,
    #[serde(default)]
    pub superclasses: Vec<String>,
    #[serde(default)]
    pub fundeps: Vec<FunDepDecl>,
    #[serde(default = "SourceLoc::builtin")]
    pub loc: SourceLoc,
}

/// `domain -> range`, by parameter name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunDepDecl {
    pub domain: Vec<String>,
    pub range: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDecl {
    /// The instance head after type-synonym expansion, e.g. `c(list(T), T)`.
    pub head: String,
    /// The head as written, when it differs from `head`.
    #[serde(default)]
    pub original_head: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub body: BodyDecl,
    /// The defining module, for instances read from another module.
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default = "SourceLoc::builtin")]
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyDecl {
    Abstract,
    /// Method names, optionally suffixed with `/arity`.
    Concrete(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateDecl {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: KindDecl,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub univ_constraints: Vec<String>,
    #[serde(default)]
    pub exist_constraints: Vec<String>,
    #[serde(default)]
    pub exist_vars: Vec<String>,
    #[serde(default = "default_status")]
    pub status: StatusDecl,
    #[serde(default = "SourceLoc::builtin")]
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindDecl {
    Predicate,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusDecl {
    Local,
    Exported,
    Imported,
}

fn default_kind() -> KindDecl {
    KindDecl::Predicate
}

fn default_status() -> StatusDecl {
    StatusDecl::Local
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructorDecl {
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub exist_vars: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default = "SourceLoc::builtin")]
    pub loc: SourceLoc,
}

// ── Lowering ───────────────────────────────────────────────────────────

/// The tables the checker runs on.
#[derive(Debug, Clone, Default)]
pub struct ProgramTables {
    pub classes: ClassTable,
    pub instances: InstanceTable,
    pub decls: DeclTable,
}

fn syntax(context: impl FnOnce() -> String) -> impl FnOnce(SyntaxError) -> LoadError {
    move |source| LoadError::Syntax { context: context(), source }
}

fn parse_types(texts: &[String], varset: &mut VarSet, what: &str) -> Result<Vec<Ty>, LoadError> {
    texts
        .iter()
        .map(|t| parse_type(t, varset).map_err(syntax(|| what.to_string())))
        .collect()
}

fn parse_constraints(texts: &[String], varset: &mut VarSet, what: &str) -> Result<Vec<Constraint>, LoadError> {
    texts
        .iter()
        .map(|t| parse_constraint(t, varset).map_err(syntax(|| what.to_string())))
        .collect()
}

fn parse_method(text: &str) -> MethodImpl {
    match text.rsplit_once('/') {
        Some((name, arity)) => match arity.parse() {
            Ok(arity) => MethodImpl { name: name.to_string(), arity },
            Err(_) => MethodImpl { name: text.to_string(), arity: 0 },
        },
        None => MethodImpl { name: text.to_string(), arity: 0 },
    }
}

impl ClassDecl {
    fn lower(&self) -> Result<ClassDef, LoadError> {
        let id = ClassId::new(self.name.clone(), self.params.len());
        let mut varset = VarSet::new();
        let mut params = Vec::with_capacity(self.params.len());
        for p in &self.params {
            if varset.lookup(p).is_some() {
                return Err(LoadError::DuplicateParameter { class: id, name: p.clone() });
            }
            params.push(varset.fresh_named(p.clone()));
        }

        let mut superclasses = Vec::with_capacity(self.superclasses.len());
        for text in &self.superclasses {
            let sc = parse_constraint(text, &mut varset)
                .map_err(syntax(|| format!("superclass of class `{}`", id)))?;
            if varset.len() > params.len() {
                return Err(LoadError::NonParameterVariable { class: id, constraint: text.clone() });
            }
            superclasses.push(sc);
        }

        let position = |name: &String| -> Result<usize, LoadError> {
            self.params
                .iter()
                .position(|p| p == name)
                .ok_or_else(|| LoadError::UnknownParameter { class: id.clone(), name: name.clone() })
        };
        let mut fundeps = Vec::with_capacity(self.fundeps.len());
        for fd in &self.fundeps {
            let domain = fd.domain.iter().map(position).collect::<Result<_, _>>()?;
            let range = fd.range.iter().map(position).collect::<Result<_, _>>()?;
            fundeps.push(FunDep::new(domain, range));
        }

        Ok(ClassDef {
            id,
            params,
            varset,
            superclasses,
            fundeps,
            ancestors: Vec::new(),
            loc: self.loc.clone(),
        })
    }
}

impl InstanceDecl {
    fn lower(&self) -> Result<InstanceDef, LoadError> {
        let mut varset = VarSet::new();
        let context = || format!("instance `{}`", self.head);
        let head = parse_constraint(&self.head, &mut varset).map_err(syntax(context))?;
        let original_types = match &self.original_head {
            Some(text) => {
                let original = parse_constraint(text, &mut varset).map_err(syntax(context))?;
                if original.class.name != head.class.name {
                    return Err(LoadError::HeadMismatch { head: self.head.clone(), original: text.clone() });
                }
                original.args
            }
            None => head.args.clone(),
        };
        let constraints = parse_constraints(&self.constraints, &mut varset, &context())?;
        let body = match &self.body {
            BodyDecl::Abstract => InstanceBody::Abstract,
            BodyDecl::Concrete(methods) => {
                InstanceBody::Concrete(methods.iter().map(|m| parse_method(m)).collect())
            }
        };
        Ok(InstanceDef {
            class: head.class,
            original_types,
            types: head.args,
            constraints,
            varset,
            body,
            visibility: match &self.module {
                Some(module) => Visibility::Imported(module.clone()),
                None => Visibility::Local,
            },
            loc: self.loc.clone(),
            abstract_loc: None,
        })
    }
}

fn exist_vars(names: &[String], varset: &mut VarSet) -> Vec<TyVar> {
    names.iter().map(|n| varset.lookup_or_fresh(n)).collect()
}

impl PredicateDecl {
    fn lower(&self) -> Result<PredDecl, LoadError> {
        let mut varset = VarSet::new();
        let kind = match self.kind {
            KindDecl::Predicate => PredKind::Predicate,
            KindDecl::Function => PredKind::Function,
        };
        let what = format!("{} `{}`", kind, self.name);
        let arg_types = parse_types(&self.args, &mut varset, &what)?;
        let exist_vars = exist_vars(&self.exist_vars, &mut varset);
        let univ_constraints = parse_constraints(&self.univ_constraints, &mut varset, &what)?;
        let exist_constraints = parse_constraints(&self.exist_constraints, &mut varset, &what)?;
        Ok(PredDecl {
            name: self.name.clone(),
            kind,
            varset,
            arg_types,
            univ_constraints,
            exist_constraints,
            exist_vars,
            status: match self.status {
                StatusDecl::Local => DeclStatus::Local,
                StatusDecl::Exported => DeclStatus::Exported,
                StatusDecl::Imported => DeclStatus::Imported,
            },
            loc: self.loc.clone(),
        })
    }
}

impl ConstructorDecl {
    fn lower(&self) -> Result<CtorDecl, LoadError> {
        let mut varset = VarSet::new();
        let what = format!("constructor `{}`", self.name);
        let arg_types = parse_types(&self.args, &mut varset, &what)?;
        let exist_vars = exist_vars(&self.exist_vars, &mut varset);
        let constraints = parse_constraints(&self.constraints, &mut varset, &what)?;
        Ok(CtorDecl {
            type_name: self.type_name.clone(),
            name: self.name.clone(),
            varset,
            arg_types,
            exist_vars,
            constraints,
            loc: self.loc.clone(),
        })
    }
}

impl Program {
    /// Read a snapshot from a JSON file.
    pub fn from_file(path: &Path) -> Result<Program, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Program, LoadError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the checker tables.
    pub fn lower(&self) -> Result<ProgramTables, LoadError> {
        let mut tables = ProgramTables::default();
        for decl in &self.classes {
            let def = decl.lower()?;
            if let Err(def) = tables.classes.insert(def) {
                return Err(LoadError::DuplicateClass { class: def.id, loc: def.loc });
            }
        }
        for decl in &self.instances {
            tables.instances.push(decl.lower()?);
        }
        for decl in &self.predicates {
            tables.decls.preds.push(decl.lower()?);
        }
        for decl in &self.constructors {
            tables.decls.ctors.push(decl.lower()?);
        }
        debug!(
            classes = tables.classes.len(),
            instances = tables.instances.len(),
            preds = tables.decls.preds.len(),
            ctors = tables.decls.ctors.len(),
            "lowered program"
        );
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "classes": [
            {"name": "c", "params": ["A", "B"], "fundeps": [{"domain": ["A"], "range": ["B"]}],
             "loc": {"file": "c.m", "line": 3}},
            {"name": "d", "params": ["X", "Y"], "superclasses": ["c(Y, X)"]}
        ],
        "instances": [
            {"head": "c(list(T), T)", "constraints": ["d(T, T)"], "body": {"concrete": ["m/2", "n"]},
             "loc": {"file": "c.m", "line": 10}},
            {"head": "c(int, int)", "original_head": "c(myint, int)", "body": "abstract", "module": "lib"}
        ],
        "predicates": [
            {"name": "f", "kind": "function", "args": ["X", "Y"], "univ_constraints": ["c(X, Y)"],
             "status": "exported"}
        ],
        "constructors": [
            {"type_name": "boxed", "name": "box", "args": ["T"], "exist_vars": ["T"], "constraints": ["d(T, T)"]}
        ]
    }"#;

    #[test]
    fn lowers_full_snapshot() {
        let tables = Program::from_json(SNAPSHOT).unwrap().lower().unwrap();
        assert_eq!(tables.classes.len(), 2);
        let c = tables.classes.get(&ClassId::new("c", 2)).unwrap();
        assert_eq!(c.fundeps, vec![FunDep::new(vec![0], vec![1])]);
        assert_eq!(c.loc, SourceLoc::new("c.m", 3));

        let insts = tables.instances.get(&ClassId::new("c", 2));
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].head(), "c(list(T), T)");
        assert_eq!(
            insts[0].body,
            InstanceBody::Concrete(vec![
                MethodImpl { name: "m".into(), arity: 2 },
                MethodImpl { name: "n".into(), arity: 0 },
            ])
        );
        assert_eq!(insts[1].origin_module(), Some("lib"));
        assert_eq!(insts[1].original_types[0], Ty::con("myint"));
        assert_eq!(insts[1].types[0], Ty::con("int"));
        assert!(insts[1].loc.is_builtin());

        assert_eq!(tables.decls.preds[0].status, DeclStatus::Exported);
        assert_eq!(tables.decls.preds[0].arity(), 1);
        assert_eq!(tables.decls.ctors[0].exist_vars, vec![TyVar(0)]);
    }

    #[test]
    fn duplicate_class_rejected() {
        let json = r#"{"classes": [{"name": "c", "params": ["A"]}, {"name": "c", "params": ["B"]}]}"#;
        let err = Program::from_json(json).unwrap().lower().unwrap_err();
        assert!(matches!(err, LoadError::DuplicateClass { .. }));
    }

    #[test]
    fn same_name_different_arity_is_a_different_class() {
        let json = r#"{"classes": [{"name": "c", "params": ["A"]}, {"name": "c", "params": ["A", "B"]}]}"#;
        assert_eq!(Program::from_json(json).unwrap().lower().unwrap().classes.len(), 2);
    }

    #[test]
    fn unknown_fundep_parameter() {
        let json = r#"{"classes": [{"name": "c", "params": ["A", "B"],
                       "fundeps": [{"domain": ["A"], "range": ["Z"]}]}]}"#;
        let err = Program::from_json(json).unwrap().lower().unwrap_err();
        assert_eq!(
            err.to_string(),
            "functional dependency of class `c/2` names `Z`, which is not a class parameter"
        );
    }

    #[test]
    fn superclass_with_free_variable() {
        let json = r#"{"classes": [{"name": "c", "params": ["A"], "superclasses": ["d(A, B)"]}]}"#;
        let err = Program::from_json(json).unwrap().lower().unwrap_err();
        assert!(matches!(err, LoadError::NonParameterVariable { .. }));
    }

    #[test]
    fn malformed_term_names_its_context() {
        let json = r#"{"instances": [{"head": "c(list(T)", "body": "abstract"}]}"#;
        let err = Program::from_json(json).unwrap().lower().unwrap_err();
        assert!(err.to_string().starts_with("instance `c(list(T)`: syntax error"));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(Program::from_json("{"), Err(LoadError::Json(_))));
    }
}
