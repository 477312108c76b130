//! Parser for the textual type-term syntax used by program snapshots.
//!
//! Terms look like `list(T)`, `map(K, V)`, `int` or `io.state`. Names that
//! start with an upper-case letter or `_` are variables; anything else is a
//! constructor, identified by its (possibly qualified) name and argument
//! count. Variables are allocated in the caller's `VarSet` in order of first
//! appearance.

use thiserror::Error;

use crate::class::Constraint;
use crate::ty::{Ty, TyCon, VarSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error in `{text}` at offset {offset}: {message}")]
pub struct SyntaxError {
    pub text: String,
    pub offset: usize,
    pub message: String,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser { text, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            text: self.text.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        self.skip_ws();
        let start = self.pos;
        loop {
            let seg_start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' {
                    self.pos += c.len_utf8();
                } else {
                    break;
                }
            }
            if self.pos == seg_start {
                return Err(self.error("expected a name"));
            }
            // A '.' followed by a name continues a qualified name.
            let rest = &self.text[self.pos..];
            if rest.starts_with('.')
                && rest[1..].chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(self.text[start..self.pos].to_string())
    }

    /// `name` or `name(term, ...)`, returned as the name and its arguments.
    fn application(&mut self, varset: &mut VarSet) -> Result<(String, Vec<Ty>), SyntaxError> {
        let name = self.ident()?;
        let mut args = Vec::new();
        if self.eat('(') {
            loop {
                args.push(self.term(varset)?);
                if self.eat(',') {
                    continue;
                }
                if self.eat(')') {
                    break;
                }
                return Err(self.error("expected `,` or `)`"));
            }
        }
        Ok((name, args))
    }

    fn term(&mut self, varset: &mut VarSet) -> Result<Ty, SyntaxError> {
        self.skip_ws();
        let start = self.pos;
        let (name, args) = self.application(varset)?;
        if is_variable_name(&name) {
            if !args.is_empty() {
                self.pos = start;
                return Err(self.error(format!("type variable `{}` cannot take arguments", name)));
            }
            // Each bare `_` is a distinct variable.
            let var = if name == "_" { varset.fresh() } else { varset.lookup_or_fresh(&name) };
            return Ok(Ty::Var(var));
        }
        Ok(Ty::App(TyCon::new(name, args.len()), args))
    }

    fn finish(&mut self) -> Result<(), SyntaxError> {
        self.skip_ws();
        if self.pos < self.text.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(())
    }
}

fn is_variable_name(name: &str) -> bool {
    !name.contains('.')
        && name.chars().next().is_some_and(|c| c.is_uppercase() || c == '_')
}

/// Parse a single type term.
pub fn parse_type(text: &str, varset: &mut VarSet) -> Result<Ty, SyntaxError> {
    let mut p = Parser::new(text);
    let ty = p.term(varset)?;
    p.finish()?;
    Ok(ty)
}

/// Parse a class constraint such as `c(list(T), T)`.
pub fn parse_constraint(text: &str, varset: &mut VarSet) -> Result<Constraint, SyntaxError> {
    let mut p = Parser::new(text);
    let (name, args) = p.application(varset)?;
    if is_variable_name(&name) {
        return Err(SyntaxError {
            text: text.to_string(),
            offset: 0,
            message: format!("expected a class name, found variable `{}`", name),
        });
    }
    p.finish()?;
    Ok(Constraint::new(name, args))
}
