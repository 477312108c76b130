//! Rendering of checker diagnostics.
//!
//! Three forms: an ariadne report when the source text of the primary
//! location is available, a one-line JSON object in JSON mode, and a plain
//! `file:line: severity[code]: message` line otherwise.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use classck_common::{LineIndex, SourceLoc};

use crate::error::{CheckError, Severity};

/// Options controlling diagnostic output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticOptions {
    /// Enable ANSI color codes in ariadne output.
    pub color: bool,
    /// Output diagnostics as JSON instead of human-readable text.
    pub json: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self { color: true, json: false }
    }
}

impl DiagnosticOptions {
    /// Colorless human-readable output (for tests and pipes).
    pub fn colorless() -> Self {
        Self { color: false, json: false }
    }

    pub fn json_mode() -> Self {
        Self { color: false, json: true }
    }
}

// ── Labels ─────────────────────────────────────────────────────────────

/// Short text attached to the primary location.
fn primary_label(err: &CheckError) -> &'static str {
    match err {
        CheckError::Cycle { .. } => "class is part of a superclass cycle",
        CheckError::BadInstanceShape { .. } => "malformed instance type",
        CheckError::DuplicateConcreteInstance { .. } => "duplicate definition",
        CheckError::DuplicateAbstractInstance { .. } => "repeated abstract declaration",
        CheckError::AbstractConcreteMismatch { .. } => "constraints differ here",
        CheckError::MissingConcreteForAbstract { .. } => "declared here without a definition",
        CheckError::LocalNonlocalClash { .. } => "local declaration",
        CheckError::OverlapAssertionFailure { .. } => "overlapping instance",
        CheckError::UncoveredFunctionalDependency { .. } => "dependency not covered",
        CheckError::InconsistentFunctionalDependency { .. } => "inconsistent instance",
        CheckError::UnknownClassReference { .. } => "unknown class",
        CheckError::AmbiguousConstrainedVariable { .. } => "ambiguous declaration",
        CheckError::BadQuantifierScope { .. } => "bad quantification",
    }
}

fn note(err: &CheckError) -> Option<&'static str> {
    match err {
        CheckError::OverlapAssertionFailure { .. } => {
            Some("this is a bug in the instance checker; please report it")
        }
        CheckError::LocalNonlocalClash { .. } => {
            Some("remove the local declaration or stop importing the other one")
        }
        _ => None,
    }
}

/// Byte range of `line`, widened to at least one byte when possible.
fn line_span(index: &LineIndex, source_len: usize, line: u32) -> Range<usize> {
    let r = index.line_range(line);
    if r.start == r.end {
        r.start..(r.end + 1).min(source_len)
    } else {
        r
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render a diagnostic.
///
/// `source` is the text of the file named by the primary location. Related
/// locations in the same file are labelled too; those elsewhere appear as
/// notes.
pub fn render_diagnostic(err: &CheckError, source: Option<&str>, opts: &DiagnosticOptions) -> String {
    if opts.json {
        return render_json(err);
    }
    match source {
        Some(src) if !err.loc().is_builtin() => render_report(err, src, opts),
        _ => render_plain(err),
    }
}

fn render_json(err: &CheckError) -> String {
    let mut locations = vec![serde_json::json!({
        "file": err.loc().file,
        "line": err.loc().line,
        "label": primary_label(err),
    })];
    for (loc, label) in err.related() {
        locations.push(serde_json::json!({
            "file": loc.file,
            "line": loc.line,
            "label": label,
        }));
    }
    serde_json::json!({
        "code": err.code(),
        "severity": err.severity(),
        "phase": err.phase(),
        "message": err.to_string(),
        "internal": err.is_internal(),
        "locations": locations,
    })
    .to_string()
}

fn render_plain(err: &CheckError) -> String {
    let mut out = format!("{}: {}[{}]: {}\n", err.loc(), err.severity(), err.code(), err);
    for (loc, label) in err.related() {
        out.push_str(&format!("{}: note: {}\n", loc, label));
    }
    if let Some(note) = note(err) {
        out.push_str(&format!("note: {}\n", note));
    }
    out
}

fn render_report(err: &CheckError, source: &str, opts: &DiagnosticOptions) -> String {
    let config = if opts.color { Config::default() } else { Config::default().with_color(false) };
    let index = LineIndex::new(source);
    let primary: &SourceLoc = err.loc();
    let file = primary.file.clone();
    let span = line_span(&index, source.len(), primary.line);

    let kind = match err.severity() {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };
    let mut builder = Report::build(kind, (file.clone(), span.clone()))
        .with_code(err.code())
        .with_message(err.to_string())
        .with_config(config)
        .with_label(
            Label::new((file.clone(), span))
                .with_message(primary_label(err))
                .with_color(Color::Red),
        );

    let mut elsewhere = Vec::new();
    for (loc, label) in err.related() {
        if loc.file == file && !loc.is_builtin() {
            builder.add_label(
                Label::new((file.clone(), line_span(&index, source.len(), loc.line)))
                    .with_message(label)
                    .with_color(Color::Blue),
            );
        } else {
            elsewhere.push(format!("{} at {}", label, loc));
        }
    }
    if let Some(note) = note(err) {
        elsewhere.push(note.to_string());
    }
    if !elsewhere.is_empty() {
        builder.set_note(elsewhere.join("\n"));
    }

    let mut buf = Vec::new();
    match builder.finish().write((file, Source::from(source)), &mut buf) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => render_plain(err),
    }
}
