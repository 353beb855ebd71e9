//! Error types and diagnostic reporting

use super::Location;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Secondary context attached to a diagnostic, rendered as an `[INFO]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub message: String,
    pub loc: Location,
}

/// Compile error with source location.
///
/// Every pass is fail-fast: the first error aborts compilation, so each
/// variant carries one primary location plus any "declared here" notes.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{loc}: [ERROR] {message}")]
    Lexer {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Parse {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    UnresolvedWord {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Structural {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Arity {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    TypeMismatch {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    UnknownMember {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Contract {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Evaluation {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("{loc}: [ERROR] {message}")]
    Nesting {
        message: String,
        loc: Location,
        notes: Vec<Note>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, loc: Location) -> Self {
        Self::Lexer {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn parse(message: impl Into<String>, loc: Location) -> Self {
        Self::Parse {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn unresolved(message: impl Into<String>, loc: Location) -> Self {
        Self::UnresolvedWord {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn structural(message: impl Into<String>, loc: Location) -> Self {
        Self::Structural {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn arity(message: impl Into<String>, loc: Location) -> Self {
        Self::Arity {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>, loc: Location) -> Self {
        Self::TypeMismatch {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn unknown_member(message: impl Into<String>, loc: Location) -> Self {
        Self::UnknownMember {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn contract(message: impl Into<String>, loc: Location) -> Self {
        Self::Contract {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn evaluation(message: impl Into<String>, loc: Location) -> Self {
        Self::Evaluation {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    pub fn nesting(message: impl Into<String>, loc: Location) -> Self {
        Self::Nesting {
            message: message.into(),
            loc,
            notes: Vec::new(),
        }
    }

    /// Attach a secondary `[INFO]` line pointing at an earlier location
    pub fn with_note(mut self, message: impl Into<String>, loc: Location) -> Self {
        if let Some(notes) = self.notes_mut() {
            notes.push(Note {
                message: message.into(),
                loc,
            });
        }
        self
    }

    pub fn message(&self) -> String {
        match self {
            Self::Lexer { message, .. }
            | Self::Parse { message, .. }
            | Self::UnresolvedWord { message, .. }
            | Self::Structural { message, .. }
            | Self::Arity { message, .. }
            | Self::TypeMismatch { message, .. }
            | Self::UnknownMember { message, .. }
            | Self::Contract { message, .. }
            | Self::Evaluation { message, .. }
            | Self::Nesting { message, .. } => message.clone(),
            Self::Io(err) => err.to_string(),
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Lexer { loc, .. }
            | Self::Parse { loc, .. }
            | Self::UnresolvedWord { loc, .. }
            | Self::Structural { loc, .. }
            | Self::Arity { loc, .. }
            | Self::TypeMismatch { loc, .. }
            | Self::UnknownMember { loc, .. }
            | Self::Contract { loc, .. }
            | Self::Evaluation { loc, .. }
            | Self::Nesting { loc, .. } => Some(loc),
            Self::Io(_) => None,
        }
    }

    pub fn notes(&self) -> &[Note] {
        match self {
            Self::Lexer { notes, .. }
            | Self::Parse { notes, .. }
            | Self::UnresolvedWord { notes, .. }
            | Self::Structural { notes, .. }
            | Self::Arity { notes, .. }
            | Self::TypeMismatch { notes, .. }
            | Self::UnknownMember { notes, .. }
            | Self::Contract { notes, .. }
            | Self::Evaluation { notes, .. }
            | Self::Nesting { notes, .. } => notes,
            Self::Io(_) => &[],
        }
    }

    fn notes_mut(&mut self) -> Option<&mut Vec<Note>> {
        match self {
            Self::Lexer { notes, .. }
            | Self::Parse { notes, .. }
            | Self::UnresolvedWord { notes, .. }
            | Self::Structural { notes, .. }
            | Self::Arity { notes, .. }
            | Self::TypeMismatch { notes, .. }
            | Self::UnknownMember { notes, .. }
            | Self::Contract { notes, .. }
            | Self::Evaluation { notes, .. }
            | Self::Nesting { notes, .. } => Some(notes),
            Self::Io(_) => None,
        }
    }

    /// Short category name used as the pretty diagnostic headline
    pub fn category(&self) -> &'static str {
        match self {
            Self::Lexer { .. } => "Lexer error",
            Self::Parse { .. } => "Syntax error",
            Self::UnresolvedWord { .. } => "Unresolved word",
            Self::Structural { .. } => "Block structure error",
            Self::Arity { .. } => "Stack underflow",
            Self::TypeMismatch { .. } => "Type error",
            Self::UnknownMember { .. } => "Unknown struct member",
            Self::Contract { .. } => "Stack contract mismatch",
            Self::Evaluation { .. } => "Constant evaluation error",
            Self::Nesting { .. } => "Nesting error",
            Self::Io(_) => "IO error",
        }
    }

    /// Render in the line-oriented sink format:
    /// `<file>:<line>:<col>: [ERROR] <message>` followed by one
    /// `[INFO]` line per note.
    pub fn render(&self) -> String {
        let mut out = self.to_string();
        for note in self.notes() {
            let _ = write!(out, "\n{}: [INFO] {}", note.loc, note.message);
        }
        out
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Diagnostic reporter for pretty error output
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
    ids: HashMap<String, usize>,
    writer: StandardStream,
    config: term::Config,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            ids: HashMap::new(),
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: term::Config::default(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        let name = name.into();
        let id = self.files.add(name.clone(), source.into());
        self.ids.insert(name, id);
        id
    }

    /// Build the codespan diagnostic for an error. Labels are only attached
    /// for files previously registered with `add_file`.
    pub fn diagnostic(&self, error: &CompileError) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::error().with_message(error.category());

        let Some(loc) = error.location() else {
            return diagnostic.with_notes(vec![error.message()]);
        };

        let mut labels = Vec::new();
        match self.ids.get(loc.file.as_ref()) {
            Some(&file_id) => labels.push(
                Label::primary(file_id, loc.span.start..loc.span.end)
                    .with_message(error.message()),
            ),
            None => diagnostic = diagnostic.with_notes(vec![error.render()]),
        }
        for note in error.notes() {
            if let Some(&file_id) = self.ids.get(note.loc.file.as_ref()) {
                labels.push(
                    Label::secondary(file_id, note.loc.span.start..note.loc.span.end)
                        .with_message(note.message.clone()),
                );
            }
        }
        diagnostic.with_labels(labels)
    }

    pub fn report_error(&self, error: &CompileError) {
        let diagnostic = self.diagnostic(error);
        let mut writer = self.writer.lock();
        let _ = term::emit(&mut writer, &self.config, &self.files, &diagnostic);
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use std::sync::Arc;

    fn loc(line: u32, col: u32) -> Location {
        Location::new(Arc::from("prog.kln"), line, col, Span::new(0, 1))
    }

    #[test]
    fn test_render_with_notes() {
        let err = CompileError::contract("procedure `main` leaves [int] but declares []", loc(4, 1))
            .with_note("`main` declared here", loc(1, 1));

        assert_eq!(
            err.render(),
            "prog.kln:4:1: [ERROR] procedure `main` leaves [int] but declares []\n\
             prog.kln:1:1: [INFO] `main` declared here"
        );
        assert_eq!(err.notes().len(), 1);
        assert_eq!(err.category(), "Stack contract mismatch");
    }

    #[test]
    fn test_io_error_has_no_location() {
        let err = CompileError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.location().is_none());
        assert_eq!(err.to_string(), "IO error: gone");
        assert_eq!(err.with_note("ignored", loc(1, 1)).notes().len(), 0);
    }

    #[test]
    fn test_pretty_diagnostic_labels() {
        let mut reporter = DiagnosticReporter::new();
        reporter.add_file("prog.kln", "main :: 1 end");
        let err = CompileError::unresolved("undeclared word `foo`", loc(1, 9))
            .with_note("in procedure `main`", loc(1, 1));

        let diagnostic = reporter.diagnostic(&err);
        assert_eq!(diagnostic.message, "Unresolved word");
        assert_eq!(diagnostic.labels.len(), 2);
    }
}
