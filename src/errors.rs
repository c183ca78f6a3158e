// src/errors.rs
//! Diagnostics for template instantiation (E3xxx / W3xxx).
//!
//! Fatal conditions abort the current instantiation and propagate as
//! `Err(TemplateError)`. Non-fatal conditions are collected in a
//! `Diagnostics` sink and processing continues with the documented
//! fallback behavior.

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Loc;

/// Fatal instantiation errors. The requested instantiation is dropped and
/// the input tree is left unmodified apart from diagnostics.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{loc}: Template '{name}' undefined")]
    #[diagnostic(code(E3001))]
    TemplateUndefined { name: String, loc: DisplayLoc },

    #[error("{loc}: '{name}' is not defined as a template ({kind})")]
    #[diagnostic(code(E3002))]
    NotATemplate {
        name: String,
        kind: String,
        loc: DisplayLoc,
    },

    #[error("{loc}: Too many template parameters. Maximum of {maximum}")]
    #[diagnostic(code(E3003))]
    TooManyTemplateParameters { maximum: usize, loc: DisplayLoc },

    #[error("{loc}: Not enough template parameters specified. {required} required")]
    #[diagnostic(code(E3004))]
    NotEnoughTemplateParameters { required: usize, loc: DisplayLoc },
}

/// Non-fatal instantiation warnings.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum TemplateWarning {
    /// Several partial specializations tied for best match; the first in
    /// declaration order was used.
    #[error("{loc}: Instantiation of template '{name}' is ambiguous, instantiation '{chosen}' used, {} ignored", .ignored.join(", "))]
    #[diagnostic(code(W3001))]
    TemplateAmbiguous {
        name: String,
        chosen: String,
        ignored: Vec<String>,
        loc: DisplayLoc,
    },

    /// A second named instantiation of an already-instantiated template.
    #[error("{loc}: Duplicate template instantiation of '{name}' with name '{symname}' ignored, previous instantiation of '{previous_name}' with name '{previous_symname}' at {previous_loc}")]
    #[diagnostic(code(W3002))]
    TypeRedefined {
        name: String,
        symname: String,
        previous_name: String,
        previous_symname: String,
        loc: DisplayLoc,
        previous_loc: DisplayLoc,
    },
}

/// A `file:line` pair rendered into diagnostic messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayLoc {
    pub file: String,
    pub line: u32,
}

impl From<&Loc> for DisplayLoc {
    fn from(loc: &Loc) -> Self {
        DisplayLoc {
            file: loc.file.clone(),
            line: loc.line,
        }
    }
}

impl std::fmt::Display for DisplayLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Sink for non-fatal diagnostics produced during a run of instantiations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<TemplateWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: TemplateWarning) {
        tracing::warn!(%warning, "template instantiation warning");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[TemplateWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn take(&mut self) -> Vec<TemplateWarning> {
        std::mem::take(&mut self.warnings)
    }
}
