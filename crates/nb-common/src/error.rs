//! The error categories this crate distinguishes.
//!
//! - **`NbErrorKind`**  : the six categories from the error-handling design —
//!   `Syntax`, `Reference`, `Type`, `Cycle`, `Resource`, `Command`.
//! - **`SourceLocation`**: a lightweight parser location tag.
//! - **`NbError`**      : one struct gluing the two together, suitable to
//!   return from any fallible engine API.
//!
//! Type errors on three-valued operators (e.g. comparing a string to a real)
//! are *not* represented here: per the spec those produce an `Unknown`
//! value, not an `Err`. This type is for conditions that abort a statement
//! or stimulus cycle outright.

use std::fmt;

/// The six error categories named in the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NbErrorKind {
    /// Malformed surface syntax; no cells were constructed.
    Syntax,
    /// A term was referenced in a position requiring a prior definition.
    Reference,
    /// An operation was attempted against a welded term or similar
    /// structural constraint (not the three-valued numeric/string
    /// mismatches, which resolve to `Unknown` instead of erroring).
    Type,
    /// A rule's action was scheduled twice within one stimulus cycle.
    Cycle,
    /// Allocation or timer-arming failure; the caller should treat this as
    /// fatal.
    Resource,
    /// The external command sink reported a failure executing a command.
    Command,
}

impl fmt::Display for NbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Reference => "reference",
            Self::Type => "type",
            Self::Cycle => "cycle",
            Self::Resource => "resource",
            Self::Command => "command",
        })
    }
}

/// Where in the source text an error was diagnosed, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The single error type returned by fallible engine, parser, and rule APIs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}{}", .location.map(|l| format!(" (at {l})")).unwrap_or_default())]
pub struct NbError {
    pub kind: NbErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl NbError {
    pub fn new(kind: NbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Syntax, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Reference, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Type, message)
    }

    pub fn cycle(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Cycle, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Resource, message)
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::new(NbErrorKind::Command, message)
    }
}
